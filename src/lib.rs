//! # hyperprep
//!
//! Hyperspectral dataset preparation: reshape a spectral cube and its ground
//! truth into flat samples, then partition them into deterministic
//! train/validation/test splits for downstream unmixing or classification
//! models.
//!
//! ## Quick Start
//!
//! ```rust
//! use ndarray::{Array2, Array3};
//! use hyperprep::{
//!     extract_samples, filter_samples, train_val_test_split, GroundTruth, SplitOptions,
//!     TrainSizeSpec,
//! };
//!
//! // An 8x8 cube with 4 spectral bands and a single labeled class.
//! let cube = Array3::<f32>::from_elem((8, 8, 4), 0.5);
//! let ground_truth = GroundTruth::ClassMap(Array2::<i64>::ones((8, 8)));
//!
//! let set = extract_samples(&cube, &ground_truth, None).unwrap();
//! let set = filter_samples(set, false, 0).unwrap();
//!
//! let options = SplitOptions {
//!     train_size: TrainSizeSpec::fraction(0.8),
//!     val_size: 0.1,
//!     stratified: true,
//!     seed: 0,
//!     spatial_overlap: true,
//!     neighborhood_size: None,
//! };
//! let splits = train_val_test_split(&set, &options).unwrap();
//! assert_eq!(splits.train.len() + splits.val.len() + splits.test.len(), 64);
//! ```
//!
//! ## Core Modules
//!
//! - [`config`] - Preparation configuration via TOML
//! - [`source`] - Dataset source boundary (`.npy` pairs, satellite rasters)
//! - [`samples`] - Pixel/patch extraction and filtering
//! - [`split`] - Deterministic train/val/test splitting
//! - [`persist`] - `.npz` split archives
//! - [`pipeline`] - End-to-end orchestration

pub mod config;
pub mod logging;
pub mod persist;
pub mod pipeline;
pub mod samples;
pub mod source;
pub mod split;

pub use config::{ConfigError, PrepConfig, TrainSize, TrainSizeSpec};
pub use persist::{load_splits, save_splits, PersistError};
pub use pipeline::{prepare_dataset, PrepError};
pub use samples::{
    extract_samples, filter_samples, Features, GridShape, Labels, SampleError, SampleSet,
};
pub use source::{DatasetSource, GroundTruth, SourceError};
pub use split::{
    train_val_test_split, SplitData, SplitError, SplitGroup, SplitName, SplitOptions,
};
