//! End-to-end preparation pipeline.
//!
//! One run is a pure function of (input files, configuration, seed): resolve
//! the dataset source, load and orient the cube, extract and filter samples,
//! split, then either persist the splits or hand them back in memory. Any
//! error aborts the whole run; there are no partial results.

use crate::config::{ConfigError, PrepConfig};
use crate::logging::{log_run, RunLogEntry};
use crate::persist::{save_splits, PersistError};
use crate::samples::{extract_samples, filter_samples, SampleError};
use crate::source::{DatasetSource, SourceError};
use crate::split::{train_val_test_split, SplitData, SplitError, SplitOptions};

/// Run the full preparation pipeline described by `config`.
///
/// Returns `Ok(None)` when `save_data` is set (the splits were written to
/// `output_path`), otherwise `Ok(Some(splits))`.
pub fn prepare_dataset(config: &PrepConfig) -> Result<Option<SplitData>, PrepError> {
    config.validate()?;

    let source = DatasetSource::from_paths(&config.data_file_path, &config.ground_truth_path)?;
    let (cube, ground_truth) = source.load(
        config.channels_idx,
        config.use_unmixing,
        config.background_label,
    )?;
    let (height, width, channels) = cube.dim();
    tracing::info!(height, width, channels, "loaded cube");

    let set = extract_samples(&cube, &ground_truth, config.neighborhood_size)?;
    let extracted = set.len();
    let set = filter_samples(set, config.use_unmixing, config.background_label)?;
    if set.len() < extracted {
        tracing::info!(
            kept = set.len(),
            dropped = extracted - set.len(),
            "filtered samples"
        );
    }

    let options = SplitOptions {
        train_size: config.train_size.clone(),
        val_size: config.val_size,
        stratified: config.stratified,
        seed: config.seed,
        spatial_overlap: config.spatial_overlap,
        neighborhood_size: config.neighborhood_size,
    };
    let splits = train_val_test_split(&set, &options)?;
    tracing::info!(
        train = splits.train.len(),
        val = splits.val.len(),
        test = splits.test.len(),
        "split complete"
    );

    let entry = RunLogEntry::new(
        &config.data_file_path,
        &config.ground_truth_path,
        extracted,
        set.len(),
        &splits,
    );
    if let Err(err) = log_run(&entry) {
        tracing::warn!("failed to append run log: {}", err);
    }

    if config.save_data {
        let path = config.output_path.as_ref().ok_or_else(|| {
            PrepError::Config(ConfigError::invalid(
                "output_path",
                "required when save_data is set",
            ))
        })?;
        save_splits(path, &splits)?;
        tracing::info!(path = %path.display(), "splits persisted");
        Ok(None)
    } else {
        Ok(Some(splits))
    }
}

/// Top-level pipeline error.
#[derive(Debug)]
pub enum PrepError {
    Config(ConfigError),
    Source(SourceError),
    Sample(SampleError),
    Split(SplitError),
    Persist(PersistError),
}

impl std::fmt::Display for PrepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrepError::Config(err) => write!(f, "{}", err),
            PrepError::Source(err) => write!(f, "{}", err),
            PrepError::Sample(err) => write!(f, "{}", err),
            PrepError::Split(err) => write!(f, "{}", err),
            PrepError::Persist(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PrepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrepError::Config(err) => Some(err),
            PrepError::Source(err) => Some(err),
            PrepError::Sample(err) => Some(err),
            PrepError::Split(err) => Some(err),
            PrepError::Persist(err) => Some(err),
        }
    }
}

impl From<ConfigError> for PrepError {
    fn from(value: ConfigError) -> Self {
        PrepError::Config(value)
    }
}

impl From<SourceError> for PrepError {
    fn from(value: SourceError) -> Self {
        PrepError::Source(value)
    }
}

impl From<SampleError> for PrepError {
    fn from(value: SampleError) -> Self {
        PrepError::Sample(value)
    }
}

impl From<SplitError> for PrepError {
    fn from(value: SplitError) -> Self {
        PrepError::Split(value)
    }
}

impl From<PersistError> for PrepError {
    fn from(value: PersistError) -> Self {
        PrepError::Persist(value)
    }
}
