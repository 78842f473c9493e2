//! Dataset source boundary.
//!
//! A [`DatasetSource`] resolves the (data file, ground-truth file) pair into
//! one of the supported loader variants by inspecting file extensions, then
//! exposes a uniform `load` contract: a `(height, width, channels)` cube plus
//! a [`GroundTruth`]. Unsupported extension combinations fail fast, naming
//! the offending extension.

mod array_pair;
mod satellite;

use std::path::{Path, PathBuf};

use ndarray::Array3;
use ndarray_npy::{ReadNpyError, ReadNpzError};

/// Per-pixel supervision attached to a cube.
#[derive(Debug, Clone)]
pub enum GroundTruth {
    /// 2-D map of integer class indices; `background_label` means unlabeled.
    ClassMap(ndarray::Array2<i64>),
    /// `(classes, height, width)` stack of fractional abundances.
    Abundances(Array3<f32>),
}

impl GroundTruth {
    /// Spatial `(height, width)` extent of the supervision.
    pub fn spatial_shape(&self) -> (usize, usize) {
        match self {
            GroundTruth::ClassMap(map) => map.dim(),
            GroundTruth::Abundances(stack) => {
                let (_, height, width) = stack.dim();
                (height, width)
            }
        }
    }

    /// Number of supervised classes, counting background in class maps.
    pub fn num_classes(&self) -> usize {
        match self {
            GroundTruth::ClassMap(map) => map
                .iter()
                .copied()
                .max()
                .map(|max| (max + 1).max(0) as usize)
                .unwrap_or(0),
            GroundTruth::Abundances(stack) => stack.dim().0,
        }
    }
}

/// A resolved pair of input files, ready to load.
#[derive(Debug, Clone)]
pub enum DatasetSource {
    /// `.npy` cube + `.npy` ground truth.
    ArrayPair { data: PathBuf, ground_truth: PathBuf },
    /// `.npz` cube-plus-transform archive + `.tiff` ground-truth raster.
    SatelliteRasterPair { data: PathBuf, ground_truth: PathBuf },
}

impl DatasetSource {
    /// Select a loader variant from the file extensions.
    pub fn from_paths(data: &Path, ground_truth: &Path) -> Result<Self, SourceError> {
        let data_ext = extension_of(data);
        let gt_ext = extension_of(ground_truth);
        match (data_ext.as_str(), gt_ext.as_str()) {
            ("npy", "npy") => Ok(DatasetSource::ArrayPair {
                data: data.to_path_buf(),
                ground_truth: ground_truth.to_path_buf(),
            }),
            ("npz", "tiff") | ("npz", "tif") => Ok(DatasetSource::SatelliteRasterPair {
                data: data.to_path_buf(),
                ground_truth: ground_truth.to_path_buf(),
            }),
            ("npy", other) | ("npz", other) => Err(SourceError::UnsupportedFormat {
                extension: format!(".{}", other),
            }),
            (other, _) => Err(SourceError::UnsupportedFormat {
                extension: format!(".{}", other),
            }),
        }
    }

    /// Load the cube and ground truth behind this source.
    ///
    /// The returned cube is always `(height, width, channels)`; the spatial
    /// extent of the ground truth is guaranteed to match the cube.
    pub fn load(
        &self,
        channels_idx: usize,
        use_unmixing: bool,
        background_label: i64,
    ) -> Result<(Array3<f32>, GroundTruth), SourceError> {
        match self {
            DatasetSource::ArrayPair { data, ground_truth } => {
                array_pair::load(data, ground_truth, channels_idx, use_unmixing)
            }
            DatasetSource::SatelliteRasterPair { data, ground_truth } => {
                if use_unmixing {
                    return Err(SourceError::InvalidLayout {
                        reason: "satellite raster sources provide class maps, not abundances"
                            .to_string(),
                    });
                }
                satellite::load(data, ground_truth, background_label)
            }
        }
    }
}

/// Reorder a cube so that the channel axis named by `channels_idx` is last.
pub(crate) fn orient_cube(
    cube: Array3<f32>,
    channels_idx: usize,
) -> Result<Array3<f32>, SourceError> {
    let oriented = match channels_idx {
        0 => cube.permuted_axes([1, 2, 0]),
        1 => cube.permuted_axes([0, 2, 1]),
        2 => cube,
        other => {
            return Err(SourceError::InvalidLayout {
                reason: format!("channels_idx {} does not name a cube axis", other),
            })
        }
    };
    // Standard layout keeps later window extraction contiguous.
    Ok(oriented.as_standard_layout().into_owned())
}

/// Fail unless the cube and ground truth cover the same pixel grid.
pub(crate) fn check_spatial_match(
    cube: &Array3<f32>,
    ground_truth: &GroundTruth,
) -> Result<(), SourceError> {
    let (height, width, _) = cube.dim();
    let gt_shape = ground_truth.spatial_shape();
    if (height, width) != gt_shape {
        return Err(SourceError::ShapeMismatch {
            cube: (height, width),
            labels: gt_shape,
        });
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

#[derive(Debug)]
pub enum SourceError {
    /// The file extension combination is not supported.
    UnsupportedFormat { extension: String },
    Io(std::io::Error),
    Npy(ReadNpyError),
    Npz(ReadNpzError),
    Tiff(tiff::TiffError),
    /// The raster holds samples in a pixel format no loader understands.
    UnsupportedPixelFormat,
    /// A required archive entry is absent.
    MissingEntry { name: String },
    /// Cube and ground truth cover different pixel grids.
    ShapeMismatch {
        cube: (usize, usize),
        labels: (usize, usize),
    },
    /// The stored arrays have a shape or layout the loader cannot use.
    InvalidLayout { reason: String },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::UnsupportedFormat { extension } => {
                write!(f, "The following data file type is not supported: {}", extension)
            }
            SourceError::Io(err) => write!(f, "IO error while loading dataset: {}", err),
            SourceError::Npy(err) => write!(f, "Failed to read .npy array: {}", err),
            SourceError::Npz(err) => write!(f, "Failed to read .npz archive: {}", err),
            SourceError::Tiff(err) => write!(f, "Failed to decode ground-truth raster: {}", err),
            SourceError::UnsupportedPixelFormat => {
                write!(f, "Unsupported pixel format in ground-truth raster")
            }
            SourceError::MissingEntry { name } => {
                write!(f, "Archive entry '{}' is missing", name)
            }
            SourceError::ShapeMismatch { cube, labels } => write!(
                f,
                "Cube spatial shape {}x{} does not match ground truth {}x{}",
                cube.0, cube.1, labels.0, labels.1
            ),
            SourceError::InvalidLayout { reason } => write!(f, "Invalid array layout: {}", reason),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(value: std::io::Error) -> Self {
        SourceError::Io(value)
    }
}

impl From<ReadNpyError> for SourceError {
    fn from(value: ReadNpyError) -> Self {
        SourceError::Npy(value)
    }
}

impl From<ReadNpzError> for SourceError {
    fn from(value: ReadNpzError) -> Self {
        SourceError::Npz(value)
    }
}

impl From<tiff::TiffError> for SourceError {
    fn from(value: tiff::TiffError) -> Self {
        SourceError::Tiff(value)
    }
}
