//! Preparation configuration via TOML files.
//!
//! This module provides configuration parsing from TOML format with sensible
//! defaults, plus in-code construction through [`Default`]. Validation happens
//! once, before any data is touched.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A requested subset size: either a fraction of the available samples or an
/// absolute count.
///
/// Values in `(0, 1)` parse as fractions; values `>= 1` parse as counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TrainSize {
    /// Fraction of the available samples, strictly between 0 and 1.
    Fraction(f64),
    /// Absolute number of samples.
    Count(usize),
}

/// Per-class sequence of subset sizes.
///
/// A single entry broadcasts to every class; otherwise the list must supply
/// one entry per class. The broadcast rule is resolved by the splitter, which
/// knows the class count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainSizeSpec(Vec<TrainSize>);

impl TrainSizeSpec {
    /// Build a spec from an explicit size list.
    pub fn new(sizes: Vec<TrainSize>) -> Result<Self, ConfigError> {
        if sizes.is_empty() {
            return Err(ConfigError::invalid("train_size", "must not be empty"));
        }
        for size in &sizes {
            match size {
                TrainSize::Fraction(f) if !(f.is_finite() && *f > 0.0 && *f < 1.0) => {
                    return Err(ConfigError::invalid(
                        "train_size",
                        "fractions must lie strictly between 0 and 1",
                    ));
                }
                TrainSize::Count(0) => {
                    return Err(ConfigError::invalid("train_size", "counts must be >= 1"));
                }
                _ => {}
            }
        }
        Ok(Self(sizes))
    }

    /// Single-fraction spec, broadcast to every class.
    pub fn fraction(value: f64) -> Self {
        Self(vec![TrainSize::Fraction(value)])
    }

    /// Single-count spec, broadcast to every class.
    pub fn count(value: usize) -> Self {
        Self(vec![TrainSize::Count(value)])
    }

    /// The configured size entries.
    pub fn sizes(&self) -> &[TrainSize] {
        &self.0
    }

    /// Number of configured entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Dataset preparation configuration.
///
/// # Examples
///
/// ```
/// use hyperprep::PrepConfig;
///
/// let config = PrepConfig::default();
/// assert_eq!(config.val_size, 0.1);
/// assert!(config.stratified);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct PrepConfig {
    /// Path to the data cube file (`.npy`, or `.npz` in satellite mode).
    pub data_file_path: PathBuf,
    /// Path to the ground-truth file (`.npy`, or `.tiff` in satellite mode).
    pub ground_truth_path: PathBuf,
    /// Destination for the persisted split archive. Required when `save_data`
    /// is set.
    pub output_path: Option<PathBuf>,
    /// Per-class train sizes with single-value broadcast.
    pub train_size: TrainSizeSpec,
    /// Fraction of the train selection carved out as validation, in `[0, 1)`.
    pub val_size: f64,
    /// Draw independently per class instead of uniformly over the whole set.
    pub stratified: bool,
    /// Sentinel class value meaning "unlabeled" in classification mode.
    pub background_label: i64,
    /// Side of the square spatial neighborhood; odd, `None` for pixel samples.
    pub neighborhood_size: Option<usize>,
    /// Axis of the channel dimension in the stored cube (0, 1 or 2).
    pub channels_idx: usize,
    /// Persist the splits to `output_path` instead of returning them.
    pub save_data: bool,
    /// Seed driving every random draw.
    pub seed: u64,
    /// Treat the ground truth as per-class fractional abundances.
    pub use_unmixing: bool,
    /// Allow neighborhood patches from different splits to share pixels.
    pub spatial_overlap: bool,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            data_file_path: PathBuf::new(),
            ground_truth_path: PathBuf::new(),
            output_path: None,
            train_size: TrainSizeSpec::fraction(0.8),
            val_size: 0.1,
            stratified: true,
            background_label: 0,
            neighborhood_size: None,
            channels_idx: 2,
            save_data: false,
            seed: 0,
            use_unmixing: false,
            spatial_overlap: true,
        }
    }
}

impl PrepConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;

        let train_size = TrainSizeSpec::new(
            raw.split
                .train_size
                .iter()
                .map(RawSize::to_train_size)
                .collect::<Result<Vec<_>, _>>()?,
        )?;

        let config = Self {
            data_file_path: raw.input.data_file_path,
            ground_truth_path: raw.input.ground_truth_path,
            output_path: raw.output.path,
            train_size,
            val_size: raw.split.val_size,
            stratified: raw.split.stratified,
            background_label: raw.sampling.background_label,
            neighborhood_size: raw.sampling.neighborhood_size,
            channels_idx: raw.input.channels_idx,
            save_data: raw.output.save,
            seed: raw.split.seed,
            use_unmixing: raw.sampling.use_unmixing,
            spatial_overlap: raw.split.spatial_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency before any data is loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_file_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("data_file_path", "must be set"));
        }
        if self.ground_truth_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("ground_truth_path", "must be set"));
        }
        if self.train_size.is_empty() {
            return Err(ConfigError::invalid("train_size", "must not be empty"));
        }
        if !(self.val_size >= 0.0 && self.val_size < 1.0) {
            return Err(ConfigError::invalid("val_size", "must lie in [0, 1)"));
        }
        if let Some(k) = self.neighborhood_size {
            if k == 0 || k % 2 == 0 {
                return Err(ConfigError::invalid(
                    "neighborhood_size",
                    "must be an odd positive integer",
                ));
            }
        }
        if self.channels_idx > 2 {
            return Err(ConfigError::invalid(
                "channels_idx",
                "must name one of the three cube axes (0, 1 or 2)",
            ));
        }
        if self.save_data && self.output_path.is_none() {
            return Err(ConfigError::invalid(
                "output_path",
                "required when save_data is set",
            ));
        }
        TrainSizeSpec::new(self.train_size.sizes().to_vec())?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    input: RawInput,
    #[serde(default)]
    sampling: RawSampling,
    #[serde(default)]
    split: RawSplit,
    #[serde(default)]
    output: RawOutput,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    data_file_path: PathBuf,
    ground_truth_path: PathBuf,
    #[serde(default = "default_channels_idx")]
    channels_idx: usize,
}

#[derive(Debug, Deserialize)]
struct RawSampling {
    #[serde(default)]
    background_label: i64,
    #[serde(default)]
    neighborhood_size: Option<usize>,
    #[serde(default)]
    use_unmixing: bool,
}

impl Default for RawSampling {
    fn default() -> Self {
        Self {
            background_label: 0,
            neighborhood_size: None,
            use_unmixing: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSplit {
    #[serde(default = "default_train_size")]
    train_size: Vec<RawSize>,
    #[serde(default = "default_val_size")]
    val_size: f64,
    #[serde(default = "default_true")]
    stratified: bool,
    #[serde(default = "default_true")]
    spatial_overlap: bool,
    #[serde(default)]
    seed: u64,
}

impl Default for RawSplit {
    fn default() -> Self {
        Self {
            train_size: default_train_size(),
            val_size: default_val_size(),
            stratified: true,
            spatial_overlap: true,
            seed: 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawOutput {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    save: bool,
}

/// TOML sizes keep the original's int-vs-float reading: integers are counts,
/// floats below 1 are fractions.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum RawSize {
    Int(i64),
    Float(f64),
}

impl RawSize {
    fn to_train_size(&self) -> Result<TrainSize, ConfigError> {
        match *self {
            RawSize::Int(n) if n >= 1 => Ok(TrainSize::Count(n as usize)),
            RawSize::Float(f) if f > 0.0 && f < 1.0 => Ok(TrainSize::Fraction(f)),
            RawSize::Float(f) if f >= 1.0 && f.fract() == 0.0 => Ok(TrainSize::Count(f as usize)),
            _ => Err(ConfigError::invalid(
                "train_size",
                "entries must be fractions in (0, 1) or counts >= 1",
            )),
        }
    }
}

fn default_channels_idx() -> usize {
    2
}

fn default_train_size() -> Vec<RawSize> {
    vec![RawSize::Float(0.8)]
}

fn default_val_size() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Invalid { parameter: String, reason: String },
}

impl ConfigError {
    pub fn invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
            ConfigError::Invalid { parameter, reason } => {
                write!(f, "Invalid configuration for '{}': {}", parameter, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_full_toml() {
        let toml = r#"
[input]
data_file_path = "datasets/samson/data.npy"
ground_truth_path = "datasets/samson/gt.npy"
channels_idx = 0

[sampling]
background_label = 0
neighborhood_size = 5
use_unmixing = true

[split]
train_size = [0.8]
val_size = 0.1
stratified = true
spatial_overlap = false
seed = 7

[output]
path = "splits.npz"
save = true
"#;
        let config = PrepConfig::from_str(toml).unwrap();
        assert_eq!(config.channels_idx, 0);
        assert_eq!(config.neighborhood_size, Some(5));
        assert!(config.use_unmixing);
        assert!(!config.spatial_overlap);
        assert_eq!(config.seed, 7);
        assert_eq!(config.train_size.sizes(), &[TrainSize::Fraction(0.8)]);
        assert!(config.save_data);
    }

    #[test]
    fn config_defaults_when_sections_missing() {
        let toml = r#"
[input]
data_file_path = "data.npy"
ground_truth_path = "gt.npy"
"#;
        let config = PrepConfig::from_str(toml).unwrap();
        assert_eq!(config.val_size, 0.1);
        assert!(config.stratified);
        assert!(config.spatial_overlap);
        assert_eq!(config.background_label, 0);
        assert_eq!(config.channels_idx, 2);
        assert_eq!(config.neighborhood_size, None);
        assert!(!config.save_data);
    }

    #[test]
    fn config_parses_counts_and_per_class_lists() {
        let toml = r#"
[input]
data_file_path = "data.npy"
ground_truth_path = "gt.npy"

[split]
train_size = [250, 250, 100]
"#;
        let config = PrepConfig::from_str(toml).unwrap();
        assert_eq!(
            config.train_size.sizes(),
            &[
                TrainSize::Count(250),
                TrainSize::Count(250),
                TrainSize::Count(100)
            ]
        );
    }

    #[test]
    fn config_rejects_even_neighborhood() {
        let toml = r#"
[input]
data_file_path = "data.npy"
ground_truth_path = "gt.npy"

[sampling]
neighborhood_size = 4
"#;
        let result = PrepConfig::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn config_rejects_out_of_range_sizes() {
        let result = TrainSizeSpec::new(vec![TrainSize::Fraction(1.5)]);
        assert!(result.is_err());
        let result = TrainSizeSpec::new(vec![TrainSize::Count(0)]);
        assert!(result.is_err());
        let result = TrainSizeSpec::new(vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn config_requires_output_path_when_saving() {
        let mut config = PrepConfig {
            data_file_path: "data.npy".into(),
            ground_truth_path: "gt.npy".into(),
            save_data: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.output_path = Some("out.npz".into());
        assert!(config.validate().is_ok());
    }
}
