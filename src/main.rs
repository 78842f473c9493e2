//! Command-line entry point: expose the preparation pipeline configuration
//! surface as flags, with an optional TOML file as base layer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hyperprep::{prepare_dataset, PrepConfig, TrainSize, TrainSizeSpec};

#[derive(Parser)]
#[command(
    name = "hyperprep",
    version,
    about = "Reshape a hyperspectral cube and split it into train/val/test sets"
)]
struct Cli {
    /// Base configuration TOML file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the data cube file (.npy, or .npz in satellite mode)
    #[arg(long)]
    data_file_path: Option<PathBuf>,

    /// Path to the ground-truth file (.npy, or .tiff in satellite mode)
    #[arg(long)]
    ground_truth_path: Option<PathBuf>,

    /// Destination for the persisted split archive
    #[arg(long)]
    output_path: Option<PathBuf>,

    /// Train sizes: fractions in (0,1) or counts, comma-separated per class
    #[arg(long, value_delimiter = ',')]
    train_size: Option<Vec<f64>>,

    /// Fraction of the train selection carved out as validation
    #[arg(long)]
    val_size: Option<f64>,

    /// Draw independently per class (true) or uniformly (false)
    #[arg(long)]
    stratified: Option<bool>,

    /// Class value meaning "unlabeled" in classification mode
    #[arg(long)]
    background_label: Option<i64>,

    /// Side of the square spatial neighborhood (odd)
    #[arg(long)]
    neighborhood_size: Option<usize>,

    /// Axis of the channel dimension in the stored cube (0, 1 or 2)
    #[arg(long)]
    channels_idx: Option<usize>,

    /// Persist the splits to the output path instead of only summarizing
    #[arg(long)]
    save_data: bool,

    /// Seed driving every random draw
    #[arg(long)]
    seed: Option<u64>,

    /// Treat the ground truth as per-class fractional abundances
    #[arg(long)]
    use_unmixing: bool,

    /// Allow patches from different splits to share pixels
    #[arg(long)]
    spatial_overlap: Option<bool>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let config = build_config(&cli)?;
    let result = prepare_dataset(&config).context("dataset preparation failed")?;

    match result {
        None => info!("splits written to archive"),
        Some(splits) => info!(
            train = splits.train.len(),
            val = splits.val.len(),
            test = splits.test.len(),
            "splits prepared in memory (pass --save-data to persist)"
        ),
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<PrepConfig> {
    let mut config = match &cli.config {
        Some(path) => PrepConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PrepConfig::default(),
    };

    if let Some(path) = &cli.data_file_path {
        config.data_file_path = path.clone();
    }
    if let Some(path) = &cli.ground_truth_path {
        config.ground_truth_path = path.clone();
    }
    if let Some(path) = &cli.output_path {
        config.output_path = Some(path.clone());
    }
    if let Some(values) = &cli.train_size {
        config.train_size = parse_sizes(values)?;
    }
    if let Some(val_size) = cli.val_size {
        config.val_size = val_size;
    }
    if let Some(stratified) = cli.stratified {
        config.stratified = stratified;
    }
    if let Some(background_label) = cli.background_label {
        config.background_label = background_label;
    }
    if let Some(neighborhood_size) = cli.neighborhood_size {
        config.neighborhood_size = Some(neighborhood_size);
    }
    if let Some(channels_idx) = cli.channels_idx {
        config.channels_idx = channels_idx;
    }
    if cli.save_data {
        config.save_data = true;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if cli.use_unmixing {
        config.use_unmixing = true;
    }
    if let Some(spatial_overlap) = cli.spatial_overlap {
        config.spatial_overlap = spatial_overlap;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Keep the original int-vs-float reading: values below 1 are fractions,
/// whole values are counts.
fn parse_sizes(values: &[f64]) -> Result<TrainSizeSpec> {
    let sizes = values
        .iter()
        .map(|&value| {
            if value > 0.0 && value < 1.0 {
                TrainSize::Fraction(value)
            } else {
                TrainSize::Count(value as usize)
            }
        })
        .collect();
    TrainSizeSpec::new(sizes).context("invalid train_size")
}
