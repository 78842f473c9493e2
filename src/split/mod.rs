//! Deterministic train/val/test splitting.
//!
//! All random selection is driven by one seeded generator: same seed + same
//! inputs produce identical splits. Stratified mode draws independently per
//! class (unmixing samples are bucketed by dominant abundance class);
//! non-stratified mode draws uniformly over the whole set. The validation
//! set is always carved from the train selection, never from the remaining
//! pool.
//!
//! With `spatial_overlap` disabled and a neighborhood configured, whole
//! `k x k` blocks of the pixel grid are assigned to one split each, so
//! patches from different splits never share a block. Partial blocks at the
//! right/bottom edges are kept and assigned whole to a single split.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::{TrainSize, TrainSizeSpec};
use crate::samples::{Features, Labels, SampleSet};

/// Names of the three output partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitName {
    Train,
    Val,
    Test,
}

impl SplitName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitName::Train => "train",
            SplitName::Val => "val",
            SplitName::Test => "test",
        }
    }
}

/// One partition: parallel feature and label arrays.
#[derive(Debug, Clone)]
pub struct SplitGroup {
    pub data: Features,
    pub labels: Labels,
}

impl SplitGroup {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The three partitions produced by one split run.
#[derive(Debug, Clone)]
pub struct SplitData {
    pub train: SplitGroup,
    pub val: SplitGroup,
    pub test: SplitGroup,
}

impl SplitData {
    pub fn group(&self, name: SplitName) -> &SplitGroup {
        match name {
            SplitName::Train => &self.train,
            SplitName::Val => &self.val,
            SplitName::Test => &self.test,
        }
    }

    /// Total number of samples across the three partitions.
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Knobs controlling one split run.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub train_size: TrainSizeSpec,
    /// Fraction of the train selection carved out as validation.
    pub val_size: f64,
    pub stratified: bool,
    pub seed: u64,
    /// When `false` and a neighborhood is set, assign whole spatial blocks.
    pub spatial_overlap: bool,
    pub neighborhood_size: Option<usize>,
}

/// Partition a sample set into train, val and test.
pub fn train_val_test_split(
    set: &SampleSet,
    options: &SplitOptions,
) -> Result<SplitData, SplitError> {
    if set.is_empty() {
        return Err(SplitError::EmptySampleSet);
    }

    let (train, val, test) = match (options.spatial_overlap, options.neighborhood_size) {
        (false, Some(k)) => {
            if options.stratified {
                tracing::warn!(
                    "whole-block assignment cannot honor per-class proportions; \
                     ignoring the stratified flag"
                );
            }
            partition_blocks(set, options, k)?
        }
        _ if options.stratified => partition_stratified(set, options)?,
        _ => partition_uniform(set, options)?,
    };

    Ok(SplitData {
        train: materialize(set, &train),
        val: materialize(set, &val),
        test: materialize(set, &test),
    })
}

fn materialize(set: &SampleSet, indices: &[usize]) -> SplitGroup {
    SplitGroup {
        data: set.features.select(indices),
        labels: set.labels.select(indices),
    }
}

type Partition = (Vec<usize>, Vec<usize>, Vec<usize>);

fn partition_stratified(set: &SampleSet, options: &SplitOptions) -> Result<Partition, SplitError> {
    let num_classes = set.labels.num_classes();
    let sizes = resolve_per_class(&options.train_size, num_classes)?;

    let mut buckets: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..set.len() {
        buckets.entry(set.labels.class_of(i)).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut train = Vec::new();
    let mut val = Vec::new();
    let mut test = Vec::new();

    for (class, indices) in buckets.iter_mut() {
        indices.shuffle(&mut rng);
        let n_train = requested_count(sizes[*class], indices.len(), Some(*class))?;
        let n_val = carve_val(n_train, options.val_size, Some(*class))?;

        val.extend_from_slice(&indices[..n_val]);
        train.extend_from_slice(&indices[n_val..n_train]);
        test.extend_from_slice(&indices[n_train..]);
    }

    Ok((train, val, test))
}

fn partition_uniform(set: &SampleSet, options: &SplitOptions) -> Result<Partition, SplitError> {
    let size = single_size(&options.train_size, "non-stratified sampling")?;

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut indices: Vec<usize> = (0..set.len()).collect();
    indices.shuffle(&mut rng);

    let n_train = requested_count(size, indices.len(), None)?;
    let n_val = carve_val(n_train, options.val_size, None)?;

    Ok((
        indices[n_val..n_train].to_vec(),
        indices[..n_val].to_vec(),
        indices[n_train..].to_vec(),
    ))
}

fn partition_blocks(
    set: &SampleSet,
    options: &SplitOptions,
    neighborhood: usize,
) -> Result<Partition, SplitError> {
    let size = single_size(&options.train_size, "spatial block assignment")?;

    let blocks_per_row = (set.grid.width + neighborhood - 1) / neighborhood;
    let mut by_block: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, [row, col]) in set.coords.iter().copied().enumerate() {
        let block = (row / neighborhood) * blocks_per_row + col / neighborhood;
        by_block.entry(block).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut block_ids: Vec<usize> = by_block.keys().copied().collect();
    block_ids.shuffle(&mut rng);

    let target_train = requested_count(size, set.len(), None)?;

    // Whole blocks go to train until the requested volume is reached; sizes
    // are approximate at block granularity.
    let mut selected = Vec::new();
    let mut rest = Vec::new();
    let mut selected_count = 0;
    for id in block_ids {
        if selected_count < target_train {
            selected_count += by_block[&id].len();
            selected.push(id);
        } else {
            rest.push(id);
        }
    }

    let target_val = (options.val_size * selected_count as f64).round() as usize;
    if options.val_size > 0.0 && target_val == 0 {
        return Err(SplitError::ZeroAllocation {
            class: None,
            split: "val",
        });
    }

    let mut train_blocks = Vec::new();
    let mut val_blocks = Vec::new();
    let mut val_count = 0;
    for id in selected {
        if val_count < target_val {
            val_count += by_block[&id].len();
            val_blocks.push(id);
        } else {
            train_blocks.push(id);
        }
    }
    if train_blocks.is_empty() {
        return Err(SplitError::ZeroAllocation {
            class: None,
            split: "train",
        });
    }

    let collect = |blocks: &[usize]| -> Vec<usize> {
        blocks
            .iter()
            .flat_map(|id| by_block[id].iter().copied())
            .collect()
    };

    Ok((collect(&train_blocks), collect(&val_blocks), collect(&rest)))
}

/// Resolve a requested size against the available sample count.
fn requested_count(
    size: TrainSize,
    available: usize,
    class: Option<usize>,
) -> Result<usize, SplitError> {
    let count = match size {
        TrainSize::Fraction(fraction) => {
            if !(fraction > 0.0 && fraction < 1.0) {
                return Err(SplitError::InvalidSize {
                    reason: format!("fraction {} outside (0, 1)", fraction),
                });
            }
            (fraction * available as f64).round() as usize
        }
        TrainSize::Count(count) => {
            if count > available {
                return Err(SplitError::InsufficientSamples {
                    class,
                    requested: count,
                    available,
                });
            }
            count
        }
    };
    if count == 0 && available > 0 {
        return Err(SplitError::ZeroAllocation {
            class,
            split: "train",
        });
    }
    Ok(count)
}

/// Number of validation samples carved out of a train allocation.
fn carve_val(n_train: usize, val_size: f64, class: Option<usize>) -> Result<usize, SplitError> {
    if val_size == 0.0 {
        return Ok(0);
    }
    let n_val = (val_size * n_train as f64).round() as usize;
    if n_val == 0 {
        return Err(SplitError::ZeroAllocation { class, split: "val" });
    }
    if n_val >= n_train {
        return Err(SplitError::ZeroAllocation {
            class,
            split: "train",
        });
    }
    Ok(n_val)
}

fn resolve_per_class(
    spec: &TrainSizeSpec,
    num_classes: usize,
) -> Result<Vec<TrainSize>, SplitError> {
    let sizes = spec.sizes();
    if sizes.len() == 1 {
        Ok(vec![sizes[0]; num_classes])
    } else if sizes.len() == num_classes {
        Ok(sizes.to_vec())
    } else {
        Err(SplitError::SizeListMismatch {
            expected: num_classes,
            got: sizes.len(),
        })
    }
}

fn single_size(spec: &TrainSizeSpec, context: &'static str) -> Result<TrainSize, SplitError> {
    if spec.len() == 1 {
        Ok(spec.sizes()[0])
    } else {
        Err(SplitError::PerClassSizeUnsupported { context })
    }
}

#[derive(Debug)]
pub enum SplitError {
    /// No samples survived extraction and filtering.
    EmptySampleSet,
    /// The requested sizes leave a split with zero samples of a class that
    /// has at least one instance.
    ZeroAllocation {
        class: Option<usize>,
        split: &'static str,
    },
    /// An absolute count exceeds the available samples.
    InsufficientSamples {
        class: Option<usize>,
        requested: usize,
        available: usize,
    },
    /// The per-class size list does not match the class count.
    SizeListMismatch { expected: usize, got: usize },
    /// A per-class size list was supplied where only a single value works.
    PerClassSizeUnsupported { context: &'static str },
    /// A size value is outside its valid range.
    InvalidSize { reason: String },
}

impl std::fmt::Display for SplitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitError::EmptySampleSet => write!(f, "No samples available to split"),
            SplitError::ZeroAllocation { class, split } => match class {
                Some(class) => write!(
                    f,
                    "Requested sizes leave class {} with zero {} samples",
                    class, split
                ),
                None => write!(f, "Requested sizes leave zero {} samples", split),
            },
            SplitError::InsufficientSamples {
                class,
                requested,
                available,
            } => match class {
                Some(class) => write!(
                    f,
                    "Class {} has {} samples, {} requested",
                    class, available, requested
                ),
                None => write!(f, "{} samples available, {} requested", available, requested),
            },
            SplitError::SizeListMismatch { expected, got } => write!(
                f,
                "Per-class train_size list has {} entries, expected {}",
                got, expected
            ),
            SplitError::PerClassSizeUnsupported { context } => {
                write!(f, "Per-class train_size list is not supported with {}", context)
            }
            SplitError::InvalidSize { reason } => write!(f, "Invalid size: {}", reason),
        }
    }
}

impl std::error::Error for SplitError {}
