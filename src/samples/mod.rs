//! Sample extraction: cube + ground truth to a flat, filtered sample set.
//!
//! Two extraction modes exist. Pixel mode turns every pixel into one sample
//! whose feature vector is the channel vector at that pixel. Patch mode
//! (odd window side `k`) turns every pixel whose full `k x k` window fits
//! inside the image into one sample; edge pixels without a full window are
//! cropped, never padded. The label of a patch is the label of its center
//! pixel. Each sample keeps its source pixel coordinate so the splitter can
//! reason about spatial blocks.

use std::collections::BTreeSet;

use ndarray::{s, Array1, Array2, Array3, Array4, Axis};

use crate::source::GroundTruth;

/// Spatial extent of the source pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub height: usize,
    pub width: usize,
}

/// Sample features: one channel vector per pixel, or one spatial patch.
#[derive(Debug, Clone)]
pub enum Features {
    /// `(samples, channels)` pixel vectors.
    Pixels(Array2<f32>),
    /// `(samples, k, k, channels)` neighborhood patches.
    Patches(Array4<f32>),
}

impl Features {
    pub fn len(&self) -> usize {
        match self {
            Features::Pixels(arr) => arr.dim().0,
            Features::Patches(arr) => arr.dim().0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather the rows named by `indices` into a new feature array.
    pub fn select(&self, indices: &[usize]) -> Features {
        match self {
            Features::Pixels(arr) => Features::Pixels(arr.select(Axis(0), indices)),
            Features::Patches(arr) => Features::Patches(arr.select(Axis(0), indices)),
        }
    }

    /// Whether the feature vector of sample `index` contains NaN.
    fn has_nan(&self, index: usize) -> bool {
        match self {
            Features::Pixels(arr) => arr.row(index).iter().any(|v| v.is_nan()),
            Features::Patches(arr) => arr.index_axis(Axis(0), index).iter().any(|v| v.is_nan()),
        }
    }
}

/// Sample supervision: one class index, or one abundance vector per sample.
#[derive(Debug, Clone)]
pub enum Labels {
    /// `(samples,)` integer class indices.
    Classes(Array1<i64>),
    /// `(samples, classes)` fractional abundance vectors, rows summing to ~1.
    Abundances(Array2<f32>),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Classes(arr) => arr.len(),
            Labels::Abundances(arr) => arr.dim().0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather the rows named by `indices` into a new label array.
    pub fn select(&self, indices: &[usize]) -> Labels {
        match self {
            Labels::Classes(arr) => Labels::Classes(arr.select(Axis(0), indices)),
            Labels::Abundances(arr) => Labels::Abundances(arr.select(Axis(0), indices)),
        }
    }

    /// Number of distinct classes the labels can express.
    pub fn num_classes(&self) -> usize {
        match self {
            Labels::Classes(arr) => arr
                .iter()
                .copied()
                .max()
                .map(|max| (max + 1).max(0) as usize)
                .unwrap_or(0),
            Labels::Abundances(arr) => arr.dim().1,
        }
    }

    /// Class bucket of sample `index`: the label itself, or the dominant
    /// abundance class.
    pub fn class_of(&self, index: usize) -> usize {
        match self {
            Labels::Classes(arr) => arr[index].max(0) as usize,
            Labels::Abundances(arr) => arr
                .row(index)
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(class, _)| class)
                .unwrap_or(0),
        }
    }

    fn has_nan(&self, index: usize) -> bool {
        match self {
            Labels::Classes(_) => false,
            Labels::Abundances(arr) => arr.row(index).iter().any(|v| v.is_nan()),
        }
    }
}

/// A flat list of (sample, label) pairs with their source coordinates.
#[derive(Debug, Clone)]
pub struct SampleSet {
    pub features: Features,
    pub labels: Labels,
    /// `(row, col)` source pixel of each sample, parallel to the arrays.
    pub coords: Vec<[usize; 2]>,
    pub grid: GridShape,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Gather the samples named by `indices` into a new set.
    pub fn select(&self, indices: &[usize]) -> SampleSet {
        SampleSet {
            features: self.features.select(indices),
            labels: self.labels.select(indices),
            coords: indices.iter().map(|&i| self.coords[i]).collect(),
            grid: self.grid,
        }
    }
}

/// Convert a cube and its ground truth into a flat sample set.
///
/// `neighborhood` of `None` extracts pixel samples; `Some(k)` (odd `k >= 1`)
/// extracts `k x k` patches around every interior pixel.
pub fn extract_samples(
    cube: &Array3<f32>,
    ground_truth: &GroundTruth,
    neighborhood: Option<usize>,
) -> Result<SampleSet, SampleError> {
    let (height, width, _) = cube.dim();
    let grid = GridShape { height, width };
    match neighborhood {
        None => extract_pixel_samples(cube, ground_truth, grid),
        Some(k) => extract_patch_samples(cube, ground_truth, grid, k),
    }
}

fn extract_pixel_samples(
    cube: &Array3<f32>,
    ground_truth: &GroundTruth,
    grid: GridShape,
) -> Result<SampleSet, SampleError> {
    let (height, width, channels) = cube.dim();
    let count = height * width;

    let features = cube
        .to_owned()
        .into_shape((count, channels))
        .map_err(|err| SampleError::Layout(err.to_string()))?;

    let labels = flatten_ground_truth(ground_truth, grid)?;
    let coords = grid_coords(0, height, 0, width);

    Ok(SampleSet {
        features: Features::Pixels(features),
        labels,
        coords,
        grid,
    })
}

fn extract_patch_samples(
    cube: &Array3<f32>,
    ground_truth: &GroundTruth,
    grid: GridShape,
    neighborhood: usize,
) -> Result<SampleSet, SampleError> {
    if neighborhood == 0 || neighborhood % 2 == 0 {
        return Err(SampleError::InvalidNeighborhood { size: neighborhood });
    }
    let (height, width, channels) = cube.dim();
    if neighborhood > height || neighborhood > width {
        return Err(SampleError::InvalidNeighborhood { size: neighborhood });
    }

    let margin = neighborhood / 2;
    let rows = height - neighborhood + 1;
    let cols = width - neighborhood + 1;
    let count = rows * cols;

    let mut patches = Array4::zeros((count, neighborhood, neighborhood, channels));
    for (i, window) in cube
        .windows((neighborhood, neighborhood, channels))
        .into_iter()
        .enumerate()
    {
        patches.slice_mut(s![i, .., .., ..]).assign(&window);
    }

    let coords = grid_coords(margin, height - margin, margin, width - margin);
    let labels = center_labels(ground_truth, &coords)?;

    Ok(SampleSet {
        features: Features::Patches(patches),
        labels,
        coords,
        grid,
    })
}

fn grid_coords(
    row_start: usize,
    row_end: usize,
    col_start: usize,
    col_end: usize,
) -> Vec<[usize; 2]> {
    let mut coords = Vec::with_capacity((row_end - row_start) * (col_end - col_start));
    for row in row_start..row_end {
        for col in col_start..col_end {
            coords.push([row, col]);
        }
    }
    coords
}

fn flatten_ground_truth(
    ground_truth: &GroundTruth,
    grid: GridShape,
) -> Result<Labels, SampleError> {
    let count = grid.height * grid.width;
    match ground_truth {
        GroundTruth::ClassMap(map) => {
            let flat = map
                .to_owned()
                .into_shape(count)
                .map_err(|err| SampleError::Layout(err.to_string()))?;
            Ok(Labels::Classes(flat))
        }
        GroundTruth::Abundances(stack) => {
            let classes = stack.dim().0;
            let per_pixel = stack
                .to_owned()
                .permuted_axes([1, 2, 0])
                .as_standard_layout()
                .into_owned()
                .into_shape((count, classes))
                .map_err(|err| SampleError::Layout(err.to_string()))?;
            Ok(Labels::Abundances(per_pixel))
        }
    }
}

fn center_labels(
    ground_truth: &GroundTruth,
    coords: &[[usize; 2]],
) -> Result<Labels, SampleError> {
    match ground_truth {
        GroundTruth::ClassMap(map) => {
            let values = coords.iter().map(|&[r, c]| map[[r, c]]).collect();
            Ok(Labels::Classes(Array1::from_vec(values)))
        }
        GroundTruth::Abundances(stack) => {
            let classes = stack.dim().0;
            let mut per_sample = Array2::zeros((coords.len(), classes));
            for (i, &[r, c]) in coords.iter().enumerate() {
                for class in 0..classes {
                    per_sample[[i, class]] = stack[[class, r, c]];
                }
            }
            Ok(Labels::Abundances(per_sample))
        }
    }
}

/// Apply the post-extraction filters in order: drop NaN samples, then (in
/// classification mode) drop background samples and remap the surviving
/// labels to a dense `0..C-1` range preserving relative order.
///
/// A class present before filtering that ends with zero samples is a fatal
/// error naming the class.
pub fn filter_samples(
    set: SampleSet,
    use_unmixing: bool,
    background_label: i64,
) -> Result<SampleSet, SampleError> {
    let classes_before = match (&set.labels, use_unmixing) {
        (Labels::Classes(labels), false) => labels
            .iter()
            .copied()
            .filter(|&label| label != background_label)
            .collect::<BTreeSet<i64>>(),
        _ => BTreeSet::new(),
    };

    let keep: Vec<usize> = (0..set.len())
        .filter(|&i| !set.features.has_nan(i) && !set.labels.has_nan(i))
        .filter(|&i| {
            use_unmixing
                || match &set.labels {
                    Labels::Classes(labels) => labels[i] != background_label,
                    Labels::Abundances(_) => true,
                }
        })
        .collect();

    let mut filtered = set.select(&keep);

    if !use_unmixing {
        if let Labels::Classes(labels) = &mut filtered.labels {
            let classes_after: BTreeSet<i64> = labels.iter().copied().collect();
            if let Some(&missing) = classes_before.difference(&classes_after).next() {
                return Err(SampleError::EmptyClass { class: missing });
            }
            remap_dense(labels, &classes_after);
        }
    }

    Ok(filtered)
}

/// Remap class values to `0..C-1`, preserving relative order.
fn remap_dense(labels: &mut Array1<i64>, present: &BTreeSet<i64>) {
    let mapping: std::collections::BTreeMap<i64, i64> = present
        .iter()
        .enumerate()
        .map(|(dense, &raw)| (raw, dense as i64))
        .collect();
    labels.mapv_inplace(|raw| mapping[&raw]);
}

#[derive(Debug)]
pub enum SampleError {
    /// The neighborhood size is even, zero, or larger than the image.
    InvalidNeighborhood { size: usize },
    /// A class present before filtering was reduced to zero samples.
    EmptyClass { class: i64 },
    /// The cube or ground truth could not be reshaped into samples.
    Layout(String),
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::InvalidNeighborhood { size } => write!(
                f,
                "Neighborhood size {} is invalid: must be odd, positive and fit the image",
                size
            ),
            SampleError::EmptyClass { class } => write!(
                f,
                "Class {} has no samples left after filtering",
                class
            ),
            SampleError::Layout(reason) => write!(f, "Sample layout error: {}", reason),
        }
    }
}

impl std::error::Error for SampleError {}
