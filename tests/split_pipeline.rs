//! End-to-end pipeline tests: extraction, splitting, persistence and the
//! documented error paths, driven through `prepare_dataset` on real files.

use ndarray::{Array2, Array3};
use ndarray_npy::write_npy;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use hyperprep::{
    load_splits, prepare_dataset, Features, Labels, PrepConfig, PrepError, SplitData, SplitName,
    TrainSizeSpec,
};

/// Random cube with a deterministic seed, `(height, width, channels)`.
fn random_cube(height: usize, width: usize, channels: usize, seed: u64) -> Array3<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_fn((height, width, channels), |_| rng.gen::<f32>())
}

/// One-hot abundance stack `(classes, height, width)` with pixel (r, c)
/// dominated by class `(r * width + c) % classes`.
fn cyclic_abundances(classes: usize, height: usize, width: usize) -> Array3<f32> {
    Array3::from_shape_fn((classes, height, width), |(class, r, c)| {
        if class == (r * width + c) % classes {
            1.0
        } else {
            0.0
        }
    })
}

fn write_pair(
    dir: &std::path::Path,
    cube: &Array3<f32>,
    gt_classes: Option<&Array2<i64>>,
    gt_abundances: Option<&Array3<f32>>,
) -> (std::path::PathBuf, std::path::PathBuf) {
    let data_path = dir.join("data.npy");
    let gt_path = dir.join("gt.npy");
    write_npy(&data_path, cube).unwrap();
    if let Some(map) = gt_classes {
        write_npy(&gt_path, map).unwrap();
    }
    if let Some(stack) = gt_abundances {
        write_npy(&gt_path, stack).unwrap();
    }
    (data_path, gt_path)
}

fn group_sizes(splits: &SplitData) -> (usize, usize, usize) {
    (splits.train.len(), splits.val.len(), splits.test.len())
}

#[test]
fn samson_style_unmixing_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let cube = random_cube(95, 95, 4, 7);
    let abundances = cyclic_abundances(3, 95, 95);
    let (data_path, gt_path) = write_pair(dir.path(), &cube, None, Some(&abundances));

    let config = PrepConfig {
        data_file_path: data_path,
        ground_truth_path: gt_path,
        train_size: TrainSizeSpec::fraction(0.8),
        val_size: 0.1,
        stratified: true,
        seed: 0,
        use_unmixing: true,
        ..Default::default()
    };
    let splits = prepare_dataset(&config).unwrap().unwrap();

    let (train, val, test) = group_sizes(&splits);
    let total = 95 * 95;
    assert_eq!(train + val + test, total);
    assert!(train > 0 && val > 0 && test > 0);

    // Train keeps ~0.8 * 0.9 and val ~0.8 * 0.1 of the eligible pixels,
    // up to one rounded sample per class.
    let expected_train = 0.8 * 0.9 * total as f64;
    let expected_val = 0.8 * 0.1 * total as f64;
    assert!((train as f64 - expected_train).abs() <= 3.0);
    assert!((val as f64 - expected_val).abs() <= 3.0);

    // Abundance labels survive as vectors over three classes.
    match &splits.train.labels {
        Labels::Abundances(arr) => assert_eq!(arr.dim().1, 3),
        other => panic!("unexpected labels: {:?}", other),
    }
}

#[test]
fn pipeline_is_deterministic_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let cube = random_cube(20, 20, 3, 11);
    let map = Array2::from_shape_fn((20, 20), |(r, c)| ((r + c) % 4) as i64);
    let (data_path, gt_path) = write_pair(dir.path(), &cube, Some(&map), None);

    let config = PrepConfig {
        data_file_path: data_path,
        ground_truth_path: gt_path,
        background_label: 0,
        seed: 21,
        ..Default::default()
    };

    let first = prepare_dataset(&config).unwrap().unwrap();
    let second = prepare_dataset(&config).unwrap().unwrap();

    for name in [SplitName::Train, SplitName::Val, SplitName::Test] {
        match (&first.group(name).data, &second.group(name).data) {
            (Features::Pixels(a), Features::Pixels(b)) => assert_eq!(a, b),
            other => panic!("dimensionality changed: {:?}", other),
        }
        match (&first.group(name).labels, &second.group(name).labels) {
            (Labels::Classes(a), Labels::Classes(b)) => assert_eq!(a, b),
            other => panic!("label kind changed: {:?}", other),
        }
    }
}

#[test]
fn background_and_nan_reduce_the_sample_count_observably() {
    let dir = tempfile::tempdir().unwrap();
    let mut cube = random_cube(10, 10, 3, 5);
    cube[[0, 0, 1]] = f32::NAN;
    cube[[3, 4, 0]] = f32::NAN;
    // Background on the last row, labels 1 and 2 elsewhere.
    let map = Array2::from_shape_fn((10, 10), |(r, c)| {
        if r == 9 {
            0
        } else {
            1 + ((r + c) % 2) as i64
        }
    });
    let (data_path, gt_path) = write_pair(dir.path(), &cube, Some(&map), None);

    let config = PrepConfig {
        data_file_path: data_path,
        ground_truth_path: gt_path,
        val_size: 0.0,
        seed: 1,
        ..Default::default()
    };
    let splits = prepare_dataset(&config).unwrap().unwrap();

    // 100 pixels minus 10 background minus 2 NaN.
    let (train, val, test) = group_sizes(&splits);
    assert_eq!(train + val + test, 88);

    // Labels were remapped dense after background removal.
    match &splits.train.labels {
        Labels::Classes(arr) => {
            assert!(arr.iter().all(|&label| label == 0 || label == 1));
        }
        other => panic!("unexpected labels: {:?}", other),
    }
}

#[test]
fn patch_mode_respects_spatial_blocks() {
    let dir = tempfile::tempdir().unwrap();
    // Channel 0 stores the row, channel 1 the column, so patch centers can
    // be recovered from the persisted features.
    let cube = Array3::from_shape_fn((21, 21, 2), |(r, c, ch)| {
        if ch == 0 {
            r as f32
        } else {
            c as f32
        }
    });
    let map = Array2::<i64>::ones((21, 21));
    let (data_path, gt_path) = write_pair(dir.path(), &cube, Some(&map), None);

    let config = PrepConfig {
        data_file_path: data_path,
        ground_truth_path: gt_path,
        neighborhood_size: Some(5),
        spatial_overlap: false,
        stratified: false,
        train_size: TrainSizeSpec::fraction(0.6),
        val_size: 0.1,
        seed: 4,
        ..Default::default()
    };
    let splits = prepare_dataset(&config).unwrap().unwrap();

    // 17x17 interior centers survive the window crop.
    let (train, val, test) = group_sizes(&splits);
    assert_eq!(train + val + test, 17 * 17);

    // Each 5x5 block of the pixel grid must belong to exactly one split.
    let blocks_per_row = (21 + 4) / 5;
    let mut owner = std::collections::BTreeMap::new();
    for name in [SplitName::Train, SplitName::Val, SplitName::Test] {
        let patches = match &splits.group(name).data {
            Features::Patches(arr) => arr,
            other => panic!("expected patches: {:?}", other),
        };
        for i in 0..patches.dim().0 {
            let row = patches[[i, 2, 2, 0]] as usize;
            let col = patches[[i, 2, 2, 1]] as usize;
            let block = (row / 5) * blocks_per_row + col / 5;
            let previous = owner.insert(block, name);
            assert!(
                previous.is_none() || previous == Some(name),
                "block {} crosses splits",
                block
            );
        }
    }
}

#[test]
fn saved_archives_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let cube = random_cube(12, 12, 3, 2);
    let map = Array2::from_shape_fn((12, 12), |(r, _)| 1 + (r % 3) as i64);
    let (data_path, gt_path) = write_pair(dir.path(), &cube, Some(&map), None);
    let archive = dir.path().join("out").join("splits.npz");

    let config = PrepConfig {
        data_file_path: data_path,
        ground_truth_path: gt_path,
        output_path: Some(archive.clone()),
        save_data: true,
        seed: 3,
        ..Default::default()
    };
    assert!(prepare_dataset(&config).unwrap().is_none());

    // A second run with identical inputs returns the same splits in memory.
    let in_memory = prepare_dataset(&PrepConfig {
        save_data: false,
        ..config
    })
    .unwrap()
    .unwrap();
    let restored = load_splits(&archive).unwrap();

    for name in [SplitName::Train, SplitName::Val, SplitName::Test] {
        match (&restored.group(name).data, &in_memory.group(name).data) {
            (Features::Pixels(a), Features::Pixels(b)) => assert_eq!(a, b),
            other => panic!("dimensionality changed: {:?}", other),
        }
        match (&restored.group(name).labels, &in_memory.group(name).labels) {
            (Labels::Classes(a), Labels::Classes(b)) => assert_eq!(a, b),
            other => panic!("label kind changed: {:?}", other),
        }
    }
}

#[test]
fn unsupported_extension_fails_fast() {
    let config = PrepConfig {
        data_file_path: "data.mat".into(),
        ground_truth_path: "gt.npy".into(),
        ..Default::default()
    };
    let err = prepare_dataset(&config).unwrap_err();
    match err {
        PrepError::Source(source_err) => {
            assert!(source_err.to_string().contains(".mat"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn shape_mismatch_fails_before_splitting() {
    let dir = tempfile::tempdir().unwrap();
    let cube = random_cube(8, 8, 2, 0);
    let map = Array2::<i64>::ones((8, 9));
    let (data_path, gt_path) = write_pair(dir.path(), &cube, Some(&map), None);

    let config = PrepConfig {
        data_file_path: data_path,
        ground_truth_path: gt_path,
        ..Default::default()
    };
    let err = prepare_dataset(&config).unwrap_err();
    assert!(matches!(err, PrepError::Source(_)));
}

#[test]
fn class_starved_by_sizes_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let cube = random_cube(10, 10, 2, 9);
    // Class 2 exists in exactly one pixel.
    let mut map = Array2::<i64>::ones((10, 10));
    map[[5, 5]] = 2;
    let (data_path, gt_path) = write_pair(dir.path(), &cube, Some(&map), None);

    let config = PrepConfig {
        data_file_path: data_path,
        ground_truth_path: gt_path,
        train_size: TrainSizeSpec::fraction(0.1),
        val_size: 0.0,
        ..Default::default()
    };
    let err = prepare_dataset(&config).unwrap_err();
    assert!(matches!(err, PrepError::Split(_)));
}
