//! Loader for `.npy` cube + `.npy` ground-truth pairs.
//!
//! Arrays written by other toolchains arrive with mixed dtypes, so each read
//! accepts the common storage types and normalizes: cubes and abundances to
//! `f32`, class maps to `i64`.

use std::path::Path;

use ndarray::{Array2, Array3};
use ndarray_npy::read_npy;

use super::{check_spatial_match, orient_cube, GroundTruth, SourceError};

pub(super) fn load(
    data: &Path,
    ground_truth: &Path,
    channels_idx: usize,
    use_unmixing: bool,
) -> Result<(Array3<f32>, GroundTruth), SourceError> {
    let cube = orient_cube(read_f32_cube(data)?, channels_idx)?;
    let ground_truth = if use_unmixing {
        GroundTruth::Abundances(read_abundances(ground_truth)?)
    } else {
        GroundTruth::ClassMap(read_class_map(ground_truth)?)
    };
    check_spatial_match(&cube, &ground_truth)?;
    Ok((cube, ground_truth))
}

fn read_f32_cube(path: &Path) -> Result<Array3<f32>, SourceError> {
    match read_npy::<_, Array3<f32>>(path) {
        Ok(cube) => Ok(cube),
        Err(primary) => match read_npy::<_, Array3<f64>>(path) {
            Ok(cube) => Ok(cube.mapv(|v| v as f32)),
            Err(_) => Err(SourceError::Npy(primary)),
        },
    }
}

fn read_abundances(path: &Path) -> Result<Array3<f32>, SourceError> {
    // Abundance stacks share the cube storage conventions: (classes, h, w).
    read_f32_cube(path)
}

fn read_class_map(path: &Path) -> Result<Array2<i64>, SourceError> {
    if let Ok(map) = read_npy::<_, Array2<i64>>(path) {
        return Ok(map);
    }
    if let Ok(map) = read_npy::<_, Array2<i32>>(path) {
        return Ok(map.mapv(i64::from));
    }
    if let Ok(map) = read_npy::<_, Array2<u8>>(path) {
        return Ok(map.mapv(i64::from));
    }
    // MATLAB exports frequently store integer maps as doubles.
    match read_npy::<_, Array2<f64>>(path) {
        Ok(map) => Ok(map.mapv(|v| v.round() as i64)),
        Err(err) => Err(SourceError::Npy(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use ndarray_npy::write_npy;

    #[test]
    fn loads_and_orients_npy_pair() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("data.npy");
        let gt_path = dir.path().join("gt.npy");

        // Stored (channels, height, width); loaded (height, width, channels).
        let cube = Array3::from_shape_fn((2, 3, 4), |(c, r, col)| (c * 100 + r * 10 + col) as f32);
        write_npy(&data_path, &cube).unwrap();
        write_npy(&gt_path, &Array2::<i64>::ones((3, 4))).unwrap();

        let (loaded, gt) = load(&data_path, &gt_path, 0, false).unwrap();
        assert_eq!(loaded.dim(), (3, 4, 2));
        assert_eq!(loaded[[2, 3, 1]], 123.0);
        assert!(matches!(gt, GroundTruth::ClassMap(_)));
    }

    #[test]
    fn falls_back_to_f64_cubes() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("data.npy");
        let gt_path = dir.path().join("gt.npy");

        write_npy(&data_path, &Array3::<f64>::from_elem((3, 4, 2), 0.25)).unwrap();
        write_npy(&gt_path, &Array2::<f64>::from_elem((3, 4), 2.0)).unwrap();

        let (cube, gt) = load(&data_path, &gt_path, 2, false).unwrap();
        assert_eq!(cube[[0, 0, 0]], 0.25);
        match gt {
            GroundTruth::ClassMap(map) => assert_eq!(map[[0, 0]], 2),
            other => panic!("unexpected ground truth: {:?}", other),
        }
    }

    #[test]
    fn loads_abundance_stacks_in_unmixing_mode() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("data.npy");
        let gt_path = dir.path().join("gt.npy");

        write_npy(&data_path, &Array3::<f32>::zeros((5, 5, 3))).unwrap();
        write_npy(&gt_path, &Array3::<f32>::from_elem((2, 5, 5), 0.5)).unwrap();

        let (_, gt) = load(&data_path, &gt_path, 2, true).unwrap();
        match gt {
            GroundTruth::Abundances(stack) => assert_eq!(stack.dim(), (2, 5, 5)),
            other => panic!("unexpected ground truth: {:?}", other),
        }
    }

    #[test]
    fn mismatched_grids_fail_before_splitting() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("data.npy");
        let gt_path = dir.path().join("gt.npy");

        write_npy(&data_path, &Array3::<f32>::zeros((5, 5, 3))).unwrap();
        write_npy(&gt_path, &Array2::<i64>::zeros((4, 5))).unwrap();

        let err = load(&data_path, &gt_path, 2, false).unwrap_err();
        assert!(matches!(err, SourceError::ShapeMismatch { .. }));
    }
}
