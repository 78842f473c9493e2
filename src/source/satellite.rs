//! Loader for satellite scenes: an `.npz` archive holding the cube and its
//! pixel transform, plus a `.tiff` ground-truth raster on its own grid.
//!
//! The archive stores the cube `(channels, height, width)` under `cube.npy`
//! and a 2x3 affine transform under `transform.npy` mapping cube pixel
//! coordinates `(col, row)` to raster coordinates. The raster is resampled
//! onto the cube grid with nearest-neighbor lookup; pixels that fall outside
//! the raster become `background_label`.

use std::fs::File;
use std::path::Path;

use ndarray::{Array2, Array3};
use ndarray_npy::NpzReader;
use tiff::decoder::{Decoder, DecodingResult};

use super::{GroundTruth, SourceError};

const CUBE_ENTRY: &str = "cube.npy";
const TRANSFORM_ENTRY: &str = "transform.npy";

pub(super) fn load(
    data: &Path,
    ground_truth: &Path,
    background_label: i64,
) -> Result<(Array3<f32>, GroundTruth), SourceError> {
    let (cube, transform) = read_scene_archive(data)?;
    let raster = read_tiff_map(ground_truth)?;
    let (height, width, _) = cube.dim();
    let aligned = align_ground_truth((height, width), &raster, &transform, background_label);
    Ok((cube, GroundTruth::ClassMap(aligned)))
}

fn read_scene_archive(path: &Path) -> Result<(Array3<f32>, Array2<f64>), SourceError> {
    let mut npz = NpzReader::new(File::open(path)?)?;

    let cube: Array3<f32> = match npz.by_name(CUBE_ENTRY) {
        Ok(cube) => cube,
        Err(_) => match npz.by_name::<ndarray::OwnedRepr<f64>, ndarray::Ix3>(CUBE_ENTRY) {
            Ok(cube) => cube.mapv(|v| v as f32),
            Err(err) => return Err(SourceError::Npz(err)),
        },
    };

    let transform: Array2<f64> = npz
        .by_name(TRANSFORM_ENTRY)
        .map_err(|_| SourceError::MissingEntry {
            name: TRANSFORM_ENTRY.to_string(),
        })?;
    if transform.dim() != (2, 3) {
        return Err(SourceError::InvalidLayout {
            reason: format!("transform must be 2x3, found {:?}", transform.dim()),
        });
    }

    // Satellite archives store (channels, height, width).
    Ok((super::orient_cube(cube, 0)?, transform))
}

fn read_tiff_map(path: &Path) -> Result<Array2<i64>, SourceError> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(file)?;
    let (width, height) = decoder.dimensions()?;
    let shape = (height as usize, width as usize);

    let values: Vec<i64> = match decoder.read_image()? {
        DecodingResult::U8(buf) => buf.into_iter().map(i64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(i64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(i64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(i64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(i64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(i64::from).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(|v| v.round() as i64).collect(),
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v.round() as i64).collect(),
        _ => return Err(SourceError::UnsupportedPixelFormat),
    };

    Array2::from_shape_vec(shape, values).map_err(|err| SourceError::InvalidLayout {
        reason: err.to_string(),
    })
}

/// Resample a ground-truth raster onto the cube pixel grid.
fn align_ground_truth(
    cube_shape: (usize, usize),
    raster: &Array2<i64>,
    transform: &Array2<f64>,
    background_label: i64,
) -> Array2<i64> {
    let (height, width) = cube_shape;
    let (raster_height, raster_width) = raster.dim();

    Array2::from_shape_fn((height, width), |(row, col)| {
        let x = transform[[0, 0]] * col as f64 + transform[[0, 1]] * row as f64 + transform[[0, 2]];
        let y = transform[[1, 0]] * col as f64 + transform[[1, 1]] * row as f64 + transform[[1, 2]];
        let raster_col = x.round();
        let raster_row = y.round();
        if raster_col < 0.0
            || raster_row < 0.0
            || raster_col as usize >= raster_width
            || raster_row as usize >= raster_height
        {
            background_label
        } else {
            raster[[raster_row as usize, raster_col as usize]]
        }
    })
}
