//! Split archive persistence.
//!
//! Splits are stored as one `.npz` archive with six entries, two per split:
//! `train/data.npy`, `train/labels.npy`, `val/...`, `test/...`. Loading
//! restores the stored dimensionality: 2-D pixel features or 4-D patch
//! features, integer class labels or fractional abundance vectors.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use ndarray::{Ix1, Ix2, Ix4, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpzError, WriteNpzError};

use crate::samples::{Features, Labels};
use crate::split::{SplitData, SplitGroup, SplitName};

/// Write the three splits into a fresh `.npz` archive at `path`.
pub fn save_splits<P: AsRef<Path>>(path: P, splits: &SplitData) -> Result<(), PersistError> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut npz = NpzWriter::new(File::create(path)?);
    for name in [SplitName::Train, SplitName::Val, SplitName::Test] {
        let group = splits.group(name);
        match &group.data {
            Features::Pixels(arr) => npz.add_array(data_entry(name), arr)?,
            Features::Patches(arr) => npz.add_array(data_entry(name), arr)?,
        }
        match &group.labels {
            Labels::Classes(arr) => npz.add_array(labels_entry(name), arr)?,
            Labels::Abundances(arr) => npz.add_array(labels_entry(name), arr)?,
        }
    }
    npz.finish()?;
    Ok(())
}

/// Restore a [`SplitData`] from an archive written by [`save_splits`].
pub fn load_splits<P: AsRef<Path>>(path: P) -> Result<SplitData, PersistError> {
    let mut npz = NpzReader::new(File::open(path)?)?;
    Ok(SplitData {
        train: read_group(&mut npz, SplitName::Train)?,
        val: read_group(&mut npz, SplitName::Val)?,
        test: read_group(&mut npz, SplitName::Test)?,
    })
}

fn data_entry(name: SplitName) -> String {
    format!("{}/data.npy", name.as_str())
}

fn labels_entry(name: SplitName) -> String {
    format!("{}/labels.npy", name.as_str())
}

fn read_group<R: Read + Seek>(
    npz: &mut NpzReader<R>,
    name: SplitName,
) -> Result<SplitGroup, PersistError> {
    let data_name = data_entry(name);
    let data = match npz.by_name::<OwnedRepr<f32>, Ix2>(&data_name) {
        Ok(arr) => Features::Pixels(arr),
        Err(_) => match npz.by_name::<OwnedRepr<f32>, Ix4>(&data_name) {
            Ok(arr) => Features::Patches(arr),
            Err(_) => return Err(PersistError::InvalidArchive { entry: data_name }),
        },
    };

    let labels_name = labels_entry(name);
    let labels = match npz.by_name::<OwnedRepr<i64>, Ix1>(&labels_name) {
        Ok(arr) => Labels::Classes(arr),
        Err(_) => match npz.by_name::<OwnedRepr<f32>, Ix2>(&labels_name) {
            Ok(arr) => Labels::Abundances(arr),
            Err(_) => return Err(PersistError::InvalidArchive { entry: labels_name }),
        },
    };

    Ok(SplitGroup { data, labels })
}

#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Write(WriteNpzError),
    Read(ReadNpzError),
    /// An expected entry is missing or has an unexpected dtype/shape.
    InvalidArchive { entry: String },
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::Io(err) => write!(f, "IO error while accessing split archive: {}", err),
            PersistError::Write(err) => write!(f, "Failed to write split archive: {}", err),
            PersistError::Read(err) => write!(f, "Failed to read split archive: {}", err),
            PersistError::InvalidArchive { entry } => {
                write!(f, "Split archive entry '{}' is missing or malformed", entry)
            }
        }
    }
}

impl std::error::Error for PersistError {}

impl From<std::io::Error> for PersistError {
    fn from(value: std::io::Error) -> Self {
        PersistError::Io(value)
    }
}

impl From<WriteNpzError> for PersistError {
    fn from(value: WriteNpzError) -> Self {
        PersistError::Write(value)
    }
}

impl From<ReadNpzError> for PersistError {
    fn from(value: ReadNpzError) -> Self {
        PersistError::Read(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2, Array4};

    fn pixel_group(offset: f32, len: usize) -> SplitGroup {
        SplitGroup {
            data: Features::Pixels(Array2::from_shape_fn((len, 3), |(i, ch)| {
                offset + (i * 3 + ch) as f32
            })),
            labels: Labels::Classes(Array1::from_iter((0..len).map(|i| i as i64 % 4))),
        }
    }

    #[test]
    fn pixel_splits_round_trip_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splits.npz");

        let splits = SplitData {
            train: pixel_group(0.0, 8),
            val: pixel_group(100.0, 2),
            test: pixel_group(200.0, 4),
        };
        save_splits(&path, &splits).unwrap();
        let restored = load_splits(&path).unwrap();

        for name in [SplitName::Train, SplitName::Val, SplitName::Test] {
            let (before, after) = (splits.group(name), restored.group(name));
            match (&before.data, &after.data) {
                (Features::Pixels(a), Features::Pixels(b)) => assert_eq!(a, b),
                other => panic!("dimensionality changed: {:?}", other),
            }
            match (&before.labels, &after.labels) {
                (Labels::Classes(a), Labels::Classes(b)) => assert_eq!(a, b),
                other => panic!("label kind changed: {:?}", other),
            }
        }
    }

    #[test]
    fn patch_and_abundance_splits_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splits.npz");

        let group = |len: usize| SplitGroup {
            data: Features::Patches(Array4::from_shape_fn((len, 3, 3, 2), |(i, r, c, ch)| {
                (i * 100 + r * 10 + c + ch) as f32 * 0.5
            })),
            labels: Labels::Abundances(Array2::from_shape_fn((len, 3), |(i, class)| {
                if class == i % 3 {
                    1.0
                } else {
                    0.0
                }
            })),
        };
        let splits = SplitData {
            train: group(6),
            val: group(2),
            test: group(3),
        };
        save_splits(&path, &splits).unwrap();
        let restored = load_splits(&path).unwrap();

        match (&splits.train.data, &restored.train.data) {
            (Features::Patches(a), Features::Patches(b)) => assert_eq!(a, b),
            other => panic!("dimensionality changed: {:?}", other),
        }
        match (&splits.test.labels, &restored.test.labels) {
            (Labels::Abundances(a), Labels::Abundances(b)) => assert_eq!(a, b),
            other => panic!("label kind changed: {:?}", other),
        }
    }

    #[test]
    fn malformed_archives_name_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.npz");

        // Archive with only a train group.
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        let group = pixel_group(0.0, 4);
        match &group.data {
            Features::Pixels(arr) => npz.add_array("train/data.npy", arr).unwrap(),
            _ => unreachable!(),
        }
        match &group.labels {
            Labels::Classes(arr) => npz.add_array("train/labels.npy", arr).unwrap(),
            _ => unreachable!(),
        }
        npz.finish().unwrap();

        let err = load_splits(&path).unwrap_err();
        assert!(matches!(err, PersistError::InvalidArchive { .. }));
    }
}
