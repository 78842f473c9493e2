use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::split::SplitData;

fn log_dir() -> io::Result<()> {
    fs::create_dir_all("logs")
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

#[derive(Debug, Serialize)]
pub struct RunLogEntry {
    pub timestamp_ms: u128,
    pub data_file: String,
    pub ground_truth_file: String,
    pub samples_extracted: usize,
    pub samples_after_filter: usize,
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl RunLogEntry {
    pub fn new(
        data_file: &Path,
        ground_truth_file: &Path,
        samples_extracted: usize,
        samples_after_filter: usize,
        splits: &SplitData,
    ) -> Self {
        Self {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
            data_file: data_file.display().to_string(),
            ground_truth_file: ground_truth_file.display().to_string(),
            samples_extracted,
            samples_after_filter,
            train: splits.train.len(),
            val: splits.val.len(),
            test: splits.test.len(),
        }
    }
}

pub fn log_run(entry: &RunLogEntry) -> io::Result<()> {
    log_dir()?;
    append_json_line("logs/prepare.jsonl", entry)
}
