//! JSON-lines result sink

use super::traits::{OutputError, OutputResult, ResultSink};
use crate::model::FetchResult;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Appends one JSON object per result to a file
///
/// Each line is written whole under a lock, so concurrent pipelines never
/// interleave records.
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Opens `path` for appending, creating it and its parent directory
    pub fn open(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::info!("Appending results to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonlSink {
    fn store(&self, result: &FetchResult) -> OutputResult<()> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| OutputError::Write("result writer poisoned".to_string()))?;
        writer.write_all(&line)?;
        // Results are rare relative to fetch latency; keep the file current
        writer.flush()?;
        Ok(())
    }

    fn flush(&self) -> OutputResult<()> {
        self.writer
            .lock()
            .map_err(|_| OutputError::Write("result writer poisoned".to_string()))?
            .flush()?;
        Ok(())
    }
}
