//! Result sink trait and errors
//!
//! A sink is the persistence collaborator of the engine: every finished
//! `FetchResult` is handed to it once. Sinks must tolerate concurrent calls.

use crate::model::FetchResult;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receives finished results
///
/// The engine logs a failed `store` and moves on; it never retries.
pub trait ResultSink: Send + Sync {
    /// Persists one result
    fn store(&self, result: &FetchResult) -> OutputResult<()>;

    /// Flushes buffered output
    fn flush(&self) -> OutputResult<()> {
        Ok(())
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn store(&self, _result: &FetchResult) -> OutputResult<()> {
        Ok(())
    }
}
