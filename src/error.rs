//! Typed scan errors and the failed-scan record.
//!
//! Recoverable kinds (parse, history, cache) never cross the engine boundary
//! as errors; they degrade into [`crate::models::ScanWarning`] entries on the
//! report. Fatal kinds (input, internal, deadline, cancelled) abort the scan
//! and are recorded as a [`FailedScan`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while running a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan root is missing, unreadable, or not a directory.
    #[error("unusable scan root {path:?}: {message}")]
    Input { path: PathBuf, message: String },

    /// A file could not be fully parsed. Recoverable; the offending region
    /// is skipped and the scan continues.
    #[error("parse error in {path} at byte {offset}")]
    Parse { path: String, offset: usize },

    /// Version-control history is unavailable for a path. Recoverable;
    /// evidence degrades to all-zero.
    #[error("history unavailable for {path}: {message}")]
    History { path: String, message: String },

    /// Cache I/O failed. Recoverable; the producer recomputes from inputs.
    #[error("cache failure: {0}")]
    Cache(String),

    /// An engine invariant was violated. Fatal.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// The scan exceeded its time budget. Fatal to the scan.
    #[error("deadline exceeded after {elapsed_secs}s during stage '{stage}'")]
    Deadline { stage: &'static str, elapsed_secs: u64 },

    /// The scan was cancelled by the caller. Fatal to the scan.
    #[error("scan cancelled during stage '{stage}'")]
    Cancelled { stage: &'static str },
}

impl ScanError {
    /// Whether this error may be absorbed into the report's warning list
    /// instead of aborting the scan.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScanError::Parse { .. } | ScanError::History { .. } | ScanError::Cache(_)
        )
    }
}

/// Record of a scan that did not produce a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedScan {
    pub scan_id: String,
    /// Human-readable reason, including the stage for deadline failures.
    pub reason: String,
}
