//! Document error types.
//!
//! Only fatal conditions surface as errors: an unreadable or unrecognized
//! top-level file, a cancelled load, or a failed save. Everything recoverable
//! is recorded in the [`Ledger`](bis_model::Ledger) instead.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal document operation error.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The top-level file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The top-level file is not an LDraw document.
    #[error("unrecognized LDraw document {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// The load was cancelled; the partially parsed document was discarded.
    #[error("loading {path} was cancelled")]
    Cancelled { path: PathBuf },

    /// The background parse task panicked.
    #[error("loading {path} failed unexpectedly")]
    TaskFailed { path: PathBuf },

    /// File I/O error while saving.
    #[error("failed to {operation} file: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Atomic write failed (temp file couldn't be renamed).
    #[error("failed to complete save of {target_path}")]
    AtomicWriteFailed {
        temp_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No submodel of that name is registered.
    #[error("unknown submodel '{name}'")]
    UnknownSubModel { name: String },

    /// A line number outside the submodel's contents.
    #[error("line {line} is out of range for '{name}' ({len} lines)")]
    LineOutOfRange {
        name: String,
        line: usize,
        len: usize,
    },

    /// A step index beyond the end of the step index.
    #[error("step index {index} is out of range ({len} steps)")]
    StepOutOfRange { index: usize, len: usize },
}

impl DocumentError {
    /// Get a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Read { path, .. } => {
                format!("Could not open {}.", path.display())
            }
            Self::Format { path, reason } => {
                format!(
                    "{} is not an LDraw model file: {}",
                    path.display(),
                    reason
                )
            }
            Self::Cancelled { path } => {
                format!("Loading {} was cancelled.", path.display())
            }
            Self::TaskFailed { path } => {
                format!("An internal error occurred while loading {}.", path.display())
            }
            Self::Io {
                operation, path, ..
            } => {
                format!("Could not {} the file at {}", operation, path.display())
            }
            Self::AtomicWriteFailed { target_path, .. } => {
                format!(
                    "Could not save the file to {}. Please check disk space and permissions.",
                    target_path.display()
                )
            }
            Self::UnknownSubModel { name } => {
                format!("The submodel '{name}' does not exist in this document.")
            }
            Self::LineOutOfRange { name, line, len } => {
                format!("Line {} is outside '{}' which has {} lines.", line + 1, name, len)
            }
            Self::StepOutOfRange { index, len } => {
                format!("Step {index} does not exist; the document has {len} steps.")
            }
        }
    }

    /// Whether the document was reset to empty by this error.
    pub fn is_fatal_load(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::Format { .. } | Self::Cancelled { .. } | Self::TaskFailed { .. }
        )
    }
}

/// Result type alias for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;
