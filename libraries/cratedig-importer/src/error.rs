//! Error types for the importer

use cratedig_core::{ApplyStep, DigError, GroupKey};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    /// A metadata source failed or timed out; treated as zero candidates
    #[error("Search failed in source {source_name}: {message}")]
    TransientSearch {
        source_name: String,
        message: String,
    },

    /// A file could not be read; it is dropped from its group
    #[error("Invalid file {}: {message}", .path.display())]
    Validation { path: PathBuf, message: String },

    /// A sub-step of the apply stage failed; the transaction was rolled back
    #[error("Apply failed for {key} at {step}{}: {cause}", display_path(.path.as_deref()))]
    Apply {
        key: GroupKey,
        step: ApplyStep,
        path: Option<PathBuf>,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Import aborted by user")]
    UserAbort,

    /// The resume journal cannot be trusted
    #[error("Corrupt journal {} at line {line}: {message}", .path.display())]
    CorruptJournal {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Copied file does not hash to its source
    #[error("File verification failed: hash mismatch for {}", .0.display())]
    VerificationFailed(PathBuf),

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] DigError),

    #[error("Pipeline stage panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ImportError {
    /// Wrap an error raised during an apply sub-step
    pub fn apply(
        key: &GroupKey,
        step: ApplyStep,
        path: Option<&Path>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Apply {
            key: key.clone(),
            step,
            path: path.map(Path::to_path_buf),
            cause: cause.into(),
        }
    }
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| format!(" ({})", p.display())).unwrap_or_default()
}
