//! Error types and load result structures for the rule loader.

use std::path::PathBuf;

use triage_core::ErrorKind;

/// Errors that can occur while loading rule files.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Structurally invalid rule (non-mapping root, missing detection block,
    /// unsupported condition or modifier).
    #[error("Validation error: {0}")]
    Validation(String),
}

impl RuleError {
    /// Every rule loading failure is a configuration problem with that file.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Outcome of loading a single rule file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Rule was successfully loaded.
    Loaded { title: String },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred. The rule is not evaluated.
    Failed { kind: ErrorKind, error: String },
}
