use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of everything that can go wrong during a triage run.
///
/// Every per-item and per-stage failure is contained where it happens and
/// surfaced as one of these kinds on a status entry or log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed rule or profile file. The offending item is skipped.
    Config,
    /// Missing binary or library. The stage cannot run.
    ToolUnavailable,
    /// Non-zero exit or I/O failure while a tool was running.
    ToolFailure,
    /// No discoverable input. Not an error for the run.
    InputMissing,
    /// Malformed record or line in an export. The record is skipped.
    Data,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::ToolUnavailable => write!(f, "tool_unavailable"),
            ErrorKind::ToolFailure => write!(f, "tool_failure"),
            ErrorKind::InputMissing => write!(f, "input_missing"),
            ErrorKind::Data => write!(f, "data"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TriageError {
    /// The taxonomy bucket this error falls into.
    ///
    /// Plain I/O errors count as tool failures: they only surface while a
    /// stage is reading or writing its own artifacts. Missing tools and
    /// missing inputs are reported per stage, never as a `TriageError`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TriageError::Config(_) => ErrorKind::Config,
            TriageError::Io(_) | TriageError::OutputDir { .. } => ErrorKind::ToolFailure,
            TriageError::Data(_) => ErrorKind::Data,
        }
    }
}

impl From<serde_yaml::Error> for TriageError {
    fn from(e: serde_yaml::Error) -> Self {
        TriageError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for TriageError {
    fn from(e: serde_json::Error) -> Self {
        TriageError::Data(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
