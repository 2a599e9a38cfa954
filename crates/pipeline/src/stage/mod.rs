//! Stage execution model.
//!
//! A [`Stage`] wraps one external analysis tool. The [`StageRunner`] drives
//! a stage through enablement, input discovery, execution and artifact
//! materialization, and turns whatever happened into a [`StageOutcome`].
//! Nothing a stage does can abort the run.

mod artifact;
mod discovery;
mod runner;


use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use triage_core::{ErrorKind, Profile, TriageError};

use crate::tool::{ToolError, ToolRunner};

pub use self::artifact::{clear_all, materialize_all, Artifact, ArtifactKind};
pub use self::discovery::{Discovery, InputSource, StageInput};
pub use self::runner::StageRunner;

// ── Outcome ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Skipped,
    Succeeded,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Skipped => write!(f, "skipped"),
            StageStatus::Succeeded => write!(f, "succeeded"),
            StageStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Classified failure attached to a failed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn tool_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolFailure, message)
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<ToolError> for StageError {
    fn from(e: ToolError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<TriageError> for StageError {
    fn from(e: TriageError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self {
        Self::tool_failure(e.to_string())
    }
}

impl From<serde_json::Error> for StageError {
    fn from(e: serde_json::Error) -> Self {
        Self::tool_failure(e.to_string())
    }
}

/// What happened to one stage in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: String,
    pub enabled: bool,
    pub status: StageStatus,
    /// Declared artifacts present after the run.
    pub artifacts: Vec<PathBuf>,
    pub error: Option<StageError>,
    /// Human-readable note: skip reason, counts, tolerated exit codes.
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Succeeded
    }
}

// ── Stage trait ────────────────────────────────────────────────

/// Everything a stage may look at while it runs.
pub struct StageContext<'a> {
    pub profile: &'a Profile,
    pub evidence: &'a Path,
    pub out_dir: &'a Path,
    pub runner: &'a dyn ToolRunner,
    /// Outcomes of the stages that ran before this one, in order.
    pub outcomes: &'a [StageOutcome],
}

impl StageContext<'_> {
    /// `path` if `stage` succeeded in this run and listed it as an artifact.
    pub fn upstream_artifact(&self, stage: &str, path: &Path) -> Option<PathBuf> {
        self.outcomes
            .iter()
            .find(|o| o.stage == stage)
            .filter(|o| o.succeeded())
            .and_then(|o| o.artifacts.iter().find(|a| a.as_path() == path))
            .cloned()
    }
}

/// One analysis step of the pipeline.
pub trait Stage {
    /// Stable name used in outcomes and logs.
    fn name(&self) -> &'static str;

    fn enabled(&self, profile: &Profile) -> bool;

    /// Every path this stage may write. The runner materializes the missing
    /// ones after each run.
    fn artifacts(&self, ctx: &StageContext<'_>) -> Vec<Artifact>;

    /// Resolve the stage input. `None` skips the stage.
    fn discover(&self, ctx: &StageContext<'_>) -> Option<StageInput>;

    /// Run the tool(s) against `input`. `Ok` carries an optional detail note.
    fn execute(
        &self,
        input: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<String>, StageError>;
}
