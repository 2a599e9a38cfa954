//! Staged forensic-triage pipeline.
//!
//! Runs the external analysis tools in a fixed order over a body of
//! evidence, feeds the normalized event export to the rule engine and
//! records a verifiable provenance manifest of the run.

pub mod orchestrator;
pub mod provenance;
pub mod report;
pub mod stage;
pub mod stages;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tool;

pub use orchestrator::{Pipeline, RunOutput, RunRequest};
pub use provenance::{hash_file, hash_tree, ProvenanceRecord, ProvenanceRecorder, TreeDigest};
pub use report::RunSummary;
pub use stage::{Stage, StageContext, StageError, StageOutcome, StageRunner, StageStatus};
pub use tool::{Invocation, ProcessRunner, ToolError, ToolOutput, ToolRunner};
