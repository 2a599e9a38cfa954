//! Runs the stage list, then provenance, then the run summary.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{error, info};
use triage_core::{Profile, Result, TriageError};

use crate::provenance::ProvenanceRecorder;
use crate::report::{count_array, count_lines, RunMeta, RunSummary};
use crate::stage::{Artifact, Stage, StageContext, StageOutcome, StageRunner, StageStatus};
use crate::stages::{self, sigma, timeline, yara};
use crate::tool::ToolRunner;

/// Inputs of one triage run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub evidence: PathBuf,
    pub out_dir: PathBuf,
    /// Profile file the [`Profile`] was loaded from, hashed into provenance.
    pub profile_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub outcomes: Vec<StageOutcome>,
    /// Every artifact path present after the stages ran.
    pub artifacts: Vec<PathBuf>,
    pub provenance_path: Option<PathBuf>,
    pub summary_path: Option<PathBuf>,
}

impl RunOutput {
    pub fn outcome(&self, stage: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }
}

pub struct Pipeline<'a> {
    runner: &'a dyn ToolRunner,
    stages: Vec<Box<dyn Stage>>,
}

impl<'a> Pipeline<'a> {
    /// Pipeline with the default stage order:
    /// timeline, sigma, yara, memory, hayabusa.
    pub fn new(runner: &'a dyn ToolRunner) -> Self {
        Self::with_stages(runner, stages::default_stages())
    }

    pub fn with_stages(runner: &'a dyn ToolRunner, stages: Vec<Box<dyn Stage>>) -> Self {
        Self { runner, stages }
    }

    /// Execute every stage in order.
    ///
    /// Skipped and failed stages never stop the run. The only error returned
    /// is failure to create the output directory.
    pub fn run(&self, profile: &Profile, request: &RunRequest) -> Result<RunOutput> {
        let started_at = Utc::now().to_rfc3339();
        fs::create_dir_all(&request.out_dir).map_err(|source| TriageError::OutputDir {
            path: request.out_dir.clone(),
            source,
        })?;

        info!(
            evidence = %request.evidence.display(),
            out = %request.out_dir.display(),
            stages = self.stages.len(),
            "triage run starting"
        );

        let mut outcomes: Vec<StageOutcome> = Vec::with_capacity(self.stages.len());
        let mut declared: Vec<Artifact> = Vec::new();

        for stage in &self.stages {
            let ctx = StageContext {
                profile,
                evidence: &request.evidence,
                out_dir: &request.out_dir,
                runner: self.runner,
                outcomes: &outcomes,
            };
            let outcome = StageRunner::run(stage.as_ref(), &ctx);
            declared.extend(stage.artifacts(&ctx));
            outcomes.push(outcome);
        }

        let artifacts: Vec<PathBuf> = outcomes
            .iter()
            .flat_map(|o| o.artifacts.iter().cloned())
            .collect();

        let recorder = ProvenanceRecorder::new(self.runner, profile);
        let mut record = recorder.generate(
            &request.evidence,
            request.profile_path.as_deref(),
            &outcomes,
            &declared,
        );
        record.inventory = recorder.capture_inventory(&request.evidence, &request.out_dir);
        let provenance_path = match ProvenanceRecorder::write(&record, &request.out_dir) {
            Ok(p) => Some(p),
            Err(e) => {
                error!(error = %e, "failed to write provenance record");
                None
            }
        };

        let summary = RunSummary {
            events: count_lines(&timeline::events_path(&request.out_dir)),
            sigma_matches: count_array(&request.out_dir.join(sigma::FINDINGS_FILE)),
            yara_hits: count_array(&request.out_dir.join(yara::HITS_FILE)),
            stages: outcomes.clone(),
            meta: RunMeta {
                started_at,
                finished_at: Utc::now().to_rfc3339(),
                evidence: request.evidence.clone(),
                profile: request.profile_path.clone(),
                out_dir: request.out_dir.clone(),
                provenance: provenance_path.clone(),
            },
        };
        let summary_path = match summary.write(&request.out_dir) {
            Ok(p) => Some(p),
            Err(e) => {
                error!(error = %e, "failed to write run summary");
                None
            }
        };

        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        info!(
            succeeded = count(StageStatus::Succeeded),
            skipped = count(StageStatus::Skipped),
            failed = count(StageStatus::Failed),
            "triage run finished"
        );

        Ok(RunOutput {
            outcomes,
            artifacts,
            provenance_path,
            summary_path,
        })
    }
}
