//! Selection-rule detection over the normalized event export.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{info, warn};
use triage_core::Profile;
use triage_rules::{evaluate_export, LoadStatus, RuleLoader};

use super::timeline;
use super::write_json;
use crate::stage::{Artifact, ArtifactKind, Discovery, Stage, StageContext, StageError, StageInput};

pub const FINDINGS_FILE: &str = "sigma_findings.json";

pub struct SigmaStage;

impl Stage for SigmaStage {
    fn name(&self) -> &'static str {
        "sigma"
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.detections.sigma.enabled
    }

    fn artifacts(&self, ctx: &StageContext<'_>) -> Vec<Artifact> {
        vec![Artifact::in_dir(ctx.out_dir, FINDINGS_FILE, ArtifactKind::JsonArray)]
    }

    /// Explicit `events_path`, else the timeline export of this run, else an
    /// `events.jsonl` shipped with the evidence.
    fn discover(&self, ctx: &StageContext<'_>) -> Option<StageInput> {
        let upstream = ctx.upstream_artifact("timeline", &timeline::events_path(ctx.out_dir));
        Discovery::new()
            .configured(ctx.profile.detections.sigma.events_path.as_deref())
            .upstream("timeline", upstream)
            .default_path(ctx.evidence.join(timeline::EVENTS_FILE))
            .resolve(Path::is_file)
    }

    fn execute(
        &self,
        input: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<String>, StageError> {
        let rules_dir = &ctx.profile.detections.sigma.rules_dir;
        let mut loader = RuleLoader::new(rules_dir.clone());
        let results = loader
            .load_all()
            .map_err(|e| StageError::new(e.kind(), e.to_string()))?;

        let failed = results
            .iter()
            .filter(|r| matches!(r.status, LoadStatus::Failed { .. }))
            .count();
        for r in &results {
            if let LoadStatus::Failed { kind, error } = &r.status {
                warn!(path = %r.path.display(), kind = %kind, error = %error, "rule skipped");
            }
        }
        let rules = loader.into_rules();
        if rules.is_empty() {
            warn!(rules_dir = %rules_dir.display(), "no detection rules loaded");
        }

        let reader = BufReader::new(File::open(&input.path)?);
        let mut findings = Vec::new();
        let stats = evaluate_export(&rules, reader, |m| findings.push(m))?;

        write_json(&ctx.out_dir.join(FINDINGS_FILE), &findings)?;

        info!(
            rules = rules.len(),
            records = stats.records,
            malformed = stats.malformed,
            matches = stats.matches,
            "sigma evaluation complete"
        );
        Ok(Some(format!(
            "{} rules ({} rejected), {} records, {} malformed, {} matches",
            rules.len(),
            failed,
            stats.records,
            stats.malformed,
            stats.matches
        )))
    }
}
