//! EVTX timeline analysis with `hayabusa json-timeline`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use triage_core::Profile;

use super::memory;
use super::{join_notes, run_producing, write_json};
use crate::stage::{Artifact, ArtifactKind, Discovery, Stage, StageContext, StageError, StageInput};
use crate::tool::Invocation;

pub const OUT_DIR: &str = "hayabusa_out";
pub const TIMELINE_FILE: &str = "hayabusa_timeline.jsonl";
pub const SUMMARY_FILE: &str = "hayabusa_summary.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub total_events: u64,
    pub hits_by_level: BTreeMap<String, u64>,
    pub source_dir: PathBuf,
}

/// Count non-empty lines of a hayabusa JSONL timeline and tally them by
/// `level` (falling back to `lvl`, then `unknown`). Unparseable lines are
/// counted but not tallied.
pub fn summarize(timeline: &Path, source_dir: &Path) -> std::io::Result<TimelineSummary> {
    let reader = BufReader::new(fs::File::open(timeline)?);
    let mut summary = TimelineSummary {
        source_dir: source_dir.to_path_buf(),
        ..Default::default()
    };

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.total_events += 1;

        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let level = ["level", "lvl"]
            .iter()
            .filter_map(|k| event.get(*k).and_then(Value::as_str))
            .find(|l| !l.is_empty())
            .unwrap_or("unknown");
        *summary.hits_by_level.entry(level.to_string()).or_default() += 1;
    }

    Ok(summary)
}

fn has_evtx(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                e.path()
                    .extension()
                    .and_then(|x| x.to_str())
                    .is_some_and(|x| x.eq_ignore_ascii_case("evtx"))
            })
        })
        .unwrap_or(false)
}

pub struct HayabusaStage;

impl Stage for HayabusaStage {
    fn name(&self) -> &'static str {
        "hayabusa"
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.timeline.hayabusa.enabled
    }

    fn artifacts(&self, ctx: &StageContext<'_>) -> Vec<Artifact> {
        let dir = ctx.out_dir.join(OUT_DIR);
        vec![
            Artifact::new(TIMELINE_FILE, dir.join(TIMELINE_FILE), ArtifactKind::Lines),
            Artifact::new(SUMMARY_FILE, dir.join(SUMMARY_FILE), ArtifactKind::JsonObject),
        ]
    }

    /// Configured EVTX directories, then event logs recovered by the memory
    /// stage, then the evidence root.
    fn discover(&self, ctx: &StageContext<'_>) -> Option<StageInput> {
        let recovered = ctx
            .upstream_artifact("memory", &memory::eventlog_dir(ctx.profile, ctx.out_dir))
            .filter(|dir| has_evtx(dir));
        Discovery::new()
            .configured_all(&ctx.profile.timeline.hayabusa.evtx_dirs)
            .upstream("memory", recovered)
            .default_path(ctx.evidence.to_path_buf())
            .resolve(Path::is_dir)
    }

    fn execute(
        &self,
        input: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<String>, StageError> {
        let cfg = &ctx.profile.timeline.hayabusa;
        let out = ctx.out_dir.join(OUT_DIR);
        fs::create_dir_all(&out)?;
        let timeline = out.join(TIMELINE_FILE);

        let mut invocation = Invocation::new(&cfg.binary)
            .args(["json-timeline", "-w", "-L", "-o"])
            .arg(&timeline)
            .arg("-d")
            .arg(&input.path);
        if let Some(level) = &cfg.min_level {
            invocation = invocation.arg("--min-level").arg(level);
        }
        let invocation = invocation.args(&cfg.extra_args);

        let note = run_producing(ctx, &invocation, &timeline)?;

        let summary_note = match summarize(&timeline, &input.path) {
            Ok(summary) => {
                if let Err(e) = write_json(&out.join(SUMMARY_FILE), &summary) {
                    warn!(error = %e, "failed to write hayabusa summary");
                }
                info!(events = summary.total_events, "hayabusa timeline summarized");
                Some(format!("{} events", summary.total_events))
            }
            Err(e) => {
                warn!(path = %timeline.display(), error = %e, "failed to summarize hayabusa timeline");
                None
            }
        };

        Ok(join_notes([note, summary_note]))
    }
}
