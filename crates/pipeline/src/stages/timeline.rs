//! Super-timeline extraction: `log2timeline.py` into a storage file, then
//! `psort.py` into the normalized JSONL event export.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;
use triage_core::Profile;

use super::{join_notes, run_producing};
use crate::stage::{Artifact, ArtifactKind, Discovery, Stage, StageContext, StageError, StageInput};
use crate::tool::Invocation;

pub const PLASO_FILE: &str = "timeline.plaso";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const INDEX_FILE: &str = "timeline.index";

/// Path of the event export this stage writes under `out_dir`.
pub fn events_path(out_dir: &Path) -> PathBuf {
    out_dir.join(EVENTS_FILE)
}

pub struct TimelineStage;

impl Stage for TimelineStage {
    fn name(&self) -> &'static str {
        "timeline"
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.timeline.plaso.enabled
    }

    fn artifacts(&self, ctx: &StageContext<'_>) -> Vec<Artifact> {
        vec![
            Artifact::in_dir(ctx.out_dir, PLASO_FILE, ArtifactKind::Opaque),
            Artifact::in_dir(ctx.out_dir, EVENTS_FILE, ArtifactKind::Lines),
            Artifact::in_dir(ctx.out_dir, INDEX_FILE, ArtifactKind::Lines),
        ]
    }

    fn discover(&self, ctx: &StageContext<'_>) -> Option<StageInput> {
        Discovery::new()
            .default_path(ctx.evidence.to_path_buf())
            .resolve(Path::is_dir)
    }

    fn execute(
        &self,
        input: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<String>, StageError> {
        let cfg = &ctx.profile.timeline.plaso;
        let plaso = ctx.out_dir.join(PLASO_FILE);
        let events = events_path(ctx.out_dir);

        let extract = Invocation::new(&cfg.log2timeline)
            .arg("--status_view=linear")
            .args(&cfg.extra_args)
            .arg(&plaso)
            .arg(&input.path);
        let extract_note = run_producing(ctx, &extract, &plaso)?;

        let export = Invocation::new(&cfg.psort)
            .args(["-o", "json_line", "-w"])
            .arg(&events)
            .arg(&plaso);
        let export_note = run_producing(ctx, &export, &events)?;

        fs::write(
            ctx.out_dir.join(INDEX_FILE),
            format!("{}\n{}\n", plaso.display(), events.display()),
        )?;

        info!(events = %events.display(), "timeline written");
        Ok(join_notes([extract_note, export_note]))
    }
}
