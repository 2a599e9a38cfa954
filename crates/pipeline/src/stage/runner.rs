use std::time::Instant;

use tracing::{info, warn};

use super::{clear_all, materialize_all, Stage, StageContext, StageOutcome, StageStatus};

/// Drives a single [`Stage`] to a [`StageOutcome`].
pub struct StageRunner;

impl StageRunner {
    /// Run `stage` in `ctx`.
    ///
    /// Files a previous run left at the stage's declared paths are removed
    /// first, so a skipped or failed stage only ever reports placeholders.
    /// Disabled stages and stages without input are skipped without invoking
    /// any tool. Execution errors become a `failed` outcome. Whatever the
    /// status, missing declared artifacts are materialized before returning.
    pub fn run(stage: &dyn Stage, ctx: &StageContext<'_>) -> StageOutcome {
        let started = Instant::now();
        let name = stage.name();
        let enabled = stage.enabled(ctx.profile);
        let declared = stage.artifacts(ctx);
        clear_all(name, &declared);

        let (status, error, detail) = if !enabled {
            info!(stage = %name, "stage disabled in profile, skipping");
            (StageStatus::Skipped, None, Some("disabled in profile".to_string()))
        } else {
            match stage.discover(ctx) {
                None => {
                    info!(stage = %name, "no input found, skipping");
                    (StageStatus::Skipped, None, Some("no input found".to_string()))
                }
                Some(input) => {
                    info!(
                        stage = %name,
                        input = %input.path.display(),
                        source = %input.source,
                        "stage starting"
                    );
                    match stage.execute(&input, ctx) {
                        Ok(detail) => (StageStatus::Succeeded, None, detail),
                        Err(e) => {
                            warn!(stage = %name, kind = %e.kind, error = %e.message, "stage failed");
                            (StageStatus::Failed, Some(e), None)
                        }
                    }
                }
            }
        };

        materialize_all(name, &declared);

        let artifacts = declared
            .iter()
            .filter(|a| a.exists())
            .map(|a| a.path.clone())
            .collect();

        let outcome = StageOutcome {
            stage: name.to_string(),
            enabled,
            status,
            artifacts,
            error,
            detail,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            stage = %name,
            status = %outcome.status,
            duration_ms = outcome.duration_ms,
            "stage finished"
        );
        outcome
    }
}
