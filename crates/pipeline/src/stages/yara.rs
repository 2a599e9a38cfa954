//! Pattern scanning with the `yara` CLI, one invocation per target file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use triage_core::Profile;
use walkdir::WalkDir;

use super::write_json;
use crate::stage::{Artifact, ArtifactKind, Discovery, Stage, StageContext, StageError, StageInput};
use crate::tool::{Invocation, ToolError};

pub const HITS_FILE: &str = "yara_hits.json";

/// One line of scanner output for one target file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YaraHit {
    #[serde(rename = "match")]
    pub matched: String,
    pub file: PathBuf,
}

/// Rule files (`*.yar`, `*.yara`) under `dir`, sorted.
pub fn rule_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yar") | Some("yara")
            )
        })
        .collect();
    files.sort();
    files
}

pub struct YaraStage;

impl YaraStage {
    fn scan_roots(ctx: &StageContext<'_>) -> Vec<PathBuf> {
        let paths = &ctx.profile.detections.yara.paths;
        if paths.is_empty() {
            vec![ctx.evidence.to_path_buf()]
        } else {
            paths.clone()
        }
    }
}

impl Stage for YaraStage {
    fn name(&self) -> &'static str {
        "yara"
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.detections.yara.enabled
    }

    fn artifacts(&self, ctx: &StageContext<'_>) -> Vec<Artifact> {
        vec![Artifact::in_dir(ctx.out_dir, HITS_FILE, ArtifactKind::JsonArray)]
    }

    /// The input is the rule directory; without rule files there is nothing
    /// to scan for.
    fn discover(&self, ctx: &StageContext<'_>) -> Option<StageInput> {
        Discovery::new()
            .configured(Some(&ctx.profile.detections.yara.rules_dir))
            .resolve(|dir| !rule_files(dir).is_empty())
    }

    fn execute(
        &self,
        input: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<String>, StageError> {
        let cfg = &ctx.profile.detections.yara;
        let rules = rule_files(&input.path);

        let mut hits = Vec::new();
        let mut scanned = 0usize;
        let mut errors = 0usize;
        let mut capped = false;

        'roots: for root in Self::scan_roots(ctx) {
            if !root.exists() {
                warn!(path = %root.display(), "scan root does not exist");
                continue;
            }
            let targets = WalkDir::new(&root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| match e {
                    Ok(e) => Some(e),
                    Err(err) => {
                        warn!(error = %err, "skipping unreadable entry");
                        None
                    }
                })
                .filter(|e| e.file_type().is_file());

            for target in targets {
                if scanned >= cfg.max_files {
                    capped = true;
                    break 'roots;
                }
                scanned += 1;

                let invocation = Invocation::new(&cfg.binary)
                    .args(&rules)
                    .arg(target.path());
                let output = match ctx.runner.run(&invocation) {
                    Ok(o) => o,
                    Err(e @ ToolError::NotFound { .. }) => return Err(e.into()),
                    Err(e) => {
                        warn!(path = %target.path().display(), error = %e, "scan failed");
                        errors += 1;
                        continue;
                    }
                };
                if !output.success() {
                    debug!(
                        path = %target.path().display(),
                        status = %output.status_text(),
                        "scanner rejected target"
                    );
                    errors += 1;
                    continue;
                }

                hits.extend(
                    output
                        .stdout
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(|line| YaraHit {
                            matched: line.to_string(),
                            file: target.path().to_path_buf(),
                        }),
                );
            }
        }

        if capped {
            warn!(max_files = cfg.max_files, "scan stopped at max_files");
        }

        write_json(&ctx.out_dir.join(HITS_FILE), &hits)?;
        info!(
            rules = rules.len(),
            files = scanned,
            hits = hits.len(),
            "yara scan complete"
        );

        let mut detail = format!(
            "{} rule files, {} files scanned, {} hits",
            rules.len(),
            scanned,
            hits.len()
        );
        if errors > 0 {
            detail.push_str(&format!(", {errors} scan errors"));
        }
        if capped {
            detail.push_str(", max_files reached");
        }
        Ok(Some(detail))
    }
}
