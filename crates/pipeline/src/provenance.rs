//! Provenance record: content digests of every input, tool versions, stage
//! outcomes and a manifest of the produced artifacts.
//!
//! A tree digest is the SHA-256 of the concatenated, sorted hex digests of
//! every regular file under the root, so it does not depend on enumeration
//! order and changes exactly when a file's bytes change or a file is added or
//! removed.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use triage_core::Profile;
use walkdir::WalkDir;

use crate::stage::{Artifact, ArtifactKind, StageOutcome};
use crate::tool::{query_version, Invocation, ToolRunner};

pub const SCHEMA: &str = "triage-provenance/1";
pub const PROVENANCE_FILE: &str = "provenance.json";
pub const SBOM_FILE: &str = "sbom.syft.json";

// ── Hashing ────────────────────────────────────────────────────

/// SHA-256 hex digest of one file, streamed.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Digest of a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDigest {
    pub root: PathBuf,
    /// `None` when the root does not exist.
    pub sha256: Option<String>,
    pub file_count: usize,
}

/// Hash every regular file under `root` (symlinks are not followed).
///
/// Unreadable files are skipped with a warning. A missing root yields a
/// digest of `None`.
pub fn hash_tree(root: &Path) -> TreeDigest {
    if !root.exists() {
        warn!(path = %root.display(), "hash root missing");
        return TreeDigest {
            root: root.to_path_buf(),
            sha256: None,
            file_count: 0,
        };
    }

    let mut digests = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match hash_file(entry.path()) {
            Ok(d) => digests.push(d),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping unreadable file"),
        }
    }
    digests.sort();

    let mut hasher = Sha256::new();
    for d in &digests {
        hasher.update(d.as_bytes());
    }

    TreeDigest {
        root: root.to_path_buf(),
        sha256: Some(format!("{:x}", hasher.finalize())),
        file_count: digests.len(),
    }
}

// ── Record ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inputs {
    pub evidence: TreeDigest,
    pub profile_path: Option<PathBuf>,
    pub profile_sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub name: String,
    pub path: PathBuf,
    /// File digest, or tree digest for directories. `None` when absent or
    /// unreadable.
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub schema: String,
    pub generated_at: String,
    pub inputs: Inputs,
    pub rules: Vec<TreeDigest>,
    pub tool_versions: BTreeMap<String, Option<String>>,
    pub stages: Vec<StageOutcome>,
    pub outputs: Vec<ArtifactEntry>,
    pub inventory: Option<PathBuf>,
}

// ── Recorder ───────────────────────────────────────────────────

/// Builds and writes [`ProvenanceRecord`]s.
pub struct ProvenanceRecorder<'a> {
    runner: &'a dyn ToolRunner,
    profile: &'a Profile,
}

impl<'a> ProvenanceRecorder<'a> {
    pub fn new(runner: &'a dyn ToolRunner, profile: &'a Profile) -> Self {
        Self { runner, profile }
    }

    /// Version probes for every collaborator named in the profile.
    fn version_probes(&self) -> Vec<(&'static str, Invocation)> {
        let p = self.profile;
        vec![
            ("plaso", Invocation::new(&p.timeline.plaso.log2timeline).arg("--version")),
            ("psort", Invocation::new(&p.timeline.plaso.psort).arg("--version")),
            ("yara", Invocation::new(&p.detections.yara.binary).arg("--version")),
            ("hayabusa", Invocation::new(&p.timeline.hayabusa.binary).arg("--version")),
            ("syft", Invocation::new(&p.inventory.binary).arg("version")),
        ]
    }

    /// Query every collaborator for its version. Failures map to `None`.
    pub fn tool_versions(&self) -> BTreeMap<String, Option<String>> {
        self.version_probes()
            .into_iter()
            .map(|(name, inv)| (name.to_string(), query_version(self.runner, &inv)))
            .collect()
    }

    pub fn generate(
        &self,
        evidence: &Path,
        profile_path: Option<&Path>,
        outcomes: &[StageOutcome],
        artifacts: &[Artifact],
    ) -> ProvenanceRecord {
        let profile_sha256 = profile_path.and_then(|p| match hash_file(p) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(path = %p.display(), error = %e, "cannot hash profile");
                None
            }
        });

        let outputs = artifacts
            .iter()
            .map(|a| ArtifactEntry {
                name: a.name.clone(),
                path: a.path.clone(),
                sha256: artifact_digest(a),
            })
            .collect();

        ProvenanceRecord {
            schema: SCHEMA.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            inputs: Inputs {
                evidence: hash_tree(evidence),
                profile_path: profile_path.map(Path::to_path_buf),
                profile_sha256,
            },
            rules: self
                .profile
                .rule_roots()
                .iter()
                .map(|r| hash_tree(r))
                .collect(),
            tool_versions: self.tool_versions(),
            stages: outcomes.to_vec(),
            outputs,
            inventory: None,
        }
    }

    /// Capture a software inventory of the analysis host into
    /// `<out_dir>/sbom.syft.json`.
    ///
    /// Runs only when enabled in the profile and the inventory tool answers
    /// a version query. `evidence` and `out_dir` are excluded from the scan.
    pub fn capture_inventory(&self, evidence: &Path, out_dir: &Path) -> Option<PathBuf> {
        let cfg = &self.profile.inventory;
        if !cfg.enabled {
            return None;
        }
        let probe = Invocation::new(&cfg.binary).arg("version");
        query_version(self.runner, &probe)?;

        let mut invocation = Invocation::new(&cfg.binary)
            .arg(&cfg.target)
            .args(["-o", "json"]);
        for exclude in cfg
            .exclude
            .iter()
            .map(PathBuf::from)
            .chain([evidence.to_path_buf(), out_dir.to_path_buf()])
        {
            invocation = invocation.arg("--exclude").arg(exclude);
        }

        match self.runner.run(&invocation) {
            Ok(out) if out.success() && !out.stdout.trim().is_empty() => {
                let path = out_dir.join(SBOM_FILE);
                match fs::write(&path, out.stdout) {
                    Ok(()) => Some(path),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to write inventory");
                        None
                    }
                }
            }
            Ok(out) => {
                warn!(status = %out.status_text(), "inventory tool produced no output");
                None
            }
            Err(e) => {
                warn!(error = %e, "inventory tool failed");
                None
            }
        }
    }

    /// Write `record` to `<out_dir>/provenance.json`.
    pub fn write(record: &ProvenanceRecord, out_dir: &Path) -> triage_core::Result<PathBuf> {
        let path = out_dir.join(PROVENANCE_FILE);
        let mut text = serde_json::to_string_pretty(record)?;
        text.push('\n');
        fs::write(&path, text)?;
        info!(path = %path.display(), "provenance written");
        Ok(path)
    }
}

fn artifact_digest(artifact: &Artifact) -> Option<String> {
    match artifact.kind {
        ArtifactKind::Directory if artifact.path.is_dir() => hash_tree(&artifact.path).sha256,
        ArtifactKind::Directory => None,
        _ if artifact.path.is_file() => hash_file(&artifact.path).ok(),
        _ => None,
    }
}
