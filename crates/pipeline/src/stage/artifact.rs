use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// On-disk shape of a declared artifact. Decides the empty placeholder
/// written when a stage produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// JSON array, placeholder `[]`.
    JsonArray,
    /// JSON object, placeholder `{}`.
    JsonObject,
    /// Line-oriented text, placeholder empty file.
    Lines,
    Directory,
    /// Tool-native binary container. Never fabricated.
    Opaque,
}

/// A file or directory a stage owns under the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Stable name, e.g. `sigma_findings.json`.
    pub name: String,
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn new(name: impl Into<String>, path: PathBuf, kind: ArtifactKind) -> Self {
        Self {
            name: name.into(),
            path,
            kind,
        }
    }

    /// Artifact stored at `<out_dir>/<name>`.
    pub fn in_dir(out_dir: &Path, name: &str, kind: ArtifactKind) -> Self {
        Self::new(name, out_dir.join(name), kind)
    }

    pub fn exists(&self) -> bool {
        match self.kind {
            ArtifactKind::Directory => self.path.is_dir(),
            _ => self.path.is_file(),
        }
    }

    /// Remove a file left at this path by an earlier run. Directories are
    /// kept as they are.
    ///
    /// Returns `true` when a file was removed.
    pub fn clear(&self) -> io::Result<bool> {
        if self.kind == ArtifactKind::Directory || !self.path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }

    /// Create an empty placeholder when nothing exists at the path yet.
    ///
    /// Returns `true` when a placeholder was written.
    pub fn materialize(&self) -> io::Result<bool> {
        if self.exists() || self.kind == ArtifactKind::Opaque {
            return Ok(false);
        }
        if self.kind == ArtifactKind::Directory {
            fs::create_dir_all(&self.path)?;
            return Ok(true);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let placeholder: &[u8] = match self.kind {
            ArtifactKind::JsonArray => b"[]\n",
            ArtifactKind::JsonObject => b"{}\n",
            _ => b"",
        };
        fs::write(&self.path, placeholder)?;
        Ok(true)
    }
}

/// Clear every file artifact in `artifacts` so that only output written
/// during this run can be found there afterwards.
pub fn clear_all(stage: &str, artifacts: &[Artifact]) {
    for artifact in artifacts {
        match artifact.clear() {
            Ok(true) => debug!(stage = %stage, path = %artifact.path.display(), "cleared stale artifact"),
            Ok(false) => {}
            Err(e) => warn!(
                stage = %stage,
                path = %artifact.path.display(),
                error = %e,
                "failed to clear stale artifact"
            ),
        }
    }
}

/// Materialize every artifact in `artifacts`, logging (never propagating)
/// failures.
pub fn materialize_all(stage: &str, artifacts: &[Artifact]) {
    for artifact in artifacts {
        if let Err(e) = artifact.materialize() {
            warn!(
                stage = %stage,
                path = %artifact.path.display(),
                error = %e,
                "failed to materialize artifact"
            );
        }
    }
}
