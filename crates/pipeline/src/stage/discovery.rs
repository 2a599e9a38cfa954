use std::fmt;
use std::path::{Path, PathBuf};

/// Where a stage's input came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Path set explicitly in the profile.
    Configured,
    /// Artifact of an upstream stage that succeeded in this run.
    Upstream(String),
    /// Derived from the evidence root.
    Default,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Configured => write!(f, "configured"),
            InputSource::Upstream(stage) => write!(f, "upstream:{stage}"),
            InputSource::Default => write!(f, "default"),
        }
    }
}

/// Resolved input for one stage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInput {
    pub path: PathBuf,
    pub source: InputSource,
}

/// Ordered fallback chain for input discovery: configured paths first, then
/// upstream artifacts, then evidence-derived defaults.
///
/// Candidates are kept in the order they are added within each tier; the
/// first one accepted by the predicate passed to [`resolve`](Self::resolve)
/// wins.
#[derive(Debug, Default)]
pub struct Discovery {
    configured: Vec<PathBuf>,
    upstream: Vec<(String, PathBuf)>,
    defaults: Vec<PathBuf>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configured(mut self, path: Option<impl AsRef<Path>>) -> Self {
        self.configured
            .extend(path.map(|p| p.as_ref().to_path_buf()));
        self
    }

    pub fn configured_all<'a>(mut self, paths: impl IntoIterator<Item = &'a PathBuf>) -> Self {
        self.configured.extend(paths.into_iter().cloned());
        self
    }

    /// Offer an upstream artifact. Pass the result of
    /// [`StageContext::upstream_artifact`](super::StageContext::upstream_artifact)
    /// so only artifacts of succeeded stages are considered.
    pub fn upstream(mut self, stage: &str, path: Option<PathBuf>) -> Self {
        self.upstream
            .extend(path.map(|p| (stage.to_string(), p)));
        self
    }

    pub fn default_path(mut self, path: PathBuf) -> Self {
        self.defaults.push(path);
        self
    }

    pub fn resolve(self, accept: impl Fn(&Path) -> bool) -> Option<StageInput> {
        let configured = self
            .configured
            .into_iter()
            .map(|p| (p, InputSource::Configured));
        let upstream = self
            .upstream
            .into_iter()
            .map(|(stage, p)| (p, InputSource::Upstream(stage)));
        let defaults = self.defaults.into_iter().map(|p| (p, InputSource::Default));

        configured
            .chain(upstream)
            .chain(defaults)
            .find(|(p, _)| accept(p.as_path()))
            .map(|(path, source)| StageInput { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn configured_wins_over_upstream_and_default() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        let c = dir.path().join("c.jsonl");
        for p in [&a, &b, &c] {
            fs::write(p, "").unwrap();
        }

        let input = Discovery::new()
            .configured(Some(&a))
            .upstream("timeline", Some(b.clone()))
            .default_path(c.clone())
            .resolve(Path::is_file)
            .unwrap();
        assert_eq!(input.path, a);
        assert_eq!(input.source, InputSource::Configured);
    }

    #[test]
    fn missing_candidates_fall_through() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("events.jsonl");
        fs::write(&present, "").unwrap();

        let input = Discovery::new()
            .configured(Some(&dir.path().join("nope.jsonl")))
            .upstream("timeline", None)
            .default_path(present.clone())
            .resolve(Path::is_file)
            .unwrap();
        assert_eq!(input.path, present);
        assert_eq!(input.source, InputSource::Default);
    }

    #[test]
    fn nothing_resolves() {
        let dir = TempDir::new().unwrap();
        let input = Discovery::new()
            .default_path(dir.path().join("missing"))
            .resolve(Path::exists);
        assert!(input.is_none());
    }

    #[test]
    fn first_accepted_configured_path_wins() {
        let dir = TempDir::new().unwrap();
        let second = dir.path().join("second");
        fs::create_dir(&second).unwrap();
        let configured = vec![dir.path().join("first"), second.clone()];

        let input = Discovery::new()
            .configured_all(&configured)
            .resolve(Path::is_dir)
            .unwrap();
        assert_eq!(input.path, second);
        assert_eq!(input.source.to_string(), "configured");
    }
}
