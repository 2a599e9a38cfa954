//! Core [`RuleLoader`] struct: filesystem-backed rule loading.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::schema::Rule;

use super::error::{LoadResult, LoadStatus, Result};
use super::parse::rule_from_yaml;

/// Filesystem-backed rule loader.
///
/// Scans a directory (recursively) for `*.yml` / `*.yaml` files and
/// normalizes each into a [`Rule`]. Files are visited in sorted path order so
/// the loaded rule set is the same on every run. A malformed file is
/// reported in the returned [`LoadResult`]s and skipped; it never aborts the
/// scan.
pub struct RuleLoader {
    /// Root directory containing rule YAML files.
    rules_dir: PathBuf,
    /// Rules loaded by the last [`load_all`](Self::load_all).
    rules: Vec<Rule>,
}

impl RuleLoader {
    /// Create a loader for the given directory. Nothing is read until
    /// [`load_all`](Self::load_all).
    pub fn new(rules_dir: PathBuf) -> Self {
        Self {
            rules_dir,
            rules: Vec::new(),
        }
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// Recursively scan the rules directory and load all YAML files,
    /// replacing any previously loaded set.
    ///
    /// A missing rules directory yields an empty set with a warning.
    pub fn load_all(&mut self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        let mut rules = Vec::new();
        Self::scan_dir_recursive(&self.rules_dir, &mut rules, &mut results)?;
        self.rules = rules;
        Ok(results)
    }

    /// Recursively scan a directory for YAML rule files.
    fn scan_dir_recursive(
        dir: &Path,
        rules: &mut Vec<Rule>,
        results: &mut Vec<LoadResult>,
    ) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read rules directory");
                return Ok(());
            }
        };

        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        paths.sort();

        for path in paths {
            // Skip dotfiles/dotdirs
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            // Recurse into subdirectories
            if path.is_dir() {
                Self::scan_dir_recursive(&path, rules, results)?;
                continue;
            }

            // Skip non-YAML extensions
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yml" || e == "yaml")
                .unwrap_or(false);

            if !is_yaml {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            match Self::load_file(&path) {
                Ok(rule) => {
                    info!(
                        title = %rule.title,
                        selections = rule.selections.len(),
                        condition = %rule.condition,
                        path = %path.display(),
                        "loaded rule"
                    );
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded {
                            title: rule.title.clone(),
                        },
                    });
                    rules.push(rule);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed rule file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            kind: e.kind(),
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse a single YAML file into a [`Rule`].
    pub fn load_file(path: &Path) -> Result<Rule> {
        let contents = fs::read_to_string(path)?;
        let doc: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        rule_from_yaml(&doc, path)
    }

    /// Rules from the last successful scan.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }
}
