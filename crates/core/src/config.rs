//! Triage profile: per-stage enablement, tool locations and discovery paths.
//!
//! A profile is an explicit value loaded once by the entry point and threaded
//! through the pipeline. Every field has a default so a partial (or missing)
//! profile file still yields a runnable configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};

// ── Top-level profile ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Profile {
    pub timeline: TimelineConfig,
    pub detections: DetectionsConfig,
    pub memory: MemoryConfig,
    pub inventory: InventoryConfig,
}

impl Profile {
    /// Parse a profile from YAML text. An empty document yields the defaults.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        if !value.is_mapping() {
            return Err(TriageError::Config(
                "profile root must be a mapping".to_string(),
            ));
        }
        Ok(serde_yaml::from_value(value)?)
    }

    /// Load a profile from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| TriageError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    /// Directories whose contents decide detection results. Hashed into the
    /// provenance record.
    pub fn rule_roots(&self) -> Vec<PathBuf> {
        vec![
            self.detections.sigma.rules_dir.clone(),
            self.detections.yara.rules_dir.clone(),
        ]
    }

    /// Log the effective configuration at startup.
    pub fn log_summary(&self) {
        tracing::info!("Profile loaded:");
        tracing::info!(
            "  plaso:     enabled={}, log2timeline={}, psort={}",
            self.timeline.plaso.enabled,
            self.timeline.plaso.log2timeline,
            self.timeline.plaso.psort
        );
        tracing::info!(
            "  sigma:     enabled={}, rules_dir={}",
            self.detections.sigma.enabled,
            self.detections.sigma.rules_dir.display()
        );
        tracing::info!(
            "  yara:      enabled={}, rules_dir={}, max_files={}",
            self.detections.yara.enabled,
            self.detections.yara.rules_dir.display(),
            self.detections.yara.max_files
        );
        tracing::info!(
            "  memprocfs: enabled={}, maps=[{}], device={}",
            self.memory.memprocfs.enabled,
            self.memory.memprocfs.maps.enabled().join(","),
            self.memory
                .memprocfs
                .device
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(auto)".to_string())
        );
        tracing::info!(
            "  hayabusa:  enabled={}, min_level={}",
            self.timeline.hayabusa.enabled,
            self.timeline.hayabusa.min_level.as_deref().unwrap_or("(none)")
        );
        tracing::info!("  inventory: enabled={}", self.inventory.enabled);
    }
}

// ── Timeline tools ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimelineConfig {
    pub plaso: PlasoConfig,
    pub hayabusa: HayabusaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlasoConfig {
    pub enabled: bool,
    pub log2timeline: String,
    pub psort: String,
    /// Extra arguments appended to the `log2timeline` invocation.
    pub extra_args: Vec<String>,
}

impl Default for PlasoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log2timeline: "log2timeline.py".to_string(),
            psort: "psort.py".to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HayabusaConfig {
    pub enabled: bool,
    pub binary: String,
    /// Explicit EVTX directories. The first existing one wins.
    pub evtx_dirs: Vec<PathBuf>,
    pub min_level: Option<String>,
    pub extra_args: Vec<String>,
}

impl Default for HayabusaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: "hayabusa".to_string(),
            evtx_dirs: Vec::new(),
            min_level: None,
            extra_args: Vec::new(),
        }
    }
}

// ── Detections ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionsConfig {
    pub sigma: SigmaConfig,
    pub yara: YaraConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SigmaConfig {
    pub enabled: bool,
    pub rules_dir: PathBuf,
    /// Explicit event export to evaluate instead of the timeline output.
    pub events_path: Option<PathBuf>,
}

impl Default for SigmaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules_dir: PathBuf::from("data/rules/sigma"),
            events_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct YaraConfig {
    pub enabled: bool,
    pub binary: String,
    pub rules_dir: PathBuf,
    /// Scan roots. Empty means the evidence root.
    pub paths: Vec<PathBuf>,
    /// Upper bound on the number of files scanned per run.
    pub max_files: usize,
}

impl Default for YaraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "yara".to_string(),
            rules_dir: PathBuf::from("data/rules/yara"),
            paths: Vec::new(),
            max_files: 100_000,
        }
    }
}

// ── Memory triage ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub memprocfs: MemProcFsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemProcFsConfig {
    pub enabled: bool,
    pub binary: String,
    /// Memory image. Auto-discovered under the evidence root when unset.
    pub device: Option<PathBuf>,
    pub forensic: bool,
    pub extra_args: Vec<String>,
    /// Destination for extracted event logs. Defaults to
    /// `<out>/memprocfs_eventlogs`.
    pub eventlog_dir: Option<PathBuf>,
    pub max_eventlog_bytes: u64,
    pub processes: ProcessOptions,
    pub maps: MemoryMaps,
}

impl Default for MemProcFsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: "memprocfs".to_string(),
            device: None,
            forensic: true,
            extra_args: Vec::new(),
            eventlog_dir: None,
            max_eventlog_bytes: 64 * 1024 * 1024,
            processes: ProcessOptions::default(),
            maps: MemoryMaps::default(),
        }
    }
}

/// Which per-process lists are kept in the normalized process records, and
/// how long `handles` / `threads` may grow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessOptions {
    pub include_modules: bool,
    pub include_handles: bool,
    pub include_threads: bool,
    pub include_unloaded_modules: bool,
    pub max_handles_per_process: usize,
    pub max_threads_per_process: usize,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            include_modules: true,
            include_handles: true,
            include_threads: true,
            include_unloaded_modules: true,
            max_handles_per_process: 2000,
            max_threads_per_process: 2000,
        }
    }
}

/// System-wide maps collected from the memory export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryMaps {
    pub net: bool,
    pub kdriver: bool,
    pub kdevice: bool,
    pub kobject: bool,
    pub services: bool,
    pub users: bool,
}

impl Default for MemoryMaps {
    fn default() -> Self {
        Self {
            net: true,
            kdriver: true,
            kdevice: false,
            kobject: false,
            services: true,
            users: true,
        }
    }
}

impl MemoryMaps {
    /// Names of the enabled maps, in a fixed order.
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            ("net", self.net),
            ("kdriver", self.kdriver),
            ("kdevice", self.kdevice),
            ("kobject", self.kobject),
            ("services", self.services),
            ("users", self.users),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

// ── Software inventory ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InventoryConfig {
    pub enabled: bool,
    pub binary: String,
    pub target: String,
    pub exclude: Vec<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: "syft".to_string(),
            target: "dir:/".to_string(),
            exclude: vec![
                "/proc".to_string(),
                "/sys".to_string(),
                "/dev".to_string(),
            ],
        }
    }
}
