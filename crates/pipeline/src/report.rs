//! Machine-readable run summary, written last.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::stage::StageOutcome;

pub const REPORT_FILE: &str = "triage_report.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    pub started_at: String,
    pub finished_at: String,
    pub evidence: PathBuf,
    pub profile: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub provenance: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Records in the normalized event export.
    pub events: u64,
    pub sigma_matches: usize,
    pub yara_hits: usize,
    pub stages: Vec<StageOutcome>,
    pub meta: RunMeta,
}

/// Non-blank lines of a line-delimited file. Missing files count as empty.
pub fn count_lines(path: &Path) -> u64 {
    let Ok(file) = fs::File::open(path) else {
        debug!(path = %path.display(), "no export to count");
        return 0;
    };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter(|l| !l.trim().is_empty())
        .count() as u64
}

/// Length of a JSON array file. Missing or malformed files count as empty.
pub fn count_array(path: &Path) -> usize {
    fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .and_then(|v| v.as_array().map(Vec::len))
        .unwrap_or(0)
}

impl RunSummary {
    /// Write to `<out_dir>/triage_report.json`.
    pub fn write(&self, out_dir: &Path) -> triage_core::Result<PathBuf> {
        let path = out_dir.join(REPORT_FILE);
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        fs::write(&path, text)?;
        info!(
            path = %path.display(),
            events = self.events,
            sigma_matches = self.sigma_matches,
            yara_hits = self.yara_hits,
            "run summary written"
        );
        Ok(path)
    }
}
