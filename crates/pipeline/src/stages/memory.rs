//! Memory-image triage through a MemProcFS-style exporter process.
//!
//! The exporter writes a scratch tree under the output directory:
//!
//! ```text
//! memprocfs_export/
//!   processes.jsonl     one JSON object per process
//!   maps/<map>.json     system-wide maps: net, kdriver, kdevice, kobject,
//!                       services, users
//!   eventlog/*.evtx     event logs recovered from memory
//! ```
//!
//! Post-processing normalizes the process list, summarizes it, copies the
//! enabled maps to `memprocfs_<map>.json` and copies the event logs to where
//! the hayabusa stage looks for them.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use triage_core::config::{MemoryMaps, ProcessOptions};
use triage_core::Profile;
use walkdir::WalkDir;

use super::{run_producing, write_json};
use crate::stage::{Artifact, ArtifactKind, Discovery, Stage, StageContext, StageError, StageInput};
use crate::tool::Invocation;

pub const PROCESSES_FILE: &str = "memprocfs_processes.jsonl";
pub const SUMMARY_FILE: &str = "memprocfs_summary.json";
pub const EVENTLOG_DIR: &str = "memprocfs_eventlogs";
pub const SCRATCH_DIR: &str = "memprocfs_export";

const IMAGE_EXTENSIONS: [&str; 4] = ["raw", "vmem", "dmp", "bin"];

/// Per-process lists the exporter may emit.
const PROCESS_LISTS: [&str; 4] = ["modules", "handles", "threads", "unloaded_modules"];

/// Stable output name of a system-wide map.
pub fn map_file(map: &str) -> String {
    format!("memprocfs_{map}.json")
}

/// Where extracted event logs land for this profile and output directory.
pub fn eventlog_dir(profile: &Profile, out_dir: &Path) -> PathBuf {
    profile
        .memory
        .memprocfs
        .eventlog_dir
        .clone()
        .unwrap_or_else(|| out_dir.join(EVENTLOG_DIR))
}

/// First file under `evidence` (sorted walk) with a memory-image extension.
pub fn find_memory_image(evidence: &Path) -> Option<PathBuf> {
    WalkDir::new(evidence)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
}

#[derive(Debug, Serialize)]
struct ProcessSummary {
    process_count: usize,
    pids: Vec<i64>,
    created_at_utc: String,
}

pub struct MemoryStage;

impl Stage for MemoryStage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn enabled(&self, profile: &Profile) -> bool {
        profile.memory.memprocfs.enabled
    }

    fn artifacts(&self, ctx: &StageContext<'_>) -> Vec<Artifact> {
        let mut artifacts = vec![
            Artifact::in_dir(ctx.out_dir, PROCESSES_FILE, ArtifactKind::Lines),
            Artifact::in_dir(ctx.out_dir, SUMMARY_FILE, ArtifactKind::JsonObject),
        ];
        artifacts.extend(
            ctx.profile
                .memory
                .memprocfs
                .maps
                .enabled()
                .into_iter()
                .map(|map| Artifact::in_dir(ctx.out_dir, &map_file(map), ArtifactKind::JsonArray)),
        );
        artifacts.push(Artifact::new(
            EVENTLOG_DIR,
            eventlog_dir(ctx.profile, ctx.out_dir),
            ArtifactKind::Directory,
        ));
        artifacts
    }

    fn discover(&self, ctx: &StageContext<'_>) -> Option<StageInput> {
        let mut discovery =
            Discovery::new().configured(ctx.profile.memory.memprocfs.device.as_deref());
        if let Some(image) = find_memory_image(ctx.evidence) {
            discovery = discovery.default_path(image);
        }
        discovery.resolve(Path::is_file)
    }

    fn execute(
        &self,
        input: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<String>, StageError> {
        let cfg = &ctx.profile.memory.memprocfs;
        let scratch = ctx.out_dir.join(SCRATCH_DIR);
        if scratch.exists() {
            fs::remove_dir_all(&scratch)?;
        }
        fs::create_dir_all(&scratch)?;

        let mut invocation = Invocation::new(&cfg.binary)
            .arg("-device")
            .arg(&input.path);
        if cfg.forensic {
            invocation = invocation.args(["-forensic", "1"]);
        }
        let invocation = invocation.args(&cfg.extra_args).arg("-out").arg(&scratch);

        let exported = scratch.join("processes.jsonl");
        let note = run_producing(ctx, &invocation, &exported)?;

        // Post-processing never changes the stage status.
        let mut notes: Vec<String> = note.into_iter().collect();
        match normalize_processes(&exported, &ctx.out_dir.join(PROCESSES_FILE), &cfg.processes) {
            Ok((count, pids)) => {
                let summary = ProcessSummary {
                    process_count: count,
                    pids: sorted(pids),
                    created_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                };
                if let Err(e) = write_json(&ctx.out_dir.join(SUMMARY_FILE), &summary) {
                    warn!(error = %e, "failed to write process summary");
                }
                notes.push(format!("{} processes", summary.process_count));
            }
            Err(e) => warn!(path = %exported.display(), error = %e, "failed to normalize processes"),
        }

        let collected = collect_maps(&scratch.join("maps"), ctx.out_dir, &cfg.maps);
        notes.push(format!("{collected} maps"));

        let dest = eventlog_dir(ctx.profile, ctx.out_dir);
        match copy_eventlogs(&scratch.join("eventlog"), &dest, cfg.max_eventlog_bytes) {
            Ok(copied) => {
                info!(copied, dest = %dest.display(), "event logs extracted");
                notes.push(format!("{copied} event logs"));
            }
            Err(e) => warn!(error = %e, "failed to copy event logs"),
        }

        Ok(Some(notes.join("; ")))
    }
}

fn sorted(mut pids: Vec<i64>) -> Vec<i64> {
    pids.sort_unstable();
    pids
}

/// Rewrite the exported process list, dropping excluded per-process lists
/// and capping `handles` / `threads`. Returns the process count and the pids
/// seen. Malformed lines are dropped.
fn normalize_processes(
    src: &Path,
    dest: &Path,
    options: &ProcessOptions,
) -> std::io::Result<(usize, Vec<i64>)> {
    let reader = BufReader::new(fs::File::open(src)?);
    let mut writer = BufWriter::new(fs::File::create(dest)?);
    let mut count = 0;
    let mut pids = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut process = match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!("skipping malformed process record");
                continue;
            }
        };

        let included = [
            options.include_modules,
            options.include_handles,
            options.include_threads,
            options.include_unloaded_modules,
        ];
        for (key, keep) in PROCESS_LISTS.iter().zip(included) {
            if !keep {
                process.remove(*key);
            }
        }
        if options.include_handles {
            truncate_list(&mut process, "handles", options.max_handles_per_process);
        }
        if options.include_threads {
            truncate_list(&mut process, "threads", options.max_threads_per_process);
        }
        if let Some(pid) = process.get("pid").and_then(Value::as_i64) {
            pids.push(pid);
        }

        serde_json::to_writer(&mut writer, &process)?;
        writer.write_all(b"\n")?;
        count += 1;
    }

    writer.flush()?;
    Ok((count, pids))
}

fn truncate_list(process: &mut Map<String, Value>, key: &str, cap: usize) {
    let truncated = match process.get_mut(key) {
        Some(Value::Array(items)) if items.len() > cap => {
            items.truncate(cap);
            true
        }
        _ => false,
    };
    if truncated {
        process.insert(format!("{key}_truncated"), Value::Bool(true));
    }
}

/// Copy each enabled map from the export into `memprocfs_<map>.json` under
/// `out_dir`. Maps the exporter did not produce, or produced as invalid JSON,
/// are left to their placeholders. Returns the number of maps written.
fn collect_maps(src: &Path, out_dir: &Path, maps: &MemoryMaps) -> usize {
    let mut written = 0;
    for map in maps.enabled() {
        let path = src.join(format!("{map}.json"));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!(map, path = %path.display(), error = %e, "map not exported");
                continue;
            }
        };
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!(map, path = %path.display(), error = %e, "malformed map export");
                continue;
            }
        };
        match write_json(&out_dir.join(map_file(map)), &value) {
            Ok(()) => written += 1,
            Err(e) => warn!(map, error = %e, "failed to write map"),
        }
    }
    written
}

/// Copy `*.evtx` files of at most `max_bytes` from `src` into `dest`.
fn copy_eventlogs(src: &Path, dest: &Path, max_bytes: u64) -> std::io::Result<usize> {
    fs::create_dir_all(dest)?;
    if !src.is_dir() {
        return Ok(0);
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(src)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("evtx"))
        })
        .collect();
    entries.sort();

    let mut copied = 0;
    for path in entries {
        let size = match fs::metadata(&path) {
            Ok(m) if m.is_file() => m.len(),
            _ => continue,
        };
        if size == 0 {
            continue;
        }
        if size > max_bytes {
            warn!(path = %path.display(), size, max_bytes, "event log over size limit, skipping");
            continue;
        }
        let Some(name) = path.file_name() else { continue };
        match fs::copy(&path, dest.join(name)) {
            Ok(_) => copied += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to copy event log"),
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageStatus;
    use crate::stages::fixture::Workspace;
    use crate::testing::RecordingRunner;
    use crate::tool::ToolOutput;
    use triage_core::ErrorKind;

    /// Fake exporter writing three processes, three maps and two event logs.
    fn exporter() -> RecordingRunner {
        RecordingRunner::new(|inv| {
            let scratch = PathBuf::from(inv.args.last().unwrap());
            fs::create_dir_all(scratch.join("eventlog")).unwrap();
            fs::create_dir_all(scratch.join("maps")).unwrap();
            fs::write(scratch.join("maps/net.json"), r#"[{"src":"10.0.0.5:445"}]"#).unwrap();
            fs::write(scratch.join("maps/kobject.json"), r#"[{"name":"\\Device"}]"#).unwrap();
            fs::write(scratch.join("maps/users.json"), "not json").unwrap();
            let processes = [
                r#"{"pid":4,"name":"System","handles":[1,2,3,4],"threads":[1],"modules":[{"name":"ntoskrnl.exe"}]}"#,
                r#"{"pid":1200,"name":"lsass.exe","handles":[1],"threads":[1,2,3]}"#,
                r#"{"pid":88,"name":"smss.exe"}"#,
                "garbage",
            ];
            fs::write(scratch.join("processes.jsonl"), processes.join("\n")).unwrap();
            fs::write(scratch.join("eventlog/Security.evtx"), vec![0u8; 16]).unwrap();
            fs::write(scratch.join("eventlog/Huge.evtx"), vec![0u8; 4096]).unwrap();
            fs::write(scratch.join("eventlog/notes.txt"), "x").unwrap();
            Ok(ToolOutput::ok(""))
        })
    }

    fn enabled_workspace() -> Workspace {
        let mut ws = Workspace::new();
        ws.profile.memory.memprocfs.enabled = true;
        ws.profile.memory.memprocfs.max_eventlog_bytes = 1024;
        ws.profile.memory.memprocfs.processes = ProcessOptions {
            max_handles_per_process: 2,
            max_threads_per_process: 2,
            ..ProcessOptions::default()
        };
        fs::create_dir_all(ws.evidence.join("mem")).unwrap();
        fs::write(ws.evidence.join("mem/host.VMEM"), "image").unwrap();
        fs::write(ws.evidence.join("notes.txt"), "x").unwrap();
        ws
    }

    #[test]
    fn discovers_image_by_extension() {
        let ws = enabled_workspace();
        let found = find_memory_image(&ws.evidence).unwrap();
        assert!(found.ends_with("mem/host.VMEM"));
    }

    #[test]
    fn exports_and_post_processes() {
        let ws = enabled_workspace();
        let runner = exporter();

        let outcome = ws.run(&MemoryStage, &runner, &[]);

        assert_eq!(outcome.status, StageStatus::Succeeded);
        let call = &runner.invocations()[0];
        assert_eq!(
            call.to_string(),
            format!(
                "memprocfs -device {} -forensic 1 -out {}",
                ws.evidence.join("mem/host.VMEM").display(),
                ws.out.join(SCRATCH_DIR).display()
            )
        );

        let text = fs::read_to_string(ws.out.join(PROCESSES_FILE)).unwrap();
        let records: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["handles"].as_array().unwrap().len(), 2);
        assert_eq!(records[0]["handles_truncated"], true);
        assert!(records[0].get("threads_truncated").is_none());
        assert_eq!(records[1]["threads_truncated"], true);
        assert_eq!(records[0]["modules"][0]["name"], "ntoskrnl.exe");

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(ws.out.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(summary["process_count"], 3);
        assert_eq!(summary["pids"], serde_json::json!([4, 88, 1200]));
        assert!(summary["created_at_utc"].as_str().unwrap().ends_with('Z'));

        let logs = ws.out.join(EVENTLOG_DIR);
        assert!(logs.join("Security.evtx").is_file());
        assert!(!logs.join("Huge.evtx").exists());
        assert!(!logs.join("notes.txt").exists());
    }

    #[test]
    fn copies_enabled_maps() {
        let ws = enabled_workspace();
        let runner = exporter();

        let outcome = ws.run(&MemoryStage, &runner, &[]);

        let read = |name: &str| -> Value {
            serde_json::from_str(&fs::read_to_string(ws.out.join(name)).unwrap()).unwrap()
        };
        assert_eq!(read("memprocfs_net.json")[0]["src"], "10.0.0.5:445");
        // Enabled but not exported, or exported as garbage: placeholder.
        assert_eq!(read("memprocfs_kdriver.json"), serde_json::json!([]));
        assert_eq!(read("memprocfs_users.json"), serde_json::json!([]));
        // Exported but disabled by default.
        assert!(!ws.out.join("memprocfs_kobject.json").exists());
        assert!(outcome.detail.unwrap().contains("1 maps"));
        assert!(outcome.artifacts.contains(&ws.out.join("memprocfs_services.json")));
    }

    #[test]
    fn excluded_process_lists_are_dropped() {
        let mut ws = enabled_workspace();
        ws.profile.memory.memprocfs.processes.include_handles = false;
        ws.profile.memory.memprocfs.processes.include_modules = false;
        let runner = exporter();

        ws.run(&MemoryStage, &runner, &[]);

        let text = fs::read_to_string(ws.out.join(PROCESSES_FILE)).unwrap();
        let first: Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert!(first.get("handles").is_none());
        assert!(first.get("handles_truncated").is_none());
        assert!(first.get("modules").is_none());
        assert_eq!(first["threads"], serde_json::json!([1]));
    }

    #[test]
    fn stale_export_is_not_reused() {
        let ws = enabled_workspace();
        let scratch = ws.out.join(SCRATCH_DIR);
        fs::create_dir_all(&scratch).unwrap();
        fs::write(scratch.join("processes.jsonl"), r#"{"pid":1}"#).unwrap();
        let runner = RecordingRunner::new(|_| Ok(ToolOutput::exit(1, "crash")));

        let outcome = ws.run(&MemoryStage, &runner, &[]);

        assert_eq!(outcome.status, StageStatus::Failed);
        assert!(!scratch.join("processes.jsonl").exists());
        assert_eq!(fs::read_to_string(ws.out.join(PROCESSES_FILE)).unwrap(), "");
    }

    #[test]
    fn forensic_flag_is_optional() {
        let mut ws = enabled_workspace();
        ws.profile.memory.memprocfs.forensic = false;
        ws.profile.memory.memprocfs.extra_args = vec!["-v".to_string()];
        let runner = exporter();

        ws.run(&MemoryStage, &runner, &[]);

        let call = runner.invocations()[0].to_string();
        assert!(!call.contains("-forensic"));
        assert!(call.contains(" -v -out "));
    }

    #[test]
    fn no_image_skips() {
        let mut ws = Workspace::new();
        ws.profile.memory.memprocfs.enabled = true;
        let runner = exporter();

        let outcome = ws.run(&MemoryStage, &runner, &[]);

        assert_eq!(outcome.status, StageStatus::Skipped);
        assert!(runner.invocations().is_empty());
        assert_eq!(
            fs::read_to_string(ws.out.join(SUMMARY_FILE)).unwrap(),
            "{}\n"
        );
    }

    #[test]
    fn exporter_failure_without_output_fails() {
        let ws = enabled_workspace();
        let runner = RecordingRunner::new(|_| Ok(ToolOutput::exit(3, "bad image")));

        let outcome = ws.run(&MemoryStage, &runner, &[]);

        assert_eq!(outcome.status, StageStatus::Failed);
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::ToolFailure);
        assert!(ws.out.join(EVENTLOG_DIR).is_dir());
    }
}
