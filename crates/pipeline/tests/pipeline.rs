//! End-to-end runs of the default pipeline against fake collaborator tools.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use triage_core::{ErrorKind, Profile, TriageError};
use triage_pipeline::testing::RecordingRunner;
use triage_pipeline::{
    Invocation, Pipeline, ProvenanceRecord, RunRequest, RunSummary, StageStatus, ToolError,
    ToolOutput,
};

const EXPORT: &str = concat!(
    r#"{"EventID":"4625","LogonType":"10","Computer":"WS01"}"#,
    "\n",
    r#"{"EventID":"4624","LogonType":"2","Computer":"WS01"}"#,
    "\n",
);

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn profile() -> Profile {
    let mut profile = Profile::default();
    profile.detections.sigma.rules_dir = workspace_root().join("data/rules/sigma");
    profile.detections.yara.rules_dir = workspace_root().join("data/rules/yara");
    profile.timeline.hayabusa.enabled = true;
    profile
}

fn arg_after<'a>(inv: &'a Invocation, flag: &str) -> &'a std::ffi::OsString {
    let i = inv.args.iter().position(|a| a == flag).unwrap();
    &inv.args[i + 1]
}

fn is_version_probe(inv: &Invocation) -> bool {
    inv.args.first().is_some_and(|a| a == "--version" || a == "version")
}

/// Plaso and hayabusa are installed and behave; yara is not installed.
fn fake_tools() -> RecordingRunner {
    RecordingRunner::new(respond)
}

/// Like [`fake_tools`], but hayabusa crashes without writing anything.
fn crashing_hayabusa() -> RecordingRunner {
    RecordingRunner::new(|inv| {
        if inv.program == "hayabusa" && !is_version_probe(inv) {
            return Ok(ToolOutput::exit(2, "crash"));
        }
        respond(inv)
    })
}

fn respond(inv: &Invocation) -> Result<ToolOutput, ToolError> {
    if is_version_probe(inv) {
        return Ok(ToolOutput::ok(format!("{} 1.0", inv.program)));
    }
    match inv.program.as_str() {
        "log2timeline.py" => {
            fs::write(&inv.args[inv.args.len() - 2], b"plaso").unwrap();
            Ok(ToolOutput::ok("Processing completed."))
        }
        "psort.py" => {
            fs::write(arg_after(inv, "-w"), EXPORT).unwrap();
            Ok(ToolOutput::ok(""))
        }
        "hayabusa" => {
            fs::write(arg_after(inv, "-o"), "{\"level\":\"high\"}\n").unwrap();
            Ok(ToolOutput::ok(""))
        }
        program => Err(ToolError::NotFound {
            program: program.to_string(),
        }),
    }
}

struct Run {
    _dir: TempDir,
    request: RunRequest,
}

fn request() -> Run {
    let dir = TempDir::new().unwrap();
    let evidence = dir.path().join("evidence");
    fs::create_dir_all(evidence.join("Windows/System32/winevt/Logs")).unwrap();
    fs::write(evidence.join("Windows/System32/winevt/Logs/Security.evtx"), b"ElfFile").unwrap();
    fs::write(evidence.join("notes.txt"), b"case 42").unwrap();
    let request = RunRequest {
        evidence,
        out_dir: dir.path().join("out"),
        profile_path: None,
    };
    Run { _dir: dir, request }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn stages_run_in_order_and_failures_are_isolated() {
    let run = request();
    let runner = fake_tools();
    let profile = profile();

    let output = Pipeline::new(&runner).run(&profile, &run.request).unwrap();

    let statuses: Vec<(&str, StageStatus)> = output
        .outcomes
        .iter()
        .map(|o| (o.stage.as_str(), o.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("timeline", StageStatus::Succeeded),
            ("sigma", StageStatus::Succeeded),
            ("yara", StageStatus::Failed),
            ("memory", StageStatus::Skipped),
            ("hayabusa", StageStatus::Succeeded),
        ]
    );
    let yara = output.outcome("yara").unwrap();
    assert_eq!(yara.error.as_ref().unwrap().kind, ErrorKind::ToolUnavailable);

    let out = &run.request.out_dir;
    let findings: Vec<Value> = read_json(&out.join("sigma_findings.json"));
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["rule"], "Failed RDP Logon");
    assert_eq!(findings[0]["event"]["EventID"], "4625");

    // The failed scanner still leaves a well-formed, empty hit list.
    let hits: Vec<Value> = read_json(&out.join("yara_hits.json"));
    assert!(hits.is_empty());

    let summary: RunSummary = read_json(output.summary_path.as_ref().unwrap());
    assert_eq!(summary.events, 2);
    assert_eq!(summary.sigma_matches, 1);
    assert_eq!(summary.yara_hits, 0);
    assert_eq!(summary.stages.len(), 5);

    for name in [
        "timeline.plaso",
        "events.jsonl",
        "timeline.index",
        "memprocfs_processes.jsonl",
        "memprocfs_summary.json",
        "hayabusa_out/hayabusa_timeline.jsonl",
        "hayabusa_out/hayabusa_summary.json",
        "provenance.json",
        "triage_report.json",
    ] {
        assert!(out.join(name).exists(), "missing artifact {name}");
    }
    assert!(out.join("memprocfs_eventlogs").is_dir());
}

#[test]
fn provenance_is_stable_across_runs() {
    let first = request();
    let runner = fake_tools();
    let profile = profile();

    let a = Pipeline::new(&runner).run(&profile, &first.request).unwrap();
    let mut second = first.request.clone();
    second.out_dir = first.request.out_dir.with_file_name("out-again");
    let b = Pipeline::new(&runner).run(&profile, &second).unwrap();

    let pa: ProvenanceRecord = read_json(a.provenance_path.as_ref().unwrap());
    let pb: ProvenanceRecord = read_json(b.provenance_path.as_ref().unwrap());

    assert_eq!(pa.schema, "triage-provenance/1");
    assert!(pa.inputs.evidence.sha256.is_some());
    assert_eq!(pa.inputs.evidence, pb.inputs.evidence);
    assert_eq!(pa.inputs.evidence.file_count, 2);
    assert_eq!(pa.rules, pb.rules);
    assert!(pa.rules.iter().all(|r| r.sha256.is_some()));
    assert_eq!(pa.tool_versions["plaso"].as_deref(), Some("log2timeline.py 1.0"));

    let findings = |p: &ProvenanceRecord| {
        p.outputs
            .iter()
            .find(|o| o.name == "sigma_findings.json")
            .and_then(|o| o.sha256.clone())
    };
    assert!(findings(&pa).is_some());
    assert_eq!(findings(&pa), findings(&pb));
}

#[test]
fn disabled_stages_invoke_nothing_but_version_probes() {
    let run = request();
    let runner = fake_tools();
    let mut profile = profile();
    profile.timeline.plaso.enabled = false;
    profile.timeline.hayabusa.enabled = false;
    profile.detections.sigma.enabled = false;
    profile.detections.yara.enabled = false;

    let output = Pipeline::new(&runner).run(&profile, &run.request).unwrap();

    assert!(output
        .outcomes
        .iter()
        .all(|o| o.status == StageStatus::Skipped && !o.enabled));
    assert!(runner
        .invocations()
        .iter()
        .all(|inv| inv.args.len() == 1 && inv.args[0].to_string_lossy().contains("version")));
    assert_eq!(
        fs::read_to_string(run.request.out_dir.join("sigma_findings.json")).unwrap(),
        "[]\n"
    );
}

#[test]
fn unusable_output_directory_is_fatal() {
    let run = request();
    let blocker = run.request.evidence.join("notes.txt");
    let request = RunRequest {
        out_dir: blocker.join("out"),
        ..run.request.clone()
    };
    let runner = fake_tools();

    let err = Pipeline::new(&runner)
        .run(&profile(), &request)
        .unwrap_err();

    assert!(matches!(err, TriageError::OutputDir { .. }));
    assert!(runner.invocations().is_empty());
}

#[test]
fn profile_path_is_hashed() {
    let run = request();
    let profile_path = run.request.out_dir.with_file_name("profile.yml");
    fs::write(&profile_path, "timeline:\n  hayabusa:\n    enabled: true\n").unwrap();
    let request = RunRequest {
        profile_path: Some(profile_path.clone()),
        ..run.request.clone()
    };
    let runner = fake_tools();

    let output = Pipeline::new(&runner).run(&profile(), &request).unwrap();

    let record: ProvenanceRecord = read_json(output.provenance_path.as_ref().unwrap());
    assert_eq!(record.inputs.profile_path, Some(profile_path.clone()));
    assert_eq!(
        record.inputs.profile_sha256,
        Some(triage_pipeline::hash_file(&profile_path).unwrap())
    );
}

#[test]
fn rerun_does_not_credit_a_crashed_tool_with_old_output() {
    let run = request();
    let mut profile = profile();
    profile.timeline.hayabusa.enabled = false;
    let first = Pipeline::new(&fake_tools()).run(&profile, &run.request).unwrap();
    assert_eq!(first.outcome("hayabusa").unwrap().status, StageStatus::Skipped);
    assert!(run.request.out_dir.join("hayabusa_out/hayabusa_timeline.jsonl").exists());

    profile.timeline.hayabusa.enabled = true;
    let second = Pipeline::new(&crashing_hayabusa())
        .run(&profile, &run.request)
        .unwrap();

    let hayabusa = second.outcome("hayabusa").unwrap();
    assert_eq!(hayabusa.status, StageStatus::Failed);
    let error = hayabusa.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::ToolFailure);
    assert!(error.message.contains("exit code 2"));
}

#[test]
fn skipped_stage_does_not_report_findings_of_an_earlier_run() {
    let run = request();
    let out = &run.request.out_dir;
    fs::create_dir_all(out).unwrap();
    fs::write(out.join("sigma_findings.json"), r#"[{"rule":"earlier run"}]"#).unwrap();
    let mut profile = profile();
    profile.detections.sigma.enabled = false;

    let output = Pipeline::new(&fake_tools()).run(&profile, &run.request).unwrap();

    assert_eq!(output.outcome("sigma").unwrap().status, StageStatus::Skipped);
    assert_eq!(
        fs::read_to_string(out.join("sigma_findings.json")).unwrap(),
        "[]\n"
    );
    let summary: RunSummary = read_json(output.summary_path.as_ref().unwrap());
    assert_eq!(summary.sigma_matches, 0);

    let record: ProvenanceRecord = read_json(output.provenance_path.as_ref().unwrap());
    let findings = record
        .outputs
        .iter()
        .find(|o| o.name == "sigma_findings.json")
        .unwrap();
    assert_eq!(
        findings.sha256,
        Some(triage_pipeline::hash_file(&out.join("sigma_findings.json")).unwrap())
    );
}
