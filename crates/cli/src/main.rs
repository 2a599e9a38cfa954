mod cli;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use triage_core::Profile;
use triage_pipeline::{Pipeline, ProcessRunner, ProvenanceRecorder, RunRequest};

use crate::cli::{CliArgs, Command};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    match args.command {
        Command::Run {
            evidence,
            out,
            profile,
        } => run(evidence, out, profile),
        Command::Version { profile } => version(profile.as_deref()),
        Command::Selftest { out } => {
            let path = selftest(&out)?;
            info!(path = %path.display(), "selftest ok");
            println!("selftest ok");
            Ok(())
        }
    }
}

fn load_profile(path: Option<&Path>) -> Result<Profile> {
    match path {
        Some(p) => Profile::load(p)
            .with_context(|| format!("failed to load profile {}", p.display())),
        None => Ok(Profile::default()),
    }
}

fn run(evidence: PathBuf, out: PathBuf, profile_path: Option<PathBuf>) -> Result<()> {
    let profile = load_profile(profile_path.as_deref())?;
    profile.log_summary();

    let request = RunRequest {
        evidence,
        out_dir: out,
        profile_path,
    };
    let output = Pipeline::new(&ProcessRunner)
        .run(&profile, &request)
        .context("triage run aborted")?;

    for outcome in &output.outcomes {
        let note = match (&outcome.error, &outcome.detail) {
            (Some(e), _) => format!(" ({e})"),
            (None, Some(d)) => format!(" ({d})"),
            (None, None) => String::new(),
        };
        println!("{:<10} {}{}", outcome.stage, outcome.status, note);
    }
    if let Some(path) = &output.summary_path {
        println!("Done. Report: {}", path.display());
    }
    Ok(())
}

fn version(profile_path: Option<&Path>) -> Result<()> {
    let profile = load_profile(profile_path)?;
    let versions = ProvenanceRecorder::new(&ProcessRunner, &profile).tool_versions();
    println!("{}", serde_json::to_string_pretty(&versions)?);
    Ok(())
}

/// Write `selftest.txt` under `out`, creating the directory.
fn selftest(out: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out)
        .with_context(|| format!("failed to create {}", out.display()))?;
    let path = out.join("selftest.txt");
    fs::write(&path, "triage selftest ok\n")
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selftest_writes_marker() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("nested/out");
        let path = selftest(&out).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "triage selftest ok\n");
    }

    #[test]
    fn missing_profile_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_profile(Some(dir.path().join("nope.yml").as_path())).is_err());
        assert_eq!(load_profile(None).unwrap(), Profile::default());
    }
}
