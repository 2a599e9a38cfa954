use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Forensic triage orchestrator.
///
/// Stages timeline extraction, rule-based detection, pattern scanning and
/// memory triage over a body of evidence and records a verifiable
/// provenance manifest of the run.
#[derive(Parser, Debug)]
#[command(name = "triage", version, about)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the triage pipeline.
    Run {
        /// Evidence directory.
        #[arg(long, short = 'e')]
        evidence: PathBuf,

        /// Output directory. Created if missing.
        #[arg(long, short = 'o')]
        out: PathBuf,

        /// Profile YAML. Built-in defaults when omitted.
        #[arg(long, short = 'p')]
        profile: Option<PathBuf>,
    },

    /// Print the versions of the external tools as JSON.
    Version {
        /// Profile YAML naming the tool binaries.
        #[arg(long, short = 'p')]
        profile: Option<PathBuf>,
    },

    /// Write a marker file to check that the output location is usable.
    Selftest {
        #[arg(long, short = 'o')]
        out: PathBuf,
    },
}
