//! External tool seam.
//!
//! Every collaborator binary is reached through [`ToolRunner`] with a program
//! name and an argument vector. Nothing is ever passed through a shell.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;
use triage_core::ErrorKind;

// ── Invocation ─────────────────────────────────────────────────

/// A program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

// ── Output ─────────────────────────────────────────────────────

/// Captured result of a finished tool process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Successful exit with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Non-zero exit with the given stderr.
    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Last `n` lines of the combined output, for error messages.
    pub fn tail(&self, n: usize) -> String {
        let combined = self.combined();
        let lines: Vec<&str> = combined.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }

    pub fn status_text(&self) -> String {
        match self.code {
            Some(c) => format!("exit code {c}"),
            None => "terminated by signal".to_string(),
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{program}: binary not found")]
    NotFound { program: String },

    #[error("{program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::NotFound { .. } => ErrorKind::ToolUnavailable,
            ToolError::Io { .. } => ErrorKind::ToolFailure,
        }
    }
}

// ── Runner ─────────────────────────────────────────────────────

/// Runs an external tool to completion and captures its output.
pub trait ToolRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;
}

/// [`ToolRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        debug!(command = %invocation, "spawning tool");

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).stdin(Stdio::null());

        let output = command.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound {
                    program: invocation.program.clone(),
                }
            } else {
                ToolError::Io {
                    program: invocation.program.clone(),
                    source: e,
                }
            }
        })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Ask a tool for its version string.
///
/// Returns the trimmed stdout (or stderr when stdout is empty) of a
/// successful run. Spawn failures, non-zero exits and empty output all yield
/// `None`.
pub fn query_version(runner: &dyn ToolRunner, invocation: &Invocation) -> Option<String> {
    match runner.run(invocation) {
        Ok(out) if out.success() => {
            let text = if out.stdout.trim().is_empty() {
                out.stderr.trim()
            } else {
                out.stdout.trim()
            };
            (!text.is_empty()).then(|| text.to_string())
        }
        Ok(out) => {
            debug!(command = %invocation, status = %out.status_text(), "version query failed");
            None
        }
        Err(e) => {
            debug!(command = %invocation, error = %e, "version query failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::testing::RecordingRunner;

    #[test]
    fn invocation_display_joins_args() {
        let inv = Invocation::new("yara")
            .arg("rules.yar")
            .arg(Path::new("/evidence/a b.bin"));
        assert_eq!(inv.to_string(), "yara rules.yar /evidence/a b.bin");
        assert_eq!(inv.args.len(), 2);
    }

    #[test]
    fn missing_binary_is_not_found() {
        let inv = Invocation::new("definitely-not-a-real-triage-binary-7f3a");
        let err = ProcessRunner.run(&inv).unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::ToolUnavailable);
    }

    #[test]
    fn combined_output_and_tail() {
        let out = ToolOutput {
            code: Some(2),
            stdout: "one\ntwo\n".to_string(),
            stderr: "three\n".to_string(),
        };
        assert!(!out.success());
        assert_eq!(out.combined(), "one\ntwo\nthree\n");
        assert_eq!(out.tail(2), "two\nthree");
        assert_eq!(out.status_text(), "exit code 2");
    }

    #[test]
    fn version_query_degrades_to_none() {
        let runner = RecordingRunner::new(|inv| match inv.program.as_str() {
            "yara" => Ok(ToolOutput::ok("4.5.0\n")),
            "psort.py" => Ok(ToolOutput::exit(1, "boom")),
            "hayabusa" => Ok(ToolOutput::ok("   ")),
            program => Err(ToolError::NotFound {
                program: program.to_string(),
            }),
        });

        let q = |p: &str| query_version(&runner, &Invocation::new(p).arg("--version"));
        assert_eq!(q("yara").as_deref(), Some("4.5.0"));
        assert_eq!(q("psort.py"), None);
        assert_eq!(q("hayabusa"), None);
        assert_eq!(q("syft"), None);
        assert_eq!(runner.invocations().len(), 4);
    }
}
