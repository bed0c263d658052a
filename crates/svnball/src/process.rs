//! Captured execution of external tools.
//!
//! Every subprocess is spawned from an explicit argument vector, never
//! through a shell, so repository URLs reach `svn` verbatim.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::ExitStatusDisplay;

/// Environment variables stripped before running a tool. A host-injected
/// `DYLD_LIBRARY_PATH` breaks the svn client on macOS.
const SCRUBBED_ENV: &[&str] = &["DYLD_LIBRARY_PATH"];

#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub enum RunError {
    Spawn(std::io::Error),
    TimedOut,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn exit_status(&self) -> ExitStatusDisplay {
        ExitStatusDisplay(self.status.code())
    }

    /// stdout followed by stderr, trimmed, for diagnostics.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (false, true) => stdout.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Human readable command line, used in logs and error messages.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Run to completion, capturing both output streams.
    ///
    /// The child is killed if `timeout` elapses first.
    pub async fn run(&self, timeout: Duration) -> Result<CapturedOutput, RunError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for var in SCRUBBED_ENV {
            cmd.env_remove(var);
        }

        debug!(command = %self.display(), "Running external tool");

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(RunError::Spawn)?,
            Err(_) => return Err(RunError::TimedOut),
        };

        Ok(CapturedOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
