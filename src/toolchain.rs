//! External tool invocation
//!
//! Every call to an external program goes through [`ToolInvocation::run`], which always returns a
//! structured [`ToolOutput`] (exit code plus captured stdout/stderr) or a [`LaunchError`]. Callers
//! have to inspect the result; nothing is fire-and-forget.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

/// Apply the platform's executable-name convention (`.exe` on Windows).
pub fn executable_name(stem: &str) -> String {
    if cfg!(windows) {
        format!("{stem}.exe")
    } else {
        stem.to_string()
    }
}

/// Resolve a program name through PATH. Paths with a directory component are checked as given.
pub fn resolve(program: impl AsRef<OsStr>) -> Result<PathBuf, LaunchError> {
    let program = program.as_ref();
    which::which(program).map_err(|source| LaunchError::NotFound {
        program: program.to_string_lossy().into_owned(),
        source,
    })
}

/// The program could not be started at all.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("`{program}` was not found: {source}")]
    NotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// A single external tool call, built up argument by argument.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            current_dir: None,
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
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Run to completion with stdin closed, capturing stdout and stderr.
    pub fn run(&self) -> Result<ToolOutput, LaunchError> {
        let path = resolve(&self.program)?;
        tracing::debug!(command = %self, "invoking tool");

        let mut command = Command::new(&path);
        command.args(&self.args).stdin(Stdio::null());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|source| LaunchError::Spawn {
            program: self.program.to_string_lossy().into_owned(),
            source,
        })?;

        let result = ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(exit_code = ?result.exit_code, "tool finished");
        Ok(result)
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Result of a completed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Human-readable failure text: exit status followed by both captured streams.
    pub fn diagnostic(&self) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        format!(
            "{}\nstdout:\n{}\nstderr:\n{}",
            status,
            self.stdout.trim_end(),
            self.stderr.trim_end()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_name_convention() {
        let name = executable_name("testbench");
        if cfg!(windows) {
            assert_eq!(name, "testbench.exe");
        } else {
            assert_eq!(name, "testbench");
        }
    }

    #[test]
    fn test_display_joins_program_and_args() {
        let inv = ToolInvocation::new("ld.lld").args(["-e", "0x0"]).arg("test.o");
        assert_eq!(inv.to_string(), "ld.lld -e 0x0 test.o");
        assert_eq!(inv.get_args().len(), 3);
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let err = ToolInvocation::new("rvconform-definitely-missing-tool").run().unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
        assert!(err.to_string().contains("rvconform-definitely-missing-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_streams_and_exit_code() {
        let out = ToolInvocation::new("sh")
            .args(["-c", "echo out; echo err 1>&2; exit 3"])
            .run()
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.diagnostic(), "exit code 3\nstdout:\nout\nstderr:\nerr");
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = ToolInvocation::new("sh")
            .args(["-c", "pwd"])
            .current_dir(dir.path())
            .run()
            .unwrap();
        assert!(out.success());
        let reported = std::fs::canonicalize(out.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }
}
