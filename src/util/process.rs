use crate::core::error::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Builder for external commands.
///
/// Output is captured and forwarded to the log at debug level; a nonzero
/// exit becomes [`Error::Command`].
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    error_msg: Option<String>,
}

impl Cmd {
    /// Create a command for `program`.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            cwd: None,
            error_msg: None,
        }
    }

    /// Run `script` through `sh -c`, for pipelines and globs.
    pub fn shell(script: impl AsRef<str>) -> Self {
        Self::new("sh").arg("-c").arg(script.as_ref())
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

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Message used in place of the command line when it fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Human-readable command line.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run to completion; fails on a nonzero exit status.
    pub fn run(&self) -> Result<Output> {
        tracing::debug!(command = %self.display(), cwd = ?self.cwd, "running");

        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Command {
                command: self.label(),
                status: format!("failed to start: {}", e),
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!(target: "workload_runner::cmd", "{}", line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            tracing::debug!(target: "workload_runner::cmd", "{}", line);
        }

        if !output.status.success() {
            return Err(Error::Command {
                command: self.label(),
                status: output.status.to_string(),
            });
        }
        Ok(output)
    }

    /// Run to completion and report only whether it exited zero.
    ///
    /// A command that cannot be started is an error.
    pub fn status(&self) -> Result<bool> {
        let status = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| Error::Command {
                command: self.label(),
                status: format!("failed to start: {}", e),
            })?;
        Ok(status.success())
    }

    fn label(&self) -> String {
        self.error_msg.clone().unwrap_or_else(|| self.display())
    }
}
