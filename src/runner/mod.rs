//! Emulator runners.

use crate::config::WorkloadConfig;
use crate::core::context::Context;
use crate::core::error::{Error, Result};
use console::ConsoleHandler;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};

pub mod console;

#[cfg(feature = "qemu")]
pub mod qemu;

#[cfg(feature = "spike")]
pub mod spike;

/// What to boot: a kernel binary and optionally a disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    pub bin: PathBuf,
    pub img: Option<PathBuf>,
}

impl LaunchTarget {
    /// Target for launching `config`; the initramfs variant has no disk.
    pub fn for_config(config: &WorkloadConfig, initramfs: bool) -> Self {
        if initramfs {
            Self {
                bin: config.initramfs_bin(),
                img: None,
            }
        } else {
            Self {
                bin: config.bin.clone(),
                img: config.img.clone(),
            }
        }
    }
}

/// Runner trait for booting workloads.
pub trait Runner: Send + Sync {
    /// Boot `target` and block until the guest halts, streaming console output to `console`.
    fn run(
        &self,
        ctx: &Context,
        target: &LaunchTarget,
        console: &mut dyn ConsoleHandler,
    ) -> Result<RunResult>;

    /// Check if the runner is available on the system.
    fn is_available(&self, ctx: &Context) -> bool;

    /// Validate that the runner can boot `target`.
    fn validate(&self, ctx: &Context, target: &LaunchTarget) -> Result<()> {
        if !self.is_available(ctx) {
            return Err(Error::runner(format!(
                "{} is not available on this system",
                self.name()
            )));
        }

        let _ = target;
        Ok(())
    }

    /// Get a human-readable name for this runner.
    fn name(&self) -> &str;
}

/// Result of running an emulator.
#[derive(Debug)]
pub struct RunResult {
    /// Exit code from the emulator.
    pub exit_code: i32,

    /// Whether the run was considered successful.
    pub success: bool,
}

impl RunResult {
    /// Create a new run result.
    pub fn new(exit_code: i32, success: bool) -> Self {
        Self { exit_code, success }
    }

    /// Create a successful result with exit code 0.
    pub fn success() -> Self {
        Self::new(0, true)
    }

    /// Create a failed result with the given exit code.
    pub fn failed(exit_code: i32) -> Self {
        Self::new(exit_code, false)
    }
}

/// Spawn `cmd`, forward its stdout to `console` until it exits.
///
/// Stdin and stderr are inherited so an interactive guest stays usable.
pub(crate) fn stream_console(
    mut cmd: Command,
    name: &str,
    console: &mut dyn ConsoleHandler,
) -> Result<RunResult> {
    cmd.stdin(Stdio::inherit());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    console.on_start(&cmd);
    let mut child = cmd
        .spawn()
        .map_err(|e| Error::runner(format!("failed to execute {}: {}", name, e)))?;

    if let Some(mut stdout) = child.stdout.take() {
        let mut buf = [0u8; 4096];
        loop {
            match stdout.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => console.on_output(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("console read from {} failed: {}", name, e);
                    break;
                }
            }
        }
    }

    let status = child
        .wait()
        .map_err(|e| Error::runner(format!("failed to wait for {}: {}", name, e)))?;
    let exit_code = status.code().unwrap_or(-1);
    console.on_exit(exit_code);
    Ok(RunResult::new(exit_code, status.success()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use console::CaptureHandler;

    #[test]
    fn test_run_result_success() {
        let result = RunResult::success();
        assert_eq!(result.exit_code, 0);
        assert!(result.success);
    }

    #[test]
    fn test_run_result_failed() {
        let result = RunResult::failed(1);
        assert_eq!(result.exit_code, 1);
        assert!(!result.success);
    }

    #[test]
    fn test_launch_target_for_config() {
        let mut config = WorkloadConfig::new("w", "/img/w-bin");
        config.img = Some(PathBuf::from("/img/w.img"));

        let disk = LaunchTarget::for_config(&config, false);
        assert_eq!(disk.bin, PathBuf::from("/img/w-bin"));
        assert_eq!(disk.img, Some(PathBuf::from("/img/w.img")));

        let ramfs = LaunchTarget::for_config(&config, true);
        assert_eq!(ramfs.bin, PathBuf::from("/img/w-bin-initramfs"));
        assert!(ramfs.img.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_stream_console_captures_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo guest; exit 3"]);
        let mut console = CaptureHandler::new();
        let result = stream_console(cmd, "sh", &mut console).unwrap();
        assert_eq!(console.output(), "guest\n");
        assert_eq!(result.exit_code, 3);
        assert!(!result.success);
        assert_eq!(console.exit_code(), Some(3));
    }
}
