//! Console handlers for emulator output.
//!
//! - [`TeeHandler`]: echoes console output to stdout and optionally a log file
//! - [`CaptureHandler`]: accumulates output for inspection after the run

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;

/// Receives console output from a running emulator.
pub trait ConsoleHandler: Send {
    /// Called before the emulator starts with the command being executed.
    fn on_start(&mut self, command: &Command) {
        let _ = command;
    }

    /// Called when console bytes arrive.
    fn on_output(&mut self, data: &[u8]);

    /// Called when the emulator exits.
    fn on_exit(&mut self, exit_code: i32) {
        let _ = exit_code;
    }
}

/// Handler that accumulates all console bytes.
#[derive(Debug, Default)]
pub struct CaptureHandler {
    output: Vec<u8>,
    exit_code: Option<i32>,
}

impl CaptureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output captured so far, lossily decoded.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

impl ConsoleHandler for CaptureHandler {
    fn on_output(&mut self, data: &[u8]) {
        self.output.extend_from_slice(data);
    }

    fn on_exit(&mut self, exit_code: i32) {
        self.exit_code = Some(exit_code);
    }
}

/// Handler that echoes output to stdout and, if configured, a log file.
#[derive(Debug, Default)]
pub struct TeeHandler {
    log: Option<File>,
}

impl TeeHandler {
    /// Echo to stdout only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo to stdout and write everything to `path` (created or truncated).
    pub fn with_log(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            log: Some(File::create(path)?),
        })
    }
}

impl ConsoleHandler for TeeHandler {
    fn on_start(&mut self, command: &Command) {
        tracing::debug!(command = ?command, "starting emulator");
    }

    fn on_output(&mut self, data: &[u8]) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(data);
        let _ = stdout.flush();
        if let Some(log) = &mut self.log {
            if let Err(e) = log.write_all(data) {
                tracing::warn!("failed to write console log: {}", e);
                self.log = None;
            }
        }
    }

    fn on_exit(&mut self, exit_code: i32) {
        if let Some(log) = &mut self.log {
            let _ = log.flush();
        }
        tracing::debug!(exit_code, "emulator exited");
    }
}
