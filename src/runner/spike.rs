use super::console::ConsoleHandler;
use super::{LaunchTarget, RunResult, Runner, stream_console};
use crate::config::SpikeConfig;
use crate::core::context::Context;
use crate::core::error::{Error, Result};
use crate::util::fs::check_command_available;
use std::process::Command;

/// Functional ISA simulator runner. Boots binaries only; no block devices.
pub struct SpikeRunner;

impl SpikeRunner {
    pub fn new() -> Self {
        Self
    }

    /// Build the Spike command line for `target`.
    pub fn command(&self, config: &SpikeConfig, target: &LaunchTarget) -> Command {
        let mut cmd = Command::new(&config.binary);
        cmd.arg(format!("-p{}", config.cores));
        cmd.arg(format!("-m{}", config.memory));
        for arg in &config.extra_args {
            cmd.arg(arg);
        }
        cmd.arg(&target.bin);
        cmd
    }
}

impl Default for SpikeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner for SpikeRunner {
    fn run(
        &self,
        ctx: &Context,
        target: &LaunchTarget,
        console: &mut dyn ConsoleHandler,
    ) -> Result<RunResult> {
        self.validate(ctx, target)?;
        let config = &ctx.settings.runner.spike;
        tracing::info!(bin = %target.bin.display(), "launching spike");
        stream_console(self.command(config, target), &config.binary, console)
    }

    fn is_available(&self, ctx: &Context) -> bool {
        check_command_available(&ctx.settings.runner.spike.binary)
    }

    fn validate(&self, ctx: &Context, target: &LaunchTarget) -> Result<()> {
        if target.img.is_some() {
            return Err(Error::unsupported(
                "spike does not support disk-based configurations; use an initramfs build",
            ));
        }
        if !self.is_available(ctx) {
            return Err(Error::runner(format!(
                "{} is not available on this system",
                ctx.settings.runner.spike.binary
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Spike"
    }
}
