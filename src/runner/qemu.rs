use super::console::ConsoleHandler;
use super::{LaunchTarget, RunResult, Runner, stream_console};
use crate::config::QemuConfig;
use crate::core::context::Context;
use crate::core::error::Result;
use crate::util::fs::check_command_available;
use std::process::Command;

/// Full-system emulator runner.
pub struct QemuRunner;

impl QemuRunner {
    /// Create a new QEMU runner.
    pub fn new() -> Self {
        Self
    }

    /// Build the QEMU command line for `target`.
    pub fn command(&self, config: &QemuConfig, target: &LaunchTarget) -> Command {
        let mut cmd = Command::new(&config.binary);

        cmd.arg("-nographic");
        cmd.arg("-smp").arg(config.cores.to_string());
        cmd.arg("-machine").arg(&config.machine);
        cmd.arg("-m").arg(format!("{}M", config.memory));
        cmd.arg("-kernel").arg(&target.bin);

        // Entropy and user-mode networking with ssh forwarded to the host.
        cmd.args([
            "-object",
            "rng-random,filename=/dev/urandom,id=rng0",
            "-device",
            "virtio-rng-device,rng=rng0",
            "-device",
            "virtio-net-device,netdev=usernet",
            "-netdev",
        ]);
        cmd.arg(format!(
            "user,id=usernet,hostfwd=tcp::{}-:22",
            config.ssh_port
        ));

        if let Some(img) = &target.img {
            cmd.args(["-device", "virtio-blk-device,drive=hd0", "-drive"]);
            cmd.arg(format!("file={},format=raw,id=hd0", img.display()));
            cmd.args(["-append", "ro root=/dev/vda"]);
        }

        for arg in &config.extra_args {
            cmd.arg(arg);
        }

        cmd
    }
}

impl Default for QemuRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner for QemuRunner {
    fn run(
        &self,
        ctx: &Context,
        target: &LaunchTarget,
        console: &mut dyn ConsoleHandler,
    ) -> Result<RunResult> {
        let config = &ctx.settings.runner.qemu;
        let cmd = self.command(config, target);
        tracing::info!(bin = %target.bin.display(), img = ?target.img, "launching qemu");
        stream_console(cmd, &config.binary, console)
    }

    fn is_available(&self, ctx: &Context) -> bool {
        check_command_available(&ctx.settings.runner.qemu.binary)
    }

    fn name(&self) -> &str {
        "QEMU"
    }
}
