use super::{BootOverlay, Distro, image_path, source_dir};
use crate::config::WorkloadConfig;
use crate::core::context::Context;
use crate::core::error::Result;
use crate::util::{Cmd, fs::copy_file};
use std::path::Path;

const UNIT_NAME: &str = "workload.service";

/// Oneshot unit running a non-empty `/workload.sh`, then powering off.
const UNIT: &str = "[Unit]
Description=Run workload script
After=multi-user.target
ConditionFileNotEmpty=/workload.sh

[Service]
Type=oneshot
ExecStart=/workload.sh
ExecStopPost=/usr/bin/systemctl poweroff
StandardOutput=journal+console

[Install]
WantedBy=multi-user.target
";

/// Fedora base distribution.
pub struct Fedora;

impl Distro for Fedora {
    fn build_base_image(&self, ctx: &Context, config: &WorkloadConfig) -> Result<()> {
        let source = source_dir(config)?;
        let img = image_path(config)?;

        tracing::info!(source = %source.display(), "building fedora base image");
        Cmd::new("make")
            .arg(ctx.jobs_arg())
            .arg("rootfs.img")
            .cwd(source)
            .error_msg("fedora image build failed")
            .run()?;

        copy_file(&source.join("rootfs.img"), img)?;
        Ok(())
    }

    fn up_to_date(&self, _ctx: &Context, config: &WorkloadConfig) -> Result<bool> {
        Cmd::new("make")
            .args(["-q", "rootfs.img"])
            .cwd(source_dir(config)?)
            .status()
    }

    fn boot_overlay(&self, script: Option<&Path>) -> Result<BootOverlay> {
        let overlay = BootOverlay::new(script)?;
        overlay.add_file(&format!("etc/systemd/system/{}", UNIT_NAME), UNIT, false)?;
        enable_unit(&overlay)?;
        Ok(overlay)
    }

    fn name(&self) -> &str {
        "fedora"
    }
}

#[cfg(unix)]
fn enable_unit(overlay: &BootOverlay) -> Result<()> {
    let wants = overlay
        .path()
        .join("etc/systemd/system/multi-user.target.wants");
    std::fs::create_dir_all(&wants)?;
    std::os::unix::fs::symlink(
        format!("/etc/systemd/system/{}", UNIT_NAME),
        wants.join(UNIT_NAME),
    )?;
    Ok(())
}

#[cfg(not(unix))]
fn enable_unit(_overlay: &BootOverlay) -> Result<()> {
    Err(crate::core::error::Error::unsupported(
        "enabling systemd units requires a unix host",
    ))
}
