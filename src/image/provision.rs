//! Disk image provisioning.
//!
//! An image moves through `Base -> FilesApplied -> InitBooted -> RunScriptApplied -> Final`.
//! Steps whose inputs are absent are skipped. A failure leaves the image in
//! whatever intermediate state it reached; no phase is rolled back.

use super::mount::{Direction, Mounter, copy_image_files};
use super::overlay::set_default_boot_action;
use crate::config::{RunSpec, WorkloadConfig};
use crate::core::context::Context;
use crate::core::error::{Error, Result};
use crate::distro::distro_for;
use crate::runner::{LaunchTarget, Runner, console::TeeHandler};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Provisioning phase an image has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvisionState {
    Base,
    FilesApplied,
    InitBooted,
    RunScriptApplied,
    Final,
}

/// Produces a workload's disk image.
pub struct Provisioner<'a> {
    ctx: &'a Context,
    mounter: &'a dyn Mounter,
    runner: Option<&'a dyn Runner>,
}

impl<'a> Provisioner<'a> {
    /// `runner` boots images that carry a guest-init script.
    pub fn new(ctx: &'a Context, mounter: &'a dyn Mounter, runner: Option<&'a dyn Runner>) -> Self {
        Self {
            ctx,
            mounter,
            runner,
        }
    }

    /// Provision `config.img`.
    pub fn provision(&self, config: &WorkloadConfig) -> Result<ProvisionState> {
        let img = config.img.as_deref().ok_or_else(|| {
            Error::provision(format!("{}: no image to provision", config.name))
        })?;
        let distro = distro_for(config.distro);
        let mount_point = self.ctx.mount_point.as_path();

        match &config.base_img {
            Some(base) => {
                tracing::info!(base = %base.display(), img = %img.display(), "copying base image");
                if let Some(parent) = img.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(base, img).map_err(|e| {
                    Error::provision(format!(
                        "failed to copy base image {}: {}",
                        base.display(),
                        e
                    ))
                })?;
            }
            None if !img.exists() => return Err(Error::FileNotFound(img.to_path_buf())),
            None => {}
        }
        self.advance(config, ProvisionState::Base);

        if !config.files.is_empty() {
            copy_image_files(self.mounter, mount_point, img, &config.files, Direction::In)?;
        }
        self.advance(config, ProvisionState::FilesApplied);

        if let Some(init) = &config.guest_init {
            if !init.exists() {
                return Err(Error::provision(format!(
                    "{}: guest-init script not found: {}",
                    config.name,
                    init.display()
                )));
            }
            set_default_boot_action(distro.as_ref(), self.mounter, mount_point, img, Some(init))?;
            self.boot_once(config, img)?;
            set_default_boot_action(distro.as_ref(), self.mounter, mount_point, img, None)?;
            self.advance(config, ProvisionState::InitBooted);
        }

        if let Some(run_spec) = &config.run_spec {
            let script = RunScript::resolve(run_spec)?;
            if !script.path().exists() {
                return Err(Error::provision(format!(
                    "{}: run script not found: {}",
                    config.name,
                    script.path().display()
                )));
            }
            set_default_boot_action(
                distro.as_ref(),
                self.mounter,
                mount_point,
                img,
                Some(script.path()),
            )?;
            self.advance(config, ProvisionState::RunScriptApplied);
        }

        Ok(self.advance(config, ProvisionState::Final))
    }

    /// Boot the image once and wait for the guest to halt.
    fn boot_once(&self, config: &WorkloadConfig, img: &Path) -> Result<()> {
        let runner = self
            .runner
            .ok_or_else(|| Error::feature_not_enabled("qemu (required to boot guest-init)"))?;
        tracing::info!(workload = %config.name, "booting image to run guest-init");
        let target = LaunchTarget {
            bin: config.bin.clone(),
            img: Some(img.to_path_buf()),
        };
        let mut console = TeeHandler::new();
        let result = runner.run(self.ctx, &target, &mut console)?;
        if !result.success {
            return Err(Error::provision(format!(
                "{}: guest-init boot under {} failed with exit code {}",
                config.name,
                runner.name(),
                result.exit_code
            )));
        }
        Ok(())
    }

    fn advance(&self, config: &WorkloadConfig, state: ProvisionState) -> ProvisionState {
        tracing::debug!(workload = %config.name, ?state, "provisioning");
        state
    }
}

/// Run script on the host: a named script, or a generated wrapper for a command.
enum RunScript {
    File(PathBuf),
    Generated(NamedTempFile),
}

impl RunScript {
    fn resolve(spec: &RunSpec) -> Result<Self> {
        match spec {
            RunSpec::Script(path) => Ok(RunScript::File(path.clone())),
            RunSpec::Command(command) => {
                let mut file = tempfile::Builder::new()
                    .prefix("run-command")
                    .suffix(".sh")
                    .tempfile()?;
                write!(file, "#!/bin/sh\n{}\n", command)?;
                file.flush()?;
                Ok(RunScript::Generated(file))
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            RunScript::File(path) => path,
            RunScript::Generated(file) => file.path(),
        }
    }
}
