use super::{BootOverlay, Distro, image_path, source_dir};
use crate::config::WorkloadConfig;
use crate::core::context::Context;
use crate::core::error::Result;
use crate::util::{Cmd, fs::copy_file};
use std::path::Path;

/// Init script that runs a non-empty `/workload.sh` at boot, then powers off.
const INIT_HOOK: &str = r#"#!/bin/sh
case "$1" in
  start)
    if [ -s /workload.sh ]; then
      /workload.sh
      poweroff
    fi
    ;;
esac
"#;

/// Buildroot base distribution.
pub struct Buildroot;

impl Distro for Buildroot {
    fn build_base_image(&self, ctx: &Context, config: &WorkloadConfig) -> Result<()> {
        let source = source_dir(config)?;
        let img = image_path(config)?;

        tracing::info!(source = %source.display(), "building buildroot base image");
        Cmd::new("make")
            .arg(ctx.jobs_arg())
            .cwd(source)
            .error_msg("buildroot build failed")
            .run()?;

        copy_file(&source.join("output/images/rootfs.ext2"), img)?;
        Ok(())
    }

    fn up_to_date(&self, _ctx: &Context, config: &WorkloadConfig) -> Result<bool> {
        Cmd::new("make").arg("-q").cwd(source_dir(config)?).status()
    }

    fn boot_overlay(&self, script: Option<&Path>) -> Result<BootOverlay> {
        let overlay = BootOverlay::new(script)?;
        overlay.add_file("etc/init.d/S99run", INIT_HOOK, true)?;
        Ok(overlay)
    }

    fn name(&self) -> &str {
        "buildroot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_installs_init_hook() {
        let overlay = Buildroot.boot_overlay(None).unwrap();
        let hook = std::fs::read_to_string(overlay.path().join("etc/init.d/S99run")).unwrap();
        assert!(hook.contains("[ -s /workload.sh ]"));
        assert!(overlay.path().join("workload.sh").is_file());
    }

    #[test]
    fn test_build_requires_source() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(
            Default::default(),
            dir.path().to_path_buf(),
            crate::core::context::RunName::new(Path::new("br.json"), "build"),
        )
        .unwrap();
        let config = WorkloadConfig::new("br-base", "br-base-bin");
        assert!(Buildroot.build_base_image(&ctx, &config).is_err());
    }
}
