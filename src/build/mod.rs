//! Kernel and payload-loader builds producing a workload's boot binary.
//!
//! The kernel tree's `.config` and the payload loader's build directory are
//! shared; builds against the same trees must not run concurrently.

use crate::config::WorkloadConfig;
use crate::core::context::Context;
use crate::core::error::{Error, Result};
use crate::image::{MountTransaction, Mounter};
use crate::util::{Cmd, fs::copy_file};
use std::path::Path;

pub mod kernel;

pub use kernel::kernel_up_to_date;

/// Build `config.bin`, or `config.bin + "-initramfs"` with the image embedded.
///
/// Without a `linux-config` the binary is expected to come from host-init and
/// nothing is built.
pub fn build_binary(
    ctx: &Context,
    mounter: &dyn Mounter,
    config: &WorkloadConfig,
    initramfs: bool,
) -> Result<()> {
    let Some(linux_config) = &config.linux_config else {
        if config.bin.exists() {
            tracing::debug!(workload = %config.name, "no linux-config; binary is prebuilt");
        } else {
            tracing::warn!(
                workload = %config.name,
                bin = %config.bin.display(),
                "no linux-config and no prebuilt binary; nothing to build"
            );
        }
        return Ok(());
    };
    let linux_src = config.linux_src.as_deref().unwrap_or(&ctx.linux_src);

    kernel::install_config(linux_src, linux_config)?;

    // Kept alive until the kernel build has consumed the archive.
    let _cpio_dir = if initramfs {
        let img = config.img.as_deref().ok_or_else(|| {
            Error::config(format!("{}: initramfs requires a disk image", config.name))
        })?;
        let dir = tempfile::Builder::new().prefix("initramfs").tempdir()?;
        let cpio = dir.path().join("rootfs.cpio");

        tracing::info!(img = %img.display(), "packing image into initramfs");
        MountTransaction::new(mounter, &ctx.mount_point).run(img, |m| m.pack_cpio(&cpio))?;
        kernel::convert_initramfs_config(ctx, linux_src, &cpio)?;
        Some(dir)
    } else {
        None
    };

    kernel::build_vmlinux(ctx, linux_src)?;
    let bbl = build_payload_loader(ctx, linux_src)?;

    let target = if initramfs {
        config.initramfs_bin()
    } else {
        config.bin.clone()
    };
    copy_file(&bbl, &target)?;
    tracing::info!(target = %target.display(), "binary built");
    Ok(())
}

/// Build the payload loader with `vmlinux` embedded; returns the `bbl` path.
fn build_payload_loader(ctx: &Context, linux_src: &Path) -> Result<std::path::PathBuf> {
    let build_dir = ctx.payload_loader_dir.join("build");
    if build_dir.exists() {
        std::fs::remove_dir_all(&build_dir)?;
    }
    std::fs::create_dir_all(&build_dir)?;

    let vmlinux = std::path::absolute(linux_src.join("vmlinux"))?;
    Cmd::new("../configure")
        .arg(format!("--host={}", ctx.settings.build.cross_host))
        .arg(format!("--with-payload={}", vmlinux.display()))
        .cwd(&build_dir)
        .error_msg("payload loader configure failed")
        .run()?;
    Cmd::new("make")
        .arg(ctx.jobs_arg())
        .cwd(&build_dir)
        .error_msg("payload loader build failed")
        .run()?;

    Ok(build_dir.join("bbl"))
}
