//! Kernel tree operations.

use crate::core::context::Context;
use crate::core::error::{Error, Result};
use crate::util::Cmd;
use std::fs;
use std::path::Path;

/// Whether the kernel tree considers `vmlinux` current.
///
/// Kernel builds unconditionally run some rules, so in practice this reports
/// `false` and the binary is rebuilt.
pub fn kernel_up_to_date(ctx: &Context, linux_src: &Path) -> Result<bool> {
    Cmd::new("make")
        .arg("-q")
        .arg(format!("ARCH={}", ctx.settings.build.arch))
        .arg("vmlinux")
        .cwd(linux_src)
        .status()
}

/// Copy `linux_config` into the tree as its `.config`.
pub fn install_config(linux_src: &Path, linux_config: &Path) -> Result<()> {
    if !linux_config.is_file() {
        return Err(Error::FileNotFound(linux_config.to_path_buf()));
    }
    fs::copy(linux_config, linux_src.join(".config"))?;
    Ok(())
}

/// Merge `kconfig` options into an existing `.config`, replacing any
/// existing values for the same keys.
pub fn merge_kernel_config(config_path: &Path, kconfig: &str) -> Result<()> {
    let mut config = if config_path.exists() {
        fs::read_to_string(config_path).map_err(|e| {
            Error::config(format!(
                "failed to read kernel config at {}: {}",
                config_path.display(),
                e
            ))
        })?
    } else {
        String::new()
    };

    for line in kconfig.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, _value)) = line.split_once('=') {
            let pattern = format!("{}=", key);
            let pattern_not = format!("# {} is not set", key);
            config = config
                .lines()
                .filter(|l| !l.starts_with(&pattern) && !l.starts_with(&pattern_not))
                .collect::<Vec<_>>()
                .join("\n");

            config.push('\n');
            config.push_str(line);
        }
    }
    config.push('\n');

    fs::write(config_path, config)?;
    Ok(())
}

/// Options embedding an uncompressed initramfs archive into the kernel.
pub fn initramfs_options(cpio: &Path) -> String {
    format!(
        "CONFIG_BLK_DEV_INITRD=y\nCONFIG_INITRAMFS_SOURCE=\"{}\"\nCONFIG_INITRAMFS_COMPRESSION_NONE=y\n",
        cpio.display()
    )
}

/// Point the tree's `.config` at `cpio` and resolve the new options.
pub fn convert_initramfs_config(ctx: &Context, linux_src: &Path, cpio: &Path) -> Result<()> {
    merge_kernel_config(&linux_src.join(".config"), &initramfs_options(cpio))?;
    Cmd::new("make")
        .arg(format!("ARCH={}", ctx.settings.build.arch))
        .arg("olddefconfig")
        .cwd(linux_src)
        .error_msg("make olddefconfig failed")
        .run()?;
    Ok(())
}

/// Build `vmlinux`.
pub fn build_vmlinux(ctx: &Context, linux_src: &Path) -> Result<()> {
    tracing::info!(linux_src = %linux_src.display(), "building kernel");
    Cmd::new("make")
        .arg(format!("ARCH={}", ctx.settings.build.arch))
        .arg("vmlinux")
        .arg(ctx.jobs_arg())
        .cwd(linux_src)
        .error_msg("kernel build failed")
        .run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_replaces_existing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".config");
        fs::write(
            &path,
            "CONFIG_A=y\n# CONFIG_BLK_DEV_INITRD is not set\nCONFIG_INITRAMFS_SOURCE=\"\"\n",
        )
        .unwrap();

        merge_kernel_config(&path, &initramfs_options(Path::new("/tmp/root.cpio"))).unwrap();

        let merged = fs::read_to_string(&path).unwrap();
        assert!(merged.contains("CONFIG_A=y"));
        assert!(merged.contains("CONFIG_BLK_DEV_INITRD=y"));
        assert!(!merged.contains("is not set"));
        assert!(merged.contains("CONFIG_INITRAMFS_SOURCE=\"/tmp/root.cpio\""));
        assert_eq!(merged.matches("CONFIG_INITRAMFS_SOURCE").count(), 1);
    }

    #[test]
    fn test_merge_creates_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".config");
        merge_kernel_config(&path, "# comment\nCONFIG_X=m\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "CONFIG_X=m");
    }

    #[test]
    fn test_install_config_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = install_config(dir.path(), &dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
