//! Base distributions: how a base image is built and how its boot action is set.

use crate::config::{FileSpec, WorkloadConfig};
use crate::core::context::Context;
use crate::core::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tempfile::TempDir;

pub mod bare;
pub mod buildroot;
pub mod fedora;

/// Script the boot hook runs; empty means no boot action.
pub const WORKLOAD_SCRIPT: &str = "workload.sh";

/// Base distribution kind named by a workload's `distro` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistroKind {
    #[default]
    #[serde(alias = "br")]
    Buildroot,
    Fedora,
    Bare,
}

impl DistroKind {
    pub fn name(&self) -> &'static str {
        match self {
            DistroKind::Buildroot => "buildroot",
            DistroKind::Fedora => "fedora",
            DistroKind::Bare => "bare",
        }
    }
}

/// A base distribution.
pub trait Distro: Send + Sync {
    /// Build the base image into `config.img` from `config.source`.
    fn build_base_image(&self, ctx: &Context, config: &WorkloadConfig) -> Result<()>;

    /// Whether the base image is current with respect to its build tree.
    fn up_to_date(&self, ctx: &Context, config: &WorkloadConfig) -> Result<bool>;

    /// Synthesize an overlay that makes `script` the default boot action,
    /// or clears the boot action when `script` is `None`.
    fn boot_overlay(&self, script: Option<&Path>) -> Result<BootOverlay>;

    /// Get a human-readable name for this distribution.
    fn name(&self) -> &str;
}

/// Get the implementation for a distribution kind.
pub fn distro_for(kind: DistroKind) -> Box<dyn Distro> {
    match kind {
        DistroKind::Buildroot => Box::new(buildroot::Buildroot),
        DistroKind::Fedora => Box::new(fedora::Fedora),
        DistroKind::Bare => Box::new(bare::Bare),
    }
}

/// A synthesized overlay directory, removed on drop.
#[derive(Debug)]
pub struct BootOverlay {
    dir: TempDir,
}

impl BootOverlay {
    /// Start an overlay containing `/workload.sh`: a copy of `script`, or empty.
    pub fn new(script: Option<&Path>) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("boot-overlay").tempdir()?;
        let dst = dir.path().join(WORKLOAD_SCRIPT);
        match script {
            Some(script) => {
                if !script.is_file() {
                    return Err(Error::FileNotFound(script.to_path_buf()));
                }
                std::fs::copy(script, &dst)?;
            }
            None => std::fs::write(&dst, "")?,
        }
        set_executable(&dst)?;
        Ok(Self { dir })
    }

    /// Add a file at `rel` inside the overlay.
    pub fn add_file(&self, rel: &str, content: &str, executable: bool) -> Result<()> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        if executable {
            set_executable(&path)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Copy spec applying the overlay's contents onto the image root.
    pub fn file_spec(&self) -> FileSpec {
        FileSpec::new(self.dir.path().join("*"), "/")
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Source tree of a base distribution; required to build it.
fn source_dir(config: &WorkloadConfig) -> Result<&Path> {
    config
        .source
        .as_deref()
        .ok_or_else(|| Error::MissingConfig(format!("{}: source", config.name)))
}

/// Image target of a base distribution.
fn image_path(config: &WorkloadConfig) -> Result<&Path> {
    config
        .img
        .as_deref()
        .ok_or_else(|| Error::MissingConfig(format!("{}: img", config.name)))
}
