use crate::core::error::{Error, Result};
use crate::distro::DistroKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// A file copied into (or out of) a disk image.
///
/// `src` may end in a `*` component to select a directory's contents.
/// `dst` is interpreted relative to the image root even when it starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub src: PathBuf,
    pub dst: PathBuf,
}

impl FileSpec {
    pub fn new(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// The image's permanent boot action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSpec {
    /// A script on the host, copied into the image.
    Script(PathBuf),
    /// A literal command wrapped into a generated script.
    Command(String),
}

impl RunSpec {
    /// Script path, if this run spec names a file.
    pub fn path(&self) -> Option<&Path> {
        match self {
            RunSpec::Script(path) => Some(path),
            RunSpec::Command(_) => None,
        }
    }
}

/// A resolved, buildable workload (base distribution, workload or job).
///
/// Records are produced by [`WorkloadCatalog`](super::WorkloadCatalog) and are
/// read-only afterwards, except for [`propagate_initramfs`](Self::propagate_initramfs).
#[derive(Debug, Clone, Default)]
pub struct WorkloadConfig {
    /// Unique name; jobs are named `<workload>-<job>`.
    pub name: String,
    /// Directory the workload was loaded from; host-side scripts run here.
    pub workdir: PathBuf,
    /// Configuration file this record came from.
    pub cfg_file: Option<PathBuf>,
    pub distro: DistroKind,
    /// Distribution build tree (base distributions only).
    pub source: Option<PathBuf>,
    /// Kernel/bootloader artifact.
    pub bin: PathBuf,
    /// Disk image artifact.
    pub img: Option<PathBuf>,
    pub initramfs: bool,
    pub linux_config: Option<PathBuf>,
    pub linux_src: Option<PathBuf>,
    /// Image this one is layered on.
    pub base_img: Option<PathBuf>,
    pub files: Vec<FileSpec>,
    pub guest_init: Option<PathBuf>,
    pub run_spec: Option<RunSpec>,
    /// Paths inside the image copied to the result directory after a launch.
    pub outputs: Vec<PathBuf>,
    /// Jobs keyed by their short name.
    pub jobs: BTreeMap<String, WorkloadConfig>,
    pub host_init: Option<PathBuf>,
    pub post_run_hook: Option<String>,
}

impl WorkloadConfig {
    /// Create a record with only a name and binary path.
    pub fn new(name: impl Into<String>, bin: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            bin: bin.into(),
            ..Default::default()
        }
    }

    /// Path of the initramfs variant of the binary.
    pub fn initramfs_bin(&self) -> PathBuf {
        initramfs_path(&self.bin)
    }

    /// Set the initramfs flag on this record and every job.
    pub fn propagate_initramfs(&mut self) {
        self.initramfs = true;
        for job in self.jobs.values_mut() {
            job.propagate_initramfs();
        }
    }

    /// Look up a job by its short name.
    pub fn job(&self, name: &str) -> Result<&WorkloadConfig> {
        self.jobs.get(name).ok_or_else(|| {
            if self.jobs.is_empty() {
                Error::config(format!(
                    "job '{}' requested, but workload '{}' defines no jobs",
                    name, self.name
                ))
            } else {
                Error::config(format!(
                    "workload '{}' has no job '{}' (available: {})",
                    self.name,
                    name,
                    self.jobs.keys().cloned().collect::<Vec<_>>().join(", ")
                ))
            }
        })
    }

    /// Structural checks that do not touch the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::MissingConfig("name".to_string()));
        }
        if self.bin.as_os_str().is_empty() {
            return Err(Error::MissingConfig(format!("{}: bin", self.name)));
        }
        if self.initramfs && self.img.is_none() {
            return Err(Error::config(format!(
                "{}: initramfs requires a disk image to pack",
                self.name
            )));
        }
        if self.img.is_none() && (self.guest_init.is_some() || !self.files.is_empty()) {
            return Err(Error::config(format!(
                "{}: files and guest-init require a disk image",
                self.name
            )));
        }
        for job in self.jobs.values() {
            job.validate()?;
        }
        Ok(())
    }
}

/// `bin + "-initramfs"`.
pub fn initramfs_path(bin: &Path) -> PathBuf {
    let mut name = OsString::from(bin.as_os_str());
    name.push("-initramfs");
    PathBuf::from(name)
}

/// On-disk workload description, as written in `*.json` / `*.toml` files.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct WorkloadFile {
    pub name: Option<String>,
    /// File name of the configuration this one layers on.
    pub base: Option<String>,
    pub distro: Option<DistroKind>,
    pub source: Option<PathBuf>,
    pub img: Option<PathBuf>,
    pub bin: Option<PathBuf>,
    pub linux_config: Option<PathBuf>,
    pub linux_src: Option<PathBuf>,
    #[serde(default)]
    pub initramfs: bool,
    #[serde(default)]
    pub files: Vec<(PathBuf, PathBuf)>,
    /// Directory whose contents are copied onto the image root.
    pub overlay: Option<PathBuf>,
    pub guest_init: Option<PathBuf>,
    /// Run script path.
    pub run: Option<PathBuf>,
    /// Literal run command.
    pub command: Option<String>,
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
    #[serde(default)]
    pub jobs: Vec<WorkloadFile>,
    pub host_init: Option<PathBuf>,
    #[serde(alias = "post_run_hook")]
    pub post_run_hook: Option<String>,
}

impl WorkloadFile {
    /// Parse a workload file; the format follows the extension (`.toml`, else JSON).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;

        let parsed = if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            toml::from_str(&content).map_err(|e| {
                Error::config(format!("failed to parse {}: {}", path.display(), e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::config(format!("failed to parse {}: {}", path.display(), e))
            })?
        };
        Ok(parsed)
    }

    /// The run spec named by `run` or `command`; naming both is an error.
    pub fn run_spec(&self, workdir: &Path) -> Result<Option<RunSpec>> {
        match (&self.run, &self.command) {
            (Some(_), Some(_)) => Err(Error::config(format!(
                "{}: 'run' and 'command' are mutually exclusive",
                self.name.as_deref().unwrap_or("<unnamed>")
            ))),
            (Some(script), None) => Ok(Some(RunSpec::Script(workdir.join(script)))),
            (None, Some(command)) => Ok(Some(RunSpec::Command(command.clone()))),
            (None, None) => Ok(None),
        }
    }
}
