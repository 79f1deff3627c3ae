//! Tool settings (`workload-runner.toml`) and workload configuration records.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod catalog;
pub mod env;
mod loader;
mod workload;

pub use catalog::{Catalog, WorkloadCatalog};
pub use loader::SettingsLoader;
pub use workload::{FileSpec, RunSpec, WorkloadConfig, WorkloadFile};

/// Complete tool settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Directory layout, relative to the root directory.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Kernel and payload-loader build settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Emulator settings.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Enable verbose output (show subcommand output on the console).
    #[serde(default)]
    pub verbose: bool,
}

impl Settings {
    /// Reject emulator sizes the simulators cannot boot with.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("runner.qemu.memory", self.runner.qemu.memory),
            ("runner.qemu.cores", self.runner.qemu.cores),
            ("runner.spike.memory", self.runner.spike.memory),
            ("runner.spike.cores", self.runner.spike.cores),
        ];
        for (field, value) in sizes {
            if value == 0 {
                return Err(Error::InvalidConfig {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where built binaries and disk images are placed.
    #[serde(rename = "image-dir")]
    pub image_dir: PathBuf,

    /// Where per-run result directories are created.
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// Where run logs are written.
    #[serde(rename = "log-dir")]
    pub log_dir: PathBuf,

    /// Fixed mount point used by mount transactions.
    #[serde(rename = "mount-point")]
    pub mount_point: PathBuf,

    /// Default kernel source tree.
    #[serde(rename = "linux-src")]
    pub linux_src: PathBuf,

    /// Payload loader (bbl) source tree.
    #[serde(rename = "payload-loader-src")]
    pub payload_loader_src: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("runOutput"),
            log_dir: PathBuf::from("logs"),
            mount_point: PathBuf::from("disk-mount"),
            linux_src: PathBuf::from("riscv-linux"),
            payload_loader_src: PathBuf::from("riscv-pk"),
        }
    }
}

/// Build settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Parallel make jobs. Defaults to the available parallelism.
    pub jobs: Option<u32>,

    /// Kernel `ARCH=` value.
    pub arch: String,

    /// Payload loader `--host=` triple.
    #[serde(rename = "cross-host")]
    pub cross_host: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            arch: "riscv".to_string(),
            cross_host: "riscv64-unknown-elf".to_string(),
        }
    }
}

/// Runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    /// QEMU-specific configuration.
    #[serde(default)]
    pub qemu: QemuConfig,

    /// Spike-specific configuration.
    #[serde(default)]
    pub spike: SpikeConfig,
}

/// QEMU runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QemuConfig {
    /// QEMU binary to use.
    #[serde(default = "default_qemu_binary")]
    pub binary: String,

    /// Machine type.
    #[serde(default = "default_machine")]
    pub machine: String,

    /// Memory size in MB.
    #[serde(default = "default_memory")]
    pub memory: u32,

    /// Number of CPU cores.
    #[serde(default = "default_cores")]
    pub cores: u32,

    /// Host port forwarded to the guest's ssh port.
    #[serde(default = "default_ssh_port", rename = "ssh-port")]
    pub ssh_port: u16,

    /// Additional QEMU arguments.
    #[serde(default, rename = "extra-args")]
    pub extra_args: Vec<String>,
}

fn default_qemu_binary() -> String {
    "qemu-system-riscv64".to_string()
}

fn default_machine() -> String {
    "virt".to_string()
}

fn default_memory() -> u32 {
    4096
}

fn default_cores() -> u32 {
    4
}

fn default_ssh_port() -> u16 {
    10000
}

impl Default for QemuConfig {
    fn default() -> Self {
        Self {
            binary: default_qemu_binary(),
            machine: default_machine(),
            memory: default_memory(),
            cores: default_cores(),
            ssh_port: default_ssh_port(),
            extra_args: Vec::new(),
        }
    }
}

/// Spike runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Spike binary to use.
    pub binary: String,

    /// Memory size in MB.
    pub memory: u32,

    /// Number of harts.
    pub cores: u32,

    /// Additional Spike arguments.
    #[serde(rename = "extra-args")]
    pub extra_args: Vec<String>,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            binary: "spike".to_string(),
            memory: default_memory(),
            cores: default_cores(),
            extra_args: Vec::new(),
        }
    }
}
