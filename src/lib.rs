//! workload-runner: builds, provisions and boots simulator workloads.
//!
//! Workloads are described by JSON or TOML files in one or more workload
//! directories. Each one layers on a base distribution image, optionally
//! injects files, runs a guest-init script inside the emulator once, and
//! installs a run script as the image's default boot action. Artifacts are
//! rebuilt only when their inputs changed.
//!
//! # Quick Start
//!
//! ```no_run
//! use workload_runner::{BuildRequest, JobSelector, LaunchRequest, builder};
//!
//! # fn main() -> workload_runner::Result<()> {
//! let mut manager = builder()
//!     .root(".")
//!     .load_settings(None)?
//!     .workdir("workloads")
//!     .build()?;
//!
//! let config = std::path::PathBuf::from("workloads/hello.json");
//! manager.build(&BuildRequest {
//!     config: config.clone(),
//!     job: JobSelector::All,
//!     initramfs: false,
//! })?;
//! manager.launch(&LaunchRequest {
//!     config,
//!     job: JobSelector::All,
//!     initramfs: false,
//!     spike: false,
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Workload file
//!
//! ```json
//! {
//!   "name": "hello",
//!   "base": "br-base.json",
//!   "files": [["motd", "/etc/motd"]],
//!   "guest-init": "init.sh",
//!   "command": "cat /etc/motd",
//!   "outputs": ["/etc/motd"]
//! }
//! ```
//!
//! # Architecture
//!
//! - [`config`]: tool settings and the workload [`Catalog`](config::Catalog)
//! - [`graph`]: build rules and the dependency-ordered [`TaskExecutor`](graph::TaskExecutor)
//! - [`image`]: mount transactions and the image [`Provisioner`](image::Provisioner)
//! - [`build`]: kernel and payload-loader builds
//! - [`distro`]: base distributions and their boot hooks
//! - [`runner`]: emulator [`Runner`](runner::Runner)s
//!
//! External programs sit behind the [`Mounter`](image::Mounter),
//! [`Runner`](runner::Runner) and [`RuleHandler`](graph::RuleHandler) traits.
//!
//! # Features
//!
//! - `default` - Enables `cli`, `qemu`, and `spike`
//! - `cli` - The `workload-runner` binary
//! - `qemu` - QEMU full-system runner
//! - `spike` - Spike functional simulator runner

pub mod build;
pub mod config;
pub mod core;
pub mod distro;
pub mod graph;
pub mod image;
pub mod runner;
pub mod util;

// Re-export commonly used types
pub use crate::core::{
    BuildRequest, Context, Error, JobSelector, LaunchReport, LaunchRequest, Result, RunName,
    WorkloadManager, WorkloadManagerBuilder,
};
pub use config::{Catalog, Settings, SettingsLoader, WorkloadCatalog, WorkloadConfig};

/// Create a new workload manager builder.
///
/// This is the main entry point for the fluent API.
pub fn builder() -> WorkloadManagerBuilder {
    WorkloadManagerBuilder::new()
}
