//! Core types for the workload pipeline: manager builder, context, and error handling.

pub mod builder;
pub mod context;
pub mod error;

pub use builder::{
    BuildRequest, JobSelector, LaunchReport, LaunchRequest, WorkloadManager,
    WorkloadManagerBuilder,
};
pub use context::{Context, RunName};
pub use error::{Error, Result};
