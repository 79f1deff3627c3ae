use std::path::PathBuf;

/// Result type alias for workload-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for workload-runner.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing required configuration field.
    #[error("Missing required configuration field: {0}")]
    MissingConfig(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidConfig { field: String, value: String },

    /// File not found.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Two build rules claim the same target.
    #[error("Duplicate build target: {}", .0.display())]
    DuplicateTarget(PathBuf),

    /// A requested target or task dependency has no rule.
    #[error("Unknown build target: {}", .0.display())]
    UnknownTarget(PathBuf),

    /// The rule graph is not acyclic.
    #[error("Dependency cycle detected involving {}", .0.display())]
    CycleDetected(PathBuf),

    /// A rule's action (or its dependency check) failed.
    #[error("Failed to build {}: {source}", .target.display())]
    BuildFailed {
        target: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// An external command exited unsuccessfully.
    #[error("Command `{command}` failed: {status}")]
    Command { command: String, status: String },

    /// Mount transaction errors.
    #[error("Mount error: {0}")]
    Mount(String),

    /// The mount body failed and the unmount that followed failed too.
    #[error("Failed to unmount {} ({unmount}) after error: {cause}", .mount_point.display())]
    UnmountAfterError {
        mount_point: PathBuf,
        cause: Box<Error>,
        unmount: Box<Error>,
    },

    /// Image provisioning errors.
    #[error("Provisioning error: {0}")]
    Provision(String),

    /// Emulator execution errors.
    #[error("Runner error: {0}")]
    Runner(String),

    /// Feature not enabled.
    #[error("Feature '{0}' is not enabled. Enable it in Cargo.toml features.")]
    FeatureNotEnabled(String),

    /// Unsupported combination of options.
    #[error("Unsupported combination: {0}")]
    UnsupportedCombination(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a mount error.
    pub fn mount(msg: impl Into<String>) -> Self {
        Error::Mount(msg.into())
    }

    /// Create a provisioning error.
    pub fn provision(msg: impl Into<String>) -> Self {
        Error::Provision(msg.into())
    }

    /// Create a runner error.
    pub fn runner(msg: impl Into<String>) -> Self {
        Error::Runner(msg.into())
    }

    /// Create a feature not enabled error.
    pub fn feature_not_enabled(feature: impl Into<String>) -> Self {
        Error::FeatureNotEnabled(feature.into())
    }

    /// Create an unsupported combination error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedCombination(msg.into())
    }

    /// Wrap an error as the failure of building `target`.
    pub fn build_failed(target: impl Into<PathBuf>, source: Error) -> Self {
        Error::BuildFailed {
            target: target.into(),
            source: Box::new(source),
        }
    }
}
