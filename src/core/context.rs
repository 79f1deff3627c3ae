use crate::config::Settings;
use crate::core::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Identifier for one invocation: `<config-stem>-<command>-<timestamp>`.
///
/// Names the log file and the result directory of a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunName(String);

impl RunName {
    /// Derive a run name from the workload config file and the command.
    pub fn new(config_file: &Path, command: &str) -> Self {
        let stem = config_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("workload");
        // RFC 3339 with ':' replaced so the name is usable as a file name.
        let stamp = humantime::format_rfc3339_seconds(SystemTime::now())
            .to_string()
            .replace(':', "-");
        Self(format!("{}-{}-{}", stem, command, stamp))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Context object that carries settings and resolved paths through a run.
pub struct Context {
    /// Settings.
    pub settings: Settings,

    /// Root directory all relative settings paths resolve against.
    pub root_dir: PathBuf,

    /// Where binaries and images are placed.
    pub image_dir: PathBuf,

    /// Where result directories are created.
    pub output_dir: PathBuf,

    /// Where run logs are written.
    pub log_dir: PathBuf,

    /// Fixed mount point for mount transactions.
    pub mount_point: PathBuf,

    /// Default kernel source tree.
    pub linux_src: PathBuf,

    /// Payload loader source tree.
    pub payload_loader_dir: PathBuf,

    /// Identifier of this invocation.
    pub run_name: RunName,

    /// Parallel make jobs.
    pub jobs: u32,
}

impl Context {
    /// Create a new context rooted at the absolute `root_dir`.
    ///
    /// Creates the image, output, log and mount directories.
    pub fn new(settings: Settings, root_dir: PathBuf, run_name: RunName) -> Result<Self> {
        let root_dir = std::path::absolute(&root_dir)?;
        let paths = &settings.paths;
        let image_dir = root_dir.join(&paths.image_dir);
        let output_dir = root_dir.join(&paths.output_dir);
        let log_dir = root_dir.join(&paths.log_dir);
        let mount_point = root_dir.join(&paths.mount_point);
        let linux_src = root_dir.join(&paths.linux_src);
        let payload_loader_dir = root_dir.join(&paths.payload_loader_src);

        for dir in [&image_dir, &output_dir, &log_dir, &mount_point] {
            std::fs::create_dir_all(dir)?;
        }

        let jobs = settings.build.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(4)
        });

        Ok(Self {
            settings,
            root_dir,
            image_dir,
            output_dir,
            log_dir,
            mount_point,
            linux_src,
            payload_loader_dir,
            run_name,
            jobs,
        })
    }

    /// `-j<N>` argument for make.
    pub fn jobs_arg(&self) -> String {
        format!("-j{}", self.jobs)
    }

    /// Result directory of this run.
    pub fn run_output_dir(&self) -> PathBuf {
        self.output_dir.join(self.run_name.as_str())
    }

    /// Log file of this run.
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(format!("{}.log", self.run_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_context(root: &Path, settings: Settings) -> Context {
        Context::new(
            settings,
            root.to_path_buf(),
            RunName::new(Path::new("/w/bench.json"), "launch"),
        )
        .unwrap()
    }

    #[test]
    fn test_context_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = make_context(dir.path(), Settings::default());

        assert_eq!(ctx.image_dir, dir.path().join("images"));
        assert_eq!(ctx.output_dir, dir.path().join("runOutput"));
        assert_eq!(ctx.mount_point, dir.path().join("disk-mount"));
        assert_eq!(ctx.linux_src, dir.path().join("riscv-linux"));
        assert!(ctx.image_dir.is_dir());
        assert!(ctx.mount_point.is_dir());
        assert!(ctx.log_file().starts_with(&ctx.log_dir));
    }

    #[test]
    fn test_explicit_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.build.jobs = Some(3);
        let ctx = make_context(dir.path(), settings);
        assert_eq!(ctx.jobs_arg(), "-j3");
    }

    #[test]
    fn test_run_name_format() {
        let name = RunName::new(Path::new("/w/bench.json"), "launch");
        assert!(name.as_str().starts_with("bench-launch-"));
        assert!(!name.as_str().contains(':'));
    }
}
