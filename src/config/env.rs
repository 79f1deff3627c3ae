//! Environment variable processing for runtime settings overrides.
//!
//! Env var prefix: `WORKLOAD_RUNNER_`
//!
//! - `WORKLOAD_RUNNER_PROFILE`: select a settings profile
//! - `WORKLOAD_RUNNER_QEMU_ARGS`: extra QEMU arguments (whitespace-split)
//! - `WORKLOAD_RUNNER_QEMU_BINARY`: override QEMU binary path
//! - `WORKLOAD_RUNNER_QEMU_MEMORY`: override memory (MB)
//! - `WORKLOAD_RUNNER_QEMU_CORES`: override CPU cores
//! - `WORKLOAD_RUNNER_SPIKE_BINARY`: override Spike binary path
//! - `WORKLOAD_RUNNER_JOBS`: override parallel make jobs
//! - `WORKLOAD_RUNNER_LINUX_SRC`: override the default kernel tree
//! - `WORKLOAD_RUNNER_MOUNT_POINT`: override the mount point
//! - `WORKLOAD_RUNNER_VERBOSE`: enable verbose output (1/true/yes)

use super::Settings;
use std::path::PathBuf;

const PREFIX: &str = "WORKLOAD_RUNNER_";

/// Read the active profile name from `WORKLOAD_RUNNER_PROFILE`.
pub fn get_profile_name() -> Option<String> {
    env_str("PROFILE")
}

/// Parse `WORKLOAD_RUNNER_QEMU_ARGS` into a list of arguments.
///
/// Arguments are split on whitespace. Returns an empty vec if unset.
pub fn get_extra_qemu_args() -> Vec<String> {
    match env_str("QEMU_ARGS") {
        Some(val) => val.split_whitespace().map(String::from).collect(),
        None => Vec::new(),
    }
}

/// Apply individual env var overrides to the settings.
///
/// Each override is applied only if the env var is set and parses correctly.
/// Invalid values are silently ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Some(val) = env_str("QEMU_BINARY") {
        settings.runner.qemu.binary = val;
    }

    if let Some(val) = env_parse::<u32>("QEMU_MEMORY") {
        settings.runner.qemu.memory = val;
    }

    if let Some(val) = env_parse::<u32>("QEMU_CORES") {
        settings.runner.qemu.cores = val;
    }

    settings.runner.qemu.extra_args.extend(get_extra_qemu_args());

    if let Some(val) = env_str("SPIKE_BINARY") {
        settings.runner.spike.binary = val;
    }

    if let Some(val) = env_parse::<u32>("JOBS").filter(|j| *j > 0) {
        settings.build.jobs = Some(val);
    }

    if let Some(val) = env_str("LINUX_SRC") {
        settings.paths.linux_src = PathBuf::from(val);
    }

    if let Some(val) = env_str("MOUNT_POINT") {
        settings.paths.mount_point = PathBuf::from(val);
    }

    if let Some(val) = env_bool("VERBOSE") {
        settings.verbose = val;
    }
}

// --- helpers ---

fn env_str(suffix: &str) -> Option<String> {
    std::env::var(format!("{PREFIX}{suffix}"))
        .ok()
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(suffix: &str) -> Option<T> {
    env_str(suffix).and_then(|s| s.parse().ok())
}

fn env_bool(suffix: &str) -> Option<bool> {
    env_str(suffix).map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global, so serialize tests that mutate them.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Helper: run a closure with specific env vars set, then restore.
    pub(crate) fn with_env_vars<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut old: Vec<(&str, Option<String>)> = Vec::new();
        for &(k, v) in vars {
            old.push((k, std::env::var(k).ok()));
            // SAFETY: tests are serialized via ENV_LOCK
            unsafe { std::env::set_var(k, v) };
        }
        f();
        for (k, prev) in old {
            // SAFETY: tests are serialized via ENV_LOCK
            match prev {
                Some(v) => unsafe { std::env::set_var(k, v) },
                None => unsafe { std::env::remove_var(k) },
            }
        }
    }

    /// Helper: run with specific env vars removed.
    pub(crate) fn without_env_vars<F: FnOnce()>(vars: &[&str], f: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut old: Vec<(&str, Option<String>)> = Vec::new();
        for &k in vars {
            old.push((k, std::env::var(k).ok()));
            // SAFETY: tests are serialized via ENV_LOCK
            unsafe { std::env::remove_var(k) };
        }
        f();
        for (k, prev) in old {
            // SAFETY: tests are serialized via ENV_LOCK
            match prev {
                Some(v) => unsafe { std::env::set_var(k, v) },
                None => unsafe { std::env::remove_var(k) },
            }
        }
    }

    #[test]
    fn test_get_profile_name_set() {
        with_env_vars(&[("WORKLOAD_RUNNER_PROFILE", "ci")], || {
            assert_eq!(get_profile_name(), Some("ci".to_string()));
        });
    }

    #[test]
    fn test_get_profile_name_empty() {
        with_env_vars(&[("WORKLOAD_RUNNER_PROFILE", "")], || {
            assert_eq!(get_profile_name(), None);
        });
    }

    #[test]
    fn test_get_extra_qemu_args_set() {
        with_env_vars(&[("WORKLOAD_RUNNER_QEMU_ARGS", "-s -S -snapshot")], || {
            assert_eq!(get_extra_qemu_args(), vec!["-s", "-S", "-snapshot"]);
        });
    }

    #[test]
    fn test_get_extra_qemu_args_unset() {
        without_env_vars(&["WORKLOAD_RUNNER_QEMU_ARGS"], || {
            assert!(get_extra_qemu_args().is_empty());
        });
    }

    #[test]
    fn test_apply_env_overrides_fields() {
        with_env_vars(
            &[
                ("WORKLOAD_RUNNER_QEMU_BINARY", "my-qemu"),
                ("WORKLOAD_RUNNER_QEMU_MEMORY", "2048"),
                ("WORKLOAD_RUNNER_QEMU_CORES", "2"),
                ("WORKLOAD_RUNNER_SPIKE_BINARY", "/opt/spike"),
                ("WORKLOAD_RUNNER_JOBS", "12"),
                ("WORKLOAD_RUNNER_LINUX_SRC", "/src/linux"),
                ("WORKLOAD_RUNNER_VERBOSE", "yes"),
            ],
            || {
                let mut settings = Settings::default();
                apply_env_overrides(&mut settings);
                assert_eq!(settings.runner.qemu.binary, "my-qemu");
                assert_eq!(settings.runner.qemu.memory, 2048);
                assert_eq!(settings.runner.qemu.cores, 2);
                assert_eq!(settings.runner.spike.binary, "/opt/spike");
                assert_eq!(settings.build.jobs, Some(12));
                assert_eq!(settings.paths.linux_src, PathBuf::from("/src/linux"));
                assert!(settings.verbose);
            },
        );
    }

    #[test]
    fn test_apply_env_overrides_invalid_values_ignored() {
        with_env_vars(
            &[
                ("WORKLOAD_RUNNER_QEMU_MEMORY", "notanumber"),
                ("WORKLOAD_RUNNER_JOBS", "0"),
            ],
            || {
                let mut settings = Settings::default();
                let original_memory = settings.runner.qemu.memory;
                apply_env_overrides(&mut settings);
                assert_eq!(settings.runner.qemu.memory, original_memory);
                assert!(settings.build.jobs.is_none());
            },
        );
    }
}
