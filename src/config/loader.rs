use super::Settings;
use crate::core::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default settings file name, looked up in the root directory.
pub const SETTINGS_FILE: &str = "workload-runner.toml";

/// Settings loader that layers several sources.
pub struct SettingsLoader {
    /// Root directory of the tool checkout.
    root: Option<PathBuf>,
    /// Explicit settings file path.
    settings_file: Option<PathBuf>,
    /// Whether env var overrides are applied.
    use_env: bool,
}

impl SettingsLoader {
    /// Create a new settings loader.
    pub fn new() -> Self {
        Self {
            root: None,
            settings_file: None,
            use_env: true,
        }
    }

    /// Set the root directory.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set an explicit settings file path.
    pub fn settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_file = Some(path.into());
        self
    }

    /// Skip `WORKLOAD_RUNNER_*` overrides.
    pub fn no_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Load settings from all enabled sources.
    ///
    /// Priority (later sources override earlier):
    /// 1. Default values
    /// 2. Settings file (explicit, or `workload-runner.toml` in the root if present)
    /// 3. Profile overlay (`WORKLOAD_RUNNER_PROFILE`)
    /// 4. Individual env var overrides (`WORKLOAD_RUNNER_*`)
    pub fn load(self) -> Result<(Settings, PathBuf)> {
        let root = self
            .root
            .clone()
            .ok_or_else(|| Error::config("root directory not specified"))?;

        let mut value = serde_json::to_value(Settings::default())?;
        let mut profiles: HashMap<String, serde_json::Value> = HashMap::new();

        let file = match self.settings_file {
            Some(ref path) => Some(path.clone()),
            None => Some(root.join(SETTINGS_FILE)).filter(|p| p.is_file()),
        };

        if let Some(path) = file {
            let file_value = Self::load_toml_file(&path)?;
            extract_profiles(&file_value, &mut profiles);
            deep_merge(&mut value, &strip_profiles(file_value));
        }

        if self.use_env {
            if let Some(profile_name) = super::env::get_profile_name() {
                let profile_value = profiles.get(&profile_name).ok_or_else(|| {
                    let mut available: Vec<&str> = profiles.keys().map(|s| s.as_str()).collect();
                    available.sort_unstable();
                    if available.is_empty() {
                        Error::config(format!(
                            "profile '{}' not found (no profiles defined)",
                            profile_name,
                        ))
                    } else {
                        Error::config(format!(
                            "profile '{}' not found. Available profiles: {}",
                            profile_name,
                            available.join(", "),
                        ))
                    }
                })?;
                deep_merge(&mut value, profile_value);
            }
        }

        let mut settings: Settings = serde_json::from_value(value)
            .map_err(|e| Error::config(format!("invalid settings: {}", e)))?;

        if self.use_env {
            super::env::apply_env_overrides(&mut settings);
        }
        settings.validate()?;

        Ok((settings, root))
    }

    /// Load a TOML settings file as a JSON value so it can be deep-merged.
    fn load_toml_file(path: &Path) -> Result<serde_json::Value> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        let table: toml::Value = toml::from_str(&content)
            .map_err(|e| Error::config(format!("failed to parse TOML settings: {}", e)))?;
        Ok(serde_json::to_value(table)?)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect `[profiles.<name>]` tables.
fn extract_profiles(value: &serde_json::Value, profiles: &mut HashMap<String, serde_json::Value>) {
    if let Some(serde_json::Value::Object(map)) = value.get("profiles") {
        for (name, profile) in map {
            profiles.insert(name.clone(), profile.clone());
        }
    }
}

fn strip_profiles(mut value: serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::Object(ref mut map) = value {
        map.remove("profiles");
    }
    value
}

/// Recursively deep-merge `overlay` into `base`.
///
/// - Objects: keys are merged recursively (overlay keys win for conflicts).
/// - Scalars and arrays: overlay replaces base entirely.
pub(crate) fn deep_merge(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let entry = base_map
                    .entry(key.clone())
                    .or_insert(serde_json::Value::Null);
                deep_merge(entry, overlay_val);
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}
