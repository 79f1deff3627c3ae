use super::workload::{FileSpec, WorkloadConfig, WorkloadFile};
use crate::core::context::Context;
use crate::core::error::{Error, Result};
use crate::distro::DistroKind;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Source of resolved workload configurations.
pub trait Catalog {
    /// Resolve a configuration file path into its record.
    fn resolve(&self, path: &Path) -> Result<&WorkloadConfig>;

    /// Every configuration path known to the catalog, sorted.
    fn all_known_paths(&self) -> Vec<PathBuf>;

    /// Configuration paths that are base distributions, sorted.
    fn base_distributions(&self) -> Vec<PathBuf>;
}

/// Catalog of workloads loaded from one or more workload directories.
#[derive(Debug, Default)]
pub struct WorkloadCatalog {
    configs: BTreeMap<PathBuf, WorkloadConfig>,
    distros: BTreeSet<PathBuf>,
}

impl WorkloadCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workload record.
    pub fn insert(&mut self, path: impl Into<PathBuf>, config: WorkloadConfig) {
        self.configs.insert(path.into(), config);
    }

    /// Add a base distribution record.
    pub fn insert_distro(&mut self, path: impl Into<PathBuf>, config: WorkloadConfig) {
        let path = path.into();
        self.distros.insert(path.clone());
        self.configs.insert(path, config);
    }

    /// Mutable access, used to push the initramfs flag down before graph construction.
    pub fn resolve_mut(&mut self, path: &Path) -> Result<&mut WorkloadConfig> {
        self.configs
            .get_mut(path)
            .ok_or_else(|| Error::config(format!("unknown configuration: {}", path.display())))
    }

    /// Load every `*.json` / `*.toml` file directly inside each workload directory.
    pub fn load(workdirs: &[PathBuf], ctx: &Context) -> Result<Self> {
        let mut files: BTreeMap<PathBuf, WorkloadFile> = BTreeMap::new();
        let mut by_name: HashMap<String, PathBuf> = HashMap::new();

        for dir in workdirs {
            let entries = std::fs::read_dir(dir).map_err(|e| {
                Error::config(format!("failed to read workload directory {}: {}", dir.display(), e))
            })?;
            for entry in entries {
                let path = entry?.path();
                let is_config = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("json") | Some("toml")
                );
                if !is_config || !path.is_file() {
                    continue;
                }
                let path = std::path::absolute(&path)?;
                if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
                    by_name.insert(file_name.to_string(), path.clone());
                }
                files.insert(path.clone(), WorkloadFile::load(&path)?);
            }
        }

        let mut resolver = Resolver {
            ctx,
            files: &files,
            by_name: &by_name,
            resolved: BTreeMap::new(),
            visiting: BTreeSet::new(),
        };
        for path in files.keys() {
            resolver.resolve(path)?;
        }

        let mut catalog = Self::new();
        for (path, config) in resolver.resolved {
            if files[&path].base.is_none() {
                catalog.insert_distro(path, config);
            } else {
                catalog.insert(path, config);
            }
        }
        catalog.check_unique_artifacts()?;

        tracing::debug!(
            workloads = catalog.configs.len(),
            distros = catalog.distros.len(),
            "loaded workload catalog"
        );
        Ok(catalog)
    }

    /// No two records may target the same binary or image.
    fn check_unique_artifacts(&self) -> Result<()> {
        let mut seen: HashMap<PathBuf, String> = HashMap::new();
        let mut stack: Vec<&WorkloadConfig> = self.configs.values().collect();

        while let Some(config) = stack.pop() {
            let mut artifacts = vec![config.bin.clone()];
            artifacts.extend(config.img.clone());
            for artifact in artifacts {
                if let Some(other) = seen.insert(artifact.clone(), config.name.clone()) {
                    return Err(Error::config(format!(
                        "'{}' and '{}' both produce {}",
                        other,
                        config.name,
                        artifact.display()
                    )));
                }
            }
            stack.extend(config.jobs.values());
        }
        Ok(())
    }
}

impl Catalog for WorkloadCatalog {
    fn resolve(&self, path: &Path) -> Result<&WorkloadConfig> {
        self.configs
            .get(path)
            .ok_or_else(|| Error::config(format!("unknown configuration: {}", path.display())))
    }

    fn all_known_paths(&self) -> Vec<PathBuf> {
        self.configs.keys().cloned().collect()
    }

    fn base_distributions(&self) -> Vec<PathBuf> {
        self.distros.iter().cloned().collect()
    }
}

/// Resolves `base` inheritance with memoization and cycle detection.
struct Resolver<'a> {
    ctx: &'a Context,
    files: &'a BTreeMap<PathBuf, WorkloadFile>,
    by_name: &'a HashMap<String, PathBuf>,
    resolved: BTreeMap<PathBuf, WorkloadConfig>,
    visiting: BTreeSet<PathBuf>,
}

impl Resolver<'_> {
    fn resolve(&mut self, path: &Path) -> Result<WorkloadConfig> {
        if let Some(config) = self.resolved.get(path) {
            return Ok(config.clone());
        }
        if !self.visiting.insert(path.to_path_buf()) {
            return Err(Error::config(format!(
                "inheritance cycle through {}",
                path.display()
            )));
        }

        let file = &self.files[path];
        let workdir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let parent = match &file.base {
            Some(base) => {
                let base_path = self.by_name.get(base).cloned().ok_or_else(|| {
                    Error::config(format!("{}: unknown base '{}'", path.display(), base))
                })?;
                Some(self.resolve(&base_path)?)
            }
            None => None,
        };

        let default_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let mut config = self.build(file, &default_name, &workdir, parent.as_ref())?;
        config.cfg_file = Some(path.to_path_buf());
        config.validate()?;

        self.visiting.remove(path);
        self.resolved.insert(path.to_path_buf(), config.clone());
        Ok(config)
    }

    /// Turn one file (or nested job) into a record layered on `parent`.
    fn build(
        &self,
        file: &WorkloadFile,
        default_name: &str,
        workdir: &Path,
        parent: Option<&WorkloadConfig>,
    ) -> Result<WorkloadConfig> {
        let name = file.name.clone().unwrap_or_else(|| default_name.to_string());
        let resolve = |p: &Path| workdir.join(p);

        let distro = match (file.distro, parent) {
            (Some(distro), _) => distro,
            (None, Some(parent)) => parent.distro,
            (None, None) => {
                return Err(Error::MissingConfig(format!(
                    "{}: distro (required for base distributions)",
                    name
                )));
            }
        };

        let bin = file
            .bin
            .as_deref()
            .map(resolve)
            .unwrap_or_else(|| self.ctx.image_dir.join(format!("{}-bin", name)));

        let (img, base_img) = match (file.img.as_deref(), parent) {
            (Some(img), _) => (Some(resolve(img)), parent.and_then(|p| p.img.clone())),
            (None, Some(parent)) => match &parent.img {
                Some(parent_img) => (
                    Some(self.ctx.image_dir.join(format!("{}.img", name))),
                    Some(parent_img.clone()),
                ),
                None => (None, None),
            },
            (None, None) if distro != DistroKind::Bare => {
                (Some(self.ctx.image_dir.join(format!("{}.img", name))), None)
            }
            (None, None) => (None, None),
        };

        let mut files = Vec::new();
        if let Some(overlay) = &file.overlay {
            files.push(FileSpec::new(resolve(overlay).join("*"), "/"));
        }
        for (src, dst) in &file.files {
            files.push(FileSpec::new(resolve(src), dst.clone()));
        }

        let mut config = WorkloadConfig {
            name: name.clone(),
            workdir: workdir.to_path_buf(),
            cfg_file: None,
            distro,
            source: file.source.as_deref().map(resolve),
            bin,
            img,
            initramfs: file.initramfs,
            linux_config: file
                .linux_config
                .as_deref()
                .map(resolve)
                .or_else(|| parent.and_then(|p| p.linux_config.clone())),
            linux_src: file
                .linux_src
                .as_deref()
                .map(resolve)
                .or_else(|| parent.and_then(|p| p.linux_src.clone())),
            base_img,
            files,
            guest_init: file.guest_init.as_deref().map(resolve),
            run_spec: file.run_spec(workdir)?,
            outputs: file.outputs.clone(),
            jobs: BTreeMap::new(),
            host_init: file.host_init.as_deref().map(resolve),
            post_run_hook: file.post_run_hook.clone(),
        };

        for job_file in &file.jobs {
            let short = job_file
                .name
                .clone()
                .ok_or_else(|| Error::MissingConfig(format!("{}: job name", name)))?;
            let mut job_file = job_file.clone();
            job_file.name = Some(format!("{}-{}", name, short));
            let job = self.build(&job_file, &short, workdir, Some(&config))?;
            if config.jobs.insert(short.clone(), job).is_some() {
                return Err(Error::config(format!("{}: duplicate job '{}'", name, short)));
            }
        }

        if config.initramfs {
            config.propagate_initramfs();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::core::context::RunName;

    fn make_context(root: &Path) -> Context {
        Context::new(
            Settings::default(),
            root.to_path_buf(),
            RunName::new(Path::new("test.json"), "build"),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_resolve() {
        let mut catalog = WorkloadCatalog::new();
        catalog.insert_distro("/w/br-base.json", WorkloadConfig::new("br-base", "br-base-bin"));
        catalog.insert("/w/test.json", WorkloadConfig::new("test", "test-bin"));

        assert_eq!(catalog.resolve(Path::new("/w/test.json")).unwrap().name, "test");
        assert!(catalog.resolve(Path::new("/w/missing.json")).is_err());
        assert_eq!(catalog.all_known_paths().len(), 2);
        assert_eq!(
            catalog.base_distributions(),
            vec![PathBuf::from("/w/br-base.json")]
        );
    }

    #[test]
    fn test_duplicate_artifacts_rejected() {
        let mut catalog = WorkloadCatalog::new();
        catalog.insert("/w/a.json", WorkloadConfig::new("a", "same-bin"));
        catalog.insert("/w/b.json", WorkloadConfig::new("b", "same-bin"));
        let err = catalog.check_unique_artifacts().unwrap_err();
        assert!(err.to_string().contains("same-bin"));
    }

    #[test]
    fn test_base_without_distro_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("workloads");
        std::fs::create_dir_all(&workdir).unwrap();
        std::fs::write(workdir.join("orphan.json"), r#"{ "name": "orphan" }"#).unwrap();

        let ctx = make_context(dir.path());
        let err = WorkloadCatalog::load(&[workdir], &ctx).unwrap_err();
        assert!(err.to_string().contains("distro"));
    }

    #[test]
    fn test_inheritance_cycle_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("workloads");
        std::fs::create_dir_all(&workdir).unwrap();
        std::fs::write(workdir.join("a.json"), r#"{ "base": "b.json" }"#).unwrap();
        std::fs::write(workdir.join("b.json"), r#"{ "base": "a.json" }"#).unwrap();

        let ctx = make_context(dir.path());
        let err = WorkloadCatalog::load(&[workdir], &ctx).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_unknown_base_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("workloads");
        std::fs::create_dir_all(&workdir).unwrap();
        std::fs::write(workdir.join("a.json"), r#"{ "base": "nope.json" }"#).unwrap();

        let ctx = make_context(dir.path());
        let err = WorkloadCatalog::load(&[workdir], &ctx).unwrap_err();
        assert!(err.to_string().contains("unknown base 'nope.json'"));
    }
}
