use crate::build::{build_binary, kernel_up_to_date};
use crate::config::{
    Catalog, FileSpec, Settings, SettingsLoader, WorkloadCatalog, WorkloadConfig,
};
use crate::core::context::{Context, RunName};
use crate::core::error::{Error, Result};
use crate::distro::distro_for;
use crate::graph::{Action, BuildReport, BuildRule, RuleHandler, RuleSet, TaskExecutor, UpToDate};
use crate::image::mount::copy_image_files;
use crate::image::{Direction, LoopMounter, Mounter, Provisioner};
use crate::runner::console::TeeHandler;
use crate::runner::{LaunchTarget, RunResult, Runner};
use crate::util::Cmd;
use std::path::{Path, PathBuf};

/// Which jobs of a workload a request covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobSelector {
    /// Every job when building; the workload itself when launching.
    #[default]
    All,
    /// One job, by its short name.
    Named(String),
}

/// Request to build a workload's artifacts.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Workload configuration file.
    pub config: PathBuf,
    pub job: JobSelector,
    /// Also build the initramfs variants.
    pub initramfs: bool,
}

/// Request to boot a built workload.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Workload configuration file.
    pub config: PathBuf,
    pub job: JobSelector,
    /// Boot the initramfs variant instead of the disk image.
    pub initramfs: bool,
    /// Use the functional simulator instead of the full-system emulator.
    pub spike: bool,
}

/// Outcome of a launch.
#[derive(Debug)]
pub struct LaunchReport {
    pub result: RunResult,
    /// Result directory of the launched job (holds `uartlog` and outputs).
    pub output_dir: PathBuf,
}

/// Builder for creating a [`WorkloadManager`].
pub struct WorkloadManagerBuilder {
    settings: Option<Settings>,
    root: Option<PathBuf>,
    workdirs: Vec<PathBuf>,
    catalog: Option<WorkloadCatalog>,
    run_name: Option<RunName>,
    mounter: Option<Box<dyn Mounter>>,
    qemu: Option<Box<dyn Runner>>,
    spike: Option<Box<dyn Runner>>,
}

impl WorkloadManagerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            settings: None,
            root: None,
            workdirs: Vec::new(),
            catalog: None,
            run_name: None,
            mounter: None,
            qemu: None,
            spike: None,
        }
    }

    /// Set the settings directly.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Load settings with [`SettingsLoader`] from the root directory.
    pub fn load_settings(mut self, settings_file: Option<PathBuf>) -> Result<Self> {
        let root = self
            .root
            .clone()
            .ok_or_else(|| Error::config("root directory not set (call root first)"))?;
        let mut loader = SettingsLoader::new().root(root);
        if let Some(path) = settings_file {
            loader = loader.settings_file(path);
        }
        let (settings, _) = loader.load()?;
        self.settings = Some(settings);
        Ok(self)
    }

    /// Set the root directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Add a directory of workload configuration files.
    pub fn workdir(mut self, path: impl Into<PathBuf>) -> Self {
        self.workdirs.push(path.into());
        self
    }

    /// Use an already-loaded catalog instead of scanning workload directories.
    pub fn catalog(mut self, catalog: WorkloadCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the run identifier.
    pub fn run_name(mut self, run_name: RunName) -> Self {
        self.run_name = Some(run_name);
        self
    }

    // --- Collaborators ---

    /// Set a custom mounter implementation.
    pub fn mounter<M: Mounter + 'static>(mut self, mounter: M) -> Self {
        self.mounter = Some(Box::new(mounter));
        self
    }

    /// Set a custom full-system emulator runner.
    pub fn runner<R: Runner + 'static>(mut self, runner: R) -> Self {
        self.qemu = Some(Box::new(runner));
        self
    }

    /// Set a custom functional simulator runner.
    pub fn spike_runner<R: Runner + 'static>(mut self, runner: R) -> Self {
        self.spike = Some(Box::new(runner));
        self
    }

    // --- Build ---

    /// Build the workload manager.
    pub fn build(self) -> Result<WorkloadManager> {
        let root = self
            .root
            .ok_or_else(|| Error::config("root directory not set (call root)"))?;
        let settings = self.settings.unwrap_or_default();
        let run_name = self
            .run_name
            .unwrap_or_else(|| RunName::new(Path::new("workload"), "run"));

        let ctx = Context::new(settings, root, run_name)?;

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => {
                let workdirs = if self.workdirs.is_empty() {
                    vec![ctx.root_dir.join("workloads")]
                } else {
                    self.workdirs
                };
                WorkloadCatalog::load(&workdirs, &ctx)?
            }
        };

        let mounter = self.mounter.unwrap_or_else(|| Box::new(LoopMounter::new()));
        let qemu = self.qemu.or_else(default_qemu);
        let spike = self.spike.or_else(default_spike);

        Ok(WorkloadManager {
            ctx,
            catalog,
            mounter,
            qemu,
            spike,
        })
    }
}

impl Default for WorkloadManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "qemu")]
fn default_qemu() -> Option<Box<dyn Runner>> {
    Some(Box::new(crate::runner::qemu::QemuRunner::new()))
}

#[cfg(not(feature = "qemu"))]
fn default_qemu() -> Option<Box<dyn Runner>> {
    None
}

#[cfg(feature = "spike")]
fn default_spike() -> Option<Box<dyn Runner>> {
    Some(Box::new(crate::runner::spike::SpikeRunner::new()))
}

#[cfg(not(feature = "spike"))]
fn default_spike() -> Option<Box<dyn Runner>> {
    None
}

/// Builds and launches workloads from a catalog.
pub struct WorkloadManager {
    ctx: Context,
    catalog: WorkloadCatalog,
    mounter: Box<dyn Mounter>,
    qemu: Option<Box<dyn Runner>>,
    spike: Option<Box<dyn Runner>>,
}

impl WorkloadManager {
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn catalog(&self) -> &WorkloadCatalog {
        &self.catalog
    }

    /// The full rule set for the current catalog.
    pub fn rules(&self) -> Result<RuleSet> {
        crate::graph::build_rules(&self.catalog)
    }

    /// Build the requested workload (and jobs), skipping up-to-date artifacts.
    pub fn build(&mut self, request: &BuildRequest) -> Result<BuildReport> {
        let path = std::path::absolute(&request.config)?;
        if request.initramfs {
            self.catalog.resolve_mut(&path)?.propagate_initramfs();
        }

        let rules = self.rules()?;
        let config = self.catalog.resolve(&path)?;
        let selected = select_for_build(config, &request.job)?;

        for config in &selected {
            run_host_init(config)?;
        }

        let mut bins = Vec::new();
        let mut imgs = Vec::new();
        for config in &selected {
            bins.push(config.bin.clone());
            if config.initramfs {
                bins.push(config.initramfs_bin());
            }
            imgs.extend(config.img.clone());
        }
        bins.extend(imgs);

        let handler = ActionHandler {
            ctx: &self.ctx,
            mounter: self.mounter.as_ref(),
            runner: self.qemu.as_deref(),
        };
        let report = TaskExecutor::new(&rules).run(&bins, &handler)?;
        tracing::info!(
            executed = report.executed.len(),
            up_to_date = report.up_to_date.len(),
            "build finished"
        );
        Ok(report)
    }

    /// Boot a workload, capture its console and copy its outputs out.
    pub fn launch(&self, request: &LaunchRequest) -> Result<LaunchReport> {
        let path = std::path::absolute(&request.config)?;
        let base = self.catalog.resolve(&path)?;
        let config = match &request.job {
            JobSelector::All => base,
            JobSelector::Named(name) => base.job(name)?,
        };

        let runner = if request.spike {
            self.spike
                .as_deref()
                .ok_or_else(|| Error::feature_not_enabled("spike"))?
        } else {
            self.qemu
                .as_deref()
                .ok_or_else(|| Error::feature_not_enabled("qemu"))?
        };

        let target = LaunchTarget::for_config(config, request.initramfs);
        runner.validate(&self.ctx, &target)?;

        let run_dir = self.ctx.run_output_dir();
        let job_dir = run_dir.join(&config.name);
        std::fs::create_dir_all(&job_dir)?;

        tracing::info!(
            workload = %config.name,
            runner = runner.name(),
            output = %job_dir.display(),
            "launching"
        );
        let mut console = TeeHandler::with_log(&job_dir.join("uartlog"))?;
        let result = runner.run(&self.ctx, &target, &mut console)?;

        self.copy_outputs(config, &job_dir)?;

        if let Some(hook) = &config.post_run_hook {
            tracing::info!(hook = %hook, "running post-run hook");
            Cmd::new("sh")
                .arg("-c")
                .arg(format!("{} \"$1\"", hook))
                .arg("post_run_hook")
                .arg(&run_dir)
                .cwd(&config.workdir)
                .error_msg(format!("post-run hook '{}' failed", hook))
                .run()?;
        }

        if !result.success {
            return Err(Error::runner(format!(
                "{} exited with code {}",
                runner.name(),
                result.exit_code
            )));
        }

        Ok(LaunchReport {
            result,
            output_dir: job_dir,
        })
    }

    fn copy_outputs(&self, config: &WorkloadConfig, job_dir: &Path) -> Result<()> {
        if config.outputs.is_empty() {
            return Ok(());
        }
        let Some(img) = &config.img else {
            tracing::warn!(workload = %config.name, "outputs declared without a disk image");
            return Ok(());
        };
        let files: Vec<FileSpec> = config
            .outputs
            .iter()
            .map(|out| FileSpec::new(out, job_dir))
            .collect();
        copy_image_files(
            self.mounter.as_ref(),
            &self.ctx.mount_point,
            img,
            &files,
            Direction::Out,
        )
    }
}

/// The workload plus the jobs selected for building.
fn select_for_build<'c>(
    config: &'c WorkloadConfig,
    job: &JobSelector,
) -> Result<Vec<&'c WorkloadConfig>> {
    let mut selected = vec![config];
    match job {
        JobSelector::All => selected.extend(config.jobs.values()),
        JobSelector::Named(name) => selected.push(config.job(name)?),
    }
    Ok(selected)
}

/// Run a workload's host-init script in its workload directory.
fn run_host_init(config: &WorkloadConfig) -> Result<()> {
    let Some(script) = &config.host_init else {
        return Ok(());
    };
    if !script.exists() {
        return Err(Error::config(format!(
            "{}: host-init script {} not found",
            config.name,
            script.display()
        )));
    }
    tracing::info!(script = %script.display(), "applying host-init");
    Cmd::new(script)
        .cwd(&config.workdir)
        .error_msg(format!("host-init {} failed", script.display()))
        .run()?;
    Ok(())
}

/// Dispatches rule actions to the binary builder, provisioner and distributions.
struct ActionHandler<'a> {
    ctx: &'a Context,
    mounter: &'a dyn Mounter,
    runner: Option<&'a dyn Runner>,
}

impl RuleHandler for ActionHandler<'_> {
    fn execute(&self, rule: &BuildRule) -> Result<()> {
        match &rule.action {
            Action::BaseImage { config } => {
                distro_for(config.distro).build_base_image(self.ctx, config)
            }
            Action::Binary { config, initramfs } => {
                build_binary(self.ctx, self.mounter, config, *initramfs)
            }
            Action::Image { config } => {
                Provisioner::new(self.ctx, self.mounter, self.runner).provision(config)?;
                Ok(())
            }
        }
    }

    fn is_up_to_date(&self, check: &UpToDate) -> Result<bool> {
        match check {
            UpToDate::KernelTree { linux_src } => kernel_up_to_date(
                self.ctx,
                linux_src.as_deref().unwrap_or(&self.ctx.linux_src),
            ),
            UpToDate::Distro { config } => distro_for(config.distro).up_to_date(self.ctx, config),
            UpToDate::Exists(path) => Ok(path.exists()),
        }
    }
}
