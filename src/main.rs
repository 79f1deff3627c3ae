use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};
use workload_runner::{
    BuildRequest, JobSelector, LaunchRequest, Result, RunName, Settings, SettingsLoader, builder,
};

/// Build, provision and launch simulator workloads.
#[derive(Parser)]
#[command(name = "workload-runner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Workload configuration file
    #[arg(short, long, global = true, default_value = "workloads/br-base.json")]
    config: PathBuf,

    /// Directory of workload configuration files (repeatable; default: the config's directory)
    #[arg(long, global = true)]
    workdir: Vec<PathBuf>,

    /// Root directory that settings paths resolve against
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Settings file (default: workload-runner.toml in the root directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a workload's binaries and disk images
    Build {
        /// Build only this job (default: all jobs)
        #[arg(short, long)]
        job: Option<String>,

        /// Also build the initramfs variants
        #[arg(short, long)]
        initramfs: bool,
    },

    /// Boot a built workload
    Launch {
        /// Use the Spike functional simulator instead of QEMU
        #[arg(short, long)]
        spike: bool,

        /// Launch this job (default: the workload itself)
        #[arg(short, long)]
        job: Option<String>,

        /// Boot the initramfs variant
        #[arg(short, long)]
        initramfs: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Build { .. } => "build",
            Commands::Launch { .. } => "launch",
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = SettingsLoader::new().root(&cli.root);
    if let Some(path) = &cli.settings {
        loader = loader.settings_file(path);
    }
    let (mut settings, root) = loader.load()?;
    settings.verbose |= cli.verbose;

    let run_name = RunName::new(&cli.config, cli.command.name());
    init_logging(&settings, &root, &run_name)?;

    let workdirs = if cli.workdir.is_empty() {
        vec![config_dir(&cli.config)]
    } else {
        cli.workdir.clone()
    };

    let mut manager = workdirs
        .into_iter()
        .fold(builder().root(root).with_settings(settings), |b, dir| {
            b.workdir(dir)
        })
        .run_name(run_name)
        .build()?;

    match cli.command {
        Commands::Build { job, initramfs } => {
            manager.build(&BuildRequest {
                config: cli.config,
                job: selector(job),
                initramfs,
            })?;
        }
        Commands::Launch {
            spike,
            job,
            initramfs,
        } => {
            let report = manager.launch(&LaunchRequest {
                config: cli.config,
                job: selector(job),
                initramfs,
                spike,
            })?;
            tracing::info!(output = %report.output_dir.display(), "run complete");
        }
    }

    Ok(())
}

fn selector(job: Option<String>) -> JobSelector {
    job.map(JobSelector::Named).unwrap_or_default()
}

fn config_dir(config: &Path) -> PathBuf {
    match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Console layer on stderr plus a DEBUG file layer at `<log-dir>/<run-name>.log`.
fn init_logging(settings: &Settings, root: &Path, run_name: &RunName) -> Result<()> {
    let log_dir = root.join(&settings.paths.log_dir);
    std::fs::create_dir_all(&log_dir)?;
    let log_file = File::create(log_dir.join(format!("{}.log", run_name)))?;

    let console_level = if settings.verbose { "debug" } else { "info" };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_level));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false)
                .with_filter(EnvFilter::new("debug")),
        )
        .try_init();
    Ok(())
}
