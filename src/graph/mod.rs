//! Build rules and their executor.
//!
//! Rules are produced fresh per invocation from the workload catalog
//! ([`build_rules`]) and run by [`TaskExecutor`]. Only the artifacts on disk
//! persist between invocations.

use crate::config::WorkloadConfig;
use crate::core::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod deps;
mod executor;

pub use deps::{add_workload_rules, build_rules};
pub use executor::{BuildReport, TaskExecutor};

/// What a rule does when it runs.
#[derive(Debug, Clone)]
pub enum Action {
    /// Build a base distribution's image.
    BaseImage { config: WorkloadConfig },
    /// Build a kernel/bootloader binary, optionally with the image embedded.
    Binary {
        config: WorkloadConfig,
        initramfs: bool,
    },
    /// Provision a disk image.
    Image { config: WorkloadConfig },
}

/// Staleness predicate; `true` means up to date.
#[derive(Debug, Clone)]
pub enum UpToDate {
    /// Ask the kernel build tree whether it considers itself current.
    /// `None` selects the default tree.
    KernelTree { linux_src: Option<PathBuf> },
    /// Ask the base distribution's build tree.
    Distro { config: WorkloadConfig },
    /// The path exists.
    Exists(PathBuf),
}

/// One producible artifact.
#[derive(Debug, Clone)]
pub struct BuildRule {
    pub target: PathBuf,
    pub action: Action,
    /// Files whose modification makes the target stale.
    pub file_deps: Vec<PathBuf>,
    /// Targets that must be built first.
    pub task_deps: Vec<PathBuf>,
    pub uptodate: Option<UpToDate>,
}

impl BuildRule {
    pub fn new(target: impl Into<PathBuf>, action: Action) -> Self {
        Self {
            target: target.into(),
            action,
            file_deps: Vec::new(),
            task_deps: Vec::new(),
            uptodate: None,
        }
    }

    /// Whether the rule declares no dependencies of either kind.
    pub fn has_no_deps(&self) -> bool {
        self.file_deps.is_empty() && self.task_deps.is_empty()
    }
}

/// Rules keyed by target; targets are unique.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<BuildRule>,
    index: HashMap<PathBuf, usize>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule; a second rule for the same target is an error.
    pub fn push(&mut self, rule: BuildRule) -> Result<()> {
        if self.index.contains_key(&rule.target) {
            return Err(Error::DuplicateTarget(rule.target));
        }
        self.index.insert(rule.target.clone(), self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    pub fn get(&self, target: &Path) -> Option<&BuildRule> {
        self.index.get(target).map(|&i| &self.rules[i])
    }

    pub fn contains(&self, target: &Path) -> bool {
        self.index.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildRule> {
        self.rules.iter()
    }
}

/// Performs rule actions and evaluates staleness predicates.
pub trait RuleHandler {
    /// Produce `rule.target`.
    fn execute(&self, rule: &BuildRule) -> Result<()>;

    /// Evaluate a staleness predicate.
    fn is_up_to_date(&self, check: &UpToDate) -> Result<bool>;
}
