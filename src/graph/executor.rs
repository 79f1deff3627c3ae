use super::{BuildRule, RuleHandler, RuleSet};
use crate::core::error::{Error, Result};
use crate::util::fs::is_newer;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Outcome of a successful executor run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Targets whose action ran, in execution order.
    pub executed: Vec<PathBuf>,
    /// Targets found up to date.
    pub up_to_date: Vec<PathBuf>,
}

/// Runs the rules needed for a set of targets in dependency order.
///
/// Each rule runs at most once per [`run`](Self::run). The first failing
/// action aborts the run; outputs already produced are left in place.
pub struct TaskExecutor<'a> {
    rules: &'a RuleSet,
}

impl<'a> TaskExecutor<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    pub fn run(&self, targets: &[PathBuf], handler: &dyn RuleHandler) -> Result<BuildReport> {
        let order = self.plan(targets)?;
        let mut report = BuildReport::default();
        let mut rebuilt: HashSet<&Path> = HashSet::new();

        for rule in order {
            let deps = self.rule_deps(rule);
            let stale = self
                .is_stale(rule, &deps, &rebuilt, handler)
                .map_err(|e| Error::build_failed(&rule.target, e))?;

            if !stale {
                tracing::debug!(target = %rule.target.display(), "up to date");
                report.up_to_date.push(rule.target.clone());
                continue;
            }

            tracing::info!(target = %rule.target.display(), "building");
            handler
                .execute(rule)
                .map_err(|e| Error::build_failed(&rule.target, e))?;
            rebuilt.insert(&rule.target);
            report.executed.push(rule.target.clone());
        }

        Ok(report)
    }

    /// Dependency-ordered closure of the rules needed for `targets`.
    fn plan(&self, targets: &[PathBuf]) -> Result<Vec<&'a BuildRule>> {
        let mut graph: DiGraph<&'a BuildRule, ()> = DiGraph::new();
        let mut nodes: HashMap<&'a Path, NodeIndex> = HashMap::new();
        let mut pending: Vec<&'a BuildRule> = Vec::new();

        for target in targets {
            let rule = self
                .rules
                .get(target)
                .ok_or_else(|| Error::UnknownTarget(target.clone()))?;
            if !nodes.contains_key(rule.target.as_path()) {
                nodes.insert(&rule.target, graph.add_node(rule));
                pending.push(rule);
            }
        }

        while let Some(rule) = pending.pop() {
            let dependent = nodes[rule.target.as_path()];
            for dep in self.rule_deps(rule) {
                let Some(dep_rule) = self.rules.get(dep) else {
                    continue;
                };
                let dep_node = match nodes.get(dep_rule.target.as_path()) {
                    Some(&node) => node,
                    None => {
                        let node = graph.add_node(dep_rule);
                        nodes.insert(&dep_rule.target, node);
                        pending.push(dep_rule);
                        node
                    }
                };
                graph.update_edge(dep_node, dependent, ());
            }
            for dep in &rule.task_deps {
                if !self.rules.contains(dep) && !dep.exists() {
                    return Err(Error::UnknownTarget(dep.clone()));
                }
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| Error::CycleDetected(graph[cycle.node_id()].target.clone()))?;
        Ok(order.into_iter().map(|node| graph[node]).collect())
    }

    /// Dependencies that are themselves produced by rules, in declaration order.
    ///
    /// Task dependencies without a rule must already exist and are treated as inputs.
    fn rule_deps(&self, rule: &'a BuildRule) -> Vec<&'a Path> {
        let mut seen = HashSet::new();
        rule.task_deps
            .iter()
            .chain(&rule.file_deps)
            .map(PathBuf::as_path)
            .filter(|dep| self.rules.contains(dep) && seen.insert(*dep))
            .collect()
    }

    fn is_stale(
        &self,
        rule: &BuildRule,
        deps: &[&Path],
        rebuilt: &HashSet<&Path>,
        handler: &dyn RuleHandler,
    ) -> Result<bool> {
        if let Some(dep) = deps.iter().find(|d| rebuilt.contains(*d)) {
            tracing::debug!(target = %rule.target.display(), dep = %dep.display(), "dependency rebuilt");
            return Ok(true);
        }
        if !rule.target.exists() {
            return Ok(true);
        }
        for dep in &rule.file_deps {
            if is_newer(dep, &rule.target)? {
                tracing::debug!(target = %rule.target.display(), dep = %dep.display(), "dependency changed");
                return Ok(true);
            }
        }
        match &rule.uptodate {
            Some(check) => match handler.is_up_to_date(check) {
                Ok(current) => Ok(!current),
                Err(e) => {
                    tracing::warn!(
                        target = %rule.target.display(),
                        "up-to-date check failed, rebuilding: {}",
                        e
                    );
                    Ok(true)
                }
            },
            None => Ok(rule.has_no_deps()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadConfig;
    use crate::graph::{Action, UpToDate};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        executed: Mutex<Vec<PathBuf>>,
    }

    impl RuleHandler for Recorder {
        fn execute(&self, rule: &BuildRule) -> Result<()> {
            self.executed.lock().unwrap().push(rule.target.clone());
            Ok(())
        }

        fn is_up_to_date(&self, _check: &UpToDate) -> Result<bool> {
            Ok(true)
        }
    }

    fn rule(target: &Path, task_deps: &[&Path]) -> BuildRule {
        let mut rule = BuildRule::new(
            target,
            Action::Image {
                config: WorkloadConfig::new("w", "w-bin"),
            },
        );
        rule.task_deps = task_deps.iter().map(|p| p.to_path_buf()).collect();
        rule
    }

    #[test]
    fn test_unknown_target() {
        let rules = RuleSet::new();
        let err = TaskExecutor::new(&rules)
            .run(&[PathBuf::from("nope")], &Recorder::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTarget(_)));
    }

    #[test]
    fn test_missing_task_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let mut rules = RuleSet::new();
        rules.push(rule(&a, &[&dir.path().join("missing")])).unwrap();

        let err = TaskExecutor::new(&rules)
            .run(&[a], &Recorder::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTarget(_)));
    }

    #[test]
    fn test_cycle_detected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let mut rules = RuleSet::new();
        rules.push(rule(&a, &[&b])).unwrap();
        rules.push(rule(&b, &[&a])).unwrap();

        let err = TaskExecutor::new(&rules)
            .run(&[a], &Recorder::default())
            .unwrap_err();
        assert!(matches!(err, Error::CycleDetected(_)));
    }

    #[test]
    fn test_shared_dependency_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let mut rules = RuleSet::new();
        rules.push(rule(&base, &[])).unwrap();
        rules.push(rule(&a, &[&base])).unwrap();
        rules.push(rule(&b, &[&base])).unwrap();

        let recorder = Recorder::default();
        let report = TaskExecutor::new(&rules)
            .run(&[a.clone(), b.clone(), a.clone()], &recorder)
            .unwrap();

        let executed = recorder.executed.lock().unwrap();
        assert_eq!(executed.len(), 3);
        assert_eq!(executed[0], base);
        assert_eq!(report.executed, *executed);
    }
}
