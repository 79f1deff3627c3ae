use super::{Action, BuildRule, RuleSet, UpToDate};
use crate::config::{Catalog, WorkloadConfig};
use crate::core::error::Result;
use crate::util::fs::expand_source;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Emit the rules for every artifact reachable from `catalog`.
///
/// Base distributions get their binary rules plus a base-image rule for their
/// image; every other configuration, and each of its jobs, gets rules from
/// [`add_workload_rules`].
pub fn build_rules(catalog: &dyn Catalog) -> Result<RuleSet> {
    let mut rules = RuleSet::new();
    let distros: BTreeSet<PathBuf> = catalog.base_distributions().into_iter().collect();

    for path in &distros {
        let config = catalog.resolve(path)?;
        add_binary_rules(&mut rules, config)?;
        if let Some(img) = &config.img {
            let mut rule = BuildRule::new(
                img,
                Action::BaseImage {
                    config: config.clone(),
                },
            );
            rule.uptodate = Some(UpToDate::Distro {
                config: config.clone(),
            });
            rules.push(rule)?;
        }
    }

    for path in catalog.all_known_paths() {
        if distros.contains(&path) {
            continue;
        }
        add_config_tree(&mut rules, catalog.resolve(&path)?)?;
    }

    tracing::debug!(rules = rules.len(), "built rule set");
    Ok(rules)
}

fn add_config_tree(rules: &mut RuleSet, config: &WorkloadConfig) -> Result<()> {
    add_workload_rules(rules, config)?;
    for job in config.jobs.values() {
        add_config_tree(rules, job)?;
    }
    Ok(())
}

/// Emit the binary, initramfs-binary and image rules for one configuration.
pub fn add_workload_rules(rules: &mut RuleSet, config: &WorkloadConfig) -> Result<()> {
    add_binary_rules(rules, config)?;

    if let Some(img) = &config.img {
        let mut image = BuildRule::new(
            img,
            Action::Image {
                config: config.clone(),
            },
        );
        if let Some(base) = &config.base_img {
            image.file_deps.push(base.clone());
            image.task_deps.push(base.clone());
        }
        for file in &config.files {
            // Missing sources surface when the image is provisioned.
            match expand_source(&file.src) {
                Ok(files) => image.file_deps.extend(files),
                Err(e) => tracing::debug!(src = %file.src.display(), "skipping dependency: {}", e),
            }
        }
        if let Some(init) = &config.guest_init {
            image.file_deps.push(init.clone());
            image.task_deps.push(config.bin.clone());
        }
        if let Some(script) = config.run_spec.as_ref().and_then(|r| r.path()) {
            image.file_deps.push(script.to_path_buf());
        }
        image.file_deps.extend(config.cfg_file.clone());
        rules.push(image)?;
    }

    Ok(())
}

/// The plain binary rule, plus the initramfs variant when flagged.
fn add_binary_rules(rules: &mut RuleSet, config: &WorkloadConfig) -> Result<()> {
    let mut bin = BuildRule::new(
        &config.bin,
        Action::Binary {
            config: config.clone(),
            initramfs: false,
        },
    );
    match &config.linux_config {
        Some(linux_config) => {
            bin.file_deps.push(linux_config.clone());
            bin.uptodate = Some(UpToDate::KernelTree {
                linux_src: config.linux_src.clone(),
            });
        }
        // Produced by host-init; nothing to rebuild once it exists.
        None => bin.uptodate = Some(UpToDate::Exists(config.bin.clone())),
    }
    rules.push(bin)?;

    if config.initramfs {
        let mut initramfs = BuildRule::new(
            config.initramfs_bin(),
            Action::Binary {
                config: config.clone(),
                initramfs: true,
            },
        );
        if let Some(img) = &config.img {
            initramfs.file_deps.push(img.clone());
            initramfs.task_deps.push(img.clone());
        }
        initramfs.file_deps.extend(config.linux_config.clone());
        rules.push(initramfs)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileSpec, RunSpec};
    use std::path::Path;

    #[test]
    fn test_binary_without_kernel_config_checks_existence() {
        let mut rules = RuleSet::new();
        add_workload_rules(&mut rules, &WorkloadConfig::new("w", "w-bin")).unwrap();

        assert_eq!(rules.len(), 1);
        let bin = rules.get(Path::new("w-bin")).unwrap();
        assert!(matches!(&bin.uptodate, Some(UpToDate::Exists(p)) if p == Path::new("w-bin")));
    }

    #[test]
    fn test_image_rule_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let init = dir.path().join("init.sh");
        let run = dir.path().join("run.sh");
        let motd = dir.path().join("motd");
        for f in [&init, &run, &motd] {
            std::fs::write(f, "").unwrap();
        }

        let mut config = WorkloadConfig::new("w", "w-bin");
        config.img = Some(PathBuf::from("w.img"));
        config.base_img = Some(PathBuf::from("base.img"));
        config.files = vec![FileSpec::new(&motd, "/etc/motd")];
        config.guest_init = Some(init.clone());
        config.run_spec = Some(RunSpec::Script(run.clone()));
        config.cfg_file = Some(PathBuf::from("w.json"));

        let mut rules = RuleSet::new();
        add_workload_rules(&mut rules, &config).unwrap();
        let image = rules.get(Path::new("w.img")).unwrap();

        assert_eq!(
            image.file_deps,
            vec![
                PathBuf::from("base.img"),
                motd,
                init,
                run,
                PathBuf::from("w.json")
            ]
        );
        assert_eq!(
            image.task_deps,
            vec![PathBuf::from("base.img"), PathBuf::from("w-bin")]
        );
        assert!(image.uptodate.is_none());
    }

    #[test]
    fn test_command_run_spec_adds_no_dependency() {
        let mut config = WorkloadConfig::new("w", "w-bin");
        config.img = Some(PathBuf::from("w.img"));
        config.run_spec = Some(RunSpec::Command("echo hi".to_string()));

        let mut rules = RuleSet::new();
        add_workload_rules(&mut rules, &config).unwrap();
        assert!(rules.get(Path::new("w.img")).unwrap().has_no_deps());
    }

    #[test]
    fn test_initramfs_rule_depends_on_image() {
        let mut config = WorkloadConfig::new("w", "w-bin");
        config.img = Some(PathBuf::from("w.img"));
        config.linux_config = Some(PathBuf::from("linux-config"));
        config.initramfs = true;

        let mut rules = RuleSet::new();
        add_workload_rules(&mut rules, &config).unwrap();
        let rule = rules.get(Path::new("w-bin-initramfs")).unwrap();
        assert_eq!(
            rule.file_deps,
            vec![PathBuf::from("w.img"), PathBuf::from("linux-config")]
        );
        assert_eq!(rule.task_deps, vec![PathBuf::from("w.img")]);
        assert!(matches!(rule.action, Action::Binary { initramfs: true, .. }));
    }
}
