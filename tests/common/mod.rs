//! Fakes for the mount and emulator seams.
//!
//! A fake disk image is a JSON object mapping image-relative paths to file
//! contents. [`FakeMounter`] unpacks it into the mount point on mount and
//! packs the mount point back into the image on unmount.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;
use workload_runner::config::Settings;
use workload_runner::core::{Context, RunName};
use workload_runner::image::{Mounter, Ownership};
use workload_runner::runner::console::ConsoleHandler;
use workload_runner::runner::{LaunchTarget, RunResult, Runner};
use workload_runner::{Error, Result};

/// Context rooted at `root` with default settings.
pub fn context(root: &Path) -> Context {
    Context::new(
        Settings::default(),
        root.to_path_buf(),
        RunName::new(Path::new("test.json"), "build"),
    )
    .unwrap()
}

/// Write a fake image holding `files`.
pub fn write_image(path: &Path, files: &[(&str, &str)]) {
    let tree: BTreeMap<String, String> = files
        .iter()
        .map(|(rel, content)| (rel.to_string(), content.to_string()))
        .collect();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_string(&tree).unwrap()).unwrap();
}

/// Read a fake image's file tree.
pub fn read_image(path: &Path) -> BTreeMap<String, String> {
    let raw = std::fs::read_to_string(path).unwrap();
    if raw.trim().is_empty() {
        return BTreeMap::new();
    }
    serde_json::from_str(&raw).unwrap()
}

fn pack_tree(root: &Path) -> BTreeMap<String, String> {
    let mut tree = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.unwrap();
        if entry.file_type().is_file() {
            let rel = entry.path().strip_prefix(root).unwrap();
            let content = std::fs::read(entry.path()).unwrap();
            tree.insert(
                rel.to_string_lossy().replace('\\', "/"),
                String::from_utf8_lossy(&content).into_owned(),
            );
        }
    }
    tree
}

fn reset_dir(dir: &Path) {
    if dir.exists() {
        std::fs::remove_dir_all(dir).unwrap();
    }
    std::fs::create_dir_all(dir).unwrap();
}

fn copy_tree(src: &Path, dst: &Path) {
    if src.is_dir() {
        for entry in WalkDir::new(src).min_depth(1) {
            let entry = entry.unwrap();
            let target = dst.join(entry.path().strip_prefix(src).unwrap());
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target).unwrap();
            } else {
                std::fs::create_dir_all(target.parent().unwrap()).unwrap();
                std::fs::copy(entry.path(), &target).unwrap();
            }
        }
        std::fs::create_dir_all(dst).unwrap();
    } else {
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        std::fs::copy(src, dst).unwrap();
    }
}

/// Directory-backed mounter that records every call.
#[derive(Default)]
pub struct FakeMounter {
    pub calls: Mutex<Vec<String>>,
    mounted: Mutex<Option<(PathBuf, PathBuf)>>,
    fail_sync: bool,
}

impl FakeMounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mounter whose every sync fails.
    pub fn failing_sync() -> Self {
        Self {
            fail_sync: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.lock().unwrap().is_some()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Mounter for FakeMounter {
    fn mount(&self, image: &Path, mount_point: &Path) -> Result<()> {
        self.record(format!("mount {}", image.display()));
        let mut mounted = self.mounted.lock().unwrap();
        if mounted.is_some() {
            return Err(Error::mount("mount point busy"));
        }
        if !image.is_file() {
            return Err(Error::mount(format!("no such image: {}", image.display())));
        }
        reset_dir(mount_point);
        for (rel, content) in read_image(image) {
            let path = mount_point.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        *mounted = Some((image.to_path_buf(), mount_point.to_path_buf()));
        Ok(())
    }

    fn unmount(&self, mount_point: &Path) -> Result<()> {
        self.record(format!("unmount {}", mount_point.display()));
        let Some((image, mnt)) = self.mounted.lock().unwrap().take() else {
            return Err(Error::mount("not mounted"));
        };
        std::fs::write(&image, serde_json::to_string(&pack_tree(&mnt)).unwrap()).unwrap();
        reset_dir(&mnt);
        Ok(())
    }

    /// Follows rsync: `dir/*` copies the directory's contents into `dst`,
    /// a directory or a `dst` ending in `/` receives `src` by name.
    fn sync(&self, src: &Path, dst: &Path, owner: Ownership) -> Result<()> {
        self.record(format!("sync {} {} {}", src.display(), dst.display(), owner));
        if self.fail_sync {
            return Err(Error::mount("rsync failed"));
        }

        let raw = src.to_string_lossy();
        if let Some(parent) = raw.strip_suffix("/*") {
            let parent = Path::new(parent);
            if !parent.is_dir() {
                return Err(Error::FileNotFound(parent.to_path_buf()));
            }
            std::fs::create_dir_all(dst).unwrap();
            for entry in std::fs::read_dir(parent).unwrap() {
                let entry = entry.unwrap();
                copy_tree(&entry.path(), &dst.join(entry.file_name()));
            }
            return Ok(());
        }

        if !src.exists() {
            return Err(Error::FileNotFound(src.to_path_buf()));
        }
        let into_dir = dst.to_string_lossy().ends_with('/') || dst.is_dir();
        let target = match src.file_name() {
            Some(name) if into_dir || src.is_dir() => dst.join(name),
            _ => dst.to_path_buf(),
        };
        copy_tree(src, &target);
        Ok(())
    }

    fn pack_cpio(&self, root: &Path, dst: &Path) -> Result<()> {
        self.record(format!("cpio {}", dst.display()));
        std::fs::write(dst, serde_json::to_string(&pack_tree(root)).unwrap()).unwrap();
        Ok(())
    }
}

/// What a [`FakeRunner`] saw when it booted.
#[derive(Debug, Clone)]
pub struct Boot {
    pub target: LaunchTarget,
    /// Contents of `/workload.sh` in the booted image.
    pub workload_script: Option<String>,
}

/// Runner that records boots instead of spawning an emulator.
pub struct FakeRunner {
    exit_code: i32,
    console: String,
    pub boots: Mutex<Vec<Boot>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::exiting_with(0)
    }

    pub fn exiting_with(exit_code: i32) -> Self {
        Self {
            exit_code,
            console: "Welcome to Buildroot\nworkload done\n".to_string(),
            boots: Mutex::new(Vec::new()),
        }
    }

    pub fn boots(&self) -> Vec<Boot> {
        self.boots.lock().unwrap().clone()
    }
}

impl Runner for FakeRunner {
    fn run(
        &self,
        _ctx: &Context,
        target: &LaunchTarget,
        console: &mut dyn ConsoleHandler,
    ) -> Result<RunResult> {
        let workload_script = target
            .img
            .as_ref()
            .and_then(|img| read_image(img).get("workload.sh").cloned());
        self.boots.lock().unwrap().push(Boot {
            target: target.clone(),
            workload_script,
        });

        console.on_output(self.console.as_bytes());
        console.on_exit(self.exit_code);
        Ok(RunResult::new(self.exit_code, self.exit_code == 0))
    }

    fn is_available(&self, _ctx: &Context) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fake"
    }
}
