use crate::core::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir_exists(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Copy a file, creating parent directories as needed.
pub fn copy_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    if !src.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Source file not found: {}", src.display()),
        ));
    }

    if let Some(parent) = dst.parent() {
        ensure_dir_exists(parent)?;
    }

    std::fs::copy(src, dst).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("Failed to copy {} to {}: {}", src.display(), dst.display(), e),
        )
    })?;
    Ok(())
}

/// Check if a command is available on the system.
pub fn check_command_available(cmd: &str) -> bool {
    Command::new(cmd)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Regular files under `path`, recursively; symlinks are skipped.
///
/// A regular file yields itself. The result is sorted.
pub fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::symlink_metadata(path)
        .map_err(|_| Error::FileNotFound(path.to_path_buf()))?;
    if meta.file_type().is_symlink() {
        return Ok(Vec::new());
    }
    if meta.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Expand a copy source into the regular files it covers.
///
/// A trailing `*` component selects the contents of its parent directory.
pub fn expand_source(src: &Path) -> Result<Vec<PathBuf>> {
    match src.file_name().and_then(|n| n.to_str()) {
        Some("*") => {
            let parent = src.parent().unwrap_or(Path::new("."));
            collect_files(parent)
        }
        _ => collect_files(src),
    }
}

/// Modification time of `path`, or `None` if it does not exist.
pub fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether `dep` was modified after `target`.
///
/// A missing `dep` is an error; a missing `target` counts as older.
pub fn is_newer(dep: &Path, target: &Path) -> Result<bool> {
    let dep_time = mtime(dep).ok_or_else(|| Error::FileNotFound(dep.to_path_buf()))?;
    Ok(match mtime(target) {
        Some(target_time) => dep_time > target_time,
        None => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    #[test]
    fn test_ensure_dir_exists_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let new_dir = dir.path().join("subdir");
        assert!(!new_dir.exists());

        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.is_dir());
    }

    #[test]
    fn test_copy_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("source.txt");
        let dst = dir.path().join("a/b/c/dest.txt");
        std::fs::write(&src, b"nested").unwrap();

        copy_file(&src, &dst).unwrap();
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "nested");
    }

    #[test]
    fn test_copy_file_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = copy_file(&dir.path().join("nonexistent.txt"), &dir.path().join("dest.txt"));
        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_files_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("sub")).unwrap();
        std::fs::write(tree.join("a.txt"), "a").unwrap();
        std::fs::write(tree.join("sub/b.txt"), "b").unwrap();
        std::os::unix::fs::symlink(tree.join("a.txt"), tree.join("link")).unwrap();

        let files = collect_files(&tree).unwrap();
        assert_eq!(files, vec![tree.join("a.txt"), tree.join("sub/b.txt")]);
    }

    #[test]
    fn test_expand_source_glob() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("motd"), "hi").unwrap();

        let files = expand_source(&dir.path().join("*")).unwrap();
        assert_eq!(files, vec![dir.path().join("motd")]);
    }

    #[test]
    fn test_collect_files_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_files(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_is_newer() {
        let dir = tempfile::tempdir().unwrap();
        let dep = dir.path().join("dep");
        let target = dir.path().join("target");
        std::fs::write(&dep, "").unwrap();
        std::fs::write(&target, "").unwrap();

        let now = SystemTime::now();
        File::options().write(true).open(&dep).unwrap().set_modified(now).unwrap();
        File::options()
            .write(true)
            .open(&target)
            .unwrap()
            .set_modified(now - Duration::from_secs(60))
            .unwrap();

        assert!(is_newer(&dep, &target).unwrap());
        assert!(!is_newer(&target, &dep).unwrap());
        assert!(is_newer(&dep, &dir.path().join("missing")).unwrap());
        assert!(is_newer(&dir.path().join("missing"), &target).is_err());
    }
}
