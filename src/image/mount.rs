//! Loop-mount transactions over disk images.
//!
//! A [`MountTransaction`] attaches an image at a fixed mount point, hands a
//! [`MountedImage`] to the caller and always detaches afterwards. The mount
//! point is a shared resource; callers serialize transactions against it.

use crate::config::FileSpec;
use crate::core::error::{Error, Result};
use crate::util::Cmd;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Copy direction relative to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host -> image; copied files become root-owned.
    In,
    /// Image -> host; copied files become owned by the invoking user.
    Out,
}

/// Ownership forced onto synchronized files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Root,
    User { uid: u32, gid: u32 },
}

impl Ownership {
    /// Identity of the invoking user.
    #[cfg(unix)]
    pub fn invoking_user() -> Self {
        // SAFETY: getuid/getgid have no preconditions and cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Ownership::User { uid, gid }
    }

    #[cfg(not(unix))]
    pub fn invoking_user() -> Self {
        Ownership::Root
    }

    /// Ownership used for copies in `direction`.
    pub fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::In => Ownership::Root,
            Direction::Out => Ownership::invoking_user(),
        }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ownership::Root => f.write_str("root:root"),
            Ownership::User { uid, gid } => write!(f, "{}:{}", uid, gid),
        }
    }
}

/// Primitive mount and copy operations.
pub trait Mounter: Send + Sync {
    /// Attach `image` at `mount_point`.
    fn mount(&self, image: &Path, mount_point: &Path) -> Result<()>;

    /// Detach whatever is mounted at `mount_point`.
    fn unmount(&self, mount_point: &Path) -> Result<()>;

    /// Recursively synchronize `src` to `dst`, forcing `owner`.
    ///
    /// `src` may end in a `*` component. An existing directory `dst` receives
    /// `src` by name; otherwise `dst` names the copy itself.
    fn sync(&self, src: &Path, dst: &Path, owner: Ownership) -> Result<()>;

    /// Pack the tree under `root` into a newc cpio archive at `dst`.
    fn pack_cpio(&self, root: &Path, dst: &Path) -> Result<()>;
}

/// Mounter backed by `mount -o loop`, `rsync` and `cpio` under sudo.
#[derive(Debug, Default)]
pub struct LoopMounter;

impl LoopMounter {
    pub fn new() -> Self {
        Self
    }
}

impl Mounter for LoopMounter {
    fn mount(&self, image: &Path, mount_point: &Path) -> Result<()> {
        Cmd::new("sudo")
            .args(["mount", "-o", "loop"])
            .arg(image)
            .arg(mount_point)
            .run()
            .map_err(|e| Error::mount(format!("failed to mount {}: {}", image.display(), e)))?;
        Ok(())
    }

    fn unmount(&self, mount_point: &Path) -> Result<()> {
        Cmd::new("sudo")
            .arg("umount")
            .arg(mount_point)
            .run()
            .map_err(|e| {
                Error::mount(format!("failed to unmount {}: {}", mount_point.display(), e))
            })?;
        Ok(())
    }

    fn sync(&self, src: &Path, dst: &Path, owner: Ownership) -> Result<()> {
        let script = format!(
            "sudo rsync -a --chown={} {} {}",
            owner,
            shell_path(src),
            shell_path(dst)
        );
        Cmd::shell(script).run()?;
        Ok(())
    }

    fn pack_cpio(&self, root: &Path, dst: &Path) -> Result<()> {
        let script = format!(
            "cd {} && find . -print0 | cpio --null -o --format=newc --owner root:root > {}",
            quote(&root.to_string_lossy()),
            quote(&dst.to_string_lossy())
        );
        Cmd::new("sudo")
            .args(["sh", "-c"])
            .arg(script)
            .error_msg(format!("failed to pack {} into cpio", root.display()))
            .run()?;
        Ok(())
    }
}

/// Single-quote `s` for `sh`.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Quote a path for `sh`, leaving a trailing `*` component unquoted so it globs.
fn shell_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    match raw.strip_suffix("/*") {
        Some(parent) => format!("{}/*", quote(parent)),
        None => quote(&raw),
    }
}

/// Location of `dst` inside the image mounted at `mount_point`.
///
/// `dst` is taken relative to the mount point and normalized lexically: a
/// trailing `/` is dropped and `..` never climbs above the mount point.
pub fn in_image(mount_point: &Path, dst: &Path) -> PathBuf {
    let mut joined = mount_point.to_path_buf();
    let mut depth = 0usize;
    for component in dst.components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::ParentDir if depth > 0 => {
                joined.pop();
                depth -= 1;
            }
            _ => {}
        }
    }
    joined
}

/// A mounted image, valid for the duration of a transaction.
pub struct MountedImage<'a> {
    mounter: &'a dyn Mounter,
    mount_point: &'a Path,
}

impl MountedImage<'_> {
    pub fn path(&self) -> &Path {
        self.mount_point
    }

    /// Copy `files` in or out of the image.
    ///
    /// Inbound: `src` (host) -> `mount_point + dst`, owned by root.
    /// Outbound: `mount_point + src` -> `dst` (host), owned by the invoking user.
    pub fn copy(&self, files: &[FileSpec], direction: Direction) -> Result<()> {
        let owner = Ownership::for_direction(direction);
        for file in files {
            let (src, dst) = match direction {
                Direction::In => (file.src.clone(), in_image(self.mount_point, &file.dst)),
                Direction::Out => (in_image(self.mount_point, &file.src), file.dst.clone()),
            };
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                ?direction,
                "syncing"
            );
            self.mounter.sync(&src, &dst, owner)?;
        }
        Ok(())
    }

    /// Pack the whole image tree into a cpio archive.
    pub fn pack_cpio(&self, dst: &Path) -> Result<()> {
        self.mounter.pack_cpio(self.mount_point, dst)
    }
}

/// Scoped mount of one image.
pub struct MountTransaction<'a> {
    mounter: &'a dyn Mounter,
    mount_point: &'a Path,
}

impl<'a> MountTransaction<'a> {
    pub fn new(mounter: &'a dyn Mounter, mount_point: &'a Path) -> Self {
        Self {
            mounter,
            mount_point,
        }
    }

    /// Mount `image`, run `body`, and unmount on every exit path.
    ///
    /// If both `body` and the unmount fail, both errors are reported via
    /// [`Error::UnmountAfterError`].
    pub fn run<T>(
        &self,
        image: &Path,
        body: impl FnOnce(&MountedImage<'_>) -> Result<T>,
    ) -> Result<T> {
        tracing::debug!(
            image = %image.display(),
            mount_point = %self.mount_point.display(),
            "mounting image"
        );
        self.mounter.mount(image, self.mount_point)?;

        let mounted = MountedImage {
            mounter: self.mounter,
            mount_point: self.mount_point,
        };
        let result = body(&mounted);
        let unmounted = self.mounter.unmount(self.mount_point);

        match (result, unmounted) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(unmount)) => Err(unmount),
            (Err(cause), Ok(())) => Err(cause),
            (Err(cause), Err(unmount)) => {
                tracing::warn!(
                    mount_point = %self.mount_point.display(),
                    "unmount failed after error; mount point may still be in use"
                );
                Err(Error::UnmountAfterError {
                    mount_point: self.mount_point.to_path_buf(),
                    cause: Box::new(cause),
                    unmount: Box::new(unmount),
                })
            }
        }
    }
}

/// Mount `image` and copy `files` in `direction`.
pub fn copy_image_files(
    mounter: &dyn Mounter,
    mount_point: &Path,
    image: &Path,
    files: &[FileSpec],
    direction: Direction,
) -> Result<()> {
    MountTransaction::new(mounter, mount_point).run(image, |m| m.copy(files, direction))
}
