use super::mount::{Direction, Mounter, copy_image_files};
use crate::core::error::Result;
use crate::distro::Distro;
use std::path::Path;

/// Make `script` the image's default boot action, or clear it with `None`.
///
/// The distribution synthesizes an overlay that is then copied onto the
/// image root through an inbound mount transaction.
pub fn set_default_boot_action(
    distro: &dyn Distro,
    mounter: &dyn Mounter,
    mount_point: &Path,
    image: &Path,
    script: Option<&Path>,
) -> Result<()> {
    match script {
        Some(script) => tracing::info!(
            image = %image.display(),
            script = %script.display(),
            "setting default boot action"
        ),
        None => tracing::info!(image = %image.display(), "clearing default boot action"),
    }

    let overlay = distro.boot_overlay(script)?;
    copy_image_files(
        mounter,
        mount_point,
        image,
        &[overlay.file_spec()],
        Direction::In,
    )
}
