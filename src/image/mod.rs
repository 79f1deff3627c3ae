//! Disk image manipulation: mount transactions, boot overlays and provisioning.

pub mod mount;
mod overlay;
pub mod provision;

pub use mount::{Direction, LoopMounter, MountTransaction, MountedImage, Mounter, Ownership};
pub use overlay::set_default_boot_action;
pub use provision::{ProvisionState, Provisioner};
