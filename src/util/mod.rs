//! Filesystem and external-process helpers.

pub mod fs;
pub mod process;

pub use fs::ensure_dir_exists;
pub use process::Cmd;
