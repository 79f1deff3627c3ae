use super::{BootOverlay, Distro};
use crate::config::WorkloadConfig;
use crate::core::context::Context;
use crate::core::error::{Error, Result};
use std::path::Path;

/// No root filesystem; the binary is the whole workload.
pub struct Bare;

impl Distro for Bare {
    fn build_base_image(&self, _ctx: &Context, config: &WorkloadConfig) -> Result<()> {
        Err(Error::unsupported(format!(
            "{}: bare distributions have no base image",
            config.name
        )))
    }

    fn up_to_date(&self, _ctx: &Context, _config: &WorkloadConfig) -> Result<bool> {
        Ok(true)
    }

    fn boot_overlay(&self, _script: Option<&Path>) -> Result<BootOverlay> {
        Err(Error::unsupported(
            "bare distributions have no image to set a boot action on",
        ))
    }

    fn name(&self) -> &str {
        "bare"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_has_no_overlay() {
        let err = Bare.boot_overlay(None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCombination(_)));
    }
}
