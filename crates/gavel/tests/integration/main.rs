//! Integration tests for gavel
//!
//! These tests require the isolate binary to be installed and accessible.
//! Run with: cargo test -p gavel --features integration-tests
//!
//! Tests that require root are marked `#[ignore]`. To include them:
//!    cargo test -p gavel --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use gavel::Config;

mod config_loading;
mod grading;
mod sandbox_lifecycle;

/// Create a test config with cgroup support if available, falling back to
/// non-cgroup mode.
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    if config.cgroup {
        match gavel::prepare_cgroup(&config.cg_root) {
            Ok(true) => {}              // cgroups ready
            _ => config.cgroup = false, // not available, fall back
        }
    }
    config
}
