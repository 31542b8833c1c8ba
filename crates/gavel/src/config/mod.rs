use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{DEFAULT_SOURCE_NAME, LanguageProfile};
use crate::types::{MountConfig, ResourceLimits};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Deployments can use this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../gavel.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Queue and store key layout in the broker
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// List the API pushes submission messages onto
    #[serde(default = "default_submissions_key")]
    pub submissions_key: String,

    /// Prefix for per-worker in-flight lists; one unacknowledged message
    /// lives under `<prefix>:<worker>` while that worker grades it
    #[serde(default = "default_processing_prefix")]
    pub processing_prefix: String,

    /// Prefix for per-problem test case lists
    #[serde(default = "default_tests_prefix")]
    pub tests_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            submissions_key: default_submissions_key(),
            processing_prefix: default_processing_prefix(),
            tests_prefix: default_tests_prefix(),
        }
    }
}

/// Config for gavel
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the isolate binary (uses PATH if not specified).
    #[serde(default)]
    pub isolate_path: Option<PathBuf>,

    /// Use cgroup memory limiting instead of RLIMIT_AS.
    ///
    /// When enabled, isolate uses `--cg` and `--cg-mem` which limit actual
    /// memory usage (RSS) rather than virtual address space. This is required
    /// for runtimes like the JVM that map large amounts of virtual memory.
    #[serde(default)]
    pub cgroup: bool,

    /// Cgroup root path for isolate. Must match isolate's `cg_root` config value.
    #[serde(default = "default_cg_root")]
    pub cg_root: PathBuf,

    /// Global directory mounts applied to all sandbox invocations
    /// (both compilation and execution).
    #[serde(default)]
    pub sandbox_mounts: Vec<MountConfig>,

    /// Default resource limits for the run stage. Overridden by per-language
    /// limits and then by per-submission limits.
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// Queue and store key layout
    #[serde(default)]
    pub queue: QueueConfig,

    /// Language profiles keyed by language name
    #[serde(default)]
    pub languages: HashMap<String, LanguageProfile>,
}

impl Config {
    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            isolate_path: None,
            cgroup: false,
            cg_root: default_cg_root(),
            sandbox_mounts: Vec::new(),
            default_limits: ResourceLimits::default(),
            queue: QueueConfig::default(),
            languages: HashMap::new(),
        }
    }

    /// Get the path to the isolate binary
    pub fn isolate_binary(&self) -> PathBuf {
        self.isolate_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("isolate"))
    }

    /// Run-stage limits for a profile, with optional submission overrides on top
    pub fn run_limits(
        &self,
        profile: &LanguageProfile,
        overrides: &ResourceLimits,
    ) -> ResourceLimits {
        let mut limits = self.default_limits.clone();
        if let Some(ref lang_limits) = profile.limits {
            limits = limits.with_overrides(lang_limits);
        }
        limits.with_overrides(overrides)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_cg_root() -> PathBuf {
    PathBuf::from("/sys/fs/cgroup/isolate")
}

fn default_submissions_key() -> String {
    "gavel:queue:submissions".to_owned()
}

fn default_processing_prefix() -> String {
    "gavel:processing".to_owned()
}

fn default_tests_prefix() -> String {
    "gavel:tests".to_owned()
}
