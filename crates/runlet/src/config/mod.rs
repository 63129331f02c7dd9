use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    CompileConfig, EntryPointDetector, FileExtension, Harness, Language, RunConfig,
};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../runlet.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Runlet
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Engine-wide settings (timeouts, base environment)
    #[serde(default)]
    pub engine: EngineConfig,

    /// Sandbox pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Language recipes keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

impl Config {
    /// Create a new config with the embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            engine: EngineConfig::default(),
            pool: PoolConfig::default(),
            languages: HashMap::new(),
        }
    }

    /// Get a language recipe by ID
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Hard wall-clock ceiling for one execution
    pub fn hard_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.hard_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

/// Engine-wide execution settings
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Hard wall-clock ceiling for one execution, in seconds
    #[serde(default = "default_hard_timeout_secs")]
    pub hard_timeout_secs: u64,

    /// Environment applied to every spawned process (compile and run),
    /// before per-language overrides. Used to force unbuffered output, a
    /// fixed locale, and non-interactive terminal behavior.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hard_timeout_secs: default_hard_timeout_secs(),
            env: HashMap::new(),
        }
    }
}

fn default_hard_timeout_secs() -> u64 {
    300
}

/// Sandbox pool settings
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Sandboxes to pre-start per language at startup; 0 disables pre-warming
    #[serde(default)]
    pub prewarm_count: u32,

    /// Maximum number of sandboxes provisioned concurrently during startup
    #[serde(default = "default_start_concurrency")]
    pub start_concurrency: usize,

    /// Overall budget for pool pre-warming, in seconds; stragglers are
    /// logged, never fatal
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Command producing one sandbox handle on its first stdout line.
    /// `{image}` is replaced with the language's `sandbox_image`.
    #[serde(default = "default_provision_command")]
    pub provision_command: Vec<String>,
}

impl PoolConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            prewarm_count: 0,
            start_concurrency: default_start_concurrency(),
            startup_timeout_secs: default_startup_timeout_secs(),
            provision_command: default_provision_command(),
        }
    }
}

fn default_start_concurrency() -> usize {
    5
}

fn default_startup_timeout_secs() -> u64 {
    120
}

fn default_provision_command() -> Vec<String> {
    ["docker", "run", "-dit", "--rm", "{image}", "sleep", "infinity"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}
