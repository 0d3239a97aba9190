//! TOML configuration.
//!
//! Every section and field is optional; an absent config file means the
//! built-in defaults. A minimal file looks like:
//!
//! ```toml
//! [source]
//! include_globs = ["**/*.md"]
//! exclude_globs = ["drafts/**"]
//!
//! [ranking]
//! heading_boost = 2.0
//!
//! [retrieval]
//! default_budget = 2000
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{Context, Result};
use refdex_core::RankParams;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Documents segmented in parallel during a build.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.markdown".to_string()]
}
fn default_max_concurrency() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_heading_boost")]
    pub heading_boost: f64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            heading_boost: default_heading_boost(),
            default_limit: default_limit(),
        }
    }
}

impl RankingConfig {
    pub fn params(&self) -> RankParams {
        RankParams {
            heading_boost: self.heading_boost,
        }
    }
}

fn default_heading_boost() -> f64 {
    refdex_core::rank::DEFAULT_HEADING_BOOST
}
fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_budget")]
    pub default_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_budget: default_budget(),
        }
    }
}

fn default_budget() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// How long a query waits for the first build before giving up.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            ready_timeout_secs: default_ready_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}
fn default_ready_timeout_secs() -> u64 {
    30
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Load the given config file, or fall back to the defaults when none is given.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => Ok(Config::default()),
    }
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.source.max_concurrency == 0 {
        anyhow::bail!("source.max_concurrency must be >= 1");
    }

    if !config.ranking.heading_boost.is_finite() || config.ranking.heading_boost < 0.0 {
        anyhow::bail!("ranking.heading_boost must be a finite number >= 0.0");
    }

    if config.ranking.default_limit == 0 {
        anyhow::bail!("ranking.default_limit must be >= 1");
    }

    if config.retrieval.default_budget == 0 {
        anyhow::bail!("retrieval.default_budget must be >= 1");
    }

    Ok(config)
}
