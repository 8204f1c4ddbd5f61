//! Host configuration.
//!
//! Loaded once at startup from a TOML file and passed by reference to every
//! command. See `config/polymath.example.toml` for a full example.
//!
//! ```toml
//! [libraries]
//! dir = "libraries"
//! include_globs = ["**/*.json"]
//!
//! [access]
//! default_private_access_tag = "unpublished"
//!
//! [access.restricted]
//! count = true
//! message = "Ask the author for an access token."
//!
//! [access.tokens.friends]
//! token = "s3cret"
//! description = "Friends and family"
//! access_tags = ["unpublished"]
//!
//! [ingest]
//! max_retries = 10
//! retry_delay_secs = 20
//! ```

use anyhow::{Context, Result};
use polymath_core::AccessPolicy;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub libraries: LibrariesConfig,
    #[serde(default)]
    pub access: AccessPolicy,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibrariesConfig {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// A single library file. Takes precedence over `dir`.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for LibrariesConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            file: None,
            include_globs: default_include_globs(),
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("libraries")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    10
}
fn default_retry_delay_secs() -> u64 {
    20
}

impl IngestConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Config {
    /// Defaults for every section, for running without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.libraries.include_globs.is_empty() {
        anyhow::bail!("libraries.include_globs must list at least one pattern");
    }

    // Validate access tokens
    let mut secrets = HashSet::new();
    for (name, record) in &config.access.tokens {
        if record.token.is_empty() {
            anyhow::bail!("access.tokens.{}.token must not be empty", name);
        }
        if !secrets.insert(record.token.as_str()) {
            anyhow::bail!(
                "access.tokens.{}.token duplicates the secret of another token",
                name
            );
        }
    }

    if config.ingest.max_retries < 1 {
        anyhow::bail!("ingest.max_retries must be >= 1");
    }

    Ok(config)
}
