use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetcher::BATCH_CEILING;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub export: Option<ExportConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
    #[serde(default = "default_min_retry_wait_secs")]
    pub min_retry_wait_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            progress_every: default_progress_every(),
            min_retry_wait_secs: default_min_retry_wait_secs(),
        }
    }
}

impl IndexerConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn min_retry_wait(&self) -> Duration {
        Duration::from_secs(self.min_retry_wait_secs)
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_batch_pause_ms() -> u64 {
    500
}
fn default_progress_every() -> u64 {
    32
}
fn default_min_retry_wait_secs() -> u64 {
    10
}

/// Chat export served by the export history source.
#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    pub path: PathBuf,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let indexer = &config.indexer;

    if indexer.batch_size == 0 || indexer.batch_size > BATCH_CEILING {
        anyhow::bail!("indexer.batch_size must be in [1, {}]", BATCH_CEILING);
    }

    if indexer.progress_every == 0 {
        anyhow::bail!("indexer.progress_every must be > 0");
    }

    if indexer.min_retry_wait_secs == 0 {
        anyhow::bail!("indexer.min_retry_wait_secs must be > 0");
    }

    Ok(())
}
