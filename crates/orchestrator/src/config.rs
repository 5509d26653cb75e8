//! Configuration for the orchestrator.
//!
//! Loaded from TOML. Every section is optional; absent values fall back to
//! the built-in defaults. Provider tokens belong in the environment, so a
//! token found in the file is accepted but warned about.

use std::path::{Path, PathBuf};

use chorus_cache::DEFAULT_CACHE_FILE;
use chorus_common::{ModelRef, Result};
use chorus_llm::ProvidersConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::batch::{DEFAULT_CONCURRENCY_LIMIT, DEFAULT_MODEL};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChorusConfig {
    /// Models used when a batch names none.
    #[serde(default = "default_models")]
    pub default_models: Vec<ModelRef>,

    /// Batch-wide cap on dispatched tasks. `0` disables the cap.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether batches use the cache unless told otherwise.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn default_models() -> Vec<ModelRef> {
    vec![ModelRef::new("openai", "gpt-3.5-turbo")]
}

fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_FILE)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_cache_path(),
        }
    }
}

impl Default for ChorusConfig {
    fn default() -> Self {
        Self {
            default_models: default_models(),
            concurrency_limit: default_concurrency_limit(),
            cache: CacheConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl ChorusConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;

        for kind in config.providers.inline_keys() {
            warn!(
                path = %path.display(),
                provider = kind.tag(),
                env_var = kind.key_var(),
                "API key stored in config file; prefer the environment variable"
            );
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The batch cap as an option, `None` when disabled.
    pub fn batch_limit(&self) -> Option<usize> {
        (self.concurrency_limit > 0).then_some(self.concurrency_limit)
    }
}
