//! Error types for Chorus.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChorusError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Transport error ({provider}): {message}")]
    Transport { provider: String, message: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Task error: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl ChorusError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether another attempt at the same call may succeed.
    ///
    /// Only provider responses and transport failures qualify; configuration
    /// problems and unknown providers fail identically every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Transport { .. })
    }
}

pub type Result<T> = std::result::Result<T, ChorusError>;
