//! Identifiers for the units of work in a batch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChorusError;

/// A `(provider, model)` pair, written externally as `"provider/model"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelRef {
    provider: String,
    model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Provider tag, e.g. `openai`.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Provider-side model name, e.g. `gpt-3.5-turbo`.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Splits on the first `/`; everything after it belongs to the model name,
/// so `replicate/mistralai/mistral-7b` keeps `mistralai/mistral-7b` intact.
impl FromStr for ModelRef {
    type Err = ChorusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                Ok(Self::new(provider, model))
            }
            _ => Err(ChorusError::UnknownProvider(format!(
                "model reference `{s}` is not of the form provider/model"
            ))),
        }
    }
}

impl TryFrom<String> for ModelRef {
    type Error = ChorusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModelRef> for String {
    fn from(value: ModelRef) -> Self {
        value.to_string()
    }
}

/// One task of a batch and one cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub model: ModelRef,
    pub prompt: String,
}

impl RequestKey {
    pub fn new(model: ModelRef, prompt: impl Into<String>) -> Self {
        Self {
            model,
            prompt: prompt.into(),
        }
    }

    /// Cache key in the `"<model>:<prompt>"` layout.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.model, self.prompt)
    }
}
