//! Per-prompt result assembly.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::request::ModelRef;

/// Completions for one prompt, keyed by model in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseSet {
    pub prompt: String,
    #[serde(serialize_with = "serialize_ordered")]
    pub responses: Vec<(ModelRef, String)>,
}

impl ResponseSet {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            responses: Vec::new(),
        }
    }

    pub fn push(&mut self, model: ModelRef, text: impl Into<String>) {
        self.responses.push((model, text.into()));
    }

    /// Completion text for `model`, if it was part of the batch.
    pub fn get(&self, model: &ModelRef) -> Option<&str> {
        self.responses
            .iter()
            .find(|(m, _)| m == model)
            .map(|(_, text)| text.as_str())
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelRef> {
        self.responses.iter().map(|(m, _)| m)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

// A JSON object whose key order follows the model list.
fn serialize_ordered<S>(responses: &[(ModelRef, String)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(responses.len()))?;
    for (model, text) in responses {
        map.serialize_entry(&model.to_string(), text)?;
    }
    map.end()
}
