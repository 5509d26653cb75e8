//! Batch requests and the task plan built from them.

use std::collections::HashMap;
use std::sync::Arc;

use chorus_common::{ChorusError, ModelRef, RequestKey, ResponseSet, Result};
use chorus_llm::{Provider, ProviderRegistry};

/// Model used when neither the request nor the config names one.
pub const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";

/// Cap on simultaneously dispatched tasks of one batch.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;

/// One or more prompts. A bare prompt becomes a one-element list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompts(pub Vec<String>);

impl From<&str> for Prompts {
    fn from(prompt: &str) -> Self {
        Self(vec![prompt.to_string()])
    }
}

impl From<String> for Prompts {
    fn from(prompt: String) -> Self {
        Self(vec![prompt])
    }
}

impl From<Vec<String>> for Prompts {
    fn from(prompts: Vec<String>) -> Self {
        Self(prompts)
    }
}

impl From<Vec<&str>> for Prompts {
    fn from(prompts: Vec<&str>) -> Self {
        Self(prompts.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Prompts {
    fn from(prompts: [&str; N]) -> Self {
        Self(prompts.into_iter().map(str::to_string).collect())
    }
}

/// Everything one `complete` call needs.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub prompts: Vec<String>,
    /// `provider/model` strings, or bare provider tags for that provider's
    /// default model. `None` means the orchestrator's defaults; an empty list
    /// dispatches nothing.
    pub models: Option<Vec<String>>,
    pub use_cache: bool,
    /// Batch-wide cap on dispatched tasks; `None` uses the orchestrator's.
    pub concurrency_limit: Option<usize>,
}

impl BatchRequest {
    pub fn new(prompts: impl Into<Prompts>) -> Self {
        Self {
            prompts: prompts.into().0,
            models: None,
            use_cache: false,
            concurrency_limit: None,
        }
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }
}

/// A unique request key and the adapter that serves it.
pub(crate) struct PlannedTask {
    pub key: RequestKey,
    pub provider: Arc<dyn Provider>,
}

/// The prompt x model grid resolved against the registry.
///
/// Slot `i * models.len() + j` holds prompt `i` with model `j` and points at
/// the task that serves it. Repeated prompts share a task, so every request
/// key is dispatched at most once.
pub(crate) struct BatchPlan {
    pub prompts: Vec<String>,
    pub models: Vec<ModelRef>,
    pub tasks: Vec<PlannedTask>,
    pub slots: Vec<usize>,
}

impl BatchPlan {
    /// Resolve every model before anything is dispatched, so an unknown
    /// provider fails the batch with no network or cache activity.
    pub fn build(
        prompts: Vec<String>,
        models: Vec<ModelRef>,
        registry: &ProviderRegistry,
    ) -> Result<Self> {
        let mut providers = Vec::with_capacity(models.len());
        for (j, model) in models.iter().enumerate() {
            if models[..j].contains(model) {
                return Err(ChorusError::Config(format!(
                    "model `{model}` appears more than once in the batch"
                )));
            }
            providers.push(registry.resolve(model)?);
        }

        let mut tasks = Vec::new();
        let mut slots = Vec::with_capacity(prompts.len() * models.len());
        let mut seen: HashMap<RequestKey, usize> = HashMap::new();

        for prompt in &prompts {
            for (model, provider) in models.iter().zip(&providers) {
                let key = RequestKey::new(model.clone(), prompt.clone());
                let index = *seen.entry(key.clone()).or_insert_with(|| {
                    tasks.push(PlannedTask {
                        key,
                        provider: provider.clone(),
                    });
                    tasks.len() - 1
                });
                slots.push(index);
            }
        }

        Ok(Self {
            prompts,
            models,
            tasks,
            slots,
        })
    }

    /// Arrange per-task results into one response set per prompt, in
    /// submission order.
    pub fn assemble(&self, results: &[String]) -> Vec<ResponseSet> {
        let width = self.models.len();
        self.prompts
            .iter()
            .enumerate()
            .map(|(i, prompt)| {
                let mut set = ResponseSet::new(prompt.clone());
                for (j, model) in self.models.iter().enumerate() {
                    let task = self.slots[i * width + j];
                    set.push(model.clone(), results[task].clone());
                }
                set
            })
            .collect()
    }

    /// Cache rows for every task, in task order.
    pub fn cache_entries(&self, results: &[String]) -> Vec<(String, String)> {
        self.tasks
            .iter()
            .zip(results)
            .map(|(task, text)| (task.key.cache_key(), text.clone()))
            .collect()
    }
}
