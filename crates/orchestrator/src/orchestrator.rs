use std::path::{Path, PathBuf};
use std::sync::Arc;

use chorus_cache::{CacheStore, DEFAULT_CACHE_FILE};
use chorus_common::{ChorusError, ModelRef, ResponseSet, Result};
use chorus_llm::{ConcurrencyLimiter, Credentials, ProviderRegistry, build_limiter, build_registry};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batch::{BatchPlan, BatchRequest, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_MODEL};
use crate::config::ChorusConfig;

/// Fans a batch out across providers and gathers the results back in
/// submission order.
///
/// Each task passes through the cache, the batch gate, the shared
/// per-provider limiter and the provider's retry policy before reaching its
/// adapter. The first unrecoverable failure aborts every sibling still in
/// flight and fails the whole batch.
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    limiter: Arc<ConcurrencyLimiter>,
    cache_path: PathBuf,
    default_models: Vec<ModelRef>,
    concurrency_limit: Option<usize>,
}

impl Orchestrator {
    /// An orchestrator over `registry`, gated at each adapter's default
    /// ceiling.
    pub fn new(registry: ProviderRegistry) -> Result<Self> {
        let limiter = Arc::new(registry.default_limiter()?);
        Ok(Self {
            registry: Arc::new(registry),
            limiter,
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
            default_models: vec![DEFAULT_MODEL.parse()?],
            concurrency_limit: Some(DEFAULT_CONCURRENCY_LIMIT),
        })
    }

    /// Build the four built-in adapters, their limiter and the cache
    /// location from `config`.
    pub fn from_config(config: &ChorusConfig, credentials: &Credentials) -> Result<Self> {
        let registry = build_registry(&config.providers, credentials);
        let limiter = build_limiter(&config.providers, &registry)?;
        Ok(Self::new(registry)?
            .with_limiter(Arc::new(limiter))
            .with_cache_path(&config.cache.path)
            .with_default_models(config.default_models.clone())
            .with_concurrency_limit(config.batch_limit()))
    }

    /// Share `limiter` with other orchestrators or substitute an isolated one.
    pub fn with_limiter(mut self, limiter: Arc<ConcurrencyLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_cache_path(mut self, path: impl AsRef<Path>) -> Self {
        self.cache_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_default_models(mut self, models: Vec<ModelRef>) -> Self {
        self.default_models = models;
        self
    }

    /// Default batch-wide cap, used when a request sets none.
    pub fn with_concurrency_limit(mut self, limit: Option<usize>) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Run one batch: every prompt against every model.
    ///
    /// Returns one [`ResponseSet`] per prompt in submission order, each keyed
    /// by model in model-list order. Any task failure fails the batch and
    /// nothing is written to the cache.
    pub async fn complete(&self, request: BatchRequest) -> Result<Vec<ResponseSet>> {
        let batch_id = Uuid::new_v4();

        let models = match &request.models {
            None => self.default_models.clone(),
            Some(models) => models
                .iter()
                .map(|m| self.registry.model_ref(m))
                .collect::<Result<Vec<_>>>()?,
        };
        let limit = match request.concurrency_limit {
            Some(0) => {
                return Err(ChorusError::Config(
                    "concurrency_limit must be at least 1".to_string(),
                ));
            }
            Some(limit) => Some(limit),
            None => self.concurrency_limit,
        };

        let plan = BatchPlan::build(request.prompts, models, &self.registry)?;
        info!(
            %batch_id,
            prompts = plan.prompts.len(),
            models = plan.models.len(),
            tasks = plan.tasks.len(),
            use_cache = request.use_cache,
            "Starting batch"
        );

        let cache = if request.use_cache && !plan.tasks.is_empty() {
            let store = CacheStore::open(&self.cache_path).await?;
            debug!(%batch_id, path = ?store.path(), "Opened model cache");
            Some(store)
        } else {
            None
        };

        let outcome = self.execute(batch_id, &plan, cache.as_ref(), limit).await;
        let outcome = match (outcome, cache.as_ref()) {
            (Ok(results), Some(store)) => {
                let responses = plan.assemble(&results);
                store
                    .commit(plan.cache_entries(&results))
                    .await
                    .map(|written| {
                        debug!(%batch_id, written, "Committed cache entries");
                        responses
                    })
            }
            (Ok(results), None) => Ok(plan.assemble(&results)),
            (Err(e), _) => Err(e),
        };

        if let Some(store) = cache {
            match (store.close().await, &outcome) {
                (Err(e), Ok(_)) => return Err(e),
                (Err(e), Err(_)) => warn!(%batch_id, error = %e, "Failed to close model cache"),
                (Ok(()), _) => {}
            }
        }

        match &outcome {
            Ok(responses) => info!(%batch_id, responses = responses.len(), "Batch complete"),
            Err(e) => warn!(%batch_id, error = %e, "Batch failed"),
        }
        outcome
    }

    /// Resolve every task of `plan` and return their texts in task order.
    async fn execute(
        &self,
        batch_id: Uuid,
        plan: &BatchPlan,
        cache: Option<&CacheStore>,
        limit: Option<usize>,
    ) -> Result<Vec<String>> {
        let mut results: Vec<Option<String>> = vec![None; plan.tasks.len()];

        if let Some(cache) = cache {
            let keys = plan.tasks.iter().map(|t| t.key.cache_key()).collect();
            let mut hits = cache.get_many(keys).await?;
            for (slot, task) in results.iter_mut().zip(&plan.tasks) {
                if let Some(text) = hits.remove(&task.key.cache_key()) {
                    debug!(%batch_id, model = %task.key.model, "Cache hit");
                    *slot = Some(text);
                }
            }
        }

        let gate = limit.map(|n| Arc::new(Semaphore::new(n)));
        let mut set = JoinSet::new();

        for (index, task) in plan.tasks.iter().enumerate() {
            if results[index].is_some() {
                continue;
            }
            let provider = task.provider.clone();
            let key = task.key.clone();
            let limiter = self.limiter.clone();
            let gate = gate.clone();

            set.spawn(async move {
                let result: Result<String> = async {
                    let _batch_permit = match gate {
                        Some(gate) => Some(gate.acquire_owned().await.map_err(|e| {
                            ChorusError::Task(format!("Batch gate acquire failed: {e}"))
                        })?),
                        None => None,
                    };
                    let _permit = limiter.acquire(key.model.provider()).await?;
                    debug!(%batch_id, model = %key.model, "Dispatching");
                    provider.invoke(&key.prompt, key.model.model()).await
                }
                .await;
                (index, result)
            });
        }

        let dispatched = set.len();
        debug!(%batch_id, dispatched, cached = plan.tasks.len() - dispatched, "Tasks launched");

        while let Some(joined) = set.join_next().await {
            let failure = match joined {
                Ok((index, Ok(text))) => {
                    results[index] = Some(text);
                    continue;
                }
                Ok((index, Err(e))) => {
                    warn!(
                        %batch_id,
                        model = %plan.tasks[index].key.model,
                        error = %e,
                        "Task failed, cancelling batch"
                    );
                    e
                }
                Err(e) => ChorusError::Task(format!("task did not complete: {e}")),
            };

            cancel_all(batch_id, &mut set).await;
            return Err(failure);
        }

        results
            .into_iter()
            .map(|text| text.ok_or_else(|| ChorusError::Task("task produced no result".to_string())))
            .collect()
    }
}

/// Abort every task left in `set` and wait until each has settled.
async fn cancel_all<T: 'static>(batch_id: Uuid, set: &mut JoinSet<T>) {
    if set.is_empty() {
        return;
    }
    set.abort_all();

    let mut cancelled = 0usize;
    let mut finished = 0usize;
    while let Some(joined) = set.join_next().await {
        match joined {
            Err(e) if e.is_cancelled() => cancelled += 1,
            _ => finished += 1,
        }
    }
    debug!(%batch_id, cancelled, finished, "Sibling tasks settled");
}
