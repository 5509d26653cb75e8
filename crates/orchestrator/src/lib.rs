//! Batch orchestration for Chorus.
//!
//! A batch is the cross product of a prompt list and a model list. The
//! orchestrator:
//! 1. Resolves every model against the provider registry up front
//! 2. Serves what it can from the model cache
//! 3. Dispatches the rest concurrently through the limiter and retry policy
//! 4. Reassembles the results in submission order
//!
//! # Task flow
//!
//! ```text
//!  prompts x models
//!         │
//!         ▼
//!  ┌──────────────┐  hit
//!  │ Cache lookup │ ──────────────┐
//!  └──────┬───────┘               │
//!         │ miss                  │
//!         ▼                       │
//!  ┌──────────────┐               │
//!  │  Batch gate  │               │
//!  └──────┬───────┘               │
//!         ▼                       │
//!  ┌──────────────┐               │
//!  │ Provider     │  shared per   │
//!  │ limiter      │  provider tag │
//!  └──────┬───────┘               │
//!         ▼                       │
//!  ┌──────────────┐               │
//!  │ Retry policy │               │
//!  └──────┬───────┘               │
//!         ▼                       │
//!     [Adapter]                   │
//!         │                       │
//!         ▼                       ▼
//!     assemble ─► commit cache ─► Vec<ResponseSet>
//! ```

pub mod batch;
pub mod config;
pub mod orchestrator;

pub use batch::{BatchRequest, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_MODEL, Prompts};
pub use chorus_common::{ChorusError, ModelRef, ResponseSet, Result};
pub use chorus_llm::{ConcurrencyLimiter, Credentials, Provider, ProviderRegistry, RetryPolicy};
pub use config::{CacheConfig, ChorusConfig};
pub use orchestrator::Orchestrator;
