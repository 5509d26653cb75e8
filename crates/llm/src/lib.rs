mod chat;
mod http;

pub mod anthropic;
pub mod config;
pub mod limiter;
pub mod openai;
pub mod perplexity;
pub mod provider;
pub mod registry;
pub mod replicate;
pub mod retry;

pub use anthropic::AnthropicAdapter;
pub use config::{Credentials, ProviderConfig, ProviderKind, ProvidersConfig, build_limiter, build_registry};
pub use limiter::{ConcurrencyLimiter, LimiterPermit};
pub use openai::OpenAiAdapter;
pub use perplexity::PerplexityAdapter;
pub use provider::Provider;
pub use registry::ProviderRegistry;
pub use replicate::ReplicateAdapter;
pub use retry::{RetryPolicy, RetryingProvider};
