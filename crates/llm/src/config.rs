use chorus_common::{ChorusError, Result};
use serde::{Deserialize, Serialize};

use crate::anthropic::{ANTHROPIC_KEY_VAR, ANTHROPIC_TAG, AnthropicAdapter};
use crate::limiter::ConcurrencyLimiter;
use crate::openai::{OPENAI_KEY_VAR, OPENAI_TAG, OpenAiAdapter};
use crate::perplexity::{PERPLEXITY_KEY_VAR, PERPLEXITY_TAG, PerplexityAdapter};
use crate::provider::Provider;
use crate::registry::ProviderRegistry;
use crate::replicate::{REPLICATE_KEY_VAR, REPLICATE_TAG, ReplicateAdapter};
use crate::retry::RetryPolicy;

/// The built-in backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Replicate,
    Perplexity,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Replicate,
        ProviderKind::Perplexity,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => OPENAI_TAG,
            ProviderKind::Anthropic => ANTHROPIC_TAG,
            ProviderKind::Replicate => REPLICATE_TAG,
            ProviderKind::Perplexity => PERPLEXITY_TAG,
        }
    }

    /// Environment variable holding the provider's token.
    pub fn key_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => OPENAI_KEY_VAR,
            ProviderKind::Anthropic => ANTHROPIC_KEY_VAR,
            ProviderKind::Replicate => REPLICATE_KEY_VAR,
            ProviderKind::Perplexity => PERPLEXITY_KEY_VAR,
        }
    }
}

/// Provider tokens, read once before any adapter is built.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub replicate: Option<String>,
    pub perplexity: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |kind: ProviderKind| lookup(kind.key_var()).filter(|v| !v.trim().is_empty());
        Self {
            openai: read(ProviderKind::OpenAi),
            anthropic: read(ProviderKind::Anthropic),
            replicate: read(ProviderKind::Replicate),
            perplexity: read(ProviderKind::Perplexity),
        }
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::OpenAi => self.openai.as_deref(),
            ProviderKind::Anthropic => self.anthropic.as_deref(),
            ProviderKind::Replicate => self.replicate.as_deref(),
            ProviderKind::Perplexity => self.perplexity.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL override, mainly for proxies and tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Token override. Prefer the provider's environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Simultaneous call ceiling; absent means the adapter's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_requests: Option<usize>,

    /// Lift the ceiling entirely. Takes precedence over `max_concurrent_requests`.
    #[serde(default)]
    pub unbounded: bool,

    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub replicate: ProviderConfig,
    pub pplx: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::Replicate => &self.replicate,
            ProviderKind::Perplexity => &self.pplx,
        }
    }

    /// Providers whose config file section carries a token.
    pub fn inline_keys(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).api_key.is_some())
    }

    fn key_for(&self, kind: ProviderKind, credentials: &Credentials) -> Option<String> {
        self.get(kind)
            .api_key
            .clone()
            .or_else(|| credentials.get(kind).map(str::to_string))
    }
}

/// Register all four built-in adapters. A missing token does not fail here;
/// the adapter reports it when first invoked.
pub fn build_registry(config: &ProvidersConfig, credentials: &Credentials) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for kind in ProviderKind::ALL {
        let section = config.get(kind);
        let api_url = section.api_url.clone();
        let api_key = config.key_for(kind, credentials);

        let adapter: Box<dyn Provider> = match kind {
            ProviderKind::OpenAi => Box::new(OpenAiAdapter::new(api_url, api_key)),
            ProviderKind::Anthropic => Box::new(AnthropicAdapter::new(api_url, api_key)),
            ProviderKind::Replicate => Box::new(ReplicateAdapter::new(api_url, api_key)),
            ProviderKind::Perplexity => Box::new(PerplexityAdapter::new(api_url, api_key)),
        };
        registry.register(adapter, section.retry.clone());
    }
    registry
}

/// Gates for every registered adapter, with the config's ceilings applied
/// on top of the adapter defaults.
pub fn build_limiter(config: &ProvidersConfig, registry: &ProviderRegistry) -> Result<ConcurrencyLimiter> {
    let mut limiter = registry.default_limiter()?;
    for kind in ProviderKind::ALL {
        let section = config.get(kind);
        if section.unbounded {
            limiter.set_limit(kind.tag(), None)?;
        } else if let Some(limit) = section.max_concurrent_requests {
            if limit == 0 {
                return Err(ChorusError::Config(format!(
                    "providers.{}.max_concurrent_requests must be at least 1, \
                     set `unbounded = true` to lift the ceiling",
                    kind.tag()
                )));
            }
            limiter.set_limit(kind.tag(), Some(limit))?;
        }
    }
    Ok(limiter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_common::ModelRef;

    const TOML_CONFIG: &str = r#"
[openai]
api_url = "http://localhost:8080"
max_concurrent_requests = 4

[openai.retry]
max_attempts = 5
initial_delay_ms = 100

[pplx]
max_concurrent_requests = 3

[anthropic]
unbounded = true
"#;

    #[test]
    fn deserialize_config_from_toml() {
        let config: ProvidersConfig = toml::from_str(TOML_CONFIG).unwrap();
        assert_eq!(config.openai.api_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.openai.max_concurrent_requests, Some(4));
        assert_eq!(config.openai.retry.max_attempts, 5);
        assert_eq!(config.openai.retry.initial_delay_ms, 100);
        assert_eq!(config.pplx.retry.max_attempts, 3);
        assert!(config.anthropic.unbounded);
        assert!(config.replicate.api_url.is_none());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: ProvidersConfig = toml::from_str("").unwrap();
        assert_eq!(config.openai.retry, RetryPolicy::default());
        assert!(config.inline_keys().next().is_none());
    }

    #[test]
    fn limiter_applies_overrides() {
        let config: ProvidersConfig = toml::from_str(TOML_CONFIG).unwrap();
        let registry = build_registry(&config, &Credentials::default());
        let limiter = build_limiter(&config, &registry).unwrap();

        assert_eq!(limiter.capacity("openai"), Some(4));
        assert_eq!(limiter.capacity("anthropic"), None);
        assert_eq!(limiter.capacity("replicate"), Some(10));
        assert_eq!(limiter.capacity("pplx"), Some(3));
    }

    #[test]
    fn default_limits_per_provider() {
        let config = ProvidersConfig::default();
        let registry = build_registry(&config, &Credentials::default());
        let limiter = build_limiter(&config, &registry).unwrap();

        assert_eq!(limiter.capacity("openai"), Some(10));
        assert_eq!(limiter.capacity("anthropic"), Some(2));
        assert_eq!(limiter.capacity("replicate"), Some(10));
        assert_eq!(limiter.capacity("pplx"), None);
    }

    #[test]
    fn registry_has_all_builtin_providers() {
        let registry = build_registry(&ProvidersConfig::default(), &Credentials::default());
        for kind in ProviderKind::ALL {
            assert!(registry.contains(kind.tag()), "{}", kind.tag());
        }
        assert!(registry.resolve(&ModelRef::new("foo", "bar")).is_err());
    }

    #[tokio::test]
    async fn missing_credential_surfaces_on_invoke() {
        let registry = build_registry(&ProvidersConfig::default(), &Credentials::default());
        let provider = registry.resolve(&ModelRef::new("anthropic", "claude-2")).unwrap();
        let err = provider.invoke("hi", "claude-2").await.unwrap_err();
        assert!(matches!(err, ChorusError::Config(ref m) if m.contains("ANTHROPIC_API_KEY")));
    }

    #[test]
    fn credentials_from_lookup_ignores_blank() {
        let credentials = Credentials::from_lookup(|var| match var {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "PPLX_API_KEY" => Some("".to_string()),
            _ => None,
        });
        assert_eq!(credentials.get(ProviderKind::OpenAi), Some("sk-test"));
        assert_eq!(credentials.get(ProviderKind::Perplexity), None);
        assert_eq!(credentials.get(ProviderKind::Anthropic), None);
    }

    #[test]
    fn config_key_overrides_environment() {
        let config: ProvidersConfig = toml::from_str("[openai]\napi_key = \"sk-file\"").unwrap();
        let credentials = Credentials {
            openai: Some("sk-env".into()),
            ..Default::default()
        };
        assert_eq!(
            config.key_for(ProviderKind::OpenAi, &credentials).as_deref(),
            Some("sk-file")
        );
        assert_eq!(config.inline_keys().collect::<Vec<_>>(), vec![ProviderKind::OpenAi]);
    }

    #[test]
    fn zero_provider_ceiling_is_rejected() {
        let config: ProvidersConfig =
            toml::from_str("[anthropic]\nmax_concurrent_requests = 0").unwrap();
        let registry = build_registry(&config, &Credentials::default());
        let err = build_limiter(&config, &registry).unwrap_err();
        assert!(matches!(err, ChorusError::Config(ref m) if m.contains("providers.anthropic")));
    }

    #[test]
    fn unbounded_ignores_zero_ceiling() {
        let config: ProvidersConfig =
            toml::from_str("[openai]\nmax_concurrent_requests = 0\nunbounded = true").unwrap();
        let registry = build_registry(&config, &Credentials::default());
        let limiter = build_limiter(&config, &registry).unwrap();
        assert_eq!(limiter.capacity("openai"), None);
    }

    #[test]
    fn builtin_adapters_name_default_models() {
        let registry = build_registry(&ProvidersConfig::default(), &Credentials::default());
        let expected = [
            ("openai", "gpt-3.5-turbo"),
            ("anthropic", "claude-2"),
            ("replicate", "mistral-7b"),
            ("pplx", "pplx-7b-online"),
        ];
        for (tag, model) in expected {
            assert_eq!(registry.model_ref(tag).unwrap(), ModelRef::new(tag, model));
        }
    }
}
