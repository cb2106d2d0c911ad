//! Provider router — maps configured provider names to live clients.
//!
//! Every backend speaks the OpenAI wire format; the name only decides the
//! base URL and which key is sent.

use std::collections::HashMap;
use std::sync::Arc;
use mindthread_config::{AppConfig, ProviderConfig};
use mindthread_core::error::ProviderError;
use mindthread_core::provider::Provider;
use tracing::{debug, warn};
use crate::openai_compat::OpenAiCompatProvider;

/// Holds the configured providers and knows which one is the default.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider, replacing any previous one with that name.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Base URL for providers that need no `api_url` in config.
fn well_known_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "openai" => Some("https://api.openai.com/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        "vllm" => Some("http://localhost:8000/v1"),
        _ => None,
    }
}

/// Build one provider, or `None` when no endpoint is known for it.
fn build_one(
    name: &str,
    section: Option<&ProviderConfig>,
    fallback_key: Option<&str>,
) -> Option<Arc<dyn Provider>> {
    let base_url = section
        .and_then(|s| s.api_url.clone())
        .or_else(|| well_known_base_url(name).map(str::to_string));
    let Some(base_url) = base_url else {
        warn!(provider = name, "No api_url configured and provider is not well known; skipping");
        return None;
    };

    let api_key = section
        .and_then(|s| s.api_key.as_deref())
        .or(fallback_key)
        .unwrap_or_default();

    Some(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)))
}

/// Build every configured provider, plus the default one when it has no
/// `[providers.*]` section of its own.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);
    let fallback_key = config.api_key.as_deref();

    for (name, section) in &config.providers {
        if let Some(provider) = build_one(name, Some(section), fallback_key) {
            router.register(name.clone(), provider);
        }
    }

    if router.get(&config.default_provider).is_none() {
        if let Some(provider) = build_one(&config.default_provider, None, fallback_key) {
            router.register(config.default_provider.clone(), provider);
        }
    }

    debug!(providers = ?router.list(), default = %config.default_provider, "Provider router built");
    router
}

/// The configured default provider, ready to hand to the runtime.
pub fn default_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    build_from_config(config).default().ok_or_else(|| {
        ProviderError::NotConfigured(format!(
            "default provider '{}' has no endpoint; set [providers.{}].api_url",
            config.default_provider, config.default_provider
        ))
    })
}
