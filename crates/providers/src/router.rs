//! Provider router — maps configured backends to providers and binds
//! each agent to its backend, model and retry policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tandem_config::{AppConfig, ConfigError, LlmConfig};
use tandem_core::agent::LlmSettings;
use tandem_core::provider::Provider;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::{RetryPolicy, RetryingProvider};

/// An agent's resolved model access.
#[derive(Clone)]
pub struct ModelBinding {
    pub provider: Arc<dyn Provider>,
    pub settings: LlmSettings,
}

impl std::fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("provider", &self.provider.name())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Routes LLM requests to the correct provider.
#[derive(Default)]
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Bind an agent's model settings to a registered backend.
    ///
    /// The returned provider retries transient failures according to the
    /// agent's timeout and retry settings.
    pub fn bind(&self, config: &AppConfig, llm: &LlmConfig) -> Result<ModelBinding, ConfigError> {
        let (backend_name, backend) = config.backend_for(llm)?;
        let inner = self
            .get(backend_name)
            .ok_or_else(|| ConfigError::UnregisteredBackend(backend_name.to_string()))?;

        let policy = RetryPolicy::from_secs(
            llm.request_timeout_secs,
            llm.retry_wait_secs,
            llm.max_retry_period_secs,
        );

        let settings = LlmSettings {
            model: llm.model.clone().unwrap_or_else(|| backend.model.clone()),
            temperature: llm.temperature,
            seed: llm.seed,
            max_tokens: llm.max_tokens,
            stop: Vec::new(),
        };

        debug!(backend = backend_name, model = %settings.model, "Bound agent model");

        Ok(ModelBinding {
            provider: Arc::new(RetryingProvider::new(inner, policy)),
            settings,
        })
    }
}

/// Build providers for every backend some agent uses.
///
/// Fails when a used remote backend has no API key.
pub fn build_from_config(config: &AppConfig) -> Result<ProviderRouter, ConfigError> {
    let mut router = ProviderRouter::new();

    let llms: Vec<&LlmConfig> = config
        .agents
        .all()
        .into_iter()
        .filter_map(|a| a.llm.as_ref())
        .collect();

    // The client timeout must not undercut any agent's own request timeout
    let client_timeout = llms
        .iter()
        .map(|l| l.request_timeout_secs)
        .max()
        .unwrap_or(60)
        + 5;

    for llm in llms {
        let (name, backend) = config.backend_for(llm)?;
        if router.get(name).is_some() {
            continue;
        }

        let api_key = config.require_api_key(name)?;
        let provider = OpenAiCompatProvider::new(name, &backend.api_base, api_key)
            .with_timeout(Duration::from_secs(client_timeout));
        router.register(name, Arc::new(provider));
    }

    Ok(router)
}
