//! Provider selection from configuration

use super::{AnthropicModel, LlmError, LoggingModel, Model, OpenAiModel};
use std::sync::Arc;

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
        }
    }
}

/// Configuration for model providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// Explicit provider; inferred from available keys when unset
    pub provider: Option<Provider>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub model: Option<String>,
    /// Base URL override (proxy or compatible endpoint)
    pub gateway: Option<String>,
    pub max_tokens: Option<u32>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            provider: non_empty("KUERY_LLM_PROVIDER").and_then(|p| Provider::parse(&p)),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY"),
            model: non_empty("KUERY_MODEL"),
            gateway: non_empty("LLM_GATEWAY"),
            max_tokens: non_empty("KUERY_MAX_TOKENS").and_then(|v| v.trim().parse().ok()),
        }
    }

    /// Provider to use: explicit choice, else whichever key is present
    /// (`OpenAI` first), else `OpenAI` when only a gateway is configured.
    pub fn resolved_provider(&self) -> Option<Provider> {
        if let Some(provider) = self.provider {
            return Some(provider);
        }
        if self.openai_api_key.is_some() {
            Some(Provider::OpenAi)
        } else if self.anthropic_api_key.is_some() {
            Some(Provider::Anthropic)
        } else if self.gateway.is_some() {
            Some(Provider::OpenAi)
        } else {
            None
        }
    }

    fn api_key(&self, provider: Provider) -> Option<String> {
        let key = match provider {
            Provider::OpenAi => self.openai_api_key.clone(),
            Provider::Anthropic => self.anthropic_api_key.clone(),
        };
        // The gateway handles authentication when no key is given
        key.or_else(|| self.gateway.as_ref().map(|_| "implicit".to_string()))
    }
}

/// Build the configured model, wrapped with logging
pub fn build_model(config: &LlmConfig) -> Result<Arc<dyn Model>, LlmError> {
    let provider = config.resolved_provider().ok_or_else(|| {
        LlmError::auth("No model provider configured: set OPENAI_API_KEY or ANTHROPIC_API_KEY")
    })?;
    let api_key = config.api_key(provider).ok_or_else(|| {
        LlmError::auth(format!(
            "Missing API key for provider {}",
            provider.display_name()
        ))
    })?;

    let gateway = config.gateway.as_deref();
    let inner: Arc<dyn Model> = match provider {
        Provider::OpenAi => Arc::new(OpenAiModel::new(
            api_key,
            config.model.clone(),
            gateway,
            config.max_tokens,
        )?),
        Provider::Anthropic => Arc::new(AnthropicModel::new(
            api_key,
            config.model.clone(),
            gateway,
            config.max_tokens,
        )?),
    };

    tracing::info!(
        provider = provider.display_name(),
        model = inner.model_id(),
        "Model configured"
    );
    Ok(Arc::new(LoggingModel::new(inner)))
}
