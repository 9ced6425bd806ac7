// src/provider/resolver.rs — Pick a provider for a model reference from env + config

use std::sync::Arc;

use super::anthropic::AnthropicProvider;
use super::openai_compat::{OpenAICompatProvider, OLLAMA_BASE_URL, OPENAI_BASE_URL};
use super::{ModelProvider, ModelRef};
use crate::infra::config::ModelsConfig;
use crate::infra::errors::LabError;

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1";

/// Choose the designer model: explicit flag > config > first provider with a key.
pub fn default_model_ref(cli_model: Option<&str>, models: &ModelsConfig) -> Option<ModelRef> {
    if let Some(m) = cli_model.and_then(ModelRef::parse) {
        return Some(m);
    }
    if let Some(m) = models.designer.as_deref().and_then(ModelRef::parse) {
        return Some(m);
    }
    if std::env::var("ANTHROPIC_API_KEY").is_ok() {
        return Some(ModelRef::new("anthropic", DEFAULT_ANTHROPIC_MODEL));
    }
    if std::env::var("OPENAI_API_KEY").is_ok() {
        return Some(ModelRef::new("openai", DEFAULT_OPENAI_MODEL));
    }
    None
}

/// Build the provider for `model_ref`. Keys come from the environment only.
pub fn build_provider(
    model_ref: &ModelRef,
    models: &ModelsConfig,
) -> Result<Arc<dyn ModelProvider>, LabError> {
    match model_ref.provider.as_str() {
        "anthropic" => {
            let key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| LabError::NoProvider)?;
            Ok(Arc::new(AnthropicProvider::new(key)))
        }
        "openai" => {
            let key = std::env::var("OPENAI_API_KEY").map_err(|_| LabError::NoProvider)?;
            let base = models
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            Ok(Arc::new(OpenAICompatProvider::new(
                "openai",
                "OpenAI",
                key,
                base,
                model_ref.model.clone(),
            )))
        }
        "ollama" => {
            let base = models
                .base_url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
            Ok(Arc::new(OpenAICompatProvider::new(
                "ollama",
                "Ollama",
                String::new(),
                base,
                model_ref.model.clone(),
            )))
        }
        other => Err(LabError::UnknownProvider(other.to_string())),
    }
}
