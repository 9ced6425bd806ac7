// src/infra/errors.rs — Process-level error types for labloop
//
// Loop-level failures (generation, execution) have their own enums in
// `design` and `simulation`; this one covers providers, config and IO.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    // Provider errors (retriable)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Inference budget is closed; no further model calls can be made")]
    InferenceBudgetClosed,

    // User errors
    #[error("No provider configured. Set ANTHROPIC_API_KEY or OPENAI_API_KEY, or pass --model ollama/<name>.")]
    NoProvider,

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LabError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            LabError::Provider {
                retriable: true,
                ..
            } | LabError::RateLimited { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_provider() {
        let e = LabError::Provider {
            provider: "anthropic".into(),
            message: "HTTP 503".into(),
            retriable: true,
        };
        assert!(e.is_retriable());
    }

    #[test]
    fn test_rate_limited_is_retriable() {
        let e = LabError::RateLimited {
            provider: "openai".into(),
            retry_after_ms: 1000,
        };
        assert!(e.is_retriable());
    }

    #[test]
    fn test_config_not_retriable() {
        assert!(!LabError::Config("bad".into()).is_retriable());
        assert!(!LabError::NoProvider.is_retriable());
        assert!(!LabError::InferenceBudgetClosed.is_retriable());
    }

    #[test]
    fn test_display() {
        let e = LabError::RateLimited {
            provider: "anthropic".into(),
            retry_after_ms: 5000,
        };
        assert_eq!(
            e.to_string(),
            "Rate limited by 'anthropic', retry after 5000ms"
        );
    }
}
