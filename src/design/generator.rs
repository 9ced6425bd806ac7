// src/design/generator.rs — Goal (+ context, + revision feedback) → validated design

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::parse::{parse_design, truncate_raw};
use super::prompt::{build_system_prompt, build_user_prompt};
use super::revision::{unaddressed_findings, Revision};
use super::{DesignError, ExperimentDesign};
use crate::infra::errors::LabError;
use crate::provider::{ChatRequest, Message, ModelProvider, TokenUsage};

/// Tokens a model reply consumed even though the reply was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct SpentTokens {
    pub model: String,
    pub usage: TokenUsage,
}

/// Why a generation attempt produced no usable design. All variants are
/// retryable by the controller; none count as an iteration.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("provider error: {0}")]
    Provider(#[from] LabError),

    #[error("generation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("malformed design output: {message}")]
    Malformed {
        message: String,
        raw: String,
        spent: Option<SpentTokens>,
    },

    #[error("design failed validation: {error}")]
    Schema {
        error: DesignError,
        spent: Option<SpentTokens>,
    },

    #[error("revision ignores {} finding(s)", .unaddressed.len())]
    RevisionIgnored {
        unaddressed: Vec<String>,
        spent: Option<SpentTokens>,
    },
}

impl From<DesignError> for GenerationError {
    fn from(error: DesignError) -> Self {
        GenerationError::Schema { error, spent: None }
    }
}

impl GenerationError {
    /// Usage of the rejected reply, for billing.
    pub fn spent(&self) -> Option<&SpentTokens> {
        match self {
            GenerationError::Malformed { spent, .. }
            | GenerationError::Schema { spent, .. }
            | GenerationError::RevisionIgnored { spent, .. } => spent.as_ref(),
            _ => None,
        }
    }

    /// Attach the usage of the reply that was rejected.
    pub fn billed(mut self, model: &str, usage: TokenUsage) -> Self {
        if let GenerationError::Malformed { spent, .. }
        | GenerationError::Schema { spent, .. }
        | GenerationError::RevisionIgnored { spent, .. } = &mut self
        {
            *spent = Some(SpentTokens {
                model: model.to_string(),
                usage,
            });
        }
        self
    }

    /// Short tag used in traces and progress events.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Provider(_) => "provider",
            GenerationError::Timeout { .. } => "timeout",
            GenerationError::Malformed { .. } => "malformed",
            GenerationError::Schema { .. } => "schema",
            GenerationError::RevisionIgnored { .. } => "revision_ignored",
        }
    }
}

/// A design plus what it cost to produce.
#[derive(Debug, Clone)]
pub struct GeneratedDesign {
    pub design: ExperimentDesign,
    pub usage: TokenUsage,
    pub model: String,
}

/// Produces designs. No side effects on refinement state.
#[async_trait]
pub trait DesignGenerator: Send + Sync {
    async fn generate(
        &self,
        goal: &str,
        context: Option<&str>,
        feedback: Option<&Revision>,
    ) -> Result<GeneratedDesign, GenerationError>;
}

/// Version number for the design that answers `feedback`.
pub fn next_version(feedback: Option<&Revision>) -> u32 {
    feedback.map(|r| r.previous.version + 1).unwrap_or(1)
}

/// Reject `design` if it leaves any finding from `revision` unanswered.
pub fn check_revision(revision: &Revision, design: &ExperimentDesign) -> Result<(), GenerationError> {
    let unaddressed = unaddressed_findings(revision, design);
    if unaddressed.is_empty() {
        return Ok(());
    }
    Err(GenerationError::RevisionIgnored {
        unaddressed: unaddressed.iter().map(|f| f.to_string()).collect(),
        spent: None,
    })
}

/// Turn raw model output into a design, classifying the failure.
pub fn design_from_output(text: &str, version: u32) -> Result<ExperimentDesign, GenerationError> {
    parse_design(text, version).map_err(|e| match e {
        DesignError::Malformed(message) => GenerationError::Malformed {
            message,
            raw: truncate_raw(text),
            spent: None,
        },
        other => other.into(),
    })
}

/// Designer backed by a chat model.
pub struct LlmDesignGenerator {
    provider: Arc<dyn ModelProvider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmDesignGenerator {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.4,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl DesignGenerator for LlmDesignGenerator {
    async fn generate(
        &self,
        goal: &str,
        context: Option<&str>,
        feedback: Option<&Revision>,
    ) -> Result<GeneratedDesign, GenerationError> {
        let user = build_user_prompt(goal, context, feedback);
        tracing::debug!(
            model = %self.model,
            prompt_chars = user.len(),
            revision = feedback.is_some(),
            "Requesting design"
        );

        let response = self
            .provider
            .chat(ChatRequest {
                model: self.model.clone(),
                messages: vec![Message::user(user)],
                max_tokens: Some(self.max_tokens),
                temperature: Some(self.temperature),
                system: Some(build_system_prompt()),
            })
            .await?;

        let bill = |e: GenerationError| e.billed(&self.model, response.usage);
        let design = design_from_output(&response.content, next_version(feedback)).map_err(bill)?;
        if let Some(rev) = feedback {
            check_revision(rev, &design).map_err(bill)?;
        }

        Ok(GeneratedDesign {
            design,
            usage: response.usage,
            model: self.model.clone(),
        })
    }
}
