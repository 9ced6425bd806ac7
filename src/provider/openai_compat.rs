// src/provider/openai_compat.rs — Generic OpenAI-compatible chat completions provider
//
// Used for OpenAI itself and for local or hosted endpoints speaking the same
// protocol (ollama, vLLM, OpenRouter, ...).

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ModelInfo, ModelProvider, Role, StopReason, TokenUsage};
use crate::infra::errors::LabError;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

pub struct OpenAICompatProvider {
    id_str: String,
    name_str: String,
    api_key: String,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        api_key: String,
        base_url: String,
        default_model: String,
    ) -> Self {
        Self {
            id_str: id.into(),
            name_str: name.into(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model,
            client: reqwest::Client::new(),
        }
    }

    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        for m in &request.messages {
            messages.push(serde_json::json!({
                "role": match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                "content": m.content,
            }));
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

fn parse_response(resp: &serde_json::Value) -> ChatResponse {
    let content = resp["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    let usage = TokenUsage {
        input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };

    let stop_reason = match resp["choices"][0]["finish_reason"].as_str() {
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::Unknown,
    };

    ChatResponse {
        content,
        usage,
        stop_reason,
    }
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    fn id(&self) -> &str {
        &self.id_str
    }

    fn name(&self) -> &str {
        &self.name_str
    }

    fn models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: self.default_model.clone(),
            name: self.default_model.clone(),
            context_window: 128_000,
            max_output_tokens: 16_384,
            input_price_per_mtok: 0.0,
            output_price_per_mtok: 0.0,
        }]
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LabError> {
        let body = self.build_request_body(&request);

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder.send().await.map_err(|e| LabError::Provider {
            provider: self.id_str.clone(),
            message: e.to_string(),
            retriable: e.is_timeout() || e.is_connect(),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LabError::RateLimited {
                provider: self.id_str.clone(),
                retry_after_ms: 5_000,
            });
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LabError::Provider {
                provider: self.id_str.clone(),
                message: format!("HTTP {}: {}", status, error_body),
                retriable: status.is_server_error(),
            });
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| LabError::Provider {
            provider: self.id_str.clone(),
            message: e.to_string(),
            retriable: false,
        })?;

        Ok(parse_response(&resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    fn provider() -> OpenAICompatProvider {
        OpenAICompatProvider::new(
            "ollama",
            "Ollama",
            String::new(),
            format!("{}/", OLLAMA_BASE_URL),
            "qwen2.5".into(),
        )
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(provider().base_url, OLLAMA_BASE_URL);
    }

    #[test]
    fn test_request_body_prepends_system() {
        let req = ChatRequest {
            model: "qwen2.5".into(),
            messages: vec![Message::user("hello")],
            max_tokens: None,
            temperature: Some(0.1),
            system: Some("sys".into()),
        };
        let body = provider().build_request_body(&req);
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["content"], "hello");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_parse_response() {
        let resp = serde_json::json!({
            "choices": [{"message": {"content": "ok"}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3}
        });
        let parsed = parse_response(&resp);
        assert_eq!(parsed.content, "ok");
        assert_eq!(parsed.usage.total(), 13);
        assert!(matches!(parsed.stop_reason, StopReason::MaxTokens));
    }
}
