//! OpenAI-compatible chat-completions adapter.
//!
//! Covers local inference servers (vLLM, llama.cpp) and routers that speak
//! the `/chat/completions` dialect. Most local servers accept any non-empty
//! API key.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{AdapterSpec, GenerationParams};

use super::{AdapterError, AdapterResult, Generation, ModelAdapter, RegistryError};

pub struct OpenAiCompatAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_model: String,
    model_id: String,
    display_name: String,
}

impl OpenAiCompatAdapter {
    /// Build from configuration. `request_timeout` bounds each call.
    pub fn from_spec(spec: &AdapterSpec, request_timeout: Duration) -> Result<Self, RegistryError> {
        if spec.base_url.is_empty() {
            return Err(RegistryError::MissingBaseUrl {
                model_id: spec.model_id.clone(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RegistryError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            base_url: spec.base_url.trim_end_matches('/').to_string(),
            api_key: spec.api_key.clone().unwrap_or_else(|| "local".to_string()),
            api_model: spec.api_model.clone(),
            model_id: spec.model_id.clone(),
            display_name: spec.display_name.clone(),
        })
    }
}

#[async_trait::async_trait]
impl ModelAdapter for OpenAiCompatAdapter {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> AdapterResult {
        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            max_tokens: u32,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            content: Option<String>,
        }

        let request = ChatRequest {
            model: &self.api_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(status, body));
        }

        let chat: ChatResponse = response.json().await.map_err(AdapterError::from_reqwest)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let text = chat
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AdapterError::invalid_response("empty completion"))?;

        Ok(Generation { text, latency_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterKind;

    fn spec() -> AdapterSpec {
        AdapterSpec::new(AdapterKind::OpenAiCompat, "qwen", "Qwen 2.5")
            .base_url("http://localhost:8081/v1/")
            .api_model("Qwen2.5-72B-Instruct")
    }

    #[test]
    fn builds_from_spec_and_trims_trailing_slash() {
        let adapter = OpenAiCompatAdapter::from_spec(&spec(), Duration::from_secs(5)).unwrap();
        assert_eq!(adapter.model_id(), "qwen");
        assert_eq!(adapter.display_name(), "Qwen 2.5");
        assert_eq!(adapter.base_url, "http://localhost:8081/v1");
        assert_eq!(adapter.api_key, "local");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_tagged_error() {
        // Nothing listens on this port; the call must come back as a tagged
        // adapter error, not a panic.
        let spec = AdapterSpec::new(AdapterKind::OpenAiCompat, "qwen", "Qwen")
            .base_url("http://127.0.0.1:1/v1");
        let adapter = OpenAiCompatAdapter::from_spec(&spec, Duration::from_millis(500)).unwrap();

        let err = adapter
            .generate("hello", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind,
            super::super::AdapterErrorKind::Unavailable | super::super::AdapterErrorKind::Timeout
        ));
    }
}
