//! Anthropic messages-API adapter.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{AdapterSpec, GenerationParams};

use super::{AdapterError, AdapterResult, Generation, ModelAdapter, RegistryError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_model: String,
    model_id: String,
    display_name: String,
}

impl AnthropicAdapter {
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
            api_key: spec.api_key.clone().unwrap_or_default(),
            api_model: spec.api_model.clone(),
            model_id: spec.model_id.clone(),
            display_name: spec.display_name.clone(),
        })
    }
}

#[async_trait::async_trait]
impl ModelAdapter for AnthropicAdapter {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> AdapterResult {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct MessagesRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            messages: Vec<Message<'a>>,
        }

        #[derive(Deserialize)]
        struct MessagesResponse {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            block_type: String,
            text: Option<String>,
        }

        let request = MessagesRequest {
            model: &self.api_model,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(status, body));
        }

        let messages: MessagesResponse =
            response.json().await.map_err(AdapterError::from_reqwest)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let text: String = messages
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if text.is_empty() {
            return Err(AdapterError::invalid_response("no text blocks in response"));
        }

        Ok(Generation { text, latency_ms })
    }
}
