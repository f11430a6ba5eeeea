//! Ollama native generate-API adapter.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{AdapterSpec, GenerationParams};

use super::{AdapterError, AdapterResult, Generation, ModelAdapter, RegistryError};

pub struct OllamaAdapter {
    http: reqwest::Client,
    base_url: String,
    api_model: String,
    model_id: String,
    display_name: String,
}

impl OllamaAdapter {
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
            api_model: spec.api_model.clone(),
            model_id: spec.model_id.clone(),
            display_name: spec.display_name.clone(),
        })
    }
}

#[async_trait::async_trait]
impl ModelAdapter for OllamaAdapter {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> AdapterResult {
        #[derive(Serialize)]
        struct GenerateOptions {
            temperature: f32,
            num_predict: u32,
        }

        #[derive(Serialize)]
        struct GenerateRequest<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: GenerateOptions,
        }

        #[derive(Deserialize)]
        struct GenerateResponse {
            response: Option<String>,
        }

        let request = GenerateRequest {
            model: &self.api_model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(status, body));
        }

        let generated: GenerateResponse =
            response.json().await.map_err(AdapterError::from_reqwest)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let text = generated
            .response
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AdapterError::invalid_response("empty generation"))?;

        Ok(Generation { text, latency_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterKind;

    #[test]
    fn builds_from_spec() {
        let spec = AdapterSpec::new(AdapterKind::Ollama, "llama", "Llama 3.1")
            .base_url("http://localhost:11434")
            .api_model("llama3.1:70b");

        let adapter = OllamaAdapter::from_spec(&spec, Duration::from_secs(5)).unwrap();
        assert_eq!(adapter.model_id(), "llama");
        assert_eq!(adapter.api_model, "llama3.1:70b");
    }
}
