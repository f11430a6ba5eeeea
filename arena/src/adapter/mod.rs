//! Capability-uniform clients for text-generation backends.
//!
//! Every backend — a local inference server or a hosted API — sits behind
//! the same [`ModelAdapter`] contract: one `generate` call, one tagged
//! error type. Ordinary backend failure (rate limit, timeout, malformed
//! output) is a returned [`AdapterError`], never a panic, so the fetcher
//! can degrade a round instead of failing the battle.
//!
//! Which variant serves a model is decided by [`crate::config::AdapterSpec`]
//! when the registry is built — orchestration code never branches on a
//! model name.

pub mod anthropic;
pub mod ollama;
pub mod openai_compat;
pub mod scripted;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{AdapterKind, AdapterSpec, GenerationParams};

pub use anthropic::AnthropicAdapter;
pub use ollama::OllamaAdapter;
pub use openai_compat::OpenAiCompatAdapter;
pub use scripted::ScriptedAdapter;

/// Classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    /// The backend did not answer within the bound.
    Timeout,
    /// The backend refused or could not be reached (rate limit, 5xx, down).
    Unavailable,
    /// The transport failed mid-flight.
    Transport,
    /// The backend answered with something undecodable or empty.
    InvalidResponse,
}

impl std::fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Transport => write!(f, "transport"),
            Self::InvalidResponse => write!(f, "invalid_response"),
        }
    }
}

/// A tagged backend failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::Transport,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::InvalidResponse,
            message: message.into(),
        }
    }

    /// Map a reqwest failure onto the taxonomy.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if err.is_connect() {
            Self::unavailable(err.to_string())
        } else if err.is_decode() {
            Self::invalid_response(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }

    /// Map a non-2xx HTTP status onto the taxonomy.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        let message = format!("HTTP {}: {}", status, body);
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::unavailable(message)
        } else {
            Self::transport(message)
        }
    }
}

/// A successful generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// The generated text.
    pub text: String,
    /// Wall-clock latency of the backend call in milliseconds.
    pub latency_ms: u64,
}

/// Result type for adapter calls.
pub type AdapterResult = Result<Generation, AdapterError>;

/// One generation backend.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Arena-wide model identifier (rating key, pool member).
    fn model_id(&self) -> &str;

    /// Human-readable name revealed after a vote.
    fn display_name(&self) -> &str;

    /// Generate a completion for the prompt. Ordinary backend failure is a
    /// returned [`AdapterError`], never a panic.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> AdapterResult;
}

/// Per-backend failure accounting, surfaced to operators. Purely
/// observational — a degraded backend still gets queried and the round
/// degrades per fetch policy instead of being gated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterHealth {
    pub model_id: String,
    pub total_calls: u64,
    pub total_failures: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_change: DateTime<Utc>,
}

impl AdapterHealth {
    fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            total_calls: 0,
            total_failures: 0,
            consecutive_failures: 0,
            last_error: None,
            last_change: Utc::now(),
        }
    }

    fn record_success(&mut self) {
        self.total_calls += 1;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_change = Utc::now();
    }

    fn record_failure(&mut self, error: &AdapterError) {
        self.total_calls += 1;
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
        self.last_change = Utc::now();
    }

    /// Failure rate as a fraction (0.0–1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_calls as f64
        }
    }
}

/// Error building a registry from configuration.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate model id in configuration: {0}")]
    DuplicateModel(String),

    #[error("adapter {model_id} needs a base_url")]
    MissingBaseUrl { model_id: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// The roster of configured backends, keyed by model id. Registration
/// order is preserved — it is the default pool order of new battles.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ModelAdapter>>,
    order: Vec<String>,
    health: Mutex<HashMap<String, AdapterHealth>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            order: Vec::new(),
            health: Mutex::new(HashMap::new()),
        }
    }

    /// Build a registry from configuration. The spec's `kind` selects the
    /// client variant; `request_timeout` bounds each HTTP call so a hung
    /// backend cannot outlive the round by more than transport slack.
    pub fn from_specs(
        specs: &[AdapterSpec],
        request_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for spec in specs {
            let adapter: Arc<dyn ModelAdapter> = match spec.kind {
                AdapterKind::OpenAiCompat => {
                    Arc::new(OpenAiCompatAdapter::from_spec(spec, request_timeout)?)
                }
                AdapterKind::Anthropic => {
                    Arc::new(AnthropicAdapter::from_spec(spec, request_timeout)?)
                }
                AdapterKind::Ollama => Arc::new(OllamaAdapter::from_spec(spec, request_timeout)?),
                AdapterKind::Scripted => Arc::new(ScriptedAdapter::new(
                    &spec.model_id,
                    &spec.display_name,
                    format!("scripted response from {}", spec.model_id),
                )),
            };
            registry.register(adapter)?;
        }

        Ok(registry)
    }

    /// Register a backend. Model ids must be unique.
    pub fn register(&mut self, adapter: Arc<dyn ModelAdapter>) -> Result<(), RegistryError> {
        let model_id = adapter.model_id().to_string();
        if self.adapters.contains_key(&model_id) {
            return Err(RegistryError::DuplicateModel(model_id));
        }
        self.order.push(model_id.clone());
        self.adapters.insert(model_id, adapter);
        Ok(())
    }

    /// Create a shared reference to this registry.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Look up a backend by model id.
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn ModelAdapter>> {
        self.adapters.get(model_id).cloned()
    }

    /// Display name for a model id; falls back to the id itself.
    pub fn display_name(&self, model_id: &str) -> String {
        self.adapters
            .get(model_id)
            .map(|a| a.display_name().to_string())
            .unwrap_or_else(|| model_id.to_string())
    }

    /// All registered model ids, in registration order.
    pub fn model_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Record the outcome of one backend call for health accounting.
    pub fn record_outcome(&self, model_id: &str, outcome: &AdapterResult) {
        if let Ok(mut health) = self.health.lock() {
            let entry = health
                .entry(model_id.to_string())
                .or_insert_with(|| AdapterHealth::new(model_id));
            match outcome {
                Ok(_) => entry.record_success(),
                Err(e) => entry.record_failure(e),
            }
        }
    }

    /// Health snapshot for one backend.
    pub fn health(&self, model_id: &str) -> Option<AdapterHealth> {
        self.health.lock().ok()?.get(model_id).cloned()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("models", &self.model_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_constructors_tag_kind() {
        assert_eq!(AdapterError::timeout("t").kind, AdapterErrorKind::Timeout);
        assert_eq!(
            AdapterError::unavailable("u").kind,
            AdapterErrorKind::Unavailable
        );
        assert_eq!(
            AdapterError::invalid_response("i").kind,
            AdapterErrorKind::InvalidResponse
        );
        assert_eq!(AdapterError::transport("x").to_string(), "transport: x");
    }

    #[test]
    fn status_mapping() {
        let rate_limited =
            AdapterError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert_eq!(rate_limited.kind, AdapterErrorKind::Unavailable);

        let server_down =
            AdapterError::from_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, String::new());
        assert_eq!(server_down.kind, AdapterErrorKind::Unavailable);

        let bad_request =
            AdapterError::from_status(reqwest::StatusCode::BAD_REQUEST, "nope".into());
        assert_eq!(bad_request.kind, AdapterErrorKind::Transport);
    }

    #[test]
    fn registry_rejects_duplicate_model_ids() {
        let mut registry = AdapterRegistry::new();
        registry
            .register(Arc::new(ScriptedAdapter::new("m1", "M1", "hi")))
            .unwrap();
        let err = registry
            .register(Arc::new(ScriptedAdapter::new("m1", "M1 again", "hi")))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateModel(id) if id == "m1"));
    }

    #[test]
    fn registry_lookup_and_display_name() {
        let mut registry = AdapterRegistry::new();
        registry
            .register(Arc::new(ScriptedAdapter::new("m1", "Model One", "hi")))
            .unwrap();

        assert!(registry.get("m1").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.display_name("m1"), "Model One");
        assert_eq!(registry.display_name("missing"), "missing");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn health_accounting() {
        let mut registry = AdapterRegistry::new();
        registry
            .register(Arc::new(ScriptedAdapter::new("m1", "M1", "hi")))
            .unwrap();

        registry.record_outcome(
            "m1",
            &Ok(Generation {
                text: "hi".into(),
                latency_ms: 5,
            }),
        );
        registry.record_outcome("m1", &Err(AdapterError::timeout("slow")));
        registry.record_outcome("m1", &Err(AdapterError::unavailable("down")));

        let health = registry.health("m1").unwrap();
        assert_eq!(health.total_calls, 3);
        assert_eq!(health.total_failures, 2);
        assert_eq!(health.consecutive_failures, 2);
        assert!((health.failure_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn from_specs_builds_each_variant() {
        let specs = vec![
            AdapterSpec::new(AdapterKind::OpenAiCompat, "qwen", "Qwen")
                .base_url("http://localhost:8081/v1"),
            AdapterSpec::new(AdapterKind::Anthropic, "claude", "Claude")
                .base_url("https://api.anthropic.com")
                .api_key("sk-test"),
            AdapterSpec::new(AdapterKind::Ollama, "llama", "Llama")
                .base_url("http://localhost:11434"),
            AdapterSpec::new(AdapterKind::Scripted, "mock", "Mock"),
        ];

        let registry = AdapterRegistry::from_specs(&specs, Duration::from_secs(5)).unwrap();
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn from_specs_requires_base_url_for_http_variants() {
        let specs = vec![AdapterSpec::new(AdapterKind::OpenAiCompat, "qwen", "Qwen")];
        let err = AdapterRegistry::from_specs(&specs, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, RegistryError::MissingBaseUrl { .. }));
    }
}
