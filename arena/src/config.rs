//! Runtime configuration for the battle engine.
//!
//! Everything the surrounding service is allowed to tune lives here: the
//! response timeout, Elo parameters, session retention, and the roster of
//! participating backends. Nothing in the engine hardcodes these values.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `ARENA_RESPONSE_TIMEOUT_SECS`)
//! 2. Values set on the struct by the caller
//! 3. Built-in defaults

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bound on a whole round of concurrent backend calls.
const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 60;
/// Default number of fetch attempts before a battle is marked failed.
const DEFAULT_FETCH_ATTEMPTS: u32 = 2;
/// Default Elo K-factor.
const DEFAULT_ELO_K_FACTOR: f64 = 32.0;
/// Default rating assigned to a model on first reference.
const DEFAULT_RATING: f64 = 1500.0;
/// Default retention window for finished or stalled battles.
const DEFAULT_RETENTION_SECS: u64 = 3600;
/// Default generation budget per response.
const DEFAULT_MAX_TOKENS: u32 = 1024;
/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Environment-variable names for scalar overrides.
const ENV_RESPONSE_TIMEOUT_SECS: &str = "ARENA_RESPONSE_TIMEOUT_SECS";
const ENV_FETCH_ATTEMPTS: &str = "ARENA_FETCH_ATTEMPTS";
const ENV_ELO_K_FACTOR: &str = "ARENA_ELO_K_FACTOR";
const ENV_DEFAULT_RATING: &str = "ARENA_DEFAULT_RATING";
const ENV_RETENTION_SECS: &str = "ARENA_RETENTION_SECS";

fn env_parsed<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

/// Which client variant talks to a backend.
///
/// The variant is selected here, by configuration, never by branching on a
/// model name inside orchestration logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// OpenAI-compatible chat-completions server (vLLM, llama.cpp, routers).
    OpenAiCompat,
    /// Anthropic messages API.
    Anthropic,
    /// Ollama native generate API.
    Ollama,
    /// Deterministic scripted backend for tests and dry runs.
    Scripted,
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAiCompat => write!(f, "openai_compat"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Ollama => write!(f, "ollama"),
            Self::Scripted => write!(f, "scripted"),
        }
    }
}

/// One participating backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSpec {
    /// Client variant to build.
    pub kind: AdapterKind,
    /// Arena-wide model identifier (rating key, pool member).
    pub model_id: String,
    /// Human-readable name revealed after a vote.
    pub display_name: String,
    /// Model name as the backend API expects it. Defaults to `model_id`.
    pub api_model: String,
    /// Base URL of the backend endpoint.
    pub base_url: String,
    /// API key where the backend requires one. Local servers accept anything.
    pub api_key: Option<String>,
}

impl AdapterSpec {
    /// Create a spec with the given identity; endpoint details via builders.
    pub fn new(kind: AdapterKind, model_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self {
            kind,
            api_model: model_id.clone(),
            model_id,
            display_name: display_name.into(),
            base_url: String::new(),
            api_key: None,
        }
    }

    /// Set the backend base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the wire-level model name when it differs from `model_id`.
    pub fn api_model(mut self, name: impl Into<String>) -> Self {
        self.api_model = name.into();
        self
    }

    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Sampling parameters forwarded to every backend in a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Single bound on the concurrent fan-out to both backends in a round.
    pub response_timeout: Duration,
    /// Fetch attempts before an unresponsive round marks the battle failed.
    pub fetch_attempts: u32,
    /// Elo K-factor applied to every resolved match.
    pub elo_k_factor: f64,
    /// Rating assigned to a model on first reference.
    pub default_rating: f64,
    /// How long battle sessions are retained before expiring.
    pub retention: Duration,
    /// Sampling parameters for all adapters.
    pub generation: GenerationParams,
    /// Shuffle the model pool at battle creation to avoid positional bias.
    /// Disabled in tests that assert exact pairings.
    pub shuffle_pool: bool,
    /// Participating backends. The pool of a new battle is drawn from here.
    pub adapters: Vec<AdapterSpec>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(env_parsed(
                ENV_RESPONSE_TIMEOUT_SECS,
                DEFAULT_RESPONSE_TIMEOUT_SECS,
            )),
            fetch_attempts: env_parsed(ENV_FETCH_ATTEMPTS, DEFAULT_FETCH_ATTEMPTS),
            elo_k_factor: env_parsed(ENV_ELO_K_FACTOR, DEFAULT_ELO_K_FACTOR),
            default_rating: env_parsed(ENV_DEFAULT_RATING, DEFAULT_RATING),
            retention: Duration::from_secs(env_parsed(ENV_RETENTION_SECS, DEFAULT_RETENTION_SECS)),
            generation: GenerationParams::default(),
            shuffle_pool: true,
            adapters: Vec::new(),
        }
    }
}

impl ArenaConfig {
    /// Add a participating backend.
    pub fn with_adapter(mut self, spec: AdapterSpec) -> Self {
        self.adapters.push(spec);
        self
    }

    /// Model identifiers of all configured backends, in configuration order.
    pub fn model_pool(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.model_id.clone()).collect()
    }
}
