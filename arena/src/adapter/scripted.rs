//! Deterministic scripted backend.
//!
//! Serves canned responses with configurable latency shaping and fault
//! injection. Used by the test suites and for dry runs of the engine with
//! no real backend attached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::GenerationParams;

use super::{AdapterError, AdapterResult, Generation, ModelAdapter};

pub struct ScriptedAdapter {
    model_id: String,
    display_name: String,
    reply: String,
    delay: Option<Duration>,
    failure: Option<AdapterError>,
    calls: AtomicU64,
}

impl ScriptedAdapter {
    /// Create an adapter that always answers `reply` immediately.
    pub fn new(
        model_id: impl Into<String>,
        display_name: impl Into<String>,
        reply: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            display_name: display_name.into(),
            reply: reply.into(),
            delay: None,
            failure: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Delay every call by `delay` before answering.
    pub fn with_latency(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with the given error instead of answering.
    pub fn with_failure(mut self, failure: AdapterError) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Number of `generate` calls observed so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ModelAdapter for ScriptedAdapter {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> AdapterResult {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        Ok(Generation {
            text: self.reply.clone(),
            latency_ms: self.delay.map(|d| d.as_millis() as u64).unwrap_or(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_with_scripted_reply() {
        let adapter = ScriptedAdapter::new("m1", "Model One", "canned");
        let generation = adapter
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(generation.text, "canned");
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn injected_failure_is_returned() {
        let adapter = ScriptedAdapter::new("m1", "Model One", "canned")
            .with_failure(AdapterError::unavailable("scripted outage"));
        let err = adapter
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, super::super::AdapterErrorKind::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_shaping_delays_the_answer() {
        let adapter = ScriptedAdapter::new("m1", "Model One", "slow")
            .with_latency(Duration::from_millis(250));

        let started = tokio::time::Instant::now();
        let generation = adapter
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(generation.latency_ms, 250);
    }
}
