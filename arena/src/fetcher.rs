//! Concurrent fan-out to the two backends of a round.
//!
//! Both adapter calls launch at the same instant as spawned tasks and the
//! total wait is bounded by a single configured timeout. When the bound
//! fires, in-flight calls are detached rather than killed — most backend
//! transports cannot be cancelled — and whatever they eventually produce is
//! discarded. Outcomes are keyed by the round number they were launched
//! for, so a late result can never be confused with a newer round's.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::adapter::{AdapterError, AdapterRegistry, AdapterResult};
use crate::config::GenerationParams;
use crate::state::ModelId;

/// Outcome of one side of the fan-out.
#[derive(Debug)]
pub struct SideResult {
    pub model_id: ModelId,
    pub outcome: AdapterResult,
}

impl SideResult {
    /// Whether this side produced a usable response.
    pub fn is_usable(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Outcome of a whole pair fetch, tagged with the round it served.
#[derive(Debug)]
pub struct PairOutcome {
    pub round_number: u32,
    pub left: SideResult,
    pub right: SideResult,
}

impl PairOutcome {
    /// Number of usable responses (0..=2).
    pub fn usable(&self) -> usize {
        usize::from(self.left.is_usable()) + usize::from(self.right.is_usable())
    }

    /// Whether the round degraded to a single usable side.
    pub fn is_degraded(&self) -> bool {
        self.usable() == 1
    }

    /// Both sides in (left, right) order.
    pub fn sides(&self) -> [&SideResult; 2] {
        [&self.left, &self.right]
    }
}

enum SideTask {
    /// The side failed before launch (no adapter configured).
    Ready(AdapterResult),
    /// The adapter call is in flight.
    Running(JoinHandle<AdapterResult>),
}

/// Fans out to two backends concurrently with one bounded wait.
pub struct ResponseFetcher {
    timeout: Duration,
}

impl ResponseFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The configured bound on a whole pair fetch.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Query both sides of the pair concurrently. Never fails as a whole:
    /// each side carries its own outcome and the caller applies the
    /// degradation policy.
    pub async fn fetch_pair(
        &self,
        registry: &AdapterRegistry,
        prompt: &str,
        params: &GenerationParams,
        pair: (&str, &str),
        round_number: u32,
    ) -> PairOutcome {
        // Launch both before awaiting either, so the calls run in parallel.
        let left_task = Self::spawn_side(registry, pair.0, prompt, params);
        let right_task = Self::spawn_side(registry, pair.1, prompt, params);

        let (left_outcome, right_outcome) = tokio::join!(
            Self::settle(self.timeout, pair.0, left_task),
            Self::settle(self.timeout, pair.1, right_task),
        );

        registry.record_outcome(pair.0, &left_outcome);
        registry.record_outcome(pair.1, &right_outcome);

        let outcome = PairOutcome {
            round_number,
            left: SideResult {
                model_id: pair.0.to_string(),
                outcome: left_outcome,
            },
            right: SideResult {
                model_id: pair.1.to_string(),
                outcome: right_outcome,
            },
        };

        debug!(
            round = round_number,
            usable = outcome.usable(),
            left = pair.0,
            right = pair.1,
            "Pair fetch settled"
        );

        outcome
    }

    fn spawn_side(
        registry: &AdapterRegistry,
        model_id: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> SideTask {
        match registry.get(model_id) {
            None => SideTask::Ready(Err(AdapterError::unavailable(format!(
                "no adapter configured for {}",
                model_id
            )))),
            Some(adapter) => {
                let prompt = prompt.to_string();
                let params = params.clone();
                SideTask::Running(tokio::spawn(async move {
                    adapter.generate(&prompt, &params).await
                }))
            }
        }
    }

    async fn settle(timeout: Duration, model_id: &str, task: SideTask) -> AdapterResult {
        match task {
            SideTask::Ready(result) => result,
            SideTask::Running(handle) => {
                match tokio::time::timeout(timeout, handle).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) => {
                        warn!(model = model_id, "Adapter task failed: {}", join_err);
                        Err(AdapterError::transport(format!(
                            "adapter task failed: {}",
                            join_err
                        )))
                    }
                    Err(_) => {
                        // Dropping the handle detaches the in-flight call;
                        // its eventual result is discarded.
                        warn!(model = model_id, ?timeout, "Adapter call timed out");
                        Err(AdapterError::timeout(format!(
                            "{} produced nothing within {:?}",
                            model_id, timeout
                        )))
                    }
                }
            }
        }
    }
}
