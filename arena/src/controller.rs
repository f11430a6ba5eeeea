//! Battle orchestration.
//!
//! The controller ties the pure tournament machine to the fetcher, the
//! rating engine, and the store. It is invoked by stateless request
//! handlers: every operation loads the session fresh, applies a transition,
//! and persists under compare-and-set, so two workers racing on the same
//! battle resolve deterministically — one wins, the other gets `conflict`.
//!
//! Model identities stay masked as labels "A"/"B" until a vote lands for
//! the round; the vote response reveals them for that round only.
//!
//! The controller is a cheap clone over shared internals; background fetch
//! tasks hold their own handle to those internals, so dropping a clone
//! never cancels an in-flight round.

use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::adapter::AdapterRegistry;
use crate::config::ArenaConfig;
use crate::error::{ArenaError, ArenaResult};
use crate::events::{ArenaEvent, SharedEventBus};
use crate::fetcher::{PairOutcome, ResponseFetcher};
use crate::rating::{RatingEngine, RatingUpdate};
use crate::retry::RetryPolicy;
use crate::state::{
    BattleId, BattleSession, BattleStatus, ModelId, SharedArenaStore, StoreError, Versioned,
    VoteChoice,
};
use crate::tournament::{self, RoundAdvance};

/// Masked label of the left side.
const LABEL_A: &str = "A";
/// Masked label of the right side.
const LABEL_B: &str = "B";

/// What `start_battle` hands back: no model identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleHandle {
    pub battle_id: BattleId,
    pub round_number: u32,
    pub status: BattleStatus,
}

/// The current round with identities masked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResponses {
    pub battle_id: BattleId,
    pub round_number: u32,
    pub label_a: String,
    pub label_b: String,
    /// Absent when that side was unavailable this round.
    pub text_a: Option<String>,
    pub text_b: Option<String>,
    pub latency_a: Option<u64>,
    pub latency_b: Option<u64>,
}

/// Whether the tournament continues after a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDisposition {
    Continue,
    Completed,
}

/// A model identity revealed after the round it was judged in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealedModel {
    pub label: String,
    pub model_id: ModelId,
    pub display_name: String,
}

/// Result of a recorded vote. The only place real identities appear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub battle_id: BattleId,
    pub judged_round: u32,
    pub status: VoteDisposition,
    pub eliminated: Vec<ModelId>,
    pub next_pair: Option<[ModelId; 2]>,
    pub winner: Option<ModelId>,
    pub final_ranking: Option<Vec<ModelId>>,
    pub revealed_models: Vec<RevealedModel>,
    pub rating_updates: Vec<RatingUpdate>,
}

/// One leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub model_id: ModelId,
    pub display_name: String,
    pub elo_rating: f64,
    pub battles_fought: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub win_rate: f64,
}

/// Orchestrates battles over the store, fetcher, and rating engine.
#[derive(Clone)]
pub struct BattleController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    store: SharedArenaStore,
    registry: Arc<AdapterRegistry>,
    fetcher: ResponseFetcher,
    rating: RatingEngine,
    events: SharedEventBus,
    retry: RetryPolicy,
    config: ArenaConfig,
}

impl BattleController {
    /// Build a controller whose backends come from `config.adapters`.
    pub fn new(
        store: SharedArenaStore,
        events: SharedEventBus,
        config: ArenaConfig,
    ) -> ArenaResult<Self> {
        let registry = AdapterRegistry::from_specs(&config.adapters, config.response_timeout)
            .map_err(|e| ArenaError::InvalidInput(e.to_string()))?;
        Ok(Self::with_registry(store, events, registry.shared(), config))
    }

    /// Build a controller over an already-assembled registry.
    pub fn with_registry(
        store: SharedArenaStore,
        events: SharedEventBus,
        registry: Arc<AdapterRegistry>,
        config: ArenaConfig,
    ) -> Self {
        let fetcher = ResponseFetcher::new(config.response_timeout);
        let rating = RatingEngine::new(store.clone(), config.elo_k_factor, config.default_rating);
        Self {
            inner: Arc::new(ControllerInner {
                store,
                registry,
                fetcher,
                rating,
                events,
                retry: RetryPolicy::default(),
                config,
            }),
        }
    }

    /// The adapter roster.
    pub fn registry(&self) -> &AdapterRegistry {
        &self.inner.registry
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Create a battle, open round 1, and kick off the response fetch in
    /// the background. The handle carries no model identities.
    pub async fn start_battle(
        &self,
        origin_session_id: &str,
        prompt: &str,
    ) -> ArenaResult<BattleHandle> {
        let inner = &self.inner;

        if prompt.trim().is_empty() {
            return Err(ArenaError::InvalidInput("prompt is empty".to_string()));
        }

        let mut pool = inner.registry.model_ids();
        if pool.len() < 2 {
            return Err(ArenaError::InvalidInput(format!(
                "model pool needs at least two models, got {}",
                pool.len()
            )));
        }
        if inner.config.shuffle_pool {
            pool.shuffle(&mut rand::thread_rng());
        }

        let mut session =
            BattleSession::new(origin_session_id, prompt, pool, inner.config.retention);
        tournament::open_first_round(&mut session)?;

        inner
            .retry
            .run("insert_battle", || inner.store.insert_battle(&session))
            .await?;

        inner.events.publish(ArenaEvent::BattleStarted {
            battle_id: session.battle_id.clone(),
            origin_session_id: session.origin_session_id.clone(),
            pool_size: session.model_pool.len(),
            timestamp: Utc::now(),
        });

        info!(
            battle_id = %session.battle_id,
            pool = session.model_pool.len(),
            "Battle started"
        );

        self.spawn_fetch(session.battle_id.clone());

        Ok(BattleHandle {
            battle_id: session.battle_id,
            round_number: 1,
            status: BattleStatus::AwaitingResponses,
        })
    }

    /// Fetch responses for the active round. Idempotent: a round that has
    /// already reached `awaiting_vote` is a no-op, and a stale outcome
    /// (another worker advanced the battle meanwhile) is discarded.
    pub async fn fetch_responses(&self, battle_id: &str) -> ArenaResult<()> {
        self.inner.fetch_responses(battle_id).await
    }

    /// The active round's responses, identities masked as "A"/"B".
    pub async fn get_responses(&self, battle_id: &str) -> ArenaResult<RoundResponses> {
        let Versioned { value: session, .. } = self.inner.load_battle(battle_id).await?;

        match session.status {
            BattleStatus::AwaitingVote => {}
            BattleStatus::Created | BattleStatus::AwaitingResponses => {
                return Err(ArenaError::NotReady(format!(
                    "responses for battle {} are not available yet",
                    battle_id
                )))
            }
            status => {
                return Err(ArenaError::Conflict(format!(
                    "no active round (status: {})",
                    status
                )))
            }
        }

        let (left, right) = session
            .pair()
            .ok_or_else(|| ArenaError::Conflict("no active pair".to_string()))?;

        Ok(RoundResponses {
            battle_id: session.battle_id.clone(),
            round_number: session.round_number,
            label_a: LABEL_A.to_string(),
            label_b: LABEL_B.to_string(),
            text_a: session.responses.get(left).cloned(),
            text_b: session.responses.get(right).cloned(),
            latency_a: session.latencies.get(left).copied(),
            latency_b: session.latencies.get(right).copied(),
        })
    }

    /// Record the vote for `round_number`, advance the tournament, update
    /// ratings, and reveal the judged pair's identities.
    ///
    /// Exactly-once: the session is replaced under compare-and-set, so of
    /// two concurrent votes for the same round precisely one succeeds and
    /// the other gets `conflict`. Votes tagged with a stale round number
    /// are rejected the same way.
    pub async fn submit_vote(
        &self,
        battle_id: &str,
        round_number: u32,
        choice: VoteChoice,
    ) -> ArenaResult<VoteOutcome> {
        let inner = &self.inner;

        let Versioned {
            value: mut session,
            version,
        } = inner.load_battle(battle_id).await?;

        if session.round_number != round_number {
            return Err(ArenaError::Conflict(format!(
                "vote is for round {}, battle is on round {}",
                round_number, session.round_number
            )));
        }
        match session.status {
            BattleStatus::AwaitingVote => {}
            BattleStatus::Created | BattleStatus::AwaitingResponses => {
                return Err(ArenaError::NotReady(format!(
                    "responses for battle {} are not available yet",
                    battle_id
                )))
            }
            status => {
                return Err(ArenaError::Conflict(format!(
                    "battle accepts no more votes (status: {})",
                    status
                )))
            }
        }

        let (left, right) = session
            .pair()
            .map(|(l, r)| (l.to_string(), r.to_string()))
            .ok_or_else(|| ArenaError::Conflict("no active pair".to_string()))?;

        inner.check_votable_sides(&session, &left, &right, choice)?;

        let resolution = tournament::apply_vote(&mut session, choice)?;

        // The compare-and-set that consumes the vote. A conflict here means
        // another worker's vote won the race; it passes through untouched.
        inner
            .retry
            .run("update_battle", || {
                inner.store.update_battle(&session, version)
            })
            .await?;

        inner.events.publish(ArenaEvent::VoteRecorded {
            battle_id: session.battle_id.clone(),
            round_number: resolution.judged_round,
            choice,
            eliminated: resolution.eliminated.clone(),
            timestamp: Utc::now(),
        });

        // Ratings move only after the vote is durably consumed, so a lost
        // race can never double-apply a match.
        let left_name = inner.registry.display_name(&left);
        let right_name = inner.registry.display_name(&right);
        let rating_updates = inner
            .rating
            .apply_round((&left, &left_name), (&right, &right_name), choice)
            .map_err(|e| {
                error!(battle_id, "Rating update failed after vote: {}", e);
                ArenaError::StorageUnavailable(e.to_string())
            })?;

        inner.events.publish(ArenaEvent::RatingsUpdated {
            battle_id: session.battle_id.clone(),
            round_number: resolution.judged_round,
            updates: rating_updates.clone(),
            timestamp: Utc::now(),
        });

        let revealed_models = vec![
            RevealedModel {
                label: LABEL_A.to_string(),
                model_id: left.clone(),
                display_name: left_name,
            },
            RevealedModel {
                label: LABEL_B.to_string(),
                model_id: right.clone(),
                display_name: right_name,
            },
        ];

        let outcome = match resolution.advance {
            RoundAdvance::NextRound { pair } => {
                info!(
                    battle_id,
                    round = resolution.judged_round,
                    %choice,
                    "Vote recorded, next round opened"
                );

                self.spawn_fetch(session.battle_id.clone());

                VoteOutcome {
                    battle_id: session.battle_id.clone(),
                    judged_round: resolution.judged_round,
                    status: VoteDisposition::Continue,
                    eliminated: resolution.eliminated,
                    next_pair: Some(pair),
                    winner: None,
                    final_ranking: None,
                    revealed_models,
                    rating_updates,
                }
            }
            RoundAdvance::Completed {
                winner,
                final_ranking,
            } => {
                inner.events.publish(ArenaEvent::BattleCompleted {
                    battle_id: session.battle_id.clone(),
                    winner: winner.clone(),
                    rounds: resolution.judged_round,
                    timestamp: Utc::now(),
                });

                info!(
                    battle_id,
                    winner = winner.as_deref().unwrap_or("none"),
                    rounds = resolution.judged_round,
                    "Battle completed"
                );

                VoteOutcome {
                    battle_id: session.battle_id.clone(),
                    judged_round: resolution.judged_round,
                    status: VoteDisposition::Completed,
                    eliminated: resolution.eliminated,
                    next_pair: None,
                    winner,
                    final_ranking: Some(final_ranking),
                    revealed_models,
                    rating_updates,
                }
            }
        };

        Ok(outcome)
    }

    /// All known model ratings, best first.
    pub async fn get_leaderboard(&self) -> ArenaResult<Vec<LeaderboardEntry>> {
        let inner = &self.inner;
        let mut ratings = inner
            .retry
            .run("list_ratings", || inner.store.list_ratings())
            .await?;

        ratings.sort_by(|a, b| b.elo_rating.total_cmp(&a.elo_rating));

        Ok(ratings
            .into_iter()
            .map(|r| LeaderboardEntry {
                win_rate: r.win_rate(),
                model_id: r.model_id,
                display_name: r.display_name,
                elo_rating: r.elo_rating,
                battles_fought: r.battles_fought,
                wins: r.wins,
                losses: r.losses,
                ties: r.ties,
            })
            .collect())
    }

    /// Mark an in-flight battle failed without touching ratings. Used by
    /// the owning session's cleanup path. Idempotent on terminal battles.
    pub async fn abandon_battle(&self, battle_id: &str) -> ArenaResult<()> {
        self.inner.fail_battle(battle_id, "abandoned by owner").await
    }

    /// Evict expired battles eagerly, publishing an event per eviction.
    pub async fn sweep_expired(&self) -> ArenaResult<Vec<BattleId>> {
        let inner = &self.inner;
        let gone = inner
            .retry
            .run("sweep_expired", || inner.store.sweep_expired())
            .await?;

        for battle_id in &gone {
            inner.events.publish(ArenaEvent::BattleExpired {
                battle_id: battle_id.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(gone)
    }

    /// Fire the bounded background fetch for a battle's active round.
    fn spawn_fetch(&self, battle_id: BattleId) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_background_fetch(&battle_id).await;
        });
    }
}

impl ControllerInner {
    async fn load_battle(&self, battle_id: &str) -> ArenaResult<Versioned<BattleSession>> {
        self.retry
            .run("get_battle", || self.store.get_battle(battle_id))
            .await?
            .ok_or_else(|| ArenaError::NotFound(battle_id.to_string()))
    }

    async fn fetch_responses(&self, battle_id: &str) -> ArenaResult<()> {
        let Versioned { value: session, .. } = self.load_battle(battle_id).await?;

        match session.status {
            BattleStatus::AwaitingVote => return Ok(()),
            BattleStatus::AwaitingResponses => {}
            status => {
                return Err(ArenaError::Conflict(format!(
                    "battle is not awaiting responses (status: {})",
                    status
                )))
            }
        }

        let (left, right) = session
            .pair()
            .map(|(l, r)| (l.to_string(), r.to_string()))
            .ok_or_else(|| ArenaError::Conflict("no active pair".to_string()))?;

        let outcome = self
            .fetcher
            .fetch_pair(
                &self.registry,
                &session.prompt,
                &self.config.generation,
                (&left, &right),
                session.round_number,
            )
            .await;

        self.record_outcome(battle_id, &outcome).await
    }

    /// Drive the fetch for the active round with a bounded attempt budget;
    /// exhausting it marks the battle failed.
    async fn run_background_fetch(&self, battle_id: &str) {
        for attempt in 1..=self.config.fetch_attempts.max(1) {
            match self.fetch_responses(battle_id).await {
                Ok(()) => return,
                Err(ArenaError::Timeout(msg)) => {
                    warn!(battle_id, attempt, "Fetch produced nothing usable: {}", msg);
                }
                Err(err) => {
                    // The battle moved on (vote landed, expired, abandoned)
                    // or storage is down; either way this task is done.
                    debug!(battle_id, "Background fetch stopped: {}", err);
                    return;
                }
            }
        }

        if let Err(err) = self
            .fail_battle(battle_id, "no usable responses after exhausting retries")
            .await
        {
            warn!(battle_id, "Could not mark battle failed: {}", err);
        }
    }

    /// Merge a fetch outcome into the session it was launched for. Late
    /// outcomes — the battle advanced or restarted meanwhile — are
    /// discarded without error.
    async fn record_outcome(&self, battle_id: &str, outcome: &PairOutcome) -> ArenaResult<()> {
        loop {
            let Versioned {
                value: mut session,
                version,
            } = self.load_battle(battle_id).await?;

            if session.round_number != outcome.round_number
                || session.status != BattleStatus::AwaitingResponses
            {
                debug!(
                    battle_id,
                    fetched_round = outcome.round_number,
                    current_round = session.round_number,
                    "Discarding stale fetch outcome"
                );
                return Ok(());
            }

            let usable: Vec<(ModelId, String, u64)> = outcome
                .sides()
                .iter()
                .filter_map(|side| {
                    side.outcome.as_ref().ok().map(|generation| {
                        (
                            side.model_id.clone(),
                            generation.text.clone(),
                            generation.latency_ms,
                        )
                    })
                })
                .collect();

            if usable.is_empty() {
                self.events.publish(ArenaEvent::FetchFailed {
                    battle_id: session.battle_id.clone(),
                    round_number: outcome.round_number,
                    timestamp: Utc::now(),
                });
                return Err(ArenaError::Timeout(format!(
                    "no usable response for round {}",
                    outcome.round_number
                )));
            }

            let usable_count = usable.len();
            let degraded = outcome.is_degraded();
            tournament::record_responses(&mut session, outcome.round_number, usable)?;

            match self
                .retry
                .run("update_battle", || {
                    self.store.update_battle(&session, version)
                })
                .await
            {
                Ok(_) => {
                    self.events.publish(ArenaEvent::ResponsesFetched {
                        battle_id: session.battle_id.clone(),
                        round_number: outcome.round_number,
                        usable: usable_count,
                        degraded,
                        timestamp: Utc::now(),
                    });
                    return Ok(());
                }
                // Raced another writer; reload and re-check the round.
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn check_votable_sides(
        &self,
        session: &BattleSession,
        left: &str,
        right: &str,
        choice: VoteChoice,
    ) -> ArenaResult<()> {
        let has_left = session.responses.contains_key(left);
        let has_right = session.responses.contains_key(right);

        let valid = match choice {
            VoteChoice::Left => has_left,
            VoteChoice::Right => has_right,
            VoteChoice::Tie | VoteChoice::BothBad => has_left && has_right,
        };

        if valid {
            Ok(())
        } else {
            Err(ArenaError::InvalidInput(format!(
                "cannot vote {} for round {}: the required response is unavailable",
                choice, session.round_number
            )))
        }
    }

    async fn fail_battle(&self, battle_id: &str, reason: &str) -> ArenaResult<()> {
        loop {
            let Versioned {
                value: mut session,
                version,
            } = self.load_battle(battle_id).await?;

            if session.status.is_terminal() {
                return Ok(());
            }

            tournament::mark_failed(&mut session)?;

            match self
                .retry
                .run("update_battle", || {
                    self.store.update_battle(&session, version)
                })
                .await
            {
                Ok(_) => {
                    self.events.publish(ArenaEvent::BattleFailed {
                        battle_id: battle_id.to_string(),
                        reason: reason.to_string(),
                        timestamp: Utc::now(),
                    });
                    warn!(battle_id, reason, "Battle failed");
                    return Ok(());
                }
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}
