//! Battle lifecycle events.
//!
//! Every externally observable transition publishes one of these. They are
//! observability, not state: the stores remain the source of truth and
//! losing an event never corrupts a battle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rating::RatingUpdate;
use crate::state::{BattleId, ModelId, VoteChoice};

/// All battle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArenaEvent {
    /// A battle was created and its first round opened.
    BattleStarted {
        battle_id: BattleId,
        origin_session_id: String,
        pool_size: usize,
        timestamp: DateTime<Utc>,
    },

    /// A round's responses arrived (possibly one-sided).
    ResponsesFetched {
        battle_id: BattleId,
        round_number: u32,
        usable: usize,
        degraded: bool,
        timestamp: DateTime<Utc>,
    },

    /// A fetch produced nothing usable for the round.
    FetchFailed {
        battle_id: BattleId,
        round_number: u32,
        timestamp: DateTime<Utc>,
    },

    /// A vote was recorded and the tournament advanced.
    VoteRecorded {
        battle_id: BattleId,
        round_number: u32,
        choice: VoteChoice,
        eliminated: Vec<ModelId>,
        timestamp: DateTime<Utc>,
    },

    /// The tournament reached its end.
    BattleCompleted {
        battle_id: BattleId,
        winner: Option<ModelId>,
        rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// The battle was marked failed.
    BattleFailed {
        battle_id: BattleId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The battle expired and was evicted.
    BattleExpired {
        battle_id: BattleId,
        timestamp: DateTime<Utc>,
    },

    /// Ratings changed after a resolved round.
    RatingsUpdated {
        battle_id: BattleId,
        round_number: u32,
        updates: Vec<RatingUpdate>,
        timestamp: DateTime<Utc>,
    },
}

impl ArenaEvent {
    /// Short tag for logging and filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BattleStarted { .. } => "battle_started",
            Self::ResponsesFetched { .. } => "responses_fetched",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::VoteRecorded { .. } => "vote_recorded",
            Self::BattleCompleted { .. } => "battle_completed",
            Self::BattleFailed { .. } => "battle_failed",
            Self::BattleExpired { .. } => "battle_expired",
            Self::RatingsUpdated { .. } => "ratings_updated",
        }
    }

    /// The battle this event belongs to.
    pub fn battle_id(&self) -> &str {
        match self {
            Self::BattleStarted { battle_id, .. }
            | Self::ResponsesFetched { battle_id, .. }
            | Self::FetchFailed { battle_id, .. }
            | Self::VoteRecorded { battle_id, .. }
            | Self::BattleCompleted { battle_id, .. }
            | Self::BattleFailed { battle_id, .. }
            | Self::BattleExpired { battle_id, .. }
            | Self::RatingsUpdated { battle_id, .. } => battle_id,
        }
    }

    /// When the event was produced.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::BattleStarted { timestamp, .. }
            | Self::ResponsesFetched { timestamp, .. }
            | Self::FetchFailed { timestamp, .. }
            | Self::VoteRecorded { timestamp, .. }
            | Self::BattleCompleted { timestamp, .. }
            | Self::BattleFailed { timestamp, .. }
            | Self::BattleExpired { timestamp, .. }
            | Self::RatingsUpdated { timestamp, .. } => *timestamp,
        }
    }
}
