//! Persistent battle and rating records.
//!
//! These types are the storage schema shared by every request-handling
//! process; the stores in this module's siblings are their single source of
//! truth. Sessions are mutated only through [`crate::controller`] operations
//! and become immutable once they reach a terminal status.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a battle (tournament instance).
pub type BattleId = String;

/// Arena-wide model identifier. The pool is open — participants are chosen
/// by configuration, not a closed enum.
pub type ModelId = String;

/// Lifecycle of a battle session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    /// Session constructed, no round opened yet.
    Created,
    /// A round is open and backend responses are being fetched.
    AwaitingResponses,
    /// Both (or at least one) responses arrived; waiting for the human vote.
    AwaitingVote,
    /// A vote is being applied; transient, never persisted between requests.
    Advancing,
    /// Tournament finished — terminal.
    Completed,
    /// Session outlived its retention window — terminal.
    Expired,
    /// Fetching exhausted its retry budget or the owner abandoned — terminal.
    Failed,
}

impl BattleStatus {
    /// Whether this is a terminal status (session immutable except expiry).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Failed)
    }
}

impl std::fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::AwaitingResponses => write!(f, "awaiting_responses"),
            Self::AwaitingVote => write!(f, "awaiting_vote"),
            Self::Advancing => write!(f, "advancing"),
            Self::Completed => write!(f, "completed"),
            Self::Expired => write!(f, "expired"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The human verdict on one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    /// The left (label "A") response is better.
    Left,
    /// The right (label "B") response is better.
    Right,
    /// Both are equally good.
    Tie,
    /// Neither is acceptable.
    BothBad,
}

impl std::fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Tie => write!(f, "tie"),
            Self::BothBad => write!(f, "both_bad"),
        }
    }
}

/// One tournament instance judging a single prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleSession {
    /// Caller-visible unique identifier.
    pub battle_id: BattleId,

    /// Owning conversational session, for scoping and cleanup only.
    pub origin_session_id: String,

    /// The text being judged. Immutable once created.
    pub prompt: String,

    /// Participants in pairing order, fixed (and shuffled) at creation.
    pub model_pool: Vec<ModelId>,

    /// The two models being compared in the active round; empty when none.
    pub current_pair: Vec<ModelId>,

    /// Generated text per model, for models queried in the current round.
    pub responses: HashMap<ModelId, String>,

    /// Generation latency per model in milliseconds.
    pub latencies: HashMap<ModelId, u64>,

    /// Models removed from contention, in elimination order.
    pub eliminated: Vec<ModelId>,

    /// Models that have won at least one round, most recent last. A chain
    /// member that later loses is removed when it is eliminated.
    pub winner_chain: Vec<ModelId>,

    /// Active round, starting at 1.
    pub round_number: u32,

    /// Current lifecycle status.
    pub status: BattleStatus,

    /// True only after a vote has been recorded for the current round.
    pub revealed: bool,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,

    /// Sessions past this instant are treated as gone.
    pub expires_at: DateTime<Utc>,
}

impl BattleSession {
    /// Create a session in `created` with the given (already ordered) pool.
    pub fn new(
        origin_session_id: impl Into<String>,
        prompt: impl Into<String>,
        model_pool: Vec<ModelId>,
        retention: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            battle_id: uuid::Uuid::new_v4().to_string(),
            origin_session_id: origin_session_id.into(),
            prompt: prompt.into(),
            model_pool,
            current_pair: Vec::new(),
            responses: HashMap::new(),
            latencies: HashMap::new(),
            eliminated: Vec::new(),
            winner_chain: Vec::new(),
            round_number: 1,
            status: BattleStatus::Created,
            revealed: false,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::hours(1)),
        }
    }

    /// Update the last-activity timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether the retention window has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The active pair as a (left, right) tuple, if a round is open.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match self.current_pair.as_slice() {
            [left, right] => Some((left.as_str(), right.as_str())),
            _ => None,
        }
    }

    /// Models still in contention.
    pub fn survivors(&self) -> Vec<ModelId> {
        self.model_pool
            .iter()
            .filter(|m| !self.eliminated.contains(m))
            .cloned()
            .collect()
    }

    /// Pool members that have not appeared in any round yet. Every model
    /// that has been paired ends up in `eliminated` or `winner_chain`, so
    /// the complement of their union is exactly the untested set.
    pub fn untested(&self) -> Vec<ModelId> {
        self.model_pool
            .iter()
            .filter(|m| !self.eliminated.contains(m) && !self.winner_chain.contains(m))
            .cloned()
            .collect()
    }

    /// The reigning champion, if one exists.
    pub fn champion(&self) -> Option<&ModelId> {
        self.winner_chain.last()
    }

    /// The overall winner once the battle is completed.
    pub fn winner(&self) -> Option<&ModelId> {
        if self.status == BattleStatus::Completed {
            self.champion()
        } else {
            None
        }
    }
}

/// Durable per-model skill record, independent of any battle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRating {
    /// Arena-wide model identifier.
    pub model_id: ModelId,

    /// Human-readable name.
    pub display_name: String,

    /// Elo rating.
    pub elo_rating: f64,

    /// Resolved matches this model took part in (including both-bad rounds).
    pub battles_fought: u32,

    /// Rounds won.
    pub wins: u32,

    /// Rounds lost.
    pub losses: u32,

    /// Rounds tied.
    pub ties: u32,

    /// Last mutation timestamp.
    pub last_updated: DateTime<Utc>,
}

impl ModelRating {
    /// Create a fresh record at the configured default rating.
    pub fn new(model_id: impl Into<String>, display_name: impl Into<String>, default_rating: f64) -> Self {
        Self {
            model_id: model_id.into(),
            display_name: display_name.into(),
            elo_rating: default_rating,
            battles_fought: 0,
            wins: 0,
            losses: 0,
            ties: 0,
            last_updated: Utc::now(),
        }
    }

    /// Fraction of fought battles won; 0.0 before any battle.
    pub fn win_rate(&self) -> f64 {
        if self.battles_fought == 0 {
            0.0
        } else {
            f64::from(self.wins) / f64::from(self.battles_fought)
        }
    }
}
