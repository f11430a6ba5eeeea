//! Store contract shared by all request-handling processes.
//!
//! The battle store is the only coordination point between stateless
//! workers, so its write path is conditional: battle updates carry the
//! version the writer read, and a mismatch is a [`StoreError::VersionConflict`]
//! rather than a lost update. Rating updates are serialized read-modify-write
//! per key for the same reason.
//!
//! Expiry is lazy: a session read past its `expires_at` is evicted and
//! reported as absent. [`ArenaStore::sweep_expired`] additionally evicts
//! eagerly for stores that can iterate.

use std::sync::Arc;

use chrono::Utc;

use super::types::{BattleSession, ModelRating};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict for {key}: expected {expected}, found {found}")]
    VersionConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether a bounded retry is worth attempting. Version conflicts are
    /// the exactly-once signal and must never be retried blindly.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::LockPoisoned)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a store implementation.
pub type SharedArenaStore = Arc<dyn ArenaStore>;

/// A stored value together with the version stamp its writer must present
/// to update it.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Durable battle-session and skill-rating storage.
///
/// Implementations must uphold two guarantees:
///
/// 1. `update_battle` succeeds for exactly one writer per version — two
///    concurrent writers presenting the same `expected_version` cannot both
///    win.
/// 2. `update_rating` serializes the read-modify-write per model key, so
///    concurrent battles concluding matches for the same model never lose
///    an update.
pub trait ArenaStore: Send + Sync {
    /// Fetch a battle. Expired sessions are evicted and reported as `None`.
    fn get_battle(&self, battle_id: &str) -> StoreResult<Option<Versioned<BattleSession>>>;

    /// Persist a new battle. Returns the initial version stamp.
    fn insert_battle(&self, session: &BattleSession) -> StoreResult<u64>;

    /// Conditionally replace a battle. Succeeds only if the stored version
    /// still equals `expected_version`; returns the new version.
    fn update_battle(&self, session: &BattleSession, expected_version: u64) -> StoreResult<u64>;

    /// Remove a battle unconditionally.
    fn delete_battle(&self, battle_id: &str) -> StoreResult<()>;

    /// Evict all expired battles, returning the ids removed.
    fn sweep_expired(&self) -> StoreResult<Vec<String>>;

    /// Fetch a rating record, if the model has ever been referenced.
    fn get_rating(&self, model_id: &str) -> StoreResult<Option<ModelRating>>;

    /// Atomically mutate a model's rating record, creating it at
    /// `default_rating` on first reference. The closure runs under the
    /// store's per-key serialization. Returns the record after the update.
    fn update_rating(
        &self,
        model_id: &str,
        display_name: &str,
        default_rating: f64,
        apply: &mut dyn FnMut(&mut ModelRating),
    ) -> StoreResult<ModelRating>;

    /// All known rating records, unordered.
    fn list_ratings(&self) -> StoreResult<Vec<ModelRating>>;
}

/// Shared lazy-expiry check used by implementations.
pub(crate) fn expired_now(session: &BattleSession) -> bool {
    session.is_expired(Utc::now())
}
