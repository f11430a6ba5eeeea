//! In-process store implementation.
//!
//! Backs tests and single-node deployments. The same trait contract as the
//! durable store: conditional battle writes, serialized rating updates,
//! lazy expiry. All maps sit behind plain mutexes — every conditional
//! update compares and replaces under the same lock, which is what makes
//! the compare-and-set atomic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::store::{expired_now, ArenaStore, StoreError, StoreResult, Versioned};
use super::types::{BattleSession, ModelRating};

/// Mutex-guarded hash-map store.
#[derive(Default)]
pub struct MemoryStore {
    battles: Mutex<HashMap<String, (u64, BattleSession)>>,
    ratings: Mutex<HashMap<String, ModelRating>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl ArenaStore for MemoryStore {
    fn get_battle(&self, battle_id: &str) -> StoreResult<Option<Versioned<BattleSession>>> {
        let mut battles = self.battles.lock().map_err(|_| StoreError::LockPoisoned)?;

        match battles.get(battle_id) {
            Some((_, session)) if expired_now(session) => {
                battles.remove(battle_id);
                Ok(None)
            }
            Some((version, session)) => Ok(Some(Versioned {
                value: session.clone(),
                version: *version,
            })),
            None => Ok(None),
        }
    }

    fn insert_battle(&self, session: &BattleSession) -> StoreResult<u64> {
        let mut battles = self.battles.lock().map_err(|_| StoreError::LockPoisoned)?;

        if let Some((version, _)) = battles.get(&session.battle_id) {
            return Err(StoreError::VersionConflict {
                key: session.battle_id.clone(),
                expected: 0,
                found: *version,
            });
        }

        battles.insert(session.battle_id.clone(), (1, session.clone()));
        Ok(1)
    }

    fn update_battle(&self, session: &BattleSession, expected_version: u64) -> StoreResult<u64> {
        let mut battles = self.battles.lock().map_err(|_| StoreError::LockPoisoned)?;

        let entry = battles
            .get_mut(&session.battle_id)
            .ok_or_else(|| StoreError::Backend(format!("unknown battle {}", session.battle_id)))?;

        if entry.0 != expected_version {
            return Err(StoreError::VersionConflict {
                key: session.battle_id.clone(),
                expected: expected_version,
                found: entry.0,
            });
        }

        entry.0 += 1;
        entry.1 = session.clone();
        Ok(entry.0)
    }

    fn delete_battle(&self, battle_id: &str) -> StoreResult<()> {
        let mut battles = self.battles.lock().map_err(|_| StoreError::LockPoisoned)?;
        battles.remove(battle_id);
        Ok(())
    }

    fn sweep_expired(&self) -> StoreResult<Vec<String>> {
        let mut battles = self.battles.lock().map_err(|_| StoreError::LockPoisoned)?;

        let gone: Vec<String> = battles
            .iter()
            .filter(|(_, (_, session))| expired_now(session))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &gone {
            battles.remove(id);
        }
        Ok(gone)
    }

    fn get_rating(&self, model_id: &str) -> StoreResult<Option<ModelRating>> {
        let ratings = self.ratings.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(ratings.get(model_id).cloned())
    }

    fn update_rating(
        &self,
        model_id: &str,
        display_name: &str,
        default_rating: f64,
        apply: &mut dyn FnMut(&mut ModelRating),
    ) -> StoreResult<ModelRating> {
        let mut ratings = self.ratings.lock().map_err(|_| StoreError::LockPoisoned)?;

        let record = ratings
            .entry(model_id.to_string())
            .or_insert_with(|| ModelRating::new(model_id, display_name, default_rating));

        apply(record);
        record.last_updated = Utc::now();
        Ok(record.clone())
    }

    fn list_ratings(&self) -> StoreResult<Vec<ModelRating>> {
        let ratings = self.ratings.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(ratings.values().cloned().collect())
    }
}
