//! RocksDB-backed store for deployments where battles must survive restarts.
//!
//! Column families separate battles from ratings inside one database. Values
//! are bincode-encoded records carrying their version stamp. RocksDB itself
//! offers no conditional write, so the compare step of every conditional
//! update runs under a single write-path mutex; reads stay lock-free.

use std::path::PathBuf;
use std::sync::Mutex;

use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{Deserialize, Serialize};

use super::schema::{self, ALL_CFS};
use super::store::{expired_now, ArenaStore, StoreError, StoreResult, Versioned};
use super::types::{BattleSession, ModelRating};

/// A battle record with its version stamp, as stored on disk.
#[derive(Serialize, Deserialize)]
struct StoredBattle {
    version: u64,
    session: BattleSession,
}

/// RocksDB-backed persistent store.
pub struct RocksStore {
    db: DB,
    write_lock: Mutex<()>,
    path: PathBuf,
}

impl RocksStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            path,
        })
    }

    /// Create a shared reference to this store.
    pub fn shared(self) -> std::sync::Arc<Self> {
        std::sync::Arc::new(self)
    }

    /// Database path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn cf(&self, name: &str) -> StoreResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family {}", name)))
    }

    fn read_battle(&self, battle_id: &str) -> StoreResult<Option<StoredBattle>> {
        let cf = self.cf(schema::CF_BATTLES)?;
        let key = schema::keys::battle(battle_id);

        match self
            .db
            .get_cf(cf, key.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) => {
                let stored = bincode::deserialize(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }

    fn write_battle(&self, stored: &StoredBattle) -> StoreResult<()> {
        let cf = self.cf(schema::CF_BATTLES)?;
        let key = schema::keys::battle(&stored.session.battle_id);
        let bytes =
            bincode::serialize(stored).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.db
            .put_cf(cf, key.as_bytes(), bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn delete_key(&self, cf_name: &str, key: &str) -> StoreResult<()> {
        let cf = self.cf(cf_name)?;
        self.db
            .delete_cf(cf, key.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

impl ArenaStore for RocksStore {
    fn get_battle(&self, battle_id: &str) -> StoreResult<Option<Versioned<BattleSession>>> {
        match self.read_battle(battle_id)? {
            Some(stored) if expired_now(&stored.session) => {
                self.delete_key(schema::CF_BATTLES, &schema::keys::battle(battle_id))?;
                Ok(None)
            }
            Some(stored) => Ok(Some(Versioned {
                value: stored.session,
                version: stored.version,
            })),
            None => Ok(None),
        }
    }

    fn insert_battle(&self, session: &BattleSession) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        if let Some(existing) = self.read_battle(&session.battle_id)? {
            return Err(StoreError::VersionConflict {
                key: session.battle_id.clone(),
                expected: 0,
                found: existing.version,
            });
        }

        self.write_battle(&StoredBattle {
            version: 1,
            session: session.clone(),
        })?;
        Ok(1)
    }

    fn update_battle(&self, session: &BattleSession, expected_version: u64) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let current = self
            .read_battle(&session.battle_id)?
            .ok_or_else(|| StoreError::Backend(format!("unknown battle {}", session.battle_id)))?;

        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                key: session.battle_id.clone(),
                expected: expected_version,
                found: current.version,
            });
        }

        let next = expected_version + 1;
        self.write_battle(&StoredBattle {
            version: next,
            session: session.clone(),
        })?;
        Ok(next)
    }

    fn delete_battle(&self, battle_id: &str) -> StoreResult<()> {
        self.delete_key(schema::CF_BATTLES, &schema::keys::battle(battle_id))
    }

    fn sweep_expired(&self) -> StoreResult<Vec<String>> {
        let cf = self.cf(schema::CF_BATTLES)?;
        let mut gone = Vec::new();

        for result in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = result.map_err(|e| StoreError::Backend(e.to_string()))?;
            let stored: StoredBattle = bincode::deserialize(&value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            if expired_now(&stored.session) {
                gone.push(stored.session.battle_id.clone());
            }
        }

        for id in &gone {
            self.delete_key(schema::CF_BATTLES, &schema::keys::battle(id))?;
        }
        Ok(gone)
    }

    fn get_rating(&self, model_id: &str) -> StoreResult<Option<ModelRating>> {
        let cf = self.cf(schema::CF_RATINGS)?;
        let key = schema::keys::rating(model_id);

        match self
            .db
            .get_cf(cf, key.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) => {
                let rating = bincode::deserialize(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(rating))
            }
            None => Ok(None),
        }
    }

    fn update_rating(
        &self,
        model_id: &str,
        display_name: &str,
        default_rating: f64,
        apply: &mut dyn FnMut(&mut ModelRating),
    ) -> StoreResult<ModelRating> {
        // Serializes the read-modify-write per process; the store owns the
        // database exclusively, so this is the per-key discipline the
        // rating engine relies on.
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut record = self
            .get_rating(model_id)?
            .unwrap_or_else(|| ModelRating::new(model_id, display_name, default_rating));

        apply(&mut record);
        record.last_updated = chrono::Utc::now();

        let cf = self.cf(schema::CF_RATINGS)?;
        let key = schema::keys::rating(model_id);
        let bytes =
            bincode::serialize(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db
            .put_cf(cf, key.as_bytes(), bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(record)
    }

    fn list_ratings(&self) -> StoreResult<Vec<ModelRating>> {
        let cf = self.cf(schema::CF_RATINGS)?;
        let mut ratings = Vec::new();

        for result in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = result.map_err(|e| StoreError::Backend(e.to_string()))?;
            let rating: ModelRating = bincode::deserialize(&value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            ratings.push(rating);
        }
        Ok(ratings)
    }
}
