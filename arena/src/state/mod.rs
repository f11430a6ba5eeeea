//! Battle-session and skill-rating persistence.
//!
//! Request handlers share no memory; these stores are the single source of
//! truth for every in-flight tournament and every model's rating. The
//! module splits into:
//!
//! - `types`: the persisted records (`BattleSession`, `ModelRating`)
//! - `schema`: key namespaces shared by all backends
//! - `store`: the `ArenaStore` contract (compare-and-set battle updates,
//!   serialized rating read-modify-write, lazy TTL expiry)
//! - `memory`: in-process implementation for tests and single-node runs
//! - `rocks`: RocksDB implementation behind the `durable-store` feature

pub mod memory;
#[cfg(feature = "durable-store")]
pub mod rocks;
pub mod schema;
pub mod store;
pub mod types;

pub use memory::MemoryStore;
#[cfg(feature = "durable-store")]
pub use rocks::RocksStore;
pub use store::{ArenaStore, SharedArenaStore, StoreError, StoreResult, Versioned};
pub use types::{BattleId, BattleSession, BattleStatus, ModelId, ModelRating, VoteChoice};
