//! Arena — blind multi-model battle orchestration
//!
//! This library runs progressive elimination tournaments among interchangeable
//! text-generation backends. A battle judges a single prompt: two models are
//! queried concurrently, a human picks the better (anonymized) response, the
//! loser is eliminated, and the winner faces the next challenger until one
//! model is left standing. Every resolved round feeds an Elo skill rating
//! that persists across battles.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │  BattleController  │  start / responses / vote / leaderboard
//! └───┬────────┬───────┘
//!     │        │
//!     │        ▼
//!     │  ┌───────────────┐      ┌───────────────┐
//!     │  │ResponseFetcher│─────▶│ ModelAdapters │  (concurrent, bounded)
//!     │  └───────────────┘      └───────────────┘
//!     ▼
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ tournament │   │ RatingEngine │   │  ArenaStore  │  (CAS, TTL)
//! │ (pure FSM) │   └──────────────┘   └──────────────┘
//! └────────────┘
//! ```
//!
//! The controller is invoked by stateless request handlers with no shared
//! memory; all cross-request coordination goes through the store, whose
//! compare-and-set updates make votes exactly-once and whose serialized
//! rating updates prevent lost Elo deltas between concurrent battles.
//!
//! # Usage
//!
//! ```ignore
//! use arena::{ArenaConfig, AdapterKind, AdapterSpec, BattleController, VoteChoice};
//! use arena::state::MemoryStore;
//! use arena::events::EventBus;
//!
//! let config = ArenaConfig::default()
//!     .with_adapter(AdapterSpec::new(AdapterKind::OpenAiCompat, "qwen", "Qwen 2.5")
//!         .base_url("http://localhost:8081/v1"))
//!     .with_adapter(AdapterSpec::new(AdapterKind::Ollama, "llama", "Llama 3.1")
//!         .base_url("http://localhost:11434"));
//!
//! let controller = BattleController::new(
//!     MemoryStore::new().shared(),
//!     EventBus::new().shared(),
//!     config,
//! )?;
//!
//! let handle = controller.start_battle("chat-session-7", "Explain lifetimes").await?;
//! let round = controller.get_responses(&handle.battle_id).await?;
//! let outcome = controller
//!     .submit_vote(&handle.battle_id, round.round_number, VoteChoice::Left)
//!     .await?;
//! let board = controller.get_leaderboard().await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod adapter;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod rating;
pub mod retry;
pub mod state;
pub mod tournament;

// Re-export the public operation surface
pub use controller::{
    BattleController, BattleHandle, LeaderboardEntry, RevealedModel, RoundResponses,
    VoteDisposition, VoteOutcome,
};
pub use rating::{expected_score, RatingEngine, RatingUpdate};

// Re-export configuration
pub use config::{AdapterKind, AdapterSpec, ArenaConfig, GenerationParams};

// Re-export core state types
pub use state::{
    ArenaStore, BattleId, BattleSession, BattleStatus, MemoryStore, ModelId, ModelRating,
    SharedArenaStore, StoreError, StoreResult, Versioned, VoteChoice,
};

// Re-export adapter seam
pub use adapter::{
    AdapterError, AdapterErrorKind, AdapterRegistry, Generation, ModelAdapter, ScriptedAdapter,
};

// Re-export error taxonomy
pub use error::{ArenaError, ArenaResult};

// Re-export events
pub use events::{ArenaEvent, EventBus, SharedEventBus};
