//! Event-driven observability for battles.
//!
//! The controller publishes an [`ArenaEvent`] for every externally
//! observable transition; interested consumers subscribe through the
//! broadcast [`EventBus`]. Events are advisory — the stores stay the
//! single source of truth.

pub mod bus;
pub mod types;

pub use bus::{EventBus, SharedEventBus};
pub use types::ArenaEvent;
