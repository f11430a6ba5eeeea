//! Error taxonomy of the public operations.
//!
//! Every failure crossing the controller boundary is one of these typed
//! variants — never a generic panic or an untyped string. Adapter failures
//! do not appear here directly: they are absorbed into the round per the
//! fetch policy and only surface as `timeout` when no side responded.

use crate::state::StoreError;
use crate::tournament::TournamentError;

/// Error type for public battle operations.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// Unknown or expired battle id.
    #[error("battle not found: {0}")]
    NotFound(String),

    /// Responses requested before they are available.
    #[error("responses not ready: {0}")]
    NotReady(String),

    /// Duplicate vote, stale round, or an operation racing a newer write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No usable response arrived within the configured bound.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Persistence failed even after bounded retries.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Malformed request (empty prompt, bad vote choice, too few models).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ArenaError {
    /// Stable machine-readable tag for callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotReady(_) => "not_ready",
            Self::Conflict(_) => "conflict",
            Self::Timeout(_) => "timeout",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}

impl From<StoreError> for ArenaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { key, .. } => {
                Self::Conflict(format!("concurrent update on {}", key))
            }
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<TournamentError> for ArenaError {
    fn from(err: TournamentError) -> Self {
        match err {
            TournamentError::PoolTooSmall(n) => {
                Self::InvalidInput(format!("model pool needs at least two models, got {}", n))
            }
            TournamentError::NotAwaitingResponses(status) => {
                Self::Conflict(format!("battle is not awaiting responses (status: {status})"))
            }
            other => Self::Conflict(other.to_string()),
        }
    }
}

/// Result type for public battle operations.
pub type ArenaResult<T> = Result<T, ArenaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ArenaError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(ArenaError::NotReady("x".into()).kind(), "not_ready");
        assert_eq!(ArenaError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(ArenaError::Timeout("x".into()).kind(), "timeout");
        assert_eq!(
            ArenaError::StorageUnavailable("x".into()).kind(),
            "storage_unavailable"
        );
        assert_eq!(ArenaError::InvalidInput("x".into()).kind(), "invalid_input");
    }

    #[test]
    fn version_conflicts_map_to_conflict() {
        let err: ArenaError = StoreError::VersionConflict {
            key: "battle:b1".into(),
            expected: 1,
            found: 2,
        }
        .into();
        assert_eq!(err.kind(), "conflict");

        let err: ArenaError = StoreError::Backend("disk on fire".into()).into();
        assert_eq!(err.kind(), "storage_unavailable");
    }

    #[test]
    fn tournament_errors_map_onto_the_taxonomy() {
        let err: ArenaError = TournamentError::PoolTooSmall(1).into();
        assert_eq!(err.kind(), "invalid_input");

        let err: ArenaError =
            TournamentError::NotAwaitingVote(crate::state::BattleStatus::Completed).into();
        assert_eq!(err.kind(), "conflict");
    }
}
