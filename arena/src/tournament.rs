//! Progressive-elimination state machine.
//!
//! Pure functions over a [`BattleSession`] — no I/O anywhere in this
//! module. The controller loads a session, applies a transition here, and
//! persists the result under compare-and-set.
//!
//! The transition graph:
//!
//! ```text
//! created → awaiting_responses → awaiting_vote → advancing ─┬→ awaiting_responses
//!                                                           └→ completed
//! any non-terminal → failed | expired
//! ```
//!
//! Deterministic rules fixed by this implementation:
//! - A tie retains the model earlier in `model_pool` order; the later model
//!   is eliminated.
//! - An eliminated model leaves `winner_chain`.
//! - `both_bad` eliminates both sides. With two or more untested models
//!   left, the next two (pool order) pair up; with exactly one left it wins
//!   by default; with none left the battle completes with no winner.
//! - Final ranking is `winner_chain` reversed, then `eliminated` in
//!   reverse elimination order.

use serde::{Deserialize, Serialize};

use crate::state::{BattleSession, BattleStatus, ModelId, VoteChoice};

/// Error type for tournament transitions.
#[derive(Debug, thiserror::Error)]
pub enum TournamentError {
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: BattleStatus,
        to: BattleStatus,
    },

    #[error("battle is not awaiting a vote (status: {0})")]
    NotAwaitingVote(BattleStatus),

    #[error("battle is not awaiting responses (status: {0})")]
    NotAwaitingResponses(BattleStatus),

    #[error("model pool needs at least two models, got {0}")]
    PoolTooSmall(usize),

    #[error("no active pair")]
    NoActivePair,

    #[error("responses are for round {got}, battle is on round {expected}")]
    RoundMismatch { expected: u32, got: u32 },

    #[error("{model} is not part of the active pair")]
    NotInPair { model: ModelId },

    #[error("a round needs at least one usable response")]
    NoUsableResponses,
}

/// Result type for tournament transitions.
pub type TournamentResult<T> = Result<T, TournamentError>;

/// What happens after a vote is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RoundAdvance {
    /// The tournament continues with a new pairing.
    NextRound { pair: [ModelId; 2] },
    /// The tournament is over.
    Completed {
        winner: Option<ModelId>,
        final_ranking: Vec<ModelId>,
    },
}

/// Outcome of applying one vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResolution {
    /// The round the vote judged.
    pub judged_round: u32,
    /// Models eliminated by this vote, in elimination order.
    pub eliminated: Vec<ModelId>,
    /// How the tournament proceeds.
    pub advance: RoundAdvance,
}

/// Whether the edge `from → to` exists in the transition graph.
pub fn legal_transition(from: BattleStatus, to: BattleStatus) -> bool {
    use BattleStatus::*;

    // Any non-terminal state may fail or expire.
    if matches!(to, Failed | Expired) && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Created, AwaitingResponses)
            | (AwaitingResponses, AwaitingVote)
            | (AwaitingVote, Advancing)
            | (Advancing, AwaitingResponses)
            | (Advancing, Completed)
    )
}

/// Move the session to `to`, enforcing the transition graph.
fn advance(session: &mut BattleSession, to: BattleStatus) -> TournamentResult<()> {
    if !legal_transition(session.status, to) {
        return Err(TournamentError::IllegalTransition {
            from: session.status,
            to,
        });
    }
    session.status = to;
    session.touch();
    Ok(())
}

/// Open round 1: pair the first two pool entries and start fetching.
pub fn open_first_round(session: &mut BattleSession) -> TournamentResult<[ModelId; 2]> {
    if session.model_pool.len() < 2 {
        return Err(TournamentError::PoolTooSmall(session.model_pool.len()));
    }

    let pair = [session.model_pool[0].clone(), session.model_pool[1].clone()];
    session.current_pair = pair.to_vec();
    advance(session, BattleStatus::AwaitingResponses)?;
    Ok(pair)
}

/// Record fetched responses for the active round and move to voting.
///
/// `responses` holds `(model, text, latency_ms)` for each usable side; an
/// unavailable side is simply absent. Responses for a different round are a
/// [`TournamentError::RoundMismatch`] — the caller discards those.
pub fn record_responses(
    session: &mut BattleSession,
    round_number: u32,
    responses: Vec<(ModelId, String, u64)>,
) -> TournamentResult<()> {
    if session.status != BattleStatus::AwaitingResponses {
        return Err(TournamentError::NotAwaitingResponses(session.status));
    }
    if session.round_number != round_number {
        return Err(TournamentError::RoundMismatch {
            expected: session.round_number,
            got: round_number,
        });
    }
    if responses.is_empty() {
        return Err(TournamentError::NoUsableResponses);
    }
    for (model, _, _) in &responses {
        if !session.current_pair.contains(model) {
            return Err(TournamentError::NotInPair {
                model: model.clone(),
            });
        }
    }

    for (model, text, latency_ms) in responses {
        session.latencies.insert(model.clone(), latency_ms);
        session.responses.insert(model, text);
    }
    advance(session, BattleStatus::AwaitingVote)
}

/// Apply one vote: eliminate, update the winner chain, and either open the
/// next round or complete the tournament.
pub fn apply_vote(
    session: &mut BattleSession,
    choice: VoteChoice,
) -> TournamentResult<VoteResolution> {
    if session.status != BattleStatus::AwaitingVote {
        return Err(TournamentError::NotAwaitingVote(session.status));
    }
    let (left, right) = match session.pair() {
        Some((l, r)) => (l.to_string(), r.to_string()),
        None => return Err(TournamentError::NoActivePair),
    };

    let judged_round = session.round_number;

    let (retained, eliminated_now) = match choice {
        VoteChoice::Left => (Some(left.clone()), vec![right.clone()]),
        VoteChoice::Right => (Some(right.clone()), vec![left.clone()]),
        VoteChoice::Tie => {
            // Stable tie-break: retain the model earlier in pool order.
            let left_pos = pool_position(session, &left);
            let right_pos = pool_position(session, &right);
            if left_pos <= right_pos {
                (Some(left.clone()), vec![right.clone()])
            } else {
                (Some(right.clone()), vec![left.clone()])
            }
        }
        VoteChoice::BothBad => (None, vec![left.clone(), right.clone()]),
    };

    advance(session, BattleStatus::Advancing)?;
    session.revealed = true;

    for model in &eliminated_now {
        if !session.eliminated.contains(model) {
            session.eliminated.push(model.clone());
        }
        session.winner_chain.retain(|m| m != model);
    }
    if let Some(model) = &retained {
        if !session.winner_chain.contains(model) {
            session.winner_chain.push(model.clone());
        }
    }

    let untested = session.untested();
    let champion = session.champion().cloned();

    let advance_to = match (champion, untested.as_slice()) {
        // Champion meets the next challenger.
        (Some(champ), [next, ..]) => {
            let pair = [champ, next.clone()];
            open_next_round(session, pair.clone())?;
            RoundAdvance::NextRound { pair }
        }
        // Both sides were rejected; restart among the untested.
        (None, [first, second, ..]) => {
            let pair = [first.clone(), second.clone()];
            open_next_round(session, pair.clone())?;
            RoundAdvance::NextRound { pair }
        }
        // Both sides rejected and a single untested model remains: it is
        // the last model standing.
        (None, [survivor]) => {
            session.winner_chain.push(survivor.clone());
            complete(session)?;
            RoundAdvance::Completed {
                winner: Some(survivor.clone()),
                final_ranking: final_ranking(session),
            }
        }
        // Nothing left to compare.
        (champion, []) => {
            complete(session)?;
            RoundAdvance::Completed {
                winner: champion,
                final_ranking: final_ranking(session),
            }
        }
    };

    Ok(VoteResolution {
        judged_round,
        eliminated: eliminated_now,
        advance: advance_to,
    })
}

/// Mark an in-flight battle failed (fetch budget exhausted or abandoned).
pub fn mark_failed(session: &mut BattleSession) -> TournamentResult<()> {
    advance(session, BattleStatus::Failed)
}

/// Mark a battle expired on a time-based sweep.
pub fn mark_expired(session: &mut BattleSession) -> TournamentResult<()> {
    advance(session, BattleStatus::Expired)
}

/// Final ranking: winner chain reversed, then eliminations most recent
/// first.
pub fn final_ranking(session: &BattleSession) -> Vec<ModelId> {
    session
        .winner_chain
        .iter()
        .rev()
        .chain(session.eliminated.iter().rev())
        .cloned()
        .collect()
}

fn pool_position(session: &BattleSession, model: &str) -> usize {
    session
        .model_pool
        .iter()
        .position(|m| m == model)
        .unwrap_or(usize::MAX)
}

fn open_next_round(session: &mut BattleSession, pair: [ModelId; 2]) -> TournamentResult<()> {
    session.current_pair = pair.to_vec();
    session.responses.clear();
    session.latencies.clear();
    session.revealed = false;
    session.round_number += 1;
    advance(session, BattleStatus::AwaitingResponses)
}

fn complete(session: &mut BattleSession) -> TournamentResult<()> {
    session.current_pair.clear();
    advance(session, BattleStatus::Completed)
}
