//! Elo skill-rating updates.
//!
//! Standard paired-comparison update: expected score
//! `Ea = 1 / (1 + 10^((Rb - Ra) / 400))`, new rating
//! `Ra' = Ra + K * (Sa - Ea)`. Both deltas of a resolved match come from
//! one snapshot of the two ratings, so `ΔRa = -ΔRb` exactly and the match
//! is zero-sum up to rounding.
//!
//! Writes go through the store's serialized per-key read-modify-write: the
//! delta is applied as an increment inside the closure, so two battles
//! concluding matches for the same model at the same time cannot lose an
//! update — a concurrent increment just lands before or after this one.
//!
//! `both_bad` applies no rating change but still counts the battle for
//! both models. Rating records are created lazily at the configured
//! default on first reference.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::{ModelId, SharedArenaStore, StoreResult, VoteChoice};

/// One model's share of a resolved match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub model_id: ModelId,
    /// Rating change applied by this match (0.0 for `both_bad`).
    pub delta: f64,
    /// Rating after the update.
    pub elo_rating: f64,
}

/// Computes and persists rating updates for resolved matches.
pub struct RatingEngine {
    store: SharedArenaStore,
    k_factor: f64,
    default_rating: f64,
}

/// Expected score of a player rated `ra` against one rated `rb`.
pub fn expected_score(ra: f64, rb: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rb - ra) / 400.0))
}

impl RatingEngine {
    pub fn new(store: SharedArenaStore, k_factor: f64, default_rating: f64) -> Self {
        Self {
            store,
            k_factor,
            default_rating,
        }
    }

    /// Apply one resolved round between `left` and `right`. Display names
    /// are used only when a record is created on first reference.
    pub fn apply_round(
        &self,
        left: (&str, &str),
        right: (&str, &str),
        choice: VoteChoice,
    ) -> StoreResult<Vec<RatingUpdate>> {
        let (left_id, left_name) = left;
        let (right_id, right_name) = right;

        // Snapshot both ratings once so the two deltas are exact mirrors.
        let ra = self.current_rating(left_id)?;
        let rb = self.current_rating(right_id)?;

        let (score_left, score_right) = match choice {
            VoteChoice::Left => (1.0, 0.0),
            VoteChoice::Right => (0.0, 1.0),
            VoteChoice::Tie => (0.5, 0.5),
            VoteChoice::BothBad => {
                // No rating transfer; the battle still counts.
                let left_after = self.bump_battles(left_id, left_name)?;
                let right_after = self.bump_battles(right_id, right_name)?;
                return Ok(vec![
                    RatingUpdate {
                        model_id: left_id.to_string(),
                        delta: 0.0,
                        elo_rating: left_after,
                    },
                    RatingUpdate {
                        model_id: right_id.to_string(),
                        delta: 0.0,
                        elo_rating: right_after,
                    },
                ]);
            }
        };

        let delta_left = self.k_factor * (score_left - expected_score(ra, rb));
        let delta_right = self.k_factor * (score_right - expected_score(rb, ra));

        let left_after = self.apply_delta(left_id, left_name, delta_left, score_left)?;
        let right_after = self.apply_delta(right_id, right_name, delta_right, score_right)?;

        debug!(
            left = left_id,
            right = right_id,
            %choice,
            delta_left,
            delta_right,
            "Ratings updated"
        );

        Ok(vec![
            RatingUpdate {
                model_id: left_id.to_string(),
                delta: delta_left,
                elo_rating: left_after,
            },
            RatingUpdate {
                model_id: right_id.to_string(),
                delta: delta_right,
                elo_rating: right_after,
            },
        ])
    }

    fn current_rating(&self, model_id: &str) -> StoreResult<f64> {
        Ok(self
            .store
            .get_rating(model_id)?
            .map(|r| r.elo_rating)
            .unwrap_or(self.default_rating))
    }

    fn apply_delta(
        &self,
        model_id: &str,
        display_name: &str,
        delta: f64,
        score: f64,
    ) -> StoreResult<f64> {
        let record = self.store.update_rating(
            model_id,
            display_name,
            self.default_rating,
            &mut |rating| {
                rating.elo_rating += delta;
                rating.battles_fought += 1;
                if score > 0.75 {
                    rating.wins += 1;
                } else if score < 0.25 {
                    rating.losses += 1;
                } else {
                    rating.ties += 1;
                }
            },
        )?;
        Ok(record.elo_rating)
    }

    fn bump_battles(&self, model_id: &str, display_name: &str) -> StoreResult<f64> {
        let record = self.store.update_rating(
            model_id,
            display_name,
            self.default_rating,
            &mut |rating| {
                rating.battles_fought += 1;
            },
        )?;
        Ok(record.elo_rating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ArenaStore, MemoryStore};
    use std::sync::Arc;

    fn engine() -> (RatingEngine, Arc<MemoryStore>) {
        let store = MemoryStore::new().shared();
        let engine = RatingEngine::new(store.clone(), 32.0, 1500.0);
        (engine, store)
    }

    #[test]
    fn expected_score_is_half_at_equal_ratings() {
        assert!((expected_score(1500.0, 1500.0) - 0.5).abs() < 1e-12);
        assert!(expected_score(1600.0, 1400.0) > 0.5);
        assert!(expected_score(1400.0, 1600.0) < 0.5);
        // Complementary by construction.
        let e = expected_score(1623.0, 1488.0) + expected_score(1488.0, 1623.0);
        assert!((e - 1.0).abs() < 1e-12);
    }

    #[test]
    fn first_win_at_defaults_moves_sixteen_points() {
        // 1500 vs 1500 at K=32: Ea = 0.5, ΔR = 32 * 0.5 = 16.
        let (engine, store) = engine();
        let updates = engine
            .apply_round(("m1", "M1"), ("m2", "M2"), VoteChoice::Left)
            .unwrap();

        assert!((updates[0].delta - 16.0).abs() < 1e-9);
        assert!((updates[1].delta + 16.0).abs() < 1e-9);
        assert!((store.get_rating("m1").unwrap().unwrap().elo_rating - 1516.0).abs() < 1e-9);
        assert!((store.get_rating("m2").unwrap().unwrap().elo_rating - 1484.0).abs() < 1e-9);

        let winner = store.get_rating("m1").unwrap().unwrap();
        assert_eq!(winner.wins, 1);
        assert_eq!(winner.battles_fought, 1);
        let loser = store.get_rating("m2").unwrap().unwrap();
        assert_eq!(loser.losses, 1);
    }

    #[test]
    fn resolved_matches_are_zero_sum() {
        let (engine, _store) = engine();
        // Skew the ratings first.
        engine
            .apply_round(("m1", "M1"), ("m2", "M2"), VoteChoice::Left)
            .unwrap();
        engine
            .apply_round(("m1", "M1"), ("m3", "M3"), VoteChoice::Left)
            .unwrap();

        let updates = engine
            .apply_round(("m2", "M2"), ("m1", "M1"), VoteChoice::Right)
            .unwrap();
        assert!((updates[0].delta + updates[1].delta).abs() < 1e-9);
    }

    #[test]
    fn tie_moves_ratings_toward_each_other() {
        let (engine, store) = engine();
        engine
            .apply_round(("m1", "M1"), ("m2", "M2"), VoteChoice::Left)
            .unwrap();

        // m1 is now 1516, m2 is 1484; a tie pulls them back together.
        let updates = engine
            .apply_round(("m1", "M1"), ("m2", "M2"), VoteChoice::Tie)
            .unwrap();
        assert!(updates[0].delta < 0.0);
        assert!(updates[1].delta > 0.0);
        assert!((updates[0].delta + updates[1].delta).abs() < 1e-9);

        let m1 = store.get_rating("m1").unwrap().unwrap();
        assert_eq!(m1.ties, 1);
        assert_eq!(m1.battles_fought, 2);
    }

    #[test]
    fn both_bad_counts_the_battle_but_moves_nothing() {
        let (engine, store) = engine();
        let updates = engine
            .apply_round(("m1", "M1"), ("m2", "M2"), VoteChoice::BothBad)
            .unwrap();

        assert_eq!(updates[0].delta, 0.0);
        assert_eq!(updates[1].delta, 0.0);

        let m1 = store.get_rating("m1").unwrap().unwrap();
        assert_eq!(m1.elo_rating, 1500.0);
        assert_eq!(m1.battles_fought, 1);
        assert_eq!(m1.wins + m1.losses + m1.ties, 0);
    }

    #[test]
    fn upset_transfers_more_than_expected_win() {
        let (engine, store) = engine();
        // Build a gap: m1 wins three times.
        for _ in 0..3 {
            engine
                .apply_round(("m1", "M1"), ("m2", "M2"), VoteChoice::Left)
                .unwrap();
        }
        let favorite = store.get_rating("m1").unwrap().unwrap().elo_rating;
        let underdog = store.get_rating("m2").unwrap().unwrap().elo_rating;
        assert!(favorite > underdog);

        // The underdog winning moves more than 16 points.
        let updates = engine
            .apply_round(("m1", "M1"), ("m2", "M2"), VoteChoice::Right)
            .unwrap();
        assert!(updates[1].delta > 16.0);
        assert!((updates[0].delta + updates[1].delta).abs() < 1e-9);
    }
}
