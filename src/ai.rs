//! Decision pipeline for participants under automated control.
//!
//! Planning is pure: every function reads a `GameEngine` (or a clone of it)
//! and returns a plan. Submitting the plan is the failover controller's job,
//! which goes through the same entry points a human client uses.

use std::cmp::Reverse;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::engine::{Action, GameEngine};
use crate::rng::Rng;
use crate::types::{BonusKind, Direction, PlayerId, Position};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushPlan {
    pub rotations: usize,
    pub index: usize,
    pub direction: Direction,
    /// `PushFixed` or `PushTwice` when the push should consume a bonus.
    pub bonus: Option<BonusKind>,
}

impl PushPlan {
    /// Rotations first, then the push itself.
    pub fn actions(&self) -> Vec<Action> {
        let (index, direction) = (self.index, self.direction);
        let mut actions = vec![Action::RotateSpare; self.rotations];
        actions.push(match self.bonus {
            Some(BonusKind::PushFixed) => Action::UsePushFixed { index, direction },
            Some(BonusKind::PushTwice) => Action::UsePushTwice { index, direction },
            _ => Action::Push { index, direction },
        });
        actions
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MovePlan {
    Beam(Position),
    Swap(PlayerId),
}

impl MovePlan {
    pub fn action(&self) -> Action {
        match self {
            MovePlan::Beam(target) => Action::UseBeam { target: *target },
            MovePlan::Swap(other) => Action::UseSwap {
                other: other.clone(),
            },
        }
    }
}

/// Picks one of several equally good, already legal destinations.
#[async_trait]
pub trait TieBreaker: Send + Sync {
    /// `candidates` is never empty. Returning a position outside it makes the
    /// caller fall back to the first candidate.
    async fn choose(&self, player: &PlayerId, candidates: &[Position]) -> Position;
}

/// Default tie-breaker: a seeded uniform pick.
#[derive(Debug)]
pub struct SeededTieBreaker {
    rng: Mutex<Rng>,
}

impl SeededTieBreaker {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: Mutex::new(Rng::new(seed)),
        }
    }
}

#[async_trait]
impl TieBreaker for SeededTieBreaker {
    async fn choose(&self, _player: &PlayerId, candidates: &[Position]) -> Position {
        let idx = match self.rng.lock() {
            Ok(mut rng) => rng.pick_index(candidates.len()),
            Err(_) => 0,
        };
        candidates[idx.min(candidates.len().saturating_sub(1))]
    }
}

/// How good a position is for `player`: target reachable first, then the
/// closest reachable cell to the target.
type ReachScore = (bool, Reverse<usize>);

fn reach_score(engine: &GameEngine, player: &PlayerId) -> ReachScore {
    let Some(target) = engine.target_position(player) else {
        return (false, Reverse(usize::MAX));
    };
    let candidates = engine.candidate_moves(player);
    let reaches = candidates.contains(&target);
    let closest = candidates
        .iter()
        .map(|pos| pos.manhattan(target))
        .min()
        .unwrap_or(usize::MAX);
    (reaches, Reverse(closest))
}

/// Best push found by simulating every rotation, line and direction on a
/// clone. Ties keep the first plan in enumeration order.
fn best_push(
    engine: &GameEngine,
    player: &PlayerId,
    bonus: Option<BonusKind>,
) -> Option<(PushPlan, ReachScore)> {
    let board = engine.board()?;
    let mut best: Option<(PushPlan, ReachScore)> = None;

    for rotations in 0..4 {
        let mut rotated = engine.clone();
        for _ in 0..rotations {
            rotated.rotate_spare(player).ok()?;
        }
        for direction in Direction::ALL {
            for index in 0..board.line_count(direction) {
                let mut sim = rotated.clone();
                let pushed = match bonus {
                    Some(BonusKind::PushFixed) => sim.use_push_fixed(player, index, direction),
                    _ => sim.push(player, index, direction),
                };
                if pushed.is_err() {
                    continue;
                }
                let score = reach_score(&sim, player);
                let better = best.as_ref().map(|(_, held)| score > *held).unwrap_or(true);
                if better {
                    best = Some((
                        PushPlan {
                            rotations,
                            index,
                            direction,
                            bonus,
                        },
                        score,
                    ));
                }
            }
        }
    }
    best
}

/// Chooses the next push, deciding on the way whether a held push bonus is
/// worth spending.
pub fn plan_push(engine: &GameEngine, player: &PlayerId) -> Option<PushPlan> {
    let (ordinary, ordinary_score) = best_push(engine, player, None)?;
    if ordinary_score.0 {
        return Some(ordinary);
    }
    let state = &engine.roster().get(player)?.state;

    if state.holds_bonus(BonusKind::PushFixed) {
        if let Some((plan, score)) = best_push(engine, player, Some(BonusKind::PushFixed)) {
            if score.0 {
                return Some(plan);
            }
        }
    }
    if state.holds_bonus(BonusKind::PushTwice) && !engine.turn().extra_push_pending {
        return Some(PushPlan {
            bonus: Some(BonusKind::PushTwice),
            ..ordinary
        });
    }
    Some(ordinary)
}

/// Equally best destinations under the conservative occupancy policy: the
/// target itself when reachable, otherwise every reachable cell closest to
/// it. Without a known target every reachable cell qualifies.
pub fn move_candidates(engine: &GameEngine, player: &PlayerId) -> Vec<Position> {
    let candidates = engine.candidate_moves(player);
    let Some(target) = engine.target_position(player) else {
        return candidates;
    };
    if candidates.contains(&target) {
        return vec![target];
    }
    let Some(closest) = candidates.iter().map(|pos| pos.manhattan(target)).min() else {
        return candidates;
    };
    candidates
        .into_iter()
        .filter(|pos| pos.manhattan(target) == closest)
        .collect()
}

/// Move-phase bonus worth spending, if any. Beam jumps straight onto a free
/// unreachable target; swap trades places with a pawn standing closer to the
/// target than anything reachable.
pub fn plan_move_bonus(engine: &GameEngine, player: &PlayerId) -> Option<MovePlan> {
    let target = engine.target_position(player)?;
    let candidates = engine.candidate_moves(player);
    if candidates.contains(&target) {
        return None;
    }
    let state = &engine.roster().get(player)?.state;
    let occupied = engine.occupied_by_others(player);

    if state.holds_bonus(BonusKind::Beam) && !occupied.contains(&target) {
        return Some(MovePlan::Beam(target));
    }
    if state.holds_bonus(BonusKind::Swap) {
        let closest = candidates
            .iter()
            .map(|pos| pos.manhattan(target))
            .min()
            .unwrap_or(usize::MAX);
        return engine
            .roster()
            .iter()
            .filter(|other| other.id() != player)
            .map(|other| (other.state.position.manhattan(target), other.id().clone()))
            .filter(|(distance, _)| *distance < closest)
            .min()
            .map(|(_, id)| MovePlan::Swap(id));
    }
    None
}
