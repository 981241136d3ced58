use super::*;

use crate::constants::bonus_spawn_chance;

impl GameEngine {
    pub fn use_push_fixed(
        &mut self,
        player: &PlayerId,
        index: usize,
        direction: Direction,
    ) -> GameResult<ActionOutcome> {
        self.push_line(player, index, direction, Some(BonusKind::PushFixed))
    }

    pub fn use_push_twice(
        &mut self,
        player: &PlayerId,
        index: usize,
        direction: Direction,
    ) -> GameResult<ActionOutcome> {
        self.push_line(player, index, direction, Some(BonusKind::PushTwice))
    }

    /// Teleports the pawn to any free cell, ignoring tile connectivity.
    pub fn use_beam(&mut self, player: &PlayerId, target: Position) -> GameResult<ActionOutcome> {
        self.require_current(player)?;
        self.require_bonus_phase(BonusKind::Beam)?;
        let state = &self.roster.require(player)?.state;
        if !state.holds_bonus(BonusKind::Beam) {
            return Err(GameError::BonusNotHeld(BonusKind::Beam));
        }
        let board = self.board.as_ref().ok_or(GameError::NotRunning)?;
        if !board.in_bounds(target) {
            return Err(GameError::OutOfBounds(target));
        }
        if target != state.position && self.occupied_by_others(player).contains(&target) {
            return Err(GameError::Occupied(target));
        }

        self.consume_bonus(player, BonusKind::Beam)?;
        self.arrive(player, target, 0)
    }

    /// Exchanges positions with `other`; the swap counts as the mover's move.
    pub fn use_swap(&mut self, player: &PlayerId, other: &PlayerId) -> GameResult<ActionOutcome> {
        self.require_current(player)?;
        self.require_bonus_phase(BonusKind::Swap)?;
        if player == other {
            return Err(GameError::SelfSwap);
        }
        let other_position = self.roster.require(other)?.state.position;
        let state = &self.roster.require(player)?.state;
        if !state.holds_bonus(BonusKind::Swap) {
            return Err(GameError::BonusNotHeld(BonusKind::Swap));
        }
        let own_position = state.position;

        self.consume_bonus(player, BonusKind::Swap)?;
        self.roster.require_mut(other)?.state.position = own_position;
        self.arrive(player, other_position, 0)
    }

    pub(super) fn consume_bonus(&mut self, player: &PlayerId, kind: BonusKind) -> GameResult<()> {
        self.roster.require_mut(player)?.state.take_bonus(kind)?;
        self.events.push(GameEvent::BonusUsed {
            player_id: player.clone(),
            bonus: kind,
        });
        Ok(())
    }

    /// Rolls for a new bonus on a free tile: no bonus, no treasure, no home
    /// corner and no pawn.
    pub(super) fn maybe_spawn_bonus(&mut self) {
        if self.bonus_budget_left == 0 {
            return;
        }
        let Some(board) = self.board.as_ref() else {
            return;
        };
        if !self.rng.chance(bonus_spawn_chance(board.bonuses_on_board())) {
            return;
        }

        let pawns: HashSet<Position> = self.roster.iter().map(|p| p.state.position).collect();
        let free: Vec<Position> = board
            .positions()
            .filter(|pos| !board.is_corner(*pos) && !pawns.contains(pos))
            .filter(|pos| {
                board
                    .tile(*pos)
                    .map(|tile| tile.bonus.is_none() && tile.treasure.is_none())
                    .unwrap_or(false)
            })
            .collect();
        let Some(position) = self.rng.pick(&free).copied() else {
            return;
        };
        let Some(bonus) = self.rng.pick(&BonusKind::ALL).copied() else {
            return;
        };
        let Some(tile) = self.board.as_mut().and_then(|board| board.tile_mut(position)) else {
            return;
        };
        tile.bonus = Some(bonus);
        self.bonus_budget_left -= 1;
        self.events.push(GameEvent::BonusSpawned { bonus, position });
    }
}
