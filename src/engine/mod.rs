use std::collections::HashSet;

use crate::board::Board;
use crate::constants::{LONG_WALK_STEPS, MAX_BOARD_SIDE, MIN_BOARD_SIDE, TURN_TIMEOUT_MS};
use crate::error::{GameError, GameResult};
use crate::reachability::{path_length, reachable_cells};
use crate::rng::Rng;
use crate::roster::{Participant, Roster, TurnCounters};
use crate::types::{
    Achievement, BonusKind, Direction, GameEvent, GameOptions, GameOverReason, GameSnapshot,
    GameSummary, PlayerId, PlayerView, Position, SessionId, TreasureId, TurnState, TurnView,
};

mod bonus_system;
pub mod scoring;
mod utils;

use self::utils::{now_iso, now_ms};

/// One inbound gameplay action, already decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    RotateSpare,
    Push { index: usize, direction: Direction },
    Move { target: Position },
    UseBeam { target: Position },
    UseSwap { other: PlayerId },
    UsePushFixed { index: usize, direction: Direction },
    UsePushTwice { index: usize, direction: Direction },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActionOutcome {
    /// State changed, same participant keeps the turn.
    Applied,
    TurnAdvanced { next: PlayerId },
    GameOver(GameSummary),
}

#[derive(Clone, Debug)]
pub struct TurnContext {
    pub current: Option<PlayerId>,
    /// Seat of `current`; used to find a successor if it leaves the table.
    pub slot: usize,
    pub state: TurnState,
    pub deadline_ms: Option<u64>,
    /// Set by the push-twice bonus; lives only until the turn ends.
    pub extra_push_pending: bool,
}

impl Default for TurnContext {
    fn default() -> Self {
        Self {
            current: None,
            slot: 0,
            state: TurnState::NotStarted,
            deadline_ms: None,
            extra_push_pending: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GameEngine {
    roster: Roster,
    board: Option<Board>,
    turn: TurnContext,
    rng: Rng,
    turn_timeout_ms: u64,
    bonus_budget_left: u32,
    unlocked: HashSet<(PlayerId, Achievement)>,
    events: Vec<GameEvent>,
    started_at_ms: u64,
    turns_played: u64,
}

impl GameEngine {
    pub fn new(seed: u32) -> Self {
        Self {
            roster: Roster::new(),
            board: None,
            turn: TurnContext::default(),
            rng: Rng::new(seed),
            turn_timeout_ms: TURN_TIMEOUT_MS,
            bonus_budget_left: 0,
            unlocked: HashSet::new(),
            events: Vec::new(),
            started_at_ms: 0,
            turns_played: 0,
        }
    }

    pub fn with_turn_timeout(mut self, turn_timeout_ms: u64) -> Self {
        self.turn_timeout_ms = turn_timeout_ms;
        self
    }

    pub fn is_running(&self) -> bool {
        self.turn.state != TurnState::NotStarted
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn roster_mut_for_tests(&mut self) -> &mut Roster {
        &mut self.roster
    }

    #[cfg(test)]
    pub(crate) fn board_mut_for_tests(&mut self) -> &mut Board {
        self.board.as_mut().expect("game is running")
    }

    pub fn turn(&self) -> &TurnContext {
        &self.turn
    }

    pub fn current_player(&self) -> Option<&PlayerId> {
        self.turn.current.as_ref()
    }

    pub fn turns_played(&self) -> u64 {
        self.turns_played
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- lobby and connectivity -------------------------------------------

    pub fn join(&mut self, id: PlayerId, name: &str, session: SessionId) -> GameResult<()> {
        if self.is_running() {
            return Err(GameError::AlreadyRunning);
        }
        self.roster.join(id, name, session)
    }

    /// Removes a participant. Mid-game the turn moves on to whoever now holds
    /// the vacated seat; an empty table aborts the game without a result.
    pub fn leave(&mut self, id: &PlayerId) -> GameResult<Option<ActionOutcome>> {
        let slot = self
            .roster
            .slot_of(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.clone()))?;
        self.roster.leave(id)?;
        if !self.is_running() {
            return Ok(None);
        }
        if self.roster.is_empty() {
            self.reset_to_lobby();
            return Ok(None);
        }
        if self.turn.current.as_ref() != Some(id) {
            if let Some(current) = self.turn.current.as_ref() {
                self.turn.slot = self.roster.slot_of(current).unwrap_or(0);
            }
            return Ok(None);
        }
        let next = self.begin_turn(None, slot)?;
        Ok(Some(ActionOutcome::TurnAdvanced { next }))
    }

    pub fn disconnect(&mut self, session: SessionId) -> Option<PlayerId> {
        self.roster.disconnect(session)
    }

    pub fn reconnect(&mut self, id: &PlayerId, session: SessionId) -> GameResult<()> {
        self.roster.reconnect(id, session)
    }

    pub fn player_by_session(&self, session: SessionId) -> Option<PlayerId> {
        self.roster.player_by_session(session).cloned()
    }

    pub fn set_ai_controlled(&mut self, id: &PlayerId, ai_controlled: bool) -> GameResult<()> {
        self.roster.require_mut(id)?.identity.ai_controlled = ai_controlled;
        Ok(())
    }

    pub fn is_ai_controlled(&self, id: &PlayerId) -> bool {
        self.roster
            .get(id)
            .map(|p| p.identity.ai_controlled)
            .unwrap_or(false)
    }

    // ---- lifecycle -----------------------------------------------------------

    pub fn start_game(&mut self, requested_by: &PlayerId, options: &GameOptions) -> GameResult<()> {
        if self.is_running() {
            return Err(GameError::AlreadyRunning);
        }
        if self.roster.admin_id() != Some(requested_by) {
            return Err(GameError::NotAdmin);
        }
        validate_options(options, self.roster.len())?;

        let mut board = Board::generate(options.rows, options.cols, &mut self.rng)?;
        let deck = place_treasures(&mut board, options.treasure_count, &mut self.rng)?;

        self.roster.seed_for_game(board.corners(), deck, &mut self.rng);
        self.board = Some(board);
        self.bonus_budget_left = options.bonus_budget;
        self.unlocked.clear();
        self.events.clear();
        self.started_at_ms = now_ms();
        self.turns_played = 0;
        self.turn = TurnContext::default();
        let first = self
            .roster
            .iter()
            .next()
            .map(|p| p.id().clone())
            .ok_or_else(|| GameError::InvalidOptions("no participants".to_string()))?;
        self.turn.current = Some(first);
        self.turn.state = TurnState::WaitingForPush;
        self.turn.deadline_ms = Some(now_ms() + self.turn_timeout_ms);
        Ok(())
    }

    /// Ends the running game for a reason other than a home arrival.
    pub fn end_game(&mut self, reason: GameOverReason) -> GameResult<GameSummary> {
        if !self.is_running() {
            return Err(GameError::NotRunning);
        }
        let winner = scoring::build_ranking(&self.roster, reason, None)?
            .first()
            .map(|entry| entry.player_id.clone());
        self.finish(reason, winner)
    }

    /// Turn deadline expired: the current participant forfeits the rest of
    /// the turn.
    pub fn skip_turn(&mut self) -> GameResult<PlayerId> {
        if !self.is_running() {
            return Err(GameError::NotRunning);
        }
        let current = self.turn.current.clone().ok_or(GameError::NotRunning)?;
        self.events.push(GameEvent::TurnSkipped {
            player_id: current.clone(),
        });
        self.begin_turn(Some(&current), self.turn.slot)
    }

    fn finish(&mut self, reason: GameOverReason, winner: Option<PlayerId>) -> GameResult<GameSummary> {
        let ranking = scoring::build_ranking(&self.roster, reason, winner.as_ref())?;
        let summary = GameSummary {
            reason,
            winner,
            duration_ms: now_ms().saturating_sub(self.started_at_ms),
            turns: self.turns_played,
            ranking,
            finished_at_iso: now_iso(),
        };
        self.events.push(GameEvent::GameOver {
            summary: summary.clone(),
        });
        self.reset_to_lobby();

        let gone: Vec<PlayerId> = self
            .roster
            .iter()
            .filter(|p| !p.identity.connected)
            .map(|p| p.id().clone())
            .collect();
        for id in gone {
            self.roster.leave(&id)?;
        }
        Ok(summary)
    }

    fn reset_to_lobby(&mut self) {
        self.board = None;
        self.turn = TurnContext::default();
        self.bonus_budget_left = 0;
        self.roster.reset_game_state();
    }

    // ---- actions ---------------------------------------------------------------

    pub fn apply(&mut self, player: &PlayerId, action: Action) -> GameResult<ActionOutcome> {
        match action {
            Action::RotateSpare => self.rotate_spare(player),
            Action::Push { index, direction } => self.push(player, index, direction),
            Action::Move { target } => self.move_pawn(player, target),
            Action::UseBeam { target } => self.use_beam(player, target),
            Action::UseSwap { other } => self.use_swap(player, &other),
            Action::UsePushFixed { index, direction } => {
                self.use_push_fixed(player, index, direction)
            }
            Action::UsePushTwice { index, direction } => {
                self.use_push_twice(player, index, direction)
            }
        }
    }

    pub fn rotate_spare(&mut self, player: &PlayerId) -> GameResult<ActionOutcome> {
        self.require_current(player)?;
        self.require_phase(TurnState::WaitingForPush)?;
        self.board
            .as_mut()
            .ok_or(GameError::NotRunning)?
            .rotate_spare()?;
        Ok(ActionOutcome::Applied)
    }

    pub fn push(
        &mut self,
        player: &PlayerId,
        index: usize,
        direction: Direction,
    ) -> GameResult<ActionOutcome> {
        self.push_line(player, index, direction, None)
    }

    /// Shared push path. Every check runs before the first mutation.
    fn push_line(
        &mut self,
        player: &PlayerId,
        index: usize,
        direction: Direction,
        bonus: Option<BonusKind>,
    ) -> GameResult<ActionOutcome> {
        self.require_current(player)?;
        let board = self.board.as_ref().ok_or(GameError::NotRunning)?;
        let line_count = board.line_count(direction);
        if index >= line_count {
            return Err(GameError::IndexOutOfRange { index, direction });
        }
        if board.is_reversal(index, direction) {
            return Err(GameError::ReversePush { index, direction });
        }
        match bonus {
            Some(kind) => self.require_bonus_phase(kind)?,
            None => self.require_phase(TurnState::WaitingForPush)?,
        }
        if bonus == Some(BonusKind::PushTwice) && self.turn.extra_push_pending {
            return Err(GameError::ExtraPushPending);
        }
        let using_fixed_override = bonus == Some(BonusKind::PushFixed);
        if using_fixed_override && (index == 0 || index + 1 == line_count) {
            return Err(GameError::CornerLine(index));
        }
        if let Some(kind) = bonus {
            if !self.roster.require(player)?.state.holds_bonus(kind) {
                return Err(GameError::BonusNotHeld(kind));
            }
        }
        board.check_push(index, direction, using_fixed_override)?;

        if let Some(kind) = bonus {
            self.consume_bonus(player, kind)?;
        }
        let board = self.board.as_mut().ok_or(GameError::NotRunning)?;
        board.push(index, direction, using_fixed_override)?;
        self.shift_pawns(index, direction);
        self.roster.require_mut(player)?.state.total_pushes += 1;

        if bonus == Some(BonusKind::PushTwice) {
            self.turn.extra_push_pending = true;
        } else {
            self.turn.extra_push_pending = false;
            self.turn.state = TurnState::WaitingForMove;
        }
        self.maybe_spawn_bonus();
        Ok(ActionOutcome::Applied)
    }

    fn shift_pawns(&mut self, index: usize, direction: Direction) {
        let Some(board) = self.board.as_ref() else {
            return;
        };
        let mut wrapped = Vec::new();
        for participant in self.roster.iter_mut() {
            let from = participant.state.position;
            let Some((to, off_edge)) = board.shifted_position(from, index, direction) else {
                continue;
            };
            participant.state.position = to;
            if off_edge {
                participant.state.turn.pushed_out = true;
                wrapped.push((participant.id().clone(), from, to));
            }
        }
        for (player_id, from, to) in wrapped {
            self.events.push(GameEvent::PushedOut {
                player_id: player_id.clone(),
                from,
                to,
            });
            self.unlock(&player_id, Achievement::PushedOut);
        }
    }

    pub fn move_pawn(&mut self, player: &PlayerId, target: Position) -> GameResult<ActionOutcome> {
        self.require_current(player)?;
        self.require_phase(TurnState::WaitingForMove)?;
        let board = self.board.as_ref().ok_or(GameError::NotRunning)?;
        if !board.in_bounds(target) {
            return Err(GameError::OutOfBounds(target));
        }
        let start = self.roster.require(player)?.state.position;
        let occupied = self.occupied_by_others(player);
        if target != start && occupied.contains(&target) {
            return Err(GameError::Occupied(target));
        }
        let steps =
            path_length(board, start, target, &occupied).ok_or(GameError::Unreachable(target))?;
        self.arrive(player, target, steps)
    }

    /// Lands the pawn on `target` and settles pickups, victory and rotation.
    fn arrive(&mut self, player: &PlayerId, target: Position, steps: usize) -> GameResult<ActionOutcome> {
        let board = self.board.as_mut().ok_or(GameError::NotRunning)?;
        let participant = self
            .roster
            .get_mut(player)
            .ok_or_else(|| GameError::UnknownPlayer(player.clone()))?;
        let state = &mut participant.state;
        state.position = target;
        state.turn.steps += steps;
        state.total_steps += steps;

        let mut collected_treasure: Option<(TreasureId, usize)> = None;
        let mut collected_bonus = None;
        if let Some(tile) = board.tile_mut(target) {
            if tile.treasure.is_some() && tile.treasure == state.current_treasure() {
                tile.treasure = None;
                let treasure = state.treasures.pop_front();
                state.collected += 1;
                state.turn.collected_this_turn = true;
                collected_treasure = treasure.map(|t| (t, state.remaining_treasures()));
            }
            if let Some(kind) = tile.bonus {
                if state.can_take_bonus() {
                    tile.bonus = None;
                    state.bonuses.push(kind);
                    collected_bonus = Some(kind);
                }
            }
        }
        let won = target == state.home && state.remaining_treasures() == 0;
        let first_treasure = state.collected == 1 && collected_treasure.is_some();

        if let Some((treasure, remaining)) = collected_treasure {
            self.events.push(GameEvent::TreasureCollected {
                player_id: player.clone(),
                treasure,
                remaining,
            });
        }
        if first_treasure {
            self.unlock(player, Achievement::FirstTreasure);
        }
        if let Some(bonus) = collected_bonus {
            self.events.push(GameEvent::BonusCollected {
                player_id: player.clone(),
                bonus,
            });
        }
        if steps >= LONG_WALK_STEPS {
            self.unlock(player, Achievement::LongWalk);
        }

        if won {
            let summary = self.finish(GameOverReason::Victory, Some(player.clone()))?;
            return Ok(ActionOutcome::GameOver(summary));
        }
        let next = self.begin_turn(Some(player), self.turn.slot)?;
        self.maybe_spawn_bonus();
        Ok(ActionOutcome::TurnAdvanced { next })
    }

    /// Closes the current turn and hands it to the next seat.
    fn begin_turn(&mut self, finished: Option<&PlayerId>, slot: usize) -> GameResult<PlayerId> {
        if let Some(finished) = finished.and_then(|id| self.roster.get_mut(id)) {
            finished.state.turn = TurnCounters::default();
        }
        let next = self
            .roster
            .next_in_rotation(finished, slot)
            .ok_or(GameError::NotRunning)?;
        self.turn.slot = self.roster.slot_of(&next).unwrap_or(0);
        self.turn.current = Some(next.clone());
        self.turn.state = TurnState::WaitingForPush;
        self.turn.extra_push_pending = false;
        self.turn.deadline_ms = Some(now_ms() + self.turn_timeout_ms);
        self.turns_played += 1;
        Ok(next)
    }

    // ---- guards and queries -------------------------------------------------

    fn require_current(&self, player: &PlayerId) -> GameResult<()> {
        if !self.is_running() {
            return Err(GameError::NotRunning);
        }
        self.roster.require(player)?;
        if self.turn.current.as_ref() != Some(player) {
            return Err(GameError::NotYourTurn(player.clone()));
        }
        Ok(())
    }

    fn require_phase(&self, expected: TurnState) -> GameResult<()> {
        if self.turn.state != expected {
            return Err(GameError::WrongPhase(self.turn.state));
        }
        Ok(())
    }

    pub(crate) fn require_bonus_phase(&self, kind: BonusKind) -> GameResult<()> {
        if !kind.usable_in(self.turn.state) {
            return Err(GameError::WrongPhase(self.turn.state));
        }
        Ok(())
    }

    fn unlock(&mut self, player: &PlayerId, achievement: Achievement) {
        if self.unlocked.insert((player.clone(), achievement)) {
            self.events.push(GameEvent::AchievementUnlocked {
                player_id: player.clone(),
                achievement,
            });
        }
    }

    pub fn occupied_by_others(&self, player: &PlayerId) -> HashSet<Position> {
        self.roster
            .iter()
            .filter(|p| p.id() != player)
            .map(|p| p.state.position)
            .collect()
    }

    /// Conservative candidate set for automated turns: other pawns block.
    pub fn candidate_moves(&self, player: &PlayerId) -> Vec<Position> {
        let (Some(board), Some(participant)) = (self.board.as_ref(), self.roster.get(player)) else {
            return Vec::new();
        };
        reachable_cells(board, participant.state.position, &self.occupied_by_others(player))
    }

    /// Where the participant is heading: the current treasure's cell, or home
    /// once every treasure is collected. `None` while the treasure sits on the
    /// spare tile.
    pub fn target_position(&self, player: &PlayerId) -> Option<Position> {
        let board = self.board.as_ref()?;
        let state = &self.roster.get(player)?.state;
        match state.current_treasure() {
            Some(treasure) => board.find_treasure(treasure),
            None => Some(state.home),
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let running = self.is_running();
        GameSnapshot {
            board: self.board.as_ref().map(Board::view),
            players: self
                .roster
                .iter()
                .map(|p| player_view(p, running))
                .collect(),
            turn: TurnView {
                current_player_id: self.turn.current.clone(),
                state: self.turn.state,
                deadline_ms: self.turn.deadline_ms,
                extra_push_pending: self.turn.extra_push_pending,
            },
            bonuses_on_board: self.board.as_ref().map(Board::bonuses_on_board).unwrap_or(0),
        }
    }
}

fn player_view(participant: &Participant, running: bool) -> PlayerView {
    let state = &participant.state;
    PlayerView {
        id: participant.identity.id.clone(),
        name: participant.identity.name.clone(),
        color: participant.identity.color,
        is_admin: participant.identity.is_admin,
        connected: participant.identity.connected,
        ai: participant.identity.ai_controlled,
        position: running.then_some(state.position),
        home: running.then_some(state.home),
        current_treasure: state.current_treasure(),
        remaining_treasures: state.remaining_treasures(),
        collected_treasures: state.collected,
        bonuses: state.bonuses.clone(),
        steps: state.total_steps,
        pushes: state.total_pushes,
        score: scoring::live_score(state),
    }
}

fn validate_options(options: &GameOptions, participants: usize) -> GameResult<()> {
    if participants == 0 {
        return Err(GameError::InvalidOptions("no participants".to_string()));
    }
    for side in [options.rows, options.cols] {
        if !(MIN_BOARD_SIDE..=MAX_BOARD_SIDE).contains(&side) || side % 2 == 0 {
            return Err(GameError::InvalidOptions(format!(
                "board side {side} must be odd and within {MIN_BOARD_SIDE}..={MAX_BOARD_SIDE}"
            )));
        }
    }
    let placeable = options.rows * options.cols - 4;
    if options.treasure_count < participants || options.treasure_count > placeable {
        return Err(GameError::InvalidOptions(format!(
            "treasure count {} must be within {participants}..={placeable}",
            options.treasure_count
        )));
    }
    Ok(())
}

/// Puts each treasure on its own non-corner tile and returns the deck.
fn place_treasures(board: &mut Board, count: usize, rng: &mut Rng) -> GameResult<Vec<TreasureId>> {
    let mut cells: Vec<Position> = board.positions().filter(|pos| !board.is_corner(*pos)).collect();
    if cells.len() < count {
        return Err(GameError::InvalidOptions(format!(
            "{count} treasures do not fit on {} cells",
            cells.len()
        )));
    }
    rng.shuffle(&mut cells);
    let deck: Vec<TreasureId> = (0..count as u32).map(TreasureId).collect();
    for (treasure, pos) in deck.iter().zip(cells.iter()) {
        if let Some(tile) = board.tile_mut(*pos) {
            tile.treasure = Some(*treasure);
        }
    }
    Ok(deck)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    fn options(treasure_count: usize) -> GameOptions {
        GameOptions {
            rows: 7,
            cols: 7,
            treasure_count,
            duration_ms: 60_000,
            bonus_budget: 0,
        }
    }

    fn lobby(players: usize, seed: u32) -> GameEngine {
        let mut engine = GameEngine::new(seed);
        for idx in 0..players {
            engine
                .join(
                    pid(&format!("p{}", idx + 1)),
                    &format!("P{}", idx + 1),
                    SessionId(idx as u64 + 1),
                )
                .expect("seat available");
        }
        engine
    }

    fn started(players: usize, seed: u32) -> GameEngine {
        let mut engine = lobby(players, seed);
        engine.start_game(&pid("p1"), &options(6)).expect("game starts");
        engine.drain_events();
        engine
    }

    fn give(engine: &mut GameEngine, id: &str, kind: BonusKind) {
        engine
            .roster
            .get_mut(&pid(id))
            .expect("known player")
            .state
            .give_bonus(kind)
            .expect("inventory has room");
    }

    fn place(engine: &mut GameEngine, id: &str, pos: Position) {
        engine.roster.get_mut(&pid(id)).expect("known player").state.position = pos;
    }

    fn position(engine: &GameEngine, id: &str) -> Position {
        engine.roster.get(&pid(id)).expect("known player").state.position
    }

    fn fingerprint(engine: &GameEngine) -> String {
        serde_json::to_string(&engine.snapshot()).expect("snapshot serializes")
    }

    #[test]
    fn start_requires_admin_and_valid_options() {
        let mut engine = lobby(2, 1);
        assert_eq!(
            engine.start_game(&pid("p2"), &options(6)),
            Err(GameError::NotAdmin)
        );
        let mut even = options(6);
        even.rows = 8;
        assert!(matches!(
            engine.start_game(&pid("p1"), &even),
            Err(GameError::InvalidOptions(_))
        ));
        assert!(matches!(
            engine.start_game(&pid("p1"), &options(1)),
            Err(GameError::InvalidOptions(_))
        ));
        assert!(!engine.is_running());

        engine.start_game(&pid("p1"), &options(6)).unwrap();
        assert_eq!(engine.turn().state, TurnState::WaitingForPush);
        assert_eq!(engine.current_player(), Some(&pid("p1")));
        assert_eq!(
            engine.start_game(&pid("p1"), &options(6)),
            Err(GameError::AlreadyRunning)
        );
        assert_eq!(
            engine.join(pid("late"), "Late", SessionId(9)),
            Err(GameError::AlreadyRunning)
        );
    }

    #[test]
    fn treasures_are_dealt_and_placed_once_each() {
        let engine = started(2, 2);
        let board = engine.board().unwrap();
        let mut placed = 0;
        for pos in board.positions() {
            if board.tile(pos).unwrap().treasure.is_some() {
                assert!(!board.is_corner(pos));
                placed += 1;
            }
        }
        assert_eq!(placed, 6);
        for participant in engine.roster().iter() {
            assert_eq!(participant.state.remaining_treasures(), 3);
            let target = participant.state.current_treasure().unwrap();
            assert!(board.find_treasure(target).is_some());
        }
    }

    #[test]
    fn push_then_reversal_is_rejected_without_state_change() {
        let mut engine = started(2, 3);
        let outcome = engine.push(&pid("p1"), 1, Direction::Down).unwrap();
        assert!(matches!(outcome, ActionOutcome::Applied));
        assert_eq!(engine.turn().state, TurnState::WaitingForMove);

        let before = fingerprint(&engine);
        let err = engine.push(&pid("p1"), 1, Direction::Up).unwrap_err();
        assert_eq!(
            err,
            GameError::ReversePush {
                index: 1,
                direction: Direction::Up
            }
        );
        assert_eq!(err.code(), "illegal_push");
        assert_eq!(fingerprint(&engine), before);
    }

    #[test]
    fn reversal_is_rejected_for_every_movable_line() {
        for index in [1, 3, 5] {
            for direction in Direction::ALL {
                let mut engine = started(2, 40 + index as u32);
                engine.push(&pid("p1"), index, direction).unwrap();
                engine.turn.state = TurnState::WaitingForPush;
                assert_eq!(
                    engine.push(&pid("p1"), index, direction.opposite()),
                    Err(GameError::ReversePush {
                        index,
                        direction: direction.opposite()
                    })
                );
            }
        }
    }

    #[test]
    fn turn_and_phase_violations_are_rejected() {
        let mut engine = started(2, 4);
        assert_eq!(
            engine.push(&pid("p2"), 1, Direction::Down),
            Err(GameError::NotYourTurn(pid("p2")))
        );
        assert_eq!(
            engine.move_pawn(&pid("p1"), Position::new(0, 0)),
            Err(GameError::WrongPhase(TurnState::WaitingForPush))
        );
        assert_eq!(
            engine.push(&pid("p1"), 2, Direction::Down),
            Err(GameError::FixedLine(2))
        );
        assert_eq!(
            engine.push(&pid("p1"), 7, Direction::Down),
            Err(GameError::IndexOutOfRange {
                index: 7,
                direction: Direction::Down
            })
        );
        engine.rotate_spare(&pid("p1")).unwrap();
        engine.rotate_spare(&pid("p1")).unwrap();
        engine.push(&pid("p1"), 1, Direction::Down).unwrap();
        assert_eq!(
            engine.rotate_spare(&pid("p1")),
            Err(GameError::WrongPhase(TurnState::WaitingForMove))
        );
        assert_eq!(
            engine.move_pawn(&pid("p1"), Position::new(0, 6)),
            Err(GameError::Occupied(Position::new(0, 6)))
        );
        assert_eq!(
            engine.move_pawn(&pid("p1"), Position::new(7, 0)),
            Err(GameError::OutOfBounds(Position::new(7, 0)))
        );
    }

    #[test]
    fn staying_put_ends_the_turn() {
        let mut engine = started(2, 5);
        engine.push(&pid("p1"), 3, Direction::Right).unwrap();
        let outcome = engine.move_pawn(&pid("p1"), Position::new(0, 0)).unwrap();
        assert!(matches!(outcome, ActionOutcome::TurnAdvanced { ref next } if *next == pid("p2")));
        assert_eq!(engine.turn().state, TurnState::WaitingForPush);
        assert_eq!(engine.turns_played(), 1);
        assert_eq!(engine.roster().get(&pid("p1")).unwrap().state.total_pushes, 1);
    }

    #[test]
    fn pushed_off_pawn_wraps_to_opposite_edge() {
        let mut engine = started(2, 6);
        place(&mut engine, "p2", Position::new(6, 1));
        engine.push(&pid("p1"), 1, Direction::Down).unwrap();
        assert_eq!(position(&engine, "p2"), Position::new(0, 1));
        assert!(engine.roster().get(&pid("p2")).unwrap().state.turn.pushed_out);

        let events = engine.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::PushedOut { player_id, from, to }
                if *player_id == pid("p2") && *from == Position::new(6, 1) && *to == Position::new(0, 1)
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::AchievementUnlocked { achievement: Achievement::PushedOut, .. }
        )));
    }

    #[test]
    fn achievements_unlock_once_per_game() {
        let mut engine = started(2, 7);
        engine.unlock(&pid("p1"), Achievement::LongWalk);
        engine.unlock(&pid("p1"), Achievement::LongWalk);
        engine.unlock(&pid("p2"), Achievement::LongWalk);
        let unlocked = engine
            .drain_events()
            .into_iter()
            .filter(|event| matches!(event, GameEvent::AchievementUnlocked { .. }))
            .count();
        assert_eq!(unlocked, 2);
    }

    #[test]
    fn collecting_target_advances_the_queue() {
        let mut engine = started(2, 8);
        let home = Position::new(0, 0);
        let target = engine.roster().get(&pid("p1")).unwrap().state.current_treasure().unwrap();
        let from = engine.board().unwrap().find_treasure(target).unwrap();
        {
            let board = engine.board.as_mut().unwrap();
            board.tile_mut(from).unwrap().treasure = None;
            board.tile_mut(home).unwrap().treasure = Some(target);
        }

        engine.push(&pid("p1"), 3, Direction::Right).unwrap();
        engine.move_pawn(&pid("p1"), home).unwrap();

        let state = &engine.roster().get(&pid("p1")).unwrap().state;
        assert_eq!(state.collected, 1);
        assert_eq!(state.remaining_treasures(), 2);
        assert!(!state.treasures.contains(&target));
        let next = state.current_treasure().unwrap();
        assert_eq!(state.treasures.front(), Some(&next));
        assert!(engine.board().unwrap().tile(home).unwrap().treasure.is_none());

        let events = engine.drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::TreasureCollected { remaining: 2, .. }
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::AchievementUnlocked { achievement: Achievement::FirstTreasure, .. }
        )));
        assert_eq!(engine.current_player(), Some(&pid("p2")));
    }

    #[test]
    fn home_arrival_with_empty_queue_wins() {
        let mut engine = started(2, 9);
        engine.roster.get_mut(&pid("p1")).unwrap().state.treasures.clear();
        engine.push(&pid("p1"), 3, Direction::Right).unwrap();

        let outcome = engine.move_pawn(&pid("p1"), Position::new(0, 0)).unwrap();
        let ActionOutcome::GameOver(summary) = outcome else {
            panic!("home arrival should end the game");
        };
        assert_eq!(summary.reason, GameOverReason::Victory);
        assert_eq!(summary.winner, Some(pid("p1")));
        assert_eq!(summary.ranking[0].player_id, pid("p1"));
        assert_eq!(summary.ranking.len(), 2);
        assert_eq!(engine.turn().state, TurnState::NotStarted);
        assert!(engine.board().is_none());
        assert!(engine
            .drain_events()
            .iter()
            .any(|event| matches!(event, GameEvent::GameOver { .. })));
    }

    #[test]
    fn push_twice_keeps_push_phase_for_one_more_push() {
        let mut engine = started(2, 10);
        give(&mut engine, "p1", BonusKind::PushTwice);
        engine.use_push_twice(&pid("p1"), 1, Direction::Down).unwrap();
        assert_eq!(engine.turn().state, TurnState::WaitingForPush);
        assert!(engine.turn().extra_push_pending);
        assert!(engine.roster().get(&pid("p1")).unwrap().state.bonuses.is_empty());

        engine.push(&pid("p1"), 3, Direction::Down).unwrap();
        assert_eq!(engine.turn().state, TurnState::WaitingForMove);
        assert!(!engine.turn().extra_push_pending);
        assert_eq!(engine.roster().get(&pid("p1")).unwrap().state.total_pushes, 2);
    }

    #[test]
    fn pending_extra_push_does_not_leak_into_next_turn() {
        let mut engine = started(2, 11);
        give(&mut engine, "p1", BonusKind::PushTwice);
        engine.use_push_twice(&pid("p1"), 1, Direction::Down).unwrap();
        engine.skip_turn().unwrap();

        assert_eq!(engine.current_player(), Some(&pid("p2")));
        assert!(!engine.turn().extra_push_pending);
        engine.push(&pid("p2"), 3, Direction::Down).unwrap();
        assert_eq!(engine.turn().state, TurnState::WaitingForMove);
    }

    #[test]
    fn second_push_twice_cannot_stack_on_a_pending_one() {
        let mut engine = started(2, 10);
        give(&mut engine, "p1", BonusKind::PushTwice);
        give(&mut engine, "p1", BonusKind::PushTwice);
        engine.use_push_twice(&pid("p1"), 1, Direction::Down).unwrap();

        let err = engine
            .use_push_twice(&pid("p1"), 3, Direction::Down)
            .unwrap_err();
        assert_eq!(err, GameError::ExtraPushPending);
        let state = &engine.roster().get(&pid("p1")).unwrap().state;
        assert_eq!(state.total_pushes, 1);
        assert!(state.holds_bonus(BonusKind::PushTwice));
        assert!(engine.turn().extra_push_pending);

        engine.push(&pid("p1"), 3, Direction::Down).unwrap();
        assert_eq!(engine.turn().state, TurnState::WaitingForMove);
    }

    #[test]
    fn push_fixed_needs_bonus_and_spares_start_corners() {
        let mut engine = started(2, 12);
        assert_eq!(
            engine.use_push_fixed(&pid("p1"), 2, Direction::Down),
            Err(GameError::BonusNotHeld(BonusKind::PushFixed))
        );
        give(&mut engine, "p1", BonusKind::PushFixed);
        assert_eq!(
            engine.use_push_fixed(&pid("p1"), 0, Direction::Down),
            Err(GameError::CornerLine(0))
        );
        assert_eq!(
            engine.use_push_fixed(&pid("p1"), 6, Direction::Left),
            Err(GameError::CornerLine(6))
        );
        engine.use_push_fixed(&pid("p1"), 2, Direction::Down).unwrap();
        let board = engine.board().unwrap();
        for pos in board.positions() {
            assert_eq!(board.tile(pos).unwrap().fixed, crate::board::is_fixed_cell(pos, 7, 7));
        }
        assert!(engine.roster().get(&pid("p1")).unwrap().state.bonuses.is_empty());
        assert_eq!(engine.turn().state, TurnState::WaitingForMove);
    }

    #[test]
    fn beam_and_swap_are_move_phase_bonuses() {
        let mut engine = started(2, 13);
        give(&mut engine, "p1", BonusKind::Beam);
        assert_eq!(
            engine.use_beam(&pid("p1"), Position::new(3, 3)),
            Err(GameError::WrongPhase(TurnState::WaitingForPush))
        );
        engine.push(&pid("p1"), 3, Direction::Right).unwrap();
        assert_eq!(
            engine.use_beam(&pid("p1"), Position::new(0, 6)),
            Err(GameError::Occupied(Position::new(0, 6)))
        );
        engine.use_beam(&pid("p1"), Position::new(4, 4)).unwrap();
        assert_eq!(position(&engine, "p1"), Position::new(4, 4));
        assert_eq!(engine.current_player(), Some(&pid("p2")));

        give(&mut engine, "p2", BonusKind::Swap);
        engine.push(&pid("p2"), 5, Direction::Right).unwrap();
        assert_eq!(
            engine.use_swap(&pid("p2"), &pid("p2")),
            Err(GameError::SelfSwap)
        );
        engine.use_swap(&pid("p2"), &pid("p1")).unwrap();
        assert_eq!(position(&engine, "p2"), Position::new(4, 4));
        assert_eq!(position(&engine, "p1"), Position::new(0, 6));
        assert_eq!(engine.roster().get(&pid("p2")).unwrap().state.total_steps, 0);
    }

    #[test]
    fn timeout_skip_hands_turn_over() {
        let mut engine = started(3, 14);
        assert_eq!(engine.skip_turn().unwrap(), pid("p2"));
        assert_eq!(engine.turn().state, TurnState::WaitingForPush);
        assert!(engine
            .drain_events()
            .iter()
            .any(|event| matches!(event, GameEvent::TurnSkipped { player_id } if *player_id == pid("p1"))));
    }

    #[test]
    fn leaving_current_player_passes_turn_and_empty_table_aborts() {
        let mut engine = started(3, 15);
        engine.skip_turn().unwrap();
        let outcome = engine.leave(&pid("p2")).unwrap();
        assert!(matches!(outcome, Some(ActionOutcome::TurnAdvanced { ref next }) if *next == pid("p3")));
        assert_eq!(engine.turn().slot, 1);

        engine.leave(&pid("p1")).unwrap();
        assert_eq!(engine.current_player(), Some(&pid("p3")));
        assert_eq!(engine.turn().slot, 0);
        engine.leave(&pid("p3")).unwrap();
        assert!(!engine.is_running());
        assert!(engine.board().is_none());
    }

    #[test]
    fn timeout_end_ranks_and_drops_disconnected() {
        let mut engine = started(2, 16);
        engine.disconnect(SessionId(2));
        engine.set_ai_controlled(&pid("p2"), true).unwrap();
        let summary = engine.end_game(GameOverReason::Timeout).unwrap();
        assert_eq!(summary.reason, GameOverReason::Timeout);
        assert_eq!(summary.ranking.len(), 2);
        assert!(summary.winner.is_some());
        assert_eq!(engine.roster().len(), 1);
        assert!(!engine.is_ai_controlled(&pid("p1")));
        assert_eq!(engine.end_game(GameOverReason::Timeout).unwrap_err(), GameError::NotRunning);
    }

    #[test]
    fn bonus_spawns_respect_budget_and_free_tiles() {
        let mut engine = lobby(2, 17);
        let mut opts = options(6);
        opts.bonus_budget = 5;
        engine.start_game(&pid("p1"), &opts).unwrap();
        for _ in 0..200 {
            engine.maybe_spawn_bonus();
        }
        let board = engine.board().unwrap();
        assert!(board.bonuses_on_board() <= 5);
        assert!(board.bonuses_on_board() >= 4);
        for pos in board.positions() {
            let tile = board.tile(pos).unwrap();
            if tile.bonus.is_some() {
                assert!(tile.treasure.is_none());
                assert!(!board.is_corner(pos));
            }
        }
        let spawned = engine
            .drain_events()
            .into_iter()
            .filter(|event| matches!(event, GameEvent::BonusSpawned { .. }))
            .count();
        assert_eq!(spawned, board_bonus_count(&engine));
    }

    fn board_bonus_count(engine: &GameEngine) -> usize {
        engine.board().map(Board::bonuses_on_board).unwrap_or(0)
    }

    #[test]
    fn apply_dispatches_like_direct_calls() {
        let mut engine = started(2, 18);
        engine.apply(&pid("p1"), Action::RotateSpare).unwrap();
        engine
            .apply(
                &pid("p1"),
                Action::Push {
                    index: 5,
                    direction: Direction::Left,
                },
            )
            .unwrap();
        let outcome = engine
            .apply(
                &pid("p1"),
                Action::Move {
                    target: Position::new(0, 0),
                },
            )
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::TurnAdvanced { .. }));
    }

    #[test]
    fn same_seed_replays_identically() {
        let a = started(2, 99);
        let b = started(2, 99);
        assert_eq!(fingerprint(&a).len(), fingerprint(&b).len());
        assert_eq!(
            serde_json::to_string(&a.snapshot().board).unwrap(),
            serde_json::to_string(&b.snapshot().board).unwrap()
        );
    }
}
