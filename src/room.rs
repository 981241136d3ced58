use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::ai::TieBreaker;
use crate::constants::{
    game_duration_ms, AI_STEP_DELAY_MS, DEFAULT_BOARD_SIDE, DEFAULT_BONUS_BUDGET,
    DEFAULT_GAME_MINUTES, DEFAULT_TREASURE_COUNT, RECONNECT_GRACE_MS, TURN_TIMEOUT_MS,
};
use crate::engine::{Action, ActionOutcome, GameEngine};
use crate::error::{GameError, GameResult};
use crate::outbound::Outbound;
use crate::timer::CountdownTimer;
use crate::types::{GameOptions, GameOverReason, GameSnapshot, GameSummary, LobbyView, PlayerId, SessionId};

#[derive(Clone, Debug)]
pub struct RoomConfig {
    pub turn_timeout: Duration,
    pub reconnect_grace: Duration,
    /// Pause before each automated sub-step.
    pub ai_step_delay: Duration,
    pub default_options: GameOptions,
    pub seed: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_millis(TURN_TIMEOUT_MS),
            reconnect_grace: Duration::from_millis(RECONNECT_GRACE_MS),
            ai_step_delay: Duration::from_millis(AI_STEP_DELAY_MS),
            default_options: GameOptions {
                rows: DEFAULT_BOARD_SIDE,
                cols: DEFAULT_BOARD_SIDE,
                treasure_count: DEFAULT_TREASURE_COUNT,
                duration_ms: game_duration_ms(DEFAULT_GAME_MINUTES),
                bonus_budget: DEFAULT_BONUS_BUDGET,
            },
            seed: 1,
        }
    }
}

/// Who submits an action. Automated submissions are refused once the
/// participant is back under manual control.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Client,
    Ai,
}

/// Everything guarded by the per-game lock.
pub struct GameRoom {
    pub(crate) engine: GameEngine,
    /// Bumped whenever a game starts or ends; stale callbacks compare it.
    pub(crate) epoch: u64,
    pub(crate) game_timer: CountdownTimer,
    pub(crate) turn_timer: CountdownTimer,
    pub(crate) reconnect_timers: HashMap<PlayerId, CountdownTimer>,
    /// Keyed by participant and turn number; the value names the owning cycle.
    pub(crate) cycles_in_flight: HashMap<(PlayerId, u64), u64>,
    pub(crate) next_cycle_id: u64,
    /// Secret handed out in `welcome`; required to take a seat back.
    reconnect_tokens: HashMap<PlayerId, String>,
    next_player_seq: u64,
}

impl GameRoom {
    fn new(config: &RoomConfig) -> Self {
        Self {
            engine: GameEngine::new(config.seed).with_turn_timeout(config.turn_timeout.as_millis() as u64),
            epoch: 0,
            game_timer: CountdownTimer::new("game"),
            turn_timer: CountdownTimer::new("turn"),
            reconnect_timers: HashMap::new(),
            cycles_in_flight: HashMap::new(),
            next_cycle_id: 1,
            reconnect_tokens: HashMap::new(),
            next_player_seq: 1,
        }
    }

    fn make_player_id(&mut self) -> PlayerId {
        let id = PlayerId::new(format!("player_{}", self.next_player_seq));
        self.next_player_seq += 1;
        id
    }

    fn issue_token(&mut self, player: &PlayerId) -> String {
        let token = make_reconnect_token();
        self.reconnect_tokens.insert(player.clone(), token.clone());
        token
    }

    pub(crate) fn token_of(&self, player: &PlayerId) -> Option<&str> {
        self.reconnect_tokens.get(player).map(String::as_str)
    }

    fn player_for_token(&self, token: &str) -> Option<PlayerId> {
        self.reconnect_tokens
            .iter()
            .find(|(_, issued)| issued.as_str() == token)
            .map(|(player, _)| player.clone())
    }

    /// Drops tokens of identities no longer seated.
    pub(crate) fn forget_departed(&mut self) {
        let roster = self.engine.roster();
        self.reconnect_tokens
            .retain(|player, _| roster.get(player).is_some());
    }

    pub(crate) fn stop_all_timers(&mut self) {
        self.game_timer.stop();
        self.turn_timer.stop();
        for timer in self.reconnect_timers.values() {
            timer.stop();
        }
        self.reconnect_timers.clear();
    }
}

/// Cloneable handle to one game. Every mutation goes through the single
/// `Mutex<GameRoom>`.
#[derive(Clone)]
pub struct GameHandle {
    room: Arc<Mutex<GameRoom>>,
    pub(crate) outbound: Arc<dyn Outbound>,
    pub(crate) tie_breaker: Arc<dyn TieBreaker>,
    pub(crate) config: Arc<RoomConfig>,
}

/// What timer callbacks hold: it never keeps a finished room alive.
#[derive(Clone)]
pub(crate) struct WeakHandle {
    room: Weak<Mutex<GameRoom>>,
    outbound: Arc<dyn Outbound>,
    tie_breaker: Arc<dyn TieBreaker>,
    config: Arc<RoomConfig>,
}

impl WeakHandle {
    pub(crate) fn upgrade(&self) -> Option<GameHandle> {
        Some(GameHandle {
            room: self.room.upgrade()?,
            outbound: Arc::clone(&self.outbound),
            tie_breaker: Arc::clone(&self.tie_breaker),
            config: Arc::clone(&self.config),
        })
    }
}

impl GameHandle {
    pub fn new(config: RoomConfig, outbound: Arc<dyn Outbound>, tie_breaker: Arc<dyn TieBreaker>) -> Self {
        Self {
            room: Arc::new(Mutex::new(GameRoom::new(&config))),
            outbound,
            tie_breaker,
            config: Arc::new(config),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakHandle {
        WeakHandle {
            room: Arc::downgrade(&self.room),
            outbound: Arc::clone(&self.outbound),
            tie_breaker: Arc::clone(&self.tie_breaker),
            config: Arc::clone(&self.config),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, GameRoom> {
        self.room.lock().await
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Read-only access for tests and tooling.
    pub async fn with_engine<R>(&self, read: impl FnOnce(&GameEngine) -> R) -> R {
        let room = self.lock().await;
        read(&room.engine)
    }

    pub async fn snapshot(&self) -> GameSnapshot {
        self.lock().await.engine.snapshot()
    }

    pub async fn lobby(&self) -> LobbyView {
        let room = self.lock().await;
        room.engine.roster().lobby_view(room.engine.is_running())
    }

    // ---- inbound ---------------------------------------------------------------

    /// Joins the lobby, or reattaches the identity a reconnect token was
    /// issued for. An unknown token joins as a newcomer.
    pub async fn connect(
        &self,
        session: SessionId,
        name: &str,
        reconnect_token: Option<&str>,
    ) -> GameResult<PlayerId> {
        let mut room = self.lock().await;
        if let Some(bound) = room.engine.player_by_session(session) {
            return Err(GameError::SessionAlreadyBound(bound));
        }
        if let Some(id) = reconnect_token.and_then(|token| room.player_for_token(token)) {
            self.reconnect_locked(&mut room, &id, session)?;
            return Ok(id);
        }

        let id = room.make_player_id();
        room.engine.join(id.clone(), name, session)?;
        let token = room.issue_token(&id);
        info!(player = %id, %session, "joined lobby");
        self.outbound.send_to(
            session,
            &json!({
                "type": "welcome",
                "playerId": id,
                "reconnectToken": token,
                "reconnected": false,
            }),
        );
        self.broadcast_lobby(&room);
        Ok(id)
    }

    pub async fn start(&self, session: SessionId, options: Option<GameOptions>) -> GameResult<()> {
        let mut room = self.lock().await;
        let player = self.player_of(&room, session)?;
        let options = options.unwrap_or_else(|| self.config.default_options.clone());
        room.engine.start_game(&player, &options)?;
        room.epoch += 1;
        let epoch = room.epoch;
        info!(
            epoch,
            rows = options.rows,
            cols = options.cols,
            treasures = options.treasure_count,
            "game started"
        );

        let weak = self.downgrade();
        room.game_timer
            .start(Duration::from_millis(options.duration_ms), move || async move {
                if let Some(handle) = weak.upgrade() {
                    handle.on_game_timeout(epoch).await;
                }
            });
        self.arm_turn_timer(&mut room);
        self.broadcast(&room, &json!({ "type": "game_started", "epoch": epoch }));
        self.broadcast_state(&room);
        Ok(())
    }

    pub async fn act(&self, session: SessionId, action: Action) -> GameResult<ActionOutcome> {
        let mut room = self.lock().await;
        let player = self.player_of(&room, session)?;
        self.apply_locked(&mut room, &player, action, Origin::Client)
    }

    pub async fn leave(&self, session: SessionId) -> GameResult<()> {
        let mut room = self.lock().await;
        let player = self.player_of(&room, session)?;
        let was_running = room.engine.is_running();
        let outcome = room.engine.leave(&player)?;
        if let Some(timer) = room.reconnect_timers.remove(&player) {
            timer.stop();
        }
        room.forget_departed();
        info!(player = %player, "left");
        if was_running && !room.engine.is_running() {
            info!("table emptied, game aborted");
            room.epoch += 1;
            room.stop_all_timers();
        }
        match outcome {
            Some(outcome) => self.after_change(&mut room, &outcome),
            None => self.flush_events(&mut room),
        }
        if room.engine.is_running() && room.engine.roster().all_disconnected() {
            self.end_locked(&mut room, GameOverReason::Abandoned);
        }
        self.broadcast_lobby(&room);
        if room.engine.is_running() {
            self.broadcast_state(&room);
        }
        Ok(())
    }

    pub async fn disconnect(&self, session: SessionId) {
        let mut room = self.lock().await;
        self.disconnect_locked(&mut room, session);
    }

    pub fn report_error(&self, session: SessionId, error: &GameError) {
        if error.is_fatal() {
            warn!(%session, %error, "structural failure");
        } else {
            debug!(%session, %error, "action rejected");
        }
        self.outbound.send_to(
            session,
            &json!({ "type": "error", "code": error.code(), "message": error.to_string() }),
        );
    }

    // ---- shared locked path ----------------------------------------------------

    /// Single entry point for every gameplay action, human or automated.
    pub(crate) fn apply_locked(
        &self,
        room: &mut GameRoom,
        player: &PlayerId,
        action: Action,
        origin: Origin,
    ) -> GameResult<ActionOutcome> {
        if origin == Origin::Ai && !room.engine.is_ai_controlled(player) {
            return Err(GameError::NotAiControlled(player.clone()));
        }
        let outcome = room.engine.apply(player, action)?;
        self.after_change(room, &outcome);
        Ok(outcome)
    }

    pub(crate) fn after_change(&self, room: &mut GameRoom, outcome: &ActionOutcome) {
        self.flush_events(room);
        match outcome {
            ActionOutcome::Applied => self.broadcast_state(room),
            ActionOutcome::TurnAdvanced { next } => {
                debug!(next = %next, "turn advanced");
                self.arm_turn_timer(room);
                self.broadcast_state(room);
                if room.engine.is_ai_controlled(next) {
                    self.schedule_cycle(room, next.clone());
                }
            }
            ActionOutcome::GameOver(summary) => self.conclude(room, summary),
        }
    }

    /// Game finished: timers stop, callbacks from this game go stale, and the
    /// result is published.
    pub(crate) fn conclude(&self, room: &mut GameRoom, summary: &GameSummary) {
        info!(
            reason = ?summary.reason,
            winner = ?summary.winner,
            turns = summary.turns,
            "game over"
        );
        room.epoch += 1;
        room.stop_all_timers();
        room.cycles_in_flight.clear();
        room.forget_departed();
        self.broadcast(room, &json!({ "type": "game_over", "summary": summary }));
        self.broadcast_lobby(room);
    }

    pub(crate) fn end_locked(&self, room: &mut GameRoom, reason: GameOverReason) {
        match room.engine.end_game(reason) {
            Ok(summary) => {
                self.flush_events(room);
                self.conclude(room, &summary);
            }
            Err(error) => warn!(%error, ?reason, "could not end game"),
        }
    }

    fn arm_turn_timer(&self, room: &mut GameRoom) {
        let epoch = room.epoch;
        let turn = room.engine.turns_played();
        let weak = self.downgrade();
        room.turn_timer.start(self.config.turn_timeout, move || async move {
            if let Some(handle) = weak.upgrade() {
                handle.on_turn_timeout(epoch, turn).await;
            }
        });
    }

    async fn on_turn_timeout(&self, epoch: u64, turn: u64) {
        let mut room = self.lock().await;
        if room.epoch != epoch || room.engine.turns_played() != turn {
            return;
        }
        match room.engine.skip_turn() {
            Ok(next) => {
                info!(next = %next, "turn deadline passed, turn skipped");
                self.after_change(&mut room, &ActionOutcome::TurnAdvanced { next });
            }
            Err(error) => warn!(%error, "turn timeout ignored"),
        }
    }

    async fn on_game_timeout(&self, epoch: u64) {
        let mut room = self.lock().await;
        if room.epoch != epoch {
            return;
        }
        info!("game clock expired");
        self.end_locked(&mut room, GameOverReason::Timeout);
    }

    // ---- outbound ----------------------------------------------------------------

    fn player_of(&self, room: &GameRoom, session: SessionId) -> GameResult<PlayerId> {
        room.engine
            .player_by_session(session)
            .ok_or(GameError::UnknownSession(session))
    }

    pub(crate) fn flush_events(&self, room: &mut GameRoom) {
        for event in room.engine.drain_events() {
            self.broadcast(room, &json!({ "type": "event", "event": event }));
        }
    }

    pub(crate) fn broadcast(&self, room: &GameRoom, message: &Value) {
        self.outbound
            .broadcast(&room.engine.roster().connected_sessions(), message);
    }

    pub(crate) fn broadcast_state(&self, room: &GameRoom) {
        self.broadcast(room, &json!({ "type": "state", "state": room.engine.snapshot() }));
    }

    pub(crate) fn broadcast_lobby(&self, room: &GameRoom) {
        let lobby = room.engine.roster().lobby_view(room.engine.is_running());
        self.broadcast(room, &json!({ "type": "lobby", "lobby": lobby }));
    }
}

fn make_reconnect_token() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}
