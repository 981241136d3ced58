//! Keeps a game alive when a participant drops: automated control takes over
//! their turns until they reconnect.

use serde_json::json;
use tracing::{debug, info, warn};

use crate::ai;
use crate::engine::{Action, ActionOutcome};
use crate::error::{GameError, GameResult};
use crate::room::{GameHandle, GameRoom, Origin};
use crate::timer::CountdownTimer;
use crate::types::{GameOverReason, PlayerId, Position, SessionId, TurnState};

/// Upper bound on planning rounds in one cycle. A push-twice turn needs
/// three: push, push, move.
const MAX_CYCLE_ROUNDS: usize = 4;

/// The game and turn a decision cycle was spawned for.
#[derive(Clone, Copy, Debug)]
struct Cycle {
    id: u64,
    epoch: u64,
    turn: u64,
}

impl Cycle {
    /// Same game, same turn, and not superseded by a reconnect.
    fn is_current(self, room: &GameRoom, player: &PlayerId) -> bool {
        room.epoch == self.epoch
            && room.engine.turns_played() == self.turn
            && room.cycles_in_flight.get(&(player.clone(), self.turn)) == Some(&self.id)
    }
}

/// One planned slice of a turn, computed under the lock.
enum Step {
    Submit(Vec<Action>),
    /// The tie-breaker picks among these before submitting a move.
    Choose(Vec<Position>),
}

impl GameHandle {
    pub(crate) fn disconnect_locked(&self, room: &mut GameRoom, session: SessionId) {
        let Some(player) = room.engine.disconnect(session) else {
            return;
        };
        if !room.engine.is_running() {
            if let Err(error) = room.engine.leave(&player) {
                warn!(%error, player = %player, "lobby departure failed");
            }
            room.forget_departed();
            info!(player = %player, "left lobby on disconnect");
            self.broadcast_lobby(room);
            return;
        }

        info!(player = %player, "disconnected, automated control engaged");
        if let Err(error) = room.engine.set_ai_controlled(&player, true) {
            warn!(%error, player = %player, "could not engage automated control");
            return;
        }
        if room.engine.roster().all_disconnected() {
            info!("every participant disconnected");
            self.end_locked(room, GameOverReason::Abandoned);
            return;
        }

        self.arm_reconnect_timer(room, &player);
        if room.engine.current_player() == Some(&player) {
            self.schedule_cycle(room, player.clone());
        }
        self.broadcast_lobby(room);
        self.broadcast_state(room);
    }

    pub(crate) fn reconnect_locked(
        &self,
        room: &mut GameRoom,
        player: &PlayerId,
        session: SessionId,
    ) -> GameResult<()> {
        room.engine.reconnect(player, session)?;
        if let Some(timer) = room.reconnect_timers.remove(player) {
            timer.stop();
        }
        if room.engine.is_running() {
            room.engine.set_ai_controlled(player, false)?;
        }
        // A cycle still sleeping for this turn loses ownership, so a later
        // disconnect in the same turn can schedule a fresh one.
        let turn = room.engine.turns_played();
        room.cycles_in_flight.remove(&(player.clone(), turn));
        info!(player = %player, %session, "reconnected");
        self.outbound.send_to(
            session,
            &json!({
                "type": "welcome",
                "playerId": player,
                "reconnectToken": room.token_of(player),
                "reconnected": true,
            }),
        );
        self.broadcast_lobby(room);
        if room.engine.is_running() {
            self.broadcast_state(room);
        }
        Ok(())
    }

    fn arm_reconnect_timer(&self, room: &mut GameRoom, player: &PlayerId) {
        let epoch = room.epoch;
        let weak = self.downgrade();
        let owner = player.clone();
        let timer = room
            .reconnect_timers
            .entry(player.clone())
            .or_insert_with(|| CountdownTimer::new(format!("reconnect:{player}")));
        timer.start(self.config.reconnect_grace, move || async move {
            if let Some(handle) = weak.upgrade() {
                handle.on_grace_expired(owner, epoch).await;
            }
        });
    }

    async fn on_grace_expired(&self, player: PlayerId, epoch: u64) {
        let mut room = self.lock().await;
        if room.epoch != epoch {
            return;
        }
        room.reconnect_timers.remove(&player);
        let still_away = room
            .engine
            .roster()
            .get(&player)
            .map(|p| !p.identity.connected)
            .unwrap_or(false);
        if !still_away || !room.engine.is_ai_controlled(&player) {
            debug!(player = %player, "grace expired after reconnect, nothing to do");
            return;
        }
        info!(player = %player, "grace period over, participant stays under automated control");
        self.schedule_cycle(&mut room, player);
    }

    /// Spawns a decision cycle for the current turn unless one is already
    /// running for it.
    pub(crate) fn schedule_cycle(&self, room: &mut GameRoom, player: PlayerId) {
        let turn = room.engine.turns_played();
        if room.cycles_in_flight.contains_key(&(player.clone(), turn)) {
            return;
        }
        let cycle = Cycle {
            id: room.next_cycle_id,
            epoch: room.epoch,
            turn,
        };
        room.next_cycle_id += 1;
        room.cycles_in_flight.insert((player.clone(), turn), cycle.id);
        let handle = self.clone();
        tokio::spawn(async move {
            handle.run_decision_cycle(player, cycle).await;
        });
    }

    async fn run_decision_cycle(&self, player: PlayerId, cycle: Cycle) {
        match self.drive_turn(&player, cycle).await {
            Ok(()) => debug!(player = %player, "decision cycle finished"),
            Err(GameError::NotAiControlled(_)) => {
                info!(player = %player, "decision cycle superseded")
            }
            Err(error) => warn!(%error, player = %player, "decision cycle stopped"),
        }
        let mut room = self.lock().await;
        let key = (player, cycle.turn);
        if room.cycles_in_flight.get(&key) == Some(&cycle.id) {
            room.cycles_in_flight.remove(&key);
        }
    }

    /// Plans and submits the turn slice by slice. Every submission re-enters
    /// the lock and is refused once the participant is manual again.
    async fn drive_turn(&self, player: &PlayerId, cycle: Cycle) -> GameResult<()> {
        for _ in 0..MAX_CYCLE_ROUNDS {
            tokio::time::sleep(self.config.ai_step_delay).await;
            let actions = match self.plan_step(player, cycle).await? {
                None => return Ok(()),
                Some(Step::Submit(actions)) => actions,
                Some(Step::Choose(candidates)) => {
                    let chosen = self.tie_breaker.choose(player, &candidates).await;
                    let target = if candidates.contains(&chosen) {
                        chosen
                    } else {
                        candidates[0]
                    };
                    vec![Action::Move { target }]
                }
            };
            for action in actions {
                tokio::time::sleep(self.config.ai_step_delay).await;
                let outcome = self.submit(player, cycle, action).await?;
                if !matches!(outcome, ActionOutcome::Applied) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    async fn submit(
        &self,
        player: &PlayerId,
        cycle: Cycle,
        action: Action,
    ) -> GameResult<ActionOutcome> {
        let mut room = self.lock().await;
        if !cycle.is_current(&room, player) {
            return Err(GameError::NotAiControlled(player.clone()));
        }
        debug!(player = %player, ?action, "automated action");
        self.apply_locked(&mut room, player, action, Origin::Ai)
    }

    /// `None` once the game or the turn has moved on.
    async fn plan_step(&self, player: &PlayerId, cycle: Cycle) -> GameResult<Option<Step>> {
        let room = self.lock().await;
        if !cycle.is_current(&room, player) || room.engine.current_player() != Some(player) {
            return Ok(None);
        }
        if !room.engine.is_ai_controlled(player) {
            return Err(GameError::NotAiControlled(player.clone()));
        }
        let engine = &room.engine;

        match engine.turn().state {
            TurnState::NotStarted => Ok(None),
            TurnState::WaitingForPush => {
                let plan = ai::plan_push(engine, player).ok_or(GameError::NoSpareTile)?;
                Ok(Some(Step::Submit(plan.actions())))
            }
            TurnState::WaitingForMove => match ai::plan_move_bonus(engine, player) {
                Some(plan) => Ok(Some(Step::Submit(vec![plan.action()]))),
                None => {
                    let candidates = ai::move_candidates(engine, player);
                    if candidates.is_empty() {
                        return Err(GameError::Unreachable(
                            engine
                                .roster()
                                .get(player)
                                .map(|p| p.state.position)
                                .unwrap_or_default(),
                        ));
                    }
                    Ok(Some(Step::Choose(candidates)))
                }
            },
        }
    }
}
