use std::collections::{HashMap, VecDeque};

use crate::constants::{MAX_BONUS_STOCK, MAX_PLAYERS};
use crate::error::{GameError, GameResult};
use crate::rng::Rng;
use crate::types::{
    BonusKind, LobbyPlayerView, LobbyView, PlayerColor, PlayerId, Position, SessionId, TreasureId,
};

#[derive(Clone, Debug)]
pub struct ParticipantIdentity {
    pub id: PlayerId,
    pub name: String,
    pub color: PlayerColor,
    pub session: Option<SessionId>,
    pub connected: bool,
    pub is_admin: bool,
    pub ai_controlled: bool,
}

#[derive(Clone, Debug, Default)]
pub struct TurnCounters {
    pub steps: usize,
    pub pushed_out: bool,
    pub collected_this_turn: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ParticipantState {
    pub position: Position,
    pub home: Position,
    /// Assigned treasures; the front is the current target.
    pub treasures: VecDeque<TreasureId>,
    pub collected: usize,
    pub bonuses: Vec<BonusKind>,
    pub total_steps: usize,
    pub total_pushes: usize,
    pub turn: TurnCounters,
}

impl ParticipantState {
    pub fn current_treasure(&self) -> Option<TreasureId> {
        self.treasures.front().copied()
    }

    pub fn remaining_treasures(&self) -> usize {
        self.treasures.len()
    }

    pub fn holds_bonus(&self, kind: BonusKind) -> bool {
        self.bonuses.contains(&kind)
    }

    pub fn can_take_bonus(&self) -> bool {
        self.bonuses.len() < MAX_BONUS_STOCK
    }

    pub fn take_bonus(&mut self, kind: BonusKind) -> GameResult<()> {
        let idx = self
            .bonuses
            .iter()
            .position(|held| *held == kind)
            .ok_or(GameError::BonusNotHeld(kind))?;
        self.bonuses.remove(idx);
        Ok(())
    }

    pub fn give_bonus(&mut self, kind: BonusKind) -> GameResult<()> {
        if !self.can_take_bonus() {
            return Err(GameError::BonusInventoryFull);
        }
        self.bonuses.push(kind);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Participant {
    pub identity: ParticipantIdentity,
    pub state: ParticipantState,
}

impl Participant {
    pub fn id(&self) -> &PlayerId {
        &self.identity.id
    }
}

/// Up to four participants in seating order, plus the session lookup table.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    participants: Vec<Participant>,
    sessions: HashMap<SessionId, PlayerId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Participant> {
        self.participants.iter_mut()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id() == id)
    }

    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id() == id)
    }

    pub fn require(&self, id: &PlayerId) -> GameResult<&Participant> {
        self.get(id).ok_or_else(|| GameError::UnknownPlayer(id.clone()))
    }

    pub fn require_mut(&mut self, id: &PlayerId) -> GameResult<&mut Participant> {
        self.get_mut(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.clone()))
    }

    pub fn slot_of(&self, id: &PlayerId) -> Option<usize> {
        self.participants.iter().position(|p| p.id() == id)
    }

    pub fn player_by_session(&self, session: SessionId) -> Option<&PlayerId> {
        self.sessions.get(&session)
    }

    pub fn admin_id(&self) -> Option<&PlayerId> {
        self.participants
            .iter()
            .find(|p| p.identity.is_admin)
            .map(Participant::id)
    }

    pub fn connected_sessions(&self) -> Vec<SessionId> {
        self.participants
            .iter()
            .filter(|p| p.identity.connected)
            .filter_map(|p| p.identity.session)
            .collect()
    }

    pub fn all_disconnected(&self) -> bool {
        self.participants.iter().all(|p| !p.identity.connected)
    }

    pub fn join(&mut self, id: PlayerId, name: &str, session: SessionId) -> GameResult<()> {
        if self
            .participants
            .iter()
            .any(|p| p.identity.name.eq_ignore_ascii_case(name))
        {
            return Err(GameError::DuplicateName(name.to_string()));
        }
        if self.participants.len() >= MAX_PLAYERS {
            return Err(GameError::RosterFull);
        }
        if self.get(&id).is_some() {
            return Err(GameError::DuplicateName(name.to_string()));
        }
        let color = PlayerColor::PALETTE
            .into_iter()
            .find(|color| self.participants.iter().all(|p| p.identity.color != *color))
            .ok_or(GameError::RosterFull)?;

        let is_admin = self.admin_id().is_none();
        self.sessions.insert(session, id.clone());
        self.participants.push(Participant {
            identity: ParticipantIdentity {
                id,
                name: name.to_string(),
                color,
                session: Some(session),
                connected: true,
                is_admin,
                ai_controlled: false,
            },
            state: ParticipantState::default(),
        });
        Ok(())
    }

    /// Removes a participant entirely. The colour returns to the pool and the
    /// admin role moves on when its holder leaves.
    pub fn leave(&mut self, id: &PlayerId) -> GameResult<Participant> {
        let slot = self
            .slot_of(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.clone()))?;
        let removed = self.participants.remove(slot);
        if let Some(session) = removed.identity.session {
            self.sessions.remove(&session);
        }
        if removed.identity.is_admin {
            let next = self
                .participants
                .iter()
                .position(|p| p.identity.connected)
                .or(if self.participants.is_empty() { None } else { Some(0) });
            if let Some(next) = next {
                self.participants[next].identity.is_admin = true;
            }
        }
        Ok(removed)
    }

    /// Marks the participant bound to `session` as disconnected.
    pub fn disconnect(&mut self, session: SessionId) -> Option<PlayerId> {
        let id = self.sessions.remove(&session)?;
        let participant = self.get_mut(&id)?;
        participant.identity.session = None;
        participant.identity.connected = false;
        Some(id)
    }

    /// Rebinds a stable identity to a fresh session handle. A seat that is
    /// still connected keeps its session.
    pub fn reconnect(&mut self, id: &PlayerId, session: SessionId) -> GameResult<()> {
        let participant = self
            .get_mut(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.clone()))?;
        if participant.identity.connected {
            return Err(GameError::AlreadyConnected(id.clone()));
        }
        let previous = participant.identity.session.replace(session);
        participant.identity.connected = true;
        if let Some(previous) = previous {
            self.sessions.remove(&previous);
        }
        self.sessions.insert(session, id.clone());
        Ok(())
    }

    /// Participant after `current` in seating order. When `current` has left
    /// the table, `vacated_slot` (its former seat) is used instead, which after
    /// compaction already holds the next participant.
    pub fn next_in_rotation(
        &self,
        current: Option<&PlayerId>,
        vacated_slot: usize,
    ) -> Option<PlayerId> {
        if self.participants.is_empty() {
            return None;
        }
        let len = self.participants.len();
        let slot = match current.and_then(|id| self.slot_of(id)) {
            Some(slot) => (slot + 1) % len,
            None => vacated_slot % len,
        };
        Some(self.participants[slot].id().clone())
    }

    /// Seeds every participant for a new game: corner homes in table order
    /// (top-left, top-right, bottom-right, bottom-left) and an even share of
    /// the shuffled treasure deck. Remainders go to the last seats.
    pub fn seed_for_game(&mut self, corners: [Position; 4], mut deck: Vec<TreasureId>, rng: &mut Rng) {
        rng.shuffle(&mut deck);
        let seats = self.participants.len();
        if seats == 0 {
            return;
        }
        let base = deck.len() / seats;
        let remainder = deck.len() % seats;

        let mut deck = deck.into_iter();
        for (slot, participant) in self.participants.iter_mut().enumerate() {
            let share = base + usize::from(slot >= seats - remainder);
            let home = corners[slot % corners.len()];
            participant.state = ParticipantState {
                position: home,
                home,
                treasures: deck.by_ref().take(share).collect(),
                ..ParticipantState::default()
            };
        }
    }

    pub fn reset_game_state(&mut self) {
        for participant in &mut self.participants {
            participant.state = ParticipantState::default();
            participant.identity.ai_controlled = false;
        }
    }

    pub fn lobby_view(&self, running: bool) -> LobbyView {
        LobbyView {
            players: self
                .participants
                .iter()
                .map(|p| LobbyPlayerView {
                    id: p.identity.id.clone(),
                    name: p.identity.name.clone(),
                    color: p.identity.color,
                    is_admin: p.identity.is_admin,
                    connected: p.identity.connected,
                    ai: p.identity.ai_controlled,
                })
                .collect(),
            running,
            admin_id: self.admin_id().cloned(),
        }
    }
}
