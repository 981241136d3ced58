use thiserror::Error;

use crate::types::{BonusKind, Direction, PlayerId, Position, SessionId, TurnState};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GameError {
    // lobby
    #[error("display name `{0}` is already taken")]
    DuplicateName(String),
    #[error("the table is full")]
    RosterFull,
    #[error("unknown participant {0}")]
    UnknownPlayer(PlayerId),
    #[error("{0} has not joined")]
    UnknownSession(SessionId),
    #[error("this connection already plays as {0}")]
    SessionAlreadyBound(PlayerId),
    #[error("{0} is still connected")]
    AlreadyConnected(PlayerId),
    #[error("only the admin can do that")]
    NotAdmin,
    #[error("a game is already running")]
    AlreadyRunning,
    #[error("no game is running")]
    NotRunning,
    #[error("invalid game options: {0}")]
    InvalidOptions(String),

    // turn and phase
    #[error("it is not {0}'s turn")]
    NotYourTurn(PlayerId),
    #[error("action not allowed while {0:?}")]
    WrongPhase(TurnState),
    #[error("push-twice is already in effect this turn")]
    ExtraPushPending,
    #[error("participant {0} is no longer AI-controlled")]
    NotAiControlled(PlayerId),

    // illegal target
    #[error("line index {index} is out of range for a {direction:?} push")]
    IndexOutOfRange { index: usize, direction: Direction },
    #[error("pushing line {index} {direction:?} would undo the previous push")]
    ReversePush { index: usize, direction: Direction },
    #[error("line {0} holds fixed tiles")]
    FixedLine(usize),
    #[error("line {0} holds a start corner")]
    CornerLine(usize),
    #[error("cell {0} is off the board")]
    OutOfBounds(Position),
    #[error("cell {0} is not reachable")]
    Unreachable(Position),
    #[error("cell {0} is occupied")]
    Occupied(Position),
    #[error("cannot swap with yourself")]
    SelfSwap,

    // resources
    #[error("no {0:?} bonus held")]
    BonusNotHeld(BonusKind),
    #[error("bonus inventory is full")]
    BonusInventoryFull,
    #[error("no spare tile is available")]
    NoSpareTile,

    // structural
    #[error("board generation could not withhold a spare tile")]
    GenerationFailed,
    #[error("game ended without an eligible winner")]
    NoEligibleWinner,
}

impl GameError {
    /// Stable code forwarded to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateName(_) => "duplicate_name",
            Self::RosterFull => "roster_full",
            Self::UnknownPlayer(_) => "unknown_player",
            Self::UnknownSession(_) => "unknown_session",
            Self::SessionAlreadyBound(_) => "already_joined",
            Self::AlreadyConnected(_) => "already_connected",
            Self::NotAdmin => "not_admin",
            Self::AlreadyRunning => "already_running",
            Self::NotRunning => "not_running",
            Self::InvalidOptions(_) => "invalid_options",
            Self::NotYourTurn(_) => "not_your_turn",
            Self::WrongPhase(_) => "wrong_phase",
            Self::ExtraPushPending => "extra_push_pending",
            Self::NotAiControlled(_) => "not_ai_controlled",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::ReversePush { .. } => "illegal_push",
            Self::FixedLine(_) => "fixed_line",
            Self::CornerLine(_) => "corner_line",
            Self::OutOfBounds(_) => "out_of_bounds",
            Self::Unreachable(_) => "unreachable",
            Self::Occupied(_) => "occupied",
            Self::SelfSwap => "self_swap",
            Self::BonusNotHeld(_) => "bonus_not_held",
            Self::BonusInventoryFull => "bonus_inventory_full",
            Self::NoSpareTile => "no_spare_tile",
            Self::GenerationFailed => "generation_failed",
            Self::NoEligibleWinner => "no_eligible_winner",
        }
    }

    /// Structural failures abort game start or game end.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::GenerationFailed | Self::NoEligibleWinner)
    }
}

pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_structural_errors_are_fatal() {
        assert!(GameError::GenerationFailed.is_fatal());
        assert!(GameError::NoEligibleWinner.is_fatal());
        assert!(!GameError::NoSpareTile.is_fatal());
        assert!(!GameError::SelfSwap.is_fatal());
    }

    #[test]
    fn reverse_push_maps_to_illegal_push_code() {
        let err = GameError::ReversePush {
            index: 1,
            direction: Direction::Up,
        };
        assert_eq!(err.code(), "illegal_push");
    }
}
