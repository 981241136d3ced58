use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    pub fn clockwise(self) -> Self {
        match self {
            Self::Up => Self::Right,
            Self::Right => Self::Down,
            Self::Down => Self::Left,
            Self::Left => Self::Up,
        }
    }

    /// Vertical pushes address a column, horizontal pushes a row.
    pub fn is_vertical(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Neighbouring cell inside a `rows` x `cols` grid.
    pub fn step(self, dir: Direction, rows: usize, cols: usize) -> Option<Self> {
        match dir {
            Direction::Up if self.row > 0 => Some(Self::new(self.row - 1, self.col)),
            Direction::Down if self.row + 1 < rows => Some(Self::new(self.row + 1, self.col)),
            Direction::Left if self.col > 0 => Some(Self::new(self.row, self.col - 1)),
            Direction::Right if self.col + 1 < cols => Some(Self::new(self.row, self.col + 1)),
            _ => None,
        }
    }

    pub fn manhattan(self, other: Position) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// Stable participant identity. Survives reconnects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Volatile connection handle. A new one is issued for every connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreasureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusKind {
    Beam,
    Swap,
    PushFixed,
    PushTwice,
}

impl BonusKind {
    pub const ALL: [BonusKind; 4] = [
        BonusKind::Beam,
        BonusKind::Swap,
        BonusKind::PushFixed,
        BonusKind::PushTwice,
    ];

    pub fn usable_in(self, state: TurnState) -> bool {
        match self {
            Self::PushFixed | Self::PushTwice => state == TurnState::WaitingForPush,
            Self::Beam | Self::Swap => state == TurnState::WaitingForMove,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Corner,
    Straight,
    /// Three-way junction.
    Cross,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerColor {
    Blue,
    Red,
    Green,
    Yellow,
}

impl PlayerColor {
    pub const PALETTE: [PlayerColor; 4] = [
        PlayerColor::Blue,
        PlayerColor::Red,
        PlayerColor::Green,
        PlayerColor::Yellow,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnState {
    NotStarted,
    WaitingForPush,
    WaitingForMove,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    Victory,
    Timeout,
    Abandoned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    PushedOut,
    FirstTreasure,
    LongWalk,
}

#[derive(Clone, Debug)]
pub struct GameOptions {
    pub rows: usize,
    pub cols: usize,
    pub treasure_count: usize,
    pub duration_ms: u64,
    pub bonus_budget: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct TileView {
    pub openings: Vec<Direction>,
    pub shape: Shape,
    pub fixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treasure: Option<TreasureId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus: Option<BonusKind>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PushRecord {
    pub index: usize,
    pub direction: Direction,
}

#[derive(Clone, Debug, Serialize)]
pub struct BoardView {
    pub rows: usize,
    pub cols: usize,
    pub tiles: Vec<Vec<TileView>>,
    #[serde(rename = "spareTile")]
    pub spare_tile: Option<TileView>,
    #[serde(rename = "lastPush")]
    pub last_push: Option<PushRecord>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub color: PlayerColor,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    pub connected: bool,
    pub ai: bool,
    pub position: Option<Position>,
    pub home: Option<Position>,
    #[serde(rename = "currentTreasure")]
    pub current_treasure: Option<TreasureId>,
    #[serde(rename = "remainingTreasures")]
    pub remaining_treasures: usize,
    #[serde(rename = "collectedTreasures")]
    pub collected_treasures: usize,
    pub bonuses: Vec<BonusKind>,
    pub steps: usize,
    pub pushes: usize,
    pub score: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnView {
    #[serde(rename = "currentPlayerId")]
    pub current_player_id: Option<PlayerId>,
    pub state: TurnState,
    #[serde(rename = "deadlineMs")]
    pub deadline_ms: Option<u64>,
    #[serde(rename = "extraPushPending")]
    pub extra_push_pending: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameSnapshot {
    pub board: Option<BoardView>,
    pub players: Vec<PlayerView>,
    pub turn: TurnView,
    #[serde(rename = "bonusesOnBoard")]
    pub bonuses_on_board: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankingEntry {
    #[serde(rename = "playerId")]
    pub player_id: PlayerId,
    pub name: String,
    pub rank: usize,
    pub score: i64,
    pub treasures: usize,
    pub steps: usize,
    pub pushes: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameSummary {
    pub reason: GameOverReason,
    pub winner: Option<PlayerId>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    pub turns: u64,
    pub ranking: Vec<RankingEntry>,
    #[serde(rename = "finishedAtIso")]
    pub finished_at_iso: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    TreasureCollected {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        treasure: TreasureId,
        remaining: usize,
    },
    BonusCollected {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        bonus: BonusKind,
    },
    BonusUsed {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        bonus: BonusKind,
    },
    BonusSpawned {
        bonus: BonusKind,
        position: Position,
    },
    PushedOut {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        from: Position,
        to: Position,
    },
    AchievementUnlocked {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        achievement: Achievement,
    },
    TurnSkipped {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
    GameOver {
        summary: GameSummary,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct LobbyPlayerView {
    pub id: PlayerId,
    pub name: String,
    pub color: PlayerColor,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    pub connected: bool,
    pub ai: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct LobbyView {
    pub players: Vec<LobbyPlayerView>,
    pub running: bool,
    #[serde(rename = "adminId")]
    pub admin_id: Option<PlayerId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_clockwise_turns_return_to_start() {
        for dir in Direction::ALL {
            let turned = dir.clockwise().clockwise().clockwise().clockwise();
            assert_eq!(turned, dir);
            assert_eq!(dir.clockwise().clockwise(), dir.opposite());
        }
    }

    #[test]
    fn step_stops_at_grid_edge() {
        let corner = Position::new(0, 0);
        assert_eq!(corner.step(Direction::Up, 7, 7), None);
        assert_eq!(corner.step(Direction::Left, 7, 7), None);
        assert_eq!(corner.step(Direction::Down, 7, 7), Some(Position::new(1, 0)));
        assert_eq!(
            Position::new(6, 6).step(Direction::Right, 7, 7),
            None
        );
    }

    #[test]
    fn bonus_phase_gates() {
        assert!(BonusKind::PushTwice.usable_in(TurnState::WaitingForPush));
        assert!(BonusKind::PushFixed.usable_in(TurnState::WaitingForPush));
        assert!(!BonusKind::Beam.usable_in(TurnState::WaitingForPush));
        assert!(BonusKind::Swap.usable_in(TurnState::WaitingForMove));
        assert!(!BonusKind::PushTwice.usable_in(TurnState::WaitingForMove));
        assert!(!BonusKind::Beam.usable_in(TurnState::NotStarted));
    }
}
