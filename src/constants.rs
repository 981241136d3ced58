pub const MAX_PLAYERS: usize = 4;
pub const MAX_BONUS_STOCK: usize = 5;

pub const TURN_TIMEOUT_MS: u64 = 60_000;
pub const RECONNECT_GRACE_MS: u64 = 30_000;
pub const AI_STEP_DELAY_MS: u64 = 400;

pub const DEFAULT_BOARD_SIDE: usize = 7;
pub const MIN_BOARD_SIDE: usize = 5;
pub const MAX_BOARD_SIDE: usize = 11;
pub const DEFAULT_TREASURE_COUNT: usize = 24;
pub const DEFAULT_GAME_MINUTES: u64 = 30;
pub const DEFAULT_BONUS_BUDGET: u32 = 12;

pub const TREASURE_SCORE_WEIGHT: i64 = 100;
pub const LONG_WALK_STEPS: usize = 8;

/// Shape ratio of a 7x7 board including the spare: corner, cross, straight.
pub const BASELINE_SHAPE_RATIO: (usize, usize, usize) = (20, 18, 12);
pub const BASELINE_TILE_TOTAL: usize = 50;

/// Bonus spawn chance by number of bonuses already lying on the board.
pub fn bonus_spawn_chance(bonuses_on_board: usize) -> f32 {
    if bonuses_on_board <= 1 {
        return 0.4;
    }
    if bonuses_on_board <= 3 {
        return 0.33;
    }
    0.0
}

pub fn game_duration_ms(minutes: u64) -> u64 {
    minutes * 60 * 1000
}
