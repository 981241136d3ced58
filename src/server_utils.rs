use crate::constants::{game_duration_ms, MAX_BOARD_SIDE, MIN_BOARD_SIDE};
use crate::types::GameOptions;

const MAX_NAME_CHARS: usize = 16;
const MAX_GAME_MINUTES: i64 = 120;

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(MAX_NAME_CHARS).collect()
}

/// Clamps into the playable range and rounds even sides down so every
/// line keeps fixed tiles on both ends.
pub fn normalize_board_side(value: Option<i64>, default: usize) -> usize {
    let Some(side) = value else {
        return default;
    };
    let side = side.clamp(MIN_BOARD_SIDE as i64, MAX_BOARD_SIDE as i64) as usize;
    if side % 2 == 0 {
        side - 1
    } else {
        side
    }
}

/// Lower bound only; the engine checks the count against the board.
pub fn normalize_treasure_count(value: Option<i64>, default: usize) -> usize {
    value.map_or(default, |count| count.max(1) as usize)
}

pub fn normalize_minutes_ms(value: Option<i64>, default_ms: u64) -> u64 {
    value.map_or(default_ms, |minutes| {
        game_duration_ms(minutes.clamp(1, MAX_GAME_MINUTES) as u64)
    })
}

pub fn start_options(
    defaults: &GameOptions,
    rows: Option<i64>,
    cols: Option<i64>,
    treasures: Option<i64>,
    minutes: Option<i64>,
) -> GameOptions {
    GameOptions {
        rows: normalize_board_side(rows, defaults.rows),
        cols: normalize_board_side(cols, defaults.cols),
        treasure_count: normalize_treasure_count(treasures, defaults.treasure_count),
        duration_ms: normalize_minutes_ms(minutes, defaults.duration_ms),
        bonus_budget: defaults.bonus_budget,
    }
}
