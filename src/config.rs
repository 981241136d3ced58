use std::time::Duration;

use clap::Parser;

use crate::constants::{
    game_duration_ms, AI_STEP_DELAY_MS, DEFAULT_BOARD_SIDE, DEFAULT_BONUS_BUDGET,
    DEFAULT_GAME_MINUTES, DEFAULT_TREASURE_COUNT, RECONNECT_GRACE_MS, TURN_TIMEOUT_MS,
};
use crate::room::RoomConfig;
use crate::types::GameOptions;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative server for the shifting maze board game")]
pub struct ServerConfig {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
    #[arg(long, env = "TURN_TIMEOUT_SECS", default_value_t = TURN_TIMEOUT_MS / 1000)]
    pub turn_timeout_secs: u64,
    #[arg(long, env = "RECONNECT_GRACE_SECS", default_value_t = RECONNECT_GRACE_MS / 1000)]
    pub reconnect_grace_secs: u64,
    #[arg(long, env = "AI_STEP_DELAY_MS", default_value_t = AI_STEP_DELAY_MS)]
    pub ai_step_delay_ms: u64,
    #[arg(long, default_value_t = DEFAULT_BOARD_SIDE)]
    pub rows: usize,
    #[arg(long, default_value_t = DEFAULT_BOARD_SIDE)]
    pub cols: usize,
    #[arg(long, default_value_t = DEFAULT_TREASURE_COUNT)]
    pub treasures: usize,
    #[arg(long, default_value_t = DEFAULT_GAME_MINUTES)]
    pub minutes: u64,
    #[arg(long, default_value_t = DEFAULT_BONUS_BUDGET)]
    pub bonus_budget: u32,
    /// Seed for board generation and the default tie-breaker.
    #[arg(long, env = "GAME_SEED")]
    pub seed: Option<u32>,
}

impl ServerConfig {
    pub fn room_config(&self, fallback_seed: u32) -> RoomConfig {
        RoomConfig {
            turn_timeout: Duration::from_secs(self.turn_timeout_secs),
            reconnect_grace: Duration::from_secs(self.reconnect_grace_secs),
            ai_step_delay: Duration::from_millis(self.ai_step_delay_ms),
            default_options: GameOptions {
                rows: self.rows,
                cols: self.cols,
                treasure_count: self.treasures,
                duration_ms: game_duration_ms(self.minutes),
                bonus_budget: self.bonus_budget,
            },
            seed: self.seed.unwrap_or(fallback_seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_room_defaults() {
        let config = ServerConfig::parse_from(["server"]);
        let room = config.room_config(7);
        let defaults = RoomConfig::default();
        assert_eq!(room.turn_timeout, defaults.turn_timeout);
        assert_eq!(room.reconnect_grace, defaults.reconnect_grace);
        assert_eq!(room.ai_step_delay, defaults.ai_step_delay);
        assert_eq!(room.default_options.rows, 7);
        assert_eq!(room.default_options.treasure_count, 24);
        assert_eq!(room.default_options.duration_ms, 30 * 60_000);
        assert_eq!(room.seed, 7);
    }

    #[test]
    fn flags_override_defaults() {
        let config = ServerConfig::parse_from([
            "server",
            "--turn-timeout-secs",
            "5",
            "--rows",
            "9",
            "--seed",
            "42",
        ]);
        let room = config.room_config(1);
        assert_eq!(room.turn_timeout, Duration::from_secs(5));
        assert_eq!(room.default_options.rows, 9);
        assert_eq!(room.seed, 42);
    }
}
