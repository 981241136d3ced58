pub mod ai;
pub mod board;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod failover;
pub mod outbound;
pub mod protocol;
pub mod reachability;
pub mod rng;
pub mod room;
pub mod roster;
pub mod server_utils;
pub mod timer;
pub mod types;
