use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use maze_shift_server::ai::{self, SeededTieBreaker, TieBreaker};
use maze_shift_server::constants::{
    game_duration_ms, DEFAULT_BOARD_SIDE, DEFAULT_BONUS_BUDGET, DEFAULT_GAME_MINUTES,
    MAX_PLAYERS,
};
use maze_shift_server::engine::{Action, ActionOutcome, GameEngine};
use maze_shift_server::error::{GameError, GameResult};
use maze_shift_server::server_utils::normalize_board_side;
use maze_shift_server::types::{
    GameEvent, GameOptions, GameOverReason, GameSummary, PlayerId, SessionId, TurnState,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Rounds of planning per turn: push, optional second push, move.
const MAX_TURN_ROUNDS: usize = 4;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs automated matches headlessly")]
struct Cli {
    #[arg(long, default_value_t = 10)]
    matches: usize,
    #[arg(long, default_value_t = 2)]
    players: usize,
    #[arg(long, default_value_t = 1)]
    seed: u32,
    #[arg(long)]
    rows: Option<i64>,
    #[arg(long, default_value_t = 8)]
    treasures: usize,
    /// Ends a match as a timeout after this many turns.
    #[arg(long, default_value_t = 2_000)]
    max_turns: u64,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize)]
struct Tally {
    #[serde(rename = "treasuresCollected")]
    treasures_collected: usize,
    #[serde(rename = "bonusesUsed")]
    bonuses_used: usize,
    #[serde(rename = "pushedOut")]
    pushed_out: usize,
    #[serde(rename = "turnsSkipped")]
    turns_skipped: usize,
}

impl Tally {
    /// Returns the summary when the events include the end of the game.
    fn absorb(&mut self, events: Vec<GameEvent>) -> Option<GameSummary> {
        let mut summary = None;
        for event in events {
            match event {
                GameEvent::TreasureCollected { .. } => self.treasures_collected += 1,
                GameEvent::BonusUsed { .. } => self.bonuses_used += 1,
                GameEvent::PushedOut { .. } => self.pushed_out += 1,
                GameEvent::TurnSkipped { .. } => self.turns_skipped += 1,
                GameEvent::GameOver { summary: finished } => summary = Some(finished),
                _ => {}
            }
        }
        summary
    }
}

#[derive(Clone, Debug, Serialize)]
struct MatchResultLine {
    seed: u32,
    players: usize,
    reason: GameOverReason,
    winner: Option<PlayerId>,
    turns: u64,
    ranking: Vec<PlayerId>,
    #[serde(flatten)]
    tally: Tally,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchCount")]
    match_count: usize,
    #[serde(rename = "errorCount")]
    error_count: usize,
    #[serde(rename = "averageTurns")]
    average_turns: u64,
    #[serde(rename = "reasonCounts")]
    reason_counts: BTreeMap<String, usize>,
    matches: Vec<MatchResultLine>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = GameOptions {
        rows: normalize_board_side(cli.rows, DEFAULT_BOARD_SIDE),
        cols: normalize_board_side(cli.rows, DEFAULT_BOARD_SIDE),
        treasure_count: cli.treasures,
        duration_ms: game_duration_ms(DEFAULT_GAME_MINUTES),
        bonus_budget: DEFAULT_BONUS_BUDGET,
    };
    let players = cli.players.clamp(1, MAX_PLAYERS);

    let mut results = Vec::new();
    for idx in 0..cli.matches {
        let seed = cli.seed.wrapping_add(idx as u32);
        info!(seed, players, "match started");
        let result = run_match(seed, players, &options, cli.max_turns).await;
        match &result.error {
            Some(error) => warn!(seed, %error, "match hit an engine error"),
            None => info!(seed, reason = ?result.reason, turns = result.turns, "match finished"),
        }
        match serde_json::to_string(&result) {
            Ok(line) => println!("{line}"),
            Err(error) => warn!(%error, "could not serialize match result"),
        }
        results.push(result);
    }

    let summary = build_run_summary(results);
    info!(
        matches = summary.match_count,
        errors = summary.error_count,
        average_turns = summary.average_turns,
        reasons = ?summary.reason_counts,
        "run finished"
    );

    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            warn!(path = %path.display(), %error, "summary write failed");
            std::process::exit(2);
        }
    }

    if summary.error_count > 0 {
        std::process::exit(1);
    }
}

async fn run_match(
    seed: u32,
    players: usize,
    options: &GameOptions,
    max_turns: u64,
) -> MatchResultLine {
    let mut engine = GameEngine::new(seed);
    let tie_breaker = SeededTieBreaker::new(seed);
    let mut tally = Tally::default();

    let outcome = play_match(&mut engine, &tie_breaker, &mut tally, players, options, max_turns).await;
    let (summary, error) = match outcome {
        Ok(summary) => (Some(summary), None),
        Err(error) => {
            let summary = engine.end_game(GameOverReason::Abandoned).ok();
            (summary, Some(error.to_string()))
        }
    };

    MatchResultLine {
        seed,
        players,
        reason: summary
            .as_ref()
            .map(|summary| summary.reason)
            .unwrap_or(GameOverReason::Abandoned),
        winner: summary.as_ref().and_then(|summary| summary.winner.clone()),
        turns: summary.as_ref().map(|summary| summary.turns).unwrap_or(0),
        ranking: summary
            .map(|summary| summary.ranking.into_iter().map(|entry| entry.player_id).collect())
            .unwrap_or_default(),
        tally,
        error,
    }
}

async fn play_match(
    engine: &mut GameEngine,
    tie_breaker: &dyn TieBreaker,
    tally: &mut Tally,
    players: usize,
    options: &GameOptions,
    max_turns: u64,
) -> GameResult<GameSummary> {
    let ids: Vec<PlayerId> = (1..=players)
        .map(|idx| PlayerId::new(format!("ai_{idx}")))
        .collect();
    for (idx, id) in ids.iter().enumerate() {
        engine.join(id.clone(), &format!("AI-{:02}", idx + 1), SessionId(idx as u64 + 1))?;
    }
    engine.start_game(&ids[0], options)?;
    for id in &ids {
        engine.set_ai_controlled(id, true)?;
    }

    while engine.is_running() {
        if engine.turns_played() >= max_turns {
            let summary = engine.end_game(GameOverReason::Timeout)?;
            tally.absorb(engine.drain_events());
            return Ok(summary);
        }
        let player = engine
            .current_player()
            .cloned()
            .ok_or(GameError::NotRunning)?;
        if let Some(summary) = play_turn(engine, &player, tie_breaker, tally).await? {
            return Ok(summary);
        }
    }
    Err(GameError::NotRunning)
}

/// Plays one turn the way the failover controller does, without the pauses.
async fn play_turn(
    engine: &mut GameEngine,
    player: &PlayerId,
    tie_breaker: &dyn TieBreaker,
    tally: &mut Tally,
) -> GameResult<Option<GameSummary>> {
    let turn = engine.turns_played();
    for _ in 0..MAX_TURN_ROUNDS {
        if engine.turns_played() != turn {
            return Ok(None);
        }
        let actions = match engine.turn().state {
            TurnState::NotStarted => return Err(GameError::NotRunning),
            TurnState::WaitingForPush => ai::plan_push(engine, player)
                .ok_or(GameError::NoSpareTile)?
                .actions(),
            TurnState::WaitingForMove => match ai::plan_move_bonus(engine, player) {
                Some(plan) => vec![plan.action()],
                None => {
                    let candidates = ai::move_candidates(engine, player);
                    if candidates.is_empty() {
                        let from = engine.roster().require(player)?.state.position;
                        return Err(GameError::Unreachable(from));
                    }
                    let target = tie_breaker.choose(player, &candidates).await;
                    vec![Action::Move { target }]
                }
            },
        };
        for action in actions {
            let outcome = engine.apply(player, action)?;
            let finished = tally.absorb(engine.drain_events());
            match outcome {
                ActionOutcome::Applied => {}
                ActionOutcome::TurnAdvanced { .. } => return Ok(None),
                ActionOutcome::GameOver(summary) => return Ok(finished.or(Some(summary))),
            }
        }
    }
    // Out of rounds without finishing: forfeit like a turn timeout.
    engine.skip_turn()?;
    tally.absorb(engine.drain_events());
    Ok(None)
}

fn build_run_summary(matches: Vec<MatchResultLine>) -> RunSummary {
    let match_count = matches.len();
    let error_count = matches.iter().filter(|line| line.error.is_some()).count();
    let total_turns: u64 = matches.iter().map(|line| line.turns).sum();
    let average_turns = if match_count == 0 {
        0
    } else {
        total_turns / match_count as u64
    };
    let mut reason_counts = BTreeMap::new();
    for line in &matches {
        *reason_counts
            .entry(game_over_reason_key(line.reason))
            .or_insert(0) += 1;
    }
    RunSummary {
        match_count,
        error_count,
        average_turns,
        reason_counts,
        matches,
    }
}

fn game_over_reason_key(reason: GameOverReason) -> String {
    match reason {
        GameOverReason::Victory => "victory",
        GameOverReason::Timeout => "timeout",
        GameOverReason::Abandoned => "abandoned",
    }
    .to_string()
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}
