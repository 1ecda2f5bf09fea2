//! Headless self-play harness.
//!
//! Drives two scripted players through the public command interface to
//! exercise the engine end to end and collect balance metrics: game length,
//! win rates, kill and mine-trigger counts. Used for rules tuning sweeps
//! and as a whole-engine smoke test.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use flagfall_protocol::{
    Archetype, Branch, Command, Coord, Event, MineKind, Phase, PlayerId, UnitId, Variant,
};

use crate::game::GameEngine;
use crate::rules::Rules;
use crate::state::GameState;

/// Configuration for a self-play run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelfPlayConfig {
    pub seed: u64,
    /// Hard stop; a game still running past this round scores as a stall.
    pub max_rounds: u32,
    /// Safety valve on total command attempts per game.
    pub max_commands: u32,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_rounds: 60,
            max_commands: 20_000,
        }
    }
}

/// How a self-play game ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VictoryCondition {
    /// A flag reached the opposing base.
    FlagDelivered { winner: u8 },
    /// A General died.
    GeneralFelled { winner: u8 },
    /// Both Generals fell at once.
    Draw,
    /// Neither side finished within the round budget.
    RoundLimit,
}

/// Per-player counters for one game.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player_id: u8,
    pub final_energy: i32,
    pub mines_placed: u32,
    /// Mines this player's units stepped on.
    pub mines_triggered: u32,
    pub units_lost: u32,
    pub evolutions: u32,
    pub flag_steps: u32,
}

/// Whole-game counters, mostly accumulated from the event stream.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GameMetrics {
    pub rounds_played: u32,
    pub commands_accepted: u32,
    pub player_stats: Vec<PlayerStats>,
    pub total_mines_placed: u32,
    pub total_mine_triggers: u32,
    pub total_kills: u32,
    pub total_evolutions: u32,
}

/// Result of a single self-play game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelfPlayResult {
    pub seed: u64,
    pub victory: VictoryCondition,
    pub metrics: GameMetrics,
    pub duration_ms: u64,
}

/// Cross-game statistics for a batch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub avg_game_length: f32,
    pub std_game_length: f32,
    /// Fraction of games won by each seat.
    pub win_rates: Vec<f32>,
    pub draw_rate: f32,
    /// 1.0 when decisive games split evenly between the seats, 0.0 when one
    /// seat takes them all.
    pub win_rate_balance: f32,
    pub avg_kills: f32,
    pub avg_mine_triggers: f32,
}

/// Result of a batch of self-play games.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchSelfPlayResult {
    pub games_played: u32,
    pub results: Vec<SelfPlayResult>,
    pub aggregate: AggregateMetrics,
}

/// Run one scripted game to completion (or to the round/command budget).
pub fn run_selfplay(rules: Rules, config: &SelfPlayConfig) -> SelfPlayResult {
    let start = Instant::now();
    let mut engine = GameEngine::new(rules, config.seed);
    let mut metrics = GameMetrics {
        player_stats: vec![
            PlayerStats {
                player_id: 0,
                ..PlayerStats::default()
            },
            PlayerStats {
                player_id: 1,
                ..PlayerStats::default()
            },
        ],
        ..GameMetrics::default()
    };
    let mut budget = config.max_commands;

    run_placement(&mut engine, &mut metrics, &mut budget);

    while engine.state().phase != Phase::GameOver && budget > 0 {
        if engine.state().round > config.max_rounds {
            break;
        }
        match engine.state().phase {
            Phase::Thinking => {
                for player in [PlayerId::ONE, PlayerId::TWO] {
                    try_evolutions(&mut engine, player, &mut metrics, &mut budget);
                }
                issue(
                    &mut engine,
                    Command::Ready {
                        player: PlayerId::ONE,
                    },
                    &mut metrics,
                    &mut budget,
                );
            }
            Phase::Action => {
                if !play_one_unit(&mut engine, &mut metrics, &mut budget) {
                    break;
                }
            }
            _ => break,
        }
    }

    let state = engine.state();
    let victory = if state.phase == Phase::GameOver {
        match state.winner {
            Some(w) => {
                let delivered =
                    state.player(w).flag_position == state.player(w.opponent()).flag_base;
                if delivered {
                    VictoryCondition::FlagDelivered {
                        winner: w.index() as u8,
                    }
                } else {
                    VictoryCondition::GeneralFelled {
                        winner: w.index() as u8,
                    }
                }
            }
            None => VictoryCondition::Draw,
        }
    } else {
        VictoryCondition::RoundLimit
    };

    metrics.rounds_played = state.round;
    for player in [PlayerId::ONE, PlayerId::TWO] {
        let stats = &mut metrics.player_stats[player.index()];
        stats.final_energy = state.player(player).energy;
        stats.flag_steps = state.player(player).quest.flag_steps;
    }

    SelfPlayResult {
        seed: config.seed,
        victory,
        metrics,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Run a batch of games with consecutive seeds.
pub fn run_batch_selfplay(
    rules: Rules,
    config: &SelfPlayConfig,
    num_games: u32,
) -> BatchSelfPlayResult {
    let mut results = Vec::with_capacity(num_games as usize);
    for i in 0..num_games {
        let game_config = SelfPlayConfig {
            seed: config.seed.wrapping_add(i as u64),
            ..config.clone()
        };
        results.push(run_selfplay(rules.clone(), &game_config));
    }
    let aggregate = compute_aggregate_metrics(&results);
    BatchSelfPlayResult {
        games_played: num_games,
        results,
        aggregate,
    }
}

fn compute_aggregate_metrics(results: &[SelfPlayResult]) -> AggregateMetrics {
    if results.is_empty() {
        return AggregateMetrics::default();
    }
    let n = results.len() as f32;
    let avg_game_length = results
        .iter()
        .map(|r| r.metrics.rounds_played as f32)
        .sum::<f32>()
        / n;
    let variance = results
        .iter()
        .map(|r| (r.metrics.rounds_played as f32 - avg_game_length).powi(2))
        .sum::<f32>()
        / n;

    let mut wins = [0u32; 2];
    let mut draws = 0u32;
    for r in results {
        match r.victory {
            VictoryCondition::FlagDelivered { winner }
            | VictoryCondition::GeneralFelled { winner } => wins[winner as usize] += 1,
            VictoryCondition::Draw | VictoryCondition::RoundLimit => draws += 1,
        }
    }
    let decisive = (wins[0] + wins[1]) as f32;
    let win_rate_balance = if decisive > 0.0 {
        let expected = 0.5;
        let max_dev = wins
            .iter()
            .map(|&w| (w as f32 / decisive - expected).abs())
            .fold(0.0, f32::max);
        1.0 - (max_dev / expected).min(1.0)
    } else {
        1.0
    };

    AggregateMetrics {
        avg_game_length,
        std_game_length: variance.sqrt(),
        win_rates: wins.iter().map(|&w| w as f32 / n).collect(),
        draw_rate: draws as f32 / n,
        win_rate_balance,
        avg_kills: results
            .iter()
            .map(|r| r.metrics.total_kills as f32)
            .sum::<f32>()
            / n,
        avg_mine_triggers: results
            .iter()
            .map(|r| r.metrics.total_mine_triggers as f32)
            .sum::<f32>()
            / n,
    }
}

// --- scripted players ---

/// Apply one command; fold its events into the metrics on success. Always
/// burns budget so a rejection loop cannot spin forever.
fn issue(
    engine: &mut GameEngine,
    command: Command,
    metrics: &mut GameMetrics,
    budget: &mut u32,
) -> bool {
    if *budget == 0 {
        return false;
    }
    *budget -= 1;
    match engine.apply(command) {
        Ok(events) => {
            record_events(engine.state(), &events, metrics);
            metrics.commands_accepted += 1;
            true
        }
        Err(_) => false,
    }
}

fn record_events(state: &GameState, events: &[Event], metrics: &mut GameMetrics) {
    for event in events {
        match event {
            Event::MinePlaced { owner, .. } => {
                metrics.player_stats[owner.index()].mines_placed += 1;
                metrics.total_mines_placed += 1;
            }
            Event::MineTriggered { by, .. } => {
                if let Some(unit) = state.unit(*by) {
                    metrics.player_stats[unit.owner.index()].mines_triggered += 1;
                }
                metrics.total_mine_triggers += 1;
            }
            Event::UnitKilled { unit, .. } => {
                if let Some(unit) = state.unit(*unit) {
                    metrics.player_stats[unit.owner.index()].units_lost += 1;
                }
                metrics.total_kills += 1;
            }
            Event::Evolved { player, .. } => {
                metrics.player_stats[player.index()].evolutions += 1;
                metrics.total_evolutions += 1;
            }
            _ => {}
        }
    }
}

fn run_placement(engine: &mut GameEngine, metrics: &mut GameMetrics, budget: &mut u32) {
    for player in [PlayerId::ONE, PlayerId::TWO] {
        for at in setup_mine_spots(engine.state(), player) {
            issue(
                engine,
                Command::PlaceSetupMine {
                    player,
                    at,
                    kind: MineKind::Normal,
                },
                metrics,
                budget,
            );
        }
        issue(engine, Command::ConfirmPlacement { player }, metrics, budget);
    }
}

/// Setup mines go on the player's own half, as close to the midline as the
/// board allows.
fn setup_mine_spots(state: &GameState, player: PlayerId) -> Vec<Coord> {
    let limit = state.rules.setup_mine_limit as usize;
    let mid = state.rules.midline_col();
    let cols: Vec<i32> = if player == PlayerId::ONE {
        (0..mid).rev().collect()
    } else {
        (mid..state.rules.grid_cols).collect()
    };
    let mut spots = Vec::new();
    for c in cols {
        for r in 0..state.rules.grid_rows {
            let at = Coord::new(r, c);
            let Some(cell) = state.board.cell(at) else {
                continue;
            };
            if cell.obstacle || cell.flag_base.is_some() || state.mine_at(at).is_some() {
                continue;
            }
            spots.push(at);
            if spots.len() == limit {
                return spots;
            }
        }
    }
    spots
}

/// Buy every evolution the quest counters and the bank currently allow.
fn try_evolutions(
    engine: &mut GameEngine,
    player: PlayerId,
    metrics: &mut GameMetrics,
    budget: &mut u32,
) {
    for archetype in Archetype::ALL {
        for branch in [Branch::A, Branch::B] {
            loop {
                let state = engine.state();
                let level = state.player(player).track(archetype).branch(branch).level;
                if level >= 3 {
                    break;
                }
                let need = state.rules.branch_thresholds(archetype, branch)[level as usize];
                if state.player(player).quest.counter(archetype, branch) < need {
                    break;
                }
                if state.player(player).energy < state.rules.evolve_costs[level as usize] {
                    break;
                }
                let variant = if level == 2 { Some(Variant::One) } else { None };
                let ok = issue(
                    engine,
                    Command::Evolve {
                        player,
                        archetype,
                        branch,
                        variant,
                    },
                    metrics,
                    budget,
                );
                if !ok {
                    break;
                }
            }
        }
    }
}

/// One action sub-turn: pick the current side's first fresh unit, fight or
/// advance with it, then close its turn. Returns false when no progress is
/// possible.
fn play_one_unit(engine: &mut GameEngine, metrics: &mut GameMetrics, budget: &mut u32) -> bool {
    let player = engine.state().current_player;
    let Some(unit_id) = engine
        .state()
        .units
        .iter()
        .find(|u| u.owner == player && u.is_alive() && !u.acted_this_round)
        .map(|u| u.id)
    else {
        return false;
    };

    maybe_take_flag(engine, unit_id, metrics, budget);
    maybe_attack(engine, unit_id, metrics, budget);
    for _ in 0..3 {
        if !maybe_advance(engine, unit_id, metrics, budget) {
            break;
        }
    }

    if engine.state().phase != Phase::Action {
        return true;
    }
    if issue(
        engine,
        Command::EndUnitTurn { unit: unit_id },
        metrics,
        budget,
    ) {
        return true;
    }
    // A unit that died to a mine had its turn closed for it; anything else
    // rejecting EndUnitTurn means the script is stuck.
    engine
        .state()
        .unit(unit_id)
        .is_some_and(|u| !u.is_alive() || u.acted_this_round)
}

fn maybe_take_flag(
    engine: &mut GameEngine,
    unit_id: UnitId,
    metrics: &mut GameMetrics,
    budget: &mut u32,
) {
    let state = engine.state();
    let Some(unit) = state.unit(unit_id) else {
        return;
    };
    if unit.archetype != Archetype::General || unit.has_flag {
        return;
    }
    if unit.pos == state.player(unit.owner).flag_position {
        issue(engine, Command::PickupFlag { unit: unit_id }, metrics, budget);
    }
}

fn maybe_attack(
    engine: &mut GameEngine,
    unit_id: UnitId,
    metrics: &mut GameMetrics,
    budget: &mut u32,
) {
    let state = engine.state();
    let Some(unit) = state.unit(unit_id) else {
        return;
    };
    if unit.archetype != Archetype::General {
        return;
    }
    let target = state
        .units
        .iter()
        .find(|t| t.owner != unit.owner && t.is_alive() && t.pos.manhattan(unit.pos) == 1)
        .map(|t| t.id);
    if let Some(target) = target {
        issue(
            engine,
            Command::Attack {
                attacker: unit_id,
                target,
            },
            metrics,
            budget,
        );
    }
}

/// One greedy step. The General walks to its flag, then carries it toward
/// the enemy base; everyone else pushes straight for the enemy base.
fn maybe_advance(
    engine: &mut GameEngine,
    unit_id: UnitId,
    metrics: &mut GameMetrics,
    budget: &mut u32,
) -> bool {
    let state = engine.state();
    let Some(unit) = state.unit(unit_id) else {
        return false;
    };
    if !unit.is_alive() || unit.acted_this_round {
        return false;
    }
    let goal = if unit.archetype == Archetype::General && !unit.has_flag {
        state.player(unit.owner).flag_position
    } else {
        state.board.flag_base(unit.owner.opponent())
    };
    let Some(to) = step_toward(state, unit.pos, goal) else {
        return false;
    };
    issue(engine, Command::Move { unit: unit_id, to }, metrics, budget)
}

fn step_toward(state: &GameState, from: Coord, goal: Coord) -> Option<Coord> {
    if from == goal {
        return None;
    }
    let mut candidates = Vec::new();
    if goal.c != from.c {
        candidates.push(from.offset(0, (goal.c - from.c).signum()));
    }
    if goal.r != from.r {
        candidates.push(from.offset((goal.r - from.r).signum(), 0));
    }
    // Sidesteps for when the direct lanes are blocked.
    candidates.push(from.offset(1, 0));
    candidates.push(from.offset(-1, 0));
    candidates
        .into_iter()
        .find(|&to| state.is_free_for_unit(to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selfplay_completes() {
        let config = SelfPlayConfig {
            seed: 7,
            max_rounds: 40,
            ..SelfPlayConfig::default()
        };
        let result = run_selfplay(Rules::standard(), &config);
        println!("victory: {:?}", result.victory);
        println!("metrics: {:?}", result.metrics);
        assert!(result.metrics.rounds_played >= 1);
        assert!(result.metrics.commands_accepted > 0);
        assert_eq!(result.metrics.player_stats.len(), 2);
    }

    #[test]
    fn test_batch_selfplay() {
        let config = SelfPlayConfig {
            seed: 100,
            max_rounds: 30,
            ..SelfPlayConfig::default()
        };
        let batch = run_batch_selfplay(Rules::standard(), &config, 4);
        println!("aggregate: {:?}", batch.aggregate);
        assert_eq!(batch.games_played, 4);
        assert_eq!(batch.results.len(), 4);
        assert!(batch.aggregate.avg_game_length >= 1.0);
        for (i, result) in batch.results.iter().enumerate() {
            assert_eq!(result.seed, 100u64.wrapping_add(i as u64));
        }
    }

    #[test]
    fn selfplay_is_deterministic_per_seed() {
        let config = SelfPlayConfig {
            seed: 11,
            max_rounds: 20,
            ..SelfPlayConfig::default()
        };
        let a = run_selfplay(Rules::standard(), &config);
        let b = run_selfplay(Rules::standard(), &config);
        assert_eq!(a.victory, b.victory);
        assert_eq!(a.metrics.rounds_played, b.metrics.rounds_played);
        assert_eq!(a.metrics.total_kills, b.metrics.total_kills);
    }
}
