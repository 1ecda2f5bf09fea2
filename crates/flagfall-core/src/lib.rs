//! Flagfall core engine.
//!
//! Authoritative rules engine for a two-player tactical flag game on a
//! 7x24 grid: energy economy, mines, buildings, evolutions, and the
//! placement/thinking/action round loop. The engine is deterministic for
//! a given seed and command sequence, which is what the replay and
//! self-play layers build on.

mod board;
mod buildings;
mod combat;
mod cost;
mod damage;
mod economy;
mod error;
mod evolution;
mod game;
mod mines;
mod rng;
mod rules;
pub mod selfplay;
mod state;
mod unit;

pub use crate::board::*;
pub use crate::buildings::*;
pub use crate::combat::*;
pub use crate::cost::*;
pub use crate::damage::*;
pub use crate::economy::*;
pub use crate::error::*;
pub use crate::evolution::*;
pub use crate::game::*;
pub use crate::mines::*;
pub use crate::rng::*;
pub use crate::rules::*;
pub use crate::selfplay::{
    run_batch_selfplay, run_selfplay, AggregateMetrics, BatchSelfPlayResult, GameMetrics,
    PlayerStats, SelfPlayConfig, SelfPlayResult, VictoryCondition,
};
pub use crate::state::*;
pub use crate::unit::*;
