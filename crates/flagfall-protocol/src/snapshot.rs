use serde::{Deserialize, Serialize};

use crate::{
    Archetype, BuildingId, BuildingKind, Coord, LogEntry, MineId, MineKind, OreSize, Phase,
    PlayerId, SmokeId, UnitId, Variant,
};

/// Full game state for the view layer, initial sync, or replay verification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub round: u32,
    pub phase: Phase,
    pub current_player: PlayerId,
    pub timer_seconds: u32,
    pub paused: bool,
    pub active_unit: Option<UnitId>,
    pub board: BoardSnapshot,
    pub players: Vec<PlayerSnapshot>,
    pub units: Vec<UnitSnapshot>,
    pub mines: Vec<MineSnapshot>,
    pub buildings: Vec<BuildingSnapshot>,
    pub smokes: Vec<SmokeSnapshot>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
    pub winner: Option<PlayerId>,
    pub rng_state: [u8; 32], // for determinism verification
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub rows: u32,
    pub cols: u32,
    pub cells: Vec<CellSnapshot>, // row-major
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub obstacle: bool,
    #[serde(default)]
    pub ore: Option<OreSize>,
    #[serde(default)]
    pub flag_base: Option<PlayerId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub energy: i32,
    pub start_of_action_energy: i32,
    pub flag_position: Coord,
    pub flag_base: Coord,
    #[serde(default)]
    pub banked_kill_reward: i32,
    pub evolution: Vec<EvolutionSnapshot>,
    #[serde(default)]
    pub setup_mines_placed: u8,
    #[serde(default)]
    pub placement_confirmed: bool,
}

/// Branch levels for one archetype, aligned with `Archetype::ALL` order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvolutionSnapshot {
    pub archetype: Archetype,
    pub a: u8,
    pub a_variant: Option<Variant>,
    pub b: u8,
    pub b_variant: Option<Variant>,
}

/// Compact unit state for the view.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub archetype: Archetype,
    pub owner: PlayerId,
    pub pos: Coord,
    pub hp: i32,
    pub max_hp: i32,
    pub has_flag: bool,
    #[serde(default)]
    pub carried_mine: Option<MineKind>,
    pub energy_used_this_turn: i32,
    pub start_of_action_energy: i32,
    pub acted_this_round: bool,
    #[serde(default)]
    pub stealthed: bool,
    #[serde(default)]
    pub move_cost_debuff: i32,
    #[serde(default)]
    pub move_cost_debuff_duration: u32,
    #[serde(default)]
    pub mine_vulnerability: i32,
    #[serde(default)]
    pub dead: bool,
    #[serde(default)]
    pub respawn_timer: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MineSnapshot {
    pub id: MineId,
    pub owner: PlayerId,
    pub kind: MineKind,
    pub pos: Coord,
    #[serde(default)]
    pub revealed_to: Vec<PlayerId>,
    #[serde(default)]
    pub converted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    pub id: BuildingId,
    pub owner: PlayerId,
    pub kind: BuildingKind,
    pub pos: Coord,
    pub level: u8,
    #[serde(default)]
    pub duration: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmokeSnapshot {
    pub id: SmokeId,
    pub owner: PlayerId,
    pub pos: Coord,
    pub duration: u32,
}
