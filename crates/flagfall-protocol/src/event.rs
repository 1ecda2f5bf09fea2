use serde::{Deserialize, Serialize};

use crate::{
    Archetype, Branch, BuildingId, BuildingKind, Coord, MineId, MineKind, Phase, PlayerId, SmokeId,
    UnitId, Variant,
};

/// All possible engine→view state-change notifications. Fully serializable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // Phase flow
    PlacementConfirmed { player: PlayerId },
    PhaseChanged { phase: Phase, round: u32 },
    RoundSettled { round: u32 },
    TurnPassedTo { player: PlayerId },
    ActiveUnitLocked { unit: UnitId },
    UnitTurnEnded { unit: UnitId, passed: bool },
    TurnSkipped { player: PlayerId, cost: i32 },

    // Placement
    UnitsSwapped { a: UnitId, b: UnitId },

    // Movement
    UnitMoved { unit: UnitId, from: Coord, to: Coord },
    UnitTeleported { unit: UnitId, to: Coord },
    UnitPushed { unit: UnitId, to: Coord },

    // Health
    UnitDamaged { unit: UnitId, amount: i32, hp: i32 },
    UnitHealed { unit: UnitId, amount: i32, hp: i32 },
    UnitKilled { unit: UnitId, respawn_in: Option<u32> },
    UnitRespawned { unit: UnitId, at: Coord },

    // Energy
    EnergySpent { player: PlayerId, amount: i32, remaining: i32 },
    IncomeApplied {
        player: PlayerId,
        regen: i32,
        interest: i32,
        ore: i32,
        kills: i32,
        total: i32,
    },

    // Mines
    MinePlaced { mine: MineId, owner: PlayerId, kind: MineKind, at: Coord },
    MineRevealed { mine: MineId, to: PlayerId },
    MineTriggered { mine: MineId, kind: MineKind, at: Coord, by: UnitId },
    MineRemoved { mine: MineId },
    MineCarried { mine: MineId, by: UnitId },
    MineDropped { mine: MineId, at: Coord },
    MineThrown { mine: MineId, at: Coord },
    MineShifted { mine: MineId, from: Coord, to: Coord },
    MineConverted { mine: MineId, to: PlayerId },
    SensorReport { unit: UnitId, at: Coord, count: u8 },

    // Smoke
    SmokeDeployed { smoke: SmokeId, owner: PlayerId, at: Coord },
    SmokeExpired { smoke: SmokeId },

    // Buildings
    BuildingPlaced {
        building: BuildingId,
        owner: PlayerId,
        kind: BuildingKind,
        at: Coord,
    },
    BuildingRemoved { building: BuildingId },
    TowersDetonated { player: PlayerId },

    // Flag
    FlagPickedUp { player: PlayerId, unit: UnitId },
    FlagDropped { player: PlayerId, at: Coord },
    FlagMoved { player: PlayerId, at: Coord },

    // Status
    StealthChanged { unit: UnitId, stealthed: bool },

    // Progression
    Evolved {
        player: PlayerId,
        archetype: Archetype,
        branch: Branch,
        level: u8,
        variant: Option<Variant>,
    },

    // Terminal
    GameEnded { winner: Option<PlayerId> },
}
