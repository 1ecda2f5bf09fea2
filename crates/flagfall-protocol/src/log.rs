use serde::{Deserialize, Serialize};

use crate::{Archetype, Branch, BuildingKind, Coord, MineKind, PlayerId, Variant};

/// A permanent battle-log entry for the timeline panel.
///
/// Messages are a closed enum carrying typed params; the view layer owns
/// all localization and string formatting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub round: u32,
    pub category: LogCategory,
    /// `None` for neutral entries (phase transitions, settlement).
    pub owner: Option<PlayerId>,
    pub message: LogMessage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogCategory {
    Info,
    Move,
    Combat,
    Mine,
    Evolution,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "key")]
pub enum LogMessage {
    // Phase flow
    PlacementConfirmed { player: PlayerId },
    PhaseStarted { round: u32 },
    RoundSettled { round: u32 },
    TurnSkipped { player: PlayerId, cost: i32 },
    UnitPassed { archetype: Archetype, healed: i32 },

    // Movement
    UnitMoved { archetype: Archetype, to: Coord, cost: i32 },
    UnitTeleported { archetype: Archetype, to: Coord },

    // Combat
    AttackLanded { target: Archetype, damage: i32 },
    AttackDashed { target: Archetype },
    UnitKilled { archetype: Archetype, reward: i32 },
    UnitRespawned { archetype: Archetype, at: Coord },
    DomainDamage { archetype: Archetype, damage: i32 },

    // Mines
    MinePlaced { kind: MineKind },
    MineTriggered { kind: MineKind, archetype: Archetype, damage: i32 },
    MineChained { count: u8 },
    NukeBlast { at: Coord },
    SmokeDeployed { at: Coord },
    HeavySteps { archetype: Archetype },
    MineRevealed { at: Coord },
    SensorReport { at: Coord, count: u8 },
    MineDisarmed { at: Coord },
    MineCarried { archetype: Archetype },
    MineDropped { at: Coord },
    MineThrown { at: Coord },
    MineShifted { to: Coord },
    MineConverted { at: Coord },
    DamageReflected { target: Archetype, damage: i32 },
    TriggerHeal { amount: i32 },

    // Buildings
    BuildingPlaced { kind: BuildingKind },
    BuildingExpired { kind: BuildingKind },
    BuildingDismantled { kind: BuildingKind },
    TowersDetonated { mines: u8 },

    // Flag
    FlagPickedUp { archetype: Archetype },
    FlagDropped { at: Coord },
    FlagAuraReduced,

    // Status
    StealthEngaged { archetype: Archetype },
    StealthDropped { archetype: Archetype },

    // Progression
    Evolved {
        archetype: Archetype,
        branch: Branch,
        level: u8,
        variant: Option<Variant>,
    },

    // Economy
    Income { player: PlayerId, total: i32 },
    OreHarvested { archetype: Archetype, amount: i32 },

    // Rejections; the reason is the error's display text
    Rejected { reason: String },

    // Terminal
    GameEnded { winner: Option<PlayerId> },
}
