use serde::{Deserialize, Serialize};

use crate::{Archetype, Branch, BuildingKind, Coord, MineKind, PlayerId, UnitId, Variant};

/// All possible view→engine action intents. Fully serializable.
///
/// The engine re-validates everything: a structurally well-formed command
/// can still be rejected (wrong phase, wrong owner, out of range, ...).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    // Placement phase
    SwapUnits { player: PlayerId, a: UnitId, b: UnitId },
    PlaceSetupMine { player: PlayerId, at: Coord, kind: MineKind },
    ConfirmPlacement { player: PlayerId },

    // Thinking phase
    Ready { player: PlayerId },

    // Action phase: selection, movement and combat
    SelectUnit { unit: UnitId },
    Move { unit: UnitId, to: Coord },
    Attack { attacker: UnitId, target: UnitId },

    // Maker
    PlaceMine { unit: UnitId, at: Coord, kind: MineKind },

    // Sweeper
    Scan { unit: UnitId, at: Coord },
    SensorScan { unit: UnitId, at: Coord },
    DetonateTowers { unit: UnitId },

    // Defuser
    Disarm { unit: UnitId, at: Coord },
    Dismantle { unit: UnitId, at: Coord },
    MoveMine { unit: UnitId, from: Coord, to: Coord },
    ConvertMine { unit: UnitId, at: Coord },

    // Ranger
    PickupMine { unit: UnitId, at: Coord },
    DropMine { unit: UnitId },
    ThrowMine { unit: UnitId, at: Coord },
    ToggleStealth { unit: UnitId },
    Teleport { unit: UnitId },

    // Buildings
    PlaceBuilding { unit: UnitId, kind: BuildingKind, at: Coord },

    // Flag
    PickupFlag { unit: UnitId },
    DropFlag { unit: UnitId },

    // Progression
    Evolve {
        player: PlayerId,
        archetype: Archetype,
        branch: Branch,
        variant: Option<Variant>,
    },

    // Turn flow
    EndUnitTurn { unit: UnitId },
    SkipTurn { player: PlayerId },
}
