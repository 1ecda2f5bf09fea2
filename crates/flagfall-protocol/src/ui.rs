use serde::{Deserialize, Serialize};

use crate::UnitId;

/// Closed set of action kinds, used for cost previews and legal-action
/// projections. The cost calculator keys off this instead of free-form
/// strings so a new action kind cannot be silently ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Move,
    Attack,
    PlaceMine,
    PlaceTower,
    PlaceHub,
    PlaceFactory,
    Scan,
    SensorScan,
    DetonateTowers,
    Disarm,
    Dismantle,
    MoveMine,
    ConvertMine,
    PickupMine,
    DropMine,
    ThrowMine,
    Stealth,
    Teleport,
    PickupFlag,
    DropFlag,
    Evolve,
    EndTurn,
}

/// One legal action for the selected unit, with its previewed cost.
///
/// The preview cost is computed by the same pure calculator the commit path
/// uses, so the two can never disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalAction {
    pub kind: ActionKind,
    pub cost: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionMenu {
    pub unit: UnitId,
    pub actions: Vec<LegalAction>,
}
