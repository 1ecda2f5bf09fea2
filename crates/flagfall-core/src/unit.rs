use serde::{Deserialize, Serialize};

use flagfall_protocol::{Archetype, Coord, MineId, MineKind, PlayerId, UnitId, UnitSnapshot};

use crate::rules::Rules;

/// Transient per-unit status effects.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct UnitStatus {
    /// Flat surcharge added to move costs while the debuff lasts.
    pub move_cost_debuff: i32,
    /// Remaining action sub-turns; the debuff clears when this hits zero.
    pub move_cost_debuff_subturns: u32,
    /// Flat bonus damage taken from mines.
    pub mine_vulnerability: i32,
    pub stealthed: bool,
}

/// A mine riding along with a Ranger. It keeps its id, original owner and
/// reveal state, so a mine carried across the board is still the same mine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CarriedMine {
    pub id: MineId,
    pub kind: MineKind,
    pub owner: PlayerId,
    pub revealed_to: Vec<PlayerId>,
    pub converted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub archetype: Archetype,
    pub owner: PlayerId,
    pub pos: Coord,
    /// Starting slot; respawns prefer it.
    pub home_slot: Coord,
    pub hp: i32,
    pub max_hp: i32,
    pub has_flag: bool,
    pub carried_mine: Option<CarriedMine>,
    pub energy_used_this_turn: i32,
    pub start_of_action_energy: i32,
    pub acted_this_round: bool,
    pub status: UnitStatus,
    pub dead: bool,
    pub respawn_timer: u32,
}

impl Unit {
    pub fn new(id: UnitId, archetype: Archetype, owner: PlayerId, pos: Coord, rules: &Rules) -> Self {
        let profile = rules.profile(archetype);
        Self {
            id,
            archetype,
            owner,
            pos,
            home_slot: pos,
            hp: profile.max_hp,
            max_hp: profile.max_hp,
            has_flag: false,
            carried_mine: None,
            energy_used_this_turn: 0,
            start_of_action_energy: 0,
            acted_this_round: false,
            status: UnitStatus::default(),
            dead: false,
            respawn_timer: 0,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.hp = (self.hp + amount).min(self.max_hp);
        self.hp - before
    }

    /// Full reset on respawn: full hp, all status cleared, carried items
    /// were already shed on death.
    pub fn revive_at(&mut self, at: Coord) {
        self.pos = at;
        self.hp = self.max_hp;
        self.dead = false;
        self.respawn_timer = 0;
        self.status = UnitStatus::default();
        self.energy_used_this_turn = 0;
        self.acted_this_round = false;
    }

    pub fn to_snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            id: self.id,
            archetype: self.archetype,
            owner: self.owner,
            pos: self.pos,
            hp: self.hp,
            max_hp: self.max_hp,
            has_flag: self.has_flag,
            carried_mine: self.carried_mine.as_ref().map(|m| m.kind),
            energy_used_this_turn: self.energy_used_this_turn,
            start_of_action_energy: self.start_of_action_energy,
            acted_this_round: self.acted_this_round,
            stealthed: self.status.stealthed,
            move_cost_debuff: self.status.move_cost_debuff,
            move_cost_debuff_duration: self.status.move_cost_debuff_subturns,
            mine_vulnerability: self.status.mine_vulnerability,
            dead: self.dead,
            respawn_timer: self.respawn_timer,
        }
    }
}
