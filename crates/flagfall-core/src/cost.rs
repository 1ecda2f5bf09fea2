use flagfall_protocol::{ActionKind, Archetype, BuildingKind, Variant};

use crate::{state::GameState, unit::Unit};

/// Base cost of a plain move for this unit, before `action_cost`
/// adjustments: flag carriers pay the flag rate, mine carriers the carry
/// rate, everyone else their archetype's move cost.
pub fn move_base_cost(state: &GameState, unit: &Unit) -> i32 {
    let rules = &state.rules;
    if unit.has_flag {
        let general = state.player(unit.owner).track(Archetype::General);
        if general.is_variant(flagfall_protocol::Branch::B, Variant::One) {
            return rules.flag_move_cost_discounted;
        }
        return rules.flag_move_cost;
    }
    if unit.carried_mine.is_some() {
        return rules.carry_mine_move_cost;
    }
    rules.profile(unit.archetype).move_cost
}

/// The single cost pipeline shared by the preview path and the commit path.
///
/// Adjustment order: evolution override, hub discount, stealth rate, scout
/// floor, move-cost debuff, territory surcharge. Teleport and evolve are
/// exempt from all of it.
pub fn action_cost(state: &GameState, unit: &Unit, base: i32, kind: ActionKind) -> i32 {
    if matches!(kind, ActionKind::Teleport | ActionKind::Evolve) {
        return base;
    }

    let rules = &state.rules;
    let player = state.player(unit.owner);
    let ranger = player.track(Archetype::Ranger);
    let mut cost = base;

    // Ranger branch B capstone collapses the move rate outright.
    let permanent_scout = unit.archetype == Archetype::Ranger && ranger.b.level >= 3;
    if kind == ActionKind::Move && permanent_scout {
        cost = rules.scout_move_floor;
    }

    if matches!(kind, ActionKind::Move | ActionKind::PlaceHub) {
        let near_hub = state.buildings.iter().any(|b| {
            b.owner == unit.owner
                && b.kind == BuildingKind::Hub
                && b.pos.manhattan(unit.pos) <= rules.hub_discount_range
        });
        if near_hub {
            cost = (cost - 1).max(1);
        }
    }

    if kind == ActionKind::Move {
        let silent_runner = permanent_scout
            && ranger.is_variant(flagfall_protocol::Branch::B, Variant::One);
        if unit.status.stealthed && !silent_runner {
            cost = rules.stealth_move_cost;
        }
        if unit.archetype == Archetype::Ranger {
            cost = cost.max(rules.scout_move_floor);
        }
        if unit.status.move_cost_debuff > 0 {
            cost += unit.status.move_cost_debuff;
        }
    }

    if state.in_enemy_territory(unit.owner, unit.pos) {
        cost += if cost < rules.territory_surcharge_pivot {
            rules.territory_surcharge_low
        } else {
            rules.territory_surcharge_high
        };
    }

    cost
}
