use flagfall_protocol::{ActionKind, Archetype, Branch, Event, LogCategory, LogMessage, UnitId, Variant};

use crate::{
    cost::action_cost,
    damage,
    error::GameError,
    state::GameState,
    unit::Unit,
};

/// Everything an attack will do, computed without mutation. The same plan
/// backs the UI preview and the commit, so they cannot drift apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttackPlan {
    pub cost: i32,
    pub damage: i32,
    pub aura_reduced: bool,
    pub lifesteal: i32,
    pub dash: bool,
}

/// Attack legality and numbers. Only the General fights: range is Manhattan
/// 1 (2 once branch A hits level 2) along a rank or file, and a flag
/// carrier may only swing with the A3 duelist variant.
pub fn plan_attack(state: &GameState, attacker: &Unit, target: &Unit) -> Result<AttackPlan, GameError> {
    if attacker.archetype != Archetype::General {
        return Err(GameError::PrerequisiteNotMet);
    }
    if !target.is_alive() || target.owner == attacker.owner || target.id == attacker.id {
        return Err(GameError::IllegalTarget);
    }

    let general = state.player(attacker.owner).track(Archetype::General);
    let range = if general.a.level >= 2 { 2 } else { 1 };
    if !attacker.pos.is_cardinal_to(target.pos) || attacker.pos == target.pos {
        return Err(GameError::IllegalTarget);
    }
    if attacker.pos.manhattan(target.pos) > range {
        return Err(GameError::IllegalTarget);
    }

    let duelist = general.is_variant(Branch::A, Variant::One);
    if attacker.has_flag && !duelist {
        return Err(GameError::PrerequisiteNotMet);
    }

    let rules = &state.rules;
    let base_cost = if attacker.has_flag {
        rules.attack_cost_flag_carrier
    } else {
        rules.attack_cost
    };
    let cost = action_cost(state, attacker, base_cost, ActionKind::Attack);

    let base_damage = if general.a.level >= 1 {
        rules.attack_damage_evolved
    } else {
        rules.attack_damage
    };
    let (damage, aura_reduced) = state.apply_flag_aura(target.owner, target.pos, base_damage);

    Ok(AttackPlan {
        cost,
        damage,
        aura_reduced,
        lifesteal: if attacker.has_flag && duelist {
            rules.attack_lifesteal
        } else {
            0
        },
        dash: general.is_variant(Branch::A, Variant::Two),
    })
}

/// Commit a planned attack. Energy was already charged by the caller; this
/// applies damage, rider effects, the dash, and the kill fallout.
pub fn apply_attack(
    state: &mut GameState,
    attacker_id: UnitId,
    target_id: UnitId,
    plan: AttackPlan,
    events: &mut Vec<Event>,
) {
    let attacker_owner = {
        let attacker = state.unit(attacker_id).expect("attacker exists");
        attacker.owner
    };
    let target_archetype = state.unit(target_id).expect("target exists").archetype;
    let general = state.player(attacker_owner).track(Archetype::General);

    damage::deal_damage(state, target_id, plan.damage, Some(attacker_owner), events);
    state.player_mut(attacker_owner).quest.damage_dealt += plan.damage.max(0) as u32;
    state.push_log(
        LogCategory::Combat,
        Some(attacker_owner),
        LogMessage::AttackLanded {
            target: target_archetype,
            damage: plan.damage,
        },
    );
    if plan.aura_reduced {
        state.push_log(
            LogCategory::Combat,
            Some(attacker_owner.opponent()),
            LogMessage::FlagAuraReduced,
        );
    }

    // Rider debuffs only matter while the target lives.
    let target_alive = state.unit(target_id).is_some_and(Unit::is_alive);
    if target_alive {
        if general.a.level >= 1 {
            let status = &mut state.unit_mut(target_id).expect("target exists").status;
            status.mine_vulnerability = (status.mine_vulnerability + 1).min(2);
        }
        if general.a.level >= 2 {
            let status = &mut state.unit_mut(target_id).expect("target exists").status;
            status.move_cost_debuff = status.move_cost_debuff.max(2);
            status.move_cost_debuff_subturns = status.move_cost_debuff_subturns.max(2);
        }
    }

    if plan.lifesteal > 0 {
        let unit = state.unit_mut(attacker_id).expect("attacker exists");
        let healed = unit.heal(plan.lifesteal);
        let hp = unit.hp;
        if healed > 0 {
            events.push(Event::UnitHealed {
                unit: attacker_id,
                amount: healed,
                hp,
            });
        }
    }

    if plan.dash {
        resolve_dash(state, attacker_id, target_id, target_alive, events);
    }
}

/// A3-2 dash: shove the target up to two cells along the attack line,
/// stopping at the edge, an obstacle or a body, then step the attacker up
/// to the cell in front of it (onto the victim's cell on a kill).
fn resolve_dash(
    state: &mut GameState,
    attacker_id: UnitId,
    target_id: UnitId,
    target_alive: bool,
    events: &mut Vec<Event>,
) {
    let attacker_pos = state.unit(attacker_id).expect("attacker exists").pos;
    let mut target_pos = state.unit(target_id).expect("target exists").pos;
    let (dr, dc) = attacker_pos.step_towards(target_pos);

    if target_alive {
        for _ in 0..2 {
            let next = target_pos.offset(dr, dc);
            if !state.is_free_for_unit(next) {
                break;
            }
            target_pos = next;
        }
        let (moved, owner, has_flag) = {
            let target = state.unit_mut(target_id).expect("target exists");
            let moved = target.pos != target_pos;
            target.pos = target_pos;
            (moved, target.owner, target.has_flag)
        };
        if moved {
            if has_flag {
                state.player_mut(owner).flag_position = target_pos;
                events.push(Event::FlagMoved {
                    player: owner,
                    at: target_pos,
                });
            }
            events.push(Event::UnitPushed {
                unit: target_id,
                to: target_pos,
            });
        }
    }

    let follow_to = if target_alive {
        target_pos.offset(-dr, -dc)
    } else {
        target_pos
    };
    if follow_to != attacker_pos && state.is_free_for_unit(follow_to) {
        let (owner, has_flag) = {
            let attacker = state.unit_mut(attacker_id).expect("attacker exists");
            attacker.pos = follow_to;
            (attacker.owner, attacker.has_flag)
        };
        if has_flag {
            state.player_mut(owner).flag_position = follow_to;
            events.push(Event::FlagMoved {
                player: owner,
                at: follow_to,
            });
        }
        events.push(Event::UnitPushed {
            unit: attacker_id,
            to: follow_to,
        });
        let target_archetype = state.unit(target_id).expect("target exists").archetype;
        state.push_log(
            LogCategory::Combat,
            Some(owner),
            LogMessage::AttackDashed {
                target: target_archetype,
            },
        );
    }
}
