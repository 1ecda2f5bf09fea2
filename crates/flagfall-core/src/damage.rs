use flagfall_protocol::{Archetype, Event, Phase, PlayerId, UnitId};

use crate::{
    economy,
    state::{GameState, Mine},
};

/// Apply already-modified damage to a unit and settle the consequences:
/// death flagging, flag drop, kill bounty, and the General-death terminal
/// condition. Damage modifiers (auras, defusal) belong to the callers.
pub fn deal_damage(
    state: &mut GameState,
    target: UnitId,
    amount: i32,
    killer: Option<PlayerId>,
    events: &mut Vec<Event>,
) {
    if amount <= 0 {
        return;
    }
    let Some(unit) = state.unit(target) else {
        return;
    };
    if !unit.is_alive() {
        return;
    }

    let unit = state.unit_mut(target).expect("target exists");
    unit.hp -= amount;
    let hp = unit.hp;
    events.push(Event::UnitDamaged {
        unit: target,
        amount,
        hp,
    });

    if hp > 0 {
        return;
    }
    kill_unit(state, target, killer, events);
}

fn kill_unit(
    state: &mut GameState,
    target: UnitId,
    killer: Option<PlayerId>,
    events: &mut Vec<Event>,
) {
    let (owner, archetype, pos, had_flag) = {
        let unit = state.unit_mut(target).expect("target exists");
        unit.hp = 0;
        unit.dead = true;
        (unit.owner, unit.archetype, unit.pos, unit.has_flag)
    };

    // A dropped flag stays where the carrier fell.
    if had_flag {
        let unit = state.unit_mut(target).expect("target exists");
        unit.has_flag = false;
        state.player_mut(owner).flag_position = pos;
        events.push(Event::FlagDropped { player: owner, at: pos });
    }

    // A carried mine lands on the death cell if nothing else sits there,
    // still belonging to whoever planted it.
    if let Some(carried) = state.unit_mut(target).expect("target exists").carried_mine.take() {
        if state.mine_at(pos).is_none() {
            state.mines.push(Mine {
                id: carried.id,
                owner: carried.owner,
                kind: carried.kind,
                pos,
                revealed_to: carried.revealed_to,
                immune_units: Vec::new(),
                converted: carried.converted,
            });
            events.push(Event::MineDropped { mine: carried.id, at: pos });
        }
    }

    // Bounty goes to next-round income, never the current balance.
    if let Some(killer) = killer {
        if killer != owner {
            let reward = economy::kill_reward(&state.rules, state.player(owner).energy);
            state.player_mut(killer).banked_kill_reward += reward;
        }
    }

    let respawn_in = if archetype == Archetype::General {
        None
    } else {
        let rules = &state.rules;
        let timer = if state.round <= rules.respawn_late_threshold {
            rules.respawn_rounds_early
        } else {
            rules.respawn_rounds_late
        };
        state.unit_mut(target).expect("target exists").respawn_timer = timer;
        Some(timer)
    };
    events.push(Event::UnitKilled {
        unit: target,
        respawn_in,
    });

    if archetype == Archetype::General {
        // Both Generals falling to a single blast is a draw.
        let other_general_dead = state
            .units
            .iter()
            .any(|u| u.archetype == Archetype::General && u.owner != owner && u.dead);
        state.winner = if other_general_dead {
            None
        } else {
            Some(owner.opponent())
        };
        state.phase = Phase::GameOver;
        events.push(Event::GameEnded {
            winner: state.winner,
        });
    }
}
