use flagfall_protocol::{Archetype, Branch, Event, LogCategory, LogMessage, PlayerId, Variant};

use crate::{error::GameError, state::GameState};

/// Advance one evolution branch by a level. Requires the branch's quest
/// counter to have reached the next level's threshold AND the energy cost
/// for the current level, paid on the spot. Level 3 is a permanent fork:
/// the variant must be chosen now and can never change.
pub fn evolve(
    state: &mut GameState,
    player: PlayerId,
    archetype: Archetype,
    branch: Branch,
    variant: Option<Variant>,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let (level, counter, energy) = {
        let p = state.player(player);
        (
            p.track(archetype).branch(branch).level,
            p.quest.counter(archetype, branch),
            p.energy,
        )
    };

    if level >= 3 {
        return Err(GameError::LimitReached);
    }
    let next_level = level + 1;

    let threshold = state.rules.branch_thresholds(archetype, branch)[level as usize];
    if counter < threshold {
        return Err(GameError::PrerequisiteNotMet);
    }

    if next_level == 3 && variant.is_none() {
        return Err(GameError::PrerequisiteNotMet);
    }

    let cost = state.rules.evolve_costs[level as usize];
    if energy < cost {
        return Err(GameError::InsufficientEnergy {
            need: cost,
            have: energy,
        });
    }

    let p = state.player_mut(player);
    p.energy -= cost;
    let b = p.track_mut(archetype).branch_mut(branch);
    b.level = next_level;
    if next_level == 3 {
        b.variant = variant;
    }
    let remaining = state.player(player).energy;

    events.push(Event::EnergySpent {
        player,
        amount: cost,
        remaining,
    });
    events.push(Event::Evolved {
        player,
        archetype,
        branch,
        level: next_level,
        variant: if next_level == 3 { variant } else { None },
    });
    state.push_log(
        LogCategory::Evolution,
        Some(player),
        LogMessage::Evolved {
            archetype,
            branch,
            level: next_level,
            variant: if next_level == 3 { variant } else { None },
        },
    );
    Ok(())
}
