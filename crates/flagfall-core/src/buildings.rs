use flagfall_protocol::{
    ActionKind, Archetype, Branch, BuildingId, BuildingKind, Coord, Event, LogCategory, LogMessage,
    MineKind, PlayerId, UnitId, Variant,
};

use crate::{
    cost::action_cost,
    damage,
    error::GameError,
    state::{Building, GameState},
    unit::Unit,
};

/// The evolution branch that unlocks and levels a building kind.
pub fn building_branch(kind: BuildingKind) -> (Archetype, Branch) {
    match kind {
        BuildingKind::Tower => (Archetype::Sweeper, Branch::A),
        BuildingKind::Hub => (Archetype::Ranger, Branch::A),
        BuildingKind::Factory => (Archetype::Maker, Branch::B),
    }
}

/// How many buildings of this kind the player may keep on the board.
pub fn building_cap(state: &GameState, player: PlayerId, kind: BuildingKind) -> usize {
    let (archetype, branch) = building_branch(kind);
    let track = state.player(player).track(archetype);
    match kind {
        BuildingKind::Tower => {
            if track.is_variant(branch, Variant::One) {
                2
            } else {
                1
            }
        }
        BuildingKind::Hub => 1,
        BuildingKind::Factory => {
            if track.is_variant(branch, Variant::Two) {
                2
            } else {
                1
            }
        }
    }
}

fn building_base_cost(state: &GameState, player: PlayerId, kind: BuildingKind) -> i32 {
    let rules = &state.rules;
    match kind {
        BuildingKind::Tower => {
            let sweeper = state.player(player).track(Archetype::Sweeper);
            if sweeper.is_variant(Branch::A, Variant::One) {
                rules.tower_cost_discounted
            } else {
                rules.tower_cost
            }
        }
        BuildingKind::Hub => rules.hub_cost,
        BuildingKind::Factory => rules.factory_cost,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildPlan {
    pub cost: i32,
    pub level: u8,
}

/// Legality and pricing for placing a building on the builder's own cell.
/// Energy and the per-unit cap are the caller's checks.
pub fn plan_building(
    state: &GameState,
    builder: &Unit,
    kind: BuildingKind,
) -> Result<BuildPlan, GameError> {
    let (archetype, branch) = building_branch(kind);
    if builder.archetype != archetype {
        return Err(GameError::PrerequisiteNotMet);
    }
    let level = state
        .player(builder.owner)
        .track(archetype)
        .branch(branch)
        .level;
    if level < 1 {
        return Err(GameError::PrerequisiteNotMet);
    }
    if state.mine_at(builder.pos).is_some() || state.building_at(builder.pos).is_some() {
        return Err(GameError::IllegalTarget);
    }

    let action = match kind {
        BuildingKind::Tower => ActionKind::PlaceTower,
        BuildingKind::Hub => ActionKind::PlaceHub,
        BuildingKind::Factory => ActionKind::PlaceFactory,
    };
    let base = building_base_cost(state, builder.owner, kind);
    Ok(BuildPlan {
        cost: action_cost(state, builder, base, action),
        level,
    })
}

/// Commit a planned placement. Placing at the cap evicts the owner's oldest
/// building of the same kind.
pub fn apply_building(
    state: &mut GameState,
    builder_id: UnitId,
    kind: BuildingKind,
    plan: BuildPlan,
    events: &mut Vec<Event>,
) -> BuildingId {
    let (owner, at) = {
        let builder = state.unit(builder_id).expect("builder exists");
        (builder.owner, builder.pos)
    };

    let cap = building_cap(state, owner, kind);
    let existing: Vec<BuildingId> = state
        .buildings
        .iter()
        .filter(|b| b.owner == owner && b.kind == kind)
        .map(|b| b.id)
        .collect();
    if existing.len() >= cap {
        let oldest = existing[0];
        state.buildings.retain(|b| b.id != oldest);
        events.push(Event::BuildingRemoved { building: oldest });
    }

    let id = state.alloc_building_id();
    // Level-1 towers are temporary; everything else persists.
    let duration = if kind == BuildingKind::Tower && plan.level == 1 {
        Some(state.rules.tower_duration)
    } else {
        None
    };
    state.buildings.push(Building {
        id,
        owner,
        kind,
        pos: at,
        level: plan.level,
        duration,
    });
    events.push(Event::BuildingPlaced {
        building: id,
        owner,
        kind,
        at,
    });
    state.push_log(
        LogCategory::Move,
        Some(owner),
        LogMessage::BuildingPlaced { kind },
    );
    id
}

/// Reveal enemy mines in range of every standing tower. Runs on each
/// thinking-to-action transition.
pub fn run_tower_reveals(state: &mut GameState, events: &mut Vec<Event>) {
    let towers: Vec<(PlayerId, Coord)> = state
        .buildings
        .iter()
        .filter(|b| b.kind == BuildingKind::Tower)
        .map(|b| (b.owner, b.pos))
        .collect();
    let radius = state.rules.tower_radius;

    let mut revealed = Vec::new();
    for mine in &mut state.mines {
        for &(owner, pos) in &towers {
            if mine.owner != owner && mine.pos.chebyshev(pos) <= radius && mine.reveal_to(owner) {
                events.push(Event::MineRevealed {
                    mine: mine.id,
                    to: owner,
                });
                revealed.push((owner, mine.pos));
            }
        }
    }
    for (owner, at) in revealed {
        state.push_log(LogCategory::Mine, Some(owner), LogMessage::MineRevealed { at });
    }
}

/// Detonating towers requires at least one enemy mine in range of one of
/// them; the cost is flat.
pub fn plan_detonate(state: &GameState, unit: &Unit) -> Result<i32, GameError> {
    if unit.archetype != Archetype::Sweeper {
        return Err(GameError::PrerequisiteNotMet);
    }
    let towers: Vec<Coord> = state
        .buildings
        .iter()
        .filter(|b| b.owner == unit.owner && b.kind == BuildingKind::Tower)
        .map(|b| b.pos)
        .collect();
    if towers.is_empty() {
        return Err(GameError::PrerequisiteNotMet);
    }
    let radius = state.rules.tower_radius;
    let armed = state.mines.iter().any(|m| {
        m.owner != unit.owner && towers.iter().any(|&t| m.pos.chebyshev(t) <= radius)
    });
    if !armed {
        return Err(GameError::IllegalTarget);
    }
    Ok(state.rules.detonate_cost)
}

/// Blow every own tower: enemy mines in range are removed, enemy units in
/// range take the detonation damage, and the towers are consumed.
pub fn apply_detonate(state: &mut GameState, unit_id: UnitId, events: &mut Vec<Event>) {
    let owner = state.unit(unit_id).expect("unit exists").owner;
    let radius = state.rules.tower_radius;
    let towers: Vec<Coord> = state
        .buildings
        .iter()
        .filter(|b| b.owner == owner && b.kind == BuildingKind::Tower)
        .map(|b| b.pos)
        .collect();

    let doomed: Vec<_> = state
        .mines
        .iter()
        .filter(|m| m.owner != owner && towers.iter().any(|&t| m.pos.chebyshev(t) <= radius))
        .map(|m| m.id)
        .collect();
    let mines_removed = doomed.len() as u8;
    for id in &doomed {
        events.push(Event::MineRemoved { mine: *id });
    }
    state.mines.retain(|m| !doomed.contains(&m.id));

    let victims: Vec<(UnitId, Coord)> = state
        .units
        .iter()
        .filter(|u| {
            u.is_alive()
                && u.owner != owner
                && towers.iter().any(|&t| u.pos.chebyshev(t) <= radius)
        })
        .map(|u| (u.id, u.pos))
        .collect();
    for (victim, pos) in victims {
        let (amount, _) =
            state.apply_flag_aura(owner.opponent(), pos, state.rules.detonate_damage);
        damage::deal_damage(state, victim, amount, Some(owner), events);
    }

    let consumed: Vec<BuildingId> = state
        .buildings
        .iter()
        .filter(|b| b.owner == owner && b.kind == BuildingKind::Tower)
        .map(|b| b.id)
        .collect();
    for id in &consumed {
        events.push(Event::BuildingRemoved { building: *id });
    }
    state
        .buildings
        .retain(|b| !(b.owner == owner && b.kind == BuildingKind::Tower));

    events.push(Event::TowersDetonated { player: owner });
    state.push_log(
        LogCategory::Mine,
        Some(owner),
        LogMessage::TowersDetonated {
            mines: mines_removed,
        },
    );
}

/// True when `at` is inside the remote-placement range of one of the
/// player's factories: Chebyshev 1 at level 1, Manhattan 2 from level 2.
pub fn factory_in_range(state: &GameState, player: PlayerId, at: Coord) -> bool {
    state.buildings.iter().any(|b| {
        b.owner == player
            && b.kind == BuildingKind::Factory
            && if b.level >= 2 {
                at.manhattan(b.pos) <= state.rules.factory_radius_extended
            } else {
                at.chebyshev(b.pos) <= state.rules.factory_radius
            }
    })
}

/// The player's live-mine cap, raised by the Maker's branch B.
pub fn mine_cap(state: &GameState, player: PlayerId) -> u32 {
    let maker = state.player(player).track(Archetype::Maker);
    let base = state.rules.base_mine_cap;
    if maker.b.level >= 3 {
        if maker.b.variant == Some(Variant::Two) {
            let factories = state
                .buildings
                .iter()
                .filter(|b| b.owner == player && b.kind == BuildingKind::Factory)
                .count() as u32;
            return base + 2 * factories;
        }
        return 8;
    }
    base + u32::from(maker.b.level)
}

/// Pre-territory price of a mine, honoring the B3-1 workshop rate inside
/// factory range.
pub fn mine_price(state: &GameState, player: PlayerId, kind: MineKind, at: Coord) -> i32 {
    let maker = state.player(player).track(Archetype::Maker);
    if maker.is_variant(Branch::B, Variant::One) && factory_in_range(state, player, at) {
        return state.rules.workshop_mine_cost;
    }
    state.rules.mine_cost(kind)
}
