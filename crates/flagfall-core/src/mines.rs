use flagfall_protocol::{
    Archetype, Branch, Coord, Event, LogCategory, LogMessage, MineId, MineKind, PlayerId, UnitId,
    Variant,
};

use crate::{
    damage,
    state::{GameState, Mine, SmokeCloud},
};

/// The trigger predicate for direct contact: never the owner's own mines,
/// never a mine the unit was standing on at placement, and never a Maker
/// that took the A-branch flight capstone.
pub fn should_trigger(state: &GameState, unit_id: UnitId, mine: &Mine) -> bool {
    let Some(unit) = state.unit(unit_id) else {
        return false;
    };
    if mine.owner == unit.owner {
        return false;
    }
    if mine.immune_units.contains(&unit.id) {
        return false;
    }
    let maker = state.player(unit.owner).track(Archetype::Maker);
    if unit.archetype == Archetype::Maker && maker.is_variant(Branch::A, Variant::Two) {
        return false;
    }
    true
}

/// Resolve mine consequences of a unit arriving at `dest` from `start`.
/// Returns true when a mine fired. Proximity nukes outrank direct contact,
/// and only catch movers that started outside their footprint.
pub fn resolve_mine_entry(
    state: &mut GameState,
    unit_id: UnitId,
    dest: Coord,
    start: Coord,
    events: &mut Vec<Event>,
) -> bool {
    let owner = match state.unit(unit_id) {
        Some(u) => u.owner,
        None => return false,
    };

    let nuke_radius = state.rules.nuke_radius;
    let proximity = state
        .mines
        .iter()
        .find(|m| {
            m.kind == MineKind::Nuke
                && m.owner != owner
                && m.pos.chebyshev(dest) <= nuke_radius
                && m.pos.chebyshev(start) > nuke_radius
        })
        .map(|m| m.id);

    if let Some(mine_id) = proximity {
        let mine = take_mine(state, mine_id).expect("proximity mine exists");
        note_trigger(state, unit_id, &mine, events);
        detonate_nuke(state, mine, Some(unit_id), false, events);
        post_trigger_support(state, unit_id, events);
        return true;
    }

    let contact = state
        .mines
        .iter()
        .find(|m| m.pos == dest && should_trigger(state, unit_id, m))
        .map(|m| m.id);

    let Some(mine_id) = contact else {
        return false;
    };
    let mine = take_mine(state, mine_id).expect("contact mine exists");
    note_trigger(state, unit_id, &mine, events);

    match mine.kind {
        MineKind::Normal => {
            let base = state.rules.normal_mine_damage;
            mine_damage(state, unit_id, base, Some(mine.owner), events);
        }
        MineKind::Slow => {
            let base = state.rules.slow_mine_damage;
            mine_damage(state, unit_id, base, Some(mine.owner), events);
            apply_slow_debuff(state, unit_id, events);
        }
        MineKind::Smoke => {
            let base = state.rules.smoke_mine_damage;
            mine_damage(state, unit_id, base, Some(mine.owner), events);
            deploy_smoke(state, mine.owner, mine.pos, events);
        }
        MineKind::Chain => {
            let base = state.rules.chain_mine_damage;
            mine_damage(state, unit_id, base, Some(mine.owner), events);
            cascade_chain(state, mine.pos, events);
        }
        MineKind::Nuke => {
            detonate_nuke(state, mine, Some(unit_id), false, events);
        }
    }

    post_trigger_support(state, unit_id, events);
    true
}

/// Remove the mine from the board; a removed mine can never fire again.
fn take_mine(state: &mut GameState, id: MineId) -> Option<Mine> {
    let index = state.mines.iter().position(|m| m.id == id)?;
    Some(state.mines.remove(index))
}

fn note_trigger(state: &mut GameState, unit_id: UnitId, mine: &Mine, events: &mut Vec<Event>) {
    let (victim_owner, archetype) = {
        let unit = state.unit(unit_id).expect("triggerer exists");
        (unit.owner, unit.archetype)
    };
    state.player_mut(victim_owner).quest.triggered_mine_this_round = true;
    state.player_mut(mine.owner).quest.own_mines_triggered += 1;

    events.push(Event::MineTriggered {
        mine: mine.id,
        kind: mine.kind,
        at: mine.pos,
        by: unit_id,
    });
    let base = base_damage(state, mine.kind);
    state.push_log(
        LogCategory::Mine,
        Some(victim_owner),
        LogMessage::MineTriggered {
            kind: mine.kind,
            archetype,
            damage: base,
        },
    );
}

fn base_damage(state: &GameState, kind: MineKind) -> i32 {
    let rules = &state.rules;
    match kind {
        MineKind::Normal => rules.normal_mine_damage,
        MineKind::Slow => rules.slow_mine_damage,
        MineKind::Smoke => rules.smoke_mine_damage,
        MineKind::Chain => rules.chain_mine_damage,
        MineKind::Nuke => rules.nuke_mine_damage,
    }
}

/// Mine damage pipeline, in fixed order: vulnerability surcharge, flag-aura
/// percentage, flat defusal reduction for protected allies, then the
/// Defuser's own percentage defusal. Returns the damage actually dealt.
pub fn mine_damage(
    state: &mut GameState,
    victim: UnitId,
    base: i32,
    killer: Option<PlayerId>,
    events: &mut Vec<Event>,
) -> i32 {
    let (owner, archetype, pos, hp, max_hp, vulnerability) = {
        let Some(unit) = state.unit(victim) else {
            return 0;
        };
        if !unit.is_alive() {
            return 0;
        }
        (
            unit.owner,
            unit.archetype,
            unit.pos,
            unit.hp,
            unit.max_hp,
            unit.status.mine_vulnerability,
        )
    };
    let defuser = state.player(owner).track(Archetype::Defuser);
    let mult = state.rules.defuser_mine_multiplier;

    let mut dmg = base + vulnerability;

    let (reduced_dmg, aura_applied) = state.apply_flag_aura(owner, pos, dmg);
    dmg = reduced_dmg;

    let low_hp = hp * 2 < max_hp;
    if archetype != Archetype::Defuser && defuser.a.level >= 1 {
        let mut reduction = if low_hp { 2 } else { 1 };
        if defuser.is_variant(Branch::A, Variant::Two) {
            reduction = if low_hp { 3 } else { 2 };
        }
        dmg = (dmg - reduction).max(0);
    }

    if archetype == Archetype::Defuser {
        dmg = (dmg as f32 * mult).floor() as i32;
        if defuser.is_variant(Branch::A, Variant::Two) {
            dmg = (dmg as f32 * mult).floor() as i32;
        }
    }

    if aura_applied {
        state.push_log(LogCategory::Mine, Some(owner), LogMessage::FlagAuraReduced);
    }

    state.player_mut(owner).quest.mine_damage_soaked += dmg.max(0) as u32;
    damage::deal_damage(state, victim, dmg, killer, events);
    dmg
}

/// Defuser team support fired once per direct trigger: the A2 patch-up heal
/// and the A3-1 reflection onto the weakest living enemy.
fn post_trigger_support(state: &mut GameState, triggerer: UnitId, events: &mut Vec<Event>) {
    let (owner, archetype, alive) = {
        let Some(unit) = state.unit(triggerer) else {
            return;
        };
        (unit.owner, unit.archetype, unit.is_alive())
    };
    let defuser = state.player(owner).track(Archetype::Defuser);

    if defuser.a.level >= 2 && alive {
        let amount = {
            let unit = state.unit(triggerer).expect("triggerer exists");
            if unit.hp * 2 < unit.max_hp {
                2
            } else {
                1
            }
        };
        let unit = state.unit_mut(triggerer).expect("triggerer exists");
        let healed = unit.heal(amount);
        let hp = unit.hp;
        if healed > 0 {
            events.push(Event::UnitHealed {
                unit: triggerer,
                amount: healed,
                hp,
            });
            state.push_log(
                LogCategory::Mine,
                Some(owner),
                LogMessage::TriggerHeal { amount: healed },
            );
        }
    }

    if defuser.is_variant(Branch::A, Variant::One) {
        let reflect = if archetype == Archetype::Defuser { 3 } else { 2 };
        let target = state
            .units
            .iter()
            .filter(|u| u.owner != owner && u.is_alive())
            .min_by_key(|u| (u.hp, u.id.0))
            .map(|u| (u.id, u.archetype));
        if let Some((target_id, target_archetype)) = target {
            damage::deal_damage(state, target_id, reflect, Some(owner), events);
            state.push_log(
                LogCategory::Mine,
                Some(owner),
                LogMessage::DamageReflected {
                    target: target_archetype,
                    damage: reflect,
                },
            );
        }
    }
}

/// Slow mines weigh the victim down by its own base move cost for three
/// action sub-turns; re-triggers refresh rather than stack.
fn apply_slow_debuff(state: &mut GameState, victim: UnitId, _events: &mut [Event]) {
    let (archetype, owner) = {
        let Some(unit) = state.unit(victim) else {
            return;
        };
        (unit.archetype, unit.owner)
    };
    let magnitude = state.rules.profile(archetype).move_cost;
    let subturns = state.rules.slow_debuff_subturns;
    let unit = state.unit_mut(victim).expect("victim exists");
    unit.status.move_cost_debuff = unit.status.move_cost_debuff.max(magnitude);
    unit.status.move_cost_debuff_subturns = unit.status.move_cost_debuff_subturns.max(subturns);
    state.push_log(
        LogCategory::Mine,
        Some(owner),
        LogMessage::HeavySteps { archetype },
    );
}

/// A 3x3 block of timed clouds centered on the blast.
pub fn deploy_smoke(state: &mut GameState, owner: PlayerId, center: Coord, events: &mut Vec<Event>) {
    let duration = state.rules.smoke_duration;
    for at in center.neighborhood3() {
        if !state.board.in_bounds(at) {
            continue;
        }
        let id = state.alloc_smoke_id();
        state.smokes.push(SmokeCloud {
            id,
            owner,
            pos: at,
            duration,
        });
        events.push(Event::SmokeDeployed {
            smoke: id,
            owner,
            at,
        });
    }
    state.push_log(
        LogCategory::Mine,
        Some(owner),
        LogMessage::SmokeDeployed { at: center },
    );
}

/// Nuke detonation. The direct triggerer (if any) already took or takes the
/// full hit; everyone else in the footprint takes blast damage unless this
/// is a secondary (chain-nested) detonation, which only clears the
/// footprint. The footprint always loses its mines and buildings.
pub fn detonate_nuke(
    state: &mut GameState,
    mine: Mine,
    triggerer: Option<UnitId>,
    secondary: bool,
    events: &mut Vec<Event>,
) {
    let rules_radius = state.rules.nuke_radius;
    let center = mine.pos;
    state.push_log(
        LogCategory::Mine,
        Some(mine.owner),
        LogMessage::NukeBlast { at: center },
    );

    if let Some(unit_id) = triggerer {
        let full = state.rules.nuke_mine_damage;
        mine_damage(state, unit_id, full, Some(mine.owner), events);
    }

    if !secondary {
        let victims: Vec<(UnitId, i32)> = state
            .units
            .iter()
            .filter(|u| {
                u.is_alive()
                    && Some(u.id) != triggerer
                    && u.pos.chebyshev(center) <= rules_radius
            })
            .map(|u| {
                let base = if u.owner == mine.owner {
                    state.rules.nuke_blast_friendly_damage
                } else {
                    state.rules.nuke_blast_damage
                };
                (u.id, base)
            })
            .collect();
        for (unit_id, base) in victims {
            mine_damage(state, unit_id, base, Some(mine.owner), events);
        }
    }

    // Flatten the footprint: every mine and building inside goes.
    let doomed_mines: Vec<MineId> = state
        .mines
        .iter()
        .filter(|m| m.pos.chebyshev(center) <= rules_radius)
        .map(|m| m.id)
        .collect();
    for id in doomed_mines {
        let _ = take_mine(state, id);
        events.push(Event::MineRemoved { mine: id });
    }
    let doomed_buildings: Vec<_> = state
        .buildings
        .iter()
        .filter(|b| b.pos.chebyshev(center) <= rules_radius)
        .map(|b| b.id)
        .collect();
    for id in doomed_buildings {
        state.buildings.retain(|b| b.id != id);
        events.push(Event::BuildingRemoved { building: id });
    }
}

/// Chain cascade: every mine within the chain radius of a detonating chain
/// mine co-detonates, recursively. Each cascaded mine deals link damage to
/// units hostile to it nearby and applies its own type effect; nested nukes
/// only flatten their footprint.
pub fn cascade_chain(state: &mut GameState, origin: Coord, events: &mut Vec<Event>) {
    let chain_radius = state.rules.chain_radius;
    let mut centers = vec![origin];
    let mut chained = 0_u8;

    while let Some(center) = centers.pop() {
        let linked: Vec<MineId> = state
            .mines
            .iter()
            .filter(|m| m.pos.chebyshev(center) <= chain_radius)
            .map(|m| m.id)
            .collect();

        for id in linked {
            let Some(mine) = take_mine(state, id) else {
                continue;
            };
            chained = chained.saturating_add(1);
            events.push(Event::MineRemoved { mine: id });

            link_damage(state, &mine, events);
            match mine.kind {
                MineKind::Normal => {}
                MineKind::Slow => {
                    let victims = hostile_units_near(state, &mine);
                    for unit_id in victims {
                        apply_slow_debuff(state, unit_id, events);
                    }
                }
                MineKind::Smoke => deploy_smoke(state, mine.owner, mine.pos, events),
                MineKind::Chain => centers.push(mine.pos),
                MineKind::Nuke => detonate_nuke(state, mine, None, true, events),
            }
        }
    }

    if chained > 0 {
        state.push_log(LogCategory::Mine, None, LogMessage::MineChained { count: chained });
    }
}

fn hostile_units_near(state: &GameState, mine: &Mine) -> Vec<UnitId> {
    let radius = state.rules.chain_radius;
    state
        .units
        .iter()
        .filter(|u| u.is_alive() && u.owner != mine.owner && u.pos.manhattan(mine.pos) <= radius)
        .map(|u| u.id)
        .collect()
}

fn link_damage(state: &mut GameState, mine: &Mine, events: &mut Vec<Event>) {
    if mine.kind == MineKind::Nuke {
        return;
    }
    let base = state.rules.chain_link_damage;
    for unit_id in hostile_units_near(state, mine) {
        mine_damage(state, unit_id, base, Some(mine.owner), events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EvolutionBranch;

    fn find_unit(state: &GameState, player: PlayerId, archetype: Archetype) -> UnitId {
        state
            .units
            .iter()
            .find(|u| u.owner == player && u.archetype == archetype)
            .map(|u| u.id)
            .unwrap()
    }

    fn plant(state: &mut GameState, owner: PlayerId, kind: MineKind, pos: Coord) -> MineId {
        let id = state.alloc_mine_id();
        state.mines.push(Mine {
            id,
            owner,
            kind,
            pos,
            revealed_to: Vec::new(),
            immune_units: Vec::new(),
            converted: false,
        });
        id
    }

    /// Park a unit somewhere quiet and walk it onto a mine.
    fn walk_onto(state: &mut GameState, unit_id: UnitId, dest: Coord) -> (bool, Vec<Event>) {
        let start = Coord::new(0, 8);
        {
            let unit = state.unit_mut(unit_id).unwrap();
            unit.pos = dest;
        }
        let mut events = Vec::new();
        let fired = resolve_mine_entry(state, unit_id, dest, start, &mut events);
        (fired, events)
    }

    #[test]
    fn own_and_immune_mines_never_fire() {
        let mut state = GameState::new_for_tests(21);
        let sweeper = find_unit(&state, PlayerId::ONE, Archetype::Sweeper);
        let cell = Coord::new(1, 9);

        plant(&mut state, PlayerId::ONE, MineKind::Normal, cell);
        let (fired, _) = walk_onto(&mut state, sweeper, cell);
        assert!(!fired, "own mine must not fire");
        state.mines.clear();

        let id = plant(&mut state, PlayerId::TWO, MineKind::Normal, cell);
        state
            .mines
            .iter_mut()
            .find(|m| m.id == id)
            .unwrap()
            .immune_units
            .push(sweeper);
        let (fired, _) = walk_onto(&mut state, sweeper, cell);
        assert!(!fired, "immunity list must hold");
    }

    #[test]
    fn normal_mine_hits_for_eight_and_vanishes() {
        let mut state = GameState::new_for_tests(21);
        let general = find_unit(&state, PlayerId::ONE, Archetype::General);
        let cell = Coord::new(1, 9);
        plant(&mut state, PlayerId::TWO, MineKind::Normal, cell);

        let hp_before = state.unit(general).unwrap().hp;
        let (fired, _) = walk_onto(&mut state, general, cell);
        assert!(fired);
        assert_eq!(state.unit(general).unwrap().hp, hp_before - 8);
        assert!(state.mines.is_empty());
        assert!(state.player(PlayerId::ONE).quest.triggered_mine_this_round);
        assert_eq!(state.player(PlayerId::TWO).quest.own_mines_triggered, 1);

        // the cell is clean now; walking it again is free
        let (fired_again, _) = walk_onto(&mut state, general, cell);
        assert!(!fired_again);
    }

    #[test]
    fn slow_mine_debuffs_by_base_move_cost() {
        let mut state = GameState::new_for_tests(21);
        let general = find_unit(&state, PlayerId::ONE, Archetype::General);
        let cell = Coord::new(1, 9);
        plant(&mut state, PlayerId::TWO, MineKind::Slow, cell);

        let hp_before = state.unit(general).unwrap().hp;
        walk_onto(&mut state, general, cell);
        let unit = state.unit(general).unwrap();
        assert_eq!(unit.hp, hp_before - 3);
        assert_eq!(unit.status.move_cost_debuff, 3);
        assert_eq!(unit.status.move_cost_debuff_subturns, 3);
    }

    #[test]
    fn smoke_mine_blankets_a_three_by_three() {
        let mut state = GameState::new_for_tests(21);
        let general = find_unit(&state, PlayerId::ONE, Archetype::General);
        let cell = Coord::new(3, 9);
        plant(&mut state, PlayerId::TWO, MineKind::Smoke, cell);

        walk_onto(&mut state, general, cell);
        assert_eq!(state.smokes.len(), 9);
        assert!(state.smokes.iter().all(|s| s.owner == PlayerId::TWO));
        assert!(state.smokes.iter().all(|s| s.duration == 3));
    }

    #[test]
    fn smoke_at_the_edge_clips_to_the_board() {
        let mut state = GameState::new_for_tests(21);
        let general = find_unit(&state, PlayerId::ONE, Archetype::General);
        let cell = Coord::new(0, 8);
        plant(&mut state, PlayerId::TWO, MineKind::Smoke, cell);
        {
            let unit = state.unit_mut(general).unwrap();
            unit.pos = cell;
        }
        let mut events = Vec::new();
        resolve_mine_entry(&mut state, general, cell, Coord::new(1, 6), &mut events);
        assert_eq!(state.smokes.len(), 6);
    }

    #[test]
    fn defuser_shrugs_off_half_the_damage() {
        let mut state = GameState::new_for_tests(21);
        let defuser = find_unit(&state, PlayerId::ONE, Archetype::Defuser);
        let cell = Coord::new(1, 9);
        plant(&mut state, PlayerId::TWO, MineKind::Normal, cell);

        let hp_before = state.unit(defuser).unwrap().hp;
        walk_onto(&mut state, defuser, cell);
        assert_eq!(state.unit(defuser).unwrap().hp, hp_before - 4);
    }

    #[test]
    fn vulnerability_is_added_before_the_aura() {
        let mut state = GameState::new_for_tests(21);
        let general = find_unit(&state, PlayerId::ONE, Archetype::General);
        state
            .unit_mut(general)
            .unwrap()
            .status
            .mine_vulnerability = 2;
        let cell = Coord::new(1, 9);
        plant(&mut state, PlayerId::TWO, MineKind::Normal, cell);
        let hp_before = state.unit(general).unwrap().hp;
        walk_onto(&mut state, general, cell);
        assert_eq!(state.unit(general).unwrap().hp, hp_before - 10);
    }

    #[test]
    fn defusal_team_reduction_spares_allies() {
        let mut state = GameState::new_for_tests(21);
        state
            .player_mut(PlayerId::ONE)
            .track_mut(Archetype::Defuser)
            .a = EvolutionBranch {
            level: 1,
            variant: None,
        };
        let general = find_unit(&state, PlayerId::ONE, Archetype::General);
        let cell = Coord::new(1, 9);
        plant(&mut state, PlayerId::TWO, MineKind::Normal, cell);
        let hp_before = state.unit(general).unwrap().hp;
        walk_onto(&mut state, general, cell);
        assert_eq!(state.unit(general).unwrap().hp, hp_before - 7);
    }

    #[test]
    fn nuke_blast_levels_the_footprint() {
        let mut state = GameState::new_for_tests(21);
        let general = find_unit(&state, PlayerId::ONE, Archetype::General);
        let bystander = find_unit(&state, PlayerId::TWO, Archetype::Ranger);
        let center = Coord::new(3, 10);
        plant(&mut state, PlayerId::TWO, MineKind::Nuke, center);
        plant(&mut state, PlayerId::TWO, MineKind::Normal, center.offset(1, 0));
        plant(&mut state, PlayerId::ONE, MineKind::Normal, center.offset(-1, 1));

        {
            let unit = state.unit_mut(bystander).unwrap();
            unit.pos = center.offset(0, 1);
        }
        let hp_friendly = state.unit(bystander).unwrap().hp;

        let (fired, _) = walk_onto(&mut state, general, center);
        assert!(fired);
        // direct trigger takes the full hit
        assert_eq!(state.unit(general).unwrap().hp, 28 - 12);
        // the mine owner's own unit takes the lesser blast
        assert_eq!(state.unit(bystander).unwrap().hp, hp_friendly - 6);
        // footprint is swept clean of mines
        assert!(state.mines.is_empty());
    }

    #[test]
    fn proximity_nuke_catches_outside_walkers_only() {
        let mut state = GameState::new_for_tests(21);
        let general = find_unit(&state, PlayerId::ONE, Archetype::General);
        let center = Coord::new(3, 10);
        plant(&mut state, PlayerId::TWO, MineKind::Nuke, center);

        // stepping between two cells inside the footprint is safe
        {
            let unit = state.unit_mut(general).unwrap();
            unit.pos = center.offset(0, 1);
        }
        let mut events = Vec::new();
        let fired = resolve_mine_entry(
            &mut state,
            general,
            center.offset(0, 1),
            center.offset(1, 1),
            &mut events,
        );
        assert!(!fired);

        // entering the footprint from outside sets it off
        let (fired, _) = walk_onto(&mut state, general, center.offset(0, 1));
        assert!(fired);
        assert!(state.mines.is_empty());
    }

    #[test]
    fn chain_cascade_sweeps_linked_mines() {
        let mut state = GameState::new_for_tests(21);
        let general = find_unit(&state, PlayerId::ONE, Archetype::General);
        let origin = Coord::new(3, 9);
        plant(&mut state, PlayerId::TWO, MineKind::Chain, origin);
        plant(&mut state, PlayerId::TWO, MineKind::Normal, origin.offset(0, 2));
        // two hops away through the second chain
        plant(&mut state, PlayerId::TWO, MineKind::Chain, origin.offset(2, 1));
        plant(&mut state, PlayerId::TWO, MineKind::Normal, origin.offset(3, 3));
        // out of everyone's reach, survives
        let far = plant(&mut state, PlayerId::TWO, MineKind::Normal, Coord::new(0, 16));

        let (fired, _) = walk_onto(&mut state, general, origin);
        assert!(fired);
        assert_eq!(state.mines.len(), 1);
        assert_eq!(state.mines[0].id, far);
    }

    #[test]
    fn nested_nuke_flattens_without_blast_damage() {
        let mut state = GameState::new_for_tests(21);
        let general = find_unit(&state, PlayerId::ONE, Archetype::General);
        let bystander = find_unit(&state, PlayerId::ONE, Archetype::Ranger);
        let origin = Coord::new(3, 9);
        let nuke_at = origin.offset(0, 2);
        plant(&mut state, PlayerId::TWO, MineKind::Chain, origin);
        plant(&mut state, PlayerId::TWO, MineKind::Nuke, nuke_at);
        plant(&mut state, PlayerId::TWO, MineKind::Normal, nuke_at.offset(1, 1));

        // a unit inside the nested nuke footprint but outside every
        // link-damage radius
        {
            let unit = state.unit_mut(bystander).unwrap();
            unit.pos = nuke_at.offset(-1, 1);
        }
        let hp_before = state.unit(bystander).unwrap().hp;

        let (fired, _) = walk_onto(&mut state, general, origin);
        assert!(fired);
        assert!(state.mines.is_empty(), "nested footprint must be cleared");
        assert_eq!(
            state.unit(bystander).unwrap().hp,
            hp_before,
            "nested nukes deal no area damage"
        );
    }
}
