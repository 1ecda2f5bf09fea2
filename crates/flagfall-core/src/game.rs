use flagfall_protocol::{
    ActionKind, ActionMenu, Archetype, Branch, BuildingKind, Command, Coord, Event, LegalAction,
    LogCategory, LogMessage, MineKind, Phase, PlayerId, ReplayFile, Snapshot, UnitId, Variant,
    REPLAY_VERSION,
};

use crate::{
    board, buildings, combat, cost, damage, economy,
    error::GameError,
    evolution, mines,
    rules::Rules,
    state::{EvolutionTrack, GameState, Mine},
    unit::{CarriedMine, Unit},
};

/// The command-sourced engine. Every intent goes through [`GameEngine::apply`],
/// which validates against a scratch copy of the state and either commits the
/// whole mutation or leaves the live state untouched. Accepted commands are
/// recorded in order, so `seed + command log` replays the game exactly.
pub struct GameEngine {
    state: GameState,
    seed: u64,
    commands: Vec<Command>,
}

impl GameEngine {
    pub fn new(rules: Rules, seed: u64) -> Self {
        Self {
            state: GameState::new(rules, seed),
            seed,
            commands: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.to_snapshot()
    }

    pub fn replay(&self) -> ReplayFile {
        ReplayFile {
            version: REPLAY_VERSION,
            seed: self.seed,
            commands: self.commands.clone(),
        }
    }

    /// Rebuild a game from a recording. Commands in a well-formed replay were
    /// all accepted when recorded; any rejection here is a corrupt file and
    /// the offending command is skipped.
    pub fn from_replay(rules: Rules, replay: &ReplayFile) -> Self {
        let mut engine = GameEngine::new(rules, replay.seed);
        for command in &replay.commands {
            let _ = engine.apply(command.clone());
        }
        engine
    }

    /// Validate and commit one command. On rejection the state is unchanged
    /// except for a single error-category log entry.
    pub fn apply(&mut self, command: Command) -> Result<Vec<Event>, GameError> {
        if self.state.phase == Phase::GameOver {
            return Err(GameError::GameOver);
        }
        let mut next = self.state.clone();
        let mut events = Vec::new();
        match try_apply(&mut next, &command, &mut events) {
            Ok(()) => {
                check_flag_victory(&mut next, &mut events);
                self.state = next;
                self.commands.push(command);
                Ok(events)
            }
            Err(err) => {
                let owner = command_owner(&self.state, &command);
                self.state.push_log(
                    LogCategory::Error,
                    owner,
                    LogMessage::Rejected {
                        reason: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Advance the phase clock by one second. At zero the phase resolves
    /// itself: placement auto-confirms, thinking rolls into action, and the
    /// action phase force-passes a unit of the current player.
    pub fn tick(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let state = &mut self.state;
        if state.paused || state.phase == Phase::GameOver {
            return events;
        }
        if state.timer_seconds > 0 {
            state.timer_seconds -= 1;
        }
        if state.timer_seconds > 0 {
            return events;
        }
        match state.phase {
            Phase::Placement => {
                for player in [PlayerId::ONE, PlayerId::TWO] {
                    if !state.player(player).placement_confirmed {
                        confirm_player(state, player, &mut events);
                    }
                }
                begin_thinking(state, &mut events);
            }
            Phase::Thinking => begin_action(state, &mut events),
            Phase::Action => force_pass(state, &mut events),
            Phase::GameOver => {}
        }
        events
    }

    pub fn pause(&mut self) {
        self.state.paused = true;
    }

    pub fn resume(&mut self) {
        self.state.paused = false;
    }

    /// Previewed action costs for one unit, computed by the same pipeline the
    /// commit path uses. Branch prerequisites filter the menu; situational
    /// legality (ranges, targets) is still the commit's call.
    pub fn legal_actions(&self, unit_id: UnitId) -> Option<ActionMenu> {
        let state = &self.state;
        let unit = state.unit(unit_id)?;
        let mut actions = Vec::new();
        if state.phase != Phase::Action || !unit.is_alive() {
            return Some(ActionMenu {
                unit: unit_id,
                actions,
            });
        }
        let rules = &state.rules;
        let player = state.player(unit.owner);
        let priced = |kind, base| LegalAction {
            kind,
            cost: cost::action_cost(state, unit, base, kind),
        };
        let flat = |kind, cost| LegalAction { kind, cost };

        actions.push(priced(ActionKind::Move, cost::move_base_cost(state, unit)));

        match unit.archetype {
            Archetype::General => {
                let base = if unit.has_flag {
                    rules.attack_cost_flag_carrier
                } else {
                    rules.attack_cost
                };
                actions.push(priced(ActionKind::Attack, base));
            }
            Archetype::Sweeper => {
                let track = player.track(Archetype::Sweeper);
                let scan = if player.scans_this_round >= rules.scan_fatigue_after {
                    rules.scan_cost_fatigued
                } else {
                    rules.scan_cost
                };
                actions.push(priced(ActionKind::Scan, scan));
                if track.b.level >= 1 {
                    let sensor = if track.b.level >= 3 {
                        rules.sensor_cost_discounted
                    } else {
                        rules.sensor_cost
                    };
                    actions.push(priced(ActionKind::SensorScan, sensor));
                }
                if track.a.level >= 1 {
                    let tower = if track.is_variant(Branch::A, Variant::One) {
                        rules.tower_cost_discounted
                    } else {
                        rules.tower_cost
                    };
                    actions.push(priced(ActionKind::PlaceTower, tower));
                    if plan_detonate_ready(state, unit) {
                        actions.push(flat(ActionKind::DetonateTowers, rules.detonate_cost));
                    }
                }
            }
            Archetype::Ranger => {
                let track = player.track(Archetype::Ranger);
                if track.a.level >= 1 {
                    actions.push(priced(ActionKind::PlaceHub, rules.hub_cost));
                }
                let cloak_locked =
                    track.is_variant(Branch::B, Variant::One) && unit.status.stealthed;
                if track.b.level >= 2 && !cloak_locked {
                    let toggle = if unit.status.stealthed {
                        0
                    } else {
                        rules.stealth_toggle_cost
                    };
                    actions.push(flat(ActionKind::Stealth, toggle));
                }
                if track.a.level >= 2 {
                    actions.push(flat(ActionKind::Teleport, rules.teleport_cost));
                }
                if track.b.level >= 1 && unit.carried_mine.is_none() {
                    actions.push(flat(ActionKind::PickupMine, 0));
                }
                if unit.carried_mine.is_some() {
                    actions.push(flat(ActionKind::DropMine, 0));
                    if track.is_variant(Branch::B, Variant::Two) {
                        actions.push(priced(ActionKind::ThrowMine, rules.throw_mine_cost));
                    }
                }
            }
            Archetype::Maker => {
                let track = player.track(Archetype::Maker);
                let base = buildings::mine_price(state, unit.owner, MineKind::Normal, unit.pos);
                actions.push(priced(ActionKind::PlaceMine, base));
                if track.b.level >= 1 {
                    actions.push(priced(ActionKind::PlaceFactory, rules.factory_cost));
                }
            }
            Archetype::Defuser => {
                let track = player.track(Archetype::Defuser);
                actions.push(priced(ActionKind::Disarm, rules.disarm_cost));
                actions.push(flat(ActionKind::Dismantle, rules.disarm_cost));
                if track.b.level >= 2 {
                    let shift = if track.is_variant(Branch::B, Variant::Two) {
                        rules.move_mine_damage_cost
                    } else {
                        rules.move_mine_cost
                    };
                    actions.push(flat(ActionKind::MoveMine, shift));
                }
                if track.is_variant(Branch::B, Variant::One) {
                    actions.push(priced(ActionKind::ConvertMine, rules.convert_mine_cost));
                }
            }
        }

        if unit.has_flag {
            actions.push(flat(ActionKind::DropFlag, 0));
        } else if unit.pos == player.flag_position && can_carry_flag(state, unit) {
            actions.push(flat(ActionKind::PickupFlag, 0));
        }
        actions.push(flat(ActionKind::EndTurn, 0));

        Some(ActionMenu {
            unit: unit_id,
            actions,
        })
    }
}

fn plan_detonate_ready(state: &GameState, unit: &Unit) -> bool {
    buildings::plan_detonate(state, unit).is_ok()
}

fn can_carry_flag(state: &GameState, unit: &Unit) -> bool {
    unit.archetype == Archetype::General
        || state
            .player(unit.owner)
            .track(Archetype::General)
            .is_variant(Branch::B, Variant::One)
}

/// The player a command speaks for, used to attribute rejection log entries.
fn command_owner(state: &GameState, command: &Command) -> Option<PlayerId> {
    let by_unit = |unit: &UnitId| state.unit(*unit).map(|u| u.owner);
    match command {
        Command::SwapUnits { player, .. }
        | Command::PlaceSetupMine { player, .. }
        | Command::ConfirmPlacement { player }
        | Command::Ready { player }
        | Command::Evolve { player, .. }
        | Command::SkipTurn { player } => Some(*player),
        Command::SelectUnit { unit }
        | Command::Move { unit, .. }
        | Command::PlaceMine { unit, .. }
        | Command::Scan { unit, .. }
        | Command::SensorScan { unit, .. }
        | Command::DetonateTowers { unit }
        | Command::Disarm { unit, .. }
        | Command::Dismantle { unit, .. }
        | Command::MoveMine { unit, .. }
        | Command::ConvertMine { unit, .. }
        | Command::PickupMine { unit, .. }
        | Command::DropMine { unit }
        | Command::ThrowMine { unit, .. }
        | Command::ToggleStealth { unit }
        | Command::Teleport { unit }
        | Command::PlaceBuilding { unit, .. }
        | Command::PickupFlag { unit }
        | Command::DropFlag { unit }
        | Command::EndUnitTurn { unit } => by_unit(unit),
        Command::Attack { attacker, .. } => by_unit(attacker),
    }
}

fn try_apply(state: &mut GameState, command: &Command, events: &mut Vec<Event>) -> Result<(), GameError> {
    match command {
        Command::SwapUnits { player, a, b } => handle_swap(state, *player, *a, *b, events),
        Command::PlaceSetupMine { player, at, kind } => {
            handle_setup_mine(state, *player, *at, *kind, events)
        }
        Command::ConfirmPlacement { player } => handle_confirm(state, *player, events),
        Command::Ready { player } => handle_ready(state, *player, events),
        Command::SelectUnit { unit } => handle_select(state, *unit),
        Command::Move { unit, to } => handle_move(state, *unit, *to, events),
        Command::Attack { attacker, target } => handle_attack(state, *attacker, *target, events),
        Command::PlaceMine { unit, at, kind } => handle_place_mine(state, *unit, *at, *kind, events),
        Command::Scan { unit, at } => handle_scan(state, *unit, *at, events),
        Command::SensorScan { unit, at } => handle_sensor_scan(state, *unit, *at, events),
        Command::DetonateTowers { unit } => handle_detonate(state, *unit, events),
        Command::Disarm { unit, at } => handle_disarm(state, *unit, *at, events),
        Command::Dismantle { unit, at } => handle_dismantle(state, *unit, *at, events),
        Command::MoveMine { unit, from, to } => handle_move_mine(state, *unit, *from, *to, events),
        Command::ConvertMine { unit, at } => handle_convert_mine(state, *unit, *at, events),
        Command::PickupMine { unit, at } => handle_pickup_mine(state, *unit, *at, events),
        Command::DropMine { unit } => handle_drop_mine(state, *unit, events),
        Command::ThrowMine { unit, at } => handle_throw_mine(state, *unit, *at, events),
        Command::ToggleStealth { unit } => handle_stealth(state, *unit, events),
        Command::Teleport { unit } => handle_teleport(state, *unit, events),
        Command::PlaceBuilding { unit, kind, at } => {
            handle_place_building(state, *unit, *kind, *at, events)
        }
        Command::PickupFlag { unit } => handle_pickup_flag(state, *unit, events),
        Command::DropFlag { unit } => handle_drop_flag(state, *unit, events),
        Command::Evolve {
            player,
            archetype,
            branch,
            variant,
        } => handle_evolve(state, *player, *archetype, *branch, *variant, events),
        Command::EndUnitTurn { unit } => handle_end_unit_turn(state, *unit, events),
        Command::SkipTurn { player } => handle_skip_turn(state, *player, events),
    }
}

// --- common gates ---

/// Shared action-phase gate: right phase, the commander's own living unit,
/// optionally not yet acted, and no other unit holding the active lock.
fn gate(state: &GameState, unit_id: UnitId, fresh: bool) -> Result<Unit, GameError> {
    if state.phase != Phase::Action {
        return Err(GameError::WrongPhase);
    }
    let unit = state.unit(unit_id).cloned().ok_or(GameError::UnknownUnit)?;
    if !unit.is_alive() {
        return Err(GameError::IllegalTarget);
    }
    if unit.owner != state.current_player {
        return Err(GameError::NotYourTurn);
    }
    if fresh && unit.acted_this_round {
        return Err(GameError::UnitAlreadyActed);
    }
    if state.active_unit.is_some_and(|a| a != unit_id) {
        return Err(GameError::AnotherUnitActive);
    }
    Ok(unit)
}

fn lock_active(state: &mut GameState, unit_id: UnitId, events: &mut Vec<Event>) {
    if state.active_unit != Some(unit_id) {
        state.active_unit = Some(unit_id);
        events.push(Event::ActiveUnitLocked { unit: unit_id });
    }
}

/// Charge a unit action: energy first, then the per-unit phase spend cap.
/// Spending locks the unit as active unless `lock` is off (scans run outside
/// the lock so they never commit a unit's turn).
fn charge(
    state: &mut GameState,
    unit_id: UnitId,
    cost: i32,
    lock: bool,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let (owner, spent, start) = {
        let unit = state.unit(unit_id).expect("charged unit exists");
        (unit.owner, unit.energy_used_this_turn, unit.start_of_action_energy)
    };
    let have = state.player(owner).energy;
    if have < cost {
        return Err(GameError::InsufficientEnergy { need: cost, have });
    }
    let cap = economy::spend_cap(&state.rules, start);
    if spent + cost > cap {
        return Err(GameError::CapExceeded { cap, spent, cost });
    }
    state.player_mut(owner).energy -= cost;
    state.unit_mut(unit_id).expect("charged unit exists").energy_used_this_turn += cost;
    let remaining = state.player(owner).energy;
    events.push(Event::EnergySpent {
        player: owner,
        amount: cost,
        remaining,
    });
    if lock {
        lock_active(state, unit_id, events);
    }
    Ok(())
}

fn mine_kind_allowed(track: EvolutionTrack, kind: MineKind) -> bool {
    match kind {
        MineKind::Normal => true,
        MineKind::Slow => track.a.level >= 1,
        MineKind::Smoke => track.a.level >= 2,
        MineKind::Chain => track.is_variant(Branch::A, Variant::One),
        MineKind::Nuke => track.is_variant(Branch::A, Variant::Two),
    }
}

fn base_mine_damage(rules: &Rules, kind: MineKind) -> i32 {
    match kind {
        MineKind::Normal => rules.normal_mine_damage,
        MineKind::Slow => rules.slow_mine_damage,
        MineKind::Smoke => rules.smoke_mine_damage,
        MineKind::Chain => rules.chain_mine_damage,
        MineKind::Nuke => rules.nuke_mine_damage,
    }
}

// --- placement phase ---

fn handle_swap(
    state: &mut GameState,
    player: PlayerId,
    a: UnitId,
    b: UnitId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    if state.phase != Phase::Placement {
        return Err(GameError::WrongPhase);
    }
    if state.player(player).placement_confirmed {
        return Err(GameError::WrongPhase);
    }
    if a == b {
        return Err(GameError::IllegalTarget);
    }
    let pos_a = {
        let unit = state.unit(a).ok_or(GameError::UnknownUnit)?;
        if unit.owner != player {
            return Err(GameError::NotYourTurn);
        }
        unit.pos
    };
    let pos_b = {
        let unit = state.unit(b).ok_or(GameError::UnknownUnit)?;
        if unit.owner != player {
            return Err(GameError::NotYourTurn);
        }
        unit.pos
    };
    state.unit_mut(a).expect("swap unit exists").pos = pos_b;
    state.unit_mut(b).expect("swap unit exists").pos = pos_a;
    events.push(Event::UnitsSwapped { a, b });
    Ok(())
}

fn handle_setup_mine(
    state: &mut GameState,
    player: PlayerId,
    at: Coord,
    kind: MineKind,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    if state.phase != Phase::Placement {
        return Err(GameError::WrongPhase);
    }
    if state.player(player).placement_confirmed {
        return Err(GameError::WrongPhase);
    }
    if u32::from(state.player(player).setup_mines_placed) >= state.rules.setup_mine_limit {
        return Err(GameError::LimitReached);
    }
    if !mine_kind_allowed(state.player(player).track(Archetype::Maker), kind) {
        return Err(GameError::PrerequisiteNotMet);
    }
    if !state.board.in_bounds(at)
        || state.board.is_obstacle(at)
        || state.board.cell(at).is_some_and(|c| c.flag_base.is_some())
        || state.in_enemy_territory(player, at)
        || state.mine_at(at).is_some()
    {
        return Err(GameError::IllegalTarget);
    }

    let immune: Vec<UnitId> = state
        .units
        .iter()
        .filter(|u| u.is_alive() && u.pos == at)
        .map(|u| u.id)
        .collect();
    let id = state.alloc_mine_id();
    state.mines.push(Mine {
        id,
        owner: player,
        kind,
        pos: at,
        revealed_to: Vec::new(),
        immune_units: immune,
        converted: false,
    });
    let p = state.player_mut(player);
    p.setup_mines_placed += 1;
    p.quest.mines_placed += 1;
    events.push(Event::MinePlaced {
        mine: id,
        owner: player,
        kind,
        at,
    });
    state.push_log(LogCategory::Mine, Some(player), LogMessage::MinePlaced { kind });
    Ok(())
}

fn confirm_player(state: &mut GameState, player: PlayerId, events: &mut Vec<Event>) {
    state.player_mut(player).placement_confirmed = true;
    events.push(Event::PlacementConfirmed { player });
    state.push_log(
        LogCategory::Info,
        Some(player),
        LogMessage::PlacementConfirmed { player },
    );
}

fn handle_confirm(
    state: &mut GameState,
    player: PlayerId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    if state.phase != Phase::Placement {
        return Err(GameError::WrongPhase);
    }
    if state.player(player).placement_confirmed {
        return Err(GameError::LimitReached);
    }
    confirm_player(state, player, events);
    if state.players.iter().all(|p| p.placement_confirmed) {
        begin_thinking(state, events);
    }
    Ok(())
}

// --- phase transitions ---

fn begin_thinking(state: &mut GameState, events: &mut Vec<Event>) {
    state.phase = Phase::Thinking;
    state.timer_seconds = state.rules.thinking_seconds;
    state.active_unit = None;
    state.selected_unit = None;
    events.push(Event::PhaseChanged {
        phase: Phase::Thinking,
        round: state.round,
    });
    let round = state.round;
    state.push_log(LogCategory::Info, None, LogMessage::PhaseStarted { round });
}

fn begin_action(state: &mut GameState, events: &mut Vec<Event>) {
    state.phase = Phase::Action;
    state.timer_seconds = state.rules.action_seconds;
    state.active_unit = None;
    state.selected_unit = None;

    // Towers sweep for hidden mines on every thinking-to-action edge.
    buildings::run_tower_reveals(state, events);

    for player in [PlayerId::ONE, PlayerId::TWO] {
        let energy = state.player(player).energy;
        let p = state.player_mut(player);
        p.start_of_action_energy = energy;
        p.quest.domain_touched.clear();
        for unit in state
            .units
            .iter_mut()
            .filter(|u| u.owner == player && u.is_alive())
        {
            unit.start_of_action_energy = energy;
        }
    }

    events.push(Event::PhaseChanged {
        phase: Phase::Action,
        round: state.round,
    });
}

fn handle_ready(
    state: &mut GameState,
    _player: PlayerId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    if state.phase != Phase::Thinking {
        return Err(GameError::WrongPhase);
    }
    begin_action(state, events);
    Ok(())
}

// --- selection, movement, combat ---

fn handle_select(state: &mut GameState, unit_id: UnitId) -> Result<(), GameError> {
    let _ = gate(state, unit_id, true)?;
    state.selected_unit = Some(unit_id);
    Ok(())
}

fn handle_move(
    state: &mut GameState,
    unit_id: UnitId,
    to: Coord,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    if unit.pos.manhattan(to) != 1 || !state.is_free_for_unit(to) {
        return Err(GameError::IllegalTarget);
    }
    if unit.has_flag {
        let p = state.player(unit.owner);
        let moved = if unit.archetype == Archetype::General {
            p.flag_moves_general
        } else {
            p.flag_moves_other
        };
        if moved >= state.rules.flag_moves_per_round {
            return Err(GameError::LimitReached);
        }
    }

    let base = cost::move_base_cost(state, &unit);
    let price = cost::action_cost(state, &unit, base, ActionKind::Move);
    charge(state, unit_id, price, true, events)?;

    let from = unit.pos;
    state.unit_mut(unit_id).expect("mover exists").pos = to;
    events.push(Event::UnitMoved {
        unit: unit_id,
        from,
        to,
    });
    state.push_log(
        LogCategory::Move,
        Some(unit.owner),
        LogMessage::UnitMoved {
            archetype: unit.archetype,
            to,
            cost: price,
        },
    );

    if unit.archetype == Archetype::Ranger {
        state.player_mut(unit.owner).quest.steps_taken += 1;
    }
    if unit.has_flag {
        let p = state.player_mut(unit.owner);
        p.flag_position = to;
        p.quest.flag_steps += 1;
        if unit.archetype == Archetype::General {
            p.flag_moves_general += 1;
        } else {
            p.flag_moves_other += 1;
        }
        events.push(Event::FlagMoved {
            player: unit.owner,
            at: to,
        });
    }

    let triggered = mines::resolve_mine_entry(state, unit_id, to, from, events);
    apply_domain_toll(state, unit_id, to, from, events);
    // The capstone shadow slips back under cloak after any clean step.
    if !triggered
        && unit.archetype == Archetype::Ranger
        && state
            .player(unit.owner)
            .track(Archetype::Ranger)
            .is_variant(Branch::B, Variant::One)
    {
        if let Some(mover) = state
            .unit_mut(unit_id)
            .filter(|u| u.is_alive() && !u.status.stealthed)
        {
            mover.status.stealthed = true;
            events.push(Event::StealthChanged {
                unit: unit_id,
                stealthed: true,
            });
        }
    }
    // A mover killed on arrival forfeits the rest of its turn.
    if state.phase == Phase::Action && state.unit(unit_id).is_some_and(|u| !u.is_alive()) {
        finish_unit_turn(state, unit_id, events);
    }
    Ok(())
}

/// The capstone General projects a domain around the flag it guards; hostile
/// units pay an entry toll once per turn when they step in from outside.
fn apply_domain_toll(
    state: &mut GameState,
    unit_id: UnitId,
    to: Coord,
    from: Coord,
    events: &mut Vec<Event>,
) {
    let (owner, archetype, alive) = match state.unit(unit_id) {
        Some(u) => (u.owner, u.archetype, u.is_alive()),
        None => return,
    };
    if !alive {
        return;
    }
    let enemy = owner.opponent();
    if !state
        .player(enemy)
        .track(Archetype::General)
        .is_variant(Branch::B, Variant::Two)
    {
        return;
    }
    let heart = state.player(enemy).flag_position;
    let radius = state.rules.domain_radius;
    if to.chebyshev(heart) > radius || from.chebyshev(heart) <= radius {
        return;
    }
    if !state.player_mut(owner).quest.domain_touched.insert(unit_id) {
        return;
    }
    let (amount, _) = state.apply_flag_aura(owner, to, state.rules.domain_enter_damage);
    damage::deal_damage(state, unit_id, amount, Some(enemy), events);
    state.push_log(
        LogCategory::Combat,
        Some(owner),
        LogMessage::DomainDamage {
            archetype,
            damage: amount,
        },
    );
}

fn handle_attack(
    state: &mut GameState,
    attacker_id: UnitId,
    target_id: UnitId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let attacker = gate(state, attacker_id, true)?;
    let target = state.unit(target_id).cloned().ok_or(GameError::UnknownUnit)?;
    let plan = combat::plan_attack(state, &attacker, &target)?;
    charge(state, attacker_id, plan.cost, true, events)?;
    combat::apply_attack(state, attacker_id, target_id, plan, events);
    Ok(())
}

// --- mines ---

fn handle_place_mine(
    state: &mut GameState,
    unit_id: UnitId,
    at: Coord,
    kind: MineKind,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    if unit.archetype != Archetype::Maker {
        return Err(GameError::PrerequisiteNotMet);
    }
    let me = unit.owner;
    if !mine_kind_allowed(state.player(me).track(Archetype::Maker), kind) {
        return Err(GameError::PrerequisiteNotMet);
    }
    let in_reach = unit.pos.manhattan(at) <= 1 || buildings::factory_in_range(state, me, at);
    if !in_reach || !state.board.in_bounds(at) || state.board.is_obstacle(at) {
        return Err(GameError::IllegalTarget);
    }
    if state.building_at(at).is_some() {
        return Err(GameError::IllegalTarget);
    }
    if state.living_unit_at(at).is_some_and(|u| u.id != unit_id) {
        return Err(GameError::IllegalTarget);
    }
    // Stacking onto a mine you know about is out; a hidden enemy mine is a
    // legitimate surprise for both sides.
    if state
        .mines
        .iter()
        .any(|m| m.pos == at && m.is_revealed_to(me))
    {
        return Err(GameError::IllegalTarget);
    }
    let live = state.mines.iter().filter(|m| m.owner == me).count() as u32;
    if live >= buildings::mine_cap(state, me) {
        return Err(GameError::LimitReached);
    }

    let base = buildings::mine_price(state, me, kind, at);
    let price = cost::action_cost(state, &unit, base, ActionKind::PlaceMine);
    charge(state, unit_id, price, true, events)?;

    let immune: Vec<UnitId> = state
        .units
        .iter()
        .filter(|u| u.is_alive() && u.pos == at)
        .map(|u| u.id)
        .collect();
    let id = state.alloc_mine_id();
    state.mines.push(Mine {
        id,
        owner: me,
        kind,
        pos: at,
        revealed_to: Vec::new(),
        immune_units: immune,
        converted: false,
    });
    state.player_mut(me).quest.mines_placed += 1;
    events.push(Event::MinePlaced {
        mine: id,
        owner: me,
        kind,
        at,
    });
    state.push_log(LogCategory::Mine, Some(me), LogMessage::MinePlaced { kind });
    Ok(())
}

// --- sweeper ---

fn handle_scan(
    state: &mut GameState,
    unit_id: UnitId,
    at: Coord,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    // Scans never commit the unit's turn, so an already-acted Sweeper may
    // still sweep.
    let unit = gate(state, unit_id, false)?;
    if unit.archetype != Archetype::Sweeper {
        return Err(GameError::PrerequisiteNotMet);
    }
    let me = unit.owner;
    if !state.board.in_bounds(at) || unit.pos.manhattan(at) > state.rules.scan_range {
        return Err(GameError::IllegalTarget);
    }
    if state.smoke_at(at).is_some_and(|s| s.owner != me) {
        return Err(GameError::IllegalTarget);
    }
    // A capstone relay hub jams scans near it.
    let enemy = me.opponent();
    let jammed = state
        .player(enemy)
        .track(Archetype::Ranger)
        .is_variant(Branch::A, Variant::One)
        && state.buildings.iter().any(|b| {
            b.owner == enemy
                && b.kind == BuildingKind::Hub
                && b.level >= 3
                && b.pos.manhattan(at) <= state.rules.hub_discount_range
        });
    if jammed {
        return Err(GameError::IllegalTarget);
    }

    let base = if state.player(me).scans_this_round >= state.rules.scan_fatigue_after {
        state.rules.scan_cost_fatigued
    } else {
        state.rules.scan_cost
    };
    let price = cost::action_cost(state, &unit, base, ActionKind::Scan);
    charge(state, unit_id, price, false, events)?;
    state.player_mut(me).scans_this_round += 1;

    let found = state
        .mines
        .iter_mut()
        .find(|m| m.pos == at && m.owner != me)
        .map(|m| (m.id, m.reveal_to(me)));
    if let Some((mine_id, newly)) = found {
        if newly {
            events.push(Event::MineRevealed { mine: mine_id, to: me });
        }
        state.player_mut(me).quest.mines_revealed += 1;
        state.push_log(LogCategory::Mine, Some(me), LogMessage::MineRevealed { at });
    }
    Ok(())
}

fn handle_sensor_scan(
    state: &mut GameState,
    unit_id: UnitId,
    at: Coord,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    if unit.archetype != Archetype::Sweeper {
        return Err(GameError::PrerequisiteNotMet);
    }
    let me = unit.owner;
    let track = state.player(me).track(Archetype::Sweeper);
    if track.b.level < 1 {
        return Err(GameError::PrerequisiteNotMet);
    }
    if !state.board.in_bounds(at) || unit.pos.chebyshev(at) > state.rules.sensor_range {
        return Err(GameError::IllegalTarget);
    }

    let base = if track.b.level >= 3 {
        state.rules.sensor_cost_discounted
    } else {
        state.rules.sensor_cost
    };
    let price = cost::action_cost(state, &unit, base, ActionKind::SensorScan);
    charge(state, unit_id, price, true, events)?;

    let cells: Vec<Coord> = at.neighborhood3().collect();
    let reveal_all = track.is_variant(Branch::B, Variant::Two);
    let mut count = 0_u8;
    for mine in &mut state.mines {
        if mine.owner == me || !cells.contains(&mine.pos) {
            continue;
        }
        count = count.saturating_add(1);
        let reveal = reveal_all || (track.b.level >= 2 && mine.pos == at);
        if reveal && mine.reveal_to(me) {
            events.push(Event::MineRevealed {
                mine: mine.id,
                to: me,
            });
        }
    }
    state.player_mut(me).quest.sensor_scans += 1;
    events.push(Event::SensorReport {
        unit: unit_id,
        at,
        count,
    });
    state.push_log(
        LogCategory::Mine,
        Some(me),
        LogMessage::SensorReport { at, count },
    );
    Ok(())
}

fn handle_detonate(
    state: &mut GameState,
    unit_id: UnitId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    let price = buildings::plan_detonate(state, &unit)?;
    charge(state, unit_id, price, true, events)?;
    buildings::apply_detonate(state, unit_id, events);
    Ok(())
}

// --- defuser ---

fn disarm_reach(state: &GameState, player: PlayerId) -> i32 {
    if state.player(player).track(Archetype::Defuser).b.level >= 1 {
        state.rules.disarm_range_extended
    } else {
        state.rules.disarm_range
    }
}

fn handle_disarm(
    state: &mut GameState,
    unit_id: UnitId,
    at: Coord,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    if unit.archetype != Archetype::Defuser {
        return Err(GameError::PrerequisiteNotMet);
    }
    let me = unit.owner;
    if unit.pos.chebyshev(at) > disarm_reach(state, me) {
        return Err(GameError::IllegalTarget);
    }
    let mine_id = state
        .mines
        .iter()
        .find(|m| m.pos == at && m.owner != me && m.is_revealed_to(me))
        .map(|m| m.id)
        .ok_or(GameError::IllegalTarget)?;

    let price = cost::action_cost(state, &unit, state.rules.disarm_cost, ActionKind::Disarm);
    charge(state, unit_id, price, true, events)?;

    state.mines.retain(|m| m.id != mine_id);
    state.player_mut(me).quest.mines_disarmed += 1;
    events.push(Event::MineRemoved { mine: mine_id });
    state.push_log(LogCategory::Mine, Some(me), LogMessage::MineDisarmed { at });
    Ok(())
}

fn handle_dismantle(
    state: &mut GameState,
    unit_id: UnitId,
    at: Coord,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    let me = unit.owner;
    let building = state
        .building_at(at)
        .filter(|b| b.owner != me)
        .cloned()
        .ok_or(GameError::IllegalTarget)?;
    // Anyone standing on an enemy building may tear it down; the Defuser
    // also works at range.
    let reachable = unit.pos == at
        || (unit.archetype == Archetype::Defuser && unit.pos.chebyshev(at) <= disarm_reach(state, me));
    if !reachable {
        return Err(GameError::IllegalTarget);
    }

    charge(state, unit_id, state.rules.disarm_cost, true, events)?;
    state.buildings.retain(|b| b.id != building.id);
    events.push(Event::BuildingRemoved {
        building: building.id,
    });
    state.push_log(
        LogCategory::Move,
        Some(me),
        LogMessage::BuildingDismantled {
            kind: building.kind,
        },
    );
    Ok(())
}

fn handle_move_mine(
    state: &mut GameState,
    unit_id: UnitId,
    from: Coord,
    to: Coord,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    let me = unit.owner;
    if unit.archetype != Archetype::Defuser {
        return Err(GameError::PrerequisiteNotMet);
    }
    let track = state.player(me).track(Archetype::Defuser);
    if track.b.level < 2 {
        return Err(GameError::PrerequisiteNotMet);
    }
    let reach = state.rules.disarm_range;
    if unit.pos.manhattan(from) > reach || unit.pos.manhattan(to) > reach {
        return Err(GameError::IllegalTarget);
    }
    let mine = state
        .mines
        .iter()
        .find(|m| m.pos == from && m.owner != me && m.is_revealed_to(me))
        .cloned()
        .ok_or(GameError::IllegalTarget)?;

    let payloader = track.is_variant(Branch::B, Variant::Two);
    let strike_target = state
        .living_unit_at(to)
        .filter(|u| u.owner != me)
        .map(|u| (u.id, u.owner, u.pos));
    if strike_target.is_some() && !payloader {
        return Err(GameError::IllegalTarget);
    }
    if strike_target.is_none()
        && (!state.board.in_bounds(to)
            || state.board.is_obstacle(to)
            || state.building_at(to).is_some()
            || state.mine_at(to).is_some()
            || state.living_unit_at(to).is_some())
    {
        return Err(GameError::IllegalTarget);
    }

    let price = if payloader {
        state.rules.move_mine_damage_cost
    } else {
        state.rules.move_mine_cost
    };
    charge(state, unit_id, price, true, events)?;

    if let Some((target_id, target_owner, target_pos)) = strike_target {
        // Dropping the mine on a head: a muffled fraction of its punch, then
        // the mine is spent.
        state.mines.retain(|m| m.id != mine.id);
        events.push(Event::MineRemoved { mine: mine.id });
        let base = (state.rules.normal_mine_damage as f32 * 0.4).floor() as i32;
        let (amount, _) = state.apply_flag_aura(target_owner, target_pos, base);
        damage::deal_damage(state, target_id, amount, Some(me), events);
    } else {
        let m = state
            .mines
            .iter_mut()
            .find(|m| m.id == mine.id)
            .expect("shifted mine exists");
        m.pos = to;
        m.immune_units.clear();
        events.push(Event::MineShifted {
            mine: mine.id,
            from,
            to,
        });
    }
    state.push_log(LogCategory::Mine, Some(me), LogMessage::MineShifted { to });
    Ok(())
}

fn handle_convert_mine(
    state: &mut GameState,
    unit_id: UnitId,
    at: Coord,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    let me = unit.owner;
    if unit.archetype != Archetype::Defuser
        || !state
            .player(me)
            .track(Archetype::Defuser)
            .is_variant(Branch::B, Variant::One)
    {
        return Err(GameError::PrerequisiteNotMet);
    }
    if unit.pos.manhattan(at) > state.rules.disarm_range {
        return Err(GameError::IllegalTarget);
    }
    let mine_id = state
        .mines
        .iter()
        .find(|m| m.pos == at && m.owner != me && m.is_revealed_to(me))
        .map(|m| m.id)
        .ok_or(GameError::IllegalTarget)?;
    // A converted mine may overflow the cap by one.
    let live = state.mines.iter().filter(|m| m.owner == me).count() as u32;
    if live >= buildings::mine_cap(state, me) + 1 {
        return Err(GameError::LimitReached);
    }

    let price = cost::action_cost(
        state,
        &unit,
        state.rules.convert_mine_cost,
        ActionKind::ConvertMine,
    );
    charge(state, unit_id, price, true, events)?;

    let mine = state
        .mines
        .iter_mut()
        .find(|m| m.id == mine_id)
        .expect("converted mine exists");
    mine.owner = me;
    mine.revealed_to.clear();
    mine.converted = true;
    events.push(Event::MineConverted {
        mine: mine_id,
        to: me,
    });
    state.push_log(LogCategory::Mine, Some(me), LogMessage::MineConverted { at });
    Ok(())
}

// --- ranger ---

fn handle_pickup_mine(
    state: &mut GameState,
    unit_id: UnitId,
    at: Coord,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    let me = unit.owner;
    if unit.archetype != Archetype::Ranger
        || state.player(me).track(Archetype::Ranger).b.level < 1
    {
        return Err(GameError::PrerequisiteNotMet);
    }
    if unit.carried_mine.is_some() {
        return Err(GameError::LimitReached);
    }
    if unit.pos.manhattan(at) > state.rules.pickup_mine_range {
        return Err(GameError::IllegalTarget);
    }
    // Own mine first when two share the cell.
    let mine = state
        .mines
        .iter()
        .filter(|m| m.pos == at && m.is_revealed_to(me))
        .max_by_key(|m| m.owner == me)
        .cloned()
        .ok_or(GameError::IllegalTarget)?;

    lock_active(state, unit_id, events);
    state.mines.retain(|m| m.id != mine.id);
    state.unit_mut(unit_id).expect("carrier exists").carried_mine = Some(CarriedMine {
        id: mine.id,
        kind: mine.kind,
        owner: mine.owner,
        revealed_to: mine.revealed_to,
        converted: mine.converted,
    });
    // Each distinct mine feeds the courier quest once per round.
    let p = state.player_mut(me);
    if p.quest.mines_carried_this_round.insert(mine.id) {
        p.quest.mines_carried += 1;
    }
    events.push(Event::MineCarried {
        mine: mine.id,
        by: unit_id,
    });
    state.push_log(
        LogCategory::Mine,
        Some(me),
        LogMessage::MineCarried {
            archetype: unit.archetype,
        },
    );
    Ok(())
}

fn handle_drop_mine(
    state: &mut GameState,
    unit_id: UnitId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    let me = unit.owner;
    let carried = unit.carried_mine.clone().ok_or(GameError::IllegalTarget)?;
    let at = unit.pos;
    if state.mine_at(at).is_some() {
        return Err(GameError::IllegalTarget);
    }

    lock_active(state, unit_id, events);
    state.unit_mut(unit_id).expect("carrier exists").carried_mine = None;
    // Setting a mine down claims it; enemy towers overlooking the cell see
    // it happen.
    let tower_radius = state.rules.tower_radius;
    let mut revealed_to: Vec<PlayerId> = state
        .buildings
        .iter()
        .filter(|b| {
            b.kind == BuildingKind::Tower && b.owner != me && b.pos.chebyshev(at) <= tower_radius
        })
        .map(|b| b.owner)
        .collect();
    revealed_to.dedup();
    state.mines.push(Mine {
        id: carried.id,
        owner: me,
        kind: carried.kind,
        pos: at,
        revealed_to,
        immune_units: vec![unit_id],
        converted: carried.converted || carried.owner != me,
    });
    events.push(Event::MineDropped {
        mine: carried.id,
        at,
    });
    state.push_log(LogCategory::Mine, Some(me), LogMessage::MineDropped { at });
    Ok(())
}

fn handle_throw_mine(
    state: &mut GameState,
    unit_id: UnitId,
    at: Coord,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    let me = unit.owner;
    if !state
        .player(me)
        .track(Archetype::Ranger)
        .is_variant(Branch::B, Variant::Two)
    {
        return Err(GameError::PrerequisiteNotMet);
    }
    let carried = unit.carried_mine.clone().ok_or(GameError::IllegalTarget)?;
    if unit.pos.manhattan(at) > state.rules.throw_mine_range {
        return Err(GameError::IllegalTarget);
    }
    let (target_id, target_owner) = state
        .living_unit_at(at)
        .filter(|u| u.owner != me)
        .map(|u| (u.id, u.owner))
        .ok_or(GameError::IllegalTarget)?;

    let price = cost::action_cost(
        state,
        &unit,
        state.rules.throw_mine_cost,
        ActionKind::ThrowMine,
    );
    charge(state, unit_id, price, true, events)?;
    state.unit_mut(unit_id).expect("thrower exists").carried_mine = None;

    let base = (base_mine_damage(&state.rules, carried.kind) as f32 * 0.5).floor() as i32;
    let (primary, _) = state.apply_flag_aura(target_owner, at, base);
    damage::deal_damage(state, target_id, primary, Some(me), events);
    events.push(Event::MineThrown {
        mine: carried.id,
        at,
    });
    state.push_log(LogCategory::Mine, Some(me), LogMessage::MineThrown { at });

    match carried.kind {
        MineKind::Normal => {}
        MineKind::Slow => {
            if let Some(target) = state.unit_mut(target_id).filter(|u| u.is_alive()) {
                target.status.move_cost_debuff = target.status.move_cost_debuff.max(2);
                target.status.move_cost_debuff_subturns =
                    target.status.move_cost_debuff_subturns.max(2);
            }
        }
        MineKind::Smoke => mines::deploy_smoke(state, me, at, events),
        MineKind::Chain => {
            // Sympathetic detonation of the thrower's own plain mines near
            // the impact.
            let radius = state.rules.chain_radius;
            let linked: Vec<(flagfall_protocol::MineId, Coord)> = state
                .mines
                .iter()
                .filter(|m| {
                    m.owner == me && m.kind == MineKind::Normal && m.pos.chebyshev(at) <= radius
                })
                .map(|m| (m.id, m.pos))
                .collect();
            let link = (state.rules.normal_mine_damage as f32 * 0.5).floor() as i32;
            for (mine_id, pos) in linked {
                state.mines.retain(|m| m.id != mine_id);
                events.push(Event::MineRemoved { mine: mine_id });
                let victims: Vec<UnitId> = state
                    .units
                    .iter()
                    .filter(|u| u.is_alive() && u.owner != me && u.pos.manhattan(pos) <= radius)
                    .map(|u| u.id)
                    .collect();
                for victim in victims {
                    mines::mine_damage(state, victim, link, Some(me), events);
                }
            }
        }
        MineKind::Nuke => {
            let radius = state.rules.throw_mine_range;
            let doomed: Vec<flagfall_protocol::MineId> = state
                .mines
                .iter()
                .filter(|m| m.owner != me && m.pos.manhattan(at) <= radius)
                .map(|m| m.id)
                .collect();
            for id in &doomed {
                events.push(Event::MineRemoved { mine: *id });
            }
            state.mines.retain(|m| !doomed.contains(&m.id));
            let razed: Vec<flagfall_protocol::BuildingId> = state
                .buildings
                .iter()
                .filter(|b| b.owner != me && b.pos.manhattan(at) <= radius)
                .map(|b| b.id)
                .collect();
            for id in &razed {
                events.push(Event::BuildingRemoved { building: *id });
            }
            state.buildings.retain(|b| !razed.contains(&b.id));

            let victims: Vec<(UnitId, PlayerId, Coord)> = state
                .units
                .iter()
                .filter(|u| {
                    u.is_alive() && u.id != target_id && u.pos.manhattan(at) <= radius
                })
                .map(|u| (u.id, u.owner, u.pos))
                .collect();
            for (victim, victim_owner, pos) in victims {
                let blast = if victim_owner == me {
                    state.rules.nuke_blast_friendly_damage / 2
                } else {
                    state.rules.nuke_blast_damage / 2
                };
                let (amount, _) = state.apply_flag_aura(victim_owner, pos, blast);
                damage::deal_damage(state, victim, amount, Some(me), events);
            }
            state.push_log(LogCategory::Mine, Some(me), LogMessage::NukeBlast { at });
        }
    }
    Ok(())
}

fn handle_stealth(
    state: &mut GameState,
    unit_id: UnitId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    let me = unit.owner;
    let ranger = state.player(me).track(Archetype::Ranger);
    if unit.archetype != Archetype::Ranger || ranger.b.level < 2 {
        return Err(GameError::PrerequisiteNotMet);
    }
    let engaging = !unit.status.stealthed;
    // The capstone shadow never drops its cloak.
    if !engaging && ranger.is_variant(Branch::B, Variant::One) {
        return Err(GameError::PrerequisiteNotMet);
    }
    if engaging {
        charge(state, unit_id, state.rules.stealth_toggle_cost, true, events)?;
    } else {
        lock_active(state, unit_id, events);
    }
    state.unit_mut(unit_id).expect("ranger exists").status.stealthed = engaging;
    events.push(Event::StealthChanged {
        unit: unit_id,
        stealthed: engaging,
    });
    let message = if engaging {
        LogMessage::StealthEngaged {
            archetype: unit.archetype,
        }
    } else {
        LogMessage::StealthDropped {
            archetype: unit.archetype,
        }
    };
    state.push_log(LogCategory::Move, Some(me), message);
    Ok(())
}

fn handle_teleport(
    state: &mut GameState,
    unit_id: UnitId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    let me = unit.owner;
    let ranger = state.player(me).track(Archetype::Ranger);
    let allowed = if unit.archetype == Archetype::Ranger {
        ranger.a.level >= 2
    } else {
        ranger.is_variant(Branch::A, Variant::Two)
    };
    if !allowed {
        return Err(GameError::PrerequisiteNotMet);
    }
    let hub = state
        .buildings
        .iter()
        .find(|b| b.owner == me && b.kind == BuildingKind::Hub)
        .cloned()
        .ok_or(GameError::PrerequisiteNotMet)?;
    if hub.pos == unit.pos || state.living_unit_at(hub.pos).is_some() {
        return Err(GameError::IllegalTarget);
    }

    let price = cost::action_cost(state, &unit, state.rules.teleport_cost, ActionKind::Teleport);
    charge(state, unit_id, price, true, events)?;

    let from = unit.pos;
    state.unit_mut(unit_id).expect("traveller exists").pos = hub.pos;
    if unit.has_flag {
        state.player_mut(me).flag_position = hub.pos;
        events.push(Event::FlagMoved {
            player: me,
            at: hub.pos,
        });
    }
    events.push(Event::UnitTeleported {
        unit: unit_id,
        to: hub.pos,
    });
    state.push_log(
        LogCategory::Move,
        Some(me),
        LogMessage::UnitTeleported {
            archetype: unit.archetype,
            to: hub.pos,
        },
    );
    // Below the mastery level the hub burns out on use.
    if ranger.a.level < 3 {
        state.buildings.retain(|b| b.id != hub.id);
        events.push(Event::BuildingRemoved { building: hub.id });
    }
    mines::resolve_mine_entry(state, unit_id, hub.pos, from, events);
    if state.phase == Phase::Action && state.unit(unit_id).is_some_and(|u| !u.is_alive()) {
        finish_unit_turn(state, unit_id, events);
    }
    Ok(())
}

// --- buildings ---

fn handle_place_building(
    state: &mut GameState,
    unit_id: UnitId,
    kind: BuildingKind,
    at: Coord,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    if at != unit.pos {
        return Err(GameError::IllegalTarget);
    }
    let plan = buildings::plan_building(state, &unit, kind)?;
    charge(state, unit_id, plan.cost, true, events)?;
    buildings::apply_building(state, unit_id, kind, plan, events);
    Ok(())
}

// --- flag ---

fn handle_pickup_flag(
    state: &mut GameState,
    unit_id: UnitId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    let me = unit.owner;
    if !can_carry_flag(state, &unit) {
        return Err(GameError::PrerequisiteNotMet);
    }
    if unit.has_flag || unit.pos != state.player(me).flag_position {
        return Err(GameError::IllegalTarget);
    }
    if state.units.iter().any(|u| u.owner == me && u.has_flag) {
        return Err(GameError::IllegalTarget);
    }

    lock_active(state, unit_id, events);
    state.unit_mut(unit_id).expect("carrier exists").has_flag = true;
    events.push(Event::FlagPickedUp {
        player: me,
        unit: unit_id,
    });
    state.push_log(
        LogCategory::Move,
        Some(me),
        LogMessage::FlagPickedUp {
            archetype: unit.archetype,
        },
    );
    Ok(())
}

fn handle_drop_flag(
    state: &mut GameState,
    unit_id: UnitId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let unit = gate(state, unit_id, true)?;
    if !unit.has_flag {
        return Err(GameError::IllegalTarget);
    }
    let me = unit.owner;
    lock_active(state, unit_id, events);
    state.unit_mut(unit_id).expect("carrier exists").has_flag = false;
    state.player_mut(me).flag_position = unit.pos;
    events.push(Event::FlagDropped {
        player: me,
        at: unit.pos,
    });
    state.push_log(
        LogCategory::Move,
        Some(me),
        LogMessage::FlagDropped { at: unit.pos },
    );
    Ok(())
}

// --- progression ---

fn handle_evolve(
    state: &mut GameState,
    player: PlayerId,
    archetype: Archetype,
    branch: Branch,
    variant: Option<Variant>,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    // Evolution is a player-level decision: open in both thinking and action,
    // never tied to any unit's turn or the spend cap.
    if !matches!(state.phase, Phase::Thinking | Phase::Action) {
        return Err(GameError::WrongPhase);
    }
    evolution::evolve(state, player, archetype, branch, variant, events)
}

// --- turn flow ---

fn handle_end_unit_turn(
    state: &mut GameState,
    unit_id: UnitId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    let _ = gate(state, unit_id, true)?;
    finish_unit_turn(state, unit_id, events);
    Ok(())
}

/// Close out one unit's turn: the idle bonus heal, the acted flag, one
/// debuff sub-turn, and the turn handoff.
fn finish_unit_turn(state: &mut GameState, unit_id: UnitId, events: &mut Vec<Event>) {
    let (owner, archetype, passed) = {
        let unit = state.unit(unit_id).expect("finishing unit exists");
        let passed = unit.energy_used_this_turn == 0 && state.active_unit != Some(unit_id);
        (unit.owner, unit.archetype, passed)
    };
    let pass_heal = state.rules.pass_heal;
    {
        let unit = state.unit_mut(unit_id).expect("finishing unit exists");
        unit.acted_this_round = true;
        if unit.status.move_cost_debuff_subturns > 0 {
            unit.status.move_cost_debuff_subturns -= 1;
            if unit.status.move_cost_debuff_subturns == 0 {
                unit.status.move_cost_debuff = 0;
            }
        }
    }
    if passed {
        let (healed, hp) = {
            let unit = state.unit_mut(unit_id).expect("finishing unit exists");
            (unit.heal(pass_heal), unit.hp)
        };
        if healed > 0 {
            events.push(Event::UnitHealed {
                unit: unit_id,
                amount: healed,
                hp,
            });
        }
        state.push_log(
            LogCategory::Move,
            Some(owner),
            LogMessage::UnitPassed { archetype, healed },
        );
    }
    events.push(Event::UnitTurnEnded {
        unit: unit_id,
        passed,
    });
    state.active_unit = None;
    state.selected_unit = None;
    advance_turn(state, events);
}

fn has_actable_units(state: &GameState, player: PlayerId) -> bool {
    state
        .units
        .iter()
        .any(|u| u.owner == player && u.is_alive() && !u.acted_this_round)
}

fn hand_over(state: &mut GameState, player: PlayerId, events: &mut Vec<Event>) {
    state.current_player = player;
    state.timer_seconds = state.rules.action_seconds;
    state.active_unit = None;
    state.selected_unit = None;
    // The incoming side's spend caps are pinned to its balance right now.
    let energy = state.player(player).energy;
    let p = state.player_mut(player);
    p.start_of_action_energy = energy;
    p.quest.domain_touched.clear();
    for unit in state
        .units
        .iter_mut()
        .filter(|u| u.owner == player && u.is_alive() && !u.acted_this_round)
    {
        unit.start_of_action_energy = energy;
    }
    events.push(Event::TurnPassedTo { player });
}

/// Alternate to the opponent if it still has units to act; stay when it is
/// out; settle the round when both sides are.
fn advance_turn(state: &mut GameState, events: &mut Vec<Event>) {
    if state.phase != Phase::Action {
        return;
    }
    let current = state.current_player;
    let opponent = current.opponent();
    if has_actable_units(state, opponent) {
        hand_over(state, opponent, events);
    } else if has_actable_units(state, current) {
        state.timer_seconds = state.rules.action_seconds;
    } else {
        settle_round(state, events);
    }
}

fn handle_skip_turn(
    state: &mut GameState,
    player: PlayerId,
    events: &mut Vec<Event>,
) -> Result<(), GameError> {
    if state.phase != Phase::Action {
        return Err(GameError::WrongPhase);
    }
    if player != state.current_player {
        return Err(GameError::NotYourTurn);
    }
    if state.active_unit.is_some() {
        return Err(GameError::AnotherUnitActive);
    }
    // Each skip in a round costs more than the last; the spend cap does not
    // apply since no unit is spending.
    let cost = (state.skips_this_round[player.index()] as i32 + 1) * state.rules.skip_cost_step;
    let have = state.player(player).energy;
    if have < cost {
        return Err(GameError::InsufficientEnergy { need: cost, have });
    }
    state.player_mut(player).energy -= cost;
    state.skips_this_round[player.index()] += 1;
    let remaining = state.player(player).energy;
    events.push(Event::EnergySpent {
        player,
        amount: cost,
        remaining,
    });
    events.push(Event::TurnSkipped { player, cost });
    state.push_log(
        LogCategory::Info,
        Some(player),
        LogMessage::TurnSkipped { player, cost },
    );

    let opponent = player.opponent();
    if has_actable_units(state, opponent) {
        hand_over(state, opponent, events);
    } else {
        state.timer_seconds = state.rules.action_seconds;
    }
    Ok(())
}

/// Action-phase timeout: the locked unit finishes its turn; otherwise the
/// first fresh unit of the current player is passed.
fn force_pass(state: &mut GameState, events: &mut Vec<Event>) {
    let unit_id = state.active_unit.or_else(|| {
        state
            .units
            .iter()
            .find(|u| u.owner == state.current_player && u.is_alive() && !u.acted_this_round)
            .map(|u| u.id)
    });
    match unit_id {
        Some(id) => finish_unit_turn(state, id, events),
        None => advance_turn(state, events),
    }
}

// --- settlement ---

fn settle_round(state: &mut GameState, events: &mut Vec<Event>) {
    let next_round = state.round + 1;

    // Smoke clears.
    let mut cleared = Vec::new();
    for smoke in &mut state.smokes {
        smoke.duration = smoke.duration.saturating_sub(1);
        if smoke.duration == 0 {
            cleared.push(smoke.id);
        }
    }
    state.smokes.retain(|s| s.duration > 0);
    for id in cleared {
        events.push(Event::SmokeExpired { smoke: id });
    }

    // Timed buildings crumble.
    let mut crumbled = Vec::new();
    for building in &mut state.buildings {
        if let Some(d) = building.duration.as_mut() {
            *d = d.saturating_sub(1);
            if *d == 0 {
                crumbled.push((building.id, building.owner, building.kind));
            }
        }
    }
    state.buildings.retain(|b| b.duration != Some(0));
    for (id, owner, kind) in crumbled {
        events.push(Event::BuildingRemoved { building: id });
        state.push_log(
            LogCategory::Move,
            Some(owner),
            LogMessage::BuildingExpired { kind },
        );
    }

    // Units standing on ore harvest it at next round's rate.
    let mut ore_income = [0_i32; 2];
    let harvesters: Vec<(UnitId, Coord)> = state
        .units
        .iter()
        .filter(|u| u.is_alive())
        .filter(|u| state.board.cell(u.pos).is_some_and(|c| c.ore.is_some()))
        .map(|u| (u.id, u.pos))
        .collect();
    for (unit_id, at) in harvesters {
        let size = state
            .board
            .cell(at)
            .and_then(|c| c.ore)
            .expect("harvested cell has ore");
        let amount = state.rules.ore_reward(size, next_round);
        state.board.cell_mut(at).expect("in-bounds").ore = None;
        let (owner, archetype) = {
            let unit = state.unit(unit_id).expect("harvester exists");
            (unit.owner, unit.archetype)
        };
        ore_income[owner.index()] += amount;
        state.push_log(
            LogCategory::Info,
            Some(owner),
            LogMessage::OreHarvested { archetype, amount },
        );
    }

    // Quest rollover and per-round counters.
    for player in [PlayerId::ONE, PlayerId::TWO] {
        let p = state.player_mut(player);
        p.quest.roll_round();
        p.scans_this_round = 0;
        p.flag_moves_general = 0;
        p.flag_moves_other = 0;
    }
    state.skips_this_round = [0, 0];

    // Income.
    for player in [PlayerId::ONE, PlayerId::TWO] {
        let (energy, kills) = {
            let p = state.player(player);
            (p.energy, p.banked_kill_reward)
        };
        let income = economy::round_income(
            &state.rules,
            next_round,
            energy,
            ore_income[player.index()],
            kills,
        );
        let total = income.total();
        let p = state.player_mut(player);
        p.energy += total;
        p.banked_kill_reward = 0;
        p.start_of_action_energy = p.energy;
        events.push(Event::IncomeApplied {
            player,
            regen: income.regen,
            interest: income.interest,
            ore: income.ore,
            kills: income.kills,
            total,
        });
        state.push_log(
            LogCategory::Info,
            Some(player),
            LogMessage::Income { player, total },
        );
    }

    // Fresh turn flags and spend baselines.
    for player in [PlayerId::ONE, PlayerId::TWO] {
        let energy = state.player(player).energy;
        for unit in state.units.iter_mut().filter(|u| u.owner == player) {
            unit.acted_this_round = false;
            unit.energy_used_this_turn = 0;
            unit.start_of_action_energy = energy;
        }
    }

    // A capstone General's domain grinds down anything camped inside it.
    for player in [PlayerId::ONE, PlayerId::TWO] {
        let enemy = player.opponent();
        if !state
            .player(enemy)
            .track(Archetype::General)
            .is_variant(Branch::B, Variant::Two)
        {
            continue;
        }
        let heart = state.player(enemy).flag_position;
        let radius = state.rules.domain_radius;
        let victims: Vec<(UnitId, Coord, Archetype)> = state
            .units
            .iter()
            .filter(|u| u.owner == player && u.is_alive() && u.pos.chebyshev(heart) <= radius)
            .map(|u| (u.id, u.pos, u.archetype))
            .collect();
        for (unit_id, pos, archetype) in victims {
            let (amount, _) = state.apply_flag_aura(player, pos, state.rules.domain_damage);
            damage::deal_damage(state, unit_id, amount, Some(enemy), events);
            state.push_log(
                LogCategory::Combat,
                Some(player),
                LogMessage::DomainDamage {
                    archetype,
                    damage: amount,
                },
            );
        }
    }
    // Domain damage can fell a General.
    if state.phase == Phase::GameOver {
        return;
    }

    // The banner General mends units holding the home side of the flag column.
    for player in [PlayerId::ONE, PlayerId::TWO] {
        if state.player(player).track(Archetype::General).b.level < 1 {
            continue;
        }
        let flag_col = state.player(player).flag_position.c;
        let amount = state.rules.heal_aura_amount;
        let targets: Vec<UnitId> = state
            .units
            .iter()
            .filter(|u| u.owner == player && u.is_alive())
            .filter(|u| {
                if player == PlayerId::ONE {
                    u.pos.c <= flag_col
                } else {
                    u.pos.c >= flag_col
                }
            })
            .map(|u| u.id)
            .collect();
        for unit_id in targets {
            let (healed, hp) = {
                let unit = state.unit_mut(unit_id).expect("healed unit exists");
                (unit.heal(amount), unit.hp)
            };
            if healed > 0 {
                events.push(Event::UnitHealed {
                    unit: unit_id,
                    amount: healed,
                    hp,
                });
            }
        }
    }

    // Respawns.
    let due: Vec<UnitId> = state
        .units
        .iter()
        .filter(|u| u.dead && u.respawn_timer > 0)
        .map(|u| u.id)
        .collect();
    for unit_id in due {
        let remaining = {
            let unit = state.unit_mut(unit_id).expect("dead unit exists");
            unit.respawn_timer -= 1;
            unit.respawn_timer
        };
        if remaining > 0 {
            continue;
        }
        let (side, home) = {
            let unit = state.unit(unit_id).expect("dead unit exists");
            (unit.owner, unit.home_slot)
        };
        match find_respawn_spot(state, side, home) {
            Some(at) => {
                let (owner, archetype) = {
                    let unit = state.unit_mut(unit_id).expect("dead unit exists");
                    unit.revive_at(at);
                    (unit.owner, unit.archetype)
                };
                events.push(Event::UnitRespawned { unit: unit_id, at });
                state.push_log(
                    LogCategory::Combat,
                    Some(owner),
                    LogMessage::UnitRespawned { archetype, at },
                );
            }
            // Home ground is packed; try again next round.
            None => state.unit_mut(unit_id).expect("dead unit exists").respawn_timer = 1,
        }
    }

    // Ore regrows in the contested band; faster in the late game.
    let late = state
        .rules
        .income_steps
        .last()
        .is_some_and(|step| next_round >= step.round);
    let spawns = if late {
        state.rules.ore_spawns_late
    } else {
        state.rules.ore_spawns_per_round
    };
    for _ in 0..spawns {
        let eligible: Vec<Coord> = state
            .board
            .iter_coords()
            .filter(|&at| at.c >= state.rules.ore_min_col && at.c <= state.rules.ore_max_col)
            .filter(|&at| {
                let cell = state.board.cell(at).expect("iterated in-bounds");
                !cell.obstacle && cell.flag_base.is_none() && cell.ore.is_none()
            })
            .filter(|&at| state.living_unit_at(at).is_none() && state.building_at(at).is_none())
            .collect();
        if eligible.is_empty() {
            break;
        }
        let at = eligible[state.rng.pick_index(eligible.len())];
        let size = board::roll_ore_size(&mut state.rng);
        state.board.cell_mut(at).expect("in-bounds").ore = Some(size);
    }

    // Into the next round.
    state.round = next_round;
    state.phase = Phase::Thinking;
    state.current_player = PlayerId::ONE;
    state.timer_seconds = state.rules.thinking_seconds;
    state.active_unit = None;
    state.selected_unit = None;
    events.push(Event::RoundSettled { round: next_round });
    events.push(Event::PhaseChanged {
        phase: Phase::Thinking,
        round: next_round,
    });
    state.push_log(
        LogCategory::Info,
        None,
        LogMessage::RoundSettled { round: next_round },
    );
}

/// Respawn placement: the home slot if free, else a random free cell of its
/// 3x3 neighborhood, else a random free slot among the side's starting
/// positions.
fn find_respawn_spot(state: &mut GameState, owner: PlayerId, home: Coord) -> Option<Coord> {
    if state.is_free_for_unit(home) {
        return Some(home);
    }
    let free: Vec<Coord> = home
        .neighborhood3()
        .filter(|&at| at != home && state.is_free_for_unit(at))
        .collect();
    if !free.is_empty() {
        return Some(free[state.rng.pick_index(free.len())]);
    }
    let slots: Vec<Coord> = state
        .units
        .iter()
        .filter(|u| u.owner == owner)
        .map(|u| u.home_slot)
        .filter(|&at| state.is_free_for_unit(at))
        .collect();
    if slots.is_empty() {
        return None;
    }
    Some(slots[state.rng.pick_index(slots.len())])
}

/// Walking your flag onto the enemy base wins on the spot.
fn check_flag_victory(state: &mut GameState, events: &mut Vec<Event>) {
    if state.phase == Phase::GameOver {
        return;
    }
    for player in [PlayerId::ONE, PlayerId::TWO] {
        if state.player(player).flag_position == state.player(player.opponent()).flag_base {
            state.winner = Some(player);
            state.phase = Phase::GameOver;
            events.push(Event::GameEnded {
                winner: Some(player),
            });
            state.push_log(
                LogCategory::Info,
                None,
                LogMessage::GameEnded {
                    winner: Some(player),
                },
            );
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use flagfall_protocol::MineId;

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

    /// A game fast-forwarded into the first action phase.
    fn action_engine(seed: u64) -> GameEngine {
        let mut engine = GameEngine::new(Rules::standard(), seed);
        engine
            .apply(Command::ConfirmPlacement {
                player: PlayerId::ONE,
            })
            .unwrap();
        engine
            .apply(Command::ConfirmPlacement {
                player: PlayerId::TWO,
            })
            .unwrap();
        engine
            .apply(Command::Ready {
                player: PlayerId::ONE,
            })
            .unwrap();
        engine
    }

    fn clear_obstacles(engine: &mut GameEngine) {
        let rows = engine.state.board.rows();
        let cols = engine.state.board.cols();
        for r in 0..rows {
            for c in 0..cols {
                engine
                    .state
                    .board
                    .cell_mut(Coord::new(r, c))
                    .unwrap()
                    .obstacle = false;
            }
        }
    }

    fn park(engine: &mut GameEngine, unit: UnitId, at: Coord) {
        engine.state.unit_mut(unit).unwrap().pos = at;
    }

    #[test]
    fn placement_flows_into_the_first_round() {
        let mut engine = GameEngine::new(Rules::standard(), 7);
        assert_eq!(engine.state().phase, Phase::Placement);
        engine
            .apply(Command::ConfirmPlacement {
                player: PlayerId::ONE,
            })
            .unwrap();
        assert_eq!(engine.state().phase, Phase::Placement);
        engine
            .apply(Command::ConfirmPlacement {
                player: PlayerId::TWO,
            })
            .unwrap();
        assert_eq!(engine.state().phase, Phase::Thinking);
        engine
            .apply(Command::Ready {
                player: PlayerId::TWO,
            })
            .unwrap();
        assert_eq!(engine.state().phase, Phase::Action);
        assert_eq!(engine.state().current_player, PlayerId::ONE);
    }

    #[test]
    fn setup_mines_stop_at_the_limit_and_stay_home() {
        let mut engine = GameEngine::new(Rules::standard(), 7);
        // enemy half is off limits
        assert_eq!(
            engine.apply(Command::PlaceSetupMine {
                player: PlayerId::ONE,
                at: Coord::new(1, 15),
                kind: MineKind::Normal,
            }),
            Err(GameError::IllegalTarget)
        );
        // evolved kinds are locked during setup
        assert_eq!(
            engine.apply(Command::PlaceSetupMine {
                player: PlayerId::ONE,
                at: Coord::new(1, 5),
                kind: MineKind::Slow,
            }),
            Err(GameError::PrerequisiteNotMet)
        );
        for c in 5..8 {
            engine
                .apply(Command::PlaceSetupMine {
                    player: PlayerId::ONE,
                    at: Coord::new(1, c),
                    kind: MineKind::Normal,
                })
                .unwrap();
        }
        assert_eq!(
            engine.apply(Command::PlaceSetupMine {
                player: PlayerId::ONE,
                at: Coord::new(2, 5),
                kind: MineKind::Normal,
            }),
            Err(GameError::LimitReached)
        );
        assert_eq!(engine.state().mines.len(), 3);
    }

    #[test]
    fn swap_exchanges_two_of_your_units() {
        let mut engine = GameEngine::new(Rules::standard(), 7);
        let a = find_unit(engine.state(), PlayerId::ONE, Archetype::General);
        let b = find_unit(engine.state(), PlayerId::ONE, Archetype::Maker);
        let (pos_a, pos_b) = (
            engine.state().unit(a).unwrap().pos,
            engine.state().unit(b).unwrap().pos,
        );
        engine
            .apply(Command::SwapUnits {
                player: PlayerId::ONE,
                a,
                b,
            })
            .unwrap();
        assert_eq!(engine.state().unit(a).unwrap().pos, pos_b);
        assert_eq!(engine.state().unit(b).unwrap().pos, pos_a);

        let enemy = find_unit(engine.state(), PlayerId::TWO, Archetype::General);
        assert_eq!(
            engine.apply(Command::SwapUnits {
                player: PlayerId::ONE,
                a,
                b: enemy,
            }),
            Err(GameError::NotYourTurn)
        );
    }

    #[test]
    fn a_move_charges_locks_and_logs() {
        let mut engine = action_engine(7);
        clear_obstacles(&mut engine);
        let general = find_unit(engine.state(), PlayerId::ONE, Archetype::General);
        park(&mut engine, general, Coord::new(1, 5));
        let events = engine
            .apply(Command::Move {
                unit: general,
                to: Coord::new(1, 6),
            })
            .unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::ActiveUnitLocked { .. })));
        assert_eq!(engine.state().unit(general).unwrap().pos, Coord::new(1, 6));
        assert_eq!(engine.state().player(PlayerId::ONE).energy, 47);
        assert_eq!(engine.state().active_unit, Some(general));

        // another unit cannot act while the general holds the lock
        let maker = find_unit(engine.state(), PlayerId::ONE, Archetype::Maker);
        park(&mut engine, maker, Coord::new(3, 5));
        assert_eq!(
            engine.apply(Command::Move {
                unit: maker,
                to: Coord::new(3, 6),
            }),
            Err(GameError::AnotherUnitActive)
        );
    }

    #[test]
    fn rejections_leave_state_untouched_but_logged() {
        let mut engine = action_engine(7);
        let general = find_unit(engine.state(), PlayerId::ONE, Archetype::General);
        let before = engine.state().player(PlayerId::ONE).energy;
        let logs_before = engine.state().log.len();
        let err = engine
            .apply(Command::Move {
                unit: general,
                to: Coord::new(0, 20),
            })
            .unwrap_err();
        assert_eq!(err, GameError::IllegalTarget);
        assert_eq!(engine.state().player(PlayerId::ONE).energy, before);
        assert_eq!(engine.state().log.len(), logs_before + 1);
        assert!(matches!(
            engine.state().log.last().unwrap().message,
            LogMessage::Rejected { .. }
        ));
    }

    #[test]
    fn spend_cap_blocks_a_third_move() {
        let mut engine = action_engine(7);
        clear_obstacles(&mut engine);
        let general = find_unit(engine.state(), PlayerId::ONE, Archetype::General);
        park(&mut engine, general, Coord::new(1, 5));
        // cap is floor(50 * 0.3333) = 16; moves cost 3, attack would fit,
        // but a 15-spend followed by 3 more does not
        for step in 0..5 {
            engine
                .apply(Command::Move {
                    unit: general,
                    to: Coord::new(1, 6 + step),
                })
                .unwrap();
        }
        let err = engine
            .apply(Command::Move {
                unit: general,
                to: Coord::new(1, 11),
            })
            .unwrap_err();
        assert_eq!(
            err,
            GameError::CapExceeded {
                cap: 16,
                spent: 15,
                cost: 3
            }
        );
    }

    #[test]
    fn ending_an_idle_turn_heals_and_passes() {
        let mut engine = action_engine(7);
        let general = find_unit(engine.state(), PlayerId::ONE, Archetype::General);
        engine.state.unit_mut(general).unwrap().hp = 20;
        let events = engine
            .apply(Command::EndUnitTurn { unit: general })
            .unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::UnitTurnEnded { passed: true, .. }
        )));
        assert_eq!(engine.state().unit(general).unwrap().hp, 23);
        assert_eq!(engine.state().current_player, PlayerId::TWO);
    }

    #[test]
    fn a_full_round_settles_into_the_next_thinking_phase() {
        let mut engine = action_engine(7);
        for _ in 0..10 {
            let state = engine.state();
            let unit = state
                .units
                .iter()
                .find(|u| {
                    u.owner == state.current_player && u.is_alive() && !u.acted_this_round
                })
                .map(|u| u.id)
                .unwrap();
            engine.apply(Command::EndUnitTurn { unit }).unwrap();
        }
        let state = engine.state();
        assert_eq!(state.round, 2);
        assert_eq!(state.phase, Phase::Thinking);
        assert_eq!(state.current_player, PlayerId::ONE);
        // round-2 income: 35 regen + interest on the held 50
        assert_eq!(state.player(PlayerId::ONE).energy, 50 + 35 + 5);
        assert!(state.units.iter().all(|u| !u.acted_this_round));
    }

    #[test]
    fn skip_turn_escalates_in_price() {
        let mut engine = action_engine(7);
        engine
            .apply(Command::SkipTurn {
                player: PlayerId::ONE,
            })
            .unwrap();
        assert_eq!(engine.state().player(PlayerId::ONE).energy, 40);
        assert_eq!(engine.state().current_player, PlayerId::TWO);
        engine
            .apply(Command::SkipTurn {
                player: PlayerId::TWO,
            })
            .unwrap();
        // second skip by the same player in one round costs 20
        engine
            .apply(Command::SkipTurn {
                player: PlayerId::ONE,
            })
            .unwrap();
        assert_eq!(engine.state().player(PlayerId::ONE).energy, 20);
    }

    #[test]
    fn carrying_the_flag_home_wins() {
        let mut engine = action_engine(7);
        clear_obstacles(&mut engine);
        let general = find_unit(engine.state(), PlayerId::ONE, Archetype::General);
        let enemy_base = engine.state().player(PlayerId::TWO).flag_base;
        let start = enemy_base.offset(-1, 0);
        park(&mut engine, general, start);
        engine.state.player_mut(PlayerId::ONE).flag_position = start;
        engine.state.unit_mut(general).unwrap().has_flag = true;
        // clear the base of defenders
        for unit in engine.state.units.iter_mut() {
            if unit.owner == PlayerId::TWO && unit.pos == enemy_base {
                unit.pos = Coord::new(0, 22);
            }
        }
        let events = engine
            .apply(Command::Move {
                unit: general,
                to: enemy_base,
            })
            .unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::GameEnded {
                winner: Some(PlayerId::ONE)
            }
        )));
        assert_eq!(engine.state().winner, Some(PlayerId::ONE));
        assert_eq!(engine.state().phase, Phase::GameOver);
        assert_eq!(
            engine.apply(Command::EndUnitTurn { unit: general }),
            Err(GameError::GameOver)
        );
    }

    #[test]
    fn flag_moves_run_out_after_five() {
        let mut engine = action_engine(7);
        clear_obstacles(&mut engine);
        let general = find_unit(engine.state(), PlayerId::ONE, Archetype::General);
        park(&mut engine, general, Coord::new(1, 2));
        engine.state.player_mut(PlayerId::ONE).flag_position = Coord::new(1, 2);
        engine.state.unit_mut(general).unwrap().has_flag = true;
        engine.state.player_mut(PlayerId::ONE).energy = 500;
        // keep the cap out of the way
        engine.state.unit_mut(general).unwrap().start_of_action_energy = 500;
        for step in 0..5 {
            engine
                .apply(Command::Move {
                    unit: general,
                    to: Coord::new(1, 3 + step),
                })
                .unwrap();
        }
        assert_eq!(
            engine.apply(Command::Move {
                unit: general,
                to: Coord::new(1, 8),
            }),
            Err(GameError::LimitReached)
        );
        assert_eq!(engine.state().player(PlayerId::ONE).quest.flag_steps, 5);
    }

    #[test]
    fn scan_reveals_without_committing_the_turn() {
        let mut engine = action_engine(7);
        let sweeper = find_unit(engine.state(), PlayerId::ONE, Archetype::Sweeper);
        park(&mut engine, sweeper, Coord::new(1, 5));
        let target = Coord::new(1, 7);
        let mine_id = engine.state.alloc_mine_id();
        engine.state.mines.push(Mine {
            id: mine_id,
            owner: PlayerId::TWO,
            kind: MineKind::Normal,
            pos: target,
            revealed_to: Vec::new(),
            immune_units: Vec::new(),
            converted: false,
        });
        let events = engine
            .apply(Command::Scan {
                unit: sweeper,
                at: target,
            })
            .unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::MineRevealed { .. })));
        assert!(engine
            .state()
            .mine(mine_id)
            .unwrap()
            .is_revealed_to(PlayerId::ONE));
        assert_eq!(engine.state().player(PlayerId::ONE).quest.mines_revealed, 1);
        assert_eq!(engine.state().active_unit, None);
        assert!(!engine.state().unit(sweeper).unwrap().acted_this_round);

        // the third scan in a round costs more
        engine
            .apply(Command::Scan {
                unit: sweeper,
                at: Coord::new(1, 6),
            })
            .unwrap();
        let before = engine.state().player(PlayerId::ONE).energy;
        engine
            .apply(Command::Scan {
                unit: sweeper,
                at: Coord::new(2, 6),
            })
            .unwrap();
        assert_eq!(engine.state().player(PlayerId::ONE).energy, before - 4);
    }

    #[test]
    fn maker_mines_are_capped_and_gated() {
        let mut engine = action_engine(7);
        clear_obstacles(&mut engine);
        let maker = find_unit(engine.state(), PlayerId::ONE, Archetype::Maker);
        park(&mut engine, maker, Coord::new(1, 5));
        // nuke needs the capstone
        assert_eq!(
            engine.apply(Command::PlaceMine {
                unit: maker,
                at: Coord::new(1, 6),
                kind: MineKind::Nuke,
            }),
            Err(GameError::PrerequisiteNotMet)
        );
        engine
            .apply(Command::PlaceMine {
                unit: maker,
                at: Coord::new(1, 6),
                kind: MineKind::Normal,
            })
            .unwrap();
        assert_eq!(engine.state().player(PlayerId::ONE).energy, 45);
        assert_eq!(engine.state().player(PlayerId::ONE).quest.mines_placed, 1);
        // stacking on your own mine is out
        assert_eq!(
            engine.apply(Command::PlaceMine {
                unit: maker,
                at: Coord::new(1, 6),
                kind: MineKind::Normal,
            }),
            Err(GameError::IllegalTarget)
        );
    }

    #[test]
    fn disarm_needs_a_revealed_enemy_mine() {
        let mut engine = action_engine(7);
        let defuser = find_unit(engine.state(), PlayerId::ONE, Archetype::Defuser);
        park(&mut engine, defuser, Coord::new(1, 5));
        let at = Coord::new(1, 6);
        let mine_id = engine.state.alloc_mine_id();
        engine.state.mines.push(Mine {
            id: mine_id,
            owner: PlayerId::TWO,
            kind: MineKind::Normal,
            pos: at,
            revealed_to: Vec::new(),
            immune_units: Vec::new(),
            converted: false,
        });
        assert_eq!(
            engine.apply(Command::Disarm { unit: defuser, at }),
            Err(GameError::IllegalTarget)
        );
        engine
            .state
            .mines
            .iter_mut()
            .find(|m| m.id == mine_id)
            .unwrap()
            .revealed_to
            .push(PlayerId::ONE);
        engine.apply(Command::Disarm { unit: defuser, at }).unwrap();
        assert!(engine.state().mines.is_empty());
        assert_eq!(engine.state().player(PlayerId::ONE).quest.mines_disarmed, 1);
    }

    #[test]
    fn courier_pickup_and_drop_keep_the_mine_identity() {
        let mut engine = action_engine(7);
        let ranger = find_unit(engine.state(), PlayerId::ONE, Archetype::Ranger);
        engine
            .state
            .player_mut(PlayerId::ONE)
            .track_mut(Archetype::Ranger)
            .b = EvolutionBranch {
            level: 1,
            variant: None,
        };
        park(&mut engine, ranger, Coord::new(1, 5));
        let at = Coord::new(1, 6);
        let mine_id = engine.state.alloc_mine_id();
        engine.state.mines.push(Mine {
            id: mine_id,
            owner: PlayerId::ONE,
            kind: MineKind::Normal,
            pos: at,
            revealed_to: Vec::new(),
            immune_units: Vec::new(),
            converted: false,
        });
        engine
            .apply(Command::PickupMine { unit: ranger, at })
            .unwrap();
        assert!(engine.state().mines.is_empty());
        assert_eq!(
            engine
                .state()
                .unit(ranger)
                .unwrap()
                .carried_mine
                .as_ref()
                .map(|m| m.id),
            Some(mine_id)
        );
        assert_eq!(engine.state().player(PlayerId::ONE).quest.mines_carried, 1);

        engine.apply(Command::DropMine { unit: ranger }).unwrap();
        assert_eq!(engine.state().mines.len(), 1);
        assert_eq!(engine.state().mines[0].id, mine_id);
        assert_eq!(engine.state().mines[0].pos, Coord::new(1, 5));
        // a re-carry in the same round does not double-count the quest
        engine
            .apply(Command::PickupMine {
                unit: ranger,
                at: Coord::new(1, 5),
            })
            .unwrap();
        assert_eq!(engine.state().player(PlayerId::ONE).quest.mines_carried, 1);
    }

    #[test]
    fn teleport_burns_the_hub_below_mastery() {
        let mut engine = action_engine(7);
        clear_obstacles(&mut engine);
        let ranger = find_unit(engine.state(), PlayerId::ONE, Archetype::Ranger);
        engine
            .state
            .player_mut(PlayerId::ONE)
            .track_mut(Archetype::Ranger)
            .a = EvolutionBranch {
            level: 2,
            variant: None,
        };
        park(&mut engine, ranger, Coord::new(1, 5));
        let hub_at = Coord::new(5, 2);
        let hub_id = engine.state.alloc_building_id();
        engine.state.buildings.push(crate::state::Building {
            id: hub_id,
            owner: PlayerId::ONE,
            kind: BuildingKind::Hub,
            pos: hub_at,
            level: 2,
            duration: None,
        });
        engine.apply(Command::Teleport { unit: ranger }).unwrap();
        assert_eq!(engine.state().unit(ranger).unwrap().pos, hub_at);
        assert!(engine.state().buildings.is_empty());
        // teleport is exempt from the territory surcharge
        assert_eq!(engine.state().player(PlayerId::ONE).energy, 45);
    }

    #[test]
    fn evolve_is_open_during_thinking() {
        let mut engine = GameEngine::new(Rules::standard(), 7);
        engine
            .apply(Command::ConfirmPlacement {
                player: PlayerId::ONE,
            })
            .unwrap();
        engine
            .apply(Command::ConfirmPlacement {
                player: PlayerId::TWO,
            })
            .unwrap();
        assert_eq!(engine.state().phase, Phase::Thinking);
        engine.state.player_mut(PlayerId::ONE).quest.damage_dealt = 4;
        engine
            .apply(Command::Evolve {
                player: PlayerId::ONE,
                archetype: Archetype::General,
                branch: Branch::A,
                variant: None,
            })
            .unwrap();
        assert_eq!(
            engine
                .state()
                .player(PlayerId::ONE)
                .track(Archetype::General)
                .a
                .level,
            1
        );
    }

    #[test]
    fn action_timeout_force_passes_a_unit() {
        let mut engine = action_engine(7);
        let seconds = engine.state().timer_seconds;
        let mut passed = false;
        for _ in 0..=seconds {
            let events = engine.tick();
            if events
                .iter()
                .any(|e| matches!(e, Event::UnitTurnEnded { .. }))
            {
                passed = true;
                break;
            }
        }
        assert!(passed);
        assert_eq!(engine.state().current_player, PlayerId::TWO);
        assert_eq!(engine.state().timer_seconds, engine.state().rules.action_seconds);
    }

    #[test]
    fn paused_clocks_do_not_run() {
        let mut engine = GameEngine::new(Rules::standard(), 7);
        engine.pause();
        let before = engine.state().timer_seconds;
        engine.tick();
        assert_eq!(engine.state().timer_seconds, before);
        engine.resume();
        engine.tick();
        assert_eq!(engine.state().timer_seconds, before - 1);
    }

    #[test]
    fn replay_reproduces_the_same_snapshot() {
        let mut engine = action_engine(123);
        let general = find_unit(engine.state(), PlayerId::ONE, Archetype::General);
        let _ = engine.apply(Command::EndUnitTurn { unit: general });
        let enemy = find_unit(engine.state(), PlayerId::TWO, Archetype::Ranger);
        let _ = engine.apply(Command::EndUnitTurn { unit: enemy });

        let replay = engine.replay();
        let restored = GameEngine::from_replay(Rules::standard(), &replay);
        let a = flagfall_protocol::snapshot_hash(&engine.snapshot()).unwrap();
        let b = flagfall_protocol::snapshot_hash(&restored.snapshot()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn legal_actions_follow_the_branches() {
        let mut engine = action_engine(7);
        let sweeper = find_unit(engine.state(), PlayerId::ONE, Archetype::Sweeper);
        let menu = engine.legal_actions(sweeper).unwrap();
        let kinds: Vec<ActionKind> = menu.actions.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&ActionKind::Move));
        assert!(kinds.contains(&ActionKind::Scan));
        assert!(!kinds.contains(&ActionKind::SensorScan));
        assert!(kinds.contains(&ActionKind::EndTurn));

        engine
            .state
            .player_mut(PlayerId::ONE)
            .track_mut(Archetype::Sweeper)
            .b
            .level = 1;
        let menu = engine.legal_actions(sweeper).unwrap();
        assert!(menu
            .actions
            .iter()
            .any(|a| a.kind == ActionKind::SensorScan && a.cost == 5));
    }

    #[test]
    fn dead_mine_carrier_leaves_the_mine_behind() {
        let mut engine = action_engine(7);
        let ranger = find_unit(engine.state(), PlayerId::ONE, Archetype::Ranger);
        let at = Coord::new(2, 6);
        park(&mut engine, ranger, at);
        engine.state.unit_mut(ranger).unwrap().carried_mine = Some(CarriedMine {
            id: MineId(9),
            kind: MineKind::Slow,
            owner: PlayerId::TWO,
            revealed_to: vec![PlayerId::ONE],
            converted: false,
        });
        let mut events = Vec::new();
        damage::deal_damage(&mut engine.state, ranger, 100, None, &mut events);
        assert_eq!(engine.state().mines.len(), 1);
        let dropped = &engine.state().mines[0];
        assert_eq!(dropped.id, MineId(9));
        assert_eq!(dropped.owner, PlayerId::TWO);
        assert_eq!(dropped.pos, at);
    }

    #[test]
    fn stealth_needs_the_shadow_branch() {
        let mut engine = action_engine(7);
        let ranger = find_unit(engine.state(), PlayerId::ONE, Archetype::Ranger);
        assert_eq!(
            engine
                .apply(Command::ToggleStealth { unit: ranger })
                .unwrap_err(),
            GameError::PrerequisiteNotMet
        );

        engine
            .state
            .player_mut(PlayerId::ONE)
            .track_mut(Archetype::Ranger)
            .b
            .level = 2;
        engine
            .apply(Command::ToggleStealth { unit: ranger })
            .unwrap();
        assert!(engine.state().unit(ranger).unwrap().status.stealthed);
        assert_eq!(engine.state().player(PlayerId::ONE).energy, 47);

        // Dropping the cloak is free.
        engine
            .apply(Command::ToggleStealth { unit: ranger })
            .unwrap();
        assert!(!engine.state().unit(ranger).unwrap().status.stealthed);
        assert_eq!(engine.state().player(PlayerId::ONE).energy, 47);
    }

    #[test]
    fn the_permanent_cloak_re_engages_and_never_drops() {
        let mut engine = action_engine(7);
        clear_obstacles(&mut engine);
        let ranger = find_unit(engine.state(), PlayerId::ONE, Archetype::Ranger);
        {
            let track = engine
                .state
                .player_mut(PlayerId::ONE)
                .track_mut(Archetype::Ranger);
            track.b.level = 3;
            track.b.variant = Some(Variant::One);
        }
        park(&mut engine, ranger, Coord::new(3, 5));
        engine
            .apply(Command::Move {
                unit: ranger,
                to: Coord::new(3, 6),
            })
            .unwrap();
        assert!(engine.state().unit(ranger).unwrap().status.stealthed);
        assert_eq!(
            engine
                .apply(Command::ToggleStealth { unit: ranger })
                .unwrap_err(),
            GameError::PrerequisiteNotMet
        );
    }
}
