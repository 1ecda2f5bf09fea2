use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use flagfall_protocol::{
    Archetype, Branch, BuildingId, BuildingKind, BuildingSnapshot, Coord, LogCategory, LogEntry,
    LogMessage, MineId, MineKind, MineSnapshot, Phase, PlayerId, PlayerSnapshot, SmokeId,
    SmokeSnapshot, Snapshot, UnitId, Variant,
};

use crate::{
    board::{generate_board, Board},
    rules::Rules,
    unit::Unit,
    GameRng,
};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EvolutionBranch {
    pub level: u8,
    pub variant: Option<Variant>,
}

/// Both branches for one archetype.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EvolutionTrack {
    pub a: EvolutionBranch,
    pub b: EvolutionBranch,
}

impl EvolutionTrack {
    #[inline]
    pub fn branch(&self, branch: Branch) -> EvolutionBranch {
        match branch {
            Branch::A => self.a,
            Branch::B => self.b,
        }
    }

    #[inline]
    pub fn branch_mut(&mut self, branch: Branch) -> &mut EvolutionBranch {
        match branch {
            Branch::A => &mut self.a,
            Branch::B => &mut self.b,
        }
    }

    /// True when the branch has reached level 3 with the given fork taken.
    pub fn is_variant(&self, branch: Branch, variant: Variant) -> bool {
        let b = self.branch(branch);
        b.level >= 3 && b.variant == Some(variant)
    }
}

/// Monotonic quest counters gating evolution, plus the per-round bookkeeping
/// sets. The sets are explicit collections cloned structurally; nothing here
/// survives a clone by serialization round-trip tricks.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuestStats {
    // General
    pub damage_dealt: u32,
    pub flag_steps: u32,
    // Sweeper
    pub mines_revealed: u32,
    pub sensor_scans: u32,
    // Ranger
    pub steps_taken: u32,
    pub mines_carried: u32,
    // Maker
    pub own_mines_triggered: u32,
    pub mines_placed: u32,
    // Defuser
    pub mines_disarmed: u32,
    pub mine_damage_soaked: u32,

    pub consecutive_safe_rounds: u32,
    pub triggered_mine_this_round: bool,
    /// Units already charged the domain entry toll this turn.
    pub domain_touched: BTreeSet<UnitId>,
    /// Mines already credited toward the carry quest this round.
    pub mines_carried_this_round: BTreeSet<MineId>,
}

impl QuestStats {
    pub fn counter(&self, archetype: Archetype, branch: Branch) -> u32 {
        match (archetype, branch) {
            (Archetype::General, Branch::A) => self.damage_dealt,
            (Archetype::General, Branch::B) => self.flag_steps,
            (Archetype::Sweeper, Branch::A) => self.mines_revealed,
            (Archetype::Sweeper, Branch::B) => self.sensor_scans,
            (Archetype::Ranger, Branch::A) => self.steps_taken,
            (Archetype::Ranger, Branch::B) => self.mines_carried,
            (Archetype::Maker, Branch::A) => self.own_mines_triggered,
            (Archetype::Maker, Branch::B) => self.mines_placed,
            (Archetype::Defuser, Branch::A) => self.mines_disarmed,
            (Archetype::Defuser, Branch::B) => self.mine_damage_soaked,
        }
    }

    /// End-of-round rollover; the monotonic counters are untouched.
    pub fn roll_round(&mut self) {
        if !self.triggered_mine_this_round {
            self.consecutive_safe_rounds += 1;
        } else {
            self.consecutive_safe_rounds = 0;
        }
        self.triggered_mine_this_round = false;
        self.domain_touched.clear();
        self.mines_carried_this_round.clear();
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: PlayerId,
    pub energy: i32,
    pub start_of_action_energy: i32,
    pub flag_position: Coord,
    pub flag_base: Coord,
    /// Kill rewards earned this round, paid out with next round's income.
    pub banked_kill_reward: i32,
    pub evolution: [EvolutionTrack; 5],
    pub quest: QuestStats,
    pub flag_moves_general: u32,
    pub flag_moves_other: u32,
    pub scans_this_round: u32,
    pub setup_mines_placed: u8,
    pub placement_confirmed: bool,
}

impl PlayerState {
    pub fn new(id: PlayerId, flag_base: Coord, rules: &Rules) -> Self {
        Self {
            id,
            energy: rules.initial_energy,
            start_of_action_energy: rules.initial_energy,
            flag_position: flag_base,
            flag_base,
            banked_kill_reward: 0,
            evolution: [EvolutionTrack::default(); 5],
            quest: QuestStats::default(),
            flag_moves_general: 0,
            flag_moves_other: 0,
            scans_this_round: 0,
            setup_mines_placed: 0,
            placement_confirmed: false,
        }
    }

    #[inline]
    pub fn track(&self, archetype: Archetype) -> EvolutionTrack {
        self.evolution[archetype.index()]
    }

    #[inline]
    pub fn track_mut(&mut self, archetype: Archetype) -> &mut EvolutionTrack {
        &mut self.evolution[archetype.index()]
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mine {
    pub id: MineId,
    pub owner: PlayerId,
    pub kind: MineKind,
    pub pos: Coord,
    pub revealed_to: Vec<PlayerId>,
    /// Units standing on the cell at placement; they never trigger it.
    pub immune_units: Vec<UnitId>,
    pub converted: bool,
}

impl Mine {
    pub fn is_revealed_to(&self, player: PlayerId) -> bool {
        self.owner == player || self.revealed_to.contains(&player)
    }

    pub fn reveal_to(&mut self, player: PlayerId) -> bool {
        if self.is_revealed_to(player) {
            return false;
        }
        self.revealed_to.push(player);
        true
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Building {
    pub id: BuildingId,
    pub owner: PlayerId,
    pub kind: BuildingKind,
    pub pos: Coord,
    pub level: u8,
    pub duration: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmokeCloud {
    pub id: SmokeId,
    pub owner: PlayerId,
    pub pos: Coord,
    pub duration: u32,
}

/// The aggregate root. Commands flow through `GameEngine`, which validates
/// against this state and either commits a full mutation or leaves it
/// untouched.
#[derive(Clone, Debug)]
pub struct GameState {
    pub rules: Rules,
    pub round: u32,
    pub phase: Phase,
    pub current_player: PlayerId,
    pub timer_seconds: u32,
    pub paused: bool,
    /// Locked once a unit spends or moves; only `EndUnitTurn` releases it.
    pub active_unit: Option<UnitId>,
    pub selected_unit: Option<UnitId>,
    pub board: Board,
    pub units: Vec<Unit>,
    pub mines: Vec<Mine>,
    pub buildings: Vec<Building>,
    pub smokes: Vec<SmokeCloud>,
    pub players: [PlayerState; 2],
    pub log: Vec<LogEntry>,
    pub winner: Option<PlayerId>,
    pub skips_this_round: [u32; 2],
    pub rng: GameRng,
    next_log_id: u64,
    next_mine_id: u32,
    next_building_id: u32,
    next_smoke_id: u32,
}

impl GameState {
    pub fn new(rules: Rules, seed: u64) -> Self {
        let mut rng = GameRng::seed_from_u64(seed);
        let generated = generate_board(&rules, &mut rng);
        let board = generated.board;

        let players = [
            PlayerState::new(PlayerId::ONE, board.flag_base(PlayerId::ONE), &rules),
            PlayerState::new(PlayerId::TWO, board.flag_base(PlayerId::TWO), &rules),
        ];

        let mut units = Vec::with_capacity(10);
        for player in [PlayerId::ONE, PlayerId::TWO] {
            for (slot, archetype) in Archetype::ALL.iter().enumerate() {
                let pos = generated.start_positions[player.index()][slot];
                let id = UnitId(units.len() as u32);
                units.push(Unit::new(id, *archetype, player, pos, &rules));
            }
        }

        let timer = rules.placement_seconds;
        Self {
            rules,
            round: 1,
            phase: Phase::Placement,
            current_player: PlayerId::ONE,
            timer_seconds: timer,
            paused: false,
            active_unit: None,
            selected_unit: None,
            board,
            units,
            mines: Vec::new(),
            buildings: Vec::new(),
            smokes: Vec::new(),
            players,
            log: Vec::new(),
            winner: None,
            skips_this_round: [0, 0],
            rng,
            next_log_id: 0,
            next_mine_id: 0,
            next_building_id: 0,
            next_smoke_id: 0,
        }
    }

    /// Deterministic small-board state for unit tests: fixed seed, no setup
    /// phase left to run.
    pub fn new_for_tests(seed: u64) -> Self {
        Self::new(Rules::standard(), seed)
    }

    // --- lookups ---

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id.0 as usize)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(id.0 as usize)
    }

    pub fn living_unit_at(&self, at: Coord) -> Option<&Unit> {
        self.units.iter().find(|u| u.is_alive() && u.pos == at)
    }

    pub fn player(&self, id: PlayerId) -> &PlayerState {
        &self.players[id.index()]
    }

    pub fn player_mut(&mut self, id: PlayerId) -> &mut PlayerState {
        &mut self.players[id.index()]
    }

    pub fn mine(&self, id: MineId) -> Option<&Mine> {
        self.mines.iter().find(|m| m.id == id)
    }

    pub fn mine_at(&self, at: Coord) -> Option<&Mine> {
        self.mines.iter().find(|m| m.pos == at)
    }

    pub fn building_at(&self, at: Coord) -> Option<&Building> {
        self.buildings.iter().find(|b| b.pos == at)
    }

    pub fn smoke_at(&self, at: Coord) -> Option<&SmokeCloud> {
        self.smokes.iter().find(|s| s.pos == at)
    }

    /// A cell a unit may stand on: in-bounds, no obstacle, no living unit.
    pub fn is_free_for_unit(&self, at: Coord) -> bool {
        self.board.in_bounds(at) && !self.board.is_obstacle(at) && self.living_unit_at(at).is_none()
    }

    /// True when `at` lies in the half of the board away from the player's
    /// own flag base.
    pub fn in_enemy_territory(&self, player: PlayerId, at: Coord) -> bool {
        let mid = self.rules.midline_col();
        if player == PlayerId::ONE {
            at.c >= mid
        } else {
            at.c < mid
        }
    }

    // --- allocation ---

    pub fn alloc_mine_id(&mut self) -> MineId {
        let id = MineId(self.next_mine_id);
        self.next_mine_id += 1;
        id
    }

    pub fn alloc_building_id(&mut self) -> BuildingId {
        let id = BuildingId(self.next_building_id);
        self.next_building_id += 1;
        id
    }

    pub fn alloc_smoke_id(&mut self) -> SmokeId {
        let id = SmokeId(self.next_smoke_id);
        self.next_smoke_id += 1;
        id
    }

    // --- logging ---

    pub fn push_log(&mut self, category: LogCategory, owner: Option<PlayerId>, message: LogMessage) {
        let id = self.next_log_id;
        self.next_log_id += 1;
        self.log.push(LogEntry {
            id,
            round: self.round,
            category,
            owner,
            message,
        });
    }

    // --- auras ---

    /// Damage reduction for a target standing near its own flag, granted by
    /// its General's branch B at level 2+. Returns the adjusted damage and
    /// whether the aura applied.
    pub fn apply_flag_aura(&self, owner: PlayerId, target_pos: Coord, damage: i32) -> (i32, bool) {
        let player = self.player(owner);
        if player.track(Archetype::General).b.level < 2 {
            return (damage, false);
        }
        if target_pos.chebyshev(player.flag_position) > self.rules.flag_aura_radius {
            return (damage, false);
        }
        (
            (damage as f32 * self.rules.flag_aura_multiplier).floor() as i32,
            true,
        )
    }

    // --- snapshot ---

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            round: self.round,
            phase: self.phase,
            current_player: self.current_player,
            timer_seconds: self.timer_seconds,
            paused: self.paused,
            active_unit: self.active_unit,
            board: self.board.to_snapshot(),
            players: self.players.iter().map(player_snapshot).collect(),
            units: self.units.iter().map(Unit::to_snapshot).collect(),
            mines: self
                .mines
                .iter()
                .map(|m| MineSnapshot {
                    id: m.id,
                    owner: m.owner,
                    kind: m.kind,
                    pos: m.pos,
                    revealed_to: m.revealed_to.clone(),
                    converted: m.converted,
                })
                .collect(),
            buildings: self
                .buildings
                .iter()
                .map(|b| BuildingSnapshot {
                    id: b.id,
                    owner: b.owner,
                    kind: b.kind,
                    pos: b.pos,
                    level: b.level,
                    duration: b.duration,
                })
                .collect(),
            smokes: self
                .smokes
                .iter()
                .map(|s| SmokeSnapshot {
                    id: s.id,
                    owner: s.owner,
                    pos: s.pos,
                    duration: s.duration,
                })
                .collect(),
            log: self.log.clone(),
            winner: self.winner,
            rng_state: self.rng.state_bytes(),
        }
    }
}

fn player_snapshot(p: &PlayerState) -> PlayerSnapshot {
    PlayerSnapshot {
        id: p.id,
        energy: p.energy,
        start_of_action_energy: p.start_of_action_energy,
        flag_position: p.flag_position,
        flag_base: p.flag_base,
        banked_kill_reward: p.banked_kill_reward,
        evolution: Archetype::ALL
            .iter()
            .map(|&archetype| {
                let track = p.track(archetype);
                flagfall_protocol::EvolutionSnapshot {
                    archetype,
                    a: track.a.level,
                    a_variant: track.a.variant,
                    b: track.b.level,
                    b_variant: track.b.variant,
                }
            })
            .collect(),
        setup_mines_placed: p.setup_mines_placed,
        placement_confirmed: p.placement_confirmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_full_roster() {
        let state = GameState::new_for_tests(5);
        assert_eq!(state.units.len(), 10);
        assert_eq!(state.phase, Phase::Placement);
        let p1_units = state
            .units
            .iter()
            .filter(|u| u.owner == PlayerId::ONE)
            .count();
        assert_eq!(p1_units, 5);
        for player in &state.players {
            assert_eq!(player.energy, 50);
            assert_eq!(player.flag_position, player.flag_base);
        }
    }

    #[test]
    fn quest_rollover_tracks_safe_rounds() {
        let mut quest = QuestStats::default();
        quest.roll_round();
        assert_eq!(quest.consecutive_safe_rounds, 1);
        quest.triggered_mine_this_round = true;
        quest.roll_round();
        assert_eq!(quest.consecutive_safe_rounds, 0);
        assert!(!quest.triggered_mine_this_round);
    }

    #[test]
    fn territory_splits_on_the_midline() {
        let state = GameState::new_for_tests(1);
        assert!(!state.in_enemy_territory(PlayerId::ONE, Coord::new(0, 11)));
        assert!(state.in_enemy_territory(PlayerId::ONE, Coord::new(0, 12)));
        assert!(state.in_enemy_territory(PlayerId::TWO, Coord::new(0, 11)));
        assert!(!state.in_enemy_territory(PlayerId::TWO, Coord::new(0, 12)));
    }

    #[test]
    fn flag_aura_needs_level_and_range() {
        let mut state = GameState::new_for_tests(2);
        let base = state.player(PlayerId::ONE).flag_base;
        assert_eq!(state.apply_flag_aura(PlayerId::ONE, base, 10), (10, false));

        state
            .player_mut(PlayerId::ONE)
            .track_mut(Archetype::General)
            .b
            .level = 2;
        assert_eq!(state.apply_flag_aura(PlayerId::ONE, base, 10), (7, true));
        assert_eq!(state.apply_flag_aura(PlayerId::ONE, base, 8), (6, true));
        let far = base.offset(0, 3);
        assert_eq!(state.apply_flag_aura(PlayerId::ONE, far, 10), (10, false));
    }
}
