use serde::{Deserialize, Serialize};
use thiserror::Error;

use flagfall_protocol::{Archetype, Branch, MineKind, OreSize};

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid rules: {0}")]
    Invalid(String),
}

/// Per-archetype base stats.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct UnitProfile {
    pub max_hp: i32,
    pub move_cost: i32,
}

/// Quest thresholds for one archetype: counter values required to reach
/// levels 1, 2 and 3 on each branch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BranchThresholds {
    pub a: [u32; 3],
    pub b: [u32; 3],
}

/// Income scaling step: from `round` onwards, regen is `regen` and ore
/// payouts are multiplied by `ore_multiplier`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IncomeStep {
    pub round: u32,
    pub regen: i32,
    pub ore_multiplier: f32,
}

/// The complete tuning table for one game. Deserializable from YAML so
/// tests and self-play sweeps can adjust numbers without recompiling;
/// `Rules::standard()` is the shipped balance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    // Board
    pub grid_rows: i32,
    pub grid_cols: i32,
    pub home_cols: i32,
    pub obstacles_per_side: u32,
    pub ore_min_col: i32,
    pub ore_max_col: i32,
    pub ore_initial_chance: f32,
    pub ore_spawns_per_round: u32,
    pub ore_spawns_late: u32,

    // Timers (seconds)
    pub placement_seconds: u32,
    pub thinking_seconds: u32,
    pub action_seconds: u32,

    // Economy
    pub initial_energy: i32,
    pub base_regen: i32,
    pub income_steps: Vec<IncomeStep>,
    pub max_interest: i32,
    pub cap_ratio: f32,
    pub kill_reward_base: i32,
    pub kill_reward_ratio: f32,
    pub ore_rewards: [i32; 3], // small, medium, large
    pub pass_heal: i32,
    pub skip_cost_step: i32,

    // Movement / territory
    pub flag_move_cost: i32,
    pub flag_move_cost_discounted: i32,
    pub flag_moves_per_round: u32,
    pub stealth_move_cost: i32,
    pub stealth_toggle_cost: i32,
    pub scout_move_floor: i32,
    pub territory_surcharge_low: i32,
    pub territory_surcharge_high: i32,
    pub territory_surcharge_pivot: i32,

    // Combat
    pub attack_cost: i32,
    pub attack_cost_flag_carrier: i32,
    pub attack_damage: i32,
    pub attack_damage_evolved: i32,
    pub attack_lifesteal: i32,
    pub flag_aura_multiplier: f32,
    pub flag_aura_radius: i32,

    // Mines
    pub mine_costs: [i32; 5], // normal, slow, smoke, chain, nuke
    pub workshop_mine_cost: i32,
    pub base_mine_cap: u32,
    pub setup_mine_limit: u32,
    pub normal_mine_damage: i32,
    pub slow_mine_damage: i32,
    pub slow_debuff_subturns: u32,
    pub smoke_mine_damage: i32,
    pub smoke_duration: u32,
    pub chain_mine_damage: i32,
    pub chain_link_damage: i32,
    pub chain_radius: i32,
    pub nuke_mine_damage: i32,
    pub nuke_blast_damage: i32,
    pub nuke_blast_friendly_damage: i32,
    pub nuke_radius: i32,
    pub defuser_mine_multiplier: f32,

    // Abilities
    pub scan_cost: i32,
    pub scan_cost_fatigued: i32,
    pub scan_fatigue_after: u32,
    pub scan_range: i32,
    pub sensor_cost: i32,
    pub sensor_cost_discounted: i32,
    pub sensor_range: i32,
    pub disarm_cost: i32,
    pub disarm_range: i32,
    pub disarm_range_extended: i32,
    pub move_mine_cost: i32,
    pub move_mine_damage_cost: i32,
    pub convert_mine_cost: i32,
    pub pickup_mine_range: i32,
    pub carry_mine_move_cost: i32,
    pub throw_mine_cost: i32,
    pub throw_mine_range: i32,

    // Buildings
    pub tower_cost: i32,
    pub tower_cost_discounted: i32,
    pub tower_duration: u32,
    pub tower_radius: i32,
    pub detonate_cost: i32,
    pub detonate_damage: i32,
    pub hub_cost: i32,
    pub hub_discount_range: i32,
    pub teleport_cost: i32,
    pub factory_cost: i32,
    pub factory_radius: i32,
    pub factory_radius_extended: i32,

    // Round settlement
    pub respawn_rounds_early: u32,
    pub respawn_rounds_late: u32,
    pub respawn_late_threshold: u32,
    pub heal_aura_amount: i32,
    pub domain_damage: i32,
    pub domain_enter_damage: i32,
    pub domain_radius: i32,

    // Progression
    pub evolve_costs: [i32; 3], // level 0->1, 1->2, 2->3
    pub unit_profiles: [UnitProfile; 5],
    pub thresholds: [BranchThresholds; 5],
}

impl Default for Rules {
    fn default() -> Self {
        Rules::standard()
    }
}

impl Rules {
    pub fn standard() -> Self {
        Rules {
            grid_rows: 7,
            grid_cols: 24,
            home_cols: 4,
            obstacles_per_side: 4,
            ore_min_col: 6,
            ore_max_col: 17,
            ore_initial_chance: 0.05,
            ore_spawns_per_round: 1,
            ore_spawns_late: 2,

            placement_seconds: 45,
            thinking_seconds: 30,
            action_seconds: 15,

            initial_energy: 50,
            base_regen: 35,
            income_steps: vec![
                IncomeStep {
                    round: 4,
                    regen: 40,
                    ore_multiplier: 1.2,
                },
                IncomeStep {
                    round: 8,
                    regen: 45,
                    ore_multiplier: 1.4,
                },
                IncomeStep {
                    round: 12,
                    regen: 50,
                    ore_multiplier: 1.6,
                },
            ],
            max_interest: 10,
            cap_ratio: 0.3333,
            kill_reward_base: 3,
            kill_reward_ratio: 0.15,
            ore_rewards: [4, 7, 10],
            pass_heal: 3,
            skip_cost_step: 10,

            flag_move_cost: 5,
            flag_move_cost_discounted: 4,
            flag_moves_per_round: 5,
            stealth_move_cost: 3,
            stealth_toggle_cost: 3,
            scout_move_floor: 2,
            territory_surcharge_low: 1,
            territory_surcharge_high: 2,
            territory_surcharge_pivot: 5,

            attack_cost: 8,
            attack_cost_flag_carrier: 6,
            attack_damage: 4,
            attack_damage_evolved: 6,
            attack_lifesteal: 4,
            flag_aura_multiplier: 0.75,
            flag_aura_radius: 2,

            mine_costs: [5, 4, 6, 7, 9],
            workshop_mine_cost: 3,
            base_mine_cap: 5,
            setup_mine_limit: 3,
            normal_mine_damage: 8,
            slow_mine_damage: 3,
            slow_debuff_subturns: 3,
            smoke_mine_damage: 7,
            smoke_duration: 3,
            chain_mine_damage: 6,
            chain_link_damage: 8,
            chain_radius: 2,
            nuke_mine_damage: 12,
            nuke_blast_damage: 12,
            nuke_blast_friendly_damage: 6,
            nuke_radius: 1,
            defuser_mine_multiplier: 0.5,

            scan_cost: 3,
            scan_cost_fatigued: 4,
            scan_fatigue_after: 2,
            scan_range: 3,
            sensor_cost: 5,
            sensor_cost_discounted: 4,
            sensor_range: 2,
            disarm_cost: 2,
            disarm_range: 2,
            disarm_range_extended: 3,
            move_mine_cost: 2,
            move_mine_damage_cost: 5,
            convert_mine_cost: 5,
            pickup_mine_range: 2,
            carry_mine_move_cost: 3,
            throw_mine_cost: 5,
            throw_mine_range: 2,

            tower_cost: 6,
            tower_cost_discounted: 5,
            tower_duration: 2,
            tower_radius: 1,
            detonate_cost: 2,
            detonate_damage: 3,
            hub_cost: 4,
            hub_discount_range: 2,
            teleport_cost: 5,
            factory_cost: 6,
            factory_radius: 1,
            factory_radius_extended: 2,

            respawn_rounds_early: 2,
            respawn_rounds_late: 3,
            respawn_late_threshold: 10,
            heal_aura_amount: 1,
            domain_damage: 4,
            domain_enter_damage: 2,
            domain_radius: 1,

            evolve_costs: [10, 20, 30],
            unit_profiles: [
                // General, Sweeper, Ranger, Maker, Defuser
                UnitProfile {
                    max_hp: 28,
                    move_cost: 3,
                },
                UnitProfile {
                    max_hp: 14,
                    move_cost: 3,
                },
                UnitProfile {
                    max_hp: 16,
                    move_cost: 2,
                },
                UnitProfile {
                    max_hp: 12,
                    move_cost: 3,
                },
                UnitProfile {
                    max_hp: 18,
                    move_cost: 3,
                },
            ],
            thresholds: [
                // General: damage dealt / flag steps
                BranchThresholds {
                    a: [4, 12, 20],
                    b: [6, 13, 20],
                },
                // Sweeper: mines revealed / sensor scans
                BranchThresholds {
                    a: [2, 5, 8],
                    b: [2, 4, 6],
                },
                // Ranger: steps taken / mines carried
                BranchThresholds {
                    a: [8, 18, 28],
                    b: [3, 7, 12],
                },
                // Maker: own mines triggered / mines placed
                BranchThresholds {
                    a: [2, 5, 8],
                    b: [3, 6, 9],
                },
                // Defuser: mines disarmed / mine damage soaked
                BranchThresholds {
                    a: [2, 5, 8],
                    b: [2, 5, 8],
                },
            ],
        }
    }

    pub fn load_yaml(text: &str) -> Result<Rules, RulesError> {
        let rules: Rules = serde_yaml::from_str(text)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn validate(&self) -> Result<(), RulesError> {
        if self.grid_rows < 3 || self.grid_cols < 8 {
            return Err(RulesError::Invalid("board too small".into()));
        }
        if self.home_cols * 2 > self.grid_cols {
            return Err(RulesError::Invalid("home columns overlap".into()));
        }
        if !(0.0..=1.0).contains(&self.cap_ratio) {
            return Err(RulesError::Invalid("cap_ratio out of range".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn profile(&self, archetype: Archetype) -> UnitProfile {
        self.unit_profiles[archetype.index()]
    }

    #[inline]
    pub fn mine_cost(&self, kind: MineKind) -> i32 {
        match kind {
            MineKind::Normal => self.mine_costs[0],
            MineKind::Slow => self.mine_costs[1],
            MineKind::Smoke => self.mine_costs[2],
            MineKind::Chain => self.mine_costs[3],
            MineKind::Nuke => self.mine_costs[4],
        }
    }

    #[inline]
    pub fn ore_reward_base(&self, size: OreSize) -> i32 {
        match size {
            OreSize::Small => self.ore_rewards[0],
            OreSize::Medium => self.ore_rewards[1],
            OreSize::Large => self.ore_rewards[2],
        }
    }

    /// Quest-counter thresholds for one branch: values gating levels 1..=3.
    #[inline]
    pub fn branch_thresholds(&self, archetype: Archetype, branch: Branch) -> [u32; 3] {
        let t = self.thresholds[archetype.index()];
        match branch {
            Branch::A => t.a,
            Branch::B => t.b,
        }
    }

    /// Regen for a given round, following the income steps.
    pub fn regen_for_round(&self, round: u32) -> i32 {
        let mut regen = self.base_regen;
        for step in &self.income_steps {
            if round >= step.round {
                regen = step.regen;
            }
        }
        regen
    }

    /// Ore payout for a deposit harvested in a given round.
    pub fn ore_reward(&self, size: OreSize, round: u32) -> i32 {
        let base = self.ore_reward_base(size);
        let mut mult = 1.0_f32;
        for step in &self.income_steps {
            if round >= step.round {
                mult = step.ore_multiplier;
            }
        }
        (base as f32 * mult).ceil() as i32
    }

    /// The territory midline column; a player's own half is the side its
    /// flag base sits on.
    #[inline]
    pub fn midline_col(&self) -> i32 {
        self.grid_cols / 2
    }
}
