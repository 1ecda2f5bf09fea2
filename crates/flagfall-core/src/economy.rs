use crate::{rules::Rules, unit::Unit};

/// Breakdown of one player's round income.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Income {
    pub regen: i32,
    pub interest: i32,
    pub ore: i32,
    pub kills: i32,
}

impl Income {
    #[inline]
    pub fn total(&self) -> i32 {
        self.regen + self.interest + self.ore + self.kills
    }
}

/// Income rolled at round settlement: stepped regen, interest on the
/// held balance, harvested ore, and kill rewards banked last round.
pub fn round_income(
    rules: &Rules,
    round: u32,
    current_energy: i32,
    ore_income: i32,
    kill_income: i32,
) -> Income {
    Income {
        regen: rules.regen_for_round(round),
        interest: (current_energy / 10).min(rules.max_interest),
        ore: ore_income,
        kills: kill_income,
    }
}

/// Per-unit spend ceiling for one action phase.
#[inline]
pub fn spend_cap(rules: &Rules, start_of_action_energy: i32) -> i32 {
    (start_of_action_energy as f32 * rules.cap_ratio).floor() as i32
}

/// The cap invariant checked before every commit: spending `cost` must not
/// push the unit past its phase ceiling.
#[inline]
pub fn within_cap(rules: &Rules, unit: &Unit, cost: i32) -> bool {
    unit.energy_used_this_turn + cost <= spend_cap(rules, unit.start_of_action_energy)
}

/// Bounty for a kill, credited to the killer's next-round income.
#[inline]
pub fn kill_reward(rules: &Rules, victim_owner_energy: i32) -> i32 {
    rules.kill_reward_base + (victim_owner_energy as f32 * rules.kill_reward_ratio).floor() as i32
}

#[cfg(test)]
mod tests {
    use flagfall_protocol::{Archetype, Coord, PlayerId, UnitId};

    use super::*;

    #[test]
    fn income_sums_all_streams() {
        let rules = Rules::standard();
        let income = round_income(&rules, 1, 47, 5, 3);
        assert_eq!(income.regen, 35);
        assert_eq!(income.interest, 4);
        assert_eq!(income.total(), 35 + 4 + 5 + 3);
    }

    #[test]
    fn interest_is_capped() {
        let rules = Rules::standard();
        assert_eq!(round_income(&rules, 1, 250, 0, 0).interest, 10);
    }

    #[test]
    fn spend_cap_is_a_third_rounded_down() {
        let rules = Rules::standard();
        assert_eq!(spend_cap(&rules, 50), 16);
        assert_eq!(spend_cap(&rules, 30), 9);
        assert_eq!(spend_cap(&rules, 0), 0);
    }

    #[test]
    fn cap_rejects_the_overflowing_spend() {
        let rules = Rules::standard();
        let mut unit = Unit::new(
            UnitId(0),
            Archetype::General,
            PlayerId::ONE,
            Coord::new(0, 0),
            &rules,
        );
        unit.start_of_action_energy = 50;
        unit.energy_used_this_turn = 14;
        assert!(within_cap(&rules, &unit, 2));
        assert!(!within_cap(&rules, &unit, 3));
    }

    #[test]
    fn kill_reward_scales_with_victim_wealth() {
        let rules = Rules::standard();
        assert_eq!(kill_reward(&rules, 0), 3);
        assert_eq!(kill_reward(&rules, 40), 9);
    }
}
