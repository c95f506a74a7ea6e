//! Combat round optimizer.
//!
//! Finds the three-round action sequence with the highest value for a build:
//! expected damage plus priority-weighted control and survivability, minus a
//! cost for each spell slot spent. The search is a depth-first enumeration
//! of each round's legal options, memoized on (round, resource state).
//!
//! Resource state is everything that constrains later rounds: remaining
//! spell slots and pact slots, Action Surge and other per-combat uses, the
//! active concentration effect and active non-concentration buffs.

use super::{slot_name, OptimizerError};
use crate::build::BuildConfiguration;
use crate::catalog::buffs::BUFFS;
use crate::catalog::{get_buff, BuffDefinition, CastTime, CharacterClass};
use crate::dice::Advantage;
use crate::dpr::{AttackProfile, AttackSource, PowerAttackPolicy, TurnShape};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

pub const ROUNDS_TO_OPTIMIZE: usize = 3;

/// How freely spell slots are spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStrategy {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl ResourceStrategy {
    /// Score penalty for spending a slot of `level`.
    pub fn slot_cost(&self, level: u8) -> f64 {
        let level = level as f64;
        match self {
            ResourceStrategy::Conservative => 4.0 * level,
            ResourceStrategy::Balanced => 1.5 * level,
            ResourceStrategy::Aggressive => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CombatOptimizationConfig {
    pub target_ac: i32,
    pub num_targets: u32,
    pub advantage_state: Advantage,
    pub resource_strategy: ResourceStrategy,
    /// Allow more than one spell slot per round.
    pub allow_nova: bool,
    pub control_priority: f64,
    pub survivability_priority: f64,
    pub max_alternatives: usize,
}

impl Default for CombatOptimizationConfig {
    fn default() -> Self {
        Self {
            target_ac: 16,
            num_targets: 1,
            advantage_state: Advantage::Normal,
            resource_strategy: ResourceStrategy::Balanced,
            allow_nova: true,
            control_priority: 0.5,
            survivability_priority: 0.5,
            max_alternatives: 3,
        }
    }
}

impl CombatOptimizationConfig {
    pub fn with_target_ac(mut self, ac: i32) -> Self {
        self.target_ac = ac;
        self
    }

    pub fn with_num_targets(mut self, targets: u32) -> Self {
        self.num_targets = targets;
        self
    }

    pub fn with_strategy(mut self, strategy: ResourceStrategy) -> Self {
        self.resource_strategy = strategy;
        self
    }

    pub fn with_allow_nova(mut self, allow: bool) -> Self {
        self.allow_nova = allow;
        self
    }

    pub fn with_priorities(mut self, control: f64, survivability: f64) -> Self {
        self.control_priority = control;
        self.survivability_priority = survivability;
        self
    }

    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !(1..=40).contains(&self.target_ac) {
            return Err(OptimizerError::InvalidConfig(format!(
                "target AC {} outside 1..=40",
                self.target_ac
            )));
        }
        if self.num_targets == 0 {
            return Err(OptimizerError::InvalidConfig(
                "at least one target is required".to_string(),
            ));
        }
        for (name, value) in [
            ("control priority", self.control_priority),
            ("survivability priority", self.survivability_priority),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(OptimizerError::InvalidConfig(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTiming {
    Action,
    BonusAction,
    Free,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedAction {
    pub name: String,
    pub timing: ActionTiming,
    pub expected_damage: f64,
}

/// What happened to concentration during a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConcentrationChange {
    None,
    Started { name: String },
    Maintained { name: String },
    Replaced { from: String, to: String },
    Ended { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundPlan {
    pub round: usize,
    pub actions: Vec<PlannedAction>,
    pub expected_damage: f64,
    pub expected_healing: f64,
    pub resources_consumed: Vec<String>,
    pub buffs_applied: Vec<String>,
    pub debuffs_applied: Vec<String>,
    pub concentration: ConcentrationChange,
}

impl RoundPlan {
    fn empty(round: usize) -> Self {
        Self {
            round,
            actions: Vec::new(),
            expected_damage: 0.0,
            expected_healing: 0.0,
            resources_consumed: Vec::new(),
            buffs_applied: Vec::new(),
            debuffs_applied: Vec::new(),
            concentration: ConcentrationChange::None,
        }
    }

    /// Short label of the round's actions.
    pub fn summary(&self) -> String {
        if self.actions.is_empty() {
            return "No action".to_string();
        }
        self.actions
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

/// The best plan for an opening round other than the optimum's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatAlternative {
    pub name: String,
    pub total_expected_damage: f64,
    /// Damage relative to the optimum (negative when it deals less).
    pub damage_difference: f64,
    pub score: f64,
    pub rounds: Vec<RoundPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatOptimizationResult {
    pub total_expected_damage: f64,
    pub rounds: Vec<RoundPlan>,
    /// Spell slot levels plus per-combat feature uses spent.
    pub resource_value: f64,
    /// Damage per resource point.
    pub resource_efficiency: f64,
    pub score: f64,
    pub alternatives: Vec<CombatAlternative>,
}

impl CombatOptimizationResult {
    /// Three empty rounds.
    pub fn zero() -> Self {
        Self {
            total_expected_damage: 0.0,
            rounds: (1..=ROUNDS_TO_OPTIMIZE).map(RoundPlan::empty).collect(),
            resource_value: 0.0,
            resource_efficiency: 0.0,
            score: 0.0,
            alternatives: Vec::new(),
        }
    }
}

pub(crate) fn efficiency(damage: f64, resource_value: f64) -> f64 {
    damage / resource_value.max(1.0)
}

pub struct CombatRoundOptimizer {
    config: CombatOptimizationConfig,
}

impl CombatRoundOptimizer {
    pub fn new(config: CombatOptimizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CombatOptimizationConfig {
        &self.config
    }

    /// Find the best three-round sequence for `build`, with alternatives.
    pub fn find_optimal_sequence(
        &self,
        build: &BuildConfiguration,
    ) -> Result<CombatOptimizationResult, OptimizerError> {
        self.config.validate()?;
        if build.level_timeline.is_empty() {
            return Ok(CombatOptimizationResult::zero());
        }
        build.validate()?;

        let mut search = Search::new(build, &self.config);
        let initial = search.initial_state();

        let mut openings: Vec<Continuation> = Vec::new();
        for option in search.options(&initial) {
            let Some(first) = search.evaluate(0, &initial, &option)? else {
                continue;
            };
            let rest = search.best_from(1, &first.next)?;
            openings.push(Continuation::prepend(first, rest));
        }
        debug!(
            build = %build.id,
            openings = openings.len(),
            states = search.memo.len(),
            "Combat search complete"
        );

        openings.sort_by(|a, b| b.score.total_cmp(&a.score));
        let mut seen = BTreeSet::new();
        openings.retain(|c| seen.insert(c.rounds[0].summary()));

        let mut openings = openings.into_iter();
        let Some(best) = openings.next() else {
            return Ok(CombatOptimizationResult::zero());
        };

        let alternatives = openings
            .take(self.config.max_alternatives)
            .map(|alt| CombatAlternative {
                name: alt.rounds[0].summary(),
                total_expected_damage: alt.damage,
                damage_difference: alt.damage - best.damage,
                score: alt.score,
                rounds: alt.rounds,
            })
            .collect();

        Ok(CombatOptimizationResult {
            total_expected_damage: best.damage,
            resource_efficiency: efficiency(best.damage, best.resource_value),
            resource_value: best.resource_value,
            score: best.score,
            rounds: best.rounds,
            alternatives,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionChoice {
    Attack,
    Cast(&'static str),
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BonusChoice {
    None,
    Attack,
    Cast(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct TurnOption {
    action: ActionChoice,
    surge: bool,
    bonus: BonusChoice,
    smite: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResourceState {
    slots: [u8; 9],
    pact_slots: u8,
    action_surges: u8,
    /// Remaining uses of per-combat features, once first used.
    uses: BTreeMap<&'static str, u8>,
    concentration: Option<&'static str>,
    active: BTreeSet<&'static str>,
}

impl ResourceState {
    /// Spend the lowest slot of at least `min_level`. Returns the level spent.
    fn spend_lowest(&mut self, min_level: u8, pact_level: Option<u8>) -> Option<u8> {
        for level in min_level.max(1)..=9 {
            let slot = &mut self.slots[level as usize - 1];
            if *slot > 0 {
                *slot -= 1;
                return Some(level);
            }
        }
        match pact_level {
            Some(level) if level >= min_level && self.pact_slots > 0 => {
                self.pact_slots -= 1;
                Some(level)
            }
            _ => None,
        }
    }

    fn spend_exact(&mut self, level: u8, pact_level: Option<u8>) -> bool {
        if (1..=9).contains(&level) && self.slots[level as usize - 1] > 0 {
            self.slots[level as usize - 1] -= 1;
            return true;
        }
        if pact_level == Some(level) && self.pact_slots > 0 {
            self.pact_slots -= 1;
            return true;
        }
        false
    }

    fn available_levels(&self, pact_level: Option<u8>) -> BTreeSet<u8> {
        let mut levels: BTreeSet<u8> = (1..=9u8)
            .filter(|l| self.slots[*l as usize - 1] > 0)
            .collect();
        if let (Some(level), true) = (pact_level, self.pact_slots > 0) {
            levels.insert(level);
        }
        levels
    }
}

struct Evaluated {
    next: ResourceState,
    plan: RoundPlan,
    score: f64,
    resource_value: f64,
}

#[derive(Debug, Clone, Default)]
struct Continuation {
    score: f64,
    damage: f64,
    resource_value: f64,
    rounds: Vec<RoundPlan>,
}

impl Continuation {
    fn prepend(first: Evaluated, rest: Continuation) -> Self {
        let mut rounds = Vec::with_capacity(rest.rounds.len() + 1);
        let damage = first.plan.expected_damage + rest.damage;
        rounds.push(first.plan);
        rounds.extend(rest.rounds);
        Self {
            score: first.score + rest.score,
            damage,
            resource_value: first.resource_value + rest.resource_value,
            rounds,
        }
    }
}

struct Search<'a> {
    build: &'a BuildConfiguration,
    config: &'a CombatOptimizationConfig,
    /// Buffs that are on regardless of what the build does (cast by allies).
    external: BTreeSet<String>,
    castable: Vec<&'static BuffDefinition>,
    pact_level: Option<u8>,
    profiles: HashMap<Vec<&'static str>, AttackProfile>,
    memo: HashMap<(usize, ResourceState), Continuation>,
}

impl<'a> Search<'a> {
    fn new(build: &'a BuildConfiguration, config: &'a CombatOptimizationConfig) -> Self {
        let levels = build.class_levels();
        let slots = build.spell_slots();
        let pact = build.pact_magic();
        let max_slot = (1..=9u8)
            .rev()
            .find(|l| slots[*l as usize - 1] > 0)
            .max(pact.map(|(_, level)| level))
            .unwrap_or(0);

        let castable = BUFFS
            .iter()
            .filter(|buff| {
                levels
                    .iter()
                    .any(|(class, lvl)| buff.available_to(*class, *lvl))
            })
            .filter(|buff| buff.slot_level.is_none_or(|level| level <= max_slot))
            .filter(|buff| {
                !build.active_buffs.contains(buff.id) && !build.round0_buffs.contains(buff.id)
            })
            .collect();

        Self {
            build,
            config,
            external: build.active_buffs.clone(),
            castable,
            pact_level: pact.map(|(_, level)| level),
            profiles: HashMap::new(),
            memo: HashMap::new(),
        }
    }

    fn initial_state(&self) -> ResourceState {
        let fighter = self.build.class_level(CharacterClass::Fighter);
        let mut concentration = None;
        let mut active = BTreeSet::new();
        for buff in self.build.round0_buffs.iter().filter_map(|id| get_buff(id)) {
            if !buff.concentration {
                active.insert(buff.id);
            } else if concentration.is_none() {
                concentration = Some(buff.id);
            }
        }
        ResourceState {
            slots: self.build.spell_slots(),
            pact_slots: self.build.pact_magic().map_or(0, |(count, _)| count),
            action_surges: match fighter {
                0..=1 => 0,
                2..=16 => 1,
                _ => 2,
            },
            uses: BTreeMap::new(),
            concentration,
            active,
        }
    }

    fn options(&self, state: &ResourceState) -> Vec<TurnOption> {
        let mut actions = vec![ActionChoice::Attack, ActionChoice::Idle];
        let mut bonuses = vec![BonusChoice::None, BonusChoice::Attack];
        for buff in &self.castable {
            match buff.cast_time {
                CastTime::Action => actions.push(ActionChoice::Cast(buff.id)),
                CastTime::BonusAction => bonuses.push(BonusChoice::Cast(buff.id)),
            }
        }
        let surges: &[bool] = if state.action_surges > 0 {
            &[false, true]
        } else {
            &[false]
        };
        let mut smites = vec![None];
        smites.extend(state.available_levels(self.pact_level).into_iter().map(Some));

        let mut options = Vec::new();
        for &action in &actions {
            for &surge in surges {
                for &bonus in &bonuses {
                    for &smite in &smites {
                        options.push(TurnOption {
                            action,
                            surge,
                            bonus,
                            smite,
                        });
                    }
                }
            }
        }
        options
    }

    /// The attack profile with the given self-applied buffs plus external ones.
    fn profile(&mut self, state: &ResourceState) -> Result<&AttackProfile, OptimizerError> {
        let mut key: Vec<&'static str> = state.active.iter().copied().collect();
        key.extend(state.concentration);
        key.sort_unstable();

        if !self.profiles.contains_key(&key) {
            let mut buffs = self.external.clone();
            buffs.extend(key.iter().map(|id| id.to_string()));
            let profile = AttackProfile::new(self.build, &buffs)?;
            self.profiles.insert(key.clone(), profile);
        }
        self.profiles
            .get(&key)
            .ok_or_else(|| OptimizerError::InvalidConfig("profile cache miss".to_string()))
    }

    fn best_from(
        &mut self,
        round: usize,
        state: &ResourceState,
    ) -> Result<Continuation, OptimizerError> {
        if round >= ROUNDS_TO_OPTIMIZE {
            return Ok(Continuation::default());
        }
        let key = (round, state.clone());
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit.clone());
        }

        let mut best: Option<Continuation> = None;
        for option in self.options(state) {
            let Some(evaluated) = self.evaluate(round, state, &option)? else {
                continue;
            };
            let rest = self.best_from(round + 1, &evaluated.next)?;
            let candidate = Continuation::prepend(evaluated, rest);
            if best
                .as_ref()
                .is_none_or(|b| candidate.score > b.score + 1e-9)
            {
                best = Some(candidate);
            }
        }

        let best = best.unwrap_or_else(|| Continuation {
            rounds: (round + 1..=ROUNDS_TO_OPTIMIZE).map(RoundPlan::empty).collect(),
            ..Default::default()
        });
        self.memo.insert(key, best.clone());
        Ok(best)
    }

    /// Apply one option to a state. `None` when the option is illegal.
    fn evaluate(
        &mut self,
        round: usize,
        state: &ResourceState,
        option: &TurnOption,
    ) -> Result<Option<Evaluated>, OptimizerError> {
        let config = self.config;
        let mut next = state.clone();
        let mut plan = RoundPlan::empty(round + 1);
        let mut resource_value = 0.0;
        let mut slot_cost = 0.0;
        let mut slots_spent = 0;

        let mut casts: Vec<(&'static BuffDefinition, ActionTiming)> = Vec::new();
        if let ActionChoice::Cast(id) = option.action {
            casts.extend(get_buff(id).map(|b| (b, ActionTiming::Action)));
        }
        if let BonusChoice::Cast(id) = option.bonus {
            casts.extend(get_buff(id).map(|b| (b, ActionTiming::BonusAction)));
        }

        // One leveled spell per turn, one concentration effect, no spells while raging.
        let leveled = casts.iter().filter(|(b, _)| b.slot_level.is_some()).count();
        if leveled > 1 || casts.iter().filter(|(b, _)| b.concentration).count() > 1 {
            return Ok(None);
        }
        let raging = state.active.iter().any(|id| get_buff(id).is_some_and(|b| b.effect.rage))
            || casts.iter().any(|(b, _)| b.effect.rage);
        if raging && leveled > 0 {
            return Ok(None);
        }

        let mut concentration_change = None;
        for (buff, timing) in &casts {
            if state.concentration == Some(buff.id) || state.active.contains(buff.id) {
                return Ok(None);
            }
            if let Some(uses) = buff.uses_per_combat {
                let remaining = next.uses.get(buff.id).copied().unwrap_or(uses);
                if remaining == 0 {
                    return Ok(None);
                }
                next.uses.insert(buff.id, remaining - 1);
                plan.resources_consumed.push(buff.name.to_string());
                resource_value += 1.0;
            }
            if let Some(min_level) = buff.slot_level {
                let Some(level) = next.spend_lowest(min_level, self.pact_level) else {
                    return Ok(None);
                };
                slots_spent += 1;
                resource_value += level as f64;
                slot_cost += config.resource_strategy.slot_cost(level);
                plan.resources_consumed.push(slot_name(level));
            }

            if buff.concentration {
                concentration_change = Some(match next.concentration.and_then(get_buff) {
                    Some(previous) => ConcentrationChange::Replaced {
                        from: previous.name.to_string(),
                        to: buff.name.to_string(),
                    },
                    None => ConcentrationChange::Started {
                        name: buff.name.to_string(),
                    },
                });
                next.concentration = Some(buff.id);
            } else {
                next.active.insert(buff.id);
            }
            if buff.effect.rage {
                if let Some(previous) = next.concentration.take().and_then(get_buff) {
                    concentration_change = Some(ConcentrationChange::Ended {
                        name: previous.name.to_string(),
                    });
                }
            }

            let verb = if buff.slot_level.is_some() { "Cast " } else { "" };
            plan.actions.push(PlannedAction {
                name: format!("{verb}{}", buff.name),
                timing: *timing,
                expected_damage: 0.0,
            });
            if buff.debuff {
                plan.debuffs_applied.push(buff.name.to_string());
            } else {
                plan.buffs_applied.push(buff.name.to_string());
            }
        }
        plan.concentration = concentration_change.unwrap_or_else(|| {
            match next.concentration.and_then(get_buff) {
                Some(buff) => ConcentrationChange::Maintained {
                    name: buff.name.to_string(),
                },
                None => ConcentrationChange::None,
            }
        });

        if option.surge {
            if next.action_surges == 0 {
                return Ok(None);
            }
            next.action_surges -= 1;
            plan.resources_consumed.push("Action Surge".to_string());
            resource_value += 1.0;
        }
        let attacked = option.action == ActionChoice::Attack;
        let attack_actions = attacked as u8 + option.surge as u8;
        if attack_actions == 0 && (option.bonus == BonusChoice::Attack || option.smite.is_some()) {
            return Ok(None);
        }
        // Action Surge grants an Attack action after the first action is used.
        if option.surge && option.action == ActionChoice::Idle {
            return Ok(None);
        }

        if let Some(level) = option.smite {
            if !next.spend_exact(level, self.pact_level) {
                return Ok(None);
            }
            slots_spent += 1;
            resource_value += level as f64;
            slot_cost += config.resource_strategy.slot_cost(level);
            plan.resources_consumed.push(slot_name(level));
        }
        if !config.allow_nova && slots_spent > 1 {
            return Ok(None);
        }

        let hasted_this_round = casts
            .iter()
            .any(|(b, _)| b.effect.extra_weapon_attacks > 0);
        let build = self.build;
        let profile = self.profile(&next)?;
        if attack_actions > 0 && profile.action_attacks.is_empty() {
            return Ok(None);
        }
        if option.bonus == BonusChoice::Attack && profile.bonus_attacks.is_empty() {
            return Ok(None);
        }
        if option.smite.is_some() && !profile.can_smite {
            return Ok(None);
        }

        let ac = config.target_ac;
        let advantage = config.advantage_state;
        let extra_targets = (config.num_targets - 1) as f64 * profile.per_round_damage;
        let turn = |shape: &TurnShape| {
            profile.turn_damage(shape, ac, advantage, PowerAttackPolicy::Auto) + extra_targets
        };

        let mut shape = TurnShape::default();
        let mut running = turn(&shape);
        if running > 0.0 {
            let sources: Vec<&str> = next
                .active
                .iter()
                .copied()
                .chain(next.concentration)
                .filter_map(get_buff)
                .filter(|b| b.effect.per_round_damage > 0.0)
                .map(|b| b.name)
                .collect();
            plan.actions.push(PlannedAction {
                name: if sources.is_empty() {
                    "Ongoing effects".to_string()
                } else {
                    sources.join(", ")
                },
                timing: ActionTiming::Free,
                expected_damage: running,
            });
        }

        let mut push = |plan: &mut RoundPlan, shape: &TurnShape, name: String, timing| {
            let total = turn(shape);
            plan.actions.push(PlannedAction {
                name,
                timing,
                expected_damage: total - running,
            });
            running = total;
        };

        for i in 1..=attack_actions {
            shape.attack_actions = i;
            let (name, timing) = if i == 1 && attacked {
                (attack_name(build, profile), ActionTiming::Action)
            } else {
                (
                    format!("Action Surge: {}", attack_name(build, profile)),
                    ActionTiming::Free,
                )
            };
            push(&mut plan, &shape, name, timing);
        }
        if option.bonus == BonusChoice::Attack {
            shape.bonus_attack = true;
            let name = match profile.bonus_attacks.first().map(|a| a.source) {
                Some(AttackSource::OffHand) => "Off-hand Attack",
                _ => "Bonus Action Attack",
            };
            push(&mut plan, &shape, name.to_string(), ActionTiming::BonusAction);
        }
        if !hasted_this_round && !profile.haste_attacks.is_empty() {
            shape.haste_attack = true;
            push(&mut plan, &shape, "Haste Attack".to_string(), ActionTiming::Free);
        }
        if let Some(level) = option.smite {
            shape.smite_slot = Some(level);
            push(
                &mut plan,
                &shape,
                format!("Divine Smite ({})", slot_name(level)),
                ActionTiming::Free,
            );
        }
        plan.expected_damage = running;

        let mut utility = 0.0;
        for buff in next
            .active
            .iter()
            .copied()
            .chain(next.concentration)
            .filter_map(get_buff)
        {
            utility += config.control_priority * buff.control_value
                + config.survivability_priority * buff.survivability_value;
        }

        Ok(Some(Evaluated {
            next,
            score: plan.expected_damage + utility - slot_cost,
            plan,
            resource_value,
        }))
    }
}

fn attack_name(build: &BuildConfiguration, profile: &AttackProfile) -> String {
    let count = profile.action_attacks.len();
    let cantrip = profile
        .action_attacks
        .first()
        .is_some_and(|a| a.source == AttackSource::Cantrip);
    if cantrip {
        let beams = if count == 1 { "beam" } else { "beams" };
        return format!("Eldritch Blast ({count} {beams})");
    }
    let weapon = build
        .equipment
        .main_hand
        .as_deref()
        .and_then(crate::catalog::get_weapon)
        .map_or("Unarmed Strike", |w| w.name);
    let attacks = if count == 1 { "attack" } else { "attacks" };
    format!("Attack: {weapon} ({count} {attacks})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_fighter, sample_paladin};

    fn optimize(build: &BuildConfiguration, config: CombatOptimizationConfig) -> CombatOptimizationResult {
        CombatRoundOptimizer::new(config)
            .find_optimal_sequence(build)
            .unwrap()
    }

    fn count_resource(result: &CombatOptimizationResult, name: &str) -> usize {
        result
            .rounds
            .iter()
            .flat_map(|r| &r.resources_consumed)
            .filter(|r| r.as_str() == name)
            .count()
    }

    #[test]
    fn test_always_three_rounds() {
        let result = optimize(&sample_fighter(5), CombatOptimizationConfig::default());
        assert_eq!(result.rounds.len(), ROUNDS_TO_OPTIMIZE);
        let rounds: Vec<usize> = result.rounds.iter().map(|r| r.round).collect();
        assert_eq!(rounds, vec![1, 2, 3]);

        let sum: f64 = result.rounds.iter().map(|r| r.expected_damage).sum();
        assert!((sum - result.total_expected_damage).abs() < 1e-9);
    }

    #[test]
    fn test_fighter_uses_action_surge_once() {
        let result = optimize(&sample_fighter(5), CombatOptimizationConfig::default());
        assert_eq!(count_resource(&result, "Action Surge"), 1);
        // Four Attack actions of 11.7 each at AC 16.
        assert!((result.total_expected_damage - 46.8).abs() < 1e-9);
        assert!((result.resource_efficiency - 46.8).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_without_resources() {
        let result = optimize(&sample_fighter(1), CombatOptimizationConfig::default());
        assert_eq!(result.resource_value, 0.0);
        assert_eq!(result.resource_efficiency, result.total_expected_damage);
        assert!(result.total_expected_damage > 0.0);
    }

    #[test]
    fn test_empty_build_gives_zero_plan() {
        let result = optimize(&BuildConfiguration::new("Nobody"), CombatOptimizationConfig::default());
        assert_eq!(result.total_expected_damage, 0.0);
        assert_eq!(result.rounds.len(), 3);
        assert!(result.rounds.iter().all(|r| r.actions.is_empty()));
    }

    #[test]
    fn test_invalid_config() {
        let optimizer = CombatRoundOptimizer::new(CombatOptimizationConfig::default().with_target_ac(0));
        assert!(matches!(
            optimizer.find_optimal_sequence(&sample_fighter(5)),
            Err(OptimizerError::InvalidConfig(_))
        ));
        let optimizer = CombatRoundOptimizer::new(CombatOptimizationConfig::default().with_num_targets(0));
        assert!(optimizer.find_optimal_sequence(&sample_fighter(5)).is_err());
    }

    #[test]
    fn test_unknown_ids_are_errors() {
        let build = sample_fighter(5).with_buff("wish");
        let result = CombatRoundOptimizer::new(CombatOptimizationConfig::default())
            .find_optimal_sequence(&build);
        assert!(matches!(result, Err(OptimizerError::Build(_))));
    }

    #[test]
    fn test_concentration_is_exclusive() {
        let config = CombatOptimizationConfig::default().with_strategy(ResourceStrategy::Aggressive);
        let result = optimize(&sample_paladin(9), config);

        let mut active: Option<String> = None;
        for round in &result.rounds {
            match &round.concentration {
                ConcentrationChange::Started { name } => {
                    assert!(active.is_none());
                    active = Some(name.clone());
                }
                ConcentrationChange::Replaced { from, to } => {
                    assert_eq!(active.as_ref(), Some(from));
                    active = Some(to.clone());
                }
                ConcentrationChange::Maintained { name } => {
                    assert_eq!(active.as_ref(), Some(name));
                }
                ConcentrationChange::Ended { .. } => active = None,
                ConcentrationChange::None => assert!(active.is_none()),
            }
            let cast = round
                .actions
                .iter()
                .filter(|a| a.name.starts_with("Cast "))
                .count();
            assert!(cast <= 1);
        }
    }

    #[test]
    fn test_rage_used_once() {
        let barbarian = BuildConfiguration::new("Barbarian")
            .with_levels(CharacterClass::Barbarian, 5)
            .with_main_hand("greataxe");
        let result = optimize(&barbarian, CombatOptimizationConfig::default());
        assert_eq!(count_resource(&result, "Rage"), 1);
        assert_eq!(result.rounds[0].buffs_applied, vec!["Rage".to_string()]);
    }

    #[test]
    fn test_no_nova_caps_slots_per_round() {
        let config = CombatOptimizationConfig::default()
            .with_strategy(ResourceStrategy::Aggressive)
            .with_allow_nova(false);
        let result = optimize(&sample_paladin(9), config);
        for round in &result.rounds {
            let slots = round
                .resources_consumed
                .iter()
                .filter(|r| r.ends_with("spell slot"))
                .count();
            assert!(slots <= 1);
        }
    }

    #[test]
    fn test_conservative_spends_no_more_than_aggressive() {
        let paladin = sample_paladin(5);
        let slots_used = |strategy| {
            let result = optimize(&paladin, CombatOptimizationConfig::default().with_strategy(strategy));
            result
                .rounds
                .iter()
                .flat_map(|r| &r.resources_consumed)
                .filter(|r| r.ends_with("spell slot"))
                .count()
        };
        assert!(slots_used(ResourceStrategy::Conservative) <= slots_used(ResourceStrategy::Aggressive));

        let aggressive = optimize(&paladin, CombatOptimizationConfig::default().with_strategy(ResourceStrategy::Aggressive));
        let conservative = optimize(&paladin, CombatOptimizationConfig::default().with_strategy(ResourceStrategy::Conservative));
        assert!(aggressive.total_expected_damage + 1e-9 >= conservative.total_expected_damage);
    }

    #[test]
    fn test_ranger_opens_with_hunters_mark() {
        let ranger = BuildConfiguration::new("Ranger")
            .with_levels(CharacterClass::Ranger, 5)
            .with_main_hand("longbow")
            .with_ability_scores(crate::build::AbilityScores::new(10, 16, 14, 10, 14, 8));
        let config = CombatOptimizationConfig::default()
            .with_strategy(ResourceStrategy::Aggressive)
            .with_priorities(0.0, 0.0);
        let result = optimize(&ranger, config);

        assert_eq!(
            result.rounds[0].concentration,
            ConcentrationChange::Started {
                name: "Hunter's Mark".to_string()
            }
        );
        for round in &result.rounds[1..] {
            assert_eq!(
                round.concentration,
                ConcentrationChange::Maintained {
                    name: "Hunter's Mark".to_string()
                }
            );
        }
    }

    #[test]
    fn test_alternatives_are_distinct_and_bounded() {
        let config = CombatOptimizationConfig {
            max_alternatives: 2,
            ..Default::default()
        };
        let result = optimize(&sample_paladin(5), config);
        assert!(result.alternatives.len() <= 2);
        let best_opening = result.rounds[0].summary();
        for alt in &result.alternatives {
            assert_ne!(alt.name, best_opening);
            assert_eq!(alt.rounds.len(), 3);
            assert!(alt.score <= result.score + 1e-9);
        }
    }

    #[test]
    fn test_more_targets_favor_area_damage() {
        let cleric = BuildConfiguration::new("Cleric")
            .with_levels(CharacterClass::Cleric, 5)
            .with_main_hand("warhammer")
            .with_ability_scores(crate::build::AbilityScores::new(14, 10, 14, 10, 16, 10));
        let config = CombatOptimizationConfig::default()
            .with_num_targets(4)
            .with_strategy(ResourceStrategy::Aggressive);
        let result = optimize(&cleric, config);
        let guardians = result
            .rounds
            .iter()
            .any(|r| r.actions.iter().any(|a| a.name.contains("Spirit Guardians")));
        assert!(guardians);
    }
}
