//! DPR curve calculation.
//!
//! Turns a [`BuildConfiguration`] into an [`AttackProfile`] (every attack the
//! build makes in a round, with its to-hit and damage terms), then evaluates
//! expected damage in closed form against each AC in a [`DprConfiguration`]
//! range. The same profile drives the combat round optimizer, which composes
//! turns out of the profile's parts instead of the steady-state round.

use crate::build::{Ability, AbilityScores, BuildConfiguration, BuildError};
use crate::catalog::{
    get_buff, get_feat, get_invocation, get_subclass, get_weapon, rage_damage, CharacterClass, FeatEffect,
    FightingStyle, InvocationEffect, PowerAttackKind, SubclassFeature, WeaponDefinition,
    WeaponProperty, PACT_OF_THE_BLADE,
};
use crate::dice::{attack_odds, Advantage, AttackOdds, DiceExpression, DieType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors from DPR calculation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DprError {
    #[error("Invalid AC range: {min}..={max} step {step}")]
    InvalidRange { min: i32, max: i32, step: i32 },

    #[error("Invalid build: {0}")]
    Build(#[from] BuildError),

    #[error("DPR worker unavailable")]
    WorkerUnavailable,

    #[error("DPR calculation failed: {0}")]
    Failed(String),
}

/// The calculation envelope for one DPR curve request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DprConfiguration {
    pub ac_min: i32,
    pub ac_max: i32,
    pub ac_step: i32,
    /// Which curve consumers read by default.
    pub advantage_state: Advantage,
    /// Spend spell slots on per-hit riders (Divine Smite) every round.
    pub greedy_resource_use: bool,
    /// Use GWM/Sharpshooter only where it raises DPR; otherwise always.
    #[serde(rename = "autoGWMSS")]
    pub auto_gwm_ss: bool,
    #[serde(rename = "includeRound0Buffs")]
    pub include_round0_buffs: bool,
}

impl Default for DprConfiguration {
    fn default() -> Self {
        Self {
            ac_min: 10,
            ac_max: 30,
            ac_step: 1,
            advantage_state: Advantage::Normal,
            greedy_resource_use: true,
            auto_gwm_ss: true,
            include_round0_buffs: true,
        }
    }
}

impl DprConfiguration {
    /// A unit-step range around `target_ac` that is guaranteed to include it.
    pub fn centered_on(target_ac: i32) -> Self {
        Self {
            ac_min: (target_ac - 10).max(1),
            ac_max: target_ac + 10,
            ac_step: 1,
            ..Default::default()
        }
    }

    pub fn with_advantage(mut self, advantage: Advantage) -> Self {
        self.advantage_state = advantage;
        self
    }

    pub fn with_greedy_resource_use(mut self, greedy: bool) -> Self {
        self.greedy_resource_use = greedy;
        self
    }

    pub fn with_auto_gwm_ss(mut self, auto: bool) -> Self {
        self.auto_gwm_ss = auto;
        self
    }

    pub fn with_round0_buffs(mut self, include: bool) -> Self {
        self.include_round0_buffs = include;
        self
    }

    pub fn validate(&self) -> Result<(), DprError> {
        if self.ac_step <= 0 || self.ac_min > self.ac_max {
            return Err(DprError::InvalidRange {
                min: self.ac_min,
                max: self.ac_max,
                step: self.ac_step,
            });
        }
        Ok(())
    }

    pub fn ac_values(&self) -> Vec<i32> {
        if self.ac_step <= 0 {
            return Vec::new();
        }
        (self.ac_min..=self.ac_max)
            .step_by(self.ac_step as usize)
            .collect()
    }

    /// Whether a curve computed with this configuration has a point at `ac`.
    pub fn contains_ac(&self, ac: i32) -> bool {
        self.ac_step > 0
            && (self.ac_min..=self.ac_max).contains(&ac)
            && (ac - self.ac_min) % self.ac_step == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DprPoint {
    pub ac: i32,
    pub dpr: f64,
}

/// DPR curves for one build, one per advantage state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DprCurves {
    pub normal_curve: Vec<DprPoint>,
    pub advantage_curve: Vec<DprPoint>,
    pub disadvantage_curve: Vec<DprPoint>,
}

impl DprCurves {
    pub fn curve_for(&self, advantage: Advantage) -> &[DprPoint] {
        match advantage {
            Advantage::Normal => &self.normal_curve,
            Advantage::Advantage => &self.advantage_curve,
            Advantage::Disadvantage => &self.disadvantage_curve,
        }
    }

    /// DPR at exactly `ac`, if the curve has that point.
    pub fn dpr_at(&self, advantage: Advantage, ac: i32) -> Option<f64> {
        self.curve_for(advantage)
            .iter()
            .find(|p| p.ac == ac)
            .map(|p| p.dpr)
    }
}

/// Where an attack in the profile comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttackSource {
    MainHand,
    OffHand,
    BonusAction,
    Haste,
    Cantrip,
}

/// One attack roll and its damage terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Attack {
    pub source: AttackSource,
    pub to_hit: f64,
    /// Expected damage from dice (doubled on a crit).
    pub dice: f64,
    /// Flat damage (not doubled).
    pub flat: f64,
    /// Extra dice rolled only on a crit (Brutal Critical).
    pub crit_extra: f64,
    /// Eligible for GWM/Sharpshooter.
    pub power_attack: bool,
    /// Weapon attack (riders such as Sneak Attack apply).
    pub weapon: bool,
    pub melee: bool,
    pub elven_accuracy: bool,
}

/// Penalty and bonus of a power attack.
pub const POWER_ATTACK_PENALTY: f64 = 5.0;
pub const POWER_ATTACK_BONUS: f64 = 10.0;

impl Attack {
    pub fn odds(&self, ac: i32, crit_min: u8, advantage: Advantage, power: bool) -> AttackOdds {
        let penalty = if power && self.power_attack {
            POWER_ATTACK_PENALTY
        } else {
            0.0
        };
        attack_odds(
            self.to_hit - penalty,
            ac,
            crit_min,
            advantage,
            self.elven_accuracy,
        )
    }

    pub fn expected_damage(&self, ac: i32, crit_min: u8, advantage: Advantage, power: bool) -> f64 {
        let odds = self.odds(ac, crit_min, advantage, power);
        let bonus = if power && self.power_attack {
            POWER_ATTACK_BONUS
        } else {
            0.0
        };
        odds.hit * (self.dice + self.flat + bonus) + odds.crit * (self.dice + self.crit_extra)
    }
}

/// Once-per-turn damage added to the first weapon hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Rider {
    pub name: &'static str,
    pub dice: f64,
}

/// How GWM/Sharpshooter is used when evaluating a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAttackPolicy {
    Never,
    Always,
    /// Whichever yields more expected damage for the turn.
    Auto,
}

/// The pieces of a turn to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TurnShape {
    /// Number of Attack actions taken (Action Surge makes this 2).
    pub attack_actions: u8,
    /// Take the bonus action attack (requires an Attack action).
    pub bonus_attack: bool,
    /// Take the Haste action attack, if the profile has one.
    pub haste_attack: bool,
    /// Spend a slot of this level on Divine Smite.
    pub smite_slot: Option<u8>,
}

/// Every attack a build can make, given a set of active buffs.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackProfile {
    /// Attacks from one Attack action.
    pub action_attacks: Vec<Attack>,
    /// Bonus action attack, if the build has one.
    pub bonus_attacks: Vec<Attack>,
    /// Attacks granted by Haste.
    pub haste_attacks: Vec<Attack>,
    pub riders: Vec<Rider>,
    pub can_smite: bool,
    /// Highest slot level available for smiting.
    pub best_smite_slot: Option<u8>,
    /// Damage per round needing no attack roll.
    pub per_round_damage: f64,
    pub crit_min: u8,
    pub grants_advantage: bool,
}

/// Derived build state used while assembling attacks.
struct ProfileContext<'a> {
    build: &'a BuildConfiguration,
    scores: AbilityScores,
    proficiency: f64,
    to_hit_buff: f64,
    weapon_buff_dice: f64,
    any_buff_dice: f64,
    rage_bonus: f64,
    magic_weapon_bonus: f64,
    main_is_magic: bool,
    item_attack_bonus: f64,
    item_damage_bonus: f64,
    item_extra_dice: f64,
    ranged_damage_bonus: f64,
    power_melee: bool,
    power_ranged: bool,
    elven_accuracy: bool,
    hex_warrior: bool,
    monk_level: u8,
    paladin_level: u8,
    barbarian_level: u8,
    lifedrinker: bool,
}

fn avg(dice: Option<(u32, DieType)>) -> f64 {
    dice.map(|(count, die)| count as f64 * die.average())
        .unwrap_or(0.0)
}

fn martial_arts_die(monk_level: u8) -> DieType {
    match monk_level {
        0..=4 => DieType::D4,
        5..=10 => DieType::D6,
        11..=16 => DieType::D8,
        _ => DieType::D10,
    }
}

fn better(scores: &AbilityScores, a: Ability, b: Ability) -> Ability {
    if scores.get(b) > scores.get(a) {
        b
    } else {
        a
    }
}

impl ProfileContext<'_> {
    fn attack_ability(&self, weapon: &WeaponDefinition) -> Ability {
        let base = if weapon.is_ranged() {
            Ability::Dexterity
        } else if weapon.has(WeaponProperty::Finesse)
            || (self.monk_level > 0 && weapon.has(WeaponProperty::Monk))
        {
            better(&self.scores, Ability::Strength, Ability::Dexterity)
        } else {
            Ability::Strength
        };
        if self.hex_warrior {
            better(&self.scores, base, Ability::Charisma)
        } else {
            base
        }
    }

    fn weapon_attack(
        &self,
        weapon: &WeaponDefinition,
        source: AttackSource,
        damage_override: Option<&DiceExpression>,
    ) -> Attack {
        let build = self.build;
        let ability = self.attack_ability(weapon);
        let modifier = self.scores.modifier(ability) as f64;
        let melee = weapon.is_melee();
        let main_hand = matches!(
            source,
            AttackSource::MainHand | AttackSource::Haste | AttackSource::BonusAction
        );
        let off_hand_weapon = build.equipment.off_hand.is_some();
        let two_handed_grip = weapon.has(WeaponProperty::TwoHanded)
            || (weapon.has(WeaponProperty::Versatile)
                && !off_hand_weapon
                && build.equipment.shield.is_none());

        let damage = damage_override.unwrap_or(&weapon.damage);
        let mut dice = if melee
            && two_handed_grip
            && build.has_fighting_style(FightingStyle::GreatWeaponFighting)
        {
            damage.dice_average_rerolling_low()
        } else {
            damage.dice_average()
        };
        dice += self.weapon_buff_dice + self.any_buff_dice;
        if melee && self.paladin_level >= 11 {
            // Improved Divine Smite
            dice += DieType::D8.average();
        }

        let mut to_hit = self.proficiency + modifier + self.to_hit_buff;
        let mut flat = match source {
            AttackSource::OffHand
                if !build.has_fighting_style(FightingStyle::TwoWeaponFighting) =>
            {
                modifier.min(0.0)
            }
            _ => modifier,
        };

        if main_hand {
            to_hit += self.item_attack_bonus;
            flat += self.item_damage_bonus;
            dice += self.item_extra_dice;
        }
        if main_hand && !self.main_is_magic {
            to_hit += self.magic_weapon_bonus;
            flat += self.magic_weapon_bonus;
        }
        if weapon.is_ranged() {
            flat += self.ranged_damage_bonus;
            if build.has_fighting_style(FightingStyle::Archery) {
                to_hit += 2.0;
            }
        }
        if melee
            && !weapon.has(WeaponProperty::TwoHanded)
            && !off_hand_weapon
            && build.has_fighting_style(FightingStyle::Dueling)
        {
            flat += 2.0;
        }
        if melee && ability == Ability::Strength {
            flat += self.rage_bonus;
        }
        if melee && self.lifedrinker {
            flat += (self.scores.modifier(Ability::Charisma) as f64).max(1.0);
        }

        let crit_extra = if melee {
            let brutal = match self.barbarian_level {
                0..=8 => 0,
                9..=12 => 1,
                13..=16 => 2,
                _ => 3,
            };
            let die = damage
                .components
                .first()
                .map(|c| c.die_type.average())
                .unwrap_or(0.0);
            brutal as f64 * die
        } else {
            0.0
        };

        Attack {
            source,
            to_hit,
            dice,
            flat,
            crit_extra,
            power_attack: (self.power_melee && weapon.is_heavy_melee())
                || (self.power_ranged && weapon.is_ranged()),
            weapon: true,
            melee,
            elven_accuracy: self.elven_accuracy && ability != Ability::Strength,
        }
    }

    fn unarmed_attack(&self, source: AttackSource) -> Attack {
        let (ability, dice) = if self.monk_level > 0 {
            (
                better(&self.scores, Ability::Strength, Ability::Dexterity),
                martial_arts_die(self.monk_level).average(),
            )
        } else {
            (Ability::Strength, 0.0)
        };
        let modifier = self.scores.modifier(ability) as f64;
        let base_flat = if self.monk_level > 0 { 0.0 } else { 1.0 };
        let rage = if ability == Ability::Strength {
            self.rage_bonus
        } else {
            0.0
        };
        Attack {
            source,
            to_hit: self.proficiency + modifier + self.to_hit_buff,
            dice: dice + self.any_buff_dice + self.weapon_buff_dice,
            flat: base_flat + modifier + rage,
            crit_extra: 0.0,
            power_attack: false,
            weapon: true,
            melee: true,
            elven_accuracy: self.elven_accuracy && ability != Ability::Strength,
        }
    }

    fn eldritch_blast(&self, agonizing: bool) -> Attack {
        let cha = self.scores.modifier(Ability::Charisma) as f64;
        Attack {
            source: AttackSource::Cantrip,
            to_hit: self.proficiency + cha + self.to_hit_buff,
            dice: DieType::D10.average() + self.any_buff_dice,
            flat: if agonizing { cha } else { 0.0 },
            crit_extra: 0.0,
            power_attack: false,
            weapon: false,
            melee: false,
            elven_accuracy: self.elven_accuracy,
        }
    }
}

/// Eldritch Blast beams at a character level.
pub fn eldritch_blast_beams(character_level: u8) -> usize {
    1 + [5u8, 11, 17]
        .iter()
        .filter(|&&lvl| character_level >= lvl)
        .count()
}

impl AttackProfile {
    /// Build the profile for `build` with exactly `buffs` active.
    pub fn new(build: &BuildConfiguration, buffs: &BTreeSet<String>) -> Result<Self, DprError> {
        build.validate()?;
        let buff_defs = buffs
            .iter()
            .map(|id| get_buff(id).ok_or_else(|| BuildError::UnknownBuff(id.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let levels = build.class_levels();
        let level_of = |class: CharacterClass| levels.get(&class).copied().unwrap_or(0);
        let warlock_level = level_of(CharacterClass::Warlock);
        let barbarian_level = level_of(CharacterClass::Barbarian);
        let pact_blade = build.has_pact_boon(PACT_OF_THE_BLADE);

        let feats: Vec<FeatEffect> = build
            .feats()
            .iter()
            .filter_map(|id| get_feat(id))
            .map(|f| f.effect)
            .collect();
        let invocations: Vec<InvocationEffect> = build
            .invocations
            .iter()
            .filter_map(|id| get_invocation(id))
            .filter(|inv| warlock_level >= inv.min_warlock_level)
            .filter(|inv| inv.requires_pact.is_none_or(|p| build.has_pact_boon(p)))
            .map(|inv| inv.effect)
            .collect();
        let subclass_feature = |class: CharacterClass| {
            build
                .subclass(class)
                .and_then(get_subclass)
                .filter(|s| s.class == class && level_of(class) >= class.data().subclass_level)
                .and_then(|s| s.feature)
        };

        let items = build.active_magic_items();
        let main_hand = build.equipment.main_hand.as_deref().and_then(get_weapon);

        let rage_bonus = if barbarian_level > 0 && buff_defs.iter().any(|b| b.effect.rage) {
            rage_damage(barbarian_level) as f64
        } else {
            0.0
        };

        let ctx = ProfileContext {
            build,
            scores: build.effective_ability_scores(),
            proficiency: build.proficiency_bonus() as f64,
            to_hit_buff: buff_defs.iter().map(|b| b.effect.to_hit_bonus).sum(),
            weapon_buff_dice: buff_defs
                .iter()
                .map(|b| avg(b.effect.weapon_damage_dice))
                .sum(),
            any_buff_dice: buff_defs.iter().map(|b| avg(b.effect.any_damage_dice)).sum(),
            rage_bonus,
            magic_weapon_bonus: buff_defs
                .iter()
                .map(|b| b.effect.magic_weapon_bonus)
                .max()
                .unwrap_or(0) as f64,
            main_is_magic: items.iter().any(|i| i.is_weapon),
            item_attack_bonus: items.iter().map(|i| i.effect.attack_bonus).sum::<i32>() as f64,
            item_damage_bonus: items.iter().map(|i| i.effect.damage_bonus).sum::<i32>() as f64,
            item_extra_dice: items.iter().map(|i| avg(i.effect.extra_dice)).sum(),
            ranged_damage_bonus: items
                .iter()
                .map(|i| i.effect.ranged_damage_bonus)
                .sum::<i32>() as f64,
            power_melee: feats.contains(&FeatEffect::PowerAttack(PowerAttackKind::HeavyMelee)),
            power_ranged: feats.contains(&FeatEffect::PowerAttack(PowerAttackKind::Ranged)),
            elven_accuracy: feats.contains(&FeatEffect::ElvenAccuracy),
            hex_warrior: subclass_feature(CharacterClass::Warlock)
                == Some(SubclassFeature::HexWarrior),
            monk_level: level_of(CharacterClass::Monk),
            paladin_level: level_of(CharacterClass::Paladin),
            barbarian_level,
            lifedrinker: pact_blade && invocations.contains(&InvocationEffect::Lifedrinker),
        };

        let haste_count: usize = buff_defs
            .iter()
            .map(|b| b.effect.extra_weapon_attacks as usize)
            .sum();

        let action_attacks: Vec<Attack>;
        let mut bonus_attacks = Vec::new();
        let mut haste_attacks = Vec::new();

        match main_hand {
            Some(weapon) if weapon.is_spell() => {
                let agonizing = invocations.contains(&InvocationEffect::AgonizingBlast);
                let beam = ctx.eldritch_blast(agonizing);
                action_attacks = vec![beam; eldritch_blast_beams(build.total_level())];
            }
            _ => {
                let mut per_action = levels
                    .iter()
                    .map(|(class, lvl)| class.attacks_per_action(*lvl))
                    .max()
                    .unwrap_or(1);
                if warlock_level >= 5
                    && pact_blade
                    && invocations.contains(&InvocationEffect::ThirstingBlade)
                {
                    per_action = per_action.max(2);
                }
                let attack_with = |source| match main_hand {
                    Some(weapon) => ctx.weapon_attack(weapon, source, None),
                    None => ctx.unarmed_attack(source),
                };
                action_attacks = (0..per_action)
                    .map(|_| attack_with(AttackSource::MainHand))
                    .collect();
                haste_attacks = (0..haste_count)
                    .map(|_| attack_with(AttackSource::Haste))
                    .collect();

                let off_hand = build.equipment.off_hand.as_deref().and_then(get_weapon);
                if let Some(bonus) = Self::bonus_attack(&ctx, &feats, main_hand, off_hand) {
                    bonus_attacks.push(bonus);
                }
            }
        }

        let mut riders = Vec::new();
        let rogue_level = level_of(CharacterClass::Rogue);
        let sneak_weapon = main_hand.is_some_and(|w| {
            !w.is_spell() && (w.is_ranged() || w.has(WeaponProperty::Finesse))
        });
        if rogue_level > 0 && sneak_weapon {
            riders.push(Rider {
                name: "Sneak Attack",
                dice: rogue_level.div_ceil(2) as f64 * DieType::D6.average(),
            });
        }
        if level_of(CharacterClass::Ranger) >= 3
            && subclass_feature(CharacterClass::Ranger) == Some(SubclassFeature::ColossusSlayer)
        {
            riders.push(Rider {
                name: "Colossus Slayer",
                dice: DieType::D8.average(),
            });
        }

        let slots = build.spell_slots();
        let shared_best = (1..=9u8).rev().find(|lvl| slots[*lvl as usize - 1] > 0);
        let pact_best = build.pact_magic().map(|(_, lvl)| lvl);
        let best_smite_slot = shared_best.max(pact_best);

        let crit_min = match (
            subclass_feature(CharacterClass::Fighter),
            level_of(CharacterClass::Fighter),
        ) {
            (Some(SubclassFeature::ImprovedCritical), lvl) if lvl >= 15 => 18,
            (Some(SubclassFeature::ImprovedCritical), _) => 19,
            _ => 20,
        };

        Ok(Self {
            action_attacks,
            bonus_attacks,
            haste_attacks,
            riders,
            can_smite: ctx.paladin_level >= 2 && main_hand.is_some_and(|w| w.is_melee()),
            best_smite_slot,
            per_round_damage: buff_defs.iter().map(|b| b.effect.per_round_damage).sum(),
            crit_min,
            grants_advantage: buff_defs.iter().any(|b| b.effect.grants_advantage),
        })
    }

    /// Build the profile with the buffs a DPR configuration activates.
    pub fn for_config(build: &BuildConfiguration, config: &DprConfiguration) -> Result<Self, DprError> {
        let mut buffs = build.active_buffs.clone();
        if config.include_round0_buffs {
            buffs.extend(build.round0_buffs.iter().cloned());
        }
        Self::new(build, &buffs)
    }

    fn bonus_attack(
        ctx: &ProfileContext<'_>,
        feats: &[FeatEffect],
        main_hand: Option<&WeaponDefinition>,
        off_hand: Option<&WeaponDefinition>,
    ) -> Option<Attack> {
        if let Some(main) = main_hand {
            if feats.contains(&FeatEffect::PolearmMaster) && main.has(WeaponProperty::Polearm) {
                let butt_end = DiceExpression::dice(1, DieType::D4);
                return Some(ctx.weapon_attack(main, AttackSource::BonusAction, Some(&butt_end)));
            }
            if feats.contains(&FeatEffect::CrossbowExpert) && main.has(WeaponProperty::HandCrossbow)
            {
                return Some(ctx.weapon_attack(main, AttackSource::BonusAction, None));
            }
            if let Some(off) = off_hand {
                if main.has(WeaponProperty::Light) && off.has(WeaponProperty::Light) {
                    return Some(ctx.weapon_attack(off, AttackSource::OffHand, None));
                }
            }
        }
        let monk_weapon = main_hand.is_none_or(|w| w.has(WeaponProperty::Monk));
        if ctx.monk_level > 0 && monk_weapon {
            return Some(ctx.unarmed_attack(AttackSource::BonusAction));
        }
        None
    }

    /// The turn this profile takes every round in the steady state.
    pub fn steady_state_shape(&self, greedy_resource_use: bool) -> TurnShape {
        TurnShape {
            attack_actions: 1,
            bonus_attack: true,
            haste_attack: true,
            smite_slot: if greedy_resource_use && self.can_smite {
                self.best_smite_slot
            } else {
                None
            },
        }
    }

    /// Advantage after buffs that grant it.
    pub fn effective_advantage(&self, advantage: Advantage) -> Advantage {
        if self.grants_advantage {
            advantage.combine(Advantage::Advantage)
        } else {
            advantage
        }
    }

    /// Whether any attack in the profile can use GWM/Sharpshooter.
    pub fn has_power_attack(&self) -> bool {
        self.action_attacks
            .iter()
            .chain(&self.bonus_attacks)
            .chain(&self.haste_attacks)
            .any(|a| a.power_attack)
    }

    /// Expected damage of one turn.
    pub fn turn_damage(
        &self,
        shape: &TurnShape,
        ac: i32,
        advantage: Advantage,
        policy: PowerAttackPolicy,
    ) -> f64 {
        match policy {
            PowerAttackPolicy::Never => self.turn_damage_with(shape, ac, advantage, false),
            PowerAttackPolicy::Always => self.turn_damage_with(shape, ac, advantage, true),
            PowerAttackPolicy::Auto => self
                .turn_damage_with(shape, ac, advantage, false)
                .max(self.turn_damage_with(shape, ac, advantage, true)),
        }
    }

    fn turn_damage_with(&self, shape: &TurnShape, ac: i32, advantage: Advantage, power: bool) -> f64 {
        let advantage = self.effective_advantage(advantage);
        let mut attacks: Vec<&Attack> = Vec::new();
        for _ in 0..shape.attack_actions {
            attacks.extend(&self.action_attacks);
        }
        if shape.bonus_attack && shape.attack_actions > 0 {
            attacks.extend(&self.bonus_attacks);
        }
        if shape.haste_attack {
            attacks.extend(&self.haste_attacks);
        }

        let mut total = self.per_round_damage;
        let mut weapon_odds = Vec::new();
        let mut melee_odds = Vec::new();
        for attack in &attacks {
            total += attack.expected_damage(ac, self.crit_min, advantage, power);
            let odds = attack.odds(ac, self.crit_min, advantage, power);
            if attack.weapon {
                weapon_odds.push(odds);
                if attack.melee {
                    melee_odds.push(odds);
                }
            }
        }

        for rider in &self.riders {
            total += once_per_turn(&weapon_odds, rider.dice);
        }
        if let (true, Some(slot)) = (self.can_smite, shape.smite_slot) {
            total += once_per_turn(&melee_odds, smite_dice(slot));
        }
        total
    }
}

/// Expected Divine Smite dice for a slot level (2d8 + 1d8 per level above 1st, max 5d8).
pub fn smite_dice(slot_level: u8) -> f64 {
    (slot_level as u32 + 1).min(5) as f64 * DieType::D8.average()
}

/// Expected damage of dice added to the first hit in a sequence of attacks,
/// doubled when that hit is a critical.
fn once_per_turn(odds: &[AttackOdds], dice: f64) -> f64 {
    if odds.is_empty() {
        return 0.0;
    }
    let miss_all: f64 = odds.iter().map(|o| 1.0 - o.hit).product();
    let any_hit = 1.0 - miss_all;
    let hit_sum: f64 = odds.iter().map(|o| o.hit).sum();
    let crit_sum: f64 = odds.iter().map(|o| o.crit).sum();
    let crit_share = if hit_sum > 0.0 { crit_sum / hit_sum } else { 0.0 };
    any_hit * dice * (1.0 + crit_share)
}

fn power_attack_policy(config: &DprConfiguration) -> PowerAttackPolicy {
    if config.auto_gwm_ss {
        PowerAttackPolicy::Auto
    } else {
        PowerAttackPolicy::Always
    }
}

/// Steady-state DPR at one AC, as it appears on the curve for
/// `config.advantage_state`. The AC need not be inside the configured range.
pub fn dpr_at_ac(
    build: &BuildConfiguration,
    config: &DprConfiguration,
    ac: i32,
) -> Result<f64, DprError> {
    let profile = AttackProfile::for_config(build, config)?;
    let shape = profile.steady_state_shape(config.greedy_resource_use);
    Ok(profile.turn_damage(&shape, ac, config.advantage_state, power_attack_policy(config)))
}

/// Calculate DPR curves for a build.
pub fn calculate_dpr_curves(
    build: &BuildConfiguration,
    config: &DprConfiguration,
) -> Result<DprCurves, DprError> {
    config.validate()?;
    let profile = AttackProfile::for_config(build, config)?;
    let shape = profile.steady_state_shape(config.greedy_resource_use);
    let policy = power_attack_policy(config);

    let curve = |advantage: Advantage| -> Vec<DprPoint> {
        config
            .ac_values()
            .into_iter()
            .map(|ac| DprPoint {
                ac,
                dpr: profile.turn_damage(&shape, ac, advantage, policy),
            })
            .collect()
    };

    tracing::debug!(
        build = %build.id,
        attacks = profile.action_attacks.len(),
        ac_min = config.ac_min,
        ac_max = config.ac_max,
        "Calculated DPR curves"
    );

    Ok(DprCurves {
        normal_curve: curve(Advantage::Normal),
        advantage_curve: curve(Advantage::Advantage),
        disadvantage_curve: curve(Advantage::Disadvantage),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fighter(level: u8) -> BuildConfiguration {
        BuildConfiguration::new("Fighter")
            .with_levels(CharacterClass::Fighter, level)
            .with_main_hand("greatsword")
    }

    fn dpr_at(build: &BuildConfiguration, config: &DprConfiguration, ac: i32) -> f64 {
        calculate_dpr_curves(build, config)
            .unwrap()
            .dpr_at(Advantage::Normal, ac)
            .unwrap()
    }

    #[test]
    fn test_level_five_fighter_reference_value() {
        // +6 to hit vs AC 16: 55% hit, 5% crit; 2 x (0.55 * 10 + 0.05 * 7)
        let dpr = dpr_at(&fighter(5), &DprConfiguration::default(), 16);
        assert!((dpr - 11.7).abs() < 1e-9, "dpr was {dpr}");
    }

    #[test]
    fn test_curve_covers_range() {
        let config = DprConfiguration::default();
        let curves = calculate_dpr_curves(&fighter(5), &config).unwrap();
        assert_eq!(curves.normal_curve.len(), 21);
        assert_eq!(curves.normal_curve.first().unwrap().ac, 10);
        assert_eq!(curves.normal_curve.last().unwrap().ac, 30);
    }

    #[test]
    fn test_dpr_non_increasing_in_ac() {
        let build = fighter(11).with_feat_at(4, "gwm");
        let curves = calculate_dpr_curves(&build, &DprConfiguration::default()).unwrap();
        for pair in curves.normal_curve.windows(2) {
            assert!(pair[1].dpr <= pair[0].dpr + 1e-9);
        }
    }

    #[test]
    fn test_advantage_ordering() {
        let curves = calculate_dpr_curves(&fighter(5), &DprConfiguration::default()).unwrap();
        for ((n, a), d) in curves
            .normal_curve
            .iter()
            .zip(&curves.advantage_curve)
            .zip(&curves.disadvantage_curve)
        {
            assert!(a.dpr >= n.dpr && n.dpr >= d.dpr);
        }
    }

    #[test]
    fn test_auto_power_attack_dominates() {
        let build = fighter(8).with_feat_at(4, "gwm");
        let auto = DprConfiguration::default();
        let always = DprConfiguration::default().with_auto_gwm_ss(false);
        for ac in [12, 16, 20, 24] {
            let with_auto = dpr_at(&build, &auto, ac);
            assert!(with_auto + 1e-9 >= dpr_at(&build, &always, ac));
            assert!(with_auto + 1e-9 >= dpr_at(&fighter(8), &auto, ac));
        }
    }

    #[test]
    fn test_haste_adds_an_attack() {
        let hasted = fighter(5).with_buff("haste");
        let dpr = dpr_at(&hasted, &DprConfiguration::default(), 16);
        assert!((dpr - 17.55).abs() < 1e-9, "dpr was {dpr}");
    }

    #[test]
    fn test_bless_increases_dpr() {
        let config = DprConfiguration::default();
        assert!(dpr_at(&fighter(5).with_buff("bless"), &config, 16) > dpr_at(&fighter(5), &config, 16));
    }

    #[test]
    fn test_round0_buffs_respect_flag() {
        let build = fighter(5).with_round0_buff("haste");
        let with = dpr_at(&build, &DprConfiguration::default(), 16);
        let without = dpr_at(&build, &DprConfiguration::default().with_round0_buffs(false), 16);
        assert!(with > without);
        assert!((without - 11.7).abs() < 1e-9);
    }

    #[test]
    fn test_eldritch_blast_beams() {
        let warlock = BuildConfiguration::new("Lock")
            .with_ability_scores(AbilityScores::new(8, 14, 14, 10, 12, 18))
            .with_levels(CharacterClass::Warlock, 5)
            .with_main_hand("eldritch-blast")
            .with_invocation("agonizing-blast");
        let profile = AttackProfile::for_config(&warlock, &DprConfiguration::default()).unwrap();
        assert_eq!(profile.action_attacks.len(), 2);
        assert_eq!(profile.action_attacks[0].flat, 4.0);
        assert!(profile.bonus_attacks.is_empty());
    }

    #[test]
    fn test_sneak_attack_needs_finesse_or_ranged() {
        let rogue = BuildConfiguration::new("Rogue")
            .with_levels(CharacterClass::Rogue, 5)
            .with_main_hand("rapier");
        let profile = AttackProfile::for_config(&rogue, &DprConfiguration::default()).unwrap();
        assert_eq!(profile.riders.len(), 1);
        assert_eq!(profile.riders[0].dice, 10.5);

        let clumsy = rogue.clone().with_main_hand("greataxe");
        let profile = AttackProfile::for_config(&clumsy, &DprConfiguration::default()).unwrap();
        assert!(profile.riders.is_empty());
    }

    #[test]
    fn test_greedy_smite() {
        let paladin = BuildConfiguration::new("Paladin")
            .with_levels(CharacterClass::Paladin, 5)
            .with_main_hand("longsword");
        let greedy = dpr_at(&paladin, &DprConfiguration::default(), 16);
        let frugal = dpr_at(
            &paladin,
            &DprConfiguration::default().with_greedy_resource_use(false),
            16,
        );
        assert!(greedy > frugal);
    }

    #[test]
    fn test_champion_crit_range() {
        let champion = fighter(15).with_subclass(CharacterClass::Fighter, "champion");
        let profile = AttackProfile::for_config(&champion, &DprConfiguration::default()).unwrap();
        assert_eq!(profile.crit_min, 18);
    }

    #[test]
    fn test_polearm_master_bonus_attack() {
        let build = BuildConfiguration::new("Pam")
            .with_levels(CharacterClass::Fighter, 4)
            .with_main_hand("glaive")
            .with_feat_at(4, "polearm-master");
        let profile = AttackProfile::for_config(&build, &DprConfiguration::default()).unwrap();
        assert_eq!(profile.bonus_attacks.len(), 1);
        assert_eq!(profile.bonus_attacks[0].dice, 2.5);
    }

    #[test]
    fn test_faerie_fire_grants_advantage() {
        let build = fighter(5).with_buff("faerie-fire");
        let curves = calculate_dpr_curves(&build, &DprConfiguration::default()).unwrap();
        assert_eq!(curves.normal_curve, curves.advantage_curve);
    }

    #[test]
    fn test_dpr_at_ac_matches_curve() {
        let build = fighter(11).with_feat_at(4, "gwm");
        let config = DprConfiguration::default().with_advantage(Advantage::Advantage);
        let curves = calculate_dpr_curves(&build, &config).unwrap();
        let point = dpr_at_ac(&build, &config, 18).unwrap();
        assert_eq!(Some(point), curves.dpr_at(Advantage::Advantage, 18));
    }

    #[test]
    fn test_invalid_range() {
        let config = DprConfiguration {
            ac_step: 0,
            ..Default::default()
        };
        assert!(matches!(
            calculate_dpr_curves(&fighter(1), &config),
            Err(DprError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_contains_ac() {
        let config = DprConfiguration {
            ac_min: 10,
            ac_max: 20,
            ac_step: 2,
            ..Default::default()
        };
        assert!(config.contains_ac(16));
        assert!(!config.contains_ac(15));
        assert!(!config.contains_ac(22));
        assert!(DprConfiguration::centered_on(16).contains_ac(16));
    }
}
