//! Buffs: spells and class features that modify attacks while active.
//!
//! A buff in a build's `activeBuffs` always applies to the DPR math, no
//! matter who cast it. The combat optimizer only casts buffs the build
//! itself can provide, as listed in `sources`.

use crate::catalog::CharacterClass;
use crate::dice::DieType;

/// What it costs to bring a buff up in combat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastTime {
    Action,
    BonusAction,
}

#[derive(Debug, Clone, Default)]
pub struct BuffEffect {
    /// Expected bonus to attack rolls (Bless adds 1d4, i.e. 2.5).
    pub to_hit_bonus: f64,
    /// Extra dice on every weapon hit.
    pub weapon_damage_dice: Option<(u32, DieType)>,
    /// Extra dice on every hit, weapon or spell.
    pub any_damage_dice: Option<(u32, DieType)>,
    /// Additional weapon attacks each round.
    pub extra_weapon_attacks: u8,
    /// Attack rolls are made with advantage.
    pub grants_advantage: bool,
    /// Barbarian rage damage on Strength melee attacks.
    pub rage: bool,
    /// Bonus to hit and damage for a nonmagical weapon.
    pub magic_weapon_bonus: i32,
    /// Expected damage per round to a single target with no attack roll.
    pub per_round_damage: f64,
}

#[derive(Debug, Clone)]
pub struct BuffDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub concentration: bool,
    /// Spell slot level consumed, `None` for class features.
    pub slot_level: Option<u8>,
    pub cast_time: CastTime,
    /// Classes that can provide the buff, with the class level required.
    pub sources: &'static [(CharacterClass, u8)],
    /// Uses per combat for non-spell features.
    pub uses_per_combat: Option<u8>,
    pub effect: BuffEffect,
    /// Value of the battlefield control it provides, weighted by control priority.
    pub control_value: f64,
    /// Value of the protection it provides, weighted by survivability priority.
    pub survivability_value: f64,
    /// Whether it hinders the target (reported as a debuff in round plans).
    pub debuff: bool,
}

impl BuffDefinition {
    /// Whether a build with `class` at `class_level` can provide this buff.
    pub fn available_to(&self, class: CharacterClass, class_level: u8) -> bool {
        self.sources
            .iter()
            .any(|(c, lvl)| *c == class && class_level >= *lvl)
    }
}

lazy_static::lazy_static! {
    pub static ref BUFFS: Vec<BuffDefinition> = vec![
        BuffDefinition {
            id: "bless",
            name: "Bless",
            concentration: true,
            slot_level: Some(1),
            cast_time: CastTime::Action,
            sources: &[(CharacterClass::Cleric, 1), (CharacterClass::Paladin, 2)],
            uses_per_combat: None,
            effect: BuffEffect { to_hit_bonus: 2.5, ..Default::default() },
            control_value: 0.0,
            survivability_value: 1.0,
            debuff: false,
        },
        BuffDefinition {
            id: "haste",
            name: "Haste",
            concentration: true,
            slot_level: Some(3),
            cast_time: CastTime::Action,
            sources: &[(CharacterClass::Sorcerer, 5), (CharacterClass::Wizard, 5)],
            uses_per_combat: None,
            effect: BuffEffect { extra_weapon_attacks: 1, ..Default::default() },
            control_value: 0.0,
            survivability_value: 2.0,
            debuff: false,
        },
        BuffDefinition {
            id: "hunters-mark",
            name: "Hunter's Mark",
            concentration: true,
            slot_level: Some(1),
            cast_time: CastTime::BonusAction,
            sources: &[(CharacterClass::Ranger, 2)],
            uses_per_combat: None,
            effect: BuffEffect { weapon_damage_dice: Some((1, DieType::D6)), ..Default::default() },
            control_value: 0.0,
            survivability_value: 0.0,
            debuff: true,
        },
        BuffDefinition {
            id: "hex",
            name: "Hex",
            concentration: true,
            slot_level: Some(1),
            cast_time: CastTime::BonusAction,
            sources: &[(CharacterClass::Warlock, 1)],
            uses_per_combat: None,
            effect: BuffEffect { any_damage_dice: Some((1, DieType::D6)), ..Default::default() },
            control_value: 0.5,
            survivability_value: 0.0,
            debuff: true,
        },
        BuffDefinition {
            id: "divine-favor",
            name: "Divine Favor",
            concentration: true,
            slot_level: Some(1),
            cast_time: CastTime::BonusAction,
            sources: &[(CharacterClass::Paladin, 2)],
            uses_per_combat: None,
            effect: BuffEffect { weapon_damage_dice: Some((1, DieType::D4)), ..Default::default() },
            control_value: 0.0,
            survivability_value: 0.0,
            debuff: false,
        },
        BuffDefinition {
            id: "enlarge",
            name: "Enlarge/Reduce",
            concentration: true,
            slot_level: Some(2),
            cast_time: CastTime::Action,
            sources: &[(CharacterClass::Sorcerer, 3), (CharacterClass::Wizard, 3)],
            uses_per_combat: None,
            effect: BuffEffect { weapon_damage_dice: Some((1, DieType::D4)), ..Default::default() },
            control_value: 0.0,
            survivability_value: 0.5,
            debuff: false,
        },
        BuffDefinition {
            id: "spirit-guardians",
            name: "Spirit Guardians",
            concentration: true,
            slot_level: Some(3),
            cast_time: CastTime::Action,
            sources: &[(CharacterClass::Cleric, 5)],
            uses_per_combat: None,
            // 3d8 radiant, half on a save, assuming an even save chance.
            effect: BuffEffect { per_round_damage: 13.5 * 0.75, ..Default::default() },
            control_value: 1.5,
            survivability_value: 0.5,
            debuff: true,
        },
        BuffDefinition {
            id: "faerie-fire",
            name: "Faerie Fire",
            concentration: true,
            slot_level: Some(1),
            cast_time: CastTime::Action,
            sources: &[(CharacterClass::Bard, 1), (CharacterClass::Druid, 1)],
            uses_per_combat: None,
            effect: BuffEffect { grants_advantage: true, ..Default::default() },
            control_value: 1.0,
            survivability_value: 0.0,
            debuff: true,
        },
        BuffDefinition {
            id: "magic-weapon",
            name: "Magic Weapon",
            concentration: true,
            slot_level: Some(2),
            cast_time: CastTime::BonusAction,
            sources: &[(CharacterClass::Paladin, 5), (CharacterClass::Wizard, 3)],
            uses_per_combat: None,
            effect: BuffEffect { magic_weapon_bonus: 1, ..Default::default() },
            control_value: 0.0,
            survivability_value: 0.0,
            debuff: false,
        },
        BuffDefinition {
            id: "rage",
            name: "Rage",
            concentration: false,
            slot_level: None,
            cast_time: CastTime::BonusAction,
            sources: &[(CharacterClass::Barbarian, 1)],
            uses_per_combat: Some(1),
            effect: BuffEffect { rage: true, ..Default::default() },
            control_value: 0.0,
            survivability_value: 3.0,
            debuff: false,
        },
    ];
}

/// Look up a buff by id.
pub fn get_buff(id: &str) -> Option<&'static BuffDefinition> {
    let id = id.trim().to_lowercase();
    BUFFS.iter().find(|b| b.id == id)
}

/// Rage damage bonus at a barbarian level.
pub fn rage_damage(barbarian_level: u8) -> i32 {
    match barbarian_level {
        0 => 0,
        1..=8 => 2,
        9..=15 => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buff_lookup() {
        let haste = get_buff("haste").unwrap();
        assert!(haste.concentration);
        assert_eq!(haste.effect.extra_weapon_attacks, 1);
        assert!(get_buff("wish").is_none());
    }

    #[test]
    fn test_buff_availability() {
        let hm = get_buff("hunters-mark").unwrap();
        assert!(hm.available_to(CharacterClass::Ranger, 2));
        assert!(!hm.available_to(CharacterClass::Ranger, 1));
        assert!(!hm.available_to(CharacterClass::Fighter, 20));
    }

    #[test]
    fn test_rage_damage_scaling() {
        assert_eq!(rage_damage(1), 2);
        assert_eq!(rage_damage(9), 3);
        assert_eq!(rage_damage(16), 4);
    }
}
