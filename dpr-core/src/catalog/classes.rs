//! D&D 5e class data used by the DPR math and the level path optimizer.
//!
//! Contains hit dice, extra attack breakpoints, caster progression, ASI
//! levels and multiclass prerequisites for all 12 PHB classes, plus the
//! handful of subclasses whose features change damage output.

use crate::build::Ability;
use crate::dice::DieType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The 12 PHB classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

/// How a class contributes to spell slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasterProgression {
    None,
    Full,
    Half,
    /// Warlock pact magic, tracked separately from the shared slot table.
    Pact,
}

/// Ability score requirement for multiclassing into or out of a class.
#[derive(Debug, Clone, Copy)]
pub enum Prerequisite {
    /// Every listed ability must be at least 13.
    All(&'static [Ability]),
    /// At least one listed ability must be at least 13.
    Any(&'static [Ability]),
}

/// Minimum score demanded by multiclass prerequisites.
pub const MULTICLASS_MINIMUM: u8 = 13;

impl Prerequisite {
    pub fn is_met(&self, scores: &crate::build::AbilityScores) -> bool {
        match self {
            Prerequisite::All(abilities) => abilities
                .iter()
                .all(|a| scores.get(*a) >= MULTICLASS_MINIMUM),
            Prerequisite::Any(abilities) => abilities
                .iter()
                .any(|a| scores.get(*a) >= MULTICLASS_MINIMUM),
        }
    }
}

/// Class-specific data consumed by the calculators.
#[derive(Debug, Clone)]
pub struct ClassData {
    pub class: CharacterClass,
    pub hit_die: DieType,
    /// Class levels at which the Attack action gains one more attack.
    pub extra_attack_levels: &'static [u8],
    pub caster: CasterProgression,
    /// Class levels that grant an ability score improvement or feat.
    pub asi_levels: &'static [u8],
    pub multiclass_prerequisite: Prerequisite,
    /// Ability used for the class's spell attacks and save DCs.
    pub spellcasting_ability: Option<Ability>,
    /// Level at which a fighting style is chosen, if ever.
    pub fighting_style_level: Option<u8>,
    /// Level at which the subclass is chosen.
    pub subclass_level: u8,
}

const STANDARD_ASI: &[u8] = &[4, 8, 12, 16, 19];

impl CharacterClass {
    /// Get class data.
    pub fn data(&self) -> ClassData {
        match self {
            CharacterClass::Barbarian => ClassData {
                class: *self,
                hit_die: DieType::D12,
                extra_attack_levels: &[5],
                caster: CasterProgression::None,
                asi_levels: STANDARD_ASI,
                multiclass_prerequisite: Prerequisite::All(&[Ability::Strength]),
                spellcasting_ability: None,
                fighting_style_level: None,
                subclass_level: 3,
            },
            CharacterClass::Bard => ClassData {
                class: *self,
                hit_die: DieType::D8,
                extra_attack_levels: &[],
                caster: CasterProgression::Full,
                asi_levels: STANDARD_ASI,
                multiclass_prerequisite: Prerequisite::All(&[Ability::Charisma]),
                spellcasting_ability: Some(Ability::Charisma),
                fighting_style_level: None,
                subclass_level: 3,
            },
            CharacterClass::Cleric => ClassData {
                class: *self,
                hit_die: DieType::D8,
                extra_attack_levels: &[],
                caster: CasterProgression::Full,
                asi_levels: STANDARD_ASI,
                multiclass_prerequisite: Prerequisite::All(&[Ability::Wisdom]),
                spellcasting_ability: Some(Ability::Wisdom),
                fighting_style_level: None,
                subclass_level: 1,
            },
            CharacterClass::Druid => ClassData {
                class: *self,
                hit_die: DieType::D8,
                extra_attack_levels: &[],
                caster: CasterProgression::Full,
                asi_levels: STANDARD_ASI,
                multiclass_prerequisite: Prerequisite::All(&[Ability::Wisdom]),
                spellcasting_ability: Some(Ability::Wisdom),
                fighting_style_level: None,
                subclass_level: 2,
            },
            CharacterClass::Fighter => ClassData {
                class: *self,
                hit_die: DieType::D10,
                extra_attack_levels: &[5, 11, 20],
                caster: CasterProgression::None,
                asi_levels: &[4, 6, 8, 12, 14, 16, 19],
                multiclass_prerequisite: Prerequisite::Any(&[Ability::Strength, Ability::Dexterity]),
                spellcasting_ability: None,
                fighting_style_level: Some(1),
                subclass_level: 3,
            },
            CharacterClass::Monk => ClassData {
                class: *self,
                hit_die: DieType::D8,
                extra_attack_levels: &[5],
                caster: CasterProgression::None,
                asi_levels: STANDARD_ASI,
                multiclass_prerequisite: Prerequisite::All(&[Ability::Dexterity, Ability::Wisdom]),
                spellcasting_ability: None,
                fighting_style_level: None,
                subclass_level: 3,
            },
            CharacterClass::Paladin => ClassData {
                class: *self,
                hit_die: DieType::D10,
                extra_attack_levels: &[5],
                caster: CasterProgression::Half,
                asi_levels: STANDARD_ASI,
                multiclass_prerequisite: Prerequisite::All(&[Ability::Strength, Ability::Charisma]),
                spellcasting_ability: Some(Ability::Charisma),
                fighting_style_level: Some(2),
                subclass_level: 3,
            },
            CharacterClass::Ranger => ClassData {
                class: *self,
                hit_die: DieType::D10,
                extra_attack_levels: &[5],
                caster: CasterProgression::Half,
                asi_levels: STANDARD_ASI,
                multiclass_prerequisite: Prerequisite::All(&[Ability::Dexterity, Ability::Wisdom]),
                spellcasting_ability: Some(Ability::Wisdom),
                fighting_style_level: Some(2),
                subclass_level: 3,
            },
            CharacterClass::Rogue => ClassData {
                class: *self,
                hit_die: DieType::D8,
                extra_attack_levels: &[],
                caster: CasterProgression::None,
                asi_levels: &[4, 8, 10, 12, 16, 19],
                multiclass_prerequisite: Prerequisite::All(&[Ability::Dexterity]),
                spellcasting_ability: None,
                fighting_style_level: None,
                subclass_level: 3,
            },
            CharacterClass::Sorcerer => ClassData {
                class: *self,
                hit_die: DieType::D6,
                extra_attack_levels: &[],
                caster: CasterProgression::Full,
                asi_levels: STANDARD_ASI,
                multiclass_prerequisite: Prerequisite::All(&[Ability::Charisma]),
                spellcasting_ability: Some(Ability::Charisma),
                fighting_style_level: None,
                subclass_level: 1,
            },
            CharacterClass::Warlock => ClassData {
                class: *self,
                hit_die: DieType::D8,
                extra_attack_levels: &[],
                caster: CasterProgression::Pact,
                asi_levels: STANDARD_ASI,
                multiclass_prerequisite: Prerequisite::All(&[Ability::Charisma]),
                spellcasting_ability: Some(Ability::Charisma),
                fighting_style_level: None,
                subclass_level: 1,
            },
            CharacterClass::Wizard => ClassData {
                class: *self,
                hit_die: DieType::D6,
                extra_attack_levels: &[],
                caster: CasterProgression::Full,
                asi_levels: STANDARD_ASI,
                multiclass_prerequisite: Prerequisite::All(&[Ability::Intelligence]),
                spellcasting_ability: Some(Ability::Intelligence),
                fighting_style_level: None,
                subclass_level: 2,
            },
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "barbarian",
            CharacterClass::Bard => "bard",
            CharacterClass::Cleric => "cleric",
            CharacterClass::Druid => "druid",
            CharacterClass::Fighter => "fighter",
            CharacterClass::Monk => "monk",
            CharacterClass::Paladin => "paladin",
            CharacterClass::Ranger => "ranger",
            CharacterClass::Rogue => "rogue",
            CharacterClass::Sorcerer => "sorcerer",
            CharacterClass::Warlock => "warlock",
            CharacterClass::Wizard => "wizard",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "Barbarian",
            CharacterClass::Bard => "Bard",
            CharacterClass::Cleric => "Cleric",
            CharacterClass::Druid => "Druid",
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Monk => "Monk",
            CharacterClass::Paladin => "Paladin",
            CharacterClass::Ranger => "Ranger",
            CharacterClass::Rogue => "Rogue",
            CharacterClass::Sorcerer => "Sorcerer",
            CharacterClass::Warlock => "Warlock",
            CharacterClass::Wizard => "Wizard",
        }
    }

    pub fn all() -> &'static [CharacterClass] {
        &[
            CharacterClass::Barbarian,
            CharacterClass::Bard,
            CharacterClass::Cleric,
            CharacterClass::Druid,
            CharacterClass::Fighter,
            CharacterClass::Monk,
            CharacterClass::Paladin,
            CharacterClass::Ranger,
            CharacterClass::Rogue,
            CharacterClass::Sorcerer,
            CharacterClass::Warlock,
            CharacterClass::Wizard,
        ]
    }

    /// Look up a class by its catalog id (case-insensitive).
    pub fn from_id(id: &str) -> Option<CharacterClass> {
        let id = id.trim().to_lowercase();
        Self::all().iter().copied().find(|c| c.id() == id)
    }

    /// Attacks granted by one Attack action at the given class level.
    pub fn attacks_per_action(&self, class_level: u8) -> u8 {
        1 + self
            .data()
            .extra_attack_levels
            .iter()
            .filter(|&&lvl| class_level >= lvl)
            .count() as u8
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Look up a class definition by id.
pub fn get_class(id: &str) -> Option<ClassData> {
    CharacterClass::from_id(id).map(|c| c.data())
}

/// Subclass features that change damage output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubclassFeature {
    /// Critical hits on 19-20 from level 3, 18-20 from level 15.
    ImprovedCritical,
    /// Once per turn +1d8 against a wounded target.
    ColossusSlayer,
    /// Charisma for pact weapon attacks.
    HexWarrior,
}

#[derive(Debug, Clone)]
pub struct SubclassData {
    pub id: &'static str,
    pub name: &'static str,
    pub class: CharacterClass,
    pub feature: Option<SubclassFeature>,
}

lazy_static::lazy_static! {
    /// Subclasses known to the calculators. Unlisted subclass ids are
    /// accepted and contribute nothing.
    pub static ref SUBCLASSES: Vec<SubclassData> = vec![
        SubclassData { id: "champion", name: "Champion", class: CharacterClass::Fighter, feature: Some(SubclassFeature::ImprovedCritical) },
        SubclassData { id: "battle-master", name: "Battle Master", class: CharacterClass::Fighter, feature: None },
        SubclassData { id: "hunter", name: "Hunter", class: CharacterClass::Ranger, feature: Some(SubclassFeature::ColossusSlayer) },
        SubclassData { id: "hexblade", name: "The Hexblade", class: CharacterClass::Warlock, feature: Some(SubclassFeature::HexWarrior) },
        SubclassData { id: "berserker", name: "Path of the Berserker", class: CharacterClass::Barbarian, feature: None },
        SubclassData { id: "devotion", name: "Oath of Devotion", class: CharacterClass::Paladin, feature: None },
        SubclassData { id: "assassin", name: "Assassin", class: CharacterClass::Rogue, feature: None },
    ];
}

/// Look up a subclass by id.
pub fn get_subclass(id: &str) -> Option<&'static SubclassData> {
    let id = id.trim().to_lowercase();
    SUBCLASSES.iter().find(|s| s.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::AbilityScores;

    #[test]
    fn test_class_lookup() {
        assert_eq!(
            CharacterClass::from_id("Fighter"),
            Some(CharacterClass::Fighter)
        );
        assert!(get_class("artificer").is_none());
        assert_eq!(get_class("wizard").unwrap().hit_die, DieType::D6);
    }

    #[test]
    fn test_attacks_per_action() {
        assert_eq!(CharacterClass::Fighter.attacks_per_action(4), 1);
        assert_eq!(CharacterClass::Fighter.attacks_per_action(5), 2);
        assert_eq!(CharacterClass::Fighter.attacks_per_action(11), 3);
        assert_eq!(CharacterClass::Fighter.attacks_per_action(20), 4);
        assert_eq!(CharacterClass::Paladin.attacks_per_action(20), 2);
        assert_eq!(CharacterClass::Wizard.attacks_per_action(20), 1);
    }

    #[test]
    fn test_multiclass_prerequisites() {
        let scores = AbilityScores::new(15, 12, 14, 10, 13, 8);
        assert!(CharacterClass::Fighter.data().multiclass_prerequisite.is_met(&scores));
        assert!(!CharacterClass::Paladin.data().multiclass_prerequisite.is_met(&scores));
        assert!(!CharacterClass::Ranger.data().multiclass_prerequisite.is_met(&scores));
        assert!(CharacterClass::Cleric.data().multiclass_prerequisite.is_met(&scores));
    }

    #[test]
    fn test_subclass_lookup() {
        let champion = get_subclass("champion").unwrap();
        assert_eq!(champion.class, CharacterClass::Fighter);
        assert_eq!(champion.feature, Some(SubclassFeature::ImprovedCritical));
    }
}
