//! Weapon and magic item database.
//!
//! Weapons are referenced by id from a build's `mainHand`/`offHand` slots;
//! magic items by id from `magicItems` (and `attunedItems` when the item
//! requires attunement).

use crate::build::Ability;
use crate::dice::{DiceExpression, DieType};

/// Weapon properties that matter for damage calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeaponProperty {
    Finesse,
    Light,
    Heavy,
    TwoHanded,
    Versatile,
    Reach,
    Ranged,
    /// Eligible for the Polearm Master butt-end attack.
    Polearm,
    /// Eligible for Crossbow Expert's bonus action shot.
    HandCrossbow,
    /// A spell attack (Eldritch Blast) modelled as a weapon slot.
    Spell,
    /// Counts as a monk weapon.
    Monk,
}

/// A weapon definition.
#[derive(Debug, Clone)]
pub struct WeaponDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub damage: DiceExpression,
    pub properties: Vec<WeaponProperty>,
}

impl WeaponDefinition {
    pub fn new(id: &'static str, name: &'static str, count: u32, die: DieType) -> Self {
        Self {
            id,
            name,
            damage: DiceExpression::dice(count, die),
            properties: Vec::new(),
        }
    }

    pub fn with_properties(mut self, properties: Vec<WeaponProperty>) -> Self {
        self.properties = properties;
        self
    }

    pub fn has(&self, property: WeaponProperty) -> bool {
        self.properties.contains(&property)
    }

    pub fn is_ranged(&self) -> bool {
        self.has(WeaponProperty::Ranged)
    }

    pub fn is_spell(&self) -> bool {
        self.has(WeaponProperty::Spell)
    }

    pub fn is_melee(&self) -> bool {
        !self.is_ranged() && !self.is_spell()
    }

    /// Melee weapon that benefits from Great Weapon Fighting and Great Weapon Master.
    pub fn is_heavy_melee(&self) -> bool {
        self.is_melee() && self.has(WeaponProperty::Heavy)
    }
}

/// Get a weapon by id.
pub fn get_weapon(id: &str) -> Option<&'static WeaponDefinition> {
    let id = id.trim().to_lowercase();
    WEAPONS.iter().find(|w| w.id == id)
}

// ============================================================================
// Weapons
// ============================================================================

lazy_static::lazy_static! {
    /// Standard D&D 5e weapons (damage-relevant subset).
    pub static ref WEAPONS: Vec<WeaponDefinition> = vec![
        // Simple Melee Weapons
        WeaponDefinition::new("dagger", "Dagger", 1, DieType::D4)
            .with_properties(vec![WeaponProperty::Finesse, WeaponProperty::Light, WeaponProperty::Monk]),
        WeaponDefinition::new("handaxe", "Handaxe", 1, DieType::D6)
            .with_properties(vec![WeaponProperty::Light, WeaponProperty::Monk]),
        WeaponDefinition::new("quarterstaff", "Quarterstaff", 1, DieType::D6)
            .with_properties(vec![WeaponProperty::Versatile, WeaponProperty::Polearm, WeaponProperty::Monk]),
        WeaponDefinition::new("spear", "Spear", 1, DieType::D6)
            .with_properties(vec![WeaponProperty::Versatile, WeaponProperty::Polearm, WeaponProperty::Monk]),
        // Martial Melee Weapons
        WeaponDefinition::new("shortsword", "Shortsword", 1, DieType::D6)
            .with_properties(vec![WeaponProperty::Finesse, WeaponProperty::Light, WeaponProperty::Monk]),
        WeaponDefinition::new("scimitar", "Scimitar", 1, DieType::D6)
            .with_properties(vec![WeaponProperty::Finesse, WeaponProperty::Light]),
        WeaponDefinition::new("rapier", "Rapier", 1, DieType::D8)
            .with_properties(vec![WeaponProperty::Finesse]),
        WeaponDefinition::new("longsword", "Longsword", 1, DieType::D8)
            .with_properties(vec![WeaponProperty::Versatile]),
        WeaponDefinition::new("battleaxe", "Battleaxe", 1, DieType::D8)
            .with_properties(vec![WeaponProperty::Versatile]),
        WeaponDefinition::new("warhammer", "Warhammer", 1, DieType::D8)
            .with_properties(vec![WeaponProperty::Versatile]),
        WeaponDefinition::new("greatsword", "Greatsword", 2, DieType::D6)
            .with_properties(vec![WeaponProperty::Heavy, WeaponProperty::TwoHanded]),
        WeaponDefinition::new("greataxe", "Greataxe", 1, DieType::D12)
            .with_properties(vec![WeaponProperty::Heavy, WeaponProperty::TwoHanded]),
        WeaponDefinition::new("maul", "Maul", 2, DieType::D6)
            .with_properties(vec![WeaponProperty::Heavy, WeaponProperty::TwoHanded]),
        WeaponDefinition::new("glaive", "Glaive", 1, DieType::D10)
            .with_properties(vec![WeaponProperty::Heavy, WeaponProperty::TwoHanded, WeaponProperty::Reach, WeaponProperty::Polearm]),
        WeaponDefinition::new("halberd", "Halberd", 1, DieType::D10)
            .with_properties(vec![WeaponProperty::Heavy, WeaponProperty::TwoHanded, WeaponProperty::Reach, WeaponProperty::Polearm]),
        // Ranged Weapons
        WeaponDefinition::new("shortbow", "Shortbow", 1, DieType::D6)
            .with_properties(vec![WeaponProperty::Ranged, WeaponProperty::TwoHanded]),
        WeaponDefinition::new("longbow", "Longbow", 1, DieType::D8)
            .with_properties(vec![WeaponProperty::Ranged, WeaponProperty::Heavy, WeaponProperty::TwoHanded]),
        WeaponDefinition::new("hand-crossbow", "Hand Crossbow", 1, DieType::D6)
            .with_properties(vec![WeaponProperty::Ranged, WeaponProperty::Light, WeaponProperty::HandCrossbow]),
        WeaponDefinition::new("heavy-crossbow", "Heavy Crossbow", 1, DieType::D10)
            .with_properties(vec![WeaponProperty::Ranged, WeaponProperty::Heavy, WeaponProperty::TwoHanded]),
        // Cantrips used as a primary attack
        WeaponDefinition::new("eldritch-blast", "Eldritch Blast", 1, DieType::D10)
            .with_properties(vec![WeaponProperty::Spell]),
    ];
}

// ============================================================================
// Magic Items
// ============================================================================

/// What a magic item does to the wielder's attacks.
#[derive(Debug, Clone, Default)]
pub struct MagicItemEffect {
    /// Bonus to attack rolls with the main-hand weapon.
    pub attack_bonus: i32,
    /// Flat bonus to damage with the main-hand weapon.
    pub damage_bonus: i32,
    /// Extra damage dice on each main-hand hit.
    pub extra_dice: Option<(u32, DieType)>,
    /// Flat damage bonus for ranged weapon attacks only.
    pub ranged_damage_bonus: i32,
    /// Sets an ability score to this value if it is lower.
    pub sets_ability: Option<(Ability, u8)>,
}

#[derive(Debug, Clone)]
pub struct MagicItemDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub requires_attunement: bool,
    /// Whether the item is a magic weapon (Magic Weapon spell has no effect on it).
    pub is_weapon: bool,
    pub effect: MagicItemEffect,
}

/// Get a magic item by id.
pub fn get_magic_item(id: &str) -> Option<&'static MagicItemDefinition> {
    let id = id.trim().to_lowercase();
    MAGIC_ITEMS.iter().find(|i| i.id == id)
}

fn plus_weapon(id: &'static str, name: &'static str, bonus: i32) -> MagicItemDefinition {
    MagicItemDefinition {
        id,
        name,
        requires_attunement: false,
        is_weapon: true,
        effect: MagicItemEffect {
            attack_bonus: bonus,
            damage_bonus: bonus,
            ..Default::default()
        },
    }
}

lazy_static::lazy_static! {
    pub static ref MAGIC_ITEMS: Vec<MagicItemDefinition> = vec![
        plus_weapon("weapon-plus-1", "+1 Weapon", 1),
        plus_weapon("weapon-plus-2", "+2 Weapon", 2),
        plus_weapon("weapon-plus-3", "+3 Weapon", 3),
        MagicItemDefinition {
            id: "flame-tongue",
            name: "Flame Tongue",
            requires_attunement: true,
            is_weapon: true,
            effect: MagicItemEffect {
                extra_dice: Some((2, DieType::D6)),
                ..Default::default()
            },
        },
        MagicItemDefinition {
            id: "bracers-of-archery",
            name: "Bracers of Archery",
            requires_attunement: true,
            is_weapon: false,
            effect: MagicItemEffect {
                ranged_damage_bonus: 2,
                ..Default::default()
            },
        },
        MagicItemDefinition {
            id: "gauntlets-of-ogre-power",
            name: "Gauntlets of Ogre Power",
            requires_attunement: true,
            is_weapon: false,
            effect: MagicItemEffect {
                sets_ability: Some((Ability::Strength, 19)),
                ..Default::default()
            },
        },
    ];
}
