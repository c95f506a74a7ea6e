//! Static rules catalog.
//!
//! Keyed lookup tables for classes, subclasses, feats, buffs, weapons,
//! magic items, invocations and pact boons. Lookups are case-insensitive
//! and return `None` for unknown ids.

pub mod buffs;
pub mod classes;
pub mod feats;
pub mod features;
pub mod items;

pub use buffs::{get_buff, rage_damage, BuffDefinition, BuffEffect, CastTime};
pub use classes::{
    get_class, get_subclass, CasterProgression, CharacterClass, ClassData, Prerequisite,
    SubclassData, SubclassFeature,
};
pub use feats::{get_feat, FeatDefinition, FeatEffect, PowerAttackKind};
pub use features::{
    get_invocation, is_pact_boon, FightingStyle, InvocationDefinition, InvocationEffect,
    PACT_OF_THE_BLADE,
};
pub use items::{
    get_magic_item, get_weapon, MagicItemDefinition, MagicItemEffect, WeaponDefinition,
    WeaponProperty,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups_are_case_insensitive() {
        assert!(get_feat("GWM").is_some());
        assert!(get_buff("Bless").is_some());
        assert!(get_invocation("Agonizing-Blast").is_some());
        assert!(is_pact_boon("Pact-Of-The-Blade"));
    }

    #[test]
    fn test_unknown_ids() {
        assert!(get_feat("not-a-feat").is_none());
        assert!(get_invocation("not-an-invocation").is_none());
        assert!(!is_pact_boon("pact-of-the-talisman-2"));
    }

    #[test]
    fn test_feat_effects() {
        assert_eq!(
            get_feat("sharpshooter").unwrap().effect,
            FeatEffect::PowerAttack(PowerAttackKind::Ranged)
        );
        assert_eq!(get_feat("alert").unwrap().effect, FeatEffect::None);
    }
}
