//! Feat catalog.

/// Which attacks a -5/+10 power attack applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAttackKind {
    /// Great Weapon Master: heavy melee weapons.
    HeavyMelee,
    /// Sharpshooter: ranged weapons.
    Ranged,
}

/// Mechanical effect of a feat on damage output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatEffect {
    PowerAttack(PowerAttackKind),
    /// Bonus action d4 butt-end attack with a polearm.
    PolearmMaster,
    /// Bonus action hand crossbow attack.
    CrossbowExpert,
    /// Roll three dice on advantage for non-Strength attacks.
    ElvenAccuracy,
    /// No effect on damage.
    None,
}

#[derive(Debug, Clone)]
pub struct FeatDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub effect: FeatEffect,
}

lazy_static::lazy_static! {
    pub static ref FEATS: Vec<FeatDefinition> = vec![
        FeatDefinition {
            id: "gwm",
            name: "Great Weapon Master",
            description: "Take -5 to hit with a heavy melee weapon for +10 damage.",
            effect: FeatEffect::PowerAttack(PowerAttackKind::HeavyMelee),
        },
        FeatDefinition {
            id: "sharpshooter",
            name: "Sharpshooter",
            description: "Take -5 to hit with a ranged weapon for +10 damage.",
            effect: FeatEffect::PowerAttack(PowerAttackKind::Ranged),
        },
        FeatDefinition {
            id: "polearm-master",
            name: "Polearm Master",
            description: "Bonus action attack with the butt end of a polearm (1d4).",
            effect: FeatEffect::PolearmMaster,
        },
        FeatDefinition {
            id: "crossbow-expert",
            name: "Crossbow Expert",
            description: "Bonus action attack with a hand crossbow after attacking.",
            effect: FeatEffect::CrossbowExpert,
        },
        FeatDefinition {
            id: "elven-accuracy",
            name: "Elven Accuracy",
            description: "Reroll one of the dice when attacking with advantage using DEX, INT, WIS or CHA.",
            effect: FeatEffect::ElvenAccuracy,
        },
        FeatDefinition {
            id: "alert",
            name: "Alert",
            description: "+5 initiative, cannot be surprised.",
            effect: FeatEffect::None,
        },
        FeatDefinition {
            id: "tough",
            name: "Tough",
            description: "+2 hit points per level.",
            effect: FeatEffect::None,
        },
        FeatDefinition {
            id: "war-caster",
            name: "War Caster",
            description: "Advantage on concentration saves.",
            effect: FeatEffect::None,
        },
    ];
}

/// Look up a feat by id.
pub fn get_feat(id: &str) -> Option<&'static FeatDefinition> {
    let id = id.trim().to_lowercase();
    FEATS.iter().find(|f| f.id == id)
}
