//! Fighting styles, warlock invocations and pact boons.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FightingStyle {
    Archery,
    Defense,
    Dueling,
    GreatWeaponFighting,
    TwoWeaponFighting,
}

impl FightingStyle {
    pub fn name(&self) -> &'static str {
        match self {
            FightingStyle::Archery => "Archery",
            FightingStyle::Defense => "Defense",
            FightingStyle::Dueling => "Dueling",
            FightingStyle::GreatWeaponFighting => "Great Weapon Fighting",
            FightingStyle::TwoWeaponFighting => "Two-Weapon Fighting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationEffect {
    /// Add Charisma modifier to Eldritch Blast damage.
    AgonizingBlast,
    /// Attack twice with the pact weapon.
    ThirstingBlade,
    /// Add Charisma modifier as necrotic damage to pact weapon hits.
    Lifedrinker,
    None,
}

#[derive(Debug, Clone)]
pub struct InvocationDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub min_warlock_level: u8,
    pub requires_pact: Option<&'static str>,
    pub effect: InvocationEffect,
}

lazy_static::lazy_static! {
    pub static ref INVOCATIONS: Vec<InvocationDefinition> = vec![
        InvocationDefinition {
            id: "agonizing-blast",
            name: "Agonizing Blast",
            min_warlock_level: 2,
            requires_pact: None,
            effect: InvocationEffect::AgonizingBlast,
        },
        InvocationDefinition {
            id: "thirsting-blade",
            name: "Thirsting Blade",
            min_warlock_level: 5,
            requires_pact: Some(PACT_OF_THE_BLADE),
            effect: InvocationEffect::ThirstingBlade,
        },
        InvocationDefinition {
            id: "lifedrinker",
            name: "Lifedrinker",
            min_warlock_level: 12,
            requires_pact: Some(PACT_OF_THE_BLADE),
            effect: InvocationEffect::Lifedrinker,
        },
        InvocationDefinition {
            id: "repelling-blast",
            name: "Repelling Blast",
            min_warlock_level: 2,
            requires_pact: None,
            effect: InvocationEffect::None,
        },
    ];
}

pub const PACT_OF_THE_BLADE: &str = "pact-of-the-blade";

/// Pact boons recognised in builds.
pub const PACT_BOONS: &[&str] = &[PACT_OF_THE_BLADE, "pact-of-the-chain", "pact-of-the-tome"];

/// Look up an invocation by id.
pub fn get_invocation(id: &str) -> Option<&'static InvocationDefinition> {
    let id = id.trim().to_lowercase();
    INVOCATIONS.iter().find(|i| i.id == id)
}

pub fn is_pact_boon(id: &str) -> bool {
    PACT_BOONS.contains(&id.trim().to_lowercase().as_str())
}
