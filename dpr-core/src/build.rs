//! Build model: the serializable description of a character variant.
//!
//! A [`BuildConfiguration`] is the input to every calculation. It is owned by
//! the caller; calculators only read it or derive modified copies (see
//! [`Toggle`]).

use crate::catalog::{
    get_buff, get_feat, get_invocation, get_magic_item, get_weapon, is_pact_boon,
    CasterProgression, CharacterClass, FightingStyle,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Metadata key holding feat ids simulated as taken without a timeline slot.
pub const SIMULATED_FEATS_KEY: &str = "simulatedFeats";

/// Maximum number of attuned items.
pub const MAX_ATTUNED_ITEMS: usize = 3;

/// Maximum character level.
pub const MAX_LEVEL: u8 = 20;

/// Core ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Ability scores container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: u8) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        // Floor division: 8-9 = -1, 10-11 = 0, 12-13 = +1
        (self.get(ability) as i32 - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(16, 14, 14, 10, 12, 10)
    }
}

/// One character level in the build's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelEntry {
    pub level: u8,
    pub class_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subclass_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fighting_style: Option<FightingStyle>,
}

impl LevelEntry {
    pub fn new(level: u8, class: CharacterClass) -> Self {
        Self {
            level,
            class_id: class.id().to_string(),
            subclass_id: None,
            feat_id: None,
            fighting_style: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Equipment {
    pub main_hand: Option<String>,
    pub off_hand: Option<String>,
    pub armor: Option<String>,
    pub shield: Option<String>,
    pub magic_items: Vec<String>,
    pub attuned_items: Vec<String>,
}

/// Errors from build validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("Build has no levels")]
    NoLevels,
    #[error("Build exceeds level 20 ({0} levels)")]
    TooManyLevels(usize),
    #[error("Level timeline out of order: entry {index} has level {found}")]
    TimelineOutOfOrder { index: usize, found: u8 },
    #[error("Unknown class: {0}")]
    UnknownClass(String),
    #[error("Unknown feat: {0}")]
    UnknownFeat(String),
    #[error("Unknown buff: {0}")]
    UnknownBuff(String),
    #[error("Unknown weapon: {0}")]
    UnknownWeapon(String),
    #[error("Unknown magic item: {0}")]
    UnknownMagicItem(String),
    #[error("Unknown invocation: {0}")]
    UnknownInvocation(String),
    #[error("Unknown pact boon: {0}")]
    UnknownPactBoon(String),
    #[error("Too many attuned items: {0} (max 3)")]
    TooManyAttunedItems(usize),
}

/// A character variant: the input to every calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfiguration {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ability_scores: AbilityScores,
    #[serde(default)]
    pub level_timeline: Vec<LevelEntry>,
    #[serde(default)]
    pub equipment: Equipment,
    #[serde(default)]
    pub invocations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pact_boon: Option<String>,
    #[serde(default)]
    pub active_buffs: BTreeSet<String>,
    #[serde(default, rename = "round0Buffs")]
    pub round0_buffs: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl BuildConfiguration {
    /// Create an empty build with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            ability_scores: AbilityScores::default(),
            level_timeline: Vec::new(),
            equipment: Equipment::default(),
            invocations: Vec::new(),
            pact_boon: None,
            active_buffs: BTreeSet::new(),
            round0_buffs: BTreeSet::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_ability_scores(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = scores;
        self
    }

    /// Append `count` levels of `class` to the timeline.
    pub fn with_levels(mut self, class: CharacterClass, count: u8) -> Self {
        for _ in 0..count {
            let level = self.level_timeline.len() as u8 + 1;
            self.level_timeline.push(LevelEntry::new(level, class));
        }
        self
    }

    /// Set the subclass on every timeline entry of its class.
    pub fn with_subclass(mut self, class: CharacterClass, subclass_id: impl Into<String>) -> Self {
        let subclass_id = subclass_id.into();
        for entry in &mut self.level_timeline {
            if CharacterClass::from_id(&entry.class_id) == Some(class) {
                entry.subclass_id = Some(subclass_id.clone());
            }
        }
        self
    }

    /// Take a feat at a character level already in the timeline.
    pub fn with_feat_at(mut self, level: u8, feat_id: impl Into<String>) -> Self {
        if let Some(entry) = self.level_timeline.iter_mut().find(|e| e.level == level) {
            entry.feat_id = Some(feat_id.into());
        }
        self
    }

    pub fn with_fighting_style(mut self, level: u8, style: FightingStyle) -> Self {
        if let Some(entry) = self.level_timeline.iter_mut().find(|e| e.level == level) {
            entry.fighting_style = Some(style);
        }
        self
    }

    pub fn with_main_hand(mut self, weapon_id: impl Into<String>) -> Self {
        self.equipment.main_hand = Some(weapon_id.into());
        self
    }

    pub fn with_off_hand(mut self, weapon_id: impl Into<String>) -> Self {
        self.equipment.off_hand = Some(weapon_id.into());
        self
    }

    pub fn with_shield(mut self) -> Self {
        self.equipment.shield = Some("shield".to_string());
        self
    }

    pub fn with_magic_item(mut self, item_id: impl Into<String>, attuned: bool) -> Self {
        let item_id = item_id.into();
        if attuned {
            self.equipment.attuned_items.push(item_id.clone());
        }
        self.equipment.magic_items.push(item_id);
        self
    }

    pub fn with_invocation(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocations.push(invocation_id.into());
        self
    }

    pub fn with_pact_boon(mut self, pact_id: impl Into<String>) -> Self {
        self.pact_boon = Some(pact_id.into());
        self
    }

    pub fn with_buff(mut self, buff_id: impl Into<String>) -> Self {
        self.active_buffs.insert(buff_id.into());
        self
    }

    pub fn with_round0_buff(mut self, buff_id: impl Into<String>) -> Self {
        self.round0_buffs.insert(buff_id.into());
        self
    }

    pub fn total_level(&self) -> u8 {
        self.level_timeline.len().min(MAX_LEVEL as usize) as u8
    }

    pub fn proficiency_bonus(&self) -> i32 {
        2 + (self.total_level().max(1) as i32 - 1) / 4
    }

    /// Levels per class. Unknown class ids are skipped (see [`Self::validate`]).
    pub fn class_levels(&self) -> BTreeMap<CharacterClass, u8> {
        let mut levels = BTreeMap::new();
        for entry in &self.level_timeline {
            if let Some(class) = CharacterClass::from_id(&entry.class_id) {
                *levels.entry(class).or_insert(0) += 1;
            }
        }
        levels
    }

    pub fn class_level(&self, class: CharacterClass) -> u8 {
        self.class_levels().get(&class).copied().unwrap_or(0)
    }

    /// The subclass chosen for a class, if any entry names one.
    pub fn subclass(&self, class: CharacterClass) -> Option<&str> {
        self.level_timeline
            .iter()
            .filter(|e| CharacterClass::from_id(&e.class_id) == Some(class))
            .find_map(|e| e.subclass_id.as_deref())
    }

    /// Feats from the timeline followed by simulated feats, without duplicates.
    pub fn feats(&self) -> Vec<String> {
        let mut feats: Vec<String> = self
            .level_timeline
            .iter()
            .filter_map(|e| e.feat_id.clone())
            .collect();
        for feat in self.simulated_feats() {
            if !feats.contains(&feat) {
                feats.push(feat);
            }
        }
        feats
    }

    pub fn has_feat(&self, feat_id: &str) -> bool {
        self.feats().iter().any(|f| f.eq_ignore_ascii_case(feat_id))
    }

    /// Feat ids listed under `metadata.simulatedFeats`.
    pub fn simulated_feats(&self) -> Vec<String> {
        self.metadata
            .get(SIMULATED_FEATS_KEY)
            .and_then(Value::as_array)
            .map(|feats| {
                feats
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn fighting_styles(&self) -> Vec<FightingStyle> {
        self.level_timeline
            .iter()
            .filter_map(|e| e.fighting_style)
            .collect()
    }

    pub fn has_fighting_style(&self, style: FightingStyle) -> bool {
        self.fighting_styles().contains(&style)
    }

    pub fn has_invocation(&self, invocation_id: &str) -> bool {
        self.invocations
            .iter()
            .any(|i| i.eq_ignore_ascii_case(invocation_id))
    }

    pub fn has_pact_boon(&self, pact_id: &str) -> bool {
        self.pact_boon
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(pact_id))
    }

    /// Magic items whose effects apply: owned, and attuned when required.
    pub fn active_magic_items(&self) -> Vec<&'static crate::catalog::MagicItemDefinition> {
        self.equipment
            .magic_items
            .iter()
            .filter_map(|id| get_magic_item(id))
            .filter(|item| {
                !item.requires_attunement
                    || self
                        .equipment
                        .attuned_items
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(item.id))
            })
            .collect()
    }

    /// Ability scores after item overrides.
    pub fn effective_ability_scores(&self) -> AbilityScores {
        let mut scores = self.ability_scores;
        for item in self.active_magic_items() {
            if let Some((ability, value)) = item.effect.sets_ability {
                if scores.get(ability) < value {
                    scores.set(ability, value);
                }
            }
        }
        scores
    }

    /// Shared spell slots by level (index 0 = 1st level), pact magic excluded.
    pub fn spell_slots(&self) -> [u8; 9] {
        let levels = self.class_levels();
        let casters: Vec<(CasterProgression, u8)> = levels
            .iter()
            .map(|(class, lvl)| (class.data().caster, *lvl))
            .filter(|(caster, _)| {
                matches!(caster, CasterProgression::Full | CasterProgression::Half)
            })
            .collect();

        let caster_level = match casters.as_slice() {
            [] => 0,
            // A single half caster rounds up once it has spells at all.
            [(CasterProgression::Half, lvl)] if *lvl >= 2 => lvl.div_ceil(2),
            [(CasterProgression::Half, _)] => 0,
            _ => casters
                .iter()
                .map(|(caster, lvl)| match caster {
                    CasterProgression::Full => *lvl,
                    _ => lvl / 2,
                })
                .sum(),
        };

        slots_for_caster_level(caster_level)
    }

    /// Warlock pact magic as (slot count, slot level).
    pub fn pact_magic(&self) -> Option<(u8, u8)> {
        pact_slots(self.class_level(CharacterClass::Warlock))
    }

    /// Check that every id in the build resolves in the catalog.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.level_timeline.is_empty() {
            return Err(BuildError::NoLevels);
        }
        if self.level_timeline.len() > MAX_LEVEL as usize {
            return Err(BuildError::TooManyLevels(self.level_timeline.len()));
        }
        for (index, entry) in self.level_timeline.iter().enumerate() {
            if entry.level as usize != index + 1 {
                return Err(BuildError::TimelineOutOfOrder {
                    index,
                    found: entry.level,
                });
            }
            if CharacterClass::from_id(&entry.class_id).is_none() {
                return Err(BuildError::UnknownClass(entry.class_id.clone()));
            }
        }
        for feat in self.feats() {
            if get_feat(&feat).is_none() {
                return Err(BuildError::UnknownFeat(feat));
            }
        }
        for buff in self.active_buffs.iter().chain(&self.round0_buffs) {
            if get_buff(buff).is_none() {
                return Err(BuildError::UnknownBuff(buff.clone()));
            }
        }
        for weapon in [&self.equipment.main_hand, &self.equipment.off_hand]
            .into_iter()
            .flatten()
        {
            if get_weapon(weapon).is_none() {
                return Err(BuildError::UnknownWeapon(weapon.clone()));
            }
        }
        for item in &self.equipment.magic_items {
            if get_magic_item(item).is_none() {
                return Err(BuildError::UnknownMagicItem(item.clone()));
            }
        }
        if self.equipment.attuned_items.len() > MAX_ATTUNED_ITEMS {
            return Err(BuildError::TooManyAttunedItems(
                self.equipment.attuned_items.len(),
            ));
        }
        for invocation in &self.invocations {
            if get_invocation(invocation).is_none() {
                return Err(BuildError::UnknownInvocation(invocation.clone()));
            }
        }
        if let Some(pact) = &self.pact_boon {
            if !is_pact_boon(pact) {
                return Err(BuildError::UnknownPactBoon(pact.clone()));
            }
        }
        Ok(())
    }
}

/// Full-caster slot table, rows indexed by caster level - 1.
const SLOT_TABLE: [[u8; 9]; 20] = [
    [2, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 2, 0, 0, 0, 0, 0],
    [4, 3, 3, 3, 1, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 2, 1, 1],
];

/// Spell slots for a multiclass caster level.
pub fn slots_for_caster_level(caster_level: u8) -> [u8; 9] {
    match caster_level {
        0 => [0; 9],
        lvl => SLOT_TABLE[(lvl.min(20) - 1) as usize],
    }
}

/// Pact magic slots for a warlock level as (count, slot level).
pub fn pact_slots(warlock_level: u8) -> Option<(u8, u8)> {
    let count = match warlock_level {
        0 => return None,
        1 => 1,
        2..=10 => 2,
        11..=16 => 3,
        _ => 4,
    };
    let level = match warlock_level {
        1..=2 => 1,
        3..=4 => 2,
        5..=6 => 3,
        7..=8 => 4,
        _ => 5,
    };
    Some((count, level))
}

/// A single build dimension that can be switched on or off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Toggle {
    Buff(String),
    Feat(String),
}

impl Toggle {
    /// The delta identifier for this toggle, e.g. `buff-haste` or `feat-gwm`.
    pub fn delta_id(&self) -> String {
        match self {
            Toggle::Buff(id) => format!("buff-{id}"),
            Toggle::Feat(id) => format!("feat-{id}"),
        }
    }

    /// Whether `build` already has this option. Round-0 buffs count only
    /// when the DPR calculation includes them.
    pub fn is_applied(&self, build: &BuildConfiguration, include_round0_buffs: bool) -> bool {
        match self {
            Toggle::Buff(id) => {
                build.active_buffs.contains(id)
                    || (include_round0_buffs && build.round0_buffs.contains(id))
            }
            Toggle::Feat(id) => build.has_feat(id),
        }
    }

    /// Derive a copy of `build` with this option switched on.
    pub fn apply(&self, build: &BuildConfiguration) -> BuildConfiguration {
        let mut modified = build.clone();
        match self {
            Toggle::Buff(id) => {
                modified.active_buffs.insert(id.clone());
            }
            Toggle::Feat(id) => {
                if !build.has_feat(id) {
                    let mut feats = build.simulated_feats();
                    feats.push(id.clone());
                    modified.metadata.insert(
                        SIMULATED_FEATS_KEY.to_string(),
                        Value::Array(feats.into_iter().map(Value::String).collect()),
                    );
                }
            }
        }
        modified
    }

    /// Derive a copy of `build` with this option switched off.
    ///
    /// Buffs are dropped from both the active and round-0 sets. Feats taken
    /// in the timeline are cleared from their entry; simulated feats are
    /// dropped from metadata.
    pub fn remove(&self, build: &BuildConfiguration) -> BuildConfiguration {
        let mut modified = build.clone();
        match self {
            Toggle::Buff(id) => {
                modified.active_buffs.remove(id);
                modified.round0_buffs.remove(id);
            }
            Toggle::Feat(id) => {
                for entry in &mut modified.level_timeline {
                    if entry
                        .feat_id
                        .as_deref()
                        .is_some_and(|f| f.eq_ignore_ascii_case(id))
                    {
                        entry.feat_id = None;
                    }
                }
                let remaining: Vec<Value> = build
                    .simulated_feats()
                    .into_iter()
                    .filter(|f| !f.eq_ignore_ascii_case(id))
                    .map(Value::String)
                    .collect();
                if remaining.is_empty() {
                    modified.metadata.remove(SIMULATED_FEATS_KEY);
                } else {
                    modified
                        .metadata
                        .insert(SIMULATED_FEATS_KEY.to_string(), Value::Array(remaining));
                }
            }
        }
        modified
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.delta_id())
    }
}
