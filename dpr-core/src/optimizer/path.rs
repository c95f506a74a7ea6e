//! Level path optimizer.
//!
//! Beam search over which class to take at each of the 20 character levels.
//! A template build supplies everything but the class order: ability
//! scores, equipment, buffs, subclass and fighting style choices, and the
//! feats to take (placed at the generated path's ASI levels, in order).
//!
//! At every depth each retained partial path is extended by every allowed
//! class whose multiclass prerequisites are met, partials that missed a
//! milestone are dropped, and the best `beam_width` by the objective's
//! partial score are kept.

use super::OptimizerError;
use crate::build::{BuildConfiguration, LevelEntry, MAX_LEVEL};
use crate::catalog::CharacterClass;
use crate::dpr::{dpr_at_ac, DprConfiguration};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// What a level path is scored on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Objective {
    /// DPR at level 20.
    #[default]
    L20Dpr,
    /// Mean of the average DPR in each tier of play (1-4, 5-10, 11-16, 17-20).
    TierAverage,
    /// Weighted mean DPR, one weight per level starting at level 1.
    Custom { weights: Vec<f64> },
}

const TIERS: [(usize, usize); 4] = [(1, 4), (5, 10), (11, 16), (17, 20)];

impl Objective {
    /// Score a DPR progression. `progression[i]` is the DPR at level `i + 1`;
    /// shorter progressions are scored on the levels they have.
    pub fn score(&self, progression: &[f64]) -> f64 {
        let Some(&latest) = progression.last() else {
            return 0.0;
        };
        match self {
            Objective::L20Dpr => latest,
            Objective::TierAverage => {
                let tier_means: Vec<f64> = TIERS
                    .iter()
                    .filter_map(|&(first, last)| {
                        let levels = progression.get(first - 1..last.min(progression.len()))?;
                        (!levels.is_empty())
                            .then(|| levels.iter().sum::<f64>() / levels.len() as f64)
                    })
                    .collect();
                tier_means.iter().sum::<f64>() / tier_means.len().max(1) as f64
            }
            Objective::Custom { weights } => {
                let (weighted, total) = progression
                    .iter()
                    .zip(weights)
                    .fold((0.0, 0.0), |(sum, total), (dpr, w)| (sum + dpr * w, total + w));
                if total > 0.0 {
                    weighted / total
                } else {
                    latest
                }
            }
        }
    }
}

/// A capability a path must have by a given level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub name: String,
    pub requirement: MilestoneRequirement,
    pub target_level: u8,
}

impl Milestone {
    pub fn new(name: impl Into<String>, requirement: MilestoneRequirement, target_level: u8) -> Self {
        Self {
            name: name.into(),
            requirement,
            target_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MilestoneRequirement {
    /// Two or more attacks per Attack action.
    ExtraAttack,
    ClassLevel { class: CharacterClass, level: u8 },
    Feat { feat: String },
    /// Access to spell slots (or pact slots) of at least this level.
    SpellSlotLevel { level: u8 },
}

impl MilestoneRequirement {
    pub fn is_met(&self, build: &BuildConfiguration) -> bool {
        match self {
            MilestoneRequirement::ExtraAttack => build
                .class_levels()
                .iter()
                .any(|(class, lvl)| class.attacks_per_action(*lvl) >= 2),
            MilestoneRequirement::ClassLevel { class, level } => build.class_level(*class) >= *level,
            MilestoneRequirement::Feat { feat } => build.has_feat(feat),
            MilestoneRequirement::SpellSlotLevel { level } => {
                let slots = build.spell_slots();
                (*level as usize..=9).any(|l| l >= 1 && slots[l - 1] > 0)
                    || build.pact_magic().is_some_and(|(_, pact)| pact >= *level)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneResult {
    pub name: String,
    pub achieved: bool,
    pub level_achieved: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathOptimizerConfig {
    pub objective: Objective,
    pub milestones: Vec<Milestone>,
    pub beam_width: usize,
    pub max_paths: usize,
    /// Class ids the search may take levels in.
    pub allowed_classes: Vec<String>,
    pub target_ac: i32,
    pub dpr_config: DprConfiguration,
}

impl Default for PathOptimizerConfig {
    fn default() -> Self {
        Self {
            objective: Objective::L20Dpr,
            milestones: Vec::new(),
            beam_width: 12,
            max_paths: 5,
            allowed_classes: CharacterClass::all()
                .iter()
                .map(|c| c.id().to_string())
                .collect(),
            target_ac: 16,
            dpr_config: DprConfiguration::default(),
        }
    }
}

impl PathOptimizerConfig {
    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_milestone(mut self, milestone: Milestone) -> Self {
        self.milestones.push(milestone);
        self
    }

    pub fn with_beam_width(mut self, width: usize) -> Self {
        self.beam_width = width;
        self
    }

    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = max_paths;
        self
    }

    pub fn with_classes(mut self, classes: &[CharacterClass]) -> Self {
        self.allowed_classes = classes.iter().map(|c| c.id().to_string()).collect();
        self
    }

    pub fn with_target_ac(mut self, ac: i32) -> Self {
        self.target_ac = ac;
        self
    }

    /// Resolve the allowed class ids, checking the rest of the config.
    fn validate(&self) -> Result<Vec<CharacterClass>, OptimizerError> {
        if self.beam_width == 0 {
            return Err(OptimizerError::InvalidConfig(
                "beam width must be positive".to_string(),
            ));
        }
        if self.max_paths == 0 {
            return Err(OptimizerError::InvalidConfig(
                "max paths must be positive".to_string(),
            ));
        }
        if !(1..=40).contains(&self.target_ac) {
            return Err(OptimizerError::InvalidConfig(format!(
                "target AC {} outside 1..=40",
                self.target_ac
            )));
        }
        if let Some(m) = self
            .milestones
            .iter()
            .find(|m| !(1..=MAX_LEVEL).contains(&m.target_level))
        {
            return Err(OptimizerError::InvalidConfig(format!(
                "milestone '{}' targets level {}",
                m.name, m.target_level
            )));
        }
        if self.allowed_classes.is_empty() {
            return Err(OptimizerError::NoClasses);
        }
        let mut classes = Vec::new();
        for id in &self.allowed_classes {
            let class = CharacterClass::from_id(id)
                .ok_or_else(|| OptimizerError::UnknownClass(id.clone()))?;
            if !classes.contains(&class) {
                classes.push(class);
            }
        }
        Ok(classes)
    }
}

/// One complete level ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelPath {
    /// Class taken at each character level.
    pub classes: Vec<CharacterClass>,
    pub level_timeline: Vec<LevelEntry>,
    /// DPR at the target AC at each character level.
    pub dpr_progression: Vec<f64>,
    pub milestones: Vec<MilestoneResult>,
    pub score: f64,
}

impl LevelPath {
    /// Final class levels in order of first appearance, e.g. "Fighter 11 / Warlock 9".
    pub fn summary(&self) -> String {
        let mut order: Vec<CharacterClass> = Vec::new();
        for class in &self.classes {
            if !order.contains(class) {
                order.push(*class);
            }
        }
        order
            .iter()
            .map(|class| {
                let count = self.classes.iter().filter(|c| *c == class).count();
                format!("{} {}", class.name(), count)
            })
            .collect::<Vec<_>>()
            .join(" / ")
    }

    /// The template build with this path's timeline.
    pub fn to_build(&self, template: &BuildConfiguration) -> BuildConfiguration {
        let mut build = template.clone();
        build.level_timeline = self.level_timeline.clone();
        build
    }
}

#[derive(Debug, Clone)]
struct Partial {
    classes: Vec<CharacterClass>,
    progression: Vec<f64>,
    achieved: Vec<Option<u8>>,
    score: f64,
}

impl Partial {
    fn class_counts(&self) -> BTreeMap<CharacterClass, u8> {
        let mut counts = BTreeMap::new();
        for class in &self.classes {
            *counts.entry(*class).or_insert(0) += 1;
        }
        counts
    }
}

pub struct PathOptimizer {
    config: PathOptimizerConfig,
}

impl PathOptimizer {
    pub fn new(config: PathOptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PathOptimizerConfig {
        &self.config
    }

    /// Search for the best level paths for `template`.
    pub fn optimize(&self, template: &BuildConfiguration) -> Result<Vec<LevelPath>, OptimizerError> {
        let classes = self.config.validate()?;
        let scores = template.effective_ability_scores();
        let milestones = &self.config.milestones;

        let mut beam = vec![Partial {
            classes: Vec::new(),
            progression: Vec::new(),
            achieved: vec![None; milestones.len()],
            score: 0.0,
        }];

        for depth in 1..=MAX_LEVEL {
            let mut candidates = Vec::new();
            for partial in &beam {
                let taken: Vec<CharacterClass> = partial.class_counts().into_keys().collect();
                for &class in &classes {
                    let multiclassing = !taken.is_empty() && !taken.contains(&class);
                    if multiclassing
                        && !(class.data().multiclass_prerequisite.is_met(&scores)
                            && taken
                                .iter()
                                .all(|t| t.data().multiclass_prerequisite.is_met(&scores)))
                    {
                        continue;
                    }

                    let mut next_classes = partial.classes.clone();
                    next_classes.push(class);
                    let build = build_for(template, &next_classes);

                    let mut achieved = partial.achieved.clone();
                    for (slot, milestone) in achieved.iter_mut().zip(milestones) {
                        if slot.is_none() && milestone.requirement.is_met(&build) {
                            *slot = Some(depth);
                        }
                    }
                    let missed = achieved
                        .iter()
                        .zip(milestones)
                        .any(|(slot, m)| slot.is_none() && m.target_level <= depth);
                    if missed {
                        continue;
                    }

                    let dpr = dpr_at_ac(&build, &self.config.dpr_config, self.config.target_ac)?;
                    let mut progression = partial.progression.clone();
                    progression.push(dpr);
                    let score = self.config.objective.score(&progression);

                    candidates.push(Partial {
                        classes: next_classes,
                        progression,
                        achieved,
                        score,
                    });
                }
            }

            if candidates.is_empty() {
                info!(depth, "No level path satisfies the milestones");
                return Err(OptimizerError::NoFeasiblePath);
            }
            candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

            // Orderings of the same classes reaching the same milestones are
            // interchangeable from here on; keep the best of each.
            let mut seen = HashSet::new();
            candidates.retain(|c| {
                let reached: Vec<bool> = c.achieved.iter().map(Option::is_some).collect();
                seen.insert((c.class_counts(), reached))
            });
            candidates.truncate(self.config.beam_width);
            debug!(depth, retained = candidates.len(), best = candidates[0].score, "Beam step");
            beam = candidates;
        }

        let mut seen = HashSet::new();
        let paths: Vec<LevelPath> = beam
            .into_iter()
            .filter(|p| seen.insert(p.class_counts()))
            .take(self.config.max_paths)
            .map(|p| {
                let level_timeline = build_for(template, &p.classes).level_timeline;
                let milestones = milestones
                    .iter()
                    .zip(&p.achieved)
                    .map(|(m, level)| MilestoneResult {
                        name: m.name.clone(),
                        achieved: level.is_some(),
                        level_achieved: *level,
                    })
                    .collect();
                LevelPath {
                    classes: p.classes,
                    level_timeline,
                    dpr_progression: p.progression,
                    milestones,
                    score: p.score,
                }
            })
            .collect();

        info!(
            build = %template.id,
            paths = paths.len(),
            best = %paths.first().map(|p| p.summary()).unwrap_or_default(),
            "Level path search complete"
        );
        Ok(paths)
    }
}

/// The template build with the timeline for `classes`.
///
/// Subclasses and fighting styles come from the template's entries for the
/// same class; template feats fill ASI levels in order.
fn build_for(template: &BuildConfiguration, classes: &[CharacterClass]) -> BuildConfiguration {
    let mut feats = template
        .level_timeline
        .iter()
        .filter_map(|e| e.feat_id.clone());
    let template_entry = |class: CharacterClass| {
        template
            .level_timeline
            .iter()
            .filter(move |e| CharacterClass::from_id(&e.class_id) == Some(class))
    };

    let mut counts: BTreeMap<CharacterClass, u8> = BTreeMap::new();
    let mut timeline = Vec::with_capacity(classes.len());
    for (index, &class) in classes.iter().enumerate() {
        let class_level = {
            let count = counts.entry(class).or_insert(0);
            *count += 1;
            *count
        };
        let data = class.data();
        let mut entry = LevelEntry::new(index as u8 + 1, class);
        if class_level == data.subclass_level {
            entry.subclass_id = template.subclass(class).map(str::to_string);
        }
        if data.fighting_style_level == Some(class_level) {
            entry.fighting_style = template_entry(class).find_map(|e| e.fighting_style);
        }
        if data.asi_levels.contains(&class_level) {
            entry.feat_id = feats.next();
        }
        timeline.push(entry);
    }

    let mut build = template.clone();
    build.level_timeline = timeline;
    build
}
