//! Build optimizers.
//!
//! Contains the combat round optimizer (best three-round action sequence
//! under resource limits) and the level path optimizer (beam search over
//! class level orderings).

pub mod combat;
pub mod path;

pub use combat::{
    ActionTiming, CombatAlternative, CombatOptimizationConfig, CombatOptimizationResult,
    CombatRoundOptimizer, ConcentrationChange, PlannedAction, ResourceStrategy, RoundPlan,
    ROUNDS_TO_OPTIMIZE,
};
pub use path::{
    LevelPath, Milestone, MilestoneRequirement, MilestoneResult, Objective, PathOptimizer,
    PathOptimizerConfig,
};

use crate::build::BuildError;
use crate::dpr::DprError;
use thiserror::Error;

/// Errors from the optimizers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid build: {0}")]
    Build(#[from] BuildError),

    #[error("DPR calculation failed: {0}")]
    Dpr(DprError),

    #[error("No classes allowed")]
    NoClasses,

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("No level path satisfies the milestones")]
    NoFeasiblePath,
}

impl From<DprError> for OptimizerError {
    fn from(err: DprError) -> Self {
        match err {
            DprError::Build(build) => OptimizerError::Build(build),
            other => OptimizerError::Dpr(other),
        }
    }
}

/// "1st-level spell slot", "3rd-level spell slot", ...
pub(crate) fn slot_name(level: u8) -> String {
    let suffix = match level {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    };
    format!("{level}{suffix}-level spell slot")
}
