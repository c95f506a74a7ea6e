//! D&D 5e damage-per-round engine and build optimizers.
//!
//! This crate provides:
//! - Expected DPR curves across armor classes for a character build
//! - A debounced delta engine answering "how much does this buff or feat add?"
//! - A combat round optimizer planning the best three-round action sequence
//! - A level path optimizer searching class orderings from level 1 to 20
//!
//! # Quick Start
//!
//! ```ignore
//! use dpr_core::{DeltaEngine, DprConfiguration, DprWorker, EngineSettings, Toggle};
//! use dpr_core::testing::sample_fighter;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (worker, _task) = DprWorker::spawn(32);
//!     let engine = DeltaEngine::new(Arc::new(worker), EngineSettings::default());
//!
//!     let build = sample_fighter(5);
//!     let id = engine.calculate_toggle_delta(
//!         &Toggle::Buff("haste".into()),
//!         &build,
//!         &DprConfiguration::default(),
//!     );
//!
//!     if let Some(state) = engine.wait_for(&id).await {
//!         println!("Haste adds {:+.2} DPR", state.value);
//!     }
//! }
//! ```

pub mod build;
pub mod catalog;
pub mod delta;
pub mod dice;
pub mod dpr;
pub mod optimizer;
pub mod settings;
pub mod store;
pub mod testing;
pub mod worker;

// Primary public API
pub use build::{AbilityScores, BuildConfiguration, BuildError, LevelEntry, Toggle};
pub use delta::{DeltaEngine, DeltaError, DeltaState, DeltaTrend, DeltaUpdate};
pub use dice::{Advantage, DiceExpression};
pub use dpr::{calculate_dpr_curves, dpr_at_ac, DprConfiguration, DprCurves, DprError, DprPoint};
pub use optimizer::{
    CombatOptimizationConfig, CombatOptimizationResult, CombatRoundOptimizer, LevelPath,
    OptimizerError, PathOptimizer, PathOptimizerConfig,
};
pub use settings::{EngineSettings, SettingsError};
pub use store::{CombatOptimizerStore, PathExplorerStore};
pub use worker::{DprCurveCalculator, DprWorker, DprWorkerHandle, LocalCalculator};
