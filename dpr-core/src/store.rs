//! Optimizer stores.
//!
//! State containers that run an optimizer off the async runtime and keep its
//! latest outcome for whoever holds a handle. Handles are cheap to clone and
//! share one state; nothing here is global.

use crate::build::BuildConfiguration;
use crate::optimizer::{
    CombatOptimizationConfig, CombatOptimizationResult, CombatRoundOptimizer, LevelPath,
    OptimizerError, PathOptimizer, PathOptimizerConfig,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Snapshot of a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreState<T> {
    pub is_optimizing: bool,
    pub results: Option<T>,
    pub optimization_error: Option<String>,
}

impl<T> Default for StoreState<T> {
    fn default() -> Self {
        Self {
            is_optimizing: false,
            results: None,
            optimization_error: None,
        }
    }
}

struct Shared<T> {
    state: StoreState<T>,
    /// Bumped per run; only the latest run may write its outcome.
    run: u64,
}

struct OptimizerStore<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for OptimizerStore<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> OptimizerStore<T> {
    fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: StoreState::default(),
                run: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot(&self) -> StoreState<T> {
        self.lock().state.clone()
    }

    async fn run<F>(&self, kind: &'static str, job: F) -> Result<T, String>
    where
        F: FnOnce() -> Result<T, OptimizerError> + Send + 'static,
    {
        let run = {
            let mut shared = self.lock();
            shared.run += 1;
            shared.state.is_optimizing = true;
            shared.run
        };

        let outcome = match tokio::task::spawn_blocking(job).await {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("Optimization task failed: {e}")),
        };

        let mut shared = self.lock();
        if shared.run != run {
            info!(kind, run, "Discarding superseded optimization");
            return outcome;
        }
        shared.state.is_optimizing = false;
        match &outcome {
            Ok(results) => {
                shared.state.results = Some(results.clone());
                shared.state.optimization_error = None;
            }
            Err(message) => {
                warn!(kind, error = %message, "Optimization failed");
                shared.state.results = None;
                shared.state.optimization_error = Some(message.clone());
            }
        }
        outcome
    }

    fn clear(&self) {
        let mut shared = self.lock();
        shared.run += 1;
        shared.state = StoreState::default();
    }
}

/// Holds the outcome of level path searches.
#[derive(Clone)]
pub struct PathExplorerStore {
    inner: OptimizerStore<Vec<LevelPath>>,
}

impl Default for PathExplorerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PathExplorerStore {
    pub fn new() -> Self {
        Self {
            inner: OptimizerStore::new(),
        }
    }

    /// Search level paths for `template` on a blocking task.
    ///
    /// On success the paths replace any previous results; on failure the
    /// results are cleared and the message is kept in
    /// [`Self::optimization_error`]. If another run starts before this one
    /// finishes, only the later run updates the store.
    pub async fn run_optimization(
        &self,
        template: BuildConfiguration,
        config: PathOptimizerConfig,
    ) -> Result<Vec<LevelPath>, String> {
        self.inner
            .run("paths", move || PathOptimizer::new(config).optimize(&template))
            .await
    }

    pub fn is_optimizing(&self) -> bool {
        self.inner.lock().state.is_optimizing
    }

    pub fn results(&self) -> Option<Vec<LevelPath>> {
        self.inner.lock().state.results.clone()
    }

    pub fn optimization_error(&self) -> Option<String> {
        self.inner.lock().state.optimization_error.clone()
    }

    pub fn state(&self) -> StoreState<Vec<LevelPath>> {
        self.inner.snapshot()
    }

    /// Forget results and errors. A run in flight no longer updates the store.
    pub fn clear(&self) {
        self.inner.clear();
    }
}

/// Holds the outcome of combat round optimizations.
#[derive(Clone)]
pub struct CombatOptimizerStore {
    inner: OptimizerStore<CombatOptimizationResult>,
}

impl Default for CombatOptimizerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CombatOptimizerStore {
    pub fn new() -> Self {
        Self {
            inner: OptimizerStore::new(),
        }
    }

    pub async fn run_optimization(
        &self,
        build: BuildConfiguration,
        config: CombatOptimizationConfig,
    ) -> Result<CombatOptimizationResult, String> {
        self.inner
            .run("combat", move || {
                CombatRoundOptimizer::new(config).find_optimal_sequence(&build)
            })
            .await
    }

    pub fn is_optimizing(&self) -> bool {
        self.inner.lock().state.is_optimizing
    }

    pub fn results(&self) -> Option<CombatOptimizationResult> {
        self.inner.lock().state.results.clone()
    }

    pub fn optimization_error(&self) -> Option<String> {
        self.inner.lock().state.optimization_error.clone()
    }

    pub fn state(&self) -> StoreState<CombatOptimizationResult> {
        self.inner.snapshot()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CharacterClass;
    use crate::testing::sample_fighter;

    fn fighter_only() -> PathOptimizerConfig {
        PathOptimizerConfig::default().with_classes(&[CharacterClass::Fighter])
    }

    #[tokio::test]
    async fn test_path_store_success() {
        let store = PathExplorerStore::new();
        assert_eq!(store.state(), StoreState::default());

        let paths = store
            .run_optimization(sample_fighter(1), fighter_only())
            .await
            .unwrap();

        assert!(!store.is_optimizing());
        assert_eq!(store.results(), Some(paths));
        assert_eq!(store.optimization_error(), None);
    }

    #[tokio::test]
    async fn test_path_store_failure_clears_results() {
        let store = PathExplorerStore::new();
        store
            .run_optimization(sample_fighter(1), fighter_only())
            .await
            .unwrap();
        assert!(store.results().is_some());

        let err = store
            .run_optimization(sample_fighter(1), PathOptimizerConfig::default().with_beam_width(0))
            .await
            .unwrap_err();

        assert!(err.contains("beam width"));
        assert_eq!(store.results(), None);
        assert_eq!(store.optimization_error(), Some(err));
        assert!(!store.is_optimizing());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = PathExplorerStore::new();
        let view = store.clone();
        store
            .run_optimization(sample_fighter(1), fighter_only())
            .await
            .unwrap();
        assert!(view.results().is_some());

        view.clear();
        assert_eq!(store.state(), StoreState::default());
    }

    #[tokio::test]
    async fn test_combat_store() {
        let store = CombatOptimizerStore::new();
        let result = store
            .run_optimization(sample_fighter(5), CombatOptimizationConfig::default())
            .await
            .unwrap();
        assert_eq!(result.rounds.len(), 3);
        assert_eq!(store.results(), Some(result));

        let bad = CombatOptimizationConfig::default().with_num_targets(0);
        assert!(store.run_optimization(sample_fighter(5), bad).await.is_err());
        assert_eq!(store.results(), None);
        assert!(store.optimization_error().is_some());
    }
}
