//! Delta engine: the DPR impact of toggling one build option.
//!
//! Each request is keyed by a caller-chosen identifier (`buff-haste`,
//! `feat-gwm`, ...). A request marks its identifier as calculating right
//! away, then waits out a trailing-edge debounce; a newer request for the same
//! identifier aborts the pending timer and takes its place. When the timer
//! fires, the baseline and modified curves are calculated concurrently and
//! the signed difference at the target AC is recorded.
//!
//! Once a firing has started it runs to completion, but every request carries
//! a generation number and only the latest generation for an identifier may
//! write its record. Results from superseded or cleared requests are dropped.

use crate::build::{BuildConfiguration, Toggle};
use crate::dice::Advantage;
use crate::dpr::{DprConfiguration, DprCurves, DprError};
use crate::settings::EngineSettings;
use crate::worker::DprCurveCalculator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Deltas with magnitude at or below this are neutral.
pub const NEUTRAL_THRESHOLD: f64 = 0.05;

/// Why a delta could not be computed. Stored on the record as a message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeltaError {
    #[error("Calculation failed: {0}")]
    CalculationFailure(String),

    #[error("No DPR data at AC {target_ac}")]
    DataNotFound { target_ac: i32 },

    #[error("Calculation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<DprError> for DeltaError {
    fn from(err: DprError) -> Self {
        DeltaError::CalculationFailure(err.to_string())
    }
}

/// The DPR values behind a delta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalMetrics {
    pub base_dpr: f64,
    pub modified_dpr: f64,
    /// Relative change in percent; `None` when the baseline is zero.
    pub percent_change: Option<f64>,
}

impl AdditionalMetrics {
    fn new(base_dpr: f64, modified_dpr: f64) -> Self {
        let percent_change = if base_dpr.abs() > f64::EPSILON {
            Some((modified_dpr - base_dpr) / base_dpr * 100.0)
        } else {
            None
        };
        Self {
            base_dpr,
            modified_dpr,
            percent_change,
        }
    }
}

/// Current state of one delta identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaState {
    pub value: f64,
    pub is_calculating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_metrics: Option<AdditionalMetrics>,
}

impl DeltaState {
    /// Calculating, carrying the last value forward.
    fn calculating(previous: Option<&DeltaState>) -> Self {
        Self {
            value: previous.map_or(0.0, |s| s.value),
            is_calculating: true,
            error: None,
            additional_metrics: previous.and_then(|s| s.additional_metrics),
        }
    }

    fn resolved(metrics: AdditionalMetrics) -> Self {
        Self {
            value: metrics.modified_dpr - metrics.base_dpr,
            is_calculating: false,
            error: None,
            additional_metrics: Some(metrics),
        }
    }

    fn failed(error: &DeltaError) -> Self {
        Self {
            value: 0.0,
            is_calculating: false,
            error: Some(error.to_string()),
            additional_metrics: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn trend(&self) -> DeltaTrend {
        DeltaTrend::classify(self.value, NEUTRAL_THRESHOLD)
    }
}

/// Presentation classification of a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaTrend {
    Positive,
    Negative,
    Neutral,
}

impl DeltaTrend {
    pub fn classify(value: f64, threshold: f64) -> Self {
        if value.abs() <= threshold {
            DeltaTrend::Neutral
        } else if value > 0.0 {
            DeltaTrend::Positive
        } else {
            DeltaTrend::Negative
        }
    }
}

/// A change to one identifier's record. `state` is `None` when it was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaUpdate {
    pub id: String,
    pub state: Option<DeltaState>,
}

struct Entry {
    state: DeltaState,
    generation: u64,
    /// Debounce timer; `None` once the calculation has started.
    pending: Option<JoinHandle<()>>,
}

struct Inner {
    calculator: Arc<dyn DprCurveCalculator>,
    settings: EngineSettings,
    entries: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
    updates: broadcast::Sender<DeltaUpdate>,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, id: &str, state: Option<DeltaState>) {
        // No receivers is fine.
        let _ = self.updates.send(DeltaUpdate {
            id: id.to_string(),
            state,
        });
    }

    /// Called by the timer when the debounce elapses. Returns whether this
    /// generation is still current.
    fn start(&self, id: &str, generation: u64) -> bool {
        let mut entries = self.entries();
        match entries.get_mut(id) {
            Some(entry) if entry.generation == generation => {
                entry.pending = None;
                true
            }
            _ => false,
        }
    }

    fn complete(&self, id: &str, generation: u64, outcome: Result<AdditionalMetrics, DeltaError>) {
        let state = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(id) else {
                debug!(delta = id, generation, "Delta cleared before completion");
                return;
            };
            if entry.generation != generation {
                debug!(
                    delta = id,
                    generation,
                    latest = entry.generation,
                    "Discarding stale delta result"
                );
                return;
            }
            entry.state = match &outcome {
                Ok(metrics) => DeltaState::resolved(*metrics),
                Err(err) => {
                    warn!(delta = id, error = %err, "Delta calculation failed");
                    DeltaState::failed(err)
                }
            };
            entry.state.clone()
        };
        debug!(delta = id, value = state.value, "Delta resolved");
        self.publish(id, Some(state));
    }

    async fn fire(
        self: Arc<Self>,
        id: String,
        generation: u64,
        request: DeltaRequest,
    ) {
        if !self.start(&id, generation) {
            return;
        }
        debug!(delta = %id, generation, "Delta debounce elapsed, calculating");

        let timeout = self.settings.calculation_timeout();
        let calculator = self.calculator.clone();
        let outcome = tokio::time::timeout(timeout, async {
            calculator.ready().await;
            compute_delta(calculator.as_ref(), &request).await
        })
        .await
        .unwrap_or(Err(DeltaError::Timeout(timeout)));

        self.complete(&id, generation, outcome);
    }
}

/// Inputs captured by one request.
struct DeltaRequest {
    base: BuildConfiguration,
    modified: BuildConfiguration,
    config: DprConfiguration,
    target_ac: i32,
}

fn require_curves(
    result: Result<Option<DprCurves>, DprError>,
    which: &str,
) -> Result<DprCurves, DeltaError> {
    match result {
        Ok(Some(curves)) => Ok(curves),
        Ok(None) => Err(DeltaError::CalculationFailure(format!(
            "no {which} curve returned"
        ))),
        Err(err) => Err(DeltaError::CalculationFailure(format!("{which} build: {err}"))),
    }
}

fn dpr_at(curves: &DprCurves, advantage: Advantage, target_ac: i32) -> Result<f64, DeltaError> {
    curves
        .dpr_at(advantage, target_ac)
        .ok_or(DeltaError::DataNotFound { target_ac })
}

async fn compute_delta(
    calculator: &dyn DprCurveCalculator,
    request: &DeltaRequest,
) -> Result<AdditionalMetrics, DeltaError> {
    let (base, modified) = futures::join!(
        calculator.calculate_dpr_curves(&request.base, &request.config),
        calculator.calculate_dpr_curves(&request.modified, &request.config),
    );
    let base = require_curves(base, "base")?;
    let modified = require_curves(modified, "modified")?;

    let advantage = request.config.advantage_state;
    let base_dpr = dpr_at(&base, advantage, request.target_ac)?;
    let modified_dpr = dpr_at(&modified, advantage, request.target_ac)?;
    Ok(AdditionalMetrics::new(base_dpr, modified_dpr))
}

/// Computes and tracks per-identifier DPR deltas.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct DeltaEngine {
    inner: Arc<Inner>,
}

impl DeltaEngine {
    pub fn new(calculator: Arc<dyn DprCurveCalculator>, settings: EngineSettings) -> Self {
        let (updates, _) = broadcast::channel(settings.update_channel_size.max(1));
        Self {
            inner: Arc::new(Inner {
                calculator,
                settings,
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                updates,
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Schedule a delta at the configured target AC and debounce.
    ///
    /// Must be called from within a tokio runtime.
    pub fn calculate_delta(
        &self,
        delta_id: impl Into<String>,
        base_build: &BuildConfiguration,
        modified_build: &BuildConfiguration,
        config: &DprConfiguration,
    ) {
        let settings = &self.inner.settings;
        self.calculate_delta_with(
            delta_id,
            base_build,
            modified_build,
            config,
            settings.target_ac,
            settings.debounce(),
        );
    }

    /// Schedule a delta with an explicit target AC and debounce.
    pub fn calculate_delta_with(
        &self,
        delta_id: impl Into<String>,
        base_build: &BuildConfiguration,
        modified_build: &BuildConfiguration,
        config: &DprConfiguration,
        target_ac: i32,
        debounce: Duration,
    ) {
        let id = delta_id.into();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let request = DeltaRequest {
            base: base_build.clone(),
            modified: modified_build.clone(),
            config: config.clone(),
            target_ac,
        };

        let state = {
            let mut entries = self.inner.entries();
            let previous = entries.remove(&id);
            if let Some(handle) = previous.as_ref().and_then(|e| e.pending.as_ref()) {
                handle.abort();
            }

            let inner = self.inner.clone();
            let task_id = id.clone();
            let pending = tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                inner.fire(task_id, generation, request).await;
            });

            let state = DeltaState::calculating(previous.as_ref().map(|e| &e.state));
            entries.insert(
                id.clone(),
                Entry {
                    state: state.clone(),
                    generation,
                    pending: Some(pending),
                },
            );
            state
        };

        debug!(delta = %id, generation, target_ac, ?debounce, "Delta scheduled");
        self.inner.publish(&id, Some(state));
    }

    /// Schedule the delta of one toggle, returning its identifier.
    ///
    /// The delta is always "with the option" minus "without it": if the
    /// base build already has the option, it is removed for the baseline.
    pub fn calculate_toggle_delta(
        &self,
        toggle: &Toggle,
        base_build: &BuildConfiguration,
        config: &DprConfiguration,
    ) -> String {
        let settings = &self.inner.settings;
        self.calculate_toggle_delta_with(
            toggle,
            base_build,
            config,
            settings.target_ac,
            settings.debounce(),
        )
    }

    /// [`Self::calculate_toggle_delta`] with an explicit target AC and debounce.
    pub fn calculate_toggle_delta_with(
        &self,
        toggle: &Toggle,
        base_build: &BuildConfiguration,
        config: &DprConfiguration,
        target_ac: i32,
        debounce: Duration,
    ) -> String {
        let id = toggle.delta_id();
        let (without, with) = if toggle.is_applied(base_build, config.include_round0_buffs) {
            (toggle.remove(base_build), base_build.clone())
        } else {
            (base_build.clone(), toggle.apply(base_build))
        };
        self.calculate_delta_with(id.clone(), &without, &with, config, target_ac, debounce);
        id
    }

    pub fn get_delta(&self, delta_id: &str) -> Option<DeltaState> {
        self.inner.entries().get(delta_id).map(|e| e.state.clone())
    }

    /// Identifiers with a record.
    pub fn delta_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.entries().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Cancel any pending timer for `delta_id` and remove its record.
    pub fn clear_delta(&self, delta_id: &str) {
        let removed = self.inner.entries().remove(delta_id);
        if let Some(entry) = removed {
            if let Some(handle) = entry.pending {
                handle.abort();
            }
            debug!(delta = delta_id, "Delta cleared");
            self.inner.publish(delta_id, None);
        }
    }

    /// Cancel every pending timer and remove every record.
    pub fn clear_all_deltas(&self) {
        let removed: Vec<(String, Entry)> = self.inner.entries().drain().collect();
        for (id, entry) in removed {
            if let Some(handle) = entry.pending {
                handle.abort();
            }
            self.inner.publish(&id, None);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeltaUpdate> {
        self.inner.updates.subscribe()
    }

    /// Wait until `delta_id` is no longer calculating. Returns the final
    /// state, or `None` if the identifier has no record.
    pub async fn wait_for(&self, delta_id: &str) -> Option<DeltaState> {
        let mut updates = self.subscribe();
        loop {
            match self.get_delta(delta_id) {
                Some(state) if state.is_calculating => {}
                other => return other,
            }
            loop {
                match updates.recv().await {
                    Ok(update) if update.id == delta_id => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return self.get_delta(delta_id),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_fighter, MockCalculator, MockResponse};
    use crate::worker::LocalCalculator;
    use tokio::time::{sleep, Instant};

    const DEBOUNCE: Duration = Duration::from_millis(200);

    fn engine(mock: Arc<MockCalculator>) -> DeltaEngine {
        DeltaEngine::new(mock, EngineSettings::default())
    }

    /// 40 DPR without haste, 52 with.
    fn haste_mock() -> Arc<MockCalculator> {
        Arc::new(MockCalculator::flat(|b| {
            if b.active_buffs.contains("haste") {
                52.0
            } else {
                40.0
            }
        }))
    }

    fn haste_builds() -> (BuildConfiguration, BuildConfiguration) {
        let base = sample_fighter(5);
        let modified = base.clone().with_buff("haste");
        (base, modified)
    }

    #[tokio::test(start_paused = true)]
    async fn test_haste_delta() {
        let mock = haste_mock();
        let engine = engine(mock.clone());
        let (base, modified) = haste_builds();

        engine.calculate_delta("buff-haste", &base, &modified, &DprConfiguration::default());
        let state = engine.wait_for("buff-haste").await.unwrap();

        assert_eq!(state.value, 12.0);
        assert!(!state.is_calculating);
        assert!(state.error.is_none());
        let metrics = state.additional_metrics.unwrap();
        assert_eq!(metrics.base_dpr, 40.0);
        assert_eq!(metrics.modified_dpr, 52.0);
        assert_eq!(metrics.percent_change, Some(30.0));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marks_calculating_synchronously() {
        let engine = engine(haste_mock());
        let mut updates = engine.subscribe();
        let (base, modified) = haste_builds();

        engine.calculate_delta("buff-haste", &base, &modified, &DprConfiguration::default());

        assert!(engine.get_delta("buff-haste").unwrap().is_calculating);
        let update = updates.try_recv().unwrap();
        assert_eq!(update.id, "buff-haste");
        assert!(update.state.unwrap().is_calculating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_collapses_rapid_calls() {
        let mock = haste_mock();
        let engine = engine(mock.clone());
        let (base, modified) = haste_builds();

        for _ in 0..5 {
            engine.calculate_delta("buff-haste", &base, &modified, &DprConfiguration::default());
            sleep(Duration::from_millis(20)).await;
        }
        engine.wait_for("buff-haste").await;

        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_timed_from_last_call() {
        let mock = Arc::new(MockCalculator::flat(|b| if b.has_feat("gwm") { 30.0 } else { 25.0 }));
        let engine = engine(mock.clone());
        let base = sample_fighter(8);
        let modified = Toggle::Feat("gwm".to_string()).apply(&base);
        let config = DprConfiguration::default();

        let start = Instant::now();
        engine.calculate_delta_with("feat-gwm", &base, &modified, &config, 16, DEBOUNCE);
        sleep(Duration::from_millis(50)).await;
        engine.calculate_delta_with("feat-gwm", &base, &modified, &config, 16, DEBOUNCE);
        let state = engine.wait_for("feat-gwm").await.unwrap();

        assert_eq!(state.value, 5.0);
        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        for call in calls {
            let elapsed = call.at.duration_since(start);
            assert!(elapsed >= Duration::from_millis(250), "fired at {elapsed:?}");
            assert!(elapsed < Duration::from_millis(260), "fired at {elapsed:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_modified_failure_is_captured() {
        let mock = Arc::new(MockCalculator::new(|b| {
            if b.active_buffs.contains("haste") {
                MockResponse::Fail("worker crashed".to_string())
            } else {
                MockResponse::Flat(40.0)
            }
        }));
        let engine = engine(mock);
        let (base, modified) = haste_builds();

        engine.calculate_delta("buff-haste", &base, &modified, &DprConfiguration::default());
        let state = engine.wait_for("buff-haste").await.unwrap();

        assert_eq!(state.value, 0.0);
        assert!(!state.is_calculating);
        assert!(state.error.unwrap().contains("worker crashed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_is_failure() {
        let engine = engine(Arc::new(MockCalculator::new(|_| MockResponse::Empty)));
        let (base, modified) = haste_builds();

        engine.calculate_delta("buff-haste", &base, &modified, &DprConfiguration::default());
        let state = engine.wait_for("buff-haste").await.unwrap();
        assert!(state.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_ac_is_error() {
        let engine = engine(haste_mock());
        let (base, modified) = haste_builds();
        let config = DprConfiguration {
            ac_min: 18,
            ac_max: 24,
            ..Default::default()
        };

        engine.calculate_delta("buff-haste", &base, &modified, &config);
        let state = engine.wait_for("buff-haste").await.unwrap();

        assert_eq!(state.value, 0.0);
        assert_eq!(
            state.error.as_deref(),
            Some(DeltaError::DataNotFound { target_ac: 16 }.to_string().as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_identifiers_are_independent() {
        let engine = engine(haste_mock());
        let (base, modified) = haste_builds();
        let config = DprConfiguration::default();

        engine.calculate_delta("buff-haste", &base, &modified, &config);
        let haste = engine.wait_for("buff-haste").await.unwrap();

        engine.calculate_delta("buff-bless", &base, &base, &config);
        assert_eq!(engine.get_delta("buff-haste"), Some(haste.clone()));
        let bless = engine.wait_for("buff-bless").await.unwrap();

        assert_eq!(bless.value, 0.0);
        assert_eq!(engine.get_delta("buff-haste"), Some(haste));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_is_idempotent() {
        let engine = engine(haste_mock());
        let (base, modified) = haste_builds();
        engine.calculate_delta("buff-haste", &base, &modified, &DprConfiguration::default());
        engine.wait_for("buff-haste").await;

        assert_eq!(engine.get_delta("buff-haste"), engine.get_delta("buff-haste"));
        assert_eq!(engine.get_delta("never-requested"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_swapping_builds_negates() {
        let engine = engine(haste_mock());
        let (base, modified) = haste_builds();
        let config = DprConfiguration::default();

        engine.calculate_delta("on", &base, &modified, &config);
        engine.calculate_delta("off", &modified, &base, &config);
        let on = engine.wait_for("on").await.unwrap().value;
        let off = engine.wait_for("off").await.unwrap().value;

        assert!((on + off).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_pending_timer() {
        let mock = haste_mock();
        let engine = engine(mock.clone());
        let mut updates = engine.subscribe();
        let (base, modified) = haste_builds();

        engine.calculate_delta("buff-haste", &base, &modified, &DprConfiguration::default());
        engine.clear_delta("buff-haste");
        assert_eq!(engine.get_delta("buff-haste"), None);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.get_delta("buff-haste"), None);
        assert_eq!(mock.call_count(), 0);

        // calculating, then removed; nothing later
        assert!(updates.try_recv().unwrap().state.is_some());
        assert_eq!(updates.try_recv().unwrap().state, None);
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_in_flight_result() {
        let mock = Arc::new(MockCalculator::flat(|_| 10.0).with_delay(Duration::from_millis(500)));
        let engine = engine(mock.clone());
        let (base, modified) = haste_builds();

        engine.calculate_delta("buff-haste", &base, &modified, &DprConfiguration::default());
        sleep(Duration::from_millis(300)).await;
        assert_eq!(mock.call_count(), 2);

        engine.clear_delta("buff-haste");
        sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.get_delta("buff-haste"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all() {
        let mock = haste_mock();
        let engine = engine(mock.clone());
        let (base, modified) = haste_builds();
        let config = DprConfiguration::default();

        engine.calculate_delta("a", &base, &modified, &config);
        engine.calculate_delta("b", &base, &modified, &config);
        assert_eq!(engine.delta_ids(), vec!["a".to_string(), "b".to_string()]);

        engine.clear_all_deltas();
        sleep(Duration::from_secs(1)).await;

        assert!(engine.delta_ids().is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_is_discarded() {
        // First request: haste (delta 12). Second: bless (delta 5).
        let mock = Arc::new(
            MockCalculator::flat(|b| {
                if b.active_buffs.contains("haste") {
                    52.0
                } else if b.active_buffs.contains("bless") {
                    45.0
                } else {
                    40.0
                }
            })
            .with_delay(Duration::from_millis(500)),
        );
        let engine = engine(mock.clone());
        let base = sample_fighter(5);
        let hasted = base.clone().with_buff("haste");
        let blessed = base.clone().with_buff("bless");
        let config = DprConfiguration::default();

        engine.calculate_delta("pick", &base, &hasted, &config);
        // First firing is in flight from 200ms until 700ms.
        sleep(Duration::from_millis(300)).await;
        engine.calculate_delta("pick", &base, &blessed, &config);

        sleep(Duration::from_millis(450)).await;
        let state = engine.get_delta("pick").unwrap();
        assert!(state.is_calculating);
        assert_ne!(state.value, 12.0);

        let state = engine.wait_for("pick").await.unwrap();
        assert_eq!(state.value, 5.0);
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_to_error() {
        let mock = Arc::new(MockCalculator::flat(|_| 1.0).with_delay(Duration::from_secs(60)));
        let settings = EngineSettings::default().with_calculation_timeout(Duration::from_secs(1));
        let engine = DeltaEngine::new(mock, settings);
        let (base, modified) = haste_builds();

        engine.calculate_delta("slow", &base, &modified, &DprConfiguration::default());
        let state = engine.wait_for("slow").await.unwrap();

        assert!(!state.is_calculating);
        assert!(state.error.unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_calculator_readiness() {
        let mock = Arc::new(
            MockCalculator::flat(|b| if b.active_buffs.is_empty() { 40.0 } else { 52.0 })
                .not_ready(),
        );
        let engine = engine(mock.clone());
        let (base, modified) = haste_builds();

        engine.calculate_delta("buff-haste", &base, &modified, &DprConfiguration::default());
        sleep(Duration::from_millis(500)).await;
        assert_eq!(mock.call_count(), 0);
        assert!(engine.get_delta("buff-haste").unwrap().is_calculating);

        mock.set_ready(true);
        let state = engine.wait_for("buff-haste").await.unwrap();
        assert_eq!(state.value, 12.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_delta_uses_toggle_id() {
        let engine = engine(haste_mock());
        let base = sample_fighter(5);

        let id = engine.calculate_toggle_delta(
            &Toggle::Buff("haste".to_string()),
            &base,
            &DprConfiguration::default(),
        );
        assert_eq!(id, "buff-haste");
        assert_eq!(engine.wait_for(&id).await.unwrap().value, 12.0);

        // Already applied: still measured as "with" minus "without".
        let hasted = base.with_buff("haste");
        engine.calculate_toggle_delta(
            &Toggle::Buff("haste".to_string()),
            &hasted,
            &DprConfiguration::default(),
        );
        assert_eq!(engine.wait_for(&id).await.unwrap().value, 12.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_delta_sees_round0_buffs() {
        let engine = DeltaEngine::new(Arc::new(LocalCalculator), EngineSettings::default());
        let haste = Toggle::Buff("haste".to_string());
        let close = |value: f64| (value - 5.85).abs() < 1e-9;

        // Round-0 haste is already in the curve, so the baseline drops it.
        let opener = sample_fighter(5).with_round0_buff("haste");
        let id = engine.calculate_toggle_delta(&haste, &opener, &DprConfiguration::default());
        let state = engine.wait_for(&id).await.unwrap();
        assert!(close(state.value), "delta was {}", state.value);

        // With round-0 buffs excluded the toggle adds haste instead.
        let config = DprConfiguration::default().with_round0_buffs(false);
        engine.calculate_toggle_delta(&haste, &opener, &config);
        let state = engine.wait_for(&id).await.unwrap();
        assert!(close(state.value), "delta was {}", state.value);
    }

    #[test]
    fn test_neutral_banding() {
        assert_eq!(DeltaTrend::classify(0.05, NEUTRAL_THRESHOLD), DeltaTrend::Neutral);
        assert_eq!(DeltaTrend::classify(-0.05, NEUTRAL_THRESHOLD), DeltaTrend::Neutral);
        assert_eq!(DeltaTrend::classify(1e-12, NEUTRAL_THRESHOLD), DeltaTrend::Neutral);
        assert_eq!(DeltaTrend::classify(0.051, NEUTRAL_THRESHOLD), DeltaTrend::Positive);
        assert_eq!(DeltaTrend::classify(-0.06, NEUTRAL_THRESHOLD), DeltaTrend::Negative);
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let state = DeltaState::resolved(AdditionalMetrics::new(40.0, 52.0));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["isCalculating"], false);
        assert_eq!(json["additionalMetrics"]["baseDpr"], 40.0);
        assert!(json.get("error").is_none());
    }
}
