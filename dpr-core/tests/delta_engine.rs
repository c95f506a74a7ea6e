//! End-to-end tests of the delta engine against the real DPR worker.
//!
//! Run with: `cargo test -p dpr-core --test delta_engine`

use dpr_core::testing::{sample_fighter, sample_paladin};
use dpr_core::{
    BuildConfiguration, DeltaEngine, DeltaTrend, DprConfiguration, DprWorker, EngineSettings,
    Toggle,
};
use std::sync::Arc;
use std::time::Duration;

fn settings() -> EngineSettings {
    EngineSettings::default().with_debounce(Duration::from_millis(20))
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// =============================================================================
// Worker-backed deltas
// =============================================================================

#[tokio::test]
async fn test_haste_delta_through_worker() {
    let (worker, task) = DprWorker::spawn(8);
    let engine = DeltaEngine::new(Arc::new(worker.clone()), settings());

    let id = engine.calculate_toggle_delta(
        &Toggle::Buff("haste".to_string()),
        &sample_fighter(5),
        &DprConfiguration::default(),
    );
    assert_eq!(id, "buff-haste");

    let state = engine.wait_for(&id).await.expect("delta should resolve");
    assert!(state.error.is_none(), "unexpected error: {:?}", state.error);
    // One extra greatsword attack: 17.55 - 11.7
    assert!(close(state.value, 5.85), "delta was {}", state.value);
    assert_eq!(state.trend(), DeltaTrend::Positive);

    let metrics = state.additional_metrics.unwrap();
    assert!(close(metrics.base_dpr, 11.7));
    assert!(close(metrics.modified_dpr, 17.55));

    worker.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_toggle_of_applied_buff_measures_its_value() {
    let (worker, _task) = DprWorker::spawn(8);
    let engine = DeltaEngine::new(Arc::new(worker), settings());
    let hasted = sample_fighter(5).with_buff("haste");

    let id = engine.calculate_toggle_delta(
        &Toggle::Buff("haste".to_string()),
        &hasted,
        &DprConfiguration::default(),
    );
    let state = engine.wait_for(&id).await.unwrap();
    assert!(close(state.value, 5.85), "delta was {}", state.value);
}

#[tokio::test]
async fn test_many_identifiers_resolve_independently() {
    let (worker, _task) = DprWorker::spawn(8);
    let engine = DeltaEngine::new(Arc::new(worker), settings());
    let config = DprConfiguration::default();
    let base = sample_paladin(5);

    let toggles = [
        Toggle::Buff("bless".to_string()),
        Toggle::Buff("haste".to_string()),
        Toggle::Feat("gwm".to_string()),
    ];
    let ids: Vec<String> = toggles
        .iter()
        .map(|t| engine.calculate_toggle_delta(t, &base, &config))
        .collect();

    for id in &ids {
        let state = engine.wait_for(id).await.unwrap();
        assert!(!state.is_calculating);
        assert!(state.error.is_none(), "{id}: {:?}", state.error);
    }
    assert!(engine.get_delta("buff-bless").unwrap().value > 0.0);
    assert!(engine.get_delta("buff-haste").unwrap().value > 0.0);

    let mut known = engine.delta_ids();
    known.sort();
    assert_eq!(known, vec!["buff-bless", "buff-haste", "feat-gwm"]);
}

#[tokio::test]
async fn test_missing_target_ac_reports_error() {
    let (worker, _task) = DprWorker::spawn(8);
    let engine = DeltaEngine::new(Arc::new(worker), settings().with_target_ac(35));
    let base = sample_fighter(5);

    engine.calculate_delta(
        "buff-bless",
        &base,
        &base.clone().with_buff("bless"),
        &DprConfiguration::default(),
    );
    let state = engine.wait_for("buff-bless").await.unwrap();

    assert_eq!(state.value, 0.0);
    assert!(state.error.unwrap().contains("35"));
}

#[tokio::test]
async fn test_invalid_build_reports_error() {
    let (worker, _task) = DprWorker::spawn(8);
    let engine = DeltaEngine::new(Arc::new(worker), settings());
    let base = sample_fighter(5);
    let broken: BuildConfiguration = base.clone().with_main_hand("vorpal-spoon");

    engine.calculate_delta("broken", &base, &broken, &DprConfiguration::default());
    let state = engine.wait_for("broken").await.unwrap();

    assert!(!state.is_calculating);
    assert_eq!(state.value, 0.0);
    assert!(state.error.is_some());
}

#[tokio::test]
async fn test_worker_shutdown_surfaces_error() {
    let (worker, task) = DprWorker::spawn(8);
    let engine = DeltaEngine::new(Arc::new(worker.clone()), settings());
    worker.shutdown().await.unwrap();
    task.await.unwrap();

    let base = sample_fighter(5);
    let blessed = base.clone().with_buff("bless");
    engine.calculate_delta("late", &base, &blessed, &DprConfiguration::default());
    let state = engine.wait_for("late").await.unwrap();
    assert!(state.error.is_some());
}
