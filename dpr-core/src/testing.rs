//! Testing utilities.
//!
//! This module provides tools for deterministic tests:
//! - `MockCalculator` for scripted DPR curves without running the math
//! - Sample builds for common archetypes

use crate::build::{AbilityScores, BuildConfiguration};
use crate::catalog::CharacterClass;
use crate::dpr::{DprConfiguration, DprCurves, DprError, DprPoint};
use crate::worker::DprCurveCalculator;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// A scripted response from the mock calculator.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// The same DPR at every AC, on every curve.
    Flat(f64),
    /// Exactly these curves.
    Curves(DprCurves),
    /// `Ok(None)`: the calculator produced nothing.
    Empty,
    /// A calculation error with this message.
    Fail(String),
}

/// One recorded call to the mock calculator.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub build: BuildConfiguration,
    pub config: DprConfiguration,
    /// When the call started (tokio clock, so paused-time tests can assert on it).
    pub at: Instant,
}

type Script = Box<dyn Fn(&BuildConfiguration) -> MockResponse + Send + Sync>;

/// A calculator that returns scripted responses.
///
/// The script picks a response per build, so a test can distinguish the
/// baseline and modified variant of a delta by what differs between them.
pub struct MockCalculator {
    script: Script,
    /// Simulated calculation time.
    delay: Duration,
    ready_tx: watch::Sender<bool>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockCalculator {
    /// Create a ready mock with a response script.
    pub fn new(script: impl Fn(&BuildConfiguration) -> MockResponse + Send + Sync + 'static) -> Self {
        let (ready_tx, _) = watch::channel(true);
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            ready_tx,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Flat curves whose value is chosen per build.
    pub fn flat(dpr: impl Fn(&BuildConfiguration) -> f64 + Send + Sync + 'static) -> Self {
        Self::new(move |build| MockResponse::Flat(dpr(build)))
    }

    /// Every calculation fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_| MockResponse::Fail(message.clone()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Start out not ready; calls to `ready()` wait until [`Self::set_ready`].
    pub fn not_ready(self) -> Self {
        self.ready_tx.send_replace(false);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready_tx.send_replace(ready);
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock_calls().clone()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<MockCall>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn flat_curves(dpr: f64, config: &DprConfiguration) -> DprCurves {
    let curve: Vec<DprPoint> = config
        .ac_values()
        .into_iter()
        .map(|ac| DprPoint { ac, dpr })
        .collect();
    DprCurves {
        normal_curve: curve.clone(),
        advantage_curve: curve.clone(),
        disadvantage_curve: curve,
    }
}

#[async_trait]
impl DprCurveCalculator for MockCalculator {
    async fn ready(&self) {
        let mut ready_rx = self.ready_tx.subscribe();
        let _ = ready_rx.wait_for(|ready| *ready).await;
    }

    async fn calculate_dpr_curves(
        &self,
        build: &BuildConfiguration,
        config: &DprConfiguration,
    ) -> Result<Option<DprCurves>, DprError> {
        self.lock_calls().push(MockCall {
            build: build.clone(),
            config: config.clone(),
            at: Instant::now(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match (self.script)(build) {
            MockResponse::Flat(dpr) => Ok(Some(flat_curves(dpr, config))),
            MockResponse::Curves(curves) => Ok(Some(curves)),
            MockResponse::Empty => Ok(None),
            MockResponse::Fail(message) => Err(DprError::Failed(message)),
        }
    }
}

/// A single-classed greatsword fighter.
pub fn sample_fighter(level: u8) -> BuildConfiguration {
    BuildConfiguration::new("Sample Fighter")
        .with_ability_scores(AbilityScores::new(16, 14, 14, 10, 12, 10))
        .with_levels(CharacterClass::Fighter, level)
        .with_main_hand("greatsword")
}

/// A longsword-and-shield paladin.
pub fn sample_paladin(level: u8) -> BuildConfiguration {
    BuildConfiguration::new("Sample Paladin")
        .with_ability_scores(AbilityScores::new(16, 10, 14, 8, 10, 14))
        .with_levels(CharacterClass::Paladin, level)
        .with_main_hand("longsword")
        .with_shield()
}

/// An Eldritch Blast warlock with Agonizing Blast.
pub fn sample_warlock(level: u8) -> BuildConfiguration {
    BuildConfiguration::new("Sample Warlock")
        .with_ability_scores(AbilityScores::new(8, 14, 14, 10, 12, 16))
        .with_levels(CharacterClass::Warlock, level)
        .with_main_hand("eldritch-blast")
        .with_invocation("agonizing-blast")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::Advantage;

    #[tokio::test]
    async fn test_flat_script() {
        let mock = MockCalculator::flat(|b| if b.active_buffs.is_empty() { 40.0 } else { 52.0 });
        let config = DprConfiguration::default();
        let base = sample_fighter(5);
        let hasted = base.clone().with_buff("haste");

        let curves = mock.calculate_dpr_curves(&base, &config).await.unwrap().unwrap();
        assert_eq!(curves.dpr_at(Advantage::Normal, 16), Some(40.0));
        let curves = mock.calculate_dpr_curves(&hasted, &config).await.unwrap().unwrap();
        assert_eq!(curves.dpr_at(Advantage::Disadvantage, 30), Some(52.0));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_and_empty() {
        let config = DprConfiguration::default();
        let failing = MockCalculator::failing("boom");
        assert_eq!(
            failing.calculate_dpr_curves(&sample_fighter(1), &config).await,
            Err(DprError::Failed("boom".to_string()))
        );

        let empty = MockCalculator::new(|_| MockResponse::Empty);
        assert_eq!(
            empty.calculate_dpr_curves(&sample_fighter(1), &config).await,
            Ok(None)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_waits_for_set_ready() {
        let mock = std::sync::Arc::new(MockCalculator::flat(|_| 1.0).not_ready());
        let waiter = {
            let mock = mock.clone();
            tokio::spawn(async move { mock.ready().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        mock.set_ready(true);
        waiter.await.unwrap();
    }

    #[test]
    fn test_sample_builds_validate() {
        assert!(sample_fighter(5).validate().is_ok());
        assert!(sample_paladin(5).validate().is_ok());
        assert!(sample_warlock(5).validate().is_ok());
    }
}
