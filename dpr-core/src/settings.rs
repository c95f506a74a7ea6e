//! Engine settings with JSON load/save.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// Errors from loading or saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Tunables for the delta engine, the DPR worker and the optimizers.
///
/// Missing fields in a settings file take their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Quiet period before a delta request fires.
    pub debounce_ms: u64,

    /// Upper bound on one delta firing, including waiting for the calculator.
    pub calculation_timeout_ms: u64,

    /// AC at which deltas are read off the curves.
    pub target_ac: i32,

    /// Deltas with magnitude at or below this are reported as neutral.
    pub neutral_threshold: f64,

    /// Capacity of the DPR worker's command queue.
    pub worker_queue_size: usize,

    /// Capacity of the delta update broadcast channel.
    pub update_channel_size: usize,

    /// Default beam width for the level path optimizer.
    pub beam_width: usize,

    /// Default number of level paths returned.
    pub max_paths: usize,

    /// Default number of combat plan alternatives returned.
    pub max_alternatives: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            calculation_timeout_ms: 10_000,
            target_ac: 16,
            neutral_threshold: 0.05,
            worker_queue_size: 32,
            update_channel_size: 256,
            beam_width: 12,
            max_paths: 5,
            max_alternatives: 3,
        }
    }
}

impl EngineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn with_calculation_timeout(mut self, timeout: Duration) -> Self {
        self.calculation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_target_ac(mut self, ac: i32) -> Self {
        self.target_ac = ac;
        self
    }

    pub fn with_neutral_threshold(mut self, threshold: f64) -> Self {
        self.neutral_threshold = threshold;
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

    pub fn with_max_alternatives(mut self, max_alternatives: usize) -> Self {
        self.max_alternatives = max_alternatives;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn calculation_timeout(&self) -> Duration {
        Duration::from_millis(self.calculation_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.calculation_timeout_ms == 0 {
            return Err(SettingsError::Invalid(
                "calculationTimeoutMs must be positive".to_string(),
            ));
        }
        if self.neutral_threshold.is_nan() || self.neutral_threshold < 0.0 {
            return Err(SettingsError::Invalid(
                "neutralThreshold must be non-negative".to_string(),
            ));
        }
        if self.worker_queue_size == 0 || self.update_channel_size == 0 {
            return Err(SettingsError::Invalid(
                "channel sizes must be positive".to_string(),
            ));
        }
        if self.beam_width == 0 {
            return Err(SettingsError::Invalid("beamWidth must be positive".to_string()));
        }
        Ok(())
    }

    /// Load settings from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).await?;
        let settings: Self = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a JSON file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.debounce(), Duration::from_millis(200));
        assert_eq!(settings.calculation_timeout(), Duration::from_secs(10));
        assert_eq!(settings.target_ac, 16);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: EngineSettings = serde_json::from_str(r#"{"targetAc": 18}"#).unwrap();
        assert_eq!(settings.target_ac, 18);
        assert_eq!(settings.debounce_ms, 200);
    }

    #[test]
    fn test_validation() {
        let settings = EngineSettings::new().with_calculation_timeout(Duration::ZERO);
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
        let settings = EngineSettings::new().with_neutral_threshold(-1.0);
        assert!(settings.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = EngineSettings::new()
            .with_debounce(Duration::from_millis(50))
            .with_target_ac(18);
        settings.save(&path).await.unwrap();

        let loaded = EngineSettings::load(&path).await.unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = EngineSettings::load(dir.path().join("missing.json")).await;
        assert!(matches!(result, Err(SettingsError::Io(_))));
    }
}
