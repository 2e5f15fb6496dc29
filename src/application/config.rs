// ============================================================
// Layer 2 — Lifecycle Configuration
// ============================================================
// All knobs for storage, training and scheduling in one struct.
// Serialisable so it can be kept in a JSON file next to the data
// and reloaded; every field has a default, so a partial file
// (or no file at all) is fine.
//
// Example config.json:
//   {
//     "data_dir": "data",
//     "min_samples": 10,
//     "train_ratio": 0.8,
//     "retrain_interval_secs": 3600,
//     "max_retained_versions": 5,
//     "regression_tolerance": 0.5
//   }

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::sample_store::SampleWindow;
use crate::domain::error::{LifecycleError, LifecycleResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Root directory for the sample log, model versions and training log
    pub data_dir: String,

    /// Fewer samples than this and a training run is skipped
    pub min_samples: usize,

    /// Fraction of the snapshot used for fitting; the rest validates
    pub train_ratio: f64,

    /// Seed for the train/validation shuffle
    pub split_seed: u64,

    pub retrain_interval_secs: u64,

    /// Versions kept available for rollback
    pub max_retained_versions: usize,

    /// Reject a new model whose validation MAE exceeds the active
    /// model's by more than this. `None` accepts any valid model.
    pub regression_tolerance: Option<f64>,

    /// Train only on samples recorded within this many seconds
    pub window_max_age_secs: Option<u64>,

    /// Train only on the most recent N samples
    pub window_max_count: Option<usize>,

    /// Runs exceeding this many seconds before publish are rejected
    pub timeout_secs: Option<u64>,

    /// Regressor optimisation steps
    pub epochs: usize,

    pub learning_rate: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            data_dir:              "data".to_string(),
            min_samples:           10,
            train_ratio:           0.8,
            split_seed:            42,
            retrain_interval_secs: 3600,
            max_retained_versions: 5,
            regression_tolerance:  None,
            window_max_age_secs:   None,
            window_max_count:      None,
            timeout_secs:          None,
            epochs:                500,
            learning_rate:         0.05,
        }
    }
}

impl LifecycleConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config in '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        Ok(())
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> LifecycleResult<()> {
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(LifecycleError::validation(format!(
                "train_ratio must be between 0 and 1 (exclusive), got {}",
                self.train_ratio
            )));
        }
        if self.min_samples < 2 {
            return Err(LifecycleError::validation(
                "min_samples must be at least 2 so both partitions are non-empty",
            ));
        }
        if self.max_retained_versions == 0 {
            return Err(LifecycleError::validation("max_retained_versions must be at least 1"));
        }
        if self.retrain_interval_secs == 0 {
            return Err(LifecycleError::validation("retrain_interval_secs must be positive"));
        }
        if let Some(tol) = self.regression_tolerance {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(LifecycleError::validation(format!(
                    "regression_tolerance must be a non-negative number, got {tol}"
                )));
            }
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) || self.epochs == 0 {
            return Err(LifecycleError::validation(
                "epochs and learning_rate must be positive",
            ));
        }
        Ok(())
    }

    pub fn window(&self) -> SampleWindow {
        SampleWindow {
            max_age:   self.window_max_age_secs.map(Duration::from_secs),
            max_count: self.window_max_count,
        }
    }

    pub fn retrain_interval(&self) -> Duration {
        Duration::from_secs(self.retrain_interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn samples_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("samples.jsonl")
    }

    pub fn models_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("models")
    }

    pub fn training_log_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("training_log.csv")
    }

    pub fn training_lock_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("training.lock")
    }
}
