// ============================================================
// Layer 2 — Lifecycle Wiring
// ============================================================
// Builds every long-lived component from one LifecycleConfig:
//
//   <data_dir>/samples.jsonl      → SampleStore
//   <data_dir>/models/            → ModelRegistry
//   <data_dir>/training_log.csv   → TrainingLog (inside Trainer)
//   <data_dir>/training.lock      → LockFile    (inside Trainer)
//
// Each resource has exactly one owner here; callers share them
// through the `Arc`s.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::application::config::LifecycleConfig;
use crate::application::predict_use_case::PredictionService;
use crate::application::scheduler::{Scheduler, SchedulerHandle};
use crate::application::train_use_case::{Trainer, TrainingOutcome};
use crate::data::sample_store::SampleStore;
use crate::domain::error::LifecycleResult;
use crate::domain::traits::Regressor;
use crate::infra::lock_file::LockFile;
use crate::infra::metrics::TrainingLog;
use crate::infra::registry::ModelRegistry;
use crate::ml::regressor::BurnLinearRegressor;

pub struct Lifecycle {
    pub config:    LifecycleConfig,
    pub store:     Arc<SampleStore>,
    pub registry:  Arc<ModelRegistry>,
    pub trainer:   Arc<Trainer>,
    pub predictor: PredictionService,
}

impl Lifecycle {
    /// Open the on-disk state under `config.data_dir` with the Burn regressor.
    pub fn open(config: LifecycleConfig) -> Result<Self> {
        let regressor = BurnLinearRegressor::new(config.epochs, config.learning_rate);
        Self::open_with(config, Arc::new(regressor))
    }

    /// Same as `open` with a caller-supplied regressor.
    pub fn open_with(config: LifecycleConfig, regressor: Arc<dyn Regressor>) -> Result<Self> {
        config.validate()?;

        let store = SampleStore::open(config.samples_path()).with_context(|| {
            format!("Cannot open sample log '{}'", config.samples_path().display())
        })?;
        let registry = ModelRegistry::open(config.models_dir(), config.max_retained_versions)
            .with_context(|| {
                format!("Cannot open model directory '{}'", config.models_dir().display())
            })?;
        let log  = TrainingLog::new(config.training_log_path())?;
        let lock = LockFile::open(config.training_lock_path())?;

        let registry = Arc::new(registry);
        let trainer  = Trainer::new(regressor).with_log(log).with_lock_file(lock);
        Ok(Self {
            store:     Arc::new(store),
            predictor: PredictionService::new(Arc::clone(&registry)),
            trainer:   Arc::new(trainer),
            registry,
            config,
        })
    }

    pub fn train_now(&self) -> LifecycleResult<TrainingOutcome> {
        Scheduler::run_once(&self.trainer, &self.store, &self.registry, &self.config)
    }

    /// Start the background schedule at `config.retrain_interval_secs`.
    pub fn start_schedule(&self) -> LifecycleResult<SchedulerHandle> {
        Scheduler::run_periodic(
            self.config.retrain_interval(),
            Arc::clone(&self.trainer),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.config.clone(),
        )
    }
}
