// ============================================================
// Layer 2 — Trainer
// ============================================================
// Orchestrates one training run in order:
//
//   Step 1: Claim the single-flight guard     (and the lock file)
//   Step 2: Snapshot the sample store         (Layer 4 - data)
//   Step 3: Enough samples?                   (skip otherwise)
//   Step 4: Seeded train/validation split     (Layer 4 - data)
//   Step 5: Fit the regressor                 (Layer 5 - ml)
//   Step 6: Validation MAE on held-out data   (Layer 5 - ml)
//   Step 7: Compare with the active model
//   Step 8: Check the time budget
//   Step 9: Publish the new version           (Layer 6 - infra)
//
// Every exit before Step 9 leaves the store and the active model
// exactly as they were. The outcome of each run, including runs
// that end in an error, is written to the training log when one
// is attached.
//
// Why two guards?
//   The atomic flag stops overlapping runs inside this process.
//   The optional lock file does the same for every process that
//   shares the data directory.
//
// Reference: Rust Book §16 (Fearless Concurrency)

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::application::config::LifecycleConfig;
use crate::data::sample_store::SampleStore;
use crate::data::splitter::split_train_val;
use crate::domain::error::{LifecycleError, LifecycleResult};
use crate::domain::model_version::{ModelMetadata, ModelVersion};
use crate::domain::traits::Regressor;
use crate::infra::lock_file::LockFile;
use crate::infra::metrics::{TrainingLog, TrainingRecord};
use crate::infra::registry::ModelRegistry;
use crate::ml::regressor::mean_absolute_error;

// ─── Outcomes ────────────────────────────────────────────────────────────────
/// Why a fitted (or attempted) model was not published.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// The regressor returned an error or panicked
    FitFailed(String),
    /// Validation MAE came out NaN or infinite
    NonFiniteError,
    /// Worse than the active model by more than the tolerance
    Regressed {
        candidate: f64,
        active:    f64,
        tolerance: f64,
    },
    /// The run overran `timeout_secs` before it could publish
    Timeout {
        elapsed: Duration,
        limit:   Duration,
    },
}

impl RejectReason {
    /// Stable short code, used in the training log.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::FitFailed(_)      => "fit_failed",
            RejectReason::NonFiniteError    => "non_finite_error",
            RejectReason::Regressed { .. }  => "regressed",
            RejectReason::Timeout { .. }    => "timeout",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::FitFailed(msg) => write!(f, "fit_failed: {msg}"),
            RejectReason::NonFiniteError => write!(f, "non_finite_error"),
            RejectReason::Regressed { candidate, active, tolerance } => write!(
                f,
                "regressed: candidate MAE {candidate:.3} > active MAE {active:.3} + {tolerance:.3}"
            ),
            RejectReason::Timeout { elapsed, limit } => write!(
                f,
                "timeout: run took {:.1}s, limit {:.1}s",
                elapsed.as_secs_f64(),
                limit.as_secs_f64()
            ),
        }
    }
}

/// Result of a training run that got past the single-flight guard.
#[derive(Debug, Clone)]
pub enum TrainingOutcome {
    /// A new version was published and is now active
    Trained(Arc<ModelVersion>),
    /// A model was fitted (or attempted) but not published
    Rejected(RejectReason),
    /// Too few samples; the regressor was never called
    SkippedInsufficientData { available: usize, required: usize },
}

impl TrainingOutcome {
    pub fn is_trained(&self) -> bool {
        matches!(self, TrainingOutcome::Trained(_))
    }

    /// Short label: "trained", "rejected" or "skipped".
    pub fn label(&self) -> &'static str {
        match self {
            TrainingOutcome::Trained(_)                     => "trained",
            TrainingOutcome::Rejected(_)                    => "rejected",
            TrainingOutcome::SkippedInsufficientData { .. } => "skipped",
        }
    }
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
/// Runs training pipelines, at most one at a time.
pub struct Trainer {
    regressor: Arc<dyn Regressor>,
    running:   AtomicBool,
    log:       Option<TrainingLog>,
    lock_file: Option<LockFile>,
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What a finished run reports to the training log.
struct RunSummary {
    outcome:          LifecycleResult<TrainingOutcome>,
    sample_count:     usize,
    validation_error: Option<f64>,
}

impl Trainer {
    pub fn new(regressor: Arc<dyn Regressor>) -> Self {
        Self { regressor, running: AtomicBool::new(false), log: None, lock_file: None }
    }

    /// Also hold `lock` for the whole run, so trainers in other
    /// processes sharing the data directory never overlap with this one.
    pub fn with_lock_file(mut self, lock: LockFile) -> Self {
        self.lock_file = Some(lock);
        self
    }

    /// Record every run's outcome to `log`.
    pub fn with_log(mut self, log: TrainingLog) -> Self {
        self.log = Some(log);
        self
    }

    /// True while a run holds the single-flight guard.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Execute one training run end to end.
    ///
    /// Fails with `AlreadyRunning` if another run is in progress (here or,
    /// with a lock file, in another process) and with `Validation` for an
    /// unusable config. Skips and rejections are outcomes, not errors.
    pub fn run(
        &self,
        store:    &SampleStore,
        registry: &ModelRegistry,
        config:   &LifecycleConfig,
    ) -> LifecycleResult<TrainingOutcome> {
        // ── Step 1: Single-flight ─────────────────────────────────────────────
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Training run requested while another is in progress");
            return Err(LifecycleError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        let summary = match &self.lock_file {
            None => self.train(store, registry, config),
            Some(lock) => match lock.try_with(|| self.train(store, registry, config))? {
                Some(summary) => summary,
                None => {
                    tracing::warn!(
                        "Training run requested while another process holds '{}'",
                        lock.path().display()
                    );
                    return Err(LifecycleError::AlreadyRunning);
                }
            },
        };
        self.record(&summary);
        summary.outcome
    }

    fn train(
        &self,
        store:    &SampleStore,
        registry: &ModelRegistry,
        config:   &LifecycleConfig,
    ) -> RunSummary {
        if let Err(e) = config.validate() {
            return RunSummary { outcome: Err(e), sample_count: 0, validation_error: None };
        }
        let started = Instant::now();

        // ── Step 2: Snapshot ──────────────────────────────────────────────────
        let snapshot     = store.snapshot(config.window());
        let sample_count = snapshot.len();

        // ── Step 3: Minimum sample count ──────────────────────────────────────
        if sample_count < config.min_samples {
            tracing::info!(
                "Skipping training: {} samples available, {} required",
                sample_count,
                config.min_samples
            );
            return RunSummary {
                outcome: Ok(TrainingOutcome::SkippedInsufficientData {
                    available: sample_count,
                    required:  config.min_samples,
                }),
                sample_count,
                validation_error: None,
            };
        }

        // ── Step 4: Split ─────────────────────────────────────────────────────
        let (train, val) =
            split_train_val(snapshot.to_samples(), config.train_ratio, config.split_seed);
        tracing::info!(
            "Training on {} samples, validating on {}",
            train.len(),
            val.len()
        );

        let rejected = |reason: RejectReason, validation_error: Option<f64>| {
            tracing::warn!("Model rejected: {}", reason);
            RunSummary {
                outcome: Ok(TrainingOutcome::Rejected(reason)),
                sample_count,
                validation_error,
            }
        };

        // ── Step 5: Fit ───────────────────────────────────────────────────────
        // A panicking regressor must not take the scheduler thread with it
        let fitted = panic::catch_unwind(AssertUnwindSafe(|| self.regressor.fit(&train)));
        let artifact = match fitted {
            Ok(Ok(artifact)) if artifact.is_well_formed() => artifact,
            Ok(Ok(_)) => {
                return rejected(
                    RejectReason::FitFailed("regressor returned a malformed artifact".into()),
                    None,
                )
            }
            Ok(Err(e)) => return rejected(RejectReason::FitFailed(format!("{e:#}")), None),
            Err(payload) => {
                return rejected(RejectReason::FitFailed(panic_message(&*payload)), None)
            }
        };

        // ── Step 6: Validate ──────────────────────────────────────────────────
        let mae = mean_absolute_error(&artifact, &val);
        tracing::info!("Validation MAE: {:.4}", mae);
        if !mae.is_finite() {
            return rejected(RejectReason::NonFiniteError, None);
        }

        // ── Step 7: Regression check ──────────────────────────────────────────
        if let (Some(tolerance), Some(active)) = (config.regression_tolerance, registry.current()) {
            let active_mae = active.validation_error();
            if mae > active_mae + tolerance {
                return rejected(
                    RejectReason::Regressed { candidate: mae, active: active_mae, tolerance },
                    Some(mae),
                );
            }
        }

        // ── Step 8: Time budget ───────────────────────────────────────────────
        if let Some(limit) = config.timeout() {
            let elapsed = started.elapsed();
            if elapsed > limit {
                return rejected(RejectReason::Timeout { elapsed, limit }, Some(mae));
            }
        }

        // ── Step 9: Publish ───────────────────────────────────────────────────
        let version = ModelVersion::new(
            ModelMetadata {
                version_id:       registry.next_version_id(),
                trained_at:       Utc::now(),
                sample_count,
                validation_error: mae,
            },
            artifact,
        );
        let published = match registry.publish(version) {
            Ok(published) => published,
            Err(e) => {
                tracing::error!("Publishing the new model failed: {}", e);
                return RunSummary { outcome: Err(e), sample_count, validation_error: Some(mae) };
            }
        };

        tracing::info!(
            "Training run finished in {:.2}s, version {} active",
            started.elapsed().as_secs_f64(),
            published.version_id()
        );
        RunSummary {
            outcome: Ok(TrainingOutcome::Trained(published)),
            sample_count,
            validation_error: Some(mae),
        }
    }

    fn record(&self, summary: &RunSummary) {
        let Some(log) = &self.log else { return };

        let (label, version_id, detail) = match &summary.outcome {
            Ok(outcome @ TrainingOutcome::Trained(v)) => {
                (outcome.label(), Some(v.version_id()), String::new())
            }
            Ok(outcome @ TrainingOutcome::Rejected(reason)) => {
                (outcome.label(), None, reason.to_string())
            }
            Ok(outcome @ TrainingOutcome::SkippedInsufficientData { available, required }) => {
                (outcome.label(), None, format!("need {required} samples, have {available}"))
            }
            Err(e) => ("failed", None, e.to_string()),
        };

        let record = TrainingRecord {
            finished_at:      Utc::now(),
            outcome:          label.to_string(),
            version_id,
            sample_count:     summary.sample_count,
            validation_error: summary.validation_error,
            detail,
        };
        if let Err(e) = log.log(&record) {
            tracing::warn!("Could not write training log: {:#}", e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("regressor panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("regressor panicked: {s}")
    } else {
        "regressor panicked".to_string()
    }
}
