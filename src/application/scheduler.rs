// ============================================================
// Layer 2 — Retraining Scheduler
// ============================================================
// Calls the Trainer on a fixed interval from a background thread.
//
//   run_once      — one synchronous run, outcome returned
//   run_periodic  — background loop, returns a SchedulerHandle
//
// Loop shape:
//
//   wait(interval) ──stop?──► exit
//        │
//        ▼
//   trainer.run()  ──► log outcome / error / panic
//        │
//        └──────────► wait again
//
// The wait is a `recv_timeout` on the stop channel, so `stop()`
// wakes the thread immediately instead of sleeping out the
// interval. A run already in progress is never interrupted: stop
// takes effect once it returns.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::application::config::LifecycleConfig;
use crate::application::train_use_case::{Trainer, TrainingOutcome};
use crate::data::sample_store::SampleStore;
use crate::domain::error::{LifecycleError, LifecycleResult};
use crate::infra::registry::ModelRegistry;

/// Entry points for scheduled and on-demand retraining.
pub struct Scheduler;

impl Scheduler {
    /// Run the trainer once on the calling thread.
    pub fn run_once(
        trainer:  &Trainer,
        store:    &SampleStore,
        registry: &ModelRegistry,
        config:   &LifecycleConfig,
    ) -> LifecycleResult<TrainingOutcome> {
        trainer.run(store, registry, config)
    }

    /// Start retraining every `interval` on a background thread.
    /// The first run happens one interval after the call.
    pub fn run_periodic(
        interval: Duration,
        trainer:  Arc<Trainer>,
        store:    Arc<SampleStore>,
        registry: Arc<ModelRegistry>,
        config:   LifecycleConfig,
    ) -> LifecycleResult<SchedulerHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let runs               = Arc::new(AtomicU64::new(0));
        let runs_in_thread     = Arc::clone(&runs);

        let thread = thread::Builder::new()
            .name("retrain-scheduler".into())
            .spawn(move || {
                tracing::info!("Retraining every {}s", interval.as_secs_f64());
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        trainer.run(&store, &registry, &config)
                    }));
                    log_run(result);
                    runs_in_thread.fetch_add(1, Ordering::Release);
                }
                tracing::info!("Retraining scheduler stopped");
            })?;

        Ok(SchedulerHandle { stop_tx: Some(stop_tx), thread: Some(thread), runs })
    }
}

fn log_run(result: thread::Result<LifecycleResult<TrainingOutcome>>) {
    match result {
        Ok(Ok(TrainingOutcome::Trained(v))) => tracing::info!(
            "Scheduled run published model version {} (MAE {:.3})",
            v.version_id(),
            v.validation_error()
        ),
        Ok(Ok(TrainingOutcome::Rejected(reason))) => {
            tracing::warn!("Scheduled run rejected its model: {}", reason)
        }
        Ok(Ok(TrainingOutcome::SkippedInsufficientData { available, required })) => {
            tracing::info!("Scheduled run skipped: {} of {} samples", available, required)
        }
        Ok(Err(LifecycleError::AlreadyRunning)) => {
            tracing::info!("Scheduled run skipped: a training run is already in progress")
        }
        Ok(Err(e)) => tracing::error!("Scheduled run failed: {}", e),
        Err(_) => tracing::error!("Scheduled run panicked; scheduler continues"),
    }
}

// ─── SchedulerHandle ──────────────────────────────────────────────────────────
/// Owner of the background retraining thread. Dropping it stops the schedule.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop_tx: Option<Sender<()>>,
    thread:  Option<JoinHandle<()>>,
    runs:    Arc<AtomicU64>,
}

impl SchedulerHandle {
    /// Cancel the pending wait and join the thread. A run already in
    /// progress finishes first.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Scheduled runs finished so far, whatever their outcome.
    pub fn runs_completed(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Retraining scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model_version::ModelArtifact;
    use crate::domain::sample::{CropType, Features, Sample};
    use crate::domain::traits::Regressor;
    use std::time::Instant;

    struct Constant;

    impl Regressor for Constant {
        fn fit(&self, _samples: &[Sample]) -> anyhow::Result<ModelArtifact> {
            Ok(ModelArtifact::constant(15.0))
        }
    }

    struct Panicking;

    impl Regressor for Panicking {
        fn fit(&self, _samples: &[Sample]) -> anyhow::Result<ModelArtifact> {
            panic!("sensor data exploded")
        }
    }

    fn filled_store(n: usize) -> Arc<SampleStore> {
        let store = SampleStore::in_memory();
        for _ in 0..n {
            let f = Features::new(40.0, 22.0, 60.0, CropType::Onion).unwrap();
            store.append(Sample::now(f, 15.0).unwrap()).unwrap();
        }
        Arc::new(store)
    }

    fn wait_for_runs(handle: &SchedulerHandle, n: u64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while handle.runs_completed() < n && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_run_once_returns_outcome() {
        let trainer  = Trainer::new(Arc::new(Constant));
        let store    = filled_store(3);
        let registry = ModelRegistry::in_memory(5);
        let outcome  = Scheduler::run_once(&trainer, &store, &registry, &LifecycleConfig::default());
        assert!(matches!(
            outcome,
            Ok(TrainingOutcome::SkippedInsufficientData { available: 3, required: 10 })
        ));
    }

    #[test]
    fn test_periodic_runs_publish_until_stopped() {
        let registry = Arc::new(ModelRegistry::in_memory(5));
        let handle = Scheduler::run_periodic(
            Duration::from_millis(20),
            Arc::new(Trainer::new(Arc::new(Constant))),
            filled_store(10),
            Arc::clone(&registry),
            LifecycleConfig::default(),
        )
        .unwrap();

        wait_for_runs(&handle, 2);
        handle.stop();

        let published = registry.current().unwrap().version_id();
        assert!(published >= 2);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(registry.current().unwrap().version_id(), published);
    }

    #[test]
    fn test_stop_cancels_pending_wait_immediately() {
        let handle = Scheduler::run_periodic(
            Duration::from_secs(3600),
            Arc::new(Trainer::new(Arc::new(Constant))),
            filled_store(10),
            Arc::new(ModelRegistry::in_memory(5)),
            LifecycleConfig::default(),
        )
        .unwrap();

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_panicking_runs_do_not_kill_the_loop() {
        let registry = Arc::new(ModelRegistry::in_memory(5));
        let handle = Scheduler::run_periodic(
            Duration::from_millis(10),
            Arc::new(Trainer::new(Arc::new(Panicking))),
            filled_store(10),
            Arc::clone(&registry),
            LifecycleConfig::default(),
        )
        .unwrap();

        wait_for_runs(&handle, 3);
        assert!(handle.runs_completed() >= 3);
        assert!(registry.current().is_none());
        drop(handle);
    }
}
