// ============================================================
// End-to-end lifecycle scenarios
// ============================================================
// Store → Trainer → Registry → PredictionService, wired the
// same way the binary wires them, with spy regressors where a
// test needs to count or control fits.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use irrigation_model::ml::BurnLinearRegressor;
use irrigation_model::{
    CropType, Features, Lifecycle, LifecycleConfig, LifecycleError, ModelArtifact, ModelMetadata,
    ModelRegistry, ModelVersion, PredictionService, Regressor, RejectReason, Sample, SampleStore,
    Scheduler, Trainer, TrainingOutcome,
};
use serde_json::json;

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Counts fits and answers with a constant; optionally slow.
struct Spy {
    fits:  AtomicUsize,
    delay: Duration,
    water: f64,
}

impl Spy {
    fn new(water: f64) -> Arc<Self> {
        Arc::new(Self { fits: AtomicUsize::new(0), delay: Duration::ZERO, water })
    }

    fn slow(water: f64, delay: Duration) -> Arc<Self> {
        Arc::new(Self { fits: AtomicUsize::new(0), delay, water })
    }

    fn fits(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }
}

impl Regressor for Spy {
    fn fit(&self, _samples: &[Sample]) -> anyhow::Result<ModelArtifact> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(ModelArtifact::constant(self.water))
    }
}

struct Failing;

impl Regressor for Failing {
    fn fit(&self, _samples: &[Sample]) -> anyhow::Result<ModelArtifact> {
        anyhow::bail!("matrix is singular")
    }
}

struct Panicking;

impl Regressor for Panicking {
    fn fit(&self, _samples: &[Sample]) -> anyhow::Result<ModelArtifact> {
        panic!("index out of bounds")
    }
}

/// Plausible readings: drier, hotter soil needs more water.
fn reading(i: usize) -> Sample {
    let soil = 20.0 + (i % 7) as f64 * 5.0;
    let temp = 18.0 + (i % 5) as f64 * 3.0;
    let hum  = 40.0 + (i % 4) as f64 * 8.0;
    let crop = CropType::ALL[i % 3];
    let water = (45.0 - 0.6 * soil + 0.8 * temp - 0.1 * hum).max(0.0);
    Sample::now(Features::new(soil, temp, hum, crop).unwrap(), water).unwrap()
}

fn store_with(n: usize) -> SampleStore {
    let store = SampleStore::in_memory();
    for i in 0..n {
        store.append(reading(i)).unwrap();
    }
    store
}

fn fast_burn() -> Arc<BurnLinearRegressor> {
    Arc::new(BurnLinearRegressor::new(200, 0.05))
}

fn wait_until(what: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !what() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
}

fn on_disk(dir: &tempfile::TempDir) -> LifecycleConfig {
    LifecycleConfig {
        data_dir: dir.path().to_string_lossy().into_owned(),
        ..Default::default()
    }
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn nine_samples_skip_and_the_tenth_trains_version_one() {
    let store    = SampleStore::in_memory();
    let registry = Arc::new(ModelRegistry::in_memory(5));
    let trainer  = Trainer::new(fast_burn());
    let config   = LifecycleConfig::default();

    for i in 0..9 {
        store.append(reading(i)).unwrap();
    }
    let outcome = trainer.run(&store, &registry, &config).unwrap();
    assert!(matches!(
        outcome,
        TrainingOutcome::SkippedInsufficientData { available: 9, required: 10 }
    ));
    assert!(registry.current().is_none());

    store.append(reading(9)).unwrap();
    match trainer.run(&store, &registry, &config).unwrap() {
        TrainingOutcome::Trained(v) => {
            assert_eq!(v.version_id(), 1);
            assert_eq!(v.sample_count(), 10);
            assert!(v.validation_error().is_finite());
            assert!(v.validation_error() >= 0.0);
        }
        other => panic!("expected Trained, got {other:?}"),
    }

    let service = PredictionService::new(Arc::clone(&registry));
    let request = json!({"soil_moisture": 35.2, "temperature": 28.1, "humidity": 55.4, "crop_type": 0});
    let p = service.predict_json(&request).unwrap();
    assert_eq!(p.model_version, 1);
    assert!(p.predicted_water_mm.is_finite());
    assert!(p.predicted_water_mm >= 0.0);
}

#[test]
fn predict_before_any_publish_is_unavailable() {
    let service = PredictionService::new(Arc::new(ModelRegistry::in_memory(5)));
    let request = json!({"soil_moisture": 35.2, "temperature": 28.1, "humidity": 55.4, "crop_type": 0});
    assert!(matches!(service.predict_json(&request), Err(LifecycleError::ModelUnavailable)));
}

#[test]
fn below_min_samples_never_fits_or_publishes() {
    let spy      = Spy::new(10.0);
    let trainer  = Trainer::new(spy.clone());
    let registry = ModelRegistry::in_memory(5);
    let store    = store_with(4);

    for _ in 0..3 {
        let outcome = trainer.run(&store, &registry, &LifecycleConfig::default()).unwrap();
        assert!(!outcome.is_trained());
    }
    assert_eq!(spy.fits(), 0);
    assert_eq!(registry.publish_calls(), 0);
}

#[test]
fn hundred_concurrent_appends_are_all_stored_once() {
    let store = Arc::new(SampleStore::in_memory());

    let workers: Vec<_> = (0..10)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..10).map(|i| store.append(reading(w * 10 + i)).unwrap()).collect::<Vec<u64>>()
            })
        })
        .collect();

    let seqs: Vec<u64> = workers.into_iter().flat_map(|h| h.join().unwrap()).collect();
    let unique: HashSet<u64> = seqs.iter().copied().collect();
    assert_eq!(seqs.len(), 100);
    assert_eq!(unique.len(), 100);

    let snapshot = store.snapshot(Default::default());
    assert_eq!(snapshot.len(), 100);
    let in_order: Vec<u64> = snapshot.iter().map(|s| s.seq).collect();
    assert_eq!(in_order, (1..=100).collect::<Vec<u64>>());
}

#[test]
fn overlapping_runs_yield_one_trained_and_one_already_running() {
    let trainer  = Arc::new(Trainer::new(Spy::slow(12.0, Duration::from_millis(300))));
    let store    = Arc::new(store_with(20));
    let registry = Arc::new(ModelRegistry::in_memory(5));

    let first = {
        let (trainer, store, registry) =
            (Arc::clone(&trainer), Arc::clone(&store), Arc::clone(&registry));
        thread::spawn(move || trainer.run(&store, &registry, &LifecycleConfig::default()))
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while !trainer.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }

    let second = trainer.run(&store, &registry, &LifecycleConfig::default());
    assert!(matches!(second, Err(LifecycleError::AlreadyRunning)));

    let first = first.join().unwrap().unwrap();
    assert!(first.is_trained());
    assert_eq!(registry.current().unwrap().version_id(), 1);
}

#[test]
fn failing_or_panicking_fit_leaves_registry_untouched() {
    let store    = store_with(12);
    let registry = ModelRegistry::in_memory(5);
    let config   = LifecycleConfig::default();

    Trainer::new(Spy::new(9.0)).run(&store, &registry, &config).unwrap();

    for regressor in [
        Arc::new(Failing) as Arc<dyn Regressor>,
        Arc::new(Panicking) as Arc<dyn Regressor>,
    ] {
        let outcome = Trainer::new(regressor).run(&store, &registry, &config).unwrap();
        match outcome {
            TrainingOutcome::Rejected(reason @ RejectReason::FitFailed(_)) => {
                assert_eq!(reason.as_str(), "fit_failed")
            }
            other => panic!("expected fit_failed, got {other:?}"),
        }
        assert_eq!(registry.current().unwrap().version_id(), 1);
    }
    assert_eq!(store.len(), 12);
}

#[test]
fn regression_tolerance_keeps_the_better_model() {
    let store    = store_with(15);
    let registry = ModelRegistry::in_memory(5);
    let config   = LifecycleConfig { regression_tolerance: Some(0.1), ..Default::default() };

    let good = Trainer::new(fast_burn()).run(&store, &registry, &config).unwrap();
    assert!(good.is_trained());

    // Predicting 1000 mm everywhere is far worse than the fitted model
    let bad = Trainer::new(Spy::new(1000.0)).run(&store, &registry, &config).unwrap();
    assert!(matches!(bad, TrainingOutcome::Rejected(RejectReason::Regressed { .. })));
    assert_eq!(registry.current().unwrap().version_id(), 1);
}

#[test]
fn retention_keeps_five_and_rollback_respects_eviction() {
    let store    = store_with(10);
    let registry = ModelRegistry::in_memory(5);
    let trainer  = Trainer::new(Spy::new(10.0));

    for expected in 1..=6 {
        match trainer.run(&store, &registry, &LifecycleConfig::default()).unwrap() {
            TrainingOutcome::Trained(v) => assert_eq!(v.version_id(), expected),
            other => panic!("expected Trained, got {other:?}"),
        }
    }

    assert!(matches!(registry.rollback(1), Err(LifecycleError::NotFound(1))));
    assert_eq!(registry.rollback(3).unwrap().version_id(), 3);
    assert_eq!(registry.current().unwrap().version_id(), 3);

    // The next run still moves forward past every id already used
    match trainer.run(&store, &registry, &LifecycleConfig::default()).unwrap() {
        TrainingOutcome::Trained(v) => assert_eq!(v.version_id(), 7),
        other => panic!("expected Trained, got {other:?}"),
    }
}

#[test]
fn scheduler_retrains_and_stops() {
    let registry = Arc::new(ModelRegistry::in_memory(5));
    let spy      = Spy::new(11.0);
    let handle = Scheduler::run_periodic(
        Duration::from_millis(25),
        Arc::new(Trainer::new(spy.clone())),
        Arc::new(store_with(10)),
        Arc::clone(&registry),
        LifecycleConfig::default(),
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while handle.runs_completed() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    handle.stop();

    let fits = spy.fits();
    assert!(fits >= 2);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(spy.fits(), fits);
    assert!(registry.current().is_some());
}

#[test]
fn stop_waits_for_the_run_in_flight_to_publish() {
    let registry = Arc::new(ModelRegistry::in_memory(5));
    let spy      = Spy::slow(7.0, Duration::from_millis(300));
    let trainer  = Arc::new(Trainer::new(spy.clone()));
    let handle = Scheduler::run_periodic(
        Duration::from_millis(10),
        Arc::clone(&trainer),
        Arc::new(store_with(10)),
        Arc::clone(&registry),
        LifecycleConfig::default(),
    )
    .unwrap();

    wait_until(|| trainer.is_running());
    assert!(registry.current().is_none());
    handle.stop();

    // The fit that was running when stop() was called still published
    assert!(!trainer.is_running());
    assert_eq!(spy.fits(), 1);
    assert_eq!(registry.current().unwrap().version_id(), 1);
}

#[test]
fn predictions_during_publishes_always_match_one_whole_version() {
    let registry = Arc::new(ModelRegistry::in_memory(5));
    let service  = PredictionService::new(Arc::clone(&registry));
    let done     = Arc::new(AtomicBool::new(false));

    let publisher = {
        let (registry, done) = (Arc::clone(&registry), Arc::clone(&done));
        thread::spawn(move || {
            for id in 1..=300u64 {
                let version = ModelVersion::new(
                    ModelMetadata {
                        version_id:       id,
                        trained_at:       chrono::Utc::now(),
                        sample_count:     10,
                        validation_error: 0.5,
                    },
                    ModelArtifact::constant(id as f64),
                );
                registry.publish(version).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let features  = Features::new(35.2, 28.1, 55.4, CropType::Onion).unwrap();
    let mut seen  = 0u64;
    let mut reads = 0usize;
    while !done.load(Ordering::SeqCst) || reads == 0 {
        match service.predict(&features) {
            Ok(p) => {
                assert_eq!(p.predicted_water_mm, p.model_version as f64);
                assert!(p.model_version >= seen);
                seen = p.model_version;
                reads += 1;
            }
            Err(LifecycleError::ModelUnavailable) => assert_eq!(seen, 0),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    publisher.join().unwrap();
    assert_eq!(service.predict(&features).unwrap().model_version, 300);
}

#[test]
fn two_handles_on_one_data_dir_take_turns_and_share_versions() {
    let dir    = tempfile::tempdir().unwrap();
    let config = on_disk(&dir);
    let spy    = Spy::slow(5.0, Duration::from_millis(300));

    let first = Arc::new(Lifecycle::open_with(config.clone(), spy.clone()).unwrap());
    for i in 0..10 {
        first.store.append(reading(i)).unwrap();
    }
    let second = Lifecycle::open_with(config, Spy::new(6.0)).unwrap();

    let running = {
        let first = Arc::clone(&first);
        thread::spawn(move || first.train_now())
    };
    wait_until(|| spy.fits() > 0);
    assert!(matches!(second.train_now(), Err(LifecycleError::AlreadyRunning)));

    match running.join().unwrap().unwrap() {
        TrainingOutcome::Trained(v) => assert_eq!(v.version_id(), 1),
        other => panic!("expected Trained, got {other:?}"),
    }

    // The second handle sees the first one's samples and never reuses version 1
    match second.train_now().unwrap() {
        TrainingOutcome::Trained(v) => {
            assert_eq!(v.version_id(), 2);
            assert_eq!(v.sample_count(), 10);
        }
        other => panic!("expected Trained, got {other:?}"),
    }
}

#[test]
fn restart_restores_samples_and_active_model() {
    let dir    = tempfile::tempdir().unwrap();
    let config = on_disk(&dir);

    let trained_version = {
        let lifecycle = Lifecycle::open_with(config.clone(), Spy::new(14.0)).unwrap();
        for i in 0..10 {
            lifecycle.store.append(reading(i)).unwrap();
        }
        match lifecycle.train_now().unwrap() {
            TrainingOutcome::Trained(v) => v.version_id(),
            other => panic!("expected Trained, got {other:?}"),
        }
    };

    let lifecycle = Lifecycle::open_with(config, Spy::new(14.0)).unwrap();
    assert_eq!(lifecycle.store.len(), 10);
    let features = Features::new(35.2, 28.1, 55.4, CropType::Tomato).unwrap();
    let p = lifecycle.predictor.predict(&features).unwrap();
    assert_eq!(p.model_version, trained_version);
    assert_eq!(p.predicted_water_mm, 14.0);

    let log = std::fs::read_to_string(lifecycle.config.training_log_path()).unwrap();
    assert!(log.lines().any(|l| l.contains(",trained,1,10,")));
}
