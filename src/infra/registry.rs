// ============================================================
// Layer 6 — Model Registry
// ============================================================
// Holds the model version that serves predictions, plus a
// bounded history of recent versions for rollback.
//
//   state        (RwLock) — active pointer, history, high-water
//                           mark; readers hold it only long
//                           enough to clone an `Arc`
//   publish_lock (Mutex)  — serialises publish/rollback so the
//                           ordering check, the disk write and
//                           the pointer swap act as one step
//
// Version ordering:
//   `high_water` is the greatest version_id ever published (or
//   found on disk). A publish must go strictly above it. Rolling
//   back to an older version does NOT lower the mark, so a later
//   retrain can never reuse an id that already exists.
//
// Why re-read the directory on publish?
//   Another registry handle on the same directory (a second CLI
//   process, say) may have published since we loaded. The mark
//   is raised to the highest id on disk first, and the version
//   directory itself is claimed exclusively, so two handles can
//   never both write `v<id>`.
//
// Retention:
//   history keeps the last `retention` published versions,
//   oldest evicted first. Evicted versions stay on disk for
//   audit but can no longer be rolled back to.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::domain::error::{LifecycleError, LifecycleResult};
use crate::domain::model_version::{ModelVersion, VersionId};
use crate::infra::checkpoint::ArtifactStore;

#[derive(Debug, Default)]
struct RegistryState {
    active:     Option<Arc<ModelVersion>>,
    history:    VecDeque<Arc<ModelVersion>>,
    high_water: VersionId,
}

/// Active model pointer with atomic publish and bounded rollback history.
#[derive(Debug)]
pub struct ModelRegistry {
    state:         RwLock<RegistryState>,
    publish_lock:  Mutex<()>,
    retention:     usize,
    artifacts:     Option<ArtifactStore>,
    publish_calls: AtomicU64,
}

impl ModelRegistry {
    /// Registry without persistence. `retention` is clamped to at least 1.
    pub fn in_memory(retention: usize) -> Self {
        Self {
            state:         RwLock::new(RegistryState::default()),
            publish_lock:  Mutex::new(()),
            retention:     retention.max(1),
            artifacts:     None,
            publish_calls: AtomicU64::new(0),
        }
    }

    /// Registry persisted under `dir`, reloading the most recent
    /// `retention` versions and the recorded active version.
    pub fn open(dir: impl Into<PathBuf>, retention: usize) -> LifecycleResult<Self> {
        let artifacts = ArtifactStore::new(dir)?;
        let retention = retention.max(1);

        let ids        = artifacts.list_versions()?;
        let high_water = artifacts.highest_claimed()?;

        let mut history = VecDeque::new();
        for id in ids.iter().rev().take(retention).rev() {
            match artifacts.load_version(*id) {
                Ok(v) if v.artifact().is_well_formed() => history.push_back(Arc::new(v)),
                Ok(_) => tracing::warn!("Ignoring model version {}: malformed artifact", id),
                Err(e) => tracing::warn!("Ignoring model version {}: {}", id, e),
            }
        }

        let recorded = artifacts.load_active()?;
        let active = recorded
            .and_then(|id| history.iter().find(|v| v.version_id() == id).cloned())
            .or_else(|| history.back().cloned());

        match &active {
            Some(v) => tracing::info!(
                "Loaded {} model versions from '{}', active version {}",
                history.len(),
                artifacts.dir().display(),
                v.version_id()
            ),
            None => tracing::info!("No model versions in '{}' yet", artifacts.dir().display()),
        }

        Ok(Self {
            state:         RwLock::new(RegistryState { active, history, high_water }),
            publish_lock:  Mutex::new(()),
            retention,
            artifacts:     Some(artifacts),
            publish_calls: AtomicU64::new(0),
        })
    }

    /// The active version, or `None` while untrained.
    pub fn current(&self) -> Option<Arc<ModelVersion>> {
        self.state.read().active.clone()
    }

    /// Id the next publish should carry.
    pub fn next_version_id(&self) -> VersionId {
        let on_disk = match &self.artifacts {
            Some(artifacts) => artifacts.highest_claimed().unwrap_or_else(|e| {
                tracing::warn!("Could not scan '{}': {}", artifacts.dir().display(), e);
                0
            }),
            None => 0,
        };
        self.state.read().high_water.max(on_disk) + 1
    }

    /// Make `version` active.
    ///
    /// Fails with `Publish` if its id is not above every id seen so far;
    /// the active version is untouched on any failure.
    pub fn publish(&self, version: ModelVersion) -> LifecycleResult<Arc<ModelVersion>> {
        self.publish_calls.fetch_add(1, Ordering::Relaxed);
        let _guard = self.publish_lock.lock();

        let latest = self.sync_high_water()?;
        if version.version_id() <= latest {
            tracing::warn!(
                "Refusing to publish model version {}: version {} already published",
                version.version_id(),
                latest
            );
            return Err(LifecycleError::Publish { attempted: version.version_id(), latest });
        }

        if let Some(artifacts) = &self.artifacts {
            artifacts.save_version(&version)?;
            if let Err(e) = artifacts.save_active(version.version_id()) {
                // Never leave a version on disk that was not published
                if let Err(cleanup) = artifacts.remove_version(version.version_id()) {
                    tracing::warn!(
                        "Could not remove model version {} after failed publish: {}",
                        version.version_id(),
                        cleanup
                    );
                }
                return Err(e);
            }
        }

        let version = Arc::new(version);
        {
            let mut state = self.state.write();
            state.history.push_back(Arc::clone(&version));
            while state.history.len() > self.retention {
                if let Some(evicted) = state.history.pop_front() {
                    tracing::debug!("Evicted model version {} from history", evicted.version_id());
                }
            }
            state.high_water = version.version_id();
            state.active     = Some(Arc::clone(&version));
        }

        tracing::info!(
            "Published model version {} (validation MAE {:.3})",
            version.version_id(),
            version.validation_error()
        );
        Ok(version)
    }

    /// Raise the mark to the highest version directory on disk.
    fn sync_high_water(&self) -> LifecycleResult<VersionId> {
        let on_disk = match &self.artifacts {
            Some(artifacts) => artifacts.highest_claimed()?,
            None => 0,
        };
        let mut state = self.state.write();
        state.high_water = state.high_water.max(on_disk);
        Ok(state.high_water)
    }

    /// Re-activate a retained version.
    pub fn rollback(&self, version_id: VersionId) -> LifecycleResult<Arc<ModelVersion>> {
        let _guard = self.publish_lock.lock();

        let target = self
            .state
            .read()
            .history
            .iter()
            .find(|v| v.version_id() == version_id)
            .cloned()
            .ok_or(LifecycleError::NotFound(version_id))?;

        if let Some(artifacts) = &self.artifacts {
            artifacts.save_active(version_id)?;
        }
        self.state.write().active = Some(Arc::clone(&target));

        tracing::info!("Rolled back to model version {}", version_id);
        Ok(target)
    }

    /// Retained versions, oldest first.
    pub fn history(&self) -> Vec<Arc<ModelVersion>> {
        self.state.read().history.iter().cloned().collect()
    }

    /// Number of times `publish` was called, successful or not.
    pub fn publish_calls(&self) -> u64 {
        self.publish_calls.load(Ordering::Relaxed)
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model_version::{ModelArtifact, ModelMetadata};
    use chrono::Utc;

    fn version(id: VersionId) -> ModelVersion {
        ModelVersion::new(
            ModelMetadata {
                version_id:       id,
                trained_at:       Utc::now(),
                sample_count:     10,
                validation_error: 0.5,
            },
            ModelArtifact::constant(id as f64),
        )
    }

    #[test]
    fn test_starts_untrained() {
        let reg = ModelRegistry::in_memory(5);
        assert!(reg.current().is_none());
        assert_eq!(reg.next_version_id(), 1);
    }

    #[test]
    fn test_publish_is_monotonic() {
        let reg = ModelRegistry::in_memory(5);
        reg.publish(version(2)).unwrap();

        for stale in [1, 2] {
            let err = reg.publish(version(stale)).unwrap_err();
            assert!(matches!(err, LifecycleError::Publish { attempted, latest: 2 } if attempted == stale));
            assert_eq!(reg.current().unwrap().version_id(), 2);
        }
        assert_eq!(reg.publish_calls(), 3);
        assert_eq!(reg.next_version_id(), 3);
    }

    #[test]
    fn test_retention_and_rollback() {
        let reg = ModelRegistry::in_memory(5);
        for id in 1..=6 {
            reg.publish(version(id)).unwrap();
        }
        let ids: Vec<VersionId> = reg.history().iter().map(|v| v.version_id()).collect();
        assert_eq!(ids, vec![2, 3, 4, 5, 6]);

        assert!(matches!(reg.rollback(1), Err(LifecycleError::NotFound(1))));
        assert_eq!(reg.current().unwrap().version_id(), 6);

        reg.rollback(3).unwrap();
        assert_eq!(reg.current().unwrap().version_id(), 3);
    }

    #[test]
    fn test_rollback_does_not_lower_high_water_mark() {
        let reg = ModelRegistry::in_memory(5);
        for id in 1..=3 {
            reg.publish(version(id)).unwrap();
        }
        reg.rollback(1).unwrap();
        assert_eq!(reg.next_version_id(), 4);
        assert!(reg.publish(version(2)).is_err());
        reg.publish(version(4)).unwrap();
        assert_eq!(reg.current().unwrap().version_id(), 4);
    }

    #[test]
    fn test_readers_keep_their_version_across_publish() {
        let reg = ModelRegistry::in_memory(2);
        reg.publish(version(1)).unwrap();
        let held = reg.current().unwrap();
        reg.publish(version(2)).unwrap();
        reg.publish(version(3)).unwrap();
        // Version 1 is evicted from history but the reader's Arc is intact
        assert_eq!(held.version_id(), 1);
        assert_eq!(held.artifact(), &ModelArtifact::constant(1.0));
    }

    #[test]
    fn test_reopen_restores_active_and_history() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = ModelRegistry::open(dir.path(), 3).unwrap();
            for id in 1..=4 {
                reg.publish(version(id)).unwrap();
            }
            reg.rollback(3).unwrap();
        }

        let reg = ModelRegistry::open(dir.path(), 3).unwrap();
        assert_eq!(reg.current().unwrap().version_id(), 3);
        let ids: Vec<VersionId> = reg.history().iter().map(|v| v.version_id()).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(reg.next_version_id(), 5);
        assert!(matches!(reg.rollback(1), Err(LifecycleError::NotFound(1))));
    }

    #[test]
    fn test_two_handles_on_one_directory_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let a   = ModelRegistry::open(dir.path(), 5).unwrap();
        let b   = ModelRegistry::open(dir.path(), 5).unwrap();

        a.publish(version(1)).unwrap();

        // b loaded before a published; it still may not reuse id 1
        let clash = ModelVersion::new(version(1).metadata().clone(), ModelArtifact::constant(99.0));
        assert!(matches!(b.publish(clash), Err(LifecycleError::Publish { attempted: 1, latest: 1 })));
        assert_eq!(b.next_version_id(), 2);
        b.publish(version(2)).unwrap();

        let reopened = ModelRegistry::open(dir.path(), 5).unwrap();
        let v1 = reopened.history().into_iter().find(|v| v.version_id() == 1).unwrap();
        assert_eq!(v1.artifact(), &ModelArtifact::constant(1.0));
        assert_eq!(reopened.current().unwrap().version_id(), 2);
    }

    #[test]
    fn test_failed_active_pointer_write_leaves_no_version_behind() {
        let dir = tempfile::tempdir().unwrap();
        let reg = ModelRegistry::open(dir.path(), 5).unwrap();

        // A directory where the pointer file belongs makes the rename fail
        std::fs::create_dir(dir.path().join("active.json")).unwrap();
        assert!(matches!(reg.publish(version(1)), Err(LifecycleError::Storage(_))));
        assert!(!dir.path().join("v1").exists());
        assert!(reg.current().is_none());
        assert_eq!(reg.next_version_id(), 1);

        std::fs::remove_dir(dir.path().join("active.json")).unwrap();
        reg.publish(version(1)).unwrap();
        assert_eq!(reg.current().unwrap().version_id(), 1);
    }

    #[test]
    fn test_reopen_empty_directory_is_untrained() {
        let dir = tempfile::tempdir().unwrap();
        let reg = ModelRegistry::open(dir.path().join("models"), 5).unwrap();
        assert!(reg.current().is_none());
        assert_eq!(reg.next_version_id(), 1);
    }
}
