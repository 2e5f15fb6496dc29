// ============================================================
// Layer 6 — Artifact Store
// ============================================================
// Saves and restores published model versions so a restarted
// process comes back with the same active model instead of
// retraining from an empty state.
//
// What gets saved per version:
//   1. model.json — the serialized ModelArtifact
//   2. meta.json  — version_id, trained_at, sample_count,
//                   validation_error
//
// Plus one pointer file for the whole registry:
//   active.json   — the version_id currently serving predictions
//
// File naming convention:
//   models/
//     v1/model.json
//     v1/meta.json
//     v2/...
//     active.json
//
// Every file is written to a `.tmp` sibling and renamed into
// place, so a crash leaves either the old file or the new one.
// meta.json is written after model.json: a directory without
// meta.json is an unfinished write and is ignored on load.
//
// Why create the version directory with `create_dir`?
//   Creating it is the claim on the id. If another process (or
//   another registry handle) already made `v<id>`, creation fails
//   and we refuse to publish instead of overwriting a version
//   someone else may already be serving.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::domain::error::{LifecycleError, LifecycleResult};
use crate::domain::model_version::{ModelArtifact, ModelMetadata, ModelVersion, VersionId};

const MODEL_FILE:  &str = "model.json";
const META_FILE:   &str = "meta.json";
const ACTIVE_FILE: &str = "active.json";

/// Manages the on-disk layout of published model versions.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// Path to the directory where versions are stored
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create the store, creating its directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> LifecycleResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn version_dir(&self, id: VersionId) -> PathBuf {
        self.dir.join(format!("v{id}"))
    }

    /// Persist artifact then metadata for one version.
    ///
    /// Fails with `Publish` if the version directory already exists;
    /// an existing version is never overwritten.
    pub fn save_version(&self, version: &ModelVersion) -> LifecycleResult<()> {
        let id  = version.version_id();
        let dir = self.version_dir(id);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let latest = self.highest_claimed()?.max(id);
                return Err(LifecycleError::Publish { attempted: id, latest });
            }
            Err(e) => return Err(e.into()),
        }

        let written = write_json_atomic(&dir.join(MODEL_FILE), version.artifact())
            .and_then(|()| write_json_atomic(&dir.join(META_FILE), version.metadata()));
        if let Err(e) = written {
            self.discard(id);
            return Err(e);
        }

        tracing::debug!("Saved model version {} to '{}'", id, dir.display());
        Ok(())
    }

    /// Delete a version directory. Only used to undo a publish that
    /// failed before the version became visible.
    pub fn remove_version(&self, id: VersionId) -> LifecycleResult<()> {
        fs::remove_dir_all(self.version_dir(id))?;
        Ok(())
    }

    fn discard(&self, id: VersionId) {
        if let Err(e) = self.remove_version(id) {
            tracing::warn!("Could not remove unfinished model version {}: {}", id, e);
        }
    }

    /// Load one version written by `save_version`.
    pub fn load_version(&self, id: VersionId) -> LifecycleResult<ModelVersion> {
        let dir = self.version_dir(id);
        let metadata: ModelMetadata = read_json(&dir.join(META_FILE))?;
        let artifact: ModelArtifact = read_json(&dir.join(MODEL_FILE))?;
        Ok(ModelVersion::new(metadata, artifact))
    }

    /// Ids of every completely written version, ascending.
    pub fn list_versions(&self) -> LifecycleResult<Vec<VersionId>> {
        let mut ids: Vec<VersionId> = self
            .version_dirs()?
            .into_iter()
            .filter(|(_, path)| path.join(META_FILE).is_file())
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Greatest id with a version directory, finished or not; 0 if none.
    pub fn highest_claimed(&self) -> LifecycleResult<VersionId> {
        Ok(self.version_dirs()?.into_iter().map(|(id, _)| id).max().unwrap_or(0))
    }

    fn version_dirs(&self) -> LifecycleResult<Vec<(VersionId, PathBuf)>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name  = entry.file_name();
            let id = name
                .to_str()
                .and_then(|n| n.strip_prefix('v'))
                .and_then(|n| n.parse::<VersionId>().ok());

            if let Some(id) = id {
                if entry.file_type()?.is_dir() {
                    dirs.push((id, entry.path()));
                }
            }
        }
        Ok(dirs)
    }

    /// Record which version serves predictions.
    pub fn save_active(&self, id: VersionId) -> LifecycleResult<()> {
        write_json_atomic(&self.dir.join(ACTIVE_FILE), &id)
    }

    /// The recorded active version, `None` before the first publish.
    pub fn load_active(&self) -> LifecycleResult<Option<VersionId>> {
        let path = self.dir.join(ACTIVE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_json(&path)?))
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> LifecycleResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> LifecycleResult<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
