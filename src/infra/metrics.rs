// ============================================================
// Layer 6 — Training Run Ledger
// ============================================================
// Records every training run to a CSV file, whatever its outcome.
//
// Rejected models leave no artifact behind, so their validation
// error is only kept here. A run of "skipped" rows means the
// sensor feed stopped delivering samples.
//
// Output file: <data_dir>/training_log.csv
//
// Example CSV output:
//   finished_at,outcome,version_id,sample_count,validation_error,detail
//   2026-05-01T06:00:00+00:00,skipped,,9,,need 10 samples
//   2026-05-01T07:00:00+00:00,trained,1,10,2.314000,
//   2026-05-01T08:00:00+00:00,rejected,,14,3.902000,regressed
//   2026-05-01T09:00:00+00:00,failed,,15,1.870000,Storage error: ...
//
// One run is always one line: commas in the detail become ';'
// and line breaks become spaces.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::model_version::VersionId;

const HEADER: &str = "finished_at,outcome,version_id,sample_count,validation_error,detail";

/// One row of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub finished_at: DateTime<Utc>,

    /// "trained", "rejected", "skipped" or "failed"
    pub outcome: String,

    /// Set only when a version was published
    pub version_id: Option<VersionId>,

    /// Samples in the snapshot the run worked on
    pub sample_count: usize,

    /// Held-out MAE, when the run got far enough to compute it
    pub validation_error: Option<f64>,

    /// Rejection reason, skip explanation or error message
    pub detail: String,
}

/// Appends `TrainingRecord`s to a CSV file.
#[derive(Debug)]
pub struct TrainingLog {
    /// Full path to the CSV file
    csv_path: PathBuf,
    /// Serialises writers so rows never interleave
    write_lock: Mutex<()>,
}

impl TrainingLog {
    /// Create the log, writing the header if the file is new.
    /// Existing files are appended to across runs.
    pub fn new(csv_path: impl Into<PathBuf>) -> Result<Self> {
        let csv_path = csv_path.into();
        if let Some(parent) = csv_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created training log: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, write_lock: Mutex::new(()) })
    }

    /// Append one run as a new row.
    pub fn log(&self, r: &TrainingRecord) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{},{},{},{},{}",
            r.finished_at.to_rfc3339(),
            r.outcome,
            r.version_id.map(|v| v.to_string()).unwrap_or_default(),
            r.sample_count,
            r.validation_error.map(|e| format!("{e:.6}")).unwrap_or_default(),
            one_field(&r.detail),
        )?;

        Ok(())
    }

    /// Return the path to the CSV file
    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

fn one_field(text: &str) -> String {
    text.replace(',', ";").replace(['\r', '\n'], " ")
}
