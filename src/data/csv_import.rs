// ============================================================
// Layer 4 — Legacy CSV Importer
// ============================================================
// Loads historical observations from the CSV layout the field
// deployment has been writing all along:
//
//   soil_moisture,temperature,humidity,crop_type,water_needed
//   35.2,28.1,55.4,0,22.5
//   ...
//
// Columns are located by header name, so extra columns (or a
// different column order) are tolerated. Every row goes through
// `SampleStore::append`, i.e. the same validation as live data.
// A bad row is logged, counted and skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::data::sample_store::SampleStore;
use crate::domain::sample::{CropType, Features, Sample, FEATURE_NAMES, TARGET_NAME};

/// Totals reported after an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped:  usize,
}

/// Import every valid row of the CSV at `path` into `store`.
///
/// A missing file is not an error: the deployment starts from
/// scratch the first time, so an empty report is returned.
pub fn import_csv(path: impl AsRef<Path>, store: &SampleStore) -> Result<ImportReport> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!("No historical data at '{}', nothing to import", path.display());
        return Ok(ImportReport::default());
    }

    let file = File::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line.with_context(|| format!("Cannot read '{}'", path.display()))?,
        None => return Ok(ImportReport::default()),
    };
    let columns = ColumnMap::from_header(&header)?;

    let mut report = ImportReport::default();
    for (idx, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        // +2: one for the header, one for 1-based line numbers
        let line_no = idx + 2;
        match columns.parse_row(&line).and_then(|s| Ok(store.append(s)?)) {
            Ok(_) => report.imported += 1,
            Err(e) => {
                tracing::warn!("Skipping line {} of '{}': {}", line_no, path.display(), e);
                report.skipped += 1;
            }
        }
    }

    tracing::info!(
        "Imported {} samples from '{}' ({} skipped)",
        report.imported,
        path.display(),
        report.skipped
    );
    Ok(report)
}

// ─── ColumnMap ────────────────────────────────────────────────────────────────
/// Positions of the required columns within a row.
struct ColumnMap {
    features: [usize; 4],
    target:   usize,
}

impl ColumnMap {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let find = |wanted: &str| -> Result<usize> {
            match names.iter().position(|n| *n == wanted) {
                Some(pos) => Ok(pos),
                None => bail!("CSV header is missing column '{wanted}'"),
            }
        };

        Ok(Self {
            features: [
                find(FEATURE_NAMES[0])?,
                find(FEATURE_NAMES[1])?,
                find(FEATURE_NAMES[2])?,
                find(FEATURE_NAMES[3])?,
            ],
            target: find(TARGET_NAME)?,
        })
    }

    fn parse_row(&self, line: &str) -> Result<Sample> {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        let number = |pos: usize, name: &str| -> Result<f64> {
            let cell = cells
                .get(pos)
                .filter(|c| !c.is_empty())
                .with_context(|| format!("missing value for '{name}'"))?;
            cell.parse::<f64>()
                .with_context(|| format!("'{name}' is not a number: '{cell}'"))
        };

        let features = Features::new(
            number(self.features[0], FEATURE_NAMES[0])?,
            number(self.features[1], FEATURE_NAMES[1])?,
            number(self.features[2], FEATURE_NAMES[2])?,
            CropType::from_number(number(self.features[3], FEATURE_NAMES[3])?)?,
        )?;
        Ok(Sample::now(features, number(self.target, TARGET_NAME)?)?)
    }
}
