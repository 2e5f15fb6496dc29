// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands and all their configurable flags:
//
//   append      — record one labelled sensor reading
//   import-csv  — bulk-load a legacy sensor_data.csv
//   train       — run one training pass now
//   predict     — ask the active model for a water amount
//   versions    — list retained model versions
//   rollback    — re-activate a retained version
//   schedule    — retrain periodically until stopped
//
// Training flags are optional overrides: anything left unset
// keeps the value from --config (or the built-in default).
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use irrigation_model::application::config::LifecycleConfig;

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record one labelled sample (flags or --json)
    Append(AppendArgs),

    /// Import samples from a CSV with a
    /// soil_moisture,temperature,humidity,crop_type,water_needed header
    ImportCsv(ImportCsvArgs),

    /// Train once on the stored samples and publish if accepted
    Train(TrainArgs),

    /// Predict the water need for one set of readings
    Predict(PredictArgs),

    /// List retained model versions, marking the active one
    Versions,

    /// Make a retained model version active again
    Rollback(RollbackArgs),

    /// Retrain on a fixed interval until interrupted
    Schedule(ScheduleArgs),
}

/// Sensor readings shared by `append` and `predict`.
#[derive(Args, Debug, Clone)]
pub struct ReadingArgs {
    /// Soil moisture in percent
    #[arg(long, required_unless_present = "json")]
    pub soil_moisture: Option<f64>,

    /// Air temperature in °C
    #[arg(long, required_unless_present = "json")]
    pub temperature: Option<f64>,

    /// Relative humidity in percent
    #[arg(long, required_unless_present = "json")]
    pub humidity: Option<f64>,

    /// Crop: 0/tomato, 1/onion, 2/"mint bush"
    #[arg(long, required_unless_present = "json")]
    pub crop_type: Option<String>,

    /// The whole record as one JSON object instead of separate flags
    #[arg(long, conflicts_with_all = ["soil_moisture", "temperature", "humidity", "crop_type"])]
    pub json: Option<String>,
}

/// All arguments for the `append` command
#[derive(Args, Debug)]
pub struct AppendArgs {
    #[command(flatten)]
    pub reading: ReadingArgs,

    /// Water actually needed, in mm (the label)
    #[arg(long, required_unless_present = "json", conflicts_with = "json")]
    pub water_needed: Option<f64>,
}

/// All arguments for the `import-csv` command
#[derive(Args, Debug)]
pub struct ImportCsvArgs {
    /// Path to the CSV file
    #[arg(long, default_value = "sensor_data.csv")]
    pub path: PathBuf,
}

/// Training overrides for `train` and `schedule`.
#[derive(Args, Debug, Clone, Default)]
pub struct TrainArgs {
    /// Skip training below this many samples
    #[arg(long)]
    pub min_samples: Option<usize>,

    /// Fraction of samples used for fitting (rest validates)
    #[arg(long)]
    pub train_ratio: Option<f64>,

    /// Seed for the train/validation shuffle
    #[arg(long)]
    pub split_seed: Option<u64>,

    /// Reject models whose validation MAE exceeds the active one by more than this
    #[arg(long)]
    pub regression_tolerance: Option<f64>,

    /// Train only on samples recorded within this many seconds
    #[arg(long)]
    pub window_max_age_secs: Option<u64>,

    /// Train only on the most recent N samples
    #[arg(long)]
    pub window_max_count: Option<usize>,

    /// Reject a run that takes longer than this before publishing
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Number of optimisation steps
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Optimiser step size
    #[arg(long)]
    pub learning_rate: Option<f64>,
}

impl TrainArgs {
    /// Overlay the flags that were given onto `config`.
    /// The application layer never sees clap types.
    pub fn apply_to(&self, config: &mut LifecycleConfig) {
        if let Some(v) = self.min_samples { config.min_samples = v; }
        if let Some(v) = self.train_ratio { config.train_ratio = v; }
        if let Some(v) = self.split_seed  { config.split_seed = v; }
        if let Some(v) = self.epochs      { config.epochs = v; }
        if let Some(v) = self.learning_rate { config.learning_rate = v; }
        if self.regression_tolerance.is_some() { config.regression_tolerance = self.regression_tolerance; }
        if self.window_max_age_secs.is_some()  { config.window_max_age_secs = self.window_max_age_secs; }
        if self.window_max_count.is_some()     { config.window_max_count = self.window_max_count; }
        if self.timeout_secs.is_some()         { config.timeout_secs = self.timeout_secs; }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub reading: ReadingArgs,
}

/// All arguments for the `rollback` command
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Version id to re-activate (see `versions`)
    #[arg(long)]
    pub version: u64,
}

/// All arguments for the `schedule` command
#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Seconds between runs (overrides retrain_interval_secs)
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Stop after this many runs instead of running forever
    #[arg(long)]
    pub max_runs: Option<u64>,

    #[command(flatten)]
    pub train: TrainArgs,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_flags_keep_config_values() {
        let mut cfg = LifecycleConfig { regression_tolerance: Some(0.5), ..Default::default() };
        TrainArgs { min_samples: Some(20), ..Default::default() }.apply_to(&mut cfg);
        assert_eq!(cfg.min_samples, 20);
        assert_eq!(cfg.regression_tolerance, Some(0.5));
        assert_eq!(cfg.train_ratio, 0.8);
    }
}
