// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Every command opens the same on-disk state:
//
//   --config    optional JSON LifecycleConfig
//   --data-dir  overrides config.data_dir
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;

use irrigation_model::application::{Lifecycle, LifecycleConfig, TrainingOutcome};
use irrigation_model::data::csv_import::import_csv;
use irrigation_model::domain::sample::{CropType, Features, Sample};
use commands::{
    AppendArgs, Commands, ImportCsvArgs, PredictArgs, ReadingArgs, RollbackArgs, ScheduleArgs,
    TrainArgs,
};

/// Top-level arguments; `--config` and `--data-dir` apply to every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "irrigation-model",
    version,
    about = "Collect irrigation samples, retrain the water-need model and serve predictions."
)]
pub struct Cli {
    /// JSON config file (every field optional)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding samples, model versions and the training log
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        let mut config = match &self.config {
            Some(path) => LifecycleConfig::load(path)?,
            None       => LifecycleConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }

        match self.command {
            Commands::Append(args)    => run_append(config, args),
            Commands::ImportCsv(args) => run_import(config, args),
            Commands::Train(args)     => run_train(config, args),
            Commands::Predict(args)   => run_predict(config, args),
            Commands::Versions        => run_versions(config),
            Commands::Rollback(args)  => run_rollback(config, args),
            Commands::Schedule(args)  => run_schedule(config, args),
        }
    }
}

/// Handles the `append` subcommand.
fn run_append(config: LifecycleConfig, args: AppendArgs) -> Result<()> {
    let lifecycle = Lifecycle::open(config)?;

    let sample = match &args.reading.json {
        Some(json) => Sample::from_json(&parse_json(json)?)?,
        None => {
            let target = args.water_needed.context("--water-needed is required")?;
            Sample::now(features_from_flags(&args.reading)?, target)?
        }
    };

    let seq = lifecycle.store.append(sample)?;
    println!("Stored sample #{} ({} samples total)", seq, lifecycle.store.len());
    Ok(())
}

/// Handles the `import-csv` subcommand.
fn run_import(config: LifecycleConfig, args: ImportCsvArgs) -> Result<()> {
    let lifecycle = Lifecycle::open(config)?;
    let report    = import_csv(&args.path, &lifecycle.store)?;
    println!(
        "Imported {} samples from '{}' ({} rows skipped)",
        report.imported,
        args.path.display(),
        report.skipped
    );
    Ok(())
}

/// Handles the `train` subcommand.
fn run_train(mut config: LifecycleConfig, args: TrainArgs) -> Result<()> {
    args.apply_to(&mut config);
    let lifecycle = Lifecycle::open(config)?;

    tracing::info!("Training on samples in '{}'", lifecycle.config.data_dir);
    match lifecycle.train_now()? {
        TrainingOutcome::Trained(v) => println!(
            "Published model version {} (validation MAE {:.3} mm, {} samples)",
            v.version_id(),
            v.validation_error(),
            v.sample_count()
        ),
        TrainingOutcome::Rejected(reason) => println!("Model rejected: {reason}"),
        TrainingOutcome::SkippedInsufficientData { available, required } => println!(
            "Not enough data to train: {available} samples, {required} required"
        ),
    }
    Ok(())
}

/// Handles the `predict` subcommand. Prints the response as JSON.
fn run_predict(config: LifecycleConfig, args: PredictArgs) -> Result<()> {
    let lifecycle  = Lifecycle::open(config)?;
    let prediction = match &args.reading.json {
        Some(json) => lifecycle.predictor.predict_json(&parse_json(json)?)?,
        None       => lifecycle.predictor.predict(&features_from_flags(&args.reading)?)?,
    };
    println!("{}", serde_json::to_string(&prediction)?);
    Ok(())
}

/// Handles the `versions` subcommand.
fn run_versions(config: LifecycleConfig) -> Result<()> {
    let lifecycle = Lifecycle::open(config)?;
    let active    = lifecycle.registry.current().map(|v| v.version_id());
    let history   = lifecycle.registry.history();

    if history.is_empty() {
        println!("No model versions yet.");
        return Ok(());
    }

    println!("{:<3}{:>8}  {:<26}{:>8}  {:>10}", "", "version", "trained_at", "samples", "val_mae");
    for v in history {
        let marker = if Some(v.version_id()) == active { "*" } else { "" };
        println!(
            "{:<3}{:>8}  {:<26}{:>8}  {:>10.3}",
            marker,
            v.version_id(),
            v.trained_at().format("%Y-%m-%d %H:%M:%S UTC"),
            v.sample_count(),
            v.validation_error()
        );
    }
    Ok(())
}

/// Handles the `rollback` subcommand.
fn run_rollback(config: LifecycleConfig, args: RollbackArgs) -> Result<()> {
    let lifecycle = Lifecycle::open(config)?;
    let version   = lifecycle.registry.rollback(args.version)?;
    println!("Model version {} is active again", version.version_id());
    Ok(())
}

/// Handles the `schedule` subcommand. Blocks until `--max-runs` is
/// reached, or forever without it.
fn run_schedule(mut config: LifecycleConfig, args: ScheduleArgs) -> Result<()> {
    args.train.apply_to(&mut config);
    if let Some(secs) = args.interval_secs {
        config.retrain_interval_secs = secs;
    }
    let lifecycle = Lifecycle::open(config)?;
    let handle    = lifecycle.start_schedule()?;

    println!(
        "Retraining every {}s on '{}' (Ctrl-C to stop)",
        lifecycle.config.retrain_interval_secs,
        lifecycle.config.data_dir
    );
    while args.max_runs.map_or(true, |max| handle.runs_completed() < max) {
        thread::sleep(Duration::from_millis(250));
    }

    handle.stop();
    println!("Stopped after {} runs", args.max_runs.unwrap_or_default());
    Ok(())
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).context("--json is not valid JSON")
}

fn features_from_flags(r: &ReadingArgs) -> Result<Features> {
    let (Some(soil), Some(temp), Some(hum), Some(crop)) =
        (r.soil_moisture, r.temperature, r.humidity, r.crop_type.as_deref())
    else {
        bail!("--soil-moisture, --temperature, --humidity and --crop-type are all required");
    };
    Ok(Features::new(soil, temp, hum, parse_crop(crop)?)?)
}

/// Accepts a numeric code or a crop name ("mint bush", "mint-bush", "MINT_BUSH").
fn parse_crop(text: &str) -> Result<CropType> {
    if let Ok(code) = text.trim().parse::<f64>() {
        return Ok(CropType::from_number(code)?);
    }
    let wanted = text.trim().to_lowercase().replace(['_', '-'], " ");
    CropType::ALL
        .into_iter()
        .find(|c| c.name() == wanted)
        .with_context(|| format!("unknown crop type '{text}'"))
}
