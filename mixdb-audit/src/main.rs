//! mixdb-audit command line
//!
//! **Usage:**
//! ```bash
//! mixdb-audit import --mixes mixes.csv --components components.csv
//! mixdb-audit audit --output issues.csv [--summary summary.json]
//! mixdb-audit correct --output corrections.csv [--failures failures.csv] [--dry-run]
//! mixdb-audit reclassify [--dry-run]
//! ```
//!
//! Every command runs in one batch transaction against `<root>/mixdb.db`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mixdb_audit::import::import_files;
use mixdb_audit::report::{write_corrections_csv, write_issues_csv};
use mixdb_audit::{audit, correct, reconcile_flags, AuditError, Disposition, SqliteBatch};
use mixdb_common::config::{database_path, resolve_root_folder, TomlConfig};
use mixdb_common::db::init_database;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[clap(name = "mixdb-audit")]
#[clap(about = "Check and correct reported w/c and w/b ratios of concrete mixes")]
struct Args {
    /// Restrict the run to one dataset
    #[clap(long, global = true)]
    dataset: Option<String>,

    /// Root folder holding mixdb.db
    #[clap(long, global = true, value_name = "DIR")]
    root_folder: Option<PathBuf>,

    /// Config file (default: ~/.config/mixdb/config.toml)
    #[clap(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load mixes and components from CSV files
    Import {
        #[clap(long, value_name = "FILE")]
        mixes: PathBuf,

        #[clap(long, value_name = "FILE")]
        components: PathBuf,

        /// Validate and report without committing
        #[clap(long)]
        dry_run: bool,
    },

    /// Report ratio mismatches without changing anything
    Audit {
        /// Detail report CSV
        #[clap(long, value_name = "FILE", default_value = "ratio_issues.csv")]
        output: PathBuf,

        /// Also export the run summary as JSON
        #[clap(long, value_name = "FILE")]
        summary: Option<PathBuf>,
    },

    /// Overwrite stored w/b ratios with calculated values
    Correct {
        /// Correction report CSV
        #[clap(long, value_name = "FILE", default_value = "ratio_corrections.csv")]
        output: PathBuf,

        /// Detail CSV of mixes that could not be read or calculated
        #[clap(long, value_name = "FILE", default_value = "ratio_failures.csv")]
        failures: PathBuf,

        /// Also export the run summary as JSON
        #[clap(long, value_name = "FILE")]
        summary: Option<PathBuf>,

        /// Compute and report corrections, then roll back
        #[clap(long)]
        dry_run: bool,
    },

    /// Rewrite stale cementitious flags on mix components
    Reclassify {
        #[clap(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let default_level = toml_config.log_level.clone().unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = database_path(&root_folder);
    info!("Root folder: {}", root_folder.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let reconcile = toml_config.reconcile;
    let dataset = args.dataset.as_deref();

    let mut batch = SqliteBatch::begin(&pool).await?;

    match args.command {
        Command::Import {
            mixes,
            components,
            dry_run,
        } => {
            let outcome = import_files(&mut batch, &mixes, &components).await;
            let summary = batch.finish(outcome, Disposition::from_dry_run(dry_run)).await?;
            println!("Import: {}", summary.display_string());
            for skipped in &summary.skipped {
                println!("  skipped {} line {}: {}", skipped.file, skipped.line, skipped.reason);
            }
        }

        Command::Audit { output, summary } => {
            let outcome = audit(&mut batch, dataset, &reconcile).await.map_err(AuditError::from);
            // Audit never writes; discard keeps the database untouched regardless
            let report = batch.finish(outcome, Disposition::Discard).await?;

            let rows = write_issues_csv(&output, &report.issues)?;
            info!("Wrote {} issues to {}", rows, output.display());
            if let Some(path) = summary {
                report.summary.export_json(&path)?;
            }
            println!("Audit: {}", report.summary.display_string());
        }

        Command::Correct {
            output,
            failures,
            summary,
            dry_run,
        } => {
            let outcome = correct(&mut batch, dataset, &reconcile)
                .await
                .map_err(AuditError::from);
            let report = batch.finish(outcome, Disposition::from_dry_run(dry_run)).await?;

            let rows = write_corrections_csv(&output, &report.corrections, reconcile.storage_rounding_places)?;
            info!("Wrote {} corrections to {}", rows, output.display());
            let failed = write_issues_csv(&failures, &report.failures)?;
            info!("Wrote {} failed mixes to {}", failed, failures.display());
            if let Some(path) = summary {
                report.summary.export_json(&path)?;
            }
            if dry_run {
                println!("Dry run, nothing committed");
            }
            println!("Correct: {}", report.summary.display_string());
        }

        Command::Reclassify { dry_run } => {
            let outcome = reconcile_flags(&mut batch, dataset).await.map_err(AuditError::from);
            let result = batch.finish(outcome, Disposition::from_dry_run(dry_run)).await?;
            if dry_run {
                println!("Dry run, nothing committed");
            }
            println!("Reclassify: checked={}, updated={}", result.checked, result.updated);
        }
    }

    pool.close().await;
    Ok(())
}
