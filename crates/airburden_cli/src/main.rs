//! CLI entry point for the airburden pipeline.
//!
//! # Responsibility
//! - Load `.env`, the JSON config and file logging before any stage runs.
//! - Expose the full run and each stage as its own subcommand.

use airburden_core::config::{BurdenSource, PipelineConfig};
use airburden_core::service::pipeline::{Pipeline, PipelineReport};
use airburden_core::{default_log_level, init_logging, open_db, WaqiClient};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "airburden")]
#[command(about = "Reconcile air-quality readings, compute AQI and join burden data", long_about = None)]
struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(short, long, default_value = "airburden.json")]
    config: PathBuf,

    /// Directory for rolling log files
    #[arg(long, default_value = "logs")]
    log_dir: String,

    /// trace|debug|info|warn|error (defaults by build mode)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage in order
    Run {
        /// Print the run report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Fetch and store one live reading per configured city
    Fetch,
    /// Import burden tables; a single file when --path and --country are given
    ImportBurden {
        #[arg(long, requires = "country")]
        path: Option<PathBuf>,
        #[arg(long, requires = "path")]
        country: Option<String>,
    },
    /// Remove duplicate observations
    Dedup,
    /// Rebuild the merged series
    Merge,
    /// Rebuild the burden/AQI join
    Join,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or_else(|| default_log_level());
    init_logging(level, &cli.log_dir).map_err(|message| anyhow!(message))?;

    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("loading config `{}`", cli.config.display()))?;
    let mut conn = open_db(&config.database_path).with_context(|| {
        format!("opening database `{}`", config.database_path.display())
    })?;
    let feed = config.feed.clone();
    let mut pipeline = Pipeline::new(&mut conn, config);
    info!(
        "event=cli_start module=cli status=ok run_id={}",
        pipeline.run_id()
    );

    match cli.command {
        Commands::Run { json } => {
            let client = WaqiClient::new(feed.base_url.clone(), feed.token_from_env()?, feed.timeout())?;
            let report = pipeline.run(&client)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Fetch => {
            let client = WaqiClient::new(feed.base_url.clone(), feed.token_from_env()?, feed.timeout())?;
            let report = pipeline.ingest_live(&client)?;
            println!(
                "live: inserted={} already_present={} readings={} failed={}",
                report.inserted, report.already_present, report.readings, report.failed
            );
        }
        Commands::ImportBurden { path, country } => match (path, country) {
            (Some(path), Some(country)) => {
                let report = pipeline.import_burden_source(&BurdenSource { country, path })?;
                println!(
                    "burden: country={} inserted={} skipped_rows={}",
                    report.country, report.inserted, report.skipped_rows
                );
            }
            _ => {
                let summary = pipeline.import_burden()?;
                for report in &summary.imported {
                    println!(
                        "burden: country={} inserted={} skipped_rows={}",
                        report.country, report.inserted, report.skipped_rows
                    );
                }
                println!("burden: failed_sources={}", summary.failed);
            }
        },
        Commands::Dedup => {
            let report = pipeline.dedup()?;
            println!(
                "dedup: observations_deleted={} readings_deleted={} skipped_missing_table={}",
                report.observations_deleted, report.readings_deleted, report.skipped_missing_table
            );
        }
        Commands::Merge => {
            let report = pipeline.merge()?;
            println!(
                "merge: stations={} inserted={} live_rows={} historical_rows={} dropped_rows={} rejected_archives={}",
                report.stations,
                report.inserted,
                report.live_rows,
                report.historical_rows,
                report.dropped_rows,
                report.rejected_archives
            );
        }
        Commands::Join => {
            let report = pipeline.join()?;
            println!(
                "join: aggregates={} burden_records={} joined={} skipped_unmapped={} skipped_invalid={}",
                report.aggregates,
                report.burden_records,
                report.joined,
                report.skipped_unmapped,
                report.skipped_invalid
            );
        }
    }
    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!("run_id={}", report.run_id);
    println!(
        "live: inserted={} already_present={} failed={}",
        report.live.inserted, report.live.already_present, report.live.failed
    );
    println!(
        "burden: sources={} failed_sources={}",
        report.burden.imported.len(),
        report.burden.failed
    );
    println!(
        "dedup: observations_deleted={} readings_deleted={}",
        report.dedup.observations_deleted, report.dedup.readings_deleted
    );
    println!(
        "merge: stations={} inserted={} dropped_rows={}",
        report.merge.stations, report.merge.inserted, report.merge.dropped_rows
    );
    println!(
        "join: joined={} skipped_unmapped={} skipped_invalid={}",
        report.join.joined, report.join.skipped_unmapped, report.join.skipped_invalid
    );
}
