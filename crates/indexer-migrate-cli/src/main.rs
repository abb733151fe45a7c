//! indexer-migrate CLI - v2 to v3 Ethereum indexer database migration.

mod drive;
mod gaps;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use indexer_migrate::error::{EXIT_CANCELLED, EXIT_MIGRATION_ERROR};
use indexer_migrate::{
    db, Config, HealthReport, MigrateError, Migrator, RunReport, TableReport, TransferReport,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "indexer-migrate")]
#[command(about = "Migrate Ethereum indexer tables from the v2 to the v3 Postgres schema")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error [default: info, or log.level]
    #[arg(long)]
    verbosity: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Seconds to wait for workers after SIGINT/SIGTERM
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate table rows over block ranges
    Migrate {
        /// Tables to migrate, comma separated
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Override number of workers per table
        #[arg(long)]
        workers_per_table: Option<usize>,

        /// Start height of an extra range
        #[arg(long, requires = "stop_height")]
        start_height: Option<u64>,

        /// Stop height of an extra range
        #[arg(long, requires = "start_height")]
        stop_height: Option<u64>,

        /// Detect the range from the old database's headers
        #[arg(long)]
        auto_range: bool,

        /// Blocks per range for auto range detection
        #[arg(long)]
        segment_size: Option<u64>,
    },

    /// Copy public.blocks page by page through a foreign table
    Transfer {
        /// Foreign table mapping the old public.blocks
        #[arg(long)]
        transfer_table_name: Option<String>,

        /// Pages per transaction
        #[arg(long)]
        transfer_segment_size: Option<u64>,

        /// Leading segments to skip
        #[arg(long)]
        segment_offset: Option<u64>,

        /// Last page to copy (0 queries the foreign table)
        #[arg(long)]
        max_page: Option<u64>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;

    let verbosity = cli
        .verbosity
        .clone()
        .or_else(|| config.log.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let log_file = cli.log_file.clone().or_else(|| config.log.file.clone());
    setup_logging(&verbosity, &cli.log_format, log_file.as_deref())?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Migrate {
            tables,
            workers_per_table,
            start_height,
            stop_height,
            auto_range,
            segment_size,
        } => {
            let migration = &mut config.migration;
            if !tables.is_empty() {
                migration.tables = tables;
            }
            if let Some(w) = workers_per_table {
                migration.workers_per_table = Some(w);
            }
            if let (Some(start), Some(stop)) = (start_height, stop_height) {
                migration.start = Some(start);
                migration.stop = Some(stop);
            }
            if auto_range {
                migration.auto_range = true;
            }
            if let Some(size) = segment_size {
                migration.segment_size = Some(size);
            }
            config.validate()?;

            let tables = config.migration.table_names()?;
            if tables.is_empty() {
                return Err(MigrateError::Config(
                    "no tables configured; set migration.tables or --tables".into(),
                ));
            }

            let started_at = Utc::now();
            let migrator = Arc::new(Migrator::connect(&config).await?);
            let cancel = setup_signal_handler(migrator.clone()).await?;

            let ranges = drive::plan_ranges(&migrator, &config).await?;
            info!(
                "migrating {} tables over {} ranges with {} workers per table",
                tables.len(),
                ranges.len(),
                config.migration.workers()
            );

            let outcome = with_shutdown_timeout(
                &cancel,
                cli.shutdown_timeout,
                drive::migrate(migrator.clone(), &config, &tables, &ranges),
            )
            .await;
            migrator.close();

            let mut report = RunReport::new("migrate", config.hash(), started_at);
            report.tables = outcome?;
            report.finish(cancel.is_cancelled());
            print_report(&report, cli.output_json)?;
            Ok(exit_code(&report))
        }

        Commands::Transfer {
            transfer_table_name,
            transfer_segment_size,
            segment_offset,
            max_page,
        } => {
            let transfer = &mut config.transfer;
            if let Some(name) = transfer_table_name {
                transfer.table_name = name;
            }
            if let Some(size) = transfer_segment_size {
                transfer.segment_size = size;
            }
            if let Some(offset) = segment_offset {
                transfer.segment_offset = offset;
            }
            if let Some(page) = max_page {
                transfer.max_page = page;
            }
            config.validate()?;

            let started_at = Utc::now();
            let migrator = Arc::new(Migrator::connect(&config).await?);
            let cancel = setup_signal_handler(migrator.clone()).await?;

            let outcome = with_shutdown_timeout(
                &cancel,
                cli.shutdown_timeout,
                drive::transfer(&migrator, &config),
            )
            .await;
            migrator.close();

            let mut report = RunReport::new("transfer", config.hash(), started_at);
            report.transfer = Some(outcome?);
            report.finish(cancel.is_cancelled());
            print_report(&report, cli.output_json)?;
            Ok(exit_code(&report))
        }

        Commands::HealthCheck => {
            let old = db::connect(&config.old, 1, "old").await?;
            let new = db::connect(&config.new, 1, "new").await?;
            let result = HealthReport {
                old_latency_ms: db::ping(&old, "old").await?.as_millis() as u64,
                new_latency_ms: db::ping(&new, "new").await?.as_millis() as u64,
            };
            old.close();
            new.close();

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Old (v2): OK {} ({}ms)",
                    config.old.display_target(),
                    result.old_latency_ms
                );
                println!(
                    "  New (v3): OK {} ({}ms)",
                    config.new.display_target(),
                    result.new_latency_ms
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Await `work`, giving up `timeout_secs` after a shutdown signal.
async fn with_shutdown_timeout<T>(
    cancel: &CancellationToken,
    timeout_secs: u64,
    work: impl std::future::Future<Output = Result<T, MigrateError>>,
) -> Result<T, MigrateError> {
    tokio::select! {
        result = work => result,
        _ = async {
            cancel.cancelled().await;
            tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        } => {
            eprintln!("Workers did not stop within {}s", timeout_secs);
            Err(MigrateError::Cancelled)
        }
    }
}

fn exit_code(report: &RunReport) -> ExitCode {
    if report.status == "cancelled" {
        ExitCode::from(EXIT_CANCELLED)
    } else if report.has_gaps() {
        ExitCode::from(EXIT_MIGRATION_ERROR)
    } else {
        ExitCode::SUCCESS
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<(), MigrateError> {
    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    let status_msg = match report.status.as_str() {
        "cancelled" => "Run cancelled.",
        "completed_with_gaps" => "Run completed with gaps!",
        _ => "Run completed!",
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    for table in &report.tables {
        print_table(table);
    }
    if let Some(transfer) = &report.transfer {
        print_transfer(transfer);
    }
    Ok(())
}

fn print_table(table: &TableReport) {
    println!(
        "  {}: {} ranges sent, {} unsent, {} read gaps, {} write gaps, {} errors",
        table.table,
        table.ranges_sent,
        table.ranges_unsent,
        table.read_gaps.len(),
        table.write_gaps.len(),
        table.errors
    );
}

fn print_transfer(transfer: &TransferReport) {
    println!(
        "  {}: {} segments, {} failed, {} errors",
        transfer.table_name,
        transfer.segments,
        transfer.failed_segments.len(),
        transfer.errors
    );
    for pages in &transfer.failed_segments {
        println!("    failed pages {}", pages);
    }
}

fn setup_logging(verbosity: &str, format: &str, file: Option<&Path>) -> Result<(), MigrateError> {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "fatal" | "panic" => Level::ERROR,
        _ => Level::INFO,
    };

    let writer = match file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Close the migrator on SIGINT or SIGTERM.
/// Returns a token cancelled when a signal was received.
#[cfg(unix)]
async fn setup_signal_handler(migrator: Arc<Migrator>) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Stopping workers...", name);
        token.cancel();
        migrator.close();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler(migrator: Arc<Migrator>) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping workers...");
            token.cancel();
            migrator.close();
        }
    });

    Ok(cancel_token)
}
