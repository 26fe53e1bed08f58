//! forum-migrate CLI - migrates a legacy forum database into the next schema.

use clap::{Parser, Subcommand};
use forum_migrate::{Config, MigrateError, Orchestrator, ProgressUpdate};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Buffered progress events before the orchestrator waits on the printer.
const PROGRESS_BUFFER: usize = 64;

#[derive(Parser)]
#[command(name = "forum-migrate")]
#[command(about = "Migrate a legacy forum database into the next schema")]
#[command(version)]
struct Cli {
    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, global = true, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full migration (default)
    Run,

    /// Validate row counts between legacy and next databases
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = Config::from_env()?;
    info!(
        "Migrating {} -> {}",
        config.source.describe(),
        config.target.describe()
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
            let printer = spawn_progress_printer(rx, !cli.output_json);

            let orchestrator = Orchestrator::new(config).await?.with_progress(tx);
            let outcome = orchestrator.run().await;
            orchestrator.close().await;
            // dropping the sender ends the printer
            drop(orchestrator);
            let _ = printer.await;

            let result = outcome?;
            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}", result.tables.len());
                println!("  Rows: {}", result.rows_transferred);
                println!(
                    "  Boards merged: {} ({} threads moved)",
                    result.boards.boards_deleted, result.boards.threads_reassigned
                );
                println!("  Tags stripped: {} replies", result.tags.rows_rewritten);
                println!("  Quotes flattened: {} replies", result.quotes.rows_rewritten);
            }
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config).await?;
            let report = orchestrator.validate().await;
            orchestrator.close().await;
            let report = report?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for table in &report {
                    println!(
                        "  {} {} -> {} (source: {}, destination: {})",
                        if table.matches { "✓" } else { "✗" },
                        table.source,
                        table.target,
                        table.source_rows,
                        table.target_rows
                    );
                }
                let mismatched = report.iter().filter(|t| !t.matches).count();
                println!(
                    "\nValidation completed: {} tables, {} mismatched",
                    report.len(),
                    mismatched
                );
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (legacy): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Destination (next): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connectivity(
                    "health check",
                    "one or both stores unreachable",
                ));
            }
        }
    }

    Ok(())
}

/// Render stage and table events as task lines until the channel closes.
fn spawn_progress_printer(
    mut rx: mpsc::Receiver<ProgressUpdate>,
    enabled: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if !enabled {
                continue;
            }
            if let Some(line) = render(&update) {
                println!("{}", line);
            }
        }
    })
}

/// Operator-facing line for a progress event, if it has one.
fn render(update: &ProgressUpdate) -> Option<String> {
    match update {
        ProgressUpdate::TableCopyStarted { source, target } => {
            Some(format!("Copying data from {} to {}", source, target))
        }
        ProgressUpdate::StageCompleted { stage } => Some(format!("{}: ✔", stage)),
        ProgressUpdate::StageFailed { stage, .. } => Some(format!("{}: ✘", stage)),
        ProgressUpdate::StageStarted { .. } | ProgressUpdate::TableCopied { .. } => None,
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forum_migrate::{Stage, TransferStats};

    #[test]
    fn test_render_table_copy() {
        let update = ProgressUpdate::TableCopyStarted {
            source: "posts".to_string(),
            target: "replies".to_string(),
        };
        assert_eq!(
            render(&update).as_deref(),
            Some("Copying data from posts to replies")
        );
    }

    #[test]
    fn test_render_stage_completed() {
        let update = ProgressUpdate::StageCompleted { stage: Stage::Copy };
        assert_eq!(render(&update).as_deref(), Some("Copying data: ✔"));

        let update = ProgressUpdate::StageCompleted {
            stage: Stage::RemapBoards,
        };
        assert_eq!(
            render(&update).as_deref(),
            Some("Converting categories to boards: ✔")
        );
    }

    #[test]
    fn test_render_stage_failed() {
        let update = ProgressUpdate::StageFailed {
            stage: Stage::Verify,
            error: "connection refused".to_string(),
        };
        assert_eq!(render(&update).as_deref(), Some("Verifying configuration: ✘"));
    }

    #[test]
    fn test_silent_events() {
        let started = ProgressUpdate::StageStarted {
            stage: Stage::FlattenQuotes,
        };
        assert_eq!(render(&started), None);

        let copied = ProgressUpdate::TableCopied {
            stats: TransferStats::default(),
        };
        assert_eq!(render(&copied), None);
    }
}
