//! drupal-migrate CLI - run Drupal 6/7 to Drupal 8 migrations.

use clap::{Args, Parser, Subcommand};
use drupal_migrate::error::{EXIT_CANCELLED, EXIT_IMPORT_ERROR, EXIT_ROLLBACK_ERROR};
use drupal_migrate::{Config, MigrateError, MigrationResult, Orchestrator, RunOptions, Selection};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "drupal-migrate")]
#[command(about = "Migrate a Drupal 6/7 site into a Drupal 8 target store")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to run state file (busy locks, high-water marks)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Accept a state file written for a different configuration
    #[arg(long)]
    force: bool,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

/// Which migrations to act on.
#[derive(Args)]
struct SelectionArgs {
    /// Migration ids (default: all)
    ids: Vec<String>,

    /// Only migrations carrying this tag
    #[arg(long)]
    tag: Option<String>,
}

impl SelectionArgs {
    fn selection(self) -> Selection {
        Selection {
            ids: self.ids,
            tag: self.tag,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import migrations, dependencies first
    Import {
        #[command(flatten)]
        select: SelectionArgs,

        /// Stop each migration after this many processed rows
        #[arg(long)]
        limit: Option<u64>,

        /// Reprocess rows that were already imported
        #[arg(long)]
        update: bool,

        /// Also import required dependencies of the selected migrations
        #[arg(long)]
        execute_dependencies: bool,
    },

    /// Roll back migrations, dependents first
    Rollback {
        #[command(flatten)]
        select: SelectionArgs,
    },

    /// Show per-migration progress
    Status {
        #[command(flatten)]
        select: SelectionArgs,
    },

    /// Show messages recorded for a migration's rows
    Messages {
        /// Migration id
        id: String,
    },

    /// Force a migration back to idle after an interrupted run
    ResetStatus {
        /// Migration id
        id: String,
    },

    /// List migrations in execution order
    List {
        #[command(flatten)]
        select: SelectionArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    // List needs no database connections.
    if let Commands::List { select } = cli.command {
        return list(&config, select.selection(), cli.output_json);
    }

    let mut orchestrator = Orchestrator::new(config).await?;
    if let Some(path) = cli.state_file.clone() {
        orchestrator = orchestrator.with_state_file(path, cli.force);
    }

    match cli.command {
        Commands::Import {
            select,
            limit,
            update,
            execute_dependencies,
        } => {
            let options = RunOptions {
                limit,
                update,
                execute_dependencies,
                cancel: setup_signal_handler(),
            };
            let result = orchestrator.import(&select.selection(), &options).await?;
            print_result(&result, cli.output_json)?;
            Ok(result_code(&result, EXIT_IMPORT_ERROR))
        }

        Commands::Rollback { select } => {
            let options = RunOptions {
                cancel: setup_signal_handler(),
                ..Default::default()
            };
            let result = orchestrator.rollback(&select.selection(), &options).await?;
            print_result(&result, cli.output_json)?;
            Ok(result_code(&result, EXIT_ROLLBACK_ERROR))
        }

        Commands::Status { select } => {
            let reports = orchestrator.status(&select.selection()).await?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                println!(
                    "{:<40} {:<13} {:>8} {:>8} {:>11} {:>8} {:>8}",
                    "Migration", "Status", "Total", "Imported", "Unprocessed", "Failed", "Messages"
                );
                for report in &reports {
                    let total = report.total.map_or("N/A".to_string(), |t| t.to_string());
                    let unprocessed = report
                        .unprocessed
                        .map_or("N/A".to_string(), |u| u.to_string());
                    println!(
                        "{:<40} {:<13} {:>8} {:>8} {:>11} {:>8} {:>8}",
                        report.id,
                        report.status.as_str(),
                        total,
                        report.imported,
                        unprocessed,
                        report.failed,
                        report.messages
                    );
                }
            }
            Ok(0)
        }

        Commands::Messages { id } => {
            let messages = orchestrator.messages(&id).await?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else if messages.is_empty() {
                println!("No messages for {}", id);
            } else {
                for message in &messages {
                    println!(
                        "{} [{:?}] {}",
                        message.source_ids_hash, message.level, message.message
                    );
                }
            }
            Ok(0)
        }

        Commands::ResetStatus { id } => {
            let previous = orchestrator.reset_status(&id).await?;
            println!("{}: {} -> idle", id, previous);
            Ok(0)
        }

        Commands::List { .. } => Ok(0),
    }
}

fn list(config: &Config, selection: Selection, output_json: bool) -> Result<u8, MigrateError> {
    let ordered = selection.resolve(config, false)?;

    if output_json {
        let ids: Vec<&str> = ordered.iter().map(|def| def.id.as_str()).collect();
        println!("{}", serde_json::to_string_pretty(&ids)?);
    } else {
        for def in ordered {
            println!("{:<40} {}", def.id, def.label());
        }
    }
    Ok(0)
}

fn print_result(result: &MigrationResult, output_json: bool) -> Result<(), MigrateError> {
    if output_json {
        println!("{}", result.to_json()?);
        return Ok(());
    }

    println!("\n{} {}", capitalize(&result.operation), result.status);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    for summary in &result.migrations {
        let detail = match (&summary.counts, &summary.rollback, &summary.message) {
            (Some(c), _, _) => format!(
                "{} processed ({} created, {} updated, {} ignored, {} failed)",
                c.processed, c.created, c.updated, c.ignored, c.failed
            ),
            (None, Some(r), _) => format!(
                "{} rolled back, {} cleared, {} failed",
                r.rolled_back, r.cleared, r.failed
            ),
            (None, None, Some(message)) => message.clone(),
            (None, None, None) => String::new(),
        };
        println!("  {:<40} {:<22} {}", summary.id, summary.status, detail);
    }
    Ok(())
}

fn result_code(result: &MigrationResult, failure: u8) -> u8 {
    match result.status.as_str() {
        "completed" => 0,
        "cancelled" => EXIT_CANCELLED,
        _ => failure,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout stays parseable with --output-json.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// The current row finishes and is mapped before the run stops.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current row...", name);
                    token.cancel();
                }
                Err(e) => error!("Failed to set up {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Stopping after the current row...");
                token.cancel();
            }
            Err(e) => error!("Failed to set up Ctrl-C handler: {}", e),
        }
    });

    cancel_token
}
