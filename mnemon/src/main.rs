//! mnemon - memory consolidation engine for AI assistant conversation history
//!
//! Polls installed assistant platforms, normalizes their conversation stores
//! into a tiered consolidation store, and keeps an aggregate index over it.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Store: $XDG_DATA_HOME/mnemon/store (~/.local/share/mnemon/store)
//! - Logs: $XDG_STATE_HOME/mnemon/mnemon.log (~/.local/state/mnemon/mnemon.log)
//! - Config: $XDG_CONFIG_HOME/mnemon/config.toml (~/.config/mnemon/config.toml)

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mnemon_core::types::{Platform, ScanOutcome, ScanStatus};
use mnemon_core::{Config, Scheduler, Store};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "mnemon")]
#[command(about = "Consolidate AI assistant conversation history")]
#[command(version)]
struct Cli {
    /// Verbose output (-v failures and warnings, -vv per-platform detail)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan platform stores once, or continuously with --watch
    Scan {
        /// Scan only one platform (augment, warp, claude_code)
        #[arg(long)]
        platform: Option<String>,

        /// Keep polling on each platform's configured interval
        #[arg(short, long)]
        watch: bool,
    },

    /// Import a manually exported conversation file
    Import {
        /// Platform the export came from (e.g. cursor_export)
        platform: String,

        /// Path to the export file
        path: PathBuf,
    },

    /// Run one tier-migration pass over the store
    Migrate,

    /// Show store totals and per-platform scheduling state
    Status {
        /// Recompute the index and compare it with the materialized copy
        #[arg(long)]
        verify: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = mnemon_core::logging::init(&config.logging).ok();

    tracing::info!("mnemon starting");

    let store_root = config.store_root();
    let store = Arc::new(Store::open(&store_root).context("failed to open store")?);
    let scheduler =
        Arc::new(Scheduler::new(config, store).context("failed to build scheduler")?);

    match cli.command {
        Command::Scan { platform, watch } => {
            if watch {
                run_watch(&scheduler).await
            } else {
                run_scan(&scheduler, platform.as_deref(), cli.verbose).await
            }
        }
        Command::Import { platform, path } => {
            run_import(&scheduler, &platform, &path, cli.verbose).await
        }
        Command::Migrate => run_migrate(&scheduler).await,
        Command::Status { verify } => run_status(&scheduler, verify),
    }
}

fn parse_platform(name: &str) -> Result<Platform> {
    Platform::from_str(name).map_err(|_| {
        let known = Platform::all()
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        anyhow::anyhow!("unknown platform '{}' (known: {})", name, known)
    })
}

/// Cancellation token tied to Ctrl+C.
fn shutdown_token() -> Result<CancellationToken> {
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        handler_token.cancel();
    })
    .context("failed to set Ctrl+C handler")?;
    Ok(cancel)
}

// ============================================
// scan
// ============================================

async fn run_scan(scheduler: &Arc<Scheduler>, platform: Option<&str>, verbose: u8) -> Result<()> {
    let cancel = shutdown_token()?;

    let platforms: Vec<Platform> = match platform {
        Some(name) => vec![parse_platform(name)?],
        None => Platform::all().to_vec(),
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut outcomes = Vec::new();
    for platform in platforms {
        pb.set_message(format!("scanning {}", platform.display_name()));
        match scheduler.run_scan_once(platform, &cancel).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                // One platform's failure never blocks its siblings
                pb.suspend(|| println!("{}: scan error: {}", platform.display_name(), e));
                tracing::error!(platform = %platform, error = %e, "Scan failed");
            }
        }
        if cancel.is_cancelled() {
            break;
        }
    }
    pb.finish_and_clear();

    print_outcomes(&outcomes, verbose);

    let index = scheduler.store().index()?;
    println!(
        "\nStore: {} conversations ({} archived), {} decisions, {} actions",
        index.total_conversations,
        index.archived_conversations,
        index.total_decisions,
        index.total_actions
    );

    tracing::info!("mnemon scan complete");
    Ok(())
}

async fn run_watch(scheduler: &Arc<Scheduler>) -> Result<()> {
    let cancel = shutdown_token()?;

    let handles = scheduler.spawn(&cancel);
    if handles.is_empty() {
        println!("No pollable platforms enabled; nothing to watch.");
        return Ok(());
    }

    println!(
        "Watching {} platform(s). Press Ctrl+C to stop.",
        handles.len()
    );

    for handle in handles {
        let _ = handle.await;
    }

    println!("Watch stopped.");
    tracing::info!("mnemon watch stopped");
    Ok(())
}

// ============================================
// import
// ============================================

async fn run_import(
    scheduler: &Arc<Scheduler>,
    platform: &str,
    path: &PathBuf,
    verbose: u8,
) -> Result<()> {
    let platform = parse_platform(platform)?;
    if !path.exists() {
        anyhow::bail!("export file not found: {}", path.display());
    }

    let outcome = scheduler
        .run_import(platform, path)
        .await
        .context("import failed")?;

    print_outcomes(std::slice::from_ref(&outcome), verbose);
    Ok(())
}

// ============================================
// migrate
// ============================================

async fn run_migrate(scheduler: &Arc<Scheduler>) -> Result<()> {
    let outcome = scheduler
        .run_tier_migration()
        .await
        .context("tier migration failed")?;

    println!("Migration complete:");
    println!("  Demoted to medium: {}", outcome.demoted_to_medium);
    println!("  Demoted to old:    {}", outcome.demoted_to_old);
    println!("  Archived:          {}", outcome.archived);

    tracing::info!(moved = outcome.total_moved(), "mnemon migrate complete");
    Ok(())
}

// ============================================
// status
// ============================================

fn run_status(scheduler: &Arc<Scheduler>, verify: bool) -> Result<()> {
    let status = scheduler.status().context("failed to read status")?;

    println!("Store:");
    for (tier, count) in &status.store.tier_counts {
        println!("  {:<8} {} record(s)", tier.as_str(), count);
    }
    println!("  archive  {} bucket(s)", status.store.archive_buckets);

    let index = &status.store.index;
    println!("\nTotals:");
    println!("  Conversations: {}", index.total_conversations);
    println!("  Archived:      {}", index.archived_conversations);
    println!("  Decisions:     {}", index.total_decisions);
    println!("  Actions:       {}", index.total_actions);
    for (platform, count) in &index.per_platform {
        println!("    {:<14} {}", platform, count);
    }

    println!("\nPlatforms:");
    for p in &status.platforms {
        let mode = if p.import_only {
            "import-only"
        } else if !p.enabled {
            "disabled"
        } else if p.installed {
            "polling"
        } else {
            "not installed"
        };
        let last_scan = p
            .cursor
            .last_scan_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<14} {:<14} last scan: {}",
            p.platform.display_name(),
            mode,
            last_scan
        );
        if p.failing_artifacts > 0 {
            println!("    {} artifact(s) on a failure streak", p.failing_artifacts);
        }
    }

    if verify {
        let report = scheduler.store().verify().context("verify failed")?;
        if report.is_consistent() {
            println!("\nIndex verification: consistent");
        } else {
            println!("\nIndex verification: DRIFT DETECTED");
            println!("  stored:     {}", serde_json::to_string(&report.stored)?);
            println!("  recomputed: {}", serde_json::to_string(&report.recomputed)?);
            anyhow::bail!("aggregate index does not match a full fold");
        }
    }

    Ok(())
}

// ============================================
// output helpers
// ============================================

fn print_outcomes(outcomes: &[ScanOutcome], verbose: u8) {
    for outcome in outcomes {
        match outcome.status {
            ScanStatus::Disabled => {
                if verbose >= 2 {
                    println!("{}: disabled", outcome.platform.display_name());
                }
                continue;
            }
            ScanStatus::Cancelled => {
                println!("{}: cancelled mid-scan", outcome.platform.display_name());
            }
            ScanStatus::Completed => {}
        }

        let quiet = outcome.processed + outcome.skipped + outcome.failed == 0;
        if quiet && verbose < 2 {
            continue;
        }

        println!(
            "{}: {} processed, {} skipped, {} failed ({} new, {} merged, {} messages)",
            outcome.platform.display_name(),
            outcome.processed,
            outcome.skipped,
            outcome.failed,
            outcome.conversations_new,
            outcome.conversations_merged,
            outcome.messages_added
        );

        if verbose >= 1 {
            for failure in &outcome.failures {
                let streak = if failure.streak > 1 {
                    format!(" (failed {} scans running)", failure.streak)
                } else {
                    String::new()
                };
                println!("  failed: {}: {}{}", failure.artifact, failure.reason, streak);
            }
            for warning in &outcome.warnings {
                println!("  warning: {}", warning);
            }
        }
    }
}
