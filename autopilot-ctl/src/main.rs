//! autopilot-ctl - Inspect and drive the Autopilot queue
//!
//! Unix-style tool for operators: queue status at a glance, and manual
//! triggers for the jobs the daemon normally runs on a cadence.

use clap::{Parser, Subcommand};
use libautopilot::clock::{Clock, SystemClock};
use libautopilot::jobs::{
    JobLease, ProcessScheduledPostsJob, RefreshSocialTokensJob, RetryFailedPostsJob, PROCESS_JOB,
    REFRESH_JOB, RETRY_JOB,
};
use libautopilot::publisher::{Publisher, PublisherRegistry};
use libautopilot::status::{self, StatusReport};
use libautopilot::tokens::StubTokenRefresher;
use libautopilot::{AutopilotError, Config, Result, Store};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "autopilot-ctl")]
#[command(version)]
#[command(about = "Inspect and drive the Autopilot queue")]
#[command(long_about = "\
autopilot-ctl - Inspect and drive the Autopilot queue

DESCRIPTION:
    autopilot-ctl is a Unix-style tool for operating the Autopilot
    publishing pipeline. Use it to see queue health at a glance or to
    trigger a job run without waiting for the daemon's cadence.

COMMANDS:
    status      Show queue counts and the next upcoming schedules
    run         Run the publishing jobs once, right now

USAGE EXAMPLES:
    # Queue health, human readable
    autopilot-ctl status

    # Queue health for scripts
    autopilot-ctl status --format json

    # Publish everything currently due
    autopilot-ctl run

    # Also sweep retries and refresh expiring tokens
    autopilot-ctl run --retry --refresh

    # See what a run would pick up, without touching anything
    autopilot-ctl run --dry-run

CONFIGURATION:
    Configuration file: ~/.config/autopilot/config.toml
    Database location: ~/.local/share/autopilot/autopilot.db

    Override with environment variables:
        AUTOPILOT_CONFIG - Path to config file

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show queue counts and upcoming schedules
    Status {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// How many upcoming schedules to list
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Run the publishing jobs once, right now
    Run {
        /// Also sweep retryable failures
        #[arg(long)]
        retry: bool,

        /// Also refresh expiring tokens
        #[arg(long)]
        refresh: bool,

        /// Report what would be picked up without publishing anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("error")
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let store = Store::new(&config.database.path).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Commands::Status { format, limit } => {
            if limit < 1 {
                return Err(AutopilotError::InvalidInput(
                    "limit must be at least 1".to_string(),
                ));
            }

            let report = status::gather(
                &store,
                clock.as_ref(),
                config.autopilot.retry_window_secs()?,
                limit,
            )
            .await?;

            match format.as_str() {
                "json" => print_status_json(&report)?,
                "text" => print_status_text(&report),
                other => {
                    return Err(AutopilotError::InvalidInput(format!(
                        "Unknown format: '{}'. Valid options: text, json",
                        other
                    )))
                }
            }
        }

        Commands::Run {
            retry,
            refresh,
            dry_run,
        } => {
            if dry_run {
                print_dry_run(&store, &config, clock.as_ref()).await?;
                return Ok(());
            }

            trigger_jobs(&store, &config, clock, retry, refresh).await?;
        }
    }

    Ok(())
}

fn print_status_json(report: &StatusReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| AutopilotError::InvalidInput(format!("Serialization failed: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn print_status_text(report: &StatusReport) {
    println!("Queue status as of {}", format_time(report.as_of));
    println!();
    println!("  pending:    {} ({} due now)", report.stats.pending, report.stats.due);
    println!("  publishing: {}", report.stats.publishing);
    println!("  published:  {}", report.stats.published);
    println!(
        "  failed:     {} ({} retryable)",
        report.stats.failed, report.stats.retryable
    );

    if report.stats.publishing > 0 {
        println!();
        println!("  note: publishing rows that never resolve were likely orphaned");
        println!("        by a crash mid-publish; inspect them before rescheduling");
    }

    if !report.upcoming.is_empty() {
        println!();
        println!("Upcoming:");
        for schedule in &report.upcoming {
            println!(
                "  {}  {:9}  {}",
                format_time(schedule.scheduled_at),
                schedule.platform.to_string(),
                schedule.id
            );
        }
    }
}

async fn print_dry_run(store: &Store, config: &Config, clock: &dyn Clock) -> Result<()> {
    let now = clock.now();
    let due = store.due_schedules(now).await?;
    let retryable = store
        .retryable_schedules(now, config.autopilot.retry_window_secs()?)
        .await?;
    let expiring = store
        .accounts_expiring_within(now, config.autopilot.token_lookahead_secs()?)
        .await?;

    println!("Dry run as of {}:", format_time(now));
    println!("  {} schedule(s) due for publishing", due.len());
    for schedule in &due {
        println!(
            "    {}  {:9}  scheduled {}",
            schedule.id,
            schedule.platform.to_string(),
            format_time(schedule.scheduled_at)
        );
    }
    println!("  {} failed schedule(s) eligible for retry", retryable.len());
    for schedule in &retryable {
        println!(
            "    {}  attempt {}/{}  {}",
            schedule.id,
            schedule.attempt_count,
            schedule.max_attempts,
            schedule.last_error.as_deref().unwrap_or("-")
        );
    }
    println!("  {} account token(s) expiring soon", expiring.len());
    for account in &expiring {
        println!("    {}  {}  @{}", account.id, account.platform, account.username);
    }

    Ok(())
}

async fn trigger_jobs(
    store: &Store,
    config: &Config,
    clock: Arc<dyn Clock>,
    retry: bool,
    refresh: bool,
) -> Result<()> {
    let refresher = Arc::new(StubTokenRefresher);
    let platforms = config.platforms.enabled_platforms()?;
    let registry = PublisherRegistry::with_stubs(&platforms);
    let publisher = Arc::new(Publisher::new(
        registry,
        refresher.clone(),
        store.clone(),
        clock.clone(),
    ));

    let lease_ttl = config.autopilot.lease_ttl_secs()?;

    {
        let lease = take_lease(store, PROCESS_JOB, clock.as_ref(), lease_ttl).await?;
        let job = ProcessScheduledPostsJob::new(store.clone(), publisher.clone(), clock.clone());
        let outcome = job.run().await;
        lease.release().await?;
        let outcome = outcome?;
        println!(
            "process: {} claimed, {} published, {} failed",
            outcome.claimed, outcome.published, outcome.failed
        );
    }

    if retry {
        let lease = take_lease(store, RETRY_JOB, clock.as_ref(), lease_ttl).await?;
        let job = RetryFailedPostsJob::new(
            store.clone(),
            publisher.clone(),
            clock.clone(),
            config.autopilot.retry_window_secs()?,
        );
        let outcome = job.run().await;
        lease.release().await?;
        let outcome = outcome?;
        println!(
            "retry: {} claimed, {} published, {} failed",
            outcome.claimed, outcome.published, outcome.failed
        );
    }

    if refresh {
        let lease = take_lease(store, REFRESH_JOB, clock.as_ref(), lease_ttl).await?;
        let job = RefreshSocialTokensJob::new(
            store.clone(),
            refresher,
            clock.clone(),
            config.autopilot.token_lookahead_secs()?,
        );
        let outcome = job.run().await;
        lease.release().await?;
        let outcome = outcome?;
        println!(
            "refresh: {} refreshed, {} failed",
            outcome.refreshed, outcome.failed
        );
    }

    Ok(())
}

async fn take_lease(
    store: &Store,
    job_name: &str,
    clock: &dyn Clock,
    ttl: i64,
) -> Result<JobLease> {
    JobLease::acquire(store, job_name, clock.now(), ttl)
        .await?
        .ok_or_else(|| {
            AutopilotError::InvalidInput(format!(
                "job '{}' is already running (lease held); try again shortly",
                job_name
            ))
        })
}

fn format_time(timestamp: i64) -> String {
    use chrono::{TimeZone, Utc};
    match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => format!("@{}", timestamp),
    }
}
