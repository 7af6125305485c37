//! autopilotd - Background daemon for the Autopilot publishing pipeline
//!
//! Runs the three recurring jobs on their own cadences: publishing due
//! schedules, retrying recoverable failures, and refreshing OAuth tokens
//! before they expire.

use clap::Parser;
use libautopilot::clock::{Clock, SystemClock};
use libautopilot::jobs::{
    JobLease, ProcessScheduledPostsJob, RefreshSocialTokensJob, RetryFailedPostsJob, PROCESS_JOB,
    REFRESH_JOB, RETRY_JOB,
};
use libautopilot::publisher::{Publisher, PublisherRegistry};
use libautopilot::tokens::StubTokenRefresher;
use libautopilot::{AutopilotError, Config, Result, Store};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "autopilotd")]
#[command(version)]
#[command(about = "Background daemon for scheduled social publishing")]
#[command(long_about = "\
autopilotd - Background daemon for scheduled social publishing

DESCRIPTION:
    autopilotd is a long-running daemon that drives the Autopilot queue.
    It publishes schedules whose time has come, retries recoverable
    failures on a slower cadence, and renews OAuth access tokens before
    they expire.

    Each job takes a short database lease before running, so multiple
    daemon instances against the same database never run the same job
    concurrently.

USAGE:
    # Run in foreground (logs to stderr)
    autopilotd

    # Override job cadences
    autopilotd --process-interval 30 --retry-interval 300

    # Run every job once and exit
    autopilotd --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current job)

CONFIGURATION:
    Configuration file: ~/.config/autopilot/config.toml
    Database location: ~/.local/share/autopilot/autopilot.db

    [autopilot]
    process_interval = \"1m\"
    retry_interval = \"15m\"
    refresh_interval = \"1h\"
    max_attempts = 3
    retry_window = \"24h\"

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Database or configuration error
")]
struct Cli {
    /// Seconds between due-schedule sweeps (overrides config)
    #[arg(long, value_name = "SECONDS")]
    process_interval: Option<i64>,

    /// Seconds between retry sweeps (overrides config)
    #[arg(long, value_name = "SECONDS")]
    retry_interval: Option<i64>,

    /// Seconds between token refresh sweeps (overrides config)
    #[arg(long, value_name = "SECONDS")]
    refresh_interval: Option<i64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run every job once and exit
    #[arg(long)]
    once: bool,
}

struct JobSet {
    store: Store,
    clock: Arc<dyn Clock>,
    process: ProcessScheduledPostsJob,
    retry: RetryFailedPostsJob,
    refresh: RefreshSocialTokensJob,
    lease_ttl: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    libautopilot::logging::init(
        libautopilot::logging::LogFormat::Text,
        "info",
        cli.verbose,
    );

    let config = Config::load()?;
    let store = Store::new(&config.database.path).await?;

    info!("autopilotd starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let refresher = Arc::new(StubTokenRefresher);

    let platforms = config.platforms.enabled_platforms()?;
    let registry = PublisherRegistry::with_stubs(&platforms);
    let publisher = Arc::new(Publisher::new(
        registry,
        refresher.clone(),
        store.clone(),
        clock.clone(),
    ));

    let jobs = JobSet {
        store: store.clone(),
        clock: clock.clone(),
        process: ProcessScheduledPostsJob::new(store.clone(), publisher.clone(), clock.clone()),
        retry: RetryFailedPostsJob::new(
            store.clone(),
            publisher.clone(),
            clock.clone(),
            config.autopilot.retry_window_secs()?,
        ),
        refresh: RefreshSocialTokensJob::new(
            store.clone(),
            refresher,
            clock.clone(),
            config.autopilot.token_lookahead_secs()?,
        ),
        lease_ttl: config.autopilot.lease_ttl_secs()?,
    };

    let process_interval = cli
        .process_interval
        .map(Ok)
        .unwrap_or_else(|| config.autopilot.process_interval_secs())?;
    let retry_interval = cli
        .retry_interval
        .map(Ok)
        .unwrap_or_else(|| config.autopilot.retry_interval_secs())?;
    let refresh_interval = cli
        .refresh_interval
        .map(Ok)
        .unwrap_or_else(|| config.autopilot.refresh_interval_secs())?;

    info!(
        process_interval,
        retry_interval, refresh_interval, "job cadences (seconds)"
    );

    if cli.once {
        run_process(&jobs).await;
        run_retry(&jobs).await;
        run_refresh(&jobs).await;
        info!("autopilotd: ran every job once, exiting");
    } else {
        run_daemon_loop(
            &jobs,
            process_interval,
            retry_interval,
            refresh_interval,
            shutdown,
        )
        .await;
    }

    info!("autopilotd stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| AutopilotError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

/// Tick once a second; fire each job when its cadence comes due.
async fn run_daemon_loop(
    jobs: &JobSet,
    process_interval: i64,
    retry_interval: i64,
    refresh_interval: i64,
    shutdown: Arc<AtomicBool>,
) {
    let mut next_process = jobs.clock.now();
    let mut next_retry = jobs.clock.now();
    let mut next_refresh = jobs.clock.now();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        let now = jobs.clock.now();

        if now >= next_process {
            run_process(jobs).await;
            next_process = now + process_interval;
        }
        if now >= next_retry {
            run_retry(jobs).await;
            next_retry = now + retry_interval;
        }
        if now >= next_refresh {
            run_refresh(jobs).await;
            next_refresh = now + refresh_interval;
        }

        sleep(Duration::from_secs(1)).await;
    }
}

async fn run_process(jobs: &JobSet) {
    with_lease(jobs, PROCESS_JOB, || async {
        let outcome = jobs.process.run().await?;
        if outcome.claimed > 0 {
            info!(
                claimed = outcome.claimed,
                published = outcome.published,
                failed = outcome.failed,
                "processed due schedules"
            );
        }
        Ok(())
    })
    .await;
}

async fn run_retry(jobs: &JobSet) {
    with_lease(jobs, RETRY_JOB, || async {
        let outcome = jobs.retry.run().await?;
        if outcome.claimed > 0 {
            info!(
                claimed = outcome.claimed,
                published = outcome.published,
                failed = outcome.failed,
                "retried failed schedules"
            );
        }
        Ok(())
    })
    .await;
}

async fn run_refresh(jobs: &JobSet) {
    with_lease(jobs, REFRESH_JOB, || async {
        let outcome = jobs.refresh.run().await?;
        if outcome.refreshed > 0 || outcome.failed > 0 {
            info!(
                refreshed = outcome.refreshed,
                failed = outcome.failed,
                "refreshed expiring tokens"
            );
        }
        Ok(())
    })
    .await;
}

/// Run one job invocation under its lease. A held lease means another
/// instance is on it; a job error is logged, never fatal to the daemon.
async fn with_lease<F, Fut>(jobs: &JobSet, job_name: &str, run: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let lease = match JobLease::acquire(&jobs.store, job_name, jobs.clock.now(), jobs.lease_ttl)
        .await
    {
        Ok(Some(lease)) => lease,
        Ok(None) => {
            info!(job = job_name, "lease held elsewhere, skipping run");
            return;
        }
        Err(e) => {
            error!(job = job_name, error = %e, "failed to acquire lease");
            return;
        }
    };

    if let Err(e) = run().await {
        error!(job = job_name, error = %e, "job run failed");
    }

    if let Err(e) = lease.release().await {
        error!(job = job_name, error = %e, "failed to release lease");
    }
}
