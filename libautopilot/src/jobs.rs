//! The three recurring Autopilot jobs
//!
//! Every job follows the same shape: take the row lease on its slice of
//! work via an atomic claim, do the side effect, record the outcome. A
//! platform failure is data (recorded on the row); only storage failures
//! abort an invocation, and rows already resolved stay resolved.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Result;
use crate::publisher::Publisher;
use crate::store::Store;
use crate::tokens::TokenRefresher;
use crate::types::{PostSchedule, ScheduleStatus};

pub const PROCESS_JOB: &str = "process_scheduled_posts";
pub const RETRY_JOB: &str = "retry_failed_posts";
pub const REFRESH_JOB: &str = "refresh_social_tokens";

/// Mutual exclusion for one job across daemon instances.
///
/// Backed by the `job_leases` table. Holding a lease does not time out the
/// work; it only stops a second instance starting the same job until
/// `expires_at` passes.
pub struct JobLease {
    store: Store,
    job_name: String,
    holder: String,
}

impl JobLease {
    /// Try to take the lease. `None` means another holder has it.
    pub async fn acquire(store: &Store, job_name: &str, now: i64, ttl: i64) -> Result<Option<Self>> {
        let holder = Uuid::new_v4().to_string();
        if store.acquire_lease(job_name, &holder, now, ttl).await? {
            Ok(Some(Self {
                store: store.clone(),
                job_name: job_name.to_string(),
                holder,
            }))
        } else {
            Ok(None)
        }
    }

    pub async fn release(self) -> Result<()> {
        self.store.release_lease(&self.job_name, &self.holder).await
    }
}

/// Counts from one publishing job invocation
#[derive(Debug, Default, Clone, Serialize)]
pub struct PublishRunOutcome {
    /// Rows this invocation won the claim for
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
}

/// Counts from one token refresh invocation
#[derive(Debug, Default, Clone, Serialize)]
pub struct RefreshRunOutcome {
    pub refreshed: usize,
    pub failed: usize,
}

/// Publishes schedules whose time has come
pub struct ProcessScheduledPostsJob {
    store: Store,
    publisher: Arc<Publisher>,
    clock: Arc<dyn Clock>,
}

impl ProcessScheduledPostsJob {
    pub fn new(store: Store, publisher: Arc<Publisher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            publisher,
            clock,
        }
    }

    pub async fn run(&self) -> Result<PublishRunOutcome> {
        let now = self.clock.now();
        let due = self.store.due_schedules(now).await?;

        if !due.is_empty() {
            info!(count = due.len(), "processing due schedules");
        }

        let mut outcome = PublishRunOutcome::default();
        for schedule in due {
            attempt_publish(
                &self.store,
                &self.publisher,
                &self.clock,
                schedule,
                ScheduleStatus::Pending,
                &mut outcome,
            )
            .await?;
        }

        Ok(outcome)
    }
}

/// Re-attempts failed schedules still inside their attempt budget and
/// retry window
pub struct RetryFailedPostsJob {
    store: Store,
    publisher: Arc<Publisher>,
    clock: Arc<dyn Clock>,
    retry_window: i64,
}

impl RetryFailedPostsJob {
    pub fn new(
        store: Store,
        publisher: Arc<Publisher>,
        clock: Arc<dyn Clock>,
        retry_window: i64,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            retry_window,
        }
    }

    pub async fn run(&self) -> Result<PublishRunOutcome> {
        let now = self.clock.now();
        let retryable = self.store.retryable_schedules(now, self.retry_window).await?;

        if !retryable.is_empty() {
            info!(count = retryable.len(), "retrying failed schedules");
        }

        let mut outcome = PublishRunOutcome::default();
        for schedule in retryable {
            attempt_publish(
                &self.store,
                &self.publisher,
                &self.clock,
                schedule,
                ScheduleStatus::Failed,
                &mut outcome,
            )
            .await?;
        }

        Ok(outcome)
    }
}

/// Claim one schedule, publish it, record the outcome.
///
/// Losing the claim is not an error; someone else got there first and the
/// row is skipped. A missing post or account resolves the row as failed.
async fn attempt_publish(
    store: &Store,
    publisher: &Publisher,
    clock: &Arc<dyn Clock>,
    schedule: PostSchedule,
    expected: ScheduleStatus,
    outcome: &mut PublishRunOutcome,
) -> Result<()> {
    if !store.claim(&schedule.id, expected).await? {
        return Ok(());
    }
    outcome.claimed += 1;

    let post = store.get_post(&schedule.post_id).await?;
    let account = store.get_account(&schedule.account_id).await?;

    let (post, account) = match (post, account) {
        (Some(post), Some(account)) => (post, account),
        (None, _) => {
            error!(schedule_id = %schedule.id, post_id = %schedule.post_id, "post missing");
            store.mark_failed(&schedule.id, "post not found").await?;
            outcome.failed += 1;
            return Ok(());
        }
        (_, None) => {
            error!(schedule_id = %schedule.id, account_id = %schedule.account_id, "account missing");
            store.mark_failed(&schedule.id, "account not found").await?;
            outcome.failed += 1;
            return Ok(());
        }
    };

    let result = publisher.publish(&post, &account).await?;

    if result.success {
        let platform_post_id = result.platform_post_id.as_deref().unwrap_or_default();
        store
            .mark_published(
                &schedule.id,
                clock.now(),
                platform_post_id,
                result.platform_post_url.as_deref(),
            )
            .await?;
        outcome.published += 1;
    } else {
        let message = result
            .error_message
            .as_deref()
            .unwrap_or("publish failed");
        store.mark_failed(&schedule.id, message).await?;
        outcome.failed += 1;
    }

    Ok(())
}

/// Renews access tokens expiring inside the lookahead window
pub struct RefreshSocialTokensJob {
    store: Store,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    token_lookahead: i64,
}

impl RefreshSocialTokensJob {
    pub fn new(
        store: Store,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
        token_lookahead: i64,
    ) -> Self {
        Self {
            store,
            refresher,
            clock,
            token_lookahead,
        }
    }

    pub async fn run(&self) -> Result<RefreshRunOutcome> {
        let now = self.clock.now();
        let accounts = self
            .store
            .accounts_expiring_within(now, self.token_lookahead)
            .await?;

        if !accounts.is_empty() {
            info!(count = accounts.len(), "refreshing expiring tokens");
        }

        let mut outcome = RefreshRunOutcome::default();
        for account in accounts {
            match self.refresher.refresh(&account).await {
                Ok(grant) => {
                    self.store
                        .update_account_token(&account.id, &grant.access_token, grant.expires_at)
                        .await?;
                    info!(
                        account_id = %account.id,
                        platform = %account.platform,
                        expires_at = grant.expires_at,
                        "token refreshed"
                    );
                    outcome.refreshed += 1;
                }
                Err(e) => {
                    // One stubborn account must not block the rest.
                    warn!(
                        account_id = %account.id,
                        platform = %account.platform,
                        error = %e,
                        "token refresh failed"
                    );
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }
}
