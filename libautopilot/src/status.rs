//! Operator-facing queue status

use serde::Serialize;

use crate::clock::Clock;
use crate::error::Result;
use crate::store::Store;
use crate::types::PostSchedule;

/// Counts over the schedule queue at one instant
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    /// Pending rows already past their scheduled time
    pub due: i64,
    /// Claimed rows; a persistently nonzero value after a crash means
    /// rows were orphaned mid-publish
    pub publishing: i64,
    pub published: i64,
    pub failed: i64,
    /// Failed rows that the retry job will still pick up
    pub retryable: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub as_of: i64,
    pub stats: QueueStats,
    pub upcoming: Vec<PostSchedule>,
}

/// Gather a status report as of the clock's now
pub async fn gather(
    store: &Store,
    clock: &dyn Clock,
    retry_window: i64,
    upcoming_limit: i64,
) -> Result<StatusReport> {
    use crate::types::ScheduleStatus::*;

    let now = clock.now();

    let stats = QueueStats {
        pending: store.count_by_status(Pending).await?,
        due: store.count_due(now).await?,
        publishing: store.count_by_status(Publishing).await?,
        published: store.count_by_status(Published).await?,
        failed: store.count_by_status(Failed).await?,
        retryable: store.count_retryable(now, retry_window).await?,
    };

    let upcoming = store.upcoming(now, upcoming_limit).await?;

    Ok(StatusReport {
        as_of: now,
        stats,
        upcoming,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{Platform, Post, PostSchedule, ScheduleStatus, SocialAccount};

    const NOW: i64 = 1_700_000_000;

    async fn seed(store: &Store, scheduled_at: i64) -> PostSchedule {
        let post = Post::new("hello".to_string(), None);
        store.create_post(&post).await.unwrap();
        let account = SocialAccount::new(Platform::Instagram, "brand".to_string());
        store.create_account(&account).await.unwrap();
        let schedule = PostSchedule::new(post.id, account.id, Platform::Instagram, scheduled_at, 3);
        store.create_schedule(&schedule).await.unwrap();
        schedule
    }

    #[tokio::test]
    async fn test_gather_counts_each_state() {
        let store = Store::in_memory().await.unwrap();
        let clock = ManualClock::new(NOW);

        // One due pending, one future pending.
        seed(&store, NOW - 10).await;
        let future = seed(&store, NOW + 100).await;

        // One published.
        let done = seed(&store, NOW - 50).await;
        store.claim(&done.id, ScheduleStatus::Pending).await.unwrap();
        store.mark_published(&done.id, NOW, "ig_1", None).await.unwrap();

        // One failed inside the retry window.
        let failed = seed(&store, NOW - 30).await;
        store.claim(&failed.id, ScheduleStatus::Pending).await.unwrap();
        store.mark_failed(&failed.id, "boom").await.unwrap();

        // One stuck in publishing.
        let stuck = seed(&store, NOW - 40).await;
        store.claim(&stuck.id, ScheduleStatus::Pending).await.unwrap();

        let report = gather(&store, &clock, 24 * 3600, 10).await.unwrap();

        assert_eq!(report.as_of, NOW);
        assert_eq!(report.stats.pending, 2);
        assert_eq!(report.stats.due, 1);
        assert_eq!(report.stats.publishing, 1);
        assert_eq!(report.stats.published, 1);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.retryable, 1);

        assert_eq!(report.upcoming.len(), 1);
        assert_eq!(report.upcoming[0].id, future.id);
    }

    #[tokio::test]
    async fn test_report_serializes_to_json() {
        let store = Store::in_memory().await.unwrap();
        let clock = ManualClock::new(NOW);

        let report = gather(&store, &clock, 24 * 3600, 10).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["as_of"], NOW);
        assert_eq!(json["stats"]["pending"], 0);
        assert!(json["upcoming"].as_array().unwrap().is_empty());
    }
}
