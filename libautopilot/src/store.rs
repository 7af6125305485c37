//! SQLite persistence for the Autopilot pipeline
//!
//! All mutation of `post_schedules` goes through the claim-then-resolve
//! pattern: a row is claimed with an atomic conditional update (the claim
//! succeeds only if the row is still in its expected pre-state), then its
//! outcome is recorded with a guarded update. Reads are plain queries.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DbError, Result};
use crate::types::{Platform, Post, PostSchedule, ScheduleStatus, SocialAccount};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if necessary) the database at `db_path` and run
    /// migrations.
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes work on both Windows and Unix; mode=rwc creates
        // the file if it does not exist.
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        // sqlx turns `PRAGMA foreign_keys` on by default; the schema's
        // FOREIGN KEY clauses are documentation only — missing posts and
        // accounts are resolved by the jobs at run time.
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(DbError::SqlxError)?
            .foreign_keys(false);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// In-memory store, used by tests and dry runs.
    ///
    /// A single long-lived connection: each pooled SQLite connection would
    /// otherwise open its own private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(
                SqliteConnectOptions::from_str("sqlite::memory:")
                    .map_err(DbError::SqlxError)?
                    .foreign_keys(false),
            )
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, body, media_url, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.body)
        .bind(&post.media_url)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, body, media_url, created_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| Post {
            id: r.get("id"),
            body: r.get("body"),
            media_url: r.get("media_url"),
            created_at: r.get("created_at"),
        }))
    }

    // ------------------------------------------------------------------
    // Social accounts
    // ------------------------------------------------------------------

    pub async fn create_account(&self, account: &SocialAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_accounts
                (id, platform, username, active, access_token, refresh_token, token_expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(account.platform)
        .bind(&account.username)
        .bind(account.active)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.token_expires_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(
            r#"
            SELECT id, platform, username, active, access_token, refresh_token, token_expires_at
            FROM social_accounts WHERE id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(account_from_row))
    }

    pub async fn list_accounts(&self) -> Result<Vec<SocialAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT id, platform, username, active, access_token, refresh_token, token_expires_at
            FROM social_accounts
            ORDER BY platform, username
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(account_from_row).collect())
    }

    /// Active accounts holding a refresh token whose access token expires
    /// inside the lookahead window (or already has)
    pub async fn accounts_expiring_within(
        &self,
        now: i64,
        lookahead: i64,
    ) -> Result<Vec<SocialAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT id, platform, username, active, access_token, refresh_token, token_expires_at
            FROM social_accounts
            WHERE active = 1
              AND refresh_token IS NOT NULL
              AND token_expires_at IS NOT NULL
              AND token_expires_at <= ?
            ORDER BY token_expires_at
            "#,
        )
        .bind(now + lookahead)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(account_from_row).collect())
    }

    pub async fn update_account_token(
        &self,
        account_id: &str,
        access_token: &str,
        expires_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE social_accounts
            SET access_token = ?, token_expires_at = ?
            WHERE id = ?
            "#,
        )
        .bind(access_token)
        .bind(expires_at)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Schedules
    // ------------------------------------------------------------------

    pub async fn create_schedule(&self, schedule: &PostSchedule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_schedules
                (id, post_id, account_id, platform, status, scheduled_at, published_at,
                 attempt_count, max_attempts, last_error, platform_post_id, platform_post_url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&schedule.id)
        .bind(&schedule.post_id)
        .bind(&schedule.account_id)
        .bind(schedule.platform)
        .bind(schedule.status)
        .bind(schedule.scheduled_at)
        .bind(schedule.published_at)
        .bind(schedule.attempt_count)
        .bind(schedule.max_attempts)
        .bind(&schedule.last_error)
        .bind(&schedule.platform_post_id)
        .bind(&schedule.platform_post_url)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_schedule(&self, schedule_id: &str) -> Result<Option<PostSchedule>> {
        let row = sqlx::query(&select_schedules("WHERE id = ?"))
            .bind(schedule_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.map(schedule_from_row))
    }

    /// Schedules whose time has come: pending and scheduled_at <= now
    pub async fn due_schedules(&self, now: i64) -> Result<Vec<PostSchedule>> {
        let rows = sqlx::query(&select_schedules(
            "WHERE status = 'pending' AND scheduled_at <= ? ORDER BY scheduled_at",
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(schedule_from_row).collect())
    }

    /// Failed schedules still inside their attempt budget and retry window
    pub async fn retryable_schedules(&self, now: i64, window: i64) -> Result<Vec<PostSchedule>> {
        let rows = sqlx::query(&select_schedules(
            "WHERE status = 'failed'
               AND attempt_count < max_attempts
               AND scheduled_at >= ?
             ORDER BY scheduled_at",
        ))
        .bind(now - window)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(schedule_from_row).collect())
    }

    /// Atomically claim a schedule for publishing.
    ///
    /// Transitions the row to `publishing` and increments attempt_count,
    /// but only if it is still in `expected` status. Returns whether this
    /// caller won the claim; a concurrent claimer observes `false` and
    /// takes no further action.
    pub async fn claim(&self, schedule_id: &str, expected: ScheduleStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE post_schedules
            SET status = 'publishing', attempt_count = attempt_count + 1
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(schedule_id)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Record a successful attempt. Guarded on `publishing` so a published
    /// row can never be re-published.
    pub async fn mark_published(
        &self,
        schedule_id: &str,
        now: i64,
        platform_post_id: &str,
        platform_post_url: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE post_schedules
            SET status = 'published', published_at = ?,
                platform_post_id = ?, platform_post_url = ?, last_error = NULL
            WHERE id = ? AND status = 'publishing'
            "#,
        )
        .bind(now)
        .bind(platform_post_id)
        .bind(platform_post_url)
        .bind(schedule_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "schedule {} not in publishing state",
                schedule_id
            ))
            .into());
        }

        Ok(())
    }

    /// Record a failed attempt. Guarded on `publishing`.
    pub async fn mark_failed(&self, schedule_id: &str, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE post_schedules
            SET status = 'failed', last_error = ?
            WHERE id = ? AND status = 'publishing'
            "#,
        )
        .bind(error)
        .bind(schedule_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "schedule {} not in publishing state",
                schedule_id
            ))
            .into());
        }

        Ok(())
    }

    pub async fn count_by_status(&self, status: ScheduleStatus) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM post_schedules WHERE status = ?")
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.get("n"))
    }

    pub async fn count_due(&self, now: i64) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM post_schedules WHERE status = 'pending' AND scheduled_at <= ?",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get("n"))
    }

    pub async fn count_retryable(&self, now: i64, window: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM post_schedules
            WHERE status = 'failed' AND attempt_count < max_attempts AND scheduled_at >= ?
            "#,
        )
        .bind(now - window)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get("n"))
    }

    /// The next pending schedules, soonest first
    pub async fn upcoming(&self, now: i64, limit: i64) -> Result<Vec<PostSchedule>> {
        let rows = sqlx::query(&select_schedules(
            "WHERE status = 'pending' AND scheduled_at > ? ORDER BY scheduled_at LIMIT ?",
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(schedule_from_row).collect())
    }

    // ------------------------------------------------------------------
    // Job leases
    // ------------------------------------------------------------------

    /// Try to take the lease for `job_name`. Succeeds if no lease exists or
    /// the existing one has expired. Returns whether this holder now owns
    /// the lease.
    pub async fn acquire_lease(
        &self,
        job_name: &str,
        holder: &str,
        now: i64,
        ttl: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_leases (job_name, holder, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(job_name) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE job_leases.expires_at <= excluded.acquired_at
            "#,
        )
        .bind(job_name)
        .bind(holder)
        .bind(now)
        .bind(now + ttl)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Release a lease, but only if we still hold it
    pub async fn release_lease(&self, job_name: &str, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM job_leases WHERE job_name = ? AND holder = ?")
            .bind(job_name)
            .bind(holder)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

const SCHEDULE_COLUMNS: &str = "id, post_id, account_id, platform, status, scheduled_at, \
     published_at, attempt_count, max_attempts, last_error, platform_post_id, platform_post_url";

fn select_schedules(clause: &str) -> String {
    format!("SELECT {} FROM post_schedules {}", SCHEDULE_COLUMNS, clause)
}

fn schedule_from_row(r: sqlx::sqlite::SqliteRow) -> PostSchedule {
    PostSchedule {
        id: r.get("id"),
        post_id: r.get("post_id"),
        account_id: r.get("account_id"),
        platform: r.get::<Platform, _>("platform"),
        status: r.get::<ScheduleStatus, _>("status"),
        scheduled_at: r.get("scheduled_at"),
        published_at: r.get("published_at"),
        attempt_count: r.get("attempt_count"),
        max_attempts: r.get("max_attempts"),
        last_error: r.get("last_error"),
        platform_post_id: r.get("platform_post_id"),
        platform_post_url: r.get("platform_post_url"),
    }
}

fn account_from_row(r: sqlx::sqlite::SqliteRow) -> SocialAccount {
    SocialAccount {
        id: r.get("id"),
        platform: r.get::<Platform, _>("platform"),
        username: r.get("username"),
        active: r.get("active"),
        access_token: r.get("access_token"),
        refresh_token: r.get("refresh_token"),
        token_expires_at: r.get("token_expires_at"),
    }
}
