//! Core types for Autopilot

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Social platforms a schedule can target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Facebook,
    LinkedIn,
    TikTok,
    Pinterest,
    YouTube,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Instagram,
        Platform::Facebook,
        Platform::LinkedIn,
        Platform::TikTok,
        Platform::Pinterest,
        Platform::YouTube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::LinkedIn => "linkedin",
            Platform::TikTok => "tiktok",
            Platform::Pinterest => "pinterest",
            Platform::YouTube => "youtube",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            "linkedin" => Ok(Platform::LinkedIn),
            "tiktok" => Ok(Platform::TikTok),
            "pinterest" => Ok(Platform::Pinterest),
            "youtube" => Ok(Platform::YouTube),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: instagram, facebook, linkedin, tiktok, pinterest, youtube",
                s
            )),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of one scheduled publication.
///
/// pending -> publishing -> published | failed. A failed schedule may be
/// claimed back into publishing by the retry job while it still has attempt
/// budget. Published is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Pending,
    Publishing,
    Published,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Publishing => "publishing",
            ScheduleStatus::Published => "published",
            ScheduleStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One intended publication of one Post to one SocialAccount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSchedule {
    pub id: String,
    pub post_id: String,
    pub account_id: String,
    pub platform: Platform,
    pub status: ScheduleStatus,
    /// When this schedule becomes due (Unix timestamp)
    pub scheduled_at: i64,
    /// Set exactly once, on the successful attempt
    pub published_at: Option<i64>,
    pub attempt_count: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub platform_post_id: Option<String>,
    pub platform_post_url: Option<String>,
}

impl PostSchedule {
    pub fn new(
        post_id: String,
        account_id: String,
        platform: Platform,
        scheduled_at: i64,
        max_attempts: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            post_id,
            account_id,
            platform,
            status: ScheduleStatus::Pending,
            scheduled_at,
            published_at: None,
            attempt_count: 0,
            max_attempts,
            last_error: None,
            platform_post_id: None,
            platform_post_url: None,
        }
    }
}

/// Content payload referenced by a schedule. Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub body: String,
    pub media_url: Option<String>,
    pub created_at: i64,
}

impl Post {
    pub fn new(body: String, media_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body,
            media_url,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// A connected social account holding OAuth state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialAccount {
    pub id: String,
    pub platform: Platform,
    pub username: String,
    pub active: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// When the access token expires (Unix timestamp)
    pub token_expires_at: Option<i64>,
}

impl SocialAccount {
    pub fn new(platform: Platform, username: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            platform,
            username,
            active: true,
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
        }
    }

    /// Whether the stored access token has expired as of `now`
    pub fn token_expired(&self, now: i64) -> bool {
        match (&self.access_token, self.token_expires_at) {
            (Some(_), Some(expires_at)) => expires_at <= now,
            _ => false,
        }
    }
}

/// Outcome of a single publish attempt. Never persisted directly; the jobs
/// fold it back onto the schedule row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResult {
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub platform_post_url: Option<String>,
    pub error_message: Option<String>,
}

impl PublishResult {
    pub fn ok(platform_post_id: String, platform_post_url: Option<String>) -> Self {
        Self {
            success: true,
            platform_post_id: Some(platform_post_id),
            platform_post_url,
            error_message: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            platform_post_id: None,
            platform_post_url: None,
            error_message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        for platform in Platform::ALL {
            let parsed: Platform = platform.as_str().parse().unwrap();
            assert_eq!(parsed, platform);
        }
    }

    #[test]
    fn test_platform_from_str_case_insensitive() {
        assert_eq!("Instagram".parse::<Platform>().unwrap(), Platform::Instagram);
        assert_eq!("TIKTOK".parse::<Platform>().unwrap(), Platform::TikTok);
    }

    #[test]
    fn test_platform_from_str_unknown() {
        let result = "myspace".parse::<Platform>();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Unknown platform"));
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::LinkedIn).unwrap();
        assert_eq!(json, r#""linkedin""#);

        let parsed: Platform = serde_json::from_str(r#""youtube""#).unwrap();
        assert_eq!(parsed, Platform::YouTube);
    }

    #[test]
    fn test_schedule_status_display() {
        assert_eq!(ScheduleStatus::Pending.to_string(), "pending");
        assert_eq!(ScheduleStatus::Publishing.to_string(), "publishing");
        assert_eq!(ScheduleStatus::Published.to_string(), "published");
        assert_eq!(ScheduleStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_post_schedule_new_defaults() {
        let schedule = PostSchedule::new(
            "post-1".to_string(),
            "acct-1".to_string(),
            Platform::Instagram,
            1_700_000_000,
            3,
        );

        assert!(Uuid::parse_str(&schedule.id).is_ok());
        assert_eq!(schedule.status, ScheduleStatus::Pending);
        assert_eq!(schedule.attempt_count, 0);
        assert_eq!(schedule.max_attempts, 3);
        assert_eq!(schedule.published_at, None);
        assert_eq!(schedule.last_error, None);
        assert_eq!(schedule.platform_post_id, None);
    }

    #[test]
    fn test_post_schedule_unique_ids() {
        let a = PostSchedule::new("p".into(), "a".into(), Platform::Facebook, 0, 3);
        let b = PostSchedule::new("p".into(), "a".into(), Platform::Facebook, 0, 3);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_token_expired_boundary() {
        let mut account = SocialAccount::new(Platform::Instagram, "brand".to_string());
        account.access_token = Some("tok".to_string());
        account.token_expires_at = Some(1000);

        assert!(account.token_expired(1000));
        assert!(account.token_expired(1001));
        assert!(!account.token_expired(999));
    }

    #[test]
    fn test_token_expired_without_token() {
        let mut account = SocialAccount::new(Platform::Facebook, "brand".to_string());
        // No stored token at all: nothing to be expired.
        assert!(!account.token_expired(i64::MAX));

        // Expiry without a token is also not "expired".
        account.token_expires_at = Some(0);
        assert!(!account.token_expired(100));
    }

    #[test]
    fn test_publish_result_ok() {
        let result = PublishResult::ok(
            "ig_abc".to_string(),
            Some("https://instagram.com/p/abc".to_string()),
        );

        assert!(result.success);
        assert_eq!(result.platform_post_id, Some("ig_abc".to_string()));
        assert_eq!(result.error_message, None);
    }

    #[test]
    fn test_publish_result_err() {
        let result = PublishResult::err("account inactive");

        assert!(!result.success);
        assert_eq!(result.platform_post_id, None);
        assert_eq!(result.platform_post_url, None);
        assert_eq!(result.error_message, Some("account inactive".to_string()));
    }

    #[test]
    fn test_publish_result_serialization() {
        let result = PublishResult::ok("fb_1".to_string(), None);
        let json = serde_json::to_string(&result).unwrap();
        let parsed: PublishResult = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.success, result.success);
        assert_eq!(parsed.platform_post_id, result.platform_post_id);
    }
}
