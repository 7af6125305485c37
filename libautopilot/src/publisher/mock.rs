//! Scripted publisher for tests

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{PublishError, Result};
use crate::types::{Platform, Post, SocialAccount};

use super::{PlatformPost, PlatformPublisher};

/// Publisher with a fixed outcome and a call counter.
///
/// The counter is behind an `Arc` so a test can keep a handle while the
/// registry owns the publisher.
pub struct MockPublisher {
    platform: Platform,
    outcome: std::result::Result<String, String>,
    calls: Arc<Mutex<usize>>,
}

impl MockPublisher {
    pub fn succeeding(platform: Platform, platform_post_id: &str) -> Self {
        Self {
            platform,
            outcome: Ok(platform_post_id.to_string()),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(platform: Platform, message: &str) -> Self {
        Self {
            platform,
            outcome: Err(message.to_string()),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// Handle onto the counter, usable after the publisher moves into a
    /// registry
    pub fn call_counter(&self) -> Arc<Mutex<usize>> {
        self.calls.clone()
    }
}

#[async_trait]
impl PlatformPublisher for MockPublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(&self, _post: &Post, _account: &SocialAccount) -> Result<PlatformPost> {
        *self.calls.lock().unwrap() += 1;
        match &self.outcome {
            Ok(id) => Ok(PlatformPost {
                id: id.clone(),
                url: Some(format!("https://example.com/{}", id)),
            }),
            Err(message) => Err(PublishError::Rejected(message.clone()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts_and_succeeds() {
        let publisher = MockPublisher::succeeding(Platform::Facebook, "fb_1");
        let post = Post::new("hello".to_string(), None);
        let account = SocialAccount::new(Platform::Facebook, "brand".to_string());

        assert_eq!(publisher.call_count(), 0);
        let result = publisher.publish(&post, &account).await.unwrap();
        assert_eq!(result.id, "fb_1");
        assert_eq!(publisher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let publisher = MockPublisher::failing(Platform::Facebook, "nope");
        let post = Post::new("hello".to_string(), None);
        let account = SocialAccount::new(Platform::Facebook, "brand".to_string());

        assert!(publisher.publish(&post, &account).await.is_err());
        assert_eq!(publisher.call_count(), 1);
    }
}
