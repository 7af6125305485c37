//! Stub publishers, one per platform.
//!
//! These simulate a successful platform API round trip with deterministic
//! identifiers so the whole pipeline can run end to end before real API
//! integrations land. Each requires an access token, which is what a real
//! integration would fail without.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{PublishError, Result};
use crate::types::{Platform, Post, SocialAccount};

use super::{PlatformPost, PlatformPublisher};

pub struct StubPublisher {
    platform: Platform,
    id_prefix: &'static str,
    url_base: &'static str,
}

/// Stub publisher for the given platform
pub fn stub_for(platform: Platform) -> Arc<dyn PlatformPublisher> {
    let (id_prefix, url_base) = match platform {
        Platform::Instagram => ("ig", "https://instagram.com/p"),
        Platform::Facebook => ("fb", "https://facebook.com/posts"),
        Platform::LinkedIn => ("li", "https://linkedin.com/feed/update"),
        Platform::TikTok => ("tt", "https://tiktok.com/@video"),
        Platform::Pinterest => ("pin", "https://pinterest.com/pin"),
        Platform::YouTube => ("yt", "https://youtube.com/watch?v="),
    };

    Arc::new(StubPublisher {
        platform,
        id_prefix,
        url_base,
    })
}

#[async_trait]
impl PlatformPublisher for StubPublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(&self, _post: &Post, account: &SocialAccount) -> Result<PlatformPost> {
        if account.access_token.is_none() {
            return Err(PublishError::Rejected("missing access token".to_string()).into());
        }

        let token = Uuid::new_v4().simple().to_string();
        let id = format!("{}_{}", self.id_prefix, &token[..12]);
        let url = format!("{}/{}", self.url_base, id);

        Ok(PlatformPost { id, url: Some(url) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_generates_platform_flavored_ids() {
        let publisher = stub_for(Platform::Instagram);
        let post = Post::new("hello".to_string(), None);
        let mut account = SocialAccount::new(Platform::Instagram, "brand".to_string());
        account.access_token = Some("tok".to_string());

        let platform_post = publisher.publish(&post, &account).await.unwrap();
        assert!(platform_post.id.starts_with("ig_"));
        assert!(platform_post.url.unwrap().starts_with("https://instagram.com/p/"));
    }

    #[tokio::test]
    async fn test_stub_rejects_missing_token() {
        let publisher = stub_for(Platform::TikTok);
        let post = Post::new("hello".to_string(), None);
        let account = SocialAccount::new(Platform::TikTok, "brand".to_string());

        assert!(publisher.publish(&post, &account).await.is_err());
    }

    #[tokio::test]
    async fn test_every_platform_has_a_stub() {
        for platform in Platform::ALL {
            let publisher = stub_for(platform);
            assert_eq!(publisher.platform(), platform);
        }
    }
}
