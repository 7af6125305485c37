//! Publishing to social platforms
//!
//! `PlatformPublisher` is the per-platform seam: it takes content plus a
//! healthy account and talks to one platform's API. Everything common sits
//! in `Publisher`, the pre-flight wrapper the jobs call: account health
//! checks, token refresh, and the containment of platform errors into
//! `PublishResult` values so one bad post never aborts a batch.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{AutopilotError, PublishError, Result};
use crate::store::Store;
use crate::tokens::TokenRefresher;
use crate::types::{Platform, Post, PublishResult, SocialAccount};

pub mod mock;
pub mod stubs;

/// The platform's identifiers for a post it accepted
#[derive(Debug, Clone)]
pub struct PlatformPost {
    pub id: String,
    pub url: Option<String>,
}

/// One platform's publishing API
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Push the post to the platform. Called only after pre-flight has
    /// verified the account is active and its token usable.
    async fn publish(&self, post: &Post, account: &SocialAccount) -> Result<PlatformPost>;
}

/// Platform -> publisher lookup
#[derive(Default)]
pub struct PublisherRegistry {
    publishers: HashMap<Platform, Arc<dyn PlatformPublisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a stub publisher for each enabled platform
    pub fn with_stubs(platforms: &[Platform]) -> Self {
        let mut registry = Self::new();
        for platform in platforms {
            registry.register(stubs::stub_for(*platform));
        }
        registry
    }

    pub fn register(&mut self, publisher: Arc<dyn PlatformPublisher>) {
        self.publishers.insert(publisher.platform(), publisher);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformPublisher>> {
        self.publishers.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.publishers.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }
}

/// Pre-flight wrapper around the registry.
///
/// All failure modes come back as a failure `PublishResult`; this method
/// only returns `Err` for storage failures while persisting a refreshed
/// token.
pub struct Publisher {
    registry: PublisherRegistry,
    refresher: Arc<dyn TokenRefresher>,
    store: Store,
    clock: Arc<dyn Clock>,
}

impl Publisher {
    pub fn new(
        registry: PublisherRegistry,
        refresher: Arc<dyn TokenRefresher>,
        store: Store,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            refresher,
            store,
            clock,
        }
    }

    pub async fn publish(&self, post: &Post, account: &SocialAccount) -> Result<PublishResult> {
        info!(
            post_id = %post.id,
            account_id = %account.id,
            platform = %account.platform,
            "publishing post"
        );

        if !account.active {
            warn!(account_id = %account.id, "account inactive, refusing to publish");
            return Ok(PublishResult::err(PublishError::AccountInactive.to_string()));
        }

        let now = self.clock.now();
        let mut account = account.clone();

        if account.token_expired(now) {
            match self.refresher.refresh(&account).await {
                Ok(grant) => {
                    self.store
                        .update_account_token(&account.id, &grant.access_token, grant.expires_at)
                        .await?;
                    info!(
                        account_id = %account.id,
                        expires_at = grant.expires_at,
                        "refreshed expired token before publish"
                    );
                    account.access_token = Some(grant.access_token);
                    account.token_expires_at = Some(grant.expires_at);
                }
                Err(e) => {
                    warn!(account_id = %account.id, error = %e, "token refresh failed");
                    return Ok(PublishResult::err(PublishError::TokenExpired.to_string()));
                }
            }
        }

        let platform_publisher = match self.registry.get(account.platform) {
            Some(p) => p,
            None => {
                let error = PublishError::UnknownPlatform(account.platform.to_string());
                warn!(platform = %account.platform, "no publisher registered");
                return Ok(PublishResult::err(error.to_string()));
            }
        };

        match platform_publisher.publish(post, &account).await {
            Ok(platform_post) => {
                info!(
                    post_id = %post.id,
                    platform = %account.platform,
                    platform_post_id = %platform_post.id,
                    "post published"
                );
                Ok(PublishResult::ok(platform_post.id, platform_post.url))
            }
            Err(e) => {
                // Record the publish-level message, not the outer wrapper.
                let message = match &e {
                    AutopilotError::Publish(publish_error) => publish_error.to_string(),
                    other => other.to_string(),
                };
                warn!(
                    post_id = %post.id,
                    platform = %account.platform,
                    error = %message,
                    "publish attempt failed"
                );
                Ok(PublishResult::err(message))
            }
        }
    }
}
