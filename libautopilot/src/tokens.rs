//! OAuth token refresh boundary
//!
//! Platforms hand out short-lived access tokens plus a refresh token. The
//! refresh job and the publish pre-flight both go through `TokenRefresher`
//! to exchange a refresh token for a new grant, so tests can substitute a
//! deterministic implementation.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{PublishError, Result};
use crate::types::SocialAccount;

/// A freshly issued access token
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Unix timestamp
    pub expires_at: i64,
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange the account's refresh token for a new access token.
    ///
    /// Fails with `PublishError::Refresh` when the platform refuses the
    /// exchange or the account has no refresh token to offer.
    async fn refresh(&self, account: &SocialAccount) -> Result<TokenGrant>;
}

/// Development refresher that mints a fake grant valid for one hour.
///
/// Stands in until real per-platform OAuth flows land; the daemon wires it
/// in by default so the refresh job exercises the full persistence path.
pub struct StubTokenRefresher;

const STUB_GRANT_LIFETIME_SECS: i64 = 3600;

#[async_trait]
impl TokenRefresher for StubTokenRefresher {
    async fn refresh(&self, account: &SocialAccount) -> Result<TokenGrant> {
        let refresh_token = account
            .refresh_token
            .as_deref()
            .ok_or_else(|| PublishError::Refresh("account has no refresh token".to_string()))?;

        let base = account.token_expires_at.unwrap_or(0);
        Ok(TokenGrant {
            access_token: format!("{}-renewed-{}", refresh_token, base),
            expires_at: base + STUB_GRANT_LIFETIME_SECS,
        })
    }
}

/// Test refresher with a scripted outcome and a call counter
pub struct MockTokenRefresher {
    outcome: std::result::Result<TokenGrant, String>,
    calls: Arc<Mutex<usize>>,
}

impl MockTokenRefresher {
    pub fn succeeding(access_token: &str, expires_at: i64) -> Self {
        Self {
            outcome: Ok(TokenGrant {
                access_token: access_token.to_string(),
                expires_at,
            }),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TokenRefresher for MockTokenRefresher {
    async fn refresh(&self, _account: &SocialAccount) -> Result<TokenGrant> {
        *self.calls.lock().unwrap() += 1;
        match &self.outcome {
            Ok(grant) => Ok(grant.clone()),
            Err(message) => Err(PublishError::Refresh(message.clone()).into()),
        }
    }
}
