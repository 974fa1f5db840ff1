// Memoized access tokens for third-party search providers.
//
// Meant to be held once per provider by the outbound search client (one
// `Arc<TokenCache<_>>` shared across request handlers), so concurrent
// searches share a single refresh.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token refresh failed: {0}")]
    Refresh(String),
}

/// Issues access tokens for a third-party provider (flight or hotel search).
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<AccessToken, TokenError>;
}

/// Process-wide provider token with lazy, single-flight refresh.
///
/// The slot lock is held across the refresh, so callers arriving while a
/// refresh is in flight wait for it and then read the fresh token.
pub struct TokenCache<S> {
    source: S,
    skew: Duration,
    slot: Mutex<Option<AccessToken>>,
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            skew: Duration::seconds(60),
            slot: Mutex::new(None),
        }
    }

    /// Treat tokens as expired this long before their actual expiry.
    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub async fn token(&self) -> Result<String, TokenError> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.expires_at - self.skew > Utc::now() {
                return Ok(cached.value.clone());
            }
        }

        *slot = None;
        tracing::debug!("Refreshing provider access token");
        let fresh = self.source.fetch().await.map_err(|e| {
            tracing::warn!("Provider token refresh failed: {}", e);
            e
        })?;
        let value = fresh.value.clone();
        *slot = Some(fresh);
        Ok(value)
    }

    /// Drops the cached token, e.g. after the provider rejected it.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        calls: AtomicUsize,
        lifetime: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(lifetime: Duration) -> Self {
            Self { calls: AtomicUsize::new(0), lifetime, fail: false }
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch(&self) -> Result<AccessToken, TokenError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.fail {
                return Err(TokenError::Refresh("provider unavailable".to_string()));
            }
            Ok(AccessToken {
                value: format!("token-{}", n),
                expires_at: Utc::now() + self.lifetime,
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let cache = Arc::new(TokenCache::new(CountingSource::new(Duration::minutes(30))));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.token().await.unwrap() }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "token-1");
        }

        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_inside_skew_window_is_refreshed() {
        let cache = TokenCache::new(CountingSource::new(Duration::seconds(30)))
            .with_skew(Duration::seconds(60));

        assert_eq!(cache.token().await.unwrap(), "token-1");
        assert_eq!(cache.token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let cache = TokenCache::new(CountingSource::new(Duration::minutes(30)));

        assert_eq!(cache.token().await.unwrap(), "token-1");
        assert_eq!(cache.token().await.unwrap(), "token-1");
        cache.invalidate().await;
        assert_eq!(cache.token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_refresh_failure_propagates() {
        let mut source = CountingSource::new(Duration::minutes(30));
        source.fail = true;
        let cache = TokenCache::new(source);

        assert!(matches!(cache.token().await, Err(TokenError::Refresh(_))));
        assert!(cache.slot.lock().await.is_none());
    }
}
