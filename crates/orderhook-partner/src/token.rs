//! Bearer token cache.

use std::future::Future;
use std::time::{Duration, Instant};

use orderhook_core::error::PartnerError;
use orderhook_core::secret::Secret;
use tokio::sync::Mutex;

/// Tokens are refreshed this long before the partner says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct CachedToken {
    value: Secret,
    expires_at: Instant,
}

/// Holds at most one bearer token. Callers that find it stale fetch a new
/// one while holding the lock, so concurrent requests share one refresh.
#[derive(Debug, Default)]
pub(crate) struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub(crate) async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Secret, PartnerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(Secret, Duration), PartnerError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        let (value, ttl) = fetch().await?;
        *slot = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + ttl.saturating_sub(REFRESH_MARGIN),
        });
        Ok(value)
    }

    pub(crate) async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}
