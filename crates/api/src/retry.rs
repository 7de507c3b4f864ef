//! Retry policy of the service client.
//!
//! Only `list` is retried, and only for transport-class failures. Mutations
//! are not idempotent and go through exactly once.

use std::sync::Arc;
use std::time::Duration;

use corral_core::ResourceKind;
use metrics::counter;
use tracing::warn;

use crate::{ApiResult, ListWindow, ResourceService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, backoff: Duration::from_millis(200) }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { attempts: 1, backoff: Duration::ZERO }
    }

    /// Read `CORRAL_RETRY_ATTEMPTS` and `CORRAL_RETRY_BACKOFF_MS`, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let attempts = std::env::var("CORRAL_RETRY_ATTEMPTS").ok().and_then(|s| s.parse().ok()).unwrap_or(d.attempts);
        let backoff_ms = std::env::var("CORRAL_RETRY_BACKOFF_MS").ok().and_then(|s| s.parse().ok());
        Self { attempts: attempts.max(1), backoff: backoff_ms.map(Duration::from_millis).unwrap_or(d.backoff) }
    }
}

/// Decorator applying a [`RetryPolicy`] to another service.
pub struct RetryingService {
    inner: Arc<dyn ResourceService>,
    policy: RetryPolicy,
}

impl RetryingService {
    pub fn new(inner: Arc<dyn ResourceService>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait::async_trait]
impl ResourceService for RetryingService {
    async fn list(&self, kind: ResourceKind, window: ListWindow) -> ApiResult<serde_json::Value> {
        let mut attempt = 1;
        loop {
            match self.inner.list(kind, window).await {
                Err(e) if e.is_transport() && attempt < self.policy.attempts => {
                    warn!(kind = %kind, attempt, error = %e, "list failed; retrying");
                    counter!("service_list_retry_total", 1u64);
                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn create(&self, kind: ResourceKind, body: serde_json::Value) -> ApiResult<serde_json::Value> {
        self.inner.create(kind, body).await
    }

    async fn update(&self, kind: ResourceKind, id: &str, body: serde_json::Value) -> ApiResult<serde_json::Value> {
        self.inner.update(kind, id, body).await
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> ApiResult<()> {
        self.inner.delete(kind, id).await
    }
}
