//! Corral resource service seam.
//!
//! Frontends (console, CLI) talk to the backend only through [`ResourceService`].
//! The in-process backend serves the terminal console; the mock serves tests;
//! a remote HTTP client would implement the same trait.

#![forbid(unsafe_code)]

use std::sync::Arc;

use corral_core::{MutationError, QueryError, ResourceKind};
use serde::{Deserialize, Serialize};

mod inproc;
mod mock;
mod notify;
mod retry;

pub use inproc::{InProcService, Seed};
pub use mock::{Call, MockService};
pub use notify::{Notifier, TracingNotifier};
pub use retry::{RetryPolicy, RetryingService};

/// Structured error returned by every service call.
///
/// `status` follows HTTP semantics; `0` means the request never got an answer.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self { Self::new(0, message) }
    pub fn not_found(message: impl Into<String>) -> Self { Self::new(404, message) }
    pub fn conflict(message: impl Into<String>) -> Self { Self::new(409, message) }
    pub fn unprocessable(message: impl Into<String>) -> Self { Self::new(422, message) }
    pub fn internal(message: impl Into<String>) -> Self { Self::new(500, message) }

    /// Failure of the transport rather than a verdict of the server.
    pub fn is_transport(&self) -> bool {
        self.status == 0 || self.status >= 500
    }
}

impl From<ApiError> for QueryError {
    fn from(e: ApiError) -> Self {
        QueryError::Transport { status: e.status, message: e.message }
    }
}

impl From<ApiError> for MutationError {
    fn from(e: ApiError) -> Self {
        if e.is_transport() {
            MutationError::Transport { status: e.status, message: e.message }
        } else {
            MutationError::Rejected { status: e.status, message: e.message }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Offset window passed to `list`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListWindow {
    pub skip: u64,
    pub limit: u64,
}

impl From<corral_core::PageRequest> for ListWindow {
    fn from(req: corral_core::PageRequest) -> Self {
        Self { skip: req.skip(), limit: req.limit() }
    }
}

/// Typed request functions per resource kind.
///
/// Bodies travel as JSON exactly as a generated REST client would hand them
/// over; decoding into entities is the caller's concern.
#[async_trait::async_trait]
pub trait ResourceService: Send + Sync {
    /// Returns `{ "data": [entity...], "count": total }`.
    async fn list(&self, kind: ResourceKind, window: ListWindow) -> ApiResult<serde_json::Value>;

    /// Returns the created entity.
    async fn create(&self, kind: ResourceKind, body: serde_json::Value) -> ApiResult<serde_json::Value>;

    /// Returns the updated entity.
    async fn update(&self, kind: ResourceKind, id: &str, body: serde_json::Value) -> ApiResult<serde_json::Value>;

    async fn delete(&self, kind: ResourceKind, id: &str) -> ApiResult<()>;
}

#[async_trait::async_trait]
impl<T: ResourceService + ?Sized> ResourceService for Arc<T> {
    async fn list(&self, kind: ResourceKind, window: ListWindow) -> ApiResult<serde_json::Value> {
        (**self).list(kind, window).await
    }

    async fn create(&self, kind: ResourceKind, body: serde_json::Value) -> ApiResult<serde_json::Value> {
        (**self).create(kind, body).await
    }

    async fn update(&self, kind: ResourceKind, id: &str, body: serde_json::Value) -> ApiResult<serde_json::Value> {
        (**self).update(kind, id, body).await
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> ApiResult<()> {
        (**self).delete(kind, id).await
    }
}
