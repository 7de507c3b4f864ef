//! Mutation + invalidation unit.
//!
//! One unit backs one dialog. A successful mutation invalidates the cache
//! entries of its own resource kind only; a failed one leaves the cache alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use corral_api::{Notifier, ResourceService};
use corral_core::{EntityId, MutationError, Record, ResourceKind};
use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use crate::QueryCache;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(serde_json::Value),
    Update { id: EntityId, body: serde_json::Value },
    Delete { id: EntityId },
}

/// A submitted create/update/delete against one resource kind.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationIntent {
    pub kind: ResourceKind,
    pub op: Operation,
}

impl MutationIntent {
    pub fn create(kind: ResourceKind, body: serde_json::Value) -> Self {
        Self { kind, op: Operation::Create(body) }
    }

    pub fn update(kind: ResourceKind, id: impl Into<EntityId>, body: serde_json::Value) -> Self {
        Self { kind, op: Operation::Update { id: id.into(), body } }
    }

    pub fn delete(kind: ResourceKind, id: impl Into<EntityId>) -> Self {
        Self { kind, op: Operation::Delete { id: id.into() } }
    }

    fn verb(&self) -> &'static str {
        match self.op {
            Operation::Create(_) => "created",
            Operation::Update { .. } => "updated",
            Operation::Delete { .. } => "deleted",
        }
    }

    pub fn success_message(&self) -> String {
        format!("{} {} successfully.", self.kind.noun(), self.verb())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The server accepted the mutation. Carries the returned entity for
    /// create/update.
    Committed(Option<Record>),
    /// Another submission from the same unit was still pending.
    Ignored,
}

struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct MutationUnit {
    service: Arc<dyn ResourceService>,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
    pending: AtomicBool,
}

impl MutationUnit {
    pub fn new(service: Arc<dyn ResourceService>, cache: Arc<QueryCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self { service, cache, notifier, pending: AtomicBool::new(false) }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub async fn submit(&self, intent: MutationIntent) -> Result<MutationOutcome, MutationError> {
        if self.pending.swap(true, Ordering::AcqRel) {
            debug!(kind = %intent.kind, "mutation: already pending; ignoring submit");
            return Ok(MutationOutcome::Ignored);
        }
        let _guard = PendingGuard(&self.pending);
        let t0 = Instant::now();
        let kind = intent.kind;
        let res = match &intent.op {
            Operation::Create(body) => self.service.create(kind, body.clone()).await.map(Some),
            Operation::Update { id, body } => self.service.update(kind, id, body.clone()).await.map(Some),
            Operation::Delete { id } => self.service.delete(kind, id).await.map(|_| None),
        };
        histogram!("mutation_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match res {
            Ok(body) => {
                counter!("mutation_total", 1u64);
                let record = body.and_then(|v| match Record::decode(kind, v) {
                    Ok(r) => Some(r),
                    Err(e) => {
                        warn!(kind = %kind, error = %e, "mutation: response did not decode");
                        None
                    }
                });
                let pages = self.cache.invalidate(kind);
                info!(kind = %kind, verb = intent.verb(), pages, took_ms = %t0.elapsed().as_millis(), "mutation: committed");
                self.notifier.show_success(&intent.success_message());
                Ok(MutationOutcome::Committed(record))
            }
            Err(e) => {
                counter!("mutation_error_total", 1u64);
                let err = MutationError::from(e);
                warn!(kind = %kind, verb = intent.verb(), error = %err, "mutation: failed");
                self.notifier.show_error(&err.user_message());
                Err(err)
            }
        }
    }
}
