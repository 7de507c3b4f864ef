//! Scripted service for tests: records every call, can hold list and
//! mutation responses until released, inject failures and return malformed
//! bodies.

use std::collections::VecDeque;
use std::sync::Mutex;

use corral_core::ResourceKind;
use rustc_hash::FxHashMap;
use serde_json::json;
use tokio::sync::oneshot;

use crate::{ApiError, ApiResult, ListWindow, ResourceService};

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List { kind: ResourceKind, window: ListWindow },
    Create { kind: ResourceKind, body: serde_json::Value },
    Update { kind: ResourceKind, id: String, body: serde_json::Value },
    Delete { kind: ResourceKind, id: String },
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::List { .. })
    }
}

#[derive(Default)]
struct MockState {
    rows: FxHashMap<ResourceKind, Vec<serde_json::Value>>,
    next_id: u64,
    calls: Vec<Call>,
    list_failures: VecDeque<ApiError>,
    mutation_failures: VecDeque<ApiError>,
    raw_lists: FxHashMap<ResourceKind, serde_json::Value>,
    gates: FxHashMap<(ResourceKind, u64), VecDeque<oneshot::Receiver<()>>>,
    mutation_gates: FxHashMap<ResourceKind, VecDeque<oneshot::Receiver<()>>>,
}

/// In-memory mock implementation of [`ResourceService`].
#[derive(Default)]
pub struct MockService {
    state: Mutex<MockState>,
}

impl MockService {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread poisons the lock; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the rows of one collection. Each row must carry an `id`.
    pub fn with_rows(self, kind: ResourceKind, rows: Vec<serde_json::Value>) -> Self {
        self.state().rows.insert(kind, rows);
        self
    }

    /// Fail the next `list` call with `err`.
    pub fn fail_next_list(&self, err: ApiError) {
        self.state().list_failures.push_back(err);
    }

    /// Fail the next create/update/delete call with `err`.
    pub fn fail_next_mutation(&self, err: ApiError) {
        self.state().mutation_failures.push_back(err);
    }

    /// Answer every `list` of `kind` with this body verbatim.
    pub fn respond_raw(&self, kind: ResourceKind, body: serde_json::Value) {
        self.state().raw_lists.insert(kind, body);
    }

    /// Hold the next `list` call for `(kind, skip)` until the returned sender
    /// fires (or is dropped).
    pub fn hold_list(&self, kind: ResourceKind, skip: u64) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state().gates.entry((kind, skip)).or_default().push_back(rx);
        tx
    }

    /// Hold the next create/update/delete of `kind` until the returned sender
    /// fires (or is dropped). The call is recorded before it blocks.
    pub fn hold_mutation(&self, kind: ResourceKind) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state().mutation_gates.entry(kind).or_default().push_back(rx);
        tx
    }

    /// Record a mutation, wait on its gate if one is set, then pop any
    /// scripted failure.
    async fn begin_mutation(&self, kind: ResourceKind, call: Call) -> ApiResult<()> {
        let gate = {
            let mut st = self.state();
            st.calls.push(call);
            st.mutation_gates.get_mut(&kind).and_then(|q| q.pop_front())
        };
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        match self.state().mutation_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state().calls.iter().filter(|c| !c.is_mutation()).count()
    }

    pub fn mutation_calls(&self) -> usize {
        self.state().calls.iter().filter(|c| c.is_mutation()).count()
    }

    pub fn rows(&self, kind: ResourceKind) -> Vec<serde_json::Value> {
        self.state().rows.get(&kind).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ResourceService for MockService {
    async fn list(&self, kind: ResourceKind, window: ListWindow) -> ApiResult<serde_json::Value> {
        let gate = {
            let mut st = self.state();
            st.calls.push(Call::List { kind, window });
            st.gates.get_mut(&(kind, window.skip)).and_then(|q| q.pop_front())
        };
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        let mut st = self.state();
        if let Some(err) = st.list_failures.pop_front() {
            return Err(err);
        }
        if let Some(raw) = st.raw_lists.get(&kind) {
            return Ok(raw.clone());
        }
        let rows = st.rows.get(&kind).cloned().unwrap_or_default();
        let skip = usize::try_from(window.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(window.limit).unwrap_or(usize::MAX);
        let data: Vec<serde_json::Value> = rows.iter().skip(skip).take(limit).cloned().collect();
        Ok(json!({ "data": data, "count": rows.len() }))
    }

    async fn create(&self, kind: ResourceKind, body: serde_json::Value) -> ApiResult<serde_json::Value> {
        self.begin_mutation(kind, Call::Create { kind, body: body.clone() }).await?;
        let mut st = self.state();
        st.next_id += 1;
        let id = format!("{}-{}", kind.key(), st.next_id);
        let mut row = body;
        match row.as_object_mut() {
            Some(obj) => {
                obj.insert("id".to_string(), json!(id));
            }
            None => return Err(ApiError::unprocessable("body must be an object")),
        }
        st.rows.entry(kind).or_default().push(row.clone());
        Ok(row)
    }

    async fn update(&self, kind: ResourceKind, id: &str, body: serde_json::Value) -> ApiResult<serde_json::Value> {
        self.begin_mutation(kind, Call::Update { kind, id: id.to_string(), body: body.clone() }).await?;
        let mut st = self.state();
        let row = st
            .rows
            .get_mut(&kind)
            .and_then(|rows| rows.iter_mut().find(|r| r.get("id").and_then(|v| v.as_str()) == Some(id)))
            .ok_or_else(|| ApiError::not_found(format!("{} not found", kind.noun())))?;
        if let (Some(dst), Some(src)) = (row.as_object_mut(), body.as_object()) {
            for (k, v) in src {
                dst.insert(k.clone(), v.clone());
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> ApiResult<()> {
        self.begin_mutation(kind, Call::Delete { kind, id: id.to_string() }).await?;
        let mut st = self.state();
        let rows = st.rows.entry(kind).or_default();
        let before = rows.len();
        rows.retain(|r| r.get("id").and_then(|v| v.as_str()) != Some(id));
        if rows.len() == before {
            return Err(ApiError::not_found(format!("{} not found", kind.noun())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_assigns_ids() {
        let mock = MockService::new();
        let row = mock.create(ResourceKind::Projects, json!({ "name": "Alpha" })).await.unwrap();
        assert_eq!(row["id"], json!("projects-1"));
        let page = mock.list(ResourceKind::Projects, ListWindow { skip: 0, limit: 5 }).await.unwrap();
        assert_eq!(page["count"], json!(1));
        assert_eq!(mock.mutation_calls(), 1);
        assert_eq!(mock.list_calls(), 1);
    }

    #[tokio::test]
    async fn held_list_waits_for_release() {
        let mock = std::sync::Arc::new(MockService::new());
        let release = mock.hold_list(ResourceKind::Tasks, 0);
        let m = mock.clone();
        let pending = tokio::spawn(async move { m.list(ResourceKind::Tasks, ListWindow { skip: 0, limit: 5 }).await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());
        release.send(()).unwrap();
        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn held_mutation_is_recorded_before_release() {
        let mock = std::sync::Arc::new(MockService::new());
        let release = mock.hold_mutation(ResourceKind::Projects);
        let m = mock.clone();
        let pending = tokio::spawn(async move { m.create(ResourceKind::Projects, json!({ "name": "Alpha" })).await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());
        assert_eq!(mock.mutation_calls(), 1);
        assert!(mock.rows(ResourceKind::Projects).is_empty());
        release.send(()).unwrap();
        assert!(pending.await.unwrap().is_ok());
        assert_eq!(mock.rows(ResourceKind::Projects).len(), 1);
    }
}
