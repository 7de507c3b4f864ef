//! Corral store: page-keyed query cache, change events and invalidation.
//!
//! The cache is an explicitly owned object. Tables read through it, mutation
//! units invalidate through it, and subscribers learn about changes from its
//! broadcast channel instead of implicit reactive tracking.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use corral_api::{ListWindow, ResourceService};
use corral_core::{PageKey, PageRequest, PageResult, QueryError, Record, ResourceKind, PAGE_SIZE};
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::{counter, histogram};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

mod mutation;

pub use mutation::{MutationIntent, MutationOutcome, MutationUnit, Operation};

/// Shared result of one list fetch.
pub type PageOutcome = Result<Arc<PageResult<Record>>, QueryError>;

type SharedFetch = Shared<BoxFuture<'static, PageOutcome>>;

/// Stored result of a prior list fetch.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: PageKey,
    pub page: Arc<PageResult<Record>>,
    /// Marked by invalidation; the data stays readable until refetched.
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
    ticket: u64,
}

/// Change notification published by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Stored(PageKey),
    Invalidated(PageKey),
    Failed(PageKey),
    /// The subscriber fell behind and missed events for this kind.
    Lagged(ResourceKind),
}

impl CacheEvent {
    pub fn kind(&self) -> ResourceKind {
        match self {
            CacheEvent::Stored(k) | CacheEvent::Invalidated(k) | CacheEvent::Failed(k) => k.kind,
            CacheEvent::Lagged(kind) => *kind,
        }
    }
}

#[derive(Default)]
struct KeyTickets {
    issued: u64,
    /// Highest ticket whose failure was already reported.
    failed: u64,
    /// Responses with a ticket at or below this were requested before the
    /// last invalidation.
    invalidated_through: u64,
}

#[derive(Default)]
struct CacheState {
    entries: FxHashMap<PageKey, CacheEntry>,
    /// Live page numbers per kind, walked by `invalidate`.
    index: FxHashMap<ResourceKind, FxHashSet<u32>>,
    tickets: FxHashMap<PageKey, KeyTickets>,
    inflight: FxHashMap<PageKey, (u64, SharedFetch)>,
    errors: FxHashMap<PageKey, QueryError>,
    latest: FxHashMap<ResourceKind, PageKey>,
}

/// Query-keyed cache of list pages.
pub struct QueryCache {
    service: Arc<dyn ResourceService>,
    page_size: u32,
    state: Mutex<CacheState>,
    events: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
    pub fn new(service: Arc<dyn ResourceService>) -> Self {
        let cap = std::env::var("CORRAL_EVENT_CAP").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(256);
        Self::with_event_capacity(service, cap)
    }

    pub fn with_event_capacity(service: Arc<dyn ResourceService>, cap: usize) -> Self {
        let (events, _) = broadcast::channel(cap.max(1));
        Self { service, page_size: PAGE_SIZE, state: Mutex::new(CacheState::default()), events }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, ev: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(ev);
    }

    /// Subscribe to changes of one resource kind.
    pub fn subscribe(&self, kind: ResourceKind) -> KindSubscription {
        KindSubscription { kind, rx: self.events.subscribe() }
    }

    /// Return page `page` of `kind`, from cache when fresh, otherwise from the
    /// service. Concurrent calls for the same key share one request.
    pub async fn fetch_page(&self, kind: ResourceKind, page: u32) -> PageOutcome {
        let req = PageRequest::new(kind, page, self.page_size)?;
        let key = req.key();
        let (ticket, fut) = {
            let mut st = self.state();
            if let Some(entry) = st.entries.get(&key) {
                if !entry.stale {
                    counter!("query_cache_hit_total", 1u64);
                    return Ok(entry.page.clone());
                }
            }
            if let Some((ticket, fut)) = st.inflight.get(&key) {
                counter!("query_coalesced_total", 1u64);
                debug!(key = %key, ticket, "query: joined in-flight fetch");
                (*ticket, fut.clone())
            } else {
                let tickets = st.tickets.entry(key).or_default();
                tickets.issued += 1;
                let ticket = tickets.issued;
                let fut = self.spawn_fetch(req);
                st.inflight.insert(key, (ticket, fut.clone()));
                st.index.entry(kind).or_default().insert(page);
                (ticket, fut)
            }
        };
        let outcome = fut.await;
        self.complete(key, ticket, &outcome);
        outcome
    }

    fn spawn_fetch(&self, req: PageRequest) -> SharedFetch {
        run_fetch(Arc::clone(&self.service), req).boxed().shared()
    }

    fn complete(&self, key: PageKey, ticket: u64, outcome: &PageOutcome) {
        let mut st = self.state();
        if matches!(st.inflight.get(&key), Some((t, _)) if *t == ticket) {
            st.inflight.remove(&key);
        }
        let applied = st.entries.get(&key).map(|e| e.ticket).unwrap_or(0);
        if ticket < applied {
            debug!(key = %key, ticket, applied, "query: dropping late response");
            return;
        }
        if ticket == applied {
            // A coalesced waiter already applied this response.
            return;
        }
        match outcome {
            Ok(page) => {
                let stale = st.tickets.get(&key).map(|t| ticket <= t.invalidated_through).unwrap_or(false);
                st.entries.insert(key, CacheEntry { key, page: page.clone(), stale, fetched_at: Utc::now(), ticket });
                st.index.entry(key.kind).or_default().insert(key.page);
                st.errors.remove(&key);
                st.latest.insert(key.kind, key);
                drop(st);
                self.publish(CacheEvent::Stored(key));
            }
            Err(e) => {
                let tickets = st.tickets.entry(key).or_default();
                if tickets.failed >= ticket {
                    return;
                }
                tickets.failed = ticket;
                warn!(key = %key, error = %e, "query: fetch failed");
                counter!("query_fetch_error_total", 1u64);
                st.errors.insert(key, e.clone());
                drop(st);
                self.publish(CacheEvent::Failed(key));
            }
        }
    }

    /// Mark every entry of `kind` stale and detach its in-flight fetches.
    /// Entries of other kinds are untouched.
    pub fn invalidate(&self, kind: ResourceKind) -> usize {
        let mut st = self.state();
        let pages: Vec<u32> = st.index.get(&kind).map(|s| s.iter().copied().collect()).unwrap_or_default();
        let mut keys = Vec::with_capacity(pages.len());
        for page in pages {
            let key = PageKey::new(kind, page);
            if let Some(entry) = st.entries.get_mut(&key) {
                entry.stale = true;
            }
            if let Some(t) = st.tickets.get_mut(&key) {
                t.invalidated_through = t.issued;
            }
            st.inflight.remove(&key);
            keys.push(key);
        }
        drop(st);
        counter!("cache_invalidated_total", keys.len() as u64);
        info!(kind = %kind, pages = keys.len(), "cache: invalidated");
        let n = keys.len();
        for key in keys {
            self.publish(CacheEvent::Invalidated(key));
        }
        n
    }

    /// Current entry for `key`, fresh or stale.
    pub fn peek(&self, key: PageKey) -> Option<CacheEntry> {
        self.state().entries.get(&key).cloned()
    }

    /// Most recently stored entry of any page of `kind`.
    pub fn latest_for(&self, kind: ResourceKind) -> Option<CacheEntry> {
        let st = self.state();
        st.latest.get(&kind).and_then(|k| st.entries.get(k)).cloned()
    }

    /// Last fetch error for `key`, cleared by the next successful fetch.
    pub fn last_error(&self, key: PageKey) -> Option<QueryError> {
        self.state().errors.get(&key).cloned()
    }

    pub fn is_fetching(&self, key: PageKey) -> bool {
        self.state().inflight.contains_key(&key)
    }
}

/// Receiver of cache events for one resource kind.
pub struct KindSubscription {
    kind: ResourceKind,
    rx: broadcast::Receiver<CacheEvent>,
}

impl KindSubscription {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Next event for this kind without waiting; `None` when drained.
    pub fn try_next(&mut self) -> Option<CacheEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(ev) if ev.kind() == self.kind => return Some(ev),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(kind = %self.kind, missed = n, "cache subscriber lagged");
                    return Some(CacheEvent::Lagged(self.kind));
                }
                Err(_) => return None,
            }
        }
    }

    /// Wait for the next event for this kind; `None` once the cache is gone.
    pub async fn recv(&mut self) -> Option<CacheEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) if ev.kind() == self.kind => return Some(ev),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(kind = %self.kind, missed = n, "cache subscriber lagged");
                    return Some(CacheEvent::Lagged(self.kind));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

async fn run_fetch(service: Arc<dyn ResourceService>, req: PageRequest) -> PageOutcome {
    let t0 = Instant::now();
    let kind = req.kind();
    let window = ListWindow::from(req);
    counter!("query_fetch_total", 1u64);
    debug!(kind = %kind, page = req.page(), skip = window.skip, limit = window.limit, "query: fetch start");
    let body = service.list(kind, window).await?;
    let page = decode_page(kind, body, req.page_size())?;
    histogram!("query_fetch_ms", t0.elapsed().as_secs_f64() * 1000.0);
    debug!(kind = %kind, page = req.page(), items = page.items.len(), total = page.total_count, "query: fetch ok");
    Ok(Arc::new(page))
}

#[derive(Deserialize)]
struct ListEnvelope {
    data: Vec<serde_json::Value>,
    count: u64,
}

/// Decode a `{ data, count }` list body into records of `kind`.
///
/// A `data` array longer than the page size is cut down to it.
pub fn decode_page(kind: ResourceKind, body: serde_json::Value, page_size: u32) -> Result<PageResult<Record>, QueryError> {
    let env: ListEnvelope = serde_json::from_value(body).map_err(|e| QueryError::Decode(format!("{} list: {}", kind, e)))?;
    let mut items = Vec::with_capacity(env.data.len());
    for (i, v) in env.data.into_iter().enumerate() {
        let rec = Record::decode(kind, v).map_err(|e| QueryError::Decode(format!("{}[{}]: {}", kind, i, e)))?;
        items.push(rec);
    }
    let max = page_size as usize;
    if items.len() > max {
        warn!(kind = %kind, got = items.len(), page_size, "list returned more rows than requested; truncating");
        items.truncate(max);
    }
    Ok(PageResult::new(items, env.count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_truncates_over_long_pages() {
        let data: Vec<_> = (0..7).map(|i| json!({ "id": format!("u{}", i), "email": format!("u{}@x.io", i) })).collect();
        let page = decode_page(ResourceKind::Users, json!({ "data": data, "count": 7 }), 5).unwrap();
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.total_count, 7);
    }

    #[test]
    fn decode_rejects_negative_count_and_bad_rows() {
        let err = decode_page(ResourceKind::Users, json!({ "data": [], "count": -1 }), 5).unwrap_err();
        assert!(matches!(err, QueryError::Decode(_)));
        let err = decode_page(ResourceKind::Tasks, json!({ "data": [{ "id": "t1" }], "count": 1 }), 5).unwrap_err();
        assert!(matches!(err, QueryError::Decode(m) if m.starts_with("tasks[0]")));
    }
}
