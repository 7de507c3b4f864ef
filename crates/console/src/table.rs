#![forbid(unsafe_code)]

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use corral_core::{page_count, Entity, EntityId, PageKey, PageRequest, PageResult, QueryError, Record, ResourceKind};
use corral_store::{CacheEvent, KindSubscription, QueryCache};
use serde::Serialize;
use metrics::counter;
use tracing::{debug, trace};

use crate::dialog::EntityDialog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub page_count: u32,
}

impl Pagination {
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count
    }
}

/// One rendered row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow<E> {
    pub entity: E,
    pub cells: Vec<String>,
    /// The row is the signed-in user.
    pub is_you: bool,
    pub actions_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableView<E> {
    /// Nothing loaded for any page of the kind yet.
    Skeleton { rows: u32 },
    /// Nothing loaded and the fetch failed.
    Failed(QueryError),
    Rows {
        rows: Vec<TableRow<E>>,
        /// Rows belong to another page than the requested one.
        placeholder: bool,
        pagination: Pagination,
        /// Last fetch error; the rows are the last good data.
        error: Option<QueryError>,
    },
}

/// What happened to one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFetch {
    Applied,
    /// A newer page request was issued before this one resolved.
    Superseded,
    /// Already on the first or last page; nothing was requested.
    Unchanged,
    Failed(QueryError),
}

struct TableState {
    page: u32,
    generation: u64,
    shown: Option<(u32, Arc<PageResult<Record>>)>,
    error: Option<QueryError>,
}

/// Paginated view of one resource kind, reading through the shared cache.
pub struct EntityTable<E: Entity> {
    cache: Arc<QueryCache>,
    events: Mutex<KindSubscription>,
    state: Mutex<TableState>,
    current_user: Option<EntityId>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityTable<E> {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        let events = Mutex::new(cache.subscribe(E::KIND));
        Self {
            cache,
            events,
            state: Mutex::new(TableState { page: 1, generation: 0, shown: None, error: None }),
            current_user: None,
            _entity: PhantomData,
        }
    }

    /// Mark rows whose id matches the signed-in user. Only the users table
    /// uses it.
    pub fn with_current_user(mut self, id: Option<EntityId>) -> Self {
        self.current_user = id;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        E::KIND
    }

    fn state(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn page(&self) -> u32 {
        self.state().page
    }

    /// Request `page` and wait for it. The result is applied only if no newer
    /// request was issued in the meantime.
    pub async fn go_to(&self, page: u32) -> PageFetch {
        if let Err(e) = PageRequest::standard(E::KIND, page) {
            debug!(kind = %E::KIND, page, "table: rejected page number");
            return PageFetch::Failed(e.into());
        }
        let generation = {
            let mut st = self.state();
            st.generation += 1;
            st.page = page;
            st.generation
        };
        let outcome = self.cache.fetch_page(E::KIND, page).await;
        let mut st = self.state();
        if st.generation != generation {
            debug!(kind = %E::KIND, page, generation, current = st.generation, "table: discarding superseded page");
            counter!("table_page_superseded_total", 1u64);
            return PageFetch::Superseded;
        }
        match outcome {
            Ok(result) => {
                st.shown = Some((page, result));
                st.error = None;
                PageFetch::Applied
            }
            Err(e) => {
                st.error = Some(e.clone());
                PageFetch::Failed(e)
            }
        }
    }

    /// Last page according to the data on screen, if any is loaded.
    fn last_page(&self) -> Option<u32> {
        let st = self.state();
        let total = match self.cache.peek(PageKey::new(E::KIND, st.page)) {
            Some(entry) => entry.page.total_count,
            None => st.shown.as_ref()?.1.total_count,
        };
        Some(page_count(total, self.cache.page_size()))
    }

    pub async fn next_page(&self) -> PageFetch {
        let page = self.page();
        if matches!(self.last_page(), Some(last) if page >= last) {
            return PageFetch::Unchanged;
        }
        self.go_to(page.saturating_add(1)).await
    }

    pub async fn prev_page(&self) -> PageFetch {
        let page = self.page();
        if page <= 1 {
            return PageFetch::Unchanged;
        }
        self.go_to(page - 1).await
    }

    /// Re-query the current page.
    pub async fn refresh(&self) -> PageFetch {
        let page = self.page();
        self.go_to(page).await
    }

    /// Drain cache events for this kind and refetch when the visible page was
    /// invalidated. Returns whether a refetch ran.
    pub async fn sync(&self) -> bool {
        let page = self.page();
        let mut refetch = false;
        {
            let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
            while let Some(ev) = events.try_next() {
                trace!(kind = %E::KIND, ?ev, "table: cache event");
                match ev {
                    CacheEvent::Invalidated(key) if key.page == page => refetch = true,
                    CacheEvent::Lagged(_) => refetch = true,
                    _ => {}
                }
            }
        }
        if refetch {
            self.refresh().await;
        }
        refetch
    }

    pub fn view(&self) -> TableView<E> {
        let st = self.state();
        let page_size = self.cache.page_size();
        let current = self.cache.peek(PageKey::new(E::KIND, st.page)).map(|entry| entry.page);
        let (data, placeholder) = match current {
            Some(page) => (page, false),
            None => match st.shown.as_ref().map(|(_, page)| page.clone()).or_else(|| self.cache.latest_for(E::KIND).map(|e| e.page)) {
                Some(page) => (page, true),
                None => {
                    return match &st.error {
                        Some(e) => TableView::Failed(e.clone()),
                        None => TableView::Skeleton { rows: page_size },
                    };
                }
            },
        };
        let pagination = Pagination {
            page: st.page,
            page_size,
            total_count: data.total_count,
            page_count: page_count(data.total_count, page_size),
        };
        let rows = data.typed::<E>().items.into_iter().map(|entity| self.row(entity)).collect();
        TableView::Rows { rows, placeholder, pagination, error: st.error.clone() }
    }

    fn row(&self, entity: E) -> TableRow<E> {
        let is_you = E::KIND == ResourceKind::Users && self.current_user.as_deref() == Some(entity.id());
        let mut cells = entity.cells();
        if is_you {
            if let Some(first) = cells.first_mut() {
                first.push_str(" (You)");
            }
        }
        TableRow { entity, cells, is_you, actions_enabled: !is_you }
    }

    /// Edit dialog pre-populated from `row`; `None` when the row's actions
    /// are disabled.
    pub fn edit_dialog(&self, row: &TableRow<E>) -> Option<EntityDialog<E>> {
        if !row.actions_enabled {
            return None;
        }
        let mut dialog = EntityDialog::new();
        dialog.open_edit(&row.entity);
        Some(dialog)
    }

    pub fn delete_dialog(&self, row: &TableRow<E>) -> Option<EntityDialog<E>> {
        if !row.actions_enabled {
            return None;
        }
        let mut dialog = EntityDialog::new();
        dialog.open_delete(row.entity.id());
        Some(dialog)
    }

    pub fn add_dialog(&self) -> EntityDialog<E> {
        let mut dialog = EntityDialog::new();
        dialog.open_add();
        dialog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_api::MockService;
    use corral_core::User;
    use serde_json::json;

    fn users_table() -> (Arc<MockService>, EntityTable<User>) {
        let rows = vec![
            json!({ "id": "u1", "email": "root@corral.dev", "full_name": "Root", "is_superuser": true }),
            json!({ "id": "u2", "email": "ann@corral.dev" }),
        ];
        let mock = Arc::new(MockService::new().with_rows(ResourceKind::Users, rows));
        let cache = Arc::new(QueryCache::with_event_capacity(mock.clone(), 16));
        (mock, EntityTable::new(cache).with_current_user(Some("u1".into())))
    }

    #[tokio::test]
    async fn skeleton_until_first_page_arrives() {
        let (_mock, table) = users_table();
        assert_eq!(table.view(), TableView::Skeleton { rows: 5 });
        assert_eq!(table.go_to(1).await, PageFetch::Applied);
        match table.view() {
            TableView::Rows { rows, placeholder, pagination, error } => {
                assert_eq!(rows.len(), 2);
                assert!(!placeholder);
                assert_eq!(pagination, Pagination { page: 1, page_size: 5, total_count: 2, page_count: 1 });
                assert!(error.is_none());
            }
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[tokio::test]
    async fn signed_in_user_row_is_badged_and_locked() {
        let (_mock, table) = users_table();
        table.go_to(1).await;
        let TableView::Rows { rows, .. } = table.view() else { panic!("no rows") };
        assert!(rows[0].is_you);
        assert_eq!(rows[0].cells[0], "Root (You)");
        assert!(table.edit_dialog(&rows[0]).is_none());
        assert!(table.delete_dialog(&rows[0]).is_none());
        assert!(table.edit_dialog(&rows[1]).is_some());
    }

    #[tokio::test]
    async fn page_zero_leaves_table_where_it_was() {
        let (mock, table) = users_table();
        table.go_to(1).await;
        let lists = mock.list_calls();
        assert!(matches!(table.go_to(0).await, PageFetch::Failed(QueryError::Invalid(_))));
        assert_eq!(table.page(), 1);
        assert_eq!(mock.list_calls(), lists);

        table.cache.invalidate(ResourceKind::Users);
        assert!(table.sync().await);
        assert_eq!(mock.list_calls(), lists + 1);
    }

    #[tokio::test]
    async fn paging_stops_at_both_ends() {
        let (mock, table) = users_table();
        assert_eq!(table.prev_page().await, PageFetch::Unchanged);
        table.go_to(1).await;
        let lists = mock.list_calls();
        assert_eq!(table.next_page().await, PageFetch::Unchanged);
        assert_eq!(table.prev_page().await, PageFetch::Unchanged);
        assert_eq!(mock.list_calls(), lists);
        match table.view() {
            TableView::Rows { rows, pagination, .. } => {
                assert_eq!(rows.len(), 2);
                assert_eq!((pagination.page, pagination.page_count), (1, 1));
            }
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[tokio::test]
    async fn first_failure_shows_error_state() {
        let (mock, table) = users_table();
        mock.fail_next_list(corral_api::ApiError::network("down"));
        assert!(matches!(table.go_to(1).await, PageFetch::Failed(_)));
        assert!(matches!(table.view(), TableView::Failed(QueryError::Transport { .. })));
    }
}
