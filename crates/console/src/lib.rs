//! Corral console state layer.
//!
//! Frontend-agnostic: tables and dialogs expose plain state that a terminal
//! shell (or any other view) draws. All of them share one [`QueryCache`].

#![forbid(unsafe_code)]

use std::sync::Arc;

use corral_api::{Notifier, ResourceService};
use corral_core::{EntityId, Project, ResourceKind, Task, User};
use corral_store::{MutationUnit, QueryCache};
use tracing::info;

pub mod dialog;
pub mod render;
pub mod table;
pub mod toast;

pub use dialog::{DialogForm, DialogMode, DialogState, EntityDialog, Submission};
pub use render::render_view;
pub use table::{EntityTable, PageFetch, Pagination, TableRow, TableView};
pub use toast::{Toast, ToastBuffer, ToastLevel};

/// Everything a console session needs, wired around one cache.
pub struct Console {
    service: Arc<dyn ResourceService>,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
    pub users: EntityTable<User>,
    pub projects: EntityTable<Project>,
    pub tasks: EntityTable<Task>,
}

impl Console {
    pub fn new(service: Arc<dyn ResourceService>, notifier: Arc<dyn Notifier>) -> Self {
        let cache = Arc::new(QueryCache::new(service.clone()));
        Self::with_cache(service, cache, notifier)
    }

    pub fn with_cache(service: Arc<dyn ResourceService>, cache: Arc<QueryCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            users: EntityTable::new(cache.clone()),
            projects: EntityTable::new(cache.clone()),
            tasks: EntityTable::new(cache.clone()),
            service,
            cache,
            notifier,
        }
    }

    /// Set the signed-in user; their row in the users table gets a badge and
    /// no actions.
    pub fn signed_in_as(mut self, id: Option<EntityId>) -> Self {
        if let Some(id) = id.as_deref() {
            info!(user = %id, "console: signed in");
        }
        self.users = EntityTable::new(self.cache.clone()).with_current_user(id);
        self
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// A fresh unit for one dialog.
    pub fn mutation_unit(&self) -> MutationUnit {
        MutationUnit::new(self.service.clone(), self.cache.clone(), self.notifier.clone())
    }

    /// Let every table catch up with cache events. Returns the kinds that
    /// refetched.
    pub async fn sync(&self) -> Vec<ResourceKind> {
        let mut refreshed = Vec::new();
        if self.users.sync().await {
            refreshed.push(ResourceKind::Users);
        }
        if self.projects.sync().await {
            refreshed.push(ResourceKind::Projects);
        }
        if self.tasks.sync().await {
            refreshed.push(ResourceKind::Tasks);
        }
        refreshed
    }
}
