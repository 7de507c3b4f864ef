//! Corral core types: resource kinds, entities, page shapes, drafts and errors.
//!
//! Everything here is plain data shared by the service seam, the query cache
//! and the console. Nothing in this crate performs I/O.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod columns;
pub mod draft;
pub mod entity;
pub mod error;

pub use draft::{Draft, DraftMode, ProjectDraft, TaskDraft, UserDraft};
pub use entity::{Entity, Project, Record, Task, TaskStatus, User};
pub use error::{CoreError, FieldError, MutationError, QueryError, ValidationError};

/// Identifier of an entity as issued by the backend.
pub type EntityId = String;

/// Rows per page; fixed for every resource kind.
pub const PAGE_SIZE: u32 = 5;

/// Entity category a table/dialog pair manages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Users,
    Projects,
    Tasks,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Users, ResourceKind::Projects, ResourceKind::Tasks];

    /// Stable lowercase key, also used as the REST collection name.
    pub fn key(&self) -> &'static str {
        match self {
            ResourceKind::Users => "users",
            ResourceKind::Projects => "projects",
            ResourceKind::Tasks => "tasks",
        }
    }

    /// Singular, capitalised noun for user-facing messages.
    pub fn noun(&self) -> &'static str {
        match self {
            ResourceKind::Users => "User",
            ResourceKind::Projects => "Project",
            ResourceKind::Tasks => "Task",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "users" | "user" => Ok(ResourceKind::Users),
            "projects" | "project" => Ok(ResourceKind::Projects),
            "tasks" | "task" => Ok(ResourceKind::Tasks),
            other => Err(CoreError::UnknownKind(other.to_string())),
        }
    }
}

/// Cache key of one page of one resource kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub kind: ResourceKind,
    pub page: u32,
}

impl PageKey {
    pub fn new(kind: ResourceKind, page: u32) -> Self {
        Self { kind, page }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.page)
    }
}

/// A validated request for one 1-indexed page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRequest {
    kind: ResourceKind,
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(kind: ResourceKind, page: u32, page_size: u32) -> Result<Self, CoreError> {
        if page < 1 {
            return Err(CoreError::InvalidPage(page));
        }
        if page_size == 0 {
            return Err(CoreError::InvalidPageSize);
        }
        Ok(Self { kind, page, page_size })
    }

    /// Request using the fixed [`PAGE_SIZE`].
    pub fn standard(kind: ResourceKind, page: u32) -> Result<Self, CoreError> {
        Self::new(kind, page, PAGE_SIZE)
    }

    pub fn kind(&self) -> ResourceKind { self.kind }
    pub fn page(&self) -> u32 { self.page }
    pub fn page_size(&self) -> u32 { self.page_size }
    pub fn key(&self) -> PageKey { PageKey::new(self.kind, self.page) }

    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

/// One page of a collection plus the size of the whole collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

impl<T> Default for PageResult<T> {
    fn default() -> Self {
        Self { items: Vec::new(), total_count: 0 }
    }
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, total_count: u64) -> Self {
        Self { items, total_count }
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

impl PageResult<Record> {
    /// Typed view of the records; records of other kinds are skipped.
    pub fn typed<E: Entity>(&self) -> PageResult<E> {
        let items = self.items.iter().cloned().filter_map(E::from_record).collect();
        PageResult { items, total_count: self.total_count }
    }
}

/// Number of pages needed for `total` rows; never less than one.
pub fn page_count(total: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    let pages = total.div_ceil(size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}
