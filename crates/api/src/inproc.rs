//! In-process backend holding the three collections in memory.
//!
//! Mirrors the server-side rules of the REST backend: unique user emails and
//! project names, tasks must reference an existing project, updates merge only
//! the provided fields.

use std::sync::Mutex;
use std::time::Instant;

use corral_core::{Project, ResourceKind, Task, TaskStatus, User};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::{ApiError, ApiResult, ListWindow, ResourceService};

/// Initial contents of the in-process backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Default)]
struct Collections {
    users: Vec<User>,
    projects: Vec<Project>,
    tasks: Vec<Task>,
}

#[derive(Deserialize)]
struct UserIn {
    email: Option<String>,
    full_name: Option<String>,
    password: Option<String>,
    is_active: Option<bool>,
    is_superuser: Option<bool>,
}

#[derive(Deserialize)]
struct ProjectIn {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskIn {
    #[serde(alias = "project_id")]
    project_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    status: Option<TaskStatus>,
    #[serde(alias = "assigned_member_id")]
    assigned_member_id: Option<String>,
}

fn parse<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> ApiResult<T> {
    serde_json::from_value(body).map_err(|e| ApiError::unprocessable(e.to_string()))
}

fn encode<T: Serialize>(v: &T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(v).map_err(|e| ApiError::internal(e.to_string()))
}

fn page<T: Serialize>(items: &[T], window: ListWindow) -> ApiResult<serde_json::Value> {
    let skip = usize::try_from(window.skip).unwrap_or(usize::MAX);
    let limit = usize::try_from(window.limit).unwrap_or(usize::MAX);
    let data: Vec<&T> = items.iter().skip(skip).take(limit).collect();
    Ok(json!({ "data": encode(&data)?, "count": items.len() }))
}

fn check_password(pw: &Option<String>) -> ApiResult<()> {
    match pw {
        Some(p) if p.chars().count() < 8 => Err(ApiError::unprocessable("password must be at least 8 characters")),
        _ => Ok(()),
    }
}

fn keep_or(new: Option<String>, old: Option<String>) -> Option<String> {
    match new {
        Some(v) if !v.is_empty() => Some(v),
        _ => old,
    }
}

/// In-memory implementation of [`ResourceService`].
pub struct InProcService {
    db: Mutex<Collections>,
    /// Owner recorded on newly created projects.
    acting_user: Option<String>,
}

impl Default for InProcService {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcService {
    pub fn new() -> Self {
        Self::from_seed(Seed::default())
    }

    pub fn from_seed(seed: Seed) -> Self {
        info!(users = seed.users.len(), projects = seed.projects.len(), tasks = seed.tasks.len(), "inproc: seeded");
        Self {
            db: Mutex::new(Collections { users: seed.users, projects: seed.projects, tasks: seed.tasks }),
            acting_user: None,
        }
    }

    pub fn with_acting_user(mut self, user_id: Option<String>) -> Self {
        self.acting_user = user_id;
        self
    }

    fn lock(&self) -> ApiResult<std::sync::MutexGuard<'_, Collections>> {
        self.db.lock().map_err(|_| ApiError::internal("backend state poisoned"))
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[async_trait::async_trait]
impl ResourceService for InProcService {
    async fn list(&self, kind: ResourceKind, window: ListWindow) -> ApiResult<serde_json::Value> {
        let t0 = Instant::now();
        let db = self.lock()?;
        let out = match kind {
            ResourceKind::Users => page(&db.users, window),
            ResourceKind::Projects => page(&db.projects, window),
            ResourceKind::Tasks => page(&db.tasks, window),
        };
        debug!(kind = %kind, skip = window.skip, limit = window.limit, took_us = %t0.elapsed().as_micros(), "inproc: list");
        out
    }

    async fn create(&self, kind: ResourceKind, body: serde_json::Value) -> ApiResult<serde_json::Value> {
        let mut db = self.lock()?;
        let created = match kind {
            ResourceKind::Users => {
                let input: UserIn = parse(body)?;
                let email = input.email.filter(|e| !e.trim().is_empty()).ok_or_else(|| ApiError::unprocessable("email is required"))?;
                if input.password.is_none() {
                    return Err(ApiError::unprocessable("password is required"));
                }
                check_password(&input.password)?;
                if db.users.iter().any(|u| u.email.eq_ignore_ascii_case(&email)) {
                    return Err(ApiError::conflict("The user with this email already exists in the system."));
                }
                let user = User {
                    id: Self::new_id(),
                    email,
                    full_name: input.full_name,
                    is_active: input.is_active.unwrap_or(true),
                    is_superuser: input.is_superuser.unwrap_or(false),
                };
                db.users.push(user.clone());
                encode(&user)?
            }
            ResourceKind::Projects => {
                let input: ProjectIn = parse(body)?;
                let name = input.name.filter(|n| !n.trim().is_empty()).ok_or_else(|| ApiError::unprocessable("name is required"))?;
                if db.projects.iter().any(|p| p.name == name) {
                    return Err(ApiError::conflict("A project with this name already exists."));
                }
                let project = Project { id: Self::new_id(), name, description: input.description, owner_id: self.acting_user.clone() };
                db.projects.push(project.clone());
                encode(&project)?
            }
            ResourceKind::Tasks => {
                let input: TaskIn = parse(body)?;
                let project_id = input.project_id.ok_or_else(|| ApiError::unprocessable("projectId is required"))?;
                let title = input.title.filter(|t| !t.trim().is_empty()).ok_or_else(|| ApiError::unprocessable("title is required"))?;
                if !db.projects.iter().any(|p| p.id == project_id) {
                    return Err(ApiError::not_found("Project not found"));
                }
                let task = Task {
                    id: Self::new_id(),
                    project_id,
                    title,
                    description: input.description,
                    status: input.status.unwrap_or_default(),
                    assigned_member_id: input.assigned_member_id,
                };
                db.tasks.push(task.clone());
                encode(&task)?
            }
        };
        info!(kind = %kind, id = %created.get("id").and_then(|v| v.as_str()).unwrap_or("-"), "inproc: created");
        Ok(created)
    }

    async fn update(&self, kind: ResourceKind, id: &str, body: serde_json::Value) -> ApiResult<serde_json::Value> {
        let mut db = self.lock()?;
        let updated = match kind {
            ResourceKind::Users => {
                let input: UserIn = parse(body)?;
                check_password(&input.password)?;
                if let Some(email) = input.email.as_deref() {
                    if db.users.iter().any(|u| u.id != id && u.email.eq_ignore_ascii_case(email)) {
                        return Err(ApiError::conflict("User with this email already exists"));
                    }
                }
                let user = db.users.iter_mut().find(|u| u.id == id).ok_or_else(|| ApiError::not_found("User not found"))?;
                if let Some(email) = input.email.filter(|e| !e.is_empty()) {
                    user.email = email;
                }
                user.full_name = keep_or(input.full_name, user.full_name.take());
                if let Some(v) = input.is_active { user.is_active = v; }
                if let Some(v) = input.is_superuser { user.is_superuser = v; }
                encode(&*user)?
            }
            ResourceKind::Projects => {
                let input: ProjectIn = parse(body)?;
                if let Some(name) = input.name.as_deref() {
                    if db.projects.iter().any(|p| p.id != id && p.name == name) {
                        return Err(ApiError::conflict("A project with this name already exists."));
                    }
                }
                let project = db.projects.iter_mut().find(|p| p.id == id).ok_or_else(|| ApiError::not_found("Project not found"))?;
                if let Some(name) = input.name.filter(|n| !n.is_empty()) {
                    project.name = name;
                }
                project.description = keep_or(input.description, project.description.take());
                encode(&*project)?
            }
            ResourceKind::Tasks => {
                let input: TaskIn = parse(body)?;
                let task = db.tasks.iter_mut().find(|t| t.id == id).ok_or_else(|| ApiError::not_found("Task not found"))?;
                if let Some(title) = input.title.filter(|t| !t.is_empty()) {
                    task.title = title;
                }
                task.description = keep_or(input.description, task.description.take());
                if let Some(status) = input.status { task.status = status; }
                task.assigned_member_id = keep_or(input.assigned_member_id, task.assigned_member_id.take());
                encode(&*task)?
            }
        };
        info!(kind = %kind, id = %id, "inproc: updated");
        Ok(updated)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> ApiResult<()> {
        let mut db = self.lock()?;
        let removed = match kind {
            ResourceKind::Users => remove_by(&mut db.users, |u| u.id == id),
            ResourceKind::Projects => remove_by(&mut db.projects, |p| p.id == id),
            ResourceKind::Tasks => remove_by(&mut db.tasks, |t| t.id == id),
        };
        if !removed {
            return Err(ApiError::not_found(format!("{} not found", kind.noun())));
        }
        info!(kind = %kind, id = %id, "inproc: deleted");
        Ok(())
    }
}

fn remove_by<T>(items: &mut Vec<T>, pred: impl Fn(&T) -> bool) -> bool {
    let before = items.len();
    items.retain(|x| !pred(x));
    items.len() != before
}
