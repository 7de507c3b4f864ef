//! Form values gathered by dialogs, with local validation.
//!
//! A draft is a transient copy: editing it never touches the cached entity.
//! Validation covers required fields and simple shape checks only; anything
//! that needs server state (uniqueness, existence) is left to the backend.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::entity::{Entity, Project, Task, TaskStatus, User};
use crate::error::{FieldError, ValidationError};
use crate::EntityId;

const MAX_TEXT: usize = 255;
const MIN_PASSWORD: usize = 8;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"));

/// Which request the draft will become.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftMode {
    Create,
    Update,
}

pub trait Draft: Clone + Default + fmt::Debug + Send + Sync + 'static {
    type Entity: Entity;

    /// Field names accepted by [`Draft::set`], in form order.
    const FIELDS: &'static [&'static str];

    /// Pre-populate from the entity's current values (Edit).
    fn from_entity(entity: &Self::Entity) -> Self;

    fn validate(&self, mode: DraftMode) -> Result<(), ValidationError>;

    /// JSON request body for create or update.
    fn body(&self, mode: DraftMode) -> Result<serde_json::Value, serde_json::Error>;

    /// Set one field from user input.
    fn set(&mut self, field: &str, value: &str) -> Result<(), FieldError>;
}

fn required(errs: &mut ValidationError, field: &'static str, value: &str, message: &str) {
    if value.trim().is_empty() {
        errs.push(FieldError::new(field, message));
    } else if value.chars().count() > MAX_TEXT {
        errs.push(FieldError::new(field, format!("must be at most {} characters", MAX_TEXT)));
    }
}

fn bounded(errs: &mut ValidationError, field: &'static str, value: &str) {
    if value.chars().count() > MAX_TEXT {
        errs.push(FieldError::new(field, format!("must be at most {} characters", MAX_TEXT)));
    }
}

fn non_empty(v: &str) -> Option<String> {
    let t = v.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, FieldError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(FieldError::new(field, format!("expected true/false, got {:?}", value))),
    }
}

fn unknown_field(name: &str) -> FieldError {
    FieldError::new("field", format!("unknown field {:?}", name))
}

// ---------------- Users ----------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDraft {
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl Default for UserDraft {
    fn default() -> Self {
        Self { email: String::new(), full_name: String::new(), password: String::new(), is_active: true, is_superuser: false }
    }
}

#[derive(Serialize)]
struct UserBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    is_active: bool,
    is_superuser: bool,
}

impl Draft for UserDraft {
    type Entity = User;
    const FIELDS: &'static [&'static str] = &["email", "full_name", "password", "is_active", "is_superuser"];

    fn from_entity(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            full_name: user.full_name.clone().unwrap_or_default(),
            password: String::new(),
            is_active: user.is_active,
            is_superuser: user.is_superuser,
        }
    }

    fn validate(&self, mode: DraftMode) -> Result<(), ValidationError> {
        let mut errs = ValidationError::default();
        required(&mut errs, "email", &self.email, "Email is required");
        if !self.email.trim().is_empty() && !EMAIL_RE.is_match(self.email.trim()) {
            errs.push(FieldError::new("email", "Invalid email address"));
        }
        bounded(&mut errs, "full_name", &self.full_name);
        let pw_len = self.password.chars().count();
        match mode {
            DraftMode::Create if pw_len == 0 => errs.push(FieldError::new("password", "Password is required")),
            _ if pw_len > 0 && pw_len < MIN_PASSWORD => {
                errs.push(FieldError::new("password", format!("Password must be at least {} characters", MIN_PASSWORD)))
            }
            _ => {}
        }
        errs.into_result()
    }

    fn body(&self, _mode: DraftMode) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(UserBody {
            email: Some(self.email.trim()),
            full_name: non_empty(&self.full_name),
            password: if self.password.is_empty() { None } else { Some(&self.password) },
            is_active: self.is_active,
            is_superuser: self.is_superuser,
        })
    }

    fn set(&mut self, field: &str, value: &str) -> Result<(), FieldError> {
        match field {
            "email" => self.email = value.to_string(),
            "full_name" | "name" => self.full_name = value.to_string(),
            "password" => self.password = value.to_string(),
            "is_active" | "active" => self.is_active = parse_bool("is_active", value)?,
            "is_superuser" | "superuser" => self.is_superuser = parse_bool("is_superuser", value)?,
            other => return Err(unknown_field(other)),
        }
        Ok(())
    }
}

// ---------------- Projects ----------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDraft {
    pub name: String,
    pub description: String,
}

#[derive(Serialize)]
struct ProjectBody {
    name: String,
    description: Option<String>,
}

impl Draft for ProjectDraft {
    type Entity = Project;
    const FIELDS: &'static [&'static str] = &["name", "description"];

    fn from_entity(project: &Project) -> Self {
        Self { name: project.name.clone(), description: project.description.clone().unwrap_or_default() }
    }

    fn validate(&self, _mode: DraftMode) -> Result<(), ValidationError> {
        let mut errs = ValidationError::default();
        required(&mut errs, "name", &self.name, "Project name is required");
        bounded(&mut errs, "description", &self.description);
        errs.into_result()
    }

    fn body(&self, _mode: DraftMode) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(ProjectBody { name: self.name.trim().to_string(), description: non_empty(&self.description) })
    }

    fn set(&mut self, field: &str, value: &str) -> Result<(), FieldError> {
        match field {
            "name" => self.name = value.to_string(),
            "description" => self.description = value.to_string(),
            other => return Err(unknown_field(other)),
        }
        Ok(())
    }
}

// ---------------- Tasks ----------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub project_id: EntityId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub assigned_member_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
    title: String,
    description: Option<String>,
    status: TaskStatus,
    assigned_member_id: Option<String>,
}

impl Draft for TaskDraft {
    type Entity = Task;
    const FIELDS: &'static [&'static str] = &["project_id", "title", "description", "status", "assigned_member_id"];

    fn from_entity(task: &Task) -> Self {
        Self {
            project_id: task.project_id.clone(),
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
            status: task.status,
            assigned_member_id: task.assigned_member_id.clone().unwrap_or_default(),
        }
    }

    fn validate(&self, mode: DraftMode) -> Result<(), ValidationError> {
        let mut errs = ValidationError::default();
        required(&mut errs, "title", &self.title, "Task title is required");
        if mode == DraftMode::Create {
            required(&mut errs, "project_id", &self.project_id, "Project is required");
        }
        bounded(&mut errs, "description", &self.description);
        errs.into_result()
    }

    fn body(&self, mode: DraftMode) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(TaskBody {
            // The project of an existing task is fixed.
            project_id: match mode {
                DraftMode::Create => Some(self.project_id.trim().to_string()),
                DraftMode::Update => None,
            },
            title: self.title.trim().to_string(),
            description: non_empty(&self.description),
            status: self.status,
            assigned_member_id: non_empty(&self.assigned_member_id),
        })
    }

    fn set(&mut self, field: &str, value: &str) -> Result<(), FieldError> {
        match field {
            "project_id" | "projectId" | "project" => self.project_id = value.to_string(),
            "title" => self.title = value.to_string(),
            "description" => self.description = value.to_string(),
            "status" => self.status = value.parse().map_err(|e: crate::CoreError| FieldError::new("status", e.to_string()))?,
            "assigned_member_id" | "assignedMemberId" | "assignee" => self.assigned_member_id = value.to_string(),
            other => return Err(unknown_field(other)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cleared_project_name_fails_validation() {
        let project = Project { id: "p1".into(), name: "Alpha".into(), description: None, owner_id: None };
        let mut draft = ProjectDraft::from_entity(&project);
        assert_eq!(draft.name, "Alpha");
        draft.set("name", "").unwrap();
        let err = draft.validate(DraftMode::Update).unwrap_err();
        assert_eq!(err.for_field("name").map(|f| f.message.as_str()), Some("Project name is required"));
    }

    #[test]
    fn task_create_body_carries_project() {
        let mut draft = TaskDraft::default();
        draft.set("title", "Write spec").unwrap();
        draft.set("projectId", "p1").unwrap();
        draft.validate(DraftMode::Create).unwrap();
        let body = draft.body(DraftMode::Create).unwrap();
        assert_eq!(body["projectId"], json!("p1"));
        assert_eq!(body["title"], json!("Write spec"));
        assert_eq!(body["status"], json!("pending"));
        assert!(draft.body(DraftMode::Update).unwrap().get("projectId").is_none());
    }

    #[test]
    fn task_requires_title_and_project_on_create() {
        let err = TaskDraft::default().validate(DraftMode::Create).unwrap_err();
        assert!(err.for_field("title").is_some());
        assert!(err.for_field("project_id").is_some());
    }

    #[test]
    fn user_create_needs_password_and_valid_email() {
        let mut draft = UserDraft::default();
        draft.set("email", "not-an-email").unwrap();
        let err = draft.validate(DraftMode::Create).unwrap_err();
        assert!(err.for_field("email").is_some());
        assert!(err.for_field("password").is_some());

        draft.set("email", "ada@example.com").unwrap();
        draft.set("password", "hunter22").unwrap();
        assert!(draft.validate(DraftMode::Create).is_ok());
        // Updates may leave the password untouched.
        draft.set("password", "").unwrap();
        assert!(draft.validate(DraftMode::Update).is_ok());
    }

    #[test]
    fn unknown_fields_and_bad_status_are_reported() {
        let mut draft = TaskDraft::default();
        assert!(draft.set("priority", "high").is_err());
        assert_eq!(draft.set("status", "sleeping").unwrap_err().field, "status");
        draft.set("status", "in progress").unwrap();
        assert_eq!(draft.status, TaskStatus::InProgress);
    }
}
