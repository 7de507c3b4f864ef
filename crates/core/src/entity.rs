//! Entity value objects as the REST backend emits them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::draft::{Draft, ProjectDraft, TaskDraft, UserDraft};
use crate::{CoreError, EntityId, ResourceKind};

/// Links an entity type to its resource kind, draft and record wrapper.
pub trait Entity: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    const KIND: ResourceKind;
    type Draft: Draft<Entity = Self>;

    fn id(&self) -> &str;
    fn into_record(self) -> Record;
    fn from_record(record: Record) -> Option<Self>;
    /// Rendered cells, in the order of [`crate::columns::columns_for`].
    fn cells(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: EntityId,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" | "done" => Ok(TaskStatus::Completed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    #[serde(alias = "project_id")]
    pub project_id: EntityId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, alias = "assigned_member_id")]
    pub assigned_member_id: Option<EntityId>,
}

/// One entity of any kind, as stored in a cache entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "entity", rename_all = "lowercase")]
pub enum Record {
    User(User),
    Project(Project),
    Task(Task),
}

impl Record {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Record::User(_) => ResourceKind::Users,
            Record::Project(_) => ResourceKind::Projects,
            Record::Task(_) => ResourceKind::Tasks,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::User(u) => &u.id,
            Record::Project(p) => &p.id,
            Record::Task(t) => &t.id,
        }
    }

    /// Decode one wire object of the given kind.
    pub fn decode(kind: ResourceKind, value: serde_json::Value) -> Result<Record, serde_json::Error> {
        Ok(match kind {
            ResourceKind::Users => Record::User(serde_json::from_value(value)?),
            ResourceKind::Projects => Record::Project(serde_json::from_value(value)?),
            ResourceKind::Tasks => Record::Task(serde_json::from_value(value)?),
        })
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Record::User(u) => serde_json::to_value(u),
            Record::Project(p) => serde_json::to_value(p),
            Record::Task(t) => serde_json::to_value(t),
        }
    }

    pub fn cells(&self) -> Vec<String> {
        match self {
            Record::User(u) => u.cells(),
            Record::Project(p) => p.cells(),
            Record::Task(t) => t.cells(),
        }
    }
}

fn or_dash(v: &Option<String>) -> String {
    v.as_deref().filter(|s| !s.is_empty()).unwrap_or("-").to_string()
}

impl Entity for User {
    const KIND: ResourceKind = ResourceKind::Users;
    type Draft = UserDraft;

    fn id(&self) -> &str { &self.id }
    fn into_record(self) -> Record { Record::User(self) }
    fn from_record(record: Record) -> Option<Self> {
        match record { Record::User(u) => Some(u), _ => None }
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.full_name.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| "N/A".to_string()),
            self.email.clone(),
            if self.is_superuser { "Superuser" } else { "User" }.to_string(),
            if self.is_active { "Active" } else { "Inactive" }.to_string(),
        ]
    }
}

impl Entity for Project {
    const KIND: ResourceKind = ResourceKind::Projects;
    type Draft = ProjectDraft;

    fn id(&self) -> &str { &self.id }
    fn into_record(self) -> Record { Record::Project(self) }
    fn from_record(record: Record) -> Option<Self> {
        match record { Record::Project(p) => Some(p), _ => None }
    }

    fn cells(&self) -> Vec<String> {
        vec![self.name.clone(), or_dash(&self.description), or_dash(&self.owner_id)]
    }
}

impl Entity for Task {
    const KIND: ResourceKind = ResourceKind::Tasks;
    type Draft = TaskDraft;

    fn id(&self) -> &str { &self.id }
    fn into_record(self) -> Record { Record::Task(self) }
    fn from_record(record: Record) -> Option<Self> {
        match record { Record::Task(t) => Some(t), _ => None }
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.project_id.clone(),
            or_dash(&self.description),
            self.title.clone(),
            self.status.to_string(),
            self.assigned_member_id.clone().unwrap_or_else(|| "Unassigned".to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_decodes_camel_case_wire_names() {
        let rec = Record::decode(
            ResourceKind::Tasks,
            json!({ "id": "t1", "projectId": "p1", "title": "Write spec", "status": "in_progress" }),
        )
        .unwrap();
        let task = Task::from_record(rec).unwrap();
        assert_eq!(task.project_id, "p1");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.assigned_member_id, None);
    }

    #[test]
    fn user_defaults_to_active_non_superuser() {
        let rec = Record::decode(ResourceKind::Users, json!({ "id": "u1", "email": "a@b.io" })).unwrap();
        let user = User::from_record(rec).unwrap();
        assert!(user.is_active);
        assert!(!user.is_superuser);
        assert_eq!(user.cells(), vec!["N/A", "a@b.io", "User", "Active"]);
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        assert!(Record::decode(ResourceKind::Projects, json!({ "id": 7 })).is_err());
    }

    #[test]
    fn from_record_refuses_other_kinds() {
        let rec = Record::Project(Project { id: "p1".into(), name: "Alpha".into(), description: None, owner_id: None });
        assert!(Task::from_record(rec).is_none());
    }
}
