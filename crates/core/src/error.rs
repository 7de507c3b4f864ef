use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Errors raised while building core values.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("page number must be >= 1, got {0}")]
    InvalidPage(u32),
    #[error("page size must be > 0")]
    InvalidPageSize,
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),
    #[error("unknown task status: {0}")]
    UnknownStatus(String),
}

/// Failure of a list fetch. Cloneable so coalesced waiters share it.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueryError {
    /// Network or HTTP-layer failure reaching the service.
    #[error("transport ({status}): {message}")]
    Transport { status: u16, message: String },
    /// Response shape did not match the expected envelope.
    #[error("decode: {0}")]
    Decode(String),
    /// The page request itself was invalid; nothing was sent.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl From<CoreError> for QueryError {
    fn from(e: CoreError) -> Self {
        QueryError::Invalid(e.to_string())
    }
}

/// Failure of a create/update/delete call.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum MutationError {
    /// The server rejected the mutation (conflict, not found, ...).
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("transport ({status}): {message}")]
    Transport { status: u16, message: String },
    /// The draft could not be turned into a request body.
    #[error("encode: {0}")]
    Encode(String),
}

impl MutationError {
    pub fn status(&self) -> Option<u16> {
        match self {
            MutationError::Rejected { status, .. } | MutationError::Transport { status, .. } => Some(*status),
            MutationError::Encode(_) => None,
        }
    }

    /// Message suitable for display inside a dialog.
    pub fn user_message(&self) -> String {
        match self {
            MutationError::Rejected { message, .. } => message.clone(),
            MutationError::Transport { .. } => "Could not reach the server. Try again.".to_string(),
            MutationError::Encode(m) => format!("Invalid input: {}", m),
        }
    }
}

/// A single per-field annotation produced by local validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Local validation failure; never reaches the network.
#[derive(Debug, Clone, Default, thiserror::Error, PartialEq, Eq)]
#[error("{}", render_fields(.fields))]
pub struct ValidationError {
    pub fields: SmallVec<[FieldError; 4]>,
}

fn render_fields(fields: &[FieldError]) -> String {
    fields.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ")
}

impl ValidationError {
    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    pub fn push(&mut self, err: FieldError) { self.fields.push(err); }

    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.fields.iter().find(|f| f.field == field)
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.fields.is_empty() { Ok(()) } else { Err(self) }
    }
}
