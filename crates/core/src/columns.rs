//! Column sets for the entity tables.
//!
//! Column order matches [`crate::Entity::cells`] for the same kind.

#![forbid(unsafe_code)]

use crate::ResourceKind;

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub label: &'static str,
    /// Preferred width in characters.
    pub width: usize,
}

fn col(label: &'static str, width: usize) -> ColumnSpec {
    ColumnSpec { label, width }
}

/// Full column set for a resource kind, excluding the actions column.
pub fn columns_for(kind: ResourceKind) -> Vec<ColumnSpec> {
    match kind {
        ResourceKind::Users => vec![
            col("Full Name", 20),
            col("Email", 28),
            col("Role", 10),
            col("Status", 8),
        ],
        ResourceKind::Projects => vec![
            col("Name", 20),
            col("Description", 32),
            col("Owner", 36),
        ],
        ResourceKind::Tasks => vec![
            col("Project", 36),
            col("Description", 24),
            col("Title", 20),
            col("Status", 11),
            col("Assigned Member", 36),
        ],
    }
}
