//! Group model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Group entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub group_id: Uuid,
    pub group_slug: String,
    pub group_label: String,
    /// Group whose members approve requests to join this one.
    pub approver_group_id: Option<Uuid>,
    pub deleted_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Group {
    /// Create a new, live group.
    pub fn new(group_slug: impl Into<String>, group_label: impl Into<String>) -> Self {
        Self {
            group_id: Uuid::new_v4(),
            group_slug: group_slug.into(),
            group_label: group_label.into(),
            approver_group_id: None,
            deleted_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// Soft-deleted groups are treated as absent everywhere.
    pub fn is_deleted(&self) -> bool {
        self.deleted_utc.is_some()
    }
}
