//! Hierarchy edge model - nests a member group inside a parent group.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Directed edge: members of `member_group_id` are members of `parent_group_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct HierarchyEdge {
    pub edge_id: Uuid,
    pub parent_group_id: Uuid,
    pub member_group_id: Uuid,
    pub expires_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl HierarchyEdge {
    pub fn new(
        parent_group_id: Uuid,
        member_group_id: Uuid,
        expires_utc: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            edge_id: Uuid::new_v4(),
            parent_group_id,
            member_group_id,
            expires_utc,
            created_utc: Utc::now(),
        }
    }

    /// An edge is live until its expiry instant; an edge expiring exactly at
    /// `now` is already dead.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_utc.is_none_or(|expires| expires > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn edge_without_expiry_is_always_live() {
        let edge = HierarchyEdge::new(Uuid::new_v4(), Uuid::new_v4(), None);
        assert!(edge.is_live_at(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn edge_is_dead_at_its_expiry_instant() {
        let now = Utc::now();
        let edge = HierarchyEdge::new(Uuid::new_v4(), Uuid::new_v4(), Some(now));
        assert!(!edge.is_live_at(now));
        assert!(edge.is_live_at(now - Duration::seconds(1)));
    }
}
