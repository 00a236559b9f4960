//! Membership change events published downstream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipAction {
    /// The user became an effective member of the group.
    Create,
    /// The user stopped being an effective member of the group.
    Delete,
}

impl MembershipAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for MembershipAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One event per (user, group) pair that appeared or disappeared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub action: MembershipAction,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub actor_id: Uuid,
    pub audit_id: Uuid,
}
