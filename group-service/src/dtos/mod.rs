//! Request/response DTOs for the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::graph::{CycleCheck, MembershipChange};
use crate::models::{EffectiveMembership, HierarchyEdge};
use crate::services::HierarchyChangeOutcome;

fn not_nil(id: &Uuid) -> Result<(), ValidationError> {
    if id.is_nil() {
        return Err(ValidationError::new("nil_uuid"));
    }
    Ok(())
}

// ============================================================================
// Requests
// ============================================================================

/// Body for `POST /hierarchy/edges`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateEdgeRequest {
    #[validate(custom(function = "not_nil"))]
    pub parent_group_id: Uuid,
    #[validate(custom(function = "not_nil"))]
    pub member_group_id: Uuid,
    pub expires_utc: Option<DateTime<Utc>>,
}

/// Body for `PATCH /hierarchy/edges`. A missing or null expiry clears it.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateEdgeRequest {
    #[validate(custom(function = "not_nil"))]
    pub parent_group_id: Uuid,
    #[validate(custom(function = "not_nil"))]
    pub member_group_id: Uuid,
    #[serde(default)]
    pub expires_utc: Option<DateTime<Utc>>,
}

/// Query for `DELETE /hierarchy/edges` and `GET /hierarchy/cycle-check`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EdgeKeyQuery {
    #[validate(custom(function = "not_nil"))]
    pub parent_group_id: Uuid,
    #[validate(custom(function = "not_nil"))]
    pub member_group_id: Uuid,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipView {
    pub group_id: Uuid,
    pub direct: bool,
    pub is_admin: bool,
}

impl From<EffectiveMembership> for MembershipView {
    fn from(m: EffectiveMembership) -> Self {
        Self {
            group_id: m.group_id,
            direct: m.direct,
            is_admin: m.is_admin,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserMembershipsResponse {
    pub user_id: Uuid,
    pub memberships: Vec<MembershipView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupMemberView {
    pub user_id: Uuid,
    pub direct: bool,
    pub is_admin: bool,
}

impl From<EffectiveMembership> for GroupMemberView {
    fn from(m: EffectiveMembership) -> Self {
        Self {
            user_id: m.user_id,
            direct: m.direct,
            is_admin: m.is_admin,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupMembersResponse {
    pub group_id: Uuid,
    pub members: Vec<GroupMemberView>,
}

/// Ancestors or descendants of a group.
#[derive(Debug, Serialize, Deserialize)]
pub struct RelatedGroupsResponse {
    pub group_id: Uuid,
    pub groups: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CycleCheckResponse {
    pub would_create_cycle: bool,
    pub path: Vec<Uuid>,
}

impl From<CycleCheck> for CycleCheckResponse {
    fn from(check: CycleCheck) -> Self {
        Self {
            would_create_cycle: check.would_create_cycle(),
            path: check.path().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HierarchyChangeResponse {
    pub edge: HierarchyEdge,
    pub added: Vec<MembershipChange>,
    pub removed: Vec<MembershipChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_publish_error: Option<String>,
}

impl From<HierarchyChangeOutcome> for HierarchyChangeResponse {
    fn from(outcome: HierarchyChangeOutcome) -> Self {
        Self {
            edge: outcome.edge,
            added: outcome.diff.added,
            removed: outcome.diff.removed,
            event_publish_error: outcome.publish_error.map(|e| e.to_string()),
        }
    }
}
