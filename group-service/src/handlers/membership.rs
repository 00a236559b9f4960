//! Read-side handlers: effective membership and hierarchy rendering.

use service_core::axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{
    CycleCheckResponse, EdgeKeyQuery, GroupMembersResponse, RelatedGroupsResponse,
    UserMembershipsResponse,
};
use crate::utils::ValidatedQuery;
use crate::AppState;

/// `GET /users/:user_id/memberships`
pub async fn user_memberships(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserMembershipsResponse>, AppError> {
    let memberships = state.membership.enumerate_memberships(user_id).await?;

    Ok(Json(UserMembershipsResponse {
        user_id,
        memberships: memberships.into_iter().map(Into::into).collect(),
    }))
}

/// `GET /groups/:group_id/members`
pub async fn group_members(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupMembersResponse>, AppError> {
    let members = state.membership.group_members(group_id).await?;

    Ok(Json(GroupMembersResponse {
        group_id,
        members: members.into_iter().map(Into::into).collect(),
    }))
}

/// `GET /groups/:group_id/ancestors`
pub async fn group_ancestors(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<RelatedGroupsResponse>, AppError> {
    let groups = state.membership.group_ancestors(group_id).await?;
    Ok(Json(RelatedGroupsResponse { group_id, groups }))
}

/// `GET /groups/:group_id/descendants`
pub async fn group_descendants(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<RelatedGroupsResponse>, AppError> {
    let groups = state.membership.group_descendants(group_id).await?;
    Ok(Json(RelatedGroupsResponse { group_id, groups }))
}

/// `GET /hierarchy/cycle-check?parent_group_id=&member_group_id=`
pub async fn cycle_check(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<EdgeKeyQuery>,
) -> Result<Json<CycleCheckResponse>, AppError> {
    let check = state
        .membership
        .would_create_cycle(query.parent_group_id, query.member_group_id)
        .await?;

    Ok(Json(check.into()))
}
