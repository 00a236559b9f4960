//! Hierarchy mutation handlers.

use service_core::axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::dtos::{CreateEdgeRequest, EdgeKeyQuery, HierarchyChangeResponse, UpdateEdgeRequest};
use crate::middleware::Actor;
use crate::services::HierarchyChange;
use crate::utils::{ValidatedJson, ValidatedQuery};
use crate::AppState;

/// `POST /hierarchy/edges`
pub async fn create_edge(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(req): ValidatedJson<CreateEdgeRequest>,
) -> Result<(StatusCode, Json<HierarchyChangeResponse>), AppError> {
    let change = HierarchyChange::Insert {
        parent_group_id: req.parent_group_id,
        member_group_id: req.member_group_id,
        expires_utc: req.expires_utc,
    };

    let outcome = state.hierarchy.apply(change, actor.into()).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// `PATCH /hierarchy/edges`
pub async fn update_edge(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(req): ValidatedJson<UpdateEdgeRequest>,
) -> Result<Json<HierarchyChangeResponse>, AppError> {
    let change = HierarchyChange::UpdateExpiry {
        parent_group_id: req.parent_group_id,
        member_group_id: req.member_group_id,
        expires_utc: req.expires_utc,
    };

    let outcome = state.hierarchy.apply(change, actor.into()).await?;
    Ok(Json(outcome.into()))
}

/// `DELETE /hierarchy/edges?parent_group_id=&member_group_id=`
pub async fn delete_edge(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedQuery(query): ValidatedQuery<EdgeKeyQuery>,
) -> Result<Json<HierarchyChangeResponse>, AppError> {
    let change = HierarchyChange::Delete {
        parent_group_id: query.parent_group_id,
        member_group_id: query.member_group_id,
    };

    let outcome = state.hierarchy.apply(change, actor.into()).await?;
    Ok(Json(outcome.into()))
}
