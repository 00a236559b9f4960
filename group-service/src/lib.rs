pub mod config;
pub mod db;
pub mod dtos;
pub mod graph;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use service_core::axum::{extract::State, Json};
use service_core::error::AppError;
use std::sync::Arc;

use crate::services::{EventEmitter, GroupStore, HierarchyService, MembershipService};

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub service_version: String,
    pub store: Arc<dyn GroupStore>,
    pub membership: MembershipService,
    pub hierarchy: HierarchyService,
}

impl AppState {
    pub fn new(
        service_name: impl Into<String>,
        service_version: impl Into<String>,
        store: Arc<dyn GroupStore>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            membership: MembershipService::new(store.clone()),
            hierarchy: HierarchyService::new(store.clone(), emitter),
            store,
        }
    }
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Group store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name,
        "version": state.service_version,
        "checks": {
            "group_store": "up"
        }
    })))
}
