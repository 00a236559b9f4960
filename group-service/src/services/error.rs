use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

/// Failures raised by a [`GroupStore`](super::GroupStore) adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Map a sqlx error, keeping unique violations distinguishable.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::UniqueViolation(db_err.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Errors from membership reads and hierarchy mutations.
#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("Group {0} not found")]
    GroupNotFound(Uuid),

    #[error("No edge makes group {member_group_id} a member of group {parent_group_id}")]
    EdgeNotFound {
        parent_group_id: Uuid,
        member_group_id: Uuid,
    },

    #[error("Group {member_group_id} is already a member of group {parent_group_id}")]
    DuplicateEdge {
        parent_group_id: Uuid,
        member_group_id: Uuid,
    },

    #[error("Edge would create a cycle: {}", format_path(.path))]
    CycleDetected { path: Vec<Uuid> },

    #[error("Group {0} cannot be a member of itself")]
    SelfReference(Uuid),

    #[error("Invalid expiry: {0}")]
    InvalidExpiry(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn format_path(path: &[Uuid]) -> String {
    path.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl HierarchyError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            HierarchyError::GroupNotFound(_) => "group_not_found",
            HierarchyError::EdgeNotFound { .. } => "edge_not_found",
            HierarchyError::DuplicateEdge { .. } => "duplicate_edge",
            HierarchyError::CycleDetected { .. } => "cycle_detected",
            HierarchyError::SelfReference(_) => "self_reference",
            HierarchyError::InvalidExpiry(_) => "invalid_expiry",
            HierarchyError::Store(_) => "store_error",
        }
    }
}

impl From<HierarchyError> for AppError {
    fn from(err: HierarchyError) -> Self {
        match err {
            HierarchyError::GroupNotFound(_) | HierarchyError::EdgeNotFound { .. } => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            HierarchyError::DuplicateEdge { .. }
            | HierarchyError::CycleDetected { .. }
            | HierarchyError::SelfReference(_) => {
                let code = err.kind();
                AppError::conflict(code, anyhow::anyhow!(err.to_string()))
            }
            HierarchyError::InvalidExpiry(reason) => {
                let mut error = ValidationError::new("expires_in_past");
                error.message = Some(reason.into());
                let mut errors = ValidationErrors::new();
                errors.add("expires_utc", error);
                AppError::ValidationError(errors)
            }
            HierarchyError::Store(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
        }
    }
}

/// Events could not all be delivered after a committed mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{failed} of {attempted} membership events were not published: {reason}")]
pub struct PublishError {
    pub failed: usize,
    pub attempted: usize,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn conflicts_keep_their_reason_code() {
        let app: AppError = HierarchyError::CycleDetected {
            path: vec![Uuid::new_v4(), Uuid::new_v4()],
        }
        .into();

        match app {
            AppError::Conflict { code, .. } => assert_eq!(code, "cycle_detected"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn missing_group_is_404() {
        let app: AppError = HierarchyError::GroupNotFound(Uuid::new_v4()).into();
        assert_eq!(app.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn past_expiry_is_422() {
        let app: AppError = HierarchyError::InvalidExpiry("expires_utc is in the past".into()).into();
        assert_eq!(app.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn store_failure_is_500() {
        let app: AppError =
            HierarchyError::Store(StoreError::Unavailable("down".into())).into();
        assert_eq!(app.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
