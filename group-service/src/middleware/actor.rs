use service_core::axum::async_trait;
use service_core::axum::extract::FromRequestParts;
use service_core::axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

use crate::services::ChangeContext;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const AUDIT_ID_HEADER: &str = "X-Audit-ID";

/// Caller identity for mutations.
///
/// `X-User-ID` is set by the trusted gateway and is required. `X-Audit-ID`
/// ties the change to an audit record; one is generated when absent.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub actor_id: Uuid,
    pub audit_id: Uuid,
}

impl From<Actor> for ChangeContext {
    fn from(actor: Actor) -> Self {
        ChangeContext {
            actor_id: actor.actor_id,
            audit_id: actor.audit_id,
        }
    }
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Option<Uuid>, AppError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Some)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("{} must be a UUID", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor_id = header_uuid(parts, USER_ID_HEADER)?.ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing {} header", USER_ID_HEADER))
        })?;
        let audit_id = header_uuid(parts, AUDIT_ID_HEADER)?.unwrap_or_else(Uuid::new_v4);

        tracing::Span::current().record("actor_id", tracing::field::display(actor_id));

        Ok(Actor { actor_id, audit_id })
    }
}
