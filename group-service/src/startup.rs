use service_core::axum::{
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::from_fn,
    routing::get,
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::GroupServiceConfig;
use crate::db;
use crate::handlers;
use crate::services::{
    spawn_expired_edge_sweeper, EventEmitter, GroupStore, LogEventEmitter, PgGroupStore,
    WebhookEventEmitter,
};
use crate::{health_check, AppState};

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/users/:user_id/memberships",
            get(handlers::membership::user_memberships),
        )
        .route(
            "/groups/:group_id/members",
            get(handlers::membership::group_members),
        )
        .route(
            "/groups/:group_id/ancestors",
            get(handlers::membership::group_ancestors),
        )
        .route(
            "/groups/:group_id/descendants",
            get(handlers::membership::group_descendants),
        )
        .route(
            "/hierarchy/cycle-check",
            get(handlers::membership::cycle_check),
        )
        .route(
            "/hierarchy/edges",
            service_core::axum::routing::post(handlers::hierarchy::create_edge)
                .patch(handlers::hierarchy::update_edge)
                .delete(handlers::hierarchy::delete_edge),
        )
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    actor_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-audit-id"),
            HeaderName::from_static("x-request-id"),
        ])
}

/// A bound, not yet serving, group-service.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    shutdown_grace: Duration,
    sweeper: Option<JoinHandle<()>>,
}

impl Application {
    pub async fn build(config: GroupServiceConfig) -> Result<Self, AppError> {
        let pool = db::create_pool(&config.database)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;
        db::run_migrations(&pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;

        let store: Arc<dyn GroupStore> = Arc::new(PgGroupStore::new(pool));
        let emitter: Arc<dyn EventEmitter> = match &config.events.webhook_url {
            Some(url) => {
                info!(url = %url, "Publishing membership events to webhook");
                Arc::new(WebhookEventEmitter::new(
                    url.clone(),
                    config.events.webhook_timeout(),
                ))
            }
            None => {
                info!("EVENTS_WEBHOOK_URL not set, membership events will be logged");
                Arc::new(LogEventEmitter)
            }
        };

        let state = AppState::new(
            config.service_name.clone(),
            config.service_version.clone(),
            store,
            emitter,
        );

        let grace = config.sweeper.grace()?;
        let sweeper = config.sweeper.enabled().then(|| {
            info!(
                interval_seconds = config.sweeper.interval_seconds,
                grace_seconds = config.sweeper.grace_seconds,
                "Expired edge compaction enabled"
            );
            spawn_expired_edge_sweeper(
                state.hierarchy.clone(),
                Duration::from_secs(config.sweeper.interval_seconds),
                grace,
            )
        });

        let router = build_router(state, &config.security.allowed_origins);

        let listener = TcpListener::bind(config.common.bind_address()).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
            shutdown_grace: Duration::from_secs(config.common.shutdown_grace_seconds),
            sweeper,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        info!(port = self.port, "Listening");

        service_core::axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(self.shutdown_grace))
        .await?;

        if let Some(sweeper) = self.sweeper {
            sweeper.abort();
        }

        info!("Service shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // In-flight requests get the grace period to complete.
    tokio::time::sleep(grace).await;
}
