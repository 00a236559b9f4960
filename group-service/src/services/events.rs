//! Membership event emitters.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use service_core::observability::TracedClientExt;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::error::PublishError;
use crate::models::MembershipEvent;

/// Publishes membership change events downstream.
///
/// Delivery is at-least-once and unordered; consumers must be idempotent.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, events: &[MembershipEvent]) -> Result<(), PublishError>;

    /// Label used in metrics and logs.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Error)]
enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook responded {0}")]
    Status(StatusCode),
}

impl DeliveryError {
    fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Transport(e) => e.is_timeout() || e.is_connect(),
            DeliveryError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

/// Deliveries in flight at once when not configured otherwise.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// POSTs each event as JSON to a webhook, retrying transient failures.
#[derive(Clone)]
pub struct WebhookEventEmitter {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    retry: RetryConfig,
    max_in_flight: usize,
}

impl WebhookEventEmitter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
            retry: RetryConfig::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Cap concurrent POSTs; a large diff is delivered in waves of this size.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    async fn deliver(&self, event: &MembershipEvent) -> Result<(), DeliveryError> {
        let response = self
            .client
            .traced_post(&self.url)
            .header("x-audit-id", &event.audit_id.to_string())
            .request_id(event.audit_id.to_string())
            .timeout(self.timeout)
            .json(event)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status))
        }
    }
}

#[async_trait]
impl EventEmitter for WebhookEventEmitter {
    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn emit(&self, events: &[MembershipEvent]) -> Result<(), PublishError> {
        let deliveries: Vec<_> = events
            .iter()
            .map(|event| {
                retry_with_backoff(
                    &self.retry,
                    "membership_event_webhook",
                    DeliveryError::is_transient,
                    move || self.deliver(event),
                )
            })
            .collect();
        let failures: Vec<DeliveryError> = stream::iter(deliveries)
            .buffer_unordered(self.max_in_flight)
            .filter_map(|result| async move { result.err() })
            .collect()
            .await;

        match failures.first() {
            None => Ok(()),
            Some(first) => Err(PublishError {
                failed: failures.len(),
                attempted: events.len(),
                reason: first.to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Writes one structured log record per event. Used when no webhook is set.
#[derive(Clone, Default)]
pub struct LogEventEmitter;

#[async_trait]
impl EventEmitter for LogEventEmitter {
    async fn emit(&self, events: &[MembershipEvent]) -> Result<(), PublishError> {
        for event in events {
            info!(
                action = %event.action,
                group_id = %event.group_id,
                user_id = %event.user_id,
                actor_id = %event.actor_id,
                audit_id = %event.audit_id,
                "Membership event"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Records emitted events in memory; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingEventEmitter {
    events: Arc<Mutex<Vec<MembershipEvent>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<MembershipEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventEmitter for RecordingEventEmitter {
    async fn emit(&self, events: &[MembershipEvent]) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            warn!(count = events.len(), "Recording emitter set to fail");
            return Err(PublishError {
                failed: events.len(),
                attempted: events.len(),
                reason: "recording emitter set to fail".to_string(),
            });
        }

        let mut recorded = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        recorded.extend_from_slice(events);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
