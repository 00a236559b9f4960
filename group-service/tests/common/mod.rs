//! Test helpers for group-service integration tests.
//!
//! Drives the real router over the in-memory store and a recording emitter.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use group_service::{
    models::{DirectMembership, Group, HierarchyEdge, MembershipAction},
    services::{InMemoryGroupStore, RecordingEventEmitter},
    startup::build_router,
    AppState,
};
use serde_json::Value;
use std::sync::{Arc, Once};
use tower::ServiceExt;
use uuid::Uuid;

static TRACING: Once = Once::new();

pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("group_service=debug"))
            .with_test_writer()
            .try_init();
    });
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: InMemoryGroupStore,
    pub emitter: RecordingEventEmitter,
    pub actor_id: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        init_test_tracing();

        let store = InMemoryGroupStore::new();
        let emitter = RecordingEventEmitter::new();
        let state = AppState::new(
            "group-service-test",
            "0.0.0-test",
            Arc::new(store.clone()),
            Arc::new(emitter.clone()),
        );
        let router = build_router(state.clone(), &["http://localhost:3000".to_string()]);

        Self {
            router,
            state,
            store,
            emitter,
            actor_id: Uuid::new_v4(),
        }
    }

    pub async fn group(&self, slug: &str) -> Uuid {
        let group = Group::new(slug, slug.to_uppercase());
        let id = group.group_id;
        self.store.insert_group(group).await;
        id
    }

    pub async fn member(&self, user_id: Uuid, group_id: Uuid) {
        self.store
            .add_membership(DirectMembership::member(user_id, group_id))
            .await;
    }

    pub async fn admin(&self, user_id: Uuid, group_id: Uuid, expires: Option<DateTime<Utc>>) {
        self.store
            .add_membership(DirectMembership::admin(user_id, group_id, expires))
            .await;
    }

    /// Seed an edge directly, bypassing the mutation path.
    pub async fn seed_edge(&self, parent: Uuid, member: Uuid, expires: Option<DateTime<Utc>>) {
        self.store
            .insert_edge_unchecked(HierarchyEdge::new(parent, member, expires))
            .await;
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        actor: Option<Uuid>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder.header("X-User-ID", actor.to_string());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, None).await
    }

    pub async fn insert_edge(&self, parent: Uuid, member: Uuid) -> (StatusCode, Value) {
        self.insert_edge_expiring(parent, member, None).await
    }

    pub async fn insert_edge_expiring(
        &self,
        parent: Uuid,
        member: Uuid,
        expires: Option<DateTime<Utc>>,
    ) -> (StatusCode, Value) {
        let body = serde_json::json!({
            "parent_group_id": parent,
            "member_group_id": member,
            "expires_utc": expires,
        });
        self.request(Method::POST, "/hierarchy/edges", Some(body), Some(self.actor_id))
            .await
    }

    pub async fn update_edge(
        &self,
        parent: Uuid,
        member: Uuid,
        expires: Option<DateTime<Utc>>,
    ) -> (StatusCode, Value) {
        let body = serde_json::json!({
            "parent_group_id": parent,
            "member_group_id": member,
            "expires_utc": expires,
        });
        self.request(Method::PATCH, "/hierarchy/edges", Some(body), Some(self.actor_id))
            .await
    }

    pub async fn delete_edge(&self, parent: Uuid, member: Uuid) -> (StatusCode, Value) {
        let uri = format!(
            "/hierarchy/edges?parent_group_id={}&member_group_id={}",
            parent, member
        );
        self.request(Method::DELETE, &uri, None, Some(self.actor_id))
            .await
    }

    /// `(group_id, direct, is_admin)` for each effective membership of `user_id`.
    pub async fn memberships(&self, user_id: Uuid) -> Vec<(Uuid, bool, bool)> {
        let (status, body) = self.get(&format!("/users/{}/memberships", user_id)).await;
        assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
        body["memberships"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| {
                (
                    m["group_id"].as_str().unwrap().parse().unwrap(),
                    m["direct"].as_bool().unwrap(),
                    m["is_admin"].as_bool().unwrap(),
                )
            })
            .collect()
    }

    /// Events recorded so far as `(action, user_id, group_id)`.
    pub fn recorded(&self) -> Vec<(MembershipAction, Uuid, Uuid)> {
        self.emitter
            .events()
            .into_iter()
            .map(|e| (e.action, e.user_id, e.group_id))
            .collect()
    }
}

/// `(user_id, group_id)` pairs from an `added` or `removed` response array.
pub fn pairs(value: &Value) -> Vec<(Uuid, Uuid)> {
    let mut pairs: Vec<(Uuid, Uuid)> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|c| {
            (
                c["user_id"].as_str().unwrap().parse().unwrap(),
                c["group_id"].as_str().unwrap().parse().unwrap(),
            )
        })
        .collect();
    pairs.sort();
    pairs
}

pub fn sorted(mut pairs: Vec<(Uuid, Uuid)>) -> Vec<(Uuid, Uuid)> {
    pairs.sort();
    pairs
}
