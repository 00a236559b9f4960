//! Hierarchy mutations with before/after diffing and event emission.
//!
//! One mutation runs as: lock, snapshot affected users, validate, write,
//! snapshot again, diff, commit, emit. Any failure before commit rolls the
//! whole unit back and emits nothing. Emission failures after commit are
//! reported on the outcome but never undo the write.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::error::{HierarchyError, PublishError, StoreError};
use super::events::EventEmitter;
use super::metrics::{
    ERRORS_TOTAL, EVENT_PUBLISH_FAILURES_TOTAL, HIERARCHY_MUTATIONS_TOTAL,
    MEMBERSHIP_EVENTS_TOTAL,
};
use super::store::{GroupStore, GroupStoreTx};
use crate::graph::{
    check_candidate_edge, diff_snapshots, enumerate_memberships, users_seeded_at_or_below,
    CycleCheck, HierarchyGraph, MembershipDiff, MembershipScope,
};
use crate::models::HierarchyEdge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

/// A single-edge change to the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyChange {
    Insert {
        parent_group_id: Uuid,
        member_group_id: Uuid,
        expires_utc: Option<DateTime<Utc>>,
    },
    /// Only the expiry of an existing edge can change.
    UpdateExpiry {
        parent_group_id: Uuid,
        member_group_id: Uuid,
        expires_utc: Option<DateTime<Utc>>,
    },
    Delete {
        parent_group_id: Uuid,
        member_group_id: Uuid,
    },
}

impl HierarchyChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            HierarchyChange::Insert { .. } => ChangeKind::Insert,
            HierarchyChange::UpdateExpiry { .. } => ChangeKind::Update,
            HierarchyChange::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// `(parent_group_id, member_group_id)`
    pub fn endpoints(&self) -> (Uuid, Uuid) {
        match *self {
            HierarchyChange::Insert {
                parent_group_id,
                member_group_id,
                ..
            }
            | HierarchyChange::UpdateExpiry {
                parent_group_id,
                member_group_id,
                ..
            }
            | HierarchyChange::Delete {
                parent_group_id,
                member_group_id,
            } => (parent_group_id, member_group_id),
        }
    }
}

/// Who asked for a change and the audit record it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeContext {
    pub actor_id: Uuid,
    pub audit_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct HierarchyChangeOutcome {
    /// The edge as inserted, updated, or just before deletion.
    pub edge: HierarchyEdge,
    pub diff: MembershipDiff,
    /// Set when the mutation committed but events were not all delivered.
    pub publish_error: Option<PublishError>,
}

#[derive(Clone)]
pub struct HierarchyService {
    store: Arc<dyn GroupStore>,
    emitter: Arc<dyn EventEmitter>,
}

impl HierarchyService {
    pub fn new(store: Arc<dyn GroupStore>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self { store, emitter }
    }

    /// Apply one edge change atomically and emit the resulting membership events.
    #[instrument(
        skip(self, change, context),
        fields(
            kind = change.kind().as_str(),
            actor_id = %context.actor_id,
            audit_id = %context.audit_id,
        )
    )]
    pub async fn apply(
        &self,
        change: HierarchyChange,
        context: ChangeContext,
    ) -> Result<HierarchyChangeOutcome, HierarchyError> {
        let kind = change.kind();
        let mut tx = self.store.begin().await?;

        let (edge, diff) = match mutate(tx.as_mut(), &change, Utc::now()).await {
            Ok(result) => result,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                self.record_failure(kind, &err);
                return Err(err);
            }
        };

        if let Err(err) = tx.commit().await {
            let err = HierarchyError::from(err);
            self.record_failure(kind, &err);
            return Err(err);
        }

        HIERARCHY_MUTATIONS_TOTAL
            .with_label_values(&[kind.as_str(), "ok"])
            .inc();
        info!(
            edge_id = %edge.edge_id,
            parent_group_id = %edge.parent_group_id,
            member_group_id = %edge.member_group_id,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Hierarchy change committed"
        );

        let publish_error = self.publish(&diff, context).await;

        Ok(HierarchyChangeOutcome {
            edge,
            diff,
            publish_error,
        })
    }

    fn record_failure(&self, kind: ChangeKind, err: &HierarchyError) {
        HIERARCHY_MUTATIONS_TOTAL
            .with_label_values(&[kind.as_str(), err.kind()])
            .inc();
        if matches!(err, HierarchyError::Store(_)) {
            ERRORS_TOTAL.with_label_values(&["store_error"]).inc();
            warn!(error = %err, "Hierarchy change failed in store");
        } else {
            info!(error = %err, "Hierarchy change rejected");
        }
    }

    async fn publish(&self, diff: &MembershipDiff, context: ChangeContext) -> Option<PublishError> {
        if diff.is_empty() {
            return None;
        }

        let events = diff.to_events(context.actor_id, context.audit_id);
        for event in &events {
            MEMBERSHIP_EVENTS_TOTAL
                .with_label_values(&[event.action.as_str()])
                .inc();
        }

        match self.emitter.emit(&events).await {
            Ok(()) => None,
            Err(err) => {
                EVENT_PUBLISH_FAILURES_TOTAL
                    .with_label_values(&[self.emitter.name()])
                    .inc_by(err.failed as f64);
                warn!(
                    error = %err,
                    emitter = self.emitter.name(),
                    "Membership events not published after commit"
                );
                Some(err)
            }
        }
    }

    /// Delete edges that expired more than `grace` ago.
    ///
    /// Expired edges contribute nothing to membership, so this emits no events.
    #[instrument(skip(self))]
    pub async fn compact_expired_edges(&self, grace: Duration) -> Result<u64, HierarchyError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            tx.lock_hierarchy().await?;
            tx.delete_expired_edges(Utc::now() - grace).await
        }
        .await;

        match result {
            Ok(removed) => {
                tx.commit().await?;
                Ok(removed)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err.into())
            }
        }
    }
}

async fn require_group(tx: &mut dyn GroupStoreTx, group_id: Uuid) -> Result<(), HierarchyError> {
    match tx.find_group(group_id).await? {
        Some(_) => Ok(()),
        None => Err(HierarchyError::GroupNotFound(group_id)),
    }
}

fn reject_cycle(check: CycleCheck, parent_group_id: Uuid) -> Result<(), HierarchyError> {
    match check {
        CycleCheck::Acyclic => Ok(()),
        CycleCheck::SelfReference => Err(HierarchyError::SelfReference(parent_group_id)),
        CycleCheck::Cycle { path } => Err(HierarchyError::CycleDetected { path }),
    }
}

/// Everything between `begin` and `commit`. Both snapshots use `now`.
async fn mutate(
    tx: &mut dyn GroupStoreTx,
    change: &HierarchyChange,
    now: DateTime<Utc>,
) -> Result<(HierarchyEdge, MembershipDiff), HierarchyError> {
    tx.lock_hierarchy().await?;

    let (parent_group_id, member_group_id) = change.endpoints();
    let direct = tx.fetch_all_direct_memberships().await?;
    let before_graph = HierarchyGraph::from_edges(&tx.fetch_hierarchy_edges().await?, now);

    // Only users seeded at or below the member end can gain or lose anything.
    let scope = MembershipScope::Users(users_seeded_at_or_below(
        &direct,
        &before_graph,
        member_group_id,
    ));
    let before = enumerate_memberships(&direct, &before_graph, &scope, now);

    let edge = match *change {
        HierarchyChange::Insert { expires_utc, .. } => {
            if parent_group_id == member_group_id {
                return Err(HierarchyError::SelfReference(parent_group_id));
            }
            require_group(tx, parent_group_id).await?;
            require_group(tx, member_group_id).await?;
            if let Some(expires) = expires_utc.filter(|expires| *expires <= now) {
                return Err(HierarchyError::InvalidExpiry(format!(
                    "expires_utc {} is not in the future",
                    expires.to_rfc3339()
                )));
            }
            if tx.edge_exists(parent_group_id, member_group_id).await? {
                return Err(HierarchyError::DuplicateEdge {
                    parent_group_id,
                    member_group_id,
                });
            }
            let check = check_candidate_edge(&before_graph, parent_group_id, member_group_id);
            reject_cycle(check, parent_group_id)?;

            let edge = HierarchyEdge::new(parent_group_id, member_group_id, expires_utc);
            tx.insert_edge(&edge).await.map_err(|e| match e {
                StoreError::UniqueViolation(_) => HierarchyError::DuplicateEdge {
                    parent_group_id,
                    member_group_id,
                },
                other => other.into(),
            })?;
            edge
        }
        HierarchyChange::UpdateExpiry { expires_utc, .. } => {
            let existing = find_existing(tx, parent_group_id, member_group_id).await?;
            let reactivates =
                !existing.is_live_at(now) && expires_utc.is_none_or(|expires| expires > now);
            if reactivates {
                // The expired edge is already absent from the live graph.
                let check = check_candidate_edge(&before_graph, parent_group_id, member_group_id);
                reject_cycle(check, parent_group_id)?;
            }
            tx.update_edge_expiry(existing.edge_id, expires_utc).await?
        }
        HierarchyChange::Delete { .. } => {
            let existing = find_existing(tx, parent_group_id, member_group_id).await?;
            tx.delete_edge(existing.edge_id).await?;
            existing
        }
    };

    let after_graph = HierarchyGraph::from_edges(&tx.fetch_hierarchy_edges().await?, now);
    let after = enumerate_memberships(&direct, &after_graph, &scope, now);

    Ok((edge, diff_snapshots(&before, &after)))
}

async fn find_existing(
    tx: &mut dyn GroupStoreTx,
    parent_group_id: Uuid,
    member_group_id: Uuid,
) -> Result<HierarchyEdge, HierarchyError> {
    tx.find_edge(parent_group_id, member_group_id)
        .await?
        .ok_or(HierarchyError::EdgeNotFound {
            parent_group_id,
            member_group_id,
        })
}
