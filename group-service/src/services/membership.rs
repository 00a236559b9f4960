//! Read-side operations: enumeration, hierarchy rendering, cycle checks.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::error::HierarchyError;
use super::metrics::ENUMERATION_DURATION;
use super::store::GroupStore;
use crate::graph::{
    check_candidate_edge, enumerate_group_members, enumerate_memberships, CycleCheck,
    HierarchyGraph, MembershipScope, MembershipSnapshot,
};
use crate::models::EffectiveMembership;

#[derive(Clone)]
pub struct MembershipService {
    store: Arc<dyn GroupStore>,
}

impl MembershipService {
    pub fn new(store: Arc<dyn GroupStore>) -> Self {
        Self { store }
    }

    async fn live_graph(&self, now: DateTime<Utc>) -> Result<HierarchyGraph, HierarchyError> {
        let edges = self.store.fetch_hierarchy_edges().await?;
        let graph = HierarchyGraph::from_edges(&edges, now);
        if graph.has_cycle() {
            warn!(
                groups = graph.group_count(),
                edges = graph.edge_count(),
                "Live hierarchy contains a cycle"
            );
        }
        Ok(graph)
    }

    async fn require_group(&self, group_id: Uuid) -> Result<(), HierarchyError> {
        match self.store.find_group(group_id).await? {
            Some(_) => Ok(()),
            None => Err(HierarchyError::GroupNotFound(group_id)),
        }
    }

    /// Effective memberships of one user, sorted by group id.
    ///
    /// A user with no memberships gets an empty list, not an error.
    #[instrument(skip(self))]
    pub async fn enumerate_memberships(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<EffectiveMembership>, HierarchyError> {
        let now = Utc::now();
        let direct = self.store.fetch_direct_memberships(user_id).await?;
        if direct.is_empty() {
            return Ok(Vec::new());
        }
        let graph = self.live_graph(now).await?;

        let timer = ENUMERATION_DURATION
            .with_label_values(&["user"])
            .start_timer();
        let snapshot = enumerate_memberships(&direct, &graph, &MembershipScope::User(user_id), now);
        timer.observe_duration();

        Ok(snapshot.memberships_for(user_id))
    }

    /// Effective memberships of every user, from one materialised graph.
    #[instrument(skip(self))]
    pub async fn enumerate_all(&self) -> Result<MembershipSnapshot, HierarchyError> {
        let now = Utc::now();
        let direct = self.store.fetch_all_direct_memberships().await?;
        let graph = self.live_graph(now).await?;

        let timer = ENUMERATION_DURATION
            .with_label_values(&["all"])
            .start_timer();
        let snapshot = enumerate_memberships(&direct, &graph, &MembershipScope::All, now);
        timer.observe_duration();

        Ok(snapshot)
    }

    /// Every user whose effective membership contains `group_id`.
    #[instrument(skip(self))]
    pub async fn group_members(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<EffectiveMembership>, HierarchyError> {
        self.require_group(group_id).await?;
        let now = Utc::now();
        let direct = self.store.fetch_all_direct_memberships().await?;
        let graph = self.live_graph(now).await?;

        let timer = ENUMERATION_DURATION
            .with_label_values(&["group"])
            .start_timer();
        let members = enumerate_group_members(&direct, &graph, group_id, now);
        timer.observe_duration();

        Ok(members)
    }

    #[instrument(skip(self))]
    pub async fn group_ancestors(&self, group_id: Uuid) -> Result<Vec<Uuid>, HierarchyError> {
        self.require_group(group_id).await?;
        Ok(self.live_graph(Utc::now()).await?.ancestors(group_id))
    }

    #[instrument(skip(self))]
    pub async fn group_descendants(&self, group_id: Uuid) -> Result<Vec<Uuid>, HierarchyError> {
        self.require_group(group_id).await?;
        Ok(self.live_graph(Utc::now()).await?.descendants(group_id))
    }

    /// Advisory check against the committed graph; mutations re-check under lock.
    #[instrument(skip(self))]
    pub async fn would_create_cycle(
        &self,
        parent_group_id: Uuid,
        member_group_id: Uuid,
    ) -> Result<CycleCheck, HierarchyError> {
        let graph = self.live_graph(Utc::now()).await?;
        Ok(check_candidate_edge(&graph, parent_group_id, member_group_id))
    }
}
