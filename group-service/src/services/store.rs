//! Storage seam for groups, direct memberships, and hierarchy edges.
//!
//! Every read excludes soft-deleted groups: their edges and memberships are
//! never returned, and `find_group` does not return them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::StoreError;
use crate::models::{DirectMembership, Group, HierarchyEdge};

/// Read access plus the entry point for transactional mutation.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError>;

    async fn fetch_direct_memberships(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<DirectMembership>, StoreError>;

    async fn fetch_all_direct_memberships(&self) -> Result<Vec<DirectMembership>, StoreError>;

    /// All edges, expired ones included. Callers filter by instant.
    async fn fetch_hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>, StoreError>;

    async fn edge_exists(
        &self,
        parent_group_id: Uuid,
        member_group_id: Uuid,
    ) -> Result<bool, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    /// Open a unit of work. Nothing it writes is visible until `commit`.
    async fn begin(&self) -> Result<Box<dyn GroupStoreTx>, StoreError>;
}

/// One open transaction against the store.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait GroupStoreTx: Send {
    /// Serialise against every other hierarchy mutation until commit or rollback.
    async fn lock_hierarchy(&mut self) -> Result<(), StoreError>;

    async fn find_group(&mut self, group_id: Uuid) -> Result<Option<Group>, StoreError>;

    async fn fetch_all_direct_memberships(&mut self)
        -> Result<Vec<DirectMembership>, StoreError>;

    async fn fetch_hierarchy_edges(&mut self) -> Result<Vec<HierarchyEdge>, StoreError>;

    async fn find_edge(
        &mut self,
        parent_group_id: Uuid,
        member_group_id: Uuid,
    ) -> Result<Option<HierarchyEdge>, StoreError>;

    async fn edge_exists(
        &mut self,
        parent_group_id: Uuid,
        member_group_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self
            .find_edge(parent_group_id, member_group_id)
            .await?
            .is_some())
    }

    async fn insert_edge(&mut self, edge: &HierarchyEdge) -> Result<(), StoreError>;

    async fn update_edge_expiry(
        &mut self,
        edge_id: Uuid,
        expires_utc: Option<DateTime<Utc>>,
    ) -> Result<HierarchyEdge, StoreError>;

    async fn delete_edge(&mut self, edge_id: Uuid) -> Result<(), StoreError>;

    /// Remove edges that expired at or before `cutoff`. Returns the count removed.
    async fn delete_expired_edges(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
