//! In-process [`GroupStore`] used by tests and local development.
//!
//! A writer mutex serialises transactions. Committed state sits behind an
//! `RwLock`; transactions only write edges, so commit swaps in the edge
//! table alone and readers observe either the edges before a mutation or
//! the edges after it. Groups and memberships seeded while a transaction is
//! open survive its commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::error::StoreError;
use super::store::{GroupStore, GroupStoreTx};
use crate::models::{DirectMembership, Group, HierarchyEdge};

#[derive(Debug, Clone, Default)]
struct StoreState {
    groups: HashMap<Uuid, Group>,
    memberships: BTreeMap<(Uuid, Uuid), DirectMembership>,
    /// Keyed by (parent, member).
    edges: BTreeMap<(Uuid, Uuid), HierarchyEdge>,
}

impl StoreState {
    fn is_live(&self, group_id: &Uuid) -> bool {
        self.groups.get(group_id).is_some_and(|g| !g.is_deleted())
    }

    fn live_group(&self, group_id: Uuid) -> Option<Group> {
        self.groups
            .get(&group_id)
            .filter(|g| !g.is_deleted())
            .cloned()
    }

    fn live_memberships(&self, user_id: Option<Uuid>) -> Vec<DirectMembership> {
        self.memberships
            .values()
            .filter(|m| user_id.is_none_or(|id| id == m.user_id))
            .filter(|m| self.is_live(&m.group_id))
            .cloned()
            .collect()
    }

    fn live_edges(&self) -> Vec<HierarchyEdge> {
        self.edges
            .values()
            .filter(|e| self.is_live(&e.parent_group_id) && self.is_live(&e.member_group_id))
            .cloned()
            .collect()
    }

    fn find_edge(&self, parent_group_id: Uuid, member_group_id: Uuid) -> Option<HierarchyEdge> {
        self.edges
            .get(&(parent_group_id, member_group_id))
            .filter(|e| self.is_live(&e.parent_group_id) && self.is_live(&e.member_group_id))
            .cloned()
    }

    fn edge_key(&self, edge_id: Uuid) -> Option<(Uuid, Uuid)> {
        self.edges
            .iter()
            .find(|(_, e)| e.edge_id == edge_id)
            .map(|(key, _)| *key)
    }
}

/// Where an injected failure strikes inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// The first transactional call after a write fails.
    AfterWrite,
    /// `commit` fails after every write has been applied.
    Commit,
}

impl FailPoint {
    fn encode(point: Option<FailPoint>) -> u8 {
        match point {
            None => 0,
            Some(FailPoint::AfterWrite) => 1,
            Some(FailPoint::Commit) => 2,
        }
    }

    fn decode(raw: u8) -> Option<FailPoint> {
        match raw {
            1 => Some(FailPoint::AfterWrite),
            2 => Some(FailPoint::Commit),
            _ => None,
        }
    }
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryGroupStore {
    committed: Arc<RwLock<StoreState>>,
    writer: Arc<Mutex<()>>,
    unavailable: Arc<AtomicBool>,
    fail_point: Arc<AtomicU8>,
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Arm (or with `None`, disarm) a failure inside later transactions.
    pub fn fail_at(&self, point: Option<FailPoint>) {
        self.fail_point
            .store(FailPoint::encode(point), Ordering::SeqCst);
    }

    fn check_available(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn insert_group(&self, group: Group) {
        self.committed
            .write()
            .await
            .groups
            .insert(group.group_id, group);
    }

    pub async fn soft_delete_group(&self, group_id: Uuid, at: DateTime<Utc>) {
        if let Some(group) = self.committed.write().await.groups.get_mut(&group_id) {
            group.deleted_utc = Some(at);
        }
    }

    /// Upsert a direct membership.
    pub async fn add_membership(&self, membership: DirectMembership) {
        self.committed
            .write()
            .await
            .memberships
            .insert((membership.user_id, membership.group_id), membership);
    }

    pub async fn remove_membership(&self, user_id: Uuid, group_id: Uuid) {
        self.committed
            .write()
            .await
            .memberships
            .remove(&(user_id, group_id));
    }

    /// Store an edge without any checks. For seeding fixtures only.
    ///
    /// Edges belong to transactions, so this waits for any open one.
    pub async fn insert_edge_unchecked(&self, edge: HierarchyEdge) {
        let _writer = self.writer.lock().await;
        self.committed
            .write()
            .await
            .edges
            .insert((edge.parent_group_id, edge.member_group_id), edge);
    }
}

#[async_trait]
impl GroupStore for InMemoryGroupStore {
    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        Self::check_available(&self.unavailable)?;
        Ok(self.committed.read().await.live_group(group_id))
    }

    async fn fetch_direct_memberships(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<DirectMembership>, StoreError> {
        Self::check_available(&self.unavailable)?;
        Ok(self.committed.read().await.live_memberships(Some(user_id)))
    }

    async fn fetch_all_direct_memberships(&self) -> Result<Vec<DirectMembership>, StoreError> {
        Self::check_available(&self.unavailable)?;
        Ok(self.committed.read().await.live_memberships(None))
    }

    async fn fetch_hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>, StoreError> {
        Self::check_available(&self.unavailable)?;
        Ok(self.committed.read().await.live_edges())
    }

    async fn edge_exists(
        &self,
        parent_group_id: Uuid,
        member_group_id: Uuid,
    ) -> Result<bool, StoreError> {
        Self::check_available(&self.unavailable)?;
        Ok(self
            .committed
            .read()
            .await
            .find_edge(parent_group_id, member_group_id)
            .is_some())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Self::check_available(&self.unavailable)
    }

    async fn begin(&self) -> Result<Box<dyn GroupStoreTx>, StoreError> {
        Self::check_available(&self.unavailable)?;
        Ok(Box::new(InMemoryTx {
            committed: self.committed.clone(),
            writer: self.writer.clone(),
            guard: None,
            working: None,
            wrote: false,
            unavailable: self.unavailable.clone(),
            fail_point: self.fail_point.clone(),
        }))
    }
}

/// Working copy of the committed state, taken once the writer lock is held.
struct InMemoryTx {
    committed: Arc<RwLock<StoreState>>,
    writer: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    working: Option<StoreState>,
    wrote: bool,
    unavailable: Arc<AtomicBool>,
    fail_point: Arc<AtomicU8>,
}

impl InMemoryTx {
    fn armed(&self, point: FailPoint) -> bool {
        FailPoint::decode(self.fail_point.load(Ordering::SeqCst)) == Some(point)
    }

    /// Lazily snapshot committed state so a lock taken later sees fresh data.
    async fn state(&mut self) -> Result<&mut StoreState, StoreError> {
        InMemoryGroupStore::check_available(&self.unavailable)?;
        if self.wrote && self.armed(FailPoint::AfterWrite) {
            return Err(StoreError::Unavailable(
                "injected failure after write".to_string(),
            ));
        }
        if self.working.is_none() {
            self.working = Some(self.committed.read().await.clone());
        }
        self.working
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("transaction state missing".to_string()))
    }
}

#[async_trait]
impl GroupStoreTx for InMemoryTx {
    async fn lock_hierarchy(&mut self) -> Result<(), StoreError> {
        InMemoryGroupStore::check_available(&self.unavailable)?;
        if self.guard.is_none() {
            self.guard = Some(self.writer.clone().lock_owned().await);
            // Anything read before the lock may be stale.
            self.working = None;
        }
        Ok(())
    }

    async fn find_group(&mut self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        Ok(self.state().await?.live_group(group_id))
    }

    async fn fetch_all_direct_memberships(
        &mut self,
    ) -> Result<Vec<DirectMembership>, StoreError> {
        Ok(self.state().await?.live_memberships(None))
    }

    async fn fetch_hierarchy_edges(&mut self) -> Result<Vec<HierarchyEdge>, StoreError> {
        Ok(self.state().await?.live_edges())
    }

    async fn find_edge(
        &mut self,
        parent_group_id: Uuid,
        member_group_id: Uuid,
    ) -> Result<Option<HierarchyEdge>, StoreError> {
        Ok(self
            .state()
            .await?
            .find_edge(parent_group_id, member_group_id))
    }

    async fn insert_edge(&mut self, edge: &HierarchyEdge) -> Result<(), StoreError> {
        let state = self.state().await?;
        let key = (edge.parent_group_id, edge.member_group_id);
        if state.edges.contains_key(&key) {
            return Err(StoreError::UniqueViolation(format!(
                "edge {} <- {} already exists",
                edge.parent_group_id, edge.member_group_id
            )));
        }
        state.edges.insert(key, edge.clone());
        self.wrote = true;
        Ok(())
    }

    async fn update_edge_expiry(
        &mut self,
        edge_id: Uuid,
        expires_utc: Option<DateTime<Utc>>,
    ) -> Result<HierarchyEdge, StoreError> {
        let state = self.state().await?;
        let edge = state
            .edge_key(edge_id)
            .and_then(|key| state.edges.get_mut(&key))
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        edge.expires_utc = expires_utc;
        let updated = edge.clone();
        self.wrote = true;
        Ok(updated)
    }

    async fn delete_edge(&mut self, edge_id: Uuid) -> Result<(), StoreError> {
        let state = self.state().await?;
        if let Some(key) = state.edge_key(edge_id) {
            state.edges.remove(&key);
        }
        self.wrote = true;
        Ok(())
    }

    async fn delete_expired_edges(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let state = self.state().await?;
        let before = state.edges.len();
        state
            .edges
            .retain(|_, e| e.expires_utc.is_none_or(|expires| expires > cutoff));
        let removed = (before - state.edges.len()) as u64;
        self.wrote = true;
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        InMemoryGroupStore::check_available(&self.unavailable)?;
        if self.armed(FailPoint::Commit) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }
        let InMemoryTx {
            committed,
            guard,
            working,
            wrote,
            ..
        } = *self;
        if let (true, Some(working)) = (wrote, working) {
            committed.write().await.edges = working.edges;
        }
        drop(guard);
        debug!("In-memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        debug!("In-memory transaction rolled back");
        Ok(())
    }
}
