//! PostgreSQL-backed [`GroupStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{PgExecutor, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::StoreError;
use super::metrics::DB_QUERY_DURATION;
use super::store::{GroupStore, GroupStoreTx};
use crate::models::{DirectMembership, Group, HierarchyEdge};

/// Key for `pg_advisory_xact_lock`; shared by every hierarchy mutation.
pub const HIERARCHY_LOCK_KEY: i64 = 0x6772_6f75_7068_6965;

const GROUP_COLUMNS: &str =
    "group_id, group_slug, group_label, approver_group_id, deleted_utc, created_utc";

const LIVE_MEMBERSHIPS: &str = r#"
    SELECT m.user_id, m.group_id, m.admin_flag, m.admin_expires_utc
    FROM group_memberships m
    JOIN groups g ON g.group_id = m.group_id
    WHERE g.deleted_utc IS NULL
"#;

const LIVE_EDGES: &str = r#"
    SELECT e.edge_id, e.parent_group_id, e.member_group_id, e.expires_utc, e.created_utc
    FROM group_hierarchy_edges e
    JOIN groups p ON p.group_id = e.parent_group_id
    JOIN groups m ON m.group_id = e.member_group_id
    WHERE p.deleted_utc IS NULL AND m.deleted_utc IS NULL
"#;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgGroupStore {
    pool: PgPool,
}

impl PgGroupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn select_group<'e, E>(executor: E, group_id: Uuid) -> Result<Option<Group>, StoreError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["find_group"])
        .start_timer();

    let sql = format!(
        "SELECT {GROUP_COLUMNS} FROM groups WHERE group_id = $1 AND deleted_utc IS NULL"
    );
    let group = sqlx::query_as::<_, Group>(&sql)
        .bind(group_id)
        .fetch_optional(executor)
        .await?;

    timer.observe_duration();
    Ok(group)
}

async fn select_memberships<'e, E>(
    executor: E,
    user_id: Option<Uuid>,
) -> Result<Vec<DirectMembership>, StoreError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["fetch_direct_memberships"])
        .start_timer();

    let sql = format!(
        "{LIVE_MEMBERSHIPS} AND ($1::uuid IS NULL OR m.user_id = $1) ORDER BY m.user_id, m.group_id"
    );
    let rows = sqlx::query_as::<_, DirectMembership>(&sql)
        .bind(user_id)
        .fetch_all(executor)
        .await?;

    timer.observe_duration();
    Ok(rows)
}

async fn select_edges<'e, E>(executor: E) -> Result<Vec<HierarchyEdge>, StoreError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["fetch_hierarchy_edges"])
        .start_timer();

    let sql = format!("{LIVE_EDGES} ORDER BY e.parent_group_id, e.member_group_id");
    let edges = sqlx::query_as::<_, HierarchyEdge>(&sql)
        .fetch_all(executor)
        .await?;

    timer.observe_duration();
    Ok(edges)
}

async fn select_edge<'e, E>(
    executor: E,
    parent_group_id: Uuid,
    member_group_id: Uuid,
) -> Result<Option<HierarchyEdge>, StoreError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["find_edge"])
        .start_timer();

    let sql = format!("{LIVE_EDGES} AND e.parent_group_id = $1 AND e.member_group_id = $2");
    let edge = sqlx::query_as::<_, HierarchyEdge>(&sql)
        .bind(parent_group_id)
        .bind(member_group_id)
        .fetch_optional(executor)
        .await?;

    timer.observe_duration();
    Ok(edge)
}

#[async_trait]
impl GroupStore for PgGroupStore {
    #[instrument(skip(self))]
    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        select_group(&self.pool, group_id).await
    }

    #[instrument(skip(self))]
    async fn fetch_direct_memberships(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<DirectMembership>, StoreError> {
        select_memberships(&self.pool, Some(user_id)).await
    }

    #[instrument(skip(self))]
    async fn fetch_all_direct_memberships(&self) -> Result<Vec<DirectMembership>, StoreError> {
        select_memberships(&self.pool, None).await
    }

    #[instrument(skip(self))]
    async fn fetch_hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>, StoreError> {
        select_edges(&self.pool).await
    }

    #[instrument(skip(self))]
    async fn edge_exists(
        &self,
        parent_group_id: Uuid,
        member_group_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(select_edge(&self.pool, parent_group_id, member_group_id)
            .await?
            .is_some())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn GroupStoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgGroupStoreTx { tx }))
    }
}

/// One `sqlx` transaction. Dropping it rolls back.
pub struct PgGroupStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl GroupStoreTx for PgGroupStoreTx {
    #[instrument(skip(self))]
    async fn lock_hierarchy(&mut self) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_hierarchy"])
            .start_timer();

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(HIERARCHY_LOCK_KEY)
            .execute(&mut *self.tx)
            .await?;

        timer.observe_duration();
        debug!("Hierarchy lock acquired");
        Ok(())
    }

    async fn find_group(&mut self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        select_group(&mut *self.tx, group_id).await
    }

    async fn fetch_all_direct_memberships(
        &mut self,
    ) -> Result<Vec<DirectMembership>, StoreError> {
        select_memberships(&mut *self.tx, None).await
    }

    async fn fetch_hierarchy_edges(&mut self) -> Result<Vec<HierarchyEdge>, StoreError> {
        select_edges(&mut *self.tx).await
    }

    async fn find_edge(
        &mut self,
        parent_group_id: Uuid,
        member_group_id: Uuid,
    ) -> Result<Option<HierarchyEdge>, StoreError> {
        select_edge(&mut *self.tx, parent_group_id, member_group_id).await
    }

    #[instrument(skip(self, edge), fields(edge_id = %edge.edge_id))]
    async fn insert_edge(&mut self, edge: &HierarchyEdge) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_edge"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO group_hierarchy_edges (edge_id, parent_group_id, member_group_id, expires_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(edge.edge_id)
        .bind(edge.parent_group_id)
        .bind(edge.member_group_id)
        .bind(edge.expires_utc)
        .bind(edge.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_edge_expiry(
        &mut self,
        edge_id: Uuid,
        expires_utc: Option<DateTime<Utc>>,
    ) -> Result<HierarchyEdge, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_edge_expiry"])
            .start_timer();

        let edge = sqlx::query_as::<_, HierarchyEdge>(
            r#"
            UPDATE group_hierarchy_edges
            SET expires_utc = $2
            WHERE edge_id = $1
            RETURNING edge_id, parent_group_id, member_group_id, expires_utc, created_utc
            "#,
        )
        .bind(edge_id)
        .bind(expires_utc)
        .fetch_one(&mut *self.tx)
        .await?;

        timer.observe_duration();
        Ok(edge)
    }

    #[instrument(skip(self))]
    async fn delete_edge(&mut self, edge_id: Uuid) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_edge"])
            .start_timer();

        sqlx::query("DELETE FROM group_hierarchy_edges WHERE edge_id = $1")
            .bind(edge_id)
            .execute(&mut *self.tx)
            .await?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_expired_edges(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM group_hierarchy_edges WHERE expires_utc IS NOT NULL AND expires_utc <= $1",
        )
        .bind(cutoff)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
