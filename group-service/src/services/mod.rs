//! Services layer for group-service.
//!
//! Store adapters, event emitters, and the read and mutation services that
//! drive the pure graph algorithms.

mod database;
pub mod error;
mod events;
mod hierarchy;
mod memory_store;
mod membership;
pub mod metrics;
mod store;
mod sweeper;

pub use database::{PgGroupStore, HIERARCHY_LOCK_KEY};
pub use error::{HierarchyError, PublishError, StoreError};
pub use events::{EventEmitter, LogEventEmitter, RecordingEventEmitter, WebhookEventEmitter};
pub use hierarchy::{
    ChangeContext, ChangeKind, HierarchyChange, HierarchyChangeOutcome, HierarchyService,
};
pub use memory_store::{FailPoint, InMemoryGroupStore};
pub use membership::MembershipService;
pub use store::{GroupStore, GroupStoreTx};
pub use sweeper::spawn_expired_edge_sweeper;
