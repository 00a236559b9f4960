//! Domain models for group-service.

mod event;
mod group;
mod hierarchy_edge;
mod membership;

pub use event::{MembershipAction, MembershipEvent};
pub use group::Group;
pub use hierarchy_edge::HierarchyEdge;
pub use membership::{DirectMembership, EffectiveMembership};
