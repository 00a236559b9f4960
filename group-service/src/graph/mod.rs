//! Pure graph algorithms over a materialised group hierarchy.
//!
//! Nothing in this module touches storage. Callers load edges and direct
//! memberships, build a [`HierarchyGraph`] for one evaluation instant, and
//! run the enumerator, cycle detector, and differ against that value.

mod cycle;
mod diff;
mod enumerator;
mod hierarchy;

pub use cycle::{check_candidate_edge, CycleCheck};
pub use diff::{diff_snapshots, MembershipChange, MembershipDiff};
pub use enumerator::{
    enumerate_group_members, enumerate_memberships, users_seeded_at_or_below, AncestorCache,
    MembershipScope, MembershipSnapshot,
};
pub use hierarchy::{Direction, HierarchyGraph};
