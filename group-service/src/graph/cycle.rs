//! Cycle detection for candidate hierarchy edges.

use serde::Serialize;
use uuid::Uuid;

use super::hierarchy::{Direction, HierarchyGraph};

/// Verdict on a candidate `(parent, member)` edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum CycleCheck {
    Acyclic,
    SelfReference,
    /// `path` runs upward from the proposed parent to the proposed member.
    Cycle { path: Vec<Uuid> },
}

impl CycleCheck {
    pub fn would_create_cycle(&self) -> bool {
        !matches!(self, Self::Acyclic)
    }

    /// Group ids that would form the loop; empty when acyclic.
    pub fn path(&self) -> &[Uuid] {
        match self {
            Self::Cycle { path } => path,
            _ => &[],
        }
    }
}

/// Would making `member_group_id` a member of `parent_group_id` close a loop?
///
/// It does iff the parent is already a transitive member of the member.
/// `graph` must contain only live edges and must not contain the candidate.
pub fn check_candidate_edge(
    graph: &HierarchyGraph,
    parent_group_id: Uuid,
    member_group_id: Uuid,
) -> CycleCheck {
    if parent_group_id == member_group_id {
        return CycleCheck::SelfReference;
    }

    match graph.path(parent_group_id, member_group_id, Direction::Up) {
        Some(path) => CycleCheck::Cycle { path },
        None => CycleCheck::Acyclic,
    }
}
