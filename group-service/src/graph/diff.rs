//! Membership diff between two snapshots.

use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::enumerator::MembershipSnapshot;
use crate::models::{MembershipAction, MembershipEvent};

/// A (user, group) pair that appeared or disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MembershipChange {
    pub user_id: Uuid,
    pub group_id: Uuid,
}

/// Result of diffing two snapshots, both sides sorted by (user, group).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipDiff {
    pub added: Vec<MembershipChange>,
    pub removed: Vec<MembershipChange>,
}

impl MembershipDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// One event per added or removed pair.
    pub fn to_events(&self, actor_id: Uuid, audit_id: Uuid) -> Vec<MembershipEvent> {
        let event = |action, change: &MembershipChange| MembershipEvent {
            action,
            group_id: change.group_id,
            user_id: change.user_id,
            actor_id,
            audit_id,
        };

        self.added
            .iter()
            .map(|change| event(MembershipAction::Create, change))
            .chain(
                self.removed
                    .iter()
                    .map(|change| event(MembershipAction::Delete, change)),
            )
            .collect()
    }
}

fn pairs(snapshot: &MembershipSnapshot) -> BTreeSet<MembershipChange> {
    snapshot
        .iter()
        .map(|m| MembershipChange {
            user_id: m.user_id,
            group_id: m.group_id,
        })
        .collect()
}

/// Pairs present only in `after` are added; pairs present only in `before`
/// are removed. Flag changes on a pair present in both are not reported.
pub fn diff_snapshots(before: &MembershipSnapshot, after: &MembershipSnapshot) -> MembershipDiff {
    let before = pairs(before);
    let after = pairs(after);

    MembershipDiff {
        added: after.difference(&before).copied().collect(),
        removed: before.difference(&after).copied().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EffectiveMembership;

    fn membership(user_id: Uuid, group_id: Uuid, direct: bool, is_admin: bool) -> EffectiveMembership {
        EffectiveMembership {
            user_id,
            group_id,
            direct,
            is_admin,
        }
    }

    #[test]
    fn single_addition() {
        let (u, g, h) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let before = MembershipSnapshot::from_memberships([membership(u, h, true, false)]);
        let after = MembershipSnapshot::from_memberships([
            membership(u, h, true, false),
            membership(u, g, false, false),
        ]);

        let diff = diff_snapshots(&before, &after);

        assert_eq!(diff.added, vec![MembershipChange { user_id: u, group_id: g }]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn removal_is_reported() {
        let (u, g) = (Uuid::new_v4(), Uuid::new_v4());
        let before = MembershipSnapshot::from_memberships([membership(u, g, false, false)]);

        let diff = diff_snapshots(&before, &MembershipSnapshot::default());

        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, vec![MembershipChange { user_id: u, group_id: g }]);
    }

    #[test]
    fn flag_only_changes_are_not_reported() {
        let (u, g) = (Uuid::new_v4(), Uuid::new_v4());
        let before = MembershipSnapshot::from_memberships([membership(u, g, false, false)]);
        let after = MembershipSnapshot::from_memberships([membership(u, g, true, true)]);

        assert!(diff_snapshots(&before, &after).is_empty());
    }

    #[test]
    fn identical_snapshots_yield_nothing() {
        let (u, g) = (Uuid::new_v4(), Uuid::new_v4());
        let snapshot = MembershipSnapshot::from_memberships([membership(u, g, true, false)]);
        assert!(diff_snapshots(&snapshot, &snapshot).is_empty());
    }

    #[test]
    fn events_carry_actor_and_audit() {
        let (u, g, h) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (actor, audit) = (Uuid::new_v4(), Uuid::new_v4());
        let diff = MembershipDiff {
            added: vec![MembershipChange { user_id: u, group_id: g }],
            removed: vec![MembershipChange { user_id: u, group_id: h }],
        };

        let events = diff.to_events(actor, audit);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, MembershipAction::Create);
        assert_eq!(events[0].group_id, g);
        assert_eq!(events[1].action, MembershipAction::Delete);
        assert_eq!(events[1].group_id, h);
        assert!(events.iter().all(|e| e.actor_id == actor && e.audit_id == audit));
    }
}
