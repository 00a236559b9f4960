//! Effective membership enumeration.
//!
//! Per-user and bulk enumeration share one code path: [`enumerate_memberships`]
//! parameterised by [`MembershipScope`]. Upward closures are memoised per seed
//! group, so bulk cost grows with users plus edges rather than their product.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::hierarchy::{Direction, HierarchyGraph};
use crate::models::{DirectMembership, EffectiveMembership};

/// Which users an enumeration covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipScope {
    User(Uuid),
    Users(BTreeSet<Uuid>),
    All,
}

impl MembershipScope {
    pub fn includes(&self, user_id: &Uuid) -> bool {
        match self {
            Self::User(id) => id == user_id,
            Self::Users(ids) => ids.contains(user_id),
            Self::All => true,
        }
    }
}

/// Memoised upward closures keyed by arena index.
pub struct AncestorCache<'g> {
    graph: &'g HierarchyGraph,
    memo: Vec<Option<Vec<usize>>>,
}

impl<'g> AncestorCache<'g> {
    pub fn new(graph: &'g HierarchyGraph) -> Self {
        Self {
            graph,
            memo: vec![None; graph.group_count()],
        }
    }

    /// Every node reachable upward from `node`, computed at most once.
    pub fn ancestors(&mut self, node: usize) -> &[usize] {
        if self.memo[node].is_none() {
            let reached = self.graph.reachable_nodes(node, Direction::Up);
            self.memo[node] = Some(reached);
        }
        self.memo[node].as_deref().unwrap_or_default()
    }

    /// Number of closures computed so far.
    pub fn computed(&self) -> usize {
        self.memo.iter().filter(|entry| entry.is_some()).count()
    }
}

/// Effective memberships keyed by user, then group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSnapshot {
    by_user: BTreeMap<Uuid, BTreeMap<Uuid, EffectiveMembership>>,
}

impl MembershipSnapshot {
    /// Build a snapshot from loose rows. A direct row wins over an indirect one.
    pub fn from_memberships<I>(memberships: I) -> Self
    where
        I: IntoIterator<Item = EffectiveMembership>,
    {
        let mut snapshot = Self::default();
        for membership in memberships {
            snapshot.merge(membership);
        }
        snapshot
    }

    fn merge(&mut self, membership: EffectiveMembership) {
        self.by_user
            .entry(membership.user_id)
            .or_default()
            .entry(membership.group_id)
            .and_modify(|existing| {
                existing.direct |= membership.direct;
                existing.is_admin |= membership.is_admin;
            })
            .or_insert(membership);
    }

    /// Memberships of one user, sorted by group id.
    pub fn memberships_for(&self, user_id: Uuid) -> Vec<EffectiveMembership> {
        self.by_user
            .get(&user_id)
            .map(|groups| groups.values().copied().collect())
            .unwrap_or_default()
    }

    /// Users holding an effective membership in `group_id`, sorted by user id.
    pub fn members_of(&self, group_id: Uuid) -> Vec<EffectiveMembership> {
        self.by_user
            .values()
            .filter_map(|groups| groups.get(&group_id).copied())
            .collect()
    }

    pub fn get(&self, user_id: Uuid, group_id: Uuid) -> Option<&EffectiveMembership> {
        self.by_user.get(&user_id)?.get(&group_id)
    }

    pub fn contains(&self, user_id: Uuid, group_id: Uuid) -> bool {
        self.get(user_id, group_id).is_some()
    }

    pub fn users(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.by_user.keys().copied()
    }

    /// Every membership, ordered by (user, group).
    pub fn iter(&self) -> impl Iterator<Item = &EffectiveMembership> + '_ {
        self.by_user.values().flat_map(|groups| groups.values())
    }

    /// Total number of (user, group) pairs.
    pub fn len(&self) -> usize {
        self.by_user.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute effective memberships for every user in `scope` at instant `now`.
///
/// `graph` must have been built for the same `now`. Direct rows for groups
/// outside the graph still count; they simply have no ancestors.
pub fn enumerate_memberships(
    direct: &[DirectMembership],
    graph: &HierarchyGraph,
    scope: &MembershipScope,
    now: DateTime<Utc>,
) -> MembershipSnapshot {
    let mut seeds_by_user: BTreeMap<Uuid, Vec<&DirectMembership>> = BTreeMap::new();
    for row in direct.iter().filter(|row| scope.includes(&row.user_id)) {
        seeds_by_user.entry(row.user_id).or_default().push(row);
    }

    let mut cache = AncestorCache::new(graph);
    let mut snapshot = MembershipSnapshot::default();

    for (user_id, seeds) in seeds_by_user {
        let groups = snapshot.by_user.entry(user_id).or_default();

        // Seeds first so that direct wins.
        for seed in &seeds {
            let is_admin = seed.is_admin_at(now);
            groups
                .entry(seed.group_id)
                .and_modify(|existing| existing.is_admin |= is_admin)
                .or_insert(EffectiveMembership {
                    user_id,
                    group_id: seed.group_id,
                    direct: true,
                    is_admin,
                });
        }

        for seed in &seeds {
            let Some(node) = graph.node(seed.group_id) else {
                continue;
            };
            for &ancestor in cache.ancestors(node) {
                let group_id = graph.group_id(ancestor);
                groups.entry(group_id).or_insert(EffectiveMembership {
                    user_id,
                    group_id,
                    direct: false,
                    is_admin: false,
                });
            }
        }
    }

    snapshot
}

/// Users with a direct membership in `group_id` or any group nested inside it.
///
/// These are exactly the users whose effective membership can change when an
/// edge with `group_id` as its member end is added or removed.
pub fn users_seeded_at_or_below(
    direct: &[DirectMembership],
    graph: &HierarchyGraph,
    group_id: Uuid,
) -> BTreeSet<Uuid> {
    let mut groups: BTreeSet<Uuid> = graph.descendants(group_id).into_iter().collect();
    groups.insert(group_id);

    direct
        .iter()
        .filter(|row| groups.contains(&row.group_id))
        .map(|row| row.user_id)
        .collect()
}

/// Every user whose effective membership contains `group_id`.
pub fn enumerate_group_members(
    direct: &[DirectMembership],
    graph: &HierarchyGraph,
    group_id: Uuid,
    now: DateTime<Utc>,
) -> Vec<EffectiveMembership> {
    let users = users_seeded_at_or_below(direct, graph, group_id);
    if users.is_empty() {
        return Vec::new();
    }
    enumerate_memberships(direct, graph, &MembershipScope::Users(users), now).members_of(group_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HierarchyEdge;
    use chrono::Duration;

    struct Groups {
        a: Uuid,
        b: Uuid,
        c: Uuid,
    }

    fn groups() -> Groups {
        Groups {
            a: Uuid::new_v4(),
            b: Uuid::new_v4(),
            c: Uuid::new_v4(),
        }
    }

    fn flags(memberships: &[EffectiveMembership], group_id: Uuid) -> Option<(bool, bool)> {
        memberships
            .iter()
            .find(|m| m.group_id == group_id)
            .map(|m| (m.direct, m.is_admin))
    }

    #[test]
    fn chain_yields_direct_then_indirect() {
        let g = groups();
        let user = Uuid::new_v4();
        let now = Utc::now();
        // A in B, B in C
        let graph = HierarchyGraph::from_pairs([(g.b, g.a), (g.c, g.b)]);
        let direct = vec![DirectMembership::member(user, g.a)];

        let result = enumerate_memberships(&direct, &graph, &MembershipScope::User(user), now)
            .memberships_for(user);

        assert_eq!(result.len(), 3);
        assert_eq!(flags(&result, g.a), Some((true, false)));
        assert_eq!(flags(&result, g.b), Some((false, false)));
        assert_eq!(flags(&result, g.c), Some((false, false)));
    }

    #[test]
    fn expired_edge_cuts_the_path() {
        let g = groups();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let edges = vec![
            HierarchyEdge::new(g.b, g.a, None),
            HierarchyEdge::new(g.c, g.b, Some(now - Duration::minutes(5))),
        ];
        let graph = HierarchyGraph::from_edges(&edges, now);
        let direct = vec![DirectMembership::member(user, g.a)];

        let result = enumerate_memberships(&direct, &graph, &MembershipScope::User(user), now)
            .memberships_for(user);

        let groups: Vec<Uuid> = result.iter().map(|m| m.group_id).collect();
        assert!(groups.contains(&g.a));
        assert!(groups.contains(&g.b));
        assert!(!groups.contains(&g.c));
    }

    #[test]
    fn direct_wins_over_indirect() {
        let g = groups();
        let user = Uuid::new_v4();
        let graph = HierarchyGraph::from_pairs([(g.b, g.a)]);
        let direct = vec![
            DirectMembership::member(user, g.a),
            DirectMembership::member(user, g.b),
        ];

        let result = enumerate_memberships(&direct, &graph, &MembershipScope::All, Utc::now())
            .memberships_for(user);

        assert_eq!(result.len(), 2);
        assert_eq!(flags(&result, g.b), Some((true, false)));
    }

    #[test]
    fn admin_does_not_propagate_upward() {
        let g = groups();
        let user = Uuid::new_v4();
        let graph = HierarchyGraph::from_pairs([(g.b, g.a)]);
        let direct = vec![DirectMembership::admin(user, g.a, None)];

        let result = enumerate_memberships(&direct, &graph, &MembershipScope::All, Utc::now())
            .memberships_for(user);

        assert_eq!(flags(&result, g.a), Some((true, true)));
        assert_eq!(flags(&result, g.b), Some((false, false)));
    }

    #[test]
    fn expired_admin_is_plain_member() {
        let g = groups();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let direct = vec![DirectMembership::admin(user, g.a, Some(now - Duration::seconds(1)))];

        let result = enumerate_memberships(
            &direct,
            &HierarchyGraph::default(),
            &MembershipScope::User(user),
            now,
        )
        .memberships_for(user);

        assert_eq!(flags(&result, g.a), Some((true, false)));
    }

    #[test]
    fn user_without_memberships_is_empty() {
        let g = groups();
        let direct = vec![DirectMembership::member(Uuid::new_v4(), g.a)];
        let stranger = Uuid::new_v4();

        let snapshot =
            enumerate_memberships(&direct, &HierarchyGraph::default(), &MembershipScope::User(stranger), Utc::now());

        assert!(snapshot.memberships_for(stranger).is_empty());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn bulk_matches_per_user() {
        let g = groups();
        let now = Utc::now();
        let graph = HierarchyGraph::from_pairs([(g.b, g.a), (g.c, g.b)]);
        let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let direct = vec![
            DirectMembership::member(users[0], g.a),
            DirectMembership::admin(users[1], g.b, None),
            DirectMembership::member(users[2], g.c),
            DirectMembership::member(users[3], g.a),
            DirectMembership::member(users[3], g.c),
        ];

        let bulk = enumerate_memberships(&direct, &graph, &MembershipScope::All, now);
        for user in &users {
            let single = enumerate_memberships(&direct, &graph, &MembershipScope::User(*user), now);
            assert_eq!(bulk.memberships_for(*user), single.memberships_for(*user));
        }
    }

    #[test]
    fn enumeration_is_idempotent() {
        let g = groups();
        let now = Utc::now();
        let graph = HierarchyGraph::from_pairs([(g.b, g.a), (g.c, g.a)]);
        let direct = vec![DirectMembership::member(Uuid::new_v4(), g.a)];

        let first = enumerate_memberships(&direct, &graph, &MembershipScope::All, now);
        let second = enumerate_memberships(&direct, &graph, &MembershipScope::All, now);

        assert_eq!(first, second);
    }

    #[test]
    fn ancestor_closure_is_computed_once_per_seed_group() {
        let g = groups();
        let graph = HierarchyGraph::from_pairs([(g.b, g.a), (g.c, g.b)]);
        let node = graph.node(g.a).unwrap_or_default();
        let mut cache = AncestorCache::new(&graph);

        let first = cache.ancestors(node).len();
        let second = cache.ancestors(node).len();

        assert_eq!(first, 2);
        assert_eq!(second, 2);
        assert_eq!(cache.computed(), 1);
    }

    #[test]
    fn group_members_include_nested_users() {
        let g = groups();
        let now = Utc::now();
        let graph = HierarchyGraph::from_pairs([(g.b, g.a), (g.c, g.b)]);
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let direct = vec![
            DirectMembership::member(alice, g.a),
            DirectMembership::admin(bob, g.b, None),
            DirectMembership::member(carol, g.c),
        ];

        let members = enumerate_group_members(&direct, &graph, g.b, now);

        let users: BTreeSet<Uuid> = members.iter().map(|m| m.user_id).collect();
        assert_eq!(users, BTreeSet::from([alice, bob]));
        let bob_row = members.iter().find(|m| m.user_id == bob);
        assert_eq!(bob_row.map(|m| (m.direct, m.is_admin)), Some((true, true)));
    }

    #[test]
    fn affected_users_cover_member_subtree_only() {
        let g = groups();
        let graph = HierarchyGraph::from_pairs([(g.b, g.a)]);
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let direct = vec![
            DirectMembership::member(alice, g.a),
            DirectMembership::member(bob, g.b),
            DirectMembership::member(carol, g.c),
        ];

        let affected = users_seeded_at_or_below(&direct, &graph, g.b);

        assert_eq!(affected, BTreeSet::from([alice, bob]));
    }
}
