//! Arena-backed adjacency structure for the live group hierarchy.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::models::HierarchyEdge;

/// Traversal direction through the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// member → parent: the groups a group belongs to.
    Up,
    /// parent → member: the groups nested inside a group.
    Down,
}

/// Group-id-indexed arena of hierarchy nodes.
///
/// Nodes are dense `usize` indices; `parents[i]` and `children[i]` hold the
/// neighbours of node `i`. Only live edges are ever added, so every traversal
/// over this value already excludes expired edges.
#[derive(Debug, Clone, Default)]
pub struct HierarchyGraph {
    index: HashMap<Uuid, usize>,
    groups: Vec<Uuid>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    edge_count: usize,
}

impl HierarchyGraph {
    /// Materialise the edges that are live at `now`.
    pub fn from_edges<'a, I>(edges: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a HierarchyEdge>,
    {
        let mut graph = Self::default();
        for edge in edges.into_iter().filter(|edge| edge.is_live_at(now)) {
            graph.add_edge(edge.parent_group_id, edge.member_group_id);
        }
        graph
    }

    /// Build from `(parent, member)` pairs, all treated as live.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Uuid, Uuid)>,
    {
        let mut graph = Self::default();
        for (parent, member) in pairs {
            graph.add_edge(parent, member);
        }
        graph
    }

    fn intern(&mut self, group_id: Uuid) -> usize {
        if let Some(&node) = self.index.get(&group_id) {
            return node;
        }
        let node = self.groups.len();
        self.groups.push(group_id);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        self.index.insert(group_id, node);
        node
    }

    fn add_edge(&mut self, parent_group_id: Uuid, member_group_id: Uuid) {
        let parent = self.intern(parent_group_id);
        let member = self.intern(member_group_id);
        if self.parents[member].contains(&parent) {
            return;
        }
        self.parents[member].push(parent);
        self.children[parent].push(member);
        self.edge_count += 1;
    }

    /// Arena index of a group, if it takes part in any live edge.
    pub fn node(&self, group_id: Uuid) -> Option<usize> {
        self.index.get(&group_id).copied()
    }

    /// Group id stored at an arena index.
    ///
    /// # Panics
    /// If `node` did not come from this graph.
    pub fn group_id(&self, node: usize) -> Uuid {
        self.groups[node]
    }

    pub fn contains(&self, group_id: Uuid) -> bool {
        self.index.contains_key(&group_id)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    fn neighbours(&self, node: usize, direction: Direction) -> &[usize] {
        match direction {
            Direction::Up => &self.parents[node],
            Direction::Down => &self.children[node],
        }
    }

    /// Breadth-first walk from `start`, returning every other node reached.
    ///
    /// Each node is visited at most once, so a cyclic graph terminates.
    pub fn reachable_nodes(&self, start: usize, direction: Direction) -> Vec<usize> {
        let mut visited = vec![false; self.groups.len()];
        visited[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut reached = Vec::new();

        while let Some(node) = queue.pop_front() {
            for &next in self.neighbours(node, direction) {
                if !visited[next] {
                    visited[next] = true;
                    reached.push(next);
                    queue.push_back(next);
                }
            }
        }

        reached
    }

    fn reachable_groups(&self, group_id: Uuid, direction: Direction) -> Vec<Uuid> {
        let Some(start) = self.node(group_id) else {
            return Vec::new();
        };
        let mut groups: Vec<Uuid> = self
            .reachable_nodes(start, direction)
            .into_iter()
            .filter(|&node| node != start)
            .map(|node| self.groups[node])
            .collect();
        groups.sort();
        groups
    }

    /// Every group `group_id` is transitively nested in, sorted by id.
    pub fn ancestors(&self, group_id: Uuid) -> Vec<Uuid> {
        self.reachable_groups(group_id, Direction::Up)
    }

    /// Every group transitively nested inside `group_id`, sorted by id.
    pub fn descendants(&self, group_id: Uuid) -> Vec<Uuid> {
        self.reachable_groups(group_id, Direction::Down)
    }

    /// Shortest path from `from` to `to` walking in `direction`, both ends included.
    pub fn path(&self, from: Uuid, to: Uuid, direction: Direction) -> Option<Vec<Uuid>> {
        let start = self.node(from)?;
        let goal = self.node(to)?;
        if start == goal {
            return Some(vec![from]);
        }

        let mut previous: Vec<Option<usize>> = vec![None; self.groups.len()];
        let mut visited = vec![false; self.groups.len()];
        visited[start] = true;
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for &next in self.neighbours(node, direction) {
                if visited[next] {
                    continue;
                }
                visited[next] = true;
                previous[next] = Some(node);
                if next == goal {
                    return Some(self.unwind(&previous, goal));
                }
                queue.push_back(next);
            }
        }

        None
    }

    fn unwind(&self, previous: &[Option<usize>], goal: usize) -> Vec<Uuid> {
        let mut path = vec![self.groups[goal]];
        let mut current = goal;
        while let Some(node) = previous[current] {
            path.push(self.groups[node]);
            current = node;
        }
        path.reverse();
        path
    }

    /// True when the graph contains a directed cycle (Kahn's algorithm).
    pub fn has_cycle(&self) -> bool {
        let mut in_degree: Vec<usize> = self.parents.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(node, _)| node)
            .collect();
        let mut removed = 0;

        while let Some(node) = queue.pop_front() {
            removed += 1;
            for &child in &self.children[node] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    queue.push_back(child);
                }
            }
        }

        removed != self.groups.len()
    }
}
