//! Single-level searches over any [`GraphView`].
//!
//! Best-known distances and back-pointers live in a scratch overlay owned by
//! each call, so searches only need shared access to the graph and can run in
//! parallel over the same arena.
//!
//! Ephemeral query nodes other than the goal are never expanded through.
//!
//! None of the searches special-case `start == end`; they report
//! [`SearchResult::NoPath`] and callers handle the trivial route themselves.
//! BFS and DFS stop in frontier order and report the weighted length of the
//! path they discovered, which is not necessarily the shortest.

use log::warn;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use super::distance::{distance, DistanceKind};
use super::models::{NodeIdx, Position, Shape};
use super::node::{GraphView, PathNode};

/// Restricts which nodes a search may enter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SearchScope {
    Everywhere,
    /// Nodes of one level whose position lies in a cluster box.
    Region { level: usize, origin: Position, shape: Shape },
}

impl SearchScope {
    pub fn admits(&self, node: &PathNode) -> bool {
        match *self {
            SearchScope::Everywhere => true,
            SearchScope::Region { level, origin, shape } => {
                node.level == level && shape.contains(origin, node.position)
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SearchOptions {
    pub distance: DistanceKind,
    /// Return every visited node instead of the path.
    pub collect_visited: bool,
    /// Travel speed for direction-dependent edge costs (speed-aware A*).
    pub speed: Option<f64>,
    /// Give up after this many expansions.
    pub max_expansions: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { distance: DistanceKind::Diagonal, collect_visited: false, speed: None, max_expansions: None }
    }
}

impl SearchOptions {
    pub fn with_distance(distance: DistanceKind) -> Self {
        Self { distance, ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SearchResult {
    /// Ordered start -> end, with the accumulated edge cost.
    Path { nodes: Vec<NodeIdx>, cost: f64 },
    /// Every node taken off the frontier, sorted by index.
    Visited(Vec<NodeIdx>),
    NoPath,
}

impl SearchResult {
    pub fn is_found(&self) -> bool {
        matches!(self, SearchResult::Path { .. })
    }

    pub fn path(&self) -> Option<&[NodeIdx]> {
        match self {
            SearchResult::Path { nodes, .. } => Some(nodes),
            _ => None,
        }
    }

    pub fn cost(&self) -> Option<f64> {
        match self {
            SearchResult::Path { cost, .. } => Some(*cost),
            _ => None,
        }
    }

    pub fn into_path(self) -> Option<(Vec<NodeIdx>, f64)> {
        match self {
            SearchResult::Path { nodes, cost } => Some((nodes, cost)),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Scratch {
    distance: HashMap<NodeIdx, f64>,
    came_from: HashMap<NodeIdx, NodeIdx>,
}

impl Scratch {
    fn best(&self, n: NodeIdx) -> f64 {
        self.distance.get(&n).copied().unwrap_or(f64::INFINITY)
    }

    fn reconstruct(&self, end: NodeIdx) -> Vec<NodeIdx> {
        let mut path = vec![end];
        let mut cur = end;
        while let Some(&prev) = self.came_from.get(&cur) {
            cur = prev;
            path.push(cur);
        }
        path.reverse();
        path
    }

    fn finish(self, end: NodeIdx, reached: bool, visited: HashSet<NodeIdx>, opts: &SearchOptions) -> SearchResult {
        if opts.collect_visited {
            let mut v: Vec<NodeIdx> = visited.into_iter().collect();
            v.sort_unstable();
            return SearchResult::Visited(v);
        }
        if reached {
            let cost = self.best(end);
            SearchResult::Path { nodes: self.reconstruct(end), cost }
        } else {
            SearchResult::NoPath
        }
    }
}

/// Min-heap entry; equal priorities are served in insertion order.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Entry {
    pub(crate) priority: f64,
    pub(crate) seq: u64,
    pub(crate) cost: f64,
    pub(crate) node: NodeIdx,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

#[derive(Clone, Debug, Default)]
pub(crate) struct Frontier {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

impl Frontier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, node: NodeIdx, cost: f64, priority: f64) {
        self.seq += 1;
        self.heap.push(Entry { priority, seq: self.seq, cost, node });
    }

    pub(crate) fn pop(&mut self) -> Option<Entry> {
        self.heap.pop()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Whether a search may step onto `next`. Ephemeral query nodes are only
/// ever entered as the goal.
fn enterable(next_idx: NodeIdx, next: &PathNode, end: NodeIdx, scope: &SearchScope) -> bool {
    next.walkable && scope.admits(next) && (!next.ephemeral || next_idx == end)
}

fn endpoints_usable<G: GraphView>(graph: &G, start: NodeIdx, end: NodeIdx, scope: &SearchScope) -> bool {
    let (s, e) = (graph.node(start), graph.node(end));
    start != end && s.walkable && e.walkable && scope.admits(s) && scope.admits(e)
}

fn over_budget(expansions: usize, opts: &SearchOptions, start: NodeIdx, end: NodeIdx) -> bool {
    match opts.max_expansions {
        Some(limit) if expansions > limit => {
            warn!("search {:?} -> {:?} exceeded {} expansions", start, end, limit);
            true
        }
        _ => false,
    }
}

/// A* dispatching to the speed-aware variant when `opts.speed` is set.
pub fn astar<G: GraphView>(
    graph: &G,
    start: NodeIdx,
    end: NodeIdx,
    scope: &SearchScope,
    opts: &SearchOptions,
) -> SearchResult {
    if !endpoints_usable(graph, start, end, scope) {
        return SearchResult::NoPath;
    }
    match opts.speed {
        Some(speed) => astar_with_speed(graph, start, end, scope, opts, speed),
        None => astar_plain(graph, start, end, scope, opts),
    }
}

fn astar_plain<G: GraphView>(
    graph: &G,
    start: NodeIdx,
    end: NodeIdx,
    scope: &SearchScope,
    opts: &SearchOptions,
) -> SearchResult {
    let goal = graph.node(end).position;
    let h = |n: NodeIdx| distance(graph.node(n).position, goal, opts.distance);

    let mut scratch = Scratch::default();
    let mut closed: HashSet<NodeIdx> = HashSet::new();
    let mut frontier = Frontier::new();
    scratch.distance.insert(start, 0.0);
    frontier.push(start, 0.0, h(start));

    let mut reached = false;
    let mut expansions = 0usize;
    while let Some(Entry { node, .. }) = frontier.pop() {
        if !closed.insert(node) {
            continue;
        }
        if node == end {
            reached = true;
            break;
        }
        expansions += 1;
        if over_budget(expansions, opts, start, end) {
            break;
        }
        let g = scratch.best(node);
        for (n, e) in graph.neighbors(node) {
            if closed.contains(&n) {
                continue;
            }
            let edge = graph.edge(e);
            let next = graph.node(n);
            if !edge.walkable || !enterable(n, next, end, scope) {
                continue;
            }
            let candidate = g + edge.length;
            if candidate < scratch.best(n) {
                scratch.distance.insert(n, candidate);
                scratch.came_from.insert(n, node);
                frontier.push(n, candidate, candidate + h(n));
            }
        }
    }
    scratch.finish(end, reached, closed, opts)
}

/// Edge cost is `effective_length(neighbor, speed)`; impassable edges are skipped
/// and settled nodes are reopened when a strictly cheaper parent shows up.
fn astar_with_speed<G: GraphView>(
    graph: &G,
    start: NodeIdx,
    end: NodeIdx,
    scope: &SearchScope,
    opts: &SearchOptions,
    speed: f64,
) -> SearchResult {
    let goal = graph.node(end).position;
    let h = |n: NodeIdx| {
        if speed > 0.0 {
            distance(graph.node(n).position, goal, opts.distance) / speed
        } else {
            0.0
        }
    };

    let mut scratch = Scratch::default();
    let mut visited: HashSet<NodeIdx> = HashSet::new();
    let mut frontier = Frontier::new();
    scratch.distance.insert(start, 0.0);
    frontier.push(start, 0.0, h(start));

    let mut reached = false;
    let mut expansions = 0usize;
    while let Some(Entry { node, cost, .. }) = frontier.pop() {
        if cost > scratch.best(node) {
            continue;
        }
        visited.insert(node);
        if node == end {
            reached = true;
            break;
        }
        expansions += 1;
        if over_budget(expansions, opts, start, end) {
            break;
        }
        for (n, e) in graph.neighbors(node) {
            let edge = graph.edge(e);
            let next = graph.node(n);
            if !edge.walkable || !enterable(n, next, end, scope) {
                continue;
            }
            let step = edge.effective_length(n, speed);
            if !step.is_finite() {
                continue;
            }
            let candidate = cost + step;
            if candidate < scratch.best(n) {
                scratch.distance.insert(n, candidate);
                scratch.came_from.insert(n, node);
                visited.remove(&n);
                frontier.push(n, candidate, candidate + h(n));
            }
        }
    }
    scratch.finish(end, reached, visited, opts)
}

enum Order {
    Fifo,
    Lifo,
}

fn uninformed<G: GraphView>(
    graph: &G,
    start: NodeIdx,
    end: NodeIdx,
    scope: &SearchScope,
    opts: &SearchOptions,
    order: Order,
) -> SearchResult {
    if !endpoints_usable(graph, start, end, scope) {
        return SearchResult::NoPath;
    }
    let mut scratch = Scratch::default();
    let mut discovered: HashSet<NodeIdx> = HashSet::from([start]);
    let mut visited: HashSet<NodeIdx> = HashSet::new();
    let mut frontier: VecDeque<NodeIdx> = VecDeque::from([start]);
    scratch.distance.insert(start, 0.0);

    let mut reached = false;
    let mut expansions = 0usize;
    loop {
        let next = match order {
            Order::Fifo => frontier.pop_front(),
            Order::Lifo => frontier.pop_back(),
        };
        let Some(node) = next else { break };
        visited.insert(node);
        if node == end {
            reached = true;
            break;
        }
        expansions += 1;
        if over_budget(expansions, opts, start, end) {
            break;
        }
        let g = scratch.best(node);
        for (n, e) in graph.neighbors(node) {
            let edge = graph.edge(e);
            let next = graph.node(n);
            if !edge.walkable || !enterable(n, next, end, scope) {
                continue;
            }
            if discovered.insert(n) {
                scratch.distance.insert(n, g + edge.length);
                scratch.came_from.insert(n, node);
                frontier.push_back(n);
            }
        }
    }
    scratch.finish(end, reached, visited, opts)
}

pub fn bfs<G: GraphView>(
    graph: &G,
    start: NodeIdx,
    end: NodeIdx,
    scope: &SearchScope,
    opts: &SearchOptions,
) -> SearchResult {
    uninformed(graph, start, end, scope, opts, Order::Fifo)
}

pub fn dfs<G: GraphView>(
    graph: &G,
    start: NodeIdx,
    end: NodeIdx,
    scope: &SearchScope,
    opts: &SearchOptions,
) -> SearchResult {
    uninformed(graph, start, end, scope, opts, Order::Lifo)
}

/// Sum of edge lengths along consecutive nodes; `None` if a hop has no edge.
pub fn path_length<G: GraphView>(graph: &G, nodes: &[NodeIdx]) -> Option<f64> {
    nodes
        .windows(2)
        .map(|w| graph.edge_between(w[0], w[1]).map(|e| graph.edge(e).length))
        .sum()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pathing::models::{ClusterKey, NodeId};
    use crate::pathing::node::{Edge, NodeArena};
    use std::collections::BTreeMap;

    /// 4-connected plane from a char map, '#' is solid.
    pub(crate) fn plane(rows: &[&str]) -> (NodeArena, BTreeMap<(i32, i32), NodeIdx>) {
        let mut arena = NodeArena::new();
        let mut at = BTreeMap::new();
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    continue;
                }
                let pos = Position::new(x as i32, y as i32, 0);
                let id = NodeId((x + y * row.len()) as u32);
                let idx = arena.add_node(PathNode::new(pos, 0, ClusterKey(0), id));
                at.insert((x as i32, y as i32), idx);
            }
        }
        let cells: Vec<((i32, i32), NodeIdx)> = at.iter().map(|(&k, &v)| (k, v)).collect();
        for ((x, y), idx) in cells {
            for (dx, dy) in [(1, 0), (0, 1)] {
                if let Some(&other) = at.get(&(x + dx, y + dy)) {
                    let (pa, pb) = (arena.node(idx).position, arena.node(other).position);
                    arena.connect(Edge::direct(idx, pa, other, pb));
                }
            }
        }
        (arena, at)
    }

    const MAZE: [&str; 5] = [
        ".....",
        ".###.",
        ".#...",
        ".#.#.",
        "...#.",
    ];

    #[test]
    fn astar_is_optimal_on_open_plane() {
        let (arena, at) = plane(&[".....", ".....", ".....", ".....", "....."]);
        let r = astar(&arena, at[&(0, 0)], at[&(4, 4)], &SearchScope::Everywhere, &SearchOptions::default());
        let (nodes, cost) = r.into_path().unwrap();
        assert_eq!(cost, 8.0);
        assert_eq!(nodes.len(), 9);
        assert_eq!(nodes.first(), Some(&at[&(0, 0)]));
        assert_eq!(nodes.last(), Some(&at[&(4, 4)]));
        assert_eq!(path_length(&arena, &nodes), Some(8.0));
    }

    #[test]
    fn astar_and_bfs_agree_on_unit_maze() {
        let (arena, at) = plane(&MAZE);
        let scope = SearchScope::Everywhere;
        for kind in [DistanceKind::Diagonal, DistanceKind::Manhattan] {
            let opts = SearchOptions::with_distance(kind);
            let a = astar(&arena, at[&(0, 0)], at[&(2, 3)], &scope, &opts);
            let b = bfs(&arena, at[&(0, 0)], at[&(2, 3)], &scope, &opts);
            // (0,0) down the left column, along the bottom, up to (2,3).
            assert_eq!(a.cost(), Some(7.0));
            assert_eq!(b.cost(), Some(7.0));
        }
        let d = dfs(&arena, at[&(0, 0)], at[&(2, 3)], &scope, &SearchOptions::default());
        let (nodes, cost) = d.into_path().unwrap();
        assert!(cost >= 7.0);
        assert_eq!(path_length(&arena, &nodes), Some(cost));
    }

    #[test]
    fn trivial_and_unreachable_queries_report_no_path() {
        let (mut arena, at) = plane(&["..#.."]);
        let scope = SearchScope::Everywhere;
        let opts = SearchOptions::default();
        assert_eq!(astar(&arena, at[&(0, 0)], at[&(0, 0)], &scope, &opts), SearchResult::NoPath);
        assert_eq!(astar(&arena, at[&(0, 0)], at[&(4, 0)], &scope, &opts), SearchResult::NoPath);
        assert_eq!(bfs(&arena, at[&(0, 0)], at[&(4, 0)], &scope, &opts), SearchResult::NoPath);

        assert!(astar(&arena, at[&(0, 0)], at[&(1, 0)], &scope, &opts).is_found());
        arena.set_node_walkable(at[&(1, 0)], false);
        assert_eq!(astar(&arena, at[&(0, 0)], at[&(1, 0)], &scope, &opts), SearchResult::NoPath);
    }

    #[test]
    fn unwalkable_cells_are_routed_around() {
        let (mut arena, at) = plane(&["...", "...", "..."]);
        arena.set_node_walkable(at[&(1, 0)], false);
        arena.set_node_walkable(at[&(1, 1)], false);
        let r = astar(&arena, at[&(0, 0)], at[&(2, 0)], &SearchScope::Everywhere, &SearchOptions::default());
        let (nodes, cost) = r.into_path().unwrap();
        assert_eq!(cost, 6.0);
        assert!(!nodes.contains(&at[&(1, 0)]));
        assert!(!nodes.contains(&at[&(1, 1)]));
    }

    #[test]
    fn scope_keeps_search_inside_region() {
        let (arena, at) = plane(&["...", ".#.", "..."]);
        let scope = SearchScope::Region { level: 0, origin: Position::new(0, 0, 0), shape: Shape::new(3, 1, 1) };
        let r = astar(&arena, at[&(0, 0)], at[&(2, 0)], &scope, &SearchOptions::default());
        assert_eq!(r.cost(), Some(2.0));
        let outside = astar(&arena, at[&(0, 0)], at[&(0, 2)], &scope, &SearchOptions::default());
        assert_eq!(outside, SearchResult::NoPath);
    }

    #[test]
    fn speed_aware_astar_respects_direction() {
        let mut arena = NodeArena::new();
        let n: Vec<NodeIdx> = (0..3)
            .map(|i| arena.add_node(PathNode::new(Position::new(i, 0, 0), 0, ClusterKey(0), NodeId(i as u32))))
            .collect();
        let mut conveyor = Edge::with_length(n[0], n[1], 4.0);
        conveyor.direction_coefficient = 1.0;
        arena.connect(conveyor);
        arena.connect(Edge::with_length(n[0], n[2], 3.0));
        arena.connect(Edge::with_length(n[2], n[1], 3.0));

        let opts = SearchOptions { speed: Some(1.0), ..SearchOptions::default() };
        let scope = SearchScope::Everywhere;
        let with_flow = astar(&arena, n[0], n[1], &scope, &opts).into_path().unwrap();
        assert_eq!(with_flow, (vec![n[0], n[1]], 2.0));
        let against = astar(&arena, n[1], n[0], &scope, &opts).into_path().unwrap();
        assert_eq!(against, (vec![n[1], n[2], n[0]], 6.0));
    }

    #[test]
    fn speed_aware_astar_reopens_settled_nodes() {
        // A conveyor from a cell far off the goal line makes the heuristic
        // overestimate, so `mid` settles before its cheaper parent is seen.
        let mut arena = NodeArena::new();
        let mut add = |x: i32, y: i32, id: u32| arena.add_node(PathNode::new(Position::new(x, y, 0), 0, ClusterKey(0), NodeId(id)));
        let (start, mid, goal, far) = (add(0, 0, 0), add(1, 0, 1), add(2, 0, 2), add(0, 5, 3));
        arena.connect(Edge::with_length(start, mid, 3.0));
        arena.connect(Edge::with_length(start, far, 1.0));
        let mut conveyor = Edge::with_length(far, mid, 10.0);
        conveyor.direction_coefficient = 9.0;
        arena.connect(conveyor);
        arena.connect(Edge::with_length(mid, goal, 5.0));

        let scope = SearchScope::Everywhere;
        let plain = astar(&arena, start, goal, &scope, &SearchOptions::default()).into_path().unwrap();
        assert_eq!(plain, (vec![start, mid, goal], 8.0));

        let opts = SearchOptions { speed: Some(1.0), ..SearchOptions::default() };
        let fast = astar(&arena, start, goal, &scope, &opts).into_path().unwrap();
        assert_eq!(fast, (vec![start, far, mid, goal], 7.0));
    }

    #[test]
    fn visited_mode_and_budget() {
        let (arena, at) = plane(&["....."]);
        let scope = SearchScope::Everywhere;
        let opts = SearchOptions { collect_visited: true, ..SearchOptions::default() };
        let SearchResult::Visited(v) = bfs(&arena, at[&(0, 0)], at[&(4, 0)], &scope, &opts) else {
            panic!("expected visited set");
        };
        assert_eq!(v.len(), 5);

        let tight = SearchOptions { max_expansions: Some(2), ..SearchOptions::default() };
        assert_eq!(astar(&arena, at[&(0, 0)], at[&(4, 0)], &scope, &tight), SearchResult::NoPath);
    }
}
