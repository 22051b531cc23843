//! Cross-level path queries.
//!
//! A [`QuerySession`] borrows a built graph and layers an [`Overlay`] over its
//! arena for the ephemeral start/end nodes of each query. The overlay is a
//! separate short-lived arena, so dropping or cleaning the session releases
//! every temporary node and edge at once and the persistent graph is never
//! written to.

use log::{debug, trace, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::cluster::ClusterLike;
use super::error::PathResult;
use super::intra_connector::search_options;
use super::models::{EdgeIdx, NodeId, NodeIdx, Position};
use super::node::{Edge, GraphView, NodeArena, PathNode};
use super::node_graph::HierarchicalGraph;
use super::search::{astar, path_length, SearchOptions, SearchScope};

/// Persistent arena plus per-query nodes and edges.
///
/// Ephemeral indices continue after the base arena's, so base indices keep
/// their meaning and both can be mixed in one path.
pub struct Overlay<'g> {
    base: &'g NodeArena,
    base_nodes: usize,
    base_edges: usize,
    nodes: Vec<PathNode>,
    edges: Vec<Edge>,
    /// Overlay edges hanging off base nodes.
    extra: HashMap<NodeIdx, BTreeMap<NodeIdx, EdgeIdx>>,
}

impl<'g> Overlay<'g> {
    pub fn new(base: &'g NodeArena) -> Self {
        Self {
            base,
            base_nodes: base.node_count(),
            base_edges: base.edge_slots(),
            nodes: Vec::new(),
            edges: Vec::new(),
            extra: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, mut node: PathNode) -> NodeIdx {
        node.ephemeral = true;
        let idx = NodeIdx((self.base_nodes + self.nodes.len()) as u32);
        self.nodes.push(node);
        idx
    }

    pub fn connect(&mut self, mut edge: Edge) -> EdgeIdx {
        edge.walkable = self.node(edge.a).walkable && self.node(edge.b).walkable;
        let idx = EdgeIdx((self.base_edges + self.edges.len()) as u32);
        let (a, b) = (edge.a, edge.b);
        self.edges.push(edge);
        self.link(a, b, idx);
        self.link(b, a, idx);
        idx
    }

    fn link(&mut self, from: NodeIdx, to: NodeIdx, e: EdgeIdx) {
        match from.index().checked_sub(self.base_nodes) {
            Some(local) => {
                self.nodes[local].edges.insert(to, e);
            }
            None => {
                self.extra.entry(from).or_default().insert(to, e);
            }
        }
    }

    pub fn ephemeral_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn ephemeral_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn is_ephemeral(&self, idx: NodeIdx) -> bool {
        idx.index() >= self.base_nodes
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.extra.clear();
    }
}

impl GraphView for Overlay<'_> {
    fn node(&self, idx: NodeIdx) -> &PathNode {
        match idx.index().checked_sub(self.base_nodes) {
            Some(local) => &self.nodes[local],
            None => self.base.node(idx),
        }
    }

    fn edge(&self, idx: EdgeIdx) -> &Edge {
        match idx.index().checked_sub(self.base_edges) {
            Some(local) => &self.edges[local],
            None => self.base.edge(idx),
        }
    }

    fn neighbors(&self, idx: NodeIdx) -> Vec<(NodeIdx, EdgeIdx)> {
        match idx.index().checked_sub(self.base_nodes) {
            Some(local) => self.nodes[local].edges.iter().map(|(&n, &e)| (n, e)).collect(),
            None => {
                let mut out = self.base.neighbors(idx);
                if let Some(extra) = self.extra.get(&idx) {
                    out.extend(extra.iter().map(|(&n, &e)| (n, e)));
                }
                out
            }
        }
    }

    fn edge_between(&self, a: NodeIdx, b: NodeIdx) -> Option<EdgeIdx> {
        match a.index().checked_sub(self.base_nodes) {
            Some(local) => self.nodes[local].edges.get(&b).copied(),
            None => self
                .base
                .edge_between(a, b)
                .or_else(|| self.extra.get(&a).and_then(|m| m.get(&b).copied())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Route {
    /// Finest-level cells from start to end inclusive.
    pub positions: Vec<Position>,
    pub cost: f64,
}

impl Route {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Exactly `capacity` slots, filled from the start of the path and padded with `None`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathBuffer {
    slots: Vec<Option<Position>>,
    /// The path did not fit.
    truncated: bool,
}

impl PathBuffer {
    pub fn fill(capacity: usize, positions: &[Position]) -> Self {
        let mut slots = vec![None; capacity];
        for (slot, &pos) in slots.iter_mut().zip(positions) {
            *slot = Some(pos);
        }
        Self { slots, truncated: positions.len() > capacity }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().take_while(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn slots(&self) -> &[Option<Position>] {
        &self.slots
    }

    pub fn positions(&self) -> Vec<Position> {
        self.slots.iter().map_while(|s| *s).collect()
    }
}

/// A bounded run of queries against one built graph.
pub struct QuerySession<'g> {
    graph: &'g HierarchicalGraph,
    overlay: Overlay<'g>,
    /// Entry node per level for every endpoint queried so far.
    entries: HashMap<Position, Vec<NodeIdx>>,
    opts: SearchOptions,
}

impl<'g> QuerySession<'g> {
    pub(crate) fn new(graph: &'g HierarchicalGraph) -> Self {
        Self {
            graph,
            overlay: Overlay::new(graph.arena()),
            entries: HashMap::new(),
            opts: search_options(graph.config()),
        }
    }

    pub fn overlay(&self) -> &Overlay<'g> {
        &self.overlay
    }

    /// Releases every ephemeral node and edge created so far.
    pub fn clean_up(&mut self) {
        debug!(
            "query: releasing {} ephemeral nodes, {} ephemeral edges",
            self.overlay.ephemeral_nodes(),
            self.overlay.ephemeral_edges()
        );
        self.overlay.clear();
        self.entries.clear();
    }

    /// Fixed-capacity variant of [`QuerySession::route`]; all slots are `None` when there is no path.
    pub fn astar(&mut self, start: Position, end: Position, capacity: usize) -> PathResult<PathBuffer> {
        let route = self.route(start, end)?;
        let positions = route.as_ref().map(|r| r.positions.as_slice()).unwrap_or(&[]);
        Ok(PathBuffer::fill(capacity, positions))
    }

    /// Finest-level route between two cells, or `None` when unreachable.
    pub fn route(&mut self, start: Position, end: Position) -> PathResult<Option<Route>> {
        let s0 = self.graph.node_at(start)?;
        let e0 = self.graph.node_at(end)?;
        let arena = self.graph.arena();
        if !arena.node(s0).walkable || !arena.node(e0).walkable {
            return Ok(None);
        }
        if start == end {
            return Ok(Some(Route { positions: vec![start], cost: 0.0 }));
        }
        self.entries.entry(start).or_insert_with(|| vec![s0]);
        self.entries.entry(end).or_insert_with(|| vec![e0]);

        let Some(nodes) = self.resolve(start, end, self.graph.top_level())? else {
            debug!("query: no route {} -> {}", start, end);
            return Ok(None);
        };
        let Some(cost) = path_length(&self.overlay, &nodes) else {
            warn!("query: refined path {} -> {} has a gap", start, end);
            return Ok(None);
        };
        let positions = nodes.iter().map(|&n| self.overlay.node(n).position).collect();
        Ok(Some(Route { positions, cost }))
    }

    /// Searches at `level`, descending first while both ends share a child cluster.
    fn resolve(&mut self, start: Position, end: Position, level: usize) -> PathResult<Option<Vec<NodeIdx>>> {
        let graph = self.graph;
        let partition = graph.partition();
        if level > 0 && partition.key_of(level - 1, start) == partition.key_of(level - 1, end) {
            if let Some(path) = self.resolve(start, end, level - 1)? {
                return Ok(Some(path));
            }
        }
        let s = self.entry(start, level)?;
        let e = self.entry(end, level)?;
        let scope = if level == graph.top_level() {
            SearchScope::Everywhere
        } else {
            graph.cluster_at(level, start)?.scope()
        };
        match astar(&self.overlay, s, e, &scope, &self.opts).into_path() {
            Some((nodes, cost)) => {
                trace!("query: level {} path of {} nodes, cost {}", level, nodes.len(), cost);
                self.refine(nodes, level)
            }
            None => Ok(None),
        }
    }

    /// Node standing for `pos` at `level`, creating ephemeral nodes as needed.
    fn entry(&mut self, pos: Position, level: usize) -> PathResult<NodeIdx> {
        let mut chain = self.entries.get(&pos).cloned().unwrap_or_default();
        if chain.is_empty() {
            chain.push(self.graph.node_at(pos)?);
        }
        while chain.len() <= level {
            let k = chain.len();
            let prev = chain[k - 1];
            let next = match self.overlay.node(prev).upper {
                Some(up) => up,
                None => self.attach(prev, pos, k)?,
            };
            chain.push(next);
        }
        let idx = chain[level];
        self.entries.insert(pos, chain);
        Ok(idx)
    }

    /// Creates an ephemeral node at `level` above `lower` and wires it to every
    /// border node of the enclosing lower cluster it can reach.
    fn attach(&mut self, lower: NodeIdx, pos: Position, level: usize) -> PathResult<NodeIdx> {
        let graph = self.graph;
        let below = graph.cluster_at(level - 1, pos)?;
        let above = graph.cluster_at(level, pos)?;
        let id = above.id_of(pos).unwrap_or(NodeId(0));
        let mut node = PathNode::new(pos, level, above.key, id);
        node.lower = Some(lower);
        let temp = self.overlay.add_node(node);

        let scope = below.scope();
        let mut wired = 0usize;
        for &b in below.border_nodes() {
            let Some(up) = self.overlay.node(b).upper else { continue };
            let Some((path, cost)) = astar(&self.overlay, lower, b, &scope, &self.opts).into_path() else {
                continue;
            };
            let mut edge = Edge::with_length(temp, up, cost);
            edge.path = Some(path);
            self.overlay.connect(edge);
            wired += 1;
        }
        trace!("query: ephemeral node {} at level {} wired to {} border nodes", pos, level, wired);
        Ok(temp)
    }

    /// Expands a level-`level` path hop by hop down to the finest level.
    fn refine(&self, mut nodes: Vec<NodeIdx>, mut level: usize) -> PathResult<Option<Vec<NodeIdx>>> {
        let g = &self.overlay;
        while level > 0 {
            let mut lower: Vec<NodeIdx> = Vec::with_capacity(nodes.len() * 2);
            for hop in nodes.windows(2) {
                let (a, b) = (hop[0], hop[1]);
                let (Some(e), Some(la), Some(lb)) = (g.edge_between(a, b), g.node(a).lower, g.node(b).lower) else {
                    warn!("query: level {} hop without lower links", level);
                    return Ok(None);
                };
                let edge = g.edge(e);
                let segment = if edge.lower.is_some() {
                    vec![la, lb]
                } else if let Some(path) = edge.path_from(a) {
                    path
                } else {
                    let scope = self.graph.cluster_at(level - 1, g.node(la).position)?.scope();
                    match astar(g, la, lb, &scope, &self.opts).into_path() {
                        Some((path, _)) => path,
                        None => {
                            warn!("query: level {} hop {} -> {} no longer resolves", level, g.node(a).position, g.node(b).position);
                            return Ok(None);
                        }
                    }
                };
                let skip = usize::from(lower.last().is_some() && lower.last() == segment.first());
                lower.extend_from_slice(&segment[skip..]);
            }
            nodes = lower;
            level -= 1;
        }
        Ok(Some(nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathing::config::GraphConfig;
    use crate::pathing::grid::Occupancy;
    use crate::pathing::models::Shape;

    #[test]
    fn buffer_pads_and_truncates() {
        let path = [Position::new(0, 0, 0), Position::new(1, 0, 0), Position::new(2, 0, 0)];
        let wide = PathBuffer::fill(5, &path);
        assert_eq!(wide.capacity(), 5);
        assert_eq!(wide.len(), 3);
        assert_eq!(wide.slots()[3], None);
        assert!(!wide.truncated());

        let narrow = PathBuffer::fill(2, &path);
        assert_eq!(narrow.positions(), path[..2].to_vec());
        assert!(narrow.truncated());
        assert!(PathBuffer::fill(4, &[]).is_empty());
    }

    #[test]
    fn session_creates_and_releases_ephemeral_nodes() -> anyhow::Result<()> {
        let g = HierarchicalGraph::build(Occupancy::filled(Shape::new(8, 8, 1), 1), GraphConfig::with_sizes(&[4]))?;
        let before = g.arena().node_count();
        let mut session = g.session();
        // Interior cells are not border nodes, so both ends need ephemeral copies.
        let route = session.route(Position::new(1, 1, 0), Position::new(6, 6, 0))?.expect("open grid");
        assert_eq!(route.positions.first(), Some(&Position::new(1, 1, 0)));
        assert_eq!(route.positions.last(), Some(&Position::new(6, 6, 0)));
        assert_eq!(route.cost, 10.0);
        assert_eq!(session.overlay().ephemeral_nodes(), 2);
        session.clean_up();
        assert_eq!(session.overlay().ephemeral_nodes(), 0);
        assert_eq!(g.arena().node_count(), before);
        Ok(())
    }

    #[test]
    fn trivial_and_blocked_routes() -> anyhow::Result<()> {
        let layers = vec![vec![vec![1, 1, 0, 1], vec![1, 1, 0, 1]]];
        let g = HierarchicalGraph::from_layers(&layers, GraphConfig::with_sizes(&[2]))?;
        let here = Position::new(0, 0, 0);
        let same = g.route(here, here)?.expect("start is open");
        assert_eq!((same.positions, same.cost), (vec![here], 0.0));
        assert_eq!(g.route(here, Position::new(3, 1, 0))?, None);
        assert!(g.astar(here, Position::new(3, 0, 0), 4)?.is_empty());
        Ok(())
    }
}
