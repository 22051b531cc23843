//! Graph primitives: nodes, edges and the arena that owns them.
//!
//! Nodes and edges of every level live in one arena and are addressed by
//! stable indices. Back-references (`lower`, `upper`, `cluster`) are plain
//! indices and never imply ownership. Search scratch state is not stored on
//! nodes; see [`super::search`].

use std::collections::BTreeMap;

use super::distance::{distance, DistanceKind};
use super::models::{ClusterKey, EdgeIdx, NodeId, NodeIdx, Position};

#[derive(Clone, Debug)]
pub struct PathNode {
    pub position: Position,
    pub walkable: bool,
    /// 0 for the finest grid, increasing towards the top abstraction.
    pub level: usize,
    pub id: NodeId,
    pub cluster: ClusterKey,
    /// Same location one level down; `None` at the finest level.
    pub lower: Option<NodeIdx>,
    /// Copy of this node in the super-cluster, present only for border nodes.
    pub upper: Option<NodeIdx>,
    /// Neighbor -> edge. Symmetric: the neighbor maps back to the same edge.
    pub edges: BTreeMap<NodeIdx, EdgeIdx>,
    pub ephemeral: bool,
}

impl PathNode {
    pub fn new(position: Position, level: usize, cluster: ClusterKey, id: NodeId) -> Self {
        Self {
            position,
            walkable: true,
            level,
            id,
            cluster,
            lower: None,
            upper: None,
            edges: BTreeMap::new(),
            ephemeral: false,
        }
    }

    /// A copy of `lower` one level up.
    pub fn lifted(lower_idx: NodeIdx, lower: &PathNode, cluster: ClusterKey, id: NodeId) -> Self {
        let mut node = Self::new(lower.position, lower.level + 1, cluster, id);
        node.walkable = lower.walkable;
        node.lower = Some(lower_idx);
        node
    }
}

#[derive(Clone, Debug)]
pub struct Edge {
    pub a: NodeIdx,
    pub b: NodeIdx,
    pub length: f64,
    pub walkable: bool,
    /// Solid cells cut through by this diagonal step.
    pub blocked: u32,
    /// Corner-cut threshold of the policy that created the edge (strict mode).
    pub corner_threshold: Option<u32>,
    /// Abstract edge whose underlying path no longer exists.
    pub severed: bool,
    /// Added to the travel speed towards `b`, subtracted towards `a`.
    pub direction_coefficient: f64,
    pub connects_clusters: bool,
    /// Bridge this edge was lifted from.
    pub lower: Option<EdgeIdx>,
    /// Lifted copy of this bridge one level up.
    pub upper: Option<EdgeIdx>,
    /// Lower-level node path from `a` to `b` that this edge abstracts.
    pub path: Option<Vec<NodeIdx>>,
    pub detached: bool,
}

impl Edge {
    fn base(a: NodeIdx, b: NodeIdx, length: f64) -> Self {
        Self {
            a,
            b,
            length,
            walkable: true,
            blocked: 0,
            corner_threshold: None,
            severed: false,
            direction_coefficient: 0.0,
            connects_clusters: false,
            lower: None,
            upper: None,
            path: None,
            detached: false,
        }
    }

    /// Direct adjacency; length is the Euclidean distance of the endpoints.
    pub fn direct(a: NodeIdx, pa: Position, b: NodeIdx, pb: Position) -> Self {
        Self::base(a, b, distance(pa, pb, DistanceKind::Diagonal))
    }

    /// Abstract edge with a precomputed path cost.
    pub fn with_length(a: NodeIdx, b: NodeIdx, length: f64) -> Self {
        Self::base(a, b, length)
    }

    /// Unit-length edge between two clusters; the caller sets `length` once known.
    pub fn placeholder(a: NodeIdx, b: NodeIdx) -> Self {
        let mut e = Self::base(a, b, 1.0);
        e.connects_clusters = true;
        e
    }

    pub fn other(&self, n: NodeIdx) -> NodeIdx {
        if n == self.a {
            self.b
        } else {
            self.a
        }
    }

    pub fn corners_clear(&self) -> bool {
        self.corner_threshold.map_or(true, |t| self.blocked < t)
    }

    /// Travel time towards `to` at `speed`; infinite when the effective speed is not positive.
    pub fn effective_length(&self, to: NodeIdx, speed: f64) -> f64 {
        let effective = if to == self.b {
            speed + self.direction_coefficient
        } else {
            speed - self.direction_coefficient
        };
        if effective <= 0.0 {
            f64::INFINITY
        } else {
            self.length / effective
        }
    }

    /// The stored path oriented to start at `from`.
    pub fn path_from(&self, from: NodeIdx) -> Option<Vec<NodeIdx>> {
        let path = self.path.as_ref()?;
        if from == self.a {
            Some(path.clone())
        } else {
            Some(path.iter().rev().copied().collect())
        }
    }
}

/// Read access shared by the persistent arena and per-query overlays.
pub trait GraphView {
    fn node(&self, idx: NodeIdx) -> &PathNode;
    fn edge(&self, idx: EdgeIdx) -> &Edge;
    fn neighbors(&self, idx: NodeIdx) -> Vec<(NodeIdx, EdgeIdx)>;
    fn edge_between(&self, a: NodeIdx, b: NodeIdx) -> Option<EdgeIdx>;

    /// Ids of neighbors reachable over a currently walkable edge.
    fn connected_ids(&self, idx: NodeIdx) -> Vec<NodeId> {
        self.neighbors(idx)
            .into_iter()
            .filter(|&(_, e)| self.edge(e).walkable)
            .map(|(n, _)| self.node(n).id)
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct NodeArena {
    nodes: Vec<PathNode>,
    edges: Vec<Edge>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: PathNode) -> NodeIdx {
        let idx = NodeIdx(self.nodes.len() as u32);
        self.nodes.push(node);
        idx
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut PathNode {
        &mut self.nodes[idx.index()]
    }

    pub fn edge_mut(&mut self, idx: EdgeIdx) -> &mut Edge {
        &mut self.edges[idx.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_slots(&self) -> usize {
        self.edges.len()
    }

    pub fn live_edge_count(&self) -> usize {
        self.edges.iter().filter(|e| !e.detached).count()
    }

    pub fn live_edges(&self) -> impl Iterator<Item = (EdgeIdx, &Edge)> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.detached)
            .map(|(i, e)| (EdgeIdx(i as u32), e))
    }

    pub fn contains(&self, idx: NodeIdx) -> bool {
        idx.index() < self.nodes.len()
    }

    pub fn nodes_at_level(&self, level: usize) -> impl Iterator<Item = NodeIdx> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.level == level)
            .map(|(i, _)| NodeIdx(i as u32))
    }

    /// Inserts `edge` into both endpoint maps. An existing edge between the
    /// same endpoints wins and is returned instead.
    pub fn connect(&mut self, edge: Edge) -> EdgeIdx {
        let (a, b) = (edge.a, edge.b);
        if let Some(existing) = self.nodes[a.index()].edges.get(&b) {
            return *existing;
        }
        let idx = EdgeIdx(self.edges.len() as u32);
        self.edges.push(edge);
        self.nodes[a.index()].edges.insert(b, idx);
        self.nodes[b.index()].edges.insert(a, idx);
        self.refresh_edge(idx);
        idx
    }

    /// Detaches an edge from both endpoints. The slot stays as a tombstone.
    pub fn remove_edge(&mut self, idx: EdgeIdx) {
        let (a, b) = {
            let e = &mut self.edges[idx.index()];
            e.detached = true;
            e.walkable = false;
            (e.a, e.b)
        };
        self.nodes[a.index()].edges.remove(&b);
        self.nodes[b.index()].edges.remove(&a);
    }

    /// Recomputes walkability from endpoints, corner counter, severance and the
    /// bridge it was lifted from. Returns whether it changed.
    pub fn refresh_edge(&mut self, idx: EdgeIdx) -> bool {
        let e = &self.edges[idx.index()];
        if e.detached {
            return false;
        }
        let lower_ok = e.lower.map_or(true, |l| self.edges[l.index()].walkable);
        let walkable = self.nodes[e.a.index()].walkable
            && self.nodes[e.b.index()].walkable
            && e.corners_clear()
            && !e.severed
            && lower_ok;
        let changed = walkable != e.walkable;
        self.edges[idx.index()].walkable = walkable;
        changed
    }

    /// Refreshes `idx` and every lifted copy above it, collecting the ones that changed.
    pub fn refresh_edge_chain(&mut self, idx: EdgeIdx, changed: &mut Vec<EdgeIdx>) {
        let mut cur = Some(idx);
        let mut first = true;
        while let Some(e) = cur {
            let did = self.refresh_edge(e);
            if did {
                changed.push(e);
            } else if !first {
                break;
            }
            first = false;
            cur = self.edges[e.index()].upper;
        }
    }

    /// Flips a node's flag and refreshes the edges touching it.
    /// Returns the edges whose walkability changed (lifted copies included).
    pub fn set_node_walkable(&mut self, idx: NodeIdx, walkable: bool) -> Vec<EdgeIdx> {
        let mut changed = Vec::new();
        if self.nodes[idx.index()].walkable == walkable {
            return changed;
        }
        self.nodes[idx.index()].walkable = walkable;
        let touching: Vec<EdgeIdx> = self.nodes[idx.index()].edges.values().copied().collect();
        for e in touching {
            self.refresh_edge_chain(e, &mut changed);
        }
        changed
    }

    /// Moves a strict-mode edge's corner counter by one and refreshes it.
    pub fn adjust_blocked(&mut self, idx: EdgeIdx, blocking: bool, changed: &mut Vec<EdgeIdx>) {
        {
            let e = &mut self.edges[idx.index()];
            if blocking {
                e.blocked += 1;
            } else {
                e.blocked = e.blocked.saturating_sub(1);
            }
        }
        self.refresh_edge_chain(idx, changed);
    }
}

impl GraphView for NodeArena {
    fn node(&self, idx: NodeIdx) -> &PathNode {
        &self.nodes[idx.index()]
    }

    fn edge(&self, idx: EdgeIdx) -> &Edge {
        &self.edges[idx.index()]
    }

    fn neighbors(&self, idx: NodeIdx) -> Vec<(NodeIdx, EdgeIdx)> {
        self.nodes[idx.index()].edges.iter().map(|(&n, &e)| (n, e)).collect()
    }

    fn edge_between(&self, a: NodeIdx, b: NodeIdx) -> Option<EdgeIdx> {
        self.nodes[a.index()].edges.get(&b).copied()
    }
}
