//! A bounded box of one level's nodes and the border nodes it exposes.

use std::collections::{BTreeMap, BTreeSet};

use super::error::{PathError, PathResult};
use super::models::{ClusterKey, NodeId, NodeIdx, Position, Shape};
use super::node::GraphView;
use super::search::{self, SearchOptions, SearchResult, SearchScope};

/// Read surface shared by leaf clusters and composite node graphs.
pub trait ClusterLike {
    fn key(&self) -> ClusterKey;
    fn level(&self) -> usize;
    /// World-space corner of the box.
    fn origin(&self) -> Position;
    fn shape(&self) -> Shape;
    fn nodes(&self) -> &BTreeMap<NodeId, NodeIdx>;
    fn border_nodes(&self) -> &BTreeSet<NodeIdx>;

    fn node_by_id(&self, id: NodeId) -> PathResult<NodeIdx> {
        self.nodes()
            .get(&id)
            .copied()
            .ok_or(PathError::UnknownNode { cluster: self.key(), id })
    }

    /// Id a node at `pos` has (or would have) in this cluster.
    fn id_of(&self, pos: Position) -> Option<NodeId> {
        self.shape().local_index(self.origin(), pos).map(NodeId)
    }

    fn contains(&self, pos: Position) -> bool {
        self.shape().contains(self.origin(), pos)
    }

    fn scope(&self) -> SearchScope {
        SearchScope::Region { level: self.level(), origin: self.origin(), shape: self.shape() }
    }
}

#[derive(Clone, Debug)]
pub struct Cluster {
    pub key: ClusterKey,
    pub level: usize,
    /// Position of this cluster in the partition grid of its level.
    pub grid_position: Position,
    pub origin: Position,
    pub shape: Shape,
    pub nodes: BTreeMap<NodeId, NodeIdx>,
    pub border: BTreeSet<NodeIdx>,
    /// Key of the enclosing cluster one level up; `None` at the top.
    pub super_cluster: Option<ClusterKey>,
}

impl Cluster {
    pub fn new(key: ClusterKey, level: usize, grid_position: Position, origin: Position, shape: Shape) -> Self {
        Self {
            key,
            level,
            grid_position,
            origin,
            shape,
            nodes: BTreeMap::new(),
            border: BTreeSet::new(),
            super_cluster: None,
        }
    }

    pub fn astar<G: GraphView>(&self, graph: &G, start: NodeId, end: NodeId, opts: &SearchOptions) -> PathResult<Vec<NodeId>> {
        self.run(graph, start, end, opts, search::astar)
    }

    pub fn bfs<G: GraphView>(&self, graph: &G, start: NodeId, end: NodeId, opts: &SearchOptions) -> PathResult<Vec<NodeId>> {
        self.run(graph, start, end, opts, search::bfs)
    }

    pub fn dfs<G: GraphView>(&self, graph: &G, start: NodeId, end: NodeId, opts: &SearchOptions) -> PathResult<Vec<NodeId>> {
        self.run(graph, start, end, opts, search::dfs)
    }

    /// Resolves ids, searches inside the box and maps the result back to ids:
    /// the ordered path, the visited set in visited mode, or empty.
    fn run<G, F>(&self, graph: &G, start: NodeId, end: NodeId, opts: &SearchOptions, f: F) -> PathResult<Vec<NodeId>>
    where
        G: GraphView,
        F: Fn(&G, NodeIdx, NodeIdx, &SearchScope, &SearchOptions) -> SearchResult,
    {
        let s = self.node_by_id(start)?;
        let e = self.node_by_id(end)?;
        let ids = match f(graph, s, e, &self.scope(), opts) {
            SearchResult::Path { nodes, .. } => nodes,
            SearchResult::Visited(nodes) => nodes,
            SearchResult::NoPath => Vec::new(),
        };
        Ok(ids.into_iter().map(|n| graph.node(n).id).collect())
    }
}

impl ClusterLike for Cluster {
    fn key(&self) -> ClusterKey {
        self.key
    }

    fn level(&self) -> usize {
        self.level
    }

    fn origin(&self) -> Position {
        self.origin
    }

    fn shape(&self) -> Shape {
        self.shape
    }

    fn nodes(&self) -> &BTreeMap<NodeId, NodeIdx> {
        &self.nodes
    }

    fn border_nodes(&self) -> &BTreeSet<NodeIdx> {
        &self.border
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathing::node::{Edge, NodeArena, PathNode};

    fn row_cluster(arena: &mut NodeArena, len: i32) -> Cluster {
        let mut c = Cluster::new(ClusterKey(0), 0, Position::default(), Position::default(), Shape::new(len as usize, 1, 1));
        let mut prev: Option<NodeIdx> = None;
        for x in 0..len {
            let pos = Position::new(x, 0, 0);
            let id = c.id_of(pos).unwrap();
            let idx = arena.add_node(PathNode::new(pos, 0, c.key, id));
            c.nodes.insert(id, idx);
            if let Some(p) = prev {
                let pp = arena.node(p).position;
                arena.connect(Edge::direct(p, pp, idx, pos));
            }
            prev = Some(idx);
        }
        c
    }

    #[test]
    fn searches_by_id() -> anyhow::Result<()> {
        let mut arena = NodeArena::new();
        let c = row_cluster(&mut arena, 4);
        let opts = SearchOptions::default();
        let want = vec![NodeId(0), NodeId(1), NodeId(2), NodeId(3)];
        assert_eq!(c.astar(&arena, NodeId(0), NodeId(3), &opts)?, want);
        assert_eq!(c.bfs(&arena, NodeId(0), NodeId(3), &opts)?, want);
        assert_eq!(c.dfs(&arena, NodeId(0), NodeId(3), &opts)?, want);
        assert!(c.astar(&arena, NodeId(2), NodeId(2), &opts)?.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_ids_are_errors() {
        let mut arena = NodeArena::new();
        let c = row_cluster(&mut arena, 2);
        let err = c.astar(&arena, NodeId(0), NodeId(9), &SearchOptions::default()).unwrap_err();
        assert_eq!(err, PathError::UnknownNode { cluster: ClusterKey(0), id: NodeId(9) });
    }
}
