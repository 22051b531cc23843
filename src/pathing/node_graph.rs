//! The assembled hierarchy and the public engine surface.
//!
//! A [`NodeGraph`] is one cluster of level `k >= 1` together with the
//! level-`k - 1` clusters it encloses. Children are either leaf clusters or
//! further node graphs, so the recursion is explicit in [`Level`]. Nodes and
//! edges of all levels live in the single arena owned by
//! [`HierarchicalGraph`]; the tree only holds indices.

use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::cluster::{Cluster, ClusterLike};
use super::cluster_builder::Partition;
use super::config::GraphConfig;
use super::error::{PathError, PathResult};
use super::executor::{run_pipeline, BuildStats};
use super::goal_cluster::GoalCluster;
use super::grid::Occupancy;
use super::intra_connector::{update_cluster, ConnectStats};
use super::models::{ClusterKey, EdgeIdx, NodeId, NodeIdx, Offset, Position, Shape};
use super::node::{GraphView, NodeArena, PathNode};
use super::query::{PathBuffer, QuerySession, Route};
use super::search::SearchOptions;

#[derive(Clone, Debug)]
pub enum Level {
    Leaf(Cluster),
    Composite(Box<NodeGraph>),
}

impl Level {
    pub fn as_cluster(&self) -> &Cluster {
        match self {
            Level::Leaf(c) => c,
            Level::Composite(g) => &g.super_cluster,
        }
    }
}

impl ClusterLike for Level {
    fn key(&self) -> ClusterKey {
        self.as_cluster().key
    }

    fn level(&self) -> usize {
        self.as_cluster().level
    }

    fn origin(&self) -> Position {
        self.as_cluster().origin
    }

    fn shape(&self) -> Shape {
        self.as_cluster().shape
    }

    fn nodes(&self) -> &BTreeMap<NodeId, NodeIdx> {
        &self.as_cluster().nodes
    }

    fn border_nodes(&self) -> &BTreeSet<NodeIdx> {
        &self.as_cluster().border
    }
}

#[derive(Clone, Debug)]
pub struct NodeGraph {
    /// Flat cluster of this level: copies of every child border node.
    super_cluster: Cluster,
    /// Extent in cells of the child partition.
    size: Shape,
    clusters: BTreeMap<ClusterKey, Level>,
}

impl NodeGraph {
    /// Builds the tree under `top` from flat per-level cluster maps.
    pub fn assemble(top: Cluster, tiers: Vec<BTreeMap<ClusterKey, Cluster>>, partition: &Partition) -> Self {
        let mut by_parent: Vec<BTreeMap<ClusterKey, Vec<Cluster>>> = Vec::with_capacity(tiers.len());
        for tier in tiers {
            let mut groups: BTreeMap<ClusterKey, Vec<Cluster>> = BTreeMap::new();
            for cluster in tier.into_values() {
                if let Some(parent) = cluster.super_cluster {
                    groups.entry(parent).or_default().push(cluster);
                }
            }
            by_parent.push(groups);
        }
        Self::build(top, &mut by_parent, partition)
    }

    fn build(cluster: Cluster, by_parent: &mut [BTreeMap<ClusterKey, Vec<Cluster>>], partition: &Partition) -> Self {
        let child_level = cluster.level - 1;
        let children = by_parent[child_level].remove(&cluster.key).unwrap_or_default();
        let clusters = children
            .into_iter()
            .map(|child| {
                let key = child.key;
                let level = if child_level == 0 {
                    Level::Leaf(child)
                } else {
                    Level::Composite(Box::new(Self::build(child, by_parent, partition)))
                };
                (key, level)
            })
            .collect();
        Self { super_cluster: cluster, size: partition.extent(child_level), clusters }
    }

    pub fn super_cluster(&self) -> &Cluster {
        &self.super_cluster
    }

    pub fn level(&self) -> usize {
        self.super_cluster.level
    }

    pub fn size(&self) -> Shape {
        self.size
    }

    pub fn clusters(&self) -> &BTreeMap<ClusterKey, Level> {
        &self.clusters
    }

    /// Child node graphs keyed by cluster key; empty when children are leaves.
    pub fn lower_graphs(&self) -> impl Iterator<Item = (&ClusterKey, &NodeGraph)> {
        self.clusters.iter().filter_map(|(k, l)| match l {
            Level::Composite(g) => Some((k, g.as_ref())),
            Level::Leaf(_) => None,
        })
    }

    /// The node graph of `level` whose box holds `pos`.
    pub fn find_graph(&self, level: usize, pos: Position, partition: &Partition) -> Option<&NodeGraph> {
        if !self.super_cluster.contains(pos) || level > self.level() || level == 0 {
            return None;
        }
        if level == self.level() {
            return Some(self);
        }
        match self.clusters.get(&partition.key_of(self.level() - 1, pos))? {
            Level::Composite(g) => g.find_graph(level, pos, partition),
            Level::Leaf(_) => None,
        }
    }

    /// The cluster of `level` whose box holds `pos`.
    pub fn find(&self, level: usize, pos: Position, partition: &Partition) -> Option<&Cluster> {
        if level == 0 {
            let parent = self.find_graph(1, pos, partition)?;
            return parent.clusters.get(&partition.key_of(0, pos)).map(Level::as_cluster);
        }
        self.find_graph(level, pos, partition).map(|g| &g.super_cluster)
    }

    fn count(&self, per_level: &mut BTreeMap<usize, usize>) {
        *per_level.entry(self.level()).or_default() += 1;
        for level in self.clusters.values() {
            match level {
                Level::Leaf(c) => *per_level.entry(c.level).or_default() += 1,
                Level::Composite(g) => g.count(per_level),
            }
        }
    }
}

/// Abstract or bridging edge as seen from outside, for comparisons and reports.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EdgeSnapshot {
    pub level: usize,
    pub a: Position,
    pub b: Position,
    pub length: f64,
    pub walkable: bool,
    pub severed: bool,
    pub bridge: bool,
}

pub struct HierarchicalGraph {
    arena: NodeArena,
    grid: Occupancy,
    partition: Partition,
    config: GraphConfig,
    root: NodeGraph,
    stats: BuildStats,
}

fn locate<'a>(root: &'a NodeGraph, partition: &Partition, level: usize, key: ClusterKey) -> PathResult<&'a Cluster> {
    let top = partition.top_level();
    if level > top {
        return Err(PathError::UnknownLevel { level, levels: top });
    }
    let grid = partition
        .grid_position_of_key(level, key)
        .ok_or(PathError::UnknownCluster { level, key })?;
    root.find(level, partition.origin_of(level, grid), partition)
        .filter(|c| c.key == key)
        .ok_or(PathError::UnknownCluster { level, key })
}

impl HierarchicalGraph {
    pub fn build(grid: Occupancy, config: GraphConfig) -> PathResult<Self> {
        let mut out = run_pipeline(&grid, &config)?;
        let top = out
            .tiers
            .pop()
            .and_then(|tier| tier.into_values().next())
            .ok_or_else(|| PathError::BadPartition { reason: "partition produced no top cluster".into() })?;
        let root = NodeGraph::assemble(top, out.tiers, &out.partition);
        Ok(Self { arena: out.arena, grid, partition: out.partition, config, root, stats: out.stats })
    }

    /// Builds from `[z][y][x]` layers, non-zero meaning walkable.
    pub fn from_layers(layers: &[Vec<Vec<u8>>], config: GraphConfig) -> PathResult<Self> {
        Self::build(Occupancy::from_layers(layers)?, config)
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn grid(&self) -> &Occupancy {
        &self.grid
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn root(&self) -> &NodeGraph {
        &self.root
    }

    pub fn top_level(&self) -> usize {
        self.partition.top_level()
    }

    /// Number of clusters per level as held by the tree.
    pub fn cluster_counts(&self) -> BTreeMap<usize, usize> {
        let mut per_level = BTreeMap::new();
        self.root.count(&mut per_level);
        per_level
    }

    /// Finest node at `pos`.
    pub fn node_at(&self, pos: Position) -> PathResult<NodeIdx> {
        if !self.grid.in_bounds(pos) {
            return Err(PathError::OutOfBounds(pos));
        }
        let cluster = self.root.find(0, pos, &self.partition).ok_or(PathError::NoNodeAt(pos))?;
        cluster
            .id_of(pos)
            .and_then(|id| cluster.nodes.get(&id).copied())
            .ok_or(PathError::NoNodeAt(pos))
    }

    pub fn get_node(&self, pos: Position) -> Option<&PathNode> {
        self.node_at(pos).ok().map(|idx| self.arena.node(idx))
    }

    pub fn cluster(&self, level: usize, key: ClusterKey) -> PathResult<&Cluster> {
        locate(&self.root, &self.partition, level, key)
    }

    pub fn cluster_at(&self, level: usize, pos: Position) -> PathResult<&Cluster> {
        let top = self.top_level();
        if level > top {
            return Err(PathError::UnknownLevel { level, levels: top });
        }
        if !self.grid.in_bounds(pos) {
            return Err(PathError::OutOfBounds(pos));
        }
        let key = self.partition.key_of(level, pos);
        self.root.find(level, pos, &self.partition).ok_or(PathError::UnknownCluster { level, key })
    }

    /// The node graph rooted at cluster `key` of `level` (levels 1 and up).
    pub fn node_graph(&self, level: usize, key: ClusterKey) -> PathResult<&NodeGraph> {
        let origin = self.cluster(level, key)?.origin;
        self.root
            .find_graph(level, origin, &self.partition)
            .ok_or(PathError::UnknownCluster { level, key })
    }

    pub fn cluster_astar(&self, level: usize, key: ClusterKey, start: NodeId, end: NodeId, opts: &SearchOptions) -> PathResult<Vec<NodeId>> {
        self.cluster(level, key)?.astar(&self.arena, start, end, opts)
    }

    pub fn cluster_bfs(&self, level: usize, key: ClusterKey, start: NodeId, end: NodeId, opts: &SearchOptions) -> PathResult<Vec<NodeId>> {
        self.cluster(level, key)?.bfs(&self.arena, start, end, opts)
    }

    pub fn cluster_dfs(&self, level: usize, key: ClusterKey, start: NodeId, end: NodeId, opts: &SearchOptions) -> PathResult<Vec<NodeId>> {
        self.cluster(level, key)?.dfs(&self.arena, start, end, opts)
    }

    pub fn goal_cluster(&self, level: usize, key: ClusterKey) -> PathResult<GoalCluster<'_, NodeArena>> {
        Ok(GoalCluster::new(&self.arena, self.cluster(level, key)?))
    }

    pub fn session(&self) -> QuerySession<'_> {
        QuerySession::new(self)
    }

    /// One-shot fixed-capacity query; ephemeral nodes are released before returning.
    pub fn astar(&self, start: Position, end: Position, capacity: usize) -> PathResult<PathBuffer> {
        let mut session = self.session();
        let out = session.astar(start, end, capacity);
        session.clean_up();
        out
    }

    pub fn route(&self, start: Position, end: Position) -> PathResult<Option<Route>> {
        self.session().route(start, end)
    }

    /// Sets the speed coefficient of the finest edge `a`-`b`, signed so that
    /// travel from `a` to `b` gains `coefficient`.
    pub fn set_direction_coefficient(&mut self, a: Position, b: Position, coefficient: f64) -> PathResult<()> {
        let na = self.node_at(a)?;
        let nb = self.node_at(b)?;
        let e = self.arena.edge_between(na, nb).ok_or(PathError::NotAdjacent(a, b))?;
        let edge = self.arena.edge_mut(e);
        edge.direction_coefficient = if edge.a == na { coefficient } else { -coefficient };
        Ok(())
    }

    /// Changes one cell and repairs every level it can affect.
    ///
    /// Returns `Ok(false)` when the cell already had that value. Only cells that
    /// were open at build time have a node and can be toggled.
    pub fn set_walkable(&mut self, pos: Position, walkable: bool) -> PathResult<bool> {
        let n0 = self.node_at(pos)?;
        if self.arena.node(n0).walkable == walkable {
            return Ok(false);
        }
        self.grid.set(pos, walkable);

        let top = self.top_level();
        let mut dirty: Vec<BTreeSet<ClusterKey>> = vec![BTreeSet::new(); top + 1];
        let mut changed: Vec<EdgeIdx> = Vec::new();
        let mut cur = Some(n0);
        while let Some(n) = cur {
            let node = self.arena.node(n);
            dirty[node.level].insert(node.cluster);
            changed.extend(self.arena.set_node_walkable(n, walkable));
            cur = self.arena.node(n).upper;
        }
        for e in self.corner_edges(pos) {
            self.arena.adjust_blocked(e, !walkable, &mut changed);
        }
        for &e in &changed {
            let edge = self.arena.edge(e);
            for end in [edge.a, edge.b] {
                let node = self.arena.node(end);
                dirty[node.level].insert(node.cluster);
            }
        }

        let stats = self.propagate(dirty, 0);
        debug!(
            "set_walkable {} -> {}: {} edges flipped, {} abstract edges changed",
            pos,
            walkable,
            changed.len(),
            stats.changes()
        );
        Ok(true)
    }

    /// Recomputes one cluster's border distances and carries changes upward.
    pub fn update_connections(&mut self, level: usize, key: ClusterKey) -> PathResult<ConnectStats> {
        locate(&self.root, &self.partition, level, key)?;
        let mut dirty: Vec<BTreeSet<ClusterKey>> = vec![BTreeSet::new(); self.top_level() + 1];
        dirty[level].insert(key);
        Ok(self.propagate(dirty, level))
    }

    fn propagate(&mut self, mut dirty: Vec<BTreeSet<ClusterKey>>, from: usize) -> ConnectStats {
        let mut total = ConnectStats::default();
        for level in from..self.top_level() {
            for key in std::mem::take(&mut dirty[level]) {
                let Ok(cluster) = locate(&self.root, &self.partition, level, key) else { continue };
                let stats = update_cluster(&mut self.arena, cluster, &self.config);
                if stats.changes() > 0 {
                    if let Some(parent) = cluster.super_cluster {
                        dirty[level + 1].insert(parent);
                    }
                }
                total.absorb(&stats);
            }
        }
        total
    }

    /// Corner-checked diagonal edges that cut through the cell at `pos`.
    fn corner_edges(&self, pos: Position) -> BTreeSet<EdgeIdx> {
        let mut out = BTreeSet::new();
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if (dx, dy, dz) == (0, 0, 0) {
                        continue;
                    }
                    let Ok(n) = self.node_at(pos + Offset(dx, dy, dz)) else { continue };
                    for (_, e) in self.arena.neighbors(n) {
                        let edge = self.arena.edge(e);
                        if edge.corner_threshold.is_none() {
                            continue;
                        }
                        let pa = self.arena.node(edge.a).position;
                        let d = self.arena.node(edge.b).position - pa;
                        if d.non_zero_axes() >= 2 && d.axis_parts().any(|part| pa + part == pos) {
                            out.insert(e);
                        }
                    }
                }
            }
        }
        out
    }

    /// Bridges and every edge above the finest level, sorted.
    pub fn abstract_edges(&self) -> Vec<EdgeSnapshot> {
        let mut out: Vec<EdgeSnapshot> = self
            .arena
            .live_edges()
            .filter_map(|(_, e)| {
                let (a, b) = (self.arena.node(e.a), self.arena.node(e.b));
                if a.level == 0 && !e.connects_clusters {
                    return None;
                }
                Some(EdgeSnapshot {
                    level: a.level,
                    a: a.position,
                    b: b.position,
                    length: e.length,
                    walkable: e.walkable,
                    severed: e.severed,
                    bridge: e.connects_clusters,
                })
            })
            .collect();
        out.sort_by(|x, y| (x.level, x.a, x.b).cmp(&(y.level, y.a, y.b)));
        out
    }
}
