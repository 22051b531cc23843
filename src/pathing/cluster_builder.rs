use log::info;
use serde::Serialize;
use std::collections::BTreeMap;

use super::cluster::{Cluster, ClusterLike};
use super::error::{PathError, PathResult};
use super::grid::Occupancy;
use super::models::{ClusterKey, Position, Shape};
use super::neighbor_policy::MovementPolicy;
use super::node::{Edge, NodeArena, PathNode};

/// Cluster boxes per level. Level `k < top` uses the product of the first
/// `k + 1` sizes as its edge length; the top level is one box over the grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Partition {
    dims: Shape,
    sizes: Vec<usize>,
    extents: Vec<Shape>,
    counts: Vec<Shape>,
}

impl Partition {
    pub fn new(dims: Shape, sizes: &[usize]) -> PathResult<Self> {
        if sizes.is_empty() {
            return Err(PathError::BadPartition { reason: "no cluster sizes given".into() });
        }
        if let Some(i) = sizes.iter().position(|&s| s == 0) {
            return Err(PathError::BadPartition { reason: format!("cluster size {i} is zero") });
        }
        if let Some(axis) = (0..3).find(|&a| dims.axis(a) == 0) {
            return Err(PathError::MalformedGrid { reason: format!("grid axis {axis} has length zero") });
        }
        let mut extents = Vec::with_capacity(sizes.len() + 1);
        let mut edge = 1usize;
        for (level, &size) in sizes.iter().enumerate() {
            edge = edge.saturating_mul(size);
            let mut clipped = [0usize; 3];
            for (axis, slot) in clipped.iter_mut().enumerate() {
                let dim = dims.axis(axis);
                if dim > edge && dim % edge != 0 {
                    return Err(PathError::BadPartition {
                        reason: format!("level {level} edge {edge} does not divide grid axis {axis} of length {dim}"),
                    });
                }
                *slot = dim.min(edge);
            }
            extents.push(Shape::new(clipped[0], clipped[1], clipped[2]));
        }
        extents.push(dims);
        let counts = extents
            .iter()
            .map(|e| Shape::new(dims.x / e.x, dims.y / e.y, dims.z / e.z))
            .collect();
        Ok(Self { dims, sizes: sizes.to_vec(), extents, counts })
    }

    pub fn dims(&self) -> Shape {
        self.dims
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Highest level; it holds a single cluster.
    pub fn top_level(&self) -> usize {
        self.sizes.len()
    }

    pub fn extent(&self, level: usize) -> Shape {
        self.extents[level]
    }

    pub fn counts(&self, level: usize) -> Shape {
        self.counts[level]
    }

    pub fn cluster_count(&self, level: usize) -> usize {
        self.counts[level].volume()
    }

    pub fn grid_position_of(&self, level: usize, pos: Position) -> Position {
        let e = self.extents[level];
        Position::new(pos.x / e.x as i32, pos.y / e.y as i32, pos.z / e.z as i32)
    }

    pub fn key_at_grid(&self, level: usize, grid: Position) -> ClusterKey {
        let c = self.counts[level];
        ClusterKey(grid.x as u64 + grid.y as u64 * c.x as u64 + grid.z as u64 * (c.x * c.y) as u64)
    }

    /// Key of the cluster holding `pos`. `pos` must lie in the grid.
    pub fn key_of(&self, level: usize, pos: Position) -> ClusterKey {
        self.key_at_grid(level, self.grid_position_of(level, pos))
    }

    pub fn grid_position_of_key(&self, level: usize, key: ClusterKey) -> Option<Position> {
        let c = *self.counts.get(level)?;
        if key.0 >= c.volume() as u64 {
            return None;
        }
        Some(c.position_of(Position::default(), key.0 as u32))
    }

    pub fn origin_of(&self, level: usize, grid: Position) -> Position {
        let e = self.extents[level];
        Position::new(grid.x * e.x as i32, grid.y * e.y as i32, grid.z * e.z as i32)
    }

    pub fn parent_key(&self, level: usize, key: ClusterKey) -> Option<ClusterKey> {
        if level >= self.top_level() {
            return None;
        }
        let grid = self.grid_position_of_key(level, key)?;
        Some(self.key_of(level + 1, self.origin_of(level, grid)))
    }

    /// Empty clusters covering the grid at `level`, keyed and parented.
    pub fn empty_clusters(&self, level: usize) -> BTreeMap<ClusterKey, Cluster> {
        let c = self.counts[level];
        let mut out = BTreeMap::new();
        for gz in 0..c.z as i32 {
            for gy in 0..c.y as i32 {
                for gx in 0..c.x as i32 {
                    let grid = Position::new(gx, gy, gz);
                    let key = self.key_at_grid(level, grid);
                    let mut cluster = Cluster::new(key, level, grid, self.origin_of(level, grid), self.extent(level));
                    cluster.super_cluster = self.parent_key(level, key);
                    out.insert(key, cluster);
                }
            }
        }
        out
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PartitionStats {
    pub clusters: usize,
    pub nodes: usize,
    pub edges: usize,
    pub corner_blocked: usize,
}

/// Materialises one node per open cell and wires in-cluster adjacency.
///
/// Cells are scanned in (z, y, x) order and each new node is connected to the
/// already-created neighbors of its own cluster. Diagonal edges of a
/// corner-checked policy start with the number of solid cells they cut through.
pub fn build_leaf_clusters(
    grid: &Occupancy,
    partition: &Partition,
    policy: MovementPolicy,
    arena: &mut NodeArena,
) -> (BTreeMap<ClusterKey, Cluster>, PartitionStats) {
    let mut clusters = partition.empty_clusters(0);
    let mut stats = PartitionStats { clusters: clusters.len(), ..PartitionStats::default() };
    let dims = grid.dims();
    let offsets = policy.neighbor_offsets();

    for z in 0..dims.z as i32 {
        for y in 0..dims.y as i32 {
            for x in 0..dims.x as i32 {
                let pos = Position::new(x, y, z);
                if !grid.is_open(pos) {
                    continue;
                }
                let key = partition.key_of(0, pos);
                let Some(cluster) = clusters.get_mut(&key) else { continue };
                let Some(id) = cluster.id_of(pos) else { continue };
                let idx = arena.add_node(PathNode::new(pos, 0, key, id));
                cluster.nodes.insert(id, idx);
                stats.nodes += 1;

                for &d in offsets {
                    let npos = pos + d;
                    let Some(nid) = cluster.id_of(npos) else { continue };
                    let Some(&nidx) = cluster.nodes.get(&nid) else { continue };
                    if nidx == idx {
                        continue;
                    }
                    let mut edge = Edge::direct(idx, pos, nidx, npos);
                    if d.non_zero_axes() >= 2 {
                        if let Some(threshold) = policy.corner_threshold() {
                            let (allowed, blocking) = policy.further_movement_allowed(grid, pos, d);
                            edge.corner_threshold = Some(threshold);
                            edge.blocked = blocking;
                            if !allowed {
                                stats.corner_blocked += 1;
                            }
                        }
                    }
                    arena.connect(edge);
                    stats.edges += 1;
                }
            }
        }
    }

    info!(
        "partition: level 0 -> {} clusters, {} nodes, {} edges ({} corner-blocked)",
        stats.clusters, stats.nodes, stats.edges, stats.corner_blocked
    );
    (clusters, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathing::models::NodeId;
    use crate::pathing::node::GraphView;

    #[test]
    fn extents_and_keys() -> anyhow::Result<()> {
        let p = Partition::new(Shape::new(16, 16, 1), &[4, 2])?;
        assert_eq!(p.top_level(), 2);
        assert_eq!(p.extent(0), Shape::new(4, 4, 1));
        assert_eq!(p.extent(1), Shape::new(8, 8, 1));
        assert_eq!(p.extent(2), Shape::new(16, 16, 1));
        assert_eq!(p.cluster_count(0), 16);
        assert_eq!(p.cluster_count(1), 4);
        assert_eq!(p.cluster_count(2), 1);

        let pos = Position::new(9, 5, 0);
        assert_eq!(p.key_of(0, pos), ClusterKey(2 + 4));
        assert_eq!(p.key_of(1, pos), ClusterKey(1));
        assert_eq!(p.parent_key(0, ClusterKey(6)), Some(ClusterKey(1)));
        assert_eq!(p.parent_key(1, ClusterKey(1)), Some(ClusterKey(0)));
        assert_eq!(p.parent_key(2, ClusterKey(0)), None);
        assert_eq!(p.grid_position_of_key(0, ClusterKey(16)), None);
        Ok(())
    }

    #[test]
    fn uneven_partitions_are_rejected() {
        assert!(matches!(
            Partition::new(Shape::new(10, 8, 1), &[4]),
            Err(PathError::BadPartition { .. })
        ));
        assert!(Partition::new(Shape::new(8, 8, 1), &[]).is_err());
        assert!(Partition::new(Shape::new(8, 8, 1), &[0]).is_err());
        assert!(matches!(
            Partition::new(Shape::new(0, 4, 1), &[4]),
            Err(PathError::MalformedGrid { .. })
        ));
        // A grid smaller than one cluster is a single clipped cluster.
        let p = Partition::new(Shape::new(5, 5, 1), &[8]).unwrap();
        assert_eq!(p.extent(0), Shape::new(5, 5, 1));
        assert_eq!(p.cluster_count(0), 1);
    }

    #[test]
    fn leaf_clusters_wire_in_cluster_edges_only() -> anyhow::Result<()> {
        let grid = Occupancy::filled(Shape::new(4, 2, 1), 1);
        let p = Partition::new(grid.dims(), &[2])?;
        let mut arena = NodeArena::new();
        let (clusters, stats) = build_leaf_clusters(&grid, &p, MovementPolicy::EdgeDiagonal, &mut arena);
        assert_eq!(clusters.len(), 2);
        assert_eq!(stats.nodes, 8);
        // Each 2x2 cluster is a 4-cycle under faces-and-ramps on one layer.
        assert_eq!(stats.edges, 8);
        let left = &clusters[&ClusterKey(0)];
        let a = left.node_by_id(NodeId(1))?;
        assert_eq!(arena.node(a).position, Position::new(1, 0, 0));
        assert!(arena.neighbors(a).iter().all(|&(n, _)| arena.node(n).cluster == ClusterKey(0)));
        Ok(())
    }

    #[test]
    fn corner_checked_diagonals_start_blocked() -> anyhow::Result<()> {
        let layers = vec![vec![vec![1, 0], vec![1, 1]]];
        let grid = Occupancy::from_layers(&layers)?;
        let p = Partition::new(grid.dims(), &[2])?;
        let mut arena = NodeArena::new();
        let (clusters, stats) = build_leaf_clusters(&grid, &p, MovementPolicy::OneCornerDiagonal, &mut arena);
        assert_eq!(stats.corner_blocked, 1);
        let c = &clusters[&ClusterKey(0)];
        let origin = c.node_by_id(NodeId(0))?;
        let far = c.node_by_id(NodeId(3))?;
        // (0,0)-(1,1) cuts (1,0), which is solid.
        let e = arena.edge_between(origin, far).expect("diagonal edge exists");
        assert_eq!(arena.edge(e).blocked, 1);
        assert!(!arena.edge(e).walkable);
        Ok(())
    }
}
