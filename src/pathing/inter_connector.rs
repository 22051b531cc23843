use log::info;
use serde::Serialize;
use std::collections::BTreeMap;

use super::cluster::{Cluster, ClusterLike};
use super::cluster_builder::Partition;
use super::models::{ClusterKey, EdgeIdx};
use super::node::{Edge, GraphView, NodeArena, PathNode};

#[derive(Clone, Debug, Default, Serialize)]
pub struct LiftStats {
    pub nodes: usize,
    pub edges: usize,
}

/// Copies every border node of `level` into its enclosing cluster one level up
/// and mirrors each bridge between the copies.
///
/// The copy keeps the border node's position and walkability and links back
/// through `lower`/`upper`; the mirrored edge links to its bridge the same way.
pub fn lift_level(
    arena: &mut NodeArena,
    lower: &BTreeMap<ClusterKey, Cluster>,
    upper: &mut BTreeMap<ClusterKey, Cluster>,
    partition: &Partition,
    bridges: &[EdgeIdx],
    level: usize,
) -> LiftStats {
    let mut stats = LiftStats::default();
    for cluster in lower.values() {
        for &b in &cluster.border {
            let pos = arena.node(b).position;
            let key = partition.key_of(level + 1, pos);
            let Some(parent) = upper.get_mut(&key) else { continue };
            let Some(id) = parent.id_of(pos) else { continue };
            let copy = PathNode::lifted(b, arena.node(b), key, id);
            let idx = arena.add_node(copy);
            arena.node_mut(b).upper = Some(idx);
            parent.nodes.insert(id, idx);
            stats.nodes += 1;
        }
    }

    for &e in bridges {
        let (a, b, length) = {
            let edge = arena.edge(e);
            (edge.a, edge.b, edge.length)
        };
        let (Some(ua), Some(ub)) = (arena.node(a).upper, arena.node(b).upper) else {
            continue;
        };
        let mut lifted = Edge::placeholder(ua, ub);
        lifted.length = length;
        lifted.lower = Some(e);
        let up = arena.connect(lifted);
        arena.edge_mut(e).upper = Some(up);
        stats.edges += 1;
    }

    info!(
        "lift: level {} -> {} border copies, {} bridges mirrored into level {}",
        level,
        stats.nodes,
        stats.edges,
        level + 1
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathing::cluster_builder::build_leaf_clusters;
    use crate::pathing::config::GraphConfig;
    use crate::pathing::entrance_discovery::{connect_leaf_bridges, leaf_candidates};
    use crate::pathing::grid::Occupancy;
    use crate::pathing::models::{Position, Shape};
    use crate::pathing::neighbor_policy::MovementPolicy;

    #[test]
    fn border_nodes_and_bridges_are_mirrored() -> anyhow::Result<()> {
        let grid = Occupancy::filled(Shape::new(8, 2, 1), 1);
        let p = Partition::new(grid.dims(), &[4])?;
        let mut arena = NodeArena::new();
        let (mut leaf, _) = build_leaf_clusters(&grid, &p, MovementPolicy::EdgeDiagonal, &mut arena);
        let cands = leaf_candidates(&arena, &leaf, MovementPolicy::EdgeDiagonal);
        let cfg = GraphConfig::default();
        let (bridges, _) = connect_leaf_bridges(&mut arena, &grid, &mut leaf, &cands, &cfg);
        assert_eq!(bridges.len(), 2);

        let mut top = p.empty_clusters(1);
        let stats = lift_level(&mut arena, &leaf, &mut top, &p, &bridges, 0);
        assert_eq!(stats.nodes, 4);
        assert_eq!(stats.edges, 2);
        let top = &top[&ClusterKey(0)];
        assert_eq!(top.nodes.len(), 4);

        let e = bridges[0];
        let up = arena.edge(e).upper.expect("bridge was lifted");
        let lifted = arena.edge(up);
        assert_eq!(lifted.lower, Some(e));
        assert_eq!(arena.node(lifted.a).level, 1);
        assert_eq!(arena.node(lifted.a).lower, Some(arena.edge(e).a));
        assert_eq!(arena.node(lifted.a).position, Position::new(3, 0, 0));
        Ok(())
    }
}
