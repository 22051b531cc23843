use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use super::cluster::Cluster;
use super::cluster_builder::{build_leaf_clusters, Partition};
use super::config::GraphConfig;
use super::entrance_discovery::{connect_leaf_bridges, connect_lifted_bridges, leaf_candidates, lifted_candidates};
use super::error::PathResult;
use super::grid::Occupancy;
use super::inter_connector::lift_level;
use super::intra_connector::connect_level;
use super::models::{ClusterKey, Shape};
use super::node::NodeArena;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Stage {
    Partition,
    Bridging,
    Lift,
    Connectivity,
}

impl Stage {
    pub fn key(self) -> &'static str {
        match self {
            Stage::Partition => "partition",
            Stage::Bridging => "bridging",
            Stage::Lift => "lift",
            Stage::Connectivity => "connectivity",
        }
    }
    pub fn all() -> &'static [Stage] { &[Stage::Partition, Stage::Bridging, Stage::Lift, Stage::Connectivity] }
}

#[derive(Clone, Debug, Serialize)]
pub struct StageRun {
    pub stage: Stage,
    pub level: usize,
    pub millis: u128,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct LevelStats {
    pub level: usize,
    pub clusters: usize,
    pub nodes: usize,
    pub border_nodes: usize,
    pub candidates: usize,
    pub groups: usize,
    pub bridges: usize,
    /// Edges created in this level by the connectivity pass of the level below.
    pub intra_edges: usize,
    pub unreachable_pairs: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BuildStats {
    pub dims: Shape,
    pub corner_blocked: usize,
    pub levels: Vec<LevelStats>,
    pub stages: Vec<StageRun>,
}

impl BuildStats {
    pub fn ran(&self, stage: Stage) -> bool {
        self.stages.iter().any(|r| r.stage == stage)
    }

    fn record(&mut self, stage: Stage, level: usize, started: Instant) {
        self.stages.push(StageRun { stage, level, millis: started.elapsed().as_millis() });
    }
}

/// Everything the build produced, before it is assembled into a node graph tree.
pub struct BuildOutput {
    pub arena: NodeArena,
    pub partition: Partition,
    /// Clusters per level, finest first; the last tier holds the top cluster.
    pub tiers: Vec<BTreeMap<ClusterKey, Cluster>>,
    pub stats: BuildStats,
}

/// Runs partition, then bridging and lift per level, then connectivity bottom-up.
pub fn run_pipeline(grid: &Occupancy, cfg: &GraphConfig) -> PathResult<BuildOutput> {
    let partition = Partition::new(grid.dims(), &cfg.cluster_sizes)?;
    let top = partition.top_level();
    let mut arena = NodeArena::new();
    let mut stats = BuildStats {
        dims: grid.dims(),
        levels: (0..=top).map(|level| LevelStats { level, ..LevelStats::default() }).collect(),
        ..BuildStats::default()
    };

    let started = Instant::now();
    let (leaf, ps) = build_leaf_clusters(grid, &partition, cfg.movement, &mut arena);
    stats.corner_blocked = ps.corner_blocked;
    stats.record(Stage::Partition, 0, started);
    let mut tiers = vec![leaf];

    for level in 0..top {
        let started = Instant::now();
        let (bridges, bs) = if level == 0 {
            let candidates = leaf_candidates(&arena, &tiers[0], cfg.bridge_policy);
            connect_leaf_bridges(&mut arena, grid, &mut tiers[0], &candidates, cfg)
        } else {
            let candidates = lifted_candidates(&arena, &tiers[level]);
            connect_lifted_bridges(&mut arena, &mut tiers[level], &candidates, cfg, level)
        };
        let ls = &mut stats.levels[level];
        ls.candidates = bs.candidates;
        ls.groups = bs.groups;
        ls.bridges = bs.bridges;
        stats.record(Stage::Bridging, level, started);

        let started = Instant::now();
        let mut upper = partition.empty_clusters(level + 1);
        lift_level(&mut arena, &tiers[level], &mut upper, &partition, &bridges, level);
        tiers.push(upper);
        stats.record(Stage::Lift, level + 1, started);
    }

    for level in 0..top {
        let started = Instant::now();
        let cs = connect_level(&mut arena, &tiers[level], cfg, level);
        let ls = &mut stats.levels[level + 1];
        ls.intra_edges = cs.created;
        ls.unreachable_pairs = cs.pairs.saturating_sub(cs.created);
        stats.record(Stage::Connectivity, level, started);
    }

    for (level, tier) in tiers.iter().enumerate() {
        let ls = &mut stats.levels[level];
        ls.clusters = tier.len();
        ls.nodes = tier.values().map(|c| c.nodes.len()).sum();
        ls.border_nodes = tier.values().map(|c| c.border.len()).sum();
    }
    info!(
        "build: {} levels over {} grid, {} nodes in arena, {} live edges",
        top + 1,
        grid.dims(),
        arena.node_count(),
        arena.live_edge_count()
    );

    Ok(BuildOutput { arena, partition, tiers, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathing::node::GraphView;

    #[test]
    fn pipeline_runs_all_stages() -> anyhow::Result<()> {
        let grid = Occupancy::filled(Shape::new(8, 8, 1), 1);
        let out = run_pipeline(&grid, &GraphConfig::with_sizes(&[4]))?;
        for &stage in Stage::all() {
            assert!(out.stats.ran(stage), "stage {} did not run", stage.key());
        }
        assert_eq!(out.tiers.len(), 2);
        let l0 = &out.stats.levels[0];
        assert_eq!((l0.clusters, l0.nodes), (4, 64));
        // 4 shared faces of 4 cells each, one bridge per pair.
        assert_eq!(l0.bridges, 16);
        // The inner corner cell of each cluster sits on both faces.
        assert_eq!(l0.border_nodes, 28);
        let l1 = &out.stats.levels[1];
        assert_eq!(l1.nodes, 28);
        // 7 border nodes per cluster: C(7,2) pairs, all reachable.
        assert_eq!(l1.intra_edges, 4 * 21);
        assert_eq!(l1.unreachable_pairs, 0);
        for idx in out.arena.nodes_at_level(1) {
            assert!(out.arena.node(idx).lower.is_some());
        }
        Ok(())
    }

    #[test]
    fn bad_partition_fails_fast() {
        let grid = Occupancy::filled(Shape::new(6, 6, 1), 1);
        assert!(run_pipeline(&grid, &GraphConfig::with_sizes(&[4])).is_err());
    }
}
