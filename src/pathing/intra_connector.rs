use log::{debug, info, trace};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use super::cluster::{Cluster, ClusterLike};
use super::config::GraphConfig;
use super::models::{ClusterKey, NodeIdx};
use super::node::{Edge, GraphView, NodeArena};
use super::search::{astar, SearchOptions};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConnectStats {
    pub clusters: usize,
    pub pairs: usize,
    pub created: usize,
    pub updated: usize,
    pub severed: usize,
}

impl ConnectStats {
    /// Edges whose existence, length or walkability changed.
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.severed
    }

    pub fn absorb(&mut self, other: &ConnectStats) {
        self.clusters += other.clusters;
        self.pairs += other.pairs;
        self.created += other.created;
        self.updated += other.updated;
        self.severed += other.severed;
    }
}

/// Outcome of one border-to-border search inside a cluster.
#[derive(Clone, Debug)]
pub struct BorderRoute {
    pub from: NodeIdx,
    pub to: NodeIdx,
    pub found: Option<(Vec<NodeIdx>, f64)>,
}

pub fn search_options(cfg: &GraphConfig) -> SearchOptions {
    SearchOptions { distance: cfg.distance, max_expansions: cfg.max_expansions, ..SearchOptions::default() }
}

/// Searches every unordered pair of border nodes inside the cluster box.
/// Searches only read the arena, so `parallel` fans pairs out over rayon.
pub fn border_routes<C: ClusterLike + Sync + ?Sized>(
    arena: &NodeArena,
    cluster: &C,
    opts: &SearchOptions,
    parallel: bool,
) -> Vec<BorderRoute> {
    let border: Vec<NodeIdx> = cluster.border_nodes().iter().copied().collect();
    let mut pairs = Vec::with_capacity(border.len() * border.len().saturating_sub(1) / 2);
    for (i, &a) in border.iter().enumerate() {
        for &b in &border[i + 1..] {
            pairs.push((a, b));
        }
    }
    let scope = cluster.scope();
    let search = |&(from, to): &(NodeIdx, NodeIdx)| {
        let found = astar(arena, from, to, &scope, opts).into_path();
        trace!(
            "connect: cluster {} pair {} -> {} cost {:?}",
            cluster.key(),
            arena.node(from).position,
            arena.node(to).position,
            found.as_ref().map(|(_, c)| *c)
        );
        BorderRoute { from, to, found }
    };
    if parallel {
        pairs.par_iter().map(search).collect()
    } else {
        pairs.iter().map(search).collect()
    }
}

/// Materialises routes as edges between the upper copies of their endpoints.
///
/// A new route creates an edge; a changed length or a severed edge is updated;
/// a lost route severs the existing edge. Lengths are compared exactly so a
/// restored route restores the original bits. Application order is the route order.
pub fn apply_routes(arena: &mut NodeArena, routes: Vec<BorderRoute>, store_paths: bool) -> ConnectStats {
    let mut stats = ConnectStats { pairs: routes.len(), ..ConnectStats::default() };
    for route in routes {
        let (Some(ua), Some(ub)) = (arena.node(route.from).upper, arena.node(route.to).upper) else {
            continue;
        };
        match (route.found, arena.edge_between(ua, ub)) {
            (Some((path, cost)), None) => {
                let mut edge = Edge::with_length(ua, ub, cost);
                if store_paths {
                    edge.path = Some(path);
                }
                arena.connect(edge);
                stats.created += 1;
            }
            (Some((mut path, cost)), Some(e)) => {
                let edge = arena.edge_mut(e);
                if edge.a != ua {
                    path.reverse();
                }
                if edge.severed || edge.length != cost {
                    edge.length = cost;
                    edge.severed = false;
                    stats.updated += 1;
                }
                if store_paths {
                    edge.path = Some(path);
                }
                arena.refresh_edge(e);
            }
            (None, Some(e)) => {
                if !arena.edge(e).severed {
                    let edge = arena.edge_mut(e);
                    edge.severed = true;
                    edge.path = None;
                    arena.refresh_edge(e);
                    stats.severed += 1;
                }
            }
            (None, None) => {}
        }
    }
    stats
}

/// Recomputes every border-to-border distance of one cluster on the calling thread.
pub fn update_cluster<C: ClusterLike + Sync + ?Sized>(arena: &mut NodeArena, cluster: &C, cfg: &GraphConfig) -> ConnectStats {
    connect_cluster(arena, cluster, cfg, false)
}

fn connect_cluster<C: ClusterLike + Sync + ?Sized>(
    arena: &mut NodeArena,
    cluster: &C,
    cfg: &GraphConfig,
    parallel: bool,
) -> ConnectStats {
    let routes = border_routes(arena, cluster, &search_options(cfg), parallel);
    let mut stats = apply_routes(arena, routes, cfg.store_paths);
    stats.clusters = 1;
    if stats.changes() > 0 {
        debug!(
            "connect: level {} cluster {} -> {} created, {} updated, {} severed",
            cluster.level(),
            cluster.key(),
            stats.created,
            stats.updated,
            stats.severed
        );
    }
    stats
}

/// Connectivity pass over every cluster of one level. Levels must be processed
/// bottom-up because each pass searches the edges the previous one created.
pub fn connect_level(
    arena: &mut NodeArena,
    clusters: &BTreeMap<ClusterKey, Cluster>,
    cfg: &GraphConfig,
    level: usize,
) -> ConnectStats {
    let mut stats = ConnectStats::default();
    for cluster in clusters.values() {
        if cluster.border.len() < 2 {
            continue;
        }
        stats.absorb(&connect_cluster(arena, cluster, cfg, true));
    }
    info!(
        "connect: level {} -> {} clusters, {} pairs, {} edges into level {} ({} unreachable pairs)",
        level,
        stats.clusters,
        stats.pairs,
        stats.created,
        level + 1,
        stats.pairs.saturating_sub(stats.created)
    );
    stats
}
