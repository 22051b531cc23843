use log::{debug, info};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use super::cluster::{Cluster, ClusterLike};
use super::config::GraphConfig;
use super::distance::{distance, DistanceKind};
use super::grid::Occupancy;
use super::models::{ClusterKey, EdgeIdx, NodeIdx, Position};
use super::neighbor_policy::MovementPolicy;
use super::node::{Edge, GraphView, NodeArena};

/// A node pair straddling the face between two clusters of one level.
/// `from` always has the smaller cluster key.
#[derive(Clone, Debug, PartialEq)]
pub struct BridgeCandidate {
    pub from: ClusterKey,
    pub to: ClusterKey,
    pub a: NodeIdx,
    pub b: NodeIdx,
    pub a_pos: Position,
    pub b_pos: Position,
    /// Lifted edge this candidate stands for (levels above the finest).
    pub lifted: Option<EdgeIdx>,
}

impl BridgeCandidate {
    pub fn is_face_step(&self) -> bool {
        (self.b_pos - self.a_pos).non_zero_axes() == 1
    }

    fn touches(&self, other: &BridgeCandidate) -> bool {
        self.from == other.from
            && self.to == other.to
            && self.a_pos.manhattan(other.a_pos) <= 1
            && self.b_pos.manhattan(other.b_pos) <= 1
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BridgeStats {
    pub candidates: usize,
    pub groups: usize,
    pub bridges: usize,
}

/// Finest-level candidates: node pairs across each positive cluster face whose
/// offset is a direction of the bridge policy.
pub fn leaf_candidates(
    arena: &NodeArena,
    clusters: &BTreeMap<ClusterKey, Cluster>,
    policy: MovementPolicy,
) -> Vec<BridgeCandidate> {
    let by_grid: BTreeMap<Position, ClusterKey> = clusters.values().map(|c| (c.grid_position, c.key)).collect();
    let mut out = Vec::new();
    for a in clusters.values() {
        for axis in 0..3 {
            let mut step = [0i32; 3];
            step[axis] = 1;
            let next = Position::new(a.grid_position.x + step[0], a.grid_position.y + step[1], a.grid_position.z + step[2]);
            let Some(b) = by_grid.get(&next).and_then(|k| clusters.get(k)) else { continue };
            let face = a.origin.axis(axis) + a.shape.axis(axis) as i32 - 1;
            for &u in a.nodes.values() {
                let u_pos = arena.node(u).position;
                if u_pos.axis(axis) != face {
                    continue;
                }
                for &d in policy.neighbor_offsets() {
                    if d.component(axis) != 1 {
                        continue;
                    }
                    let v_pos = u_pos + d;
                    let Some(v) = b.id_of(v_pos).and_then(|id| b.nodes.get(&id)) else { continue };
                    out.push(BridgeCandidate {
                        from: a.key,
                        to: b.key,
                        a: u,
                        b: *v,
                        a_pos: u_pos,
                        b_pos: v_pos,
                        lifted: None,
                    });
                }
            }
        }
    }
    out
}

/// Candidates one level up: lifted bridges whose endpoints now sit in two
/// different clusters of that level.
pub fn lifted_candidates(arena: &NodeArena, clusters: &BTreeMap<ClusterKey, Cluster>) -> Vec<BridgeCandidate> {
    let mut out = Vec::new();
    for c in clusters.values() {
        for &u in c.nodes.values() {
            for (v, e) in arena.neighbors(u) {
                let edge = arena.edge(e);
                let other = arena.node(v).cluster;
                if edge.lower.is_none() || other <= c.key {
                    continue;
                }
                out.push(BridgeCandidate {
                    from: c.key,
                    to: other,
                    a: u,
                    b: v,
                    a_pos: arena.node(u).position,
                    b_pos: arena.node(v).position,
                    lifted: Some(e),
                });
            }
        }
    }
    out
}

/// Picks which candidates become bridges.
///
/// Without grouping every candidate is kept. With grouping, touching candidates
/// of the same cluster pair are flood-filled into groups; groups smaller than
/// `singler` keep every member, larger ones keep one representative (the middle
/// face step of the sorted group, or the middle member if there is none).
pub fn select_bridges(candidates: &[BridgeCandidate], cfg: &GraphConfig) -> (Vec<usize>, usize) {
    if !cfg.groups_bridges() {
        return ((0..candidates.len()).collect(), candidates.len());
    }
    let mut by_pair: BTreeMap<(ClusterKey, ClusterKey), Vec<usize>> = BTreeMap::new();
    for (i, c) in candidates.iter().enumerate() {
        by_pair.entry((c.from, c.to)).or_default().push(i);
    }

    let mut selected = Vec::new();
    let mut groups = 0usize;
    for members in by_pair.values() {
        let mut seen = vec![false; members.len()];
        for start in 0..members.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut group = vec![members[start]];
            let mut q = VecDeque::from([start]);
            while let Some(i) = q.pop_front() {
                for j in 0..members.len() {
                    if !seen[j] && candidates[members[i]].touches(&candidates[members[j]]) {
                        seen[j] = true;
                        group.push(members[j]);
                        q.push_back(j);
                    }
                }
            }
            groups += 1;
            if group.len() < cfg.singler {
                selected.extend(group);
                continue;
            }
            group.sort_by_key(|&i| (candidates[i].a_pos, candidates[i].b_pos));
            let faces: Vec<usize> = group.iter().copied().filter(|&i| candidates[i].is_face_step()).collect();
            let pool = if faces.is_empty() { &group } else { &faces };
            selected.push(pool[pool.len() / 2]);
        }
    }
    selected.sort_unstable();
    (selected, groups)
}

/// Creates the finest-level bridge edges and records their endpoints as border nodes.
pub fn connect_leaf_bridges(
    arena: &mut NodeArena,
    grid: &Occupancy,
    clusters: &mut BTreeMap<ClusterKey, Cluster>,
    candidates: &[BridgeCandidate],
    cfg: &GraphConfig,
) -> (Vec<EdgeIdx>, BridgeStats) {
    let (selected, groups) = select_bridges(candidates, cfg);
    let policy = cfg.bridge_policy;
    let mut bridges = Vec::with_capacity(selected.len());
    for &i in &selected {
        let c = &candidates[i];
        let d = c.b_pos - c.a_pos;
        let mut edge = Edge::placeholder(c.a, c.b);
        edge.length = distance(c.a_pos, c.b_pos, DistanceKind::Diagonal);
        if d.non_zero_axes() >= 2 {
            if let Some(threshold) = policy.corner_threshold() {
                edge.corner_threshold = Some(threshold);
                edge.blocked = policy.further_movement_allowed(grid, c.a_pos, d).1;
            }
        }
        bridges.push(arena.connect(edge));
        mark_border(clusters, c);
    }
    let stats = BridgeStats { candidates: candidates.len(), groups, bridges: bridges.len() };
    info!(
        "bridging: level 0 -> {} candidates in {} groups, {} bridges",
        stats.candidates, stats.groups, stats.bridges
    );
    (bridges, stats)
}

/// Keeps the selected lifted candidates as bridges of `level` and drops the rest.
pub fn connect_lifted_bridges(
    arena: &mut NodeArena,
    clusters: &mut BTreeMap<ClusterKey, Cluster>,
    candidates: &[BridgeCandidate],
    cfg: &GraphConfig,
    level: usize,
) -> (Vec<EdgeIdx>, BridgeStats) {
    let (selected, groups) = select_bridges(candidates, cfg);
    let mut keep = vec![false; candidates.len()];
    for &i in &selected {
        keep[i] = true;
    }
    let mut bridges = Vec::with_capacity(selected.len());
    for (i, c) in candidates.iter().enumerate() {
        let Some(e) = c.lifted else { continue };
        if keep[i] {
            bridges.push(e);
            mark_border(clusters, c);
        } else {
            if let Some(lower) = arena.edge(e).lower {
                arena.edge_mut(lower).upper = None;
            }
            arena.remove_edge(e);
            debug!("bridging: level {} dropped lifted edge {} -> {}", level, c.a_pos, c.b_pos);
        }
    }
    let stats = BridgeStats { candidates: candidates.len(), groups, bridges: bridges.len() };
    info!(
        "bridging: level {} -> {} candidates in {} groups, {} bridges",
        level, stats.candidates, stats.groups, stats.bridges
    );
    (bridges, stats)
}

fn mark_border(clusters: &mut BTreeMap<ClusterKey, Cluster>, c: &BridgeCandidate) {
    if let Some(from) = clusters.get_mut(&c.from) {
        from.border.insert(c.a);
    }
    if let Some(to) = clusters.get_mut(&c.to) {
        to.border.insert(c.b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathing::cluster_builder::{build_leaf_clusters, Partition};
    use crate::pathing::models::Shape;

    fn two_clusters(policy: MovementPolicy) -> (NodeArena, BTreeMap<ClusterKey, Cluster>, Occupancy) {
        let grid = Occupancy::filled(Shape::new(8, 4, 1), 1);
        let p = Partition::new(grid.dims(), &[4]).unwrap();
        let mut arena = NodeArena::new();
        let (clusters, _) = build_leaf_clusters(&grid, &p, policy, &mut arena);
        (arena, clusters, grid)
    }

    #[test]
    fn face_candidates_between_two_clusters() {
        let (arena, clusters, _) = two_clusters(MovementPolicy::EdgeDiagonal);
        let cands = leaf_candidates(&arena, &clusters, MovementPolicy::EdgeDiagonal);
        assert_eq!(cands.len(), 4);
        assert!(cands.iter().all(|c| c.a_pos.x == 3 && c.b_pos.x == 4 && c.is_face_step()));

        let full = leaf_candidates(&arena, &clusters, MovementPolicy::FullDiagonal);
        // 4 straight plus 3 up-right and 3 down-right diagonals.
        assert_eq!(full.len(), 10);
    }

    #[test]
    fn grouping_collapses_large_groups() {
        let (arena, clusters, _) = two_clusters(MovementPolicy::EdgeDiagonal);
        let cands = leaf_candidates(&arena, &clusters, MovementPolicy::EdgeDiagonal);

        let all = GraphConfig { singler: 0, ..GraphConfig::default() };
        assert_eq!(select_bridges(&cands, &all).0.len(), 4);

        let grouped = GraphConfig { singler: 2, ..GraphConfig::default() };
        let (picked, groups) = select_bridges(&cands, &grouped);
        assert_eq!(groups, 1);
        assert_eq!(picked.len(), 1);
        assert_eq!(cands[picked[0]].a_pos, Position::new(3, 2, 0));

        // A group below the threshold keeps every member.
        let small = GraphConfig { singler: 5, ..GraphConfig::default() };
        assert_eq!(select_bridges(&cands, &small).0.len(), 4);

        let independent = GraphConfig { singler: 2, grouping: crate::pathing::config::Grouping::Independent, ..GraphConfig::default() };
        assert_eq!(select_bridges(&cands, &independent).0.len(), 4);
    }

    #[test]
    fn split_faces_form_separate_groups() {
        let (mut arena, clusters, _) = two_clusters(MovementPolicy::EdgeDiagonal);
        let mut cands = leaf_candidates(&arena, &clusters, MovementPolicy::EdgeDiagonal);
        // Drop the pair at y=1 so the face splits into {y0} and {y2,y3}.
        cands.retain(|c| c.a_pos.y != 1);
        let cfg = GraphConfig { singler: 2, ..GraphConfig::default() };
        let (picked, groups) = select_bridges(&cands, &cfg);
        assert_eq!(groups, 2);
        assert_eq!(picked.len(), 2);

        let grid = Occupancy::filled(Shape::new(8, 4, 1), 1);
        let mut clusters = clusters;
        let (bridges, stats) = connect_leaf_bridges(&mut arena, &grid, &mut clusters, &cands, &cfg);
        assert_eq!(bridges.len(), 2);
        assert_eq!(stats.candidates, 3);
        assert_eq!(clusters[&ClusterKey(0)].border.len(), 2);
        assert_eq!(clusters[&ClusterKey(1)].border.len(), 2);
        assert!(bridges.iter().all(|&e| arena.edge(e).connects_clusters && arena.edge(e).walkable));
    }

    #[test]
    fn bridges_take_the_step_length() {
        let (mut arena, mut clusters, grid) = two_clusters(MovementPolicy::EdgeDiagonal);
        let cands = leaf_candidates(&arena, &clusters, MovementPolicy::EdgeDiagonal);
        let cfg = GraphConfig { singler: 0, ..GraphConfig::default() };
        let (bridges, _) = connect_leaf_bridges(&mut arena, &grid, &mut clusters, &cands, &cfg);
        assert_eq!(bridges.len(), cands.len());
        for &e in &bridges {
            let edge = arena.edge(e);
            let (pa, pb) = (arena.node(edge.a).position, arena.node(edge.b).position);
            assert_eq!(edge.length, distance(pa, pb, DistanceKind::Diagonal));
        }
        assert!(bridges.iter().any(|&e| arena.edge(e).length == 2f64.sqrt()));
    }
}
