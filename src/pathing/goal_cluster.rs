//! Goal-centric routing inside one cluster.
//!
//! A single Dijkstra relaxation from the goal leaves every reached node with a
//! pointer to its next hop, so repeated "which way now" questions towards the
//! same goal are lookups. The relaxation can run eagerly over the whole
//! cluster or lazily, only as far as each question needs.

use log::debug;
use std::collections::{BTreeMap, HashSet};

use super::cluster::{Cluster, ClusterLike};
use super::error::PathResult;
use super::models::{NodeId, NodeIdx, Position};
use super::node::GraphView;
use super::search::{Frontier, SearchScope};

#[derive(Clone, Debug, PartialEq)]
pub struct GoalNode {
    pub node: NodeIdx,
    /// Neighbor one step closer to `goal`.
    pub goal_this_way: Option<NodeIdx>,
    /// Goal the pointer is valid for.
    pub goal: Option<NodeId>,
    pub distance: f64,
}

pub struct GoalCluster<'a, G: GraphView> {
    graph: &'a G,
    cluster: &'a Cluster,
    scope: SearchScope,
    nodes: BTreeMap<NodeId, GoalNode>,
    goal: Option<NodeId>,
    frontier: Frontier,
    settled: HashSet<NodeIdx>,
}

impl<'a, G: GraphView> GoalCluster<'a, G> {
    pub fn new(graph: &'a G, cluster: &'a Cluster) -> Self {
        let nodes = cluster
            .nodes
            .iter()
            .map(|(&id, &node)| (id, GoalNode { node, goal_this_way: None, goal: None, distance: f64::INFINITY }))
            .collect();
        Self {
            graph,
            cluster,
            scope: cluster.scope(),
            nodes,
            goal: None,
            frontier: Frontier::new(),
            settled: HashSet::new(),
        }
    }

    pub fn goal(&self) -> Option<NodeId> {
        self.goal
    }

    pub fn goal_node(&self, id: NodeId) -> Option<&GoalNode> {
        self.nodes.get(&id)
    }

    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }

    /// Eager build: relaxes the whole cluster towards `goal_id`.
    pub fn build_graph(&mut self, goal_id: NodeId) -> PathResult<()> {
        self.set_goal(goal_id)?;
        while self.expand_one().is_some() {}
        debug!(
            "goal: cluster {} settled {} of {} nodes towards {}",
            self.cluster.key,
            self.settled.len(),
            self.nodes.len(),
            goal_id
        );
        Ok(())
    }

    /// Resets all routing information and seeds the frontier with the new goal.
    pub fn set_goal(&mut self, goal_id: NodeId) -> PathResult<()> {
        let goal = self.cluster.node_by_id(goal_id)?;
        for gn in self.nodes.values_mut() {
            gn.goal_this_way = None;
            gn.goal = None;
            gn.distance = f64::INFINITY;
        }
        self.frontier = Frontier::new();
        self.settled.clear();
        self.goal = Some(goal_id);
        if self.graph.node(goal).walkable {
            if let Some(gn) = self.nodes.get_mut(&goal_id) {
                gn.distance = 0.0;
                gn.goal = Some(goal_id);
            }
            self.frontier.push(goal, 0.0, 0.0);
        }
        Ok(())
    }

    /// Settles one node; `None` once the frontier is exhausted.
    fn expand_one(&mut self) -> Option<NodeIdx> {
        loop {
            let entry = self.frontier.pop()?;
            let id = self.graph.node(entry.node).id;
            let best = self.nodes.get(&id).map_or(f64::INFINITY, |gn| gn.distance);
            if self.settled.contains(&entry.node) || entry.cost > best {
                continue;
            }
            self.settled.insert(entry.node);
            for (next, e) in self.graph.neighbors(entry.node) {
                let edge = self.graph.edge(e);
                let node = self.graph.node(next);
                if !edge.walkable || !node.walkable || node.ephemeral || !self.scope.admits(node) {
                    continue;
                }
                let candidate = entry.cost + edge.length;
                let Some(gn) = self.nodes.get_mut(&node.id) else { continue };
                if candidate < gn.distance {
                    gn.distance = candidate;
                    gn.goal_this_way = Some(entry.node);
                    gn.goal = self.goal;
                    self.frontier.push(next, candidate, candidate);
                }
            }
            return Some(entry.node);
        }
    }

    /// Lazy lookup: expands the frontier until `from_id` is settled, then answers.
    pub fn live_get_next_node(&mut self, from_id: NodeId) -> PathResult<Option<NodeId>> {
        let from = self.cluster.node_by_id(from_id)?;
        if self.goal.is_some() {
            while !self.settled.contains(&from) {
                if self.expand_one().is_none() {
                    break;
                }
            }
        }
        self.get_next_node(from_id)
    }

    /// Next hop towards the goal from a settled node; `None` at the goal or when unreached.
    pub fn get_next_node(&self, from_id: NodeId) -> PathResult<Option<NodeId>> {
        let from = self.cluster.node_by_id(from_id)?;
        Ok(self.valid(from_id, from).and_then(|gn| gn.goal_this_way).map(|n| self.graph.node(n).id))
    }

    pub fn get_next_pos(&self, from_id: NodeId) -> PathResult<Option<Position>> {
        let from = self.cluster.node_by_id(from_id)?;
        Ok(self
            .valid(from_id, from)
            .and_then(|gn| gn.goal_this_way)
            .map(|n| self.graph.node(n).position))
    }

    pub fn distance_to_goal(&self, from_id: NodeId) -> PathResult<Option<f64>> {
        let from = self.cluster.node_by_id(from_id)?;
        Ok(self.valid(from_id, from).map(|gn| gn.distance))
    }

    fn valid(&self, id: NodeId, idx: NodeIdx) -> Option<&GoalNode> {
        if self.goal.is_none() || !self.settled.contains(&idx) {
            return None;
        }
        self.nodes.get(&id).filter(|gn| gn.goal == self.goal)
    }
}
