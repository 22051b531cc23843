use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use super::synthetic::{self, WorldSpec};
use super::CommonOpts;
use crate::pathing::config::GraphConfig;
use crate::pathing::executor::BuildStats;
use crate::pathing::grid::Occupancy;
use crate::pathing::models::{Position, Shape};
use crate::pathing::node_graph::{EdgeSnapshot, HierarchicalGraph};
use crate::pathing::query::{PathBuffer, Route};

#[derive(Debug, Serialize)]
pub struct WorldReport {
    pub dims: Shape,
    pub open_cells: usize,
    pub config: GraphConfig,
    pub build: BuildStats,
    pub clusters_per_level: BTreeMap<usize, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<EdgeSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct RouteReport {
    pub from: Position,
    pub to: Position,
    pub blocked: Vec<Position>,
    pub route: Option<Route>,
    pub buffer: PathBuffer,
    pub millis: u128,
}

/// Reads layers from `--layers` or generates the seeded world, keeping `keep_open` cells open.
pub fn load_world(common: &CommonOpts, keep_open: &[Position]) -> Result<Occupancy> {
    if let Some(path) = &common.layers {
        let raw = fs::read_to_string(path).with_context(|| format!("reading layers from {}", path.display()))?;
        let layers: Vec<Vec<Vec<u8>>> =
            serde_json::from_str(&raw).with_context(|| format!("parsing layers in {}", path.display()))?;
        return Ok(Occupancy::from_layers(&layers)?);
    }
    let d = common.dims;
    if d.x <= 0 || d.y <= 0 || d.z <= 0 {
        anyhow::bail!("world dims must be positive, got {}", d);
    }
    let spec = WorldSpec {
        dims: Shape::new(d.x as usize, d.y as usize, d.z as usize),
        density: common.density,
        seed: common.seed,
    };
    Ok(synthetic::generate(&spec, keep_open)?)
}

fn report(graph: &HierarchicalGraph) -> WorldReport {
    WorldReport {
        dims: graph.grid().dims(),
        open_cells: graph.grid().open_count(),
        config: graph.config().clone(),
        build: graph.stats().clone(),
        clusters_per_level: graph.cluster_counts(),
        route: None,
        edges: Vec::new(),
    }
}

pub fn run_inspect(grid: Occupancy, cfg: GraphConfig, with_edges: bool) -> Result<WorldReport> {
    let graph = HierarchicalGraph::build(grid, cfg)?;
    let mut out = report(&graph);
    if with_edges {
        out.edges = graph.abstract_edges();
    }
    Ok(out)
}

pub fn run_route(
    grid: Occupancy,
    cfg: GraphConfig,
    from: Position,
    to: Position,
    capacity: usize,
    block: &[Position],
) -> Result<WorldReport> {
    let mut graph = HierarchicalGraph::build(grid, cfg)?;
    for &cell in block {
        match graph.set_walkable(cell, false) {
            Ok(_) => {}
            Err(e) => warn!("route: cannot block {}: {}", cell, e),
        }
    }

    let started = Instant::now();
    let mut session = graph.session();
    let route = session.route(from, to)?;
    session.clean_up();
    let millis = started.elapsed().as_millis();
    let positions = route.as_ref().map(|r| r.positions.as_slice()).unwrap_or(&[]);
    let buffer = PathBuffer::fill(capacity, positions);
    match &route {
        Some(r) => info!("route: {} -> {} in {} cells, cost {:.3}", from, to, r.len(), r.cost),
        None => info!("route: {} -> {} unreachable", from, to),
    }
    if buffer.truncated() {
        warn!("route: path of {} cells truncated to capacity {}", positions.len(), capacity);
    }

    let mut out = report(&graph);
    out.route = Some(RouteReport { from, to, blocked: block.to_vec(), route, buffer, millis });
    Ok(out)
}

pub fn emit(report: &WorldReport, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match path {
        Some(p) => {
            fs::write(p, json).with_context(|| format!("writing report to {}", p.display()))?;
            info!("report written to {}", p.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
