use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

pub mod synthetic;
pub mod world;

use crate::pathing::config::{parse_sizes, Config};
use crate::pathing::logging;
use crate::pathing::models::Position;

#[derive(Args, Debug, Clone, Default)]
pub struct CommonOpts {
    /// Cluster edge length per level, finest first (comma-separated; HPA_CLUSTER_SIZES)
    #[arg(long = "cluster-sizes")]
    pub cluster_sizes: Option<String>,
    /// Movement policy key 0-4 (HPA_MOVEMENT)
    #[arg(long = "movement")]
    pub movement_key: Option<u8>,
    /// Movement policy used for bridge candidates; defaults to --movement (HPA_BRIDGE_KEY)
    #[arg(long = "bridge-key")]
    pub bridge_key: Option<u8>,
    /// Bridge grouping threshold, 0 disables grouping (HPA_SINGLER)
    #[arg(long = "singler")]
    pub singler: Option<usize>,
    /// Treat every bridge candidate independently
    #[arg(long = "independent-bridges")]
    pub independent_bridges: bool,
    /// Heuristic: diagonal|fast-diagonal|manhattan or key 0-2 (HPA_DISTANCE)
    #[arg(long = "distance")]
    pub distance: Option<String>,
    /// Keep lower-level paths on abstract edges
    #[arg(long = "store-paths")]
    pub store_paths: bool,
    /// Number of worker threads (rayon)
    #[arg(long = "threads")]
    pub threads: Option<usize>,
    /// Log level (trace|debug|info|warn|error)
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
    /// JSON file of [z][y][x] occupancy layers; a seeded random world when absent
    #[arg(long = "layers")]
    pub layers: Option<PathBuf>,
    /// Random world extent as x,y,z
    #[arg(long = "dims", value_parser = parse_position, default_value = "32,32,1")]
    pub dims: Position,
    /// Probability of a random cell being solid
    #[arg(long = "density", default_value_t = 0.2)]
    pub density: f64,
    #[arg(long = "seed", default_value_t = 7)]
    pub seed: u64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum WorldCommand {
    /// Build the hierarchy and route between two cells
    #[command(name = "route")]
    Route {
        #[arg(long, value_parser = parse_position)]
        from: Position,
        #[arg(long, value_parser = parse_position)]
        to: Position,
        /// Fixed number of path slots in the result
        #[arg(long, default_value_t = 256)]
        capacity: usize,
        /// Cells to make unwalkable after the build (repeatable)
        #[arg(long = "block", value_parser = parse_position)]
        block: Vec<Position>,
        /// Write the JSON report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Build the hierarchy and report per-level statistics
    #[command(name = "inspect")]
    Inspect {
        #[arg(long)]
        report: Option<PathBuf>,
        /// Include every abstract and bridge edge in the report
        #[arg(long)]
        edges: bool,
    },
}

pub fn cmd_world(common: CommonOpts, sub: WorldCommand) -> Result<()> {
    // Env overrides CLI when set
    let cfg = cli_config(&common).overlay(Config::from_env_defaults());

    logging::init(cfg.log_level.as_deref());
    if let Some(n) = cfg.threads {
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    }
    let graph_cfg = cfg.graph_config()?;

    match sub {
        WorldCommand::Route { from, to, capacity, block, report } => {
            let grid = world::load_world(&common, &[from, to])?;
            let out = world::run_route(grid, graph_cfg, from, to, capacity, &block)?;
            world::emit(&out, report.as_deref())
        }
        WorldCommand::Inspect { report, edges } => {
            let grid = world::load_world(&common, &[])?;
            let out = world::run_inspect(grid, graph_cfg, edges)?;
            world::emit(&out, report.as_deref())
        }
    }
}

fn cli_config(common: &CommonOpts) -> Config {
    Config {
        cluster_sizes: common.cluster_sizes.as_deref().and_then(parse_sizes),
        movement_key: common.movement_key,
        bridge_key: common.bridge_key,
        singler: common.singler,
        independent_bridges: common.independent_bridges,
        distance: common.distance.clone(),
        store_paths: common.store_paths,
        threads: common.threads,
        log_level: common.log_level.clone(),
    }
}

pub fn parse_position(s: &str) -> Result<Position, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,z, got '{}'", s));
    }
    let mut v = [0i32; 3];
    for (slot, p) in v.iter_mut().zip(&parts) {
        *slot = p.trim().parse::<i32>().map_err(|e| format!("bad coordinate '{}': {}", p, e))?;
    }
    Ok(Position::new(v[0], v[1], v[2]))
}
