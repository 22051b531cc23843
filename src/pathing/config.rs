use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

use super::distance::DistanceKind;
use super::neighbor_policy::MovementPolicy;

/// How bridge candidates on a shared cluster face are turned into bridges.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Grouping {
    /// Flood-fill neighboring candidates and collapse large groups to one bridge.
    #[default]
    Flood,
    /// Every candidate becomes a bridge.
    Independent,
}

/// Resolved engine settings. Everything the build and queries need.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Partition edge length per level, finest first.
    pub cluster_sizes: Vec<usize>,
    pub movement: MovementPolicy,
    pub bridge_policy: MovementPolicy,
    /// Groups with fewer candidates than this keep one bridge per candidate.
    /// 0 disables grouping.
    pub singler: usize,
    pub grouping: Grouping,
    pub distance: DistanceKind,
    /// Keep the lower-level node path on abstract edges.
    pub store_paths: bool,
    pub max_expansions: Option<usize>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            cluster_sizes: vec![8],
            movement: MovementPolicy::EdgeDiagonal,
            bridge_policy: MovementPolicy::EdgeDiagonal,
            singler: 0,
            grouping: Grouping::Flood,
            distance: DistanceKind::Diagonal,
            store_paths: false,
            max_expansions: None,
        }
    }
}

impl GraphConfig {
    pub fn with_sizes(sizes: &[usize]) -> Self {
        Self { cluster_sizes: sizes.to_vec(), ..Self::default() }
    }

    /// Grouping is active only in flood mode with a non-zero threshold.
    pub fn groups_bridges(&self) -> bool {
        self.grouping == Grouping::Flood && self.singler > 0
    }
}

/// CLI/env settings before resolution. Env values override CLI values when set.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub cluster_sizes: Option<Vec<usize>>,
    pub movement_key: Option<u8>,
    pub bridge_key: Option<u8>,
    pub singler: Option<usize>,
    pub independent_bridges: bool,
    pub distance: Option<String>,
    pub store_paths: bool,
    pub threads: Option<usize>,
    pub log_level: Option<String>,
}

impl Config {
    pub fn from_env_defaults() -> Self {
        let cluster_sizes = env::var("HPA_CLUSTER_SIZES").ok().and_then(|s| parse_sizes(&s));
        let movement_key = env::var("HPA_MOVEMENT").ok().and_then(|s| s.trim().parse::<u8>().ok());
        let bridge_key = env::var("HPA_BRIDGE_KEY").ok().and_then(|s| s.trim().parse::<u8>().ok());
        let singler = env::var("HPA_SINGLER").ok().and_then(|s| s.trim().parse::<usize>().ok());
        let independent_bridges = env::var("HPA_INDEPENDENT_BRIDGES").ok().map(|v| is_truthy(&v)).unwrap_or(false);
        let distance = env::var("HPA_DISTANCE").ok();
        let store_paths = env::var("HPA_STORE_PATHS").ok().map(|v| is_truthy(&v)).unwrap_or(false);
        let threads = env::var("HPA_THREADS").ok().and_then(|s| s.parse::<usize>().ok());
        let log_level = env::var("HPA_LOG_LEVEL").ok();
        Self { cluster_sizes, movement_key, bridge_key, singler, independent_bridges, distance, store_paths, threads, log_level }
    }

    /// Layers `other` on top of `self`; set values in `other` win.
    pub fn overlay(mut self, other: Config) -> Self {
        if other.cluster_sizes.is_some() { self.cluster_sizes = other.cluster_sizes; }
        if other.movement_key.is_some() { self.movement_key = other.movement_key; }
        if other.bridge_key.is_some() { self.bridge_key = other.bridge_key; }
        if other.singler.is_some() { self.singler = other.singler; }
        if other.independent_bridges { self.independent_bridges = true; }
        if other.distance.is_some() { self.distance = other.distance; }
        if other.store_paths { self.store_paths = true; }
        if other.threads.is_some() { self.threads = other.threads; }
        if other.log_level.is_some() { self.log_level = other.log_level; }
        self
    }

    pub fn graph_config(&self) -> Result<GraphConfig> {
        let defaults = GraphConfig::default();
        let cluster_sizes = self.cluster_sizes.clone().unwrap_or(defaults.cluster_sizes);
        if cluster_sizes.is_empty() || cluster_sizes.contains(&0) {
            return Err(anyhow!("cluster sizes must be non-empty and positive: {:?}", cluster_sizes));
        }
        let movement = match self.movement_key {
            Some(k) => MovementPolicy::from_key(k).context("resolving movement key")?,
            None => defaults.movement,
        };
        let bridge_policy = match self.bridge_key {
            Some(k) => MovementPolicy::from_key(k).context("resolving bridge key")?,
            None => movement,
        };
        let distance = match self.distance.as_deref() {
            Some(name) => parse_distance(name)?,
            None => defaults.distance,
        };
        Ok(GraphConfig {
            cluster_sizes,
            movement,
            bridge_policy,
            singler: self.singler.unwrap_or(defaults.singler),
            grouping: if self.independent_bridges { Grouping::Independent } else { Grouping::Flood },
            distance,
            store_paths: self.store_paths,
            max_expansions: defaults.max_expansions,
        })
    }
}

fn is_truthy(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

pub fn parse_sizes(input: &str) -> Option<Vec<usize>> {
    let v = input
        .split(',')
        .filter_map(|p| {
            let t = p.trim();
            if t.is_empty() { None } else { t.parse::<usize>().ok() }
        })
        .collect::<Vec<_>>();
    if v.is_empty() { None } else { Some(v) }
}

/// Accepts a metric name or its numeric key.
fn parse_distance(input: &str) -> Result<DistanceKind> {
    if let Ok(k) = input.trim().parse::<u8>() {
        return DistanceKind::from_key(k).context("resolving distance key");
    }
    DistanceKind::from_name(input).ok_or_else(|| anyhow!("unknown distance metric '{}'", input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sizes() {
        assert_eq!(parse_sizes(""), None);
        assert_eq!(parse_sizes("4, 2,"), Some(vec![4, 2]));
        assert_eq!(parse_sizes("x"), None);
    }

    #[test]
    fn test_graph_config_resolution() -> Result<()> {
        let cfg = Config {
            cluster_sizes: Some(vec![4, 4]),
            movement_key: Some(2),
            singler: Some(3),
            distance: Some("manhattan".into()),
            ..Config::default()
        };
        let g = cfg.graph_config()?;
        assert_eq!(g.cluster_sizes, vec![4, 4]);
        assert_eq!(g.movement, MovementPolicy::TwoCornerDiagonal);
        // Bridge policy follows the movement policy unless set.
        assert_eq!(g.bridge_policy, MovementPolicy::TwoCornerDiagonal);
        assert_eq!(g.distance, DistanceKind::Manhattan);
        assert!(g.groups_bridges());

        let independent = Config { independent_bridges: true, singler: Some(3), ..Config::default() }.graph_config()?;
        assert!(!independent.groups_bridges());

        assert!(Config { movement_key: Some(9), ..Config::default() }.graph_config().is_err());
        assert!(Config { cluster_sizes: Some(vec![0]), ..Config::default() }.graph_config().is_err());
        assert!(Config { distance: Some("7".into()), ..Config::default() }.graph_config().is_err());
        Ok(())
    }

    #[test]
    fn test_from_env_defaults_overrides_cli() {
        std::env::set_var("HPA_CLUSTER_SIZES", "2,2");
        std::env::set_var("HPA_MOVEMENT", "4");
        std::env::set_var("HPA_BRIDGE_KEY", "1");
        std::env::set_var("HPA_SINGLER", "5");
        std::env::set_var("HPA_INDEPENDENT_BRIDGES", "true");
        std::env::set_var("HPA_DISTANCE", "fastdiagonal");
        std::env::set_var("HPA_STORE_PATHS", "1");
        std::env::set_var("HPA_THREADS", "3");
        std::env::set_var("HPA_LOG_LEVEL", "debug");

        let cli = Config { cluster_sizes: Some(vec![8]), movement_key: Some(0), ..Config::default() };
        let cfg = cli.overlay(Config::from_env_defaults());
        assert_eq!(cfg.cluster_sizes, Some(vec![2, 2]));
        assert_eq!(cfg.movement_key, Some(4));
        assert_eq!(cfg.bridge_key, Some(1));
        assert_eq!(cfg.singler, Some(5));
        assert!(cfg.independent_bridges);
        assert_eq!(cfg.distance.as_deref(), Some("fastdiagonal"));
        assert!(cfg.store_paths);
        assert_eq!(cfg.threads, Some(3));
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));

        for key in [
            "HPA_CLUSTER_SIZES",
            "HPA_MOVEMENT",
            "HPA_BRIDGE_KEY",
            "HPA_SINGLER",
            "HPA_INDEPENDENT_BRIDGES",
            "HPA_DISTANCE",
            "HPA_STORE_PATHS",
            "HPA_THREADS",
            "HPA_LOG_LEVEL",
        ] {
            std::env::remove_var(key);
        }
    }
}
