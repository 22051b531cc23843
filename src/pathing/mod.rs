//! Hierarchical pathfinding over 3D occupancy grids.

pub mod cluster;
pub mod cluster_builder;
pub mod config;
pub mod distance;
pub mod entrance_discovery;
pub mod error;
pub mod executor;
pub mod goal_cluster;
pub mod grid;
pub mod inter_connector;
pub mod intra_connector;
pub mod logging;
pub mod models;
pub mod neighbor_policy;
pub mod node;
pub mod node_graph;
pub mod query;
pub mod search;

pub use cluster::{Cluster, ClusterLike};
pub use config::{Config, GraphConfig, Grouping};
pub use distance::DistanceKind;
pub use error::{PathError, PathResult};
pub use goal_cluster::GoalCluster;
pub use grid::Occupancy;
pub use models::{ClusterKey, NodeId, Position, Shape};
pub use neighbor_policy::MovementPolicy;
pub use node_graph::{HierarchicalGraph, Level, NodeGraph};
pub use query::{PathBuffer, QuerySession, Route};
pub use search::{SearchOptions, SearchResult, SearchScope};
