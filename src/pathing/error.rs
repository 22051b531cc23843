//! Error types for graph construction and queries.

use std::error::Error;
use std::fmt;

use super::models::{ClusterKey, NodeId, Position};

/// Errors raised by the pathfinding engine.
///
/// Build-time variants (`MalformedGrid`, `BadPartition`, key errors) are fatal
/// for the graph being built. Query-time variants are local to the call.
/// An unreachable goal is never an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathError {
    /// A node id that is not present in the addressed cluster.
    UnknownNode {
        cluster: ClusterKey,
        id: NodeId,
    },
    /// A cluster key that does not exist at the given level.
    UnknownCluster {
        level: usize,
        key: ClusterKey,
    },
    /// A level index outside the hierarchy.
    UnknownLevel {
        level: usize,
        levels: usize,
    },
    /// A position outside the occupancy grid.
    OutOfBounds(Position),
    /// A position inside the grid with no materialised node (solid cell).
    NoNodeAt(Position),
    /// Ragged or empty occupancy input.
    MalformedGrid {
        reason: String,
    },
    /// Partition sizes that cannot tile the grid.
    BadPartition {
        reason: String,
    },
    /// Two positions with no direct edge between them.
    NotAdjacent(Position, Position),
    BadMovementKey(u8),
    BadDistanceKey(u8),
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode { cluster, id } => {
                write!(f, "unknown node id {id} in cluster {cluster}")
            }
            Self::UnknownCluster { level, key } => {
                write!(f, "unknown cluster {key} at level {level}")
            }
            Self::UnknownLevel { level, levels } => {
                write!(f, "unknown level {level}: hierarchy has levels 0..={levels}")
            }
            Self::OutOfBounds(pos) => write!(f, "position {pos} is outside the grid"),
            Self::NoNodeAt(pos) => write!(f, "no walkable node materialised at {pos}"),
            Self::MalformedGrid { reason } => write!(f, "malformed occupancy grid: {reason}"),
            Self::BadPartition { reason } => write!(f, "bad partition: {reason}"),
            Self::NotAdjacent(a, b) => write!(f, "no edge between {a} and {b}"),
            Self::BadMovementKey(k) => write!(f, "unknown movement policy key {k}"),
            Self::BadDistanceKey(k) => write!(f, "unknown distance key {k}"),
        }
    }
}

impl Error for PathError {}

pub type PathResult<T> = Result<T, PathError>;
