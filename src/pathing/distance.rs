use serde::{Deserialize, Serialize};

use super::error::PathError;
use super::models::Position;

/// Heuristic metric used by A* and by graph-building decisions.
///
/// `FastDiagonal` (squared Euclidean) is not admissible for A*; it trades
/// optimality for fewer expansions and is kept as-is.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DistanceKind {
    #[default]
    Diagonal,
    FastDiagonal,
    Manhattan,
}

impl DistanceKind {
    pub fn from_key(key: u8) -> Result<Self, PathError> {
        match key {
            0 => Ok(Self::Diagonal),
            1 => Ok(Self::FastDiagonal),
            2 => Ok(Self::Manhattan),
            k => Err(PathError::BadDistanceKey(k)),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "diagonal" | "euclidean" => Some(Self::Diagonal),
            "fastdiagonal" | "fast-diagonal" | "squared" => Some(Self::FastDiagonal),
            "manhattan" => Some(Self::Manhattan),
            _ => None,
        }
    }
}

pub fn distance(a: Position, b: Position, kind: DistanceKind) -> f64 {
    let dx = f64::from(a.x - b.x);
    let dy = f64::from(a.y - b.y);
    let dz = f64::from(a.z - b.z);
    match kind {
        DistanceKind::Diagonal => (dx * dx + dy * dy + dz * dz).sqrt(),
        DistanceKind::FastDiagonal => dx * dx + dy * dy + dz * dz,
        DistanceKind::Manhattan => dx.abs() + dy.abs() + dz.abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_symmetric_and_zero_on_identity() {
        let a = Position::new(0, 0, 0);
        let b = Position::new(3, 4, 0);
        assert_eq!(distance(a, b, DistanceKind::Diagonal), 5.0);
        assert_eq!(distance(a, b, DistanceKind::FastDiagonal), 25.0);
        assert_eq!(distance(a, b, DistanceKind::Manhattan), 7.0);
        for kind in [DistanceKind::Diagonal, DistanceKind::FastDiagonal, DistanceKind::Manhattan] {
            assert_eq!(distance(a, b, kind), distance(b, a, kind));
            assert_eq!(distance(b, b, kind), 0.0);
        }
    }

    #[test]
    fn keys_and_names_resolve() {
        assert_eq!(DistanceKind::from_key(2).unwrap(), DistanceKind::Manhattan);
        assert!(DistanceKind::from_key(9).is_err());
        assert_eq!(DistanceKind::from_name("Squared"), Some(DistanceKind::FastDiagonal));
        assert_eq!(DistanceKind::from_name("bogus"), None);
    }
}
