use serde::{Deserialize, Serialize};

use super::error::PathError;
use super::grid::Occupancy;
pub use super::models::Offset;
use super::models::Position;

/// Movement policy keyed by the integer keys callers pass in.
///
/// Keys 1, 2 and 3 share the full 26-direction table with key 4 and differ only
/// in how many cut-through corner cells may be solid before a diagonal step is
/// blocked. Key 4 never checks corners.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MovementPolicy {
    /// Key 0: 6 faces plus the 8 ramps that pair one horizontal axis with z.
    #[default]
    EdgeDiagonal,
    /// Key 1: full diagonal, blocked by any solid corner.
    OneCornerDiagonal,
    /// Key 2: full diagonal, blocked by two solid corners.
    TwoCornerDiagonal,
    /// Key 3: full diagonal, blocked by three solid corners.
    ThreeCornerDiagonal,
    /// Key 4: full diagonal, corners ignored.
    FullDiagonal,
}

const FACES_AND_RAMPS: [Offset; 14] = [
    Offset(1, 0, 0),
    Offset(-1, 0, 0),
    Offset(0, 1, 0),
    Offset(0, -1, 0),
    Offset(0, 0, 1),
    Offset(0, 0, -1),
    Offset(1, 0, 1),
    Offset(-1, 0, 1),
    Offset(1, 0, -1),
    Offset(-1, 0, -1),
    Offset(0, 1, 1),
    Offset(0, -1, 1),
    Offset(0, 1, -1),
    Offset(0, -1, -1),
];

const ALL: [Offset; 26] = [
    Offset(1, 0, 0),
    Offset(-1, 0, 0),
    Offset(0, 1, 0),
    Offset(0, -1, 0),
    Offset(0, 0, 1),
    Offset(0, 0, -1),
    Offset(1, 1, 0),
    Offset(1, -1, 0),
    Offset(-1, 1, 0),
    Offset(-1, -1, 0),
    Offset(1, 0, 1),
    Offset(-1, 0, 1),
    Offset(1, 0, -1),
    Offset(-1, 0, -1),
    Offset(0, 1, 1),
    Offset(0, -1, 1),
    Offset(0, 1, -1),
    Offset(0, -1, -1),
    Offset(1, 1, 1),
    Offset(1, 1, -1),
    Offset(1, -1, 1),
    Offset(1, -1, -1),
    Offset(-1, 1, 1),
    Offset(-1, 1, -1),
    Offset(-1, -1, 1),
    Offset(-1, -1, -1),
];

impl MovementPolicy {
    pub fn from_key(key: u8) -> Result<Self, PathError> {
        match key {
            0 => Ok(Self::EdgeDiagonal),
            1 => Ok(Self::OneCornerDiagonal),
            2 => Ok(Self::TwoCornerDiagonal),
            3 => Ok(Self::ThreeCornerDiagonal),
            4 => Ok(Self::FullDiagonal),
            k => Err(PathError::BadMovementKey(k)),
        }
    }

    pub fn key(self) -> u8 {
        match self {
            Self::EdgeDiagonal => 0,
            Self::OneCornerDiagonal => 1,
            Self::TwoCornerDiagonal => 2,
            Self::ThreeCornerDiagonal => 3,
            Self::FullDiagonal => 4,
        }
    }

    pub fn neighbor_offsets(self) -> &'static [Offset] {
        match self {
            Self::EdgeDiagonal => &FACES_AND_RAMPS,
            _ => &ALL,
        }
    }

    /// Number of solid corner cells at which a diagonal edge stops being walkable.
    pub fn corner_threshold(self) -> Option<u32> {
        match self {
            Self::OneCornerDiagonal => Some(1),
            Self::TwoCornerDiagonal => Some(2),
            Self::ThreeCornerDiagonal => Some(3),
            Self::EdgeDiagonal | Self::FullDiagonal => None,
        }
    }

    /// Checks the axis-aligned cells a diagonal step from `pos` cuts through.
    ///
    /// Returns whether the step is allowed and how many of those cells are solid.
    /// Cells outside the grid count as open (nothing below the lowest layer).
    pub fn further_movement_allowed(self, grid: &Occupancy, pos: Position, dir: Offset) -> (bool, u32) {
        let Some(threshold) = self.corner_threshold() else {
            return (true, 0);
        };
        if dir.non_zero_axes() < 2 {
            return (true, 0);
        }
        let blocking = dir
            .axis_parts()
            .map(|part| pos + part)
            .filter(|&cell| grid.in_bounds(cell) && !grid.is_open(cell))
            .count() as u32;
        (blocking < threshold, blocking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathing::models::Shape;

    #[test]
    fn neighbor_offsets_edge_diagonal() {
        let offs = MovementPolicy::EdgeDiagonal.neighbor_offsets();
        assert_eq!(offs.len(), 14);
        assert!(offs.contains(&Offset(1, 0, 0)));
        assert!(offs.contains(&Offset(0, -1, 1)));
        assert!(!offs.contains(&Offset(1, 1, 0)));
        assert!(!offs.contains(&Offset(1, 1, 1)));
        for o in offs {
            assert!(offs.contains(&Offset(-o.0, -o.1, -o.2)));
        }
    }

    #[test]
    fn neighbor_offsets_full_diagonal_shared_by_keys_1_to_4() {
        for key in 1..=4 {
            let offs = MovementPolicy::from_key(key).unwrap().neighbor_offsets();
            assert_eq!(offs.len(), 26);
            assert!(offs.contains(&Offset(-1, -1, -1)));
            assert!(!offs.contains(&Offset(0, 0, 0)));
        }
        assert!(MovementPolicy::from_key(5).is_err());
    }

    #[test]
    fn corner_cut_thresholds() {
        // 3x3x1 floor with a pillar at (1,0,0).
        let mut grid = Occupancy::filled(Shape::new(3, 3, 1), 1);
        grid.set(Position::new(1, 0, 0), false);
        let origin = Position::new(0, 0, 0);
        let step = Offset(1, 1, 0);

        assert_eq!(MovementPolicy::EdgeDiagonal.further_movement_allowed(&grid, origin, step), (true, 0));
        assert_eq!(MovementPolicy::FullDiagonal.further_movement_allowed(&grid, origin, step), (true, 0));
        assert_eq!(MovementPolicy::OneCornerDiagonal.further_movement_allowed(&grid, origin, step), (false, 1));
        assert_eq!(MovementPolicy::TwoCornerDiagonal.further_movement_allowed(&grid, origin, step), (true, 1));

        grid.set(Position::new(0, 1, 0), false);
        assert_eq!(MovementPolicy::TwoCornerDiagonal.further_movement_allowed(&grid, origin, step), (false, 2));
        assert_eq!(MovementPolicy::ThreeCornerDiagonal.further_movement_allowed(&grid, origin, step), (true, 2));
        // Straight steps never cut a corner.
        assert_eq!(
            MovementPolicy::OneCornerDiagonal.further_movement_allowed(&grid, origin, Offset(0, 0, 1)),
            (true, 0)
        );
    }
}
