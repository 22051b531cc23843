use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Grid coordinates in the finest grid.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn axis(self, axis: usize) -> i32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn manhattan(self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs() + (self.z - other.z).abs()
    }
}

impl Add<Offset> for Position {
    type Output = Position;
    fn add(self, o: Offset) -> Position {
        Position::new(self.x + o.0, self.y + o.1, self.z + o.2)
    }
}

impl Sub for Position {
    type Output = Offset;
    fn sub(self, o: Position) -> Offset {
        Offset(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

/// Unit step between two cells, each component in {-1,0,1} for movement directions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Offset(pub i32, pub i32, pub i32);

impl Offset {
    pub fn component(self, axis: usize) -> i32 {
        match axis {
            0 => self.0,
            1 => self.1,
            _ => self.2,
        }
    }

    pub fn non_zero_axes(self) -> usize {
        (0..3).filter(|&a| self.component(a) != 0).count()
    }

    /// The single-axis parts of a diagonal step.
    pub fn axis_parts(self) -> impl Iterator<Item = Offset> {
        (0..3).filter_map(move |a| match (a, self.component(a)) {
            (_, 0) => None,
            (0, v) => Some(Offset(v, 0, 0)),
            (1, v) => Some(Offset(0, v, 0)),
            (_, v) => Some(Offset(0, 0, v)),
        })
    }
}

/// Extent along (x, y, z) in cells.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Shape {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    pub const fn cube(edge: usize) -> Self {
        Self { x: edge, y: edge, z: edge }
    }

    pub fn axis(self, axis: usize) -> usize {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn volume(self) -> usize {
        self.x * self.y * self.z
    }

    /// Whether `pos` lies inside the box of this shape placed at `origin`.
    pub fn contains(self, origin: Position, pos: Position) -> bool {
        (0..3).all(|a| {
            let lo = origin.axis(a);
            let p = pos.axis(a);
            p >= lo && ((p - lo) as usize) < self.axis(a)
        })
    }

    /// Linear index of `pos` inside the box at `origin`, x fastest.
    pub fn local_index(self, origin: Position, pos: Position) -> Option<u32> {
        if !self.contains(origin, pos) {
            return None;
        }
        let lx = (pos.x - origin.x) as usize;
        let ly = (pos.y - origin.y) as usize;
        let lz = (pos.z - origin.z) as usize;
        Some((lx + ly * self.x + lz * self.x * self.y) as u32)
    }

    pub fn position_of(self, origin: Position, index: u32) -> Position {
        let i = index as usize;
        let lx = i % self.x;
        let ly = (i / self.x) % self.y;
        let lz = i / (self.x * self.y);
        Position::new(origin.x + lx as i32, origin.y + ly as i32, origin.z + lz as i32)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// Arena index of a node. Stable for the lifetime of the owning graph.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeIdx(pub u32);

impl NodeIdx {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena index of an edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EdgeIdx(pub u32);

impl EdgeIdx {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Node id local to the owning cluster, derived from the position inside the cluster box.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster key derived from the cluster grid position at one level.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ClusterKey(pub u64);

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_index_round_trips_inside_box() {
        let shape = Shape::new(3, 2, 2);
        let origin = Position::new(3, 0, 2);
        let p = Position::new(5, 1, 3);
        let idx = shape.local_index(origin, p).unwrap();
        assert_eq!(idx, 2 + 3 + 6);
        assert_eq!(shape.position_of(origin, idx), p);
        assert_eq!(shape.local_index(origin, Position::new(6, 0, 2)), None);
    }

    #[test]
    fn axis_parts_of_diagonal() {
        let parts: Vec<Offset> = Offset(1, 0, -1).axis_parts().collect();
        assert_eq!(parts, vec![Offset(1, 0, 0), Offset(0, 0, -1)]);
        assert_eq!(Offset(1, 1, 1).non_zero_axes(), 3);
    }
}
