use super::error::{PathError, PathResult};
use super::models::{Position, Shape};

/// Dense occupancy input, indexed `[z][y][x]`. Non-zero cells are candidate-walkable.
#[derive(Clone, Debug)]
pub struct Occupancy {
    dims: Shape,
    cells: Vec<u8>,
}

impl Occupancy {
    /// Validates rectangularity up front; ragged input never reaches the builder.
    pub fn from_layers(layers: &[Vec<Vec<u8>>]) -> PathResult<Self> {
        let z = layers.len();
        if z == 0 {
            return Err(PathError::MalformedGrid { reason: "no z layers".into() });
        }
        let y = layers[0].len();
        if y == 0 {
            return Err(PathError::MalformedGrid { reason: "layer 0 has no rows".into() });
        }
        let x = layers[0][0].len();
        if x == 0 {
            return Err(PathError::MalformedGrid { reason: "row (0,0) is empty".into() });
        }
        let mut cells = Vec::with_capacity(x * y * z);
        for (zi, layer) in layers.iter().enumerate() {
            if layer.len() != y {
                return Err(PathError::MalformedGrid {
                    reason: format!("layer {zi} has {} rows, expected {y}", layer.len()),
                });
            }
            for (yi, row) in layer.iter().enumerate() {
                if row.len() != x {
                    return Err(PathError::MalformedGrid {
                        reason: format!("row ({zi},{yi}) has {} cells, expected {x}", row.len()),
                    });
                }
                cells.extend(row.iter().map(|&c| u8::from(c != 0)));
            }
        }
        Ok(Self { dims: Shape::new(x, y, z), cells })
    }

    pub fn filled(dims: Shape, value: u8) -> Self {
        Self { dims, cells: vec![u8::from(value != 0); dims.volume()] }
    }

    pub fn dims(&self) -> Shape {
        self.dims
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        self.dims.contains(Position::default(), pos)
    }

    pub fn is_open(&self, pos: Position) -> bool {
        self.dims
            .local_index(Position::default(), pos)
            .map(|i| self.cells[i as usize] != 0)
            .unwrap_or(false)
    }

    pub fn set(&mut self, pos: Position, open: bool) {
        if let Some(i) = self.dims.local_index(Position::default(), pos) {
            self.cells[i as usize] = u8::from(open);
        }
    }

    pub fn open_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c != 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_rejected() {
        let layers = vec![vec![vec![1, 1], vec![1]]];
        let err = Occupancy::from_layers(&layers).unwrap_err();
        assert!(matches!(err, PathError::MalformedGrid { .. }));
    }

    #[test]
    fn indexing_is_z_y_x() {
        let layers = vec![vec![vec![1, 0, 0], vec![0, 0, 1]], vec![vec![0, 1, 0], vec![0, 0, 0]]];
        let g = Occupancy::from_layers(&layers).unwrap();
        assert_eq!(g.dims(), Shape::new(3, 2, 2));
        assert!(g.is_open(Position::new(0, 0, 0)));
        assert!(g.is_open(Position::new(2, 1, 0)));
        assert!(g.is_open(Position::new(1, 0, 1)));
        assert!(!g.is_open(Position::new(1, 0, 0)));
        assert!(!g.is_open(Position::new(-1, 0, 0)));
        assert_eq!(g.open_count(), 3);
    }
}
