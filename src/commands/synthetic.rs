use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::pathing::error::PathResult;
use crate::pathing::grid::Occupancy;
use crate::pathing::models::{Position, Shape};

/// Seeded random world: each cell is solid with probability `density`.
#[derive(Clone, Debug)]
pub struct WorldSpec {
    pub dims: Shape,
    pub density: f64,
    pub seed: u64,
}

impl Default for WorldSpec {
    fn default() -> Self {
        Self { dims: Shape::new(32, 32, 1), density: 0.2, seed: 7 }
    }
}

/// Generates `[z][y][x]` layers; cells in `keep_open` are never solid.
pub fn generate_layers(spec: &WorldSpec, keep_open: &[Position]) -> Vec<Vec<Vec<u8>>> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let density = spec.density.clamp(0.0, 1.0);
    let mut layers = vec![vec![vec![1u8; spec.dims.x]; spec.dims.y]; spec.dims.z];
    for (z, layer) in layers.iter_mut().enumerate() {
        for (y, row) in layer.iter_mut().enumerate() {
            for (x, cell) in row.iter_mut().enumerate() {
                let pos = Position::new(x as i32, y as i32, z as i32);
                if !keep_open.contains(&pos) && rng.random_bool(density) {
                    *cell = 0;
                }
            }
        }
    }
    layers
}

/// Fails like [`Occupancy::from_layers`] when an extent is zero.
pub fn generate(spec: &WorldSpec, keep_open: &[Position]) -> PathResult<Occupancy> {
    Occupancy::from_layers(&generate_layers(spec, keep_open))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathing::error::PathError;

    #[test]
    fn same_seed_same_world() {
        let spec = WorldSpec { dims: Shape::new(8, 8, 2), density: 0.4, seed: 42 };
        let a = generate_layers(&spec, &[]);
        let b = generate_layers(&spec, &[]);
        assert_eq!(a, b);
        let other = generate_layers(&WorldSpec { seed: 43, ..spec.clone() }, &[]);
        assert_ne!(a, other);
    }

    #[test]
    fn kept_cells_stay_open() -> anyhow::Result<()> {
        let spec = WorldSpec { dims: Shape::new(4, 4, 1), density: 1.0, seed: 1 };
        let keep = [Position::new(0, 0, 0), Position::new(3, 3, 0)];
        let grid = generate(&spec, &keep)?;
        assert_eq!(grid.open_count(), 2);
        assert!(grid.is_open(Position::new(3, 3, 0)));
        Ok(())
    }

    #[test]
    fn empty_extent_is_an_error() {
        let spec = WorldSpec { dims: Shape::new(4, 0, 1), ..WorldSpec::default() };
        assert!(matches!(generate(&spec, &[]), Err(PathError::MalformedGrid { .. })));
    }
}
