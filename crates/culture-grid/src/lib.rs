//! Toroidal cell lattice used to place agents and answer neighbourhood queries.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

/// Moore neighbourhood offsets in row-major order (top row first).
const MOORE_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Errors emitted by cell space implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    /// Indicates configuration values that cannot be used (e.g., a zero-sized lattice).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The referenced cell does not exist in this lattice.
    #[error("cell {cell:?} is outside the grid")]
    OutOfBounds { cell: CellId },
    /// The referenced cell already holds an occupant.
    #[error("cell {cell:?} is already occupied")]
    Occupied { cell: CellId },
}

/// Opaque handle for a single lattice cell (row-major index).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct CellId(pub u32);

impl CellId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Integer lattice coordinate of a cell.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub x: u32,
    pub y: u32,
}

impl Coordinate {
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Straight-line distance between two coordinates on the plane.
///
/// Wraparound is ignored: two cells on opposite edges of a torus are reported
/// as far apart even though they are adjacent on the wrapped lattice.
#[must_use]
pub fn planar_distance(a: Coordinate, b: Coordinate) -> f64 {
    let dx = f64::from(a.x) - f64::from(b.x);
    let dy = f64::from(a.y) - f64::from(b.y);
    dx.hypot(dy)
}

/// Up to eight neighbouring cells.
pub type Neighborhood = SmallVec<[CellId; 8]>;

/// Common behaviour exposed by single-occupancy cell spaces.
pub trait CellSpace<T: Copy> {
    /// Total number of cells.
    fn cell_count(&self) -> usize;

    /// Every cell in a stable enumeration order.
    fn cells(&self) -> Vec<CellId>;

    /// Cells surrounding `cell`. Unknown cells have no neighbours.
    fn neighbors_of(&self, cell: CellId) -> Neighborhood;

    /// Occupant of `cell`, if any.
    fn occupant(&self, cell: CellId) -> Option<T>;

    /// Put `occupant` into an empty `cell`.
    fn place(&mut self, occupant: T, cell: CellId) -> Result<(), GridError>;

    /// Clear `cell`, returning whatever occupied it.
    fn remove(&mut self, cell: CellId) -> Option<T>;

    /// Lattice coordinate of `cell`.
    fn coordinate_of(&self, cell: CellId) -> Option<Coordinate>;

    /// Unoccupied cells in enumeration order.
    fn empty_cells(&self) -> Vec<CellId> {
        self.cells()
            .into_iter()
            .filter(|cell| self.occupant(*cell).is_none())
            .collect()
    }

    /// Occupants of the Moore neighbourhood of `cell`, in neighbour order.
    fn neighbors_occupants(&self, cell: CellId) -> SmallVec<[T; 8]> {
        self.neighbors_of(cell)
            .into_iter()
            .filter_map(|neighbor| self.occupant(neighbor))
            .collect()
    }
}

/// Rectangular lattice whose edges wrap around in both axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorusGrid<T> {
    width: u32,
    height: u32,
    slots: Vec<Option<T>>,
}

impl<T: Copy> TorusGrid<T> {
    /// Construct an empty `width * height` torus.
    pub fn new(width: u32, height: u32) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::InvalidConfig("grid dimensions must be non-zero"));
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .filter(|len| u32::try_from(*len).is_ok())
            .ok_or(GridError::InvalidConfig("grid has too many cells"))?;
        Ok(Self {
            width,
            height,
            slots: vec![None; len],
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Cell at `(x, y)` if it lies inside the lattice.
    #[must_use]
    pub fn cell_at(&self, x: u32, y: u32) -> Option<CellId> {
        (x < self.width && y < self.height).then(|| CellId(y * self.width + x))
    }

    /// Number of occupied cells.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn wrap(value: u32, delta: i64, extent: u32) -> u32 {
        // rem_euclid keeps the result in 0..extent, which fits in u32.
        (i64::from(value) + delta).rem_euclid(i64::from(extent)) as u32
    }
}

impl<T: Copy> CellSpace<T> for TorusGrid<T> {
    fn cell_count(&self) -> usize {
        self.slots.len()
    }

    fn cells(&self) -> Vec<CellId> {
        (0..self.slots.len() as u32).map(CellId).collect()
    }

    fn neighbors_of(&self, cell: CellId) -> Neighborhood {
        let mut neighbors = Neighborhood::new();
        let Some(origin) = self.coordinate_of(cell) else {
            return neighbors;
        };
        for (dx, dy) in MOORE_OFFSETS {
            let x = Self::wrap(origin.x, dx, self.width);
            let y = Self::wrap(origin.y, dy, self.height);
            let neighbor = CellId(y * self.width + x);
            // Narrow tori fold offsets back onto the origin or onto each other.
            if neighbor != cell && !neighbors.contains(&neighbor) {
                neighbors.push(neighbor);
            }
        }
        neighbors
    }

    fn occupant(&self, cell: CellId) -> Option<T> {
        self.slots.get(cell.index()).copied().flatten()
    }

    fn place(&mut self, occupant: T, cell: CellId) -> Result<(), GridError> {
        let slot = self
            .slots
            .get_mut(cell.index())
            .ok_or(GridError::OutOfBounds { cell })?;
        if slot.is_some() {
            return Err(GridError::Occupied { cell });
        }
        *slot = Some(occupant);
        Ok(())
    }

    fn remove(&mut self, cell: CellId) -> Option<T> {
        self.slots.get_mut(cell.index()).and_then(Option::take)
    }

    fn coordinate_of(&self, cell: CellId) -> Option<Coordinate> {
        (cell.index() < self.slots.len())
            .then(|| Coordinate::new(cell.0 % self.width, cell.0 / self.width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_dimensions() {
        assert_eq!(
            TorusGrid::<u8>::new(0, 4).unwrap_err(),
            GridError::InvalidConfig("grid dimensions must be non-zero")
        );
    }

    #[test]
    fn interior_cell_has_eight_neighbors() {
        let grid = TorusGrid::<u8>::new(5, 5).expect("grid");
        assert_eq!((grid.width(), grid.height()), (5, 5));
        let center = grid.cell_at(2, 2).expect("cell");
        let coords: Vec<_> = grid
            .neighbors_of(center)
            .into_iter()
            .map(|cell| grid.coordinate_of(cell).expect("coordinate"))
            .collect();
        assert_eq!(coords.len(), 8);
        assert_eq!(coords[0], Coordinate::new(1, 1));
        assert_eq!(coords[7], Coordinate::new(3, 3));
    }

    #[test]
    fn corner_neighbors_wrap_around() {
        let grid = TorusGrid::<u8>::new(4, 3).expect("grid");
        let corner = grid.cell_at(0, 0).expect("cell");
        let neighbors = grid.neighbors_of(corner);
        assert_eq!(neighbors.len(), 8);
        assert!(neighbors.contains(&grid.cell_at(3, 2).expect("cell")));
        assert!(neighbors.contains(&grid.cell_at(3, 0).expect("cell")));
        assert!(neighbors.contains(&grid.cell_at(0, 2).expect("cell")));
    }

    #[test]
    fn narrow_torus_deduplicates_neighbors() {
        let grid = TorusGrid::<u8>::new(2, 1).expect("grid");
        let left = grid.cell_at(0, 0).expect("cell");
        let neighbors = grid.neighbors_of(left);
        assert_eq!(neighbors.as_slice(), &[CellId(1)]);

        let single = TorusGrid::<u8>::new(1, 1).expect("grid");
        assert!(single.neighbors_of(CellId(0)).is_empty());
    }

    #[test]
    fn place_and_remove_enforce_single_occupancy() {
        let mut grid = TorusGrid::new(3, 3).expect("grid");
        let cell = grid.cell_at(1, 2).expect("cell");
        grid.place(7u8, cell).expect("place");
        assert_eq!(grid.place(8u8, cell), Err(GridError::Occupied { cell }));
        assert_eq!(
            grid.place(9u8, CellId(9)),
            Err(GridError::OutOfBounds { cell: CellId(9) })
        );
        assert_eq!(grid.occupant(cell), Some(7));
        assert_eq!(grid.empty_cells().len(), 8);
        assert_eq!(grid.remove(cell), Some(7));
        assert_eq!(grid.remove(cell), None);
        assert_eq!(grid.occupied(), 0);
    }

    #[test]
    fn neighbor_occupants_follow_neighbor_order() {
        let mut grid = TorusGrid::new(3, 3).expect("grid");
        grid.place(1u8, grid.cell_at(2, 2).expect("cell")).expect("place");
        grid.place(2u8, grid.cell_at(0, 0).expect("cell")).expect("place");
        let center = grid.cell_at(1, 1).expect("cell");
        assert_eq!(grid.neighbors_occupants(center).as_slice(), &[2, 1]);
    }

    #[test]
    fn planar_distance_ignores_wraparound() {
        let a = Coordinate::new(0, 0);
        let b = Coordinate::new(19, 0);
        assert!((planar_distance(a, b) - 19.0).abs() < f64::EPSILON);
        let c = Coordinate::new(3, 4);
        assert!((planar_distance(a, c) - 5.0).abs() < f64::EPSILON);
    }
}
