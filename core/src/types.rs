use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::{GameError, Result};

/// Single coordinate axis used for field width, height, and positions.
pub type Coord = u8;

/// Count type used for mine counts and total-cell counts.
pub type CellCount = u16;

/// Two-dimensional coordinates `(x, y)`.
pub type Coord2 = (Coord, Coord);

pub trait ToNdIndex {
    type Output;
    fn to_nd_index(self) -> Self::Output;
}

impl ToNdIndex for Coord2 {
    type Output = [usize; 2];

    fn to_nd_index(self) -> Self::Output {
        [self.0.into(), self.1.into()]
    }
}

pub const fn mult(a: Coord, b: Coord) -> CellCount {
    let a = a as CellCount;
    let b = b as CellCount;
    a.saturating_mul(b)
}

/// Neighbour-adjacency rule of a field.
///
/// Hexagonal fields use offset rows: odd rows are shifted half a cell to the
/// right, so the diagonal neighbours of `(x, y)` depend on the parity of `y`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    #[default]
    Moore,
    Neumann,
    Hex,
}

const MOORE: [(i8, i8); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

const NEUMANN: [(i8, i8); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

const HEX_EVEN_ROW: [(i8, i8); 6] = [(-1, -1), (0, -1), (-1, 0), (1, 0), (-1, 1), (0, 1)];

const HEX_ODD_ROW: [(i8, i8); 6] = [(0, -1), (1, -1), (-1, 0), (1, 0), (0, 1), (1, 1)];

impl Topology {
    pub const ALL: [Topology; 3] = [Self::Moore, Self::Neumann, Self::Hex];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Moore => "moore",
            Self::Neumann => "neumann",
            Self::Hex => "hex",
        }
    }

    /// Largest number of neighbours any cell can have.
    pub const fn max_neighbors(self) -> usize {
        match self {
            Self::Moore => MOORE.len(),
            Self::Neumann => NEUMANN.len(),
            Self::Hex => HEX_EVEN_ROW.len(),
        }
    }

    pub fn neighbors(self, center: Coord2, bounds: Coord2) -> NeighborIter {
        NeighborIter::new(center, bounds, self.displacements(center))
    }

    fn displacements(self, (_, y): Coord2) -> &'static [(i8, i8)] {
        match self {
            Self::Moore => &MOORE,
            Self::Neumann => &NEUMANN,
            Self::Hex if y % 2 == 1 => &HEX_ODD_ROW,
            Self::Hex => &HEX_EVEN_ROW,
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Topology {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|topology| topology.name() == s)
            .ok_or_else(|| GameError::UnknownTopology(s.into()))
    }
}

/// Applies `delta` to `coords`, returning a value only when it remains in bounds.
fn apply_delta(coords: Coord2, delta: (i8, i8), bounds: Coord2) -> Option<Coord2> {
    let (x, y) = coords;
    let (dx, dy) = delta;
    let (max_x, max_y) = bounds;

    let next_x = x.checked_add_signed(dx)?;
    if next_x >= max_x {
        return None;
    }

    let next_y = y.checked_add_signed(dy)?;
    if next_y >= max_y {
        return None;
    }

    Some((next_x, next_y))
}

#[derive(Debug)]
pub struct NeighborIter {
    center: Coord2,
    bounds: Coord2,
    displacements: &'static [(i8, i8)],
    index: u8,
}

impl NeighborIter {
    fn new(center: Coord2, bounds: Coord2, displacements: &'static [(i8, i8)]) -> Self {
        Self {
            center,
            bounds,
            displacements,
            index: 0,
        }
    }
}

impl Iterator for NeighborIter {
    type Item = Coord2;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let delta = *self.displacements.get(usize::from(self.index))?;
            self.index += 1;

            if let Some(next_item) = apply_delta(self.center, delta, self.bounds) {
                return Some(next_item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(iter: NeighborIter) -> Vec<Coord2> {
        let mut cells: Vec<_> = iter.collect();
        cells.sort_unstable();
        cells
    }

    #[test]
    fn moore_interior_has_eight_neighbors() {
        let cells = sorted(Topology::Moore.neighbors((4, 4), (9, 9)));
        assert_eq!(cells.len(), 8);
        assert!(!cells.contains(&(4, 4)));
    }

    #[test]
    fn neumann_corner_is_clipped() {
        let cells = sorted(Topology::Neumann.neighbors((0, 0), (3, 3)));
        assert_eq!(cells, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn hex_rows_shift_by_parity() {
        let even = sorted(Topology::Hex.neighbors((2, 2), (5, 5)));
        assert_eq!(even, vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 3), (3, 2)]);

        let odd = sorted(Topology::Hex.neighbors((2, 1), (5, 5)));
        assert_eq!(odd, vec![(1, 1), (2, 0), (2, 2), (3, 0), (3, 1), (3, 2)]);
    }

    #[test]
    fn topology_round_trips_through_name() {
        for topology in Topology::ALL {
            assert_eq!(topology.name().parse::<Topology>().unwrap(), topology);
        }
        assert_eq!(
            "triangle".parse::<Topology>(),
            Err(GameError::UnknownTopology("triangle".into()))
        );
    }
}
