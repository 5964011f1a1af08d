use rand::Rng;
use rand::seq::SliceRandom;

use crate::*;
pub use random::*;

mod random;

/// Produces a full mine layout for a request. Implementations decide how much
/// effort goes into the layout; the request already guarantees the safe zone.
pub trait LayoutGenerator {
    fn generate(&self, request: &LayoutRequest) -> Result<MineLayout>;
}

/// A validated layout request: field shape, mine count and the first reveal.
///
/// The start cell and its neighbours form the forced safe zone and are never
/// part of [`LayoutRequest::placeable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutRequest {
    size: Coord2,
    topology: Topology,
    mines: CellCount,
    start: Coord2,
    placeable: Vec<Coord2>,
}

impl LayoutRequest {
    pub fn new(size: Coord2, topology: Topology, mines: CellCount, start: Coord2) -> Result<Self> {
        if size.0 == 0 || size.1 == 0 {
            return Err(GameError::InvalidSize);
        }
        if start.0 >= size.0 || start.1 >= size.1 {
            return Err(GameError::InvalidCoords);
        }
        if mines == 0 {
            return Err(GameError::NoMines);
        }

        let safe_zone: Vec<Coord2> = std::iter::once(start)
            .chain(topology.neighbors(start, size))
            .collect();
        let placeable: Vec<Coord2> = (0..size.0)
            .flat_map(|x| (0..size.1).map(move |y| (x, y)))
            .filter(|coords| !safe_zone.contains(coords))
            .collect();

        // at most the field area, which fits by construction
        let placeable_count = placeable.len() as CellCount;
        if mines > placeable_count {
            return Err(GameError::TooManyMines {
                requested: mines,
                placeable: placeable_count,
            });
        }

        Ok(Self {
            size,
            topology,
            mines,
            start,
            placeable,
        })
    }

    pub fn size(&self) -> Coord2 {
        self.size
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn mines(&self) -> CellCount {
        self.mines
    }

    pub fn start(&self) -> Coord2 {
        self.start
    }

    pub fn placeable(&self) -> &[Coord2] {
        &self.placeable
    }

    /// Whether every placeable cell must hold a mine, leaving one candidate.
    pub fn is_single_candidate(&self) -> bool {
        usize::from(self.mines) == self.placeable.len()
    }

    pub fn is_safe(&self, coords: Coord2) -> bool {
        self.placeable.binary_search(&coords).is_err()
    }

    /// Uniformly samples `mines` distinct placeable cells.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<MineLayout> {
        let mut pool = self.placeable.clone();
        let (chosen, _) = pool.partial_shuffle(rng, usize::from(self.mines));
        MineLayout::new(self.size, chosen.to_vec())
    }

    /// A fresh field of the requested shape with `layout` installed and the
    /// start cell revealed.
    pub fn install(&self, field: &mut Field, layout: &MineLayout) -> Result<RevealOutcome> {
        field.fill(layout.mines())?;
        field.reveal(self.start)
    }
}
