use core::ops::BitOr;
use serde::{Deserialize, Serialize};

pub use config::*;
pub use error::*;
pub use field::*;
pub use game::*;
pub use generator::*;
pub use handoff::*;
pub use ledger::*;
pub use oracle::*;
pub use search::*;
pub use stop::*;
pub use tile::*;
pub use types::*;

mod config;
mod error;
mod field;
mod game;
mod generator;
mod handoff;
mod ledger;
mod oracle;
mod search;
mod stop;
mod tile;
mod types;

/// A complete mine placement for a field of a given size.
///
/// Mines are kept sorted and unique, so two layouts with the same mines compare equal
/// regardless of the order they were sampled in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MineLayout {
    size: Coord2,
    mines: Vec<Coord2>,
}

impl MineLayout {
    pub fn new(size: Coord2, mut mines: Vec<Coord2>) -> Result<Self> {
        if mines.iter().any(|&(x, y)| x >= size.0 || y >= size.1) {
            return Err(GameError::InvalidCoords);
        }

        mines.sort_unstable();
        if let Some(pair) = mines.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(GameError::DuplicateMine(pair[0]));
        }

        Ok(Self { size, mines })
    }

    pub fn size(&self) -> Coord2 {
        self.size
    }

    pub fn mine_count(&self) -> CellCount {
        // bounded by the field area, which always fits
        self.mines.len() as CellCount
    }

    pub fn mines(&self) -> &[Coord2] {
        &self.mines
    }

    pub fn contains_mine(&self, coords: Coord2) -> bool {
        self.mines.binary_search(&coords).is_ok()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkOutcome {
    NoChange,
    Changed,
}

/// Outcome of revealing a cell, replacing win/lose callbacks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RevealOutcome {
    NoChange,
    Revealed,
    HitMine,
    Won,
}

/// Used to merge outcomes when revealing several cells at once
impl BitOr for RevealOutcome {
    type Output = RevealOutcome;

    fn bitor(self, rhs: Self) -> Self::Output {
        use RevealOutcome::*;
        match (self, rhs) {
            (HitMine, _) => HitMine,
            (_, HitMine) => HitMine,
            (Won, _) => Won,
            (_, Won) => Won,
            (Revealed, _) => Revealed,
            (_, Revealed) => Revealed,
            (NoChange, NoChange) => NoChange,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_rejects_out_of_bounds_mine() {
        assert_eq!(
            MineLayout::new((3, 3), vec![(0, 0), (3, 1)]),
            Err(GameError::InvalidCoords)
        );
    }

    #[test]
    fn layout_rejects_duplicates() {
        assert_eq!(
            MineLayout::new((3, 3), vec![(2, 2), (0, 1), (2, 2)]),
            Err(GameError::DuplicateMine((2, 2)))
        );
    }

    #[test]
    fn layout_ignores_sampling_order() {
        let a = MineLayout::new((4, 4), vec![(3, 0), (1, 2)]).unwrap();
        let b = MineLayout::new((4, 4), vec![(1, 2), (3, 0)]).unwrap();
        assert_eq!(a, b);
        assert!(a.contains_mine((1, 2)));
        assert!(!a.contains_mine((2, 1)));
    }

    #[test]
    fn hit_mine_dominates_merged_outcomes() {
        use RevealOutcome::*;
        assert_eq!(Revealed | HitMine | Won, HitMine);
        assert_eq!(NoChange | Won, Won);
        assert_eq!(NoChange | NoChange, NoChange);
    }
}
