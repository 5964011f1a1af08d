use hashbrown::HashSet;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::*;

/// The playing field: mine placement plus what the player can see.
///
/// A field is topology-aware only through [`Field::neighbors`]; everything else
/// works on plain coordinates. Reveals report a [`RevealOutcome`] instead of
/// notifying anyone, so callers decide what a win or a loss means.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    topology: Topology,
    mines: Array2<bool>,
    board: Array2<Cell>,
    mine_count: CellCount,
    revealed_count: CellCount,
    flagged_count: CellCount,
    triggered_mine: Option<Coord2>,
}

impl Field {
    pub fn new(size: Coord2, topology: Topology) -> Result<Self> {
        if size.0 == 0 || size.1 == 0 {
            return Err(GameError::InvalidSize);
        }

        Ok(Self {
            topology,
            mines: Array2::default(size.to_nd_index()),
            board: Array2::default(size.to_nd_index()),
            mine_count: 0,
            revealed_count: 0,
            flagged_count: 0,
            triggered_mine: None,
        })
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn size(&self) -> Coord2 {
        let dim = self.board.dim();
        // dimensions come from a `Coord2` in `new`
        (dim.0 as Coord, dim.1 as Coord)
    }

    pub fn total_cells(&self) -> CellCount {
        let (x, y) = self.size();
        mult(x, y)
    }

    pub fn mine_count(&self) -> CellCount {
        self.mine_count
    }

    pub fn safe_cell_count(&self) -> CellCount {
        self.total_cells() - self.mine_count
    }

    pub fn revealed_count(&self) -> CellCount {
        self.revealed_count
    }

    pub fn flagged_count(&self) -> CellCount {
        self.flagged_count
    }

    /// Mines minus flags; never negative because flagging stops at zero.
    pub fn flags_left(&self) -> CellCount {
        self.mine_count - self.flagged_count
    }

    /// Whether every safe cell has been revealed.
    pub fn is_complete(&self) -> bool {
        self.revealed_count == self.safe_cell_count()
    }

    pub fn triggered_mine(&self) -> Option<Coord2> {
        self.triggered_mine
    }

    pub fn contains(&self, coords: Coord2) -> bool {
        let (x_end, y_end) = self.size();
        coords.0 < x_end && coords.1 < y_end
    }

    pub fn validate_coords(&self, coords: Coord2) -> Result<Coord2> {
        if self.contains(coords) {
            Ok(coords)
        } else {
            Err(GameError::InvalidCoords)
        }
    }

    /// Every coordinate, column by column.
    pub fn all_cells(&self) -> impl Iterator<Item = Coord2> + use<> {
        let (x_end, y_end) = self.size();
        (0..x_end).flat_map(move |x| (0..y_end).map(move |y| (x, y)))
    }

    pub fn neighbors(&self, coords: Coord2) -> NeighborIter {
        self.topology.neighbors(coords, self.size())
    }

    pub fn cell_at(&self, coords: Coord2) -> Cell {
        self.board[coords.to_nd_index()]
    }

    pub fn has_mine_at(&self, coords: Coord2) -> bool {
        self.mines[coords.to_nd_index()]
    }

    pub fn adjacent_mine_count(&self, coords: Coord2) -> u8 {
        // at most eight neighbours in any topology
        self.neighbors(coords).filter(|&pos| self.has_mine_at(pos)).count() as u8
    }

    /// Removes every mine and hides every cell.
    pub fn clear(&mut self) {
        self.mines.fill(false);
        self.board.fill(Cell::Hidden);
        self.mine_count = 0;
        self.revealed_count = 0;
        self.flagged_count = 0;
        self.triggered_mine = None;
    }

    /// Clears the field and places exactly the given mines.
    ///
    /// On error the field is left cleared.
    pub fn fill(&mut self, mines: &[Coord2]) -> Result<()> {
        self.clear();

        for &coords in mines {
            if let Err(err) = self.place_mine(coords) {
                self.clear();
                return Err(err);
            }
        }

        log::trace!("Filled field with {} mines", self.mine_count);
        Ok(())
    }

    fn place_mine(&mut self, coords: Coord2) -> Result<()> {
        let coords = self.validate_coords(coords)?;
        if self.has_mine_at(coords) {
            return Err(GameError::DuplicateMine(coords));
        }
        self.mines[coords.to_nd_index()] = true;
        self.mine_count += 1;
        Ok(())
    }

    pub fn flag(&mut self, coords: Coord2) -> Result<MarkOutcome> {
        let coords = self.validate_coords(coords)?;

        Ok(match self.board[coords.to_nd_index()] {
            Cell::Hidden if self.flags_left() > 0 => {
                self.board[coords.to_nd_index()] = Cell::Flagged;
                self.flagged_count += 1;
                MarkOutcome::Changed
            }
            _ => MarkOutcome::NoChange,
        })
    }

    pub fn unflag(&mut self, coords: Coord2) -> Result<MarkOutcome> {
        let coords = self.validate_coords(coords)?;

        Ok(match self.board[coords.to_nd_index()] {
            Cell::Flagged => {
                self.board[coords.to_nd_index()] = Cell::Hidden;
                self.flagged_count -= 1;
                MarkOutcome::Changed
            }
            _ => MarkOutcome::NoChange,
        })
    }

    pub fn toggle_flag(&mut self, coords: Coord2) -> Result<MarkOutcome> {
        let coords = self.validate_coords(coords)?;

        match self.board[coords.to_nd_index()] {
            Cell::Flagged => self.unflag(coords),
            _ => self.flag(coords),
        }
    }

    /// Reveals a hidden cell, flood-filling outwards from zeroes.
    ///
    /// Flagged and already revealed cells are left alone.
    pub fn reveal(&mut self, coords: Coord2) -> Result<RevealOutcome> {
        let coords = self.validate_coords(coords)?;

        if matches!(self.board[coords.to_nd_index()], Cell::Hidden) {
            Ok(self.reveal_single_cell(coords))
        } else {
            Ok(RevealOutcome::NoChange)
        }
    }

    fn reveal_single_cell(&mut self, coords: Coord2) -> RevealOutcome {
        if self.has_mine_at(coords) {
            self.board[coords.to_nd_index()] = Cell::Mine;
            self.triggered_mine = Some(coords);
            log::debug!("Revealed mine at {:?}", coords);
            return RevealOutcome::HitMine;
        }

        let count = self.adjacent_mine_count(coords);
        self.board[coords.to_nd_index()] = Cell::Revealed(count);
        self.revealed_count += 1;

        if count == 0 {
            let mut visited: HashSet<Coord2> = [coords].into_iter().collect();
            let mut to_visit: VecDeque<_> = self
                .neighbors(coords)
                .filter(|&pos| matches!(self.cell_at(pos), Cell::Hidden))
                .collect();

            while let Some(visit_coords) = to_visit.pop_front() {
                if !visited.insert(visit_coords) {
                    continue;
                }

                // skip flagged or already revealed cells
                if !matches!(self.cell_at(visit_coords), Cell::Hidden) {
                    continue;
                }

                let visit_count = self.adjacent_mine_count(visit_coords);
                self.board[visit_coords.to_nd_index()] = Cell::Revealed(visit_count);
                self.revealed_count += 1;

                if visit_count == 0 {
                    to_visit.extend(
                        self.neighbors(visit_coords)
                            .filter(|&pos| matches!(self.cell_at(pos), Cell::Hidden))
                            .filter(|pos| !visited.contains(pos)),
                    );
                }
            }
        }

        if self.is_complete() {
            RevealOutcome::Won
        } else {
            RevealOutcome::Revealed
        }
    }

    /// Shows every hidden cell, mines included, without any flood-fill or
    /// outcome. Flags stay where they are.
    pub fn reveal_all(&mut self) {
        for coords in self.all_cells() {
            if !matches!(self.cell_at(coords), Cell::Hidden) {
                continue;
            }

            if self.has_mine_at(coords) {
                self.board[coords.to_nd_index()] = Cell::Mine;
            } else {
                let count = self.adjacent_mine_count(coords);
                self.board[coords.to_nd_index()] = Cell::Revealed(count);
                self.revealed_count += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(size: Coord2, topology: Topology, mines: &[Coord2]) -> Field {
        let mut field = Field::new(size, topology).unwrap();
        field.fill(mines).unwrap();
        field
    }

    #[test]
    fn reveal_hits_mine_and_records_it() {
        let mut field = field((2, 2), Topology::Moore, &[(0, 0)]);

        assert_eq!(field.reveal((0, 0)).unwrap(), RevealOutcome::HitMine);
        assert_eq!(field.cell_at((0, 0)), Cell::Mine);
        assert_eq!(field.triggered_mine(), Some((0, 0)));
    }

    #[test]
    fn reveal_flood_fill_opens_zero_region() {
        let mut field = field((3, 3), Topology::Moore, &[(2, 2)]);

        assert_eq!(field.reveal((0, 0)).unwrap(), RevealOutcome::Won);
        assert_eq!(field.cell_at((0, 0)), Cell::Revealed(0));
        assert_eq!(field.cell_at((1, 1)), Cell::Revealed(1));
        assert_eq!(field.cell_at((2, 2)), Cell::Hidden);
    }

    #[test]
    fn neumann_flood_fill_does_not_cross_diagonals() {
        // a diagonal wall of mines seals off the lower right corner
        let mut field = field((3, 3), Topology::Neumann, &[(2, 0), (1, 1), (0, 2)]);

        assert_eq!(field.reveal((0, 0)).unwrap(), RevealOutcome::Revealed);
        assert_eq!(field.cell_at((0, 0)), Cell::Revealed(0));
        assert_eq!(field.cell_at((2, 2)), Cell::Hidden);
    }

    #[test]
    fn flood_fill_skips_flagged_cells() {
        let mut field = field((4, 1), Topology::Moore, &[(3, 0)]);
        field.flag((1, 0)).unwrap();

        assert_eq!(field.reveal((0, 0)).unwrap(), RevealOutcome::Revealed);
        assert_eq!(field.cell_at((1, 0)), Cell::Flagged);
        assert_eq!(field.cell_at((2, 0)), Cell::Hidden);
    }

    #[test]
    fn flags_left_never_goes_negative() {
        let mut field = field((3, 1), Topology::Moore, &[(0, 0)]);

        assert_eq!(field.flag((1, 0)).unwrap(), MarkOutcome::Changed);
        assert_eq!(field.flags_left(), 0);
        assert_eq!(field.flag((2, 0)).unwrap(), MarkOutcome::NoChange);
        assert_eq!(field.flags_left(), 0);

        assert_eq!(field.toggle_flag((1, 0)).unwrap(), MarkOutcome::Changed);
        assert_eq!(field.flags_left(), 1);
    }

    #[test]
    fn revealed_cells_cannot_be_flagged() {
        let mut field = field((3, 1), Topology::Moore, &[(0, 0)]);
        field.reveal((2, 0)).unwrap();

        assert_eq!(field.flag((2, 0)).unwrap(), MarkOutcome::NoChange);
        assert_eq!(field.cell_at((2, 0)), Cell::Revealed(0));
    }

    #[test]
    fn fill_rejects_duplicates_and_leaves_field_cleared() {
        let mut field = Field::new((3, 3), Topology::Hex).unwrap();

        assert_eq!(
            field.fill(&[(1, 1), (1, 1)]),
            Err(GameError::DuplicateMine((1, 1)))
        );
        assert_eq!(field.mine_count(), 0);
        assert!(!field.has_mine_at((1, 1)));
    }

    #[test]
    fn reveal_all_keeps_flags() {
        let mut field = field((3, 1), Topology::Moore, &[(0, 0), (2, 0)]);
        field.flag((2, 0)).unwrap();

        field.reveal_all();

        assert_eq!(field.cell_at((0, 0)), Cell::Mine);
        assert_eq!(field.cell_at((1, 0)), Cell::Revealed(2));
        assert_eq!(field.cell_at((2, 0)), Cell::Flagged);
    }

    #[test]
    fn zero_sized_field_is_rejected() {
        assert_eq!(
            Field::new((0, 4), Topology::Moore),
            Err(GameError::InvalidSize)
        );
    }
}
