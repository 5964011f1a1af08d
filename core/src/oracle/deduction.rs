use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{SolvabilityOracle, Verdict};
use crate::*;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MineCountUsage {
    #[default]
    UseIfKnown,
    Ignore,
}

/// Default oracle: plays the field forward with local clue rules only.
///
/// Each pass builds one constraint per revealed clue and tries, in order, the
/// single-clue rules, the subset rule between overlapping clues, and finally the
/// global mine count. The first rule that yields anything is applied and the
/// pass starts over.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionOracle {
    pub mine_count_usage: MineCountUsage,
}

impl DeductionOracle {
    pub const fn new(mine_count_usage: MineCountUsage) -> Self {
        Self { mine_count_usage }
    }
}

/// `mines` of the `unknowns` around `clue` are mines.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Constraint {
    clue: Coord2,
    unknowns: SmallVec<[Coord2; 8]>,
    mines: u8,
}

#[derive(Debug, Default)]
struct Deductions {
    safe: HashSet<Coord2>,
    mines: HashSet<Coord2>,
}

impl Deductions {
    fn is_empty(&self) -> bool {
        self.safe.is_empty() && self.mines.is_empty()
    }

    fn mark(&mut self, cells: impl IntoIterator<Item = Coord2>, is_mine: bool) {
        if is_mine {
            self.mines.extend(cells);
        } else {
            self.safe.extend(cells);
        }
    }

    fn is_contradictory(&self) -> bool {
        !self.safe.is_disjoint(&self.mines)
    }
}

impl SolvabilityOracle for DeductionOracle {
    fn solve(&self, field: &mut Field, stop: &StopToken) -> Verdict {
        let mut passes = 0usize;

        loop {
            if field.is_complete() {
                log::trace!("Solved after {} passes", passes);
                return Verdict::Solved;
            }
            if stop.should_stop() {
                return Verdict::Interrupted;
            }
            passes += 1;

            let constraints = collect_constraints(field);
            let mut deductions = Deductions::default();

            apply_single_clue_rules(&constraints, &mut deductions);
            if deductions.is_empty() {
                apply_subset_rule(&constraints, &mut deductions);
            }
            if deductions.is_empty() && self.mine_count_usage == MineCountUsage::UseIfKnown {
                apply_mine_count_rule(field, &mut deductions);
            }

            if deductions.is_empty() {
                log::trace!("Stuck after {} passes", passes);
                return Verdict::Stuck;
            }
            if deductions.is_contradictory() {
                log::warn!("Contradicting deductions, field state is inconsistent");
                return Verdict::Stuck;
            }

            match apply(field, deductions) {
                Ok(RevealOutcome::HitMine) => {
                    log::error!("Deduced a mine as safe, field state is inconsistent");
                    return Verdict::Stuck;
                }
                Ok(_) => {}
                Err(err) => {
                    log::error!("Could not apply deductions: {}", err);
                    return Verdict::Stuck;
                }
            }
        }
    }
}

fn collect_constraints(field: &Field) -> Vec<Constraint> {
    let mut constraints = Vec::new();

    for clue in field.all_cells() {
        let Some(clue_mines) = field.cell_at(clue).clue() else {
            continue;
        };

        let mut unknowns = SmallVec::new();
        let mut flagged = 0u8;
        for neighbor in field.neighbors(clue) {
            match field.cell_at(neighbor) {
                Cell::Hidden => unknowns.push(neighbor),
                Cell::Flagged | Cell::Mine => flagged += 1,
                Cell::Revealed(_) => {}
            }
        }

        if unknowns.is_empty() {
            continue;
        }
        unknowns.sort_unstable();

        constraints.push(Constraint {
            clue,
            unknowns,
            mines: clue_mines.saturating_sub(flagged),
        });
    }

    constraints
}

fn apply_single_clue_rules(constraints: &[Constraint], out: &mut Deductions) {
    for constraint in constraints {
        if constraint.mines == 0 {
            out.mark(constraint.unknowns.iter().copied(), false);
        } else if usize::from(constraint.mines) == constraint.unknowns.len() {
            out.mark(constraint.unknowns.iter().copied(), true);
        }
    }
}

/// When the unknowns of one clue are a strict subset of another's, the cells
/// only the larger clue sees hold exactly the difference in mines.
fn apply_subset_rule(constraints: &[Constraint], out: &mut Deductions) {
    let mut by_cell: HashMap<Coord2, SmallVec<[usize; 8]>> = HashMap::new();
    for (id, constraint) in constraints.iter().enumerate() {
        for &cell in &constraint.unknowns {
            by_cell.entry(cell).or_default().push(id);
        }
    }

    for (id, small) in constraints.iter().enumerate() {
        // any superset must also contain the first unknown
        let Some(candidates) = by_cell.get(&small.unknowns[0]) else {
            continue;
        };

        for &other_id in candidates {
            let large = &constraints[other_id];
            if other_id == id || large.unknowns.len() <= small.unknowns.len() {
                continue;
            }
            if !small
                .unknowns
                .iter()
                .all(|cell| large.unknowns.binary_search(cell).is_ok())
            {
                continue;
            }

            let extra: SmallVec<[Coord2; 8]> = large
                .unknowns
                .iter()
                .filter(|cell| small.unknowns.binary_search(cell).is_err())
                .copied()
                .collect();
            let Some(extra_mines) = large.mines.checked_sub(small.mines) else {
                log::warn!(
                    "Clue at {:?} needs fewer mines than its subset at {:?}",
                    large.clue,
                    small.clue
                );
                continue;
            };

            if extra_mines == 0 {
                out.mark(extra, false);
            } else if usize::from(extra_mines) == extra.len() {
                out.mark(extra, true);
            }
        }
    }
}

fn apply_mine_count_rule(field: &Field, out: &mut Deductions) {
    let hidden: Vec<Coord2> = field
        .all_cells()
        .filter(|&cell| matches!(field.cell_at(cell), Cell::Hidden))
        .collect();
    if hidden.is_empty() {
        return;
    }

    let remaining = usize::from(field.flags_left());
    if remaining == 0 {
        out.mark(hidden, false);
    } else if remaining == hidden.len() {
        out.mark(hidden, true);
    }
}

fn apply(field: &mut Field, deductions: Deductions) -> Result<RevealOutcome> {
    for cell in deductions.mines {
        field.flag(cell)?;
    }

    let mut outcome = RevealOutcome::NoChange;
    for cell in deductions.safe {
        outcome = outcome | field.reveal(cell)?;
    }
    Ok(outcome)
}
