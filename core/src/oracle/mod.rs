use serde::{Deserialize, Serialize};

use crate::*;
pub use deduction::*;

mod deduction;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Every safe cell was revealed without guessing.
    Solved,
    /// Deduction ran out of safe moves.
    Stuck,
    /// The stop token fired before a decision was reached.
    Interrupted,
}

impl Verdict {
    pub const fn is_solvable(self) -> bool {
        matches!(self, Self::Solved)
    }
}

/// Decides whether a fully mined field with at least one revealed cell can be
/// finished by deduction alone.
///
/// The oracle is free to reveal and flag cells on the field it is given; callers
/// hand it a scratch field. Long-running implementations must poll `stop` and
/// return [`Verdict::Interrupted`] once it fires, since a layout search cannot
/// finish before every oracle call it started has returned.
pub trait SolvabilityOracle: Send + Sync {
    fn solve(&self, field: &mut Field, stop: &StopToken) -> Verdict;
}

impl<F> SolvabilityOracle for F
where
    F: Fn(&mut Field, &StopToken) -> Verdict + Send + Sync,
{
    fn solve(&self, field: &mut Field, stop: &StopToken) -> Verdict {
        self(field, stop)
    }
}
