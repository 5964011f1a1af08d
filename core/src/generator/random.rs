use rand::prelude::*;

use super::*;

/// Places mines uniformly at random outside the safe zone, once, with no
/// solvability check. Used when the game allows losing to a guess.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomLayoutGenerator {
    seed: u64,
}

impl RandomLayoutGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl LayoutGenerator for RandomLayoutGenerator {
    fn generate(&self, request: &LayoutRequest) -> Result<MineLayout> {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let layout = request.sample(&mut rng)?;
        log::debug!(
            "Placed {} mines at random on a {}x{} {} field",
            layout.mine_count(),
            request.size().0,
            request.size().1,
            request.topology()
        );
        Ok(layout)
    }
}
