use rand::prelude::*;

use crate::*;

/// One sampler of a layout search. Owns its scratch field and RNG.
pub(super) struct Worker<'a> {
    id: WorkerId,
    request: &'a LayoutRequest,
    oracle: &'a dyn SolvabilityOracle,
    stop: StopToken,
    seed: u64,
}

impl<'a> Worker<'a> {
    pub(super) fn new(
        id: WorkerId,
        request: &'a LayoutRequest,
        oracle: &'a dyn SolvabilityOracle,
        stop: StopToken,
        seed: u64,
    ) -> Self {
        Self {
            id,
            request,
            oracle,
            stop,
            seed,
        }
    }

    pub(super) fn id(&self) -> WorkerId {
        self.id
    }

    /// Samples until the oracle accepts a layout or the token stops us.
    /// `None` means the search was stopped first.
    pub(super) fn run(&self) -> Result<Option<MineLayout>> {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut field = Field::new(self.request.size(), self.request.topology())?;
        let mut attempts = 0u64;

        while !self.stop.should_stop() {
            attempts += 1;
            let layout = self.request.sample(&mut rng)?;
            if self.test(&mut field, &layout)? {
                log::debug!("{} accepted a layout after {} attempts", self.id, attempts);
                return Ok(Some(layout));
            }
        }

        log::trace!("{} stopped after {} attempts", self.id, attempts);
        Ok(None)
    }

    /// Installs `layout` on `field` and asks the oracle about it.
    fn test(&self, field: &mut Field, layout: &MineLayout) -> Result<bool> {
        if self.request.install(field, layout)? == RevealOutcome::HitMine {
            log::error!("{} sampled a mine inside the safe zone", self.id);
            return Ok(false);
        }

        Ok(match self.oracle.solve(field, &self.stop) {
            Verdict::Solved => true,
            Verdict::Stuck | Verdict::Interrupted => false,
        })
    }
}
