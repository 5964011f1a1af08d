use crossbeam_channel::{Receiver, select};
use std::thread::{self, ScopedJoinHandle};
use std::time::Duration;

use crate::*;
use worker::Worker;

mod worker;

const DEFAULT_BUDGET: Duration = Duration::from_secs(30);

/// What a worker thread tells the coordinator when it is done.
#[derive(Debug)]
enum Report {
    /// The worker's slot now holds an accepted layout.
    Published(WorkerId),
    /// The stop token fired before anything was accepted.
    Stopped(WorkerId),
    Failed(WorkerId, GameError),
}

/// Parallel randomized search for a layout the oracle accepts.
///
/// Every worker samples layouts outside the safe zone of the request and
/// tests them on its own field. The first worker to publish wins; everyone
/// else is cancelled, joined and has its slot discarded before `run` returns.
/// The whole search, cleanup included, is bounded by `budget`: running out of
/// time is a [`SecurityFault::Timeout`], never a best-effort layout.
pub struct LayoutSearch<'a> {
    request: &'a LayoutRequest,
    oracle: &'a dyn SolvabilityOracle,
    workers: usize,
    budget: Duration,
    seed: Option<u64>,
}

impl<'a> LayoutSearch<'a> {
    pub fn new(request: &'a LayoutRequest, oracle: &'a dyn SolvabilityOracle) -> Self {
        Self {
            request,
            oracle,
            workers: 1,
            budget: DEFAULT_BUDGET,
            seed: None,
        }
    }

    pub fn from_config(
        request: &'a LayoutRequest,
        oracle: &'a dyn SolvabilityOracle,
        config: &SearchConfig,
    ) -> Result<Self> {
        Ok(Self::new(request, oracle)
            .with_workers(config.workers)
            .with_budget(config.budget()?)
            .with_seed(config.seed))
    }

    /// Zero workers runs the search on the calling thread.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn run(&self, handoff: &dyn Handoff) -> Result<MineLayout> {
        let stop = StopToken::with_deadline(Deadline::after(self.budget));
        log::debug!(
            "Searching {} mines on a {}x{} {} field, {} workers, budget {:?}",
            self.request.mines(),
            self.request.size().0,
            self.request.size().1,
            self.request.topology(),
            self.workers,
            self.budget
        );

        if self.request.is_single_candidate() {
            return self.run_single_candidate(&stop);
        }
        if cfg!(target_arch = "wasm32") || self.workers == 0 {
            return self.run_sequential(&stop);
        }
        match self.run_parallel(handoff, &stop) {
            Some(result) => result,
            None => {
                log::warn!("No worker thread could be spawned, searching sequentially");
                self.run_sequential(&stop)
            }
        }
    }

    fn worker(&self, index: usize, stop: &StopToken) -> Worker<'a> {
        let seed = match self.seed {
            Some(seed) => seed.wrapping_add(index as u64),
            None => rand::random(),
        };
        Worker::new(WorkerId(index), self.request, self.oracle, stop.clone(), seed)
    }

    fn timeout(&self) -> GameError {
        log::error!("Layout search ran out of its {:?} budget", self.budget);
        SecurityFault::Timeout {
            budget: self.budget,
        }
        .into()
    }

    /// Every placeable cell is a mine: there is nothing to retry.
    fn run_single_candidate(&self, stop: &StopToken) -> Result<MineLayout> {
        let layout = MineLayout::new(self.request.size(), self.request.placeable().to_vec())?;
        let mut field = Field::new(self.request.size(), self.request.topology())?;
        self.request.install(&mut field, &layout)?;

        match self.oracle.solve(&mut field, stop) {
            Verdict::Solved => Ok(layout),
            Verdict::Stuck => Err(GameError::Unsolvable),
            Verdict::Interrupted => Err(self.timeout()),
        }
    }

    fn run_sequential(&self, stop: &StopToken) -> Result<MineLayout> {
        match self.worker(0, stop).run()? {
            Some(layout) => Ok(layout),
            None => Err(self.timeout()),
        }
    }

    /// `None` when not a single worker thread could be started.
    fn run_parallel(&self, handoff: &dyn Handoff, stop: &StopToken) -> Option<Result<MineLayout>> {
        let (tx, rx) = crossbeam_channel::bounded(self.workers);

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.workers);
            for index in 0..self.workers {
                let worker = self.worker(index, stop);
                let id = worker.id();
                let tx = tx.clone();

                let spawned = thread::Builder::new()
                    .name(format!("layout-search-{}", index))
                    .spawn_scoped(scope, move || {
                        let report = match worker.run() {
                            Ok(Some(layout)) => match handoff.publish(id, &layout) {
                                Ok(()) => Report::Published(id),
                                Err(err) => Report::Failed(id, err),
                            },
                            Ok(None) => Report::Stopped(id),
                            Err(err) => Report::Failed(id, err),
                        };
                        // one report per worker always fits the channel
                        let _ = tx.send(report);
                    });

                match spawned {
                    Ok(handle) => handles.push((id, handle)),
                    Err(err) => log::warn!("Could not spawn {}: {}", id, err),
                }
            }
            // workers hold the only senders left, so a closed channel means all exited
            drop(tx);

            if handles.is_empty() {
                return None;
            }

            let claimed = self
                .await_winner(&rx, stop)
                .and_then(|id| Ok((id, handoff.claim(id, self.request.size())?)));
            stop.cancel();

            let winner = claimed.as_ref().ok().map(|&(id, _)| id);
            let cleanup = reap(handles, handoff, winner);

            Some(claimed.and_then(|(id, layout)| {
                cleanup?;
                log::debug!("Adopted the layout of {}", id);
                Ok(layout)
            }))
        })
    }

    fn await_winner(&self, rx: &Receiver<Report>, stop: &StopToken) -> Result<WorkerId> {
        let remaining = stop.deadline().map_or(self.budget, |deadline| deadline.remaining());
        let timer = crossbeam_channel::after(remaining);
        let mut failed = 0usize;

        loop {
            select! {
                recv(rx) -> report => match report {
                    Ok(Report::Published(id)) => return Ok(id),
                    Ok(Report::Stopped(id)) => log::trace!("{} stopped", id),
                    Ok(Report::Failed(id, err)) if err.is_security() => {
                        log::error!("{} raised a security fault: {}", id, err);
                        return Err(err);
                    }
                    Ok(Report::Failed(id, err)) => {
                        failed += 1;
                        log::warn!("{} failed: {}", id, err);
                    }
                    Err(_) if stop.has_expired() => return Err(self.timeout()),
                    Err(_) => {
                        log::error!("All workers exited without a layout, {} failed", failed);
                        return Err(GameError::WorkersExhausted);
                    }
                },
                recv(timer) -> _ => return Err(self.timeout()),
            }
        }
    }
}

/// Joins every worker, then discards the slot of everyone except `winner`.
fn reap(
    handles: Vec<(WorkerId, ScopedJoinHandle<'_, ()>)>,
    handoff: &dyn Handoff,
    winner: Option<WorkerId>,
) -> Result<()> {
    let mut result = Ok(());

    for (id, handle) in handles {
        if handle.join().is_err() {
            log::error!("{} panicked", id);
        }
        if Some(id) == winner {
            continue;
        }
        if let Err(err) = handoff.discard(id) {
            log::error!("Could not discard the slot of {}: {}", id, err);
            if result.is_ok() {
                result = Err(err);
            }
        }
    }

    result
}

/// Layout generator that only hands out layouts the oracle can finish
/// without guessing.
pub struct GuesslessGenerator<'a> {
    oracle: &'a dyn SolvabilityOracle,
    config: &'a SearchConfig,
}

impl<'a> GuesslessGenerator<'a> {
    pub fn new(oracle: &'a dyn SolvabilityOracle, config: &'a SearchConfig) -> Self {
        Self { oracle, config }
    }
}

impl LayoutGenerator for GuesslessGenerator<'_> {
    fn generate(&self, request: &LayoutRequest) -> Result<MineLayout> {
        let handoff = self.config.handoff();
        LayoutSearch::from_config(request, self.oracle, self.config)?.run(handoff.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use web_time::Instant;

    fn accept_all(_: &mut Field, _: &StopToken) -> Verdict {
        Verdict::Solved
    }

    fn reject_all(_: &mut Field, _: &StopToken) -> Verdict {
        Verdict::Stuck
    }

    #[derive(Default)]
    struct CountingHandoff {
        inner: MemoryHandoff,
        publishes: AtomicUsize,
        claims: AtomicUsize,
        discards: AtomicUsize,
    }

    impl Handoff for CountingHandoff {
        fn publish(&self, worker: WorkerId, layout: &MineLayout) -> Result<()> {
            self.publishes.fetch_add(1, Ordering::SeqCst);
            self.inner.publish(worker, layout)
        }

        fn claim(&self, worker: WorkerId, size: Coord2) -> Result<MineLayout> {
            self.claims.fetch_add(1, Ordering::SeqCst);
            self.inner.claim(worker, size)
        }

        fn discard(&self, worker: WorkerId) -> Result<()> {
            self.discards.fetch_add(1, Ordering::SeqCst);
            self.inner.discard(worker)
        }
    }

    struct RefusingHandoff;

    impl Handoff for RefusingHandoff {
        fn publish(&self, worker: WorkerId, _: &MineLayout) -> Result<()> {
            Err(SecurityFault::DuplicateArtifact { worker }.into())
        }

        fn claim(&self, worker: WorkerId, _: Coord2) -> Result<MineLayout> {
            Err(GameError::MissingArtifact { worker })
        }

        fn discard(&self, _: WorkerId) -> Result<()> {
            Ok(())
        }
    }

    fn beginner_request() -> LayoutRequest {
        LayoutRequest::new((9, 9), Topology::Moore, 10, (4, 4)).unwrap()
    }

    #[test]
    fn exactly_one_slot_is_claimed() {
        let request = beginner_request();
        let oracle = accept_all;

        for workers in [1, 2, 4, 8] {
            let handoff = CountingHandoff::default();
            let layout = LayoutSearch::new(&request, &oracle)
                .with_workers(workers)
                .with_budget(Duration::from_secs(10))
                .run(&handoff)
                .unwrap();

            assert_eq!(layout.mine_count(), 10);
            assert_eq!(handoff.claims.load(Ordering::SeqCst), 1);
            assert_eq!(handoff.discards.load(Ordering::SeqCst), workers - 1);
            assert!(handoff.publishes.load(Ordering::SeqCst) >= 1);
            assert!(handoff.inner.is_empty(), "{} workers left a slot", workers);
        }
    }

    #[test]
    fn layout_never_touches_safe_zone() {
        let request = beginner_request();
        let oracle = DeductionOracle::default();

        let layout = LayoutSearch::new(&request, &oracle)
            .with_workers(2)
            .with_budget(Duration::from_secs(20))
            .run(&MemoryHandoff::new())
            .unwrap();

        for x in 3..=5 {
            for y in 3..=5 {
                assert!(!layout.contains_mine((x, y)));
            }
        }

        let mut field = Field::new((9, 9), Topology::Moore).unwrap();
        request.install(&mut field, &layout).unwrap();
        assert_eq!(
            oracle.solve(&mut field, &StopToken::new()),
            Verdict::Solved
        );
    }

    #[test]
    fn reject_all_times_out_within_budget() {
        let request = beginner_request();
        let oracle = reject_all;
        let budget = Duration::from_millis(200);

        for workers in [0, 1, 4] {
            let started = Instant::now();
            let result = LayoutSearch::new(&request, &oracle)
                .with_workers(workers)
                .with_budget(budget)
                .run(&MemoryHandoff::new());
            let elapsed = started.elapsed();

            assert_eq!(result, Err(SecurityFault::Timeout { budget }.into()));
            assert!(elapsed >= budget);
            assert!(
                elapsed < budget + Duration::from_secs(2),
                "{} workers took {:?}",
                workers,
                elapsed
            );
        }
    }

    #[test]
    fn single_candidate_is_tested_once() {
        let request = LayoutRequest::new((3, 3), Topology::Neumann, 4, (1, 1)).unwrap();
        let calls = AtomicUsize::new(0);
        let counting = |_: &mut Field, _: &StopToken| {
            calls.fetch_add(1, Ordering::SeqCst);
            Verdict::Solved
        };

        let layout = LayoutSearch::new(&request, &counting)
            .with_workers(4)
            .run(&MemoryHandoff::new())
            .unwrap();

        assert_eq!(layout.mines(), &[(0, 0), (0, 2), (2, 0), (2, 2)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsolvable_single_candidate_is_not_retried() {
        let request = LayoutRequest::new((3, 3), Topology::Neumann, 4, (1, 1)).unwrap();
        let calls = AtomicUsize::new(0);
        let counting = |_: &mut Field, _: &StopToken| {
            calls.fetch_add(1, Ordering::SeqCst);
            Verdict::Stuck
        };

        let result = LayoutSearch::new(&request, &counting)
            .with_workers(4)
            .run(&MemoryHandoff::new());

        assert_eq!(result, Err(GameError::Unsolvable));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sequential_search_skips_handoff() {
        let request = beginner_request();
        let oracle = accept_all;
        let handoff = CountingHandoff::default();

        LayoutSearch::new(&request, &oracle)
            .with_workers(0)
            .run(&handoff)
            .unwrap();

        assert_eq!(handoff.publishes.load(Ordering::SeqCst), 0);
        assert_eq!(handoff.claims.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_oracle_exhausts_workers() {
        let request = beginner_request();
        let oracle = |_: &mut Field, _: &StopToken| -> Verdict { panic!("oracle blew up") };

        let result = LayoutSearch::new(&request, &oracle)
            .with_workers(3)
            .with_budget(Duration::from_secs(10))
            .run(&MemoryHandoff::new());

        assert_eq!(result, Err(GameError::WorkersExhausted));
    }

    #[test]
    fn publish_fault_is_fatal() {
        let request = beginner_request();
        let oracle = accept_all;

        let result = LayoutSearch::new(&request, &oracle)
            .with_workers(2)
            .with_budget(Duration::from_secs(10))
            .run(&RefusingHandoff);

        assert!(result.unwrap_err().is_security());
    }

    #[test]
    fn fixed_seed_is_reproducible_sequentially() {
        let request = beginner_request();
        let oracle = accept_all;
        let search = LayoutSearch::new(&request, &oracle)
            .with_workers(0)
            .with_seed(Some(5));

        let a = search.run(&MemoryHandoff::new()).unwrap();
        let b = search.run(&MemoryHandoff::new()).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn guessless_generator_uses_config() {
        let request = beginner_request();
        let oracle = accept_all;
        let dir = tempfile::tempdir().unwrap();
        let config = SearchConfig {
            workers: 3,
            budget_secs: 10.0,
            handoff: HandoffKind::Files,
            artifact_dir: dir.path().into(),
            ..SearchConfig::default()
        };

        let layout = GuesslessGenerator::new(&oracle, &config)
            .generate(&request)
            .unwrap();

        assert_eq!(layout.mine_count(), 10);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
