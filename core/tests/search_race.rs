use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use mineproof_core::*;
use web_time::Instant;

fn beginner_request() -> LayoutRequest {
    LayoutRequest::new((9, 9), Topology::Moore, 10, (4, 4)).unwrap()
}

fn artifact_count(dir: &tempfile::TempDir) -> usize {
    fs::read_dir(dir.path()).unwrap().count()
}

#[test]
fn racing_winners_leave_no_artifacts() {
    let request = beginner_request();
    let oracle = |_: &mut Field, _: &StopToken| Verdict::Solved;
    let dir = tempfile::tempdir().unwrap();

    for _ in 0..20 {
        let handoff = FileHandoff::new(dir.path(), "race");
        let layout = LayoutSearch::new(&request, &oracle)
            .with_workers(6)
            .with_budget(Duration::from_secs(10))
            .run(&handoff)
            .unwrap();

        assert_eq!(layout.mine_count(), 10);
        assert_eq!(artifact_count(&dir), 0);
    }
}

#[test]
fn in_flight_oracles_are_cancelled() {
    let request = beginner_request();
    let calls = AtomicUsize::new(0);
    // first call wins at once, every later call spins until told to stop
    let oracle = |_: &mut Field, stop: &StopToken| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Verdict::Solved;
        }
        while !stop.should_stop() {
            thread::sleep(Duration::from_millis(1));
        }
        Verdict::Interrupted
    };
    let dir = tempfile::tempdir().unwrap();
    let handoff = FileHandoff::new(dir.path(), "cancel");

    let started = Instant::now();
    LayoutSearch::new(&request, &oracle)
        .with_workers(4)
        .with_budget(Duration::from_secs(30))
        .run(&handoff)
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(artifact_count(&dir), 0);
}

#[test]
fn timeout_cleans_up_slow_workers() {
    let request = beginner_request();
    let oracle = |_: &mut Field, stop: &StopToken| {
        while !stop.should_stop() {
            thread::sleep(Duration::from_millis(1));
        }
        Verdict::Interrupted
    };
    let dir = tempfile::tempdir().unwrap();
    let handoff = FileHandoff::new(dir.path(), "slow");
    let budget = Duration::from_millis(300);

    let started = Instant::now();
    let err = LayoutSearch::new(&request, &oracle)
        .with_workers(4)
        .with_budget(budget)
        .run(&handoff)
        .unwrap_err();

    assert_eq!(err, GameError::Security(SecurityFault::Timeout { budget }));
    assert!(started.elapsed() < budget + Duration::from_secs(2));
    assert_eq!(artifact_count(&dir), 0);
}

#[test]
fn planted_artifact_aborts_the_search() {
    let request = beginner_request();
    let oracle = |_: &mut Field, _: &StopToken| Verdict::Solved;
    let dir = tempfile::tempdir().unwrap();
    let handoff = FileHandoff::new(dir.path(), "planted");
    fs::write(handoff.artifact_path(WorkerId(0)), "0 0\n").unwrap();

    let err = LayoutSearch::new(&request, &oracle)
        .with_workers(1)
        .with_budget(Duration::from_secs(10))
        .run(&handoff)
        .unwrap_err();

    assert!(matches!(
        err,
        GameError::Security(SecurityFault::ArtifactCreate { .. })
    ));
}

#[test]
fn guessless_game_over_file_handoff() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::from_toml_str(&format!(
        "[search]\nworkers = 3\nbudget-secs = 20.0\nhandoff = \"files\"\nartifact-dir = {:?}\n",
        dir.path().to_str().unwrap()
    ))
    .unwrap();
    let params = GameParams {
        width: 9,
        height: 9,
        ..GameParams::default()
    };
    let mut game = Game::new(params, config).unwrap();

    game.reveal((4, 4)).unwrap();

    assert!(matches!(
        game.status(),
        GameStatus::PlayGame | GameStatus::GameWon
    ));
    assert_eq!(artifact_count(&dir), 0);

    // a guessless layout can be finished by the same oracle
    let mut field = game.field().clone();
    assert_eq!(
        DeductionOracle::default().solve(&mut field, &StopToken::new()),
        Verdict::Solved
    );
}
