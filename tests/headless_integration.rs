mod common;

use std::sync::mpsc;
use std::time::Duration;

use common::{controller, fast_config, steady_targets, wait_for};
use whack::runtime::{GameEvent, Runner, TestEventSource};
use whack::stats::PersistenceGateway;
use whack::{Cue, Phase, UnlockedLevels};

// Drive the controller through the same Runner the terminal front end uses,
// with a channel standing in for the keyboard.
#[test]
fn headless_taps_flow_through_runner() {
    let (c, _store) = controller(fast_config(2000), steady_targets(1000.0));
    let cues = c.subscribe_cues();

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(TestEventSource::new(rx), Duration::from_millis(5));

    c.start_session(1, &UnlockedLevels::default()).unwrap();
    let cell = wait_for(&c, |s| s.active_target.is_some())
        .active_target
        .unwrap();

    tx.send(GameEvent::Tap(cell)).unwrap();
    tx.send(GameEvent::Tap(cell)).unwrap();
    tx.send(GameEvent::Quit).unwrap();

    for _ in 0..100u32 {
        match runner.step() {
            GameEvent::Tap(index) => {
                c.tap_hole(index);
            }
            GameEvent::Quit => {
                c.end_session();
                break;
            }
            GameEvent::Replay | GameEvent::Resize | GameEvent::Tick => {}
        }
    }

    let state = c.snapshot();
    assert_eq!(state.phase, Phase::Ended);
    assert_eq!(state.hits, 1);
    assert_eq!(state.misses, 1);

    let cues: Vec<Cue> = cues.rx.try_iter().collect();
    let hit_at = cues.iter().position(|c| *c == Cue::Hit).unwrap();
    assert_eq!(cues[hit_at + 1], Cue::Miss);
    assert_eq!(cues.last(), Some(&Cue::SessionOver));
    c.flush_persistence();
}

#[test]
fn headless_timed_session_finishes_by_clock() {
    let (c, store) = controller(fast_config(20), steady_targets(60_000.0));
    let (_tx, rx) = mpsc::channel();
    let runner = Runner::new(TestEventSource::new(rx), Duration::from_millis(10));

    c.start_session(1, &UnlockedLevels::default()).unwrap();
    for _ in 0..200u32 {
        if let GameEvent::Tick = runner.step() {
            if c.snapshot().phase == Phase::Ended {
                break;
            }
        }
    }

    assert_eq!(c.snapshot().phase, Phase::Ended, "session should end by time");
    c.flush_persistence();
    assert_eq!(store.player_aggregate("Tester").unwrap().unwrap().games_played, 1);
}

#[test]
fn reset_then_replay_runs_a_fresh_session() {
    let (c, _store) = controller(fast_config(2000), steady_targets(1000.0));
    c.start_session(1, &UnlockedLevels::default()).unwrap();
    let first = wait_for(&c, |s| s.active_target.is_some());
    c.tap_hole(first.active_target.unwrap());
    c.reset_session();
    assert_eq!(c.snapshot().phase, Phase::Idle);

    c.start_session(1, &UnlockedLevels::default()).unwrap();
    let second = wait_for(&c, |s| s.phase == Phase::Active);
    assert_ne!(second.session_id, first.session_id);
    assert_eq!(second.hits, 0);
    assert_eq!(second.score, 0);
    c.reset_session();
}
