use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use winssim::schedule::format_remaining;
use winssim::{Countdown, CountdownEvent, CountdownState, WinSsimError};

const TICK: Duration = Duration::from_millis(5);
const WAIT: Duration = Duration::from_secs(5);

/// Collects events until the activation (or the channel closes).
fn collect(rx: &mpsc::Receiver<CountdownEvent>) -> Vec<CountdownEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.recv_timeout(WAIT) {
        let done = matches!(event, CountdownEvent::Activate { .. });
        events.push(event);
        if done {
            break;
        }
    }
    events
}

fn labels(events: &[CountdownEvent]) -> Vec<(bool, String)> {
    events
        .iter()
        .map(|e| match e {
            CountdownEvent::Tick { remaining, .. } => (false, remaining.clone()),
            CountdownEvent::Activate { remaining, .. } => (true, remaining.clone()),
        })
        .collect()
}

fn wait_until_stopped(countdown: &mut Countdown) -> CountdownState {
    let deadline = Instant::now() + WAIT;
    loop {
        let state = countdown.state();
        if state != CountdownState::Running || Instant::now() > deadline {
            return state;
        }
        thread::sleep(TICK);
    }
}

#[test]
fn ticks_count_down_then_activate_at_one() {
    let mut countdown = Countdown::with_tick(TICK);
    let (tx, rx) = mpsc::channel();
    let generation = countdown.start(3, false, tx).unwrap();
    let events = collect(&rx);
    assert_eq!(
        labels(&events),
        vec![
            (false, "00:03".to_string()),
            (false, "00:02".to_string()),
            (false, "00:01".to_string()),
            (true, "00:01".to_string()),
        ]
    );
    assert!(events.iter().all(|e| e.generation() == generation));
    assert_eq!(wait_until_stopped(&mut countdown), CountdownState::Fired);
}

#[test]
fn manual_mode_equals_one_second_countdown() {
    let mut manual = Countdown::with_tick(TICK);
    let (tx, rx) = mpsc::channel();
    manual.start(30, true, tx).unwrap();
    let manual_events = labels(&collect(&rx));

    let mut plain = Countdown::with_tick(TICK);
    let (tx, rx) = mpsc::channel();
    plain.start(1, false, tx).unwrap();
    let plain_events = labels(&collect(&rx));

    assert_eq!(manual_events, plain_events);
    assert_eq!(manual_events.len(), 2);
}

#[test]
fn second_start_is_rejected_until_cancelled() {
    let mut countdown = Countdown::with_tick(Duration::from_millis(50));
    let (tx, _rx) = mpsc::channel();
    countdown.start(100, false, tx.clone()).unwrap();
    assert_eq!(countdown.state(), CountdownState::Running);
    assert_eq!(
        countdown.start(5, false, tx.clone()),
        Err(WinSsimError::AlreadyRunning)
    );

    countdown.cancel();
    countdown.cancel();
    assert_eq!(countdown.state(), CountdownState::Idle);
    assert!(countdown.start(5, false, tx).is_ok());
}

#[test]
fn cancel_suppresses_activation() {
    let mut countdown = Countdown::with_tick(Duration::from_millis(20));
    let (tx, rx) = mpsc::channel();
    countdown.start(50, false, tx).unwrap();
    let first = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(
        first,
        CountdownEvent::Tick {
            generation: 1,
            remaining: format_remaining(50),
        }
    );

    countdown.cancel();
    let rest: Vec<CountdownEvent> = rx.try_iter().collect();
    assert!(rest.len() <= 1);
    assert!(rest
        .iter()
        .all(|e| matches!(e, CountdownEvent::Tick { .. })));
    thread::sleep(Duration::from_millis(60));
    assert!(rx.try_recv().is_err());
}

#[test]
fn closed_sink_stops_timer_quietly() {
    let mut countdown = Countdown::with_tick(TICK);
    let (tx, rx) = mpsc::channel();
    drop(rx);
    countdown.start(10, false, tx).unwrap();
    assert_eq!(wait_until_stopped(&mut countdown), CountdownState::Idle);
}

#[test]
fn generations_increase_per_start() {
    let mut countdown = Countdown::with_tick(TICK);
    let (tx, rx) = mpsc::channel();
    let first = countdown.start(1, false, tx.clone()).unwrap();
    collect(&rx);
    countdown.join();
    let second = countdown.start(1, true, tx).unwrap();
    let events = collect(&rx);
    assert!(second > first);
    assert!(events.iter().all(|e| e.generation() == second));
}
