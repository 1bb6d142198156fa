//! Countdown scheduler.
//!
//! A countdown runs on its own thread and reports through an [`EventSink`]:
//! one [`CountdownEvent::Tick`] per elapsed second, labelled with the time
//! remaining as `MM:SS`, then a single [`CountdownEvent::Activate`] once the
//! `00:01` tick has elapsed. The capture is taken on activation, one tick
//! ahead of the nominal zero.
//!
//! At most one countdown is alive per [`Countdown`]. The only state shared
//! with the thread is the [`CancelToken`] flag, checked before every event,
//! so cancellation takes effect within one tick.

use crate::trace::{trace_event, trace_span};
use crate::util::{WinSsimError, WinSsimResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Event emitted by a running countdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CountdownEvent {
    /// One second elapsed; `remaining` is the label shown before the sleep.
    Tick { generation: u64, remaining: String },
    /// Terminal event: take the capture now.
    Activate { generation: u64, remaining: String },
}

impl CountdownEvent {
    /// Identifies the countdown that produced the event.
    pub fn generation(&self) -> u64 {
        match self {
            Self::Tick { generation, .. } | Self::Activate { generation, .. } => *generation,
        }
    }
}

/// Returned by an [`EventSink`] whose receiving side is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkClosed;

/// Destination of countdown events.
pub trait EventSink: Send + 'static {
    fn emit(&self, event: CountdownEvent) -> Result<(), SinkClosed>;
}

impl EventSink for Sender<CountdownEvent> {
    fn emit(&self, event: CountdownEvent) -> Result<(), SinkClosed> {
        self.send(event).map_err(|_| SinkClosed)
    }
}

impl EventSink for SyncSender<CountdownEvent> {
    fn emit(&self, event: CountdownEvent) -> Result<(), SinkClosed> {
        self.send(event).map_err(|_| SinkClosed)
    }
}

/// Shared "stop at next check" flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Observable scheduler state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownState {
    Idle,
    Running,
    /// The last countdown expired naturally and delivered its activation.
    Fired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerExit {
    Expired,
    Cancelled,
    SinkClosed,
}

/// Single-slot countdown scheduler.
#[derive(Debug)]
pub struct Countdown {
    tick: Duration,
    cancel: CancelToken,
    slot: Option<JoinHandle<TimerExit>>,
    last_exit: Option<TimerExit>,
    generation: u64,
}

impl Countdown {
    /// Scheduler with a one-second tick.
    pub fn new() -> Self {
        Self::with_tick(Duration::from_secs(1))
    }

    /// Scheduler with a custom tick length.
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            tick,
            cancel: CancelToken::new(),
            slot: None,
            last_exit: None,
            generation: 0,
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Generation of the most recently started countdown.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a countdown of `duration_seconds` ticks.
    ///
    /// `manual` forces a single tick. A zero duration counts as one tick.
    /// Fails with [`WinSsimError::AlreadyRunning`] while a countdown is
    /// alive; returns the new countdown's generation otherwise.
    pub fn start<S: EventSink>(
        &mut self,
        duration_seconds: u32,
        manual: bool,
        sink: S,
    ) -> WinSsimResult<u64> {
        if self.is_running() {
            return Err(WinSsimError::AlreadyRunning);
        }
        self.reap();
        self.cancel.clear();
        self.generation += 1;

        let ticks = if manual { 1 } else { duration_seconds.max(1) };
        let tick = self.tick;
        let token = self.cancel.clone();
        let generation = self.generation;
        trace_event!("countdown_started", generation = generation, ticks = ticks);
        self.slot = Some(thread::spawn(move || {
            run_countdown(ticks, tick, &token, &sink, generation)
        }));
        Ok(generation)
    }

    /// Cancels the running countdown and waits for its thread to stop.
    ///
    /// Idempotent; returns within one tick.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.slot.take() {
            let exit = handle.join().unwrap_or(TimerExit::Cancelled);
            trace_event!("countdown_cancelled", generation = self.generation);
            self.last_exit = Some(match exit {
                TimerExit::Expired => TimerExit::Expired,
                _ => TimerExit::Cancelled,
            });
        }
    }

    /// Waits for the countdown thread to exit on its own. Blocks for the
    /// rest of the countdown when called before its activation.
    pub fn join(&mut self) {
        self.reap();
    }

    /// Returns a handle to the cancellation flag.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.slot.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn state(&mut self) -> CountdownState {
        if self.is_running() {
            return CountdownState::Running;
        }
        self.reap();
        match self.last_exit {
            Some(TimerExit::Expired) => CountdownState::Fired,
            _ => CountdownState::Idle,
        }
    }

    fn reap(&mut self) {
        if let Some(handle) = self.slot.take() {
            self.last_exit = Some(handle.join().unwrap_or(TimerExit::Cancelled));
        }
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Formats seconds as `MM:SS`.
pub fn format_remaining(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn run_countdown<S: EventSink>(
    ticks: u32,
    tick: Duration,
    token: &CancelToken,
    sink: &S,
    generation: u64,
) -> TimerExit {
    let _span = trace_span!("countdown", generation = generation).entered();
    let mut remaining = ticks;
    while remaining > 0 {
        if token.is_cancelled() {
            return TimerExit::Cancelled;
        }
        let label = format_remaining(remaining);
        let event = CountdownEvent::Tick {
            generation,
            remaining: label.clone(),
        };
        if sink.emit(event).is_err() {
            trace_event!("countdown_sink_closed", generation = generation);
            return TimerExit::SinkClosed;
        }

        thread::sleep(tick);
        remaining -= 1;

        if remaining == 0 {
            if token.is_cancelled() {
                return TimerExit::Cancelled;
            }
            let event = CountdownEvent::Activate {
                generation,
                remaining: label,
            };
            if sink.emit(event).is_err() {
                trace_event!("countdown_sink_closed", generation = generation);
                return TimerExit::SinkClosed;
            }
        }
    }
    TimerExit::Expired
}

#[cfg(test)]
mod tests {
    use super::format_remaining;

    #[test]
    fn remaining_time_is_zero_padded() {
        assert_eq!(format_remaining(1), "00:01");
        assert_eq!(format_remaining(75), "01:15");
        assert_eq!(format_remaining(600), "10:00");
    }
}
