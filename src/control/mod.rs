//! Cooperative control loop.
//!
//! Runs on the caller's thread. Operator [`Command`]s arm or cancel the
//! countdown; [`ControlLoop::pump`] waits a bounded interval for countdown
//! events, turns activations into aggregator triggers and reports what
//! happened as [`EngineEvent`]s. Scoring is synchronous, so two triggers are
//! never processed at once. No error escapes the loop: failures become
//! [`Notice`]s and automation retries on the next activation.

use crate::run::{Aggregator, CycleReport, FolderConflict, RecordSink, RunMode, SealedRun};
use crate::library::PatternSource;
use crate::schedule::{Countdown, CountdownEvent};
use crate::source::FrameSource;
use crate::trace::{trace_event, trace_warn};
use crate::util::WinSsimError;
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Default bounded wait of [`ControlLoop::pump`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Operator commands of the run view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Continuous automation: re-arm after every activation.
    Start,
    /// Automation that stops when the current run is sealed.
    SingleRun,
    /// One single-tick countdown, automation off.
    Manual,
    /// Cancel the countdown and stop automation.
    Stop,
}

/// User-visible notification.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    /// The requested collection name was taken and has been suffixed.
    FolderConflict(FolderConflict),
    /// A trigger failed; nothing was recorded.
    CycleFailed { error: WinSsimError },
    /// The countdown could not be started.
    TimerRejected { error: WinSsimError },
}

impl Notice {
    /// True when the operator can fix the cause (regions, pattern choice).
    pub fn is_user_correctable(&self) -> bool {
        match self {
            Self::FolderConflict(_) => false,
            Self::CycleFailed { error } | Self::TimerRejected { error } => {
                error.is_user_correctable()
            }
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FolderConflict(conflict) => write!(
                f,
                "collection '{}' exists, using '{}'",
                conflict.requested, conflict.resolved
            ),
            Self::CycleFailed { error } => write!(f, "cycle failed: {error}"),
            Self::TimerRejected { error } => write!(f, "timer not started: {error}"),
        }
    }
}

/// What the loop reports to the UI layer.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    /// Countdown tick, `MM:SS` remaining.
    Tick { remaining: String },
    /// A trigger was scored and recorded.
    Scored(CycleReport),
    RunSealed(SealedRun),
    /// Automation ended, by command or at a single-run seal.
    Stopped,
    Notice(Notice),
}

/// Drives countdown, capture and aggregation from one thread.
pub struct ControlLoop<R, F, P>
where
    R: RecordSink,
    F: FrameSource,
    P: PatternSource,
{
    aggregator: Aggregator<R>,
    frames: F,
    patterns: P,
    countdown: Countdown,
    timer_tx: Sender<CountdownEvent>,
    timer_rx: Receiver<CountdownEvent>,
    active_generation: Option<u64>,
    automation: bool,
    poll_interval: Duration,
    pending: Vec<EngineEvent>,
}

impl<R, F, P> ControlLoop<R, F, P>
where
    R: RecordSink,
    F: FrameSource,
    P: PatternSource,
{
    pub fn new(aggregator: Aggregator<R>, frames: F, patterns: P, countdown: Countdown) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel();
        let pending = aggregator
            .collection()
            .conflict()
            .map(|c| EngineEvent::Notice(Notice::FolderConflict(c)))
            .into_iter()
            .collect();
        Self {
            aggregator,
            frames,
            patterns,
            countdown,
            timer_tx,
            timer_rx,
            active_generation: None,
            automation: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            pending,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn aggregator(&self) -> &Aggregator<R> {
        &self.aggregator
    }

    pub fn aggregator_mut(&mut self) -> &mut Aggregator<R> {
        &mut self.aggregator
    }

    pub fn patterns(&self) -> &P {
        &self.patterns
    }

    /// Automation re-arms the countdown after each activation.
    pub fn automation(&self) -> bool {
        self.automation
    }

    /// True when no countdown is running and automation is off.
    pub fn is_idle(&self) -> bool {
        !self.automation && !self.countdown.is_running()
    }

    /// Applies an operator command.
    pub fn handle(&mut self, command: Command) -> Vec<EngineEvent> {
        trace_event!("command", command = format!("{command:?}").as_str());
        let mut events = Vec::new();
        match command {
            Command::Start | Command::SingleRun => {
                let mode = if command == Command::Start {
                    RunMode::Continuous
                } else {
                    RunMode::SingleRun
                };
                // A rejected start leaves mode and automation as they were.
                if self.arm(false, &mut events) {
                    self.aggregator.set_mode(mode);
                    self.automation = true;
                }
            }
            Command::Manual => {
                self.countdown.cancel();
                self.active_generation = None;
                self.automation = false;
                self.arm(true, &mut events);
            }
            Command::Stop => {
                self.countdown.cancel();
                self.active_generation = None;
                self.automation = false;
                events.push(EngineEvent::Stopped);
            }
        }
        events
    }

    /// Waits up to the poll interval for countdown events and processes
    /// every event already queued.
    pub fn pump(&mut self) -> Vec<EngineEvent> {
        let mut events = std::mem::take(&mut self.pending);
        let first = match self.timer_rx.recv_timeout(self.poll_interval) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        };
        let Some(first) = first else {
            return events;
        };
        self.dispatch(first, &mut events);
        loop {
            match self.timer_rx.try_recv() {
                Ok(event) => self.dispatch(event, &mut events),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    fn dispatch(&mut self, event: CountdownEvent, events: &mut Vec<EngineEvent>) {
        if Some(event.generation()) != self.active_generation {
            return;
        }
        match event {
            CountdownEvent::Tick { remaining, .. } => {
                events.push(EngineEvent::Tick { remaining });
            }
            CountdownEvent::Activate { .. } => {
                self.countdown.join();
                self.active_generation = None;
                self.trigger(events);
            }
        }
    }

    fn trigger(&mut self, events: &mut Vec<EngineEvent>) {
        match self
            .aggregator
            .on_trigger(&mut self.frames, &mut self.patterns)
        {
            Ok(report) => {
                let sealed = report.sealed.clone();
                events.push(EngineEvent::Scored(report));
                if let Some(sealed) = sealed {
                    let stop = sealed.stop_automation;
                    events.push(EngineEvent::RunSealed(sealed));
                    if stop {
                        self.automation = false;
                        events.push(EngineEvent::Stopped);
                    }
                }
            }
            Err(error) => {
                trace_warn!("trigger_failed", error = error.to_string().as_str());
                events.push(EngineEvent::Notice(Notice::CycleFailed { error }));
            }
        }
        if self.automation && !self.arm(false, events) {
            self.automation = false;
        }
    }

    fn arm(&mut self, manual: bool, events: &mut Vec<EngineEvent>) -> bool {
        let seconds = self.aggregator.settings().timer_seconds;
        match self.countdown.start(seconds, manual, self.timer_tx.clone()) {
            Ok(generation) => {
                self.active_generation = Some(generation);
                true
            }
            Err(error) => {
                events.push(EngineEvent::Notice(Notice::TimerRejected { error }));
                false
            }
        }
    }
}
