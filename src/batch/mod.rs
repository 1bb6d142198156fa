//! Batch pattern collection.
//!
//! Builds a pattern library from live captures. Each countdown activation
//! captures one frame and saves it in the target folder as the next
//! `NN_Pattern.png`. Numbering continues after the highest id already in the
//! folder, and an existing pattern file is never overwritten.
//!
//! [`BatchSession`] paces the captures with the same [`Countdown`] and
//! bounded polling as the run control loop.

use crate::control::{Notice, DEFAULT_POLL_INTERVAL};
use crate::image::io::save_png;
use crate::library::PatternId;
use crate::schedule::{Countdown, CountdownEvent};
use crate::source::FrameSource;
use crate::trace::{trace_event, trace_warn};
use crate::util::{WinSsimError, WinSsimResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// A pattern saved by the collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchCapture {
    pub id: PatternId,
    pub path: PathBuf,
}

/// Saves captures as consecutively numbered patterns.
#[derive(Clone, Debug)]
pub struct BatchCollector {
    folder: PathBuf,
    next_id: u32,
    captured: usize,
}

impl BatchCollector {
    /// Opens (creating if needed) the pattern folder.
    pub fn open(folder: impl Into<PathBuf>) -> WinSsimResult<Self> {
        let folder = folder.into();
        fs::create_dir_all(&folder)?;
        let next_id = next_free_id(highest_pattern_id(&folder)?)?;
        Ok(Self {
            folder,
            next_id,
            captured: 0,
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Id the next capture will be saved under, unless that file appears
    /// in the meantime.
    pub fn next_id(&self) -> PatternId {
        PatternId::new(self.next_id)
    }

    /// Patterns saved by this collector.
    pub fn captured(&self) -> usize {
        self.captured
    }

    /// Captures one frame and saves it as the next pattern.
    ///
    /// A failed capture or save consumes no id.
    pub fn capture(&mut self, frames: &mut dyn FrameSource) -> WinSsimResult<BatchCapture> {
        let frame = frames.capture_frame()?;
        let mut id = self.next_id;
        let mut path = self.folder.join(PatternId::new(id).file_name());
        while path.exists() {
            id = next_free_id(id)?;
            path = self.folder.join(PatternId::new(id).file_name());
        }
        save_png(frame.view(), &path)?;
        self.next_id = next_free_id(id)?;
        self.captured += 1;
        trace_event!("pattern_collected", id = id, captured = self.captured);
        Ok(BatchCapture {
            id: PatternId::new(id),
            path,
        })
    }
}

fn next_free_id(id: u32) -> WinSsimResult<u32> {
    id.checked_add(1).ok_or_else(|| WinSsimError::Config {
        reason: "pattern ids exhausted".to_string(),
    })
}

fn highest_pattern_id(folder: &Path) -> WinSsimResult<u32> {
    let mut highest = 0;
    for entry in fs::read_dir(folder)? {
        let name = entry?.file_name();
        let id = name
            .to_str()
            .filter(|n| n.ends_with("_Pattern.png"))
            .and_then(PatternId::from_file_name);
        if let Some(id) = id {
            highest = highest.max(id.as_u32());
        }
    }
    Ok(highest)
}

/// Operator commands of the batch view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchCommand {
    /// Capture on every activation until stopped.
    Start,
    Stop,
}

/// What a batch session reports.
#[derive(Clone, Debug)]
pub enum BatchEvent {
    /// Countdown tick, `MM:SS` remaining.
    Tick { remaining: String },
    Captured(BatchCapture),
    Stopped,
    Notice(Notice),
}

/// Countdown-paced batch collection on the caller's thread.
pub struct BatchSession<F: FrameSource> {
    collector: BatchCollector,
    frames: F,
    countdown: Countdown,
    timer_seconds: u32,
    timer_tx: Sender<CountdownEvent>,
    timer_rx: Receiver<CountdownEvent>,
    active_generation: Option<u64>,
    collecting: bool,
    poll_interval: Duration,
}

impl<F: FrameSource> BatchSession<F> {
    pub fn new(
        collector: BatchCollector,
        frames: F,
        countdown: Countdown,
        timer_seconds: u32,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel();
        Self {
            collector,
            frames,
            countdown,
            timer_seconds,
            timer_tx,
            timer_rx,
            active_generation: None,
            collecting: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn collector(&self) -> &BatchCollector {
        &self.collector
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn handle(&mut self, command: BatchCommand) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        match command {
            BatchCommand::Start => {
                if self.arm(&mut events) {
                    self.collecting = true;
                }
            }
            BatchCommand::Stop => {
                self.countdown.cancel();
                self.active_generation = None;
                self.collecting = false;
                events.push(BatchEvent::Stopped);
            }
        }
        events
    }

    /// Waits up to the poll interval for countdown events and processes
    /// every event already queued.
    pub fn pump(&mut self) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        let first = match self.timer_rx.recv_timeout(self.poll_interval) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return events;
            }
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

    fn dispatch(&mut self, event: CountdownEvent, events: &mut Vec<BatchEvent>) {
        if Some(event.generation()) != self.active_generation {
            return;
        }
        match event {
            CountdownEvent::Tick { remaining, .. } => events.push(BatchEvent::Tick { remaining }),
            CountdownEvent::Activate { .. } => {
                self.countdown.join();
                self.active_generation = None;
                match self.collector.capture(&mut self.frames) {
                    Ok(capture) => events.push(BatchEvent::Captured(capture)),
                    Err(error) => {
                        trace_warn!("batch_capture_failed", error = error.to_string().as_str());
                        events.push(BatchEvent::Notice(Notice::CycleFailed { error }));
                    }
                }
                if self.collecting && !self.arm(events) {
                    self.collecting = false;
                }
            }
        }
    }

    fn arm(&mut self, events: &mut Vec<BatchEvent>) -> bool {
        match self
            .countdown
            .start(self.timer_seconds, false, self.timer_tx.clone())
        {
            Ok(generation) => {
                self.active_generation = Some(generation);
                true
            }
            Err(error) => {
                events.push(BatchEvent::Notice(Notice::TimerRejected { error }));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::OwnedImage;

    fn grey() -> WinSsimResult<OwnedImage> {
        OwnedImage::filled(4, 4, 3, 128)
    }

    #[test]
    fn numbering_continues_after_existing_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("07_Pattern.png"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let mut collector = BatchCollector::open(dir.path()).unwrap();
        assert_eq!(collector.next_id(), PatternId::new(8));

        let mut frames = grey;
        let capture = collector.capture(&mut frames).unwrap();
        assert_eq!(capture.id, PatternId::new(8));
        assert_eq!(capture.path, dir.path().join("08_Pattern.png"));
        assert!(capture.path.is_file());
        assert_eq!(collector.captured(), 1);
    }

    #[test]
    fn existing_files_are_skipped_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = BatchCollector::open(dir.path()).unwrap();
        fs::write(dir.path().join("01_Pattern.png"), b"keep").unwrap();

        let mut frames = grey;
        let capture = collector.capture(&mut frames).unwrap();
        assert_eq!(capture.id, PatternId::new(2));
        assert_eq!(fs::read(dir.path().join("01_Pattern.png")).unwrap(), b"keep");
    }

    #[test]
    fn failed_capture_consumes_no_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = BatchCollector::open(dir.path()).unwrap();
        let mut unplugged = || -> WinSsimResult<OwnedImage> {
            Err(WinSsimError::DeviceUnavailable {
                reason: "unplugged".to_string(),
            })
        };
        assert!(collector.capture(&mut unplugged).is_err());
        assert_eq!(collector.next_id(), PatternId::new(1));
        assert_eq!(collector.captured(), 0);
    }
}
