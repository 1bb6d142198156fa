//! Run/collection aggregator.
//!
//! Each activation of the countdown is one trigger: the aggregator captures a
//! frame, compares it against the current pattern for every region pair,
//! persists the comparisons and advances the pattern cursor. When the cursor
//! reaches the library size captured at the start of the run, the run is
//! sealed and (in continuous mode) the next run directory is opened.
//!
//! A trigger either completes or leaves the aggregator exactly as it was:
//! comparisons are computed for all regions before anything is written, and
//! the cursor only moves after every record was persisted.

mod collection;
mod record;

pub use collection::{resolve_collection_name, Collection, FolderConflict, Run, DEFAULT_COLLECTION_NAME};
pub use record::{
    Evidence, FsRecordSink, MemoryRecordSink, RecordRow, RecordSink, ANNOTATION_DIR,
    ANNOTATION_FILE, ANNOTATION_HEADER,
};

use crate::compare::{Comparator, Comparison};
use crate::config::RunSettings;
use crate::library::PatternSource;
use crate::region::{RegionMode, RegionSet};
use crate::source::FrameSource;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{WinSsimError, WinSsimResult};
use std::path::PathBuf;

/// Aggregator state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregatorState {
    AwaitingTrigger,
    Capturing,
    Scoring,
    Advancing,
    /// A single-pass run was sealed; the next trigger opens a new run.
    RunSealed,
}

/// Behaviour at the end of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Open the next run immediately and keep going.
    #[default]
    Continuous,
    /// Stop automation once the current run is sealed.
    SingleRun,
}

/// Summary of a sealed run.
#[derive(Clone, Debug, PartialEq)]
pub struct SealedRun {
    pub ordinal: usize,
    pub storage_path: PathBuf,
    pub comparisons: usize,
    pub average: f64,
    /// Runs sealed in this collection so far, this one included.
    pub sealed_runs: usize,
    /// Directory of the run opened in its place, if any.
    pub next_run: Option<PathBuf>,
    /// Automation must stop (single-run mode).
    pub stop_automation: bool,
}

/// Outcome of one successful trigger.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub comparisons: Vec<Comparison>,
    pub run_ordinal: usize,
    pub run_path: PathBuf,
    /// Patterns visited in the run after this trigger.
    pub cursor: usize,
    pub pattern_total: usize,
    pub running_average: f64,
    pub collection_average: f64,
    pub sealed: Option<SealedRun>,
}

/// Owns the active run and collection.
#[derive(Debug)]
pub struct Aggregator<R: RecordSink> {
    sink: R,
    comparator: Comparator,
    regions: RegionSet,
    settings: RunSettings,
    mode: RunMode,
    state: AggregatorState,
    collection: Collection,
    run: Option<Run>,
    runs_opened: usize,
}

impl<R: RecordSink> Aggregator<R> {
    /// Opens the collection `collection_name` in `sink`. The first run is
    /// opened by the first trigger.
    pub fn open(
        mut sink: R,
        collection_name: &str,
        mut regions: RegionSet,
        settings: RunSettings,
    ) -> WinSsimResult<Self> {
        regions.mirror_if_synced();
        let collection = sink.open_collection(collection_name)?;
        if let Some(conflict) = collection.conflict() {
            trace_event!(
                "folder_conflict",
                requested = conflict.requested.as_str(),
                resolved = conflict.resolved.as_str()
            );
        }
        Ok(Self {
            sink,
            comparator: Comparator::new(),
            regions,
            settings,
            mode: RunMode::Continuous,
            state: AggregatorState::AwaitingTrigger,
            collection,
            run: None,
            runs_opened: 0,
        })
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RunMode) {
        self.mode = mode;
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// The active (or last sealed) run.
    pub fn run(&self) -> Option<&Run> {
        self.run.as_ref()
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    /// Replaces the region set used by the next trigger. Staged edits of a
    /// synced set are mirrored first.
    pub fn set_regions(&mut self, mut regions: RegionSet) {
        regions.mirror_if_synced();
        self.regions = regions;
    }

    pub fn settings(&self) -> RunSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: RunSettings) {
        self.settings = settings;
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    /// Handles one activation: capture, score, persist, advance.
    ///
    /// On error nothing is recorded, the pattern cursor does not move and
    /// the aggregator returns to the state it was in.
    pub fn on_trigger(
        &mut self,
        frames: &mut dyn FrameSource,
        patterns: &mut dyn PatternSource,
    ) -> WinSsimResult<CycleReport> {
        let _span = trace_span!("aggregator_cycle").entered();
        let previous = self.state;
        let result = self.cycle(frames, patterns);
        if let Err(err) = &result {
            self.state = previous;
            trace_warn!("cycle_failed", error = err.to_string().as_str());
        }
        result
    }

    fn cycle(
        &mut self,
        frames: &mut dyn FrameSource,
        patterns: &mut dyn PatternSource,
    ) -> WinSsimResult<CycleReport> {
        self.state = AggregatorState::Capturing;
        let frame = frames.capture_frame()?;

        self.state = AggregatorState::Scoring;
        if patterns.pattern_count() == 0 {
            return Err(WinSsimError::NoPatternSelected);
        }
        if self.needs_new_run() {
            self.open_next_run(patterns)?;
        }
        let pattern = patterns.current_pattern();
        let mut comparisons = Vec::with_capacity(self.regions.len());
        for (id, pair) in self.regions.iter() {
            comparisons.push(
                self.comparator
                    .compare(frame.view(), pattern.as_ref(), id, pair)?,
            );
        }
        let pattern = pattern.ok_or(WinSsimError::NoPatternSelected)?;

        self.state = AggregatorState::Advancing;
        let run = self.run.as_ref().ok_or(WinSsimError::NoPatternSelected)?;
        let averages = run.preview_averages(comparisons.iter().map(|c| c.score));
        for (comparison, average) in comparisons.iter_mut().zip(averages) {
            comparison.running_average = average;
        }
        let evidence = record::Evidence {
            frame: frame.view(),
            pattern: pattern.image.view(),
            bbox_rgb: self.settings.bbox_color.rgb(),
            bbox_line_width: self.settings.bbox_line_width,
            multi_region: self.regions.mode() == RegionMode::Multiple,
        };
        self.sink
            .write_comparison_records(run, &comparisons, &evidence)?;

        let run = self.run.as_mut().ok_or(WinSsimError::NoPatternSelected)?;
        run.record(comparisons.clone())?;
        for comparison in &comparisons {
            self.collection.record(comparison.score);
        }
        patterns.advance_pattern();

        let mut report = CycleReport {
            comparisons,
            run_ordinal: run.ordinal(),
            run_path: run.storage_path().to_path_buf(),
            cursor: run.cursor(),
            pattern_total: run.pattern_total(),
            running_average: run.running_average(),
            collection_average: self.collection.average(),
            sealed: None,
        };
        trace_event!(
            "comparison_recorded",
            run = report.run_ordinal,
            cursor = report.cursor,
            average = report.running_average
        );

        if run.is_complete() {
            report.sealed = Some(self.seal(patterns));
        } else {
            self.state = AggregatorState::AwaitingTrigger;
        }
        Ok(report)
    }

    fn needs_new_run(&self) -> bool {
        self.run.as_ref().map_or(true, Run::is_sealed)
    }

    fn open_next_run(&mut self, patterns: &mut dyn PatternSource) -> WinSsimResult<PathBuf> {
        let path = self.sink.open_run(&self.collection)?;
        self.runs_opened += 1;
        patterns.rewind();
        self.run = Some(Run::new(
            self.collection.name(),
            path.clone(),
            self.runs_opened,
            patterns.pattern_count(),
        ));
        Ok(path)
    }

    fn seal(&mut self, patterns: &mut dyn PatternSource) -> SealedRun {
        let sealed_runs = self.collection.note_sealed();
        let mut sealed = match self.run.as_mut() {
            Some(run) => {
                run.seal();
                SealedRun {
                    ordinal: run.ordinal(),
                    storage_path: run.storage_path().to_path_buf(),
                    comparisons: run.count(),
                    average: run.running_average(),
                    sealed_runs,
                    next_run: None,
                    stop_automation: false,
                }
            }
            None => SealedRun {
                ordinal: 0,
                storage_path: PathBuf::new(),
                comparisons: 0,
                average: 0.0,
                sealed_runs,
                next_run: None,
                stop_automation: false,
            },
        };
        trace_event!(
            "run_sealed",
            run = sealed.ordinal,
            comparisons = sealed.comparisons,
            average = sealed.average
        );

        match self.mode {
            RunMode::SingleRun => {
                sealed.stop_automation = true;
                self.state = AggregatorState::RunSealed;
            }
            RunMode::Continuous => {
                match self.open_next_run(patterns) {
                    Ok(path) => sealed.next_run = Some(path),
                    Err(err) => {
                        trace_warn!("run_open_failed", error = err.to_string().as_str());
                    }
                }
                self.state = AggregatorState::AwaitingTrigger;
            }
        }
        sealed
    }
}
