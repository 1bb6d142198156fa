//! WinSSIM is a region-synchronized capture and SSIM analysis engine.
//!
//! Live captures are cropped by operator-defined regions, compared against an
//! ordered library of reference patterns with a windowed structural
//! similarity score, and aggregated into runs and collections on disk. A
//! countdown scheduler paces the captures; a single-threaded control loop
//! ties scheduler, aggregator and persistence together.
//!
//! The SSIM kernel has a scalar implementation and an optional row-parallel
//! one behind the `rayon` feature. The `tracing` feature adds spans and
//! events around every stage.

pub mod analysis;
pub mod batch;
pub mod compare;
pub mod config;
pub mod control;
pub mod image;
pub mod kernel;
pub mod library;
pub mod lowlevel;
pub mod region;
pub mod run;
pub mod schedule;
pub mod source;
pub mod sync;
mod trace;
pub mod util;

pub use analysis::{scan_results, RunSummary};
pub use batch::{BatchCapture, BatchCollector, BatchCommand, BatchEvent, BatchSession};
pub use compare::{CompareConfig, Comparator, Comparison, Pattern};
pub use config::{BboxColor, ConfigStore, JsonConfigStore, MemoryConfigStore, RunSettings, Settings};
pub use control::{Command, ControlLoop, EngineEvent, Notice};
pub use image::{ImageView, OwnedImage};
pub use kernel::{structural_similarity, SsimParams};
pub use library::{FolderPatternLibrary, LibraryFolders, PatternId, PatternLibrary, PatternSource};
pub use region::{crop, validate, Region, RegionMode, RegionPair, RegionSet, SyncMode};
pub use run::{
    Aggregator, AggregatorState, Collection, CycleReport, FolderConflict, FsRecordSink,
    MemoryRecordSink, RecordSink, Run, RunMode, SealedRun,
};
pub use schedule::{CancelToken, Countdown, CountdownEvent, CountdownState, EventSink};
pub use source::{FrameSource, ImageFileFrameSource};
pub use sync::RegionSynchronizer;
pub use util::{WinSsimError, WinSsimResult};
