//! Shared utility helpers.

pub mod error;
pub mod math;

pub use error::{WinSsimError, WinSsimResult};
pub use math::{natural_cmp, RunningMean};
