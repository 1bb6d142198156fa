//! Low-level building blocks for custom scoring pipelines.
//!
//! These expose the SSIM plan and kernels behind [`crate::Comparator`] for
//! callers that score many crops of the same shape or need the per-window
//! map. Most users should prefer `Comparator` and `structural_similarity`.

pub use crate::kernel::scalar::SsimScalar;
pub use crate::kernel::{ChannelTables, Kernel, SsimParams, SsimPlan};

#[cfg(feature = "rayon")]
pub use crate::kernel::rayon::SsimRayon;
