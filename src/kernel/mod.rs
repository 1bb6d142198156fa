//! Structural-similarity kernels.
//!
//! Scores follow the windowed SSIM of Wang et al. with a uniform window and
//! sample covariance. The per-window map is averaged over every placement
//! that lies fully inside the crop, then over channels.

use crate::trace::trace_span;
use crate::util::WinSsimResult;
use crate::ImageView;

mod plan;
pub mod scalar;

#[cfg(feature = "rayon")]
pub mod rayon;

pub use plan::{ChannelTables, SsimPlan};

/// Parameters of the windowed SSIM.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SsimParams {
    /// Requested side of the square window (odd). Crops smaller than the
    /// window shrink it to the largest odd size that fits.
    pub win_size: usize,
    /// Luminance stabiliser, `C1 = (k1 * data_range)^2`.
    pub k1: f64,
    /// Contrast stabiliser, `C2 = (k2 * data_range)^2`.
    pub k2: f64,
    /// Dynamic range of the samples.
    pub data_range: f64,
    /// Normalise variances by `N - 1` instead of `N`.
    pub sample_covariance: bool,
}

impl Default for SsimParams {
    fn default() -> Self {
        Self {
            win_size: 7,
            k1: 0.01,
            k2: 0.03,
            data_range: 255.0,
            sample_covariance: true,
        }
    }
}

/// Kernel trait for SSIM evaluation over a prepared plan.
pub trait Kernel {
    /// Mean SSIM of one channel over all window placements.
    fn channel_mean(plan: &SsimPlan, channel: usize) -> f64;

    /// Mean SSIM across channels.
    fn mean_ssim(plan: &SsimPlan) -> f64 {
        let channels = plan.channels();
        let total: f64 = (0..channels).map(|c| Self::channel_mean(plan, c)).sum();
        total / channels as f64
    }
}

/// Builds a plan for two equally shaped crops and scores it.
///
/// Uses the row-parallel kernel when `parallel` is set and the `rayon`
/// feature is enabled, the scalar kernel otherwise.
pub fn structural_similarity(
    a: ImageView<'_>,
    b: ImageView<'_>,
    params: &SsimParams,
    parallel: bool,
) -> WinSsimResult<f64> {
    let plan = SsimPlan::new(a, b, params)?;
    let _span = trace_span!("ssim_kernel", win = plan.win(), channels = plan.channels()).entered();
    #[cfg(feature = "rayon")]
    if parallel {
        return Ok(<self::rayon::SsimRayon as Kernel>::mean_ssim(&plan));
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;
    Ok(<self::scalar::SsimScalar as Kernel>::mean_ssim(&plan))
}
