//! Scalar reference kernel.

use crate::kernel::{Kernel, SsimPlan};

/// Scalar SSIM kernel: walks every window placement row by row.
pub struct SsimScalar;

impl SsimScalar {
    /// Sum of window SSIM values along placement row `y`.
    pub(crate) fn row_sum(plan: &SsimPlan, channel: usize, y: usize) -> f64 {
        let (cols, _) = plan.placements();
        let mut sum = 0.0f64;
        for x in 0..cols {
            sum += plan.window_ssim(channel, x, y);
        }
        sum
    }

    /// Full SSIM map of one channel, row-major over placements.
    pub fn ssim_map(plan: &SsimPlan, channel: usize) -> Vec<f64> {
        let (cols, rows) = plan.placements();
        let mut map = Vec::with_capacity(cols * rows);
        for y in 0..rows {
            for x in 0..cols {
                map.push(plan.window_ssim(channel, x, y));
            }
        }
        map
    }
}

impl Kernel for SsimScalar {
    fn channel_mean(plan: &SsimPlan, channel: usize) -> f64 {
        let (cols, rows) = plan.placements();
        let mut total = 0.0f64;
        for y in 0..rows {
            total += Self::row_sum(plan, channel, y);
        }
        total / (cols * rows) as f64
    }
}
