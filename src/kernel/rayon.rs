//! Rayon-parallel kernel (feature-gated).
//!
//! Placement rows are scored in parallel; the per-row sums are then added in
//! row order, so the result is bit-identical to the scalar kernel.

use crate::kernel::scalar::SsimScalar;
use crate::kernel::{Kernel, SsimPlan};
use rayon::prelude::*;

/// Row-parallel SSIM kernel.
pub struct SsimRayon;

impl Kernel for SsimRayon {
    fn channel_mean(plan: &SsimPlan, channel: usize) -> f64 {
        let (cols, rows) = plan.placements();
        let row_sums: Vec<f64> = (0..rows)
            .into_par_iter()
            .map(|y| SsimScalar::row_sum(plan, channel, y))
            .collect();
        let mut total = 0.0f64;
        for sum in row_sums {
            total += sum;
        }
        total / (cols * rows) as f64
    }
}
