//! Integral-image precomputation for windowed SSIM.

use crate::image::ImageView;
use crate::kernel::SsimParams;
use crate::util::{WinSsimError, WinSsimResult};

/// Summed-area tables of one channel of a crop pair.
///
/// Each table has `(width + 1) * (height + 1)` entries with a zero first row
/// and column, so any window sum is four lookups. Samples are integers, so
/// the sums are exact in `f64` for any crop a camera can produce.
pub struct ChannelTables {
    stride: usize,
    sum_a: Vec<f64>,
    sum_b: Vec<f64>,
    sum_aa: Vec<f64>,
    sum_bb: Vec<f64>,
    sum_ab: Vec<f64>,
}

impl ChannelTables {
    fn build(a: ImageView<'_>, b: ImageView<'_>, channel: usize) -> WinSsimResult<Self> {
        let width = a.width();
        let height = a.height();
        let channels = a.channels();
        let stride = width + 1;
        let len = stride * (height + 1);
        let mut tables = Self {
            stride,
            sum_a: vec![0.0; len],
            sum_b: vec![0.0; len],
            sum_aa: vec![0.0; len],
            sum_bb: vec![0.0; len],
            sum_ab: vec![0.0; len],
        };

        for y in 0..height {
            let row_a = a.row(y).ok_or(WinSsimError::BufferTooSmall {
                needed: (y + 1) * a.stride(),
                got: a.as_slice().len(),
            })?;
            let row_b = b.row(y).ok_or(WinSsimError::BufferTooSmall {
                needed: (y + 1) * b.stride(),
                got: b.as_slice().len(),
            })?;
            let mut run_a = 0.0f64;
            let mut run_b = 0.0f64;
            let mut run_aa = 0.0f64;
            let mut run_bb = 0.0f64;
            let mut run_ab = 0.0f64;
            for x in 0..width {
                let va = row_a[x * channels + channel] as f64;
                let vb = row_b[x * channels + channel] as f64;
                run_a += va;
                run_b += vb;
                run_aa += va * va;
                run_bb += vb * vb;
                run_ab += va * vb;

                let above = y * stride + x + 1;
                let idx = above + stride;
                tables.sum_a[idx] = tables.sum_a[above] + run_a;
                tables.sum_b[idx] = tables.sum_b[above] + run_b;
                tables.sum_aa[idx] = tables.sum_aa[above] + run_aa;
                tables.sum_bb[idx] = tables.sum_bb[above] + run_bb;
                tables.sum_ab[idx] = tables.sum_ab[above] + run_ab;
            }
        }
        Ok(tables)
    }

    #[inline]
    fn window(&self, table: &[f64], x: usize, y: usize, win: usize) -> f64 {
        let s = self.stride;
        let top = y * s;
        let bottom = (y + win) * s;
        table[bottom + x + win] - table[top + x + win] - table[bottom + x] + table[top + x]
    }

    /// Window sums `(a, b, aa, bb, ab)` for the window with top-left `(x, y)`.
    #[inline]
    pub fn window_sums(&self, x: usize, y: usize, win: usize) -> [f64; 5] {
        [
            self.window(&self.sum_a, x, y, win),
            self.window(&self.sum_b, x, y, win),
            self.window(&self.sum_aa, x, y, win),
            self.window(&self.sum_bb, x, y, win),
            self.window(&self.sum_ab, x, y, win),
        ]
    }
}

/// Prepared SSIM evaluation for one crop pair.
pub struct SsimPlan {
    width: usize,
    height: usize,
    win: usize,
    c1: f64,
    c2: f64,
    cov_norm: f64,
    tables: Vec<ChannelTables>,
}

impl SsimPlan {
    /// Validates shapes and builds per-channel tables.
    ///
    /// Fails with [`WinSsimError::ShapeMismatch`] when the crops differ in
    /// width, height or channel count.
    pub fn new(a: ImageView<'_>, b: ImageView<'_>, params: &SsimParams) -> WinSsimResult<Self> {
        if a.shape() != b.shape() {
            return Err(WinSsimError::ShapeMismatch {
                image: a.shape(),
                pattern: b.shape(),
            });
        }

        let width = a.width();
        let height = a.height();
        let win = effective_window(width, height, params.win_size);
        let np = (win * win) as f64;
        let cov_norm = if params.sample_covariance && win > 1 {
            np / (np - 1.0)
        } else {
            1.0
        };
        let c1 = (params.k1 * params.data_range).powi(2);
        let c2 = (params.k2 * params.data_range).powi(2);

        let tables = (0..a.channels())
            .map(|c| ChannelTables::build(a, b, c))
            .collect::<WinSsimResult<Vec<_>>>()?;

        Ok(Self {
            width,
            height,
            win,
            c1,
            c2,
            cov_norm,
            tables,
        })
    }

    /// Returns the window side actually used.
    pub fn win(&self) -> usize {
        self.win
    }

    pub fn channels(&self) -> usize {
        self.tables.len()
    }

    /// Number of window placements along x and y.
    pub fn placements(&self) -> (usize, usize) {
        (self.width - self.win + 1, self.height - self.win + 1)
    }

    /// Tables for `channel`.
    pub fn tables(&self, channel: usize) -> Option<&ChannelTables> {
        self.tables.get(channel)
    }

    /// SSIM of the window with top-left `(x, y)` in `channel`.
    #[inline]
    pub fn window_ssim(&self, channel: usize, x: usize, y: usize) -> f64 {
        let [sa, sb, saa, sbb, sab] = self.tables[channel].window_sums(x, y, self.win);
        let np = (self.win * self.win) as f64;
        let ua = sa / np;
        let ub = sb / np;
        let uaa = saa / np;
        let ubb = sbb / np;
        let uab = sab / np;
        let va = self.cov_norm * (uaa - ua * ua);
        let vb = self.cov_norm * (ubb - ub * ub);
        let vab = self.cov_norm * (uab - ua * ub);

        let num = (2.0 * ua * ub + self.c1) * (2.0 * vab + self.c2);
        let den = (ua * ua + ub * ub + self.c1) * (va + vb + self.c2);
        num / den
    }
}

/// Largest odd window not exceeding `requested` or the crop's shorter side.
pub(crate) fn effective_window(width: usize, height: usize, requested: usize) -> usize {
    let side = requested.max(1).min(width).min(height);
    let odd = if side % 2 == 0 { side - 1 } else { side };
    odd.max(1)
}

#[cfg(test)]
mod tests {
    use super::{effective_window, SsimPlan};
    use crate::image::OwnedImage;
    use crate::kernel::SsimParams;

    #[test]
    fn window_shrinks_to_odd_side() {
        assert_eq!(effective_window(100, 100, 7), 7);
        assert_eq!(effective_window(6, 40, 7), 5);
        assert_eq!(effective_window(5, 5, 7), 5);
        assert_eq!(effective_window(1, 9, 7), 1);
        assert_eq!(effective_window(2, 2, 7), 1);
    }

    #[test]
    fn window_sums_match_direct_sums() {
        let data: Vec<u8> = (0u8..30).collect();
        let a = OwnedImage::new(data.clone(), 6, 5, 1).unwrap();
        let b = OwnedImage::new(data.iter().map(|v| v / 2).collect(), 6, 5, 1).unwrap();
        let plan = SsimPlan::new(a.view(), b.view(), &SsimParams::default()).unwrap();
        assert_eq!(plan.win(), 5);
        assert_eq!(plan.placements(), (2, 1));

        let sums = plan.tables(0).unwrap().window_sums(1, 0, 5);
        let mut direct = [0.0f64; 5];
        for y in 0..5 {
            for x in 1..6 {
                let va = a.view().get(x, y, 0).unwrap() as f64;
                let vb = b.view().get(x, y, 0).unwrap() as f64;
                direct[0] += va;
                direct[1] += vb;
                direct[2] += va * va;
                direct[3] += vb * vb;
                direct[4] += va * vb;
            }
        }
        assert_eq!(sums, direct);
    }
}
