//! Capture-compare pipeline.
//!
//! Crops the live frame by a pair's image region and the current pattern by
//! its pattern region, checks that both crops have the same shape, and scores
//! them with the structural-similarity kernel. Comparing has no side effects;
//! recording results belongs to [`crate::run::Aggregator`].

use crate::image::{ImageView, OwnedImage};
use crate::kernel::{structural_similarity, SsimParams};
use crate::library::PatternId;
use crate::region::{crop, Region, RegionPair};
use crate::trace::{trace_event, trace_span};
use crate::util::{WinSsimError, WinSsimResult};
use std::path::PathBuf;

/// A reference image with its library identity.
#[derive(Clone, Debug)]
pub struct Pattern {
    pub id: PatternId,
    pub image: OwnedImage,
    /// File the image was loaded from, if any.
    pub path: Option<PathBuf>,
}

impl Pattern {
    pub fn new(id: PatternId, image: OwnedImage) -> Self {
        Self {
            id,
            image,
            path: None,
        }
    }
}

/// Result of comparing one region pair of one capture against one pattern.
#[derive(Clone, Debug)]
pub struct Comparison {
    pub pattern_id: PatternId,
    pub region_id: usize,
    pub image_region: Region,
    pub pattern_region: Region,
    pub image_crop: OwnedImage,
    pub pattern_crop: OwnedImage,
    /// Structural similarity in `[-1, 1]`, 1 for identical crops.
    pub score: f64,
    /// Mean score of the owning run including this comparison. Equal to
    /// `score` until the aggregator records the comparison.
    pub running_average: f64,
}

/// Comparator configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompareConfig {
    pub ssim: SsimParams,
    /// Score rows in parallel (requires the `rayon` feature).
    pub parallel: bool,
}

/// Stateless capture-compare pipeline.
#[derive(Clone, Debug, Default)]
pub struct Comparator {
    cfg: CompareConfig,
}

impl Comparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, cfg: CompareConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn config(&self) -> &CompareConfig {
        &self.cfg
    }

    /// Compares `frame` against `pattern` for one region pair.
    ///
    /// Fails with [`WinSsimError::NoPatternSelected`] when `pattern` is
    /// `None` and with [`WinSsimError::ShapeMismatch`] when the crops differ
    /// in size or channel count.
    pub fn compare(
        &self,
        frame: ImageView<'_>,
        pattern: Option<&Pattern>,
        region_id: usize,
        pair: RegionPair,
    ) -> WinSsimResult<Comparison> {
        let _span = trace_span!("compare", region = region_id).entered();
        let pattern = pattern.ok_or(WinSsimError::NoPatternSelected)?;

        let image_crop = crop(frame, pair.image_region)?;
        let pattern_crop = crop(pattern.image.view(), pair.pattern_region)?;
        let score = self.score_crops(image_crop, pattern_crop)?;

        trace_event!(
            "score_computed",
            pattern = pattern.id.as_u32(),
            region = region_id,
            score = score
        );

        Ok(Comparison {
            pattern_id: pattern.id,
            region_id,
            image_region: pair.image_region,
            pattern_region: pair.pattern_region,
            image_crop: image_crop.to_owned_image(),
            pattern_crop: pattern_crop.to_owned_image(),
            score,
            running_average: score,
        })
    }

    /// Scores two already cropped views.
    pub fn score_crops(&self, a: ImageView<'_>, b: ImageView<'_>) -> WinSsimResult<f64> {
        let score = structural_similarity(a, b, &self.cfg.ssim, self.cfg.parallel)?;
        Ok(score.clamp(-1.0, 1.0))
    }
}
