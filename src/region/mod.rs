//! Comparison regions and region sets.
//!
//! A [`Region`] is a half-open pixel rectangle `[x1, x2) x [y1, y2)`. A
//! [`RegionPair`] couples the crop taken from the live capture with the crop
//! taken from the reference pattern; both must produce equally sized images
//! for a comparison to be valid. A [`RegionSet`] indexes pairs by id
//! (`1..=N`) and carries the single/multiple mode and the sync flag.

use crate::image::ImageView;
use crate::util::{WinSsimError, WinSsimResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Side length of regions created by [`Region::default_for`].
pub const DEFAULT_REGION_SIZE: u32 = 100;

/// Upper bound on the number of pairs in a [`RegionSet`].
pub const MAX_REGIONS: usize = 64;

/// Rectangular pixel area, `x1 < x2` and `y1 < y2` when valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Region {
    pub const fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Default placement for region `id`: offset `10 * id`, 100x100 pixels.
    ///
    /// Coordinates saturate at `u32::MAX`, so absurd ids yield a degenerate
    /// (invalid) region rather than overflowing.
    pub fn default_for(id: usize) -> Self {
        let id = u32::try_from(id).unwrap_or(u32::MAX);
        let offset = id.saturating_mul(10);
        Self::new(
            offset,
            offset,
            offset.saturating_add(DEFAULT_REGION_SIZE),
            offset.saturating_add(DEFAULT_REGION_SIZE),
        )
    }

    /// Width in pixels, 0 for degenerate regions.
    pub fn width(&self) -> usize {
        self.x2.saturating_sub(self.x1) as usize
    }

    /// Height in pixels, 0 for degenerate regions.
    pub fn height(&self) -> usize {
        self.y2.saturating_sub(self.y1) as usize
    }

    pub fn is_valid(&self) -> bool {
        validate(*self)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})-({},{})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Returns true iff `x1 < x2` and `y1 < y2`. Frame bounds are not checked.
pub fn validate(region: Region) -> bool {
    region.x1 < region.x2 && region.y1 < region.y2
}

/// Returns the zero-copy sub-image `frame[y1:y2, x1:x2]`.
///
/// Fails with [`WinSsimError::ShapeError`] when the crop would be empty and
/// with [`WinSsimError::RegionOutOfBounds`] when the region does not lie
/// entirely inside the frame. Out-of-bounds regions are rejected, never
/// clamped.
pub fn crop<'a>(frame: ImageView<'a>, region: Region) -> WinSsimResult<ImageView<'a>> {
    if !validate(region) {
        return Err(WinSsimError::ShapeError { region });
    }
    if region.x2 as usize > frame.width() || region.y2 as usize > frame.height() {
        return Err(WinSsimError::RegionOutOfBounds {
            region,
            width: frame.width(),
            height: frame.height(),
        });
    }
    frame.roi(
        region.x1 as usize,
        region.y1 as usize,
        region.width(),
        region.height(),
    )
}

/// The two crops compared against each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPair {
    pub image_region: Region,
    pub pattern_region: Region,
}

impl RegionPair {
    pub const fn new(image_region: Region, pattern_region: Region) -> Self {
        Self {
            image_region,
            pattern_region,
        }
    }

    /// Pair whose pattern region mirrors the image region.
    pub const fn mirrored(region: Region) -> Self {
        Self::new(region, region)
    }

    pub fn is_mirrored(&self) -> bool {
        self.image_region == self.pattern_region
    }
}

/// Single or multiple region layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMode {
    #[default]
    Single,
    Multiple,
}

/// Whether pattern regions mirror image regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Enabled,
    Disabled,
}

impl SyncMode {
    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }
}

/// Ordered `id -> RegionPair` mapping with its mode and sync flag.
///
/// `Single` holds exactly one pair under id 1; `Multiple` holds ids `1..=N`
/// with `N > 1`. Deserialization checks both invariants once, so stored
/// region sets are typed values from the moment they are loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RegionSetRepr", into = "RegionSetRepr")]
pub struct RegionSet {
    mode: RegionMode,
    sync: SyncMode,
    pairs: BTreeMap<usize, RegionPair>,
}

impl RegionSet {
    /// Creates a single-region set. With sync enabled the pattern region is
    /// replaced by the image region.
    pub fn single(pair: RegionPair, sync: SyncMode) -> Self {
        let mut pairs = BTreeMap::new();
        pairs.insert(1, pair);
        let mut set = Self {
            mode: RegionMode::Single,
            sync,
            pairs,
        };
        set.mirror_if_synced();
        set
    }

    /// Creates a set from pairs numbered `1..=pairs.len()`.
    ///
    /// One pair yields `Single` mode, more yield `Multiple`. Every region
    /// must be valid; with sync enabled pattern regions are mirrored.
    pub fn from_pairs(pairs: Vec<RegionPair>, sync: SyncMode) -> WinSsimResult<Self> {
        if pairs.is_empty() {
            return Err(WinSsimError::UnknownRegion { id: 1 });
        }
        let mode = if pairs.len() == 1 {
            RegionMode::Single
        } else {
            RegionMode::Multiple
        };
        let pairs = pairs
            .into_iter()
            .enumerate()
            .map(|(idx, pair)| (idx + 1, pair))
            .collect();
        let mut set = Self { mode, sync, pairs };
        set.mirror_if_synced();
        set.check()?;
        Ok(set)
    }

    pub fn mode(&self) -> RegionMode {
        self.mode
    }

    pub fn sync(&self) -> SyncMode {
        self.sync
    }

    /// Number of region pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns the pair registered under `id`.
    pub fn get(&self, id: usize) -> WinSsimResult<RegionPair> {
        self.pairs
            .get(&id)
            .copied()
            .ok_or(WinSsimError::UnknownRegion { id })
    }

    /// Iterates pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, RegionPair)> + '_ {
        self.pairs.iter().map(|(id, pair)| (*id, *pair))
    }

    /// Returns true when every pattern region equals its image region.
    pub fn is_mirrored(&self) -> bool {
        self.pairs.values().all(RegionPair::is_mirrored)
    }

    pub(crate) fn set_sync(&mut self, sync: SyncMode) {
        self.sync = sync;
    }

    pub(crate) fn pair_mut(&mut self, id: usize) -> WinSsimResult<&mut RegionPair> {
        self.pairs
            .get_mut(&id)
            .ok_or(WinSsimError::UnknownRegion { id })
    }

    pub(crate) fn replace_pairs(&mut self, pairs: BTreeMap<usize, RegionPair>) {
        self.mode = if pairs.len() <= 1 {
            RegionMode::Single
        } else {
            RegionMode::Multiple
        };
        self.pairs = pairs;
    }

    pub(crate) fn pairs(&self) -> &BTreeMap<usize, RegionPair> {
        &self.pairs
    }

    /// Copies image regions into pattern regions while sync is enabled.
    pub(crate) fn mirror_if_synced(&mut self) {
        if self.sync.is_enabled() {
            for pair in self.pairs.values_mut() {
                pair.pattern_region = pair.image_region;
            }
        }
    }

    fn check(&self) -> WinSsimResult<()> {
        let expected_ids = 1..=self.pairs.len();
        if !self.pairs.keys().copied().eq(expected_ids) {
            let id = self
                .pairs
                .keys()
                .copied()
                .zip(1..)
                .find(|(id, expected)| id != expected)
                .map(|(id, _)| id)
                .unwrap_or(0);
            return Err(WinSsimError::UnknownRegion { id });
        }
        let count_ok = match self.mode {
            RegionMode::Single => self.pairs.len() == 1,
            RegionMode::Multiple => self.pairs.len() > 1,
        };
        if !count_ok {
            return Err(WinSsimError::Config {
                reason: format!(
                    "{:?} mode cannot hold {} region pairs",
                    self.mode,
                    self.pairs.len()
                ),
            });
        }
        if self.pairs.len() > MAX_REGIONS {
            return Err(WinSsimError::TooManyRegions {
                requested: self.pairs.len(),
                max: MAX_REGIONS,
            });
        }
        for pair in self.pairs.values() {
            for region in [pair.image_region, pair.pattern_region] {
                if !validate(region) {
                    return Err(WinSsimError::InvalidRegion { region });
                }
            }
        }
        Ok(())
    }
}

impl Default for RegionSet {
    fn default() -> Self {
        Self::single(
            RegionPair::mirrored(Region::new(10, 10, 100, 100)),
            SyncMode::Enabled,
        )
    }
}

#[derive(Serialize, Deserialize)]
struct RegionSetRepr {
    mode: RegionMode,
    sync: SyncMode,
    pairs: BTreeMap<usize, RegionPair>,
}

impl TryFrom<RegionSetRepr> for RegionSet {
    type Error = WinSsimError;

    fn try_from(repr: RegionSetRepr) -> WinSsimResult<Self> {
        let mut set = Self {
            mode: repr.mode,
            sync: repr.sync,
            pairs: repr.pairs,
        };
        set.mirror_if_synced();
        set.check()?;
        Ok(set)
    }
}

impl From<RegionSet> for RegionSetRepr {
    fn from(set: RegionSet) -> Self {
        Self {
            mode: set.mode,
            sync: set.sync,
            pairs: set.pairs,
        }
    }
}
