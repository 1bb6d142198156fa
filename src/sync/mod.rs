//! Multi-region synchronizer.
//!
//! Owns the working [`RegionSet`] of the active setup context. Edits are
//! staged on the working set; [`RegionSynchronizer::commit`] mirrors image
//! regions into pattern regions while sync is enabled, so a set saved with
//! sync enabled never holds mismatched pairs.

use crate::compare::{Comparator, Comparison, Pattern};
use crate::config::ConfigStore;
use crate::image::ImageView;
use crate::region::{validate, Region, RegionPair, RegionSet, SyncMode, MAX_REGIONS};
use crate::trace::{trace_event, trace_span};
use crate::util::{WinSsimError, WinSsimResult};
use std::collections::BTreeMap;

/// Editable region set with sync semantics and probe scores.
#[derive(Clone, Debug)]
pub struct RegionSynchronizer {
    working: RegionSet,
    remembered: BTreeMap<usize, RegionPair>,
    scores: BTreeMap<usize, f64>,
}

impl RegionSynchronizer {
    /// Starts editing `set`. Its pairs become the values restored when the
    /// region count grows again.
    pub fn new(set: RegionSet) -> Self {
        Self {
            remembered: set.pairs().clone(),
            working: set,
            scores: BTreeMap::new(),
        }
    }

    /// Loads the persisted region set from `store`.
    pub fn load(store: &dyn ConfigStore) -> WinSsimResult<Self> {
        Ok(Self::new(store.load_region_set()?))
    }

    /// The working set, including uncommitted edits.
    pub fn region_set(&self) -> &RegionSet {
        &self.working
    }

    pub fn sync(&self) -> SyncMode {
        self.working.sync()
    }

    /// Switches sync mode.
    ///
    /// Disabling keeps the current (mirrored) values as the independent
    /// baseline. Enabling mirrors every pair immediately.
    pub fn set_sync(&mut self, sync: SyncMode) {
        if self.working.sync() == sync {
            return;
        }
        self.working.set_sync(sync);
        if sync.is_enabled() {
            self.commit();
        }
    }

    /// Stages a new image region for pair `id`.
    pub fn set_image_region(&mut self, id: usize, region: Region) -> WinSsimResult<()> {
        if !validate(region) {
            return Err(WinSsimError::InvalidRegion { region });
        }
        self.working.pair_mut(id)?.image_region = region;
        self.scores.remove(&id);
        Ok(())
    }

    /// Sets the pattern region of pair `id`. Only allowed with sync disabled.
    pub fn set_pattern_region(&mut self, id: usize, region: Region) -> WinSsimResult<()> {
        if self.working.sync().is_enabled() {
            return Err(WinSsimError::Config {
                reason: "pattern regions follow image regions while sync is enabled".to_string(),
            });
        }
        if !validate(region) {
            return Err(WinSsimError::InvalidRegion { region });
        }
        self.working.pair_mut(id)?.pattern_region = region;
        self.scores.remove(&id);
        Ok(())
    }

    /// Applies staged edits: with sync enabled every pattern region becomes a
    /// copy of its image region.
    pub fn commit(&mut self) {
        let _span = trace_span!("sync_commit", regions = self.working.len()).entered();
        if self.working.sync().is_enabled() {
            let ids: Vec<usize> = self.working.pairs().keys().copied().collect();
            for id in ids {
                if let Ok(pair) = self.working.pair_mut(id) {
                    pair.pattern_region = pair.image_region;
                }
            }
        }
        for (id, pair) in self.working.iter() {
            self.remembered.insert(id, pair);
        }
    }

    /// Resizes the set to `n` pairs (`n <= 1` gives single mode).
    ///
    /// Trailing pairs are discarded but remembered; new ids get their
    /// remembered values or [`Region::default_for`]. Fails with
    /// [`WinSsimError::TooManyRegions`] above [`MAX_REGIONS`], leaving the
    /// set unchanged.
    pub fn set_region_count(&mut self, n: usize) -> WinSsimResult<()> {
        if n > MAX_REGIONS {
            return Err(WinSsimError::TooManyRegions {
                requested: n,
                max: MAX_REGIONS,
            });
        }
        let n = n.max(1);
        for (id, pair) in self.working.iter() {
            self.remembered.insert(id, pair);
        }
        let mut pairs = BTreeMap::new();
        for id in 1..=n {
            let pair = match self.working.get(id) {
                Ok(pair) => pair,
                Err(_) => self
                    .remembered
                    .get(&id)
                    .copied()
                    .unwrap_or_else(|| RegionPair::mirrored(Region::default_for(id))),
            };
            pairs.insert(id, pair);
        }
        self.working.replace_pairs(pairs);
        self.scores.retain(|id, _| *id <= n);
        if self.working.sync().is_enabled() {
            self.commit();
        }
        trace_event!("region_count_changed", regions = n);
        Ok(())
    }

    /// Scores one pair against `pattern` without touching any run.
    ///
    /// Uses the committed view of the pair: with sync enabled the pattern
    /// region is the staged image region.
    pub fn test_region(
        &mut self,
        id: usize,
        frame: ImageView<'_>,
        pattern: Option<&Pattern>,
        comparator: &Comparator,
    ) -> WinSsimResult<Comparison> {
        let mut pair = self.working.get(id)?;
        if self.working.sync().is_enabled() {
            pair.pattern_region = pair.image_region;
        }
        let comparison = comparator.compare(frame, pattern, id, pair)?;
        self.scores.insert(id, comparison.score);
        Ok(comparison)
    }

    /// Last probe score of pair `id`.
    pub fn score(&self, id: usize) -> Option<f64> {
        self.scores.get(&id).copied()
    }

    /// Commits and persists the whole set in one store write.
    pub fn save(&mut self, store: &dyn ConfigStore) -> WinSsimResult<()> {
        self.commit();
        store.save_region_set(&self.working)?;
        trace_event!("region_set_saved", regions = self.working.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigStore;
    use crate::region::RegionMode;

    #[test]
    fn edits_mirror_only_on_commit() {
        let mut sync = RegionSynchronizer::new(RegionSet::default());
        sync.set_image_region(1, Region::new(0, 0, 20, 30)).unwrap();
        assert_eq!(
            sync.region_set().get(1).unwrap().pattern_region,
            Region::new(10, 10, 100, 100)
        );
        sync.commit();
        assert!(sync.region_set().is_mirrored());
    }

    #[test]
    fn disabling_sync_freezes_values() {
        let mut sync = RegionSynchronizer::new(RegionSet::default());
        sync.set_sync(SyncMode::Disabled);
        sync.set_image_region(1, Region::new(0, 0, 20, 20)).unwrap();
        sync.commit();
        let pair = sync.region_set().get(1).unwrap();
        assert_eq!(pair.pattern_region, Region::new(10, 10, 100, 100));
        assert_eq!(pair.image_region, Region::new(0, 0, 20, 20));
    }

    #[test]
    fn pattern_region_is_locked_while_synced() {
        let mut sync = RegionSynchronizer::new(RegionSet::default());
        assert!(sync.set_pattern_region(1, Region::new(0, 0, 5, 5)).is_err());
        assert_eq!(
            sync.set_image_region(1, Region::new(5, 5, 5, 9)),
            Err(WinSsimError::InvalidRegion {
                region: Region::new(5, 5, 5, 9)
            })
        );
    }

    #[test]
    fn shrinking_then_growing_restores_values() {
        let mut sync = RegionSynchronizer::new(RegionSet::default());
        sync.set_region_count(3).unwrap();
        assert_eq!(sync.region_set().mode(), RegionMode::Multiple);
        assert_eq!(
            sync.region_set().get(3).unwrap().image_region,
            Region::default_for(3)
        );
        sync.set_image_region(3, Region::new(1, 1, 9, 9)).unwrap();
        sync.set_region_count(1).unwrap();
        assert_eq!(sync.region_set().mode(), RegionMode::Single);
        sync.set_region_count(3).unwrap();
        assert_eq!(
            sync.region_set().get(3).unwrap().image_region,
            Region::new(1, 1, 9, 9)
        );
    }

    #[test]
    fn region_count_is_capped() {
        let mut sync = RegionSynchronizer::new(RegionSet::default());
        assert_eq!(
            sync.set_region_count(usize::MAX),
            Err(WinSsimError::TooManyRegions {
                requested: usize::MAX,
                max: MAX_REGIONS,
            })
        );
        assert_eq!(sync.region_set().len(), 1);
        sync.set_region_count(MAX_REGIONS).unwrap();
        assert_eq!(sync.region_set().len(), MAX_REGIONS);
    }

    #[test]
    fn save_commits_before_persisting() {
        let store = MemoryConfigStore::default();
        let mut sync = RegionSynchronizer::load(&store).unwrap();
        sync.set_image_region(1, Region::new(2, 2, 12, 12)).unwrap();
        sync.save(&store).unwrap();
        let stored = store.load_region_set().unwrap();
        assert_eq!(stored.get(1).unwrap(), RegionPair::mirrored(Region::new(2, 2, 12, 12)));
    }
}
