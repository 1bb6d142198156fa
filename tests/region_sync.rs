use winssim::{
    Comparator, ConfigStore, JsonConfigStore, MemoryConfigStore, OwnedImage, Pattern, PatternId,
    Region, RegionMode, RegionPair, RegionSet, RegionSynchronizer, SyncMode, WinSsimError,
};

fn three_synced() -> RegionSet {
    RegionSet::from_pairs(
        (1..=3)
            .map(|id| RegionPair::mirrored(Region::default_for(id)))
            .collect(),
        SyncMode::Enabled,
    )
    .unwrap()
}

fn textured(width: usize, height: usize) -> OwnedImage {
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let v = ((x * 29) ^ (y * 11)) as u8;
            data.extend_from_slice(&[v, v / 2, 255 - v]);
        }
    }
    OwnedImage::new(data, width, height, 3).unwrap()
}

#[test]
fn committing_in_sync_mode_mirrors_only_the_edited_pair() {
    let mut sync = RegionSynchronizer::new(three_synced());
    assert_eq!(sync.region_set().mode(), RegionMode::Multiple);

    sync.set_image_region(2, Region::new(10, 10, 50, 50)).unwrap();
    sync.commit();

    let set = sync.region_set();
    assert_eq!(set.get(2).unwrap().pattern_region, Region::new(10, 10, 50, 50));
    assert_eq!(set.get(1).unwrap(), RegionPair::mirrored(Region::default_for(1)));
    assert_eq!(set.get(3).unwrap(), RegionPair::mirrored(Region::default_for(3)));
}

#[test]
fn independent_mode_keeps_pattern_regions() {
    let mut sync = RegionSynchronizer::new(three_synced());
    sync.set_sync(SyncMode::Disabled);
    sync.set_pattern_region(1, Region::new(0, 0, 100, 100)).unwrap();
    sync.set_image_region(1, Region::new(5, 5, 105, 105)).unwrap();
    sync.commit();
    let pair = sync.region_set().get(1).unwrap();
    assert_eq!(pair.pattern_region, Region::new(0, 0, 100, 100));
    assert_eq!(pair.image_region, Region::new(5, 5, 105, 105));

    sync.set_sync(SyncMode::Enabled);
    assert!(sync.region_set().is_mirrored());
}

#[test]
fn unknown_region_ids_are_rejected() {
    let mut sync = RegionSynchronizer::new(three_synced());
    assert_eq!(
        sync.set_image_region(4, Region::new(0, 0, 1, 1)),
        Err(WinSsimError::UnknownRegion { id: 4 })
    );
}

#[test]
fn test_region_scores_without_touching_the_set() {
    let frame = textured(200, 200);
    let pattern = Pattern::new(PatternId::new(1), frame.clone());
    let mut sync = RegionSynchronizer::new(three_synced());
    let before = sync.region_set().clone();

    let cmp = sync
        .test_region(2, frame.view(), Some(&pattern), &Comparator::new())
        .unwrap();
    assert_eq!(cmp.score, 1.0);
    assert_eq!(sync.score(2), Some(1.0));
    assert_eq!(sync.score(1), None);
    assert_eq!(sync.region_set(), &before);

    let err = sync
        .test_region(1, frame.view(), None, &Comparator::new())
        .unwrap_err();
    assert_eq!(err, WinSsimError::NoPatternSelected);
}

#[test]
fn saved_set_round_trips_through_json_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonConfigStore::new(dir.path().join("settings.json"));
    let mut sync = RegionSynchronizer::load(&store).unwrap();
    sync.set_region_count(3).unwrap();
    sync.set_image_region(2, Region::new(10, 10, 50, 50)).unwrap();
    sync.save(&store).unwrap();

    let loaded = store.load_region_set().unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.mode(), RegionMode::Multiple);
    assert!(loaded.is_mirrored());
    assert_eq!(
        loaded.get(2).unwrap(),
        RegionPair::mirrored(Region::new(10, 10, 50, 50))
    );

    let mut reloaded = RegionSynchronizer::load(&store).unwrap();
    reloaded.set_region_count(1).unwrap();
    reloaded.set_region_count(2).unwrap();
    assert_eq!(
        reloaded.region_set().get(2).unwrap().image_region,
        Region::new(10, 10, 50, 50)
    );
}

#[test]
fn memory_store_sees_one_atomic_replace() {
    let store = MemoryConfigStore::default();
    let mut sync = RegionSynchronizer::new(three_synced());
    sync.save(&store).unwrap();
    assert_eq!(store.load_region_set().unwrap(), three_synced());
}
