use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use winssim::{crop, validate, ImageView, OwnedImage, Region, WinSsimError};

fn noise(width: usize, height: usize, channels: usize, seed: u64) -> OwnedImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..width * height * channels)
        .map(|_| rng.random_range(0..=255u8))
        .collect();
    OwnedImage::new(data, width, height, channels).unwrap()
}

#[test]
fn image_view_rejects_bad_layouts() {
    let data = vec![0u8; 12];
    assert!(matches!(
        ImageView::from_slice(&data, 0, 4, 3),
        Err(WinSsimError::InvalidDimensions { .. })
    ));
    assert!(matches!(
        ImageView::new(&data, 2, 2, 3, 4),
        Err(WinSsimError::InvalidStride { .. })
    ));
    assert!(matches!(
        ImageView::from_slice(&data, 3, 3, 3),
        Err(WinSsimError::BufferTooSmall { .. })
    ));
    assert!(ImageView::from_slice(&data, 2, 2, 3).is_ok());
}

#[test]
fn crop_shape_matches_region_for_random_regions() {
    let frame = noise(64, 48, 3, 7);
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..200 {
        let x1 = rng.random_range(0..63u32);
        let y1 = rng.random_range(0..47u32);
        let x2 = rng.random_range(x1 + 1..=64);
        let y2 = rng.random_range(y1 + 1..=48);
        let region = Region::new(x1, y1, x2, y2);
        assert!(validate(region));

        let view = crop(frame.view(), region).unwrap();
        assert_eq!(
            (view.width(), view.height()),
            ((x2 - x1) as usize, (y2 - y1) as usize)
        );
        assert_eq!(
            view.get(0, 0, 2),
            frame.view().get(x1 as usize, y1 as usize, 2)
        );
    }
}

#[test]
fn crop_rejects_empty_and_out_of_bounds_regions() {
    let frame = noise(20, 10, 3, 1);
    let empty = Region::new(5, 5, 5, 8);
    assert_eq!(
        crop(frame.view(), empty).unwrap_err(),
        WinSsimError::ShapeError { region: empty }
    );

    let outside = Region::new(10, 0, 21, 5);
    assert_eq!(
        crop(frame.view(), outside).unwrap_err(),
        WinSsimError::RegionOutOfBounds {
            region: outside,
            width: 20,
            height: 10,
        }
    );
}

#[test]
fn nested_crops_are_zero_copy() {
    let frame = noise(32, 32, 1, 3);
    let outer = crop(frame.view(), Region::new(4, 4, 28, 28)).unwrap();
    let inner = crop(outer, Region::new(2, 3, 6, 9)).unwrap();
    assert_eq!(inner.stride(), frame.view().stride());
    for y in 0..inner.height() {
        for x in 0..inner.width() {
            assert_eq!(inner.get(x, y, 0), frame.view().get(x + 6, y + 7, 0));
        }
    }
    assert_eq!(inner.to_owned_image().shape(), (4, 6, 1));
}
