use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use winssim::lowlevel::{Kernel, SsimPlan, SsimScalar};
use winssim::{structural_similarity, ImageView, OwnedImage, SsimParams, WinSsimError};

fn noise(width: usize, height: usize, channels: usize, seed: u64) -> OwnedImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..width * height * channels)
        .map(|_| rng.random_range(0..=255u8))
        .collect();
    OwnedImage::new(data, width, height, channels).unwrap()
}

/// Direct per-window evaluation without summed-area tables.
fn brute_force_ssim(a: ImageView<'_>, b: ImageView<'_>, win: usize) -> f64 {
    let params = SsimParams::default();
    let c1 = (params.k1 * params.data_range).powi(2);
    let c2 = (params.k2 * params.data_range).powi(2);
    let np = (win * win) as f64;
    let norm = np / (np - 1.0);

    let mut channel_total = 0.0f64;
    for c in 0..a.channels() {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for y in 0..=a.height() - win {
            for x in 0..=a.width() - win {
                let mut pa = Vec::with_capacity(win * win);
                let mut pb = Vec::with_capacity(win * win);
                for dy in 0..win {
                    for dx in 0..win {
                        pa.push(a.get(x + dx, y + dy, c).unwrap() as f64);
                        pb.push(b.get(x + dx, y + dy, c).unwrap() as f64);
                    }
                }
                let ua = pa.iter().sum::<f64>() / np;
                let ub = pb.iter().sum::<f64>() / np;
                let va = pa.iter().map(|v| (v - ua).powi(2)).sum::<f64>() / np * norm;
                let vb = pb.iter().map(|v| (v - ub).powi(2)).sum::<f64>() / np * norm;
                let vab = pa
                    .iter()
                    .zip(&pb)
                    .map(|(p, q)| (p - ua) * (q - ub))
                    .sum::<f64>()
                    / np
                    * norm;
                let s = ((2.0 * ua * ub + c1) * (2.0 * vab + c2))
                    / ((ua * ua + ub * ub + c1) * (va + vb + c2));
                sum += s;
                count += 1;
            }
        }
        channel_total += sum / count as f64;
    }
    channel_total / a.channels() as f64
}

#[test]
fn matches_brute_force_on_noise() {
    let a = noise(23, 17, 3, 11);
    let b = noise(23, 17, 3, 12);
    let fast = structural_similarity(a.view(), b.view(), &SsimParams::default(), false).unwrap();
    let slow = brute_force_ssim(a.view(), b.view(), 7);
    assert!((fast - slow).abs() < 1e-9, "fast={fast} slow={slow}");
}

#[test]
fn matches_brute_force_on_correlated_crops() {
    let a = noise(30, 20, 3, 5);
    let b = OwnedImage::new(
        a.data().iter().map(|v| v.saturating_add(20) / 2 + 30).collect(),
        30,
        20,
        3,
    )
    .unwrap();
    let fast = structural_similarity(a.view(), b.view(), &SsimParams::default(), false).unwrap();
    let slow = brute_force_ssim(a.view(), b.view(), 7);
    assert!((fast - slow).abs() < 1e-9);
    assert!(fast > 0.2 && fast < 1.0);
}

#[test]
fn identical_crops_score_one_and_inverted_score_negative() {
    let a = noise(40, 40, 3, 21);
    let same = structural_similarity(a.view(), a.view(), &SsimParams::default(), false).unwrap();
    assert_eq!(same, 1.0);

    let inverted = OwnedImage::new(a.data().iter().map(|v| 255 - v).collect(), 40, 40, 3).unwrap();
    let score =
        structural_similarity(a.view(), inverted.view(), &SsimParams::default(), false).unwrap();
    assert!(score < 0.0);
    assert!(score >= -1.0);
}

#[test]
fn small_crops_shrink_the_window() {
    let a = noise(5, 9, 1, 3);
    let b = noise(5, 9, 1, 4);
    let plan = SsimPlan::new(a.view(), b.view(), &SsimParams::default()).unwrap();
    assert_eq!(plan.win(), 5);
    assert_eq!(plan.placements(), (1, 5));
    let fast = <SsimScalar as Kernel>::mean_ssim(&plan);
    assert!((fast - brute_force_ssim(a.view(), b.view(), 5)).abs() < 1e-9);
}

#[test]
fn shape_mismatch_is_reported() {
    let a = noise(8, 8, 3, 1);
    let b = noise(8, 9, 3, 1);
    assert_eq!(
        structural_similarity(a.view(), b.view(), &SsimParams::default(), false).unwrap_err(),
        WinSsimError::ShapeMismatch {
            image: (8, 8, 3),
            pattern: (8, 9, 3),
        }
    );
}
