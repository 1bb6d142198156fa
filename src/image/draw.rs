//! Bounding-box overlay for full-scale evidence images.

use crate::image::OwnedImage;
use crate::region::Region;

/// Draws the outline of `region` onto `img` in place.
///
/// The stroke is `line_width` pixels thick and centred on the region edge;
/// parts falling outside the image are clipped. The width is clamped to the
/// image's longer side. Colours are given as RGB; single-channel images
/// receive the luma of the colour.
pub fn draw_bbox(img: &mut OwnedImage, region: Region, rgb: [u8; 3], line_width: u32) {
    let width = img.width() as i64;
    let height = img.height() as i64;
    let line_width = (line_width.max(1) as i64).min(width.max(height).max(1));
    let channels = img.channels();
    let sample = pixel_for(rgb, channels);

    let half = line_width / 2;
    let (x1, y1, x2, y2) = (
        region.x1 as i64,
        region.y1 as i64,
        region.x2 as i64,
        region.y2 as i64,
    );
    let data = img.data_mut();
    let mut put = |x: i64, y: i64| {
        if x < 0 || y < 0 || x >= width || y >= height {
            return;
        }
        let idx = (y as usize * width as usize + x as usize) * channels;
        data[idx..idx + channels].copy_from_slice(&sample[..channels]);
    };

    for t in 0..line_width {
        let off = t - half;
        let (left, right) = (x1 + off, x2 + off);
        let (top, bottom) = (y1 + off, y2 + off);
        let xs = (x1 - half).max(0)..=(x2 + line_width - 1 - half).min(width - 1);
        for x in xs {
            put(x, top);
            put(x, bottom);
        }
        let ys = (y1 - half).max(0)..=(y2 + line_width - 1 - half).min(height - 1);
        for y in ys {
            put(left, y);
            put(right, y);
        }
    }
}

fn pixel_for(rgb: [u8; 3], channels: usize) -> [u8; 4] {
    match channels {
        1 | 2 => {
            let luma = (0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32)
                .round()
                .clamp(0.0, 255.0) as u8;
            [luma, 255, 0, 0]
        }
        _ => [rgb[0], rgb[1], rgb[2], 255],
    }
}
