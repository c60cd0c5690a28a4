//! Aspect-preserving scale-down rules.

use image::imageops::FilterType;
use image::DynamicImage;

use super::types::ScalePolicy;

/// Largest size that fits the given limits without upscaling.
/// `None` leaves that dimension unconstrained.
pub fn fit_within(width: u32, height: u32, max_width: Option<u32>, max_height: Option<u32>) -> (u32, u32) {
    let mut ratio = 1.0f64;
    if let Some(max_w) = max_width {
        if width > max_w {
            ratio = ratio.min(max_w as f64 / width as f64);
        }
    }
    if let Some(max_h) = max_height {
        if height > max_h {
            ratio = ratio.min(max_h as f64 / height as f64);
        }
    }
    if ratio >= 1.0 {
        return (width, height);
    }

    let mut new_width = ((width as f64 * ratio).round() as u32).max(1);
    let mut new_height = ((height as f64 * ratio).round() as u32).max(1);
    if let Some(max_w) = max_width {
        new_width = new_width.min(max_w.max(1));
    }
    if let Some(max_h) = max_height {
        new_height = new_height.min(max_h.max(1));
    }
    (new_width, new_height)
}

/// Target size of the document variant.
pub fn document_dimensions(width: u32, height: u32, max: u32, policy: ScalePolicy) -> (u32, u32) {
    match policy {
        ScalePolicy::BoundingBox => fit_within(width, height, Some(max), Some(max)),
        ScalePolicy::LongEdge => {
            if width > height {
                fit_within(width, height, None, Some(max))
            } else {
                fit_within(width, height, Some(max), None)
            }
        }
    }
}

/// Target size of the thumbnail: the long edge never exceeds `max`.
pub fn thumbnail_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    fit_within(width, height, Some(max), Some(max))
}

/// Resize to the given size, returning the input untouched if nothing changes.
pub fn scale_to(image: &DynamicImage, (width, height): (u32, u32)) -> DynamicImage {
    if image.width() == width && image.height() == height {
        return image.clone();
    }
    image.resize_exact(width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aspect(w: u32, h: u32) -> f64 {
        w as f64 / h as f64
    }

    #[test]
    fn test_never_scales_up() {
        assert_eq!(fit_within(640, 480, Some(1920), Some(1920)), (640, 480));
        assert_eq!(thumbnail_dimensions(64, 20, 128), (64, 20));
    }

    #[test]
    fn test_bounding_box_constrains_both_dimensions() {
        assert_eq!(document_dimensions(4000, 3000, 1920, ScalePolicy::BoundingBox), (1920, 1440));
        assert_eq!(document_dimensions(3000, 4000, 1920, ScalePolicy::BoundingBox), (1440, 1920));
        assert_eq!(document_dimensions(2480, 3508, 1920, ScalePolicy::BoundingBox), (1357, 1920));
    }

    #[test]
    fn test_long_edge_policy_follows_orientation_rule() {
        // Landscape: the height is constrained.
        assert_eq!(document_dimensions(4000, 2500, 1920, ScalePolicy::LongEdge), (3072, 1920));
        // Portrait: the width is constrained.
        assert_eq!(document_dimensions(2500, 4000, 1920, ScalePolicy::LongEdge), (1920, 3072));
    }

    #[test]
    fn test_thumbnail_long_edge_and_aspect() {
        for (w, h) in [(4000, 3000), (3000, 4000), (1000, 1000), (5000, 300), (129, 64), (2480, 3508)] {
            let (tw, th) = thumbnail_dimensions(w, h, 128);
            assert!(tw.max(th) <= 128, "{}x{} -> {}x{}", w, h, tw, th);
            // One pixel of rounding on the short edge.
            let tolerance = 1.0 / tw.min(th) as f64 + 0.01;
            assert!(
                (aspect(tw, th) - aspect(w, h)).abs() / aspect(w, h) <= tolerance,
                "{}x{} -> {}x{}",
                w,
                h,
                tw,
                th
            );
        }
    }

    #[test]
    fn test_extreme_aspect_keeps_one_pixel() {
        assert_eq!(thumbnail_dimensions(10_000, 10, 128), (128, 1));
    }

    #[test]
    fn test_scale_to_resizes() {
        let image = DynamicImage::new_rgb8(300, 200);
        let scaled = scale_to(&image, thumbnail_dimensions(300, 200, 128));
        assert_eq!((scaled.width(), scaled.height()), (128, 85));
    }
}
