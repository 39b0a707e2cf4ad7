use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, GenericImageView, GrayImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use crate::processing::Transform;
use crate::utils::TransformError;

const PAD_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Longest side of the copy used for skew detection.
const DESKEW_SAMPLE_SIZE: u32 = 512;
/// Angular resolution of the skew search, in degrees.
const DESKEW_STEP: f32 = 0.25;
/// Luma below this counts as ink when measuring skew.
const INK_LEVEL: u8 = 128;

/// Convert an RGBA working copy back to the colour model of the input.
fn restore_color(rgba: RgbaImage, original: ColorType) -> DynamicImage {
    let image = DynamicImage::ImageRgba8(rgba);
    if original.has_alpha() {
        image
    } else if original.has_color() {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else {
        DynamicImage::ImageLuma8(image.to_luma8())
    }
}

/// Fit inside `width` x `height` keeping the aspect ratio, then pad with white
/// to exactly that size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
}

impl Transform for ResizeParams {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        if self.width == 0 || self.height == 0 {
            return Err(TransformError::permanent(format!(
                "cannot resize to {}x{}",
                self.width, self.height
            )));
        }

        let fitted = image.resize(self.width, self.height, FilterType::Lanczos3);
        if fitted.width() == self.width && fitted.height() == self.height {
            return Ok(fitted);
        }

        let mut canvas = RgbaImage::from_pixel(self.width, self.height, PAD_COLOR);
        let x = (self.width - fitted.width()) / 2;
        let y = (self.height - fitted.height()) / 2;
        imageops::overlay(&mut canvas, &fitted.to_rgba8(), i64::from(x), i64::from(y));

        Ok(restore_color(canvas, image.color()))
    }

    fn applies_to(&self, image: &DynamicImage) -> bool {
        image.dimensions() != (self.width, self.height)
    }
}

/// Trim near-white page margins.
///
/// Pixels darker than `threshold` count as content; the crop keeps
/// `min_margin` pixels around the content box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartCropParams {
    pub threshold: u8,
    pub min_margin: u32,
}

impl SmartCropParams {
    /// Bounding box `(x, y, w, h)` of content, or `None` for a blank page.
    fn content_box(&self, image: &DynamicImage) -> Option<(u32, u32, u32, u32)> {
        let luma = image.to_luma8();
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);
        let mut found = false;

        for (x, y, pixel) in luma.enumerate_pixels() {
            if pixel.0[0] < self.threshold {
                found = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
        if !found {
            return None;
        }

        let (width, height) = luma.dimensions();
        let left = min_x.saturating_sub(self.min_margin);
        let top = min_y.saturating_sub(self.min_margin);
        let right = max_x.saturating_add(self.min_margin).min(width - 1);
        let bottom = max_y.saturating_add(self.min_margin).min(height - 1);
        Some((left, top, right - left + 1, bottom - top + 1))
    }
}

impl Transform for SmartCropParams {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        match self.content_box(&image) {
            Some((x, y, w, h)) if (w, h) != image.dimensions() => Ok(image.crop_imm(x, y, w, h)),
            _ => Ok(image),
        }
    }

    fn applies_to(&self, image: &DynamicImage) -> bool {
        image.width() > 0 && image.height() > 0
    }
}

/// Straighten pages scanned at a slight angle.
///
/// The skew is measured on text rows; pages tilted less than `threshold` or
/// more than `max_angle` degrees are left as they are. Corners uncovered by
/// the rotation are filled with white.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoRotateParams {
    pub max_angle: f32,
    pub threshold: f32,
}

impl AutoRotateParams {
    /// Estimated clockwise tilt of the text rows in degrees; 0.0 for pages
    /// without ink.
    pub fn detect_skew(&self, image: &DynamicImage) -> f32 {
        let luma: GrayImage = if image.width().max(image.height()) > DESKEW_SAMPLE_SIZE {
            image.thumbnail(DESKEW_SAMPLE_SIZE, DESKEW_SAMPLE_SIZE).to_luma8()
        } else {
            image.to_luma8()
        };
        let ink: Vec<(f32, f32)> = luma
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] < INK_LEVEL)
            .map(|(x, y, _)| (x as f32, y as f32))
            .collect();
        if ink.is_empty() {
            return 0.0;
        }

        let (width, height) = luma.dimensions();
        let max_slope = self.max_angle.to_radians().tan().abs();
        let offset = (width as f32 * max_slope).ceil() as usize + 1;
        let mut bins = vec![0u64; height as usize + 2 * offset + 1];

        // Projecting along the true row angle gives the sharpest profile.
        let mut score_of = |angle: f32| -> u64 {
            bins.iter_mut().for_each(|b| *b = 0);
            let slope = angle.to_radians().tan();
            for &(x, y) in &ink {
                let row = (y - x * slope).round() as i64 + offset as i64;
                if let Some(bin) = usize::try_from(row).ok().and_then(|r| bins.get_mut(r)) {
                    *bin += 1;
                }
            }
            bins.iter().map(|&b| b * b).sum()
        };

        let steps = (self.max_angle / DESKEW_STEP).floor() as i32;
        let mut best = (0.0f32, score_of(0.0));
        for k in 1..=steps {
            for angle in [k as f32 * DESKEW_STEP, -(k as f32) * DESKEW_STEP] {
                let score = score_of(angle);
                if score > best.1 {
                    best = (angle, score);
                }
            }
        }
        best.0
    }

    /// Undo a tilt of `angle` degrees around the centre, bilinear sampled.
    fn rotate(image: &DynamicImage, angle: f32) -> DynamicImage {
        let source = image.to_rgba8();
        let (width, height) = source.dimensions();
        let (sin, cos) = angle.to_radians().sin_cos();
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;

        let texel = |x: i64, y: i64| -> [f32; 4] {
            if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
                return PAD_COLOR.0.map(f32::from);
            }
            source.get_pixel(x as u32, y as u32).0.map(f32::from)
        };

        let rotated = RgbaImage::from_fn(width, height, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let sx = cx + dx * cos - dy * sin;
            let sy = cy + dx * sin + dy * cos;

            let (x0, y0) = (sx.floor(), sy.floor());
            let (fx, fy) = (sx - x0, sy - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);
            let corners = [
                (texel(x0, y0), (1.0 - fx) * (1.0 - fy)),
                (texel(x0 + 1, y0), fx * (1.0 - fy)),
                (texel(x0, y0 + 1), (1.0 - fx) * fy),
                (texel(x0 + 1, y0 + 1), fx * fy),
            ];
            let mut out = [0u8; 4];
            for (channel, value) in out.iter_mut().enumerate() {
                let sum: f32 = corners.iter().map(|(c, w)| c[channel] * w).sum();
                *value = sum.round().clamp(0.0, 255.0) as u8;
            }
            Rgba(out)
        });
        restore_color(rotated, image.color())
    }
}

impl Transform for AutoRotateParams {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        let angle = self.detect_skew(&image);
        if angle.abs() < self.threshold || angle.abs() > self.max_angle {
            return Ok(image);
        }
        Ok(Self::rotate(&image, angle))
    }

    fn applies_to(&self, image: &DynamicImage) -> bool {
        image.width() >= 2 && image.height() >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn page_with_block(width: u32, height: u32, block: (u32, u32, u32, u32)) -> DynamicImage {
        let (bx, by, bw, bh) = block;
        DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
            if x >= bx && x < bx + bw && y >= by && y < by + bh {
                Luma([0])
            } else {
                Luma([255])
            }
        }))
    }

    #[test]
    fn resize_pads_to_exact_size() {
        let wide = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 100, Luma([0])));
        let out = ResizeParams { width: 60, height: 80 }.apply(wide).unwrap();

        assert_eq!(out.dimensions(), (60, 80));
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        let luma = out.to_luma8();
        // 60x30 content centered vertically, white bands above and below
        assert_eq!(luma.get_pixel(30, 0).0[0], 255);
        assert_eq!(luma.get_pixel(30, 40).0[0], 0);
        assert_eq!(luma.get_pixel(30, 79).0[0], 255);
    }

    #[test]
    fn resize_skips_matching_images() {
        let params = ResizeParams { width: 4, height: 6 };
        assert!(!params.applies_to(&DynamicImage::new_rgb8(4, 6)));
        assert!(params.applies_to(&DynamicImage::new_rgb8(6, 4)));
    }

    #[test]
    fn crop_keeps_margin_around_content() {
        let page = page_with_block(100, 100, (40, 30, 10, 20));
        let out = SmartCropParams { threshold: 240, min_margin: 5 }.apply(page).unwrap();
        assert_eq!(out.dimensions(), (20, 30));
    }

    #[test]
    fn crop_leaves_blank_pages_alone() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(50, 70, Luma([255])));
        let out = SmartCropParams { threshold: 240, min_margin: 5 }.apply(blank.clone()).unwrap();
        assert_eq!(out, blank);
    }

    #[test]
    fn crop_clamps_margin_at_edges() {
        let page = page_with_block(30, 30, (0, 0, 5, 5));
        let out = SmartCropParams { threshold: 240, min_margin: 10 }.apply(page).unwrap();
        assert_eq!(out.dimensions(), (15, 15));
    }

    /// Dark rows two pixels thick every 20 pixels, tilted by `degrees`.
    fn ruled_page(size: u32, degrees: f32) -> DynamicImage {
        let slope = degrees.to_radians().tan();
        let centre = size as f32 / 2.0;
        DynamicImage::ImageLuma8(GrayImage::from_fn(size, size, |x, y| {
            let row = (y as f32 - centre) - (x as f32 - centre) * slope;
            if row.rem_euclid(20.0) < 2.0 { Luma([0]) } else { Luma([255]) }
        }))
    }

    #[test]
    fn detects_and_removes_skew() {
        let params = AutoRotateParams { max_angle: 5.0, threshold: 0.5 };
        let page = ruled_page(200, 3.0);
        assert!((params.detect_skew(&page) - 3.0).abs() <= 0.25);

        let straightened = params.apply(page).unwrap();
        assert_eq!(straightened.dimensions(), (200, 200));
        assert!(matches!(straightened, DynamicImage::ImageLuma8(_)));
        assert!(params.detect_skew(&straightened).abs() <= 0.5);
    }

    #[test]
    fn straight_pages_are_untouched() {
        let params = AutoRotateParams { max_angle: 5.0, threshold: 0.5 };
        let page = ruled_page(120, 0.0);
        assert_eq!(params.detect_skew(&page), 0.0);
        assert_eq!(params.apply(page.clone()).unwrap(), page);
    }

    #[test]
    fn skew_below_threshold_is_kept() {
        let params = AutoRotateParams { max_angle: 5.0, threshold: 4.0 };
        let page = ruled_page(200, 3.0);
        assert_eq!(params.apply(page.clone()).unwrap(), page);
    }

    #[test]
    fn blank_pages_have_no_skew() {
        let params = AutoRotateParams { max_angle: 5.0, threshold: 0.5 };
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([255])));
        assert_eq!(params.detect_skew(&blank), 0.0);
        assert!(!params.applies_to(&DynamicImage::new_luma8(1, 40)));
    }
}
