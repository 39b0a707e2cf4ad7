use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use crate::processing::Transform;
use crate::utils::TransformError;

/// Below this distance from 1.0 a factor is treated as "leave unchanged".
const NEUTRAL_EPSILON: f32 = 1e-3;

/// Scales contrast; 1.0 leaves the image unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContrastParams {
    pub factor: f32,
}

impl Transform for ContrastParams {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(image.adjust_contrast((self.factor - 1.0) * 100.0))
    }

    fn applies_to(&self, _image: &DynamicImage) -> bool {
        (self.factor - 1.0).abs() > NEUTRAL_EPSILON
    }
}

/// Sharpens above 1.0, softens below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharpenParams {
    pub factor: f32,
}

impl SharpenParams {
    fn sigma(&self) -> f32 {
        (self.factor - 1.0).abs() * 5.0
    }
}

impl Transform for SharpenParams {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        if self.factor > 1.0 {
            Ok(image.unsharpen(self.sigma(), 1))
        } else {
            Ok(image.blur(self.sigma()))
        }
    }

    fn applies_to(&self, _image: &DynamicImage) -> bool {
        (self.factor - 1.0).abs() > NEUTRAL_EPSILON
    }
}

/// Crisp up line art and lettering on scanned pages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextEnhanceParams {
    /// Unsharp-mask radius
    pub sharpen: f32,
    /// Edge emphasis strength, 0 to 1
    pub edge: f32,
}

impl Transform for TextEnhanceParams {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        let sharpened = image.unsharpen(self.sharpen, 2);
        if self.edge <= 0.0 {
            return Ok(sharpened);
        }
        let e = self.edge;
        let kernel = [0.0, -e, 0.0, -e, 1.0 + 4.0 * e, -e, 0.0, -e, 0.0];
        Ok(sharpened.filter3x3(&kernel))
    }
}

/// Drop colour information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrayscaleParams;

impl Transform for GrayscaleParams {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(image.grayscale())
    }

    fn applies_to(&self, image: &DynamicImage) -> bool {
        image.color().has_color()
    }
}

/// Posterize to `levels` evenly spaced intensities, the palette an e-ink
/// panel can actually show. With 16 levels these are 0x00, 0x11, ... 0xFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizeParams {
    pub levels: u16,
    /// Quantize each RGB channel instead of converting to gray first
    pub color: bool,
}

impl QuantizeParams {
    fn lookup_table(&self) -> [u8; 256] {
        let steps = f32::from(self.levels.saturating_sub(1).max(1));
        let mut table = [0u8; 256];
        for (value, slot) in table.iter_mut().enumerate() {
            let level = (value as f32 / 255.0 * steps).round();
            *slot = (level / steps * 255.0).round() as u8;
        }
        table
    }
}

impl Transform for QuantizeParams {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        if !(2..=256).contains(&self.levels) {
            return Err(TransformError::permanent(format!("cannot quantize to {} levels", self.levels)));
        }
        let table = self.lookup_table();

        if self.color {
            let mut rgb: RgbImage = image.to_rgb8();
            for pixel in rgb.pixels_mut() {
                for channel in pixel.0.iter_mut() {
                    *channel = table[usize::from(*channel)];
                }
            }
            Ok(DynamicImage::ImageRgb8(rgb))
        } else {
            let mut gray: GrayImage = image.to_luma8();
            for pixel in gray.pixels_mut() {
                pixel.0[0] = table[usize::from(pixel.0[0])];
            }
            Ok(DynamicImage::ImageLuma8(gray))
        }
    }
}

/// Convert to the colour model a panel can show: 8-bit RGB for colour
/// panels, gray posterized to `bit_depth` bits for monochrome ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorProfileParams {
    pub color: bool,
    pub bit_depth: u8,
}

impl Transform for ColorProfileParams {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        if self.color {
            return Ok(DynamicImage::ImageRgb8(image.to_rgb8()));
        }
        if self.bit_depth >= 8 {
            return Ok(DynamicImage::ImageLuma8(image.to_luma8()));
        }
        let levels = 1u16 << self.bit_depth.max(1);
        QuantizeParams { levels, color: false }.apply(image)
    }

    fn applies_to(&self, image: &DynamicImage) -> bool {
        match image {
            DynamicImage::ImageRgb8(_) => !self.color,
            DynamicImage::ImageLuma8(_) => self.color || self.bit_depth < 8,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn gradient() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(256, 1, |x, _| Luma([x as u8])))
    }

    #[test]
    fn sixteen_levels_match_eink_palette() {
        let out = QuantizeParams { levels: 16, color: false }.apply(gradient()).unwrap();
        let palette: Vec<u8> = (0..16).map(|i| i * 0x11).collect();
        for pixel in out.to_luma8().pixels() {
            assert!(palette.contains(&pixel.0[0]), "{} not in palette", pixel.0[0]);
        }
    }

    #[test]
    fn two_levels_is_black_and_white() {
        let out = QuantizeParams { levels: 2, color: false }.apply(gradient()).unwrap();
        let luma = out.to_luma8();
        assert_eq!(luma.get_pixel(0, 0).0[0], 0);
        assert_eq!(luma.get_pixel(100, 0).0[0], 0);
        assert_eq!(luma.get_pixel(200, 0).0[0], 255);
    }

    #[test]
    fn colour_quantize_keeps_channels() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([250, 10, 130])));
        let out = QuantizeParams { levels: 2, color: true }.apply(img).unwrap();
        assert_eq!(out.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 255]));
    }

    #[test]
    fn neutral_factors_do_not_apply() {
        let img = DynamicImage::new_rgb8(4, 4);
        assert!(!ContrastParams { factor: 1.0 }.applies_to(&img));
        assert!(ContrastParams { factor: 1.5 }.applies_to(&img));
        assert!(!SharpenParams { factor: 1.0 }.applies_to(&img));
        assert!(SharpenParams { factor: 0.8 }.applies_to(&img));
    }

    #[test]
    fn grayscale_only_applies_to_colour() {
        assert!(GrayscaleParams.applies_to(&DynamicImage::new_rgb8(2, 2)));
        assert!(!GrayscaleParams.applies_to(&DynamicImage::new_luma8(2, 2)));
        let out = GrayscaleParams.apply(DynamicImage::new_rgb8(2, 2)).unwrap();
        assert!(!out.color().has_color());
    }

    #[test]
    fn contrast_spreads_midtones() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 96 } else { 160 }])));
        let out = ContrastParams { factor: 1.5 }.apply(img).unwrap().to_luma8();
        assert!(out.get_pixel(0, 0).0[0] < 96);
        assert!(out.get_pixel(1, 0).0[0] > 160);
    }

    #[test]
    fn monochrome_profile_posterizes_to_bit_depth() {
        let out = ColorProfileParams { color: false, bit_depth: 2 }.apply(gradient()).unwrap();
        let luma = out.to_luma8();
        let mut seen: Vec<u8> = luma.pixels().map(|p| p.0[0]).collect();
        seen.dedup();
        assert_eq!(seen, vec![0, 85, 170, 255]);
    }

    #[test]
    fn colour_profile_yields_rgb() {
        let params = ColorProfileParams { color: true, bit_depth: 24 };
        let out = params.apply(gradient()).unwrap();
        assert!(matches!(out, DynamicImage::ImageRgb8(_)));
        assert!(!params.applies_to(&out));
        assert!(params.applies_to(&DynamicImage::new_rgba8(2, 2)));
    }

    #[test]
    fn eight_bit_gray_profile_skips_gray_input() {
        let params = ColorProfileParams { color: false, bit_depth: 8 };
        assert!(!params.applies_to(&gradient()));
        let out = params.apply(DynamicImage::new_rgb8(2, 2)).unwrap();
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
    }
}
