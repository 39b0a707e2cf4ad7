//! Named default pipelines and a builder for ad-hoc ones.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::processing::devices::DeviceSpec;
use crate::processing::{Pipeline, Step};
use crate::utils::ValidationError;

/// Gray levels an e-ink panel shows (4-bit).
const EINK_LEVELS: u16 = 16;

/// Steeper tilts are treated as intentional.
const DESKEW_MAX_ANGLE: f32 = 5.0;
const DESKEW_THRESHOLD: f32 = 0.5;

const PRESET_NAMES: &[&str] = &[
    "eink",
    "high_quality",
    "ipad",
    "kindle",
    "kobo",
    "minimal",
    "pocketbook",
    "pocketbook_color",
    "print",
    "scanned_manga",
    "tablet",
    "tolino",
];

/// Explicit set of features for a custom pipeline. Unset features are left
/// out of the pipeline entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomOptions {
    /// Deskew limit and minimum tilt, in degrees
    pub auto_rotate: Option<(f32, f32)>,
    /// Trim margins darker than this threshold, keeping `crop_margin` pixels
    pub crop_threshold: Option<u8>,
    pub crop_margin: u32,
    /// Text sharpen radius and edge strength
    pub text_enhance: Option<(f32, f32)>,
    pub grayscale: bool,
    /// Panel colour support and bit depth
    pub color_profile: Option<(bool, u8)>,
    pub contrast: Option<f32>,
    pub sharpen: Option<f32>,
    /// Number of output gray levels
    pub quantize: Option<u16>,
}

impl CustomOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_rotate(mut self, max_angle: f32, threshold: f32) -> Self {
        self.auto_rotate = Some((max_angle, threshold));
        self
    }

    pub fn smart_crop(mut self, threshold: u8, margin: u32) -> Self {
        self.crop_threshold = Some(threshold);
        self.crop_margin = margin;
        self
    }

    pub fn text_enhance(mut self, sharpen: f32, edge: f32) -> Self {
        self.text_enhance = Some((sharpen, edge));
        self
    }

    pub fn grayscale(mut self) -> Self {
        self.grayscale = true;
        self
    }

    pub fn color_profile(mut self, color: bool, bit_depth: u8) -> Self {
        self.color_profile = Some((color, bit_depth));
        self
    }

    pub fn contrast(mut self, factor: f32) -> Self {
        self.contrast = Some(factor);
        self
    }

    pub fn sharpen(mut self, factor: f32) -> Self {
        self.sharpen = Some(factor);
        self
    }

    pub fn quantize(mut self, levels: u16) -> Self {
        self.quantize = Some(levels);
        self
    }

    /// Build the pipeline; steps appear in a fixed order regardless of how
    /// the options were set.
    pub fn build(&self) -> Result<Pipeline, ValidationError> {
        let mut pipeline = Pipeline::new();
        if let Some((max_angle, threshold)) = self.auto_rotate {
            pipeline.add_step(Step::auto_rotate(max_angle, threshold)?);
        }
        if let Some(threshold) = self.crop_threshold {
            pipeline.add_step(Step::smart_crop(threshold, self.crop_margin)?);
        }
        if let Some((sharpen, edge)) = self.text_enhance {
            pipeline.add_step(Step::text_enhance(sharpen, edge)?);
        }
        if self.grayscale {
            pipeline.add_step(Step::grayscale());
        }
        if let Some((color, bit_depth)) = self.color_profile {
            pipeline.add_step(Step::color_profile(color, bit_depth)?);
        }
        if let Some(factor) = self.contrast {
            pipeline.add_step(Step::contrast(factor)?);
        }
        if let Some(factor) = self.sharpen {
            pipeline.add_step(Step::sharpen(factor)?);
        }
        if let Some(levels) = self.quantize {
            pipeline.add_step(Step::quantize(levels, false)?);
        }
        Ok(pipeline)
    }
}

impl FromStr for CustomOptions {
    type Err = ValidationError;

    /// Parses `rotate=5:0.5,crop=245:10,text=1.5:0.3,profile=bw:4,contrast=1.5,sharpen=1.2,quantize=16,grayscale`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        fn number<T: FromStr>(spec: &str, key: &str, value: Option<&str>) -> Result<T, ValidationError> {
            let value = value.ok_or_else(|| ValidationError::custom_spec(spec, format!("'{}' needs a value", key)))?;
            value
                .trim()
                .parse()
                .map_err(|_| ValidationError::custom_spec(spec, format!("'{}' is not a valid value for '{}'", value, key)))
        }

        let mut options = CustomOptions::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = match part.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v)),
                None => (part, None),
            };
            match key.to_lowercase().as_str() {
                "contrast" => options.contrast = Some(number(spec, key, value)?),
                "sharpen" => options.sharpen = Some(number(spec, key, value)?),
                "quantize" => {
                    options.quantize = Some(match value {
                        Some(_) => number(spec, key, value)?,
                        None => EINK_LEVELS,
                    })
                }
                "grayscale" | "gray" => options.grayscale = true,
                "crop" => {
                    let (threshold, margin) = match value.and_then(|v| v.split_once(':')) {
                        Some((t, m)) => (number(spec, key, Some(t))?, number(spec, key, Some(m))?),
                        None if value.is_some() => (number(spec, key, value)?, 0),
                        None => (245, 10),
                    };
                    options = options.smart_crop(threshold, margin);
                }
                "rotate" => {
                    let (max_angle, threshold) = match value.and_then(|v| v.split_once(':')) {
                        Some((a, t)) => (number(spec, key, Some(a))?, number(spec, key, Some(t))?),
                        None if value.is_some() => (number(spec, key, value)?, DESKEW_THRESHOLD),
                        None => (DESKEW_MAX_ANGLE, DESKEW_THRESHOLD),
                    };
                    options = options.auto_rotate(max_angle, threshold);
                }
                "profile" => {
                    let value = value.ok_or_else(|| ValidationError::custom_spec(spec, "'profile' needs a value"))?;
                    let (model, depth) = match value.split_once(':') {
                        Some((m, d)) => (m.trim(), Some(number(spec, key, Some(d))?)),
                        None => (value.trim(), None),
                    };
                    options = match model.to_lowercase().as_str() {
                        "color" | "colour" => options.color_profile(true, depth.unwrap_or(24)),
                        "bw" | "gray" => options.color_profile(false, depth.unwrap_or(8)),
                        other => {
                            return Err(ValidationError::custom_spec(
                                spec,
                                format!("'{}' is not a colour model, use color or bw", other),
                            ));
                        }
                    };
                }
                "text" => {
                    let (sharpen, edge) = match value.and_then(|v| v.split_once(':')) {
                        Some((s, e)) => (number(spec, key, Some(s))?, number(spec, key, Some(e))?),
                        None if value.is_some() => (number(spec, key, value)?, 0.3),
                        None => (1.5, 0.3),
                    };
                    options = options.text_enhance(sharpen, edge);
                }
                other => {
                    return Err(ValidationError::custom_spec(spec, format!("unknown feature '{}'", other)));
                }
            }
        }
        Ok(options)
    }
}

impl fmt::Display for CustomOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some((a, t)) = self.auto_rotate {
            parts.push(format!("rotate={}:{}", a, t));
        }
        if let Some(t) = self.crop_threshold {
            parts.push(format!("crop={}:{}", t, self.crop_margin));
        }
        if let Some((s, e)) = self.text_enhance {
            parts.push(format!("text={}:{}", s, e));
        }
        if self.grayscale {
            parts.push("grayscale".to_string());
        }
        if let Some((color, depth)) = self.color_profile {
            parts.push(format!("profile={}:{}", if color { "color" } else { "bw" }, depth));
        }
        if let Some(c) = self.contrast {
            parts.push(format!("contrast={}", c));
        }
        if let Some(s) = self.sharpen {
            parts.push(format!("sharpen={}", s));
        }
        if let Some(q) = self.quantize {
            parts.push(format!("quantize={}", q));
        }
        f.write_str(&parts.join(","))
    }
}

/// Produces the built-in pipelines.
pub struct PresetFactory;

impl PresetFactory {
    /// Look up a preset by name, ignoring case.
    pub fn get_preset(name: &str) -> Result<Pipeline, ValidationError> {
        let options = match name.trim().to_lowercase().as_str() {
            "kindle" | "eink" | "tolino" | "pocketbook" => Self::eink_options(),
            "scanned_manga" => Self::eink_options().auto_rotate(DESKEW_MAX_ANGLE, DESKEW_THRESHOLD),
            "kobo" => CustomOptions::new().contrast(1.6).sharpen(1.3).quantize(EINK_LEVELS),
            "tablet" | "pocketbook_color" => CustomOptions::new().text_enhance(1.3, 0.25).contrast(1.3).sharpen(1.1),
            "ipad" => CustomOptions::new().text_enhance(1.4, 0.25).contrast(1.2).sharpen(1.4),
            "print" => CustomOptions::new().sharpen(1.05),
            "high_quality" => CustomOptions::new().contrast(1.2).sharpen(1.4),
            "minimal" => CustomOptions::new(),
            _ => {
                return Err(ValidationError::UnknownPreset {
                    name: name.to_string(),
                    available: Self::list_presets().iter().map(|s| s.to_string()).collect(),
                });
            }
        };
        options.build()
    }

    /// Preset names, sorted.
    pub fn list_presets() -> &'static [&'static str] {
        PRESET_NAMES
    }

    /// Ad-hoc pipeline from explicit options.
    pub fn custom(options: &CustomOptions) -> Result<Pipeline, ValidationError> {
        options.build()
    }

    /// Pipeline tuned to a device's panel.
    pub fn from_device(spec: &DeviceSpec) -> Result<Pipeline, ValidationError> {
        Self::device_options(spec).build()
    }

    fn eink_options() -> CustomOptions {
        CustomOptions::new()
            .smart_crop(245, 10)
            .text_enhance(1.5, 0.3)
            .contrast(1.5)
            .sharpen(1.2)
            .quantize(EINK_LEVELS)
    }

    fn device_options(spec: &DeviceSpec) -> CustomOptions {
        let high_density = spec.ppi >= 300;
        let (contrast, sharpen) = if spec.display_type.is_eink() {
            let contrast = if spec.color { 1.3 } else { 1.6 };
            (contrast, if high_density { 1.3 } else { 1.2 })
        } else {
            (1.2, if high_density { 1.4 } else { 1.3 })
        };

        let mut options = CustomOptions::new()
            .auto_rotate(DESKEW_MAX_ANGLE, DESKEW_THRESHOLD)
            .color_profile(spec.color, spec.bit_depth)
            .contrast(contrast)
            .sharpen(sharpen);
        if spec.display_type.is_eink() {
            options = options.smart_crop(245, 10).text_enhance(1.5, 0.3);
        }
        if spec.bit_depth < 16 && !spec.color {
            options = options.quantize(1u16 << spec.bit_depth.min(8));
        }
        options
    }
}
