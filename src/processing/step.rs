//! A named, configured image transform.
//!
//! Built-in step kinds carry a typed parameter struct that is range-checked
//! when the step is built. Custom steps wrap any [`Transform`] implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use image::DynamicImage;
use crate::core::Resolution;
use crate::processing::transforms::{
    AutoRotateParams, ColorProfileParams, ContrastParams, GrayscaleParams, QuantizeParams, ResizeParams,
    SharpenParams, SmartCropParams, TextEnhanceParams,
};
use crate::utils::{TransformError, ValidationError};

/// An image-to-image operation.
pub trait Transform: Send + Sync {
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError>;

    /// Whether applying to `image` would do anything. The pipeline skips the step when false.
    fn applies_to(&self, _image: &DynamicImage) -> bool {
        true
    }
}

/// Adapter turning a closure into a [`Transform`].
struct FnTransform<F>(F);

impl<F> Transform for FnTransform<F>
where
    F: Fn(DynamicImage) -> Result<DynamicImage, TransformError> + Send + Sync,
{
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        (self.0)(image)
    }
}

/// Where a step belongs relative to the resize to the device resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Works best on the full-resolution scan
    PreResize,
    Resize,
    PostResize,
}

/// Step kind with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Resize(ResizeParams),
    AutoRotate(AutoRotateParams),
    SmartCrop(SmartCropParams),
    TextEnhance(TextEnhanceParams),
    Grayscale,
    ColorProfile(ColorProfileParams),
    Contrast(ContrastParams),
    Sharpen(SharpenParams),
    Quantize(QuantizeParams),
    /// Externally supplied transform; parameters are informational only
    Custom(BTreeMap<String, String>),
}

impl StepKind {
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::Resize(_) => "resize",
            Self::AutoRotate(_) => "auto_rotate",
            Self::SmartCrop(_) => "smart_crop",
            Self::TextEnhance(_) => "text_enhance",
            Self::Grayscale => "grayscale",
            Self::ColorProfile(_) => "color_profile",
            Self::Contrast(_) => "contrast",
            Self::Sharpen(_) => "sharpen",
            Self::Quantize(_) => "quantize",
            Self::Custom(_) => "custom",
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::AutoRotate(_) | Self::SmartCrop(_) | Self::TextEnhance(_) => Phase::PreResize,
            Self::Resize(_) => Phase::Resize,
            _ => Phase::PostResize,
        }
    }

    fn validate(&self, step: &str) -> Result<(), ValidationError> {
        let check = |ok: bool, message: String| {
            if ok {
                Ok(())
            } else {
                Err(ValidationError::parameter(step, message))
            }
        };
        match self {
            Self::Resize(p) => check(
                p.width > 0 && p.height > 0,
                format!("resize target {}x{} has a zero side", p.width, p.height),
            ),
            Self::AutoRotate(p) => {
                check(
                    p.max_angle.is_finite() && p.max_angle > 0.0 && p.max_angle <= 45.0,
                    format!("max angle {} outside (0, 45]", p.max_angle),
                )?;
                check(
                    p.threshold.is_finite() && p.threshold >= 0.0 && p.threshold < p.max_angle,
                    format!("threshold {} outside [0, {})", p.threshold, p.max_angle),
                )
            }
            Self::SmartCrop(p) => check(p.threshold > 0, "threshold must be above 0".to_string()),
            Self::TextEnhance(p) => {
                check(
                    p.sharpen.is_finite() && p.sharpen > 0.0 && p.sharpen <= 10.0,
                    format!("sharpen {} outside (0, 10]", p.sharpen),
                )?;
                check(
                    p.edge.is_finite() && (0.0..=1.0).contains(&p.edge),
                    format!("edge {} outside [0, 1]", p.edge),
                )
            }
            Self::Contrast(p) => check(
                p.factor.is_finite() && p.factor > 0.0 && p.factor <= 10.0,
                format!("factor {} outside (0, 10]", p.factor),
            ),
            Self::Sharpen(p) => check(
                p.factor.is_finite() && p.factor > 0.0 && p.factor <= 10.0,
                format!("factor {} outside (0, 10]", p.factor),
            ),
            Self::Quantize(p) => check(
                (2..=256).contains(&p.levels),
                format!("levels {} outside 2..=256", p.levels),
            ),
            Self::ColorProfile(p) => check(
                (1..=24).contains(&p.bit_depth),
                format!("bit depth {} outside 1..=24", p.bit_depth),
            ),
            Self::Grayscale | Self::Custom(_) => Ok(()),
        }
    }

    fn builtin_transform(&self) -> Option<Arc<dyn Transform>> {
        let transform: Arc<dyn Transform> = match self {
            Self::Resize(p) => Arc::new(*p),
            Self::AutoRotate(p) => Arc::new(*p),
            Self::SmartCrop(p) => Arc::new(*p),
            Self::TextEnhance(p) => Arc::new(*p),
            Self::Grayscale => Arc::new(GrayscaleParams),
            Self::ColorProfile(p) => Arc::new(*p),
            Self::Contrast(p) => Arc::new(*p),
            Self::Sharpen(p) => Arc::new(*p),
            Self::Quantize(p) => Arc::new(*p),
            Self::Custom(_) => return None,
        };
        Some(transform)
    }
}

/// One named transform in a [`crate::processing::Pipeline`]. Immutable once built.
#[derive(Clone)]
pub struct Step {
    name: String,
    kind: StepKind,
    transform: Arc<dyn Transform>,
}

impl Step {
    /// Build a built-in step under its default name.
    pub fn new(kind: StepKind) -> Result<Self, ValidationError> {
        let name = kind.default_name().to_string();
        Self::named(name, kind)
    }

    /// Build a built-in step under a caller-chosen name.
    pub fn named(name: impl Into<String>, kind: StepKind) -> Result<Self, ValidationError> {
        let name = name.into();
        kind.validate(&name)?;
        let transform = kind.builtin_transform().ok_or_else(|| {
            ValidationError::parameter(&name, "custom steps need a transform, use Step::custom")
        })?;
        Ok(Self { name, kind, transform })
    }

    /// Wrap an arbitrary closure as a step.
    pub fn custom<F>(name: impl Into<String>, params: BTreeMap<String, String>, transform: F) -> Self
    where
        F: Fn(DynamicImage) -> Result<DynamicImage, TransformError> + Send + Sync + 'static,
    {
        Self::from_transform(name, params, Arc::new(FnTransform(transform)))
    }

    pub fn from_transform(
        name: impl Into<String>,
        params: BTreeMap<String, String>,
        transform: Arc<dyn Transform>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::Custom(params),
            transform,
        }
    }

    pub fn resize(resolution: Resolution) -> Result<Self, ValidationError> {
        Self::new(StepKind::Resize(ResizeParams {
            width: resolution.width,
            height: resolution.height,
        }))
    }

    /// Deskew pages tilted between `threshold` and `max_angle` degrees.
    pub fn auto_rotate(max_angle: f32, threshold: f32) -> Result<Self, ValidationError> {
        Self::new(StepKind::AutoRotate(AutoRotateParams { max_angle, threshold }))
    }

    pub fn smart_crop(threshold: u8, min_margin: u32) -> Result<Self, ValidationError> {
        Self::new(StepKind::SmartCrop(SmartCropParams { threshold, min_margin }))
    }

    pub fn text_enhance(sharpen: f32, edge: f32) -> Result<Self, ValidationError> {
        Self::new(StepKind::TextEnhance(TextEnhanceParams { sharpen, edge }))
    }

    pub fn grayscale() -> Self {
        Self {
            name: StepKind::Grayscale.default_name().to_string(),
            kind: StepKind::Grayscale,
            transform: Arc::new(GrayscaleParams),
        }
    }

    pub fn color_profile(color: bool, bit_depth: u8) -> Result<Self, ValidationError> {
        Self::new(StepKind::ColorProfile(ColorProfileParams { color, bit_depth }))
    }

    pub fn contrast(factor: f32) -> Result<Self, ValidationError> {
        Self::new(StepKind::Contrast(ContrastParams { factor }))
    }

    pub fn sharpen(factor: f32) -> Result<Self, ValidationError> {
        Self::new(StepKind::Sharpen(SharpenParams { factor }))
    }

    pub fn quantize(levels: u16, color: bool) -> Result<Self, ValidationError> {
        Self::new(StepKind::Quantize(QuantizeParams { levels, color }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn phase(&self) -> Phase {
        self.kind.phase()
    }

    pub fn applies_to(&self, image: &DynamicImage) -> bool {
        self.transform.applies_to(image)
    }

    /// Run the transform once. Never retries.
    pub fn process(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        self.transform
            .apply(image)
            .map_err(|e| e.with_step(&self.name))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
