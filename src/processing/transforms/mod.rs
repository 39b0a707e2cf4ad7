//! Built-in transforms on top of the `image` crate.

mod geometry;
mod tone;

pub use geometry::{AutoRotateParams, ResizeParams, SmartCropParams};
pub use tone::{ColorProfileParams, ContrastParams, GrayscaleParams, QuantizeParams, SharpenParams, TextEnhanceParams};
