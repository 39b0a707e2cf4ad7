//! Decoding source bytes and encoding processed pages.

use std::io::Cursor;
use std::path::Path;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use crate::utils::{PressError, PressResult};

/// PNG compression for a 1..=9 quality level.
pub fn compression_for(quality: u8) -> CompressionType {
    match quality {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

pub fn decode(bytes: &[u8], origin: &Path) -> PressResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| PressError::decode(origin, e))
}

pub fn encode_png(image: &DynamicImage, quality: u8, origin: &Path) -> PressResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = PngEncoder::new_with_quality(&mut buffer, compression_for(quality), FilterType::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| PressError::encode(origin, e))?;
    Ok(buffer.into_inner())
}
