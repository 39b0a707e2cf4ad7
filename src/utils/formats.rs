use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Extension every processed page is written with.
pub const OUTPUT_EXTENSION: &str = "png";

/// Input image formats picked up from the source tree and from archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
}

impl ImageFormat {
    /// Get file extensions associated with this format
    pub fn extensions(&self) -> &[&str] {
        match self {
            Self::Jpeg => &["jpg", "jpeg"],
            Self::Png => &["png"],
            Self::Gif => &["gif"],
            Self::WebP => &["webp"],
            Self::Bmp => &["bmp"],
        }
    }

    /// Check if the extension matches this format
    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.extensions().contains(&ext.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(ext: &str) -> Result<Self, Self::Err> {
        let ext = ext.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "gif" => Ok(Self::Gif),
            "webp" => Ok(Self::WebP),
            "bmp" => Ok(Self::Bmp),
            _ => Err(format!("Unsupported image format: {}", ext)),
        }
    }
}

/// Container formats expanded into one work item per member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Cbz,
    Zip,
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(ext: &str) -> Result<Self, Self::Err> {
        match ext.to_lowercase().as_str() {
            "cbz" => Ok(Self::Cbz),
            "zip" => Ok(Self::Zip),
            other => Err(format!("Unsupported archive format: {}", other)),
        }
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Get image format from file extension, if it is one we process.
pub fn image_format(path: impl AsRef<Path>) -> Option<ImageFormat> {
    extension(path.as_ref()).and_then(|ext| ImageFormat::from_str(ext).ok())
}

pub fn is_image(path: impl AsRef<Path>) -> bool {
    image_format(path).is_some()
}

pub fn is_archive(path: impl AsRef<Path>) -> bool {
    extension(path.as_ref())
        .map(|ext| ArchiveFormat::from_str(ext).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_images_case_insensitively() {
        assert_eq!(image_format("page01.JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(image_format("dir/cover.webp"), Some(ImageFormat::WebP));
        assert!(!is_image("ComicInfo.xml"));
        assert!(!is_image("no_extension"));
    }

    #[test]
    fn detects_archives() {
        assert!(is_archive("volume 01.cbz"));
        assert!(is_archive("VOLUME.ZIP"));
        assert!(!is_archive("volume.cbr"));
    }
}
