pub mod error;
pub mod formats;
pub mod fs;
pub mod validation;

pub use error::{ErrorKind, PathError, PressError, PressResult, TransformError, ValidationError};
pub use formats::{ArchiveFormat, ImageFormat, OUTPUT_EXTENSION, image_format, is_archive, is_image};
pub use fs::{ensure_parent_dir, mirror_path, relative_to, write_atomic, write_atomic_blocking};
pub use validation::validate_config;
