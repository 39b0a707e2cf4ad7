use std::path::{Path, PathBuf};
use crate::core::{BatchConfig, Resolution};
use crate::utils::{PathError, ValidationError};

/// Validates a batch configuration before any file is touched
pub fn validate_config(config: &BatchConfig) -> Result<(), ValidationError> {
    validate_source_root(&config.src_root)?;
    validate_destination_root(&config.src_root, &config.dest_root)?;
    validate_quality(config.quality)?;
    validate_resolution(config.resolution)?;
    validate_workers(config.worker_count)?;
    validate_retry(config.backoff_factor)?;
    Ok(())
}

/// Validates that the source root exists and is a directory
pub fn validate_source_root(path: &Path) -> Result<(), ValidationError> {
    if !path.exists() {
        return Err(PathError::NotFound(path.to_path_buf()).into());
    }

    if !path.is_dir() {
        return Err(PathError::NotDirectory(path.to_path_buf()).into());
    }

    Ok(())
}

fn resolved(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Validates that output does not overwrite the source tree
pub fn validate_destination_root(src_root: &Path, dest_root: &Path) -> Result<(), ValidationError> {
    if resolved(src_root) == resolved(dest_root) {
        return Err(PathError::SameAsSource(dest_root.to_path_buf()).into());
    }

    if dest_root.exists() && !dest_root.is_dir() {
        return Err(PathError::NotDirectory(dest_root.to_path_buf()).into());
    }

    Ok(())
}

pub fn validate_quality(quality: u8) -> Result<(), ValidationError> {
    if !(1..=9).contains(&quality) {
        return Err(ValidationError::Quality(quality));
    }
    Ok(())
}

pub fn validate_resolution(resolution: Resolution) -> Result<(), ValidationError> {
    if !resolution.is_valid() {
        return Err(ValidationError::Resolution(format!(
            "{} has a zero side",
            resolution
        )));
    }
    Ok(())
}

pub fn validate_workers(worker_count: usize) -> Result<(), ValidationError> {
    if worker_count == 0 {
        return Err(ValidationError::Workers);
    }
    Ok(())
}

pub fn validate_retry(backoff_factor: f64) -> Result<(), ValidationError> {
    if !backoff_factor.is_finite() || backoff_factor < 1.0 {
        return Err(ValidationError::Retry(format!(
            "backoff factor must be a finite number >= 1, got {}",
            backoff_factor
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Pipeline;

    fn config(src: &Path, dest: &Path) -> BatchConfig {
        BatchConfig::new(src, dest, Pipeline::new())
    }

    #[test]
    fn accepts_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), &dir.path().join("out"));
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn rejects_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = validate_config(&config(&missing, dir.path())).unwrap_err();
        assert_eq!(err, ValidationError::Path(PathError::NotFound(missing)));
    }

    #[test]
    fn rejects_file_as_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("page.png");
        std::fs::write(&file, b"").unwrap();
        let err = validate_config(&config(&file, dir.path())).unwrap_err();
        assert!(matches!(err, ValidationError::Path(PathError::NotDirectory(_))));
    }

    #[test]
    fn rejects_destination_equal_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_config(&config(dir.path(), &dir.path().join("."))).unwrap_err();
        assert!(matches!(err, ValidationError::Path(PathError::SameAsSource(_))));
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");

        let mut cfg = config(dir.path(), &dest);
        cfg.quality = 0;
        assert_eq!(validate_config(&cfg).unwrap_err(), ValidationError::Quality(0));

        let mut cfg = config(dir.path(), &dest);
        cfg.worker_count = 0;
        assert_eq!(validate_config(&cfg).unwrap_err(), ValidationError::Workers);

        let mut cfg = config(dir.path(), &dest);
        cfg.backoff_factor = 0.5;
        assert!(matches!(validate_config(&cfg).unwrap_err(), ValidationError::Retry(_)));

        let mut cfg = config(dir.path(), &dest);
        cfg.resolution = Resolution::new(0, 100);
        assert!(matches!(validate_config(&cfg).unwrap_err(), ValidationError::Resolution(_)));
    }
}
