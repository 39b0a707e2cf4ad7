//! Error types for the batch converter.
//!
//! Provides a hierarchy of error types using `thiserror`. Configuration
//! problems surface as [`ValidationError`] before any work starts, a failing
//! step raises [`TransformError`], and everything a work item can run into is
//! folded into [`PressError`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use serde::Serialize;
use thiserror::Error;
use crate::reporting::Severity;

/// Configuration errors. Always fatal, raised before the batch starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Preset name not known to the factory
    #[error("Unknown preset '{name}'. Available presets: {}", .available.join(", "))]
    UnknownPreset { name: String, available: Vec<String> },
    /// Device key not present in the device table
    #[error("Unknown device '{key}'. Use --list-devices to see supported devices")]
    UnknownDevice { key: String },
    /// Target resolution could not be parsed or has a zero side
    #[error("Invalid resolution: {0}")]
    Resolution(String),
    /// Quality outside 1..=9
    #[error("Quality must be between 1 and 9, got {0}")]
    Quality(u8),
    /// Zero worker pool size
    #[error("Worker count must be at least 1")]
    Workers,
    /// Backoff factor or delay out of range
    #[error("Invalid retry policy: {0}")]
    Retry(String),
    /// A step parameter failed its range check
    #[error("Invalid parameter for step '{step}': {message}")]
    Parameter { step: String, message: String },
    /// Custom pipeline string could not be parsed
    #[error("Invalid custom pipeline '{spec}': {message}")]
    CustomSpec { spec: String, message: String },
    /// Source or destination path problem
    #[error("Path error: {0}")]
    Path(#[from] PathError),
}

/// File path errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    /// Path does not exist
    #[error("Path not found: {0}")]
    NotFound(PathBuf),
    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotDirectory(PathBuf),
    /// Destination resolves to the source root
    #[error("Destination must differ from source: {0}")]
    SameAsSource(PathBuf),
}

/// Failure raised by a single step.
///
/// Transforms construct this with an empty `step_name`; [`crate::processing::Step`]
/// stamps its own name on the way out.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("step '{step_name}' failed: {cause}")]
pub struct TransformError {
    pub step_name: String,
    pub cause: String,
    /// Whether another attempt could plausibly succeed
    pub transient: bool,
}

impl TransformError {
    pub fn permanent(cause: impl Into<String>) -> Self {
        Self {
            step_name: String::new(),
            cause: cause.into(),
            transient: false,
        }
    }

    pub fn transient(cause: impl Into<String>) -> Self {
        Self {
            step_name: String::new(),
            cause: cause.into(),
            transient: true,
        }
    }

    pub fn with_step(mut self, step_name: &str) -> Self {
        if self.step_name.is_empty() {
            self.step_name = step_name.to_string();
        }
        self
    }
}

/// Coarse classification of a failure, recorded on every error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Validation,
    Transform,
    Io,
    Decode,
    Encode,
    Archive,
    Worker,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "ValidationError",
            Self::Transform => "TransformError",
            Self::Io => "IOError",
            Self::Decode => "DecodeError",
            Self::Encode => "EncodeError",
            Self::Archive => "ArchiveError",
            Self::Worker => "WorkerError",
        };
        f.write_str(name)
    }
}

/// Main error type for everything that can happen to a work item.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PressError {
    /// Configuration rejected before the batch started
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A pipeline step failed
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Read or write failure
    #[error("IO error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Bytes are not a decodable image
    #[error("Decode error on {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Processed image could not be encoded
    #[error("Encode error on {path}: {message}")]
    Encode { path: PathBuf, message: String },

    /// Zip container could not be read or written
    #[error("Archive error on {path}: {message}")]
    Archive {
        path: PathBuf,
        message: String,
        transient: bool,
    },

    /// A worker task panicked or was cancelled
    #[error("Worker error: {0}")]
    Worker(String),

    /// Retry budget spent; wraps the last underlying cause
    #[error("Gave up after {attempts} attempts: {last_cause}")]
    RetryExhausted {
        last_cause: Box<PressError>,
        attempts: u32,
    },
}

/// Convenience result type for item processing.
pub type PressResult<T> = Result<T, PressError>;

// Helper methods for error creation
impl PressError {
    pub fn io(path: impl AsRef<Path>, err: impl fmt::Display) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn decode(path: impl AsRef<Path>, err: impl fmt::Display) -> Self {
        Self::Decode {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn encode(path: impl AsRef<Path>, err: impl fmt::Display) -> Self {
        Self::Encode {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn archive(path: impl AsRef<Path>, err: impl fmt::Display, transient: bool) -> Self {
        Self::Archive {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
            transient,
        }
    }

    pub fn worker<T: Into<String>>(msg: T) -> Self {
        Self::Worker(msg.into())
    }

    /// Whether the retry executor should try this operation again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { .. } => true,
            Self::Archive { transient, .. } => *transient,
            Self::Transform(err) => err.transient,
            Self::Validation(_)
            | Self::Decode { .. }
            | Self::Encode { .. }
            | Self::Worker(_)
            | Self::RetryExhausted { .. } => false,
        }
    }

    /// Severity a terminal failure of this kind is recorded with.
    pub fn severity(&self) -> Severity {
        match self.kind() {
            ErrorKind::Archive => Severity::Critical,
            _ => Severity::Error,
        }
    }

    /// Kind of the root cause, looking through retry exhaustion.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transform(_) => ErrorKind::Transform,
            Self::Io { .. } => ErrorKind::Io,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Encode { .. } => ErrorKind::Encode,
            Self::Archive { .. } => ErrorKind::Archive,
            Self::Worker(_) => ErrorKind::Worker,
            Self::RetryExhausted { last_cause, .. } => last_cause.kind(),
        }
    }

    /// Name of the stage that failed, used to bucket failures by step.
    pub fn step_name(&self) -> Option<String> {
        match self {
            Self::Transform(err) => Some(err.step_name.clone()),
            Self::Io { .. } => Some("io".to_string()),
            Self::Decode { .. } => Some("decode".to_string()),
            Self::Encode { .. } => Some("encode".to_string()),
            Self::Archive { .. } => Some("archive".to_string()),
            Self::Worker(_) => Some("worker".to_string()),
            Self::Validation(_) => None,
            Self::RetryExhausted { last_cause, .. } => last_cause.step_name(),
        }
    }

    /// The innermost cause, looking through retry exhaustion.
    pub fn root_cause(&self) -> &PressError {
        match self {
            Self::RetryExhausted { last_cause, .. } => last_cause.root_cause(),
            other => other,
        }
    }
}

// Helper methods for validation error creation
impl ValidationError {
    pub fn path_not_found(path: impl Into<PathBuf>) -> Self {
        Self::Path(PathError::NotFound(path.into()))
    }

    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Self::Path(PathError::NotDirectory(path.into()))
    }

    pub fn parameter(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parameter {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn custom_spec(spec: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CustomSpec {
            spec: spec.into(),
            message: message.into(),
        }
    }
}

// Convert std::io::Error to PressError when no path is at hand
impl From<io::Error> for PressError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for PressError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker(format!("worker task did not complete: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transience_follows_error_kind() {
        assert!(PressError::io("a.png", "disk busy").is_transient());
        assert!(PressError::archive("a.cbz", "locked", true).is_transient());
        assert!(!PressError::archive("a.cbz", "invalid central directory", false).is_transient());
        assert!(!PressError::decode("a.png", "bad header").is_transient());
        assert!(PressError::Transform(TransformError::transient("busy")).is_transient());
        assert!(!PressError::Transform(TransformError::permanent("nope")).is_transient());
    }

    #[test]
    fn exhausted_errors_report_their_root_cause() {
        let err = PressError::RetryExhausted {
            last_cause: Box::new(PressError::archive("a.cbz", "locked", true)),
            attempts: 4,
        };
        assert_eq!(err.kind(), ErrorKind::Archive);
        assert_eq!(err.severity(), Severity::Critical);
        assert_eq!(err.step_name().as_deref(), Some("archive"));
        assert!(!err.is_transient());
    }

    #[test]
    fn step_name_is_stamped_once() {
        let err = TransformError::permanent("boom").with_step("contrast").with_step("sharpen");
        assert_eq!(err.step_name, "contrast");
        assert_eq!(err.to_string(), "step 'contrast' failed: boom");
    }

    #[test]
    fn unknown_preset_lists_alternatives() {
        let err = ValidationError::UnknownPreset {
            name: "nook".into(),
            available: vec!["kindle".into(), "kobo".into()],
        };
        assert_eq!(err.to_string(), "Unknown preset 'nook'. Available presets: kindle, kobo");
    }
}
