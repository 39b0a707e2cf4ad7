//! Core types for batch configuration and results.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::processing::Pipeline;
use crate::reporting::{ErrorSummary, Severity};
use crate::utils::ValidationError;
use crate::worker::RetryPolicy;

pub const DEFAULT_QUALITY: u8 = 6;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Target output size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Kobo Elipsa / Tolino Epos 3 panel, the default target.
    pub const DEFAULT: Resolution = Resolution { width: 1404, height: 1872 };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ValidationError;

    /// Parses `WIDTHxHEIGHT`, e.g. `1072x1448`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| ValidationError::Resolution(format!("expected WIDTHxHEIGHT, got '{}'", s)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| ValidationError::Resolution(format!("'{}' is not a pixel count", part)))
        };
        let resolution = Resolution::new(parse(w)?, parse(h)?);
        if !resolution.is_valid() {
            return Err(ValidationError::Resolution(format!("{} has a zero side", resolution)));
        }
        Ok(resolution)
    }
}

/// Immutable snapshot of everything one batch run needs.
///
/// The pipeline is shared read-only by every worker for the whole run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Root directory that is scanned for images and archives
    pub src_root: PathBuf,
    /// Root directory outputs are mirrored into
    pub dest_root: PathBuf,
    /// Steps applied to every image
    pub pipeline: Pipeline,
    /// Target device resolution
    pub resolution: Resolution,
    /// Output compression level, 1 (fastest) to 9 (smallest)
    pub quality: u8,
    /// Number of items processed concurrently
    pub worker_count: usize,
    /// Extra attempts after the first failure of a transient error
    pub max_retries: u32,
    /// Wait before the first retry
    pub base_delay: Duration,
    /// Multiplier applied to the wait after every retry
    pub backoff_factor: f64,
    /// Keep going after an item fails for good
    pub continue_on_error: bool,
    /// Insert a resize to `resolution` when the pipeline has none
    pub auto_resize: bool,
    /// Treat each top-level source directory as an archive to build
    pub pack_directories: bool,
    /// Enumerate and log only, write nothing
    pub dry_run: bool,
}

impl BatchConfig {
    pub fn new(src_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>, pipeline: Pipeline) -> Self {
        Self {
            src_root: src_root.into(),
            dest_root: dest_root.into(),
            pipeline,
            resolution: Resolution::DEFAULT,
            quality: DEFAULT_QUALITY,
            worker_count: DEFAULT_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            continue_on_error: true,
            auto_resize: true,
            pack_directories: false,
            dry_run: false,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            backoff_factor: self.backoff_factor,
        }
    }

    /// The pipeline workers actually run, with a resize inserted when requested.
    pub fn effective_pipeline(&self) -> Result<Pipeline, ValidationError> {
        if self.auto_resize {
            self.pipeline.with_resize(self.resolution)
        } else {
            Ok(self.pipeline.clone())
        }
    }
}

/// Process exit status derived from the outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExitStatus {
    /// Every item succeeded
    Success,
    /// Only WARNING or ERROR records
    CompletedWithErrors,
    /// A CRITICAL record, or the run was aborted
    Failed,
}

impl ExitStatus {
    pub fn from_run(summary: &ErrorSummary, aborted: bool) -> Self {
        if aborted || summary.count(Severity::Critical) > 0 {
            Self::Failed
        } else if summary.total > 0 {
            Self::CompletedWithErrors
        } else {
            Self::Success
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::CompletedWithErrors => 1,
            Self::Failed => 2,
        }
    }
}

/// The first terminal failure of a run with `continue_on_error` off.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortCause {
    pub path: PathBuf,
    pub message: String,
}

/// Result of one batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Items discovered, including those never dispatched
    pub total_items: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items left undispatched after an abort
    pub skipped: usize,
    /// Archives and directories left unopened after an abort; their members
    /// are not part of `total_items`
    pub skipped_sources: usize,
    pub archives_written: usize,
    /// Archives not written because a member failed under stop-on-error
    pub archives_discarded: usize,
    /// Archives whose output could not be written
    pub archives_failed: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub elapsed: Duration,
    pub dry_run: bool,
    pub aborted: Option<AbortCause>,
    pub summary: ErrorSummary,
    pub exit_status: ExitStatus,
}
