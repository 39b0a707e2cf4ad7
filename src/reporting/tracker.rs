//! Thread-safe collection of failure records.
//!
//! Workers append concurrently; every update to the record list and the
//! derived counters happens under one lock so a summary never observes a
//! half-applied record.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::utils::{ErrorKind, PressError};

/// Impact of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Output was still produced
    Warning,
    /// A single item was lost
    Error,
    /// A whole output unit (archive) was lost
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Warning, Severity::Error, Severity::Critical];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// One terminal failure or recoverable anomaly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub path: PathBuf,
    pub error_kind: ErrorKind,
    pub message: String,
    pub severity: Severity,
    pub step_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Attempts made beyond the first
    pub retry_count: u32,
}

impl ErrorRecord {
    pub fn new(
        path: impl Into<PathBuf>,
        error_kind: ErrorKind,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            path: path.into(),
            error_kind,
            message: message.into(),
            severity,
            step_name: None,
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    /// Record for an item that failed for good after `attempts` tries.
    pub fn from_failure(path: impl Into<PathBuf>, error: &PressError, attempts: u32) -> Self {
        Self {
            step_name: error.step_name(),
            retry_count: attempts.saturating_sub(1),
            ..Self::new(path, error.kind(), error.root_cause().to_string(), error.severity())
        }
    }

    pub fn warning(path: impl Into<PathBuf>, error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(path, error_kind, message, Severity::Warning)
    }

    pub fn with_step(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.error_kind, self.message)?;
        if let Some(step) = &self.step_name {
            write!(f, " (step: {})", step)?;
        }
        write!(f, " - {}", self.path.display())?;
        if self.retry_count > 0 {
            write!(f, " (retries: {})", self.retry_count)?;
        }
        Ok(())
    }
}

/// File with the most recorded failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileErrorCount {
    pub path: PathBuf,
    pub count: usize,
}

/// Aggregate view over all records at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_step: BTreeMap<String, usize>,
    pub files_with_errors: usize,
    pub most_problematic_file: Option<FileErrorCount>,
}

impl ErrorSummary {
    pub fn count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy)]
struct FileTally {
    count: usize,
    /// Order in which the file first failed; breaks ties between equally bad files
    first_seen: usize,
}

#[derive(Debug, Default)]
struct TrackerInner {
    records: Vec<ErrorRecord>,
    by_severity: BTreeMap<Severity, usize>,
    by_step: BTreeMap<String, usize>,
    by_file: HashMap<PathBuf, FileTally>,
}

/// Append-only, thread-safe collector of [`ErrorRecord`]s.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    inner: Mutex<TrackerInner>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&self, record: ErrorRecord) {
        debug!("Recording {}", record);
        let mut inner = self.inner.lock();

        *inner.by_severity.entry(record.severity).or_insert(0) += 1;
        if let Some(step) = &record.step_name {
            *inner.by_step.entry(step.clone()).or_insert(0) += 1;
        }
        let first_seen = inner.by_file.len();
        inner
            .by_file
            .entry(record.path.clone())
            .or_insert(FileTally { count: 0, first_seen })
            .count += 1;
        inner.records.push(record);
    }

    pub fn summary(&self) -> ErrorSummary {
        let inner = self.inner.lock();

        let mut by_severity = BTreeMap::new();
        for severity in Severity::ALL {
            by_severity.insert(severity, inner.by_severity.get(&severity).copied().unwrap_or(0));
        }

        let most_problematic_file = inner
            .by_file
            .iter()
            .max_by(|(_, a), (_, b)| a.count.cmp(&b.count).then(b.first_seen.cmp(&a.first_seen)))
            .map(|(path, tally)| FileErrorCount {
                path: path.clone(),
                count: tally.count,
            });

        ErrorSummary {
            total: inner.records.len(),
            by_severity,
            by_step: inner.by_step.clone(),
            files_with_errors: inner.by_file.len(),
            most_problematic_file,
        }
    }

    pub fn has_critical(&self) -> bool {
        self.inner.lock().by_severity.get(&Severity::Critical).copied().unwrap_or(0) > 0
    }

    /// True if any ERROR or CRITICAL record exists.
    pub fn has_errors(&self) -> bool {
        let inner = self.inner.lock();
        [Severity::Error, Severity::Critical]
            .iter()
            .any(|s| inner.by_severity.get(s).copied().unwrap_or(0) > 0)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every record in insertion order.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.inner.lock().records.clone()
    }

    pub fn records_with(&self, severity: Severity) -> Vec<ErrorRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.severity == severity)
            .cloned()
            .collect()
    }

    pub fn errors_for(&self, path: &Path) -> usize {
        self.inner.lock().by_file.get(path).map(|t| t.count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::utils::TransformError;

    fn record(path: &str, severity: Severity) -> ErrorRecord {
        ErrorRecord::new(path, ErrorKind::Io, "failed", severity).with_step("io")
    }

    #[test]
    fn severity_buckets() {
        let tracker = ErrorTracker::new();
        tracker.add_error(record("a.png", Severity::Warning));
        tracker.add_error(record("b.png", Severity::Error));
        tracker.add_error(record("c.png", Severity::Error));
        tracker.add_error(record("vol.cbz", Severity::Critical));

        assert!(tracker.has_critical());
        assert!(tracker.has_errors());

        let summary = tracker.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.count(Severity::Warning), 1);
        assert_eq!(summary.count(Severity::Error), 2);
        assert_eq!(summary.count(Severity::Critical), 1);
        assert_eq!(summary.files_with_errors, 4);
    }

    #[test]
    fn warnings_alone_are_not_errors() {
        let tracker = ErrorTracker::new();
        tracker.add_error(record("a.png", Severity::Warning));
        assert!(!tracker.has_errors());
        assert!(!tracker.has_critical());
        assert_eq!(tracker.records_with(Severity::Warning).len(), 1);
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let tracker = Arc::new(ErrorTracker::new());
        let writers = 8;
        let per_writer = 250;

        std::thread::scope(|scope| {
            for w in 0..writers {
                let tracker = Arc::clone(&tracker);
                scope.spawn(move || {
                    for i in 0..per_writer {
                        let severity = Severity::ALL[(w + i) % 3];
                        tracker.add_error(record(&format!("w{}/{}.png", w, i % 10), severity));
                        // interleave reads with writes
                        let summary = tracker.summary();
                        assert_eq!(summary.total, summary.by_severity.values().sum::<usize>());
                    }
                });
            }
        });

        let summary = tracker.summary();
        assert_eq!(summary.total, writers * per_writer);
        assert_eq!(summary.by_severity.values().sum::<usize>(), writers * per_writer);
        assert_eq!(summary.by_step.get("io"), Some(&(writers * per_writer)));
        assert_eq!(summary.files_with_errors, writers * 10);
    }

    #[test]
    fn most_problematic_file_prefers_earliest_on_tie() {
        let tracker = ErrorTracker::new();
        tracker.add_error(record("b.png", Severity::Error));
        tracker.add_error(record("a.png", Severity::Error));
        tracker.add_error(record("a.png", Severity::Error));
        tracker.add_error(record("b.png", Severity::Error));

        let worst = tracker.summary().most_problematic_file.unwrap();
        assert_eq!(worst.path, PathBuf::from("b.png"));
        assert_eq!(worst.count, 2);

        tracker.add_error(record("a.png", Severity::Warning));
        let worst = tracker.summary().most_problematic_file.unwrap();
        assert_eq!(worst.path, PathBuf::from("a.png"));
        assert_eq!(worst.count, 3);
    }

    #[test]
    fn failure_records_count_retries_and_step() {
        let err = PressError::RetryExhausted {
            last_cause: Box::new(PressError::Transform(
                TransformError::transient("flaky").with_step("contrast"),
            )),
            attempts: 4,
        };
        let rec = ErrorRecord::from_failure("p3.png", &err, 4);
        assert_eq!(rec.retry_count, 3);
        assert_eq!(rec.severity, Severity::Error);
        assert_eq!(rec.error_kind, ErrorKind::Transform);
        assert_eq!(rec.step_name.as_deref(), Some("contrast"));
        assert_eq!(
            rec.to_string(),
            "[ERROR] TransformError: step 'contrast' failed: flaky (step: contrast) - p3.png (retries: 3)"
        );
    }

    #[test]
    fn empty_tracker_summary() {
        let summary = ErrorTracker::new().summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.most_problematic_file, None);
        assert_eq!(summary.count(Severity::Critical), 0);
    }
}
