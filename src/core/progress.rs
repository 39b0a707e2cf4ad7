use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use crate::reporting::{ErrorSummary, Severity};

/// Level attached to free-form log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// How a work item ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemOutcome {
    Succeeded { attempts: u32 },
    Failed { severity: Severity, message: String, attempts: u32 },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Receives progress and log events from the batch driver.
///
/// Passed explicitly into the driver; implementations decide how (and whether)
/// anything is shown.
pub trait ProgressSink: Send + Sync {
    fn log(&self, message: &str, level: LogLevel);

    fn on_item_start(&self, path: &Path);

    fn on_item_done(&self, path: &Path, outcome: &ItemOutcome);

    fn on_batch_done(&self, summary: &ErrorSummary);

    /// More work items became known (sources enumerated or an archive expanded).
    fn on_items_discovered(&self, _count: usize) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn log(&self, _message: &str, _level: LogLevel) {}
    fn on_item_start(&self, _path: &Path) {}
    fn on_item_done(&self, _path: &Path, _outcome: &ItemOutcome) {}
    fn on_batch_done(&self, _summary: &ErrorSummary) {}
}

/// Progress message type
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ProgressType {
    Start,
    Progress,
    Complete,
    Error,
}

/// Snapshot of batch progress at one event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Progress type (start, progress, complete, error)
    pub progress_type: ProgressType,
    /// Number of items that reached a terminal state
    pub completed_tasks: usize,
    /// Number of items discovered so far
    pub total_tasks: usize,
    /// Progress percentage (0-100)
    pub progress_percentage: usize,
    /// Current status message
    pub status: String,
}

impl Progress {
    pub fn new(
        progress_type: ProgressType,
        completed_tasks: usize,
        total_tasks: usize,
        status: &str,
    ) -> Self {
        let progress_percentage = if total_tasks > 0 {
            (completed_tasks * 100) / total_tasks
        } else {
            0
        };

        Self {
            progress_type,
            completed_tasks,
            total_tasks,
            progress_percentage,
            status: status.to_string(),
        }
    }
}

/// Forwards events to `tracing`, one line per finished item.
#[derive(Debug, Default)]
pub struct TracingProgressSink {
    discovered: AtomicUsize,
    completed: AtomicUsize,
}

impl TracingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, progress_type: ProgressType, completed: usize, status: &str) -> Progress {
        Progress::new(
            progress_type,
            completed,
            self.discovered.load(Ordering::Relaxed),
            status,
        )
    }
}

impl ProgressSink for TracingProgressSink {
    fn log(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
    }

    fn on_items_discovered(&self, count: usize) {
        self.discovered.fetch_add(count, Ordering::Relaxed);
    }

    fn on_item_start(&self, path: &Path) {
        let progress = self.snapshot(
            ProgressType::Start,
            self.completed.load(Ordering::Relaxed),
            "processing",
        );
        debug!("[{}/{}] Starting {}", progress.completed_tasks, progress.total_tasks, path.display());
    }

    fn on_item_done(&self, path: &Path, outcome: &ItemOutcome) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        match outcome {
            ItemOutcome::Succeeded { attempts } => {
                let progress = self.snapshot(ProgressType::Progress, completed, "done");
                if *attempts > 1 {
                    info!(
                        "[{}/{} {}%] {} (after {} attempts)",
                        progress.completed_tasks, progress.total_tasks, progress.progress_percentage,
                        path.display(), attempts
                    );
                } else {
                    info!(
                        "[{}/{} {}%] {}",
                        progress.completed_tasks, progress.total_tasks, progress.progress_percentage,
                        path.display()
                    );
                }
            }
            ItemOutcome::Failed { severity, message, .. } => {
                let progress = self.snapshot(ProgressType::Error, completed, message);
                warn!(
                    "[{}/{} {}%] {} failed [{}]: {}",
                    progress.completed_tasks, progress.total_tasks, progress.progress_percentage,
                    path.display(), severity, progress.status
                );
            }
        }
    }

    fn on_batch_done(&self, summary: &ErrorSummary) {
        let progress = self.snapshot(
            ProgressType::Complete,
            self.completed.load(Ordering::Relaxed),
            "complete",
        );
        if summary.total == 0 {
            info!("Batch complete: {} items processed without errors", progress.completed_tasks);
        } else {
            warn!(
                "Batch complete: {} items processed, {} errors recorded",
                progress.completed_tasks, summary.total
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_handles_unknown_total() {
        assert_eq!(Progress::new(ProgressType::Progress, 3, 0, "x").progress_percentage, 0);
        assert_eq!(Progress::new(ProgressType::Progress, 3, 4, "x").progress_percentage, 75);
    }
}
