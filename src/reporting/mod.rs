mod tracker;
mod reporter;

pub use tracker::{ErrorRecord, ErrorSummary, ErrorTracker, FileErrorCount, Severity};
pub use reporter::{SummaryReporter, DEFAULT_DETAIL_LIMIT};
