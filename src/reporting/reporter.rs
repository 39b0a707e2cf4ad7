use std::fmt;
use crate::core::BatchReport;
use super::tracker::{ErrorRecord, Severity};

/// Records listed by default in verbose mode.
pub const DEFAULT_DETAIL_LIMIT: usize = 5;

/// Renders the end-of-run summary.
pub struct SummaryReporter<'a> {
    report: &'a BatchReport,
    records: Vec<ErrorRecord>,
    detail_limit: usize,
}

impl<'a> SummaryReporter<'a> {
    pub fn new(report: &'a BatchReport) -> Self {
        Self {
            report,
            records: Vec::new(),
            detail_limit: 0,
        }
    }

    /// Also list the first `limit` individual records.
    pub fn with_details(mut self, records: Vec<ErrorRecord>, limit: usize) -> Self {
        self.records = records;
        self.detail_limit = limit;
        self
    }

    fn safe_div(numerator: f64, denominator: f64) -> f64 {
        if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.2} GB", Self::safe_div(bytes as f64, GB as f64))
        } else if bytes >= MB {
            format!("{:.2} MB", Self::safe_div(bytes as f64, MB as f64))
        } else if bytes >= KB {
            format!("{:.2} KB", Self::safe_div(bytes as f64, KB as f64))
        } else {
            format!("{} B", bytes)
        }
    }

    fn items_per_second(&self) -> f64 {
        Self::safe_div(
            (self.report.succeeded + self.report.failed) as f64,
            self.report.elapsed.as_secs_f64(),
        )
    }
}

impl fmt::Display for SummaryReporter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let summary = &report.summary;

        writeln!(f, "=== Batch Summary ===")?;
        if report.dry_run {
            writeln!(f, "Dry run: {} items found, nothing written", report.total_items)?;
            return Ok(());
        }
        writeln!(f)?;

        writeln!(f, "Items:")?;
        writeln!(f, "- Total: {}", report.total_items)?;
        writeln!(f, "- Succeeded: {}", report.succeeded)?;
        writeln!(f, "- Failed: {}", report.failed)?;
        if report.skipped > 0 {
            writeln!(f, "- Skipped: {}", report.skipped)?;
        }
        if report.skipped_sources > 0 {
            writeln!(f, "- Archives not opened: {}", report.skipped_sources)?;
        }
        if report.archives_written + report.archives_discarded + report.archives_failed > 0 {
            writeln!(f, "- Archives written: {}", report.archives_written)?;
            if report.archives_discarded > 0 {
                writeln!(f, "- Archives discarded: {}", report.archives_discarded)?;
            }
            if report.archives_failed > 0 {
                writeln!(f, "- Archives failed: {}", report.archives_failed)?;
            }
        }
        writeln!(f)?;

        writeln!(f, "Throughput:")?;
        writeln!(f, "- Elapsed: {:.2}s", report.elapsed.as_secs_f64())?;
        writeln!(f, "- Items/s: {:.2}", self.items_per_second())?;
        writeln!(f, "- Read: {}", Self::format_bytes(report.bytes_read))?;
        writeln!(f, "- Written: {}", Self::format_bytes(report.bytes_written))?;
        writeln!(f)?;

        if let Some(cause) = &report.aborted {
            writeln!(f, "Aborted after failure of {}: {}", cause.path.display(), cause.message)?;
            writeln!(f)?;
        }

        if summary.total == 0 {
            writeln!(f, "No errors recorded.")?;
            return Ok(());
        }

        writeln!(f, "Errors: {}", summary.total)?;
        for severity in Severity::ALL {
            writeln!(f, "  └── {}: {}", severity, summary.count(severity))?;
        }
        if !summary.by_step.is_empty() {
            writeln!(f, "By step:")?;
            for (step, count) in &summary.by_step {
                writeln!(f, "  └── {}: {}", step, count)?;
            }
        }
        writeln!(f, "Files with errors: {}", summary.files_with_errors)?;
        if let Some(worst) = &summary.most_problematic_file {
            writeln!(f, "Most problematic: {} ({} errors)", worst.path.display(), worst.count)?;
        }

        if self.detail_limit > 0 && !self.records.is_empty() {
            writeln!(f)?;
            let shown = self.records.len().min(self.detail_limit);
            writeln!(f, "First {} of {} records:", shown, self.records.len())?;
            for record in self.records.iter().take(shown) {
                writeln!(f, "  {}", record)?;
            }
        }

        Ok(())
    }
}
