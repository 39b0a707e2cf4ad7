// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod reporting;
pub mod processing;
pub mod worker;
pub mod commands;

// Public exports for external consumers
pub use core::{
    BatchConfig, BatchReport, ExitStatus, ItemOutcome, LogLevel, NoopProgressSink, ProgressSink, Resolution,
    TracingProgressSink,
};
pub use processing::{BatchDriver, CustomOptions, Pipeline, PresetFactory, Step, StepKind, Transform};
pub use reporting::{ErrorRecord, ErrorSummary, ErrorTracker, Severity, SummaryReporter};
pub use utils::{PressError, PressResult, TransformError, ValidationError};
pub use worker::{RetryError, RetryExecutor, RetryPolicy};

// This library file is the public API; the command-line entry point is in main.rs.
