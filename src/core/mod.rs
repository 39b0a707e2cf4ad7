//! Core types shared across the crate.
//!
//! This module contains the fundamental types used throughout the application:
//! - [`BatchConfig`]: Immutable configuration for one run
//! - [`WorkItem`]: A loose image or one archive member
//! - [`ItemState`]: Per-item lifecycle
//! - [`ProgressSink`]: Injected receiver of progress events
//! - [`BatchReport`]: Result of a run

mod state;
mod types;
mod task;
mod progress;

pub use state::{InvalidTransition, ItemLifecycle, ItemState, RunState};
pub use types::{
    AbortCause, BatchConfig, BatchReport, ExitStatus, Resolution,
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_QUALITY, DEFAULT_WORKERS,
};
pub use task::{ArchiveId, ItemKind, WorkItem};
pub use progress::{
    ItemOutcome, LogLevel, NoopProgressSink, Progress, ProgressSink, ProgressType, TracingProgressSink,
};
