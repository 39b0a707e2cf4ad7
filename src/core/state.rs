//! Per-item lifecycle and shared run state.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use crate::core::AbortCause;

/// Lifecycle of a single work item.
///
/// `Pending -> Running -> (Retrying -> Running)* -> Success | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemState {
    Pending,
    Running,
    Retrying,
    Success,
    Failed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal item transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ItemState,
    pub to: ItemState,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn can_transition_to(self, next: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Retrying)
                | (Running, Success)
                | (Running, Failed)
                | (Retrying, Running)
        )
    }

    pub fn transition(self, next: ItemState) -> Result<ItemState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}

/// Tracks one item's state from concurrent callbacks within its worker.
#[derive(Debug)]
pub struct ItemLifecycle {
    state: Mutex<ItemState>,
}

impl ItemLifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ItemState::Pending),
        }
    }

    pub fn advance(&self, next: ItemState) -> Result<ItemState, InvalidTransition> {
        let mut state = self.state.lock();
        *state = state.transition(next)?;
        Ok(*state)
    }

    pub fn current(&self) -> ItemState {
        *self.state.lock()
    }
}

impl Default for ItemLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters and the abort flag shared by the dispatcher and every worker.
#[derive(Debug, Default)]
pub struct RunState {
    aborted: AtomicBool,
    abort_cause: Mutex<Option<AbortCause>>,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    skipped_sources: AtomicUsize,
    archives_written: AtomicUsize,
    archives_discarded: AtomicUsize,
    archives_failed: AtomicUsize,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop further dispatch. Only the first cause is kept; returns whether this call set it.
    pub fn abort(&self, path: &Path, message: impl Into<String>) -> bool {
        let mut cause = self.abort_cause.lock();
        if cause.is_some() {
            return false;
        }
        *cause = Some(AbortCause {
            path: path.to_path_buf(),
            message: message.into(),
        });
        self.aborted.store(true, Ordering::SeqCst);
        debug!("Run aborted by failure of {}", path.display());
        true
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn abort_cause(&self) -> Option<AbortCause> {
        self.abort_cause.lock().clone()
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, count: usize) {
        self.skipped.fetch_add(count, Ordering::Relaxed);
    }

    /// Archives or directories never opened, so their member count is unknown.
    pub fn record_skipped_sources(&self, count: usize) {
        self.skipped_sources.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_archive_written(&self) {
        self.archives_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_archive_discarded(&self) {
        self.archives_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_archive_failed(&self) {
        self.archives_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn skipped_sources(&self) -> usize {
        self.skipped_sources.load(Ordering::Relaxed)
    }

    pub fn archives_written(&self) -> usize {
        self.archives_written.load(Ordering::Relaxed)
    }

    pub fn archives_discarded(&self) -> usize {
        self.archives_discarded.load(Ordering::Relaxed)
    }

    pub fn archives_failed(&self) -> usize {
        self.archives_failed.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Items that reached a terminal state so far.
    pub fn completed(&self) -> usize {
        self.succeeded() + self.failed()
    }
}
