use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use crate::core::{
    ArchiveId, BatchConfig, BatchReport, ExitStatus, ItemLifecycle, ItemOutcome, ItemState, LogLevel,
    ProgressSink, RunState, WorkItem,
};
use crate::processing::batch::assembler::{ArchiveAssembly, CompletedArchive};
use crate::processing::batch::discovery::{Discovery, Source, SourceKind, discover};
use crate::processing::{Pipeline, archive};
use crate::reporting::{ErrorRecord, ErrorTracker, Severity};
use crate::utils::{ErrorKind, PressError, PressResult, validate_config};
use crate::worker::{Attempted, ImageTask, ItemOutput, Produced, RetryError, RetryExecutor, WorkerPool};

/// Everything a worker needs, shared read-only across the run.
struct JobContext {
    pipeline: Arc<Pipeline>,
    retry: RetryExecutor,
    quality: u8,
    continue_on_error: bool,
    sink: Arc<dyn ProgressSink>,
    tracker: Arc<ErrorTracker>,
    state: RunState,
    /// Archives completed by a member whose worker panicked; written after the pool drains
    orphaned: Mutex<Vec<(Arc<ArchiveAssembly>, CompletedArchive)>>,
}

impl JobContext {
    /// Record a terminal failure and, under stop-on-error, stop dispatch.
    fn fail(&self, path: &Path, error: &PressError, attempts: u32) -> ErrorRecord {
        let record = ErrorRecord::from_failure(path, error, attempts);
        self.tracker.add_error(record.clone());
        if !self.continue_on_error && self.state.abort(path, error.to_string()) {
            self.sink.log(
                &format!("Stopping after failure of {}: {}", path.display(), error),
                LogLevel::Error,
            );
        }
        record
    }
}

/// Unwrap a retry failure into the error that gets recorded.
fn terminal_error(err: RetryError<PressError>) -> (PressError, u32) {
    match err {
        RetryError::Exhausted { last_cause, attempt_count } => (
            PressError::RetryExhausted {
                last_cause: Box::new(last_cause),
                attempts: attempt_count,
            },
            attempt_count,
        ),
        RetryError::Permanent { cause, attempt_count } => (cause, attempt_count),
    }
}

/// A member's slot in its archive. Dropping it unsettled, e.g. while a
/// panicking worker unwinds, resolves the slot as failed.
struct MemberSlot {
    ctx: Arc<JobContext>,
    assembly: Arc<ArchiveAssembly>,
    position: usize,
    settled: bool,
}

impl MemberSlot {
    fn settle(&mut self, data: Option<Vec<u8>>) -> Option<CompletedArchive> {
        self.settled = true;
        self.assembly.complete(self.position, data)
    }
}

impl Drop for MemberSlot {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!("{} member {} ended without a result", self.assembly.source.display(), self.position);
        if let Some(completed) = self.assembly.complete(self.position, None) {
            self.ctx.orphaned.lock().push((Arc::clone(&self.assembly), completed));
        }
    }
}

fn advance(lifecycle: &ItemLifecycle, next: ItemState, path: &Path) {
    if let Err(e) = lifecycle.advance(next) {
        warn!("{} for {}", e, path.display());
    }
}

/// Convert one item: retry the attempt, record the outcome, and hand
/// archive members to their assembly.
async fn run_item(ctx: Arc<JobContext>, task: ImageTask) {
    let mut slot = match (&task.output, task.item.position_in_archive()) {
        (ItemOutput::Archive(assembly), Some(position)) => Some(MemberSlot {
            ctx: Arc::clone(&ctx),
            assembly: Arc::clone(assembly),
            position,
            settled: false,
        }),
        _ => None,
    };
    let path = task.item.display_path();
    let lifecycle = ItemLifecycle::new();
    ctx.sink.on_item_start(&path);
    advance(&lifecycle, ItemState::Running, &path);

    let result = ctx
        .retry
        .run_with_hook(
            |attempt| {
                if attempt > 1 {
                    advance(&lifecycle, ItemState::Running, &path);
                }
                task.attempt(Arc::clone(&ctx.pipeline), ctx.quality)
            },
            PressError::is_transient,
            |attempt, delay, err| {
                advance(&lifecycle, ItemState::Retrying, &path);
                ctx.sink.log(
                    &format!("{} failed on attempt {} ({}), retrying in {:?}", path.display(), attempt, err, delay),
                    LogLevel::Warning,
                );
            },
        )
        .await;

    let member_result = match result {
        Ok(Attempted { value, attempt_count }) => {
            advance(&lifecycle, ItemState::Success, &path);
            ctx.state.record_success();
            ctx.sink.on_item_done(&path, &ItemOutcome::Succeeded { attempts: attempt_count });
            match value {
                Produced::Written { bytes_in, bytes_out } => {
                    ctx.state.add_bytes_read(bytes_in);
                    ctx.state.add_bytes_written(bytes_out);
                    None
                }
                Produced::Encoded { bytes_in, data } => {
                    ctx.state.add_bytes_read(bytes_in);
                    Some(data)
                }
            }
        }
        Err(err) => {
            let (error, attempts) = terminal_error(err);
            advance(&lifecycle, ItemState::Failed, &path);
            ctx.state.record_failure();
            let record = ctx.fail(&path, &error, attempts);
            ctx.sink.on_item_done(
                &path,
                &ItemOutcome::Failed {
                    severity: record.severity,
                    message: record.message,
                    attempts,
                },
            );
            None
        }
    };

    if let Some(slot) = slot.as_mut() {
        if let Some(completed) = slot.settle(member_result) {
            finalize_archive(&ctx, &slot.assembly, completed).await;
        }
    }
}

/// Write a fully resolved archive, or discard it when stop-on-error saw a failed member.
async fn finalize_archive(ctx: &JobContext, assembly: &ArchiveAssembly, completed: CompletedArchive) {
    let source = &assembly.source;
    if completed.failed > 0 && !ctx.continue_on_error {
        ctx.state.record_archive_discarded();
        ctx.sink.log(
            &format!(
                "Not writing {}: {} of {} members failed",
                assembly.destination.display(),
                completed.failed,
                assembly.len()
            ),
            LogLevel::Warning,
        );
        return;
    }
    if completed.entries.is_empty() {
        ctx.state.record_archive_discarded();
        ctx.sink.log(
            &format!("Not writing {}: every member failed", assembly.destination.display()),
            LogLevel::Warning,
        );
        return;
    }

    let destination = assembly.destination.clone();
    let entries = Arc::new(completed.entries);
    let level = ctx.quality;
    let written = ctx
        .retry
        .run(
            |_| {
                let destination = destination.clone();
                let entries = Arc::clone(&entries);
                async move {
                    tokio::task::spawn_blocking(move || archive::write_archive(&destination, &entries, level)).await?
                }
            },
            PressError::is_transient,
        )
        .await;

    match written {
        Ok(Attempted { value: size, .. }) => {
            ctx.state.record_archive_written();
            ctx.state.add_bytes_written(size);
            ctx.sink.log(
                &format!(
                    "Wrote {} ({} of {} members)",
                    destination.display(),
                    entries.len(),
                    assembly.len()
                ),
                LogLevel::Info,
            );
        }
        Err(err) => {
            let (error, attempts) = terminal_error(err);
            ctx.state.record_archive_failed();
            let record = ctx.fail(source, &error, attempts);
            ctx.sink.log(&record.to_string(), LogLevel::Error);
        }
    }
}

/// Drives one batch: enumerate, dispatch to the worker pool, collect results.
pub struct BatchDriver {
    config: BatchConfig,
    sink: Arc<dyn ProgressSink>,
    tracker: Arc<ErrorTracker>,
}

impl BatchDriver {
    pub fn new(config: BatchConfig, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            config,
            sink,
            tracker: Arc::new(ErrorTracker::new()),
        }
    }

    /// Share an externally owned tracker, e.g. to inspect records afterwards.
    pub fn with_tracker(mut self, tracker: Arc<ErrorTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &Arc<ErrorTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run the batch.
    ///
    /// Fails only on invalid configuration, before anything is read. Item,
    /// archive and abort outcomes are reported in the returned [`BatchReport`].
    pub async fn run(&self) -> PressResult<BatchReport> {
        validate_config(&self.config)?;
        let pipeline = Arc::new(self.config.effective_pipeline()?);
        let started = Instant::now();

        info!(
            "Processing {} -> {} with {} ({} workers)",
            self.config.src_root.display(),
            self.config.dest_root.display(),
            pipeline,
            self.config.worker_count
        );

        let discovery = discover(&self.config.src_root, &self.config.dest_root, self.config.pack_directories);
        for warning in &discovery.warnings {
            self.sink.log(&warning.to_string(), LogLevel::Warning);
            self.tracker.add_error(warning.clone());
        }

        let ctx = Arc::new(JobContext {
            pipeline,
            retry: RetryExecutor::new(self.config.retry_policy()),
            quality: self.config.quality,
            continue_on_error: self.config.continue_on_error,
            sink: Arc::clone(&self.sink),
            tracker: Arc::clone(&self.tracker),
            state: RunState::new(),
            orphaned: Mutex::new(Vec::new()),
        });

        if self.config.dry_run {
            return Ok(self.dry_run(&ctx, &discovery, started));
        }

        let mut pool = WorkerPool::new(self.config.worker_count);
        let mut total_items = 0;

        let mut sources = discovery.sources.into_iter().enumerate();
        while let Some((index, source)) = sources.next() {
            if ctx.state.is_aborted() {
                let unstarted = std::iter::once(source).chain(sources.by_ref().map(|(_, s)| s));
                total_items += Self::skip_unstarted(&ctx, unstarted);
                break;
            }

            match source.kind {
                SourceKind::Image => {
                    total_items += 1;
                    self.sink.on_items_discovered(1);
                    let slot = pool.reserve().await?;
                    if ctx.state.is_aborted() {
                        drop(slot);
                        ctx.state.record_skipped(1);
                        continue;
                    }
                    let task = ImageTask::loose(source.path, source.destination);
                    pool.spawn(slot, run_item(Arc::clone(&ctx), task));
                }
                SourceKind::Archive | SourceKind::Directory => {
                    let id = ArchiveId(index);
                    total_items += self.dispatch_container(&ctx, &mut pool, source, id).await?;
                }
            }
        }

        for failure in pool.join().await {
            ctx.state.record_failure();
            ctx.tracker.add_error(
                ErrorRecord::new(&self.config.src_root, ErrorKind::Worker, failure.to_string(), Severity::Error)
                    .with_step("worker"),
            );
        }
        let orphaned = std::mem::take(&mut *ctx.orphaned.lock());
        for (assembly, completed) in orphaned {
            finalize_archive(&ctx, &assembly, completed).await;
        }

        Ok(self.finish(&ctx, total_items, started, false))
    }

    /// Account for sources left undispatched after an abort. Loose images
    /// count as skipped items. Archives and directories were never opened, so
    /// they count as skipped sources. Returns the number of items added.
    fn skip_unstarted(ctx: &JobContext, sources: impl Iterator<Item = Source>) -> usize {
        let (mut images, mut containers) = (0, 0);
        for source in sources {
            match source.kind {
                SourceKind::Image => images += 1,
                SourceKind::Archive | SourceKind::Directory => containers += 1,
            }
        }
        ctx.state.record_skipped(images);
        ctx.state.record_skipped_sources(containers);
        info!(
            "Dispatch stopped, {} images and {} archives left unprocessed",
            images, containers
        );
        images
    }

    /// Expand an archive or directory into member items and dispatch them.
    /// Returns the number of work items it accounted for.
    async fn dispatch_container(
        &self,
        ctx: &Arc<JobContext>,
        pool: &mut WorkerPool,
        source: Source,
        id: ArchiveId,
    ) -> PressResult<usize> {
        let path = source.path.clone();
        let kind = source.kind;
        let extracted = ctx
            .retry
            .run(
                |_| {
                    let path = path.clone();
                    async move {
                        tokio::task::spawn_blocking(move || match kind {
                            SourceKind::Directory => archive::read_directory(&path),
                            _ => archive::read_archive(&path),
                        })
                        .await?
                    }
                },
                PressError::is_transient,
            )
            .await;

        let entries = match extracted {
            Ok(attempted) => attempted.value,
            Err(err) => {
                let (error, attempts) = terminal_error(err);
                ctx.state.record_failure();
                let record = ctx.fail(&path, &error, attempts);
                self.sink.on_items_discovered(1);
                self.sink.on_item_done(
                    &path,
                    &ItemOutcome::Failed {
                        severity: record.severity,
                        message: record.message,
                        attempts,
                    },
                );
                return Ok(1);
            }
        };

        if entries.is_empty() {
            let warning = ErrorRecord::warning(&path, ErrorKind::Archive, "archive has no members, nothing written")
                .with_step("archive");
            self.sink.log(&warning.to_string(), LogLevel::Warning);
            ctx.tracker.add_error(warning);
            return Ok(0);
        }

        let names = archive::output_names(&entries);
        let assembly = Arc::new(ArchiveAssembly::new(id, path.clone(), source.destination, names));
        let image_count = entries.iter().filter(|e| e.is_image()).count();
        debug!(
            "Expanded {} into {} members ({} images)",
            path.display(),
            entries.len(),
            image_count
        );
        self.sink.on_items_discovered(image_count);

        // Non-image members are copied through untouched and settle first.
        let mut images = Vec::with_capacity(image_count);
        for (position, entry) in entries.into_iter().enumerate() {
            if entry.is_image() {
                images.push((position, entry));
            } else if let Some(completed) = assembly.complete(position, Some(entry.data)) {
                finalize_archive(ctx, &assembly, completed).await;
            }
        }

        for (dispatched, (position, entry)) in images.into_iter().enumerate() {
            let slot = pool.reserve().await?;
            if ctx.state.is_aborted() {
                drop(slot);
                ctx.state.record_skipped(image_count - dispatched);
                if let Some(completed) = assembly.abandon_from(position) {
                    finalize_archive(ctx, &assembly, completed).await;
                }
                break;
            }
            let item = WorkItem::member(&path, id, position, entry.name);
            let task = ImageTask::member(item, entry.data, Arc::clone(&assembly));
            pool.spawn(slot, run_item(Arc::clone(ctx), task));
        }

        Ok(image_count)
    }

    fn dry_run(&self, ctx: &JobContext, discovery: &Discovery, started: Instant) -> BatchReport {
        self.sink.log(&format!("[dry-run] {}", ctx.pipeline), LogLevel::Info);
        for source in &discovery.sources {
            self.sink.log(
                &format!("[dry-run] {} -> {}", source.path.display(), source.destination.display()),
                LogLevel::Info,
            );
        }
        self.finish(ctx, discovery.sources.len(), started, true)
    }

    fn finish(&self, ctx: &JobContext, total_items: usize, started: Instant, dry_run: bool) -> BatchReport {
        let summary = self.tracker.summary();
        self.sink.on_batch_done(&summary);

        let aborted = ctx.state.abort_cause();
        let exit_status = ExitStatus::from_run(&summary, aborted.is_some());
        let state = &ctx.state;
        info!(
            "Batch finished in {:.2}s: {} succeeded, {} failed, {} skipped (exit {})",
            started.elapsed().as_secs_f64(),
            state.succeeded(),
            state.failed(),
            state.skipped(),
            exit_status.code()
        );

        BatchReport {
            total_items,
            succeeded: state.succeeded(),
            failed: state.failed(),
            skipped: state.skipped(),
            skipped_sources: state.skipped_sources(),
            archives_written: state.archives_written(),
            archives_discarded: state.archives_discarded(),
            archives_failed: state.archives_failed(),
            bytes_read: state.bytes_read(),
            bytes_written: state.bytes_written(),
            elapsed: started.elapsed(),
            dry_run,
            aborted,
            summary,
            exit_status,
        }
    }
}
