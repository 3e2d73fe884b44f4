//! Checkpointed multi-keyword batch
//!
//! Per keyword: `Pending → Reused | Fetching → Completed`, or `Failed`.
//! The checkpoint is saved after every keyword that reaches a terminal
//! state and is the only record of progress; cached artifacts never count
//! as completion on their own.
//!
//! Keywords with flushed but unfinished fetches are listed under
//! `partial_keywords` in the checkpoint metadata. A partial keyword is
//! re-fetched on resume and its first flush replaces the stale artifact.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use keyharvest_core::{Delay, ProgressContext, Record, RecordSet, ThreadSleep, shutdown_flag};
use keyharvest_store::{CacheBackend, CacheError, CacheKey, CheckpointStore, Metadata};
use serde_json::json;

use crate::adapter::SourceAdapter;
use crate::report::{BatchError, BatchReport, KeyOutcome, KeyStatus};

/// Records buffered before an incremental flush to the cache.
pub const DEFAULT_FLUSH_INTERVAL: usize = 50;

static THREAD_SLEEP: ThreadSleep = ThreadSleep;

/// Drives one session over a list of keywords.
///
/// Sequential by design: one keyword at a time, one runner per
/// (session, platform). Nothing here locks against a second process.
pub struct BatchRunner<'a> {
    cache: &'a dyn CacheBackend,
    checkpoints: &'a dyn CheckpointStore,
    adapter: &'a dyn SourceAdapter,
    delay: &'a dyn Delay,
    stop: &'a AtomicBool,
    flush_interval: usize,
    progress: Option<&'a ProgressContext>,
}

impl<'a> BatchRunner<'a> {
    /// Real sleeps and the process-wide shutdown flag by default.
    pub fn new(
        cache: &'a dyn CacheBackend,
        checkpoints: &'a dyn CheckpointStore,
        adapter: &'a dyn SourceAdapter,
    ) -> Self {
        Self {
            cache,
            checkpoints,
            adapter,
            delay: &THREAD_SLEEP,
            stop: shutdown_flag(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            progress: None,
        }
    }

    pub fn with_delay(mut self, delay: &'a dyn Delay) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_stop_flag(mut self, stop: &'a AtomicBool) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_flush_interval(mut self, records: usize) -> Self {
        self.flush_interval = records.max(1);
        self
    }

    pub fn with_progress(mut self, progress: &'a ProgressContext) -> Self {
        self.progress = Some(progress);
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Process every keyword not yet completed in the session's checkpoint.
    ///
    /// Individual keyword failures are reported, never returned. Only an
    /// unreadable or unwritable checkpoint aborts the run.
    pub fn run<K>(
        &self,
        session: &str,
        platform: &str,
        keywords: K,
        max_records_per_key: usize,
        pacing: Duration,
    ) -> Result<BatchReport, BatchError>
    where
        K: IntoIterator,
        K::Item: Into<String>,
    {
        let started = Instant::now();

        let mut requested: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.into();
            if !requested.contains(&keyword) {
                requested.push(keyword);
            }
        }

        let checkpoint = self.checkpoints.load(session, platform)?;
        let mut state = RunState {
            session: session.to_string(),
            platform: platform.to_string(),
            checkpoint_exists: checkpoint.is_some(),
            completed: Vec::new(),
            partial: Vec::new(),
            failed: Vec::new(),
            reused: Vec::new(),
            total_records: 0,
            requested,
        };
        if let Some(cp) = checkpoint {
            state.partial = cp.metadata_list("partial_keywords");
            state.completed = cp.completed_keywords;
        }

        let pending: Vec<String> = state
            .requested
            .iter()
            .filter(|k| !state.completed.contains(*k))
            .cloned()
            .collect();
        let already_completed = state.requested.len() - pending.len();
        log::info!(
            "{session}: {} keywords, {already_completed} already completed, {} to process",
            state.requested.len(),
            pending.len()
        );

        let bar = match self.progress {
            Some(progress) => progress.key_bar(session, pending.len()),
            None => ProgressBar::hidden(),
        };

        let mut outcomes = Vec::with_capacity(pending.len());
        let mut interrupted = false;
        for (idx, keyword) in pending.iter().enumerate() {
            if self.stop_requested() {
                log::warn!(
                    "{session}: stop requested, {} keywords left for the next run",
                    pending.len() - idx
                );
                interrupted = true;
                break;
            }
            bar.set_message(keyword.clone());

            let outcome = self.process_key(&mut state, keyword, max_records_per_key)?;
            if outcome.status.is_completed() {
                if outcome.status == KeyStatus::Reused {
                    state.reused.push(keyword.clone());
                }
                state.completed.push(keyword.clone());
                state.partial.retain(|k| k != keyword);
                state.total_records += outcome.records;
                self.save(&mut state)?;
            } else {
                state.failed.push(keyword.clone());
                if state.checkpoint_exists {
                    self.save(&mut state)?;
                }
            }
            bar.inc(1);
            outcomes.push(outcome);

            let is_last = idx + 1 == pending.len();
            if !is_last && !pacing.is_zero() {
                if self.stop_requested() {
                    interrupted = true;
                    log::warn!(
                        "{session}: stop requested, {} keywords left for the next run",
                        pending.len() - idx - 1
                    );
                    break;
                }
                log::debug!("pausing {:.1}s before next keyword", pacing.as_secs_f64());
                self.delay.sleep(pacing);
            }
        }
        bar.finish_and_clear();

        let report = BatchReport {
            session: state.session,
            platform: state.platform,
            total_keys: state.requested.len(),
            already_completed,
            newly_processed: outcomes.len(),
            reused: state.reused,
            failed: state.failed,
            total_records: state.total_records,
            completed_keywords: state.completed,
            outcomes,
            interrupted,
            elapsed: started.elapsed(),
        };
        log::info!(
            "{session}: {} processed, {} failed, {} records in {:.1}s",
            report.newly_processed,
            report.failed.len(),
            report.total_records,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    fn save(&self, state: &mut RunState) -> Result<(), BatchError> {
        self.checkpoints.save(
            &state.session,
            &state.platform,
            &state.completed,
            state.metadata(),
        )?;
        state.checkpoint_exists = true;
        Ok(())
    }

    /// Reuse, fetch or fail one keyword. `Err` only for checkpoint failures.
    fn process_key(
        &self,
        state: &mut RunState,
        keyword: &str,
        max_records: usize,
    ) -> Result<KeyOutcome, BatchError> {
        let dedup_field = self.adapter.dedup_field();
        let key = self.cache.key(&state.platform, keyword);
        let stale = state.partial.iter().any(|k| k == keyword);

        if stale {
            log::info!("{keyword}: previous fetch was interrupted, fetching again");
        } else {
            match self.cache.read(&key, dedup_field) {
                Ok(Some(cached)) if !cached.is_empty() => {
                    log::info!("{keyword}: cached ({} records), reusing", cached.len());
                    return Ok(KeyOutcome::completed(keyword, KeyStatus::Reused, cached.len()));
                }
                Ok(_) => {}
                Err(e) => log::warn!("{keyword}: {e}; treating as cache miss"),
            }
        }

        log::info!("{keyword}: fetching up to {max_records} records");
        let mut flusher = Flusher {
            runner: self,
            key: &key,
            keyword,
            buffer: RecordSet::new(dedup_field),
            replace: stale,
            fetched: 0,
            stored: 0,
        };
        let mut failure: Option<FlushError> = None;
        let result = self.adapter.fetch_pages(keyword, max_records, &mut |page| {
            flusher.accept(page, max_records);
            let full = flusher.fetched >= max_records;
            if full || flusher.buffer.len() >= self.flush_interval {
                if let Err(e) = flusher.flush(state) {
                    failure = Some(e);
                    return ControlFlow::Break(());
                }
            }
            if full {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        if let Some(err) = failure {
            return err.into_outcome(keyword);
        }
        if let Err(e) = result {
            log::error!("{keyword}: {e}");
            return Ok(KeyOutcome::failed(keyword, e));
        }
        if let Err(err) = flusher.flush(state) {
            return err.into_outcome(keyword);
        }

        if flusher.fetched == 0 {
            if stale {
                let empty = RecordSet::new(dedup_field);
                if let Err(e) = self.cache.write(&key, &empty) {
                    return FlushError::Persist(e).into_outcome(keyword);
                }
            }
            log::info!("{keyword}: no results");
            return Ok(KeyOutcome::completed(keyword, KeyStatus::Empty, 0));
        }

        log::info!(
            "{keyword}: {} fetched, {} stored",
            flusher.fetched,
            flusher.stored
        );
        Ok(KeyOutcome::completed(keyword, KeyStatus::Fetched, flusher.stored))
    }
}

/// Mutable progress of one run, mirrored into the checkpoint on every save.
struct RunState {
    session: String,
    platform: String,
    requested: Vec<String>,
    completed: Vec<String>,
    partial: Vec<String>,
    failed: Vec<String>,
    reused: Vec<String>,
    total_records: usize,
    checkpoint_exists: bool,
}

impl RunState {
    fn metadata(&self) -> Metadata {
        let remaining = self
            .requested
            .iter()
            .filter(|k| !self.completed.contains(*k))
            .count();
        let mut meta = Metadata::new();
        meta.insert("total_keywords".into(), json!(self.requested.len()));
        meta.insert("remaining_keywords".into(), json!(remaining));
        meta.insert("total_records".into(), json!(self.total_records));
        meta.insert("failed_keywords".into(), json!(self.failed));
        meta.insert("reused_keywords".into(), json!(self.reused));
        meta.insert("partial_keywords".into(), json!(self.partial));
        meta
    }
}

enum FlushError {
    /// The cache rejected the write; the keyword fails.
    Persist(CacheError),
    /// Marking the keyword partial failed; the run aborts.
    Fatal(BatchError),
}

impl FlushError {
    fn into_outcome(self, keyword: &str) -> Result<KeyOutcome, BatchError> {
        match self {
            Self::Persist(e) => {
                log::error!("{keyword}: cannot persist records: {e}");
                Ok(KeyOutcome::failed(keyword, e))
            }
            Self::Fatal(e) => Err(e),
        }
    }
}

/// Buffers pages of one keyword and writes them through the cache.
struct Flusher<'r, 'a> {
    runner: &'r BatchRunner<'a>,
    key: &'r CacheKey,
    keyword: &'r str,
    buffer: RecordSet,
    /// Next flush replaces the artifact instead of appending to it.
    replace: bool,
    fetched: usize,
    /// Records in the artifact after the last flush.
    stored: usize,
}

impl Flusher<'_, '_> {
    /// Buffer a page, dropping records past `max_records`.
    fn accept(&mut self, page: RecordSet, max_records: usize) {
        let room = max_records.saturating_sub(self.fetched);
        let records: Vec<Record> = page.into_records().into_iter().take(room).collect();
        self.fetched += records.len();
        for record in records {
            self.buffer.push(record);
        }
    }

    fn flush(&mut self, state: &mut RunState) -> Result<(), FlushError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if !state.partial.iter().any(|k| k == self.keyword) {
            state.partial.push(self.keyword.to_string());
            self.runner.save(state).map_err(FlushError::Fatal)?;
        }

        let dedup_field = self.buffer.dedup_field().to_string();
        let mut batch = std::mem::replace(&mut self.buffer, RecordSet::new(dedup_field));
        let pending = batch.len();
        self.stored = if self.replace {
            batch.dedup();
            self.runner
                .cache
                .write(self.key, &batch)
                .map_err(FlushError::Persist)?;
            self.replace = false;
            batch.len()
        } else {
            self.runner
                .cache
                .append(self.key, batch)
                .map_err(FlushError::Persist)?
        };
        log::debug!(
            "{}: flushed {pending} records, {} stored",
            self.keyword,
            self.stored
        );
        Ok(())
    }
}
