// Copyright 2024 Zinc Labs Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! The cooperative worker loop (`spec.md` §4.5) and termination arbiter
//! (`spec.md` §4.6), built around the read/write lock discipline of `spec.md`
//! §5.
//!
//! The original models an external executor with `resumeOn(signal)` that
//! reschedules a task when its `CompletionSignal` completes. `tokio::spawn`
//! already gives every `LoaderTask` its own persistent, rescheduled-by-the-
//! runtime slot, so this crate `.await`s the signal directly instead of
//! returning a resume request to an outer scheduler — same suspend/resume
//! behavior, no second scheduler layered on top of tokio's.

use std::sync::{atomic::{AtomicBool, Ordering}, Arc};

use log::{info, warn};
use tokio::sync::RwLock;

use crate::{
    errors::Result,
    file_iterator::{FileIterator, FileIteratorContext, FileIteratorDeque},
    partition_loader::{self, PartitionLoaderContext},
    partition_queue::PartitionQueue,
    sink::{CompletionSignal, SplitSink},
    split_factory,
};

enum LoadOutcome {
    Signal(CompletionSignal),
    /// Both queues observed empty; this task has nothing further to do
    /// (`spec.md` §4.5 `loadSplits` returning `COMPLETED`, extended here:
    /// a `LoaderTask` that sees `COMPLETED` retires rather than busy-polling
    /// drained queues forever).
    Completed,
}

/// Shared state backing every `LoaderTask` for one `loadSplits` run
/// (`spec.md` §3 "Ownership", §5).
pub struct SplitLoaderEngine {
    partitions: PartitionQueue,
    file_iterators: FileIteratorDeque,
    sink: Arc<dyn SplitSink>,
    lock: RwLock<()>,
    stopped: AtomicBool,
    /// Compare-and-set guard so `sink.no_more_splits()` is emitted at most
    /// once (`spec.md` §9: "restructure to call `noMoreSplits` outside the
    /// write section while still guaranteeing the check-then-signal is
    /// atomic, e.g. with a compare-and-set 'terminating' flag guarding the
    /// single call"). Also claimed on the first `sink.fail()` so the arbiter
    /// never fires `no_more_splits` after a failure (`spec.md` §7).
    terminating: AtomicBool,
    ctx: PartitionLoaderContext,
}

impl SplitLoaderEngine {
    pub fn new(
        partitions: impl Iterator<Item = crate::types::Partition> + Send + 'static,
        sink: Arc<dyn SplitSink>,
        ctx: PartitionLoaderContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            partitions: PartitionQueue::new(partitions),
            file_iterators: FileIteratorDeque::new(),
            sink,
            lock: RwLock::new(()),
            stopped: AtomicBool::new(false),
            terminating: AtomicBool::new(false),
            ctx,
        })
    }

    /// `spec.md` §5 "Cancellation": sets a flag tasks observe promptly.
    /// Does not itself signal `noMoreSplits`; already-enqueued splits stay
    /// valid.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// `spec.md` §4.5 `loadSplits()`. Caller holds the read lock across the
    /// whole call.
    async fn load_splits(&self) -> Result<LoadOutcome> {
        if let Some(mut iter) = self.file_iterators.poll_first() {
            loop {
                if self.is_stopped() {
                    // "Iterator is drained (or stopped); do not re-park it."
                    return Ok(LoadOutcome::Signal(CompletionSignal::Ready));
                }
                let Some(entry) = iter.next().await? else {
                    break;
                };
                if entry.is_directory {
                    if self.ctx.recursive_dir_walker_enabled {
                        self.file_iterators.add_last(FileIterator::new(
                            entry.path,
                            iter.context().clone(),
                        ));
                    }
                    continue;
                }

                let ictx: &FileIteratorContext = iter.context();
                let splittable = ictx
                    .input_format
                    .is_splittable(ictx.fs.as_ref(), &entry.path)
                    .await?;
                let blocks = ictx
                    .fs
                    .get_file_block_locations(&entry, 0, entry.len)
                    .await?;
                let split = split_factory::create(
                    &ictx.partition_name,
                    &entry.path,
                    &blocks,
                    0,
                    entry.len,
                    entry.len,
                    ictx.schema.clone(),
                    ictx.partition_keys.clone(),
                    splittable,
                    self.ctx.session,
                    None,
                    ictx.coercions.clone(),
                    ictx.path_domain.as_ref(),
                )?;

                let Some(split) = split else { continue };
                let signal = self.sink.add_to_queue(split).await;
                if !signal.is_ready() {
                    self.file_iterators.add_first(iter);
                    return Ok(LoadOutcome::Signal(signal));
                }
            }
            return Ok(LoadOutcome::Signal(CompletionSignal::Ready));
        }

        if let Some(partition) = self.partitions.poll() {
            let signal = partition_loader::load_partition(
                &partition,
                &self.ctx,
                &self.file_iterators,
                self.sink.as_ref(),
            )
            .await?;
            return Ok(LoadOutcome::Signal(signal));
        }

        Ok(LoadOutcome::Completed)
    }

    /// `spec.md` §4.6: racy check, then a confirming check under the write
    /// lock before the single idempotent terminal call. The `terminating`
    /// compare-and-set ensures exactly one of potentially many confirming
    /// peers actually calls `sink.no_more_splits()`.
    async fn maybe_signal_no_more_splits(&self) {
        if self.partitions.is_empty() && self.file_iterators.is_empty() {
            let _write_guard = self.lock.write().await;
            if self.partitions.is_empty() && self.file_iterators.is_empty() {
                let already_terminating = self
                    .terminating
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err();
                if !already_terminating {
                    self.sink.no_more_splits().await;
                }
            }
        }
    }
}

/// One `LoaderTask` invocation of `process()` (`spec.md` §4.5), looped until
/// it retires.
pub async fn run_loader_task(engine: Arc<SplitLoaderEngine>, worker_id: usize) {
    loop {
        if engine.is_stopped() {
            info!(target: "split_loader", "loader task {worker_id} stopping: stop() observed");
            return;
        }

        let outcome = {
            let _read_guard = engine.lock.read().await;
            engine.load_splits().await
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(target: "split_loader", "loader task {worker_id} failing sink: {e}");
                // Claim `terminating` so the arbiter never fires
                // `no_more_splits` after `fail` (`spec.md` §7: once `fail` is
                // called, `noMoreSplits` is a no-op from then on).
                engine.terminating.store(true, Ordering::SeqCst);
                engine.sink.fail(e).await;
                continue;
            }
        };

        engine.maybe_signal_no_more_splits().await;

        match outcome {
            LoadOutcome::Completed => {
                info!(target: "split_loader", "loader task {worker_id} retiring: queues drained");
                return;
            }
            LoadOutcome::Signal(signal) => {
                if !signal.is_ready() {
                    signal.wait().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::{InMemoryFilesystemBuilder, SingleFilesystemProvider},
        input_format::{InputFormatId, StaticInputFormatRegistry},
        sink::ChannelSplitSink,
        types::{Partition, Session, StorageFormatDescriptor},
    };
    use std::collections::BTreeMap;

    fn partition(name: &str, location: &str) -> Partition {
        Partition {
            name: name.to_string(),
            storage: Some(StorageFormatDescriptor {
                location: location.to_string(),
                input_format: InputFormatId::GENERIC,
                serde: "text".to_string(),
            }),
            partition_keys: Arc::new(vec![]),
            coercions: Arc::new(BTreeMap::new()),
            bucket: None,
            path_domain: None,
        }
    }

    #[tokio::test]
    async fn drains_two_files_in_one_unpartitioned_directory_then_signals_no_more_splits() {
        let fs = InMemoryFilesystemBuilder::new()
            .file("/t/a", vec![0u8; 100], "h1")
            .file_with_blocks(
                "/t/b",
                vec![0u8; 50],
                vec![
                    crate::fs::BlockLocation { offset: 0, length: 25, hosts: vec!["h2".into()] },
                    crate::fs::BlockLocation { offset: 25, length: 25, hosts: vec!["h3".into()] },
                ],
            )
            .build();
        let sink = ChannelSplitSink::new(10);
        let engine = SplitLoaderEngine::new(
            vec![partition("p0", "/t")].into_iter(),
            sink.clone(),
            PartitionLoaderContext {
                fs_provider: Arc::new(SingleFilesystemProvider(Arc::new(fs))),
                input_formats: Arc::new(StaticInputFormatRegistry::new()),
                session: Session::default(),
                recursive_dir_walker_enabled: true,
            },
        );

        run_loader_task(engine.clone(), 0).await;

        let splits = sink.drain();
        assert_eq!(splits.len(), 2);
        assert_eq!(sink.no_more_splits_call_count(), 1);
        let a = splits.iter().find(|s| s.path == "/t/a").unwrap();
        assert_eq!(a.blocks.len(), 1);
        let b = splits.iter().find(|s| s.path == "/t/b").unwrap();
        assert_eq!(b.blocks.len(), 2);
    }

    #[tokio::test]
    async fn backpressure_reparks_iterator_and_resumes_without_losing_entries() {
        let mut builder = InMemoryFilesystemBuilder::new();
        for i in 0..8 {
            builder = builder.file(&format!("/t/f{i}"), vec![0u8; 10], "h1");
        }
        let fs = builder.build();
        let sink = ChannelSplitSink::new(1); // forces backpressure after the 1st split
        let engine = SplitLoaderEngine::new(
            vec![partition("p0", "/t")].into_iter(),
            sink.clone(),
            PartitionLoaderContext {
                fs_provider: Arc::new(SingleFilesystemProvider(Arc::new(fs))),
                input_formats: Arc::new(StaticInputFormatRegistry::new()),
                session: Session::default(),
                recursive_dir_walker_enabled: true,
            },
        );

        let engine2 = engine.clone();
        let task = tokio::spawn(run_loader_task(engine2, 0));

        let mut total = 0;
        for _ in 0..20 {
            tokio::task::yield_now().await;
            total += sink.drain().len();
            if total >= 8 {
                break;
            }
        }
        task.await.unwrap();
        total += sink.drain().len();
        assert_eq!(total, 8);
        assert_eq!(sink.no_more_splits_call_count(), 1);
    }

    #[tokio::test]
    async fn stop_halts_further_processing_without_rolling_back_enqueued_splits() {
        let fs = InMemoryFilesystemBuilder::new()
            .file("/t/a", vec![0u8; 10], "h1")
            .file("/t/b", vec![0u8; 10], "h1")
            .build();
        let sink = ChannelSplitSink::new(10);
        let engine = SplitLoaderEngine::new(
            vec![partition("p0", "/t")].into_iter(),
            sink.clone(),
            PartitionLoaderContext {
                fs_provider: Arc::new(SingleFilesystemProvider(Arc::new(fs))),
                input_formats: Arc::new(StaticInputFormatRegistry::new()),
                session: Session::default(),
                recursive_dir_walker_enabled: true,
            },
        );
        engine.stop();
        run_loader_task(engine.clone(), 0).await;
        assert!(engine.is_stopped());
    }
}
