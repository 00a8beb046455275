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

//! Background split-generation pipeline for a partitioned, Hive-style table
//! scan: turns partition metadata into `InternalSplit`s on a bounded,
//! cooperative worker pool, respecting backpressure from a downstream
//! `SplitSink`.

pub mod errors;
pub mod file_iterator;
pub mod fs;
pub mod input_format;
pub mod loader_task;
pub mod partition_loader;
pub mod partition_queue;
pub mod sink;
pub mod split_factory;
pub mod types;

use std::sync::Arc;

use loader_task::SplitLoaderEngine;
use partition_loader::PartitionLoaderContext;

pub use errors::{LoaderError, Result};
pub use sink::{CompletionSignal, SplitSink};
pub use split_factory::{InternalBlock, InternalSplit};
pub use types::{
    HiveBucket, Partition, PartitionKeyValue, PathDomain, Session, StorageFormatDescriptor,
};

/// Entry point tying `PartitionQueue`, `FileIteratorDeque`, `PartitionLoader`
/// and `N = loader_concurrency` `LoaderTask`s together (`spec.md` §2, §4.5).
pub struct SplitLoader {
    engine: Arc<SplitLoaderEngine>,
}

impl SplitLoader {
    pub fn new(
        partitions: impl Iterator<Item = Partition> + Send + 'static,
        sink: Arc<dyn SplitSink>,
        ctx: PartitionLoaderContext,
    ) -> Self {
        Self {
            engine: SplitLoaderEngine::new(partitions, sink, ctx),
        }
    }

    /// Builds a `SplitLoader` from process-wide settings (`loader_concurrency`,
    /// `recursive_dir_walker_enabled`, `force_local_scheduling` — `config::Loader`).
    pub fn from_settings(
        partitions: impl Iterator<Item = Partition> + Send + 'static,
        sink: Arc<dyn SplitSink>,
        fs_provider: Arc<dyn fs::FilesystemProvider>,
        input_formats: Arc<dyn input_format::InputFormatRegistry>,
    ) -> Self {
        let settings = config::get_config();
        let ctx = PartitionLoaderContext {
            fs_provider,
            input_formats,
            session: Session {
                force_local_scheduling: settings.loader.force_local_scheduling,
            },
            recursive_dir_walker_enabled: settings.loader.recursive_dir_walker_enabled,
        };
        Self::new(partitions, sink, ctx)
    }

    /// Spawns `loader_concurrency` cooperative `LoaderTask`s and waits for
    /// all of them to retire (`spec.md` §4.5, §5 "a fixed pool of
    /// cooperative tasks").
    pub async fn run(self, loader_concurrency: usize) {
        let mut handles = Vec::with_capacity(loader_concurrency);
        for worker_id in 0..loader_concurrency {
            let engine = self.engine.clone();
            handles.push(tokio::spawn(loader_task::run_loader_task(
                engine, worker_id,
            )));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Runs with concurrency taken from `config::get_config().loader`.
    pub async fn run_with_configured_concurrency(self) {
        let concurrency = config::get_config().loader.loader_concurrency;
        self.run(concurrency).await;
    }

    /// `spec.md` §5 "Cancellation". Safe to call from another task while
    /// `run` is in flight.
    pub fn stop(&self) {
        self.engine.stop();
    }
}
