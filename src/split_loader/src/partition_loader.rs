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

//! `PartitionLoader::load_partition` (`spec.md` §4.4): the five-way dispatch
//! a popped `Partition` goes through before either splits reach the sink or
//! a fresh `FileIterator` is parked for the generic case.

use std::sync::Arc;

use crate::{
    errors::{LoaderError, Result},
    file_iterator::{FileIterator, FileIteratorContext, FileIteratorDeque},
    fs::{FileStatus, Filesystem, FilesystemProvider},
    input_format::{FileSplit, InputFormat, InputFormatRegistry},
    sink::{CompletionSignal, SplitSink},
    split_factory::{self, InternalSplit},
    types::{HiveBucket, Partition, Session, StorageFormatDescriptor},
};

pub struct PartitionLoaderContext {
    pub fs_provider: Arc<dyn FilesystemProvider>,
    pub input_formats: Arc<dyn InputFormatRegistry>,
    pub session: Session,
    pub recursive_dir_walker_enabled: bool,
}

/// `spec.md` §4.4 steps 1-6. Returns the `CompletionSignal` of whatever it
/// ultimately enqueued (`Ready` for the generic branch, which enqueues
/// nothing itself).
pub async fn load_partition(
    partition: &Partition,
    ctx: &PartitionLoaderContext,
    deque: &FileIteratorDeque,
    sink: &dyn SplitSink,
) -> Result<CompletionSignal> {
    // Step 1: resolve schema, partitionKeys, path, inputFormat, fs.
    let storage = partition.storage.as_ref().ok_or_else(|| {
        LoaderError::Internal(format!(
            "partition {} reached PartitionLoader with no storage descriptor",
            partition.name
        ))
    })?;
    let input_format = ctx.input_formats.resolve(storage.input_format)?;
    let fs = ctx.fs_provider.get(&storage.location)?;

    // Step 2: symlink indirection.
    if input_format.is_symlink_text() {
        if partition.bucket.is_some() {
            return Err(LoaderError::Unsupported(
                "bucketed table in symlink format is not supported".to_string(),
            ));
        }
        return load_symlink_indirection(partition, storage, ctx, fs.as_ref(), sink).await;
    }

    // Step 3: delegated split computation.
    if input_format.uses_external_split_computation() {
        return load_delegated(partition, storage, input_format.as_ref(), fs.as_ref(), ctx, sink)
            .await;
    }

    // Steps 4-5: bucketed.
    if let Some(bucket) = &partition.bucket {
        return load_bucketed(
            partition,
            storage,
            bucket,
            input_format.as_ref(),
            fs.as_ref(),
            ctx,
            sink,
        )
        .await;
    }

    // Step 6: generic.
    deque.add_last(FileIterator::new(
        storage.location.clone(),
        FileIteratorContext {
            fs,
            partition_name: partition.name.clone(),
            input_format,
            schema: storage_schema(partition),
            partition_keys: partition.partition_keys.clone(),
            path_domain: partition.path_domain.clone(),
            coercions: partition.coercions.clone(),
        },
    ));
    Ok(CompletionSignal::Ready)
}

fn storage_schema(partition: &Partition) -> crate::types::Schema {
    partition
        .storage
        .as_ref()
        .map(|s| s.serde.as_str().into())
        .unwrap_or_else(|| "".into())
}

async fn resolve_split(
    fs: &dyn Filesystem,
    partition: &Partition,
    path: &str,
    splittable: bool,
    session: Session,
    bucket_number: Option<usize>,
) -> Result<Option<InternalSplit>> {
    let status = fs.get_file_status(path).await?;
    let blocks = fs
        .get_file_block_locations(&status, 0, status.len)
        .await?;
    split_factory::create(
        &partition.name,
        path,
        &blocks,
        0,
        status.len,
        status.len,
        storage_schema(partition),
        partition.partition_keys.clone(),
        splittable,
        session,
        bucket_number,
        partition.coercions.clone(),
        partition.path_domain.as_ref(),
    )
}

/// `spec.md` §4.4 step 2: parse symlink files line-by-line, resolve each
/// target against its own filesystem handle, run a generic text format's
/// `get_splits` over it, `SplitFactory` the result.
async fn load_symlink_indirection(
    partition: &Partition,
    storage: &StorageFormatDescriptor,
    ctx: &PartitionLoaderContext,
    symlink_dir_fs: &dyn Filesystem,
    sink: &dyn SplitSink,
) -> Result<CompletionSignal> {
    let entries = symlink_dir_fs
        .list_status(&storage.location)
        .await
        .map_err(|e| LoaderError::BadData(format!("listing symlink directory failed: {e}")))?;

    let mut targets = Vec::new();
    for entry in entries {
        if entry.is_directory || crate::fs::is_hidden(crate::fs::basename(&entry.path)) {
            continue;
        }
        let contents = symlink_dir_fs
            .open(&entry.path)
            .await
            .map_err(|e| LoaderError::BadData(format!("reading symlink file failed: {e}")))?;
        let text = String::from_utf8(contents)
            .map_err(|e| LoaderError::BadData(format!("symlink file is not UTF-8: {e}")))?;
        for line in text.lines() {
            let line = line.trim();
            if !line.is_empty() {
                targets.push(line.to_string());
            }
        }
    }

    let text_format = ctx
        .input_formats
        .resolve(crate::input_format::InputFormatId::GENERIC)?;

    let mut splits = Vec::new();
    for target in &targets {
        let target_fs = ctx.fs_provider.get(target)?;
        let file_splits: Vec<FileSplit> = text_format.get_splits(target_fs.as_ref(), target).await?;
        for fs_split in file_splits {
            let status = target_fs.get_file_status(&fs_split.path).await?;
            let blocks = target_fs
                .get_file_block_locations(&status, fs_split.start, fs_split.length)
                .await?;
            if let Some(split) = split_factory::create(
                &partition.name,
                &fs_split.path,
                &blocks,
                fs_split.start,
                fs_split.length,
                status.len,
                storage_schema(partition),
                partition.partition_keys.clone(),
                false, // symlink-resolved targets are never splittable
                ctx.session,
                None,
                partition.coercions.clone(),
                partition.path_domain.as_ref(),
            )? {
                splits.push(split);
            }
        }
    }

    Ok(sink.add_to_queue_batch(splits).await)
}

/// `spec.md` §4.4 step 3: `UseFileSplitsFromInputFormat`-equivalent formats
/// compute their own splits; the result is always `splittable = false`.
async fn load_delegated(
    partition: &Partition,
    storage: &StorageFormatDescriptor,
    input_format: &dyn InputFormat,
    fs: &dyn Filesystem,
    ctx: &PartitionLoaderContext,
    sink: &dyn SplitSink,
) -> Result<CompletionSignal> {
    let file_splits = input_format.get_splits(fs, &storage.location).await?;
    let mut splits = Vec::with_capacity(file_splits.len());
    for fs_split in file_splits {
        let status = fs.get_file_status(&fs_split.path).await?;
        let blocks = fs
            .get_file_block_locations(&status, fs_split.start, fs_split.length)
            .await?;
        if let Some(split) = split_factory::create(
            &partition.name,
            &fs_split.path,
            &blocks,
            fs_split.start,
            fs_split.length,
            status.len,
            storage_schema(partition),
            partition.partition_keys.clone(),
            false,
            ctx.session,
            None,
            partition.coercions.clone(),
            partition.path_domain.as_ref(),
        )? {
            splits.push(split);
        }
    }
    Ok(sink.add_to_queue_batch(splits).await)
}

/// `spec.md` §4.4 steps 4-5. Shared by explicit-bucket-selection and
/// full-scan: list the (flat) bucket directory via a `FileIterator`, verify
/// it, sort lexicographically, then build one split per requested bucket
/// number.
async fn load_bucketed(
    partition: &Partition,
    storage: &StorageFormatDescriptor,
    bucket: &HiveBucket,
    input_format: &dyn InputFormat,
    fs: &dyn Filesystem,
    ctx: &PartitionLoaderContext,
    sink: &dyn SplitSink,
) -> Result<CompletionSignal> {
    let mut iter = FileIterator::new(
        storage.location.clone(),
        FileIteratorContext {
            fs: ctx.fs_provider.get(&storage.location)?,
            partition_name: partition.name.clone(),
            input_format: Arc::new(crate::input_format::GenericInputFormat),
            schema: storage_schema(partition),
            partition_keys: partition.partition_keys.clone(),
            path_domain: partition.path_domain.clone(),
            coercions: partition.coercions.clone(),
        },
    );

    let mut files: Vec<FileStatus> = Vec::new();
    let mut saw_directory = false;
    while let Some(entry) = iter.next().await? {
        if entry.is_directory {
            saw_directory = true;
            continue;
        }
        files.push(entry);
    }

    if saw_directory || files.len() != bucket.bucket_count {
        return Err(LoaderError::InvalidBucketFiles {
            partition: partition.name.clone(),
            expected: bucket.bucket_count,
            found: files.len(),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));

    let wanted: Vec<usize> = if bucket.buckets.is_empty() {
        (0..bucket.bucket_count).collect()
    } else {
        let mut b = bucket.buckets.clone();
        b.sort_unstable();
        b
    };

    let mut splits = Vec::with_capacity(wanted.len());
    for bucket_number in wanted {
        let file = &files[bucket_number];
        let splittable = input_format.is_splittable(fs, &file.path).await?;
        if let Some(split) = resolve_split(
            fs,
            partition,
            &file.path,
            splittable,
            ctx.session,
            Some(bucket_number),
        )
        .await?
        {
            splits.push(split);
        }
    }

    Ok(sink.add_to_queue_batch(splits).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::{InMemoryFilesystem, InMemoryFilesystemBuilder, SingleFilesystemProvider},
        input_format::{DelegatedInputFormat, InputFormatId, StaticInputFormatRegistry},
        sink::ChannelSplitSink,
    };
    use std::{collections::BTreeMap, sync::Arc};

    fn storage(location: &str, id: InputFormatId) -> StorageFormatDescriptor {
        StorageFormatDescriptor {
            location: location.to_string(),
            input_format: id,
            serde: "text".to_string(),
        }
    }

    fn base_partition(storage: StorageFormatDescriptor) -> Partition {
        Partition {
            name: "p0".to_string(),
            storage: Some(storage),
            partition_keys: Arc::new(vec![]),
            coercions: Arc::new(BTreeMap::new()),
            bucket: None,
            path_domain: None,
        }
    }

    fn context(fs: InMemoryFilesystem) -> PartitionLoaderContext {
        PartitionLoaderContext {
            fs_provider: Arc::new(SingleFilesystemProvider(Arc::new(fs))),
            input_formats: Arc::new(StaticInputFormatRegistry::new()),
            session: Session::default(),
            recursive_dir_walker_enabled: true,
        }
    }

    #[tokio::test]
    async fn generic_partition_parks_a_fresh_iterator() {
        let fs = InMemoryFilesystemBuilder::new()
            .file("/t/a", b"hello".to_vec(), "h1")
            .build();
        let ctx = context(fs);
        let deque = FileIteratorDeque::new();
        let sink = ChannelSplitSink::new(10);
        let partition = base_partition(storage("/t", InputFormatId::GENERIC));

        let signal = load_partition(&partition, &ctx, &deque, sink.as_ref())
            .await
            .unwrap();
        assert!(signal.is_ready());
        assert!(!deque.is_empty());
        assert_eq!(sink.drain().len(), 0);
    }

    #[tokio::test]
    async fn bucketed_explicit_selection_enqueues_requested_buckets_as_one_batch() {
        let fs = InMemoryFilesystemBuilder::new()
            .file("/t/000000_0", b"a".to_vec(), "h1")
            .file("/t/000001_0", b"b".to_vec(), "h1")
            .file("/t/000002_0", b"c".to_vec(), "h1")
            .file("/t/000003_0", b"d".to_vec(), "h1")
            .build();
        let ctx = context(fs);
        let deque = FileIteratorDeque::new();
        let sink = ChannelSplitSink::new(10);
        let mut partition = base_partition(storage("/t", InputFormatId::GENERIC));
        partition.bucket = Some(HiveBucket {
            bucket_count: 4,
            buckets: vec![1, 3],
        });

        load_partition(&partition, &ctx, &deque, sink.as_ref())
            .await
            .unwrap();
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].bucket_number, Some(1));
        assert_eq!(drained[1].bucket_number, Some(3));
    }

    #[tokio::test]
    async fn bucketed_count_mismatch_fails() {
        let fs = InMemoryFilesystemBuilder::new()
            .file("/t/000000_0", b"a".to_vec(), "h1")
            .file("/t/000001_0", b"b".to_vec(), "h1")
            .file("/t/000002_0", b"c".to_vec(), "h1")
            .build();
        let ctx = context(fs);
        let deque = FileIteratorDeque::new();
        let sink = ChannelSplitSink::new(10);
        let mut partition = base_partition(storage("/t", InputFormatId::GENERIC));
        partition.bucket = Some(HiveBucket {
            bucket_count: 4,
            buckets: vec![],
        });

        let err = load_partition(&partition, &ctx, &deque, sink.as_ref())
            .await
            .unwrap_err();
        match err {
            LoaderError::InvalidBucketFiles {
                partition: p,
                expected,
                found,
            } => {
                assert_eq!(p, "p0");
                assert_eq!(expected, 4);
                assert_eq!(found, 3);
            }
            other => panic!("expected InvalidBucketFiles, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn symlink_indirection_resolves_targets_as_non_splittable() {
        let fs = InMemoryFilesystemBuilder::new()
            .file("/sym/links.txt", b"/x/1\n/x/2\n/x/3\n".to_vec(), "h1")
            .file("/x/1", b"aaaaaaaaaa".to_vec(), "h1")
            .file("/x/2", b"bbbbbbbbbb".to_vec(), "h2")
            .file("/x/3", b"cccccccccc".to_vec(), "h3")
            .build();
        let ctx = context(fs);
        let deque = FileIteratorDeque::new();
        let sink = ChannelSplitSink::new(10);
        let partition = base_partition(storage("/sym", InputFormatId::SYMLINK_TEXT));

        load_partition(&partition, &ctx, &deque, sink.as_ref())
            .await
            .unwrap();
        let drained = sink.drain();
        assert_eq!(drained.len(), 3);
        assert!(drained.iter().all(|s| !s.splittable));
    }

    #[tokio::test]
    async fn delegated_split_computation_marks_results_non_splittable() {
        let fs = InMemoryFilesystemBuilder::new()
            .file("/t/data.bin", vec![0u8; 64], "h1")
            .build();
        let delegated_id = InputFormatId("delegated_test");
        let registry = StaticInputFormatRegistry::new().register(
            delegated_id,
            Arc::new(DelegatedInputFormat::new(delegated_id, |path: &str| {
                vec![crate::input_format::FileSplit {
                    path: path.to_string(),
                    start: 0,
                    length: 64,
                }]
            })),
        );
        let ctx = PartitionLoaderContext {
            fs_provider: Arc::new(SingleFilesystemProvider(Arc::new(fs))),
            input_formats: Arc::new(registry),
            session: Session::default(),
            recursive_dir_walker_enabled: true,
        };
        let deque = FileIteratorDeque::new();
        let sink = ChannelSplitSink::new(10);
        let partition = base_partition(storage("/t/data.bin", delegated_id));

        load_partition(&partition, &ctx, &deque, sink.as_ref())
            .await
            .unwrap();
        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].path, "/t/data.bin");
        assert!(!drained[0].splittable);
    }
}
