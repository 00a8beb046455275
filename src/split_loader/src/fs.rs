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

//! The distributed-filesystem external collaborator (`spec.md` §6). The core
//! only depends on this trait; a real deployment backs it with whatever
//! cluster filesystem the table lives on (HDFS, an object store with a
//! directory shim, ...). This module also ships `InMemoryFilesystem`, a
//! reference adapter used by the crate's own tests.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use crate::errors::{LoaderError, Result};

#[derive(Debug, Clone)]
pub struct FileStatus {
    pub path: String,
    pub len: u64,
    pub is_directory: bool,
}

#[derive(Debug, Clone)]
pub struct BlockLocation {
    pub offset: u64,
    pub length: u64,
    pub hosts: Vec<String>,
}

/// Names beginning with `.` or `_` are hidden (`spec.md` §4.2).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Lists the direct children of `path`. Does not filter hidden entries —
    /// callers apply `is_hidden` themselves, matching the different hidden
    /// conventions FileIterator vs. bucket/symlink listing need (`spec.md`
    /// §4.2, §4.4).
    async fn list_status(&self, path: &str) -> Result<Vec<FileStatus>>;

    async fn get_file_status(&self, path: &str) -> Result<FileStatus>;

    async fn get_file_block_locations(
        &self,
        status: &FileStatus,
        start: u64,
        length: u64,
    ) -> Result<Vec<BlockLocation>>;

    /// Reads the full contents of a (small, text) file — used for symlink
    /// directory files (`spec.md` §4.4 step 2).
    async fn open(&self, path: &str) -> Result<Vec<u8>>;
}

/// Resolves a fresh `Filesystem` handle for a given path (`spec.md` §9
/// "Filesystem variability in symlinks": each symlink target is resolved
/// against its own filesystem instance, possibly a different cluster).
pub trait FilesystemProvider: Send + Sync {
    fn get(&self, path: &str) -> Result<Arc<dyn Filesystem>>;
}

/// Reference provider that hands out the same handle for every path —
/// correct whenever the whole table lives on one filesystem.
pub struct SingleFilesystemProvider(pub Arc<dyn Filesystem>);

impl FilesystemProvider for SingleFilesystemProvider {
    fn get(&self, _path: &str) -> Result<Arc<dyn Filesystem>> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
struct InMemoryFile {
    len: u64,
    blocks: Vec<BlockLocation>,
    contents: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
enum InMemoryEntry {
    #[default]
    Dir,
    File(InMemoryFile),
}

/// In-process `Filesystem` backed by a flat map of full paths to entries.
/// Directories are implicit: any path that is a strict prefix of a stored
/// file's path (on a `/`-boundary) is a directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFilesystem {
    entries: Arc<BTreeMap<String, InMemoryEntry>>,
}

#[derive(Default)]
pub struct InMemoryFilesystemBuilder {
    entries: BTreeMap<String, InMemoryEntry>,
}

impl InMemoryFilesystemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with a single block spanning its whole length on `host`.
    pub fn file(self, path: &str, contents: Vec<u8>, host: &str) -> Self {
        let len = contents.len() as u64;
        self.file_with_blocks(
            path,
            contents,
            vec![BlockLocation {
                offset: 0,
                length: len,
                hosts: vec![host.to_string()],
            }],
        )
    }

    pub fn file_with_blocks(
        mut self,
        path: &str,
        contents: Vec<u8>,
        blocks: Vec<BlockLocation>,
    ) -> Self {
        let len = contents.len() as u64;
        self.entries.insert(
            path.to_string(),
            InMemoryEntry::File(InMemoryFile {
                len,
                blocks,
                contents,
            }),
        );
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.entries.insert(path.to_string(), InMemoryEntry::Dir);
        self
    }

    pub fn build(self) -> InMemoryFilesystem {
        InMemoryFilesystem {
            entries: Arc::new(self.entries),
        }
    }
}

#[async_trait]
impl Filesystem for InMemoryFilesystem {
    async fn list_status(&self, path: &str) -> Result<Vec<FileStatus>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for (full_path, entry) in self.entries.iter() {
            let Some(rest) = full_path.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let (child, is_nested) = match rest.split_once('/') {
                Some((child, _)) => (child, true),
                None => (rest, false),
            };
            if !seen.insert(child.to_string()) {
                continue;
            }
            let child_path = format!("{prefix}{child}");
            let is_directory = is_nested || matches!(entry, InMemoryEntry::Dir);
            let len = match entry {
                InMemoryEntry::File(f) if !is_nested => f.len,
                _ => 0,
            };
            out.push(FileStatus {
                path: child_path,
                len,
                is_directory,
            });
        }
        Ok(out)
    }

    async fn get_file_status(&self, path: &str) -> Result<FileStatus> {
        match self.entries.get(path) {
            Some(InMemoryEntry::File(f)) => Ok(FileStatus {
                path: path.to_string(),
                len: f.len,
                is_directory: false,
            }),
            Some(InMemoryEntry::Dir) => Ok(FileStatus {
                path: path.to_string(),
                len: 0,
                is_directory: true,
            }),
            None => Err(LoaderError::Io(format!("no such file: {path}"))),
        }
    }

    async fn get_file_block_locations(
        &self,
        status: &FileStatus,
        _start: u64,
        _length: u64,
    ) -> Result<Vec<BlockLocation>> {
        match self.entries.get(&status.path) {
            Some(InMemoryEntry::File(f)) => Ok(f.blocks.clone()),
            _ => Err(LoaderError::Io(format!("no such file: {}", status.path))),
        }
    }

    async fn open(&self, path: &str) -> Result<Vec<u8>> {
        match self.entries.get(path) {
            Some(InMemoryEntry::File(f)) => Ok(f.contents.clone()),
            _ => Err(LoaderError::Io(format!("no such file: {path}"))),
        }
    }
}
