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

//! Data model shared by every component of the split-generation pipeline
//! (`spec.md` §3). The core treats `Schema` and column-type coercions as
//! opaque data to thread through to the emitted splits — interpreting them
//! is a downstream, out-of-scope concern.

use std::{collections::BTreeMap, sync::Arc};

use crate::input_format::InputFormatId;

/// Opaque schema handle. The core never interprets it, only carries it.
pub type Schema = Arc<str>;

/// column name -> (from_type, to_type)
pub type TypeCoercionMap = Arc<BTreeMap<String, (String, String)>>;

/// A partition's key-column values, in table-declaration order.
pub type PartitionKeys = Arc<Vec<PartitionKeyValue>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKeyValue {
    pub name: String,
    pub value: Option<String>,
}

/// Storage location + serde/input-format identity for either a partition or,
/// when a partition carries none, the table itself (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct StorageFormatDescriptor {
    pub location: String,
    pub input_format: InputFormatId,
    pub serde: String,
}

/// One logical slice of a table, identified by its partition-key values
/// (`spec.md` §3, GLOSSARY). Immutable once handed to the `PartitionQueue`.
#[derive(Debug, Clone)]
pub struct Partition {
    pub name: String,
    pub storage: Option<StorageFormatDescriptor>,
    pub partition_keys: PartitionKeys,
    pub coercions: TypeCoercionMap,
    /// Present only for bucketed tables (`spec.md` §3, §4.4 steps 4-5).
    pub bucket: Option<HiveBucket>,
    /// `$path` pushdown restriction, if any (`spec.md` §3, §4.3 step 1).
    pub path_domain: Option<PathDomain>,
}

/// Session-scoped knobs the core consults (`spec.md` §6 "Session
/// properties").
#[derive(Debug, Clone, Copy, Default)]
pub struct Session {
    pub force_local_scheduling: bool,
}

/// Bucketing descriptor for a bucketed table (`spec.md` §3 GLOSSARY).
/// `buckets` empty means "full scan of every bucket" (`spec.md` §4.4 step 5);
/// non-empty means "scan exactly these bucket numbers" (step 4).
#[derive(Debug, Clone)]
pub struct HiveBucket {
    pub bucket_count: usize,
    pub buckets: Vec<usize>,
}

/// Predicate restricting the `$path` pseudo-column (`spec.md` §3). Only a
/// finite, enumerable set of allowed path values is supported here — enough
/// to express the seed scenario in `spec.md` §8.6 — a richer predicate
/// language is a downstream pushdown concern out of scope per `spec.md` §1.
#[derive(Debug, Clone)]
pub struct PathDomain {
    allowed: Vec<String>,
}

impl PathDomain {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    /// `spec.md` §4.3 step 1: does the domain include the UTF-8 encoding of
    /// `path` as a nullable value? A domain that allows NULL admits every
    /// path; this crate never constructs one (there is no NULL `$path`), so
    /// membership reduces to exact string match against the allow-list.
    pub fn allows(&self, path: &str) -> bool {
        self.allowed.iter().any(|p| p == path)
    }
}
