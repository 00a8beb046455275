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

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Error taxonomy for the split-generation pipeline (`spec.md` §7). Every
/// variant ends up reported to a `SplitSink` via `fail`, never unwound as a
/// panic.
#[derive(ThisError, Debug, Clone)]
pub enum LoaderError {
    #[error("BadData# {0}")]
    BadData(String),
    #[error("InvalidBucketFiles# partition {partition}: expected {expected} files, found {found}")]
    InvalidBucketFiles {
        partition: String,
        expected: usize,
        found: usize,
    },
    #[error("InvalidMetadata# {0}")]
    InvalidMetadata(String),
    #[error("InvalidPartitionValue# {0}")]
    InvalidPartitionValue(String),
    #[error("Unsupported# {0}")]
    Unsupported(String),
    #[error("Internal# {0}")]
    Internal(String),
    #[error("IoError# {0}")]
    Io(String),
}

impl From<std::io::Error> for LoaderError {
    fn from(e: std::io::Error) -> Self {
        LoaderError::Io(e.to_string())
    }
}
