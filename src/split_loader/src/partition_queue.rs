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

//! Lazy, thread-safe queue draining an input iterator of partitions exactly
//! once (`spec.md` §4.1). A single mutex around a `Peekable` iterator is
//! enough: `poll` never blocks (there is nothing beyond the iterator to wait
//! for) and `is_empty` stays side-effect free and consistent with it.

use std::{iter::Peekable, sync::Mutex};

use crate::types::Partition;

type BoxedIter = Box<dyn Iterator<Item = Partition> + Send>;

pub struct PartitionQueue {
    inner: Mutex<Peekable<BoxedIter>>,
}

impl PartitionQueue {
    pub fn new(partitions: impl Iterator<Item = Partition> + Send + 'static) -> Self {
        let boxed: BoxedIter = Box::new(partitions);
        Self {
            inner: Mutex::new(boxed.peekable()),
        }
    }

    /// Non-blocking: each input element is delivered to exactly one caller.
    pub fn poll(&self) -> Option<Partition> {
        self.inner.lock().unwrap().next()
    }

    /// `spec.md` §4.1: "observably consistent with `poll()` returning empty
    /// for all future callers".
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().peek().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(name: &str) -> Partition {
        Partition {
            name: name.to_string(),
            storage: None,
            partition_keys: std::sync::Arc::new(vec![]),
            coercions: std::sync::Arc::new(Default::default()),
            bucket: None,
            path_domain: None,
        }
    }

    #[test]
    fn drains_exactly_once() {
        let queue = PartitionQueue::new(vec![partition("a"), partition("b")].into_iter());
        assert!(!queue.is_empty());
        let first = queue.poll().unwrap();
        let second = queue.poll().unwrap();
        assert_ne!(first.name, second.name);
        assert!(queue.poll().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_pollers_never_see_duplicates() {
        use std::sync::Arc;
        let queue = Arc::new(PartitionQueue::new(
            (0..200).map(|i| partition(&i.to_string())),
        ));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            handles.push(std::thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(p) = queue.poll() {
                    seen.push(p.name);
                }
                seen
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().unwrap());
        }
        all.sort();
        let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
        assert_eq!(all, expected);
    }
}
