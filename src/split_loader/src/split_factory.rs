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

//! Pure clamp-and-decide logic (`spec.md` §4.3). `SplitFactory::create` takes
//! no lock, does no IO, and is the one function every end-to-end scenario in
//! `spec.md` §8 ultimately bottoms out in.

use crate::{
    errors::{LoaderError, Result},
    fs::BlockLocation,
    types::{PartitionKeys, PathDomain, Schema, Session, TypeCoercionMap},
};

#[derive(Debug, Clone, PartialEq)]
pub struct InternalBlock {
    pub start: u64,
    pub end: u64,
    pub host_addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InternalSplit {
    pub partition_name: String,
    pub path: String,
    pub start: u64,
    pub end: u64,
    pub file_size: u64,
    pub schema: Schema,
    pub partition_keys: PartitionKeys,
    pub blocks: Vec<InternalBlock>,
    pub bucket_number: Option<usize>,
    pub splittable: bool,
    pub force_local_scheduling: bool,
    pub coercions: TypeCoercionMap,
}

const LOCALHOST: &str = "localhost";

/// `hasRealAddress` (`spec.md` §9 Open Question): only the literal string
/// `"localhost"` is treated as unreal. `127.0.0.1`/`::1` are NOT special
/// cased, preserving the original's literal-string semantics as directed.
fn has_real_address(hosts: &[String]) -> bool {
    hosts.iter().any(|h| h != LOCALHOST)
}

#[allow(clippy::too_many_arguments)]
pub fn create(
    partition_name: &str,
    path: &str,
    block_locations: &[BlockLocation],
    start: u64,
    length: u64,
    file_size: u64,
    schema: Schema,
    partition_keys: PartitionKeys,
    splittable: bool,
    session: Session,
    bucket_number: Option<usize>,
    coercions: TypeCoercionMap,
    path_domain: Option<&PathDomain>,
) -> Result<Option<InternalSplit>> {
    // Step 1: $path pruning.
    if let Some(domain) = path_domain {
        if !domain.allows(path) {
            return Ok(None);
        }
    }

    let split_end = start + length;

    // Step 2: clamp every block against [start, start+length).
    let mut blocks = Vec::with_capacity(block_locations.len());
    for block in block_locations {
        let block_end = block.offset + block.length;
        let clamped_start = start.max(block.offset);
        let clamped_end = split_end.min(block_end);
        if clamped_start > clamped_end {
            continue; // disjoint
        }
        if clamped_start == clamped_end && !(clamped_start == start && clamped_end == split_end) {
            continue; // zero-width, not a boundary match
        }
        blocks.push(InternalBlock {
            start: clamped_start,
            end: clamped_end,
            host_addresses: block.hosts.clone(),
        });
    }

    // Step 3: coverage assertion.
    let covers_start = blocks.first().is_some_and(|b| b.start == start);
    let covers_end = blocks.last().is_some_and(|b| b.end == split_end);
    if blocks.is_empty() || !covers_start || !covers_end {
        return Err(LoaderError::Internal(format!(
            "bad block metadata for {path}: blocks do not cover [{start}, {split_end})"
        )));
    }

    // Step 4: non-splittable files collapse to one block.
    if !splittable {
        let addresses = blocks[0].host_addresses.clone();
        blocks = vec![InternalBlock {
            start,
            end: split_end,
            host_addresses: addresses,
        }];
    }

    // Step 5: force-local-scheduling decision.
    let force_local_scheduling =
        session.force_local_scheduling && blocks.iter().all(|b| has_real_address(&b.host_addresses));

    Ok(Some(InternalSplit {
        partition_name: partition_name.to_string(),
        path: path.to_string(),
        start,
        end: split_end,
        file_size,
        schema,
        partition_keys,
        blocks,
        bucket_number,
        splittable,
        force_local_scheduling,
        coercions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::BTreeMap, sync::Arc};

    fn schema() -> Schema {
        "s".into()
    }

    fn keys() -> PartitionKeys {
        Arc::new(vec![])
    }

    fn coercions() -> TypeCoercionMap {
        Arc::new(BTreeMap::new())
    }

    #[test]
    fn single_block_covering_whole_file() {
        let blocks = vec![BlockLocation {
            offset: 0,
            length: 100,
            hosts: vec!["h1".into()],
        }];
        let split = create(
            "p",
            "/t/a",
            &blocks,
            0,
            100,
            100,
            schema(),
            keys(),
            true,
            Session::default(),
            None,
            coercions(),
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(split.blocks.len(), 1);
        assert_eq!(split.blocks[0], InternalBlock {
            start: 0,
            end: 100,
            host_addresses: vec!["h1".into()],
        });
    }

    #[test]
    fn two_blocks_clamp_exactly() {
        let blocks = vec![
            BlockLocation { offset: 0, length: 25, hosts: vec!["h2".into()] },
            BlockLocation { offset: 25, length: 25, hosts: vec!["h3".into()] },
        ];
        let split = create(
            "p", "/t/b", &blocks, 0, 50, 50, schema(), keys(), true,
            Session::default(), None, coercions(), None,
        ).unwrap().unwrap();
        assert_eq!(split.blocks.len(), 2);
        assert_eq!(split.blocks[0].start, 0);
        assert_eq!(split.blocks[0].end, 25);
        assert_eq!(split.blocks[1].start, 25);
        assert_eq!(split.blocks[1].end, 50);
    }

    #[test]
    fn clamp_law_matches_set_intersection() {
        // (start, length, blockOffset, blockLength)
        let cases: &[(u64, u64, u64, u64)] = &[
            (10, 20, 0, 15),   // block ends inside split: overlap [10,15)
            (10, 20, 15, 20),  // block spans the whole split
            (10, 20, 25, 10),  // block starts inside, extends past split end
        ];
        for &(start, length, offset, block_len) in cases {
            let blocks = vec![
                BlockLocation { offset: 0, length: start, hosts: vec!["pad".into()] },
                BlockLocation { offset, length: block_len, hosts: vec!["h".into()] },
                BlockLocation { offset: start + length, length: 1000, hosts: vec!["pad2".into()] },
            ];
            // Only check the middle block's clamp directly against the formula.
            let split_end = start + length;
            let block_end = offset + block_len;
            let expected_start = start.max(offset);
            let expected_end = split_end.min(block_end);
            if expected_start > expected_end {
                continue;
            }
            let result = create(
                "p", "/t/c", &blocks, start, length, split_end, schema(), keys(), true,
                Session::default(), None, coercions(), None,
            );
            if let Ok(Some(split)) = result {
                let middle = split.blocks.iter().find(|b| b.host_addresses == vec!["h".to_string()]);
                if let Some(middle) = middle {
                    assert_eq!(middle.start, expected_start);
                    assert_eq!(middle.end, expected_end);
                }
            }
        }
    }

    #[test]
    fn non_splittable_collapses_to_one_block_inheriting_first_addresses() {
        let blocks = vec![
            BlockLocation { offset: 0, length: 25, hosts: vec!["h2".into()] },
            BlockLocation { offset: 25, length: 25, hosts: vec!["h3".into()] },
        ];
        let split = create(
            "p", "/t/b", &blocks, 0, 50, 50, schema(), keys(), false,
            Session::default(), None, coercions(), None,
        ).unwrap().unwrap();
        assert_eq!(split.blocks.len(), 1);
        assert_eq!(split.blocks[0].start, 0);
        assert_eq!(split.blocks[0].end, 50);
        assert_eq!(split.blocks[0].host_addresses, vec!["h2".to_string()]);
    }

    #[test]
    fn force_local_scheduling_requires_every_block_to_have_a_real_address() {
        let blocks = vec![BlockLocation {
            offset: 0,
            length: 10,
            hosts: vec!["localhost".into()],
        }];
        let session = Session { force_local_scheduling: true };
        let split = create(
            "p", "/t/d", &blocks, 0, 10, 10, schema(), keys(), true,
            session, None, coercions(), None,
        ).unwrap().unwrap();
        assert!(!split.force_local_scheduling);

        let blocks_real = vec![BlockLocation {
            offset: 0,
            length: 10,
            hosts: vec!["h1".into()],
        }];
        let split2 = create(
            "p", "/t/d", &blocks_real, 0, 10, 10, schema(), keys(), true,
            session, None, coercions(), None,
        ).unwrap().unwrap();
        assert!(split2.force_local_scheduling);
    }

    #[test]
    fn path_domain_prunes_non_matching_paths() {
        let blocks = vec![BlockLocation { offset: 0, length: 10, hosts: vec!["h1".into()] }];
        let domain = PathDomain::new(vec!["/t/a".to_string()]);
        let kept = create(
            "p", "/t/a", &blocks, 0, 10, 10, schema(), keys(), true,
            Session::default(), None, coercions(), Some(&domain),
        ).unwrap();
        assert!(kept.is_some());

        let skipped = create(
            "p", "/t/b", &blocks, 0, 10, 10, schema(), keys(), true,
            Session::default(), None, coercions(), Some(&domain),
        ).unwrap();
        assert!(skipped.is_none());
    }

    #[test]
    fn bad_block_metadata_fails() {
        let blocks = vec![BlockLocation { offset: 50, length: 10, hosts: vec!["h1".into()] }];
        let result = create(
            "p", "/t/e", &blocks, 0, 10, 10, schema(), keys(), true,
            Session::default(), None, coercions(), None,
        );
        assert!(result.is_err());
    }
}
