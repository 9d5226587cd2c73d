//! Weak-checksum index over a control file's block-sum table

use crate::checksum::STRONG_SIZE;
use crate::control::ControlFile;
use std::collections::HashMap;

/// Target positions sharing one `(weak, strong)` block sum.
#[derive(Debug)]
pub struct StrongEntry {
    pub strong: [u8; STRONG_SIZE],
    /// Target block indices, in increasing order
    pub positions: Vec<usize>,
}

/// Mapping from weak checksum to candidate target blocks.
///
/// Built once from the block-sum table and frozen. A lookup returns the
/// distinct strong sums recorded for a weak value in first-occurrence
/// order; callers must verify the strong hash before dispatching.
#[derive(Debug, Default)]
pub struct BlockIndex {
    map: HashMap<u32, Vec<StrongEntry>>,
}

impl BlockIndex {
    /// Index every block sum of the control file by its weak value.
    pub fn build(control: &ControlFile) -> Self {
        let mut map: HashMap<u32, Vec<StrongEntry>> = HashMap::new();
        for (position, sum) in control.block_sums.iter().enumerate() {
            let entries = map.entry(sum.weak).or_default();
            match entries.iter_mut().find(|e| e.strong == sum.strong) {
                Some(entry) => entry.positions.push(position),
                None => entries.push(StrongEntry {
                    strong: sum.strong,
                    positions: vec![position],
                }),
            }
        }
        tracing::debug!(
            blocks = control.block_sums.len(),
            distinct_weak = map.len(),
            "Built block index"
        );
        Self { map }
    }

    /// Candidate entries for a weak value; empty when the value is unknown.
    pub fn lookup(&self, weak: u32) -> &[StrongEntry] {
        self.map.get(&weak).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{BlockSum, ControlFile, Header, FORMAT_VERSION};

    fn control(sums: Vec<BlockSum>) -> ControlFile {
        ControlFile {
            header: Header {
                version: FORMAT_VERSION.to_string(),
                filename: None,
                mtime: None,
                block_size: 4,
                length: (sums.len() * 4) as u64,
                seq_matches: 1,
                weak_len: 4,
                strong_len: 16,
                url: String::new(),
                sha1: "0".repeat(40),
            },
            block_sums: sums,
        }
    }

    fn sum(weak: u32, tag: u8) -> BlockSum {
        let mut strong = [0u8; STRONG_SIZE];
        strong[0] = tag;
        BlockSum { weak, strong }
    }

    #[test]
    fn test_duplicate_sums_share_one_entry() {
        let index = BlockIndex::build(&control(vec![sum(7, 1), sum(7, 1), sum(7, 1)]));
        let entries = index.lookup(7);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_weak_collisions_keep_first_occurrence_order() {
        let index = BlockIndex::build(&control(vec![sum(7, 2), sum(7, 1), sum(7, 2)]));
        let entries = index.lookup(7);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].strong[0], 2);
        assert_eq!(entries[0].positions, vec![0, 2]);
        assert_eq!(entries[1].strong[0], 1);
        assert_eq!(entries[1].positions, vec![1]);
    }

    #[test]
    fn test_lookup_miss_is_empty() {
        let index = BlockIndex::build(&control(vec![sum(7, 1)]));
        assert!(index.lookup(8).is_empty());
    }
}
