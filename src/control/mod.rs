//! Control-file model: header metadata plus the per-block checksum table

pub mod codec;
pub mod generate;

pub use generate::{generate, generate_from_bytes, GenerateOptions};

use crate::checksum::STRONG_SIZE;
use chrono::{DateTime, Utc};

/// Control-file format version emitted by the generator
pub const FORMAT_VERSION: &str = "0.6.2";

/// Parsed `Key: Value` header of a control file.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// Format version from the `zsync` key
    pub version: String,
    /// Suggested output file name
    pub filename: Option<String>,
    /// Last-modified time to restore on the assembled target
    pub mtime: Option<DateTime<Utc>>,
    /// Block size in bytes, nonzero
    pub block_size: u32,
    /// Total target size in bytes
    pub length: u64,
    /// Sequential-match factor from `Hash-Lengths` (1 or 2)
    pub seq_matches: u8,
    /// Stored bytes of the weak rolling checksum (2..=4)
    pub weak_len: u8,
    /// Stored bytes of the MD4 strong hash (1..=16)
    pub strong_len: u8,
    /// Location of the data resource, relative or absolute
    pub url: String,
    /// Whole-content SHA-1 of the target, 40 hex digits
    pub sha1: String,
}

impl Header {
    /// Number of blocks covering the target, counting the short tail block.
    pub fn block_count(&self) -> usize {
        self.length.div_ceil(self.block_size as u64) as usize
    }

    /// Effective byte width of the final block.
    pub fn last_block_size(&self) -> u32 {
        if self.length == 0 {
            0
        } else {
            ((self.length - 1) % self.block_size as u64) as u32 + 1
        }
    }

    /// Bytes one block-sum record occupies in the binary table.
    pub fn block_sum_width(&self) -> usize {
        self.weak_len as usize + self.strong_len as usize
    }
}

/// Per-block checksum record: truncated weak rolling sum plus truncated MD4.
///
/// `strong` is zero-padded past the header's `strong_len`, so whole-record
/// equality and hashing are well-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockSum {
    pub weak: u32,
    pub strong: [u8; STRONG_SIZE],
}

/// A decoded control file: immutable header plus block sums in target order.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFile {
    pub header: Header,
    pub block_sums: Vec<BlockSum>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(block_size: u32, length: u64) -> Header {
        Header {
            version: FORMAT_VERSION.to_string(),
            filename: None,
            mtime: None,
            block_size,
            length,
            seq_matches: 1,
            weak_len: 4,
            strong_len: 16,
            url: "data".to_string(),
            sha1: "0".repeat(40),
        }
    }

    #[test]
    fn test_block_count() {
        assert_eq!(header(1024, 0).block_count(), 0);
        assert_eq!(header(1024, 1).block_count(), 1);
        assert_eq!(header(1024, 1024).block_count(), 1);
        assert_eq!(header(1024, 1025).block_count(), 2);
        assert_eq!(header(1024, 10 * 1024).block_count(), 10);
    }

    #[test]
    fn test_last_block_size() {
        assert_eq!(header(1024, 0).last_block_size(), 0);
        assert_eq!(header(1024, 1).last_block_size(), 1);
        assert_eq!(header(1024, 1024).last_block_size(), 1024);
        assert_eq!(header(1024, 1025).last_block_size(), 1);
        assert_eq!(header(1024, 2047).last_block_size(), 1023);
    }
}
