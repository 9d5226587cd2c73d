//! Control-file generation for locally published files
//!
//! Derives the block size and `Hash-Lengths` parameters from the input
//! size, then walks the file once computing per-block checksums and the
//! whole-content SHA-1.

use super::{BlockSum, ControlFile, Header, FORMAT_VERSION};
use crate::checksum::{strong_sum, weak_mask, weak_sum, STRONG_SIZE, WEAK_SIZE};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Files below this size use the smaller default block size
const SMALL_FILE_LIMIT: u64 = 100_000_000;

/// Knobs for control-file generation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Block size override; chosen from the file size when absent
    pub block_size: Option<u32>,
    /// `URL` header value; defaults to the file name
    pub url: Option<String>,
    /// `Filename` header value; defaults to the file name
    pub filename: Option<String>,
}

/// Default block size for a file of the given length.
pub fn default_block_size(length: u64) -> u32 {
    if length < SMALL_FILE_LIMIT {
        2048
    } else {
        4096
    }
}

/// Build a control file describing the file at `path`.
pub fn generate(path: &Path, options: &GenerateOptions) -> Result<ControlFile> {
    let file = File::open(path).map_err(|e| Error::io("opening input file", e))?;
    let metadata = file.metadata().map_err(|e| Error::io("reading metadata", e))?;
    let length = metadata.len();
    let mtime: Option<DateTime<Utc>> = metadata.modified().ok().map(Into::into);

    let block_size = options.block_size.unwrap_or_else(|| default_block_size(length));
    if block_size == 0 {
        return Err(Error::malformed_control("block size must be positive"));
    }
    let seq_matches: u8 = if length > block_size as u64 { 2 } else { 1 };
    let weak_len = derive_weak_len(length, block_size, seq_matches);
    let strong_len = derive_strong_len(length, block_size, seq_matches);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    tracing::debug!(
        length,
        block_size,
        weak_len,
        strong_len,
        "Generating control file"
    );

    let (block_sums, sha1) = scan_blocks(file, length, block_size, weak_len, strong_len)?;

    Ok(ControlFile {
        header: Header {
            version: FORMAT_VERSION.to_string(),
            filename: Some(options.filename.clone().unwrap_or_else(|| name.clone())),
            mtime,
            block_size,
            length,
            seq_matches,
            weak_len,
            strong_len,
            url: options.url.clone().unwrap_or(name),
            sha1,
        },
        block_sums,
    })
}

/// Stored weak-checksum width giving an acceptable false-hit rate for the
/// expected number of rolling probes.
fn derive_weak_len(length: u64, block_size: u32, seq_matches: u8) -> u8 {
    let bits = ((length.max(1) as f64).ln() + (block_size as f64).ln()) / 2f64.ln() - 8.6;
    let bytes = (bits / seq_matches as f64 / 8.0).ceil() as i64;
    bytes.clamp(2, WEAK_SIZE as i64) as u8
}

/// Stored strong-hash width keeping the collision probability over the whole
/// transfer negligible.
fn derive_strong_len(length: u64, block_size: u32, seq_matches: u8) -> u8 {
    let length = length.max(1) as f64;
    let blocks = 1.0 + length / block_size as f64;
    let bits = 20.0 + (length.ln() + blocks.ln()) / 2f64.ln();
    let bytes = (bits / seq_matches as f64 / 8.0).ceil() as i64;
    let floor = ((7.9 + (20.0 + blocks.ln() / 2f64.ln())) / 8.0) as i64;
    bytes.max(floor).clamp(3, STRONG_SIZE as i64) as u8
}

fn scan_blocks(
    mut file: File,
    length: u64,
    block_size: u32,
    weak_len: u8,
    strong_len: u8,
) -> Result<(Vec<BlockSum>, String)> {
    let block_count = length.div_ceil(block_size as u64) as usize;
    let mask = weak_mask(weak_len);
    let mut block_sums = Vec::with_capacity(block_count);
    let mut hasher = Sha1::new();
    let mut block = vec![0u8; block_size as usize];

    for index in 0..block_count {
        let offset = index as u64 * block_size as u64;
        let width = (length - offset).min(block_size as u64) as usize;
        file.read_exact(&mut block[..width])
            .map_err(|e| Error::io("reading input block", e))?;
        hasher.update(&block[..width]);
        // the final short block is hashed with zero padding
        block[width..].fill(0);

        block_sums.push(BlockSum {
            weak: weak_sum(&block) & mask,
            strong: strong_sum(&block, strong_len),
        });
    }

    Ok((block_sums, hex::encode(hasher.finalize())))
}

/// Build a control file for an in-memory buffer with explicit parameters.
///
/// The header carries no `Filename`, `MTime`, or `URL` target; callers fill
/// those in as needed.
pub fn generate_from_bytes(data: &[u8], block_size: u32, weak_len: u8, strong_len: u8) -> ControlFile {
    let length = data.len() as u64;
    let block_count = length.div_ceil(block_size as u64) as usize;
    let mask = weak_mask(weak_len);
    let mut block_sums = Vec::with_capacity(block_count);
    let mut padded = vec![0u8; block_size as usize];

    for chunk in data.chunks(block_size as usize) {
        let window = if chunk.len() == block_size as usize {
            chunk
        } else {
            padded[..chunk.len()].copy_from_slice(chunk);
            padded[chunk.len()..].fill(0);
            &padded
        };
        block_sums.push(BlockSum {
            weak: weak_sum(window) & mask,
            strong: strong_sum(window, strong_len),
        });
    }

    ControlFile {
        header: Header {
            version: FORMAT_VERSION.to_string(),
            filename: None,
            mtime: None,
            block_size,
            length,
            seq_matches: 1,
            weak_len,
            strong_len,
            url: String::new(),
            sha1: hex::encode(Sha1::digest(data)),
        },
        block_sums,
    }
}
