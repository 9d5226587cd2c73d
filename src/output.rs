//! Block-addressed sparse output assembler
//!
//! Accepts block writes from the match engine and byte-range deliveries
//! from the fetch driver into a `<target>.part` temp file, tracks per-block
//! completion, and finalizes with a whole-content SHA-1 gate followed by an
//! atomic rename and mtime restore.

use crate::checksum::sha1_hex;
use crate::control::Header;
use crate::error::{Error, Result};
use crate::range::ContentRange;
use crate::stream::ChunkReader;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use futures::Stream;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Sparse writer assembling one target file.
pub struct OutputFile {
    path: PathBuf,
    temp_path: PathBuf,
    file: File,
    block_size: u32,
    last_block_size: u32,
    length: u64,
    sha1: String,
    mtime: Option<DateTime<Utc>>,
    completed: Vec<bool>,
    blocks_remaining: usize,
}

impl OutputFile {
    /// Open the temp file `<target>.part` next to the target path.
    pub fn create(path: &Path, header: &Header) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!("{file_name}.part"));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::io("creating parent directories", e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| Error::io("creating temp output file", e))?;

        let block_count = header.block_count();
        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            file,
            block_size: header.block_size,
            last_block_size: header.last_block_size(),
            length: header.length,
            sha1: header.sha1.clone(),
            mtime: header.mtime,
            completed: vec![false; block_count],
            blocks_remaining: block_count,
        })
    }

    /// Target path this assembly will produce.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temp file backing the assembly.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Total target size in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn block_count(&self) -> usize {
        self.completed.len()
    }

    pub fn blocks_remaining(&self) -> usize {
        self.blocks_remaining
    }

    pub fn is_complete(&self) -> bool {
        self.blocks_remaining == 0
    }

    /// Effective byte width of the block at `position`.
    pub fn width_of(&self, position: usize) -> u32 {
        if position + 1 == self.completed.len() {
            self.last_block_size
        } else {
            self.block_size
        }
    }

    /// Write one block's bytes at its target position.
    ///
    /// Filled is terminal: returns false without touching the file when the
    /// position was already filled. `window` must hold at least the block's
    /// effective width.
    pub fn write_block(&mut self, position: usize, window: &[u8]) -> Result<bool> {
        if self.completed[position] {
            return Ok(false);
        }
        let width = self.width_of(position) as usize;
        debug_assert!(window.len() >= width);

        self.file
            .seek(SeekFrom::Start(position as u64 * self.block_size as u64))
            .map_err(|e| Error::io("seeking output file", e))?;
        self.file
            .write_all(&window[..width])
            .map_err(|e| Error::io(format!("writing block {position}"), e))?;

        self.completed[position] = true;
        self.blocks_remaining -= 1;
        Ok(true)
    }

    /// Stream one delivered byte range into the file and mark its blocks.
    ///
    /// The range must start on a block boundary and end either one byte
    /// before a block boundary or at the end of the file.
    pub async fn receive_range<S>(
        &mut self,
        range: ContentRange,
        body: &mut ChunkReader<S>,
    ) -> Result<()>
    where
        S: Stream<Item = Result<Bytes>> + Unpin,
    {
        let block_size = self.block_size as u64;
        if range.first % block_size != 0 {
            return Err(Error::malformed_response(format!(
                "range {range} does not start on a block boundary"
            )));
        }
        if (range.last + 1) % block_size != 0 && range.last + 1 != self.length {
            return Err(Error::malformed_response(format!(
                "range {range} does not end on a block boundary"
            )));
        }
        if range.last + 1 > self.length {
            return Err(Error::malformed_response(format!(
                "range {range} exceeds file length {}",
                self.length
            )));
        }

        self.file
            .seek(SeekFrom::Start(range.first))
            .map_err(|e| Error::io("seeking output file", e))?;
        let mut remaining = range.size();
        while remaining > 0 {
            let max = remaining.min(usize::MAX as u64) as usize;
            let chunk = body
                .next_chunk(max)
                .await?
                .ok_or_else(|| Error::malformed_response("body ended inside a range"))?;
            self.file
                .write_all(&chunk)
                .map_err(|e| Error::io("writing range to output file", e))?;
            remaining -= chunk.len() as u64;
        }

        let first_block = (range.first / block_size) as usize;
        let last_block = if range.last + 1 == self.length {
            self.completed.len() - 1
        } else {
            ((range.last + 1) / block_size - 1) as usize
        };
        for position in first_block..=last_block {
            if !self.completed[position] {
                self.completed[position] = true;
                self.blocks_remaining -= 1;
            }
        }
        Ok(())
    }

    /// Byte extents still unfilled, ascending and coalesced.
    ///
    /// Every extent starts on a block boundary; the final extent is clamped
    /// to the last byte of the file rather than the padded block end.
    pub fn missing_ranges(&self) -> Vec<ContentRange> {
        let block_size = self.block_size as u64;
        let mut ranges = Vec::new();
        let mut start: Option<u64> = None;
        for (i, &filled) in self.completed.iter().enumerate() {
            if filled {
                if let Some(first) = start.take() {
                    ranges.push(ContentRange::new(first, i as u64 * block_size - 1));
                }
            } else {
                if start.is_none() {
                    start = Some(i as u64 * block_size);
                }
                if i + 1 == self.completed.len() {
                    if let Some(first) = start.take() {
                        ranges.push(ContentRange::new(first, self.length - 1));
                    }
                }
            }
        }
        ranges
    }

    /// Verify the assembled content and move it into place.
    ///
    /// Re-reads the temp file computing SHA-1; on mismatch the temp file is
    /// left on disk for diagnosis. On success the temp file replaces the
    /// target (atomically where the filesystem allows) and the control
    /// file's mtime is restored.
    pub fn finalize(mut self) -> Result<PathBuf> {
        self.file
            .flush()
            .map_err(|e| Error::io("flushing output file", e))?;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::io("rewinding output file", e))?;
        let computed = sha1_hex(&mut self.file)?;
        if !computed.eq_ignore_ascii_case(&self.sha1) {
            return Err(Error::ChecksumMismatch {
                expected: self.sha1.clone(),
                computed,
            });
        }

        drop(self.file);
        if let Err(rename_err) = std::fs::rename(&self.temp_path, &self.path) {
            // cross-device moves fall back to a non-atomic replace
            tracing::debug!(error = %rename_err, "Atomic rename failed, copying instead");
            std::fs::copy(&self.temp_path, &self.path)
                .map_err(|e| Error::io("replacing target file", e))?;
            std::fs::remove_file(&self.temp_path)
                .map_err(|e| Error::io("removing temp file", e))?;
        }

        if let Some(mtime) = self.mtime {
            let file_time = FileTime::from_system_time(mtime.into());
            filetime::set_file_mtime(&self.path, file_time)
                .map_err(|e| Error::io("restoring modification time", e))?;
        }

        Ok(self.path)
    }
}
