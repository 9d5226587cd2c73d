//! Streaming block-match engine
//!
//! Slides a `block_size` window over one local input, probing the weak
//! index after every one-byte advance and confirming candidates with the
//! truncated MD4 before dispatching into the assembler.

use crate::checksum::{strong_sum, weak_mask, RollingSum};
use crate::control::Header;
use crate::error::Result;
use crate::events::EventDispatcher;
use crate::index::BlockIndex;
use crate::output::OutputFile;

/// Scan one local input and copy every block it can prove into the output.
///
/// On a confirmed match the scan skips a whole block: the window just
/// consumed cannot also satisfy an overlapping later target block at finer
/// than block granularity. A miss advances one byte with an O(1) roll.
///
/// Returns the number of blocks dispatched from this input.
pub fn scan_input(
    data: &[u8],
    header: &Header,
    index: &BlockIndex,
    output: &mut OutputFile,
    events: &EventDispatcher,
) -> Result<usize> {
    let block_size = header.block_size as usize;
    if output.is_complete() || data.len() < block_size {
        return Ok(0);
    }

    let mask = weak_mask(header.weak_len);
    let mut filled = 0usize;
    let mut pos = 0usize;
    let mut last_progress = 0usize;
    let mut rolling = RollingSum::new(&data[..block_size]);

    loop {
        let progress = pos / (10 * 1024 * 1024);
        if progress > last_progress {
            last_progress = progress;
            tracing::trace!(pos_mb = pos / (1024 * 1024), filled, "Input scan progress");
        }

        let mut dispatched = 0usize;
        let candidates = index.lookup(rolling.value() & mask);
        if !candidates.is_empty() {
            let window = &data[pos..pos + block_size];
            let strong = strong_sum(window, header.strong_len);
            for entry in candidates {
                if entry.strong != strong {
                    continue;
                }
                for &position in &entry.positions {
                    if output.write_block(position, window)? {
                        events.output_transferred(output.width_of(position) as u64);
                        dispatched += 1;
                    }
                }
            }
        }

        if dispatched > 0 {
            filled += dispatched;
            if output.is_complete() {
                break;
            }
            pos += block_size;
            if pos + block_size > data.len() {
                break;
            }
            rolling = RollingSum::new(&data[pos..pos + block_size]);
        } else {
            if pos + block_size >= data.len() {
                break;
            }
            rolling.roll(data[pos], data[pos + block_size]);
            pos += 1;
        }
    }

    tracing::debug!(
        input_len = data.len(),
        filled,
        remaining = output.blocks_remaining(),
        "Input scan complete"
    );
    Ok(filled)
}
