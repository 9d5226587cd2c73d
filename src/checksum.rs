//! Checksum primitives: rolling weak sum, truncated MD4, whole-file SHA-1

use crate::error::{Error, Result};
use md4::Md4;
use sha1::{Digest, Sha1};
use std::io::Read;

/// Full width of a stored weak checksum in bytes
pub const WEAK_SIZE: usize = 4;

/// Full width of a stored strong hash in bytes
pub const STRONG_SIZE: usize = 16;

/// Mask retaining the `weak_len` most-significant bytes of a weak value.
///
/// Control files truncate the weak checksum to `weak_len` bytes; computed
/// values must be reduced with the same mask before index lookups.
pub fn weak_mask(weak_len: u8) -> u32 {
    debug_assert!((1..=WEAK_SIZE as u8).contains(&weak_len));
    u32::MAX << (8 * (WEAK_SIZE as u32 - weak_len as u32))
}

/// Weak checksum of a full window, from scratch.
pub fn weak_sum(window: &[u8]) -> u32 {
    RollingSum::new(window).value()
}

/// MD4 over a window, truncated to `strong_len` bytes and zero-padded to
/// [`STRONG_SIZE`] so whole-array comparison is well-defined.
pub fn strong_sum(window: &[u8], strong_len: u8) -> [u8; STRONG_SIZE] {
    let digest = Md4::digest(window);
    let mut out = [0u8; STRONG_SIZE];
    let n = (strong_len as usize).min(STRONG_SIZE);
    out[..n].copy_from_slice(&digest[..n]);
    out
}

/// Hex SHA-1 of everything remaining in the reader.
pub fn sha1_hex<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| Error::io("reading for SHA-1", e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Rolling weak checksum over a fixed-size window.
///
/// Two wrapping 16-bit halves: `a` is the plain byte sum, `b` weights each
/// byte by its distance from the window end. Dropping the oldest byte and
/// appending a new one is O(1) via [`RollingSum::roll`]; the emitted value
/// is `(b << 16) | a`.
#[derive(Debug, Clone, Copy)]
pub struct RollingSum {
    a: u16,
    b: u16,
    window_size: u16,
}

impl RollingSum {
    /// Compute the checksum of an initial window from scratch.
    pub fn new(window: &[u8]) -> Self {
        let mut a: u16 = 0;
        let mut b: u16 = 0;
        let mut weight = window.len() as u16;

        for &byte in window {
            a = a.wrapping_add(byte as u16);
            b = b.wrapping_add(weight.wrapping_mul(byte as u16));
            weight = weight.wrapping_sub(1);
        }

        Self {
            a,
            b,
            window_size: window.len() as u16,
        }
    }

    /// Current checksum value.
    pub fn value(&self) -> u32 {
        ((self.b as u32) << 16) | self.a as u32
    }

    /// Slide the window by one byte: drop `old`, append `new`.
    pub fn roll(&mut self, old: u8, new: u8) {
        self.a = self.a.wrapping_sub(old as u16).wrapping_add(new as u16);
        self.b = self
            .b
            .wrapping_sub(self.window_size.wrapping_mul(old as u16))
            .wrapping_add(self.a);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rolling_matches_from_scratch() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let window = 16;

        let mut rolling = RollingSum::new(&data[..window]);
        for pos in 1..=data.len() - window {
            rolling.roll(data[pos - 1], data[pos + window - 1]);
            assert_eq!(
                rolling.value(),
                weak_sum(&data[pos..pos + window]),
                "divergence at offset {pos}"
            );
        }
    }

    #[test]
    fn test_weak_sum_is_content_sensitive() {
        assert_ne!(weak_sum(b"aaaabbbb"), weak_sum(b"bbbbaaaa"));
        assert_eq!(weak_sum(b"aaaabbbb"), weak_sum(b"aaaabbbb"));
    }

    #[test]
    fn test_weak_mask_widths() {
        assert_eq!(weak_mask(4), 0xffff_ffff);
        assert_eq!(weak_mask(3), 0xffff_ff00);
        assert_eq!(weak_mask(2), 0xffff_0000);
    }

    #[test]
    fn test_strong_sum_truncation_pads_with_zeros() {
        let full = strong_sum(b"hello", 16);
        let truncated = strong_sum(b"hello", 5);
        assert_eq!(truncated[..5], full[..5]);
        assert!(truncated[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_strong_sum_distinguishes_content() {
        assert_ne!(strong_sum(b"block one", 16), strong_sum(b"block two", 16));
    }

    #[test]
    fn test_sha1_hex_known_value() {
        // SHA-1 of the empty input
        let mut empty: &[u8] = b"";
        assert_eq!(
            sha1_hex(&mut empty).unwrap(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    proptest! {
        #[test]
        fn prop_roll_equals_from_scratch(
            data in proptest::collection::vec(any::<u8>(), 9..200),
        ) {
            let window = 8;
            let mut rolling = RollingSum::new(&data[..window]);
            for pos in 1..=data.len() - window {
                rolling.roll(data[pos - 1], data[pos + window - 1]);
                prop_assert_eq!(rolling.value(), weak_sum(&data[pos..pos + window]));
            }
        }
    }
}
