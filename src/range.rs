//! Inclusive byte extents of the target file

use std::fmt;

/// An inclusive byte extent `[first, last]` of the target file.
///
/// Displays in the HTTP `Range` header syntax, e.g. `0-1023`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentRange {
    pub first: u64,
    pub last: u64,
}

impl ContentRange {
    /// Create a new range; `first` must not exceed `last`.
    pub fn new(first: u64, last: u64) -> Self {
        debug_assert!(first <= last);
        Self { first, last }
    }

    /// Number of bytes covered by the range.
    pub fn size(&self) -> u64 {
        self.last - self.first + 1
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}
