//! rzsync - differential file transfer over HTTP range requests
//!
//! Reconstructs a target file described by a zsync control file, reusing
//! matching blocks found in local inputs and fetching only the missing
//! byte ranges from the data URL.

pub mod checksum;
pub mod cli;
pub mod control;
pub mod engine;
pub mod error;
pub mod events;
pub mod http;
pub mod index;
pub mod output;
pub mod progress;
pub mod range;
pub mod stream;
pub mod zsync;

pub use error::{Error, Result};
pub use range::ContentRange;
pub use zsync::{CancelFlag, Options, Zsync};
