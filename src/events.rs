//! Observer surface for assembly lifecycle and transfer progress
//!
//! The data plane never depends on observer behavior: events are fire and
//! forget, and every method defaults to a no-op.

use crate::error::Error;
use crate::range::ContentRange;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

/// Receives lifecycle and progress events from an assembly.
///
/// Implementations shared across concurrent assemblies must tolerate
/// interleaved calls.
pub trait ZsyncObserver: Send + Sync {
    fn sync_started(&self, _control: &str) {}
    fn sync_complete(&self) {}
    fn sync_failed(&self, _error: &Error) {}

    fn control_read_started(&self, _path: &Path, _length: u64) {}
    fn control_download_started(&self, _url: &Url, _length: u64) {}
    fn control_transferred(&self, _bytes: u64) {}
    fn control_complete(&self) {}

    fn input_read_started(&self, _path: &Path, _length: u64) {}
    fn input_transferred(&self, _bytes: u64) {}
    fn input_complete(&self) {}

    fn output_write_started(&self, _path: &Path, _length: u64) {}
    fn output_transferred(&self, _bytes: u64) {}
    fn output_complete(&self) {}

    fn remote_download_started(&self, _url: &Url, _ranges: &[ContentRange]) {}
    fn remote_transferred(&self, _bytes: u64) {}
    fn remote_range_received(&self, _range: &ContentRange) {}
    fn remote_download_complete(&self) {}
}

/// Fans events out to the registered observers, in registration order.
#[derive(Default)]
pub struct EventDispatcher {
    observers: Vec<Box<dyn ZsyncObserver>>,
}

macro_rules! forward {
    ($(fn $name:ident($($arg:ident : $ty:ty),*);)*) => {
        $(
            pub fn $name(&self, $($arg: $ty),*) {
                for observer in &self.observers {
                    observer.$name($($arg),*);
                }
            }
        )*
    };
}

impl EventDispatcher {
    pub fn new(observers: Vec<Box<dyn ZsyncObserver>>) -> Self {
        Self { observers }
    }

    forward! {
        fn sync_started(control: &str);
        fn sync_complete();
        fn sync_failed(error: &Error);
        fn control_read_started(path: &Path, length: u64);
        fn control_download_started(url: &Url, length: u64);
        fn control_transferred(bytes: u64);
        fn control_complete();
        fn input_read_started(path: &Path, length: u64);
        fn input_transferred(bytes: u64);
        fn input_complete();
        fn output_write_started(path: &Path, length: u64);
        fn output_transferred(bytes: u64);
        fn output_complete();
        fn remote_download_started(url: &Url, ranges: &[ContentRange]);
        fn remote_transferred(bytes: u64);
        fn remote_range_received(range: &ContentRange);
        fn remote_download_complete();
    }
}

/// Aggregate transfer counters for one assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Bytes read from local inputs and the control file
    pub bytes_read: u64,
    /// Bytes written into the output file from local matches
    pub bytes_written: u64,
    /// Bytes fetched from the remote data resource
    pub bytes_downloaded: u64,
    /// Range batches issued against the remote
    pub range_requests: u64,
}

impl TransferStats {
    /// Share of the target satisfied without downloading, in percent.
    pub fn savings_percent(&self, length: u64) -> f64 {
        if length == 0 {
            100.0
        } else {
            let saved = length.saturating_sub(self.bytes_downloaded);
            saved as f64 / length as f64 * 100.0
        }
    }
}

#[derive(Default)]
struct StatsInner {
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    bytes_downloaded: AtomicU64,
    range_requests: AtomicU64,
}

/// Observer accumulating [`TransferStats`]; cheap to clone and share.
#[derive(Clone, Default)]
pub struct StatsObserver {
    inner: Arc<StatsInner>,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter values.
    pub fn snapshot(&self) -> TransferStats {
        TransferStats {
            bytes_read: self.inner.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.inner.bytes_written.load(Ordering::Relaxed),
            bytes_downloaded: self.inner.bytes_downloaded.load(Ordering::Relaxed),
            range_requests: self.inner.range_requests.load(Ordering::Relaxed),
        }
    }
}

impl ZsyncObserver for StatsObserver {
    fn control_transferred(&self, bytes: u64) {
        self.inner.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    fn input_transferred(&self, bytes: u64) {
        self.inner.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    fn output_transferred(&self, bytes: u64) {
        self.inner.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    fn remote_download_started(&self, _url: &Url, _ranges: &[ContentRange]) {
        self.inner.range_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn remote_transferred(&self, bytes: u64) {
        self.inner.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }
}
