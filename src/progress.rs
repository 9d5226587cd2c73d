//! Progress display for interactive runs
//!
//! An indicatif-backed [`ZsyncObserver`]: one bar tracks whichever phase
//! is active. Kept entirely off the data plane.

use crate::events::{TransferStats, ZsyncObserver};
use crate::range::ContentRange;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use url::Url;

/// Observer rendering per-phase progress bars.
pub struct ProgressObserver {
    multi: MultiProgress,
    current: ProgressBar,
    enabled: bool,
}

impl ProgressObserver {
    pub fn new(enabled: bool) -> Self {
        let multi = MultiProgress::new();

        let current = if enabled {
            let pb = multi.add(ProgressBar::new(0));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} {msg:.dim} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
                    .unwrap()
                    .progress_chars("=>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        Self {
            multi,
            current,
            enabled,
        }
    }

    fn start_phase(&self, message: String, length: u64) {
        self.current.reset();
        self.current.set_length(length);
        self.current.set_message(message);
    }

    /// Print a line without tearing the progress bars.
    pub fn println(&self, message: &str) {
        if self.enabled {
            self.multi.println(message).ok();
        } else {
            println!("{message}");
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ZsyncObserver for ProgressObserver {
    fn control_read_started(&self, path: &Path, length: u64) {
        self.start_phase(format!("reading {}", display_name(path)), length);
    }

    fn control_download_started(&self, url: &Url, length: u64) {
        self.start_phase(format!("fetching {url}"), length);
    }

    fn control_transferred(&self, bytes: u64) {
        self.current.inc(bytes);
    }

    fn input_read_started(&self, path: &Path, length: u64) {
        self.start_phase(format!("scanning {}", display_name(path)), length);
    }

    fn input_transferred(&self, bytes: u64) {
        self.current.inc(bytes);
    }

    fn remote_download_started(&self, _url: &Url, ranges: &[ContentRange]) {
        let total: u64 = ranges.iter().map(ContentRange::size).sum();
        self.start_phase(format!("downloading {} range(s)", ranges.len()), total);
    }

    fn remote_transferred(&self, bytes: u64) {
        self.current.inc(bytes);
    }

    fn sync_complete(&self) {
        self.current.finish_and_clear();
    }

    fn sync_failed(&self, _error: &crate::error::Error) {
        self.current.finish_and_clear();
    }
}

fn display_name(path: &Path) -> String {
    truncate_name(&path.display().to_string(), 40)
}

/// Truncate a file name for display
fn truncate_name(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        name.to_string()
    } else {
        format!("...{}", &name[name.len() - max_len + 3..])
    }
}

/// Print a final summary after a sync
pub fn print_summary(stats: &TransferStats, length: u64) {
    println!("\n=== Transfer Complete ===");
    println!("Target size:       {}", format_size(length));
    println!("Bytes downloaded:  {}", format_size(stats.bytes_downloaded));
    println!("Bytes from local:  {}", format_size(stats.bytes_written));
    println!("Range requests:    {}", stats.range_requests);
    println!(
        "Bandwidth saved:   {:.1}%",
        stats.savings_percent(length)
    );
}

/// Format a byte count for display
pub fn format_size(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("short.bin", 30), "short.bin");
        let long = "a/very/long/path/to/some/deeply/nested/file.bin";
        let truncated = truncate_name(long, 20);
        assert_eq!(truncated.len(), 20);
        assert!(truncated.starts_with("..."));
    }
}
