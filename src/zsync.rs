//! End-to-end assembly orchestration
//!
//! Drives the pipeline: obtain and decode the control file, scan local
//! candidate inputs through the match engine, fetch whatever is still
//! missing over HTTP ranges, and finalize the output.

use crate::control::{codec, ControlFile, Header};
use crate::engine;
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, ZsyncObserver};
use crate::http::HttpClient;
use crate::index::BlockIndex;
use crate::output::OutputFile;
use memmap2::Mmap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

/// Cooperative cancellation flag shared with the caller.
///
/// Observed between local inputs, between fetch batches, and between
/// multipart parts; once raised, the running assembly fails with
/// [`Error::Cancelled`].
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the assembly holding this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-assembly options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Additional local files to scan for reusable blocks
    pub inputs: Vec<PathBuf>,
    /// Output path override; defaults to the control file's `Filename`
    pub output: Option<PathBuf>,
    /// Data URL override; defaults to the control file's `URL` resolved
    /// against the control file location
    pub url: Option<Url>,
}

/// One-file differential transfer driver.
pub struct Zsync {
    http: HttpClient,
    events: EventDispatcher,
    cancel: CancelFlag,
}

impl Zsync {
    pub fn new() -> Self {
        Self::with_observers(Vec::new())
    }

    /// Create a driver dispatching events to the given observers.
    pub fn with_observers(observers: Vec<Box<dyn ZsyncObserver>>) -> Self {
        Self {
            http: HttpClient::new(),
            events: EventDispatcher::new(observers),
            cancel: CancelFlag::new(),
        }
    }

    /// Flag that cancels this driver's running assembly when raised.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Assemble the target described by `control` (an HTTP(S) URL or a
    /// local path to a control file). Returns the path of the finished
    /// target file.
    pub async fn sync(&self, control: &str, options: &Options) -> Result<PathBuf> {
        self.events.sync_started(control);
        match self.run(control, options).await {
            Ok(path) => {
                self.events.sync_complete();
                Ok(path)
            }
            Err(err) => {
                self.events.sync_failed(&err);
                Err(err)
            }
        }
    }

    async fn run(&self, control: &str, options: &Options) -> Result<PathBuf> {
        let (control_url, control_bytes) = self.load_control(control).await?;
        let control_file = codec::decode(&control_bytes)?;
        let header = &control_file.header;
        tracing::info!(
            length = header.length,
            block_size = header.block_size,
            blocks = header.block_count(),
            "Decoded control file"
        );

        let target = target_path(header, options, control);
        let data_url = data_url(header, control_url.as_ref(), options.url.as_ref())?;

        let index = BlockIndex::build(&control_file);
        let output = OutputFile::create(&target, header)?;
        let temp_path = output.temp_path().to_path_buf();
        self.events.output_write_started(&target, header.length);

        match self.assemble(&control_file, &index, &data_url, options, output).await {
            Ok(path) => Ok(path),
            Err(err) => {
                // the temp file is only kept for checksum-mismatch diagnosis
                if !matches!(err, Error::ChecksumMismatch { .. }) {
                    let _ = std::fs::remove_file(&temp_path);
                }
                Err(err)
            }
        }
    }

    async fn assemble(
        &self,
        control: &ControlFile,
        index: &BlockIndex,
        data_url: &Url,
        options: &Options,
        mut output: OutputFile,
    ) -> Result<PathBuf> {
        for input in candidate_inputs(output.path(), options) {
            self.cancel.check()?;
            if output.is_complete() {
                break;
            }
            self.scan_one(&input, control, index, &mut output)?;
        }

        if !output.is_complete() {
            let missing = output.missing_ranges();
            tracing::info!(
                ranges = missing.len(),
                blocks = output.blocks_remaining(),
                url = %data_url,
                "Fetching missing ranges"
            );
            self.http
                .fetch_ranges(data_url, &missing, &mut output, &self.events, &self.cancel)
                .await?;
            debug_assert!(output.is_complete());
        }

        let path = output.finalize()?;
        self.events.output_complete();
        Ok(path)
    }

    fn scan_one(
        &self,
        input: &Path,
        control: &ControlFile,
        index: &BlockIndex,
        output: &mut OutputFile,
    ) -> Result<()> {
        let file = match std::fs::File::open(input) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(path = %input.display(), error = %err, "Skipping unreadable input");
                return Ok(());
            }
        };
        let len = file
            .metadata()
            .map_err(|e| Error::io("reading input metadata", e))?
            .len();
        if len == 0 {
            return Ok(());
        }

        self.events.input_read_started(input, len);
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::io("memory mapping input", e))?;
        let filled = engine::scan_input(&mmap, &control.header, index, output, &self.events)?;
        tracing::info!(path = %input.display(), filled, "Scanned local input");
        self.events.input_transferred(len);
        self.events.input_complete();
        Ok(())
    }

    async fn load_control(&self, control: &str) -> Result<(Option<Url>, Vec<u8>)> {
        if let Ok(url) = Url::parse(control) {
            if matches!(url.scheme(), "http" | "https") {
                let (length, mut body) = self.http.get(&url).await?;
                self.events
                    .control_download_started(&url, length.unwrap_or(0));
                let mut bytes = Vec::new();
                let total = body.read_to_end(&mut bytes).await?;
                self.events.control_transferred(total);
                self.events.control_complete();
                return Ok((Some(url), bytes));
            }
        }

        let path = Path::new(control);
        let length = std::fs::metadata(path)
            .map_err(|e| Error::io("reading control file metadata", e))?
            .len();
        self.events.control_read_started(path, length);
        let bytes =
            std::fs::read(path).map_err(|e| Error::io("reading control file", e))?;
        self.events.control_transferred(length);
        self.events.control_complete();
        Ok((None, bytes))
    }
}

impl Default for Zsync {
    fn default() -> Self {
        Self::new()
    }
}

/// The target itself (when present) is always scanned first; explicit
/// inputs follow in the given order.
fn candidate_inputs(target: &Path, options: &Options) -> Vec<PathBuf> {
    let mut inputs = Vec::with_capacity(options.inputs.len() + 1);
    if target.exists() {
        inputs.push(target.to_path_buf());
    }
    for input in &options.inputs {
        if !inputs.contains(input) {
            inputs.push(input.clone());
        }
    }
    inputs
}

fn target_path(header: &Header, options: &Options, control: &str) -> PathBuf {
    if let Some(output) = &options.output {
        return output.clone();
    }
    // only the file-name component of the advertised name is trusted
    if let Some(name) = header.filename.as_deref().and_then(|n| Path::new(n).file_name()) {
        return PathBuf::from(name);
    }
    let base = control.rsplit('/').next().unwrap_or(control);
    PathBuf::from(base.strip_suffix(".zsync").unwrap_or(base))
}

fn data_url(header: &Header, control_url: Option<&Url>, over: Option<&Url>) -> Result<Url> {
    if let Some(url) = over {
        return Ok(url.clone());
    }
    match control_url {
        Some(base) => base.join(&header.url).map_err(|e| {
            Error::malformed_control(format!("unresolvable URL '{}': {e}", header.url))
        }),
        None => Url::parse(&header.url).map_err(|_| {
            Error::transport(format!(
                "control file URL '{}' is relative; pass an absolute data URL",
                header.url
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::FORMAT_VERSION;

    fn header(filename: Option<&str>, url: &str) -> Header {
        Header {
            version: FORMAT_VERSION.to_string(),
            filename: filename.map(String::from),
            mtime: None,
            block_size: 2048,
            length: 4096,
            seq_matches: 1,
            weak_len: 4,
            strong_len: 16,
            url: url.to_string(),
            sha1: "0".repeat(40),
        }
    }

    #[test]
    fn test_target_path_prefers_explicit_output() {
        let options = Options {
            output: Some(PathBuf::from("/tmp/out.bin")),
            ..Default::default()
        };
        let path = target_path(&header(Some("ignored.bin"), "x"), &options, "file.zsync");
        assert_eq!(path, PathBuf::from("/tmp/out.bin"));
    }

    #[test]
    fn test_target_path_sanitizes_advertised_filename() {
        let path = target_path(
            &header(Some("../../etc/passwd"), "x"),
            &Options::default(),
            "file.zsync",
        );
        assert_eq!(path, PathBuf::from("passwd"));
    }

    #[test]
    fn test_target_path_falls_back_to_control_name() {
        let path = target_path(
            &header(None, "x"),
            &Options::default(),
            "http://mirror/dist/image.iso.zsync",
        );
        assert_eq!(path, PathBuf::from("image.iso"));
    }

    #[test]
    fn test_data_url_resolution() {
        let base = Url::parse("http://mirror/dist/image.iso.zsync").unwrap();
        let url = data_url(&header(None, "image.iso"), Some(&base), None).unwrap();
        assert_eq!(url.as_str(), "http://mirror/dist/image.iso");

        // absolute URL in the header wins over the base path
        let url = data_url(&header(None, "http://cdn/image.iso"), Some(&base), None).unwrap();
        assert_eq!(url.as_str(), "http://cdn/image.iso");

        // override beats everything
        let over = Url::parse("http://other/image.iso").unwrap();
        let url = data_url(&header(None, "image.iso"), Some(&base), Some(&over)).unwrap();
        assert_eq!(url.as_str(), "http://other/image.iso");
    }

    #[test]
    fn test_data_url_relative_without_base_errors() {
        let err = data_url(&header(None, "image.iso"), None, None).unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(flag.check().is_ok());
        flag.clone().cancel();
        assert!(matches!(flag.check(), Err(Error::Cancelled)));
    }
}
