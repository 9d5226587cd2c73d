//! HTTP range-fetch driver
//!
//! Issues batched `Range` requests for missing extents and streams
//! single-part and `multipart/byteranges` responses into the assembler.
//! The multipart parser is deliberately lenient: it accepts either
//! `\r\n--boundary` or `--boundary` as the opening delimiter and ignores
//! part headers it does not recognize.

use crate::error::{Error, Result};
use crate::events::EventDispatcher;
use crate::output::OutputFile;
use crate::range::ContentRange;
use crate::stream::ChunkReader;
use crate::zsync::CancelFlag;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{header, StatusCode};
use std::pin::Pin;
use url::Url;

/// Most ranges placed into one `Range` request header
pub const MAX_RANGES_PER_REQUEST: usize = 100;

/// Response body chunks with transport failures mapped into crate errors
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[derive(Debug, PartialEq, Eq)]
enum BatchOutcome {
    /// The requested ranges were delivered
    Ranges,
    /// The server ignored `Range` and sent the whole file; the fetch is done
    WholeBody,
}

/// Thin wrapper around [`reqwest::Client`] for full and partial downloads.
#[derive(Clone, Default)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an externally configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Plain GET of a resource, accepting only `200 OK`.
    ///
    /// Returns the declared content length (when the server sends one) and
    /// a reader over the body.
    pub async fn get(&self, url: &Url) -> Result<(Option<u64>, ChunkReader<BodyStream>)> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::transport_source(format!("GET {url}"), e))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(Error::RemoteMissing {
                    url: url.to_string(),
                })
            }
            status => {
                return Err(Error::transport(format!(
                    "GET {url} returned unexpected status {status}"
                )))
            }
        }

        let length = response.content_length();
        Ok((length, ChunkReader::new(body_stream(response))))
    }

    /// Fetch the given ranges into the assembler.
    ///
    /// Ranges are requested sequentially in batches of at most
    /// [`MAX_RANGES_PER_REQUEST`]. A `200` response means the server ignored
    /// `Range`: the whole body is delivered and no further batches run.
    pub async fn fetch_ranges(
        &self,
        url: &Url,
        ranges: &[ContentRange],
        output: &mut OutputFile,
        events: &EventDispatcher,
        cancel: &CancelFlag,
    ) -> Result<()> {
        for batch in ranges.chunks(MAX_RANGES_PER_REQUEST) {
            cancel.check()?;
            let outcome = self.fetch_batch(url, batch, output, events, cancel).await?;
            if outcome == BatchOutcome::WholeBody {
                break;
            }
        }
        Ok(())
    }

    async fn fetch_batch(
        &self,
        url: &Url,
        batch: &[ContentRange],
        output: &mut OutputFile,
        events: &EventDispatcher,
        cancel: &CancelFlag,
    ) -> Result<BatchOutcome> {
        events.remote_download_started(url, batch);

        let ranges_value = batch
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        tracing::debug!(ranges = batch.len(), "Requesting byte ranges");

        let response = self
            .client
            .get(url.clone())
            .header(header::RANGE, format!("bytes={ranges_value}"))
            .send()
            .await
            .map_err(|e| Error::transport_source(format!("GET {url}"), e))?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::OK => {
                // server ignored Range; the body is the entire file
                tracing::debug!("Server ignored Range header, taking the full body");
                let length = response.content_length().unwrap_or(output.length());
                let range = ContentRange::new(0, length.saturating_sub(1));
                let mut body = ChunkReader::new(body_stream(response));
                output.receive_range(range, &mut body).await?;
                events.remote_transferred(range.size());
                events.remote_range_received(&range);
                events.remote_download_complete();
                return Ok(BatchOutcome::WholeBody);
            }
            StatusCode::NOT_FOUND => {
                return Err(Error::RemoteMissing {
                    url: url.to_string(),
                })
            }
            status => {
                return Err(Error::transport(format!(
                    "GET {url} returned unexpected status {status}"
                )))
            }
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .ok_or_else(|| Error::malformed_response("missing Content-Type header"))?
            .to_str()
            .map_err(|_| Error::malformed_response("undecodable Content-Type header"))?
            .to_string();

        let mut pending: Vec<ContentRange> = batch.to_vec();

        if let Some(boundary) = multipart_boundary(&content_type)? {
            let mut body = ChunkReader::new(body_stream(response));
            loop {
                cancel.check()?;
                let Some(range) = next_part(&mut body, &boundary).await? else {
                    break;
                };
                take_pending(&mut pending, &range)?;
                output.receive_range(range, &mut body).await?;
                events.remote_transferred(range.size());
                events.remote_range_received(&range);
            }
        } else {
            let value = response
                .headers()
                .get(header::CONTENT_RANGE)
                .ok_or_else(|| Error::malformed_response("Content-Range header missing"))?
                .to_str()
                .map_err(|_| Error::malformed_response("undecodable Content-Range header"))?
                .to_string();
            let range = parse_content_range(&value)?;
            take_pending(&mut pending, &range)?;
            let mut body = ChunkReader::new(body_stream(response));
            output.receive_range(range, &mut body).await?;
            events.remote_transferred(range.size());
            events.remote_range_received(&range);
        }

        if !pending.is_empty() {
            return Err(Error::IncompleteRangeResponse {
                missing: pending.len(),
            });
        }
        events.remote_download_complete();
        Ok(BatchOutcome::Ranges)
    }
}

fn body_stream(response: reqwest::Response) -> BodyStream {
    Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::transport_source("reading response body", e))),
    )
}

fn take_pending(pending: &mut Vec<ContentRange>, range: &ContentRange) -> Result<()> {
    match pending.iter().position(|r| r == range) {
        Some(i) => {
            pending.remove(i);
            Ok(())
        }
        None => Err(Error::malformed_response(format!(
            "received range {range} was not requested"
        ))),
    }
}

/// Extract the boundary parameter when the content type is multipart.
///
/// `Ok(None)` means the response is not multipart at all; a multipart
/// subtype other than `byteranges` or a missing boundary is an error.
fn multipart_boundary(content_type: &str) -> Result<Option<Vec<u8>>> {
    let mut params = content_type.split(';');
    let media_type = params.next().unwrap_or("").trim();
    if !media_type.to_ascii_lowercase().starts_with("multipart/") {
        return Ok(None);
    }
    if !media_type.eq_ignore_ascii_case("multipart/byteranges") {
        return Err(Error::malformed_response(format!(
            "unsupported multipart subtype in '{media_type}'"
        )));
    }
    for param in params {
        if let Some((key, value)) = param.split_once('=') {
            if key.trim().eq_ignore_ascii_case("boundary") {
                let value = value.trim().trim_matches('"');
                if value.is_empty() {
                    break;
                }
                return Ok(Some(value.as_bytes().to_vec()));
            }
        }
    }
    Err(Error::malformed_response(
        "missing multipart boundary parameter",
    ))
}

/// Advance the reader to the next part and return its content range.
///
/// `Ok(None)` signals the closing `--boundary--` delimiter. On return the
/// reader is positioned at the first body byte of the part.
async fn next_part<S>(body: &mut ChunkReader<S>, boundary: &[u8]) -> Result<Option<ContentRange>>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    // the delimiter opens with CRLF between parts, or bare dashes at the
    // very start of the body
    match body.read_byte().await? {
        Some(b'\r') => {
            let mut rest = [0u8; 3];
            body.read_exact(&mut rest).await?;
            if &rest != b"\n--" {
                return Err(Error::malformed_response("malformed boundary delimiter"));
            }
        }
        Some(b'-') => {
            if body.read_byte().await? != Some(b'-') {
                return Err(Error::malformed_response("malformed boundary delimiter"));
            }
        }
        _ => return Err(Error::malformed_response("expected multipart delimiter")),
    }

    let mut candidate = vec![0u8; boundary.len()];
    body.read_exact(&mut candidate).await?;
    if candidate != boundary {
        return Err(Error::malformed_response("multipart boundary mismatch"));
    }

    let b1 = body.read_byte().await?;
    let b2 = body.read_byte().await?;
    if b1 == Some(b'-') && b2 == Some(b'-') {
        // closing delimiter: CRLF then end of body
        let mut crlf = [0u8; 2];
        body.read_exact(&mut crlf).await?;
        if &crlf != b"\r\n" || body.read_byte().await?.is_some() {
            return Err(Error::malformed_response(
                "unexpected data after closing delimiter",
            ));
        }
        return Ok(None);
    }
    if b1 != Some(b'\r') || b2 != Some(b'\n') {
        return Err(Error::malformed_response("missing CRLF after boundary"));
    }

    let mut range = None;
    while let Some(line) = read_header_line(body).await? {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-range") {
            if range.is_some() {
                return Err(Error::malformed_response(
                    "multiple Content-Range headers in one part",
                ));
            }
            range = Some(parse_content_range(value.trim())?);
        }
    }
    match range {
        Some(range) => Ok(Some(range)),
        None => Err(Error::malformed_response(
            "part missing Content-Range header",
        )),
    }
}

/// One CRLF-terminated ISO-8859-1 header line; `None` for the blank line.
async fn read_header_line<S>(body: &mut ChunkReader<S>) -> Result<Option<String>>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let mut line: Vec<u8> = Vec::new();
    loop {
        match body.read_byte().await? {
            Some(b'\n') if line.last() == Some(&b'\r') => {
                line.pop();
                if line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(line.iter().map(|&b| b as char).collect()));
            }
            Some(byte) => line.push(byte),
            None => {
                return Err(Error::malformed_response(
                    "body ended inside part headers",
                ))
            }
        }
    }
}

/// Parse a `Content-Range: bytes first-last/total` value.
///
/// A `/total` that disagrees with the range width is recorded but never
/// enforced; servers get this field wrong routinely.
fn parse_content_range(value: &str) -> Result<ContentRange> {
    let invalid = || Error::malformed_response(format!("invalid Content-Range value '{value}'"));
    let rest = value.strip_prefix("bytes ").ok_or_else(invalid)?;
    let (first, rest) = rest.split_once('-').ok_or_else(invalid)?;
    let (last, total) = rest.split_once('/').ok_or_else(invalid)?;

    let first: u64 = first.trim().parse().map_err(|_| invalid())?;
    let last: u64 = last.trim().parse().map_err(|_| invalid())?;
    if last < first {
        return Err(invalid());
    }
    let range = ContentRange::new(first, last);

    if let Ok(total) = total.trim().parse::<u64>() {
        if total != range.size() {
            tracing::debug!(%range, total, "Content-Range total disagrees with range width");
        }
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn reader(data: Vec<u8>) -> ChunkReader<impl Stream<Item = Result<Bytes>> + Unpin> {
        // deliver in small chunks to exercise boundary-spanning reads
        let chunks: Vec<Result<Bytes>> = data
            .chunks(5)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        ChunkReader::new(stream::iter(chunks))
    }

    fn multipart_body(parts: &[(ContentRange, &[u8])], boundary: &str) -> Vec<u8> {
        let mut body = Vec::new();
        for (i, (range, data)) in parts.iter().enumerate() {
            if i > 0 {
                body.extend_from_slice(b"\r\n");
            }
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
            body.extend_from_slice(
                format!("Content-Range: bytes {}-{}/{}\r\n", range.first, range.last, 9999)
                    .as_bytes(),
            );
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(data);
        }
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }

    #[test]
    fn test_parse_content_range() {
        let range = parse_content_range("bytes 0-1023/146515").unwrap();
        assert_eq!(range, ContentRange::new(0, 1023));

        // inconsistent total is tolerated
        let range = parse_content_range("bytes 100-199/1").unwrap();
        assert_eq!(range.size(), 100);

        // unknown total is tolerated
        assert!(parse_content_range("bytes 0-9/*").is_ok());
    }

    #[test]
    fn test_parse_content_range_rejects_garbage() {
        for bad in [
            "0-1023/2048",
            "bytes 1023/2048",
            "bytes 0-1023",
            "bytes ten-20/30",
            "bytes 20-10/30",
        ] {
            assert!(parse_content_range(bad).is_err(), "accepted '{bad}'");
        }
    }

    #[test]
    fn test_multipart_boundary_extraction() {
        let boundary =
            multipart_boundary("multipart/byteranges; boundary=THIS_STRING_SEPARATES").unwrap();
        assert_eq!(boundary.as_deref(), Some(b"THIS_STRING_SEPARATES".as_slice()));

        let boundary = multipart_boundary("multipart/byteranges; charset=x; boundary=\"q\"")
            .unwrap();
        assert_eq!(boundary.as_deref(), Some(b"q".as_slice()));

        assert_eq!(multipart_boundary("application/octet-stream").unwrap(), None);
        assert!(multipart_boundary("multipart/mixed; boundary=x").is_err());
        assert!(multipart_boundary("multipart/byteranges").is_err());
    }

    #[tokio::test]
    async fn test_next_part_walks_all_parts() {
        let parts: [(ContentRange, &[u8]); 2] = [
            (ContentRange::new(0, 4), b"AAAAA"),
            (ContentRange::new(10, 14), b"BBBBB"),
        ];
        let mut body = reader(multipart_body(&parts, "sep"));

        for (expected_range, expected_data) in &parts {
            let range = next_part(&mut body, b"sep").await.unwrap().unwrap();
            assert_eq!(range, *expected_range);
            let mut data = vec![0u8; range.size() as usize];
            body.read_exact(&mut data).await.unwrap();
            assert_eq!(&data, expected_data);
        }

        assert_eq!(next_part(&mut body, b"sep").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_part_accepts_crlf_prefixed_opening_delimiter() {
        let mut data = b"\r\n".to_vec();
        data.extend_from_slice(&multipart_body(&[(ContentRange::new(0, 0), b"X")], "sep"));
        let mut body = reader(data);
        assert!(next_part(&mut body, b"sep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_next_part_rejects_wrong_boundary() {
        let mut body = reader(multipart_body(&[(ContentRange::new(0, 0), b"X")], "other"));
        let err = next_part(&mut body, b"sep__").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_next_part_rejects_duplicate_content_range() {
        let mut data = Vec::new();
        data.extend_from_slice(b"--sep\r\n");
        data.extend_from_slice(b"Content-Range: bytes 0-0/1\r\n");
        data.extend_from_slice(b"Content-Range: bytes 1-1/1\r\n");
        data.extend_from_slice(b"\r\nX");
        let mut body = reader(data);
        let err = next_part(&mut body, b"sep").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_next_part_requires_content_range() {
        let mut data = Vec::new();
        data.extend_from_slice(b"--sep\r\n");
        data.extend_from_slice(b"Content-Type: text/plain\r\n");
        data.extend_from_slice(b"\r\nX");
        let mut body = reader(data);
        let err = next_part(&mut body, b"sep").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_next_part_rejects_trailing_data_after_terminator() {
        let mut data = multipart_body(&[], "sep");
        data.extend_from_slice(b"junk");
        let mut body = reader(data);
        let err = next_part(&mut body, b"sep").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[test]
    fn test_take_pending() {
        let mut pending = vec![ContentRange::new(0, 9), ContentRange::new(20, 29)];
        take_pending(&mut pending, &ContentRange::new(20, 29)).unwrap();
        assert_eq!(pending, vec![ContentRange::new(0, 9)]);

        let err = take_pending(&mut pending, &ContentRange::new(40, 49)).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }
}
