//! Decoding and encoding of the control-file wire format
//!
//! A control file is a US-ASCII `Key: Value` header terminated by a blank
//! line, followed by a binary table of `block_count` records of
//! `weak_len + strong_len` bytes each, in target order.

use super::{BlockSum, ControlFile, Header};
use crate::checksum::{STRONG_SIZE, WEAK_SIZE};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// Decode a complete control file from a pre-decoded byte stream.
pub fn decode(data: &[u8]) -> Result<ControlFile> {
    let header_end = data
        .windows(2)
        .position(|w| w == b"\n\n")
        .ok_or_else(|| Error::malformed_control("missing blank line terminating the header"))?;

    let text = std::str::from_utf8(&data[..header_end])
        .map_err(|_| Error::malformed_control("header is not valid ASCII"))?;
    let header = parse_header(text)?;

    let table = &data[header_end + 2..];
    let width = header.block_sum_width();
    let expected = header.block_count() * width;
    if table.len() < expected {
        return Err(Error::malformed_control(format!(
            "block-sum table truncated: expected {} bytes, found {}",
            expected,
            table.len()
        )));
    }

    let mut block_sums = Vec::with_capacity(header.block_count());
    for record in table[..expected].chunks_exact(width) {
        block_sums.push(decode_block_sum(record, &header));
    }

    Ok(ControlFile { header, block_sums })
}

fn parse_header(text: &str) -> Result<Header> {
    let mut version = None;
    let mut filename = None;
    let mut mtime = None;
    let mut block_size = None;
    let mut length = None;
    let mut hash_lengths = None;
    let mut url = None;
    let mut sha1 = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "zsync" => version = Some(value.to_string()),
            "Filename" => filename = Some(value.to_string()),
            "MTime" => mtime = Some(parse_mtime(value)?),
            "Blocksize" => block_size = Some(parse_number::<u32>("Blocksize", value)?),
            "Length" => length = Some(parse_number::<u64>("Length", value)?),
            "Hash-Lengths" => hash_lengths = Some(parse_hash_lengths(value)?),
            "URL" => url = Some(value.to_string()),
            "SHA-1" => sha1 = Some(parse_sha1(value)?),
            _ => {}
        }
    }

    let (seq_matches, weak_len, strong_len) = hash_lengths.ok_or_else(|| missing("Hash-Lengths"))?;
    let block_size = block_size.ok_or_else(|| missing("Blocksize"))?;
    if block_size == 0 {
        return Err(Error::malformed_control("Blocksize must be positive"));
    }

    Ok(Header {
        version: version.ok_or_else(|| missing("zsync"))?,
        filename,
        mtime,
        block_size,
        length: length.ok_or_else(|| missing("Length"))?,
        seq_matches,
        weak_len,
        strong_len,
        url: url.ok_or_else(|| missing("URL"))?,
        sha1: sha1.ok_or_else(|| missing("SHA-1"))?,
    })
}

fn missing(key: &str) -> Error {
    Error::malformed_control(format!("missing required key '{key}'"))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::malformed_control(format!("invalid {key} value '{value}'")))
}

fn parse_mtime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::malformed_control(format!("invalid MTime value '{value}': {e}")))
}

fn parse_hash_lengths(value: &str) -> Result<(u8, u8, u8)> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 3 {
        return Err(Error::malformed_control(format!(
            "invalid Hash-Lengths value '{value}'"
        )));
    }
    let seq_matches = parse_number::<u8>("Hash-Lengths", parts[0].trim())?;
    let weak_len = parse_number::<u8>("Hash-Lengths", parts[1].trim())?;
    let strong_len = parse_number::<u8>("Hash-Lengths", parts[2].trim())?;
    if !(1..=2).contains(&seq_matches) {
        return Err(Error::malformed_control(format!(
            "sequence-matches out of range: {seq_matches}"
        )));
    }
    if !(2..=4).contains(&weak_len) {
        return Err(Error::malformed_control(format!(
            "weak checksum length out of range: {weak_len}"
        )));
    }
    if !(1..=STRONG_SIZE as u8).contains(&strong_len) {
        return Err(Error::malformed_control(format!(
            "strong hash length out of range: {strong_len}"
        )));
    }
    Ok((seq_matches, weak_len, strong_len))
}

fn parse_sha1(value: &str) -> Result<String> {
    if value.len() != 40 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::malformed_control(format!(
            "invalid SHA-1 value '{value}'"
        )));
    }
    Ok(value.to_string())
}

fn decode_block_sum(record: &[u8], header: &Header) -> BlockSum {
    // weak bytes are the most-significant bytes of the checksum, big-endian
    let mut weak = 0u32;
    for (i, &b) in record[..header.weak_len as usize].iter().enumerate() {
        weak |= (b as u32) << (8 * (WEAK_SIZE - 1 - i));
    }
    let mut strong = [0u8; STRONG_SIZE];
    strong[..header.strong_len as usize].copy_from_slice(&record[header.weak_len as usize..]);
    BlockSum { weak, strong }
}

/// Encode a control file back to its wire format.
pub fn encode(control: &ControlFile) -> Vec<u8> {
    let h = &control.header;
    let mut out = Vec::new();
    push_line(&mut out, "zsync", &h.version);
    if let Some(filename) = &h.filename {
        push_line(&mut out, "Filename", filename);
    }
    if let Some(mtime) = &h.mtime {
        push_line(&mut out, "MTime", &format_mtime(mtime));
    }
    push_line(&mut out, "Blocksize", &h.block_size.to_string());
    push_line(&mut out, "Length", &h.length.to_string());
    push_line(
        &mut out,
        "Hash-Lengths",
        &format!("{},{},{}", h.seq_matches, h.weak_len, h.strong_len),
    );
    push_line(&mut out, "URL", &h.url);
    push_line(&mut out, "SHA-1", &h.sha1);
    out.push(b'\n');

    for sum in &control.block_sums {
        out.extend_from_slice(&sum.weak.to_be_bytes()[..h.weak_len as usize]);
        out.extend_from_slice(&sum.strong[..h.strong_len as usize]);
    }
    out
}

fn push_line(out: &mut Vec<u8>, key: &str, value: &str) {
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.push(b'\n');
}

fn format_mtime(mtime: &DateTime<Utc>) -> String {
    mtime.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::generate_from_bytes;

    fn fixture() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(
            b"zsync: 0.6.2\n\
              Filename: sample.bin\n\
              MTime: Fri, 06 Mar 2020 12:00:00 GMT\n\
              Blocksize: 4\n\
              Length: 10\n\
              Hash-Lengths: 1,2,3\n\
              URL: sample.bin\n\
              SHA-1: aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d\n\
              \n",
        );
        // 3 blocks of 2 weak + 3 strong bytes
        data.extend_from_slice(&[
            0x12, 0x34, 0xaa, 0xbb, 0xcc, //
            0x56, 0x78, 0xdd, 0xee, 0xff, //
            0x9a, 0xbc, 0x11, 0x22, 0x33,
        ]);
        data
    }

    #[test]
    fn test_decode_fixture() {
        let control = decode(&fixture()).unwrap();
        let h = &control.header;
        assert_eq!(h.version, "0.6.2");
        assert_eq!(h.filename.as_deref(), Some("sample.bin"));
        assert_eq!(h.block_size, 4);
        assert_eq!(h.length, 10);
        assert_eq!((h.seq_matches, h.weak_len, h.strong_len), (1, 2, 3));
        assert_eq!(h.sha1, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert_eq!(control.block_sums.len(), 3);

        // weak bytes land in the most-significant positions
        assert_eq!(control.block_sums[0].weak, 0x1234_0000);
        assert_eq!(control.block_sums[0].strong[..3], [0xaa, 0xbb, 0xcc]);
        assert_eq!(control.block_sums[0].strong[3..], [0u8; 13]);
        assert_eq!(control.block_sums[2].weak, 0x9abc_0000);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut data = fixture();
        let insert = b"Producer: test suite\n";
        data.splice(0..0, insert.iter().copied());
        assert!(decode(&data).is_ok());
    }

    #[test]
    fn test_missing_required_key() {
        // header without a URL line; rejected before the table is read
        let data = b"zsync: 0.6.2\n\
                     Blocksize: 4\n\
                     Length: 10\n\
                     Hash-Lengths: 1,2,3\n\
                     SHA-1: aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d\n\
                     \n";
        let err = decode(data).unwrap_err();
        assert!(matches!(err, Error::MalformedControl { .. }));
    }

    #[test]
    fn test_truncated_table() {
        let mut data = fixture();
        data.truncate(data.len() - 1);
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, Error::MalformedControl { .. }));
    }

    #[test]
    fn test_non_numeric_length() {
        let data = fixture();
        let data = String::from_utf8_lossy(&data).replace("Length: 10", "Length: ten");
        let err = decode(data.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedControl { .. }));
    }

    #[test]
    fn test_invalid_hash_lengths_rejected() {
        for bad in ["1,5,3", "1,1,3", "3,2,3", "1,2,17", "1,2", "x,y,z"] {
            let data = fixture();
            let data =
                String::from_utf8_lossy(&data).replace("Hash-Lengths: 1,2,3", &format!("Hash-Lengths: {bad}"));
            assert!(
                decode(data.as_bytes()).is_err(),
                "Hash-Lengths '{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn test_roundtrip() {
        let data: Vec<u8> = (0u16..700).map(|i| (i % 251) as u8).collect();
        let control = generate_from_bytes(&data, 64, 3, 5);
        let decoded = decode(&encode(&control)).unwrap();
        assert_eq!(decoded, control);
    }

    #[test]
    fn test_mtime_roundtrip() {
        let stamp = "Fri, 06 Mar 2020 12:00:00 GMT";
        let parsed = parse_mtime(stamp).unwrap();
        assert_eq!(format_mtime(&parsed), stamp);
    }
}
