//! Control-file generation and codec round-trip tests

use rzsync::checksum::sha1_hex;
use rzsync::control::{codec, generate, generate_from_bytes, GenerateOptions};
use std::io::Write;
use tempfile::TempDir;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 37 % 241) as u8).collect()
}

#[test]
fn test_generated_control_file_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let data = pattern(5000);
    let file_path = dir.path().join("payload.bin");
    std::fs::write(&file_path, &data).unwrap();

    let control = generate(
        &file_path,
        &GenerateOptions {
            block_size: Some(512),
            url: Some("http://mirror/payload.bin".to_string()),
            ..Default::default()
        },
    )
    .unwrap();

    let control_path = dir.path().join("payload.bin.zsync");
    std::fs::write(&control_path, codec::encode(&control)).unwrap();

    let decoded = codec::decode(&std::fs::read(&control_path).unwrap()).unwrap();
    assert_eq!(decoded, control);
    assert_eq!(decoded.header.filename.as_deref(), Some("payload.bin"));
    assert_eq!(decoded.header.url, "http://mirror/payload.bin");
    assert_eq!(decoded.header.block_count(), 10);
    assert!(decoded.header.mtime.is_some());
}

#[test]
fn test_generated_sha1_matches_file_content() {
    let dir = TempDir::new().unwrap();
    let data = pattern(3333);
    let file_path = dir.path().join("payload.bin");
    std::fs::write(&file_path, &data).unwrap();

    let control = generate(&file_path, &GenerateOptions::default()).unwrap();

    let mut file = std::fs::File::open(&file_path).unwrap();
    assert_eq!(control.header.sha1, sha1_hex(&mut file).unwrap());
}

#[test]
fn test_block_sums_independent_of_generation_path() {
    let data = pattern(10_000);
    let from_bytes = generate_from_bytes(&data, 1024, 3, 8);

    let dir = TempDir::new().unwrap();
    let file_path = dir.path().join("payload.bin");
    let mut file = std::fs::File::create(&file_path).unwrap();
    file.write_all(&data).unwrap();
    drop(file);

    let from_file = generate(
        &file_path,
        &GenerateOptions {
            block_size: Some(1024),
            ..Default::default()
        },
    )
    .unwrap();

    // hash lengths differ between the two paths; compare at the shared width
    let shared = from_bytes.header.strong_len.min(from_file.header.strong_len) as usize;
    assert_eq!(from_bytes.block_sums.len(), from_file.block_sums.len());
    for (a, b) in from_bytes.block_sums.iter().zip(&from_file.block_sums) {
        assert_eq!(a.strong[..shared], b.strong[..shared]);
    }
}

#[test]
fn test_decode_rejects_truncated_file() {
    let data = pattern(2048);
    let control = generate_from_bytes(&data, 256, 4, 16);
    let mut encoded = codec::encode(&control);
    encoded.truncate(encoded.len() - 7);

    assert!(codec::decode(&encoded).is_err());
}

#[test]
fn test_empty_file_control_round_trips() {
    let control = generate_from_bytes(&[], 2048, 4, 16);
    let decoded = codec::decode(&codec::encode(&control)).unwrap();
    assert_eq!(decoded.header.length, 0);
    assert_eq!(decoded.header.block_count(), 0);
    assert!(decoded.block_sums.is_empty());
}
