//! Shared fixture builders for integration tests.
#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use tempfile::TempDir;

pub fn write_fixture(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).expect("write fixture");
    path
}

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn zstd_bytes(data: &[u8]) -> Vec<u8> {
    zstd::encode_all(data, 3).unwrap()
}

/// One BGZF block: gzip header with the BC/BSIZE extra subfield, raw-deflate
/// payload, CRC32 + ISIZE trailer.
pub fn bgzf_block(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= 65536);
    let mut deflate = DeflateEncoder::new(Vec::new(), Compression::default());
    deflate.write_all(payload).unwrap();
    let deflated = deflate.finish().unwrap();

    let total = 18 + deflated.len() + 8;
    let mut block = Vec::with_capacity(total);
    block.extend_from_slice(&[0x1F, 0x8B, 0x08, 0x04, 0, 0, 0, 0, 0, 0xFF]);
    block.extend_from_slice(&6u16.to_le_bytes());
    block.extend_from_slice(b"BC");
    block.extend_from_slice(&2u16.to_le_bytes());
    block.extend_from_slice(&((total - 1) as u16).to_le_bytes());
    block.extend_from_slice(&deflated);
    block.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    block.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    block
}

/// Standard 28-byte BGZF end-of-file marker block.
pub fn bgzf_eof_marker() -> Vec<u8> {
    vec![
        0x1F, 0x8B, 0x08, 0x04, 0, 0, 0, 0, 0, 0xFF, 6, 0, b'B', b'C', 2, 0, 27, 0, 3, 0, 0, 0,
        0, 0, 0, 0, 0, 0,
    ]
}

/// Chunk `data` into BGZF blocks of at most `block_size` uncompressed bytes
/// and append the EOF marker.
pub fn bgzf_bytes_with_blocks(data: &[u8], block_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(block_size.max(1)) {
        out.extend_from_slice(&bgzf_block(chunk));
    }
    out.extend_from_slice(&bgzf_eof_marker());
    out
}

pub fn bgzf_bytes(data: &[u8]) -> Vec<u8> {
    bgzf_bytes_with_blocks(data, 60 * 1024)
}
