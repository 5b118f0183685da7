//! Input format autodetection by magic prefix.
//!
//! The first 16 bytes of a file are enough to distinguish every format this
//! crate reads: a Zstandard frame starts with `28 B5 2F FD`, gzip with
//! `1F 8B 08`, and BGZF is gzip whose first member carries a `BC` extra
//! subfield in a fixed 18-byte header layout. Anything else (including files
//! shorter than four bytes) is treated as uncompressed text.
//!
//! The probed bytes are never thrown away: for plain files they become the
//! first bytes of the line buffer, for compressed files they seed the
//! decoder's input buffer.

/// Compression format of an input file, detected from its first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Plain bytes, passed through untouched
    Uncompressed,
    /// Single-member gzip (RFC 1952)
    Gzip,
    /// Blocked gzip: independently decompressable blocks of at most 64 KiB
    Bgzf,
    /// Zstandard frame(s)
    Zstd,
}

/// Zstandard frame magic, little-endian `0xFD2FB528`.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Classify a file from its probed prefix (up to 16 bytes).
pub fn sniff(probe: &[u8]) -> FileKind {
    if probe.len() < 4 {
        return FileKind::Uncompressed;
    }
    if probe[..4] == ZSTD_MAGIC {
        return FileKind::Zstd;
    }
    // gzip ID1/ID2 bytes, deflate compression method
    if probe[0] != 0x1F || probe[1] != 0x8B || probe[2] != 0x08 {
        return FileKind::Uncompressed;
    }
    if probe.len() == 16 && is_bgzf_header(probe) {
        FileKind::Bgzf
    } else {
        FileKind::Gzip
    }
}

/// Check whether `hdr` starts a BGZF block.
///
/// Layout: gzip magic + CM=8, FLG with FEXTRA set, 4-byte MTIME, XFL, OS,
/// then XLEN=6 and one extra subfield `B` `C` with SLEN=2 whose payload is
/// the 16-bit BSIZE. Requires at least 16 readable bytes.
pub fn is_bgzf_header(hdr: &[u8]) -> bool {
    hdr.len() >= 16
        && hdr[0] == 0x1F
        && hdr[1] == 0x8B
        && hdr[2] == 0x08
        && (hdr[3] & 0x04) != 0
        && hdr[10] == 6
        && hdr[11] == 0
        && hdr[12] == b'B'
        && hdr[13] == b'C'
        && hdr[14] == 2
        && hdr[15] == 0
}
