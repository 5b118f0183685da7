//! BGZF block parsing and single-threaded block decompression.
//!
//! A BGZF file is a sequence of independent gzip members, each at most
//! 64 KiB uncompressed, whose 18-byte header carries the total block size in
//! a `BC` extra subfield (`BSIZE = total - 1`). The last 8 bytes of every
//! block hold the CRC32 and uncompressed size of its payload.

use std::fs::File;
use std::io::{Seek, SeekFrom};

use flate2::{Decompress, FlushDecompress, Status};

use super::{read_retry, FillStatus};
use crate::detect::is_bgzf_header;
use crate::error::{Result, TextError};
use crate::CHUNK_SIZE;

/// Fixed part of a BGZF block header.
pub(crate) const BGZF_HEADER_LEN: usize = 18;
/// Smallest legal `BSIZE` value (header + trailer with empty payload).
pub(crate) const BGZF_MIN_BSIZE: usize = 25;
/// Hard cap on a block's uncompressed size.
pub(crate) const BGZF_MAX_ISIZE: usize = 65536;

/// One parsed block: payload location within an input buffer plus the
/// trailer's expectations.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockSpec {
    pub data_start: usize,
    pub in_size: usize,
    pub out_size: usize,
    pub crc: u32,
}

/// Parse the block at `buf[pos..]`, if one is completely present.
///
/// `Ok(None)` means the data at `pos` is a prefix of a block and more input
/// is needed. Malformed headers and oversized blocks are hard errors.
pub(crate) fn parse_block(buf: &[u8], pos: usize) -> Result<Option<BlockSpec>> {
    let n_in = buf.len() - pos;
    if n_in <= BGZF_MIN_BSIZE {
        return Ok(None);
    }
    let hdr = &buf[pos..];
    if !is_bgzf_header(hdr) {
        return Err(TextError::invalid_bgzf());
    }
    let bsize_minus1 = u16::from_le_bytes([hdr[16], hdr[17]]) as usize;
    if bsize_minus1 < BGZF_MIN_BSIZE {
        return Err(TextError::invalid_bgzf());
    }
    if bsize_minus1 >= n_in {
        return Ok(None);
    }
    let in_size = bsize_minus1 - BGZF_MIN_BSIZE;
    let crc = u32::from_le_bytes([
        hdr[in_size + 18],
        hdr[in_size + 19],
        hdr[in_size + 20],
        hdr[in_size + 21],
    ]);
    let out_size = u32::from_le_bytes([
        hdr[in_size + 22],
        hdr[in_size + 23],
        hdr[in_size + 24],
        hdr[in_size + 25],
    ]) as usize;
    if out_size > BGZF_MAX_ISIZE {
        return Err(TextError::invalid_bgzf());
    }
    Ok(Some(BlockSpec {
        data_start: pos + BGZF_HEADER_LEN,
        in_size,
        out_size,
        crc,
    }))
}

/// Inflate one block payload into an exactly-sized output slice and verify
/// its CRC32. A zero-size output (the EOF marker block) is accepted as-is.
pub(crate) fn inflate_block_into(data: &[u8], out: &mut [u8], crc: u32) -> Result<()> {
    if !out.is_empty() {
        let mut inflate = Decompress::new(false);
        let status = inflate
            .decompress(data, out, FlushDecompress::Finish)
            .map_err(|_| TextError::invalid_bgzf())?;
        if status != Status::StreamEnd || inflate.total_out() as usize != out.len() {
            return Err(TextError::invalid_bgzf());
        }
    }
    if crc32fast::hash(out) != crc {
        return Err(TextError::invalid_bgzf());
    }
    Ok(())
}

/// Block-at-a-time BGZF decoder for the sync reader.
///
/// Decompresses directly into the caller's window, one block per step, and
/// stops without consuming when the next block would overflow the window.
pub(crate) struct BgzfStream {
    file: File,
    in_buf: Box<[u8]>,
    in_pos: usize,
    in_len: usize,
    at_eof: bool,
}

impl BgzfStream {
    pub(crate) fn new(file: File, probe: &[u8]) -> Self {
        let mut in_buf = vec![0u8; CHUNK_SIZE].into_boxed_slice();
        in_buf[..probe.len()].copy_from_slice(probe);
        BgzfStream {
            file,
            in_buf,
            in_pos: 0,
            in_len: probe.len(),
            at_eof: false,
        }
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| TextError::read_err(&e))?;
        self.reset_state(&[]);
        Ok(())
    }

    pub(crate) fn reseed(&mut self, file: File, probe: &[u8]) {
        self.file = file;
        self.reset_state(probe);
    }

    fn reset_state(&mut self, probe: &[u8]) {
        self.in_buf[..probe.len()].copy_from_slice(probe);
        self.in_pos = 0;
        self.in_len = probe.len();
        self.at_eof = false;
    }

    /// Hand the file and unconsumed compressed input over, for upgrading a
    /// sync reader to the multi-threaded stream.
    pub(crate) fn into_parts(self) -> (File, Box<[u8]>, usize, usize, bool) {
        (self.file, self.in_buf, self.in_pos, self.in_len, self.at_eof)
    }

    pub(crate) fn fill(&mut self, out: &mut [u8]) -> Result<(usize, FillStatus)> {
        if self.in_len == 0 && self.at_eof {
            return Ok((0, FillStatus::Eof));
        }
        let mut written = 0;
        loop {
            match parse_block(&self.in_buf[..self.in_len], self.in_pos)? {
                Some(spec) => {
                    if spec.out_size > out.len() - written {
                        // Not enough window for this block; leave it for the
                        // next cycle.
                        break;
                    }
                    let data = &self.in_buf[spec.data_start..spec.data_start + spec.in_size];
                    inflate_block_into(data, &mut out[written..written + spec.out_size], spec.crc)?;
                    self.in_pos = spec.data_start + spec.in_size + 8;
                    written += spec.out_size;
                }
                None => {
                    // Partial block (or nothing): slide the residue down and
                    // load more.
                    let residue = self.in_len - self.in_pos;
                    self.in_buf.copy_within(self.in_pos..self.in_len, 0);
                    let n = read_retry(&mut self.file, &mut self.in_buf[residue..])
                        .map_err(|e| TextError::read_err(&e))?;
                    self.in_pos = 0;
                    self.in_len = residue + n;
                    if n == 0 {
                        self.at_eof = true;
                        if residue != 0 {
                            return Err(TextError::invalid_bgzf());
                        }
                        break;
                    }
                }
            }
        }
        Ok((written, FillStatus::Window))
    }
}
