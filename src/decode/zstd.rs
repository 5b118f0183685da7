//! Streaming Zstandard decompression.

use std::fs::File;
use std::io::{Seek, SeekFrom};

use zstd::stream::raw::{Decoder as RawDecoder, InBuffer, Operation, OutBuffer};

use super::{read_retry, FillStatus};
use crate::error::{Result, TextError};
use crate::CHUNK_SIZE;

/// Streaming zstd decompressor with residual-input carry.
///
/// When the context reports it needs input, the unconsumed residue
/// `[in_pos, in_len)` moves to the front of the owned buffer and the rest is
/// refilled from the file. Sequential frames in one file decode back to back.
pub(crate) struct ZstStream {
    file: File,
    ctx: RawDecoder<'static>,
    in_buf: Box<[u8]>,
    in_pos: usize,
    in_len: usize,
    at_eof: bool,
}

impl ZstStream {
    pub(crate) fn new(file: File, probe: &[u8]) -> Result<Self> {
        let mut in_buf = vec![0u8; CHUNK_SIZE].into_boxed_slice();
        in_buf[..probe.len()].copy_from_slice(probe);
        Ok(ZstStream {
            file,
            ctx: new_ctx()?,
            in_buf,
            in_pos: 0,
            in_len: probe.len(),
            at_eof: false,
        })
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| TextError::read_err(&e))?;
        self.reset_state(&[])
    }

    pub(crate) fn reseed(&mut self, file: File, probe: &[u8]) -> Result<()> {
        self.file = file;
        self.reset_state(probe)
    }

    /// Fresh decompression session; `probe` seeds the input buffer (empty on
    /// rewind, where the file re-reads its own frame from offset 0).
    fn reset_state(&mut self, probe: &[u8]) -> Result<()> {
        self.ctx = new_ctx()?;
        self.in_buf[..probe.len()].copy_from_slice(probe);
        self.in_pos = 0;
        self.in_len = probe.len();
        self.at_eof = false;
        Ok(())
    }

    pub(crate) fn fill(&mut self, out: &mut [u8]) -> Result<(usize, FillStatus)> {
        if self.in_len == 0 && self.at_eof {
            return Ok((0, FillStatus::Eof));
        }
        let mut written = 0;
        loop {
            let mut inb = InBuffer {
                src: &self.in_buf[..self.in_len],
                pos: self.in_pos,
            };
            let mut outb = OutBuffer::around(&mut out[written..]);
            self.ctx
                .run(&mut inb, &mut outb)
                .map_err(|e| TextError::Decompress(e.to_string()))?;
            self.in_pos = inb.pos;
            written += outb.pos();
            if written == out.len() {
                return Ok((written, FillStatus::Window));
            }
            // Everything flushable has been flushed; load more input.
            let residue = self.in_len - self.in_pos;
            self.in_buf.copy_within(self.in_pos..self.in_len, 0);
            let n = read_retry(&mut self.file, &mut self.in_buf[residue..])
                .map_err(|e| TextError::read_err(&e))?;
            self.in_pos = 0;
            self.in_len = residue + n;
            if n == 0 {
                self.at_eof = true;
                if residue != 0 {
                    return Err(TextError::Decompress(
                        "unknown zstd prefix at end of file".to_string(),
                    ));
                }
                return Ok((written, FillStatus::Eof));
            }
        }
    }
}

fn new_ctx() -> Result<RawDecoder<'static>> {
    RawDecoder::new().map_err(|e| TextError::Nomem(format!("zstd context: {e}")))
}
