//! Streaming pull decoders for every supported input format.
//!
//! Each decoder owns the open file and fills a caller-provided output
//! window, carrying residual input across refills. The reader drives the
//! decoder; the decoder never sees the line buffer's bookkeeping.
//!
//! # Design
//!
//! One tagged enum ([`Decoder`]) instead of trait objects: the set of
//! formats is closed, dispatch stays branch-predictable, and per-variant
//! rewind/reseed logic is kept next to the state it manipulates.

mod bgzf;
mod bgzf_mt;
mod gzip;
mod zstd;

pub(crate) use bgzf::{inflate_block_into, BgzfStream};
pub(crate) use bgzf_mt::BgzfMtStream;
pub(crate) use gzip::GzStream;
pub(crate) use zstd::ZstStream;

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use crate::detect::FileKind;
use crate::error::{Result, TextError};
use crate::MAX_BYTES_PER_READ;

/// Why a fill call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FillStatus {
    /// Stopped because of the output window (full, or the next unit would
    /// not fit). More bytes may follow on the next call.
    Window,
    /// Input is exhausted; no further bytes will ever be produced.
    Eof,
}

/// Tagged streaming decoder, one variant per [`FileKind`].
///
/// `Bgzf` is the single-threaded block-at-a-time variant used by the sync
/// reader; `BgzfMt` decompresses block batches on a worker pool and is used
/// by the producer thread.
pub(crate) enum Decoder {
    Plain(PlainStream),
    Gz(GzStream),
    Zst(ZstStream),
    Bgzf(BgzfStream),
    BgzfMt(BgzfMtStream),
}

impl Decoder {
    /// Build a decoder for the sync reader, taking ownership of the open
    /// file, seeded with the probed bytes.
    ///
    /// For `Uncompressed` the probe lands in the line buffer instead, so the
    /// decoder itself carries no seed.
    pub(crate) fn new_sync(kind: FileKind, file: File, probe: &[u8]) -> Result<Self> {
        Ok(match kind {
            FileKind::Uncompressed => Decoder::Plain(PlainStream::new(file)),
            FileKind::Gzip => Decoder::Gz(GzStream::new(file, probe)),
            FileKind::Bgzf => Decoder::Bgzf(BgzfStream::new(file, probe)),
            FileKind::Zstd => Decoder::Zst(ZstStream::new(file, probe)?),
        })
    }

    /// Build a decoder for the producer thread; BGZF gets the worker pool.
    pub(crate) fn new_stream(
        kind: FileKind,
        file: File,
        probe: &[u8],
        threads: usize,
    ) -> Result<Self> {
        Ok(match kind {
            FileKind::Bgzf => Decoder::BgzfMt(BgzfMtStream::new(file, probe, threads)?),
            _ => Self::new_sync(kind, file, probe)?,
        })
    }

    pub(crate) fn kind(&self) -> FileKind {
        match self {
            Decoder::Plain(_) => FileKind::Uncompressed,
            Decoder::Gz(_) => FileKind::Gzip,
            Decoder::Zst(_) => FileKind::Zstd,
            Decoder::Bgzf(_) | Decoder::BgzfMt(_) => FileKind::Bgzf,
        }
    }

    /// Advance the output window as far as possible toward its end.
    ///
    /// Returns the byte count written and why the call stopped. Errors are
    /// terminal; the caller latches them.
    pub(crate) fn fill(&mut self, out: &mut [u8]) -> Result<(usize, FillStatus)> {
        match self {
            Decoder::Plain(s) => s.fill(out),
            Decoder::Gz(s) => s.fill(out),
            Decoder::Zst(s) => s.fill(out),
            Decoder::Bgzf(s) => s.fill(out),
            Decoder::BgzfMt(s) => s.fill(out),
        }
    }

    /// Seek the file back to 0 and reset decoder state.
    pub(crate) fn rewind(&mut self) -> Result<()> {
        match self {
            Decoder::Plain(s) => s.rewind(),
            Decoder::Gz(s) => s.rewind(),
            Decoder::Zst(s) => s.rewind(),
            Decoder::Bgzf(s) => s.rewind(),
            Decoder::BgzfMt(s) => s.rewind(),
        }
    }

    /// Switch to a new file of the same kind, seeded with its probed bytes.
    /// The old file closes on drop.
    pub(crate) fn reseed(&mut self, file: File, probe: &[u8]) -> Result<()> {
        match self {
            Decoder::Plain(s) => s.reseed(file),
            Decoder::Gz(s) => s.reseed(file, probe),
            Decoder::Zst(s) => s.reseed(file, probe)?,
            Decoder::Bgzf(s) => s.reseed(file, probe),
            Decoder::BgzfMt(s) => s.reseed(file, probe),
        }
        Ok(())
    }
}

/// `read` that retries on EINTR.
pub(crate) fn read_retry(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        match file.read(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Raw pass-through for uncompressed files.
///
/// Individual reads are capped at a platform-safe maximum so a single
/// `read(2)` never exceeds what every OS honors.
pub(crate) struct PlainStream {
    file: File,
}

impl PlainStream {
    pub(crate) fn new(file: File) -> Self {
        PlainStream { file }
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| TextError::read_err(&e))?;
        Ok(())
    }

    pub(crate) fn reseed(&mut self, file: File) {
        self.file = file;
    }

    pub(crate) fn fill(&mut self, out: &mut [u8]) -> Result<(usize, FillStatus)> {
        let mut written = 0;
        while written < out.len() {
            let cap = (out.len() - written).min(MAX_BYTES_PER_READ);
            match read_retry(&mut self.file, &mut out[written..written + cap]) {
                Ok(0) => return Ok((written, FillStatus::Eof)),
                Ok(n) => written += n,
                Err(e) => return Err(TextError::read_err(&e)),
            }
        }
        Ok((written, FillStatus::Window))
    }
}
