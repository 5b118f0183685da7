//! Streaming gzip decompression.

use std::fs::File;
use std::io::{BufReader, Chain, Cursor, ErrorKind, Read, Seek, SeekFrom};

use flate2::bufread::GzDecoder;

use super::FillStatus;
use crate::error::{Result, TextError};
use crate::CHUNK_SIZE;

const TRUNCATED_GZ: &str = "gzipped file appears to be truncated";

/// The decoder's input: the probed prefix replayed ahead of the open file.
type GzSource = BufReader<Chain<Cursor<Vec<u8>>, File>>;

/// Streaming inflate over a single gzip member, built on
/// [`flate2::bufread::GzDecoder`].
///
/// The 16 probed bytes are chained in front of the file so the decoder sees
/// the member from its first byte. Bytes after the member's end are ignored.
/// Hitting end-of-file while still inside the member is reported as a
/// truncated stream.
///
/// The decoder slot is only `None` transiently while the file is being
/// recovered for a rewind.
pub(crate) struct GzStream {
    dec: Option<GzDecoder<GzSource>>,
    member_done: bool,
}

impl GzStream {
    pub(crate) fn new(file: File, probe: &[u8]) -> Self {
        GzStream {
            dec: Some(new_decoder(file, probe)),
            member_done: false,
        }
    }

    /// Recover the file, seek it back to 0, and start a fresh member (the
    /// header is re-read from the file itself).
    pub(crate) fn rewind(&mut self) -> Result<()> {
        if let Some(dec) = self.dec.take() {
            let (_, mut file) = dec.into_inner().into_inner().into_inner();
            file.seek(SeekFrom::Start(0))
                .map_err(|e| TextError::read_err(&e))?;
            self.dec = Some(new_decoder(file, &[]));
        }
        self.member_done = false;
        Ok(())
    }

    /// Switch to a new file's member; `probe` is its probed prefix. The old
    /// file closes on drop.
    pub(crate) fn reseed(&mut self, file: File, probe: &[u8]) {
        self.dec = Some(new_decoder(file, probe));
        self.member_done = false;
    }

    pub(crate) fn fill(&mut self, out: &mut [u8]) -> Result<(usize, FillStatus)> {
        if self.member_done {
            return Ok((0, FillStatus::Eof));
        }
        let Some(dec) = self.dec.as_mut() else {
            return Ok((0, FillStatus::Eof));
        };
        let mut written = 0;
        while written < out.len() {
            match dec.read(&mut out[written..]) {
                Ok(0) => {
                    // Single-member semantics: the member (and its verified
                    // trailer) is done; anything after it is ignored.
                    self.member_done = true;
                    return Ok((written, FillStatus::Eof));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_gz_error(e)),
            }
        }
        Ok((written, FillStatus::Window))
    }
}

fn new_decoder(file: File, probe: &[u8]) -> GzDecoder<GzSource> {
    let chain = Cursor::new(probe.to_vec()).chain(file);
    GzDecoder::new(BufReader::with_capacity(CHUNK_SIZE, chain))
}

/// flate2 reports mid-member end-of-file as `UnexpectedEof`; header and
/// checksum problems come back as invalid-data errors. Anything else is a
/// real I/O failure.
fn map_gz_error(e: std::io::Error) -> TextError {
    match e.kind() {
        ErrorKind::UnexpectedEof => TextError::Decompress(TRUNCATED_GZ.to_string()),
        ErrorKind::InvalidInput | ErrorKind::InvalidData => TextError::Decompress(e.to_string()),
        _ => TextError::Read(e.to_string()),
    }
}
