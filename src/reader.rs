//! Synchronous line reader.
//!
//! [`TextReader`] is the single-threaded half of the crate: the consumer
//! drives every refill, and between refills it walks a window of complete
//! lines inside one reusable buffer. The same open/probe/validate logic is
//! shared with [`crate::TextStream`].

use std::fs::File;
use std::path::Path;

use memchr::{memchr, memchr_iter};

use crate::decode::{read_retry, Decoder, FillStatus};
use crate::detect::{sniff, FileKind};
use crate::error::{Result, TextError};
use crate::scan::{is_pathologically_long, last_newline};
use crate::{CHUNK_SIZE, DEFAULT_MAX_LINE_LEN};

/// How a reader is opened.
///
/// The default configuration reads lines of up to [`DEFAULT_MAX_LINE_LEN`]
/// bytes out of a growable 2 MiB buffer.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Cap on a single line's byte length, newline included. Zero selects
    /// token mode (only supported by [`crate::TextStream`], and only with
    /// `fixed_buffer`); otherwise must be at least [`CHUNK_SIZE`].
    pub max_line_len: usize,
    /// Line buffer capacity. With `fixed_buffer` this must be at least
    /// `2 * CHUNK_SIZE` and at most `max_line_len + CHUNK_SIZE`.
    pub capacity: usize,
    /// Never reallocate the buffer; a line that cannot fit reports `Nomem`
    /// instead of growing.
    pub fixed_buffer: bool,
    /// Worker count for multi-threaded BGZF decompression; zero picks a
    /// default from the machine's parallelism.
    pub decompress_threads: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            max_line_len: DEFAULT_MAX_LINE_LEN,
            capacity: 2 * CHUNK_SIZE,
            fixed_buffer: false,
            decompress_threads: 0,
        }
    }
}

/// Latched terminal state of a reader.
#[derive(Debug, Clone)]
pub(crate) enum Latch {
    Active,
    Eof,
    Failed(TextError),
}

/// Everything `open` produces before the reader variant takes over. The
/// open file itself lives inside the decoder.
pub(crate) struct OpenedFile {
    pub(crate) kind: FileKind,
    pub(crate) dst: Box<[u8]>,
    pub(crate) dst_len: usize,
    pub(crate) decoder: Decoder,
    pub(crate) empty: bool,
}

/// Open `path`, probe its first 16 bytes, validate the options, and install
/// the matching decoder. `for_stream` selects the multi-threaded BGZF
/// decoder and permits token mode.
pub(crate) fn open_file(path: &Path, opts: &ReaderOptions, for_stream: bool) -> Result<OpenedFile> {
    if opts.max_line_len != 0 || !for_stream {
        if opts.max_line_len < CHUNK_SIZE {
            return Err(TextError::Usage(
                "max_line_len too small (must be at least the 1 MiB chunk size)",
            ));
        }
        if opts.fixed_buffer {
            if opts.capacity < 2 * CHUNK_SIZE {
                return Err(TextError::Usage("capacity too small (2 MiB minimum)"));
            }
            if opts.max_line_len + CHUNK_SIZE < opts.capacity {
                return Err(TextError::Usage(
                    "capacity exceeds max_line_len + chunk size",
                ));
            }
        }
    } else {
        if !opts.fixed_buffer {
            return Err(TextError::Usage("token mode requires a fixed-size buffer"));
        }
        if opts.capacity < 2 * CHUNK_SIZE {
            return Err(TextError::Usage("capacity too small (2 MiB minimum)"));
        }
    }
    let capacity = if opts.fixed_buffer {
        opts.capacity
    } else {
        2 * CHUNK_SIZE
    };

    let mut file = File::open(path).map_err(|e| TextError::Open {
        path: path.display().to_string(),
        msg: e.to_string(),
    })?;

    let mut probe = [0u8; 16];
    let mut nbytes = 0;
    while nbytes < 16 {
        match read_retry(&mut file, &mut probe[nbytes..]) {
            Ok(0) => break,
            Ok(n) => nbytes += n,
            Err(e) => return Err(TextError::read_err(&e)),
        }
    }
    let kind = sniff(&probe[..nbytes]);

    let mut dst = vec![0u8; capacity].into_boxed_slice();
    let mut dst_len = 0;
    if kind == FileKind::Uncompressed {
        dst[..nbytes].copy_from_slice(&probe[..nbytes]);
        dst_len = nbytes;
    }
    let decoder = if for_stream {
        Decoder::new_stream(
            kind,
            file,
            &probe[..nbytes],
            resolve_threads(opts.decompress_threads),
        )?
    } else {
        Decoder::new_sync(kind, file, &probe[..nbytes])?
    };

    Ok(OpenedFile {
        kind,
        dst,
        dst_len,
        decoder,
        empty: nbytes == 0,
    })
}

pub(crate) fn resolve_threads(requested: usize) -> usize {
    if requested != 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

/// Synchronous line reader over plain, gzip, BGZF, or zstd input.
///
/// Lines are yielded as byte slices ending in `\n` out of an internal buffer
/// that is refilled on demand. An unfinished line at the buffer's end is
/// carried to the front of the next refill, growing the buffer when a single
/// line outgrows it (up to `max_line_len`).
///
/// # Example
///
/// ```no_run
/// use lineflow::TextReader;
///
/// # fn main() -> lineflow::Result<()> {
/// let mut reader = TextReader::open("regions.bed")?;
/// while let Some(line) = reader.next_line()? {
///     let _fields = line[..line.len() - 1].split(|&b| b == b'\t');
/// }
/// # Ok(())
/// # }
/// ```
pub struct TextReader {
    pub(crate) decoder: Decoder,
    pub(crate) dst: Box<[u8]>,
    pub(crate) dst_len: usize,
    pub(crate) consume_iter: usize,
    pub(crate) consume_stop: usize,
    pub(crate) max_line_len: usize,
    pub(crate) fixed: bool,
    pub(crate) latch: Latch,
    pub(crate) line_idx: u64,
}

impl TextReader {
    /// Open with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ReaderOptions::default())
    }

    /// Open with explicit options. Token mode (`max_line_len == 0`) is not
    /// supported by the sync reader.
    pub fn open_with<P: AsRef<Path>>(path: P, opts: &ReaderOptions) -> Result<Self> {
        let opened = open_file(path.as_ref(), opts, false)?;
        Ok(TextReader {
            decoder: opened.decoder,
            dst: opened.dst,
            dst_len: opened.dst_len,
            consume_iter: 0,
            consume_stop: 0,
            max_line_len: opts.max_line_len,
            fixed: opts.fixed_buffer,
            latch: if opened.empty { Latch::Eof } else { Latch::Active },
            line_idx: 0,
        })
    }

    /// Detected compression format of the current file.
    pub fn file_kind(&self) -> FileKind {
        self.decoder.kind()
    }

    /// Load the next window of complete lines.
    ///
    /// Returns `Ok(false)` at end of input. The previous window must be fully
    /// consumed first. Errors latch: every later call returns the same error
    /// until the reader is closed.
    pub fn advance(&mut self) -> Result<bool> {
        match &self.latch {
            Latch::Failed(e) => return Err(e.clone()),
            Latch::Eof => return Ok(false),
            Latch::Active => {}
        }
        debug_assert_eq!(self.consume_iter, self.consume_stop);
        let mut line_start = self.consume_stop;
        let mut load_start;
        loop {
            let rem = self.dst_len - line_start;
            let cap = self.dst.len();
            if rem < cap - CHUNK_SIZE {
                if line_start != 0 {
                    self.dst.copy_within(line_start..self.dst_len, 0);
                }
            } else if self.fixed {
                return self.fail(TextError::Nomem(
                    "line does not fit in the fixed-size buffer".to_string(),
                ));
            } else if let Err(e) = self.grow(line_start) {
                return self.fail(e);
            }
            line_start = 0;
            self.dst_len = rem;
            load_start = rem;
            self.consume_iter = 0;

            let cap = self.dst.len();
            let (written, status) = match self.decoder.fill(&mut self.dst[rem..cap]) {
                Ok(r) => r,
                Err(e) => return self.fail(e),
            };
            self.dst_len = rem + written;
            if self.dst_len == 0 {
                self.latch = Latch::Eof;
                return Ok(false);
            }
            if status == FillStatus::Eof {
                // Synthesize the terminating newline if the input lacks one.
                let mut end = self.dst_len;
                if self.dst[end - 1] != b'\n' {
                    self.dst[end] = b'\n';
                    end += 1;
                    self.dst_len = end;
                }
                self.consume_stop = end;
                break;
            }
            match last_newline(&self.dst[load_start..self.dst_len]) {
                Some(p) => {
                    self.consume_stop = load_start + p + 1;
                    break;
                }
                None => {
                    // Buffer full with no newline; retry with more room
                    // unless the line-length cap is already blown.
                    if self.dst_len >= self.max_line_len {
                        return self.fail(TextError::long_line());
                    }
                }
            }
        }
        if is_pathologically_long(&self.dst[..self.consume_stop], load_start, self.max_line_len) {
            return self.fail(TextError::long_line());
        }
        Ok(true)
    }

    /// The current window of complete lines, `[consume_iter, consume_stop)`.
    pub fn block(&self) -> &[u8] {
        &self.dst[self.consume_iter..self.consume_stop]
    }

    /// Mark `nbytes` of the current window as consumed.
    pub fn consume(&mut self, nbytes: usize) {
        self.consume_iter = (self.consume_iter + nbytes).min(self.consume_stop);
    }

    /// Next line, including its terminating `\n`. `Ok(None)` at end of input.
    pub fn next_line(&mut self) -> Result<Option<&[u8]>> {
        if self.consume_iter == self.consume_stop && !self.advance()? {
            return Ok(None);
        }
        let start = self.consume_iter;
        let end = match memchr(b'\n', &self.dst[start..self.consume_stop]) {
            Some(p) => start + p + 1,
            None => self.consume_stop,
        };
        self.consume_iter = end;
        self.line_idx += 1;
        Ok(Some(&self.dst[start..end]))
    }

    /// Skip `n` lines. Returns `Ok(false)` if end of input arrives first.
    pub fn skip_lines(&mut self, mut n: u64) -> Result<bool> {
        while n > 0 {
            if self.consume_iter == self.consume_stop && !self.advance()? {
                return Ok(false);
            }
            let block = &self.dst[self.consume_iter..self.consume_stop];
            let mut seen = 0u64;
            let mut past_last = 0;
            for pos in memchr_iter(b'\n', block) {
                seen += 1;
                past_last = pos + 1;
                if seen == n {
                    break;
                }
            }
            if seen == n {
                self.consume_iter += past_last;
            } else {
                self.consume_iter = self.consume_stop;
            }
            self.line_idx += seen;
            n -= seen;
        }
        Ok(true)
    }

    /// Next line that is neither empty nor all-whitespace, with leading
    /// spaces and tabs stripped. [`Self::line_idx`] reports its 1-based
    /// position afterwards.
    pub fn next_nonempty_line(&mut self) -> Result<Option<&[u8]>> {
        loop {
            if self.consume_iter == self.consume_stop && !self.advance()? {
                return Ok(None);
            }
            let start = self.consume_iter;
            let block = &self.dst[start..self.consume_stop];
            let line_len = match memchr(b'\n', block) {
                Some(p) => p + 1,
                None => block.len(),
            };
            let stripped = block[..line_len]
                .iter()
                .position(|&b| b != b' ' && b != b'\t')
                .unwrap_or(line_len - 1);
            self.consume_iter = start + line_len;
            self.line_idx += 1;
            let c = self.dst[start + stripped];
            if c != b'\n' && c != b'\r' {
                return Ok(Some(&self.dst[start + stripped..start + line_len]));
            }
        }
    }

    /// 1-based count of lines consumed so far.
    pub fn line_idx(&self) -> u64 {
        self.line_idx
    }

    /// Seek back to the start of the input.
    ///
    /// Clears a latched end-of-file; a latched hard error is returned
    /// unchanged.
    pub fn rewind(&mut self) -> Result<()> {
        if let Latch::Failed(e) = &self.latch {
            return Err(e.clone());
        }
        self.decoder.rewind()?;
        self.latch = Latch::Active;
        self.dst_len = 0;
        self.consume_iter = 0;
        self.consume_stop = 0;
        self.line_idx = 0;
        Ok(())
    }

    /// Latched error, if any.
    pub fn last_error(&self) -> Option<&TextError> {
        match &self.latch {
            Latch::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Whether end of input has been reached.
    pub fn is_eof(&self) -> bool {
        matches!(self.latch, Latch::Eof)
    }

    /// Release the file and buffer.
    pub fn close(self) -> Result<()> {
        Ok(())
    }

    fn fail(&mut self, e: TextError) -> Result<bool> {
        self.latch = Latch::Failed(e.clone());
        Err(e)
    }

    fn grow(&mut self, carry_start: usize) -> Result<()> {
        let cap = self.dst.len();
        let mut next = self.max_line_len + CHUNK_SIZE;
        if next / 2 > cap {
            next = cap * 2;
        }
        #[cfg(target_pointer_width = "32")]
        if next >= 0x8000_0000 {
            return Err(TextError::Nomem(
                "line buffer would exceed the address space".to_string(),
            ));
        }
        let mut next_dst = vec![0u8; next].into_boxed_slice();
        let rem = self.dst_len - carry_start;
        next_dst[..rem].copy_from_slice(&self.dst[carry_start..self.dst_len]);
        self.dst = next_dst;
        Ok(())
    }
}
