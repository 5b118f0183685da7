//! lineflow: high-throughput line streaming for large tabular genomics text
//!
//! # Overview
//!
//! lineflow reads newline-delimited text from plain, gzip, BGZF, or
//! Zstandard files, autodetected by magic prefix, and hands the consumer
//! blocks of complete lines out of a single reusable buffer with minimal
//! copying. Two readers share one consumer surface:
//!
//! - [`TextReader`]: synchronous; the consumer drives every refill.
//! - [`TextStream`]: one producer thread overlaps I/O and decompression with
//!   consumer work over a shared wrap-around buffer; BGZF inputs additionally
//!   decompress on a worker pool.
//!
//! ## Quick start
//!
//! ```no_run
//! use lineflow::TextReader;
//!
//! # fn main() -> lineflow::Result<()> {
//! let mut reader = TextReader::open("variants.tsv.gz")?;
//! while let Some(line) = reader.next_line()? {
//!     // `line` includes its terminating b'\n'
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Every yielded block ends at a `\n`; if the file's last byte is not a
//! newline, one is synthesized at end of input so downstream field parsing
//! never needs a special case.

#![warn(missing_docs)]

pub mod detect;
pub mod error;

mod decode;
mod reader;
mod scan;
mod stream;

pub use detect::FileKind;
pub use error::{Result, TextError};
pub use reader::{ReaderOptions, TextReader};
pub use stream::TextStream;

/// Fixed I/O and decompression unit (1 MiB).
pub const CHUNK_SIZE: usize = 1 << 20;

/// Hardcoded cap on a single whitespace-delimited token in token mode.
pub const MAX_TOKEN_LEN: usize = 8 * CHUNK_SIZE;

/// Default cap on a single line's length.
pub const DEFAULT_MAX_LINE_LEN: usize = (1 << 31) - 2 * CHUNK_SIZE;

/// Ceiling on a single `read(2)` call for uncompressed input.
pub(crate) const MAX_BYTES_PER_READ: usize = 0x7FFF_F000;

/// Cacheline granularity used to keep the producer's write bound away from
/// bytes the consumer is still reading.
pub(crate) const CACHELINE: usize = 64;
