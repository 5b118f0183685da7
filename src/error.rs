//! Error types for lineflow

use thiserror::Error;

/// Result type alias for lineflow operations
pub type Result<T> = std::result::Result<T, TextError>;

/// Error types that can occur while reading a text source.
///
/// Readers latch the first error they hit and keep returning it until the
/// reader is closed (or, for end-of-file, until a rewind/retarget), so every
/// variant carries owned data and is cheaply cloneable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TextError {
    /// Could not open the input file
    #[error("cannot open {path}: {msg}")]
    Open {
        /// Path that failed to open
        path: String,
        /// OS error text
        msg: String,
    },

    /// OS-level read failure
    #[error("read failed: {0}")]
    Read(String),

    /// Codec-reported decompression failure
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Allocation or buffer growth refused
    #[error("out of memory: {0}")]
    Nomem(String),

    /// Malformed input, e.g. a line exceeding the enforced maximum length
    #[error("{0}")]
    MalformedInput(String),

    /// API misuse (invalid size parameters, open-on-open, ...)
    #[error("improper function call: {0}")]
    Usage(&'static str),

    /// Could not spawn the background read thread
    #[error("failed to create read thread")]
    ThreadCreate,
}

impl TextError {
    pub(crate) fn long_line() -> Self {
        TextError::MalformedInput("Pathologically long line".to_string())
    }

    pub(crate) fn invalid_bgzf() -> Self {
        TextError::Decompress("invalid BGZF".to_string())
    }

    pub(crate) fn read_err(e: &std::io::Error) -> Self {
        TextError::Read(e.to_string())
    }
}
