//! Error types shared between the demuxer and its host.
//!
//! The host only ever needs to know which of a handful of failure classes
//! occurred; the format crate keeps its detailed error enum and converts into
//! this one at the boundary.

use thiserror::Error;

/// Main error type surfaced to the host.
#[derive(Error, Debug)]
pub enum Error {
    /// The input is not a Matroska file (missing or malformed head or segment).
    #[error("Not a Matroska file: {0}")]
    NotMatroska(String),

    /// The file is Matroska but cannot be played (no audio track, rejected type).
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A required element or a media frame could not be decoded.
    #[error("Data corrupt: {0}")]
    DataCorrupt(String),

    /// A seek was requested on a stream that cannot seek.
    #[error("Stream is not seekable")]
    NotSeekable,

    /// A tag rewrite was refused or the write itself failed.
    #[error("Write refused: {0}")]
    WriteRefused(String),

    /// The operation was interrupted by an external abort signal.
    #[error("Operation aborted")]
    Aborted,

    /// Codec errors raised by a packet decoder.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error was caused by the abort signal.
    pub fn is_aborted(&self) -> bool {
        match self {
            Error::Aborted => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::Interrupted,
            _ => false,
        }
    }
}

/// Errors raised by packet decoders plugged in through [`crate::decoder`].
#[derive(Error, Debug)]
pub enum CodecError {
    /// No decoder is registered for the codec identifier.
    #[error("No decoder found for codec \"{0}\"")]
    NotFound(String),

    /// The decoder rejected its configuration.
    #[error("Decoder configuration error: {0}")]
    DecoderConfig(String),

    /// The decoder rejected a frame.
    #[error("Decode failed: {0}")]
    DecodeFailed(String),
}

/// Result type alias using the host [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;
