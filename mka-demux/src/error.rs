//! Matroska demuxer error types.
//!
//! [`MkaError`] carries the detail; [`ErrorKind`] folds it into the handful of
//! failure classes the host distinguishes.

use thiserror::Error;

/// Demuxer error types.
#[derive(Error, Debug)]
pub enum MkaError {
    /// Invalid or missing EBML header.
    #[error("Invalid EBML header: {0}")]
    InvalidEbmlHeader(String),

    /// The first level-0 element after the head is not a segment.
    #[error("Missing segment element")]
    MissingSegment,

    /// Invalid element ID.
    #[error("Invalid element ID at offset {offset}")]
    InvalidElementId {
        /// Byte offset where the invalid ID was found.
        offset: u64,
    },

    /// Invalid element size.
    #[error("Invalid element size at offset {offset}: {message}")]
    InvalidElementSize {
        /// Byte offset where the invalid size was found.
        offset: u64,
        /// Description of the size error.
        message: String,
    },

    /// Missing required element.
    #[error("Missing required element: {0}")]
    MissingElement(String),

    /// Invalid block structure.
    #[error("Invalid block structure: {0}")]
    InvalidBlock(String),

    /// Invalid lacing structure.
    #[error("Invalid lacing: {0}")]
    InvalidLacing(String),

    /// Invalid variable-length integer.
    #[error("Invalid VINT encoding at offset {offset}")]
    InvalidVint {
        /// Byte offset where the invalid VINT was found.
        offset: u64,
    },

    /// VINT overflow (value too large).
    #[error("VINT overflow: value exceeds maximum representable size")]
    VintOverflow,

    /// Recursion limit exceeded.
    #[error("Recursion limit exceeded at depth {depth}")]
    RecursionLimit {
        /// The depth at which recursion was limited.
        depth: u32,
    },

    /// The file has no track with an audio codec.
    #[error("No audio track found")]
    NoAudioTrack,

    /// Track index out of range.
    #[error("Track {index} not found")]
    TrackNotFound {
        /// The catalog index that was requested.
        index: usize,
    },

    /// Content type or path rejected by the input sniffer.
    #[error("Unsupported input: {0}")]
    Unsupported(String),

    /// Seek requested on a sequential stream.
    #[error("Stream is not seekable")]
    NotSeekable,

    /// Seek target could not be reached.
    #[error("Seek failed: {0}")]
    SeekFailed(String),

    /// Tag rewrite refused.
    #[error("Write refused: {0}")]
    WriteRefused(String),

    /// Aborted by the host.
    #[error("Operation aborted")]
    Aborted,

    /// Frame decode failed.
    #[error("Decode error: {0}")]
    Decode(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

/// Failure classes reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed head or segment.
    NotMatroska,
    /// No audio track, or rejected extension/content type.
    UnsupportedFormat,
    /// A required element or a frame could not be decoded.
    DataCorrupt,
    /// Seek on a non-seekable stream.
    NotSeekable,
    /// Retag would overwrite the header or the write failed.
    WriteRefused,
    /// External cancellation.
    Aborted,
}

impl MkaError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MkaError::InvalidEbmlHeader(_) | MkaError::MissingSegment => ErrorKind::NotMatroska,
            MkaError::NoAudioTrack | MkaError::Unsupported(_) => ErrorKind::UnsupportedFormat,
            MkaError::NotSeekable => ErrorKind::NotSeekable,
            MkaError::WriteRefused(_) => ErrorKind::WriteRefused,
            MkaError::Aborted => ErrorKind::Aborted,
            MkaError::Io(e) if e.kind() == std::io::ErrorKind::Interrupted => ErrorKind::Aborted,
            _ => ErrorKind::DataCorrupt,
        }
    }

    /// Whether this error was caused by the abort signal.
    pub fn is_aborted(&self) -> bool {
        self.kind() == ErrorKind::Aborted
    }
}

impl From<String> for MkaError {
    fn from(s: String) -> Self {
        MkaError::Other(s)
    }
}

impl From<&str> for MkaError {
    fn from(s: &str) -> Self {
        MkaError::Other(s.to_string())
    }
}

/// Result type for demuxer operations.
pub type Result<T> = std::result::Result<T, MkaError>;

/// Convert MkaError to mka_core::Error.
impl From<MkaError> for mka_core::Error {
    fn from(err: MkaError) -> Self {
        match err.kind() {
            ErrorKind::Aborted => mka_core::Error::Aborted,
            ErrorKind::NotSeekable => mka_core::Error::NotSeekable,
            ErrorKind::NotMatroska => mka_core::Error::NotMatroska(err.to_string()),
            ErrorKind::UnsupportedFormat => mka_core::Error::UnsupportedFormat(err.to_string()),
            ErrorKind::WriteRefused => mka_core::Error::WriteRefused(err.to_string()),
            ErrorKind::DataCorrupt => match err {
                MkaError::Io(e) => mka_core::Error::Io(e),
                other => mka_core::Error::DataCorrupt(other.to_string()),
            },
        }
    }
}
