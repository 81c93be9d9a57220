//! Error types for the XMP codec.
//!
//! [`Error`] is what callers see from the write path. [`ParseError`] is the
//! lowest layer's failure type; the read path turns it into "no XMP found".

use thiserror::Error;

use crate::container::ImageFormat;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the write path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("not a {format} file: missing signature")]
    FormatMismatch { format: ImageFormat },

    #[error("XMP payload of {size} bytes exceeds the {limit}-byte {format} segment limit")]
    CapacityExceeded {
        format: ImageFormat,
        size: usize,
        limit: usize,
    },

    #[error("WebP has no VP8X, VP8 or VP8L chunk to derive a canvas from")]
    MissingBitstream,
}

/// Expected failures while scanning a container or parsing an XMP packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("record at offset {offset} is truncated")]
    Truncated { offset: usize },

    #[error("expected a marker at offset {offset}, found 0x{byte:02X}")]
    BadMarker { offset: usize, byte: u8 },

    #[error("invalid length {length} at offset {offset}")]
    BadLength { offset: usize, length: usize },

    #[error("XMP packet is not well-formed: {0}")]
    Xml(String),
}
