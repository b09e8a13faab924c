//! Error types for the meterreader library.
//!
//! Errors fall into two tiers. Field conditions (a dead link, garbage on the wire,
//! undecodable bytes) are expected while talking to real meters and are turned into
//! "no sample" at the reader boundary. Everything else is an unexpected fault and is
//! propagated to the caller.

use std::time::Duration;

use thiserror::Error;

/// The main error type for meterreader operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure or timeout on the physical link.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Structurally malformed frame.
    #[error("frame validation failed: {kind} (raw: {raw})")]
    FrameValidation {
        /// What was wrong with the frame.
        kind: FrameError,
        /// Offending bytes, hex encoded.
        raw: String,
    },

    /// Response bytes could not be decoded as text.
    #[error("response is not valid text: {source} (raw: {raw})")]
    Encoding {
        /// Underlying UTF-8 error.
        source: std::str::Utf8Error,
        /// Offending bytes, hex encoded.
        raw: String,
    },

    /// A validated frame could not be decoded.
    #[error("frame decoding failed: {source} (raw: {raw})")]
    Decode {
        /// Underlying decoder error.
        source: DecodeError,
        /// Offending bytes, hex encoded.
        raw: String,
    },

    /// Invalid configuration (line settings, address scheme, protocol tag).
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid port filter pattern.
    #[error("invalid port pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Unexpected fault while probing one discovery candidate.
    #[error("probing {address} failed: {source}")]
    Probe {
        /// Address of the candidate port.
        address: String,
        /// The fault raised by the reader.
        source: Box<Error>,
    },
}

impl Error {
    /// Builds a [`Error::FrameValidation`] carrying the offending bytes.
    #[must_use]
    pub fn frame(kind: FrameError, raw: &[u8]) -> Self {
        Self::FrameValidation {
            kind,
            raw: hex::encode(raw),
        }
    }

    /// Builds a [`Error::Encoding`] carrying the offending bytes.
    #[must_use]
    pub fn encoding(source: std::str::Utf8Error, raw: &[u8]) -> Self {
        Self::Encoding {
            source,
            raw: hex::encode(raw),
        }
    }

    /// Builds a [`Error::Decode`] carrying the offending bytes.
    #[must_use]
    pub fn decode(source: DecodeError, raw: &[u8]) -> Self {
        Self::Decode {
            source,
            raw: hex::encode(raw),
        }
    }

    /// Returns true for conditions expected in the field, which a single poll or
    /// discovery attempt absorbs as "no result".
    #[must_use]
    pub const fn is_field_condition(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::FrameValidation { .. } | Self::Encoding { .. } | Self::Decode { .. }
        )
    }

    /// Short category name used in log lines.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::FrameValidation { .. } => "frame validation",
            Self::Encoding { .. } => "encoding",
            Self::Decode { .. } => "decode",
            Self::Config(_) | Self::Pattern(_) => "configuration",
            Self::Probe { .. } => "unexpected fault",
        }
    }
}

/// Link-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No data arrived before the deadline.
    #[error("{operation} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// The read operation that gave up.
        operation: &'static str,
        /// The configured timeout.
        timeout: Duration,
    },

    /// The handle was used before `initialize()`.
    #[error("transport not initialized")]
    NotInitialized,

    /// A `hwgrep://` address matched no available port.
    #[error("no port matches {0}")]
    NoMatchingPort(String),
}

/// Frame-specific validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Frame does not begin with the start escape sequence.
    #[error("malformed start sequence")]
    MalformedStart,

    /// Payload is not terminated by the end escape sequence.
    #[error("malformed end sequence")]
    MalformedEnd,

    /// Trailer does not begin with the end-of-message byte.
    #[error("malformed trailer {0:02x?}")]
    MalformedTrailer(Vec<u8>),

    /// Frame too short to hold markers and trailer.
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    /// Decoded frame does not have exactly two top-level elements.
    #[error("expected 2 top-level elements, got {0}")]
    TopLevel(usize),
}

/// TLV decoding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended inside an element.
    #[error("unexpected end of data at offset {0}")]
    UnexpectedEnd(usize),

    /// Type nibble not defined by the encoding.
    #[error("unknown type-length field 0x{tl:02x} at offset {offset}")]
    UnknownType { tl: u8, offset: usize },

    /// Length field inconsistent with its type.
    #[error("invalid length {length} at offset {offset}")]
    InvalidLength { length: usize, offset: usize },

    /// Element has an unexpected shape.
    #[error("unexpected structure: {0}")]
    Structure(String),

    /// Bytes left over after the last message.
    #[error("{0} trailing bytes after last message")]
    TrailingData(usize),
}

/// Result type alias for meterreader operations.
pub type Result<T> = std::result::Result<T, Error>;
