//! Library-wide error and result types.
//!
//! Only failures that prevent a root object from being built surface as
//! [`Error`]. Everything discovered below the root is recorded on the node
//! itself as a [`crate::object::Validity`].

use std::io;

use thiserror::Error;

use crate::parser::ParserState;

/// Result alias used throughout fwkit.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to produce a root object, or misuse of [`crate::AutoParser`].
#[derive(Debug, Error)]
pub enum Error {
    /// No registered format signature matched the buffer.
    #[error("unrecognized firmware format")]
    UnrecognizedFormat,
    /// [`crate::AutoParser::parse`] was called before the format was queried.
    #[error("format has not been detected yet")]
    NotDetected,
    /// The parser is in a state that does not allow the requested operation.
    #[error("operation not allowed in parser state {0:?}")]
    InvalidState(ParserState),
    /// Header fields are inconsistent with each other or with the buffer.
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),
    /// A declared extent runs past the end of the buffer.
    #[error("truncated: need {needed:#x} bytes, {available:#x} available")]
    Truncated { needed: u64, available: u64 },
    /// A magic/signature field did not match the expected value.
    #[error("bad magic value")]
    BadMagic,
    /// The stream ended before all expected bytes could be read.
    #[error("unexpected end of data")]
    UnexpectedEof,
    /// An offset or size field would read outside the valid region.
    #[error("invalid offset or size")]
    InvalidRange,
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(io::Error),
    /// A fixture file could not be decoded.
    #[error("fixture JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}
