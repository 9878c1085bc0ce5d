//! CBOR decoding with pluggable tag and simple-value handling.
//!
//! WebAuthn carries attestation objects, COSE keys and authenticator
//! extensions as CBOR. The decoder here produces a [`CborValue`] tree and
//! leaves any bytes after a complete value in the [`ByteStream`], which is how
//! authenticator data locates the end of an embedded public key.

mod decoder;
mod other;
mod stream;
mod tag;
mod value;

use thiserror::Error;

pub use decoder::{Decoder, DEFAULT_MAX_DEPTH};
pub use other::{half_to_f64, OtherHandler, OtherRegistry};
pub use stream::ByteStream;
pub use tag::{TagHandler, TagRegistry};
pub use value::{CborValue, OtherValue};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CborError {
    #[error("unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEnd { needed: usize, available: usize },

    #[error("declared length {declared} exceeds remaining input of {available} bytes")]
    LengthExceedsInput { declared: u64, available: usize },

    #[error("reserved additional info {0}")]
    ReservedAdditionalInfo(u8),

    #[error("indefinite length not allowed for major type {0}")]
    InvalidIndefinite(u8),

    #[error("break marker outside an indefinite-length item")]
    UnexpectedBreak,

    #[error("invalid chunk in indefinite-length string: {0}")]
    InvalidChunk(String),

    #[error("text string is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown tag {0}")]
    UnknownTag(u64),

    #[error("invalid content for tag {tag}: {reason}")]
    InvalidTagContent { tag: u64, reason: String },

    #[error("unsupported simple value: {0}")]
    UnsupportedOther(String),

    #[error("nesting deeper than {0} levels")]
    DepthExceeded(usize),

    #[error("{0} extra bytes after value")]
    TrailingBytes(usize),
}

/// Decode exactly one value from `data` with the default registries.
pub fn decode_one(data: &[u8]) -> Result<CborValue, CborError> {
    Decoder::default().decode_all(data)
}
