//! Stream error types

use thiserror::Error;

/// Largest length prefix a decoder will honour
pub const MAX_ALLOCATION_SIZE: usize = 16 * 1024 * 1024;

/// Binary stream encoding/decoding errors
#[derive(Debug, Error)]
pub enum StreamError {
    /// Buffer underflow - not enough data
    #[error("buffer underflow: needed {needed} bytes, have {have}")]
    BufferUnderflow { needed: usize, have: usize },

    /// A marker byte was not the one expected at this point
    #[error("bad stream marker: expected {expected:#04x}, got {got:#04x}")]
    BadMarker { expected: u8, got: u8 },

    /// Unknown endianness tag at the start of a stream
    #[error("bad endian tag: {0:#04x}")]
    BadEndianTag(u8),

    /// A polymorphic record carried an unexpected type name
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    /// Invalid enum discriminant
    #[error("invalid enum value: {0}")]
    InvalidEnumValue(u32),

    /// Invalid boolean byte
    #[error("invalid boolean value: {0}")]
    InvalidBool(u8),

    /// Generic malformed data
    #[error("format error: {0}")]
    Format(String),

    /// Length prefix exceeds the allocation limit
    #[error("allocation of {requested} bytes exceeds limit of {limit}")]
    AllocationLimitExceeded { requested: usize, limit: usize },

    /// UTF-8 decoding error
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
}

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;
