//! Error types for the broker

use binstream::{BinDecode, BinEncode, Buf, BufMut, StreamContext, StreamError, StreamObject};
use std::fmt;
use thiserror::Error;

/// Facility name used for failures raised by the broker itself
pub const ORB_FACILITY: &str = "orb";

/// Numeric codes for broker-raised failures
pub mod orb_code {
    pub const INTERNAL: u32 = 1;
    pub const UNKNOWN_METHOD: u32 = 2;
    pub const OBJECT_NOT_FOUND: u32 = 3;
    pub const FORMAT: u32 = 4;
    pub const NOT_READY: u32 = 5;
    pub const NOT_FOUND: u32 = 6;
    pub const ALREADY_EXISTS: u32 = 7;
    pub const WRONG_INTERFACE: u32 = 8;
}

/// A failure raised on the server side of a call.
///
/// This is the only error shape that crosses the wire: the facility that
/// raised it, a facility-specific numeric code and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub facility: String,
    pub code: u32,
    pub message: String,
}

impl RemoteError {
    pub fn new(facility: impl Into<String>, code: u32, message: impl Into<String>) -> Self {
        Self {
            facility: facility.into(),
            code,
            message: message.into(),
        }
    }

    /// True if this error came from `facility` with `code`
    pub fn is(&self, facility: &str, code: u32) -> bool {
        self.facility == facility && self.code == code
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.facility, self.code, self.message)
    }
}

impl StreamObject for RemoteError {
    const TYPE_NAME: &'static str = "RemoteError";

    fn encode_fields<B: BufMut>(
        &self,
        buf: &mut B,
        ctx: &StreamContext,
    ) -> binstream::Result<()> {
        self.facility.bin_encode(buf, ctx)?;
        self.code.bin_encode(buf, ctx)?;
        self.message.bin_encode(buf, ctx)
    }

    fn decode_fields<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        Ok(Self {
            facility: String::bin_decode(buf, ctx)?,
            code: u32::bin_decode(buf, ctx)?,
            message: String::bin_decode(buf, ctx)?,
        })
    }

    fn fields_size(&self) -> usize {
        self.facility.bin_size() + 4 + self.message.bin_size()
    }
}

binstream::impl_bin_object!(RemoteError);

/// Broker error types
#[derive(Debug, Error)]
pub enum OrbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream format error: {0}")]
    Stream(#[from] StreamError),

    #[error("format error: {0}")]
    Format(String),

    #[error("not ready")]
    NotReady,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("timeout")]
    Timeout,

    #[error("remote error: {0}")]
    Remote(RemoteError),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("wrong interface: expected {expected}, got {got}")]
    WrongInterface { expected: String, got: String },

    #[error("sequence mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u32, got: u32 },

    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl OrbError {
    /// Convert to the form sent back to a caller.
    ///
    /// Errors that already carry a facility pass through untouched; everything
    /// else is reported under the broker's own facility.
    pub fn to_remote(&self) -> RemoteError {
        let code = match self {
            OrbError::Remote(remote) => return remote.clone(),
            OrbError::Stream(_) | OrbError::Format(_) => orb_code::FORMAT,
            OrbError::NotReady => orb_code::NOT_READY,
            OrbError::NotFound(_) => orb_code::NOT_FOUND,
            OrbError::AlreadyExists(_) => orb_code::ALREADY_EXISTS,
            OrbError::UnknownMethod(_) => orb_code::UNKNOWN_METHOD,
            OrbError::ObjectNotFound(_) => orb_code::OBJECT_NOT_FOUND,
            OrbError::WrongInterface { .. } => orb_code::WRONG_INTERFACE,
            _ => orb_code::INTERNAL,
        };
        RemoteError::new(ORB_FACILITY, code, self.to_string())
    }

    /// The remote error carried by this error, if any
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            OrbError::Remote(remote) => Some(remote),
            _ => None,
        }
    }
}

impl From<RemoteError> for OrbError {
    fn from(err: RemoteError) -> Self {
        OrbError::Remote(err)
    }
}

pub type Result<T> = std::result::Result<T, OrbError>;
