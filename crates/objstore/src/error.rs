//! Error types for the object store

use binstream::StreamError;
use orb::{OrbError, RemoteError};
use thiserror::Error;

/// Facility name carried by store failures on the wire
pub const OBJSTORE_FACILITY: &str = "objstore";

pub mod store_code {
    pub const NOT_READY: u32 = 1;
    pub const BAD_KEY: u32 = 2;
    pub const ALREADY_EXISTS: u32 = 3;
    pub const NOT_FOUND: u32 = 4;
    pub const VERSION_CONFLICT: u32 = 5;
    pub const PATH_CONFLICT: u32 = 6;
    pub const CORRUPT: u32 = 7;
    pub const IO: u32 = 8;
    pub const INVALID_STATE: u32 = 9;
    pub const VERSION_OVERFLOW: u32 = 10;
}

/// Object store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store is not initialized")]
    NotReady,

    #[error("Bad key: {0}")]
    BadKey(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u32,
        actual: u32,
    },

    /// An object and a scope cannot share a path
    #[error("Path conflict: {0}")]
    PathConflict(String),

    /// The object already holds the highest representable version
    #[error("Version overflow: {0}")]
    VersionOverflow(String),

    #[error("Corrupt repository: {0}")]
    Corrupt(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("ORB error: {0}")]
    Orb(OrbError),
}

impl StoreError {
    /// The wire form of this error
    pub fn to_remote(&self) -> RemoteError {
        let code = match self {
            StoreError::Orb(e) => return e.to_remote(),
            StoreError::NotReady => store_code::NOT_READY,
            StoreError::BadKey(_) => store_code::BAD_KEY,
            StoreError::AlreadyExists(_) => store_code::ALREADY_EXISTS,
            StoreError::NotFound(_) => store_code::NOT_FOUND,
            StoreError::VersionConflict { .. } => store_code::VERSION_CONFLICT,
            StoreError::PathConflict(_) => store_code::PATH_CONFLICT,
            StoreError::VersionOverflow(_) => store_code::VERSION_OVERFLOW,
            StoreError::Corrupt(_) | StoreError::Stream(_) => store_code::CORRUPT,
            StoreError::InvalidState(_) => store_code::INVALID_STATE,
            StoreError::Io(_) => store_code::IO,
        };
        let message = match self {
            StoreError::BadKey(key)
            | StoreError::AlreadyExists(key)
            | StoreError::NotFound(key)
            | StoreError::PathConflict(key)
            | StoreError::VersionOverflow(key) => key.clone(),
            StoreError::VersionConflict {
                key,
                expected,
                actual,
            } => format!("{}:{}:{}", expected, actual, key),
            other => other.to_string(),
        };
        RemoteError::new(OBJSTORE_FACILITY, code, message)
    }

    fn from_remote(remote: RemoteError) -> Self {
        let message = remote.message.clone();
        match remote.code {
            store_code::NOT_READY => StoreError::NotReady,
            store_code::BAD_KEY => StoreError::BadKey(message),
            store_code::ALREADY_EXISTS => StoreError::AlreadyExists(message),
            store_code::NOT_FOUND => StoreError::NotFound(message),
            store_code::PATH_CONFLICT => StoreError::PathConflict(message),
            store_code::VERSION_OVERFLOW => StoreError::VersionOverflow(message),
            store_code::CORRUPT => StoreError::Corrupt(message),
            store_code::INVALID_STATE => StoreError::InvalidState(message),
            store_code::VERSION_CONFLICT => {
                let mut parts = message.splitn(3, ':');
                match (
                    parts.next().and_then(|v| v.parse().ok()),
                    parts.next().and_then(|v| v.parse().ok()),
                    parts.next(),
                ) {
                    (Some(expected), Some(actual), Some(key)) => StoreError::VersionConflict {
                        key: key.to_string(),
                        expected,
                        actual,
                    },
                    _ => StoreError::Orb(OrbError::Remote(remote)),
                }
            }
            _ => StoreError::Orb(OrbError::Remote(remote)),
        }
    }
}

/// Store failures become remote errors at dispatch
impl From<StoreError> for OrbError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Orb(e) => e,
            other => OrbError::Remote(other.to_remote()),
        }
    }
}

/// Remote store failures are mapped back onto their variants
impl From<OrbError> for StoreError {
    fn from(err: OrbError) -> Self {
        match err {
            OrbError::Remote(remote) if remote.facility == OBJSTORE_FACILITY => {
                StoreError::from_remote(remote)
            }
            other => StoreError::Orb(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_through_remote() {
        let cases = vec![
            StoreError::NotReady,
            StoreError::BadKey("no/slash".into()),
            StoreError::AlreadyExists("/a".into()),
            StoreError::NotFound("/b".into()),
            StoreError::PathConflict("/c".into()),
            StoreError::VersionOverflow("/e".into()),
            StoreError::VersionConflict {
                key: "/d:with:colons".into(),
                expected: 3,
                actual: 5,
            },
        ];
        for err in cases {
            let text = err.to_string();
            let back = StoreError::from(OrbError::from(err));
            assert_eq!(back.to_string(), text);
        }
    }

    #[test]
    fn test_io_error_is_remote_with_code() {
        let err = StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        let remote = err.to_remote();
        assert!(remote.is(OBJSTORE_FACILITY, store_code::IO));
    }

    #[test]
    fn test_other_facilities_stay_wrapped() {
        let err = StoreError::from(OrbError::Timeout);
        assert!(matches!(err, StoreError::Orb(OrbError::Timeout)));
    }
}
