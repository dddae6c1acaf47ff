//! Error types for the directory service

use binstream::StreamError;
use orb::{OrbError, RemoteError};
use thiserror::Error;

/// Facility name carried by directory failures on the wire
pub const NAMESERV_FACILITY: &str = "nameserv";

pub mod name_code {
    pub const BAD_PATH: u32 = 1;
    pub const NOT_FOUND: u32 = 2;
    pub const ALREADY_EXISTS: u32 = 3;
    pub const NOT_A_SCOPE: u32 = 4;
    pub const NOT_A_BINDING: u32 = 5;
    pub const BAD_EXTRA_INDEX: u32 = 6;
}

/// Directory service errors
#[derive(Debug, Error)]
pub enum NameError {
    #[error("Invalid path: {0}")]
    BadPath(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a scope: {0}")]
    NotAScope(String),

    #[error("Not a binding: {0}")]
    NotABinding(String),

    #[error("Extra value index {0} out of range")]
    BadExtraIndex(u32),

    #[error("ORB error: {0}")]
    Orb(OrbError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

impl NameError {
    fn code(&self) -> Option<u32> {
        match self {
            NameError::BadPath(_) => Some(name_code::BAD_PATH),
            NameError::NotFound(_) => Some(name_code::NOT_FOUND),
            NameError::AlreadyExists(_) => Some(name_code::ALREADY_EXISTS),
            NameError::NotAScope(_) => Some(name_code::NOT_A_SCOPE),
            NameError::NotABinding(_) => Some(name_code::NOT_A_BINDING),
            NameError::BadExtraIndex(_) => Some(name_code::BAD_EXTRA_INDEX),
            NameError::Orb(_) | NameError::Stream(_) => None,
        }
    }

    /// The wire form of this error
    pub fn to_remote(&self) -> RemoteError {
        match (self, self.code()) {
            (NameError::Orb(e), _) => e.to_remote(),
            (NameError::Stream(e), _) => OrbError::Format(e.to_string()).to_remote(),
            (NameError::BadExtraIndex(index), Some(code)) => {
                RemoteError::new(NAMESERV_FACILITY, code, index.to_string())
            }
            (NameError::BadPath(subject), Some(code))
            | (NameError::NotFound(subject), Some(code))
            | (NameError::AlreadyExists(subject), Some(code))
            | (NameError::NotAScope(subject), Some(code))
            | (NameError::NotABinding(subject), Some(code)) => {
                RemoteError::new(NAMESERV_FACILITY, code, subject.clone())
            }
            (other, None) => OrbError::Format(other.to_string()).to_remote(),
        }
    }

    /// True if the directory itself could not be reached or answered badly,
    /// as opposed to rejecting the request
    pub fn is_unavailable(&self) -> bool {
        matches!(self, NameError::Orb(e) if e.remote().is_none())
    }
}

/// Failures raised by the directory become remote errors at dispatch
impl From<NameError> for OrbError {
    fn from(err: NameError) -> Self {
        match err {
            NameError::Orb(e) => e,
            other => OrbError::Remote(other.to_remote()),
        }
    }
}

/// Remote directory failures are mapped back onto their variants
impl From<OrbError> for NameError {
    fn from(err: OrbError) -> Self {
        match err {
            OrbError::Remote(remote) if remote.facility == NAMESERV_FACILITY => {
                let subject = remote.message.clone();
                match remote.code {
                    name_code::BAD_PATH => NameError::BadPath(subject),
                    name_code::NOT_FOUND => NameError::NotFound(subject),
                    name_code::ALREADY_EXISTS => NameError::AlreadyExists(subject),
                    name_code::NOT_A_SCOPE => NameError::NotAScope(subject),
                    name_code::NOT_A_BINDING => NameError::NotABinding(subject),
                    name_code::BAD_EXTRA_INDEX => match subject.parse() {
                        Ok(index) => NameError::BadExtraIndex(index),
                        Err(_) => NameError::Orb(OrbError::Remote(remote)),
                    },
                    _ => NameError::Orb(OrbError::Remote(remote)),
                }
            }
            other => NameError::Orb(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, NameError>;
