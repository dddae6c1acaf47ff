//! Call envelopes and framing
//!
//! ```text
//! Frame header (20 bytes, little-endian):
//! +--------+--------+--------+--------+
//! |             magic_1               |
//! +--------+--------+--------+--------+
//! |             magic_2               |
//! +--------+--------+--------+--------+
//! |             sequence              |
//! +--------+--------+--------+--------+
//! |            data_bytes             |
//! +--------+--------+--------+--------+
//! |            data_hash              |
//! +--------+--------+--------+--------+
//! ```
//!
//! The payload of a data frame is a binary stream holding either a
//! [`Request`] or a [`Reply`]. A keepalive frame uses its own magic pair and
//! carries no payload.

use crate::error::{OrbError, RemoteError, Result};
use crate::identity::ObjectKey;
use binstream::{BinInStream, BinOutStream};
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const FRAME_MAGIC_1: u32 = 0x4F52_4231;
pub const FRAME_MAGIC_2: u32 = 0xC0DE_F00D;
pub const KEEPALIVE_MAGIC_1: u32 = 0xFEAD_BEAF;
pub const KEEPALIVE_MAGIC_2: u32 = 0xBEAF_DEAD;

/// Modulus of the payload hash
pub const PAYLOAD_HASH_MODULUS: u32 = 65521;

/// Hash carried in the header and checked on read
pub fn payload_hash(data: &[u8]) -> u32 {
    let sum = data.iter().fold(0u64, |acc, b| acc + u64::from(*b));
    (sum % u64::from(PAYLOAD_HASH_MODULUS)) as u32
}

/// Kind of frame, taken from its magic pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    KeepAlive,
}

/// Frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameKind,
    pub sequence: u32,
    pub data_bytes: u32,
    pub data_hash: u32,
}

impl FrameHeader {
    pub const SIZE: usize = 20;

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let (m1, m2) = match self.kind {
            FrameKind::Data => (FRAME_MAGIC_1, FRAME_MAGIC_2),
            FrameKind::KeepAlive => (KEEPALIVE_MAGIC_1, KEEPALIVE_MAGIC_2),
        };
        buf.put_u32_le(m1);
        buf.put_u32_le(m2);
        buf.put_u32_le(self.sequence);
        buf.put_u32_le(self.data_bytes);
        buf.put_u32_le(self.data_hash);
    }

    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(OrbError::Format(format!(
                "frame header needs {} bytes, have {}",
                Self::SIZE,
                data.len()
            )));
        }
        let m1 = data.get_u32_le();
        let m2 = data.get_u32_le();
        let kind = match (m1, m2) {
            (FRAME_MAGIC_1, FRAME_MAGIC_2) => FrameKind::Data,
            (KEEPALIVE_MAGIC_1, KEEPALIVE_MAGIC_2) => FrameKind::KeepAlive,
            _ => {
                return Err(OrbError::Format(format!(
                    "bad frame magic {:08x}/{:08x}",
                    m1, m2
                )))
            }
        };
        let header = Self {
            kind,
            sequence: data.get_u32_le(),
            data_bytes: data.get_u32_le(),
            data_hash: data.get_u32_le(),
        };
        if kind == FrameKind::KeepAlive && header.data_bytes != 0 {
            return Err(OrbError::Format("keepalive frame with payload".into()));
        }
        Ok(header)
    }
}

/// A complete frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn data(sequence: u32, payload: Bytes) -> Result<Self> {
        let data_bytes = u32::try_from(payload.len()).map_err(|_| OrbError::FrameTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        Ok(Self {
            header: FrameHeader {
                kind: FrameKind::Data,
                sequence,
                data_bytes,
                data_hash: payload_hash(&payload),
            },
            payload,
        })
    }

    pub fn keepalive() -> Self {
        Self {
            header: FrameHeader {
                kind: FrameKind::KeepAlive,
                sequence: 0,
                data_bytes: 0,
                data_hash: 0,
            },
            payload: Bytes::new(),
        }
    }

    pub fn is_keepalive(&self) -> bool {
        self.header.kind == FrameKind::KeepAlive
    }

    /// Check the payload against the header's size and hash
    pub fn verify(&self) -> Result<()> {
        if self.payload.len() != self.header.data_bytes as usize {
            return Err(OrbError::Format(format!(
                "frame payload is {} bytes, header says {}",
                self.payload.len(),
                self.header.data_bytes
            )));
        }
        let hash = payload_hash(&self.payload);
        if hash != self.header.data_hash {
            return Err(OrbError::Format(format!(
                "frame payload hash {} does not match header hash {}",
                hash, self.header.data_hash
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + self.payload.len());
        self.header.encode(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// An outgoing call
#[derive(Debug, Clone)]
pub struct Request {
    target: ObjectKey,
    sequence: u32,
    method: String,
    payload: Bytes,
}

impl Request {
    pub fn new(target: ObjectKey, sequence: u32, method: impl Into<String>, payload: Bytes) -> Self {
        Self {
            target,
            sequence,
            method: method.into(),
            payload,
        }
    }

    pub fn target(&self) -> &ObjectKey {
        &self.target
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The encoded input parameters
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn to_frame(&self) -> Result<Frame> {
        let mut out = BinOutStream::with_context(Default::default(), 64 + self.payload.len());
        out.write(&self.target)?;
        out.write(&self.sequence)?;
        out.write(self.method.as_str())?;
        out.write(&self.payload)?;
        Frame::data(self.sequence, out.into_bytes())
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let mut input = BinInStream::new(frame.payload.clone())?;
        let target: ObjectKey = input.read()?;
        let sequence: u32 = input.read()?;
        let method: String = input.read()?;
        let payload: Bytes = input.read()?;
        input.expect_end()?;

        if sequence != frame.header.sequence {
            return Err(OrbError::SequenceMismatch {
                expected: frame.header.sequence,
                got: sequence,
            });
        }
        Ok(Self {
            target,
            sequence,
            method,
            payload,
        })
    }
}

/// The answer to a [`Request`], correlated by sequence number
#[derive(Debug, Clone)]
pub struct Reply {
    sequence: u32,
    success: bool,
    payload: Bytes,
}

impl Reply {
    pub fn success(sequence: u32, payload: Bytes) -> Self {
        Self {
            sequence,
            success: true,
            payload,
        }
    }

    pub fn failure(sequence: u32, error: &RemoteError) -> Result<Self> {
        let out = BinOutStream::new().with(error)?;
        Ok(Self {
            sequence,
            success: false,
            payload: out.into_bytes(),
        })
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The output stream on success, or the server's error re-raised
    pub fn into_result(self) -> Result<BinInStream> {
        let mut input = BinInStream::new(self.payload)?;
        if self.success {
            return Ok(input);
        }
        let remote: RemoteError = input.read()?;
        Err(OrbError::Remote(remote))
    }

    pub fn to_frame(&self) -> Result<Frame> {
        let mut out = BinOutStream::with_context(Default::default(), 16 + self.payload.len());
        out.write(&self.sequence)?;
        out.write(&self.success)?;
        out.write(&self.payload)?;
        Frame::data(self.sequence, out.into_bytes())
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let mut input = BinInStream::new(frame.payload.clone())?;
        let sequence: u32 = input.read()?;
        let success: bool = input.read()?;
        let payload: Bytes = input.read()?;
        input.expect_end()?;

        if sequence != frame.header.sequence {
            return Err(OrbError::SequenceMismatch {
                expected: frame.header.sequence,
                got: sequence,
            });
        }
        Ok(Self {
            sequence,
            success,
            payload,
        })
    }
}
