//! Framed transport
//!
//! Frames are self-delimiting via the `data_bytes` field of the header, so
//! the transport reads the fixed header first and then exactly that many
//! payload bytes. Partially received frames stay buffered across calls,
//! which keeps `read_frame` safe to cancel.

use crate::command::{Frame, FrameHeader};
use crate::error::{OrbError, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default maximum payload size (4 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Transport for reading/writing frames over a byte stream
pub struct OrbTransport<T> {
    inner: T,
    max_frame_size: usize,
    read_buf: BytesMut,
}

impl<T> OrbTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    pub fn with_max_frame_size(mut self, max_size: usize) -> Self {
        self.max_frame_size = max_size;
        self
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

impl<T: AsyncRead + Unpin> OrbTransport<T> {
    /// Read and verify one complete frame
    pub async fn read_frame(&mut self) -> Result<Frame> {
        while self.read_buf.len() < FrameHeader::SIZE {
            if self.fill_buf().await? == 0 {
                if self.read_buf.is_empty() {
                    return Err(OrbError::ConnectionClosed);
                }
                return Err(OrbError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "incomplete frame header",
                )));
            }
        }

        let header = FrameHeader::decode(&self.read_buf[..FrameHeader::SIZE])?;
        let data_bytes = header.data_bytes as usize;
        if data_bytes > self.max_frame_size {
            return Err(OrbError::FrameTooLarge {
                size: data_bytes,
                max: self.max_frame_size,
            });
        }

        let total = FrameHeader::SIZE + data_bytes;
        while self.read_buf.len() < total {
            if self.fill_buf().await? == 0 {
                return Err(OrbError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "incomplete frame: expected {} bytes, got {}",
                        total,
                        self.read_buf.len()
                    ),
                )));
            }
        }

        let mut data = self.read_buf.split_to(total);
        let payload = data.split_off(FrameHeader::SIZE).freeze();
        let frame = Frame { header, payload };
        frame.verify()?;
        Ok(frame)
    }

    async fn fill_buf(&mut self) -> Result<usize> {
        if self.read_buf.capacity() - self.read_buf.len() < 4096 {
            self.read_buf.reserve(8192);
        }
        Ok(self.inner.read_buf(&mut self.read_buf).await?)
    }
}

impl<T: AsyncWrite + Unpin> OrbTransport<T> {
    /// Write a complete frame
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.inner.write_all(&frame.encode()).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
