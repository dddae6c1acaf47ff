//! Output and input streams
//!
//! A stream is the unit that travels as a call payload or a file body. Its
//! first two bytes are the `Frame` marker and the endianness tag; everything
//! after that is read in the order it was written.

use crate::{BinDecode, BinEncode, Marker, Result, StreamContext, StreamError};
use bytes::{Buf, Bytes, BytesMut};

const HEADER_SIZE: usize = 2;

/// Growable output stream
#[derive(Debug, Clone)]
pub struct BinOutStream {
    buf: BytesMut,
    ctx: StreamContext,
}

impl BinOutStream {
    /// Create a little-endian output stream
    pub fn new() -> Self {
        Self::with_context(StreamContext::new(), 256)
    }

    /// Create an output stream with the given byte order and initial capacity
    pub fn with_context(ctx: StreamContext, initial_capacity: usize) -> Self {
        let mut stream = Self {
            buf: BytesMut::with_capacity(initial_capacity.max(HEADER_SIZE)),
            ctx,
        };
        stream.write_header();
        stream
    }

    fn write_header(&mut self) {
        self.ctx.put_marker(&mut self.buf, Marker::Frame);
        self.ctx.put_u8(&mut self.buf, self.ctx.endian_tag());
    }

    /// Truncate all written values and make sure at least
    /// `initial_capacity` bytes are available without reallocating.
    pub fn reset(&mut self, initial_capacity: usize) {
        self.buf.clear();
        self.buf.reserve(initial_capacity.max(HEADER_SIZE));
        self.write_header();
    }

    /// Append a value
    pub fn write<T: BinEncode + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.bin_encode(&mut self.buf, &self.ctx)
    }

    /// Builder-style append
    pub fn with<T: BinEncode + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.write(value)?;
        Ok(self)
    }

    pub fn context(&self) -> &StreamContext {
        &self.ctx
    }

    /// Bytes written, including the stream header
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing but the header has been written
    pub fn is_empty(&self) -> bool {
        self.buf.len() <= HEADER_SIZE
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Freeze the stream into its wire form
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for BinOutStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Input stream over a frozen buffer
#[derive(Debug, Clone)]
pub struct BinInStream {
    data: Bytes,
    ctx: StreamContext,
}

impl BinInStream {
    /// Open a stream, verifying its header
    pub fn new(mut data: Bytes) -> Result<Self> {
        let probe = StreamContext::new();
        probe.expect_marker(&mut data, Marker::Frame)?;
        StreamContext::ensure(&data, 1)?;
        let ctx = StreamContext::from_endian_tag(data.get_u8())?;
        Ok(Self { data, ctx })
    }

    /// Read the next value
    pub fn read<T: BinDecode>(&mut self) -> Result<T> {
        T::bin_decode(&mut self.data, &self.ctx)
    }

    pub fn context(&self) -> &StreamContext {
        &self.ctx
    }

    /// Bytes not yet read
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fail unless every byte has been consumed
    pub fn expect_end(&self) -> Result<()> {
        if !self.data.is_empty() {
            return Err(StreamError::Format(format!(
                "{} unread bytes at end of stream",
                self.data.len()
            )));
        }
        Ok(())
    }
}
