//! Stream encoding/decoding context
//!
//! The context tracks byte order and provides helpers for primitive
//! encoding/decoding and marker handling.

use crate::error::{Result, StreamError};
use bytes::{Buf, BufMut};

/// Marker bytes that delimit structure inside a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Marker {
    StartObject = 0xA1,
    EndObject = 0xA2,
    TypeName = 0xA3,
    Frame = 0xA4,
}

impl Marker {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Stream encoding/decoding context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamContext {
    /// Whether to use little-endian byte order
    pub little_endian: bool,
}

impl StreamContext {
    /// Tag byte for a little-endian stream
    pub const LITTLE_ENDIAN_TAG: u8 = 0x4C;
    /// Tag byte for a big-endian stream
    pub const BIG_ENDIAN_TAG: u8 = 0x42;

    /// Create a new context with little-endian byte order (default)
    pub fn new() -> Self {
        Self { little_endian: true }
    }

    /// Create a context with big-endian byte order
    pub fn big_endian() -> Self {
        Self {
            little_endian: false,
        }
    }

    /// Create a context with specified byte order
    pub fn with_byte_order(little_endian: bool) -> Self {
        Self { little_endian }
    }

    /// The tag byte written at the head of a stream in this byte order
    pub fn endian_tag(&self) -> u8 {
        if self.little_endian {
            Self::LITTLE_ENDIAN_TAG
        } else {
            Self::BIG_ENDIAN_TAG
        }
    }

    /// Build a context from a stream's tag byte
    pub fn from_endian_tag(tag: u8) -> Result<Self> {
        match tag {
            Self::LITTLE_ENDIAN_TAG => Ok(Self::new()),
            Self::BIG_ENDIAN_TAG => Ok(Self::big_endian()),
            other => Err(StreamError::BadEndianTag(other)),
        }
    }

    /// Fail with `BufferUnderflow` unless `needed` bytes remain
    #[inline]
    pub fn ensure<B: Buf>(buf: &B, needed: usize) -> Result<()> {
        if buf.remaining() < needed {
            return Err(StreamError::BufferUnderflow {
                needed,
                have: buf.remaining(),
            });
        }
        Ok(())
    }

    /// Write a marker byte
    pub fn put_marker<B: BufMut>(&self, buf: &mut B, marker: Marker) {
        buf.put_u8(marker.as_u8());
    }

    /// Read a marker byte and verify it is `expected`
    pub fn expect_marker<B: Buf>(&self, buf: &mut B, expected: Marker) -> Result<()> {
        Self::ensure(buf, 1)?;
        let got = buf.get_u8();
        if got != expected.as_u8() {
            return Err(StreamError::BadMarker {
                expected: expected.as_u8(),
                got,
            });
        }
        Ok(())
    }

    // Primitive encoding methods

    #[inline]
    pub fn put_u8<B: BufMut>(&self, buf: &mut B, value: u8) {
        buf.put_u8(value);
    }

    #[inline]
    pub fn put_i8<B: BufMut>(&self, buf: &mut B, value: i8) {
        buf.put_i8(value);
    }

    #[inline]
    pub fn put_u16<B: BufMut>(&self, buf: &mut B, value: u16) {
        if self.little_endian {
            buf.put_u16_le(value);
        } else {
            buf.put_u16(value);
        }
    }

    #[inline]
    pub fn put_i16<B: BufMut>(&self, buf: &mut B, value: i16) {
        if self.little_endian {
            buf.put_i16_le(value);
        } else {
            buf.put_i16(value);
        }
    }

    #[inline]
    pub fn put_u32<B: BufMut>(&self, buf: &mut B, value: u32) {
        if self.little_endian {
            buf.put_u32_le(value);
        } else {
            buf.put_u32(value);
        }
    }

    #[inline]
    pub fn put_i32<B: BufMut>(&self, buf: &mut B, value: i32) {
        if self.little_endian {
            buf.put_i32_le(value);
        } else {
            buf.put_i32(value);
        }
    }

    #[inline]
    pub fn put_u64<B: BufMut>(&self, buf: &mut B, value: u64) {
        if self.little_endian {
            buf.put_u64_le(value);
        } else {
            buf.put_u64(value);
        }
    }

    #[inline]
    pub fn put_i64<B: BufMut>(&self, buf: &mut B, value: i64) {
        if self.little_endian {
            buf.put_i64_le(value);
        } else {
            buf.put_i64(value);
        }
    }

    #[inline]
    pub fn put_f32<B: BufMut>(&self, buf: &mut B, value: f32) {
        if self.little_endian {
            buf.put_f32_le(value);
        } else {
            buf.put_f32(value);
        }
    }

    #[inline]
    pub fn put_f64<B: BufMut>(&self, buf: &mut B, value: f64) {
        if self.little_endian {
            buf.put_f64_le(value);
        } else {
            buf.put_f64(value);
        }
    }

    // Primitive decoding methods. Callers check `remaining()` first.

    #[inline]
    pub fn get_u8<B: Buf>(&self, buf: &mut B) -> u8 {
        buf.get_u8()
    }

    #[inline]
    pub fn get_i8<B: Buf>(&self, buf: &mut B) -> i8 {
        buf.get_i8()
    }

    #[inline]
    pub fn get_u16<B: Buf>(&self, buf: &mut B) -> u16 {
        if self.little_endian {
            buf.get_u16_le()
        } else {
            buf.get_u16()
        }
    }

    #[inline]
    pub fn get_i16<B: Buf>(&self, buf: &mut B) -> i16 {
        if self.little_endian {
            buf.get_i16_le()
        } else {
            buf.get_i16()
        }
    }

    #[inline]
    pub fn get_u32<B: Buf>(&self, buf: &mut B) -> u32 {
        if self.little_endian {
            buf.get_u32_le()
        } else {
            buf.get_u32()
        }
    }

    #[inline]
    pub fn get_i32<B: Buf>(&self, buf: &mut B) -> i32 {
        if self.little_endian {
            buf.get_i32_le()
        } else {
            buf.get_i32()
        }
    }

    #[inline]
    pub fn get_u64<B: Buf>(&self, buf: &mut B) -> u64 {
        if self.little_endian {
            buf.get_u64_le()
        } else {
            buf.get_u64()
        }
    }

    #[inline]
    pub fn get_i64<B: Buf>(&self, buf: &mut B) -> i64 {
        if self.little_endian {
            buf.get_i64_le()
        } else {
            buf.get_i64()
        }
    }

    #[inline]
    pub fn get_f32<B: Buf>(&self, buf: &mut B) -> f32 {
        if self.little_endian {
            buf.get_f32_le()
        } else {
            buf.get_f32()
        }
    }

    #[inline]
    pub fn get_f64<B: Buf>(&self, buf: &mut B) -> f64 {
        if self.little_endian {
            buf.get_f64_le()
        } else {
            buf.get_f64()
        }
    }
}

impl Default for StreamContext {
    fn default() -> Self {
        Self::new()
    }
}
