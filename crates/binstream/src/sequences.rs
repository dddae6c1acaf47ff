//! Sequences and optional values
//!
//! Wire format for a sequence:
//! ```text
//! count: u32
//! elements[count]
//! ```
//!
//! An optional value is a presence flag (`bool`) followed by the value when
//! the flag is set.

use crate::strings::read_length;
use crate::{BinDecode, BinEncode, Result, StreamContext, StreamError};
use bytes::{Buf, BufMut};

impl<T: BinEncode> BinEncode for [T] {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()> {
        let count = u32::try_from(self.len()).map_err(|_| {
            StreamError::Format(format!("sequence of {} elements is too long", self.len()))
        })?;
        ctx.put_u32(buf, count);
        for elem in self {
            elem.bin_encode(buf, ctx)?;
        }
        Ok(())
    }

    fn bin_size(&self) -> usize {
        4 + self.iter().map(|e| e.bin_size()).sum::<usize>()
    }
}

impl<T: BinEncode> BinEncode for Vec<T> {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()> {
        self.as_slice().bin_encode(buf, ctx)
    }

    fn bin_size(&self) -> usize {
        self.as_slice().bin_size()
    }
}

impl<T: BinDecode> BinDecode for Vec<T> {
    fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> Result<Self> {
        let count = read_length(buf, ctx)?;
        // Every element takes at least one byte, so a count larger than the
        // remaining input is malformed
        if count > buf.remaining() && std::mem::size_of::<T>() > 0 {
            return Err(StreamError::BufferUnderflow {
                needed: count,
                have: buf.remaining(),
            });
        }
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(T::bin_decode(buf, ctx)?);
        }
        Ok(elements)
    }
}

impl<T: BinEncode> BinEncode for Option<T> {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()> {
        match self {
            Some(value) => {
                true.bin_encode(buf, ctx)?;
                value.bin_encode(buf, ctx)
            }
            None => false.bin_encode(buf, ctx),
        }
    }

    fn bin_size(&self) -> usize {
        1 + self.as_ref().map(|v| v.bin_size()).unwrap_or(0)
    }
}

impl<T: BinDecode> BinDecode for Option<T> {
    fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> Result<Self> {
        if bool::bin_decode(buf, ctx)? {
            Ok(Some(T::bin_decode(buf, ctx)?))
        } else {
            Ok(None)
        }
    }
}
