//! String and blob types
//!
//! Wire format:
//! ```text
//! byte_count: u32
//! bytes[byte_count]   # UTF-8 for strings, raw for blobs
//! ```
//!
//! There is no terminator and no padding.

use crate::error::MAX_ALLOCATION_SIZE;
use crate::{BinDecode, BinEncode, Result, StreamContext, StreamError};
use bytes::{Buf, BufMut, Bytes};

/// Read a `u32` length prefix and check it against the allocation limit
/// and the remaining input.
pub(crate) fn read_length<B: Buf>(buf: &mut B, ctx: &StreamContext) -> Result<usize> {
    StreamContext::ensure(buf, 4)?;
    let len = ctx.get_u32(buf) as usize;
    if len > MAX_ALLOCATION_SIZE {
        return Err(StreamError::AllocationLimitExceeded {
            requested: len,
            limit: MAX_ALLOCATION_SIZE,
        });
    }
    Ok(len)
}

fn write_length<B: BufMut>(buf: &mut B, ctx: &StreamContext, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| StreamError::Format(format!("length {} does not fit in u32", len)))?;
    ctx.put_u32(buf, len);
    Ok(())
}

impl BinEncode for str {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()> {
        write_length(buf, ctx, self.len())?;
        buf.put_slice(self.as_bytes());
        Ok(())
    }

    fn bin_size(&self) -> usize {
        4 + self.len()
    }
}

impl BinEncode for String {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()> {
        self.as_str().bin_encode(buf, ctx)
    }

    fn bin_size(&self) -> usize {
        self.as_str().bin_size()
    }
}

impl BinDecode for String {
    fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> Result<Self> {
        let len = read_length(buf, ctx)?;
        StreamContext::ensure(buf, len)?;
        let mut raw = vec![0u8; len];
        buf.copy_to_slice(&mut raw);
        Ok(String::from_utf8(raw)?)
    }
}

impl BinEncode for Bytes {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()> {
        write_length(buf, ctx, self.len())?;
        buf.put_slice(self);
        Ok(())
    }

    fn bin_size(&self) -> usize {
        4 + self.len()
    }
}

impl BinDecode for Bytes {
    fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> Result<Self> {
        let len = read_length(buf, ctx)?;
        StreamContext::ensure(buf, len)?;
        Ok(buf.copy_to_bytes(len))
    }
}
