//! Stream encoding trait

use crate::{Result, StreamContext};
use bytes::BufMut;

/// Trait for types that can be written to a binary stream
pub trait BinEncode {
    /// Encode this value to the buffer in the context's byte order.
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()>;

    /// Compute the encoded size in bytes
    fn bin_size(&self) -> usize;
}

impl<T: BinEncode + ?Sized> BinEncode for &T {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()> {
        (**self).bin_encode(buf, ctx)
    }

    fn bin_size(&self) -> usize {
        (**self).bin_size()
    }
}
