//! Stream decoding trait

use crate::{Result, StreamContext};
use bytes::Buf;

/// Trait for types that can be read from a binary stream
pub trait BinDecode: Sized {
    /// Decode a value from the buffer in the context's byte order.
    fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> Result<Self>;
}
