//! Marker-delimited records
//!
//! A record is written as:
//! ```text
//! StartObject
//! TypeName  name: string
//! fields...
//! EndObject
//! ```
//!
//! Readers verify each marker and the type name, so a record written by one
//! type can never be silently read back as another.

use crate::{BinDecode, BinEncode, Marker, Result, StreamContext, StreamError};
use bytes::{Buf, BufMut};

/// A record type with a stable wire name
pub trait StreamObject: Sized {
    /// Name written after the `TypeName` marker
    const TYPE_NAME: &'static str;

    /// Write the record's fields in declaration order
    fn encode_fields<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()>;

    /// Read the record's fields in declaration order
    fn decode_fields<B: Buf>(buf: &mut B, ctx: &StreamContext) -> Result<Self>;

    /// Size of the fields alone
    fn fields_size(&self) -> usize;
}

/// Write a record with its surrounding markers
pub fn write_object<T: StreamObject, B: BufMut>(
    obj: &T,
    buf: &mut B,
    ctx: &StreamContext,
) -> Result<()> {
    ctx.put_marker(buf, Marker::StartObject);
    ctx.put_marker(buf, Marker::TypeName);
    T::TYPE_NAME.bin_encode(buf, ctx)?;
    obj.encode_fields(buf, ctx)?;
    ctx.put_marker(buf, Marker::EndObject);
    Ok(())
}

/// Read a record, verifying its markers and type name
pub fn read_object<T: StreamObject, B: Buf>(buf: &mut B, ctx: &StreamContext) -> Result<T> {
    ctx.expect_marker(buf, Marker::StartObject)?;
    ctx.expect_marker(buf, Marker::TypeName)?;
    let name = String::bin_decode(buf, ctx)?;
    if name != T::TYPE_NAME {
        return Err(StreamError::TypeMismatch {
            expected: T::TYPE_NAME.to_string(),
            got: name,
        });
    }
    let obj = T::decode_fields(buf, ctx)?;
    ctx.expect_marker(buf, Marker::EndObject)?;
    Ok(obj)
}

/// Implement `BinEncode`/`BinDecode` for a `StreamObject` type so it can be
/// used directly as a parameter or sequence element.
#[macro_export]
macro_rules! impl_bin_object {
    ($ty:ty) => {
        impl $crate::BinEncode for $ty {
            fn bin_encode<B: $crate::BufMut>(
                &self,
                buf: &mut B,
                ctx: &$crate::StreamContext,
            ) -> $crate::Result<()> {
                $crate::write_object(self, buf, ctx)
            }

            fn bin_size(&self) -> usize {
                $crate::__object_size(self)
            }
        }

        impl $crate::BinDecode for $ty {
            fn bin_decode<B: $crate::Buf>(
                buf: &mut B,
                ctx: &$crate::StreamContext,
            ) -> $crate::Result<Self> {
                $crate::read_object(buf, ctx)
            }
        }
    };
}

/// Encoded size of a record including markers and type name
#[doc(hidden)]
pub fn __object_size<T: StreamObject>(obj: &T) -> usize {
    3 + T::TYPE_NAME.bin_size() + obj.fields_size()
}
