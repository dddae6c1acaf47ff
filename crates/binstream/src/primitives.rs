//! Primitive type implementations
//!
//! | Rust Type | Size |
//! |-----------|------|
//! | bool      | 1    |
//! | u8 / i8   | 1    |
//! | u16 / i16 | 2    |
//! | u32 / i32 | 4    |
//! | u64 / i64 | 8    |
//! | f32       | 4    |
//! | f64       | 8    |
//!
//! No alignment padding is ever inserted.

use crate::{BinDecode, BinEncode, Result, StreamContext, StreamError};
use bytes::{Buf, BufMut};

macro_rules! impl_bin_primitive {
    ($ty:ty, $size:expr, $put:ident, $get:ident) => {
        impl BinEncode for $ty {
            fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()> {
                ctx.$put(buf, *self);
                Ok(())
            }

            fn bin_size(&self) -> usize {
                $size
            }
        }

        impl BinDecode for $ty {
            fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> Result<Self> {
                StreamContext::ensure(buf, $size)?;
                Ok(ctx.$get(buf))
            }
        }
    };
}

impl_bin_primitive!(u8, 1, put_u8, get_u8);
impl_bin_primitive!(i8, 1, put_i8, get_i8);
impl_bin_primitive!(u16, 2, put_u16, get_u16);
impl_bin_primitive!(i16, 2, put_i16, get_i16);
impl_bin_primitive!(u32, 4, put_u32, get_u32);
impl_bin_primitive!(i32, 4, put_i32, get_i32);
impl_bin_primitive!(u64, 8, put_u64, get_u64);
impl_bin_primitive!(i64, 8, put_i64, get_i64);
impl_bin_primitive!(f32, 4, put_f32, get_f32);
impl_bin_primitive!(f64, 8, put_f64, get_f64);

impl BinEncode for bool {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> Result<()> {
        ctx.put_u8(buf, u8::from(*self));
        Ok(())
    }

    fn bin_size(&self) -> usize {
        1
    }
}

impl BinDecode for bool {
    fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> Result<Self> {
        StreamContext::ensure(buf, 1)?;
        match ctx.get_u8(buf) {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StreamError::InvalidBool(other)),
        }
    }
}

impl BinEncode for () {
    fn bin_encode<B: BufMut>(&self, _buf: &mut B, _ctx: &StreamContext) -> Result<()> {
        Ok(())
    }

    fn bin_size(&self) -> usize {
        0
    }
}

impl BinDecode for () {
    fn bin_decode<B: Buf>(_buf: &mut B, _ctx: &StreamContext) -> Result<Self> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip<T: BinEncode + BinDecode + PartialEq + std::fmt::Debug>(
        value: T,
        ctx: StreamContext,
    ) {
        let mut buf = BytesMut::new();
        value.bin_encode(&mut buf, &ctx).unwrap();
        assert_eq!(buf.len(), value.bin_size());

        let mut cursor = &buf[..];
        let decoded = T::bin_decode(&mut cursor, &ctx).unwrap();
        assert_eq!(decoded, value);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_scalars_both_byte_orders() {
        for ctx in [StreamContext::new(), StreamContext::big_endian()] {
            roundtrip(0xABu8, ctx);
            roundtrip(-5i8, ctx);
            roundtrip(0xBEEFu16, ctx);
            roundtrip(-1234i16, ctx);
            roundtrip(0xDEADBEEFu32, ctx);
            roundtrip(i32::MIN, ctx);
            roundtrip(u64::MAX - 7, ctx);
            roundtrip(-9_000_000_000i64, ctx);
            roundtrip(3.11f32, ctx);
            roundtrip(std::f64::consts::PI, ctx);
            roundtrip(true, ctx);
            roundtrip(false, ctx);
        }
    }

    #[test]
    fn test_float_bits_preserved() {
        let ctx = StreamContext::big_endian();
        let mut buf = BytesMut::new();
        f64::NAN.bin_encode(&mut buf, &ctx).unwrap();
        let mut cursor = &buf[..];
        let back = f64::bin_decode(&mut cursor, &ctx).unwrap();
        assert_eq!(back.to_bits(), f64::NAN.to_bits());
    }

    #[test]
    fn test_underflow() {
        let ctx = StreamContext::new();
        let data = [0x01u8, 0x02];
        let mut cursor = &data[..];
        let err = u32::bin_decode(&mut cursor, &ctx).unwrap_err();
        assert!(matches!(
            err,
            StreamError::BufferUnderflow { needed: 4, have: 2 }
        ));
    }

    #[test]
    fn test_invalid_bool() {
        let ctx = StreamContext::new();
        let data = [0x07u8];
        let mut cursor = &data[..];
        assert!(matches!(
            bool::bin_decode(&mut cursor, &ctx),
            Err(StreamError::InvalidBool(7))
        ));
    }
}
