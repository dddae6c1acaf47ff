//! Binary stream codec
//!
//! This crate provides the binary encoding used for every payload that the
//! broker, the directory service and the configuration store put on the wire
//! or on disk.
//!
//! # Wire Format
//!
//! - Each stream starts with a `Frame` marker and an endianness tag
//! - Scalars are fixed-width fields in the stream's byte order
//! - Strings and blobs are prefixed with a `u32` byte count
//! - Sequences are prefixed with a `u32` element count
//! - Polymorphic records are delimited by `StartObject`/`EndObject` markers
//!   and carry their type name after a `TypeName` marker
//!
//! Every marker is verified on read; a mismatch is a format error.

mod context;
mod decode;
mod encode;
mod error;
mod objects;
mod primitives;
mod sequences;
mod stream;
mod strings;

pub use context::{Marker, StreamContext};
pub use decode::BinDecode;
pub use encode::BinEncode;
pub use error::{Result, StreamError, MAX_ALLOCATION_SIZE};
pub use objects::{read_object, write_object, StreamObject};
#[doc(hidden)]
pub use objects::__object_size;
pub use stream::{BinInStream, BinOutStream};

/// Re-export bytes for convenience
pub use bytes::{Buf, BufMut, Bytes, BytesMut};
