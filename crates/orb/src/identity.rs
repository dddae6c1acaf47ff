//! Object identity types
//!
//! - `InterfaceId`: hash identifying the shape of an RPC interface
//! - `InstanceId`: hash identifying one deployed instance
//! - `ObjectKey`: the pair, used as the dispatch target of every call
//! - `ObjectId`: a key plus the endpoint that serves it and the name of the
//!   client proxy type that talks to it

use crate::error::{OrbError, Result};
use binstream::{BinDecode, BinEncode, Buf, BufMut, StreamContext, StreamObject};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Size of interface and instance hashes in bytes
pub const HASH_SIZE: usize = 16;

/// Modulus of the server-side object table.
///
/// Every `ObjectKey` caches its bucket hash for this modulus.
pub const OBJECT_TABLE_MODULUS: u32 = 109;

fn parse_hash(text: &str) -> Result<[u8; HASH_SIZE]> {
    let digits: Vec<u8> = text.bytes().filter(|b| *b != b'-').collect();
    if digits.len() != HASH_SIZE * 2 {
        return Err(OrbError::Format(format!(
            "hash '{}' must have {} hex digits",
            text,
            HASH_SIZE * 2
        )));
    }

    let mut out = [0u8; HASH_SIZE];
    for (i, pair) in digits.chunks(2).enumerate() {
        let hi = hex_value(pair[0]);
        let lo = hex_value(pair[1]);
        match (hi, lo) {
            (Some(hi), Some(lo)) => out[i] = (hi << 4) | lo,
            _ => {
                return Err(OrbError::Format(format!(
                    "hash '{}' contains non-hex characters",
                    text
                )))
            }
        }
    }
    Ok(out)
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn read_hash<B: Buf>(buf: &mut B) -> binstream::Result<[u8; HASH_SIZE]> {
    StreamContext::ensure(buf, HASH_SIZE)?;
    let mut out = [0u8; HASH_SIZE];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

macro_rules! define_hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        pub struct $name([u8; HASH_SIZE]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
                Self(bytes)
            }

            /// Parse from 32 hex digits; hyphens are ignored
            pub fn parse(text: &str) -> Result<Self> {
                parse_hash(text).map(Self)
            }

            pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for b in &self.0 {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl BinEncode for $name {
            fn bin_encode<B: BufMut>(
                &self,
                buf: &mut B,
                _ctx: &StreamContext,
            ) -> binstream::Result<()> {
                buf.put_slice(&self.0);
                Ok(())
            }

            fn bin_size(&self) -> usize {
                HASH_SIZE
            }
        }

        impl BinDecode for $name {
            fn bin_decode<B: Buf>(buf: &mut B, _ctx: &StreamContext) -> binstream::Result<Self> {
                read_hash(buf).map(Self)
            }
        }
    };
}

define_hash_id!(
    /// Identifies an RPC interface. Client and server of one interface share it.
    InterfaceId
);

define_hash_id!(
    /// Identifies one deployed instance of an interface
    InstanceId
);

impl InstanceId {
    /// A fresh random instance id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }
}

/// Dispatch target of a call: (interface, instance)
///
/// Equality and `Hash` consider only the two ids. The bucket hash is cached
/// for [`OBJECT_TABLE_MODULUS`] and is always equal to
/// `calc_hash(OBJECT_TABLE_MODULUS)`.
#[derive(Clone, Copy)]
pub struct ObjectKey {
    interface: InterfaceId,
    instance: InstanceId,
    hash: u32,
}

impl ObjectKey {
    /// Encoded size: two raw hashes
    pub const SIZE: usize = HASH_SIZE * 2;

    pub fn new(interface: InterfaceId, instance: InstanceId) -> Self {
        let mut key = Self {
            interface,
            instance,
            hash: 0,
        };
        key.hash = key.calc_hash(OBJECT_TABLE_MODULUS);
        key
    }

    /// Build a key from textual hashes, validating both
    pub fn set(interface_hash: &str, instance_hash: &str) -> Result<Self> {
        Ok(Self::new(
            InterfaceId::parse(interface_hash)?,
            InstanceId::parse(instance_hash)?,
        ))
    }

    pub fn interface(&self) -> &InterfaceId {
        &self.interface
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    /// Compare only the interface half
    pub fn is_interface(&self, candidate: &InterfaceId) -> bool {
        self.interface == *candidate
    }

    /// The cached bucket hash
    pub fn cached_hash(&self) -> u32 {
        self.hash
    }

    /// Recompute the bucket hash of the raw key bytes for `modulus`
    ///
    /// # Panics
    ///
    /// Panics if `modulus` is zero.
    pub fn calc_hash(&self, modulus: u32) -> u32 {
        assert!(modulus > 0, "hash modulus must be non-zero");
        let mut acc: u32 = 0;
        for b in self.interface.as_bytes().iter().chain(self.instance.as_bytes()) {
            acc = (acc.wrapping_mul(31).wrapping_add(u32::from(*b))) % modulus;
        }
        acc
    }
}

impl PartialEq for ObjectKey {
    fn eq(&self, other: &Self) -> bool {
        self.interface == other.interface && self.instance == other.instance
    }
}

impl Eq for ObjectKey {}

impl Hash for ObjectKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.interface.hash(state);
        self.instance.hash(state);
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({}/{})", self.interface, self.instance)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.interface, self.instance)
    }
}

impl BinEncode for ObjectKey {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> binstream::Result<()> {
        self.interface.bin_encode(buf, ctx)?;
        self.instance.bin_encode(buf, ctx)
    }

    fn bin_size(&self) -> usize {
        Self::SIZE
    }
}

impl BinDecode for ObjectKey {
    fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        let interface = InterfaceId::bin_decode(buf, ctx)?;
        let instance = InstanceId::bin_decode(buf, ctx)?;
        Ok(Self::new(interface, instance))
    }
}

/// Network endpoint of a server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl BinEncode for Endpoint {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> binstream::Result<()> {
        self.host.bin_encode(buf, ctx)?;
        self.port.bin_encode(buf, ctx)
    }

    fn bin_size(&self) -> usize {
        self.host.bin_size() + 2
    }
}

impl BinDecode for Endpoint {
    fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        Ok(Self {
            host: String::bin_decode(buf, ctx)?,
            port: u16::bin_decode(buf, ctx)?,
        })
    }
}

/// Full address of a server object.
///
/// Created once when the object is registered and copied into every proxy
/// that targets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId {
    key: ObjectKey,
    endpoint: Endpoint,
    proxy_type: String,
}

impl ObjectId {
    pub fn new(key: ObjectKey, endpoint: Endpoint, proxy_type: impl Into<String>) -> Self {
        Self {
            key,
            endpoint,
            proxy_type: proxy_type.into(),
        }
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn proxy_type(&self) -> &str {
        &self.proxy_type
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.key, self.endpoint, self.proxy_type)
    }
}

impl StreamObject for ObjectId {
    const TYPE_NAME: &'static str = "ObjectId";

    fn encode_fields<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> binstream::Result<()> {
        self.key.bin_encode(buf, ctx)?;
        self.endpoint.bin_encode(buf, ctx)?;
        self.proxy_type.bin_encode(buf, ctx)
    }

    fn decode_fields<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        Ok(Self {
            key: ObjectKey::bin_decode(buf, ctx)?,
            endpoint: Endpoint::bin_decode(buf, ctx)?,
            proxy_type: String::bin_decode(buf, ctx)?,
        })
    }

    fn fields_size(&self) -> usize {
        self.key.bin_size() + self.endpoint.bin_size() + self.proxy_type.bin_size()
    }
}

binstream::impl_bin_object!(ObjectId);
