//! Directory records and path helpers

use crate::error::{NameError, Result};
use binstream::{BinDecode, BinEncode, Buf, BufMut, StreamContext, StreamError, StreamObject};
use orb::ObjectId;

/// Number of free-form extra values carried by a binding
pub const EXTRA_COUNT: usize = 4;

/// What the directory stores for one bound object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    pub object_id: ObjectId,
    pub description: String,
    pub extras: [String; EXTRA_COUNT],
}

impl BindingInfo {
    pub fn new(object_id: ObjectId, description: impl Into<String>) -> Self {
        Self {
            object_id,
            description: description.into(),
            extras: Default::default(),
        }
    }

    pub fn with_extras(mut self, extras: [String; EXTRA_COUNT]) -> Self {
        self.extras = extras;
        self
    }

    /// Replace one extra value; `index` is zero based
    pub fn set_extra(&mut self, index: u32, value: impl Into<String>) -> Result<()> {
        let slot = self
            .extras
            .get_mut(index as usize)
            .ok_or(NameError::BadExtraIndex(index))?;
        *slot = value.into();
        Ok(())
    }
}

impl StreamObject for BindingInfo {
    const TYPE_NAME: &'static str = "BindingInfo";

    fn encode_fields<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> binstream::Result<()> {
        self.object_id.bin_encode(buf, ctx)?;
        self.description.bin_encode(buf, ctx)?;
        for extra in &self.extras {
            extra.bin_encode(buf, ctx)?;
        }
        Ok(())
    }

    fn decode_fields<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        let object_id = ObjectId::bin_decode(buf, ctx)?;
        let description = String::bin_decode(buf, ctx)?;
        let mut extras: [String; EXTRA_COUNT] = Default::default();
        for extra in extras.iter_mut() {
            *extra = String::bin_decode(buf, ctx)?;
        }
        Ok(Self {
            object_id,
            description,
            extras,
        })
    }

    fn fields_size(&self) -> usize {
        self.object_id.bin_size()
            + self.description.bin_size()
            + self.extras.iter().map(|e| e.bin_size()).sum::<usize>()
    }
}

binstream::impl_bin_object!(BindingInfo);

/// A binding together with the full path it should live at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebindInfo {
    pub path: String,
    pub binding: BindingInfo,
}

impl RebindInfo {
    pub fn new(path: impl Into<String>, binding: BindingInfo) -> Self {
        Self {
            path: path.into(),
            binding,
        }
    }
}

impl StreamObject for RebindInfo {
    const TYPE_NAME: &'static str = "RebindInfo";

    fn encode_fields<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> binstream::Result<()> {
        self.path.bin_encode(buf, ctx)?;
        self.binding.bin_encode(buf, ctx)
    }

    fn decode_fields<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        Ok(Self {
            path: String::bin_decode(buf, ctx)?,
            binding: BindingInfo::bin_decode(buf, ctx)?,
        })
    }

    fn fields_size(&self) -> usize {
        self.path.bin_size() + self.binding.bin_size()
    }
}

binstream::impl_bin_object!(RebindInfo);

/// One child binding of a scope, as returned by an enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingEntry {
    pub name: String,
    pub binding: BindingInfo,
}

impl StreamObject for BindingEntry {
    const TYPE_NAME: &'static str = "BindingEntry";

    fn encode_fields<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> binstream::Result<()> {
        self.name.bin_encode(buf, ctx)?;
        self.binding.bin_encode(buf, ctx)
    }

    fn decode_fields<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        Ok(Self {
            name: String::bin_decode(buf, ctx)?,
            binding: BindingInfo::bin_decode(buf, ctx)?,
        })
    }

    fn fields_size(&self) -> usize {
        self.name.bin_size() + self.binding.bin_size()
    }
}

binstream::impl_bin_object!(BindingEntry);

/// Outcome of refreshing or creating one binding in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RebindResult {
    Success = 0,
    /// A scope already occupies the path
    NotATerminal = 1,
    Exception = 2,
}

impl BinEncode for RebindResult {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> binstream::Result<()> {
        (*self as u32).bin_encode(buf, ctx)
    }

    fn bin_size(&self) -> usize {
        4
    }
}

impl BinDecode for RebindResult {
    fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        match u32::bin_decode(buf, ctx)? {
            0 => Ok(RebindResult::Success),
            1 => Ok(RebindResult::NotATerminal),
            2 => Ok(RebindResult::Exception),
            other => Err(StreamError::InvalidEnumValue(other)),
        }
    }
}

/// Split a directory path into its components. The root `/` has none.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| NameError::BadPath(path.to_string()))?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(NameError::BadPath(path.to_string()));
    }
    Ok(parts)
}

/// Split a non-root path into its parent scope and final name
pub fn parent_and_name(path: &str) -> Result<(String, String)> {
    let mut parts = split_path(path)?;
    let name = parts
        .pop()
        .ok_or_else(|| NameError::BadPath(path.to_string()))?;
    Ok((format!("/{}", parts.join("/")), name.to_string()))
}

/// Join a scope path and a child name
pub fn join_path(scope: &str, name: &str) -> String {
    if scope.ends_with('/') {
        format!("{}{}", scope, name)
    } else {
        format!("{}/{}", scope, name)
    }
}
