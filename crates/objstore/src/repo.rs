//! Repository file
//!
//! One file per store, `<name>.cfgstore`, holding a header (magic, format
//! version, object count) followed by one marker-delimited record per
//! object. The file is always replaced whole: the snapshot is written to a
//! temporary file in the same directory, synced, and renamed over the old
//! one.

use crate::error::{Result, StoreError};
use binstream::{BinDecode, BinEncode, BinInStream, BinOutStream, Buf, BufMut, Bytes, StreamContext, StreamObject};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const REPO_EXTENSION: &str = "cfgstore";
pub const BACKUP_EXTENSION: &str = "cfgstore.bak";
pub const CORRUPT_EXTENSION: &str = "cfgstore.bad";

const REPO_MAGIC: u32 = 0x4346_5354;
const REPO_FORMAT_VERSION: u32 = 1;

/// One stored object as written to the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    pub key: String,
    pub version: u32,
    pub reserve: u32,
    pub payload: Bytes,
}

impl StreamObject for StoreRecord {
    const TYPE_NAME: &'static str = "StoreRecord";

    fn encode_fields<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> binstream::Result<()> {
        self.key.bin_encode(buf, ctx)?;
        self.version.bin_encode(buf, ctx)?;
        self.reserve.bin_encode(buf, ctx)?;
        self.payload.bin_encode(buf, ctx)
    }

    fn decode_fields<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        Ok(Self {
            key: String::bin_decode(buf, ctx)?,
            version: u32::bin_decode(buf, ctx)?,
            reserve: u32::bin_decode(buf, ctx)?,
            payload: Bytes::bin_decode(buf, ctx)?,
        })
    }

    fn fields_size(&self) -> usize {
        self.key.bin_size() + 8 + self.payload.bin_size()
    }
}

binstream::impl_bin_object!(StoreRecord);

pub fn repo_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, REPO_EXTENSION))
}

pub fn backup_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, BACKUP_EXTENSION))
}

pub fn corrupt_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, CORRUPT_EXTENSION))
}

/// Encode a snapshot into the repository format
pub fn encode(records: &[StoreRecord]) -> Result<Bytes> {
    let mut out = BinOutStream::new();
    out.write(&REPO_MAGIC)?;
    out.write(&REPO_FORMAT_VERSION)?;
    out.write(&(records.len() as u32))?;
    for record in records {
        out.write(record)?;
    }
    Ok(out.into_bytes())
}

/// Decode a repository image
pub fn decode(data: Bytes) -> Result<Vec<StoreRecord>> {
    let mut input = BinInStream::new(data)?;
    let magic: u32 = input.read()?;
    if magic != REPO_MAGIC {
        return Err(StoreError::Corrupt(format!("bad magic {:#010x}", magic)));
    }
    let format: u32 = input.read()?;
    if format != REPO_FORMAT_VERSION {
        return Err(StoreError::Corrupt(format!("unsupported format version {}", format)));
    }
    let count: u32 = input.read()?;
    let mut records = Vec::with_capacity((count as usize).min(input.remaining()));
    for _ in 0..count {
        records.push(input.read::<StoreRecord>()?);
    }
    input.expect_end()?;
    Ok(records)
}

/// Read a repository file. `None` if it does not exist.
pub fn load(path: &Path) -> Result<Option<Vec<StoreRecord>>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path)?;
    decode(Bytes::from(data))
        .map(Some)
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))
}

/// Replace the repository file with `records`
pub fn write_atomic(path: &Path, records: &[StoreRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let image = encode(records)?;
    let temp_path = path.with_extension(format!("{}.{}.tmp", REPO_EXTENSION, std::process::id()));
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&image)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        if let Err(cleanup) = fs::remove_file(&temp_path) {
            warn!("Could not remove {}: {}", temp_path.display(), cleanup);
        }
        return Err(e.into());
    }
    debug!("Wrote {} objects to {}", records.len(), path.display());
    Ok(())
}
