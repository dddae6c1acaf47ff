//! Versioned object store
//!
//! Objects live in a sorted map keyed by path. Every content-changing write
//! bumps the object's version by one and is written through to the
//! repository file before it is acknowledged. A write whose flush fails
//! stays in memory marked dirty, and a later `flush` retries it.
//!
//! All access goes through one lock, so the store can be shared between
//! any number of concurrent callers.

use crate::error::{Result, StoreError};
use crate::key::{
    ancestors, name_of, relative_to, relative_to_ignore_case, scope_prefix, validate_key,
    validate_scope,
};
use crate::repo::{self, StoreRecord};
use binstream::{BinDecode, BinEncode, Buf, BufMut, StreamContext, StreamError};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Version given to a newly created object
pub const INITIAL_VERSION: u32 = 1;

/// Options fixed when a store is opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreFlags {
    /// Make `all_objects_under` and `find_name_under` match case exactly
    pub case_sensitive: bool,
    /// Move an unreadable repository aside and start empty instead of failing
    pub recovery_mode: bool,
}

/// Result of a versioned read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// The object changed since the version the caller holds
    NewData { version: u32, payload: Bytes },
    /// The caller already holds the current version
    NoNewData,
    NotFound,
}

impl BinEncode for ReadResult {
    fn bin_encode<B: BufMut>(&self, buf: &mut B, ctx: &StreamContext) -> binstream::Result<()> {
        match self {
            ReadResult::NewData { version, payload } => {
                0u32.bin_encode(buf, ctx)?;
                version.bin_encode(buf, ctx)?;
                payload.bin_encode(buf, ctx)
            }
            ReadResult::NoNewData => 1u32.bin_encode(buf, ctx),
            ReadResult::NotFound => 2u32.bin_encode(buf, ctx),
        }
    }

    fn bin_size(&self) -> usize {
        match self {
            ReadResult::NewData { payload, .. } => 8 + payload.bin_size(),
            _ => 4,
        }
    }
}

impl BinDecode for ReadResult {
    fn bin_decode<B: Buf>(buf: &mut B, ctx: &StreamContext) -> binstream::Result<Self> {
        match u32::bin_decode(buf, ctx)? {
            0 => Ok(ReadResult::NewData {
                version: u32::bin_decode(buf, ctx)?,
                payload: Bytes::bin_decode(buf, ctx)?,
            }),
            1 => Ok(ReadResult::NoNewData),
            2 => Ok(ReadResult::NotFound),
            other => Err(StreamError::InvalidEnumValue(other)),
        }
    }
}

struct StoredObject {
    version: u32,
    /// Size hint given at creation, kept with the object in the repository
    reserve: u32,
    payload: Bytes,
}

impl StoredObject {
    fn new(payload: &[u8], reserve: u32) -> Self {
        Self {
            version: INITIAL_VERSION,
            reserve,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Swap in a new payload and bump the version. Leaves the object
    /// untouched if the version cannot grow.
    fn replace(&mut self, key: &str, payload: &[u8]) -> Result<u32> {
        let version = self
            .version
            .checked_add(1)
            .ok_or_else(|| StoreError::VersionOverflow(key.to_string()))?;
        self.payload = Bytes::copy_from_slice(payload);
        self.version = version;
        Ok(version)
    }
}

struct OpenStore {
    dir: PathBuf,
    name: String,
    flags: StoreFlags,
    objects: BTreeMap<String, StoredObject>,
    dirty: bool,
}

impl OpenStore {
    fn repo_path(&self) -> PathBuf {
        repo::repo_path(&self.dir, &self.name)
    }

    fn get(&self, key: &str) -> Result<&StoredObject> {
        self.objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn get_mut(&mut self, key: &str) -> Result<&mut StoredObject> {
        self.objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Keys under `scope`, matching case exactly
    fn keys_under<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let prefix = scope_prefix(scope);
        self.objects
            .range(prefix.clone()..)
            .map(|(key, _)| key.as_str())
            .take_while(move |key| key.starts_with(prefix.as_str()))
            .filter_map(move |key| relative_to(key, scope).map(|rel| (key, rel)))
    }

    /// Keys under `scope`, ignoring case unless the store is case sensitive
    fn keys_under_search<'a>(&'a self, scope: &'a str) -> Vec<&'a str> {
        if self.flags.case_sensitive {
            return self.keys_under(scope).map(|(key, _)| key).collect();
        }
        self.objects
            .keys()
            .map(String::as_str)
            .filter(|key| relative_to_ignore_case(key, scope).is_some())
            .collect()
    }

    /// A new key must not sit under an object or above existing objects
    fn check_placement(&self, key: &str) -> Result<()> {
        if let Some(parent) = ancestors(key).find(|a| self.objects.contains_key(*a)) {
            return Err(StoreError::PathConflict(format!(
                "{} is an object, cannot hold {}",
                parent, key
            )));
        }
        if self.keys_under(key).next().is_some() {
            return Err(StoreError::PathConflict(format!("{} is a scope", key)));
        }
        Ok(())
    }

    fn insert(&mut self, key: &str, payload: &[u8], reserve: u32) -> Result<()> {
        self.check_placement(key)?;
        self.objects
            .insert(key.to_string(), StoredObject::new(payload, reserve));
        self.dirty = true;
        Ok(())
    }

    fn records(&self) -> Vec<StoreRecord> {
        self.objects
            .iter()
            .map(|(key, obj)| StoreRecord {
                key: key.clone(),
                version: obj.version,
                reserve: obj.reserve,
                payload: obj.payload.clone(),
            })
            .collect()
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        repo::write_atomic(&self.repo_path(), &self.records())?;
        self.dirty = false;
        Ok(())
    }
}

fn load_objects(path: &Path) -> Result<Option<BTreeMap<String, StoredObject>>> {
    let Some(records) = repo::load(path)? else {
        return Ok(None);
    };

    let mut objects = BTreeMap::new();
    for record in records {
        validate_key(&record.key)
            .map_err(|_| StoreError::Corrupt(format!("invalid key {:?}", record.key)))?;
        if record.version < INITIAL_VERSION {
            return Err(StoreError::Corrupt(format!(
                "{} has version {}",
                record.key, record.version
            )));
        }
        let object = StoredObject {
            version: record.version,
            reserve: record.reserve,
            payload: record.payload,
        };
        if objects.insert(record.key.clone(), object).is_some() {
            return Err(StoreError::Corrupt(format!("duplicate key {}", record.key)));
        }
    }
    Ok(Some(objects))
}

/// Hierarchical store of versioned binary objects
#[derive(Default)]
pub struct VersionedObjectStore {
    state: Mutex<Option<OpenStore>>,
}

impl VersionedObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_open<T>(&self, f: impl FnOnce(&mut OpenStore) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let store = state.as_mut().ok_or(StoreError::NotReady)?;
        f(store)
    }

    /// Run a mutation and write the result through to the repository
    fn with_write<T>(&self, f: impl FnOnce(&mut OpenStore) -> Result<T>) -> Result<T> {
        self.with_open(|store| {
            let value = f(store)?;
            store.flush()?;
            Ok(value)
        })
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Open `<repo_dir>/<name>.cfgstore`, creating it if missing. Returns
    /// true if the store was newly created.
    pub fn initialize(&self, repo_dir: &Path, name: &str, flags: StoreFlags) -> Result<bool> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(StoreError::InvalidState(format!("bad store name {:?}", name)));
        }
        let mut state = self.state.lock();
        if state.is_some() {
            return Err(StoreError::InvalidState("store already initialized".into()));
        }

        let path = repo::repo_path(repo_dir, name);
        let (objects, created) = match load_objects(&path) {
            Ok(Some(objects)) => (objects, false),
            Ok(None) => (BTreeMap::new(), true),
            Err(StoreError::Corrupt(reason)) if flags.recovery_mode => {
                let aside = repo::corrupt_path(repo_dir, name);
                warn!(
                    "Repository {} is unreadable ({}), moving it to {}",
                    path.display(),
                    reason,
                    aside.display()
                );
                fs::rename(&path, &aside)?;
                (BTreeMap::new(), true)
            }
            Err(e) => return Err(e),
        };

        let mut store = OpenStore {
            dir: repo_dir.to_path_buf(),
            name: name.to_string(),
            flags,
            objects,
            dirty: created,
        };
        store.flush()?;

        info!(
            "Object store {} {} with {} objects",
            path.display(),
            if created { "created" } else { "opened" },
            store.objects.len()
        );
        *state = Some(store);
        Ok(created)
    }

    /// Path of the repository file, if open
    pub fn repo_file(&self) -> Option<PathBuf> {
        self.state.lock().as_ref().map(OpenStore::repo_path)
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().as_ref().map_or(false, |s| s.dirty)
    }

    pub fn flags(&self) -> Result<StoreFlags> {
        self.with_open(|store| Ok(store.flags))
    }

    /// Add a new object at version 1. `reserve` is a size hint stored
    /// alongside it.
    pub fn add_object(&self, key: &str, payload: &[u8], reserve: u32) -> Result<()> {
        validate_key(key)?;
        self.with_write(|store| {
            if store.objects.contains_key(key) {
                return Err(StoreError::AlreadyExists(key.to_string()));
            }
            store.insert(key, payload, reserve)?;
            debug!("Added {}", key);
            Ok(())
        })
    }

    /// Create or overwrite. Returns whether the object was created, and its
    /// version afterwards.
    pub fn add_or_update(&self, key: &str, payload: &[u8], reserve: u32) -> Result<(bool, u32)> {
        validate_key(key)?;
        self.with_write(|store| match store.objects.get_mut(key) {
            Some(object) => {
                let version = object.replace(key, payload)?;
                store.dirty = true;
                Ok((false, version))
            }
            None => {
                store.insert(key, payload, reserve)?;
                Ok((true, INITIAL_VERSION))
            }
        })
    }

    pub fn key_exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        self.with_open(|store| Ok(store.objects.contains_key(key)))
    }

    /// Current version of `key` without its payload
    pub fn key_exists_with_version(&self, key: &str) -> Result<Option<u32>> {
        validate_key(key)?;
        self.with_open(|store| Ok(store.objects.get(key).map(|o| o.version)))
    }

    /// Read `key` unless the caller already holds its current version
    pub fn read_object(&self, key: &str, held_version: u32, throw_if_not_found: bool) -> Result<ReadResult> {
        validate_key(key)?;
        self.with_open(|store| match store.objects.get(key) {
            Some(object) if object.version == held_version => Ok(ReadResult::NoNewData),
            Some(object) => Ok(ReadResult::NewData {
                version: object.version,
                payload: object.payload.clone(),
            }),
            None if throw_if_not_found => Err(StoreError::NotFound(key.to_string())),
            None => Ok(ReadResult::NotFound),
        })
    }

    /// Overwrite an existing object; returns the new version
    pub fn update_object(&self, key: &str, payload: &[u8]) -> Result<u32> {
        validate_key(key)?;
        self.with_write(|store| {
            let version = store.get_mut(key)?.replace(key, payload)?;
            store.dirty = true;
            Ok(version)
        })
    }

    /// Overwrite only if the object is still at `expected_version`
    pub fn compare_and_swap(&self, key: &str, expected_version: u32, payload: &[u8]) -> Result<u32> {
        validate_key(key)?;
        self.with_write(|store| {
            let object = store.get_mut(key)?;
            if object.version != expected_version {
                return Err(StoreError::VersionConflict {
                    key: key.to_string(),
                    expected: expected_version,
                    actual: object.version,
                });
            }
            let version = object.replace(key, payload)?;
            store.dirty = true;
            Ok(version)
        })
    }

    pub fn delete_object(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.with_write(|store| {
            store
                .objects
                .remove(key)
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            store.dirty = true;
            Ok(())
        })
    }

    /// Returns whether there was an object to delete
    pub fn delete_object_if_exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        self.with_write(|store| {
            let existed = store.objects.remove(key).is_some();
            store.dirty |= existed;
            Ok(existed)
        })
    }

    /// Remove everything under `scope`; returns the number of objects removed
    pub fn delete_scope(&self, scope: &str) -> Result<usize> {
        validate_scope(scope)?;
        self.with_write(|store| {
            let doomed: Vec<String> = store
                .keys_under(scope)
                .map(|(key, _)| key.to_string())
                .collect();
            for key in &doomed {
                store.objects.remove(key);
            }
            if !doomed.is_empty() {
                store.dirty = true;
                debug!("Deleted scope {} ({} objects)", scope, doomed.len());
            }
            Ok(doomed.len())
        })
    }

    /// Names of the objects directly inside `scope`
    pub fn query_objects_in_scope(&self, scope: &str) -> Result<Vec<String>> {
        validate_scope(scope)?;
        self.with_open(|store| {
            Ok(store
                .keys_under(scope)
                .filter(|(_, rel)| !rel.contains('/'))
                .map(|(_, rel)| rel.to_string())
                .collect())
        })
    }

    /// Full keys of the objects directly inside `scope`
    pub fn query_keys_in_scope(&self, scope: &str) -> Result<Vec<String>> {
        validate_scope(scope)?;
        self.with_open(|store| {
            Ok(store
                .keys_under(scope)
                .filter(|(_, rel)| !rel.contains('/'))
                .map(|(key, _)| key.to_string())
                .collect())
        })
    }

    /// Names of the scopes directly inside `scope`
    pub fn query_sub_scopes(&self, scope: &str) -> Result<Vec<String>> {
        validate_scope(scope)?;
        self.with_open(|store| {
            let names: BTreeSet<&str> = store
                .keys_under(scope)
                .filter_map(|(_, rel)| rel.split_once('/').map(|(first, _)| first))
                .collect();
            Ok(names.into_iter().map(str::to_string).collect())
        })
    }

    /// Full keys of every object anywhere under `scope`
    pub fn all_objects_under(&self, scope: &str) -> Result<Vec<String>> {
        validate_scope(scope)?;
        self.with_open(|store| {
            Ok(store
                .keys_under_search(scope)
                .into_iter()
                .map(str::to_string)
                .collect())
        })
    }

    /// Full keys of every object under `scope` whose last component is `name`
    pub fn find_name_under(&self, name: &str, scope: &str) -> Result<Vec<String>> {
        validate_scope(scope)?;
        if name.is_empty() || name.contains('/') {
            return Err(StoreError::BadKey(name.to_string()));
        }
        self.with_open(|store| {
            let case_sensitive = store.flags.case_sensitive;
            Ok(store
                .keys_under_search(scope)
                .into_iter()
                .filter(|key| {
                    let last = name_of(key);
                    if case_sensitive {
                        last == name
                    } else {
                        last.to_lowercase() == name.to_lowercase()
                    }
                })
                .map(str::to_string)
                .collect())
        })
    }

    pub fn query_all_keys(&self) -> Result<Vec<String>> {
        self.with_open(|store| Ok(store.objects.keys().cloned().collect()))
    }

    pub fn objects_in_store(&self) -> Result<usize> {
        self.with_open(|store| Ok(store.objects.len()))
    }

    /// Write any changes whose write-through failed to the repository file
    pub fn flush(&self) -> Result<()> {
        self.with_open(OpenStore::flush)
    }

    /// Check the in-memory invariants: valid keys and versions, and no
    /// object sitting under another object
    pub fn validate(&self) -> Result<()> {
        self.with_open(|store| {
            for (key, object) in &store.objects {
                validate_key(key)
                    .map_err(|_| StoreError::InvalidState(format!("invalid key {}", key)))?;
                if object.version < INITIAL_VERSION {
                    return Err(StoreError::InvalidState(format!(
                        "{} has version {}",
                        key, object.version
                    )));
                }
                if let Some(parent) = ancestors(key).find(|a| store.objects.contains_key(*a)) {
                    return Err(StoreError::InvalidState(format!(
                        "{} is both an object and the scope of {}",
                        parent, key
                    )));
                }
            }
            Ok(())
        })
    }

    /// Flush and copy the repository to `<name>.cfgstore.bak`
    pub fn backup(&self) -> Result<PathBuf> {
        self.with_open(|store| {
            store.flush()?;
            let target = repo::backup_path(&store.dir, &store.name);
            fs::copy(store.repo_path(), &target)?;
            info!("Backed up object store to {}", target.display());
            Ok(target)
        })
    }

    /// Flush and return to the uninitialized state
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        let store = state.as_mut().ok_or(StoreError::NotReady)?;
        store.flush()?;
        info!("Closed object store {}", store.repo_path().display());
        *state = None;
        Ok(())
    }
}
