//! Configuration service
//!
//! Exposes a [`VersionedObjectStore`] through the broker. Opening and closing
//! the store stay with the hosting process; everything else is a remote
//! method.

use crate::error::StoreError;
use crate::store::VersionedObjectStore;
use binstream::{BinInStream, BinOutStream, Bytes};
use orb::{InstanceId, Interface, InterfaceBuilder, InterfaceId, ObjectId, OrbRuntime};
use std::sync::Arc;

/// Interface id of the configuration service
pub const CFG_STORE_INTERFACE_ID: InterfaceId = InterfaceId::from_bytes([
    0x63, 0x66, 0x67, 0x73, 0x74, 0x6f, 0x72, 0x01, 0x52, 0xe8, 0x1b, 0x77, 0x0c, 0x94, 0xaf, 0x36,
]);

pub const CFG_STORE_PROXY_TYPE: &str = "CfgStoreClient";

orb::orb_methods! {
    /// Methods of the configuration service interface
    pub enum CfgStoreMethod {
        AddObject => "AddObject",
        AddOrUpdate => "AddOrUpdate",
        KeyExists => "KeyExists",
        KeyExistsWithVersion => "KeyExistsWithVersion",
        ReadObject => "ReadObject",
        UpdateObject => "UpdateObject",
        CompareAndSwap => "CompareAndSwap",
        DeleteObject => "DeleteObject",
        DeleteObjectIfExists => "DeleteObjectIfExists",
        DeleteScope => "DeleteScope",
        QueryObjectsInScope => "QueryObjectsInScope",
        QuerySubScopes => "QuerySubScopes",
        QueryKeysInScope => "QueryKeysInScope",
        AllObjectsUnder => "AllObjectsUnder",
        FindNameUnder => "FindNameUnder",
        QueryAllKeys => "QueryAllKeys",
        ObjectsInStore => "ObjectsInStore",
        Flush => "Flush",
        Validate => "Validate",
        Backup => "Backup",
    }
}

/// Register `store` with `runtime` under a fresh instance id
pub async fn publish_store(
    runtime: &OrbRuntime,
    store: Arc<VersionedObjectStore>,
) -> orb::Result<ObjectId> {
    runtime
        .register_object(
            InstanceId::generate(),
            vec![create_cfg_store_interface(store)],
            CFG_STORE_PROXY_TYPE,
        )
        .await
}

macro_rules! handler {
    ($store:expr, $func:ident) => {{
        let store = Arc::clone(&$store);
        move |args| $func(Arc::clone(&store), args)
    }};
}

/// Build the broker interface for a store
pub fn create_cfg_store_interface(store: Arc<VersionedObjectStore>) -> Interface {
    use CfgStoreMethod as M;

    InterfaceBuilder::new(CFG_STORE_INTERFACE_ID, "CfgStore")
        .operation(M::AddObject, handler!(store, op_add_object))
        .operation(M::AddOrUpdate, handler!(store, op_add_or_update))
        .operation(M::KeyExists, handler!(store, op_key_exists))
        .operation(M::KeyExistsWithVersion, handler!(store, op_key_exists_with_version))
        .operation(M::ReadObject, handler!(store, op_read_object))
        .operation(M::UpdateObject, handler!(store, op_update_object))
        .operation(M::CompareAndSwap, handler!(store, op_compare_and_swap))
        .operation(M::DeleteObject, handler!(store, op_delete_object))
        .operation(M::DeleteObjectIfExists, handler!(store, op_delete_object_if_exists))
        .operation(M::DeleteScope, handler!(store, op_delete_scope))
        .operation(M::QueryObjectsInScope, handler!(store, op_query_objects_in_scope))
        .operation(M::QuerySubScopes, handler!(store, op_query_sub_scopes))
        .operation(M::QueryKeysInScope, handler!(store, op_query_keys_in_scope))
        .operation(M::AllObjectsUnder, handler!(store, op_all_objects_under))
        .operation(M::FindNameUnder, handler!(store, op_find_name_under))
        .operation(M::QueryAllKeys, handler!(store, op_query_all_keys))
        .operation(M::ObjectsInStore, handler!(store, op_objects_in_store))
        .operation(M::Flush, handler!(store, op_flush))
        .operation(M::Validate, handler!(store, op_validate))
        .operation(M::Backup, handler!(store, op_backup))
        .build()
}

type OpResult = orb::Result<BinOutStream>;

/// Run a store call that touches the file system off the async workers
async fn blocking<T, F>(store: Arc<VersionedObjectStore>, f: F) -> orb::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&VersionedObjectStore) -> crate::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| StoreError::InvalidState(format!("store task failed: {}", e)))?
        .map_err(Into::into)
}

/// Counts travel as `u32` on the wire
fn wire_count(count: usize) -> crate::Result<u32> {
    u32::try_from(count)
        .map_err(|_| StoreError::InvalidState(format!("count {} does not fit the wire", count)))
}

async fn op_add_object(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let key: String = args.read()?;
    let payload: Bytes = args.read()?;
    let reserve: u32 = args.read()?;
    blocking(store, move |s| s.add_object(&key, &payload, reserve)).await?;
    Ok(BinOutStream::new())
}

async fn op_add_or_update(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let key: String = args.read()?;
    let payload: Bytes = args.read()?;
    let reserve: u32 = args.read()?;
    let (created, version) = blocking(store, move |s| s.add_or_update(&key, &payload, reserve)).await?;
    Ok(BinOutStream::new().with(&created)?.with(&version)?)
}

async fn op_key_exists(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let key: String = args.read()?;
    Ok(BinOutStream::new().with(&store.key_exists(&key)?)?)
}

async fn op_key_exists_with_version(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let key: String = args.read()?;
    Ok(BinOutStream::new().with(&store.key_exists_with_version(&key)?)?)
}

async fn op_read_object(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let key: String = args.read()?;
    let held_version: u32 = args.read()?;
    let throw_if_not_found: bool = args.read()?;
    let result = store.read_object(&key, held_version, throw_if_not_found)?;
    Ok(BinOutStream::new().with(&result)?)
}

async fn op_update_object(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let key: String = args.read()?;
    let payload: Bytes = args.read()?;
    let version = blocking(store, move |s| s.update_object(&key, &payload)).await?;
    Ok(BinOutStream::new().with(&version)?)
}

async fn op_compare_and_swap(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let key: String = args.read()?;
    let expected_version: u32 = args.read()?;
    let payload: Bytes = args.read()?;
    let version = blocking(store, move |s| s.compare_and_swap(&key, expected_version, &payload)).await?;
    Ok(BinOutStream::new().with(&version)?)
}

async fn op_delete_object(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let key: String = args.read()?;
    blocking(store, move |s| s.delete_object(&key)).await?;
    Ok(BinOutStream::new())
}

async fn op_delete_object_if_exists(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let key: String = args.read()?;
    let existed = blocking(store, move |s| s.delete_object_if_exists(&key)).await?;
    Ok(BinOutStream::new().with(&existed)?)
}

async fn op_delete_scope(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let scope: String = args.read()?;
    let removed = wire_count(blocking(store, move |s| s.delete_scope(&scope)).await?)?;
    Ok(BinOutStream::new().with(&removed)?)
}

async fn op_query_objects_in_scope(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let scope: String = args.read()?;
    Ok(BinOutStream::new().with(&store.query_objects_in_scope(&scope)?)?)
}

async fn op_query_sub_scopes(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let scope: String = args.read()?;
    Ok(BinOutStream::new().with(&store.query_sub_scopes(&scope)?)?)
}

async fn op_query_keys_in_scope(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let scope: String = args.read()?;
    Ok(BinOutStream::new().with(&store.query_keys_in_scope(&scope)?)?)
}

async fn op_all_objects_under(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let scope: String = args.read()?;
    Ok(BinOutStream::new().with(&store.all_objects_under(&scope)?)?)
}

async fn op_find_name_under(store: Arc<VersionedObjectStore>, mut args: BinInStream) -> OpResult {
    let name: String = args.read()?;
    let scope: String = args.read()?;
    Ok(BinOutStream::new().with(&store.find_name_under(&name, &scope)?)?)
}

async fn op_query_all_keys(store: Arc<VersionedObjectStore>, _args: BinInStream) -> OpResult {
    Ok(BinOutStream::new().with(&store.query_all_keys()?)?)
}

async fn op_objects_in_store(store: Arc<VersionedObjectStore>, _args: BinInStream) -> OpResult {
    let count = wire_count(store.objects_in_store()?)?;
    Ok(BinOutStream::new().with(&count)?)
}

async fn op_flush(store: Arc<VersionedObjectStore>, _args: BinInStream) -> OpResult {
    blocking(store, |s| s.flush()).await?;
    Ok(BinOutStream::new())
}

async fn op_validate(store: Arc<VersionedObjectStore>, _args: BinInStream) -> OpResult {
    store.validate()?;
    Ok(BinOutStream::new())
}

async fn op_backup(store: Arc<VersionedObjectStore>, _args: BinInStream) -> OpResult {
    let path = blocking(store, |s| s.backup()).await?;
    let path = path.to_string_lossy().into_owned();
    Ok(BinOutStream::new().with(&path)?)
}
