//! Typed proxy for a remote configuration service

use crate::error::Result;
use crate::service::{CfgStoreMethod as M, CFG_STORE_INTERFACE_ID};
use crate::store::ReadResult;
use binstream::{BinOutStream, Bytes};
use orb::{ClientProxy, ObjectId, OrbRuntime};
use std::time::Duration;

pub struct CfgStoreClient {
    proxy: ClientProxy,
}

impl CfgStoreClient {
    /// Connect to the store object named by `id`, usually found through the
    /// directory service
    pub async fn connect(runtime: &OrbRuntime, id: &ObjectId) -> Result<Self> {
        let client = runtime.connect(id).await?;
        Ok(Self {
            proxy: ClientProxy::new(id.clone(), &CFG_STORE_INTERFACE_ID, client)?,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.proxy.set_timeout(timeout);
        self
    }

    pub fn object_id(&self) -> &ObjectId {
        self.proxy.object_id()
    }

    pub async fn add_object(&self, key: &str, payload: &[u8], reserve: u32) -> Result<()> {
        let args = BinOutStream::new()
            .with(key)?
            .with(&Bytes::copy_from_slice(payload))?
            .with(&reserve)?;
        self.proxy.call(M::AddObject, args).await?;
        Ok(())
    }

    pub async fn add_or_update(&self, key: &str, payload: &[u8], reserve: u32) -> Result<(bool, u32)> {
        let args = BinOutStream::new()
            .with(key)?
            .with(&Bytes::copy_from_slice(payload))?
            .with(&reserve)?;
        let mut out = self.proxy.call(M::AddOrUpdate, args).await?;
        Ok((out.read()?, out.read()?))
    }

    pub async fn key_exists(&self, key: &str) -> Result<bool> {
        let mut out = self.proxy.call(M::KeyExists, BinOutStream::new().with(key)?).await?;
        Ok(out.read()?)
    }

    pub async fn key_exists_with_version(&self, key: &str) -> Result<Option<u32>> {
        let args = BinOutStream::new().with(key)?;
        let mut out = self.proxy.call(M::KeyExistsWithVersion, args).await?;
        Ok(out.read()?)
    }

    pub async fn read_object(&self, key: &str, held_version: u32, throw_if_not_found: bool) -> Result<ReadResult> {
        let args = BinOutStream::new()
            .with(key)?
            .with(&held_version)?
            .with(&throw_if_not_found)?;
        let mut out = self.proxy.call(M::ReadObject, args).await?;
        Ok(out.read()?)
    }

    pub async fn update_object(&self, key: &str, payload: &[u8]) -> Result<u32> {
        let args = BinOutStream::new()
            .with(key)?
            .with(&Bytes::copy_from_slice(payload))?;
        let mut out = self.proxy.call(M::UpdateObject, args).await?;
        Ok(out.read()?)
    }

    pub async fn compare_and_swap(&self, key: &str, expected_version: u32, payload: &[u8]) -> Result<u32> {
        let args = BinOutStream::new()
            .with(key)?
            .with(&expected_version)?
            .with(&Bytes::copy_from_slice(payload))?;
        let mut out = self.proxy.call(M::CompareAndSwap, args).await?;
        Ok(out.read()?)
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.proxy.call(M::DeleteObject, BinOutStream::new().with(key)?).await?;
        Ok(())
    }

    pub async fn delete_object_if_exists(&self, key: &str) -> Result<bool> {
        let args = BinOutStream::new().with(key)?;
        let mut out = self.proxy.call(M::DeleteObjectIfExists, args).await?;
        Ok(out.read()?)
    }

    pub async fn delete_scope(&self, scope: &str) -> Result<u32> {
        let mut out = self.proxy.call(M::DeleteScope, BinOutStream::new().with(scope)?).await?;
        Ok(out.read()?)
    }

    pub async fn query_objects_in_scope(&self, scope: &str) -> Result<Vec<String>> {
        let args = BinOutStream::new().with(scope)?;
        let mut out = self.proxy.call(M::QueryObjectsInScope, args).await?;
        Ok(out.read()?)
    }

    pub async fn query_sub_scopes(&self, scope: &str) -> Result<Vec<String>> {
        let args = BinOutStream::new().with(scope)?;
        let mut out = self.proxy.call(M::QuerySubScopes, args).await?;
        Ok(out.read()?)
    }

    pub async fn query_keys_in_scope(&self, scope: &str) -> Result<Vec<String>> {
        let args = BinOutStream::new().with(scope)?;
        let mut out = self.proxy.call(M::QueryKeysInScope, args).await?;
        Ok(out.read()?)
    }

    pub async fn all_objects_under(&self, scope: &str) -> Result<Vec<String>> {
        let args = BinOutStream::new().with(scope)?;
        let mut out = self.proxy.call(M::AllObjectsUnder, args).await?;
        Ok(out.read()?)
    }

    pub async fn find_name_under(&self, name: &str, scope: &str) -> Result<Vec<String>> {
        let args = BinOutStream::new().with(name)?.with(scope)?;
        let mut out = self.proxy.call(M::FindNameUnder, args).await?;
        Ok(out.read()?)
    }

    pub async fn query_all_keys(&self) -> Result<Vec<String>> {
        let mut out = self.proxy.call_no_args(M::QueryAllKeys).await?;
        Ok(out.read()?)
    }

    pub async fn objects_in_store(&self) -> Result<u32> {
        let mut out = self.proxy.call_no_args(M::ObjectsInStore).await?;
        Ok(out.read()?)
    }

    pub async fn flush(&self) -> Result<()> {
        self.proxy.call_no_args(M::Flush).await?;
        Ok(())
    }

    pub async fn validate(&self) -> Result<()> {
        self.proxy.call_no_args(M::Validate).await?;
        Ok(())
    }

    /// Returns the backup file's path on the server host
    pub async fn backup(&self) -> Result<String> {
        let mut out = self.proxy.call_no_args(M::Backup).await?;
        Ok(out.read()?)
    }
}
