//! Directory service client side

use crate::error::Result;
use crate::server::{
    NameServer, NameServerMethod, NAME_SERVER_INSTANCE_ID, NAME_SERVER_INTERFACE_ID,
    NAME_SERVER_PROXY_TYPE,
};
use crate::types::{BindingEntry, BindingInfo, RebindInfo, RebindResult};
use async_trait::async_trait;
use binstream::BinOutStream;
use orb::{ClientProxy, Endpoint, ObjectId, ObjectKey, OrbClient, OrbRuntime};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Id of the directory object served at `endpoint`
pub fn name_server_object_id(endpoint: &Endpoint) -> ObjectId {
    ObjectId::new(
        ObjectKey::new(NAME_SERVER_INTERFACE_ID, NAME_SERVER_INSTANCE_ID),
        endpoint.clone(),
        NAME_SERVER_PROXY_TYPE,
    )
}

/// Typed proxy for a remote directory service
pub struct NameServerClient {
    proxy: ClientProxy,
}

impl NameServerClient {
    pub async fn connect(runtime: &OrbRuntime, endpoint: &Endpoint) -> Result<Self> {
        let client = runtime.connect_endpoint(endpoint).await?;
        Self::from_client(client)
    }

    /// Wrap an existing connection to a directory process
    pub fn from_client(client: Arc<OrbClient>) -> Result<Self> {
        let id = name_server_object_id(client.peer());
        Ok(Self {
            proxy: ClientProxy::new(id, &NAME_SERVER_INTERFACE_ID, client)?,
        })
    }

    pub fn object_id(&self) -> &ObjectId {
        self.proxy.object_id()
    }

    pub async fn bind(&self, path: &str, binding: &BindingInfo) -> Result<()> {
        let args = BinOutStream::new().with(path)?.with(binding)?;
        self.proxy.call(NameServerMethod::Bind, args).await?;
        Ok(())
    }

    /// Returns the directory's current cookie and, if `cookie` matched it,
    /// one result per binding
    pub async fn rebind_all(
        &self,
        bindings: &[RebindInfo],
        cookie: u64,
    ) -> Result<(u64, Option<Vec<RebindResult>>)> {
        let args = BinOutStream::new().with(bindings)?.with(&cookie)?;
        let mut out = self.proxy.call(NameServerMethod::RebindAll, args).await?;
        Ok((out.read()?, out.read()?))
    }

    pub async fn renew_leases(
        &self,
        paths: &[String],
        cookie: u64,
    ) -> Result<(u64, Option<Vec<bool>>)> {
        let args = BinOutStream::new().with(paths)?.with(&cookie)?;
        let mut out = self.proxy.call(NameServerMethod::RenewLeases, args).await?;
        Ok((out.read()?, out.read()?))
    }

    pub async fn lookup(&self, path: &str) -> Result<Option<ObjectId>> {
        let args = BinOutStream::new().with(path)?;
        let mut out = self.proxy.call(NameServerMethod::Lookup, args).await?;
        Ok(out.read()?)
    }

    pub async fn binding_info(&self, path: &str) -> Result<Option<BindingInfo>> {
        let args = BinOutStream::new().with(path)?;
        let mut out = self.proxy.call(NameServerMethod::BindingInfo, args).await?;
        Ok(out.read()?)
    }

    pub async fn binding_exists(&self, path: &str) -> Result<bool> {
        let args = BinOutStream::new().with(path)?;
        let mut out = self.proxy.call(NameServerMethod::BindingExists, args).await?;
        Ok(out.read()?)
    }

    pub async fn scope_exists(&self, path: &str) -> Result<bool> {
        let args = BinOutStream::new().with(path)?;
        let mut out = self.proxy.call(NameServerMethod::ScopeExists, args).await?;
        Ok(out.read()?)
    }

    pub async fn create_scope(&self, parent: &str, name: &str, description: &str) -> Result<()> {
        let args = BinOutStream::new()
            .with(parent)?
            .with(name)?
            .with(description)?;
        self.proxy.call(NameServerMethod::CreateScope, args).await?;
        Ok(())
    }

    pub async fn create_scope_path(&self, path: &str) -> Result<()> {
        let args = BinOutStream::new().with(path)?;
        self.proxy
            .call(NameServerMethod::CreateScopePath, args)
            .await?;
        Ok(())
    }

    pub async fn remove_binding(&self, path: &str) -> Result<()> {
        let args = BinOutStream::new().with(path)?;
        self.proxy.call(NameServerMethod::RemoveBinding, args).await?;
        Ok(())
    }

    pub async fn remove_scope(&self, path: &str) -> Result<()> {
        let args = BinOutStream::new().with(path)?;
        self.proxy.call(NameServerMethod::RemoveScope, args).await?;
        Ok(())
    }

    pub async fn enum_bindings(&self, scope: &str) -> Result<Vec<BindingEntry>> {
        let args = BinOutStream::new().with(scope)?;
        let mut out = self.proxy.call(NameServerMethod::EnumBindings, args).await?;
        Ok(out.read()?)
    }

    pub async fn enum_subscopes(&self, scope: &str) -> Result<Vec<String>> {
        let args = BinOutStream::new().with(scope)?;
        let mut out = self.proxy.call(NameServerMethod::EnumSubscopes, args).await?;
        Ok(out.read()?)
    }

    pub async fn update_extra(&self, path: &str, index: u32, value: &str) -> Result<()> {
        let args = BinOutStream::new().with(path)?.with(&index)?.with(value)?;
        self.proxy.call(NameServerMethod::UpdateExtra, args).await?;
        Ok(())
    }

    pub async fn query_cookie(&self) -> Result<u64> {
        let mut out = self
            .proxy
            .call_no_args(NameServerMethod::QueryCookie)
            .await?;
        Ok(out.read()?)
    }
}

/// The directory operations the rebinder relies on
#[async_trait]
pub trait Directory: Send + Sync {
    async fn query_cookie(&self) -> Result<u64>;

    async fn rebind_all(
        &self,
        bindings: &[RebindInfo],
        cookie: u64,
    ) -> Result<(u64, Option<Vec<RebindResult>>)>;

    async fn renew_leases(&self, paths: &[String], cookie: u64)
        -> Result<(u64, Option<Vec<bool>>)>;

    async fn remove_binding(&self, path: &str) -> Result<()>;
}

/// An in-process directory answers directly
#[async_trait]
impl Directory for NameServer {
    async fn query_cookie(&self) -> Result<u64> {
        Ok(self.cookie())
    }

    async fn rebind_all(
        &self,
        bindings: &[RebindInfo],
        cookie: u64,
    ) -> Result<(u64, Option<Vec<RebindResult>>)> {
        Ok(NameServer::rebind_all(self, bindings, cookie))
    }

    async fn renew_leases(
        &self,
        paths: &[String],
        cookie: u64,
    ) -> Result<(u64, Option<Vec<bool>>)> {
        Ok(NameServer::renew_leases(self, paths, cookie))
    }

    async fn remove_binding(&self, path: &str) -> Result<()> {
        NameServer::remove_binding(self, path)
    }
}

/// A directory reached over the broker.
///
/// Connects on first use and drops the connection after any failure that
/// did not come from the directory itself, so the next call reconnects.
pub struct RemoteDirectory {
    runtime: Arc<OrbRuntime>,
    endpoint: Endpoint,
    client: Mutex<Option<Arc<NameServerClient>>>,
}

impl RemoteDirectory {
    pub fn new(runtime: Arc<OrbRuntime>, endpoint: Endpoint) -> Self {
        Self {
            runtime,
            endpoint,
            client: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn client(&self) -> Result<Arc<NameServerClient>> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        debug!("Connecting to name server at {}", self.endpoint);
        let client = Arc::new(NameServerClient::connect(&self.runtime, &self.endpoint).await?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    async fn check<T>(&self, result: Result<T>) -> Result<T> {
        let unavailable = matches!(&result, Err(e) if e.is_unavailable());
        if unavailable {
            *self.client.lock().await = None;
        }
        result
    }
}

#[async_trait]
impl Directory for RemoteDirectory {
    async fn query_cookie(&self) -> Result<u64> {
        let client = self.client().await?;
        self.check(client.query_cookie().await).await
    }

    async fn rebind_all(
        &self,
        bindings: &[RebindInfo],
        cookie: u64,
    ) -> Result<(u64, Option<Vec<RebindResult>>)> {
        let client = self.client().await?;
        self.check(client.rebind_all(bindings, cookie).await).await
    }

    async fn renew_leases(
        &self,
        paths: &[String],
        cookie: u64,
    ) -> Result<(u64, Option<Vec<bool>>)> {
        let client = self.client().await?;
        self.check(client.renew_leases(paths, cookie).await).await
    }

    async fn remove_binding(&self, path: &str) -> Result<()> {
        let client = self.client().await?;
        self.check(client.remove_binding(path).await).await
    }
}
