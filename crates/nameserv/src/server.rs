//! Directory service server side
//!
//! `NameServer` wraps a [`NameTree`] behind a lock, stamps itself with a
//! cookie that changes every time a server is created, and runs a landlord
//! task that expires stale leases. [`create_name_server_interface`] exposes
//! it through the broker.

use crate::error::{NameError, Result};
use crate::tree::NameTree;
use crate::types::{BindingEntry, BindingInfo, RebindInfo, RebindResult};
use binstream::{BinInStream, BinOutStream};
use orb::{InstanceId, Interface, InterfaceBuilder, InterfaceId, ObjectId, OrbRuntime};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Interface id of the directory service
pub const NAME_SERVER_INTERFACE_ID: InterfaceId = InterfaceId::from_bytes([
    0x6e, 0x61, 0x6d, 0x65, 0x73, 0x72, 0x76, 0x01, 0x8c, 0x2d, 0x41, 0x5b, 0x9e, 0x07, 0x3a, 0xd4,
]);

/// The directory object has a fixed instance so clients can address it
/// knowing only the host and port
pub const NAME_SERVER_INSTANCE_ID: InstanceId = InstanceId::from_bytes([
    0x6e, 0x61, 0x6d, 0x65, 0x73, 0x72, 0x76, 0x02, 0x11, 0x42, 0x5f, 0x60, 0xa3, 0x19, 0xc7, 0x0e,
]);

pub const NAME_SERVER_PROXY_TYPE: &str = "NameServerClient";

pub const DEFAULT_NAME_SERVER_PORT: u16 = 13_502;

orb::orb_methods! {
    /// Methods of the directory interface
    pub enum NameServerMethod {
        Bind => "Bind",
        RebindAll => "RebindAll",
        RenewLeases => "RenewLeases",
        Lookup => "Lookup",
        BindingInfo => "BindingInfo",
        BindingExists => "BindingExists",
        ScopeExists => "ScopeExists",
        CreateScope => "CreateScope",
        CreateScopePath => "CreateScopePath",
        RemoveBinding => "RemoveBinding",
        RemoveScope => "RemoveScope",
        EnumBindings => "EnumBindings",
        EnumSubscopes => "EnumSubscopes",
        UpdateExtra => "UpdateExtra",
        QueryCookie => "QueryCookie",
    }
}

/// Directory service settings
#[derive(Debug, Clone)]
pub struct NameServerConfig {
    /// How long a binding lives without renewal. `None` disables leases.
    pub lease_duration: Option<Duration>,
    /// How often the landlord looks for expired leases
    pub landlord_interval: Duration,
}

impl Default for NameServerConfig {
    fn default() -> Self {
        Self {
            lease_duration: Some(Duration::from_secs(60)),
            landlord_interval: Duration::from_secs(15),
        }
    }
}

static LAST_COOKIE: AtomicU64 = AtomicU64::new(0);

/// Cookie for a newly created server: the current time, bumped so that two
/// servers created in one process never share one
fn next_cookie() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut last = LAST_COOKIE.load(Ordering::SeqCst);
    loop {
        let next = now.max(last + 1);
        match LAST_COOKIE.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

/// The directory service
pub struct NameServer {
    tree: Mutex<NameTree>,
    cookie: u64,
    config: NameServerConfig,
    landlord_stop: watch::Sender<bool>,
}

impl NameServer {
    pub fn new(config: NameServerConfig) -> Arc<Self> {
        let cookie = next_cookie();
        info!(
            "Name server starting, cookie={:#x}, lease={:?}",
            cookie, config.lease_duration
        );
        let (landlord_stop, _) = watch::channel(false);
        Arc::new(Self {
            tree: Mutex::new(NameTree::new(config.lease_duration)),
            cookie,
            config,
            landlord_stop,
        })
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    pub fn config(&self) -> &NameServerConfig {
        &self.config
    }

    pub fn binding_count(&self) -> usize {
        self.tree.lock().binding_count()
    }

    pub fn bind(&self, path: &str, binding: BindingInfo) -> Result<()> {
        debug!("Bind {}", path);
        self.tree.lock().bind(path, binding, Instant::now())
    }

    /// Refresh or create each binding in order.
    ///
    /// Returns the current cookie, and the per-entry results only if
    /// `cookie` matched it.
    pub fn rebind_all(&self, bindings: &[RebindInfo], cookie: u64) -> (u64, Option<Vec<RebindResult>>) {
        if cookie != self.cookie {
            debug!("RebindAll with stale cookie {:#x}", cookie);
            return (self.cookie, None);
        }
        let now = Instant::now();
        let mut tree = self.tree.lock();
        let results = bindings
            .iter()
            .map(|b| {
                let result = tree.rebind(&b.path, b.binding.clone(), now);
                if result != RebindResult::Success {
                    debug!("Rebind of {} gave {:?}", b.path, result);
                }
                result
            })
            .collect();
        (self.cookie, Some(results))
    }

    /// Renew the lease of each path. Same cookie rule as `rebind_all`.
    pub fn renew_leases(&self, paths: &[String], cookie: u64) -> (u64, Option<Vec<bool>>) {
        if cookie != self.cookie {
            return (self.cookie, None);
        }
        let now = Instant::now();
        let mut tree = self.tree.lock();
        let results = paths.iter().map(|p| tree.renew(p, now)).collect();
        (self.cookie, Some(results))
    }

    pub fn lookup(&self, path: &str) -> Result<Option<ObjectId>> {
        Ok(self.tree.lock().lookup(path)?.map(|b| b.object_id.clone()))
    }

    pub fn binding_info(&self, path: &str) -> Result<Option<BindingInfo>> {
        Ok(self.tree.lock().lookup(path)?.cloned())
    }

    pub fn binding_exists(&self, path: &str) -> Result<bool> {
        self.tree.lock().binding_exists(path)
    }

    pub fn scope_exists(&self, path: &str) -> Result<bool> {
        self.tree.lock().scope_exists(path)
    }

    pub fn create_scope(&self, parent: &str, name: &str, description: &str) -> Result<()> {
        self.tree.lock().create_scope(parent, name, description)
    }

    pub fn create_scope_path(&self, path: &str) -> Result<()> {
        self.tree.lock().create_scope_path(path)
    }

    pub fn remove_binding(&self, path: &str) -> Result<()> {
        debug!("Remove binding {}", path);
        self.tree.lock().remove_binding(path)
    }

    pub fn remove_scope(&self, path: &str) -> Result<()> {
        self.tree.lock().remove_scope(path)
    }

    pub fn enum_bindings(&self, scope: &str) -> Result<Vec<BindingEntry>> {
        self.tree.lock().enum_bindings(scope)
    }

    pub fn enum_subscopes(&self, scope: &str) -> Result<Vec<String>> {
        self.tree.lock().enum_subscopes(scope)
    }

    pub fn update_extra(&self, path: &str, index: u32, value: &str) -> Result<()> {
        self.tree.lock().update_extra(path, index, value)
    }

    /// Remove every binding whose lease has run out
    pub fn expire_leases(&self) -> usize {
        let removed = self.tree.lock().expire(Instant::now());
        for path in &removed {
            info!("Lease expired for {}", path);
        }
        removed.len()
    }

    /// Start the task that expires leases every `landlord_interval`. Does
    /// nothing useful when leases are disabled.
    pub fn start_landlord(self: &Arc<Self>) -> JoinHandle<()> {
        let server: Weak<Self> = Arc::downgrade(self);
        let period = self.config.landlord_interval;
        let mut stop = self.landlord_stop.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {}
                }
                match server.upgrade() {
                    Some(server) => {
                        server.expire_leases();
                    }
                    None => break,
                }
            }
            debug!("Landlord stopped");
        })
    }

    pub fn stop_landlord(&self) {
        let _ = self.landlord_stop.send(true);
    }

    /// Register the directory object under its well-known key
    pub async fn publish(self: &Arc<Self>, runtime: &OrbRuntime) -> orb::Result<ObjectId> {
        runtime
            .register_object(
                NAME_SERVER_INSTANCE_ID,
                vec![create_name_server_interface(Arc::clone(self))],
                NAME_SERVER_PROXY_TYPE,
            )
            .await
    }
}

macro_rules! handler {
    ($server:expr, $func:ident) => {{
        let server = Arc::clone(&$server);
        move |args| $func(Arc::clone(&server), args)
    }};
}

/// Build the broker interface for a directory service
pub fn create_name_server_interface(server: Arc<NameServer>) -> Interface {
    use NameServerMethod as M;

    InterfaceBuilder::new(NAME_SERVER_INTERFACE_ID, "NameServer")
        .operation(M::Bind, handler!(server, op_bind))
        .operation(M::RebindAll, handler!(server, op_rebind_all))
        .operation(M::RenewLeases, handler!(server, op_renew_leases))
        .operation(M::Lookup, handler!(server, op_lookup))
        .operation(M::BindingInfo, handler!(server, op_binding_info))
        .operation(M::BindingExists, handler!(server, op_binding_exists))
        .operation(M::ScopeExists, handler!(server, op_scope_exists))
        .operation(M::CreateScope, handler!(server, op_create_scope))
        .operation(M::CreateScopePath, handler!(server, op_create_scope_path))
        .operation(M::RemoveBinding, handler!(server, op_remove_binding))
        .operation(M::RemoveScope, handler!(server, op_remove_scope))
        .operation(M::EnumBindings, handler!(server, op_enum_bindings))
        .operation(M::EnumSubscopes, handler!(server, op_enum_subscopes))
        .operation(M::UpdateExtra, handler!(server, op_update_extra))
        .operation(M::QueryCookie, handler!(server, op_query_cookie))
        .build()
}

type OpResult = orb::Result<BinOutStream>;

async fn op_bind(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let path: String = args.read()?;
    let binding: BindingInfo = args.read()?;
    server.bind(&path, binding)?;
    Ok(BinOutStream::new())
}

async fn op_rebind_all(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let bindings: Vec<RebindInfo> = args.read()?;
    let cookie: u64 = args.read()?;
    let (current, results) = server.rebind_all(&bindings, cookie);
    Ok(BinOutStream::new().with(&current)?.with(&results)?)
}

async fn op_renew_leases(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let paths: Vec<String> = args.read()?;
    let cookie: u64 = args.read()?;
    let (current, results) = server.renew_leases(&paths, cookie);
    Ok(BinOutStream::new().with(&current)?.with(&results)?)
}

async fn op_lookup(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let path: String = args.read()?;
    Ok(BinOutStream::new().with(&server.lookup(&path)?)?)
}

async fn op_binding_info(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let path: String = args.read()?;
    Ok(BinOutStream::new().with(&server.binding_info(&path)?)?)
}

async fn op_binding_exists(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let path: String = args.read()?;
    Ok(BinOutStream::new().with(&server.binding_exists(&path)?)?)
}

async fn op_scope_exists(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let path: String = args.read()?;
    Ok(BinOutStream::new().with(&server.scope_exists(&path)?)?)
}

async fn op_create_scope(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let parent: String = args.read()?;
    let name: String = args.read()?;
    let description: String = args.read()?;
    server.create_scope(&parent, &name, &description)?;
    Ok(BinOutStream::new())
}

async fn op_create_scope_path(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let path: String = args.read()?;
    server.create_scope_path(&path)?;
    Ok(BinOutStream::new())
}

async fn op_remove_binding(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let path: String = args.read()?;
    server.remove_binding(&path)?;
    Ok(BinOutStream::new())
}

async fn op_remove_scope(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let path: String = args.read()?;
    server.remove_scope(&path)?;
    Ok(BinOutStream::new())
}

async fn op_enum_bindings(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let scope: String = args.read()?;
    Ok(BinOutStream::new().with(&server.enum_bindings(&scope)?)?)
}

async fn op_enum_subscopes(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let scope: String = args.read()?;
    Ok(BinOutStream::new().with(&server.enum_subscopes(&scope)?)?)
}

async fn op_update_extra(server: Arc<NameServer>, mut args: BinInStream) -> OpResult {
    let path: String = args.read()?;
    let index: u32 = args.read()?;
    let value: String = args.read()?;
    server.update_extra(&path, index, &value)?;
    Ok(BinOutStream::new())
}

async fn op_query_cookie(server: Arc<NameServer>, _args: BinInStream) -> OpResult {
    Ok(BinOutStream::new().with(&server.cookie())?)
}
