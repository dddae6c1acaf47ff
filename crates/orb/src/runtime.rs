//! Broker runtime context
//!
//! An `OrbRuntime` owns everything a process needs to host and call objects:
//! the object table, the listening server and the client defaults. It is
//! created with [`OrbRuntime::init`], shared by `Arc`, and torn down with
//! [`OrbRuntime::shutdown`]. After shutdown every operation fails `NotReady`.

use crate::client::{OrbClient, OrbClientBuilder, DEFAULT_CALL_TIMEOUT};
use crate::error::{OrbError, Result};
use crate::identity::{Endpoint, InstanceId, ObjectId, ObjectKey};
use crate::interface::{Interface, ServerObject};
use crate::server::{ObjectTable, OrbServer, ServerConfig, ServerStats, ServerStatsSnapshot};
use crate::transport::DEFAULT_MAX_FRAME_SIZE;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct OrbConfig {
    /// Host name written into ObjectIds. Defaults to the listen address, or
    /// the local host name when listening on a wildcard address.
    pub advertise_host: Option<String>,
    pub client_timeout: Duration,
    pub connect_timeout: Option<Duration>,
    pub max_frame_size: usize,
    pub server: ServerConfig,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            advertise_host: None,
            client_timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: Some(Duration::from_secs(5)),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            server: ServerConfig::default(),
        }
    }
}

#[derive(Default)]
struct ServerState {
    endpoint: Option<Endpoint>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
}

/// Process-wide broker context
pub struct OrbRuntime {
    config: OrbConfig,
    objects: Arc<ObjectTable>,
    stats: Arc<ServerStats>,
    state: Mutex<ServerState>,
    closed: AtomicBool,
}

impl OrbRuntime {
    pub fn init(config: OrbConfig) -> Arc<Self> {
        debug!("Initializing ORB runtime");
        Arc::new(Self {
            config,
            objects: Arc::new(ObjectTable::new()),
            stats: Arc::new(ServerStats::default()),
            state: Mutex::new(ServerState::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OrbError::NotReady);
        }
        Ok(())
    }

    /// Bind `addr` and start serving registered objects.
    ///
    /// Returns the endpoint written into ObjectIds; with port 0 it carries the
    /// port the system picked.
    pub async fn start_server(&self, addr: SocketAddr) -> Result<Endpoint> {
        self.ensure_open()?;
        if self.state.lock().task.is_some() {
            return Err(OrbError::AlreadyExists(format!("server on {}", addr)));
        }

        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let host = match &self.config.advertise_host {
            Some(host) => host.clone(),
            None if local.ip().is_unspecified() => local_host_name(),
            None => local.ip().to_string(),
        };
        let endpoint = Endpoint::new(host, local.port());

        let server = OrbServer::with_config(Arc::clone(&self.objects), self.config.server.clone())
            .with_stats(Arc::clone(&self.stats));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve_until(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut state = self.state.lock();
        state.endpoint = Some(endpoint.clone());
        state.stop = Some(stop_tx);
        state.task = Some(task);
        info!("ORB runtime serving on {} as {}", local, endpoint);
        Ok(endpoint)
    }

    /// Endpoint of the running server, if any
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.state.lock().endpoint.clone()
    }

    /// Publish an object under a fresh key built from the chain's most
    /// derived interface and `instance`.
    pub async fn register_object(
        &self,
        instance: InstanceId,
        chain: Vec<Interface>,
        proxy_type: &str,
    ) -> Result<ObjectId> {
        self.ensure_open()?;
        let endpoint = self.endpoint().ok_or(OrbError::NotReady)?;

        let object = Arc::new(ServerObject::new(instance, chain)?);
        let key = *object.key();
        self.objects.insert(object).await?;
        debug!("Registered object {} ({})", key, proxy_type);
        Ok(ObjectId::new(key, endpoint, proxy_type))
    }

    pub async fn deregister_object(&self, key: &ObjectKey) -> Result<()> {
        self.ensure_open()?;
        match self.objects.remove(key).await {
            Some(_) => {
                debug!("Deregistered object {}", key);
                Ok(())
            }
            None => Err(OrbError::NotFound(key.to_string())),
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Open a connection to the process serving `id`
    pub async fn connect(&self, id: &ObjectId) -> Result<Arc<OrbClient>> {
        self.connect_endpoint(id.endpoint()).await
    }

    pub async fn connect_endpoint(&self, endpoint: &Endpoint) -> Result<Arc<OrbClient>> {
        self.ensure_open()?;
        let mut builder = OrbClientBuilder::new()
            .timeout(self.config.client_timeout)
            .max_frame_size(self.config.max_frame_size);
        if let Some(timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Arc::new(builder.connect(endpoint).await?))
    }

    pub fn stats(&self) -> ServerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the server, wait for its connections to finish and drop every
    /// registered object. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Shutting down ORB runtime");

        let (stop, task) = {
            let mut state = self.state.lock();
            state.endpoint = None;
            (state.stop.take(), state.task.take())
        };
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        if let Some(task) = task {
            if let Err(e) = task.await? {
                warn!("ORB server ended with error: {}", e);
            }
        }

        self.objects.clear().await;
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Name of the local host as the OS reports it, falling back to the
/// environment and finally to `localhost`
pub fn local_host_name() -> String {
    os_host_name()
        .into_iter()
        .chain(
            ["HOSTNAME", "COMPUTERNAME"]
                .iter()
                .filter_map(|var| std::env::var(var).ok()),
        )
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
fn os_host_name() -> Option<String> {
    let mut buf = [0u8; 256];
    // gethostname may leave the name unterminated when it fills the buffer
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len() - 1) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..len]).into_owned())
}

#[cfg(not(unix))]
fn os_host_name() -> Option<String> {
    None
}

/// Replace every `%(h)` token in `path` with the local host name
pub fn expand_host_token(path: &str) -> String {
    path.replace("%(h)", &local_host_name())
}
