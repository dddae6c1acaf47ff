//! Broker server
//!
//! - Each connection handled in a separate Tokio task
//! - Semaphore-based connection limiting
//! - Server statistics tracking
//! - Shutdown signal reaches every connection task
//!
//! The server adds no locking around server objects: an object that needs
//! serialized access must provide it itself.

use crate::command::{Frame, Reply, Request};
use crate::error::{orb_code, OrbError, RemoteError, Result, ORB_FACILITY};
use crate::identity::{ObjectKey, OBJECT_TABLE_MODULUS};
use crate::interface::ServerObject;
use crate::transport::{OrbTransport, DEFAULT_MAX_FRAME_SIZE};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock, Semaphore};
use tracing::{debug, info, warn};

/// Table of registered server objects, bucketed by the keys' cached hash
pub struct ObjectTable {
    buckets: RwLock<Vec<Vec<Arc<ServerObject>>>>,
    count: AtomicU64,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(vec![Vec::new(); OBJECT_TABLE_MODULUS as usize]),
            count: AtomicU64::new(0),
        }
    }

    fn bucket_of(key: &ObjectKey) -> usize {
        debug_assert_eq!(key.cached_hash(), key.calc_hash(OBJECT_TABLE_MODULUS));
        key.cached_hash() as usize
    }

    /// Add an object; fails if its key is already registered
    pub async fn insert(&self, object: Arc<ServerObject>) -> Result<()> {
        let index = Self::bucket_of(object.key());
        let mut buckets = self.buckets.write().await;
        let bucket = &mut buckets[index];
        if bucket.iter().any(|o| o.key() == object.key()) {
            return Err(OrbError::AlreadyExists(object.key().to_string()));
        }
        bucket.push(object);
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn remove(&self, key: &ObjectKey) -> Option<Arc<ServerObject>> {
        let index = Self::bucket_of(key);
        let mut buckets = self.buckets.write().await;
        let bucket = &mut buckets[index];
        let pos = bucket.iter().position(|o| o.key() == key)?;
        self.count.fetch_sub(1, Ordering::Relaxed);
        Some(bucket.swap_remove(pos))
    }

    pub async fn find(&self, key: &ObjectKey) -> Option<Arc<ServerObject>> {
        let buckets = self.buckets.read().await;
        buckets[Self::bucket_of(key)]
            .iter()
            .find(|o| o.key() == key)
            .cloned()
    }

    pub async fn clear(&self) {
        let mut buckets = self.buckets.write().await;
        for bucket in buckets.iter_mut() {
            bucket.clear();
        }
        self.count.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_frame_size: usize,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_connections: 1024,
        }
    }
}

/// Server statistics
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_accepted: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub requests_received: AtomicU64,
    pub requests_processed: AtomicU64,
    pub requests_failed: AtomicU64,
    pub keepalives: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl ServerStats {
    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            keepalives: self.keepalives.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of server statistics
#[derive(Debug, Clone)]
pub struct ServerStatsSnapshot {
    pub connections_accepted: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub requests_received: u64,
    pub requests_processed: u64,
    pub requests_failed: u64,
    pub keepalives: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Broker server
pub struct OrbServer {
    objects: Arc<ObjectTable>,
    config: ServerConfig,
    stats: Arc<ServerStats>,
}

impl OrbServer {
    pub fn new(objects: Arc<ObjectTable>) -> Self {
        Self::with_config(objects, ServerConfig::default())
    }

    pub fn with_config(objects: Arc<ObjectTable>, config: ServerConfig) -> Self {
        Self {
            objects,
            config,
            stats: Arc::new(ServerStats::default()),
        }
    }

    /// Share an existing statistics block
    pub fn with_stats(mut self, stats: Arc<ServerStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    pub fn objects(&self) -> &Arc<ObjectTable> {
        &self.objects
    }

    /// Run the server on the given address until the process ends
    pub async fn run(&self, addr: SocketAddr) -> Result<()> {
        self.run_until(addr, std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F: Future<Output = ()>>(
        &self,
        addr: SocketAddr,
        shutdown: F,
    ) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve an already bound listener until `shutdown` completes.
    ///
    /// On shutdown every connection task is told to stop and the call returns
    /// once all of them have finished.
    pub async fn serve_until<F: Future<Output = ()>>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<()> {
        let max_connections = self.config.max_connections;
        let permits = u32::try_from(max_connections)
            .ok()
            .filter(|_| max_connections <= Semaphore::MAX_PERMITS)
            .ok_or_else(|| {
                OrbError::Format(format!("max_connections {} is too large", max_connections))
            })?;

        info!(
            "ORB server listening on {} (max_connections: {})",
            listener.local_addr()?,
            max_connections
        );

        let semaphore = Arc::new(Semaphore::new(max_connections));
        let (stop_tx, stop_rx) = watch::channel(false);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("ORB server shutting down");
                    let _ = stop_tx.send(true);
                    let _ = semaphore.acquire_many(permits).await;
                    info!("All connections closed");
                    return Ok(());
                }

                result = listener.accept() => {
                    let (stream, peer_addr) = result?;

                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                            warn!("Connection limit reached, rejecting connection from {}", peer_addr);
                            drop(stream);
                            continue;
                        }
                    };

                    self.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                    self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                    debug!("Accepted connection from {}", peer_addr);

                    let objects = Arc::clone(&self.objects);
                    let max_frame_size = self.config.max_frame_size;
                    let stats = Arc::clone(&self.stats);
                    let stop_rx = stop_rx.clone();

                    tokio::spawn(async move {
                        let _permit = permit;

                        let result =
                            handle_connection(stream, objects, max_frame_size, &stats, stop_rx).await;

                        stats.connections_active.fetch_sub(1, Ordering::Relaxed);

                        match result {
                            Ok(()) => debug!("Connection closed normally from {}", peer_addr),
                            Err(OrbError::ConnectionClosed) => {
                                debug!("Connection closed from {}", peer_addr);
                            }
                            Err(e) => {
                                warn!("Connection error from {}: {}", peer_addr, e);
                            }
                        }
                    });
                }
            }
        }
    }
}

/// Handle a single connection
async fn handle_connection(
    stream: TcpStream,
    objects: Arc<ObjectTable>,
    max_frame_size: usize,
    stats: &Arc<ServerStats>,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let mut read_transport = OrbTransport::new(reader).with_max_frame_size(max_frame_size);
    let mut write_transport = OrbTransport::new(writer);

    loop {
        let frame = tokio::select! {
            frame = read_transport.read_frame() => frame?,
            _ = stop.changed() => return Ok(()),
        };

        if frame.is_keepalive() {
            stats.keepalives.fetch_add(1, Ordering::Relaxed);
            write_transport.write_frame(&Frame::keepalive()).await?;
            continue;
        }

        stats.requests_received.fetch_add(1, Ordering::Relaxed);
        stats
            .bytes_received
            .fetch_add(frame.payload.len() as u64, Ordering::Relaxed);

        let reply = match Request::from_frame(&frame) {
            Ok(request) => {
                debug!(
                    "Received request: seq={}, method={}, target={}",
                    request.sequence(),
                    request.method(),
                    request.target()
                );
                process_request(&request, &objects, stats).await?
            }
            Err(e) => {
                warn!("Undecodable request seq={}: {}", frame.header.sequence, e);
                stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                Reply::failure(frame.header.sequence, &e.to_remote())?
            }
        };

        let out = reply.to_frame()?;
        stats
            .bytes_sent
            .fetch_add(out.payload.len() as u64, Ordering::Relaxed);
        write_transport.write_frame(&out).await?;
    }
}

async fn process_request(
    request: &Request,
    objects: &ObjectTable,
    stats: &Arc<ServerStats>,
) -> Result<Reply> {
    let sequence = request.sequence();

    // Lookup releases the table lock before the handler runs
    let object = match objects.find(request.target()).await {
        Some(object) => object,
        None => {
            stats.requests_failed.fetch_add(1, Ordering::Relaxed);
            let err = RemoteError::new(
                ORB_FACILITY,
                orb_code::OBJECT_NOT_FOUND,
                format!("no object registered for {}", request.target()),
            );
            return Reply::failure(sequence, &err);
        }
    };

    match object
        .dispatch(request.method(), request.payload().clone())
        .await
    {
        Ok(out) => {
            stats.requests_processed.fetch_add(1, Ordering::Relaxed);
            Ok(Reply::success(sequence, out.into_bytes()))
        }
        Err(e) => {
            debug!("{} on {} failed: {}", request.method(), request.target(), e);
            stats.requests_failed.fetch_add(1, Ordering::Relaxed);
            Reply::failure(sequence, &e.to_remote())
        }
    }
}
