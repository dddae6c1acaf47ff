//! Keeps local objects published in the directory
//!
//! Servers register the bindings they want visible and the rebinder's
//! background task does the network work: an initial bind, periodic lease
//! renewal, and a full republish whenever the directory's cookie changes
//! (first contact, or the directory restarted and lost its contents).
//! Registration only touches the local table, so it never blocks on the
//! directory being reachable.

use crate::client::{Directory, RemoteDirectory};
use crate::error::{NameError, Result};
use crate::types::{parent_and_name, BindingInfo, RebindInfo, RebindResult, EXTRA_COUNT};
use orb::{expand_host_token, Endpoint, ObjectId, OrbRuntime};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Rebinder timing and failure policy
#[derive(Debug, Clone)]
pub struct RebinderConfig {
    /// Pause between passes of the background loop
    pub interval: Duration,
    /// How long after a successful bind or renewal the lease is renewed again
    pub renewal_period: Duration,
    /// With nothing else to do, how often the directory cookie is checked
    pub ping_interval: Duration,
    /// Failed binds tolerated before an entry is dropped
    pub max_errors: u32,
}

impl Default for RebinderConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2500),
            renewal_period: Duration::from_secs(20),
            ping_interval: Duration::from_secs(15),
            max_errors: 5,
        }
    }
}

struct Entry {
    info: RebindInfo,
    bound: bool,
    next_renewal: Instant,
    errors: u32,
}

impl Entry {
    fn needs_work(&self, now: Instant) -> bool {
        !self.bound || self.next_renewal <= now
    }
}

struct Shared {
    directory: Arc<dyn Directory>,
    config: RebinderConfig,
    entries: Mutex<Vec<Entry>>,
    wake: Notify,
}

struct LoopState {
    cookie: Option<u64>,
    last_contact: Instant,
}

/// Background publisher of bindings
pub struct DirectoryRebinder {
    shared: Arc<Shared>,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DirectoryRebinder {
    pub fn new(directory: Arc<dyn Directory>, config: RebinderConfig) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                directory,
                config,
                entries: Mutex::new(Vec::new()),
                wake: Notify::new(),
            }),
            stop,
            task: Mutex::new(None),
        }
    }

    /// Publish to the directory process at `endpoint`
    pub fn remote(runtime: Arc<OrbRuntime>, endpoint: Endpoint, config: RebinderConfig) -> Self {
        Self::new(Arc::new(RemoteDirectory::new(runtime, endpoint)), config)
    }

    /// Add a binding to keep published. `%(h)` in `path` is replaced with
    /// the local host name; the expanded path is returned.
    pub fn register(
        &self,
        path: &str,
        object_id: ObjectId,
        description: &str,
        extras: [String; EXTRA_COUNT],
    ) -> Result<String> {
        let path = expand_host_token(path);
        parent_and_name(&path)?;

        {
            let mut entries = self.shared.entries.lock();
            if entries.iter().any(|e| e.info.path == path) {
                return Err(NameError::AlreadyExists(path));
            }
            let binding = BindingInfo::new(object_id, description).with_extras(extras);
            entries.push(Entry {
                info: RebindInfo::new(path.clone(), binding),
                bound: false,
                next_renewal: Instant::now(),
                errors: 0,
            });
        }
        debug!("Registered {} for rebinding", path);
        self.shared.wake.notify_one();
        Ok(path)
    }

    /// Stop publishing a binding, and remove it from the directory now if
    /// `unbind_now` is set. Failure to reach the directory is logged only.
    pub async fn deregister(&self, path: &str, unbind_now: bool) -> Result<()> {
        let path = expand_host_token(path);
        let removed = {
            let mut entries = self.shared.entries.lock();
            let pos = entries
                .iter()
                .position(|e| e.info.path == path)
                .ok_or_else(|| NameError::NotFound(path.clone()))?;
            entries.remove(pos)
        };
        debug!("Deregistered {} from rebinding", removed.info.path);

        if unbind_now {
            if let Err(e) = self.shared.directory.remove_binding(&path).await {
                debug!("Unbind of {} failed: {}", path, e);
            }
        }
        Ok(())
    }

    /// Change one extra value of a registered binding. The change reaches
    /// the directory on the next pass.
    pub fn update_extra(&self, path: &str, index: u32, value: &str) -> Result<()> {
        let path = expand_host_token(path);
        {
            let mut entries = self.shared.entries.lock();
            let entry = entries
                .iter_mut()
                .find(|e| e.info.path == path)
                .ok_or_else(|| NameError::NotFound(path.clone()))?;
            entry.info.binding.set_extra(index, value)?;
            entry.bound = false;
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    pub fn paths(&self) -> Vec<String> {
        self.shared
            .entries
            .lock()
            .iter()
            .map(|e| e.info.path.clone())
            .collect()
    }

    /// Whether `path` is registered and, if so, whether its last bind
    /// succeeded
    pub fn is_bound(&self, path: &str) -> Option<bool> {
        let path = expand_host_token(path);
        self.shared
            .entries
            .lock()
            .iter()
            .find(|e| e.info.path == path)
            .map(|e| e.bound)
    }

    /// Start the background task; does nothing if it is already running
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        self.stop.send_replace(false);
        let shared = Arc::clone(&self.shared);
        let stop = self.stop.subscribe();
        *task = Some(tokio::spawn(run(shared, stop)));
        info!("Rebinder started");
    }

    /// Stop the background task, then remove every binding from the
    /// directory
    pub async fn shutdown(&self) {
        let _ = self.stop.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Rebinder task ended abnormally: {}", e);
            }
        }

        let entries = std::mem::take(&mut *self.shared.entries.lock());
        for entry in &entries {
            match self.shared.directory.remove_binding(&entry.info.path).await {
                Ok(()) => debug!("Unbound {}", entry.info.path),
                Err(e) if e.is_unavailable() => {
                    warn!("Name server unavailable during rebinder shutdown: {}", e);
                    break;
                }
                Err(e) => warn!("Could not unbind {}: {}", entry.info.path, e),
            }
        }
        info!("Rebinder stopped");
    }
}

impl Drop for DirectoryRebinder {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

async fn run(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let mut state = LoopState {
        cookie: None,
        last_contact: Instant::now(),
    };

    loop {
        if let Err(e) = shared.cycle(&mut state).await {
            debug!("Name server not available, will retry: {}", e);
            state.cookie = None;
            state.last_contact = Instant::now();
        }

        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = shared.wake.notified() => {}
            _ = tokio::time::sleep(shared.config.interval) => {}
        }
    }
}

impl Shared {
    async fn cycle(&self, state: &mut LoopState) -> Result<()> {
        let now = Instant::now();

        if let Some(cookie) = state.cookie {
            if now.duration_since(state.last_contact) >= self.config.ping_interval {
                state.last_contact = now;
                let current = self.directory.query_cookie().await?;
                if current != cookie {
                    info!("Name server cookie changed, republishing");
                    state.cookie = None;
                }
            }
        }

        let Some(cookie) = state.cookie else {
            return self.bind_all(state).await;
        };

        if !self.needs_work(now) {
            return Ok(());
        }
        state.last_contact = now;
        if !self.renew_pass(cookie, now).await? || !self.bind_pass(cookie).await? {
            debug!("Name server cookie out of date");
            state.cookie = None;
        }
        Ok(())
    }

    fn needs_work(&self, now: Instant) -> bool {
        self.entries.lock().iter().any(|e| e.needs_work(now))
    }

    fn snapshot(&self, filter: impl Fn(&Entry) -> bool) -> Vec<RebindInfo> {
        self.entries
            .lock()
            .iter()
            .filter(|e| filter(e))
            .map(|e| e.info.clone())
            .collect()
    }

    async fn bind_all(&self, state: &mut LoopState) -> Result<()> {
        let batch = self.snapshot(|_| true);
        if batch.is_empty() {
            return Ok(());
        }

        let cookie = self.directory.query_cookie().await?;
        state.last_contact = Instant::now();
        let (current, results) = self.directory.rebind_all(&batch, cookie).await?;
        match results {
            Some(results) => {
                self.apply_bind_results(&batch, &results);
                state.cookie = Some(current);
                debug!("Published {} bindings", batch.len());
            }
            None => debug!("Name server cookie changed during full rebind"),
        }
        Ok(())
    }

    /// False if the directory's cookie no longer matches
    async fn renew_pass(&self, cookie: u64, now: Instant) -> Result<bool> {
        let paths: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|e| e.bound && e.next_renewal <= now)
            .map(|e| e.info.path.clone())
            .collect();
        if paths.is_empty() {
            return Ok(true);
        }

        let (_, results) = self.directory.renew_leases(&paths, cookie).await?;
        let Some(results) = results else {
            return Ok(false);
        };

        let next = Instant::now() + self.config.renewal_period;
        let mut entries = self.entries.lock();
        for (path, renewed) in paths.iter().zip(results) {
            if let Some(entry) = entries.iter_mut().find(|e| &e.info.path == path) {
                if renewed {
                    entry.next_renewal = next;
                } else {
                    debug!("Lease renewal refused for {}", path);
                    entry.bound = false;
                }
            }
        }
        Ok(true)
    }

    /// False if the directory's cookie no longer matches
    async fn bind_pass(&self, cookie: u64) -> Result<bool> {
        let batch = self.snapshot(|e| !e.bound);
        if batch.is_empty() {
            return Ok(true);
        }

        let (_, results) = self.directory.rebind_all(&batch, cookie).await?;
        match results {
            Some(results) => {
                self.apply_bind_results(&batch, &results);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn apply_bind_results(&self, batch: &[RebindInfo], results: &[RebindResult]) {
        if batch.len() != results.len() {
            warn!(
                "Name server returned {} results for {} bindings",
                results.len(),
                batch.len()
            );
        }

        let next = Instant::now() + self.config.renewal_period;
        let mut entries = self.entries.lock();
        for (sent, result) in batch.iter().zip(results) {
            // The entry may have been deregistered while the call was out
            let Some(pos) = entries.iter().position(|e| e.info.path == sent.path) else {
                continue;
            };
            let entry = &mut entries[pos];
            match result {
                RebindResult::Success => {
                    // An update made while the call was out is sent next pass
                    entry.bound = entry.info == *sent;
                    entry.errors = 0;
                    entry.next_renewal = next;
                }
                RebindResult::Exception => {
                    entry.errors += 1;
                    entry.bound = false;
                    if entry.errors > self.config.max_errors {
                        warn!(
                            "Dropping {} from rebinder after {} failed binds",
                            sent.path, entry.errors
                        );
                        entries.remove(pos);
                    }
                }
                RebindResult::NotATerminal => {
                    warn!("Dropping {} from rebinder: a scope exists at that path", sent.path);
                    entries.remove(pos);
                }
            }
        }
    }
}
