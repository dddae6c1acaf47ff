//! Broker client connection
//!
//! One `OrbClient` owns one TCP connection. Calls on it are serialized: a
//! call holds the read side of the connection from the moment it sends its
//! request until the matching reply arrives or its deadline passes.

use crate::command::{Frame, Reply, Request};
use crate::error::{OrbError, Result};
use crate::identity::{Endpoint, ObjectKey};
use crate::transport::{OrbTransport, DEFAULT_MAX_FRAME_SIZE};
use binstream::{BinInStream, BinOutStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Default per-call deadline
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Client connection to a broker server
pub struct OrbClient {
    read_transport: Mutex<OrbTransport<OwnedReadHalf>>,
    write_transport: Mutex<OrbTransport<OwnedWriteHalf>>,
    sequence_counter: AtomicU32,
    timeout: Duration,
    peer: Endpoint,
}

impl OrbClient {
    /// Connect with default settings
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        OrbClientBuilder::new().connect(endpoint).await
    }

    fn from_stream(
        stream: TcpStream,
        peer: Endpoint,
        timeout: Duration,
        max_frame_size: usize,
    ) -> Self {
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        Self {
            read_transport: Mutex::new(
                OrbTransport::new(reader).with_max_frame_size(max_frame_size),
            ),
            write_transport: Mutex::new(OrbTransport::new(writer)),
            sequence_counter: AtomicU32::new(1),
            timeout,
            peer,
        }
    }

    pub fn peer(&self) -> &Endpoint {
        &self.peer
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Make a call with the connection's default deadline
    pub async fn invoke(
        &self,
        target: &ObjectKey,
        method: &str,
        args: BinOutStream,
    ) -> Result<BinInStream> {
        self.invoke_with_timeout(target, method, args, self.timeout)
            .await
    }

    /// Make a call, waiting at most `timeout` for the reply.
    ///
    /// Returns the output stream, or `OrbError::Remote` carrying the server's
    /// facility, code and message when the call failed there.
    pub async fn invoke_with_timeout(
        &self,
        target: &ObjectKey,
        method: &str,
        args: BinOutStream,
        timeout: Duration,
    ) -> Result<BinInStream> {
        let mut read = self.read_transport.lock().await;

        let sequence = self.sequence_counter.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(*target, sequence, method, args.into_bytes());

        debug!(
            "Sending request: seq={}, method={}, target={}",
            sequence, method, target
        );

        {
            let mut write = self.write_transport.lock().await;
            write.write_frame(&request.to_frame()?).await?;
        }

        let reply = tokio::time::timeout(timeout, async {
            loop {
                let frame = read.read_frame().await?;
                if frame.is_keepalive() {
                    trace!("Skipping keepalive frame");
                    continue;
                }

                let reply = Reply::from_frame(&frame)?;
                if reply.sequence() < sequence {
                    // Answer to a call that already timed out
                    debug!("Discarding stale reply seq={}", reply.sequence());
                    continue;
                }
                if reply.sequence() != sequence {
                    return Err(OrbError::SequenceMismatch {
                        expected: sequence,
                        got: reply.sequence(),
                    });
                }
                return Ok(reply);
            }
        })
        .await
        .map_err(|_| {
            debug!("Call {} seq={} timed out after {:?}", method, sequence, timeout);
            OrbError::Timeout
        })??;

        trace!(
            "Reply seq={} success={} ({} bytes)",
            sequence,
            reply.is_success(),
            reply.payload().len()
        );
        reply.into_result()
    }

    /// Send a keepalive and wait for the server to answer it
    pub async fn ping(&self) -> Result<Duration> {
        let mut read = self.read_transport.lock().await;
        let start = Instant::now();

        {
            let mut write = self.write_transport.lock().await;
            write.write_frame(&Frame::keepalive()).await?;
        }

        tokio::time::timeout(self.timeout, async {
            loop {
                let frame = read.read_frame().await?;
                if frame.is_keepalive() {
                    return Ok::<(), OrbError>(());
                }
                debug!("Discarding stale reply seq={}", frame.header.sequence);
            }
        })
        .await
        .map_err(|_| OrbError::Timeout)??;

        Ok(start.elapsed())
    }
}

/// Builder for broker clients
#[derive(Debug, Clone)]
pub struct OrbClientBuilder {
    timeout: Duration,
    connect_timeout: Option<Duration>,
    max_frame_size: usize,
}

impl OrbClientBuilder {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the per-call deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set maximum frame payload size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub async fn connect(self, endpoint: &Endpoint) -> Result<OrbClient> {
        let target = (endpoint.host.as_str(), endpoint.port);
        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(target))
                .await
                .map_err(|_| OrbError::Timeout)??,
            None => TcpStream::connect(target).await?,
        };
        debug!("Connected to {}", endpoint);

        Ok(OrbClient::from_stream(
            stream,
            endpoint.clone(),
            self.timeout,
            self.max_frame_size,
        ))
    }
}

impl Default for OrbClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
