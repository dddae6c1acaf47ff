//! Client proxy base
//!
//! Typed proxies for each interface wrap a `ClientProxy`: they write the
//! method's inputs in signature order, call, and read the outputs in the
//! order the server handler writes them.

use crate::client::OrbClient;
use crate::error::{OrbError, Result};
use crate::identity::{InterfaceId, ObjectId};
use crate::interface::MethodId;
use binstream::{BinInStream, BinOutStream};
use std::sync::Arc;
use std::time::Duration;

/// Caller-side handle on one server object.
///
/// Calls through one proxy are serialized by its connection; use separate
/// proxies for concurrent calls.
pub struct ClientProxy {
    object_id: ObjectId,
    client: Arc<OrbClient>,
    timeout: Option<Duration>,
}

impl ClientProxy {
    /// Wrap a connection, checking that `object_id` implements `expected`
    pub fn new(object_id: ObjectId, expected: &InterfaceId, client: Arc<OrbClient>) -> Result<Self> {
        if !object_id.key().is_interface(expected) {
            return Err(OrbError::WrongInterface {
                expected: expected.to_string(),
                got: object_id.key().interface().to_string(),
            });
        }
        Ok(Self {
            object_id,
            client,
            timeout: None,
        })
    }

    /// Override the connection's default call deadline for this proxy
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn client(&self) -> &Arc<OrbClient> {
        &self.client
    }

    /// Invoke `method` with the given inputs
    pub async fn call<M: MethodId>(&self, method: M, args: BinOutStream) -> Result<BinInStream> {
        let key = self.object_id.key();
        match self.timeout {
            Some(timeout) => {
                self.client
                    .invoke_with_timeout(key, method.name(), args, timeout)
                    .await
            }
            None => self.client.invoke(key, method.name(), args).await,
        }
    }

    /// Invoke a method that has no inputs
    pub async fn call_no_args<M: MethodId>(&self, method: M) -> Result<BinInStream> {
        self.call(method, BinOutStream::new()).await
    }

    /// Round-trip a keepalive to the serving process
    pub async fn ping(&self) -> Result<Duration> {
        self.client.ping().await
    }
}
