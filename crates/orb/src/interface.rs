//! Interfaces and dispatch chains
//!
//! Each interface declares its methods once with [`orb_methods!`], which
//! produces an enum mapping variants to wire names. The same enum keys the
//! interface's handler table on the server and names the methods a client
//! proxy calls.
//!
//! A [`ServerObject`] holds an ordered chain of interfaces, most derived
//! first. A call is handled by the first interface in the chain that defines
//! the method; if none does, the call fails with `UnknownMethod`.

use crate::error::{OrbError, Result};
use crate::identity::{InstanceId, InterfaceId, ObjectKey};
use binstream::{BinInStream, BinOutStream};
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{trace, warn};

/// A method of an interface
pub trait MethodId: Copy + Send + Sync + 'static {
    /// Name sent on the wire
    fn name(&self) -> &'static str;

    /// Every method of the interface, in declaration order
    fn all() -> &'static [Self];

    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|m| m.name() == name)
    }
}

/// Declare the method enum of an interface.
///
/// ```
/// orb::orb_methods! {
///     pub enum EchoMethod {
///         Echo => "Echo",
///         Reverse => "Reverse",
///     }
/// }
/// use orb::MethodId;
/// assert_eq!(EchoMethod::from_name("Reverse"), Some(EchoMethod::Reverse));
/// ```
#[macro_export]
macro_rules! orb_methods {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::MethodId for $name {
            fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }

            fn all() -> &'static [Self] {
                &[$(Self::$variant),+]
            }
        }
    };
}

/// Operation handler function type
pub type OperationHandler = Arc<
    dyn Fn(BinInStream) -> Pin<Box<dyn Future<Output = Result<BinOutStream>> + Send>>
        + Send
        + Sync,
>;

/// Handler table for one interface
pub struct Interface {
    id: InterfaceId,
    name: &'static str,
    operations: HashMap<&'static str, OperationHandler>,
}

impl Interface {
    pub fn id(&self) -> &InterfaceId {
        &self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get an operation handler
    pub fn get_operation(&self, method: &str) -> Option<&OperationHandler> {
        self.operations.get(method)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("operations", &self.operations.len())
            .finish()
    }
}

/// Builder for interfaces with a fluent API
pub struct InterfaceBuilder<M: MethodId> {
    interface: Interface,
    _methods: PhantomData<M>,
}

impl<M: MethodId> InterfaceBuilder<M> {
    pub fn new(id: InterfaceId, name: &'static str) -> Self {
        Self {
            interface: Interface {
                id,
                name,
                operations: HashMap::new(),
            },
            _methods: PhantomData,
        }
    }

    pub fn operation<F, Fut>(mut self, method: M, handler: F) -> Self
    where
        F: Fn(BinInStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BinOutStream>> + Send + 'static,
    {
        self.interface
            .operations
            .insert(method.name(), Arc::new(move |args| Box::pin(handler(args))));
        self
    }

    pub fn build(self) -> Interface {
        for method in M::all() {
            if !self.interface.operations.contains_key(method.name()) {
                warn!(
                    "Interface {} has no handler for {}",
                    self.interface.name,
                    method.name()
                );
            }
        }
        self.interface
    }
}

/// A registered server object: its key and its handler chain
pub struct ServerObject {
    key: ObjectKey,
    chain: Vec<Interface>,
}

impl ServerObject {
    /// Build from a chain ordered most derived first. The object's key uses
    /// the first interface's id.
    pub fn new(instance: InstanceId, chain: Vec<Interface>) -> Result<Self> {
        let first = chain
            .first()
            .ok_or_else(|| OrbError::Format("empty interface chain".into()))?;
        Ok(Self {
            key: ObjectKey::new(*first.id(), instance),
            chain,
        })
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn chain(&self) -> &[Interface] {
        &self.chain
    }

    /// Find the handler for `method`, walking the chain in order
    pub fn resolve(&self, method: &str) -> Option<(&Interface, OperationHandler)> {
        self.chain
            .iter()
            .find_map(|iface| iface.get_operation(method).map(|h| (iface, Arc::clone(h))))
    }

    /// Decode, invoke and encode one call
    pub async fn dispatch(&self, method: &str, payload: Bytes) -> Result<BinOutStream> {
        let (iface, handler) = self
            .resolve(method)
            .ok_or_else(|| OrbError::UnknownMethod(method.to_string()))?;
        trace!("Dispatching {}::{} on {}", iface.name(), method, self.key);

        let args = BinInStream::new(payload)?;
        handler(args).await
    }
}

impl std::fmt::Debug for ServerObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerObject")
            .field("key", &self.key)
            .field("chain", &self.chain)
            .finish()
    }
}
