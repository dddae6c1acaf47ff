//! Object request broker
//!
//! Server objects are registered with an [`OrbRuntime`] under an
//! [`ObjectKey`] and reached by clients through the [`ObjectId`] handed out at
//! registration. Calls travel as framed [`Request`]/[`Reply`] pairs matched by
//! sequence number.
//!
//! # Example
//!
//! ```no_run
//! use orb::{OrbConfig, OrbRuntime};
//!
//! # async fn example() -> orb::Result<()> {
//! let runtime = OrbRuntime::init(OrbConfig::default());
//! let endpoint = runtime.start_server("127.0.0.1:0".parse().unwrap()).await?;
//! println!("serving on {}", endpoint);
//! runtime.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod command;
pub mod error;
pub mod identity;
pub mod interface;
pub mod proxy;
pub mod runtime;
pub mod server;
pub mod transport;

pub use client::{OrbClient, OrbClientBuilder, DEFAULT_CALL_TIMEOUT};
pub use command::{Frame, FrameHeader, FrameKind, Reply, Request};
pub use error::{orb_code, OrbError, RemoteError, Result, ORB_FACILITY};
pub use identity::{Endpoint, InstanceId, InterfaceId, ObjectId, ObjectKey, OBJECT_TABLE_MODULUS};
pub use interface::{Interface, InterfaceBuilder, MethodId, OperationHandler, ServerObject};
pub use proxy::ClientProxy;
pub use runtime::{expand_host_token, local_host_name, OrbConfig, OrbRuntime};
pub use server::{ObjectTable, OrbServer, ServerConfig, ServerStats, ServerStatsSnapshot};
pub use transport::{OrbTransport, DEFAULT_MAX_FRAME_SIZE};

pub use binstream::{BinInStream, BinOutStream};
