//! Directory service
//!
//! A tree of scopes and bindings mapping `/`-delimited paths to broker
//! object ids. Bindings are leased: the owner must renew them or the
//! landlord removes them. Each server instance carries a cookie so clients
//! can tell when the directory restarted and lost its contents.
//!
//! The [`DirectoryRebinder`] runs inside serving processes and keeps their
//! bindings alive across directory restarts.

pub mod client;
pub mod error;
pub mod rebinder;
pub mod server;
pub mod tree;
pub mod types;

pub use client::{name_server_object_id, Directory, NameServerClient, RemoteDirectory};
pub use error::{name_code, NameError, Result, NAMESERV_FACILITY};
pub use rebinder::{DirectoryRebinder, RebinderConfig};
pub use server::{
    create_name_server_interface, NameServer, NameServerConfig, NameServerMethod,
    DEFAULT_NAME_SERVER_PORT, NAME_SERVER_INSTANCE_ID, NAME_SERVER_INTERFACE_ID,
    NAME_SERVER_PROXY_TYPE,
};
pub use tree::NameTree;
pub use types::{BindingEntry, BindingInfo, RebindInfo, RebindResult, EXTRA_COUNT};
