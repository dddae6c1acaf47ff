//! Versioned hierarchical object store
//!
//! Binary objects are stored under `/`-delimited keys, each with a version
//! that starts at 1 and grows by one on every write. Readers that pass the
//! version they already hold get [`ReadResult::NoNewData`] instead of a copy.
//!
//! The store is kept in memory and persisted as a single repository file that
//! is rewritten atomically on flush. [`create_cfg_store_interface`] serves it
//! through the broker as the configuration service.

pub mod client;
pub mod error;
pub mod key;
pub mod repo;
pub mod service;
pub mod store;

pub use client::CfgStoreClient;
pub use error::{store_code, Result, StoreError, OBJSTORE_FACILITY};
pub use service::{
    create_cfg_store_interface, publish_store, CfgStoreMethod, CFG_STORE_INTERFACE_ID,
    CFG_STORE_PROXY_TYPE,
};
pub use store::{ReadResult, StoreFlags, VersionedObjectStore, INITIAL_VERSION};
