//! Remote object database backend for Stratus.
//!
//! Objects and packs live as blobs in a remote store, keyed by id under a
//! configured bucket and prefix. This crate lets a host engine treat that
//! store as its object database: reads are served from a local cache when
//! possible, header reads fetch only the 16-byte blob header, and pushed
//! pack streams are indexed, cached and uploaded as pack/index pairs.
//!
//! # Architecture
//!
//! - [`LocationCache`] -- what is known about each object, only ever refined
//! - [`Oracle`] -- optional host-side metadata service that can answer lookups
//!   and intercept blob traffic
//! - [`TransferClient`] -- keyed blob I/O with retry over a [`BlobStore`]
//! - [`DiskCache`] -- scratch directory holding loose objects and packs
//! - [`PackMaterializer`] -- moves packs between remote, disk and cache
//! - [`Backend`] -- the async read/write/exists/write-pack surface
//! - [`BlockingBackend`] -- the synchronous [`OdbBackend`] contract with
//!   integer status codes, and [`BackendRegistry`] for handle-based access
//!
//! # Rules
//!
//! 1. A cached location is never downgraded to a less informed one.
//! 2. Every remote blob starts with a 16-byte header carrying length and kind.
//! 3. The oracle is consulted before the remote store, never after.
//! 4. Enumeration and prefix lookup are passed back to the host.

pub mod backend;
pub mod config;
pub mod context;
pub mod disk_cache;
pub mod error;
pub mod header;
pub mod location;
pub mod materializer;
pub mod odb;
pub mod oracle;
pub mod registry;
pub mod remote;
pub mod retry;
pub mod transfer;
pub mod writepack;

// Re-export primary types at crate root for ergonomic imports.
pub use backend::{Backend, ObjectData};
pub use config::{BackendConfig, RemoteConfig};
pub use context::BackendContext;
pub use disk_cache::DiskCache;
pub use error::{BackendError, BackendResult};
pub use header::{BlobHeader, BLOB_HEADER_LEN, INDEX_KIND, PACK_KIND, REFS_KIND};
pub use location::{CachedPack, LocationCache, ObjectLocation};
pub use materializer::PackMaterializer;
pub use odb::{last_error, status, BlockingBackend, OdbBackend, OdbWritePack};
pub use oracle::{InMemoryOracle, Intercept, NoopOracle, Oracle, OracleLocation};
pub use registry::{BackendHandle, BackendRegistry, WritePackHandle};
pub use remote::{BlobError, BlobStore, ByteRange, FsBlobStore, HttpBlobStore, InMemoryBlobStore};
pub use retry::RetryPolicy;
pub use transfer::TransferClient;
pub use writepack::PackWriteSession;
