//! Foundation types for Stratus.
//!
//! Every other Stratus crate depends on `stratus-types` for the identifiers
//! that key the remote blob store and the local caches.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- content-addressed object identifier (32-byte digest)
//! - [`PackId`] -- checksum naming a pack/index pair
//! - [`ObjectType`] -- commit/tree/blob/tag with stable wire codes
//! - [`ObjectHeader`] -- type and length of an object, without its body

pub mod error;
pub mod kind;
pub mod object;

pub use error::TypeError;
pub use kind::{ObjectHeader, ObjectType};
pub use object::{ObjectId, PackId, DIGEST_LEN};
