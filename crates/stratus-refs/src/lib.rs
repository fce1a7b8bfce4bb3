//! References for Stratus.
//!
//! Refs are named pointers to objects (`refs/heads/main`) or to other refs
//! (`HEAD`). The backend mirrors them to the blob store as a single JSON
//! document, see [`RefSnapshot`].

pub mod error;
pub mod memory;
pub mod names;
pub mod snapshot;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use memory::InMemoryRefStore;
pub use names::validate_ref_name;
pub use snapshot::RefSnapshot;
pub use traits::{RefStore, MAX_SYMBOLIC_DEPTH};
pub use types::Ref;
