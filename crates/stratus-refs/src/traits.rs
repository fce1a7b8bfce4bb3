//! The [`RefStore`] trait defining the reference storage interface.

use stratus_types::ObjectId;

use crate::error::{RefError, Result};
use crate::types::Ref;

/// Maximum number of symbolic hops followed by [`RefStore::resolve`].
pub const MAX_SYMBOLIC_DEPTH: usize = 5;

/// Storage backend for named references.
///
/// Implementations must be thread-safe (`Send + Sync`) and provide atomic
/// read/write/delete operations on individual refs.
pub trait RefStore: Send + Sync {
    /// Read a ref by its full name. Returns `Ok(None)` if it does not exist.
    fn read_ref(&self, name: &str) -> Result<Option<Ref>>;

    /// Create or replace a ref. The name is taken from the ref itself.
    fn write_ref(&self, reference: &Ref) -> Result<()>;

    /// Delete a ref. Returns `Ok(true)` if it existed.
    fn delete_ref(&self, name: &str) -> Result<bool>;

    /// List all refs whose name starts with `prefix`, sorted by name.
    ///
    /// Pass `""` to list every ref including `HEAD`.
    fn list_refs(&self, prefix: &str) -> Result<Vec<Ref>>;

    /// Follow symbolic refs from `name` down to an object id.
    fn resolve(&self, name: &str) -> Result<ObjectId> {
        let mut current = name.to_string();
        for _ in 0..=MAX_SYMBOLIC_DEPTH {
            match self.read_ref(&current)? {
                Some(Ref::Direct { target, .. }) => return Ok(target),
                Some(Ref::Symbolic { target, .. }) => current = target,
                None => return Err(RefError::NotFound { name: current }),
            }
        }
        Err(RefError::SymbolicLoop { name: current })
    }
}
