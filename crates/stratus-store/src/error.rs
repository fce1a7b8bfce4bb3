use std::os::raw::c_int;

use stratus_pack::PackError;
use stratus_refs::RefError;
use stratus_types::{ObjectId, PackId};

use crate::odb::status;
use crate::remote::BlobError;

/// Errors surfaced by the backend to its callers.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The object is not present in the cache, the oracle or the remote store.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// A remote blob the backend expected to exist is missing.
    #[error("blob not found: {key}")]
    BlobNotFound { key: String },

    /// A pack the backend expected to exist is missing remotely.
    #[error("pack not found: {0}")]
    PackNotFound(PackId),

    /// A remote call failed after the retry policy gave up, or failed permanently.
    #[error("transfer of {key} failed: {source}")]
    Transfer {
        key: String,
        #[source]
        source: BlobError,
    },

    /// A stored blob does not carry a well-formed header or body.
    #[error("corrupt blob {key}: {reason}")]
    CorruptBlob { key: String, reason: String },

    /// A pack or its index is damaged or does not match its name.
    #[error("corrupt pack: {0}")]
    CorruptPack(#[from] PackError),

    /// Bad bucket, credentials, or configuration file.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The operation is not implemented; the host should use its own fallback.
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    /// A write-pack session was committed with a partial pack still buffered.
    #[error("incomplete pack: {buffered} bytes buffered without a complete pack")]
    IncompletePack { buffered: usize },

    /// The oracle refused a coordination lock.
    #[error("lock unavailable: {0}")]
    LockUnavailable(String),

    #[error("ref error: {0}")]
    Refs(#[from] RefError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Map this error onto the host engine's status codes.
    pub fn status(&self) -> c_int {
        match self {
            Self::ObjectNotFound(_) | Self::BlobNotFound { .. } | Self::PackNotFound(_) => {
                status::NOT_FOUND
            }
            Self::Unsupported(_) => status::PASSTHROUGH,
            _ => status::ERROR,
        }
    }

    /// Whether this error means "absent" rather than "broken".
    pub fn is_not_found(&self) -> bool {
        self.status() == status::NOT_FOUND
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let id = ObjectId::from_hash([1; 32]);
        assert_eq!(BackendError::ObjectNotFound(id).status(), status::NOT_FOUND);
        assert_eq!(
            BackendError::BlobNotFound { key: "k".into() }.status(),
            status::NOT_FOUND
        );
        assert_eq!(BackendError::Unsupported("foreach").status(), status::PASSTHROUGH);
        assert_eq!(BackendError::Configuration("x".into()).status(), status::ERROR);
        assert_eq!(
            BackendError::Transfer {
                key: "k".into(),
                source: BlobError::Transient("503".into()),
            }
            .status(),
            status::ERROR
        );
        assert!(BackendError::PackNotFound(PackId::null()).is_not_found());
        assert!(!BackendError::IncompletePack { buffered: 3 }.is_not_found());
    }
}
