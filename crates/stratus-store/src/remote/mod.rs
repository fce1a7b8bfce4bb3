//! Remote blob stores.
//!
//! The backend talks to its store of record through [`BlobStore`], a minimal
//! head/get/put surface keyed by bucket and key. Three implementations ship:
//!
//! - [`InMemoryBlobStore`] -- map-backed, with call counters and fault injection for tests
//! - [`FsBlobStore`] -- one directory per bucket on a local or mounted filesystem
//! - [`HttpBlobStore`] -- an S3-style HTTP endpoint reached with `reqwest`

mod fs;
mod http;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

pub use fs::FsBlobStore;
pub use http::HttpBlobStore;
pub use memory::InMemoryBlobStore;

/// Failures reported by a blob store.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BlobError {
    #[error("no blob {key} in bucket {bucket}")]
    NotFound { bucket: String, key: String },

    /// Network trouble, throttling or a server-side error. Worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Credentials or bucket are wrong; retrying cannot help.
    #[error("store misconfigured: {0}")]
    Configuration(String),
}

impl BlobError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A byte range within a blob: `len` bytes starting at `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn new(offset: u64, len: u64) -> Self {
        Self { offset, len }
    }

    /// Value for an HTTP `Range` header. Both bounds are inclusive.
    pub fn to_header_value(&self) -> String {
        let last = self.offset + self.len.saturating_sub(1);
        format!("bytes={}-{}", self.offset, last)
    }

    /// Slice `data` to this range, clamped to its length.
    pub fn apply(&self, data: &Bytes) -> Bytes {
        let len = data.len() as u64;
        let start = self.offset.min(len) as usize;
        let end = self.offset.saturating_add(self.len).min(len) as usize;
        data.slice(start..end)
    }
}

/// A remote store of immutable blobs.
///
/// Calls must be idempotent: the backend retries any of them after a
/// [`BlobError::Transient`] failure.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether `key` exists in `bucket`.
    async fn head(&self, bucket: &str, key: &str) -> Result<bool, BlobError>;

    /// Fetch a blob, or only `range` of it. Missing blobs are [`BlobError::NotFound`].
    async fn get(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes, BlobError>;

    /// Store a blob, replacing any previous content under `key`.
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), BlobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header_is_inclusive() {
        assert_eq!(ByteRange::new(0, 16).to_header_value(), "bytes=0-15");
        assert_eq!(ByteRange::new(100, 1).to_header_value(), "bytes=100-100");
    }

    #[test]
    fn range_apply_clamps() {
        let data = Bytes::from_static(b"0123456789");
        assert_eq!(ByteRange::new(2, 3).apply(&data), Bytes::from_static(b"234"));
        assert_eq!(ByteRange::new(8, 16).apply(&data), Bytes::from_static(b"89"));
        assert!(ByteRange::new(20, 4).apply(&data).is_empty());
    }

    #[test]
    fn only_transient_errors_retry() {
        assert!(BlobError::Transient("503".into()).is_retryable());
        assert!(!BlobError::Permanent("400".into()).is_retryable());
        assert!(!BlobError::Configuration("403".into()).is_retryable());
        assert!(!BlobError::NotFound {
            bucket: "b".into(),
            key: "k".into()
        }
        .is_retryable());
    }
}
