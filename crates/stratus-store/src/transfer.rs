//! Blob transfer client: key layout, oracle interception and retry.

use std::sync::Arc;

use bytes::Bytes;
use stratus_types::{ObjectId, PackId};

use crate::error::{BackendError, BackendResult};
use crate::oracle::{Intercept, Oracle};
use crate::remote::{BlobError, BlobStore, ByteRange};
use crate::retry::{with_retries, RetryPolicy};

/// Performs head/get/put against one bucket under one key prefix.
///
/// Each call is first offered to the oracle; only when it declines does the
/// call reach the blob store, wrapped in the retry policy.
pub struct TransferClient {
    bucket: String,
    prefix: String,
    store: Arc<dyn BlobStore>,
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TransferClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferClient")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("retry", &self.retry)
            .finish()
    }
}

fn transfer_error(key: &str, err: BlobError) -> BackendError {
    match err {
        BlobError::NotFound { .. } => BackendError::BlobNotFound { key: key.to_string() },
        BlobError::Configuration(reason) => BackendError::Configuration(reason),
        source => BackendError::Transfer {
            key: key.to_string(),
            source,
        },
    }
}

impl TransferClient {
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        store: Arc<dyn BlobStore>,
        oracle: Arc<dyn Oracle>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            store,
            oracle,
            retry,
        }
    }

    /// `<prefix><object hex>`
    pub fn object_key(&self, id: &ObjectId) -> String {
        format!("{}{}", self.prefix, id.to_hex())
    }

    /// `<prefix>pack-<pack hex>.pack`
    pub fn pack_key(&self, pack: &PackId) -> String {
        format!("{}pack-{}.pack", self.prefix, pack.to_hex())
    }

    /// `<prefix>pack-<pack hex>.idx`
    pub fn index_key(&self, pack: &PackId) -> String {
        format!("{}pack-{}.idx", self.prefix, pack.to_hex())
    }

    /// `<prefix>refs.json`
    pub fn refs_key(&self) -> String {
        format!("{}refs.json", self.prefix)
    }

    pub async fn exists(&self, key: &str) -> BackendResult<bool> {
        if let Intercept::Mocked(found) = self.oracle.head_object(&self.bucket, key) {
            return Ok(found);
        }
        with_retries(&self.retry, "head", || self.store.head(&self.bucket, key))
            .await
            .map_err(|e| transfer_error(key, e))
    }

    /// Fetch a blob, or just `range` of it.
    pub async fn get(&self, key: &str, range: Option<ByteRange>) -> BackendResult<Bytes> {
        if let Intercept::Mocked(found) = self.oracle.get_object(&self.bucket, key, range) {
            return found.ok_or_else(|| BackendError::BlobNotFound { key: key.to_string() });
        }
        let body = with_retries(&self.retry, "get", || self.store.get(&self.bucket, key, range))
            .await
            .map_err(|e| transfer_error(key, e))?;
        tracing::debug!(key, bytes = body.len(), ranged = range.is_some(), "fetched blob");
        Ok(body)
    }

    pub async fn put(&self, key: &str, body: Bytes) -> BackendResult<()> {
        if let Intercept::Mocked(()) = self.oracle.put_object(&self.bucket, key, &body) {
            return Ok(());
        }
        let len = body.len();
        with_retries(&self.retry, "put", || self.store.put(&self.bucket, key, body.clone()))
            .await
            .map_err(|e| transfer_error(key, e))?;
        tracing::debug!(key, bytes = len, "uploaded blob");
        Ok(())
    }
}
