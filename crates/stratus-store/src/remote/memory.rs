use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use super::{BlobError, BlobStore, ByteRange};

/// In-memory blob store.
///
/// Intended for tests and embedding. Every call is counted (failed ones
/// included), requested ranges are recorded, and [`fail_next`](Self::fail_next)
/// injects transient failures.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<(String, String), Bytes>>,
    ranges: Mutex<Vec<(String, Option<ByteRange>)>>,
    head_calls: AtomicUsize,
    get_calls: AtomicUsize,
    put_calls: AtomicUsize,
    failures_pending: AtomicUsize,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with [`BlobError::Transient`].
    pub fn fail_next(&self, n: usize) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Sum of all remote calls so far.
    pub fn total_calls(&self) -> usize {
        self.head_calls() + self.get_calls() + self.put_calls()
    }

    pub fn reset_counters(&self) {
        self.head_calls.store(0, Ordering::SeqCst);
        self.get_calls.store(0, Ordering::SeqCst);
        self.put_calls.store(0, Ordering::SeqCst);
        lock(&self.ranges).clear();
    }

    /// Every `get` so far as `(key, range)`, in call order.
    pub fn requested_ranges(&self) -> Vec<(String, Option<ByteRange>)> {
        lock(&self.ranges).clone()
    }

    /// Peek at a stored blob without counting a call.
    pub fn blob(&self, bucket: &str, key: &str) -> Option<Bytes> {
        lock(&self.blobs).get(&(bucket.to_string(), key.to_string())).cloned()
    }

    /// Store a blob without counting a call.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        lock(&self.blobs).insert((bucket.to_string(), key.to_string()), body.into());
    }

    /// Delete a blob behind the backend's back.
    pub fn remove(&self, bucket: &str, key: &str) -> bool {
        lock(&self.blobs)
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some()
    }

    /// Keys stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.blobs)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn injected_failure(&self) -> Result<(), BlobError> {
        let took = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match took {
            Ok(_) => Err(BlobError::Transient("injected failure".into())),
            Err(_) => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<bool, BlobError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        Ok(lock(&self.blobs).contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn get(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes, BlobError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.ranges).push((key.to_string(), range));
        self.injected_failure()?;
        let body = self.blob(bucket, key).ok_or_else(|| BlobError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        Ok(match range {
            Some(range) => range.apply(&body),
            None => body,
        })
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), BlobError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        self.insert(bucket, key, body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_head_get() {
        let store = InMemoryBlobStore::new();
        assert!(!store.head("b", "k").await.unwrap());
        store.put("b", "k", Bytes::from_static(b"hello")).await.unwrap();
        assert!(store.head("b", "k").await.unwrap());
        assert_eq!(store.get("b", "k", None).await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(
            store.get("b", "k", Some(ByteRange::new(1, 2))).await.unwrap(),
            Bytes::from_static(b"el")
        );
        assert_eq!(store.head_calls(), 2);
        assert_eq!(store.get_calls(), 2);
        assert_eq!(store.put_calls(), 1);
    }

    #[tokio::test]
    async fn buckets_are_separate() {
        let store = InMemoryBlobStore::new();
        store.insert("a", "k", &b"x"[..]);
        assert!(!store.head("b", "k").await.unwrap());
        assert!(matches!(
            store.get("b", "k", None).await.unwrap_err(),
            BlobError::NotFound { .. }
        ));
        assert_eq!(store.keys("a"), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_counted() {
        let store = InMemoryBlobStore::new();
        store.fail_next(2);
        assert!(store.head("b", "k").await.unwrap_err().is_retryable());
        assert!(store.put("b", "k", Bytes::new()).await.is_err());
        assert!(store.head("b", "k").await.is_ok());
        assert_eq!(store.total_calls(), 3);
    }

    #[tokio::test]
    async fn ranges_are_recorded() {
        let store = InMemoryBlobStore::new();
        store.insert("b", "k", &b"0123456789abcdef0123"[..]);
        store.get("b", "k", Some(ByteRange::new(0, 16))).await.unwrap();
        store.get("b", "k", None).await.unwrap();
        assert_eq!(
            store.requested_ranges(),
            vec![
                ("k".to_string(), Some(ByteRange::new(0, 16))),
                ("k".to_string(), None)
            ]
        );
        store.reset_counters();
        assert_eq!(store.total_calls(), 0);
        assert!(store.requested_ranges().is_empty());
    }
}
