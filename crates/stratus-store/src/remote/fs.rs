use std::io::{ErrorKind, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{BlobError, BlobStore, ByteRange};

/// Blob store on a filesystem: `<root>/<bucket>/<key>`.
///
/// Keys may contain `/`; intermediate directories are created on put.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, bucket: &str, key: &str) -> Result<PathBuf, BlobError> {
        for part in [bucket, key] {
            let relative = Path::new(part);
            let plain = relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
            if part.is_empty() || !plain {
                return Err(BlobError::Permanent(format!("unusable path segment: {part:?}")));
            }
        }
        Ok(self.root.join(bucket).join(key))
    }
}

fn io_error(err: std::io::Error, bucket: &str, key: &str) -> BlobError {
    match err.kind() {
        ErrorKind::NotFound => BlobError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        ErrorKind::PermissionDenied => BlobError::Configuration(err.to_string()),
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            BlobError::Transient(err.to_string())
        }
        _ => BlobError::Permanent(err.to_string()),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<bool, BlobError> {
        let path = self.path_for(bucket, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_error(err, bucket, key)),
        }
    }

    async fn get(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes, BlobError> {
        let path = self.path_for(bucket, key)?;
        let Some(range) = range else {
            let data = tokio::fs::read(&path).await.map_err(|e| io_error(e, bucket, key))?;
            return Ok(Bytes::from(data));
        };

        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| io_error(e, bucket, key))?;
        file.seek(SeekFrom::Start(range.offset))
            .await
            .map_err(|e| io_error(e, bucket, key))?;
        let mut buf = Vec::with_capacity(range.len.min(1 << 20) as usize);
        file.take(range.len)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| io_error(e, bucket, key))?;
        Ok(Bytes::from(buf))
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), BlobError> {
        let path = self.path_for(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(e, bucket, key))?;
        }
        // Each put stages into its own file beside the target and renames it
        // into place, so readers never see a partial blob and concurrent puts
        // of one key do not trip over each other.
        let target = path;
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let dir = target.parent().unwrap_or_else(|| Path::new("."));
            let mut staging = tempfile::Builder::new().prefix(".partial-").tempfile_in(dir)?;
            staging.write_all(&body)?;
            staging.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| BlobError::Transient(format!("put task failed: {e}")))?
        .map_err(|e| io_error(e, bucket, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_with_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store
            .put("bucket", "repo/pack-abc.pack", Bytes::from_static(b"pack bytes"))
            .await
            .unwrap();
        assert!(store.head("bucket", "repo/pack-abc.pack").await.unwrap());
        assert!(dir.path().join("bucket/repo/pack-abc.pack").is_file());
        assert_eq!(
            store.get("bucket", "repo/pack-abc.pack", None).await.unwrap(),
            Bytes::from_static(b"pack bytes")
        );
    }

    #[tokio::test]
    async fn range_reads_seek() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("b", "k", Bytes::from_static(b"0123456789")).await.unwrap();

        let part = store.get("b", "k", Some(ByteRange::new(3, 4))).await.unwrap();
        assert_eq!(part, Bytes::from_static(b"3456"));
        let tail = store.get("b", "k", Some(ByteRange::new(8, 16))).await.unwrap();
        assert_eq!(tail, Bytes::from_static(b"89"));
    }

    #[tokio::test]
    async fn missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(!store.head("b", "nope").await.unwrap());
        assert!(matches!(
            store.get("b", "nope", None).await.unwrap_err(),
            BlobError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn escaping_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for key in ["../outside", "/abs", ""] {
            let err = store.put("b", key, Bytes::new()).await.unwrap_err();
            assert!(matches!(err, BlobError::Permanent(_)), "{key:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_of_one_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FsBlobStore::new(dir.path()));
        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.put("b", "same", Bytes::from(vec![i; 256 * 1024])).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let body = store.get("b", "same", None).await.unwrap();
        assert_eq!(body.len(), 256 * 1024);
        assert!(body.iter().all(|b| *b == body[0]));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("b"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("same")]);
    }
}
