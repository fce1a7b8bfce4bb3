//! The backend adapter: the host engine's primitive operations over the
//! location cache, oracle, transfer client, disk cache and pack materializer.
//!
//! Every read-side call resolves in the same order: location cache, then
//! oracle, then the blob store. Whatever is learned is written back to the
//! cache once the I/O that proved it has finished.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use stratus_refs::{RefSnapshot, RefStore};
use stratus_types::{ObjectHeader, ObjectId, ObjectType};

use crate::config::BackendConfig;
use crate::context::BackendContext;
use crate::error::{BackendError, BackendResult};
use crate::header::{BlobHeader, REFS_KIND};
use crate::location::ObjectLocation;
use crate::materializer::PackMaterializer;
use crate::oracle::{Oracle, OracleLocation};
use crate::remote::BlobStore;
use crate::writepack::PackWriteSession;

/// Name of the oracle lock guarding the ref document.
const REFS_LOCK: &str = "refs";

/// A full object as returned by [`Backend::read`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectData {
    pub header: ObjectHeader,
    pub data: Bytes,
}

#[derive(Debug)]
pub struct Backend {
    ctx: Arc<BackendContext>,
    packs: PackMaterializer,
}

impl Backend {
    pub fn new(config: BackendConfig, store: Arc<dyn BlobStore>, oracle: Arc<dyn Oracle>) -> BackendResult<Self> {
        let ctx = Arc::new(BackendContext::new(config, store, oracle)?);
        tracing::info!(
            bucket = %ctx.config.bucket,
            prefix = %ctx.config.prefix,
            scratch = %ctx.disk.root().display(),
            "backend ready"
        );
        Ok(Self {
            packs: PackMaterializer::new(ctx.clone()),
            ctx,
        })
    }

    /// Build the blob store named by `config.remote` and a backend over it.
    pub fn from_config(config: BackendConfig, oracle: Arc<dyn Oracle>) -> BackendResult<Self> {
        config.validate()?;
        let store = config.remote.build()?;
        Self::new(config, store, oracle)
    }

    pub fn config(&self) -> &BackendConfig {
        &self.ctx.config
    }

    /// What the location cache currently knows about `id`.
    pub fn location(&self, id: &ObjectId) -> Option<ObjectLocation> {
        self.ctx.cache.lookup(id)
    }

    pub fn scratch_dir(&self) -> &Path {
        self.ctx.disk.root()
    }

    /// Cache first, then the oracle. `None` means only the blob store can tell.
    fn known_location(&self, id: &ObjectId) -> Option<ObjectLocation> {
        if let Some(location) = self.ctx.cache.lookup(id) {
            tracing::debug!(object = %id.short_hex(), state = location.name(), "location cache hit");
            return Some(location);
        }
        let location = match self.ctx.oracle.lookup_object(id) {
            OracleLocation::Loose => ObjectLocation::LooseRemote,
            OracleLocation::Packed(pack) => ObjectLocation::PackedRemote { pack },
            OracleLocation::Unknown => {
                tracing::debug!(object = %id.short_hex(), "location unknown");
                return None;
            }
        };
        tracing::debug!(object = %id.short_hex(), state = location.name(), "oracle answered");
        self.ctx.cache.insert(*id, location.clone());
        Some(location)
    }

    pub async fn exists(&self, id: &ObjectId) -> BackendResult<bool> {
        if let Some(location) = self.known_location(id) {
            return Ok(location.exists());
        }
        let transfer = &self.ctx.transfer;
        let present = transfer.exists(&transfer.object_key(id)).await?;
        let location = if present {
            ObjectLocation::LooseRemote
        } else {
            ObjectLocation::DoesNotExist
        };
        self.ctx.cache.insert(*id, location);
        Ok(present)
    }

    pub async fn read_header(&self, id: &ObjectId) -> BackendResult<ObjectHeader> {
        let location = self.known_location(id);
        if let Some(header) = location.as_ref().and_then(ObjectLocation::header) {
            return Ok(header);
        }
        match location {
            Some(ObjectLocation::DoesNotExist) => Err(BackendError::ObjectNotFound(*id)),
            Some(ObjectLocation::PackedCached(pack)) => {
                let header = self.packs.read_header(&pack, id)?;
                self.ctx
                    .cache
                    .insert(*id, ObjectLocation::PackedCachedMetaKnown { header, pack });
                Ok(header)
            }
            Some(ObjectLocation::PackedRemote { pack }) => {
                let pack = self.packs.download_pack(&pack).await?;
                let header = self.packs.read_header(&pack, id)?;
                self.ctx
                    .cache
                    .insert(*id, ObjectLocation::PackedCachedMetaKnown { header, pack });
                Ok(header)
            }
            unresolved => {
                let header = self.fetch_loose_header(id, unresolved.is_none()).await?;
                self.ctx
                    .cache
                    .insert(*id, ObjectLocation::LooseRemoteMetaKnown { header });
                Ok(header)
            }
        }
    }

    /// Range-fetch just the blob header of a loose object.
    async fn fetch_loose_header(&self, id: &ObjectId, unresolved: bool) -> BackendResult<ObjectHeader> {
        let transfer = &self.ctx.transfer;
        let key = transfer.object_key(id);
        let bytes = match transfer.get(&key, Some(BlobHeader::range())).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.not_found_as_absent(id, unresolved, e)),
        };
        let blob = BlobHeader::decode(&bytes).ok_or_else(|| BackendError::CorruptBlob {
            key: key.clone(),
            reason: format!("range read returned {} header bytes", bytes.len()),
        })?;
        loose_header(&key, &blob)
    }

    /// A blob missing for an object nobody claimed to exist is memoized as
    /// absent. For an object the cache or oracle vouched for, the raw
    /// not-found surfaces unchanged.
    fn not_found_as_absent(&self, id: &ObjectId, unresolved: bool, err: BackendError) -> BackendError {
        match err {
            BackendError::BlobNotFound { .. } if unresolved => {
                self.ctx.cache.insert(*id, ObjectLocation::DoesNotExist);
                BackendError::ObjectNotFound(*id)
            }
            other => other,
        }
    }

    pub async fn read(&self, id: &ObjectId) -> BackendResult<ObjectData> {
        let location = self.known_location(id);
        match location {
            Some(ObjectLocation::DoesNotExist) => Err(BackendError::ObjectNotFound(*id)),
            Some(ObjectLocation::LooseCached { path, header, .. }) => {
                let data = self.ctx.disk.read_loose(&path)?;
                Ok(ObjectData {
                    header,
                    data: Bytes::from(data),
                })
            }
            Some(ObjectLocation::PackedCached(pack)) | Some(ObjectLocation::PackedCachedMetaKnown { pack, .. }) => {
                let object = self.packs.read_object(&pack, id)?;
                self.ctx.cache.insert(
                    *id,
                    ObjectLocation::PackedCachedMetaKnown {
                        header: object.header,
                        pack,
                    },
                );
                Ok(ObjectData {
                    header: object.header,
                    data: Bytes::from(object.data),
                })
            }
            Some(ObjectLocation::PackedRemote { pack }) => {
                let pack = self.packs.download_pack(&pack).await?;
                let object = self.packs.read_object(&pack, id)?;
                self.ctx.cache.insert(
                    *id,
                    ObjectLocation::PackedCachedMetaKnown {
                        header: object.header,
                        pack,
                    },
                );
                Ok(ObjectData {
                    header: object.header,
                    data: Bytes::from(object.data),
                })
            }
            unresolved => self.fetch_loose(id, unresolved.is_none()).await,
        }
    }

    /// Download a loose object in full and cache it on disk.
    async fn fetch_loose(&self, id: &ObjectId, unresolved: bool) -> BackendResult<ObjectData> {
        let transfer = &self.ctx.transfer;
        let key = transfer.object_key(id);
        let payload = match transfer.get(&key, None).await {
            Ok(payload) => payload,
            Err(e) => return Err(self.not_found_as_absent(id, unresolved, e)),
        };
        let (blob, data) = BlobHeader::split(&key, payload)?;
        let header = loose_header(&key, &blob)?;
        let path = self.ctx.disk.store_loose(id, &data)?;
        self.ctx.cache.insert(
            *id,
            ObjectLocation::LooseCached {
                path,
                header,
                cached_at: Utc::now(),
            },
        );
        Ok(ObjectData { header, data })
    }

    /// Store a loose object. Always uploads, then registers and caches it.
    pub async fn write(&self, id: &ObjectId, data: &[u8], object_type: ObjectType) -> BackendResult<()> {
        let transfer = &self.ctx.transfer;
        let key = transfer.object_key(id);
        transfer
            .put(&key, BlobHeader::frame(u64::from(object_type.code()), data))
            .await?;

        let header = ObjectHeader::new(object_type, data.len() as u64);
        let path = self.ctx.disk.store_loose(id, data)?;
        self.ctx.oracle.register_object(id, Some(&header));
        self.ctx.cache.insert(
            *id,
            ObjectLocation::LooseCached {
                path,
                header,
                cached_at: Utc::now(),
            },
        );
        tracing::debug!(object = %id.short_hex(), %object_type, bytes = data.len(), "wrote object");
        Ok(())
    }

    /// Open a session that receives a pack stream.
    pub fn write_pack(&self) -> PackWriteSession {
        PackWriteSession::new(self.packs.clone())
    }

    /// Nothing is cached that could go stale in a way a refresh would fix.
    pub async fn refresh(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Resolving abbreviated ids is left to the host.
    pub async fn read_prefix(&self, _prefix: &str) -> BackendResult<ObjectId> {
        Err(BackendError::Unsupported("read_prefix"))
    }

    /// Enumerating every object is left to the host.
    pub async fn foreach(&self) -> BackendResult<Vec<ObjectId>> {
        Err(BackendError::Unsupported("foreach"))
    }

    /// Publish every ref in `refs` as the ref document and announce each to
    /// the oracle. Returns the number of refs published.
    pub async fn snapshot_refs(&self, refs: &dyn RefStore) -> BackendResult<usize> {
        self.with_refs_lock(async {
            let snapshot = RefSnapshot::capture(refs)?;
            let transfer = &self.ctx.transfer;
            transfer
                .put(&transfer.refs_key(), BlobHeader::frame(REFS_KIND, &snapshot.to_json()?))
                .await?;
            for reference in snapshot.refs() {
                self.ctx
                    .oracle
                    .update_ref(reference.name(), &reference.target_string());
            }
            tracing::info!(refs = snapshot.len(), "published ref document");
            Ok::<_, BackendError>(snapshot.len())
        })
        .await
    }

    /// Load the ref document into `refs`. Returns the number of refs written.
    pub async fn restore_refs(&self, refs: &dyn RefStore) -> BackendResult<usize> {
        self.with_refs_lock(async {
            let transfer = &self.ctx.transfer;
            let key = transfer.refs_key();
            let body = BlobHeader::split_kind(&key, transfer.get(&key, None).await?, REFS_KIND)?;
            let snapshot = RefSnapshot::from_json(&body)?;
            let written = snapshot.restore(refs)?;
            tracing::info!(refs = written, "restored ref document");
            Ok::<_, BackendError>(written)
        })
        .await
    }

    async fn with_refs_lock<T>(&self, op: impl std::future::Future<Output = BackendResult<T>>) -> BackendResult<T> {
        let oracle = &self.ctx.oracle;
        if !oracle.acquire_lock(REFS_LOCK) {
            return Err(BackendError::LockUnavailable(REFS_LOCK.to_string()));
        }
        let result = op.await;
        oracle.release_lock(REFS_LOCK);
        result
    }

    /// Tell the oracle we are going away and delete the scratch directory.
    pub fn free(&self) -> BackendResult<()> {
        if self.ctx.disk.is_closed() {
            return Ok(());
        }
        self.ctx.oracle.shutting_down();
        self.ctx.disk.close()?;
        tracing::info!(bucket = %self.ctx.config.bucket, "backend freed");
        Ok(())
    }
}

fn loose_header(key: &str, blob: &BlobHeader) -> BackendResult<ObjectHeader> {
    let object_type = blob.object_type().ok_or_else(|| BackendError::CorruptBlob {
        key: key.to_string(),
        reason: format!("kind {:#x} is not an object type", blob.kind),
    })?;
    Ok(ObjectHeader::new(object_type, blob.length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{InMemoryOracle, NoopOracle};
    use crate::remote::{ByteRange, InMemoryBlobStore};
    use crate::retry::RetryPolicy;
    use stratus_pack::PackWriter;
    use stratus_refs::{InMemoryRefStore, Ref};

    const BUCKET: &str = "test-bucket";

    fn config() -> BackendConfig {
        let mut config = BackendConfig::new(BUCKET, "");
        config.retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        config
    }

    fn backend_with(oracle: Arc<dyn Oracle>) -> (Backend, Arc<InMemoryBlobStore>) {
        let store = Arc::new(InMemoryBlobStore::new());
        let backend = Backend::new(config(), store.clone(), oracle).unwrap();
        (backend, store)
    }

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_hash([byte; 32])
    }

    // -----------------------------------------------------------------------
    // Loose objects
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn write_uploads_framed_blob() {
        let (backend, store) = backend_with(Arc::new(NoopOracle));
        let aaaa = id(0xaa);
        backend.write(&aaaa, b"hello", ObjectType::Blob).await.unwrap();

        let stored = store.blob(BUCKET, &aaaa.to_hex()).unwrap();
        assert_eq!(&stored[..16], &BlobHeader::new(5, 3).encode());
        assert_eq!(&stored[16..], b"hello");
        assert!(matches!(
            backend.location(&aaaa),
            Some(ObjectLocation::LooseCached { .. })
        ));
    }

    #[tokio::test]
    async fn read_after_write_is_local() {
        let (backend, store) = backend_with(Arc::new(NoopOracle));
        backend.write(&id(1), b"body", ObjectType::Commit).await.unwrap();
        store.reset_counters();

        let object = backend.read(&id(1)).await.unwrap();
        assert_eq!(object.header, ObjectHeader::new(ObjectType::Commit, 4));
        assert_eq!(object.data, Bytes::from_static(b"body"));
        assert!(backend.exists(&id(1)).await.unwrap());
        assert_eq!(backend.read_header(&id(1)).await.unwrap().length, 4);
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn missing_object_is_memoized() {
        let (backend, store) = backend_with(Arc::new(NoopOracle));
        assert!(!backend.exists(&id(2)).await.unwrap());
        assert_eq!(backend.location(&id(2)), Some(ObjectLocation::DoesNotExist));
        assert!(!backend.exists(&id(2)).await.unwrap());
        assert_eq!(store.head_calls(), 1);

        let err = backend.read(&id(2)).await.unwrap_err();
        assert!(matches!(err, BackendError::ObjectNotFound(_)));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn read_of_unknown_missing_object_memoizes_absence() {
        let (backend, store) = backend_with(Arc::new(NoopOracle));
        let err = backend.read_header(&id(3)).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(backend.location(&id(3)), Some(ObjectLocation::DoesNotExist));
        assert!(!backend.exists(&id(3)).await.unwrap());
        assert_eq!(store.total_calls(), 1);
    }

    #[tokio::test]
    async fn header_read_fetches_sixteen_bytes() {
        let (backend, store) = backend_with(Arc::new(NoopOracle));
        store.insert(BUCKET, &id(4).to_hex(), BlobHeader::frame(2, &[7u8; 4096]));

        let header = backend.read_header(&id(4)).await.unwrap();
        assert_eq!(header, ObjectHeader::new(ObjectType::Tree, 4096));
        assert_eq!(
            store.requested_ranges(),
            vec![(id(4).to_hex(), Some(ByteRange::new(0, 16)))]
        );
        assert!(matches!(
            backend.location(&id(4)),
            Some(ObjectLocation::LooseRemoteMetaKnown { .. })
        ));

        let object = backend.read(&id(4)).await.unwrap();
        assert_eq!(object.data.len(), 4096);
        assert_eq!(store.requested_ranges().last(), Some(&(id(4).to_hex(), None)));
    }

    #[tokio::test]
    async fn corrupt_blob_is_an_error() {
        let (backend, store) = backend_with(Arc::new(NoopOracle));
        store.insert(BUCKET, &id(5).to_hex(), BlobHeader::frame(0x999, b"x"));
        let err = backend.read(&id(5)).await.unwrap_err();
        assert!(matches!(err, BackendError::CorruptBlob { .. }));

        store.insert(BUCKET, &id(6).to_hex(), &b"tiny"[..]);
        assert!(matches!(
            backend.read_header(&id(6)).await.unwrap_err(),
            BackendError::CorruptBlob { .. }
        ));
    }

    #[tokio::test]
    async fn stale_remote_entry_surfaces_raw_not_found() {
        let oracle = Arc::new(InMemoryOracle::new());
        oracle.seed_object(id(7), OracleLocation::Loose);
        let (backend, _store) = backend_with(oracle);

        let err = backend.read(&id(7)).await.unwrap_err();
        assert!(matches!(err, BackendError::BlobNotFound { .. }));
        assert_eq!(backend.location(&id(7)), Some(ObjectLocation::LooseRemote));
    }

    // -----------------------------------------------------------------------
    // Packs
    // -----------------------------------------------------------------------

    fn three_object_pack() -> (Vec<u8>, Vec<ObjectId>) {
        let mut writer = PackWriter::new();
        let ids = vec![
            writer.add_object(ObjectType::Blob, b"A"),
            writer.add_object(ObjectType::Blob, b"B"),
            writer.add_object(ObjectType::Commit, b"C"),
        ];
        (writer.finish_to_bytes().unwrap().0, ids)
    }

    #[tokio::test]
    async fn write_pack_in_chunks() {
        let oracle = Arc::new(InMemoryOracle::new());
        let (backend, store) = backend_with(oracle.clone());
        let (bytes, ids) = three_object_pack();

        let mut session = backend.write_pack();
        for chunk in bytes.chunks(7) {
            session.add(chunk).await.unwrap();
        }
        assert_eq!(session.buffered(), 0);
        let files = session.commit().await.unwrap();
        assert_eq!(files.len(), 1);

        store.reset_counters();
        for id in &ids {
            assert!(backend.exists(id).await.unwrap());
        }
        assert_eq!(store.total_calls(), 0);
        let registrations = oracle.pack_registrations();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].1.len(), 3);

        let object = backend.read(&ids[2]).await.unwrap();
        assert_eq!(object.header.object_type, ObjectType::Commit);
        assert_eq!(object.data, Bytes::from_static(b"C"));
    }

    #[tokio::test]
    async fn two_packs_in_one_add() {
        let (backend, _store) = backend_with(Arc::new(NoopOracle));
        let (first, first_ids) = three_object_pack();
        let mut writer = PackWriter::new();
        let other = writer.add_object(ObjectType::Tag, b"tag body");
        let (second, _) = writer.finish_to_bytes().unwrap();

        let mut stream = first;
        stream.extend_from_slice(&second);
        let mut session = backend.write_pack();
        session.add(&stream).await.unwrap();
        assert_eq!(session.published().len(), 2);
        session.commit().await.unwrap();

        assert!(backend.exists(&first_ids[0]).await.unwrap());
        assert_eq!(
            backend.read_header(&other).await.unwrap(),
            ObjectHeader::new(ObjectType::Tag, 8)
        );
    }

    #[tokio::test]
    async fn commit_with_partial_pack_fails() {
        let (backend, store) = backend_with(Arc::new(NoopOracle));
        let (bytes, _) = three_object_pack();
        let mut session = backend.write_pack();
        session.add(&bytes[..bytes.len() / 2]).await.unwrap();
        let err = session.commit().await.unwrap_err();
        assert!(matches!(err, BackendError::IncompletePack { .. }));
        assert_eq!(store.put_calls(), 0);
        session.free();
    }

    #[tokio::test]
    async fn garbage_stream_is_rejected() {
        let (backend, _store) = backend_with(Arc::new(NoopOracle));
        let mut session = backend.write_pack();
        let err = session.add(b"this is not a pack at all").await.unwrap_err();
        assert!(matches!(err, BackendError::CorruptPack(_)));
        assert_eq!(session.buffered(), 0);
    }

    #[tokio::test]
    async fn byte_at_a_time_pack_is_indexed_incrementally() {
        let (backend, _store) = backend_with(Arc::new(NoopOracle));
        let (bytes, ids) = three_object_pack();

        let mut session = backend.write_pack();
        let mut indexed = 0;
        for (at, byte) in bytes.iter().enumerate() {
            session.add(std::slice::from_ref(byte)).await.unwrap();
            if at + 1 < bytes.len() {
                assert_eq!(session.buffered(), at + 1);
                assert!(session.indexed() >= indexed);
                assert!(session.indexed() <= session.buffered());
                indexed = session.indexed();
            }
        }
        // Only the trailer was left unindexed before the last byte arrived.
        assert_eq!(indexed, bytes.len() - 32);
        assert_eq!(session.buffered(), 0);
        assert_eq!(session.indexed(), 0);
        assert_eq!(session.commit().await.unwrap().len(), 1);
        assert_eq!(backend.read(&ids[1]).await.unwrap().data, Bytes::from_static(b"B"));
    }

    #[tokio::test]
    async fn packed_remote_object_downloads_its_pack() {
        let (writer_backend, store) = backend_with(Arc::new(NoopOracle));
        let (bytes, ids) = three_object_pack();
        let mut session = writer_backend.write_pack();
        session.add(&bytes).await.unwrap();
        let pack = session.commit().await.unwrap()[0].pack_id;

        // A reader whose oracle knows the pack but which has no local copy.
        let oracle = Arc::new(InMemoryOracle::new());
        oracle.seed_pack(pack, &ids);
        let reader = Backend::new(config(), store.clone(), oracle.clone()).unwrap();

        let header = reader.read_header(&ids[0]).await.unwrap();
        assert_eq!(header, ObjectHeader::new(ObjectType::Blob, 1));
        // The oracle named the pack, so it is not registered a second time.
        assert_eq!(oracle.calls().register_pack, 0);
        // The whole pack is now local: sibling objects need no remote calls.
        store.reset_counters();
        assert_eq!(reader.read(&ids[1]).await.unwrap().data, Bytes::from_static(b"B"));
        assert_eq!(store.total_calls(), 0);
    }

    // -----------------------------------------------------------------------
    // Concurrent calls for one id
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_and_reads_of_one_id() {
        let (writer, store) = backend_with(Arc::new(NoopOracle));
        let writer = Arc::new(writer);
        let reader = Arc::new(Backend::new(config(), store.clone(), Arc::new(NoopOracle)).unwrap());
        let target = id(0x77);
        let body = vec![7u8; 1 << 20];
        writer.write(&target, &body, ObjectType::Blob).await.unwrap();

        for _ in 0..20 {
            let mut tasks = Vec::new();
            for _ in 0..8 {
                let (writer, body) = (writer.clone(), body.clone());
                tasks.push(tokio::spawn(async move {
                    writer.write(&target, &body, ObjectType::Blob).await.map(|_| body.len())
                }));
                let reader = reader.clone();
                tasks.push(tokio::spawn(async move {
                    reader.read(&target).await.map(|object| object.data.len())
                }));
            }
            for task in tasks {
                assert_eq!(task.await.unwrap().unwrap(), 1 << 20);
            }
        }

        let object = reader.read(&target).await.unwrap();
        assert_eq!(object.header, ObjectHeader::new(ObjectType::Blob, 1 << 20));
        assert!(object.data.iter().all(|b| *b == 7));
    }

    // -----------------------------------------------------------------------
    // Host contract and lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn prefix_and_foreach_are_unsupported() {
        let (backend, _store) = backend_with(Arc::new(NoopOracle));
        assert!(matches!(
            backend.read_prefix("abc").await.unwrap_err(),
            BackendError::Unsupported("read_prefix")
        ));
        assert!(matches!(
            backend.foreach().await.unwrap_err(),
            BackendError::Unsupported("foreach")
        ));
        backend.refresh().await.unwrap();
    }

    #[tokio::test]
    async fn free_notifies_oracle_and_removes_scratch() {
        let oracle = Arc::new(InMemoryOracle::new());
        let (backend, _store) = backend_with(oracle.clone());
        backend.write(&id(9), b"x", ObjectType::Blob).await.unwrap();
        let scratch = backend.scratch_dir().to_path_buf();
        assert!(scratch.is_dir());

        backend.free().unwrap();
        assert!(oracle.is_shut_down());
        assert!(!scratch.exists());
        backend.free().unwrap();
        assert_eq!(oracle.calls().shutting_down, 1);
    }

    #[tokio::test]
    async fn refs_roundtrip_through_the_store() {
        let oracle = Arc::new(InMemoryOracle::new());
        let (backend, store) = backend_with(oracle.clone());
        let refs = InMemoryRefStore::new();
        refs.write_ref(&Ref::direct("refs/heads/main", id(1))).unwrap();
        refs.write_ref(&Ref::symbolic("HEAD", "refs/heads/main")).unwrap();

        assert_eq!(backend.snapshot_refs(&refs).await.unwrap(), 2);
        assert!(store.blob(BUCKET, "refs.json").is_some());
        assert_eq!(oracle.ref_target("HEAD").as_deref(), Some("refs/heads/main"));
        assert_eq!(oracle.calls().update_ref, 2);
        assert!(!oracle.is_locked("refs"));

        let restored = InMemoryRefStore::new();
        assert_eq!(backend.restore_refs(&restored).await.unwrap(), 2);
        assert_eq!(restored.resolve("HEAD").unwrap(), id(1));
    }

    #[tokio::test]
    async fn refs_lock_contention() {
        let oracle = Arc::new(InMemoryOracle::new());
        let (backend, store) = backend_with(oracle.clone());
        assert!(oracle.acquire_lock("refs"));
        let err = backend.snapshot_refs(&InMemoryRefStore::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::LockUnavailable(_)));
        assert_eq!(store.put_calls(), 0);
    }
}
