//! Pack materializer: turns pack streams into cached, registered, uploaded
//! pack pairs, and downloads remote packs for reading.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use stratus_pack::{index_pack, IndexedPack, PackError, PackFile, PackIndex, PackReader, PackedObject};
use stratus_types::{ObjectHeader, ObjectId, PackId};

use crate::context::BackendContext;
use crate::error::{BackendError, BackendResult};
use crate::header::{BlobHeader, INDEX_KIND, PACK_KIND};
use crate::location::{CachedPack, ObjectLocation};

#[derive(Clone, Debug)]
pub struct PackMaterializer {
    ctx: Arc<BackendContext>,
}

impl PackMaterializer {
    pub fn new(ctx: Arc<BackendContext>) -> Self {
        Self { ctx }
    }

    /// Record every object of a cached pack as `PackedCached` and register
    /// the pack with the oracle. Reads the index only.
    pub fn observe(&self, pack_id: &PackId, pack_path: &Path, index_path: &Path) -> BackendResult<Vec<ObjectId>> {
        let ids = self.record_members(pack_id, pack_path, index_path)?;
        self.ctx.oracle.register_pack(pack_id, &ids);
        tracing::debug!(pack = %pack_id.short_hex(), objects = ids.len(), "observed pack");
        Ok(ids)
    }

    /// Like [`observe`](Self::observe) for a pack fetched from the remote:
    /// the oracle is only told about it if it does not know the pack yet.
    fn observe_remote(&self, pack_id: &PackId, pack_path: &Path, index_path: &Path) -> BackendResult<()> {
        let ids = self.record_members(pack_id, pack_path, index_path)?;
        if self.ctx.oracle.lookup_pack(pack_id) {
            tracing::debug!(pack = %pack_id.short_hex(), objects = ids.len(), "observed registered pack");
        } else {
            self.ctx.oracle.register_pack(pack_id, &ids);
            tracing::debug!(pack = %pack_id.short_hex(), objects = ids.len(), "observed unregistered pack");
        }
        Ok(())
    }

    fn record_members(&self, pack_id: &PackId, pack_path: &Path, index_path: &Path) -> BackendResult<Vec<ObjectId>> {
        let index = PackIndex::open(index_path)?;
        if index.pack_id != *pack_id {
            return Err(PackError::ChecksumMismatch {
                expected: *pack_id,
                actual: index.pack_id,
            }
            .into());
        }
        let cached = CachedPack {
            pack_id: *pack_id,
            pack_path: pack_path.to_path_buf(),
            index_path: index_path.to_path_buf(),
            cached_at: Utc::now(),
        };
        let ids = index.object_ids().to_vec();
        for id in &ids {
            self.ctx.cache.insert(*id, ObjectLocation::PackedCached(cached.clone()));
        }
        Ok(ids)
    }

    /// Upload a pack pair unless the oracle says the pack is already remote.
    /// Returns whether anything was uploaded.
    pub async fn upload_pack(&self, file: &PackFile) -> BackendResult<bool> {
        if self.ctx.oracle.lookup_pack(&file.pack_id) {
            tracing::debug!(pack = %file.pack_id.short_hex(), "pack already remote, skipping upload");
            return Ok(false);
        }
        self.put_pack_blobs(file).await?;
        Ok(true)
    }

    async fn put_pack_blobs(&self, file: &PackFile) -> BackendResult<()> {
        let transfer = &self.ctx.transfer;
        let body = std::fs::read(&file.pack_path)?;
        let index = std::fs::read(&file.index_path)?;
        let (body_len, index_len) = (body.len(), index.len());
        transfer
            .put(&transfer.pack_key(&file.pack_id), BlobHeader::frame(PACK_KIND, &body))
            .await?;
        transfer
            .put(&transfer.index_key(&file.pack_id), BlobHeader::frame(INDEX_KIND, &index))
            .await?;
        tracing::info!(
            pack = %file.pack_id.short_hex(),
            objects = file.object_count,
            pack_bytes = body_len,
            index_bytes = index_len,
            "uploaded pack"
        );
        Ok(())
    }

    /// Make a remote pack local and record its members in the cache.
    ///
    /// A pack already present in the scratch directory is only re-observed.
    /// The oracle is not told again about a pack it already knows.
    pub async fn download_pack(&self, pack_id: &PackId) -> BackendResult<CachedPack> {
        let disk = &self.ctx.disk;
        if disk.has_pack(pack_id) {
            let (pack_path, index_path) = disk.pack_paths(pack_id);
            self.observe_remote(pack_id, &pack_path, &index_path)?;
            return Ok(self.cached(pack_id, pack_path, index_path));
        }

        let transfer = &self.ctx.transfer;
        let pack_key = transfer.pack_key(pack_id);
        let index_key = transfer.index_key(pack_id);
        let body = match transfer.get(&pack_key, None).await {
            Ok(payload) => BlobHeader::split_kind(&pack_key, payload, PACK_KIND)?,
            Err(BackendError::BlobNotFound { .. }) => return Err(BackendError::PackNotFound(*pack_id)),
            Err(e) => return Err(e),
        };
        let index_body = BlobHeader::split_kind(&index_key, transfer.get(&index_key, None).await?, INDEX_KIND)?;

        let index = PackIndex::from_bytes(&index_body)?;
        let reader = PackReader::from_bytes(body.to_vec(), index)?;
        reader.verify_checksum()?;
        if reader.index().pack_id != *pack_id {
            return Err(PackError::ChecksumMismatch {
                expected: *pack_id,
                actual: reader.index().pack_id,
            }
            .into());
        }

        let (pack_path, index_path) = disk.store_pack(pack_id, &body, &index_body)?;
        tracing::info!(pack = %pack_id.short_hex(), bytes = body.len(), "downloaded pack");
        self.observe_remote(pack_id, &pack_path, &index_path)?;
        Ok(self.cached(pack_id, pack_path, index_path))
    }

    fn cached(&self, pack_id: &PackId, pack_path: PathBuf, index_path: PathBuf) -> CachedPack {
        CachedPack {
            pack_id: *pack_id,
            pack_path,
            index_path,
            cached_at: Utc::now(),
        }
    }

    /// Type and length of one object in a cached pack, without decompressing it.
    pub fn read_header(&self, pack: &CachedPack, id: &ObjectId) -> BackendResult<ObjectHeader> {
        let reader = PackReader::open(&pack.pack_path, &pack.index_path)?;
        reader.read_header(id)?.ok_or(BackendError::ObjectNotFound(*id))
    }

    pub fn read_object(&self, pack: &CachedPack, id: &ObjectId) -> BackendResult<PackedObject> {
        let reader = PackReader::open(&pack.pack_path, &pack.index_path)?;
        reader.read_object(id)?.ok_or(BackendError::ObjectNotFound(*id))
    }

    /// Persist an indexed pack stream under the scratch directory.
    pub fn materialize(&self, data: &[u8], indexed: &IndexedPack) -> BackendResult<PackFile> {
        let pack_id = indexed.pack_id();
        let (pack_path, index_path) =
            self.ctx
                .disk
                .store_pack(&pack_id, &data[..indexed.pack_len], &indexed.index.to_bytes())?;
        Ok(PackFile {
            pack_id,
            pack_path,
            index_path,
            object_count: indexed.index.object_count(),
        })
    }

    /// Index a complete pack stream and persist it.
    pub fn materialize_stream(&self, data: &[u8]) -> BackendResult<PackFile> {
        let indexed = index_pack(data)?;
        self.materialize(data, &indexed)
    }

    /// Materialize, observe and upload one indexed pack handed over by the host.
    ///
    /// The upload decision is taken before observing, since observing
    /// registers the pack with the oracle.
    pub async fn publish(&self, data: &[u8], indexed: &IndexedPack) -> BackendResult<PackFile> {
        let file = self.materialize(data, indexed)?;
        let already_remote = self.ctx.oracle.lookup_pack(&file.pack_id);
        self.observe(&file.pack_id, &file.pack_path, &file.index_path)?;
        if already_remote {
            tracing::debug!(pack = %file.pack_id.short_hex(), "pack already remote, skipping upload");
        } else {
            self.put_pack_blobs(&file).await?;
        }
        Ok(file)
    }
}
