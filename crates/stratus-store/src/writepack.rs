use stratus_pack::{PackFile, PackIndexer};

use crate::error::{BackendError, BackendResult};
use crate::materializer::PackMaterializer;

/// Receives a pack stream from the host in arbitrary chunks.
///
/// Bytes accumulate until they form a complete pack, which is then indexed,
/// cached, registered and uploaded before `add` returns. A stream may carry
/// several packs back to back. Each byte is indexed once, however small the
/// chunks are.
#[derive(Debug)]
pub struct PackWriteSession {
    packs: PackMaterializer,
    buffer: Vec<u8>,
    indexer: PackIndexer,
    published: Vec<PackFile>,
}

impl PackWriteSession {
    pub(crate) fn new(packs: PackMaterializer) -> Self {
        Self {
            packs,
            buffer: Vec::new(),
            indexer: PackIndexer::new(),
            published: Vec::new(),
        }
    }

    pub async fn add(&mut self, bytes: &[u8]) -> BackendResult<()> {
        self.buffer.extend_from_slice(bytes);
        while !self.buffer.is_empty() {
            let indexed = match self.indexer.advance(&self.buffer) {
                Ok(Some(indexed)) => indexed,
                Ok(None) => break,
                Err(e) => {
                    self.buffer.clear();
                    return Err(e.into());
                }
            };
            let file = self.packs.publish(&self.buffer, &indexed).await?;
            self.buffer.drain(..indexed.pack_len);
            tracing::info!(
                pack = %file.pack_id.short_hex(),
                objects = file.object_count,
                "received pack"
            );
            self.published.push(file);
        }
        Ok(())
    }

    /// Finish the stream. Fails if a partial pack is still buffered.
    pub async fn commit(&mut self) -> BackendResult<Vec<PackFile>> {
        if !self.buffer.is_empty() {
            return Err(BackendError::IncompletePack {
                buffered: self.buffer.len(),
            });
        }
        Ok(std::mem::take(&mut self.published))
    }

    /// Bytes received but not yet part of a complete pack.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes of the buffered partial pack already indexed.
    pub fn indexed(&self) -> usize {
        self.indexer.indexed_len()
    }

    /// Packs completed so far and not yet returned by [`commit`](Self::commit).
    pub fn published(&self) -> &[PackFile] {
        &self.published
    }

    /// Discard the session and anything still buffered.
    pub fn free(self) {
        if !self.buffer.is_empty() {
            tracing::warn!(bytes = self.buffer.len(), "discarding incomplete pack data");
        }
    }
}
