//! Index a raw pack byte stream handed over by the host engine.
//!
//! The stream carries no index, so every entry is decompressed once to derive
//! its object id. Running out of input anywhere is reported as
//! [`PackError::Truncated`], which callers buffering a streamed pack treat as
//! "wait for more bytes".

use stratus_types::{ObjectId, PackId, DIGEST_LEN};

use crate::entry::{EntryKind, DELTA_TYPE_BYTE};
use crate::error::{PackError, PackResult};
use crate::index::{be_u32, PackIndex};
use crate::writer::{decode_varint, PACK_HEADER_LEN, PACK_MAGIC, PACK_VERSION};

/// Result of indexing a pack stream.
#[derive(Clone, Debug)]
pub struct IndexedPack {
    pub index: PackIndex,
    /// Number of bytes of the input that make up the pack, trailer included.
    pub pack_len: usize,
}

impl IndexedPack {
    pub fn pack_id(&self) -> PackId {
        self.index.pack_id
    }
}

/// Walk a complete pack stream and build its index.
pub fn index_pack(data: &[u8]) -> PackResult<IndexedPack> {
    PackIndexer::new().step(data)
}

/// Resumable indexer for a pack stream that arrives in pieces.
///
/// Each call to [`advance`](Self::advance) is given the whole stream received
/// so far, starting at the first byte of the pack. Entries already indexed
/// are not looked at again, so every entry is decompressed and hashed once no
/// matter how the stream is chunked.
#[derive(Debug, Default)]
pub struct PackIndexer {
    /// Object count from the pack header, once it has been read.
    count: Option<usize>,
    /// End of the last fully indexed piece of the stream.
    pos: usize,
    entries: Vec<(ObjectId, u32, u64)>,
    checksum: blake3::Hasher,
}

impl PackIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of the stream indexed so far.
    pub fn indexed_len(&self) -> usize {
        self.pos
    }

    /// Index whatever new bytes `data` holds.
    ///
    /// Returns `Ok(None)` while the pack is incomplete. Once a pack is
    /// returned, or on any error, the indexer starts over and expects the
    /// next call to begin with a fresh pack.
    pub fn advance(&mut self, data: &[u8]) -> PackResult<Option<IndexedPack>> {
        match self.step(data) {
            Ok(indexed) => Ok(Some(indexed)),
            Err(PackError::Truncated(_)) => Ok(None),
            Err(e) => {
                *self = Self::default();
                Err(e)
            }
        }
    }

    /// Mark `data[self.pos..end]` as indexed.
    fn consume(&mut self, data: &[u8], end: usize) {
        self.checksum.update(&data[self.pos..end]);
        self.pos = end;
    }

    fn step(&mut self, data: &[u8]) -> PackResult<IndexedPack> {
        if data.len() < self.pos {
            return Err(PackError::CorruptEntry {
                offset: data.len() as u64,
                reason: format!("stream shrank below {} indexed bytes", self.pos),
            });
        }
        let count = match self.count {
            Some(count) => count,
            None => {
                let count = read_header(data)?;
                self.entries.reserve(count.min(4096));
                self.consume(data, PACK_HEADER_LEN);
                self.count = Some(count);
                count
            }
        };

        while self.entries.len() < count {
            let (entry, end) = read_entry(data, self.pos)?;
            self.entries.push(entry);
            self.consume(data, end);
        }

        let trailer_end = self.pos + DIGEST_LEN;
        if data.len() < trailer_end {
            return Err(PackError::Truncated("pack trailer".into()));
        }
        let actual = PackId::from_hash(*self.checksum.finalize().as_bytes());
        let mut trailer = [0u8; DIGEST_LEN];
        trailer.copy_from_slice(&data[self.pos..trailer_end]);
        let expected = PackId::from_hash(trailer);
        if actual != expected {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }

        let entries = std::mem::take(&mut self.entries);
        *self = Self::default();
        tracing::debug!(pack = %actual.short_hex(), objects = entries.len(), "indexed pack stream");
        Ok(IndexedPack {
            index: PackIndex::build(entries, actual),
            pack_len: trailer_end,
        })
    }
}

fn read_header(data: &[u8]) -> PackResult<usize> {
    if data.len() < PACK_HEADER_LEN {
        return Err(PackError::Truncated("pack header".into()));
    }
    if &data[0..4] != PACK_MAGIC {
        return Err(PackError::InvalidMagic {
            expected: "STRP".into(),
            actual: String::from_utf8_lossy(&data[0..4]).into(),
        });
    }
    let version = be_u32(&data[4..8]);
    if version != PACK_VERSION {
        return Err(PackError::UnsupportedVersion(version));
    }
    Ok(be_u32(&data[8..12]) as usize)
}

/// Decode the entry starting at `offset`; returns its index row and end.
fn read_entry(data: &[u8], offset: usize) -> PackResult<((ObjectId, u32, u64), usize)> {
    let at = offset as u64;
    let mut pos = offset;
    let type_byte = *data
        .get(pos)
        .ok_or_else(|| PackError::Truncated(format!("entry at offset {at}")))?;
    pos += 1;
    let object_type = match EntryKind::from_type_byte(type_byte) {
        Some(EntryKind::Full(ty)) => ty,
        _ if type_byte == DELTA_TYPE_BYTE => return Err(PackError::UnsupportedDelta(at)),
        _ => {
            return Err(PackError::CorruptEntry {
                offset: at,
                reason: format!("unknown type byte: {type_byte}"),
            })
        }
    };

    let (uncompressed_size, consumed) = decode_varint(&data[pos..])?;
    pos += consumed;
    let (compressed_size, consumed) = decode_varint(&data[pos..])?;
    pos += consumed;

    let end = pos.saturating_add(compressed_size as usize);
    if end > data.len() {
        return Err(PackError::Truncated(format!("payload at offset {at}")));
    }
    let compressed = &data[pos..end];
    let object = zstd::decode_all(compressed).map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
    if object.len() as u64 != uncompressed_size {
        return Err(PackError::CorruptEntry {
            offset: at,
            reason: format!("size mismatch: expected {uncompressed_size}, got {}", object.len()),
        });
    }

    let id = ObjectId::hash_object(object_type, &object);
    Ok(((id, crc32fast::hash(compressed), at), end))
}
