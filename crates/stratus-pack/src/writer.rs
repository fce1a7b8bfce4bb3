use std::path::{Path, PathBuf};

use stratus_types::{ObjectId, ObjectType, PackId};

use crate::entry::{EntryKind, PackEntry};
use crate::error::{PackError, PackResult};
use crate::index::PackIndex;

pub(crate) const PACK_MAGIC: &[u8; 4] = b"STRP";
pub(crate) const PACK_VERSION: u32 = 1;
pub(crate) const PACK_HEADER_LEN: usize = 12;

/// A pack/index pair on local disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackFile {
    pub pack_id: PackId,
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    pub object_count: usize,
}

impl PackFile {
    /// File names for a pack id inside `dir`: `pack-<id>.pack` / `pack-<id>.idx`.
    pub fn paths_in(dir: &Path, pack_id: &PackId) -> (PathBuf, PathBuf) {
        let base = dir.join(format!("pack-{}", pack_id.to_hex()));
        (base.with_extension("pack"), base.with_extension("idx"))
    }
}

/// Builds a pack file from a collection of objects.
#[derive(Debug, Default)]
pub struct PackWriter {
    entries: Vec<PackEntry>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an object and return the id it will be indexed under.
    pub fn add_object(&mut self, ty: ObjectType, data: &[u8]) -> ObjectId {
        let id = ObjectId::hash_object(ty, data);
        self.entries.push(PackEntry {
            id,
            kind: EntryKind::Full(ty),
            data: data.to_vec(),
        });
        id
    }

    /// Number of objects queued.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the pack and index into `dir` as `pack-<id>.pack` / `pack-<id>.idx`.
    pub fn finish(self, dir: &Path) -> PackResult<PackFile> {
        let (pack_data, index) = self.build_pack_bytes()?;
        let (pack_path, index_path) = PackFile::paths_in(dir, &index.pack_id);

        std::fs::write(&pack_path, &pack_data)?;
        std::fs::write(&index_path, index.to_bytes())?;

        Ok(PackFile {
            pack_id: index.pack_id,
            pack_path,
            index_path,
            object_count: index.object_count(),
        })
    }

    /// Build pack bytes and index in memory (no disk I/O).
    pub fn finish_to_bytes(self) -> PackResult<(Vec<u8>, PackIndex)> {
        self.build_pack_bytes()
    }

    fn build_pack_bytes(self) -> PackResult<(Vec<u8>, PackIndex)> {
        let mut pack_data = Vec::new();
        let mut index_entries = Vec::with_capacity(self.entries.len());

        // Header: magic + version + object count
        pack_data.extend_from_slice(PACK_MAGIC);
        pack_data.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack_data.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for entry in &self.entries {
            let offset = pack_data.len() as u64;

            pack_data.push(entry.kind.type_byte());

            let compressed = zstd::encode_all(entry.data.as_slice(), 3)
                .map_err(|e| PackError::CompressionFailed(e.to_string()))?;

            encode_varint(&mut pack_data, entry.data.len() as u64);
            encode_varint(&mut pack_data, compressed.len() as u64);

            if let EntryKind::Delta { base } = &entry.kind {
                pack_data.extend_from_slice(base.as_bytes());
            }

            let crc = crc32fast::hash(&compressed);
            pack_data.extend_from_slice(&compressed);

            index_entries.push((entry.id, crc, offset));
        }

        // Trailer: checksum of everything so far, which is also the pack id
        let pack_id = PackId::checksum(&pack_data);
        pack_data.extend_from_slice(pack_id.as_bytes());

        let index = PackIndex::build(index_entries, pack_id);
        Ok((pack_data, index))
    }
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
///
/// Running out of input is reported as [`PackError::Truncated`] so that
/// stream indexing can tell "need more bytes" from corruption.
pub(crate) fn decode_varint(data: &[u8]) -> PackResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "varint overflow".into(),
            });
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(PackError::Truncated("varint".into()))
}
