use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;
use stratus_types::{ObjectHeader, ObjectId, PackId, DIGEST_LEN};

use crate::entry::{EntryKind, DELTA_TYPE_BYTE};
use crate::error::{PackError, PackResult};
use crate::index::{be_u32, PackIndex};
use crate::writer::{decode_varint, PACK_HEADER_LEN, PACK_MAGIC, PACK_VERSION};

/// An object read out of a pack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedObject {
    pub id: ObjectId,
    pub header: ObjectHeader,
    pub data: Vec<u8>,
}

#[derive(Debug)]
enum PackData {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for PackData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Owned(bytes) => bytes,
            Self::Mapped(map) => map,
        }
    }
}

/// Location of an entry's compressed payload, parsed from its prefix.
struct EntryPrefix {
    kind: EntryKind,
    uncompressed_size: u64,
    payload_start: usize,
    payload_end: usize,
}

/// Reads objects from a pack file using an index for random access.
#[derive(Debug)]
pub struct PackReader {
    pack_data: PackData,
    index: PackIndex,
}

impl PackReader {
    /// Open from raw bytes.
    pub fn from_bytes(pack_data: Vec<u8>, index: PackIndex) -> PackResult<Self> {
        Self::validate(&pack_data)?;
        Ok(Self {
            pack_data: PackData::Owned(pack_data),
            index,
        })
    }

    /// Open a pack from disk, memory-mapping the pack body.
    pub fn open(pack_path: &Path, index_path: &Path) -> PackResult<Self> {
        let index = PackIndex::open(index_path)?;
        let file = File::open(pack_path)?;
        // SAFETY: cached packs are written once and never modified in place.
        let map = unsafe { Mmap::map(&file)? };
        Self::validate(&map)?;
        Ok(Self {
            pack_data: PackData::Mapped(map),
            index,
        })
    }

    fn validate(data: &[u8]) -> PackResult<()> {
        if data.len() < PACK_HEADER_LEN + DIGEST_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "pack data too short".into(),
            });
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
        Ok(())
    }

    /// Recompute the pack checksum and compare it with the index.
    pub fn verify_checksum(&self) -> PackResult<()> {
        let body = &self.pack_data[..self.pack_data.len() - DIGEST_LEN];
        let actual = PackId::checksum(body);
        if actual != self.index.pack_id {
            return Err(PackError::ChecksumMismatch {
                expected: self.index.pack_id,
                actual,
            });
        }
        Ok(())
    }

    /// Read an object by ID.
    pub fn read_object(&self, id: &ObjectId) -> PackResult<Option<PackedObject>> {
        let (offset, expected_crc) = match self.index.lookup(id) {
            Some(v) => v,
            None => return Ok(None),
        };
        let prefix = self.parse_prefix(offset)?;
        let compressed = &self.pack_data[prefix.payload_start..prefix.payload_end];

        if crc32fast::hash(compressed) != expected_crc {
            return Err(PackError::CrcMismatch { id: *id });
        }

        let data = zstd::decode_all(compressed)
            .map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        if data.len() as u64 != prefix.uncompressed_size {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!(
                    "size mismatch: expected {}, got {}",
                    prefix.uncompressed_size,
                    data.len()
                ),
            });
        }

        let object_type = full_type(prefix.kind, offset)?;
        Ok(Some(PackedObject {
            id: *id,
            header: ObjectHeader::new(object_type, prefix.uncompressed_size),
            data,
        }))
    }

    /// Read only an object's type and length.
    ///
    /// Parses the entry prefix; the compressed payload is never touched.
    pub fn read_header(&self, id: &ObjectId) -> PackResult<Option<ObjectHeader>> {
        let offset = match self.index.lookup(id) {
            Some((offset, _)) => offset,
            None => return Ok(None),
        };
        let prefix = self.parse_prefix(offset)?;
        let object_type = full_type(prefix.kind, offset)?;
        Ok(Some(ObjectHeader::new(object_type, prefix.uncompressed_size)))
    }

    /// Check containment.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    /// Object count.
    pub fn object_count(&self) -> usize {
        self.index.object_count()
    }

    /// Access the index.
    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// List all object IDs.
    pub fn object_ids(&self) -> &[ObjectId] {
        self.index.object_ids()
    }

    fn parse_prefix(&self, offset: u64) -> PackResult<EntryPrefix> {
        let data = &self.pack_data[..self.pack_data.len() - DIGEST_LEN];
        let mut pos = offset as usize;
        if pos < PACK_HEADER_LEN || pos >= data.len() {
            return Err(PackError::CorruptEntry {
                offset,
                reason: "offset outside pack body".into(),
            });
        }

        let type_byte = data[pos];
        pos += 1;
        let kind = match EntryKind::from_type_byte(type_byte) {
            Some(kind) => kind,
            None if type_byte == DELTA_TYPE_BYTE => return Err(PackError::UnsupportedDelta(offset)),
            None => {
                return Err(PackError::CorruptEntry {
                    offset,
                    reason: format!("unknown type byte: {type_byte}"),
                })
            }
        };

        let (uncompressed_size, consumed) = decode_varint(&data[pos..]).map_err(|e| at(offset, e))?;
        pos += consumed;
        let (compressed_size, consumed) = decode_varint(&data[pos..]).map_err(|e| at(offset, e))?;
        pos += consumed;

        let end = pos.checked_add(compressed_size as usize).filter(|&end| end <= data.len());
        match end {
            Some(payload_end) => Ok(EntryPrefix {
                kind,
                uncompressed_size,
                payload_start: pos,
                payload_end,
            }),
            None => Err(PackError::CorruptEntry {
                offset,
                reason: "compressed data extends beyond pack".into(),
            }),
        }
    }
}

fn full_type(kind: EntryKind, offset: u64) -> PackResult<stratus_types::ObjectType> {
    match kind {
        EntryKind::Full(ty) => Ok(ty),
        EntryKind::Delta { .. } => Err(PackError::UnsupportedDelta(offset)),
    }
}

/// Inside a complete pack, running out of bytes is corruption, not truncation.
fn at(offset: u64, err: PackError) -> PackError {
    match err {
        PackError::Truncated(what) => PackError::CorruptEntry {
            offset,
            reason: format!("truncated {what}"),
        },
        PackError::CorruptEntry { reason, .. } => PackError::CorruptEntry { offset, reason },
        other => other,
    }
}
