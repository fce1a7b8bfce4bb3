use std::path::Path;

use stratus_types::{ObjectId, PackId, DIGEST_LEN};

use crate::error::{PackError, PackResult};

pub(crate) const INDEX_MAGIC: &[u8; 4] = b"STRI";
pub(crate) const INDEX_VERSION: u32 = 1;

/// Pack index for fast random-access lookups.
///
/// Layout mirrors git's pack index v2:
/// - Fan-out table: 256 entries counting objects with first byte <= index
/// - Sorted ObjectId array
/// - CRC32 array (parallel)
/// - Offset array (parallel)
/// - Pack id (checksum of the pack body)
#[derive(Clone, Debug)]
pub struct PackIndex {
    pub fan_out: [u32; 256],
    pub object_ids: Vec<ObjectId>,
    pub crc32s: Vec<u32>,
    pub offsets: Vec<u64>,
    pub pack_id: PackId,
}

impl PackIndex {
    /// Build an index from (id, crc32, offset) entries and the pack id.
    pub fn build(mut entries: Vec<(ObjectId, u32, u64)>, pack_id: PackId) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);

        let mut fan_out = [0u32; 256];
        let mut object_ids = Vec::with_capacity(entries.len());
        let mut crc32s = Vec::with_capacity(entries.len());
        let mut offsets = Vec::with_capacity(entries.len());

        for (id, crc, offset) in &entries {
            fan_out[id.as_bytes()[0] as usize] += 1;
            object_ids.push(*id);
            crc32s.push(*crc);
            offsets.push(*offset);
        }

        // Prefix sums: fan_out[i] = count of objects with first byte <= i
        for slot in 1..256 {
            fan_out[slot] += fan_out[slot - 1];
        }

        Self {
            fan_out,
            object_ids,
            crc32s,
            offsets,
            pack_id,
        }
    }

    /// Look up an object's (offset, crc32) by ID.
    pub fn lookup(&self, id: &ObjectId) -> Option<(u64, u32)> {
        let first_byte = id.as_bytes()[0] as usize;
        let start = if first_byte == 0 {
            0
        } else {
            self.fan_out[first_byte - 1] as usize
        };
        let end = self.fan_out[first_byte] as usize;

        let range = self.object_ids.get(start..end)?;
        match range.binary_search(id) {
            Ok(pos) => {
                let idx = start + pos;
                Some((self.offsets[idx], self.crc32s[idx]))
            }
            Err(_) => None,
        }
    }

    /// Total object count.
    pub fn object_count(&self) -> usize {
        self.object_ids.len()
    }

    /// Check if an object exists.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    /// All object ids, sorted.
    pub fn object_ids(&self) -> &[ObjectId] {
        &self.object_ids
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.object_ids.len();
        let mut buf = Vec::with_capacity(8 + 256 * 4 + count * (DIGEST_LEN + 12) + DIGEST_LEN);
        buf.extend_from_slice(INDEX_MAGIC);
        buf.extend_from_slice(&INDEX_VERSION.to_be_bytes());
        for &count in &self.fan_out {
            buf.extend_from_slice(&count.to_be_bytes());
        }
        for id in &self.object_ids {
            buf.extend_from_slice(id.as_bytes());
        }
        for &crc in &self.crc32s {
            buf.extend_from_slice(&crc.to_be_bytes());
        }
        for &offset in &self.offsets {
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        buf.extend_from_slice(self.pack_id.as_bytes());
        buf
    }

    /// Read and parse an index file.
    pub fn open(path: &Path) -> PackResult<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(data: &[u8]) -> PackResult<Self> {
        if data.len() < 8 {
            return Err(PackError::IndexCorrupted("too short".into()));
        }
        if &data[0..4] != INDEX_MAGIC {
            return Err(PackError::InvalidMagic {
                expected: "STRI".into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = be_u32(&data[4..8]);
        if version != INDEX_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let mut pos = 8;
        if data.len() < pos + 256 * 4 {
            return Err(PackError::IndexCorrupted("fan-out truncated".into()));
        }
        let mut fan_out = [0u32; 256];
        for entry in &mut fan_out {
            *entry = be_u32(&data[pos..pos + 4]);
            pos += 4;
        }
        if fan_out.windows(2).any(|w| w[0] > w[1]) {
            return Err(PackError::IndexCorrupted("fan-out not monotonic".into()));
        }

        let count = fan_out[255] as usize;
        let needed = pos + count * DIGEST_LEN + count * 4 + count * 8 + DIGEST_LEN;
        if data.len() < needed {
            return Err(PackError::IndexCorrupted("data truncated".into()));
        }

        let mut object_ids = Vec::with_capacity(count);
        for _ in 0..count {
            let mut hash = [0u8; DIGEST_LEN];
            hash.copy_from_slice(&data[pos..pos + DIGEST_LEN]);
            object_ids.push(ObjectId::from_hash(hash));
            pos += DIGEST_LEN;
        }

        let mut crc32s = Vec::with_capacity(count);
        for _ in 0..count {
            crc32s.push(be_u32(&data[pos..pos + 4]));
            pos += 4;
        }

        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(be_u64(&data[pos..pos + 8]));
            pos += 8;
        }

        let mut pack_id = [0u8; DIGEST_LEN];
        pack_id.copy_from_slice(&data[pos..pos + DIGEST_LEN]);

        Ok(Self {
            fan_out,
            object_ids,
            crc32s,
            offsets,
            pack_id: PackId::from_hash(pack_id),
        })
    }
}

/// Big-endian u32 from the first four bytes of `bytes`.
pub(crate) fn be_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

/// Big-endian u64 from the first eight bytes of `bytes`.
pub(crate) fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ids(n: usize) -> Vec<ObjectId> {
        (0..n)
            .map(|i| {
                let mut data = [0u8; 32];
                data[0] = (i % 256) as u8;
                data[1] = (i / 256) as u8;
                ObjectId::from_hash(data)
            })
            .collect()
    }

    #[test]
    fn build_empty_index() {
        let idx = PackIndex::build(vec![], PackId::null());
        assert_eq!(idx.object_count(), 0);
        assert!(idx.fan_out.iter().all(|&c| c == 0));
    }

    #[test]
    fn build_and_lookup_single() {
        let id = ObjectId::from_hash([7; 32]);
        let idx = PackIndex::build(vec![(id, 42u32, 100u64)], PackId::null());
        assert_eq!(idx.object_count(), 1);
        let (offset, crc) = idx.lookup(&id).unwrap();
        assert_eq!(offset, 100);
        assert_eq!(crc, 42);
    }

    #[test]
    fn lookup_missing_returns_none() {
        let id = ObjectId::from_hash([1; 32]);
        let idx = PackIndex::build(vec![(id, 1, 10)], PackId::null());
        assert!(idx.lookup(&ObjectId::from_hash([2; 32])).is_none());
        assert!(!idx.contains(&ObjectId::null()));
    }

    #[test]
    fn fan_out_counts_are_cumulative() {
        let ids = make_ids(300);
        let entries: Vec<_> = ids.iter().map(|id| (*id, 0, 0)).collect();
        let idx = PackIndex::build(entries, PackId::null());
        assert_eq!(idx.fan_out[255], 300);
        // ids 0..300 put two ids on first bytes 0..44, one on the rest
        assert_eq!(idx.fan_out[0], 2);
        assert_eq!(idx.fan_out[43], 88);
        for id in &ids {
            assert!(idx.contains(id));
        }
    }

    #[test]
    fn duplicate_ids_are_collapsed() {
        let id = ObjectId::from_hash([3; 32]);
        let idx = PackIndex::build(vec![(id, 1, 10), (id, 1, 50)], PackId::null());
        assert_eq!(idx.object_count(), 1);
    }

    #[test]
    fn serialization_roundtrip() {
        let ids = make_ids(5);
        let entries: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, (i * 7) as u32, (i * 50) as u64))
            .collect();
        let pack_id = PackId::from_hash([0xAB; 32]);
        let idx = PackIndex::build(entries, pack_id);

        let idx2 = PackIndex::from_bytes(&idx.to_bytes()).unwrap();
        assert_eq!(idx2.object_count(), idx.object_count());
        assert_eq!(idx2.pack_id, pack_id);
        for id in &ids {
            assert_eq!(idx.lookup(id), idx2.lookup(id));
        }
    }

    #[test]
    fn from_bytes_bad_magic() {
        let err = PackIndex::from_bytes(b"BADMxxxxxxxx").unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
    }

    #[test]
    fn from_bytes_bad_version() {
        let mut data = Vec::new();
        data.extend_from_slice(b"STRI");
        data.extend_from_slice(&99u32.to_be_bytes());
        let err = PackIndex::from_bytes(&data).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedVersion(99)));
    }

    #[test]
    fn from_bytes_truncated() {
        let err = PackIndex::from_bytes(b"STRI").unwrap_err();
        assert!(matches!(err, PackError::IndexCorrupted(_)));

        let idx = PackIndex::build(vec![(ObjectId::from_hash([9; 32]), 0, 12)], PackId::null());
        let bytes = idx.to_bytes();
        let err = PackIndex::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, PackError::IndexCorrupted(_)));
    }

    #[test]
    fn open_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack-x.idx");
        let id = ObjectId::from_hash([5; 32]);
        std::fs::write(&path, PackIndex::build(vec![(id, 9, 12)], PackId::null()).to_bytes())
            .unwrap();
        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.object_ids(), &[id]);
    }
}
