//! The fixed header carried by every stored blob.
//!
//! Sixteen bytes, two big-endian `u64`s: body length, then kind. Loose objects
//! use their [`ObjectType`] code as kind; packs, indexes and the ref document
//! use the reserved codes below. A header-only read is a 16-byte range fetch.

use bytes::{BufMut, Bytes, BytesMut};
use stratus_types::ObjectType;

use crate::error::{BackendError, BackendResult};
use crate::remote::ByteRange;

pub const BLOB_HEADER_LEN: usize = 16;

/// Kind code of a pack body blob.
pub const PACK_KIND: u64 = 0x100;
/// Kind code of a pack index blob.
pub const INDEX_KIND: u64 = 0x101;
/// Kind code of the ref-mirroring document.
pub const REFS_KIND: u64 = 0x102;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlobHeader {
    pub length: u64,
    pub kind: u64,
}

impl BlobHeader {
    pub fn new(length: u64, kind: u64) -> Self {
        Self { length, kind }
    }

    /// The range covering just the header.
    pub fn range() -> ByteRange {
        ByteRange::new(0, BLOB_HEADER_LEN as u64)
    }

    pub fn encode(&self) -> [u8; BLOB_HEADER_LEN] {
        let mut out = [0u8; BLOB_HEADER_LEN];
        out[..8].copy_from_slice(&self.length.to_be_bytes());
        out[8..].copy_from_slice(&self.kind.to_be_bytes());
        out
    }

    /// Parse the first 16 bytes of `data`. `None` if there are fewer.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let length = u64::from_be_bytes(data.get(..8)?.try_into().ok()?);
        let kind = u64::from_be_bytes(data.get(8..BLOB_HEADER_LEN)?.try_into().ok()?);
        Some(Self { length, kind })
    }

    /// The object type for loose-object kinds.
    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::from_code(self.kind)
    }

    /// Prefix `body` with its header.
    pub fn frame(kind: u64, body: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(BLOB_HEADER_LEN + body.len());
        buf.put_slice(&Self::new(body.len() as u64, kind).encode());
        buf.put_slice(body);
        buf.freeze()
    }

    /// Separate a fetched blob into header and body, checking the length.
    pub fn split(key: &str, payload: Bytes) -> BackendResult<(Self, Bytes)> {
        let header = Self::decode(&payload).ok_or_else(|| BackendError::CorruptBlob {
            key: key.to_string(),
            reason: format!("{} bytes is too short for a header", payload.len()),
        })?;
        let body = payload.slice(BLOB_HEADER_LEN..);
        if body.len() as u64 != header.length {
            return Err(BackendError::CorruptBlob {
                key: key.to_string(),
                reason: format!("header says {} bytes, body has {}", header.length, body.len()),
            });
        }
        Ok((header, body))
    }

    /// Like [`split`](Self::split), also requiring a specific kind.
    pub fn split_kind(key: &str, payload: Bytes, kind: u64) -> BackendResult<Bytes> {
        let (header, body) = Self::split(key, payload)?;
        if header.kind != kind {
            return Err(BackendError::CorruptBlob {
                key: key.to_string(),
                reason: format!("expected kind {kind:#x}, found {:#x}", header.kind),
            });
        }
        Ok(body)
    }
}
