use stratus_types::{ObjectId, PackId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),

    #[error("pack checksum mismatch: index names {expected}, pack body hashes to {actual}")]
    ChecksumMismatch { expected: PackId, actual: PackId },

    /// The byte stream ended before a complete pack was seen.
    #[error("pack stream truncated: {0}")]
    Truncated(String),

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for object {id}")]
    CrcMismatch { id: ObjectId },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("delta entries are not supported (offset {0})")]
    UnsupportedDelta(u64),

    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PackResult<T> = Result<T, PackError>;
