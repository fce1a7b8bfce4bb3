//! Pack file format for Stratus.
//!
//! Packs bundle many objects into one zstd-compressed, CRC-checked file with a
//! separate fan-out index, so a single remote blob pair can carry a whole push.
//!
//! # Architecture
//!
//! - **Pack file** (`.pack`): header, concatenated compressed entries, BLAKE3 trailer
//! - **Pack index** (`.idx`): fan-out table + sorted IDs for O(log n) lookups
//! - **PackWriter**: builds packs from loose objects
//! - **PackReader**: random-access reads, including header-only reads that skip
//!   decompression
//! - **index_pack**: builds an index for a pack stream received without one

pub mod entry;
pub mod error;
pub mod index;
pub mod indexer;
pub mod reader;
pub mod writer;

pub use entry::{EntryKind, PackEntry};
pub use error::{PackError, PackResult};
pub use index::PackIndex;
pub use indexer::{index_pack, IndexedPack, PackIndexer};
pub use reader::{PackReader, PackedObject};
pub use writer::{PackFile, PackWriter};
