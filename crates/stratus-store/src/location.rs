//! The object location cache: what the backend knows about each object.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use stratus_types::{ObjectHeader, ObjectId, PackId};

/// A pack whose body and index are both on local disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedPack {
    pub pack_id: PackId,
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    pub cached_at: DateTime<Utc>,
}

/// Known storage state of one object.
///
/// An object with no entry in the [`LocationCache`] is unknown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectLocation {
    /// Confirmed absent remotely.
    DoesNotExist,
    /// Present remotely as a loose object; type and length not yet fetched.
    LooseRemote,
    /// Present remotely as a loose object, header known, body not fetched.
    LooseRemoteMetaKnown { header: ObjectHeader },
    /// Body cached on local disk.
    LooseCached {
        path: PathBuf,
        header: ObjectHeader,
        cached_at: DateTime<Utc>,
    },
    /// Inside a remote pack that has not been downloaded.
    PackedRemote { pack: PackId },
    /// Inside a pack cached on local disk.
    PackedCached(CachedPack),
    /// Inside a cached pack, header already read.
    PackedCachedMetaKnown { header: ObjectHeader, pack: CachedPack },
}

impl ObjectLocation {
    /// How much is known. Entries never move to a lower rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::DoesNotExist | Self::LooseRemote | Self::PackedRemote { .. } => 1,
            Self::LooseRemoteMetaKnown { .. } | Self::PackedCached(_) => 2,
            Self::LooseCached { .. } | Self::PackedCachedMetaKnown { .. } => 3,
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, Self::DoesNotExist)
    }

    /// The object's header, when already known.
    pub fn header(&self) -> Option<ObjectHeader> {
        match self {
            Self::LooseRemoteMetaKnown { header }
            | Self::LooseCached { header, .. }
            | Self::PackedCachedMetaKnown { header, .. } => Some(*header),
            _ => None,
        }
    }

    /// The local pack holding this object, if any.
    pub fn cached_pack(&self) -> Option<&CachedPack> {
        match self {
            Self::PackedCached(pack) | Self::PackedCachedMetaKnown { pack, .. } => Some(pack),
            _ => None,
        }
    }

    /// Whether a read can be served from local disk alone.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::LooseCached { .. } | Self::PackedCached(_) | Self::PackedCachedMetaKnown { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DoesNotExist => "does-not-exist",
            Self::LooseRemote => "loose-remote",
            Self::LooseRemoteMetaKnown { .. } => "loose-remote-meta-known",
            Self::LooseCached { .. } => "loose-cached",
            Self::PackedRemote { .. } => "packed-remote",
            Self::PackedCached(_) => "packed-cached",
            Self::PackedCachedMetaKnown { .. } => "packed-cached-meta-known",
        }
    }
}

/// Map from object id to [`ObjectLocation`] behind one mutex.
///
/// The lock is held for a single lookup or insert, never across I/O. Callers
/// insert only after the I/O that justifies the new state has completed.
#[derive(Debug, Default)]
pub struct LocationCache {
    entries: Mutex<HashMap<ObjectId, ObjectLocation>>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are idempotent hints, so a panic elsewhere cannot leave one half-written.
    fn entries(&self) -> MutexGuard<'_, HashMap<ObjectId, ObjectLocation>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, id: &ObjectId) -> Option<ObjectLocation> {
        self.entries().get(id).cloned()
    }

    /// Record `location` for `id` unless the cache already knows more.
    ///
    /// Equal ranks replace each other. Returns whether the entry changed.
    pub fn insert(&self, id: ObjectId, location: ObjectLocation) -> bool {
        let mut entries = self.entries();
        match entries.get(&id) {
            Some(current) if current.rank() > location.rank() => {
                tracing::trace!(
                    object = %id.short_hex(),
                    kept = current.name(),
                    offered = location.name(),
                    "ignored location downgrade"
                );
                false
            }
            _ => {
                entries.insert(id, location);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
