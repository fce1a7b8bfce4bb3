//! The ref-mirroring document.
//!
//! A snapshot is a JSON object keyed by ref name. Each value is either
//! `{ "symbolic": <name>, "target": <ref name> }` or
//! `{ "name": <name>, "target": <object id hex> }`. The whole document is
//! stored as a single blob, independent of the object primitives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stratus_types::ObjectId;

use crate::error::{RefError, Result};
use crate::traits::RefStore;
use crate::types::Ref;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum SnapshotEntry {
    Symbolic { symbolic: String, target: String },
    Direct { name: String, target: ObjectId },
}

impl SnapshotEntry {
    fn name(&self) -> &str {
        match self {
            Self::Symbolic { symbolic, .. } => symbolic,
            Self::Direct { name, .. } => name,
        }
    }

    fn into_ref(self) -> Ref {
        match self {
            Self::Symbolic { symbolic, target } => Ref::symbolic(symbolic, target),
            Self::Direct { name, target } => Ref::direct(name, target),
        }
    }
}

impl From<&Ref> for SnapshotEntry {
    fn from(reference: &Ref) -> Self {
        match reference {
            Ref::Direct { name, target } => Self::Direct {
                name: name.clone(),
                target: *target,
            },
            Ref::Symbolic { name, target } => Self::Symbolic {
                symbolic: name.clone(),
                target: target.clone(),
            },
        }
    }
}

/// A point-in-time copy of every ref in a [`RefStore`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefSnapshot {
    entries: BTreeMap<String, SnapshotEntry>,
}

impl RefSnapshot {
    /// Copy every ref out of `store`.
    pub fn capture(store: &dyn RefStore) -> Result<Self> {
        let entries = store
            .list_refs("")?
            .iter()
            .map(|r| (r.name().to_string(), SnapshotEntry::from(r)))
            .collect();
        Ok(Self { entries })
    }

    /// Write every ref in the snapshot into `store`, returning how many were written.
    ///
    /// Refs already in `store` but absent from the snapshot are left alone.
    pub fn restore(&self, store: &dyn RefStore) -> Result<usize> {
        for reference in self.refs() {
            store.write_ref(&reference)?;
        }
        tracing::debug!(refs = self.entries.len(), "restored ref snapshot");
        Ok(self.entries.len())
    }

    /// The refs in name order.
    pub fn refs(&self) -> Vec<Ref> {
        self.entries.values().cloned().map(SnapshotEntry::into_ref).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.entries).map_err(|e| RefError::Serialization(e.to_string()))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let entries: BTreeMap<String, SnapshotEntry> =
            serde_json::from_slice(data).map_err(|e| RefError::Serialization(e.to_string()))?;
        if let Some((key, entry)) = entries.iter().find(|(key, entry)| entry.name() != key.as_str()) {
            return Err(RefError::Serialization(format!(
                "entry {key:?} names a different ref: {:?}",
                entry.name()
            )));
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRefStore;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_hash([byte; 32])
    }

    fn populated() -> InMemoryRefStore {
        let store = InMemoryRefStore::new();
        store.write_ref(&Ref::direct("refs/heads/main", id(1))).unwrap();
        store.write_ref(&Ref::direct("refs/tags/v1", id(2))).unwrap();
        store.write_ref(&Ref::symbolic("HEAD", "refs/heads/main")).unwrap();
        store
    }

    #[test]
    fn json_shape_matches_document_format() {
        let snapshot = RefSnapshot::capture(&populated()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&snapshot.to_json().unwrap()).unwrap();

        assert_eq!(value["HEAD"]["symbolic"], "HEAD");
        assert_eq!(value["HEAD"]["target"], "refs/heads/main");
        assert_eq!(value["refs/heads/main"]["name"], "refs/heads/main");
        assert_eq!(value["refs/heads/main"]["target"], id(1).to_hex());
    }

    #[test]
    fn capture_then_restore_into_empty_store() {
        let snapshot = RefSnapshot::capture(&populated()).unwrap();
        let parsed = RefSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);

        let target = InMemoryRefStore::new();
        assert_eq!(parsed.restore(&target).unwrap(), 3);
        assert_eq!(target.resolve("HEAD").unwrap(), id(1));
        assert_eq!(target.resolve("refs/tags/v1").unwrap(), id(2));
    }

    #[test]
    fn restore_keeps_unrelated_refs() {
        let snapshot = RefSnapshot::capture(&populated()).unwrap();
        let target = InMemoryRefStore::new();
        target.write_ref(&Ref::direct("refs/heads/local", id(9))).unwrap();
        snapshot.restore(&target).unwrap();
        assert_eq!(target.len(), 4);
    }

    #[test]
    fn empty_store_gives_empty_document() {
        let snapshot = RefSnapshot::capture(&InMemoryRefStore::new()).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(RefSnapshot::from_json(b"{}").unwrap().len(), 0);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            RefSnapshot::from_json(b"not json").unwrap_err(),
            RefError::Serialization(_)
        ));
        assert!(RefSnapshot::from_json(br#"{"refs/heads/x": {"name": "refs/heads/x", "target": "zz"}}"#).is_err());
        assert!(RefSnapshot::from_json(br#"{"refs/heads/x": {"symbolic": "refs/heads/y", "target": "HEAD"}}"#).is_err());
    }

    #[test]
    fn restore_rejects_invalid_names() {
        let doc = br#"{"bad name": {"symbolic": "bad name", "target": "HEAD"}}"#;
        let snapshot = RefSnapshot::from_json(doc).unwrap();
        let err = snapshot.restore(&InMemoryRefStore::new()).unwrap_err();
        assert!(matches!(err, RefError::InvalidName { .. }));
    }
}
