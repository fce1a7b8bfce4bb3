//! In-memory reference store for testing and ephemeral use.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{RefError, Result};
use crate::names::validate_ref_name;
use crate::traits::RefStore;
use crate::types::Ref;

/// An in-memory implementation of [`RefStore`].
///
/// All data lives in a `BTreeMap` behind a `RwLock`, so listings come out
/// sorted. Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<BTreeMap<String, Ref>>,
}

impl InMemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refs held.
    pub fn len(&self) -> usize {
        self.refs.read().map(|refs| refs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<Ref>> {
        let refs = self.refs.read().map_err(|_| RefError::LockPoisoned)?;
        Ok(refs.get(name).cloned())
    }

    fn write_ref(&self, reference: &Ref) -> Result<()> {
        validate_ref_name(reference.name())?;
        if let Ref::Symbolic { target, .. } = reference {
            validate_ref_name(target)?;
        }
        let mut refs = self.refs.write().map_err(|_| RefError::LockPoisoned)?;
        refs.insert(reference.name().to_string(), reference.clone());
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        let mut refs = self.refs.write().map_err(|_| RefError::LockPoisoned)?;
        Ok(refs.remove(name).is_some())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<Ref>> {
        let refs = self.refs.read().map_err(|_| RefError::LockPoisoned)?;
        Ok(refs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(_, r)| r.clone())
            .collect())
    }
}
