//! A fully decoded dataset: every record store of one persisted file

use crate::error::StoreError;
use crate::kind::RecordKind;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decoded dataset, keyed by record kind
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Format version reported by the codec
    version: String,
    /// Stores present in the file
    stores: BTreeMap<RecordKind, RecordStore>,
}

impl Dataset {
    /// Create dataset without stores
    #[inline]
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            stores: BTreeMap::new(),
        }
    }

    /// Builder-style store insertion
    #[inline]
    #[must_use]
    pub fn with_store(mut self, kind: RecordKind, store: RecordStore) -> Self {
        self.stores.insert(kind, store);
        self
    }

    /// Insert or replace a store
    #[inline]
    pub fn insert_store(&mut self, kind: RecordKind, store: RecordStore) -> Option<RecordStore> {
        self.stores.insert(kind, store)
    }

    /// Format version
    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Check whether a store of this kind is present
    #[inline]
    #[must_use]
    pub fn has(&self, kind: RecordKind) -> bool {
        self.stores.contains_key(&kind)
    }

    /// Store of one kind
    ///
    /// # Errors
    /// Returns [`StoreError::MissingStore`] if the dataset has no such store
    #[inline]
    pub fn store(&self, kind: RecordKind) -> Result<&RecordStore, StoreError> {
        self.stores.get(&kind).ok_or(StoreError::MissingStore(kind))
    }

    /// Mutable store of one kind
    ///
    /// # Errors
    /// Returns [`StoreError::MissingStore`] if the dataset has no such store
    #[inline]
    pub fn store_mut(&mut self, kind: RecordKind) -> Result<&mut RecordStore, StoreError> {
        self.stores.get_mut(&kind).ok_or(StoreError::MissingStore(kind))
    }

    /// Iterate stores in kind order
    pub fn stores(&self) -> impl Iterator<Item = (RecordKind, &RecordStore)> {
        self.stores.iter().map(|(k, s)| (*k, s))
    }

    /// Verify every store has parallel realms
    ///
    /// # Errors
    /// Returns the first ragged store's error
    pub fn check_parallel(&self) -> Result<(), StoreError> {
        for (kind, store) in &self.stores {
            store.check_parallel().map_err(|e| {
                tracing::debug!("Store {} failed realm check: {}", kind, e);
                e
            })?;
        }
        Ok(())
    }
}
