//! Error types for the record store
//!
//! Covers:
//! - Out-of-bounds slot and realm access
//! - Realm shape violations
//! - Padding without a usable placeholder
//! - Codec (decode / encode) failures

use crate::kind::RecordKind;
use std::path::PathBuf;

/// Main store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Slot index beyond the realm's length
    #[error("slot {slot} out of bounds in realm {realm} (length {len})")]
    SlotOutOfBounds { realm: usize, slot: usize, len: usize },

    /// Realm index beyond the store's realm count
    #[error("realm {realm} out of bounds (store has {count} realms)")]
    RealmOutOfBounds { realm: usize, count: usize },

    /// Realms of one store disagree on length
    #[error("realm {realm} has {len} slots, expected {expected}")]
    RealmLengthMismatch { realm: usize, len: usize, expected: usize },

    /// Padding needs slot 0 as placeholder, but it is missing or empty
    #[error("cannot pad realm {realm}: slot 0 is missing or empty")]
    NoPlaceholder { realm: usize },

    /// Dataset holds no store of the requested kind
    #[error("dataset has no {0} store")]
    MissingStore(RecordKind),

    /// Reading or writing a persisted dataset failed
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted dataset is not valid interchange JSON
    #[error("invalid dataset encoding: {0}")]
    InvalidEncoding(#[from] serde_json::Error),
}

impl StoreError {
    /// Check if error comes from the persistence boundary
    #[inline]
    #[must_use]
    pub fn is_codec_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::InvalidEncoding(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::SlotOutOfBounds { realm: 1, slot: 40, len: 10 };
        assert_eq!(err.to_string(), "slot 40 out of bounds in realm 1 (length 10)");

        let err = StoreError::MissingStore(RecordKind::Effect);
        assert_eq!(err.to_string(), "dataset has no effect store");
    }

    #[test]
    fn codec_classification() {
        let io = StoreError::Io {
            path: PathBuf::from("x.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(io.is_codec_error());
        assert!(!StoreError::NoPlaceholder { realm: 0 }.is_codec_error());
    }
}
