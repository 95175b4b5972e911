//! Codec boundary
//!
//! The binary format codec is an external collaborator; the engine only
//! needs something that turns a path into a [`Dataset`] and back.
//! [`JsonCodec`] is the interchange codec shipped with the workspace.

use crate::dataset::Dataset;
use crate::error::StoreError;
use std::fs;
use std::path::Path;

/// Decode / encode a persisted dataset
pub trait StoreCodec {
    /// Read and fully decode a dataset
    ///
    /// # Errors
    /// Returns error if the file cannot be read or decoded
    fn decode(&self, path: &Path) -> Result<Dataset, StoreError>;

    /// Encode and write a dataset
    ///
    /// # Errors
    /// Returns error if the dataset cannot be written
    fn encode(&self, dataset: &Dataset, path: &Path) -> Result<(), StoreError>;
}

/// JSON interchange codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Compact output
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indented output
    #[inline]
    #[must_use]
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Decode from an in-memory string
    ///
    /// # Errors
    /// Returns error on invalid JSON or ragged realms
    pub fn decode_str(&self, text: &str) -> Result<Dataset, StoreError> {
        let dataset: Dataset = serde_json::from_str(text)?;
        dataset.check_parallel()?;
        Ok(dataset)
    }

    /// Encode to an in-memory string
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn encode_string(&self, dataset: &Dataset) -> Result<String, StoreError> {
        let text = if self.pretty {
            serde_json::to_string_pretty(dataset)?
        } else {
            serde_json::to_string(dataset)?
        };
        Ok(text)
    }
}

impl StoreCodec for JsonCodec {
    fn decode(&self, path: &Path) -> Result<Dataset, StoreError> {
        let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = self.decode_str(&text)?;
        tracing::debug!(
            "Decoded {} ({} stores, version {})",
            path.display(),
            dataset.stores().count(),
            dataset.version()
        );
        Ok(dataset)
    }

    fn encode(&self, dataset: &Dataset, path: &Path) -> Result<(), StoreError> {
        let text = self.encode_string(dataset)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, text).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
