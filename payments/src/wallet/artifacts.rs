//! Storage of the wallet provider's persisted session keys.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

/// Artifact storage failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("artifact store error: {0}")]
pub struct ArtifactError(pub String);

/// Key/value storage the wallet provider keeps its sessions in.
pub trait ArtifactStore: Send + Sync {
    /// Value under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, ArtifactError>;

    /// Stores `value` under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), ArtifactError>;

    /// Removes `key`; returns whether it was present.
    fn remove(&self, key: &str) -> Result<bool, ArtifactError>;
}

/// In-process [`ArtifactStore`].
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryArtifactStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn get(&self, key: &str) -> Result<Option<String>, ArtifactError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ArtifactError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, ArtifactError> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}
