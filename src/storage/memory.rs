//! Simple in-memory storage implementation using DashMap
//!
//! Nothing is persisted; useful for embedding the coordinator in tests or in
//! hosts that manage durability themselves.

use crate::core::error::BackendError;
use crate::storage::{DeleteOutcome, VaultBackend};
use crate::types::VaultKey;
use dashmap::DashMap;

/// In-memory vault backend
#[derive(Default)]
pub struct MemoryStore {
    vaults: DashMap<VaultKey, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored vaults
    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }

    /// Raw encoded contents of a vault
    pub fn get(&self, key: &VaultKey) -> Option<Vec<u8>> {
        self.vaults.get(key).map(|entry| entry.value().clone())
    }
}

impl VaultBackend for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &VaultKey) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.get(key))
    }

    fn write(&self, key: &VaultKey, contents: &[u8]) -> Result<(), BackendError> {
        self.vaults.insert(key.clone(), contents.to_vec());
        Ok(())
    }

    fn delete(&self, key: &VaultKey) -> Result<DeleteOutcome, BackendError> {
        Ok(match self.vaults.remove(key) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }
}
