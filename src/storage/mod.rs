//! Storage layer for Player Vaults
//!
//! This module provides the backend abstraction that performs durable vault
//! I/O. Backends deal in encoded bytes only; the coordinator owns encoding and
//! decoding. Every backend reports "no data for this key" as a value distinct
//! from an I/O failure.
//!
//! Backend calls block, and are always issued from the blocking worker pool.

use crate::core::error::BackendError;
use crate::types::VaultKey;
use std::sync::Arc;

/// File-per-player document backends (JSON and YAML)
pub mod document;

/// SQLite backend
pub mod sqlite;

/// In-memory backend
pub mod memory;

/// Backend construction from configuration
pub mod factory;

/// One-time migration of legacy single-file data
pub mod migration;

pub use document::{DocumentFormat, DocumentStore};
pub use factory::create_backend;
pub use memory::MemoryStore;
pub use migration::{migrate_legacy, MigrationReport};
pub use sqlite::SqliteStore;

/// Result of a delete against a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Stored data existed and was removed
    Deleted,
    /// Nothing was stored for the key
    NotFound,
}

/// Durable storage for encoded vault contents
pub trait VaultBackend: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Read the encoded contents of a vault; `None` if nothing is stored
    fn read(&self, key: &VaultKey) -> Result<Option<Vec<u8>>, BackendError>;

    /// Replace the encoded contents of a vault
    fn write(&self, key: &VaultKey, contents: &[u8]) -> Result<(), BackendError>;

    /// Remove a vault
    fn delete(&self, key: &VaultKey) -> Result<DeleteOutcome, BackendError>;
}

/// Backend handle shared between the coordinator and its workers
pub type SharedBackend = Arc<dyn VaultBackend>;
