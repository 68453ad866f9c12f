//! Type definitions for Player Vaults
//!
//! This module contains the data model shared by the codec, the storage
//! backends and the coordinator.

/// Vault identity and in-memory vault contents
pub mod vault;
/// Item slot records
pub mod item;

// Re-export commonly used types for convenience
pub use item::ItemSlot;
pub use vault::{VaultKey, VaultRecord, DEFAULT_VAULT_CAPACITY, MAX_PLAYER_NAME_LEN};
