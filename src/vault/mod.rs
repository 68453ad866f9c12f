//! Vault coordination
//!
//! The coordinator enforces that at most one operation owns a vault at a time
//! and moves all storage I/O off the calling thread. The service wraps it in
//! a tokio task for async hosts.

/// Per-vault lock table and tokens
pub mod lock;

/// Lock-aware dispatch of vault I/O
pub mod coordinator;

/// Task-based front end
pub mod service;

pub use coordinator::{Pending, VaultCoordinator};
pub use lock::{LockTable, LockToken, DELETE_HOLDER, SAVE_HOLDER};
pub use service::{VaultHandle, VaultService};
