//! Player Vaults - persistent per-player item storage
//!
//! Each player owns numbered vaults of item slots. The crate keeps every vault
//! exclusively owned by one operation at a time, runs all storage I/O on a
//! blocking worker pool, and persists contents through a pluggable backend
//! (JSON or YAML documents, or SQLite).
#![warn(missing_docs)]

// Core foundational modules
pub mod core;
pub mod types;

// Main functional modules
pub mod codec;
pub mod storage;
pub mod system;
pub mod vault;

// Re-export commonly used items for convenience
pub use crate::core::logging::init_logging;
pub use crate::core::{BackendKind, Config, Error, Result};
pub use codec::ItemCodec;
pub use storage::{create_backend, migrate_legacy, SharedBackend, VaultBackend};
pub use types::{ItemSlot, VaultKey, VaultRecord};
pub use vault::{LockToken, Pending, VaultCoordinator, VaultHandle, VaultService};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Build a coordinator from configuration on the current runtime.
///
/// Runs the legacy migration first when it is enabled.
pub fn build_coordinator(config: &Config) -> Result<VaultCoordinator> {
    tracing::info!("Initializing {} v{}", NAME, VERSION);

    if config.storage.migrate_legacy {
        migrate_legacy(&config.storage.data_dir)?;
    }

    let backend = create_backend(&config.storage)?;
    let codec = ItemCodec::from_config(&config.storage);
    VaultCoordinator::new(backend, codec, &config.vaults)
}
