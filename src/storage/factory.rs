//! Storage factory for creating backends based on configuration

use crate::core::config::{BackendKind, StorageConfig};
use crate::core::error::{Error, Result};
use crate::storage::{DocumentFormat, DocumentStore, SharedBackend, SqliteStore};
use std::sync::Arc;

/// Create the backend selected by `config`.
///
/// The choice is made once at startup; the coordinator only ever sees the
/// `VaultBackend` capability.
pub fn create_backend(config: &StorageConfig) -> Result<SharedBackend> {
    tracing::info!(backend = %config.backend, data_dir = %config.data_dir.display(), "creating vault backend");

    let backend: SharedBackend = match document_format(config.backend) {
        Some(format) => Arc::new(open_documents(config, format)?),
        None => {
            let path = config.database_path();
            Arc::new(SqliteStore::open(&path).map_err(|e| {
                Error::config(format!(
                    "Storage initialization failed for {}: {}",
                    path.display(),
                    e
                ))
            })?)
        }
    };
    Ok(backend)
}

fn open_documents(config: &StorageConfig, format: DocumentFormat) -> Result<DocumentStore> {
    let root = config.vaults_dir();
    DocumentStore::open(&root, format).map_err(|e| {
        Error::config(format!(
            "Storage initialization failed for {}: {}",
            root.display(),
            e
        ))
    })
}

/// Document format backing `kind`, if it is a document backend
fn document_format(kind: BackendKind) -> Option<DocumentFormat> {
    match kind {
        BackendKind::Json => Some(DocumentFormat::Json),
        BackendKind::Yaml => Some(DocumentFormat::Yaml),
        BackendKind::Sqlite => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VaultKey;

    fn config_in(dir: &std::path::Path, backend: BackendKind) -> StorageConfig {
        StorageConfig {
            backend,
            data_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_document_backends_are_created_under_vaults_dir() {
        let dir = tempfile::tempdir().unwrap();
        for (kind, name) in [(BackendKind::Json, "json"), (BackendKind::Yaml, "yml")] {
            let backend = create_backend(&config_in(dir.path(), kind)).unwrap();
            assert_eq!(backend.name(), name);
        }
        assert!(dir.path().join("vaults").is_dir());
    }

    #[test]
    fn test_sqlite_backend_creation() {
        let dir = tempfile::tempdir().unwrap();
        let backend = create_backend(&config_in(dir.path(), BackendKind::Sqlite)).unwrap();
        assert_eq!(backend.name(), "sqlite");

        let key = VaultKey::new("alice", 1).unwrap();
        backend.write(&key, b"blob").unwrap();
        assert!(dir.path().join("vaults.db").exists());
    }

    #[test]
    fn test_unusable_location_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, "not a directory").unwrap();

        let result = create_backend(&config_in(&file, BackendKind::Json));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_document_format_mapping() {
        assert_eq!(document_format(BackendKind::Yaml), Some(DocumentFormat::Yaml));
        assert_eq!(document_format(BackendKind::Sqlite), None);
    }
}
