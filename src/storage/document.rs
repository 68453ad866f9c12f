//! File-per-player document store.
//!
//! Each player owns one document at `<root>/<player>.<ext>` mapping vault
//! numbers (as string keys) to the base64 of the encoded contents:
//!
//! ```json
//! { "1": "eJzj...", "3": "eJzj..." }
//! ```
//!
//! Updates are read-modify-write of the whole document, so they are serialized
//! per player and land through a temporary file renamed over the original.

use crate::core::error::{BackendError, SerializationError};
use crate::storage::{DeleteOutcome, VaultBackend};
use crate::types::VaultKey;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Vault number (as a string) to base64 contents for one player
pub type PlayerDocument = BTreeMap<String, String>;

/// Serialization format of player documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

impl DocumentFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Json => "json",
            DocumentFormat::Yaml => "yml",
        }
    }

    /// Parse a document of arbitrary shape
    pub fn parse<T: serde::de::DeserializeOwned>(&self, text: &str) -> Result<T, String> {
        match self {
            DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        }
    }

    /// Render a document of arbitrary shape
    pub fn render<T: serde::Serialize>(&self, value: &T) -> Result<String, String> {
        match self {
            DocumentFormat::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
            DocumentFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        }
    }
}

/// Document backend rooted at a directory
pub struct DocumentStore {
    root: PathBuf,
    format: DocumentFormat,
    /// Serializes read-modify-write cycles on one player's file. Entries only
    /// live while some operation on that player is running.
    player_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DocumentStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>, format: DocumentFormat) -> Result<Self, BackendError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), format = format.extension(), "document store opened");
        Ok(Self {
            root,
            format,
            player_locks: DashMap::new(),
        })
    }

    /// Directory holding the player documents
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Document format in use
    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    /// Location of one player's document
    pub fn path_for(&self, player: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", player, self.format.extension()))
    }

    /// Run `f` while holding `player`'s file lock
    fn with_player_lock<T>(
        &self,
        player: &str,
        f: impl FnOnce() -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let lock = self
            .player_locks
            .entry(player.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        // the map's own reference is the last one once nobody else waits
        self.player_locks
            .remove_if(player, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    fn load(&self, path: &Path) -> Result<Option<PlayerDocument>, BackendError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.format
            .parse(&text)
            .map(Some)
            .map_err(|reason| BackendError::document(path, reason))
    }

    fn store(&self, path: &Path, document: &PlayerDocument) -> Result<(), BackendError> {
        let text = self
            .format
            .render(document)
            .map_err(|reason| BackendError::document(path, reason))?;
        write_atomic(&self.root, path, text.as_bytes())
    }
}

/// Write `bytes` to `path` via a temporary file in `dir`, so readers see
/// either the old or the new contents
pub(crate) fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), BackendError> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl VaultBackend for DocumentStore {
    fn name(&self) -> &'static str {
        self.format.extension()
    }

    fn read(&self, key: &VaultKey) -> Result<Option<Vec<u8>>, BackendError> {
        let path = self.path_for(key.player());
        self.with_player_lock(key.player(), || {
            let Some(document) = self.load(&path)? else {
                return Ok(None);
            };
            let Some(encoded) = document.get(&key.number().to_string()) else {
                return Ok(None);
            };
            match STANDARD.decode(encoded) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), vault = key.number(), error = %e, "invalid base64 in player document");
                    Err(SerializationError::from(e).into())
                }
            }
        })
    }

    fn write(&self, key: &VaultKey, contents: &[u8]) -> Result<(), BackendError> {
        let path = self.path_for(key.player());
        self.with_player_lock(key.player(), || {
            let mut document = self.load(&path)?.unwrap_or_default();
            document.insert(key.number().to_string(), STANDARD.encode(contents));
            self.store(&path, &document)
        })
    }

    fn delete(&self, key: &VaultKey) -> Result<DeleteOutcome, BackendError> {
        let path = self.path_for(key.player());
        self.with_player_lock(key.player(), || {
            let Some(mut document) = self.load(&path)? else {
                return Ok(DeleteOutcome::NotFound);
            };
            if document.remove(&key.number().to_string()).is_none() {
                return Ok(DeleteOutcome::NotFound);
            }
            if document.is_empty() {
                std::fs::remove_file(&path)?;
            } else {
                self.store(&path, &document)?;
            }
            Ok(DeleteOutcome::Deleted)
        })
    }
}
