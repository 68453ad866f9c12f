//! SQLite-backed vault storage.
//!
//! Schema:
//! - vaults: (player TEXT, vault_number INTEGER, contents_blob BLOB),
//!   primary key (player, vault_number)
//!
//! Writes are upserts. The connection sits behind a mutex; SQLite serializes
//! writers anyway and each worker holds it only for a single statement.

use crate::core::error::BackendError;
use crate::storage::{DeleteOutcome, VaultBackend};
use crate::types::VaultKey;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS vaults (
    player TEXT NOT NULL,
    vault_number INTEGER NOT NULL,
    contents_blob BLOB NOT NULL,
    PRIMARY KEY (player, vault_number)
)";

/// SQLite vault backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Create or open a database at the given path.
    ///
    /// Configures WAL mode and creates the schema if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute(SCHEMA, [])?;

        tracing::info!(path = %path.display(), journal_mode = %mode, "sqlite vault store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of stored vaults
    pub fn vault_count(&self) -> Result<u64, BackendError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vaults", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

impl VaultBackend for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn read(&self, key: &VaultKey) -> Result<Option<Vec<u8>>, BackendError> {
        let conn = self.conn.lock();
        let contents = conn
            .query_row(
                "SELECT contents_blob FROM vaults WHERE player = ?1 AND vault_number = ?2",
                params![key.player(), key.number()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(contents)
    }

    fn write(&self, key: &VaultKey, contents: &[u8]) -> Result<(), BackendError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO vaults (player, vault_number, contents_blob) VALUES (?1, ?2, ?3)
             ON CONFLICT(player, vault_number) DO UPDATE SET contents_blob = excluded.contents_blob",
            params![key.player(), key.number(), contents],
        )?;
        Ok(())
    }

    fn delete(&self, key: &VaultKey) -> Result<DeleteOutcome, BackendError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM vaults WHERE player = ?1 AND vault_number = ?2",
            params![key.player(), key.number()],
        )?;
        Ok(if removed == 0 {
            DeleteOutcome::NotFound
        } else {
            DeleteOutcome::Deleted
        })
    }
}
