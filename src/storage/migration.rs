//! One-time split of legacy single-file stores into per-player documents.
//!
//! Older deployments kept every player in `<data_dir>/vaults.json` or
//! `<data_dir>/vaults.yml`, a single document mapping player name to that
//! player's vault map. The migration writes each player to
//! `<data_dir>/vaults/<player>.<ext>` in the legacy file's own format and
//! renames the legacy file to `vaults.<ext>.bak`.

use crate::core::error::{BackendError, Result};
use crate::storage::document::{write_atomic, PlayerDocument};
use crate::storage::DocumentFormat;
use crate::types::VaultKey;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Legacy files, in the order they are looked for
const LEGACY_FORMATS: [DocumentFormat; 2] = [DocumentFormat::Json, DocumentFormat::Yaml];

/// Outcome of a migration run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Players written to their own document
    pub migrated: usize,
    /// Players whose document already existed and was left untouched
    pub skipped: usize,
    /// Legacy entries that were not migrated: invalid player names, and
    /// names that collide with an earlier entry once normalized
    pub rejected: Vec<String>,
    /// Where each migrated legacy file was moved
    pub backups: Vec<PathBuf>,
}

impl MigrationReport {
    /// True if no legacy file was found
    pub fn is_noop(&self) -> bool {
        self.backups.is_empty()
    }
}

/// Migrate `<data_dir>/vaults.json` and `<data_dir>/vaults.yml` into
/// per-player documents.
///
/// Safe to call on every startup: without a legacy file this does nothing.
pub fn migrate_legacy(data_dir: &Path) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();
    for format in LEGACY_FORMATS {
        migrate_file(data_dir, format, &mut report)?;
    }
    Ok(report)
}

fn migrate_file(data_dir: &Path, format: DocumentFormat, report: &mut MigrationReport) -> Result<()> {
    let legacy = data_dir.join(format!("vaults.{}", format.extension()));
    if !legacy.is_file() {
        tracing::debug!(path = %legacy.display(), "no legacy vault file");
        return Ok(());
    }

    let text = std::fs::read_to_string(&legacy).map_err(BackendError::from)?;
    let players: BTreeMap<String, PlayerDocument> = format
        .parse(&text)
        .map_err(|reason| BackendError::document(&legacy, reason))?;

    let target_dir = data_dir.join("vaults");
    std::fs::create_dir_all(&target_dir).map_err(BackendError::from)?;

    let (migrated, skipped, rejected) = (report.migrated, report.skipped, report.rejected.len());
    let mut seen = HashSet::new();
    for (name, document) in &players {
        let player = match VaultKey::new(name, 1) {
            Ok(key) => key.player().to_string(),
            Err(e) => {
                tracing::warn!(player = %name, error = %e, "skipping legacy entry with invalid player name");
                report.rejected.push(name.clone());
                continue;
            }
        };
        if !seen.insert(player.clone()) {
            tracing::warn!(player = %name, normalized = %player, "skipping legacy entry that collides with another player");
            report.rejected.push(name.clone());
            continue;
        }

        let target = target_dir.join(format!("{}.{}", player, format.extension()));
        if target.exists() {
            report.skipped += 1;
            continue;
        }

        let rendered = format
            .render(document)
            .map_err(|reason| BackendError::document(&target, reason))?;
        write_atomic(&target_dir, &target, rendered.as_bytes())?;
        report.migrated += 1;
    }

    let backup = data_dir.join(format!("vaults.{}.bak", format.extension()));
    std::fs::rename(&legacy, &backup).map_err(BackendError::from)?;

    tracing::info!(
        migrated = report.migrated - migrated,
        skipped = report.skipped - skipped,
        rejected = report.rejected.len() - rejected,
        backup = %backup.display(),
        "legacy vault file migrated"
    );
    report.backups.push(backup);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DocumentStore, VaultBackend};

    fn legacy_json() -> &'static str {
        r#"{
            "alice": { "1": "AQID", "2": "BAUG" },
            "Bob": { "5": "BwgJ" }
        }"#
    }

    #[test]
    fn test_missing_legacy_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let report = migrate_legacy(dir.path()).unwrap();
        assert!(report.is_noop());
        assert!(!dir.path().join("vaults").exists());
    }

    #[test]
    fn test_players_are_split_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vaults.json"), legacy_json()).unwrap();

        let report = migrate_legacy(dir.path()).unwrap();
        assert_eq!(report.migrated, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.backups, vec![dir.path().join("vaults.json.bak")]);
        assert!(!dir.path().join("vaults.json").exists());
        assert!(dir.path().join("vaults.json.bak").exists());

        let store = DocumentStore::open(dir.path().join("vaults"), DocumentFormat::Json).unwrap();
        let key = VaultKey::new("alice", 2).unwrap();
        assert_eq!(store.read(&key).unwrap(), Some(vec![4, 5, 6]));
        // names are normalized to lowercase
        let key = VaultKey::new("bob", 5).unwrap();
        assert_eq!(store.read(&key).unwrap(), Some(vec![7, 8, 9]));
    }

    #[test]
    fn test_migration_is_idempotent_and_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let vaults = dir.path().join("vaults");
        std::fs::create_dir_all(&vaults).unwrap();
        std::fs::write(vaults.join("alice.json"), r#"{ "9": "AA==" }"#).unwrap();
        std::fs::write(dir.path().join("vaults.json"), legacy_json()).unwrap();

        let first = migrate_legacy(dir.path()).unwrap();
        assert_eq!(first.migrated, 1);
        assert_eq!(first.skipped, 1);
        assert_eq!(
            std::fs::read_to_string(vaults.join("alice.json")).unwrap(),
            r#"{ "9": "AA==" }"#
        );

        let second = migrate_legacy(dir.path()).unwrap();
        assert!(second.is_noop());
    }

    #[test]
    fn test_yaml_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("vaults.yml"),
            "carol:\n  3: AQID\n  4: BAUG\n\"../evil\":\n  1: AA==\n",
        )
        .unwrap();

        let report = migrate_legacy(dir.path()).unwrap();
        assert_eq!(report.migrated, 1);
        assert_eq!(report.rejected, vec!["../evil".to_string()]);
        assert_eq!(report.backups, vec![dir.path().join("vaults.yml.bak")]);
        assert!(!dir.path().join("vaults.yml").exists());

        let store = DocumentStore::open(dir.path().join("vaults"), DocumentFormat::Yaml).unwrap();
        assert!(store.path_for("carol").ends_with("carol.yml"));
        let key = VaultKey::new("carol", 4).unwrap();
        assert_eq!(store.read(&key).unwrap(), Some(vec![4, 5, 6]));
    }

    #[test]
    fn test_json_and_yaml_legacy_files_both_migrate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vaults.json"), legacy_json()).unwrap();
        std::fs::write(dir.path().join("vaults.yml"), "dave:\n  1: BwgJ\n").unwrap();

        let report = migrate_legacy(dir.path()).unwrap();
        assert_eq!(report.migrated, 3);
        assert_eq!(report.backups.len(), 2);
        assert!(dir.path().join("vaults").join("alice.json").exists());
        assert!(dir.path().join("vaults").join("dave.yml").exists());
    }

    #[test]
    fn test_names_colliding_after_normalization_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("vaults.json"),
            r#"{ "Alice": { "1": "AQID" }, "alice": { "1": "BAUG" } }"#,
        )
        .unwrap();

        let report = migrate_legacy(dir.path()).unwrap();
        assert_eq!(report.migrated, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.rejected, vec!["alice".to_string()]);

        // the first entry in name order wins
        let store = DocumentStore::open(dir.path().join("vaults"), DocumentFormat::Json).unwrap();
        let key = VaultKey::new("alice", 1).unwrap();
        assert_eq!(store.read(&key).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_malformed_legacy_file_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vaults.json"), "[1, 2").unwrap();
        assert!(migrate_legacy(dir.path()).is_err());
        assert!(dir.path().join("vaults.json").exists());
    }
}
