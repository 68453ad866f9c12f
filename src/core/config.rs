//! Configuration management for Player Vaults
//!
//! Settings are read from a TOML file, overridden by `PV_*` environment
//! variables and finally by command line flags. Invalid values are rejected
//! at startup; nothing falls back to a default once a value was given.

use crate::core::error::{Error, Result};
use crate::types::DEFAULT_VAULT_CAPACITY;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "player-vaults.toml";

/// Largest vault the coordinator will materialize
pub const MAX_VAULT_CAPACITY: u16 = 4096;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Vault behaviour
    pub vaults: VaultConfig,

    /// Performance tuning
    pub performance: PerformanceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Available storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One JSON document per player
    Json,
    /// One YAML document per player
    #[serde(alias = "yml")]
    Yaml,
    /// SQLite database, one row per vault
    Sqlite,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Json => "json",
            BackendKind::Yaml => "yaml",
            BackendKind::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(BackendKind::Json),
            "yaml" | "yml" => Ok(BackendKind::Yaml),
            "sqlite" | "database" | "db" => Ok(BackendKind::Sqlite),
            other => Err(Error::config(format!(
                "Invalid backend: {}. Valid options: json, yaml, sqlite",
                other
            ))),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend selected at startup
    pub backend: BackendKind,

    /// Data directory path; document backends keep files under `vaults/`
    pub data_dir: PathBuf,

    /// SQLite database file (defaults to `<data_dir>/vaults.db`)
    pub database_path: Option<PathBuf>,

    /// Enable compression of encoded inventories
    pub enable_compression: bool,

    /// Compression level (0-9)
    pub compression_level: u32,

    /// Run the legacy single-file migration before serving requests
    pub migrate_legacy: bool,
}

/// Vault behaviour configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Slots per vault
    pub capacity: u16,

    /// How long a lock may be held before another request may take it over
    /// (`0` disables expiry)
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub lock_lease: Duration,

    /// Inventory title; `{VAULTNO}` is replaced with the vault number
    pub inventory_name: String,
}

/// Performance tuning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Number of runtime worker threads (0 = auto-detect)
    pub worker_threads: usize,

    /// Upper bound on blocking I/O threads used by vault workers
    pub blocking_threads: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Json,
            data_dir: PathBuf::from("./data"),
            database_path: None,
            enable_compression: true,
            compression_level: 6,
            migrate_legacy: true,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_VAULT_CAPACITY,
            lock_lease: Duration::from_secs(10 * 60),
            inventory_name: "Vault #{VAULTNO}".to_string(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0, // Auto-detect
            blocking_threads: 64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl StorageConfig {
    /// Directory holding one document per player
    pub fn vaults_dir(&self) -> PathBuf {
        self.data_dir.join("vaults")
    }

    /// Resolved SQLite database location
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("vaults.db"))
    }
}

impl VaultConfig {
    /// Lease applied to vault locks, `None` when expiry is disabled
    pub fn lease(&self) -> Option<Duration> {
        (!self.lock_lease.is_zero()).then_some(self.lock_lease)
    }

    /// Render the inventory title for one vault
    pub fn title_for(&self, vault_number: u32) -> String {
        self.inventory_name
            .replace("{VAULTNO}", &vault_number.to_string())
    }
}

impl Config {
    /// Load configuration from an explicit file, or from
    /// [`DEFAULT_CONFIG_FILE`] if present, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Config::default(),
        };

        // Override with environment variables
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to render config: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `PV_*` overrides from an arbitrary variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Storage overrides
        if let Some(backend) = lookup("PV_BACKEND") {
            self.storage.backend = backend.parse()?;
        }

        if let Some(data_dir) = lookup("PV_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Some(db) = lookup("PV_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(db));
        }

        // Vault overrides
        if let Some(lease) = lookup("PV_LOCK_LEASE") {
            self.vaults.lock_lease = parse_duration(&lease)
                .map_err(|e| Error::config(format!("Invalid lock lease: {}", e)))?;
        }

        if let Some(capacity) = lookup("PV_VAULT_CAPACITY") {
            self.vaults.capacity = capacity
                .parse()
                .map_err(|e| Error::config(format!("Invalid vault capacity: {}", e)))?;
        }

        // Performance overrides
        if let Some(workers) = lookup("PV_WORKER_THREADS") {
            self.performance.worker_threads = workers
                .parse()
                .map_err(|e| Error::config(format!("Invalid worker threads: {}", e)))?;
        }

        // Logging overrides
        if let Some(level) = lookup("PV_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("PV_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(Error::config("Data directory must not be empty"));
        }

        if self.storage.compression_level > 9 {
            return Err(Error::config("Compression level must be between 0 and 9"));
        }

        if self.vaults.capacity == 0 || self.vaults.capacity > MAX_VAULT_CAPACITY {
            return Err(Error::config(format!(
                "Vault capacity must be between 1 and {}",
                MAX_VAULT_CAPACITY
            )));
        }

        // Validate thread counts
        if self.performance.worker_threads > 1024 {
            return Err(Error::config("Too many worker threads (maximum 1024)"));
        }

        if self.performance.blocking_threads == 0 {
            return Err(Error::config("At least one blocking thread is required"));
        }

        // Validate log level
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            _ => return Err(Error::config("Invalid log format (expected pretty or json)")),
        }

        Ok(())
    }

    /// Get optimal number of worker threads
    pub fn optimal_worker_threads(&self) -> usize {
        if self.performance.worker_threads == 0 {
            // Auto-detect: use number of CPU cores
            num_cpus::get().max(1)
        } else {
            self.performance.worker_threads
        }
    }
}

// Custom deserializer for Duration from string or whole seconds
fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration string like '30s' or '5m', or whole seconds")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Duration, E>
        where
            E: de::Error,
        {
            parse_duration(value).map_err(E::custom)
        }

        fn visit_u64<E>(self, value: u64) -> std::result::Result<Duration, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E>(self, value: i64) -> std::result::Result<Duration, E>
        where
            E: de::Error,
        {
            u64::try_from(value)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must not be negative"))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if duration.subsec_millis() == 0 {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    } else {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }
}

/// Simple duration parser for common formats
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms.parse().map_err(|_| "Invalid milliseconds")?;
        Ok(Duration::from_millis(ms))
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs.parse().map_err(|_| "Invalid seconds")?;
        Ok(Duration::from_secs(secs))
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.parse().map_err(|_| "Invalid minutes")?;
        let secs = mins.checked_mul(60).ok_or("Duration too large")?;
        Ok(Duration::from_secs(secs))
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours: u64 = hours.parse().map_err(|_| "Invalid hours")?;
        let secs = hours.checked_mul(3600).ok_or("Duration too large")?;
        Ok(Duration::from_secs(secs))
    } else {
        // Try parsing as raw seconds
        let secs: u64 = s.parse().map_err(|_| "Invalid duration format")?;
        Ok(Duration::from_secs(secs))
    }
}
