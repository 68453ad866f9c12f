//! Player Vaults administration tool
//!
//! Inspects and maintains vault storage outside the game server: runs the
//! legacy migration, prints or deletes a single vault, and shows the
//! effective configuration.

use clap::{value_parser, Arg, ArgMatches, Command};
use player_vaults::{
    build_coordinator, core::Config, init_logging, migrate_legacy, Error, Result, VaultKey,
    VaultService,
};
use std::path::PathBuf;
use tracing::info;

/// Holder label used for locks taken by this tool
const CONSOLE_HOLDER: &str = "console";

fn main() -> Result<()> {
    let matches = cli().get_matches();

    // Load configuration
    let config_path = matches.get_one::<PathBuf>("config").cloned();
    let mut config = Config::load(config_path.as_deref())?;

    // Apply CLI overrides
    apply_cli_overrides(&mut config, &matches)?;
    config.validate()?;

    init_logging(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.optimal_worker_threads())
        .max_blocking_threads(config.performance.blocking_threads)
        .thread_name("player-vaults")
        .enable_all()
        .build()
        .map_err(|e| Error::internal(format!("Failed to start runtime: {}", e)))?;

    runtime.block_on(run(config, matches))
}

fn cli() -> Command {
    let player = Arg::new("player")
        .required(true)
        .value_name("PLAYER")
        .help("Player identity");
    let vault = Arg::new("vault")
        .required(true)
        .value_name("VAULT")
        .value_parser(value_parser!(u32))
        .help("Vault number, starting at 1");

    Command::new("player-vaults")
        .version(player_vaults::VERSION)
        .about("Inspect and maintain player vault storage.")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Data directory path"),
        )
        .arg(
            Arg::new("backend")
                .long("backend")
                .value_name("KIND")
                .global(true)
                .help("Storage backend (json, yaml, sqlite)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .subcommand(Command::new("migrate").about("Split legacy vaults.json / vaults.yml files into per-player files"))
        .subcommand(
            Command::new("show")
                .about("Print the contents of one vault")
                .arg(player.clone())
                .arg(vault.clone()),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete one vault")
                .arg(player)
                .arg(vault),
        )
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

/// Apply command line argument overrides to configuration
fn apply_cli_overrides(config: &mut Config, matches: &ArgMatches) -> Result<()> {
    if let Some(data_dir) = matches.get_one::<PathBuf>("data-dir") {
        config.storage.data_dir = data_dir.clone();
    }

    if let Some(backend) = matches.get_one::<String>("backend") {
        config.storage.backend = backend.parse()?;
    }

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }

    Ok(())
}

async fn run(config: Config, matches: ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("migrate", _)) => migrate(&config),
        Some(("show", args)) => show(&config, vault_key(args)?).await,
        Some(("delete", args)) => delete(&config, vault_key(args)?).await,
        Some(("config", _)) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        _ => Err(Error::invalid_input("unknown command")),
    }
}

fn vault_key(args: &ArgMatches) -> Result<VaultKey> {
    let player = args
        .get_one::<String>("player")
        .ok_or_else(|| Error::invalid_input("missing player"))?;
    let vault = args
        .get_one::<u32>("vault")
        .ok_or_else(|| Error::invalid_input("missing vault number"))?;
    VaultKey::new(player, *vault)
}

fn migrate(config: &Config) -> Result<()> {
    let report = migrate_legacy(&config.storage.data_dir)?;
    if report.is_noop() {
        println!("no legacy vault file found");
        return Ok(());
    }

    println!(
        "migrated {} player(s), skipped {}, rejected {}",
        report.migrated,
        report.skipped,
        report.rejected.len()
    );
    for name in &report.rejected {
        println!("  rejected: {}", name);
    }
    for backup in &report.backups {
        println!("  legacy file moved to {}", backup.display());
    }
    Ok(())
}

async fn show(config: &Config, key: VaultKey) -> Result<()> {
    let (handle, task) = VaultService::spawn(build_coordinator(config)?);

    let record = handle.open(CONSOLE_HOLDER, key.clone(), None).await?.await?;
    println!("{} ({}, {} slots)", record.title(), key, record.capacity());
    if record.is_empty() {
        println!("  empty");
    }
    for item in record.slots() {
        let aux = item.aux_tag.as_ref().map_or(0, Vec::len);
        println!(
            "  slot {:>3}: id {} meta {} x{} ({} aux bytes)",
            item.slot, item.id, item.meta, item.count, aux
        );
    }

    if let Some(token) = record.lock_token().cloned() {
        handle.release(key, token).await?;
    }
    drop(handle);
    task.await
        .map_err(|e| Error::internal(format!("vault service failed: {}", e)))
}

async fn delete(config: &Config, key: VaultKey) -> Result<()> {
    let (handle, task) = VaultService::spawn(build_coordinator(config)?);

    let result = handle.delete(key.clone()).await?.await;
    drop(handle);
    task.await
        .map_err(|e| Error::internal(format!("vault service failed: {}", e)))?;

    match result {
        Ok(()) => {
            info!(key = %key, "vault deleted");
            println!("deleted {}", key);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            println!("{} has no stored contents", key);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
