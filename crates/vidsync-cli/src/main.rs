mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliObserver;
use serde_json::json;
use tracing::{error, info, warn};
use vidsync_core::engine::LoaderOptions;
use vidsync_core::{
    filename, AppConfig, Database, LocalFilesystem, MediaRecord, Provenance, ReconciliationLoader,
    SidecarRecord, Store,
};

type Loader = ReconciliationLoader<Database, LocalFilesystem>;

fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match vidsync_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Sync {
            paths,
            no_write_back,
        }) => {
            if let Err(err) = run_sync(&config, &paths, !no_write_back) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::List { path, json }) => {
            if let Err(err) = run_list(&config, &path, json) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::Folders) => {
            if let Err(err) = run_folders(&config) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::Parse { names }) => run_parse(&names),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
        }
        Some(Commands::TruncateDb) => {
            match prompt_confirm(
                "Are you SURE you want to COMPLETELY DELETE the Database?",
                Some(false),
            ) {
                Ok(true) => {
                    let db = open_database(&config)?;
                    db.truncate_all().context("truncating database")?;
                    println!("All tables truncated");
                }
                _ => process::exit(0),
            }
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn open_database(config: &AppConfig) -> Result<Database> {
    Database::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))
}

fn build_loader(config: &AppConfig, auto_write_back: bool) -> Result<Loader> {
    let mut options = LoaderOptions::from_config(config);
    options.auto_write_back = auto_write_back;
    let loader = ReconciliationLoader::new(
        open_database(config)?,
        LocalFilesystem::from_config(config),
        options,
    )?
    .with_observer(Box::new(CliObserver::new()));
    Ok(loader)
}

fn run_sync(config: &AppConfig, extra_paths: &[PathBuf], write_back: bool) -> Result<()> {
    let mut loader = build_loader(config, write_back)?;

    let folders = loader.reload_from_store()?;
    info!("{} folders restored from the database", folders);

    let requested = config
        .watch_paths
        .iter()
        .map(PathBuf::from)
        .chain(extra_paths.iter().cloned());
    for path in requested {
        if let Err(err) = loader.add_path(&path) {
            warn!("Skipping {}: {}", path.display(), err);
        }
    }

    if loader.tracked_paths().is_empty() {
        warn!("Nothing to sync: no watch paths configured or given");
        return Ok(());
    }

    loader.refresh_all()?;
    loader.run_until_idle();

    let keys: Vec<PathBuf> = loader
        .tracked_paths()
        .into_iter()
        .map(Path::to_path_buf)
        .collect();
    for key in keys {
        print_summary(&loader, &key);
    }
    Ok(())
}

fn print_summary(loader: &Loader, key: &Path) {
    let Some(cache) = loader.cache(key) else {
        return;
    };
    let unified = cache.unified();
    let count = |p: Provenance| unified.iter().filter(|r| r.provenance == p).count();
    let missing = unified.iter().filter(|r| !r.has_duration()).count();

    info!("{}", key.display().to_string().bold());
    info!(
        "  {} records: {} store only, {} disk only, {} newer on disk, {} newer in store",
        format!("{}", unified.len()).green(),
        format!("{}", count(Provenance::OnlyFromStore)).yellow(),
        format!("{}", count(Provenance::OnlyFromDisk)).cyan(),
        format!("{}", count(Provenance::NewestFromDisk)).cyan(),
        format!("{}", count(Provenance::NewestFromStore)).yellow(),
    );
    if missing > 0 {
        info!("  {} records without a duration", format!("{}", missing).red());
    }
    let orphans = cache.orphan_sidecars();
    if !orphans.is_empty() {
        info!(
            "  {} sidecars with no matching video",
            format!("{}", orphans.len()).red()
        );
    }
}

fn run_list(config: &AppConfig, path: &Path, as_json: bool) -> Result<()> {
    let mut loader = build_loader(config, false)?;
    loader.reload_from_store()?;
    let key = loader.add_path(path)?;
    loader.scan(&[key.clone()])?;
    loader.run_until_idle();

    let entries = loader
        .entries(&key)
        .with_context(|| format!("{} is not tracked", key.display()))?;

    if as_json {
        let rows: Vec<_> = entries
            .iter()
            .map(|(record, sidecars)| entry_json(record, sidecars))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for (record, sidecars) in entries {
        let duration = record
            .duration_secs
            .map(|secs| format!("{:>9.1}s", secs))
            .unwrap_or_else(|| format!("{:>10}", "?"));
        let provenance = match record.provenance {
            Provenance::OnlyFromStore | Provenance::NewestFromStore => {
                record.provenance.as_str().yellow()
            }
            _ => record.provenance.as_str().cyan(),
        };
        println!(
            "{}  {}  {:<13} {}",
            record.start.format("%Y-%m-%d %H:%M:%S%.3f"),
            duration,
            provenance,
            record.file_name()
        );
        for sidecar in sidecars {
            println!("{:>40} {}", "↳", sidecar.file_name.dimmed());
        }
    }
    Ok(())
}

fn entry_json(record: &MediaRecord, sidecars: &[SidecarRecord]) -> serde_json::Value {
    json!({
        "file_name": record.file_name(),
        "path": record.path(),
        "start": record.start.to_rfc3339(),
        "end": record.end().map(|end| end.to_rfc3339()),
        "duration_secs": record.duration_secs,
        "group_id": record.group_id,
        "derived": record.derived,
        "provenance": record.provenance.as_str(),
        "store_id": record.store_id,
        "sidecars": sidecars.iter().map(|s| s.file_name.clone()).collect::<Vec<_>>(),
    })
}

fn run_folders(config: &AppConfig) -> Result<()> {
    let db = open_database(config)?;
    let folders = db.load_folders()?;
    if folders.is_empty() {
        println!("No folders stored yet");
    }
    for folder in folders {
        let records = db.count_media_records(folder.id)?;
        println!(
            "{:>4}  {:>6} records  {}",
            folder.id,
            records.to_string().green(),
            folder.path
        );
    }
    Ok(())
}

fn run_parse(names: &[String]) {
    for name in names {
        match filename::parse(name) {
            Some(parsed) => println!(
                "{}  {:?}  start={}  group={}  derived={}  owner={}",
                name.green(),
                parsed.format,
                parsed.start.to_rfc3339(),
                parsed
                    .group_id
                    .map(|g| g.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                parsed
                    .derived
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                parsed.owner_key,
            ),
            None => println!("{}  matches no known pattern", name.red()),
        }
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
