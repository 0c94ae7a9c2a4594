//! perfvault - administrative CLI for the profile record store
//!
//! Provides commands for:
//! - Inspecting stored profiles and aggregate statistics
//! - Importing exported profile documents
//! - Deleting profiles
//! - Managing watched functions
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/perfvault/profiles.db (~/.local/share/perfvault/profiles.db)
//! - Logs: $XDG_STATE_HOME/perfvault/perfvault.YYYY-MM-DD.log (rotated daily)
//! - Config: $XDG_CONFIG_HOME/perfvault/config.toml (~/.config/perfvault/config.toml)

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use perfvault_core::{
    open_store, Config, Error, ImportDocument, ProfileStore, SortDirection, StoreStatistics,
    Watch,
};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "perfvault")]
#[command(about = "Inspect and manage stored request profiles")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/perfvault/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show profile count, newest request time and payload size
    Stats,

    /// Show the profile with the earliest request date
    Latest,

    /// Show one profile as JSON
    Show {
        id: String,

        /// Include the raw profile payload
        #[arg(long)]
        payload: bool,
    },

    /// List profiles whose simple URL contains a string
    List {
        /// Substring to match (empty matches everything with a URL)
        #[arg(short, long, default_value = "")]
        url: String,

        /// Sort direction by request time (asc or desc)
        #[arg(short, long, default_value = "desc")]
        direction: String,

        /// Rows to skip
        #[arg(long, default_value = "0")]
        skip: u64,

        /// Maximum rows to show
        #[arg(short, long, default_value = "25")]
        limit: u64,
    },

    /// Count profiles whose simple URL contains a string
    Count {
        #[arg(short, long, default_value = "")]
        url: String,
    },

    /// Import exported profiles (one JSON document per line)
    Import { file: PathBuf },

    /// Delete one profile
    Delete { id: String },

    /// Delete every profile
    Purge {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Manage watched functions
    Watch {
        #[command(subcommand)]
        command: WatchCommand,
    },
}

#[derive(Subcommand)]
enum WatchCommand {
    /// List all watches
    List,

    /// Watch a function
    Add { name: String },

    /// Rename a watch or mark it removed
    Update {
        id: String,
        name: String,

        /// Marker recorded for disabled watches
        #[arg(long)]
        removed: Option<String>,
    },

    /// Delete a watch
    Remove { id: String },

    /// Delete every watch
    Clear,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let _log_guard =
        perfvault_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let store = open_store(&config.store).context("failed to open profile store")?;
    tracing::info!(backend = ?store.backend(), "perfvault starting");

    match args.command {
        Command::Stats => cmd_stats(store.as_ref()),
        Command::Latest => cmd_latest(store.as_ref()),
        Command::Show { id, payload } => cmd_show(store.as_ref(), &id, payload),
        Command::List {
            url,
            direction,
            skip,
            limit,
        } => cmd_list(store.as_ref(), &url, &direction, skip, limit),
        Command::Count { url } => {
            println!("{}", store.count_by_url(&url)?);
            Ok(())
        }
        Command::Import { file } => cmd_import(store.as_ref(), &file),
        Command::Delete { id } => {
            store.delete_by_id(&id)?;
            println!("Deleted {id}");
            Ok(())
        }
        Command::Purge { yes } => {
            if !yes {
                bail!("refusing to delete all profiles without --yes");
            }
            let removed = store.delete_all()?;
            println!("Deleted {removed} profile(s)");
            Ok(())
        }
        Command::Watch { command } => cmd_watch(store.as_ref(), command),
    }
}

fn cmd_stats(store: &dyn ProfileStore) -> Result<()> {
    match store.statistics()? {
        StoreStatistics::Empty => println!("No profiles stored"),
        StoreStatistics::Populated(stats) => {
            println!("Profiles:        {}", stats.profiles);
            println!("Latest request:  {}", format_ts(stats.latest));
            println!("Payload bytes:   {}", stats.bytes);
        }
    }
    Ok(())
}

fn cmd_latest(store: &dyn ProfileStore) -> Result<()> {
    match store.latest() {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record.summary())?);
            Ok(())
        }
        Err(Error::NotFound { .. }) => {
            println!("No profiles stored");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_show(store: &dyn ProfileStore, id: &str, payload: bool) -> Result<()> {
    let record = store
        .get_by_id(id)
        .with_context(|| format!("failed to load profile {id}"))?;
    let rendered = if payload {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string_pretty(&record.summary())?
    };
    println!("{rendered}");
    Ok(())
}

fn cmd_list(
    store: &dyn ProfileStore,
    url: &str,
    direction: &str,
    skip: u64,
    limit: u64,
) -> Result<()> {
    let direction: SortDirection = direction.parse()?;
    let total = store.count_by_url(url)?;

    println!(
        "{:<24}  {:<19}  {:>10}  {:>10}  {:>10}  URL",
        "ID", "REQUESTED", "WALL(us)", "CPU(us)", "PEAK(B)"
    );
    let mut shown = 0;
    for profile in store.find_by_url(url, direction, skip, limit)? {
        let profile = profile?;
        println!(
            "{:<24}  {:<19}  {:>10}  {:>10}  {:>10}  {}",
            profile.id,
            format_ts(profile.request_ts),
            profile.metrics.wt,
            profile.metrics.cpu,
            profile.metrics.pmu,
            profile.simple_url.as_deref().unwrap_or("-"),
        );
        shown += 1;
    }
    println!();
    println!("Showing {shown} of {total} profile(s)");
    Ok(())
}

fn cmd_import(store: &dyn ProfileStore, file: &Path) -> Result<()> {
    let reader = BufReader::new(
        std::fs::File::open(file).with_context(|| format!("failed to open {}", file.display()))?,
    );

    let mut imported = 0;
    let mut skipped = 0;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", file.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        let record = ImportDocument::from_json(&line)
            .and_then(|doc| doc.into_record(Utc::now()))
            .with_context(|| format!("{}:{}: invalid profile document", file.display(), line_no + 1))?;

        match store.save_profile(&record) {
            Ok(()) => imported += 1,
            Err(Error::Conflict { id, .. }) => {
                tracing::warn!(id = %id, line = line_no + 1, "Skipping duplicate profile");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("Imported {imported} profile(s), skipped {skipped} duplicate(s)");
    Ok(())
}

fn cmd_watch(store: &dyn ProfileStore, command: WatchCommand) -> Result<()> {
    match command {
        WatchCommand::List => {
            let mut count = 0;
            for watch in store.all_watches()? {
                let watch = watch?;
                let status = match &watch.removed {
                    Some(marker) => format!("removed ({marker})"),
                    None => "active".to_string(),
                };
                println!("{}  {:<18}  {}", watch.id, status, watch.name);
                count += 1;
            }
            if count == 0 {
                println!("No watches defined");
            }
        }
        WatchCommand::Add { name } => {
            let watch = Watch::new(name);
            store.save_watch(&watch)?;
            println!("Added watch {}", watch.id);
        }
        WatchCommand::Update { id, name, removed } => {
            let affected = store.update_watch(&Watch { id: id.clone(), name, removed })?;
            if affected == 0 {
                println!("No watch with id {id}");
            } else {
                println!("Updated watch {id}");
            }
        }
        WatchCommand::Remove { id } => {
            store.remove_watch(&id)?;
            println!("Removed watch {id}");
        }
        WatchCommand::Clear => {
            let removed = store.truncate_watches()?;
            println!("Removed {removed} watch(es)");
        }
    }
    Ok(())
}

fn format_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
