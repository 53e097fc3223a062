use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::thread;
use tracing::{info, warn};

use clip_history::clipboard_history::{
    group_by_time, AssetStore, ClipboardHistory, ClipboardRecord, HistoryEvent, HistoryQuery,
    JsonFileKv, RecordId, ResilientStore, SqliteStore, SystemPasteboard,
};
use clip_history::config::{default_config_path, load_config, EngineConfig};
use clip_history::logging;

/// Preview width in `list` output
const LIST_PREVIEW_CHARS: usize = 60;

#[derive(Parser, Debug)]
#[command(name = "cliphist", version, about = "Clipboard history for macOS")]
struct Cli {
    /// Path to config.json (default: ~/.cliphist/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record pasteboard changes until stdin closes (Ctrl-D)
    Watch,
    /// Show history, pinned records first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Case-insensitive text search
        #[arg(long)]
        query: Option<String>,
        /// Only pinned records
        #[arg(long)]
        pinned: bool,
    },
    /// Toggle the pin on a record (id or unique id prefix)
    Pin { id: String },
    /// Delete a record and its files
    Delete { id: String },
    /// Remove history records
    Clear {
        #[arg(long)]
        keep_pinned: bool,
    },
    /// Remove orphaned asset files now
    Gc,
    /// Put a record back on the pasteboard
    Copy { id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // logs always live under the default data dir, before any config is read
    let _guard = logging::init(&EngineConfig::default().log_dir());

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path);
    info!(
        config_path = %config_path.display(),
        data_dir = %config.data_dir().display(),
        command = ?cli.command,
        "cliphist starting"
    );

    match cli.command {
        Command::Watch => watch(&config),
        Command::List {
            limit,
            query,
            pinned,
        } => {
            let engine = start_engine(&one_shot(&config))?;
            list(&engine, limit, query.as_deref(), pinned);
            Ok(())
        }
        Command::Pin { id } => {
            let engine = start_engine(&one_shot(&config))?;
            let id = resolve_id(&engine, &id)?;
            let pinned = engine.toggle_pin(id)?;
            println!("{} {}", if pinned { "Pinned" } else { "Unpinned" }, id);
            Ok(())
        }
        Command::Delete { id } => {
            let engine = start_engine(&one_shot(&config))?;
            let id = resolve_id(&engine, &id)?;
            engine.delete(id)?;
            println!("Deleted {}", id);
            Ok(())
        }
        Command::Clear { keep_pinned } => {
            let engine = start_engine(&one_shot(&config))?;
            let removed = engine.clear(keep_pinned)?;
            println!("Removed {} record(s)", removed);
            Ok(())
        }
        Command::Gc => {
            let engine = start_engine(&one_shot(&config))?;
            let report = engine.collect_garbage()?;
            println!(
                "Scanned {} file(s), deleted {} ({} bytes), kept {} recent",
                report.scanned, report.deleted, report.bytes_freed, report.skipped_recent
            );
            Ok(())
        }
        Command::Copy { id } => {
            let engine = start_engine(&one_shot(&config))?;
            let id = resolve_id(&engine, &id)?;
            engine
                .copy_to_pasteboard(id)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Copied {}", id);
            Ok(())
        }
    }
}

/// Same settings without the poll and collection timers
fn one_shot(config: &EngineConfig) -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 0,
        gc_interval_secs: 0,
        ..config.clone()
    }
}

fn start_engine(config: &EngineConfig) -> Result<ClipboardHistory> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let primary = SqliteStore::open(&config.database_path()).with_context(|| {
        format!(
            "Failed to open history database at {}",
            config.database_path().display()
        )
    })?;
    let fallback = JsonFileKv::open(&config.fallback_path()).with_context(|| {
        format!(
            "Failed to open fallback store at {}",
            config.fallback_path().display()
        )
    })?;
    let store = ResilientStore::new(primary, fallback, config.resilience_options());
    let assets = AssetStore::open(config.assets_dir(), config.orphan_min_age());

    let engine = ClipboardHistory::start(config, store, assets, SystemPasteboard::new)
        .context("Failed to start clipboard history")?;
    for warning in engine.warnings() {
        eprintln!("warning: {}", warning.message());
    }
    Ok(engine)
}

fn watch(config: &EngineConfig) -> Result<()> {
    let engine = start_engine(config)?;
    let events = engine.subscribe();

    let printer = thread::spawn(move || {
        while let Ok(event) = events.recv_blocking() {
            match event {
                HistoryEvent::Changed { revision, len } => {
                    info!(revision, len, "History changed");
                }
                HistoryEvent::Warning(warning) => {
                    warn!(?warning, "{}", warning.message());
                    eprintln!("warning: {}", warning.message());
                }
            }
        }
    });

    eprintln!(
        "Watching the pasteboard every {}ms; press Ctrl-D to stop",
        config.poll_interval_ms
    );
    io::copy(&mut io::stdin().lock(), &mut io::sink()).context("Failed to read stdin")?;

    engine.shutdown();
    drop(engine);
    if printer.join().is_err() {
        warn!("Event printer thread panicked");
    }
    Ok(())
}

fn list(engine: &ClipboardHistory, limit: usize, query: Option<&str>, pinned_only: bool) {
    let mut query_builder = HistoryQuery::new().pinned_only(pinned_only).limit(limit);
    if let Some(text) = query {
        query_builder = query_builder.text(text);
    }
    let records = query_builder.apply(&engine.current_snapshot());
    if records.is_empty() {
        println!("No clipboard history");
        return;
    }

    let (pinned, recent): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| r.is_pinned);
    if !pinned.is_empty() {
        println!("Pinned");
        for record in &pinned {
            print_record(record);
        }
    }
    for (group, records) in group_by_time(&recent, Local::now()) {
        println!("{}", group.display_name());
        for record in &records {
            print_record(record);
        }
    }
}

fn print_record(record: &ClipboardRecord) {
    let id = record.id.to_string();
    let time = Local
        .timestamp_millis_opt(record.timestamp)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    let preview = if record.is_sensitive {
        "(hidden)".to_string()
    } else {
        one_line(&record.preview_text, LIST_PREVIEW_CHARS)
    };
    println!(
        "  {}  {:<5} {}  {}",
        &id[..8.min(id.len())],
        record.kind().as_str(),
        time,
        preview
    );
}

fn one_line(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let flat = flat.trim();
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", cut)
    } else {
        flat.to_string()
    }
}

/// Accept a full id or a unique prefix of one
fn resolve_id(engine: &ClipboardHistory, raw: &str) -> Result<RecordId> {
    if let Some(id) = RecordId::parse(raw) {
        return Ok(id);
    }
    let raw = raw.to_lowercase();
    let snapshot = engine.current_snapshot();
    let mut matches = snapshot
        .iter()
        .filter(|r| r.id.to_string().starts_with(&raw));
    match (matches.next(), matches.next()) {
        (Some(record), None) => Ok(record.id),
        (Some(_), Some(_)) => bail!("Id prefix '{}' matches more than one record", raw),
        (None, _) => bail!("No history record matches '{}'", raw),
    }
}
