//! Keva CLI - one-shot access to a keva snapshot file
//!
//! Usage:
//!   keva get <key>              Print a value as JSON (exit code 1 if missing)
//!   keva set <key> <value>      Store a JSON value (plain text is stored as a string)
//!   keva delete <key>           Remove a key
//!   keva keys                   List keys
//!   keva dump                   Pretty-print the whole document
//!
//! Every command opens the file (creating `{}` if missing), applies the
//! change, and closes the store so the final flush persists it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keva::{Store, StoreConfig, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "keva")]
#[command(about = "Read and modify keva snapshot files", long_about = None)]
#[command(version)]
struct Cli {
    /// Snapshot file to operate on
    #[arg(short, long, default_value = "./keva.json", global = true)]
    file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key
    Get { key: String },
    /// Store a value under a key
    Set { key: String, value: String },
    /// Remove a key
    Delete { key: String },
    /// List all keys, sorted
    Keys,
    /// Print the whole document
    Dump,
}

/// Parse as JSON, falling back to a plain string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Run one command; returns false when a looked-up key was missing
fn execute(store: &Store, command: &Command, out: &mut impl Write) -> Result<bool> {
    match command {
        Command::Get { key } => match store.get(key) {
            Some(value) => {
                writeln!(out, "{}", serde_json::to_string(&value)?)?;
                Ok(true)
            }
            None => Ok(false),
        },
        Command::Set { key, value } => {
            store.set(key.clone(), parse_value(value));
            Ok(true)
        }
        Command::Delete { key } => {
            store.delete(key);
            Ok(true)
        }
        Command::Keys => {
            let mut keys = store.keys();
            keys.sort();
            for key in keys {
                writeln!(out, "{}", key)?;
            }
            Ok(true)
        }
        Command::Dump => {
            let document: BTreeMap<String, Value> = store.snapshot().into_iter().collect();
            let text = serde_json::to_string_pretty(&document)
                .context("Document cannot be printed as JSON")?;
            writeln!(out, "{}", text)?;
            Ok(true)
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays pipeable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = Store::open(StoreConfig::new(&cli.file))
        .with_context(|| format!("Failed to open {}", cli.file.display()))?;
    debug!("Opened {} with {} entries", cli.file.display(), store.len());

    let found = execute(&store, &cli.command, &mut std::io::stdout().lock())?;

    store
        .close()
        .with_context(|| format!("Failed to write {}", cli.file.display()))?;

    Ok(if found { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
