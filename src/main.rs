mod cli;

use std::collections::BTreeMap;
use std::path::Path;

use clap::Parser;
use paramstore::io::{DataEntry, EntryType, LogRead, LogStore};
use paramstore::util::expand_home;
use paramstore::{FileParameterStore, ParameterStore, StoreError};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, GetTarget};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Reads every entry of the log in file order. A cut-off tail is reported
/// and ends the scan; entries before it are still returned.
fn read_entries(path: &Path, frame_size: usize) -> Result<(Vec<DataEntry>, LogStore), StoreError> {
    let mut log = LogStore::open_read_only(path, frame_size)?;
    let LogRead { entries, truncated } = log.read()?;
    if let Some(err) = truncated {
        eprintln!("Warning: {err}");
    }
    Ok((entries, log))
}

fn entry_json(entry: &DataEntry) -> Value {
    let data = serde_json::from_slice::<Value>(&entry.data)
        .unwrap_or_else(|_| Value::String(hex::encode(&entry.data)));
    json!({
        "type": entry.kind.to_string(),
        "id": hex::encode(&entry.id),
        "data": data,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let path = expand_home(&cli.log);
    if !path.is_file() {
        eprintln!("Log does not exist: {}", path.display());
        std::process::exit(2);
    }

    match cli.command {
        Command::Stats => {
            let (entries, log) = read_entries(&path, cli.frame_size)?;
            let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
            for entry in &entries {
                *by_type.entry(entry.kind.to_string()).or_default() += 1;
            }
            let stats = log.stats();
            let size = fs_err::metadata(&path)?.len();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "path": path.display().to_string(),
                    "bytes": size,
                    "read_offset": stats.read_offset,
                    "pending_frames": stats.pending_frames,
                    "truncated_at": stats.truncated_at,
                    "entries": entries.len(),
                    "by_type": by_type,
                }))?
            );
            Ok(())
        }

        Command::Dump { raw: true } => {
            let (entries, _) = read_entries(&path, cli.frame_size)?;
            for entry in &entries {
                println!("{}", entry_json(entry));
            }
            Ok(())
        }

        Command::Dump { raw: false } => {
            let store = FileParameterStore::open_read_only(&path, cli.frame_size, Map::new())?;
            for parameters in store.all_parameters()? {
                let line = json!({
                    "type": EntryType::Parameters.to_string(),
                    "data": serde_json::to_value(&parameters)?,
                });
                println!("{line}");
            }
            for set in store.all_parameter_sets()? {
                let line = json!({
                    "type": EntryType::ParameterSet.to_string(),
                    "data": serde_json::to_value(&set)?,
                });
                println!("{line}");
            }
            Ok(())
        }

        Command::Get { target } => {
            let store = FileParameterStore::open_read_only(&path, cli.frame_size, Map::new())?;
            let found = match target {
                GetTarget::Parameters { id } => store
                    .parameters_by_id(&hex::decode(&id)?)?
                    .map(serde_json::to_value)
                    .transpose()?,
                GetTarget::Set { hash } => store
                    .parameter_set(&hex::decode(&hash)?)?
                    .map(serde_json::to_value)
                    .transpose()?,
            };
            match found {
                Some(value) => {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                    Ok(())
                }
                None => {
                    eprintln!("Not found");
                    std::process::exit(1);
                }
            }
        }
    }
}
