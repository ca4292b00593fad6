//! Nodes command implementation.

use corral_store::{FileStore, Filter, RowStore};
use serde::Serialize;
use std::path::Path;

/// One row of the membership table, for display.
#[derive(Debug, Serialize)]
pub struct NodeReport {
    /// Node index.
    pub index: u64,
    /// Reachable addresses.
    pub addresses: String,
    /// Command port.
    pub command_port: u64,
    /// Last heartbeat stamp (milliseconds since epoch).
    pub heartbeat: u64,
    /// Stored alive flag.
    pub alive: bool,
}

/// Runs the nodes command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(path)?;
    let rows = store.select("nodes", &Filter::all())?;

    let reports: Vec<NodeReport> = rows
        .iter()
        .map(|(_, row)| NodeReport {
            index: row.u64("index").unwrap_or(0),
            addresses: row.str("addresses").unwrap_or("").to_string(),
            command_port: row.u64("command_port").unwrap_or(0),
            heartbeat: row.u64("heartbeat").unwrap_or(0),
            alive: row.bool("alive").unwrap_or(false),
        })
        .collect();
    tracing::debug!(rows = reports.len(), "loaded node table");

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&reports)?),
        _ => {
            if reports.is_empty() {
                println!("no nodes registered");
            }
            for report in &reports {
                println!(
                    "node {:>3}  {}  port {}  heartbeat {}  alive {}",
                    report.index,
                    report.addresses,
                    report.command_port,
                    report.heartbeat,
                    report.alive
                );
            }
        }
    }
    Ok(())
}
