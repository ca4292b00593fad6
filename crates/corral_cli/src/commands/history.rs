//! History command implementation.

use corral_store::{FileStore, Filter, Predicate, RowStore, Value};
use serde::Serialize;
use std::path::Path;

/// One version window of an object, for display.
#[derive(Debug, Serialize)]
pub struct WindowReport {
    /// Window opening stamp.
    pub valid_from: u64,
    /// Window closing stamp; `None` marks the current version.
    pub valid_to: Option<u64>,
    /// Transaction that wrote the version.
    pub writer: u64,
    /// Stored payload size in bytes.
    pub payload_bytes: usize,
}

/// Runs the history command.
pub fn run(
    path: &Path,
    table: &str,
    id: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(path)?;
    let pid = parse_uuid(id)?;

    let filter = Filter::all().and("pid", Predicate::Eq(Value::Bytes(pid.to_vec())));
    let mut windows: Vec<WindowReport> = store
        .select(table, &filter)?
        .iter()
        .map(|(_, row)| WindowReport {
            valid_from: row.u64("valid_from").unwrap_or(0),
            valid_to: row.u64("valid_to"),
            writer: row.u64("writer").unwrap_or(0),
            payload_bytes: row.bytes("payload").map(<[u8]>::len).unwrap_or(0),
        })
        .collect();
    windows.sort_by_key(|w| w.valid_from);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&windows)?),
        _ => {
            if windows.is_empty() {
                println!("no versions of {id} in {table}");
            }
            for window in &windows {
                let until = window
                    .valid_to
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "current".to_string());
                println!(
                    "[{} .. {})  txn {}  {} bytes",
                    window.valid_from, until, window.writer, window.payload_bytes
                );
            }
        }
    }
    Ok(())
}

/// Parses a hyphenated uuid into raw bytes without a uuid dependency.
fn parse_uuid(id: &str) -> Result<[u8; 16], String> {
    let hex: String = id.chars().filter(|c| *c != '-').collect();
    if hex.len() != 32 {
        return Err(format!("not a uuid: {id}"));
    }
    let mut bytes = [0u8; 16];
    for (i, slot) in bytes.iter_mut().enumerate() {
        let pair = &hex[i * 2..i * 2 + 2];
        *slot = u8::from_str_radix(pair, 16).map_err(|_| format!("not a uuid: {id}"))?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hyphenated_uuid() {
        let bytes = parse_uuid("00010203-0405-0607-0809-0a0b0c0d0e0f").unwrap();
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[15], 0x0f);
    }

    #[test]
    fn reject_malformed_uuid() {
        assert!(parse_uuid("not-a-uuid").is_err());
    }
}
