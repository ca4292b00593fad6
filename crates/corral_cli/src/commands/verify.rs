//! Verify command implementation.

use corral_store::{FileStore, Filter, Row, RowStore};
use std::collections::HashMap;
use std::path::Path;

/// Runs the verify command: checks the current-row and window-overlap
/// invariants on every object table, and reports the node table size.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(path)?;
    let mut problems = 0usize;

    for table in store.table_names()? {
        if !table.starts_with("obj_") {
            continue;
        }
        let rows: Vec<Row> = store
            .select(&table, &Filter::all())?
            .into_iter()
            .map(|(_, row)| row)
            .collect();
        problems += check_table(&table, &rows);
    }

    let node_rows = store.select("nodes", &Filter::all())?.len();
    println!("nodes table: {node_rows} row(s)");

    if problems == 0 {
        println!("ok: all invariants hold");
        Ok(())
    } else {
        Err(format!("{problems} invariant violation(s) found").into())
    }
}

/// Checks one object table; returns the number of violations found.
fn check_table(table: &str, rows: &[Row]) -> usize {
    let mut by_pid: HashMap<Vec<u8>, Vec<(u64, Option<u64>)>> = HashMap::new();
    for row in rows {
        let pid = row.bytes("pid").unwrap_or_default().to_vec();
        let from = row.u64("valid_from").unwrap_or(0);
        let to = row.u64("valid_to");
        by_pid.entry(pid).or_default().push((from, to));
    }

    let mut problems = 0;
    for (pid, mut windows) in by_pid {
        windows.sort_by_key(|(from, _)| *from);

        let current = windows.iter().filter(|(_, to)| to.is_none()).count();
        if current > 1 {
            println!("{table}: {} current rows for pid {pid:02x?}", current);
            problems += 1;
        }

        for pair in windows.windows(2) {
            let (_, prev_to) = pair[0];
            let (next_from, _) = pair[1];
            let closed_before_next = prev_to.map(|to| to <= next_from).unwrap_or(false);
            if !closed_before_next {
                println!("{table}: overlapping windows for pid {pid:02x?}");
                problems += 1;
            }
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_store::Value;

    fn version_row(pid: u8, from: u64, to: Option<u64>) -> Row {
        let mut row = Row::new()
            .with("pid", Value::Bytes(vec![pid; 16]))
            .with("valid_from", Value::U64(from));
        row.set(
            "valid_to",
            to.map(Value::U64).unwrap_or(Value::Null),
        );
        row
    }

    #[test]
    fn clean_history_passes() {
        let rows = vec![
            version_row(1, 10, Some(20)),
            version_row(1, 20, None),
            version_row(2, 5, None),
        ];
        assert_eq!(check_table("obj_dog", &rows), 0);
    }

    #[test]
    fn double_current_detected() {
        let rows = vec![version_row(1, 10, None), version_row(1, 20, None)];
        assert!(check_table("obj_dog", &rows) > 0);
    }

    #[test]
    fn overlap_detected() {
        let rows = vec![version_row(1, 10, Some(30)), version_row(1, 20, None)];
        assert!(check_table("obj_dog", &rows) > 0);
    }
}
