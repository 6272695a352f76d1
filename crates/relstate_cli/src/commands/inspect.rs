//! Inspect command implementation.

use super::{load_orm, load_snapshot};
use relstate_core::{Orm, Snapshot};
use serde::Serialize;
use std::path::Path;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// Number of tables.
    pub table_count: usize,
    /// Rows across all tables.
    pub row_count: usize,
    /// Per-table statistics.
    pub tables: Vec<TableStats>,
    /// Registered models with no table in the snapshot.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_tables: Vec<String>,
    /// Tables for models the schema does not declare.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_tables: Vec<String>,
}

/// Statistics for one table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Model name.
    pub model: String,
    /// Number of rows.
    pub rows: usize,
    /// Largest numeric id handed out, if any.
    pub max_id: Option<i64>,
}

/// Runs the inspect command.
pub fn run(path: &Path, schema: Option<&Path>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = load_snapshot(path)?;
    let orm = schema.map(load_orm).transpose()?;
    let result = summarize(&path.display().to_string(), &snapshot, orm.as_ref())?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Summarizes `snapshot`, comparing its tables with `orm`'s models if given.
pub fn summarize(
    path: &str,
    snapshot: &Snapshot,
    orm: Option<&Orm>,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let tables: Vec<TableStats> = snapshot
        .models()
        .filter_map(|model| {
            snapshot.table(model).map(|table| TableStats {
                model: model.to_string(),
                rows: table.len(),
                max_id: table.meta().max_id,
            })
        })
        .collect();

    let mut missing_tables = Vec::new();
    let mut unknown_tables = Vec::new();
    if let Some(orm) = orm {
        let schema = orm.build_schema()?;
        missing_tables = schema
            .models()
            .filter(|model| snapshot.table(&model.name).is_none())
            .map(|model| model.name.clone())
            .collect();
        unknown_tables = snapshot
            .models()
            .filter(|model| schema.model(model).is_err())
            .map(str::to_string)
            .collect();
    }

    Ok(InspectResult {
        path: path.to_string(),
        table_count: tables.len(),
        row_count: tables.iter().map(|t| t.rows).sum(),
        tables,
        missing_tables,
        unknown_tables,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("relstate Snapshot Inspection");
    println!("============================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Tables: {}", result.table_count);
    println!("Rows:   {}", result.row_count);
    println!();
    for table in &result.tables {
        match table.max_id {
            Some(max_id) => println!("  {:<24} {:>8} rows  (max id {max_id})", table.model, table.rows),
            None => println!("  {:<24} {:>8} rows", table.model, table.rows),
        }
    }

    if !result.missing_tables.is_empty() {
        println!();
        println!("Missing tables: {}", result.missing_tables.join(", "));
    }
    if !result.unknown_tables.is_empty() {
        println!();
        println!("Unknown tables: {}", result.unknown_tables.join(", "));
    }
}
