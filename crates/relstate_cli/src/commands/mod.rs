//! CLI command implementations.

pub mod inspect;
pub mod replay;

use relstate_core::{Config, Orm, SchemaDocument, Snapshot};
use std::fs;
use std::path::Path;

/// Reads a schema document and registers its models.
pub fn load_orm(path: &Path) -> Result<Orm, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read schema {path:?}: {e}"))?;
    Ok(SchemaDocument::from_json_str(&text)?.into_orm(Config::default())?)
}

/// Reads a snapshot file.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read snapshot {path:?}: {e}"))?;
    Ok(Snapshot::from_json(serde_json::from_str(&text)?)?)
}
