//! Replay command implementation.

use super::{load_orm, load_snapshot};
use relstate_core::{parse_script, replay, MutationMode, Snapshot};
use std::fs;
use std::path::Path;
use tracing::info;

/// Runs the replay command.
pub fn run(
    schema: &Path,
    script: &Path,
    snapshot: Option<&Path>,
    output: Option<&Path>,
    bulk: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let orm = load_orm(schema)?;
    let previous = snapshot.map(load_snapshot).transpose()?;
    let text = fs::read_to_string(script).map_err(|e| format!("cannot read script {script:?}: {e}"))?;
    let steps = parse_script(&text)?;

    let mode = if bulk {
        MutationMode::InPlace
    } else {
        MutationMode::CopyOnWrite
    };
    let state = replay(&orm, previous, &steps, mode)?;
    info!(steps = steps.len(), rows = row_total(&state), "replay finished");

    let json = serde_json::to_string_pretty(&state.to_json()?)?;
    match output {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn row_total(state: &Snapshot) -> usize {
    state
        .models()
        .filter_map(|model| state.table(model))
        .map(|table| table.len())
        .sum()
}
