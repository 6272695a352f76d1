//! Reducer adapter.
//!
//! A host application holds a [`Snapshot`] in its own state tree and feeds
//! actions through [`reduce`], which opens a session on the previous state,
//! lets every model react to the action, and hands back the next state.

use crate::entity::ModelHandle;
use crate::error::CoreResult;
use crate::schema::Orm;
use crate::table::Snapshot;
use relstate_codec::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Per-model reaction to an action.
pub type ReducerFn = Arc<dyn Fn(&Action, &ModelHandle<'_>) -> CoreResult<()> + Send + Sync>;

/// An action dispatched by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Action name.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Action data.
    #[serde(default)]
    pub payload: Value,
}

impl Action {
    /// Creates an action.
    pub fn new(action_type: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: payload.into(),
        }
    }
}

/// Runs `action` through every model's reducer hook, in registration order.
///
/// Starts from `previous`, or from the empty state. When no hook writes,
/// the returned snapshot is the previous one, unchanged.
///
/// # Errors
///
/// Returns the first error a hook raises. Writes made before it are dropped.
pub fn reduce(orm: &Orm, previous: Option<Snapshot>, action: &Action) -> CoreResult<Snapshot> {
    let session = orm.session(previous)?;
    let mut hooks = 0usize;
    for handle in session.models() {
        let Some(hook) = handle.schema().reducer.clone() else {
            continue;
        };
        hook(action, &handle)?;
        hooks += 1;
    }
    debug!(action = %action.action_type, hooks, written = session.written().len(), "reduced action");
    Ok(session.snapshot())
}
