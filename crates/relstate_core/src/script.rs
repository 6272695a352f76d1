//! Action scripts.
//!
//! A script is a JSON array of steps, each naming an action, a model and
//! its data:
//!
//! ```json
//! [
//!   { "action": "CREATE", "model": "Author", "props": { "id": "1", "name": "Herbert" } },
//!   { "action": "CREATE", "model": "Book", "props": { "title": "Dune", "author": "1", "genres": ["g1"] } },
//!   { "action": "UPDATE", "model": "Book", "filter": { "author": "1" }, "patch": { "title": "Dune (1965)" } },
//!   { "action": "DELETE", "model": "Author", "filter": { "id": "1" } }
//! ]
//! ```
//!
//! Steps run through model handles and instances, so defaults, relation
//! normalization, many-to-many sync and cascades all apply.

use crate::entity::{DeleteOutcome, Id, Props};
use crate::error::CoreResult;
use crate::schema::Orm;
use crate::store::UpdateAction;
use crate::table::Snapshot;
use crate::transaction::{MutationMode, Session};
use relstate_codec::Record;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One step of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// `CREATE`, `UPDATE` or `DELETE`.
    pub action: String,
    /// Model name.
    pub model: String,
    /// Values for `CREATE`.
    #[serde(default, skip_serializing_if = "Record::is_empty")]
    pub props: Record,
    /// Equality lookup for `UPDATE` and `DELETE`. Absent means every row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Record>,
    /// Values for `UPDATE`.
    #[serde(default, skip_serializing_if = "Record::is_empty")]
    pub patch: Record,
}

impl ScriptStep {
    /// A `CREATE` step.
    pub fn create(model: impl Into<String>, props: Record) -> Self {
        Self {
            action: UpdateAction::Create.to_string(),
            model: model.into(),
            props,
            filter: None,
            patch: Record::new(),
        }
    }

    /// An `UPDATE` step.
    pub fn update(model: impl Into<String>, filter: Option<Record>, patch: Record) -> Self {
        Self {
            action: UpdateAction::Update.to_string(),
            model: model.into(),
            props: Record::new(),
            filter,
            patch,
        }
    }

    /// A `DELETE` step.
    pub fn delete(model: impl Into<String>, filter: Option<Record>) -> Self {
        Self {
            action: UpdateAction::Delete.to_string(),
            model: model.into(),
            props: Record::new(),
            filter,
            patch: Record::new(),
        }
    }
}

/// What one step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Id of the created row.
    Created(Id),
    /// Number of rows that changed.
    Updated(usize),
    /// Rows deleted and references nulled.
    Deleted(DeleteOutcome),
}

/// Parses a script from JSON text.
pub fn parse_script(input: &str) -> CoreResult<Vec<ScriptStep>> {
    serde_json::from_str(input).map_err(|e| relstate_codec::CodecError::from(e).into())
}

/// Runs one step in `session`.
///
/// # Errors
///
/// Returns `UnknownUpdateAction` for an action name other than `CREATE`,
/// `UPDATE` or `DELETE`, and any error the step's operation raises.
pub fn apply_step(session: &Session, step: &ScriptStep) -> CoreResult<StepOutcome> {
    let action: UpdateAction = step.action.parse()?;
    let handle = session.model(&step.model)?;
    let matched = || match &step.filter {
        Some(filter) => handle.filter(Props::from(filter.clone())),
        None => handle.all(),
    };

    match action {
        UpdateAction::Create => {
            let instance = handle.create(Props::from(step.props.clone()))?;
            Ok(StepOutcome::Created(instance.id().clone()))
        }
        UpdateAction::Update => {
            let mut changed = 0;
            for mut instance in matched().to_entities()? {
                if instance.update(Props::from(step.patch.clone()))? {
                    changed += 1;
                }
            }
            Ok(StepOutcome::Updated(changed))
        }
        UpdateAction::Delete => Ok(StepOutcome::Deleted(matched().delete()?)),
    }
}

/// Replays `steps` on `previous` (or the empty state) and returns the result.
///
/// # Errors
///
/// Stops at the first failing step. In [`MutationMode::CopyOnWrite`] no
/// state is returned; the caller's `previous` snapshot is untouched.
pub fn replay(
    orm: &Orm,
    previous: Option<Snapshot>,
    steps: &[ScriptStep],
    mode: MutationMode,
) -> CoreResult<Snapshot> {
    let session = match mode {
        MutationMode::CopyOnWrite => orm.session(previous)?,
        MutationMode::InPlace => orm.bulk_session(previous)?,
    };
    for (index, step) in steps.iter().enumerate() {
        if let Err(e) = apply_step(&session, step) {
            warn!(step = index, action = %step.action, model = %step.model, error = %e, "script step failed");
            return Err(e);
        }
    }
    debug!(steps = steps.len(), ?mode, "replayed script");
    Ok(session.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::schema::{ForeignKey, ModelDef};
    use relstate_codec::record;

    fn orm() -> Orm {
        let mut orm = Orm::new();
        orm.register([
            ModelDef::new("Author").attribute("name"),
            ModelDef::new("Genre").attribute("name"),
            ModelDef::new("Book")
                .attribute("title")
                .field("author", ForeignKey::new("Author").on_delete_cascade())
                .many_to_many("genres", "Genre"),
        ])
        .unwrap();
        orm
    }

    const SCRIPT: &str = r#"[
        { "action": "CREATE", "model": "Author", "props": { "id": "1", "name": "Herbert" } },
        { "action": "CREATE", "model": "Book", "props": { "id": "10", "author": 1, "genres": ["g1", "g2"] } },
        { "action": "UPDATE", "model": "Book", "filter": { "author": 1 }, "patch": { "title": "Dune" } }
    ]"#;

    #[test]
    fn replays_through_entities() {
        let orm = orm();
        let steps = parse_script(SCRIPT).unwrap();
        let state = replay(&orm, None, &steps, MutationMode::CopyOnWrite).unwrap();

        let book = state.table("Book").unwrap().get(&Id::new("10")).unwrap().clone();
        assert_eq!(book["author"], relstate_codec::Value::from("1"));
        assert_eq!(book["title"], relstate_codec::Value::from("Dune"));
        assert_eq!(state.table("BookGenres").unwrap().len(), 2);
    }

    #[test]
    fn delete_steps_cascade() {
        let orm = orm();
        let mut steps = parse_script(SCRIPT).unwrap();
        steps.push(ScriptStep::delete("Author", Some(record! { "id" => "1" })));
        let state = replay(&orm, None, &steps, MutationMode::InPlace).unwrap();

        assert!(state.table("Author").unwrap().is_empty());
        assert!(state.table("Book").unwrap().is_empty());
        assert!(state.table("BookGenres").unwrap().is_empty());
    }

    #[test]
    fn unknown_action_is_rejected() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let step = ScriptStep {
            action: "UPSERT".into(),
            ..ScriptStep::create("Author", record! {})
        };
        let err = apply_step(&session, &step).unwrap_err();
        assert!(matches!(err, CoreError::UnknownUpdateAction { .. }));
    }

    #[test]
    fn update_counts_changed_rows_only() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        for step in parse_script(SCRIPT).unwrap() {
            apply_step(&session, &step).unwrap();
        }
        let again = ScriptStep::update("Book", None, record! { "title" => "Dune" });
        assert_eq!(apply_step(&session, &again).unwrap(), StepOutcome::Updated(0));
    }
}
