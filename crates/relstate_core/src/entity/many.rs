//! Many-to-many synchronization.
//!
//! Edges live as rows of the relation's join model. Every function here
//! reads and writes join rows from one side of a [`ManyToManyPath`]; the
//! other side sees the same rows through the reversed path, so both views
//! always agree.

use crate::entity::{Id, Props};
use crate::error::{CoreError, CoreResult};
use crate::schema::ManyToManyPath;
use crate::store::{QuerySpec, UpdateSpec};
use crate::table::{Clause, Predicate};
use crate::transaction::Session;
use relstate_codec::Record;
use std::collections::HashSet;
use tracing::trace;

/// Edges to add and remove to turn one id list into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDiff {
    /// Ids in the desired list but not the current one, in desired order.
    pub to_add: Vec<Id>,
    /// Ids in the current list but not the desired one, in current order.
    pub to_remove: Vec<Id>,
}

/// Compares current and desired membership.
///
/// Returns `None` when both lists hold the same ids.
pub fn diff(current: &[Id], desired: &[Id]) -> Option<EdgeDiff> {
    let current_set: HashSet<&Id> = current.iter().collect();
    let desired_set: HashSet<&Id> = desired.iter().collect();

    let to_add: Vec<Id> = desired
        .iter()
        .filter(|id| !current_set.contains(id))
        .cloned()
        .collect();
    let to_remove: Vec<Id> = current
        .iter()
        .filter(|id| !desired_set.contains(id))
        .cloned()
        .collect();

    if to_add.is_empty() && to_remove.is_empty() {
        None
    } else {
        Some(EdgeDiff { to_add, to_remove })
    }
}

fn edges_from(path: &ManyToManyPath, source: &Id) -> QuerySpec {
    QuerySpec::new(&path.through).clause(Clause::Filter(Predicate::Equals(Record::from([(
        path.this_column().to_string(),
        source.to_value(),
    )]))))
}

/// Ids linked to `source`, in the order the edges were created.
pub(crate) fn linked_ids(session: &Session, path: &ManyToManyPath, source: &Id) -> CoreResult<Vec<Id>> {
    let rows = session.query(&edges_from(path, source))?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get(path.other_column()))
        .filter(|v| !v.is_null())
        .map(Id::from_value)
        .collect())
}

/// Creates one join row per id.
pub(crate) fn create_specs(
    session: &Session,
    path: &ManyToManyPath,
    source: &Id,
    ids: &[Id],
) -> CoreResult<Vec<UpdateSpec>> {
    let through = session.model(&path.through)?;
    ids.iter()
        .map(|id| {
            let props = Props::new()
                .set(path.this_column(), source.to_value())
                .set(path.other_column(), id.to_value());
            Ok(UpdateSpec::Create {
                table: path.through.clone(),
                row: through.prepare(props, true)?.attrs,
            })
        })
        .collect()
}

/// Deletes the join rows linking `source` to any of `ids`.
pub(crate) fn delete_spec(path: &ManyToManyPath, source: &Id, ids: &[Id]) -> UpdateSpec {
    let targets: HashSet<Id> = ids.iter().cloned().collect();
    let other = path.other_column().to_string();
    UpdateSpec::Delete {
        query: edges_from(path, source).clause(Clause::Filter(Predicate::func(move |row| {
            row.get(&other)
                .map(|v| targets.contains(&Id::from_value(v)))
                .unwrap_or(false)
        }))),
    }
}

/// Updates that apply `diff` for `source`.
pub(crate) fn diff_specs(
    session: &Session,
    path: &ManyToManyPath,
    source: &Id,
    diff: &EdgeDiff,
) -> CoreResult<Vec<UpdateSpec>> {
    let mut specs = Vec::with_capacity(diff.to_add.len() + 1);
    if !diff.to_remove.is_empty() {
        specs.push(delete_spec(path, source, &diff.to_remove));
    }
    specs.extend(create_specs(session, path, source, &diff.to_add)?);
    Ok(specs)
}

/// Makes `source` linked to exactly `desired`. Returns whether anything changed.
pub(crate) fn sync(session: &Session, path: &ManyToManyPath, source: &Id, desired: &[Id]) -> CoreResult<bool> {
    let current = linked_ids(session, path, source)?;
    let Some(diff) = diff(&current, desired) else {
        return Ok(false);
    };
    trace!(
        through = %path.through,
        %source,
        add = diff.to_add.len(),
        remove = diff.to_remove.len(),
        "syncing edges"
    );
    session.apply_updates(diff_specs(session, path, source, &diff)?)?;
    Ok(true)
}

/// Links `source` to `ids`.
///
/// Already linked ids are an error when `strict`, skipped otherwise.
pub(crate) fn add(session: &Session, path: &ManyToManyPath, source: &Id, ids: &[Id], strict: bool) -> CoreResult<()> {
    let current: HashSet<Id> = linked_ids(session, path, source)?.into_iter().collect();
    if strict {
        if let Some(id) = ids.iter().find(|id| current.contains(*id)) {
            return Err(CoreError::relation_value(
                path.this_model(),
                side_field(path),
                format!("{} {id} is already linked to {source}", path.other_model()),
            ));
        }
    }
    let to_add: Vec<Id> = ids.iter().filter(|id| !current.contains(*id)).cloned().collect();
    if to_add.is_empty() {
        return Ok(());
    }
    session.apply_updates(create_specs(session, path, source, &to_add)?)?;
    Ok(())
}

/// Unlinks `source` from `ids`.
///
/// Ids that are not linked are an error when `strict`, skipped otherwise.
pub(crate) fn remove(session: &Session, path: &ManyToManyPath, source: &Id, ids: &[Id], strict: bool) -> CoreResult<()> {
    let current: HashSet<Id> = linked_ids(session, path, source)?.into_iter().collect();
    if strict {
        if let Some(id) = ids.iter().find(|id| !current.contains(*id)) {
            return Err(CoreError::relation_value(
                path.this_model(),
                side_field(path),
                format!("{} {id} is not linked to {source}", path.other_model()),
            ));
        }
    }
    let to_remove: Vec<Id> = ids.iter().filter(|id| current.contains(*id)).cloned().collect();
    if to_remove.is_empty() {
        return Ok(());
    }
    session.apply_update(delete_spec(path, source, &to_remove))?;
    Ok(())
}

/// Unlinks `source` from everything.
pub(crate) fn clear(session: &Session, path: &ManyToManyPath, source: &Id) -> CoreResult<()> {
    session.apply_update(UpdateSpec::Delete {
        query: edges_from(path, source),
    })?;
    Ok(())
}

/// Field name of the relation as seen from `path`'s side.
fn side_field(path: &ManyToManyPath) -> String {
    if path.forward {
        path.field.clone()
    } else {
        format!("{}.{}", path.owner, path.field)
    }
}
