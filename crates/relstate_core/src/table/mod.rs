//! Per-model tables.
//!
//! A [`Table`] holds no rows itself. It knows its model name and id
//! attribute and applies insert, update, delete and query operations to a
//! [`TableState`] it is handed, the same way for every model.

mod query;
mod sequence;
mod state;

pub use query::{Clause, Direction, KeyFn, Predicate, RowPredicate, SortKey, SortSpec};
pub use sequence::{id_sequencer, NON_NUMERIC_SENTINEL};
pub use state::{Row, Snapshot, TableMeta, TableState};

use crate::entity::Id;
use crate::error::{CoreError, CoreResult};
use crate::stats::StoreStats;
use relstate_codec::Record;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Operations on the rows of one model.
#[derive(Debug, Clone)]
pub struct Table {
    model: String,
    id_attribute: String,
    stats: Arc<StoreStats>,
}

impl Table {
    /// Creates a table for `model`.
    pub fn new(model: impl Into<String>, id_attribute: impl Into<String>, stats: Arc<StoreStats>) -> Self {
        Self {
            model: model.into(),
            id_attribute: id_attribute.into(),
            stats,
        }
    }

    /// Model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Id attribute.
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// Reads the canonical id of a row.
    pub fn id_of(&self, row: &Record) -> Id {
        row.get(&self.id_attribute)
            .map_or_else(|| Id::new("null"), Id::from_value)
    }

    /// Inserts a row, assigning an id if none is supplied.
    pub fn insert(&self, state: &mut TableState, mut row: Record) -> CoreResult<Row> {
        let (max_id, id_value) = id_sequencer(state.meta().max_id, row.get(&self.id_attribute))?;
        let id = Id::from_value(&id_value);
        if state.contains(&id) {
            return Err(CoreError::duplicate_id(&self.model, id.as_str()));
        }
        row.insert(self.id_attribute.clone(), id_value);

        let row = Arc::new(row);
        state.push(id.clone(), row.clone());
        state.set_max_id(max_id);
        self.stats.record_inserted(1);
        trace!(model = %self.model, %id, "inserted row");
        Ok(row)
    }

    /// Shallow-merges `patch` over each matched row. The id attribute in the
    /// patch is ignored. Returns the replaced rows.
    pub fn update(&self, state: &mut TableState, matched: &[Row], patch: &Record) -> Vec<Row> {
        let updated: Vec<(Id, Row)> = matched
            .iter()
            .filter(|row| state.contains(&self.id_of(row)))
            .map(|row| {
                let mut next = Record::clone(row);
                for (key, value) in patch {
                    if *key != self.id_attribute {
                        next.insert(key.clone(), value.clone());
                    }
                }
                (self.id_of(row), Arc::new(next))
            })
            .collect();

        let rows: Vec<Row> = updated.iter().map(|(_, row)| row.clone()).collect();
        if !updated.is_empty() {
            state.replace_rows(updated);
            self.stats.record_updated(rows.len() as u64);
        }
        rows
    }

    /// Removes each matched row. Returns the number removed.
    pub fn delete(&self, state: &mut TableState, matched: &[Row]) -> usize {
        let ids: HashSet<Id> = matched.iter().map(|row| self.id_of(row)).collect();
        let removed = state.remove_ids(&ids);
        self.stats.record_deleted(removed as u64);
        removed
    }

    /// Evaluates clauses against the state.
    pub fn query(&self, state: &TableState, clauses: &[Clause]) -> Vec<Row> {
        query::evaluate(
            state.rows(),
            |id| state.get(id),
            clauses,
            &self.id_attribute,
            &self.stats,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relstate_codec::{record, Value};

    fn table() -> Table {
        Table::new("Book", "id", Arc::new(StoreStats::new()))
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let table = table();
        let mut state = TableState::new();
        let a = table.insert(&mut state, record! { "title" => "A" }).unwrap();
        let b = table.insert(&mut state, record! { "title" => "B" }).unwrap();

        assert_eq!(a["id"], Value::from("0"));
        assert_eq!(b["id"], Value::from("1"));
        assert_eq!(state.meta().max_id, Some(1));
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let table = table();
        let mut state = TableState::new();
        table.insert(&mut state, record! { "id" => 10 }).unwrap();
        let err = table.insert(&mut state, record! { "id" => "10" }).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { .. }));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn insert_keeps_numeric_text_ids_verbatim() {
        let table = table();
        let mut state = TableState::new();
        let row = table.insert(&mut state, record! { "id" => "05" }).unwrap();

        assert_eq!(row["id"], Value::from("05"));
        assert!(state.contains(&Id::new("05")));
        assert_eq!(state.meta().max_id, Some(5));
        let next = table.insert(&mut state, record! {}).unwrap();
        assert_eq!(next["id"], Value::from("6"));
    }

    #[test]
    fn insert_fails_when_sequence_is_exhausted() {
        let table = table();
        let mut state = TableState::new();
        table.insert(&mut state, record! { "id" => i64::MAX }).unwrap();

        let err = table.insert(&mut state, record! { "title" => "A" }).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert_eq!(state.len(), 1);
        assert_eq!(state.meta().max_id, Some(i64::MAX));
    }

    #[test]
    fn update_merges_and_keeps_id() {
        let table = table();
        let mut state = TableState::new();
        let row = table.insert(&mut state, record! { "id" => "1", "title" => "A", "pages" => 1 }).unwrap();

        let updated = table.update(
            &mut state,
            &[row],
            &record! { "id" => "99", "title" => "B" },
        );
        assert_eq!(updated.len(), 1);

        let stored = state.get(&Id::new("1")).unwrap();
        assert_eq!(stored["title"], Value::from("B"));
        assert_eq!(stored["pages"], Value::Integer(1));
        assert_eq!(stored["id"], Value::from("1"));
    }

    #[test]
    fn delete_removes_from_both_views() {
        let table = table();
        let mut state = TableState::new();
        let a = table.insert(&mut state, record! {}).unwrap();
        table.insert(&mut state, record! {}).unwrap();

        assert_eq!(table.delete(&mut state, &[a.clone()]), 1);
        assert_eq!(state.ids().collect::<Vec<_>>(), [&Id::new("1")]);
        assert!(state.get(&Id::new("0")).is_none());
        assert_eq!(table.delete(&mut state, &[a]), 0);
    }

    #[test]
    fn query_uses_state_order() {
        let table = table();
        let mut state = TableState::new();
        table.insert(&mut state, record! { "id" => "b" }).unwrap();
        table.insert(&mut state, record! { "id" => "a" }).unwrap();

        let ids: Vec<_> = table
            .query(&state, &[])
            .iter()
            .map(|r| table.id_of(r))
            .collect();
        assert_eq!(ids, vec![Id::new("b"), Id::new("a")]);
    }
}
