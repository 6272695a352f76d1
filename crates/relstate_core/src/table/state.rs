//! Table state and whole-database snapshots.
//!
//! Both types are persistent. A table keeps its id order in an
//! [`imbl::Vector`] and its rows in an [`imbl::HashMap`], so copying a table
//! for a write shares every untouched node and row with the original, and a
//! single insert, update or lookup stays logarithmic in the table size.
//!
//! Each collection sits behind an `Arc` and is written through
//! [`Arc::make_mut`]. A clone held elsewhere (an older snapshot, a selector
//! memo) never observes a later write, and an untouched table or row keeps
//! its pointer across writes. That pointer identity is what memoized
//! selectors compare.

use crate::entity::Id;
use crate::error::{CoreError, CoreResult};
use relstate_codec::Record;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// An immutable row. Replaced wholesale on update, never edited in place.
pub type Row = Arc<Record>;

/// Per-table metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    /// Largest numeric id seen so far, `None` for a table that never had rows.
    #[serde(rename = "maxId", default, skip_serializing_if = "Option::is_none")]
    pub max_id: Option<i64>,
}

/// The rows of one model.
///
/// Invariant: every id in `items` appears exactly once and has exactly one
/// entry in `items_by_id`, and `items_by_id` has no other entries.
#[derive(Debug, Clone, Default)]
pub struct TableState {
    items: Arc<imbl::Vector<Id>>,
    items_by_id: Arc<imbl::HashMap<Id, Row>>,
    meta: TableMeta,
}

impl TableState {
    /// Creates an empty table state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table state from its parts, checking the table invariant.
    pub fn from_parts(
        items: Vec<Id>,
        items_by_id: HashMap<Id, Row>,
        meta: TableMeta,
    ) -> CoreResult<Self> {
        let mut seen = HashSet::with_capacity(items.len());
        for id in &items {
            if !seen.insert(id) {
                return Err(CoreError::invalid_snapshot(format!(
                    "id {id} listed twice in items"
                )));
            }
            if !items_by_id.contains_key(id) {
                return Err(CoreError::invalid_snapshot(format!(
                    "id {id} has no entry in itemsById"
                )));
            }
        }
        if items_by_id.len() != items.len() {
            return Err(CoreError::invalid_snapshot(format!(
                "itemsById has {} entries for {} items",
                items_by_id.len(),
                items.len()
            )));
        }
        Ok(Self {
            items: Arc::new(items.into_iter().collect()),
            items_by_id: Arc::new(items_by_id.into_iter().collect()),
            meta,
        })
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &Id> + '_ {
        self.items.iter()
    }

    /// Looks up a row by id.
    pub fn get(&self, id: &Id) -> Option<&Row> {
        self.items_by_id.get(id)
    }

    /// Returns whether a row with this id exists.
    pub fn contains(&self, id: &Id) -> bool {
        self.items_by_id.contains_key(id)
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.items.iter().filter_map(|id| self.items_by_id.get(id))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Table metadata.
    pub fn meta(&self) -> TableMeta {
        self.meta
    }

    /// Returns whether `items` is the same allocation in both states.
    pub fn items_ptr_eq(&self, other: &TableState) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }

    /// Returns whether the row for `id` is the same allocation in both states
    /// (or absent from both).
    pub fn row_ptr_eq(&self, other: &TableState, id: &Id) -> bool {
        match (self.get(id), other.get(id)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    pub(crate) fn push(&mut self, id: Id, row: Row) {
        Arc::make_mut(&mut self.items).push_back(id.clone());
        Arc::make_mut(&mut self.items_by_id).insert(id, row);
    }

    pub(crate) fn replace_rows(&mut self, rows: impl IntoIterator<Item = (Id, Row)>) {
        let by_id = Arc::make_mut(&mut self.items_by_id);
        for (id, row) in rows {
            by_id.insert(id, row);
        }
    }

    pub(crate) fn remove_ids(&mut self, ids: &HashSet<Id>) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let by_id = Arc::make_mut(&mut self.items_by_id);
        let removed = ids.iter().filter(|id| by_id.remove(*id).is_some()).count();
        if removed > 0 {
            let items = Arc::make_mut(&mut self.items);
            *items = items.iter().filter(|id| !ids.contains(*id)).cloned().collect();
        }
        removed
    }

    pub(crate) fn set_max_id(&mut self, max_id: i64) {
        self.meta.max_id = Some(max_id);
    }
}

/// Serialized form of a table borrowed from the live state.
#[derive(Serialize)]
struct TableStateRef<'a> {
    items: Vec<&'a Id>,
    #[serde(rename = "itemsById")]
    items_by_id: BTreeMap<&'a Id, &'a Record>,
    meta: &'a TableMeta,
}

/// Serialized form of a table read from input.
#[derive(Deserialize)]
struct TableStateRepr {
    items: Vec<Id>,
    #[serde(rename = "itemsById")]
    items_by_id: HashMap<Id, Record>,
    #[serde(default)]
    meta: TableMeta,
}

impl Serialize for TableState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TableStateRef {
            items: self.items.iter().collect(),
            items_by_id: self
                .items_by_id
                .iter()
                .map(|(id, row)| (id, row.as_ref()))
                .collect(),
            meta: &self.meta,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TableState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = TableStateRepr::deserialize(deserializer)?;
        let by_id = repr
            .items_by_id
            .into_iter()
            .map(|(id, row)| (id, Arc::new(row)))
            .collect();
        TableState::from_parts(repr.items, by_id, repr.meta).map_err(D::Error::custom)
    }
}

/// A whole-database state: model name to table state.
///
/// Snapshots are the unit a session reads from and a batch produces.
/// Serialized, a snapshot is a map `{model: {items, itemsById, meta}}`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    tables: Arc<BTreeMap<String, Arc<TableState>>>,
}

impl Snapshot {
    /// Creates a snapshot with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a snapshot from table states.
    pub fn from_tables(tables: impl IntoIterator<Item = (String, TableState)>) -> Self {
        Self {
            tables: Arc::new(
                tables
                    .into_iter()
                    .map(|(name, table)| (name, Arc::new(table)))
                    .collect(),
            ),
        }
    }

    /// Returns the table state for `model`.
    pub fn table(&self, model: &str) -> Option<&Arc<TableState>> {
        self.tables.get(model)
    }

    /// Model names present in this snapshot.
    pub fn models(&self) -> impl Iterator<Item = &str> + '_ {
        self.tables.keys().map(String::as_str)
    }

    /// Returns whether both snapshots are the same allocation.
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.tables, &other.tables)
    }

    /// Returns whether `model`'s table is the same allocation in both
    /// snapshots (or absent from both).
    pub fn table_ptr_eq(&self, other: &Snapshot, model: &str) -> bool {
        match (self.table(model), other.table(model)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Serializes the snapshot to a JSON value.
    pub fn to_json(&self) -> CoreResult<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| CoreError::invalid_snapshot(format!("failed to serialize: {e}")))
    }

    /// Reads a snapshot from a JSON value, validating every table.
    pub fn from_json(json: serde_json::Value) -> CoreResult<Self> {
        serde_json::from_value(json).map_err(|e| CoreError::invalid_snapshot(e.to_string()))
    }

    pub(crate) fn contains(&self, model: &str) -> bool {
        self.tables.contains_key(model)
    }

    /// Mutable access to a table, copying shared structure on first write.
    /// A missing table is created empty.
    pub(crate) fn table_mut(&mut self, model: &str) -> &mut TableState {
        let tables = Arc::make_mut(&mut self.tables);
        let table = tables.entry(model.to_string()).or_default();
        Arc::make_mut(table)
    }

    pub(crate) fn insert_empty(&mut self, model: &str) {
        Arc::make_mut(&mut self.tables)
            .entry(model.to_string())
            .or_default();
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for (name, table) in self.tables.iter() {
            map.serialize_entry(name, table.as_ref())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tables = BTreeMap::<String, TableState>::deserialize(deserializer)?;
        Ok(Snapshot::from_tables(tables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relstate_codec::record;
    use serde_json::json;

    fn row(id: &str) -> (Id, Row) {
        (Id::new(id), Arc::new(record! { "id" => id }))
    }

    fn two_rows() -> TableState {
        let mut state = TableState::new();
        for id in ["a", "b"] {
            let (id, row) = row(id);
            state.push(id, row);
        }
        state
    }

    #[test]
    fn rows_follow_insertion_order() {
        let state = two_rows();
        let ids: Vec<_> = state.rows().map(|r| r["id"].to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn clone_is_isolated_from_later_writes() {
        let before = two_rows();
        let mut after = before.clone();
        after.remove_ids(&HashSet::from([Id::new("a")]));

        assert_eq!(before.len(), 2);
        assert_eq!(after.len(), 1);
        assert!(!before.items_ptr_eq(&after));
    }

    #[test]
    fn clone_then_write_shares_untouched_rows() {
        let mut before = TableState::new();
        for i in 0..1000 {
            let (id, row) = row(&i.to_string());
            before.push(id, row);
        }
        let mut after = before.clone();
        let (id, r) = row("new");
        after.push(id.clone(), r);
        after.remove_ids(&HashSet::from([Id::new("3")]));

        assert_eq!(before.len(), 1000);
        assert_eq!(after.len(), 1000);
        assert!(before.contains(&Id::new("3")));
        assert!(!before.contains(&id));
        assert!(before.row_ptr_eq(&after, &Id::new("0")));
        assert!(before.row_ptr_eq(&after, &Id::new("999")));
        assert_eq!(after.ids().last(), Some(&id));
    }

    #[test]
    fn replacing_rows_keeps_items_shared() {
        let before = two_rows();
        let mut after = before.clone();
        let (id, _) = row("a");
        after.replace_rows([(id.clone(), Arc::new(record! { "id" => "a", "x" => 1 }))]);

        assert!(before.items_ptr_eq(&after));
        assert!(!before.row_ptr_eq(&after, &id));
        assert!(before.row_ptr_eq(&after, &Id::new("b")));
    }

    #[test]
    fn from_parts_rejects_broken_tables() {
        let (id, r) = row("a");
        let missing = TableState::from_parts(vec![id.clone()], HashMap::new(), TableMeta::default());
        assert!(matches!(missing, Err(CoreError::InvalidSnapshot { .. })));

        let twice = TableState::from_parts(
            vec![id.clone(), id.clone()],
            HashMap::from([(id.clone(), r.clone())]),
            TableMeta::default(),
        );
        assert!(twice.is_err());

        let extra = TableState::from_parts(
            vec![],
            HashMap::from([(id, r)]),
            TableMeta::default(),
        );
        assert!(extra.is_err());
    }

    #[test]
    fn snapshot_json_shape() {
        let mut snapshot = Snapshot::new();
        let table = snapshot.table_mut("Book");
        let (id, r) = row("10");
        table.push(id, r);
        table.set_max_id(10);

        let json = snapshot.to_json().unwrap();
        assert_eq!(
            json,
            json!({
                "Book": {
                    "items": ["10"],
                    "itemsById": { "10": { "id": "10" } },
                    "meta": { "maxId": 10 }
                }
            })
        );

        let back = Snapshot::from_json(json).unwrap();
        assert_eq!(back.table("Book").unwrap().len(), 1);
        assert_eq!(back.table("Book").unwrap().meta().max_id, Some(10));
    }

    #[test]
    fn invalid_snapshot_json_is_rejected() {
        let bad = json!({ "Book": { "items": ["1"], "itemsById": {} } });
        assert!(matches!(
            Snapshot::from_json(bad),
            Err(CoreError::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn table_mut_copies_only_the_written_table() {
        let mut base = Snapshot::new();
        base.insert_empty("A");
        base.insert_empty("B");

        let mut next = base.clone();
        let (id, r) = row("1");
        next.table_mut("A").push(id, r);

        assert!(!next.ptr_eq(&base));
        assert!(!next.table_ptr_eq(&base, "A"));
        assert!(next.table_ptr_eq(&base, "B"));
        assert!(base.table("A").unwrap().is_empty());
    }
}
