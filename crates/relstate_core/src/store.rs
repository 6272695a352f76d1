//! The store: query and update requests over snapshots.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use crate::stats::StoreStats;
use crate::table::{Clause, Row, Snapshot, Table};
use crate::transaction::Batch;
use relstate_codec::Record;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Kind of write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateAction {
    /// Insert one row.
    Create,
    /// Merge a patch into every matched row.
    Update,
    /// Remove every matched row.
    Delete,
}

impl UpdateAction {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateAction::Create => "CREATE",
            UpdateAction::Update => "UPDATE",
            UpdateAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(UpdateAction::Create),
            "UPDATE" => Ok(UpdateAction::Update),
            "DELETE" => Ok(UpdateAction::Delete),
            other => Err(CoreError::UnknownUpdateAction {
                action: other.to_string(),
            }),
        }
    }
}

/// A query: a table and the clauses to evaluate against it.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Model name.
    pub table: String,
    /// Clauses in caller order.
    pub clauses: Vec<Clause>,
}

impl QuerySpec {
    /// Creates a query over every row of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            clauses: Vec::new(),
        }
    }

    /// Appends a clause.
    #[must_use]
    pub fn clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }
}

/// A write request.
#[derive(Debug, Clone)]
pub enum UpdateSpec {
    /// Insert `row` into `table`.
    Create {
        /// Model name.
        table: String,
        /// Row to insert.
        row: Record,
    },
    /// Merge `patch` into every row matched by `query`.
    Update {
        /// Rows to update.
        query: QuerySpec,
        /// Attributes to set.
        patch: Record,
    },
    /// Remove every row matched by `query`.
    Delete {
        /// Rows to delete.
        query: QuerySpec,
    },
}

impl UpdateSpec {
    /// Kind of write.
    pub fn action(&self) -> UpdateAction {
        match self {
            UpdateSpec::Create { .. } => UpdateAction::Create,
            UpdateSpec::Update { .. } => UpdateAction::Update,
            UpdateSpec::Delete { .. } => UpdateAction::Delete,
        }
    }

    /// Target model.
    pub fn table(&self) -> &str {
        match self {
            UpdateSpec::Create { table, .. } => table,
            UpdateSpec::Update { query, .. } | UpdateSpec::Delete { query } => &query.table,
        }
    }
}

/// Outcome status of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The update was applied.
    Success,
    /// The update was rejected.
    Failure,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStatus::Success => f.write_str("SUCCESS"),
            UpdateStatus::Failure => f.write_str("FAILURE"),
        }
    }
}

/// What an update produced.
#[derive(Debug, Clone)]
pub enum UpdatePayload {
    /// The inserted row.
    Created(Row),
    /// The matched rows as they are after the update.
    Updated(Vec<Row>),
    /// The matched rows as they were before deletion.
    Deleted(Vec<Row>),
    /// Why the update was rejected.
    Rejected(String),
}

impl UpdatePayload {
    /// Number of rows the update touched.
    pub fn row_count(&self) -> usize {
        match self {
            UpdatePayload::Created(_) => 1,
            UpdatePayload::Updated(rows) | UpdatePayload::Deleted(rows) => rows.len(),
            UpdatePayload::Rejected(_) => 0,
        }
    }

    /// The inserted row, for a create.
    pub fn created(&self) -> Option<&Row> {
        match self {
            UpdatePayload::Created(row) => Some(row),
            _ => None,
        }
    }
}

impl fmt::Display for UpdatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePayload::Rejected(reason) => f.write_str(reason),
            other => write!(f, "{} row(s)", other.row_count()),
        }
    }
}

/// Result of applying one update.
#[derive(Debug, Clone)]
pub struct UpdateResult {
    /// Status.
    pub status: UpdateStatus,
    /// Payload.
    pub payload: UpdatePayload,
}

/// Query and update engine over snapshots.
///
/// A store is built once per schema and shared by every session opened on
/// it. It holds no data: every call is given the snapshot (or batch) to
/// read from or write to.
///
/// # Example
///
/// ```rust,ignore
/// let store = orm.store()?;
/// let mut batch = Batch::new(store.empty_snapshot(), MutationMode::CopyOnWrite);
/// store.update(&UpdateSpec::Create { table: "Book".into(), row: record! { "title" => "Dune" } }, &mut batch)?;
/// let snapshot = batch.finish();
/// ```
pub struct Store {
    schema: Arc<Schema>,
    config: Arc<Config>,
    tables: BTreeMap<String, Table>,
    stats: Arc<StoreStats>,
}

impl Store {
    /// Builds a store for `schema`.
    pub fn new(schema: Arc<Schema>, config: Arc<Config>) -> Self {
        let stats = Arc::new(StoreStats::new());
        let tables = schema
            .models()
            .map(|model| {
                (
                    model.name.clone(),
                    Table::new(&model.name, &model.id_attribute, stats.clone()),
                )
            })
            .collect();
        Self {
            schema,
            config,
            tables,
            stats,
        }
    }

    /// Schema the store was built from.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Statistics shared by every session on this store.
    pub fn stats(&self) -> &Arc<StoreStats> {
        &self.stats
    }

    /// Returns the table for `model`.
    pub fn table(&self, model: &str) -> CoreResult<&Table> {
        self.tables
            .get(model)
            .ok_or_else(|| CoreError::model_not_found(model))
    }

    /// A snapshot holding one empty table per model.
    pub fn empty_snapshot(&self) -> Snapshot {
        self.normalize(Snapshot::new())
    }

    /// Adds an empty table for every model the snapshot lacks.
    ///
    /// Tables the snapshot already has are kept as they are, including
    /// tables for models outside the schema.
    pub fn normalize(&self, mut snapshot: Snapshot) -> Snapshot {
        for model in self.tables.keys() {
            if !snapshot.contains(model) {
                snapshot.insert_empty(model);
            }
        }
        snapshot
    }

    /// Evaluates a query against a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ModelNotFound` if the model is not in the schema.
    pub fn query(&self, spec: &QuerySpec, snapshot: &Snapshot) -> CoreResult<Vec<Row>> {
        let table = self.table(&spec.table)?;
        Ok(snapshot
            .table(&spec.table)
            .map(|state| table.query(state, &spec.clauses))
            .unwrap_or_default())
    }

    /// Applies one update inside a batch.
    ///
    /// An update naming a model outside the schema is reported with
    /// [`UpdateStatus::Failure`] rather than an error, leaving the batch
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if a create supplies an id already in the table.
    pub fn update(&self, spec: &UpdateSpec, batch: &mut Batch) -> CoreResult<UpdateResult> {
        let Ok(table) = self.table(spec.table()) else {
            warn!(model = spec.table(), action = %spec.action(), "update for unknown model");
            return Ok(UpdateResult {
                status: UpdateStatus::Failure,
                payload: UpdatePayload::Rejected(format!("unknown model {}", spec.table())),
            });
        };

        let payload = match spec {
            UpdateSpec::Create { row, .. } => {
                let state = batch.table_mut(table.model());
                UpdatePayload::Created(table.insert(state, row.clone())?)
            }
            UpdateSpec::Update { query, patch } => {
                let matched = self.query(query, batch.snapshot())?;
                if matched.is_empty() {
                    UpdatePayload::Updated(Vec::new())
                } else {
                    table.update(batch.table_mut(table.model()), &matched, patch);
                    UpdatePayload::Updated(self.query(query, batch.snapshot())?)
                }
            }
            UpdateSpec::Delete { query } => {
                let matched = self.query(query, batch.snapshot())?;
                if !matched.is_empty() {
                    table.delete(batch.table_mut(table.model()), &matched);
                }
                UpdatePayload::Deleted(matched)
            }
        };

        debug!(
            model = table.model(),
            action = %spec.action(),
            rows = payload.row_count(),
            "applied update"
        );
        Ok(UpdateResult {
            status: UpdateStatus::Success,
            payload,
        })
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("models", &self.tables.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelDef, Orm};
    use crate::table::Predicate;
    use crate::transaction::MutationMode;
    use relstate_codec::{record, Value};

    fn store() -> Arc<Store> {
        let mut orm = Orm::new();
        orm.register([ModelDef::new("Book").attribute("title")]).unwrap();
        orm.store().unwrap()
    }

    fn create(title: &str) -> UpdateSpec {
        UpdateSpec::Create {
            table: "Book".into(),
            row: record! { "title" => title },
        }
    }

    #[test]
    fn action_names() {
        assert_eq!("DELETE".parse::<UpdateAction>().unwrap(), UpdateAction::Delete);
        assert!(matches!(
            "UPSERT".parse::<UpdateAction>(),
            Err(CoreError::UnknownUpdateAction { .. })
        ));
    }

    #[test]
    fn empty_snapshot_has_every_table() {
        let store = store();
        let snapshot = store.empty_snapshot();
        assert!(snapshot.table("Book").unwrap().is_empty());
    }

    #[test]
    fn update_returns_rows_after_write() {
        let store = store();
        let mut batch = Batch::new(store.empty_snapshot(), MutationMode::CopyOnWrite);
        store.update(&create("a"), &mut batch).unwrap();
        store.update(&create("b"), &mut batch).unwrap();

        let spec = UpdateSpec::Update {
            query: QuerySpec::new("Book")
                .clause(Clause::Filter(Predicate::Equals(record! { "title" => "a" }))),
            patch: record! { "title" => "c" },
        };
        let result = store.update(&spec, &mut batch).unwrap();
        let UpdatePayload::Updated(rows) = result.payload else {
            panic!("expected updated rows");
        };
        // The clause no longer matches the new row, so nothing is re-read.
        assert!(rows.is_empty());

        let titles: Vec<_> = store
            .query(&QuerySpec::new("Book"), batch.snapshot())
            .unwrap()
            .iter()
            .map(|r| r["title"].clone())
            .collect();
        assert_eq!(titles, vec![Value::from("c"), Value::from("b")]);
    }

    #[test]
    fn delete_returns_rows_before_deletion() {
        let store = store();
        let mut batch = Batch::new(store.empty_snapshot(), MutationMode::CopyOnWrite);
        store.update(&create("a"), &mut batch).unwrap();

        let result = store
            .update(&UpdateSpec::Delete { query: QuerySpec::new("Book") }, &mut batch)
            .unwrap();
        assert_eq!(result.payload.row_count(), 1);
        assert!(batch.snapshot().table("Book").unwrap().is_empty());
    }

    #[test]
    fn unknown_model_is_a_failure_status() {
        let store = store();
        let mut batch = Batch::new(store.empty_snapshot(), MutationMode::CopyOnWrite);
        let result = store
            .update(
                &UpdateSpec::Create { table: "Nope".into(), row: record! {} },
                &mut batch,
            )
            .unwrap();
        assert_eq!(result.status, UpdateStatus::Failure);
        assert!(batch.touched().is_empty());
    }

    #[test]
    fn query_unknown_model_is_an_error() {
        let store = store();
        let err = store
            .query(&QuerySpec::new("Nope"), &store.empty_snapshot())
            .unwrap_err();
        assert!(matches!(err, CoreError::ModelNotFound { .. }));
    }
}
