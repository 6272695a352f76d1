//! Lazily evaluated query sets.

use crate::entity::cascade::{DeleteOutcome, DeletePlan};
use crate::entity::many;
use crate::entity::{Id, Instance, ModelHandle, PropValue, Props, RelatedValue};
use crate::error::{CoreError, CoreResult};
use crate::schema::ManyToManyPath;
use crate::store::{QuerySpec, UpdateSpec};
use crate::table::{Clause, Predicate, Row, SortSpec};
use relstate_codec::Record;
use std::fmt;
use std::sync::OnceLock;

/// The edges of one many-to-many relation from one source row.
#[derive(Debug, Clone)]
pub(crate) struct EdgeSource {
    pub(crate) path: ManyToManyPath,
    pub(crate) source: Id,
}

/// A composed query over one model.
///
/// Builder methods return a new query set and never evaluate. The first
/// read evaluates the clauses and caches the rows on this value, so later
/// reads see the same rows even if the session has been written to since.
/// Use [`QuerySet::all`] for a fresh evaluation.
///
/// # Example
///
/// ```rust,ignore
/// let recent = books
///     .filter(props! { "author" => &author })
///     .exclude_by(|row| row.get("draft") == Some(&Value::Bool(true)))
///     .order_by([("year", Direction::Desc)]);
///
/// for book in recent.to_entities()? {
///     println!("{}", book.attr("title").unwrap_or(&Value::Null));
/// }
/// ```
#[derive(Clone)]
pub struct QuerySet<'s> {
    handle: ModelHandle<'s>,
    clauses: Vec<Clause>,
    edge: Option<EdgeSource>,
    cache: OnceLock<Vec<Row>>,
}

impl<'s> QuerySet<'s> {
    pub(crate) fn new(handle: ModelHandle<'s>) -> Self {
        Self {
            handle,
            clauses: Vec::new(),
            edge: None,
            cache: OnceLock::new(),
        }
    }

    pub(crate) fn for_edges(handle: ModelHandle<'s>, path: ManyToManyPath, source: Id) -> Self {
        Self {
            edge: Some(EdgeSource { path, source }),
            ..Self::new(handle)
        }
    }

    fn with_clause(&self, clause: Clause) -> Self {
        let mut clauses = self.clauses.clone();
        clauses.push(clause);
        Self {
            handle: self.handle.clone(),
            clauses,
            edge: self.edge.clone(),
            cache: OnceLock::new(),
        }
    }

    /// The model handle.
    pub fn handle(&self) -> &ModelHandle<'s> {
        &self.handle
    }

    /// Model name.
    pub fn model_name(&self) -> &str {
        self.handle.name()
    }

    /// Clauses in caller order.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Whether this query set is the edge set of a many-to-many relation.
    pub fn is_edge_set(&self) -> bool {
        self.edge.is_some()
    }

    /// The same query, unevaluated.
    pub fn all(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            clauses: self.clauses.clone(),
            edge: self.edge.clone(),
            cache: OnceLock::new(),
        }
    }

    /// Keeps rows whose attributes equal `lookup`. Entities and ids are
    /// interchangeable for relation fields.
    pub fn filter(&self, lookup: impl Into<Props>) -> Self {
        self.with_clause(Clause::Filter(Predicate::Equals(
            self.handle.lookup_record(lookup.into()),
        )))
    }

    /// Keeps rows matching `f`.
    pub fn filter_by(&self, f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        self.with_clause(Clause::Filter(Predicate::func(f)))
    }

    /// Drops rows whose attributes equal `lookup`.
    pub fn exclude(&self, lookup: impl Into<Props>) -> Self {
        self.with_clause(Clause::Exclude(Predicate::Equals(
            self.handle.lookup_record(lookup.into()),
        )))
    }

    /// Drops rows matching `f`.
    pub fn exclude_by(&self, f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        self.with_clause(Clause::Exclude(Predicate::func(f)))
    }

    /// Sorts by one or more keys. Ties keep their previous order.
    pub fn order_by<I, K>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<SortSpec>,
    {
        self.with_clause(Clause::OrderBy(keys.into_iter().map(Into::into).collect()))
    }

    fn spec(&self) -> CoreResult<QuerySpec> {
        let mut clauses = Vec::with_capacity(self.clauses.len() + 1);
        if let Some(edge) = &self.edge {
            let linked = many::linked_ids(self.handle.session(), &edge.path, &edge.source)?;
            clauses.push(Clause::Filter(Predicate::Ids(linked)));
        }
        clauses.extend(self.clauses.iter().cloned());
        Ok(QuerySpec {
            table: self.handle.name().to_string(),
            clauses,
        })
    }

    fn rows(&self) -> CoreResult<&[Row]> {
        if let Some(rows) = self.cache.get() {
            return Ok(rows);
        }
        let rows = self.handle.session().query(&self.spec()?)?;
        Ok(self.cache.get_or_init(move || rows))
    }

    /// Number of matching rows.
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.rows()?.len())
    }

    /// Whether any row matches.
    pub fn exists(&self) -> CoreResult<bool> {
        Ok(!self.rows()?.is_empty())
    }

    /// Matching rows.
    pub fn to_rows(&self) -> CoreResult<Vec<Row>> {
        Ok(self.rows()?.to_vec())
    }

    /// Matching rows as instances.
    pub fn to_entities(&self) -> CoreResult<Vec<Instance<'s>>> {
        Ok(self
            .rows()?
            .iter()
            .map(|row| self.handle.instance(row.clone()))
            .collect())
    }

    /// The row at `index`.
    pub fn at(&self, index: usize) -> CoreResult<Option<Instance<'s>>> {
        Ok(self
            .rows()?
            .get(index)
            .map(|row| self.handle.instance(row.clone())))
    }

    /// The first row.
    pub fn first(&self) -> CoreResult<Option<Instance<'s>>> {
        self.at(0)
    }

    /// The last row.
    pub fn last(&self) -> CoreResult<Option<Instance<'s>>> {
        Ok(self
            .rows()?
            .last()
            .map(|row| self.handle.instance(row.clone())))
    }

    /// Merges `patch` into every matching row. Returns the number of rows
    /// still matching afterwards.
    ///
    /// # Errors
    ///
    /// Returns `FieldNotFound` if the patch sets a many-to-many or reverse
    /// relation; set those per instance.
    pub fn update(&mut self, patch: impl Into<Props>) -> CoreResult<usize> {
        let prepared = self.handle.prepare(patch.into(), false)?;
        if let Some((path, _)) = prepared.many.first() {
            return Err(CoreError::field_not_found(
                self.model_name(),
                &path.field,
                "many-to-many values cannot be set on a query set",
            ));
        }
        let mut patch = prepared.attrs;
        patch.remove(&self.handle.schema().id_attribute);
        self.handle.check_one_to_one(&patch, None)?;

        self.cache = OnceLock::new();
        let payload = self.handle.session().apply_update(UpdateSpec::Update {
            query: self.spec()?,
            patch,
        })?;
        Ok(payload.row_count())
    }

    /// Deletes every row matching the clauses now, running cascades. Rows
    /// cached by an earlier read are not consulted.
    pub fn delete(self) -> CoreResult<DeleteOutcome> {
        let session = self.handle.session();
        let id_attribute = self.handle.schema().id_attribute.clone();
        let current = self.all();
        let ids: Vec<Id> = current
            .rows()?
            .iter()
            .map(|row| Id::from_value(row.get(&id_attribute).unwrap_or(&relstate_codec::Value::Null)))
            .collect();
        if ids.is_empty() {
            return Ok(DeleteOutcome::default());
        }
        DeletePlan::collect(session, self.model_name(), ids)?.execute(session)
    }

    fn edge(&self, operation: &str) -> CoreResult<&EdgeSource> {
        self.edge.as_ref().ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "{operation} is only available on a many-to-many edge set, not on {}",
                self.model_name()
            ))
        })
    }

    fn edge_ids<I, R>(&self, edge: &EdgeSource, items: I) -> CoreResult<Vec<Id>>
    where
        I: IntoIterator<Item = R>,
        R: Into<RelatedValue>,
    {
        PropValue::many(items).to_many_ids(edge.path.other_model(), edge.path.this_model(), &edge.path.field)
    }

    /// Links the source row to `items`.
    pub fn add<I, R>(&mut self, items: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<RelatedValue>,
    {
        let edge = self.edge("add")?;
        let ids = self.edge_ids(edge, items)?;
        let session = self.handle.session();
        many::add(session, &edge.path, &edge.source, &ids, session.config().strict_edges)?;
        self.cache = OnceLock::new();
        Ok(())
    }

    /// Unlinks the source row from `items`.
    pub fn remove<I, R>(&mut self, items: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<RelatedValue>,
    {
        let edge = self.edge("remove")?;
        let ids = self.edge_ids(edge, items)?;
        let session = self.handle.session();
        many::remove(session, &edge.path, &edge.source, &ids, session.config().strict_edges)?;
        self.cache = OnceLock::new();
        Ok(())
    }

    /// Unlinks the source row from everything.
    pub fn clear(&mut self) -> CoreResult<()> {
        let edge = self.edge("clear")?;
        many::clear(self.handle.session(), &edge.path, &edge.source)?;
        self.cache = OnceLock::new();
        Ok(())
    }
}

impl fmt::Debug for QuerySet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("model", &self.model_name())
            .field("clauses", &self.clauses)
            .field("edge", &self.edge)
            .field("evaluated", &self.cache.get().is_some())
            .finish()
    }
}
