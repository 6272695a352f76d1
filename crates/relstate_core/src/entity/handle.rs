//! Session-bound model handles.

use crate::entity::cascade::DeleteOutcome;
use crate::entity::many;
use crate::entity::{Id, Instance, Props};
use crate::error::{CoreError, CoreResult};
use crate::query::QuerySet;
use crate::schema::{Accessor, ManyToManyPath, ModelSchema};
use crate::store::{QuerySpec, UpdateSpec};
use crate::table::{Clause, Predicate, Row, SortSpec};
use crate::transaction::Session;
use relstate_codec::{Record, Value};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Props split into stored attributes and many-to-many memberships.
#[derive(Debug)]
pub(crate) struct Prepared {
    pub(crate) attrs: Record,
    pub(crate) many: Vec<(ManyToManyPath, Vec<Id>)>,
}

/// Entry point for every operation on one model within one session.
///
/// A handle borrows its session; it cannot outlive it or be used with
/// another one.
///
/// # Example
///
/// ```rust,ignore
/// let session = orm.session(None)?;
/// let books = session.model("Book")?;
///
/// let dune = books.create(props! { "title" => "Dune", "genres" => vec!["g1", "g2"] })?;
/// assert_eq!(books.count()?, 1);
/// assert!(books.with_id(dune.id().clone())?.is_some());
/// ```
#[derive(Clone)]
pub struct ModelHandle<'s> {
    session: &'s Session,
    schema: Arc<ModelSchema>,
}

impl<'s> ModelHandle<'s> {
    pub(crate) fn new(session: &'s Session, schema: Arc<ModelSchema>) -> Self {
        Self { session, schema }
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Resolved schema of the model.
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// The owning session.
    pub fn session(&self) -> &'s Session {
        self.session
    }

    pub(crate) fn instance(&self, row: Row) -> Instance<'s> {
        Instance::new(self.clone(), row)
    }

    /// Every row, in creation order.
    pub fn all(&self) -> QuerySet<'s> {
        QuerySet::new(self.clone())
    }

    /// Rows whose attributes equal `lookup`.
    pub fn filter(&self, lookup: impl Into<Props>) -> QuerySet<'s> {
        self.all().filter(lookup)
    }

    /// Rows matching `f`.
    pub fn filter_by(&self, f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> QuerySet<'s> {
        self.all().filter_by(f)
    }

    /// Rows whose attributes do not equal `lookup`.
    pub fn exclude(&self, lookup: impl Into<Props>) -> QuerySet<'s> {
        self.all().exclude(lookup)
    }

    /// Rows not matching `f`.
    pub fn exclude_by(&self, f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> QuerySet<'s> {
        self.all().exclude_by(f)
    }

    /// Every row, sorted.
    pub fn order_by<I, K>(&self, keys: I) -> QuerySet<'s>
    where
        I: IntoIterator<Item = K>,
        K: Into<SortSpec>,
    {
        self.all().order_by(keys)
    }

    /// Number of rows.
    pub fn count(&self) -> CoreResult<usize> {
        self.all().count()
    }

    /// Whether the table has any row.
    pub fn exists(&self) -> CoreResult<bool> {
        self.all().exists()
    }

    /// The row with `id`, if present.
    pub fn with_id(&self, id: impl Into<Id>) -> CoreResult<Option<Instance<'s>>> {
        let id: Id = id.into();
        let spec = QuerySpec::new(self.name()).clause(Clause::Filter(Predicate::Equals(Record::from([(
            self.schema.id_attribute.clone(),
            id.to_value(),
        )]))));
        let rows = self.session.query(&spec)?;
        Ok(rows.into_iter().next().map(|row| self.instance(row)))
    }

    /// Whether a row with `id` is present.
    pub fn id_exists(&self, id: impl Into<Id>) -> CoreResult<bool> {
        Ok(self.with_id(id)?.is_some())
    }

    /// The single row matching `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `MultipleRowsReturned` if more than one row matches.
    pub fn get(&self, lookup: impl Into<Props>) -> CoreResult<Option<Instance<'s>>> {
        let rows = self.filter(lookup).to_rows()?;
        if rows.len() > 1 {
            return Err(CoreError::MultipleRowsReturned {
                model: self.name().to_string(),
                count: rows.len(),
            });
        }
        Ok(rows.into_iter().next().map(|row| self.instance(row)))
    }

    /// Creates a row.
    ///
    /// Relation values may be ids or entities. Attributes left out fall
    /// back to their declared defaults. Many-to-many values are linked
    /// after the row exists.
    ///
    /// # Errors
    ///
    /// Returns `RelationValue` for a malformed relation value, `DuplicateId`
    /// if the id is taken, or `FieldNotFound` when setting a reverse relation.
    pub fn create(&self, props: impl Into<Props>) -> CoreResult<Instance<'s>> {
        let prepared = self.prepare(props.into(), true)?;
        let own_id = prepared.attrs.get(&self.schema.id_attribute).map(Id::from_value);
        self.check_one_to_one(&prepared.attrs, own_id.as_ref())?;

        let payload = self.session.apply_update(UpdateSpec::Create {
            table: self.name().to_string(),
            row: prepared.attrs,
        })?;
        let row = payload
            .created()
            .cloned()
            .ok_or_else(|| CoreError::invalid_operation(format!("create on {} returned no row", self.name())))?;
        let instance = self.instance(row);

        for (path, ids) in &prepared.many {
            many::sync(self.session, path, instance.id(), ids)?;
        }
        Ok(instance)
    }

    /// Updates the row named by the id in `props`, or creates it.
    pub fn upsert(&self, props: impl Into<Props>) -> CoreResult<Instance<'s>> {
        let props = props.into();
        let existing = match props.get(&self.schema.id_attribute) {
            Some(id) => self.with_id(Id::from_value(&id.to_lookup_value(true)))?,
            None => None,
        };
        match existing {
            Some(mut instance) => {
                instance.update(props)?;
                Ok(instance)
            }
            None => self.create(props),
        }
    }

    /// Deletes every row, running cascades.
    pub fn delete_all(&self) -> CoreResult<DeleteOutcome> {
        self.all().delete()
    }

    /// Splits `props` into stored attributes and many-to-many memberships,
    /// normalizing relation values to ids.
    pub(crate) fn prepare(&self, props: Props, defaults: bool) -> CoreResult<Prepared> {
        let model = &self.schema.name;
        let mut attrs = Record::new();
        let mut many = Vec::new();

        for (key, value) in props {
            match self.schema.accessors.get(&key) {
                Some(Accessor::ForeignKey { to } | Accessor::OneToOne { to }) => {
                    let id = value.to_single_id(to, model, &key)?;
                    attrs.insert(key, id);
                }
                Some(Accessor::ManyToMany(path)) => {
                    let ids = value.to_many_ids(path.other_model(), model, &key)?;
                    many.push((path.clone(), ids));
                }
                Some(Accessor::ReverseForeignKey { from, field } | Accessor::ReverseOneToOne { from, field }) => {
                    return Err(CoreError::field_not_found(
                        model,
                        &key,
                        format!("set {from}.{field} instead"),
                    ));
                }
                Some(Accessor::Attribute) | None => {
                    let is_id = key == self.schema.id_attribute;
                    attrs.insert(key, value.to_lookup_value(is_id));
                }
            }
        }

        if defaults {
            for (name, attr) in self.schema.defaulted_attributes() {
                if attrs.contains_key(name) {
                    continue;
                }
                if let Some(value) = attr.default_for_create() {
                    attrs.insert(name.to_string(), value);
                }
            }
        }
        Ok(Prepared { attrs, many })
    }

    /// Normalizes an equality lookup so ids and entities compare equal.
    pub(crate) fn lookup_record(&self, lookup: Props) -> Record {
        lookup
            .into_iter()
            .map(|(key, value)| {
                let is_reference = key == self.schema.id_attribute
                    || matches!(
                        self.schema.accessors.get(&key),
                        Some(Accessor::ForeignKey { .. } | Accessor::OneToOne { .. })
                    );
                let value = value.to_lookup_value(is_reference);
                (key, value)
            })
            .collect()
    }

    /// Checks that one-to-one values in `attrs` point at targets no other
    /// row already claims. A claim fails under
    /// [`Config::enforce_one_to_one`](crate::Config) and is logged otherwise.
    pub(crate) fn check_one_to_one(&self, attrs: &Record, own_id: Option<&Id>) -> CoreResult<()> {
        let snapshot = self.session.snapshot();
        for field in self.schema.one_to_one_fields() {
            let Some(target) = attrs.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let spec = QuerySpec::new(self.name()).clause(Clause::Filter(Predicate::Equals(Record::from([(
                field.to_string(),
                target.clone(),
            )]))));
            let claimed_by = self
                .session
                .store()
                .query(&spec, &snapshot)?
                .into_iter()
                .map(|row| Id::from_value(row.get(&self.schema.id_attribute).unwrap_or(&Value::Null)))
                .find(|id| Some(id) != own_id);

            if let Some(other) = claimed_by {
                let message = format!("{target} is already claimed by {} {other}", self.name());
                if self.session.config().enforce_one_to_one {
                    return Err(CoreError::relation_value(self.name(), field, message));
                }
                warn!(model = self.name(), field, %message, "one-to-one target reused");
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ModelHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model", &self.schema.name)
            .finish_non_exhaustive()
    }
}
