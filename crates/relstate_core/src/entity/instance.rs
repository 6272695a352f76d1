//! Entity instances.

use crate::entity::cascade::{DeleteOutcome, DeletePlan};
use crate::entity::many::{self, diff};
use crate::entity::{EntityRef, Id, ModelHandle, PropValue, Props, RelatedValue};
use crate::error::{CoreError, CoreResult};
use crate::query::QuerySet;
use crate::schema::Accessor;
use crate::store::{QuerySpec, UpdateSpec};
use crate::table::{Clause, Predicate, Row};
use relstate_codec::{Record, Value};
use std::fmt;
use tracing::trace;

/// The value behind a field name.
#[derive(Debug)]
pub enum FieldValue<'s> {
    /// A stored attribute.
    Value(Value),
    /// A single related row, if the reference is set and the row exists.
    Entity(Option<Instance<'s>>),
    /// A collection of related rows.
    Set(QuerySet<'s>),
}

/// One row of a model, bound to a session.
///
/// An instance holds the row as it was when the instance was created or
/// last refreshed. Writes through the instance refresh it.
#[derive(Clone)]
pub struct Instance<'s> {
    handle: ModelHandle<'s>,
    id: Id,
    row: Row,
}

impl<'s> Instance<'s> {
    pub(crate) fn new(handle: ModelHandle<'s>, row: Row) -> Self {
        let id = Id::from_value(row.get(&handle.schema().id_attribute).unwrap_or(&Value::Null));
        Self { handle, id, row }
    }

    /// Row id.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// The row this instance was read from.
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// Model name.
    pub fn model_name(&self) -> &str {
        self.handle.name()
    }

    /// The model handle.
    pub fn handle(&self) -> &ModelHandle<'s> {
        &self.handle
    }

    /// A plain reference to this row.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.model_name(), self.id.clone())
    }

    /// A stored value.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.row.get(name)
    }

    /// A copy of the row.
    pub fn to_record(&self) -> Record {
        Record::clone(&self.row)
    }

    /// Reads any field: an attribute, a forward or reverse relation.
    ///
    /// # Errors
    ///
    /// Returns `FieldNotFound` if the model has no such field.
    pub fn field(&self, name: &str) -> CoreResult<FieldValue<'s>> {
        let session = self.handle.session();
        match self.handle.schema().accessor(name)? {
            Accessor::Attribute => Ok(FieldValue::Value(self.row.get(name).cloned().unwrap_or(Value::Null))),
            Accessor::ForeignKey { to } | Accessor::OneToOne { to } => {
                let related = match self.row.get(name).filter(|v| !v.is_null()) {
                    Some(id) => session.model(to)?.with_id(Id::from_value(id))?,
                    None => None,
                };
                Ok(FieldValue::Entity(related))
            }
            Accessor::ReverseForeignKey { from, field } => Ok(FieldValue::Set(
                session.model(from)?.filter(Props::new().set(field, self.id.clone())),
            )),
            Accessor::ReverseOneToOne { from, field } => Ok(FieldValue::Entity(
                session
                    .model(from)?
                    .filter(Props::new().set(field, self.id.clone()))
                    .first()?,
            )),
            Accessor::ManyToMany(path) => Ok(FieldValue::Set(QuerySet::for_edges(
                session.model(path.other_model())?,
                path.clone(),
                self.id.clone(),
            ))),
        }
    }

    /// A single-valued relation.
    pub fn related(&self, name: &str) -> CoreResult<Option<Instance<'s>>> {
        match self.field(name)? {
            FieldValue::Entity(related) => Ok(related),
            _ => Err(CoreError::field_not_found(
                self.model_name(),
                name,
                "not a single-valued relation",
            )),
        }
    }

    /// A collection relation.
    pub fn related_set(&self, name: &str) -> CoreResult<QuerySet<'s>> {
        match self.field(name)? {
            FieldValue::Set(set) => Ok(set),
            _ => Err(CoreError::field_not_found(
                self.model_name(),
                name,
                "not a collection relation",
            )),
        }
    }

    /// Sets one field. Same rules as [`Instance::update`].
    pub fn set(&mut self, field: &str, value: impl Into<PropValue>) -> CoreResult<bool> {
        self.update(Props::new().set(field, value))
    }

    /// Updates attributes and relations.
    ///
    /// The instance is refreshed from the session first, then values equal
    /// to the stored ones are dropped before anything is written. An update
    /// that changes nothing performs no write and leaves the session
    /// snapshot untouched. Returns whether anything was written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `props` changes the id or the row no
    /// longer exists, and the errors of [`ModelHandle::create`] for
    /// malformed values.
    pub fn update(&mut self, props: impl Into<Props>) -> CoreResult<bool> {
        let session = self.handle.session();
        let prepared = self.handle.prepare(props.into(), false)?;
        let id_attribute = self.handle.schema().id_attribute.clone();

        if let Some(id) = prepared.attrs.get(&id_attribute) {
            if Id::from_value(id) != self.id {
                return Err(CoreError::invalid_operation(format!(
                    "cannot change the id of {} {} to {id}",
                    self.model_name(),
                    self.id
                )));
            }
        }

        if !self.refresh()? {
            return Err(CoreError::invalid_operation(format!(
                "cannot update {} {}: row no longer exists",
                self.model_name(),
                self.id
            )));
        }

        let patch: Record = prepared
            .attrs
            .into_iter()
            .filter(|(key, value)| *key != id_attribute && self.row.get(key) != Some(value))
            .collect();

        let mut specs = Vec::new();
        for (path, desired) in &prepared.many {
            let current = many::linked_ids(session, path, &self.id)?;
            if let Some(edges) = diff(&current, desired) {
                specs.extend(many::diff_specs(session, path, &self.id, &edges)?);
            }
        }

        if patch.is_empty() && specs.is_empty() {
            trace!(model = self.model_name(), id = %self.id, "update changes nothing");
            return Ok(false);
        }

        if !patch.is_empty() {
            self.handle.check_one_to_one(&patch, Some(&self.id))?;
            specs.push(UpdateSpec::Update {
                query: QuerySpec::new(self.model_name())
                    .clause(Clause::Filter(Predicate::Ids(vec![self.id.clone()]))),
                patch,
            });
        }
        session.apply_updates(specs)?;
        self.refresh()?;
        Ok(true)
    }

    /// Deletes the row, running cascades first.
    pub fn delete(self) -> CoreResult<DeleteOutcome> {
        let session = self.handle.session();
        DeletePlan::collect(session, self.model_name(), vec![self.id.clone()])?.execute(session)
    }

    /// Re-reads the row from the session. Returns `false` if the row is gone,
    /// in which case the instance keeps its last known values.
    pub fn refresh(&mut self) -> CoreResult<bool> {
        let snapshot = self.handle.session().snapshot();
        let row = snapshot
            .table(self.model_name())
            .and_then(|table| table.get(&self.id))
            .cloned();
        match row {
            Some(row) => {
                self.row = row;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl PartialEq for Instance<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.model_name() == other.model_name() && self.id == other.id
    }
}

impl fmt::Debug for Instance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.model_name())
            .field("id", &self.id)
            .field("row", &self.row)
            .finish()
    }
}

impl From<&Instance<'_>> for RelatedValue {
    fn from(instance: &Instance<'_>) -> Self {
        RelatedValue::Entity(instance.entity_ref())
    }
}

impl From<&Instance<'_>> for PropValue {
    fn from(instance: &Instance<'_>) -> Self {
        PropValue::Related(instance.into())
    }
}

impl From<Vec<&Instance<'_>>> for PropValue {
    fn from(instances: Vec<&Instance<'_>>) -> Self {
        PropValue::many(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;
    use crate::schema::{ForeignKey, ModelDef, OneToOne, Orm};

    fn orm() -> Orm {
        let mut orm = Orm::new();
        orm.register([
            ModelDef::new("Author").attribute("name"),
            ModelDef::new("Genre").attribute("name"),
            ModelDef::new("Publisher").attribute("name"),
            ModelDef::new("Cover").attribute("color"),
            ModelDef::new("Book")
                .attribute("title")
                .field("author", ForeignKey::new("Author").on_delete_cascade())
                .foreign_key("publisher", "Publisher")
                .field("cover", OneToOne::new("Cover").related_name("book"))
                .many_to_many("genres", "Genre"),
        ])
        .unwrap();
        orm
    }

    #[test]
    fn field_dispatch() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let author = session.model("Author").unwrap().create(props! { "id" => "1" }).unwrap();
        let book = session
            .model("Book")
            .unwrap()
            .create(props! { "title" => "Dune", "author" => &author, "cover" => "c1" })
            .unwrap();
        session.model("Cover").unwrap().create(props! { "id" => "c1" }).unwrap();

        assert!(matches!(book.field("title").unwrap(), FieldValue::Value(Value::Text(_))));
        assert_eq!(book.related("author").unwrap().unwrap(), author);
        assert_eq!(author.related_set("bookSet").unwrap().count().unwrap(), 1);

        let cover = book.related("cover").unwrap().unwrap();
        assert_eq!(cover.related("book").unwrap().unwrap(), book);
        assert!(book.related("publisher").unwrap().is_none());
        assert!(book.related_set("title").is_err());
        assert!(book.field("missing").is_err());
    }

    #[test]
    fn identical_update_writes_nothing() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let mut book = session
            .model("Book")
            .unwrap()
            .create(props! { "title" => "Dune", "author" => "1", "genres" => vec!["g1", "g2"] })
            .unwrap();
        let before = session.snapshot();
        let batches = session.stats().batches();

        let changed = book
            .update(props! { "title" => "Dune", "author" => 1, "genres" => vec!["g2", "g1"] })
            .unwrap();
        assert!(!changed);
        assert!(session.snapshot().ptr_eq(&before));
        assert!(session.snapshot().table_ptr_eq(&before, "Book"));
        assert_eq!(session.stats().batches(), batches);
    }

    #[test]
    fn update_applies_attributes_and_edges_together() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let mut book = session
            .model("Book")
            .unwrap()
            .create(props! { "title" => "Dune", "genres" => vec!["g1", "g2"] })
            .unwrap();

        assert!(book.update(props! { "title" => "Dune Messiah", "genres" => vec!["g2", "g3"] }).unwrap());
        assert_eq!(book.attr("title"), Some(&Value::from("Dune Messiah")));

        let genres: Vec<Id> = session
            .model("BookGenres")
            .unwrap()
            .all()
            .to_rows()
            .unwrap()
            .iter()
            .map(|row| Id::from_value(&row["toGenre"]))
            .collect();
        assert_eq!(genres, vec![Id::new("g2"), Id::new("g3")]);
    }

    #[test]
    fn id_cannot_change() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let mut author = session.model("Author").unwrap().create(props! { "id" => "1" }).unwrap();

        assert!(!author.update(props! { "id" => 1 }).unwrap());
        let err = author.update(props! { "id" => "2" }).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn set_routes_through_update() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let mut author = session.model("Author").unwrap().create(props! { "name" => "A" }).unwrap();
        assert!(author.set("name", "B").unwrap());
        assert!(!author.set("name", "B").unwrap());
        assert_eq!(author.to_record()["name"], Value::from("B"));
    }

    #[test]
    fn delete_cascades_and_nulls() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let author = session.model("Author").unwrap().create(props! { "id" => "a" }).unwrap();
        let publisher = session.model("Publisher").unwrap().create(props! { "id" => "p" }).unwrap();
        let books = session.model("Book").unwrap();
        books.create(props! { "author" => "a", "publisher" => "p" }).unwrap();
        books.create(props! { "author" => "b", "publisher" => "p" }).unwrap();

        let outcome = publisher.delete().unwrap();
        assert_eq!(outcome.deleted_in("Publisher"), 1);
        assert_eq!(outcome.nulled, 2);
        assert_eq!(books.filter(props! { "publisher" => () }).count().unwrap(), 2);

        let outcome = author.delete().unwrap();
        assert_eq!(outcome.deleted_in("Book"), 1);
        assert_eq!(books.count().unwrap(), 1);
    }

    #[test]
    fn update_compares_against_the_stored_row() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let authors = session.model("Author").unwrap();
        let mut first = authors.create(props! { "id" => "1", "name" => "A" }).unwrap();
        let mut second = authors.with_id("1").unwrap().unwrap();
        assert!(second.set("name", "B").unwrap());

        assert!(first.update(props! { "name" => "A" }).unwrap());
        assert_eq!(authors.with_id("1").unwrap().unwrap().attr("name"), Some(&Value::from("A")));
        assert_eq!(first.attr("name"), Some(&Value::from("A")));

        assert!(!second.set("name", "A").unwrap());
        assert_eq!(second.attr("name"), Some(&Value::from("A")));
    }

    #[test]
    fn update_of_a_deleted_row_fails() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let mut author = session.model("Author").unwrap().create(props! { "name" => "A" }).unwrap();
        author.clone().delete().unwrap();

        let err = author.set("name", "B").unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert_eq!(session.model("Author").unwrap().count().unwrap(), 0);
    }

    #[test]
    fn refresh_reports_deleted_rows() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let mut author = session.model("Author").unwrap().create(props! { "name" => "A" }).unwrap();
        author.clone().delete().unwrap();
        assert!(!author.refresh().unwrap());
        assert_eq!(author.attr("name"), Some(&Value::from("A")));
    }
}
