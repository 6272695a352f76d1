//! Inbound property values.
//!
//! Relation fields accept a bare id, an entity, or an array of either.
//! Every such value is normalized to bare ids here, in one place.

use crate::entity::id::{canonical_id_value, Id};
use crate::error::{CoreError, CoreResult};
use relstate_codec::{Record, Value};
use std::collections::{BTreeMap, HashSet};

/// A reference to a row of some model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    /// Model name.
    pub model: String,
    /// Row id.
    pub id: Id,
}

impl EntityRef {
    /// References `model[id]`.
    pub fn new(model: impl Into<String>, id: impl Into<Id>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

/// One relation value: an id or an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum RelatedValue {
    /// A bare id (text or number).
    Id(Value),
    /// An entity.
    Entity(EntityRef),
}

impl RelatedValue {
    /// Normalizes to a bare id of a `target` row.
    ///
    /// `model.field` names the relation for error messages.
    pub fn to_id(&self, target: &str, model: &str, field: &str) -> CoreResult<Id> {
        match self {
            RelatedValue::Id(value) => id_of_value(value, target, model, field),
            RelatedValue::Entity(entity) if entity.model == target => Ok(entity.id.clone()),
            RelatedValue::Entity(entity) => Err(CoreError::relation_value(
                model,
                field,
                format!("expected a {target}, got a {}", entity.model),
            )),
        }
    }
}

fn id_of_value(value: &Value, target: &str, model: &str, field: &str) -> CoreResult<Id> {
    match value {
        Value::Text(_) | Value::Integer(_) | Value::Float(_) => Ok(Id::from_value(value)),
        // A record carrying an id, as produced by document translation.
        Value::Map(record) => match record.get("id") {
            Some(id) => id_of_value(id, target, model, field),
            None => Err(CoreError::relation_value(
                model,
                field,
                format!("record has no id for {target}"),
            )),
        },
        other => Err(CoreError::relation_value(
            model,
            field,
            format!("cannot use {} as a {target} id", other.type_name()),
        )),
    }
}

impl From<EntityRef> for RelatedValue {
    fn from(entity: EntityRef) -> Self {
        RelatedValue::Entity(entity)
    }
}

impl From<&EntityRef> for RelatedValue {
    fn from(entity: &EntityRef) -> Self {
        RelatedValue::Entity(entity.clone())
    }
}

impl From<Value> for RelatedValue {
    fn from(value: Value) -> Self {
        RelatedValue::Id(value)
    }
}

impl From<&str> for RelatedValue {
    fn from(id: &str) -> Self {
        RelatedValue::Id(Value::from(id))
    }
}

impl From<String> for RelatedValue {
    fn from(id: String) -> Self {
        RelatedValue::Id(Value::Text(id))
    }
}

impl From<i64> for RelatedValue {
    fn from(id: i64) -> Self {
        RelatedValue::Id(Value::Integer(id))
    }
}

impl From<Id> for RelatedValue {
    fn from(id: Id) -> Self {
        RelatedValue::Id(id.into())
    }
}

impl From<&Id> for RelatedValue {
    fn from(id: &Id) -> Self {
        RelatedValue::Id(id.into())
    }
}

/// A property value supplied to create, update or filter.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// A plain value, or a bare id (or array of ids) for a relation field.
    Value(Value),
    /// One related entity or id.
    Related(RelatedValue),
    /// Several related entities or ids.
    RelatedMany(Vec<RelatedValue>),
}

impl PropValue {
    /// Several related values.
    pub fn many<I, R>(items: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RelatedValue>,
    {
        PropValue::RelatedMany(items.into_iter().map(Into::into).collect())
    }

    /// Normalizes the value of a single-valued relation field to a stored
    /// value: a text id, or null.
    pub fn to_single_id(&self, target: &str, model: &str, field: &str) -> CoreResult<Value> {
        match self {
            PropValue::Value(Value::Null) => Ok(Value::Null),
            PropValue::Value(value) => Ok(id_of_value(value, target, model, field)?.to_value()),
            PropValue::Related(related) => Ok(related.to_id(target, model, field)?.to_value()),
            PropValue::RelatedMany(_) => Err(CoreError::relation_value(
                model,
                field,
                "expected a single value, got several",
            )),
        }
    }

    /// Normalizes the value of a many-to-many field to distinct ids.
    ///
    /// # Errors
    ///
    /// Returns `RelationValue` if the value is not an array or lists an id twice.
    pub fn to_many_ids(&self, target: &str, model: &str, field: &str) -> CoreResult<Vec<Id>> {
        let ids: Vec<Id> = match self {
            PropValue::Value(Value::Array(items)) => items
                .iter()
                .map(|v| id_of_value(v, target, model, field))
                .collect::<CoreResult<_>>()?,
            PropValue::RelatedMany(items) => items
                .iter()
                .map(|r| r.to_id(target, model, field))
                .collect::<CoreResult<_>>()?,
            PropValue::Value(other) => {
                return Err(CoreError::relation_value(
                    model,
                    field,
                    format!("expected an array, got {}", other.type_name()),
                ))
            }
            PropValue::Related(_) => {
                return Err(CoreError::relation_value(
                    model,
                    field,
                    "expected an array, got a single value",
                ))
            }
        };

        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if !seen.insert(id) {
                return Err(CoreError::relation_value(
                    model,
                    field,
                    format!("id {id} is listed more than once"),
                ));
            }
        }
        Ok(ids)
    }

    /// Normalizes for use in an equality filter: entities and numeric ids
    /// become text ids when `is_reference` is set, arrays of them become
    /// arrays of text ids.
    pub(crate) fn to_lookup_value(&self, is_reference: bool) -> Value {
        let reference = |v: &Value| {
            if is_reference {
                canonical_id_value(v)
            } else {
                v.clone()
            }
        };
        match self {
            PropValue::Value(v) => reference(v),
            PropValue::Related(r) => related_lookup(r),
            PropValue::RelatedMany(items) => Value::Array(items.iter().map(related_lookup).collect()),
        }
    }
}

fn related_lookup(related: &RelatedValue) -> Value {
    match related {
        RelatedValue::Id(v) => canonical_id_value(v),
        RelatedValue::Entity(e) => e.id.to_value(),
    }
}

macro_rules! prop_value_from_value {
    ($($t:ty),*) => {
        $(impl From<$t> for PropValue {
            fn from(v: $t) -> Self {
                PropValue::Value(Value::from(v))
            }
        })*
    };
}

prop_value_from_value!(Value, bool, i64, i32, f64, String, &str, Record, ());

impl<T: Into<Value>> From<Vec<T>> for PropValue {
    fn from(items: Vec<T>) -> Self {
        PropValue::Value(Value::from(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for PropValue {
    fn from(v: Option<T>) -> Self {
        PropValue::Value(Value::from(v))
    }
}

impl From<RelatedValue> for PropValue {
    fn from(r: RelatedValue) -> Self {
        PropValue::Related(r)
    }
}

impl From<EntityRef> for PropValue {
    fn from(e: EntityRef) -> Self {
        PropValue::Related(RelatedValue::Entity(e))
    }
}

impl From<&EntityRef> for PropValue {
    fn from(e: &EntityRef) -> Self {
        PropValue::Related(RelatedValue::Entity(e.clone()))
    }
}

impl From<Vec<EntityRef>> for PropValue {
    fn from(items: Vec<EntityRef>) -> Self {
        PropValue::many(items)
    }
}

impl From<Id> for PropValue {
    fn from(id: Id) -> Self {
        PropValue::Related(id.into())
    }
}

/// Named property values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props(BTreeMap<String, PropValue>);

impl Props {
    /// Empty props.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Sets a property in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a property.
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.0.get(key)
    }

    /// Removes a property.
    pub fn remove(&mut self, key: &str) -> Option<PropValue> {
        self.0.remove(key)
    }

    /// Whether the property is set.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropValue)> + '_ {
        self.0.iter()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no property is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Props {
    type Item = (String, PropValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, PropValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<Record> for Props {
    fn from(record: Record) -> Self {
        Self(
            record
                .into_iter()
                .map(|(k, v)| (k, PropValue::Value(v)))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<PropValue>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Builds [`Props`] from `key => value` pairs.
///
/// ```rust,ignore
/// let book = books.create(props! { "title" => "Dune", "author" => author.entity_ref() })?;
/// ```
#[macro_export]
macro_rules! props {
    () => { $crate::entity::Props::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::entity::Props::new();
        $( props.insert($key, $value); )+
        props
    }};
}
