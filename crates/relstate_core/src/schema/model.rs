//! Model declarations.

use crate::reducer::ReducerFn;
use crate::schema::descriptor::{Attribute, Descriptor, FieldMap, ForeignKey, ManyToMany, OneToOne};
use std::fmt;

/// Declaration of one model: its name, fields and table options.
///
/// # Example
///
/// ```rust,ignore
/// let book = ModelDef::new("Book")
///     .attribute("title")
///     .field("author", ForeignKey::new("Author").related_name("books"))
///     .field("genres", ManyToMany::new("Genre"));
/// ```
#[derive(Clone)]
pub struct ModelDef {
    name: String,
    fields: Option<FieldMap>,
    id_attribute: Option<String>,
    reducer: Option<ReducerFn>,
    synthesized: bool,
}

impl ModelDef {
    /// Declares a model with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: None,
            id_attribute: None,
            reducer: None,
            synthesized: false,
        }
    }

    /// Declares a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, descriptor: impl Into<Descriptor>) -> Self {
        self.fields
            .get_or_insert_with(FieldMap::new)
            .insert(name.into(), descriptor.into());
        self
    }

    /// Declares a plain attribute.
    #[must_use]
    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.field(name, Attribute::new())
    }

    /// Declares a foreign key with default options.
    #[must_use]
    pub fn foreign_key(self, name: impl Into<String>, to: impl Into<String>) -> Self {
        self.field(name, ForeignKey::new(to))
    }

    /// Declares a one-to-one reference with default options.
    #[must_use]
    pub fn one_to_one(self, name: impl Into<String>, to: impl Into<String>) -> Self {
        self.field(name, OneToOne::new(to))
    }

    /// Declares a many-to-many relation with default options.
    #[must_use]
    pub fn many_to_many(self, name: impl Into<String>, to: impl Into<String>) -> Self {
        self.field(name, ManyToMany::new(to))
    }

    /// Overrides the id attribute for this model's table.
    #[must_use]
    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = Some(name.into());
        self
    }

    /// Attaches a reducer hook.
    #[must_use]
    pub fn reducer(mut self, hook: ReducerFn) -> Self {
        self.reducer = Some(hook);
        self
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statically declared fields, `None` if the model declared none.
    pub fn fields(&self) -> Option<&FieldMap> {
        self.fields.as_ref()
    }

    /// Id attribute override.
    pub fn table_id_attribute(&self) -> Option<&str> {
        self.id_attribute.as_deref()
    }

    /// Reducer hook.
    pub fn reducer_hook(&self) -> Option<&ReducerFn> {
        self.reducer.as_ref()
    }

    /// Whether this is a join model synthesized for a many-to-many relation.
    pub fn is_synthesized(&self) -> bool {
        self.synthesized
    }

    pub(crate) fn synthesized(mut self) -> Self {
        self.synthesized = true;
        self
    }
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("id_attribute", &self.id_attribute)
            .field("synthesized", &self.synthesized)
            .finish_non_exhaustive()
    }
}
