//! Field descriptors.

use relstate_codec::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Produces a default attribute value at create time.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Field name to descriptor.
pub type FieldMap = BTreeMap<String, Descriptor>;

/// Schema-time metadata for one field.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// Plain value.
    Attribute(Attribute),
    /// Many-to-one reference.
    ForeignKey(ForeignKey),
    /// One-to-one reference.
    OneToOne(OneToOne),
    /// Many-to-many relation through a join model.
    ManyToMany(ManyToMany),
}

impl Descriptor {
    /// Model this field references, if it is a relation.
    pub fn target(&self) -> Option<&str> {
        match self {
            Descriptor::Attribute(_) => None,
            Descriptor::ForeignKey(fk) => Some(&fk.to),
            Descriptor::OneToOne(o2o) => Some(&o2o.to),
            Descriptor::ManyToMany(m2m) => Some(&m2m.to),
        }
    }

    /// Short name of the descriptor kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Descriptor::Attribute(_) => "attribute",
            Descriptor::ForeignKey(_) => "fk",
            Descriptor::OneToOne(_) => "oneToOne",
            Descriptor::ManyToMany(_) => "many",
        }
    }
}

/// A plain value, optionally with a default.
#[derive(Clone, Default)]
pub struct Attribute {
    default: Option<DefaultFn>,
}

impl Attribute {
    /// Attribute without a default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute whose default is computed at create time.
    #[must_use]
    pub fn with_default(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self {
            default: Some(Arc::new(f)),
        }
    }

    /// Attribute with a constant default.
    #[must_use]
    pub fn default_value(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::with_default(move || value.clone())
    }

    /// Computes the default, if one is declared.
    pub fn default_for_create(&self) -> Option<Value> {
        self.default.as_ref().map(|f| f())
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Many-to-one reference to `to`.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// Target model.
    pub to: String,
    /// Name of the reverse collection on the target.
    pub related_name: Option<String>,
    /// Whether deleting the target deletes the rows pointing at it.
    pub cascade: bool,
    pub(crate) internal: bool,
}

impl ForeignKey {
    /// References `to`.
    #[must_use]
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            related_name: None,
            cascade: false,
            internal: false,
        }
    }

    /// Names the reverse collection.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }

    /// Deletes owning rows when the target is deleted.
    #[must_use]
    pub fn on_delete_cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    /// Marks a join model column: no reverse accessor is installed.
    pub(crate) fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// One-to-one reference to `to`.
#[derive(Debug, Clone)]
pub struct OneToOne {
    /// Target model.
    pub to: String,
    /// Name of the reverse accessor on the target.
    pub related_name: Option<String>,
    /// Whether deleting the target deletes the row pointing at it.
    pub cascade: bool,
}

impl OneToOne {
    /// References `to`.
    #[must_use]
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            related_name: None,
            cascade: false,
        }
    }

    /// Names the reverse accessor.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }

    /// Deletes the owning row when the target is deleted.
    #[must_use]
    pub fn on_delete_cascade(mut self) -> Self {
        self.cascade = true;
        self
    }
}

/// Join model columns for a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThroughFields {
    /// Column pointing at the declaring model.
    pub from: String,
    /// Column pointing at the target model.
    pub to: String,
}

/// Many-to-many relation to `to`.
#[derive(Debug, Clone)]
pub struct ManyToMany {
    /// Target model.
    pub to: String,
    /// Name of the reverse collection on the target.
    pub related_name: Option<String>,
    /// Custom join model. A join model is synthesized when absent.
    pub through: Option<String>,
    /// Join model columns. Required for a self-referencing custom join model.
    pub through_fields: Option<ThroughFields>,
    /// Whether deleting a target deletes the owners linked to it.
    pub cascade: bool,
}

impl ManyToMany {
    /// Relates to `to`.
    #[must_use]
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            related_name: None,
            through: None,
            through_fields: None,
            cascade: false,
        }
    }

    /// Names the reverse collection.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }

    /// Uses a declared join model.
    #[must_use]
    pub fn through(mut self, model: impl Into<String>) -> Self {
        self.through = Some(model.into());
        self
    }

    /// Names the join model columns.
    #[must_use]
    pub fn through_fields(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.through_fields = Some(ThroughFields {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Deletes linked owners when a target is deleted.
    #[must_use]
    pub fn on_delete_cascade(mut self) -> Self {
        self.cascade = true;
        self
    }
}

impl From<Attribute> for Descriptor {
    fn from(d: Attribute) -> Self {
        Descriptor::Attribute(d)
    }
}

impl From<ForeignKey> for Descriptor {
    fn from(d: ForeignKey) -> Self {
        Descriptor::ForeignKey(d)
    }
}

impl From<OneToOne> for Descriptor {
    fn from(d: OneToOne) -> Self {
        Descriptor::OneToOne(d)
    }
}

impl From<ManyToMany> for Descriptor {
    fn from(d: ManyToMany) -> Self {
        Descriptor::ManyToMany(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_computed_per_call() {
        let counter = Arc::new(std::sync::atomic::AtomicI64::new(0));
        let c = counter.clone();
        let attr = Attribute::with_default(move || {
            Value::Integer(c.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
        });
        assert_eq!(attr.default_for_create(), Some(Value::Integer(0)));
        assert_eq!(attr.default_for_create(), Some(Value::Integer(1)));
        assert_eq!(Attribute::new().default_for_create(), None);
    }

    #[test]
    fn builders_set_relation_options() {
        let m2m = ManyToMany::new("Tag")
            .related_name("posts")
            .through("PostTag")
            .through_fields("post", "tag")
            .on_delete_cascade();
        assert_eq!(m2m.through.as_deref(), Some("PostTag"));
        assert_eq!(m2m.through_fields.as_ref().map(|f| f.to.as_str()), Some("tag"));
        assert!(m2m.cascade);

        let d: Descriptor = ForeignKey::new("Author").into();
        assert_eq!(d.target(), Some("Author"));
        assert_eq!(d.kind(), "fk");
    }
}
