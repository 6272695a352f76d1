//! JSON schema documents.

use crate::error::CoreResult;
use crate::schema::descriptor::{Attribute, Descriptor, ForeignKey, ManyToMany, OneToOne};
use crate::schema::model::ModelDef;
use crate::schema::orm::Orm;
use relstate_codec::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A schema described as data.
///
/// ```json
/// {
///   "models": [
///     { "name": "Author", "fields": { "name": { "type": "attribute" } } },
///     { "name": "Book", "fields": {
///         "title": { "type": "attribute" },
///         "author": { "type": "fk", "to": "Author", "relatedName": "books" },
///         "genres": { "type": "many", "to": "Genre" }
///     } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Models in registration order.
    pub models: Vec<ModelDocument>,
}

/// One model of a [`SchemaDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDocument {
    /// Model name.
    pub name: String,
    /// Id attribute override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_attribute: Option<String>,
    /// Field name to field description.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDocument>,
}

/// One field of a [`ModelDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FieldDocument {
    /// Plain attribute with an optional constant default.
    Attribute {
        /// Default value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    /// Foreign key.
    Fk {
        /// Target model.
        to: String,
        /// Reverse accessor name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        related_name: Option<String>,
        /// Cascade on delete.
        #[serde(default)]
        cascade: bool,
    },
    /// One-to-one reference.
    OneToOne {
        /// Target model.
        to: String,
        /// Reverse accessor name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        related_name: Option<String>,
        /// Cascade on delete.
        #[serde(default)]
        cascade: bool,
    },
    /// Many-to-many relation.
    Many {
        /// Target model.
        to: String,
        /// Reverse accessor name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        related_name: Option<String>,
        /// Custom join model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        through: Option<String>,
        /// Join model columns as `[from, to]`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        through_fields: Option<(String, String)>,
        /// Cascade on delete from the target side.
        #[serde(default)]
        cascade: bool,
    },
}

impl FieldDocument {
    /// Converts to a descriptor.
    pub fn to_descriptor(&self) -> Descriptor {
        match self {
            FieldDocument::Attribute { default: None } => Attribute::new().into(),
            FieldDocument::Attribute { default: Some(v) } => Attribute::default_value(v.clone()).into(),
            FieldDocument::Fk {
                to,
                related_name,
                cascade,
            } => {
                let mut fk = ForeignKey::new(to);
                fk.related_name = related_name.clone();
                fk.cascade = *cascade;
                fk.into()
            }
            FieldDocument::OneToOne {
                to,
                related_name,
                cascade,
            } => {
                let mut o2o = OneToOne::new(to);
                o2o.related_name = related_name.clone();
                o2o.cascade = *cascade;
                o2o.into()
            }
            FieldDocument::Many {
                to,
                related_name,
                through,
                through_fields,
                cascade,
            } => {
                let mut m2m = ManyToMany::new(to);
                m2m.related_name = related_name.clone();
                m2m.through = through.clone();
                m2m.cascade = *cascade;
                if let Some((from, to)) = through_fields {
                    m2m = m2m.through_fields(from, to);
                }
                m2m.into()
            }
        }
    }
}

impl ModelDocument {
    /// Converts to a model declaration.
    pub fn to_model_def(&self) -> ModelDef {
        let mut def = ModelDef::new(&self.name);
        for (name, field) in &self.fields {
            def = def.field(name, field.to_descriptor());
        }
        if let Some(id) = &self.id_attribute {
            def = def.id_attribute(id);
        }
        def
    }
}

impl SchemaDocument {
    /// Parses a document from JSON text.
    pub fn from_json_str(input: &str) -> CoreResult<Self> {
        serde_json::from_str(input).map_err(|e| relstate_codec::CodecError::from(e).into())
    }

    /// Model declarations in document order.
    pub fn to_model_defs(&self) -> Vec<ModelDef> {
        self.models.iter().map(ModelDocument::to_model_def).collect()
    }

    /// Registers every model of the document with a fresh registrar.
    pub fn into_orm(self, config: crate::config::Config) -> CoreResult<Orm> {
        let mut orm = Orm::with_config(config);
        orm.register(self.to_model_defs())?;
        Ok(orm)
    }
}
