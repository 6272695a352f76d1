//! Schema declaration and resolution.
//!
//! Models are declared as [`ModelDef`]s (or added to a
//! [`DescriptorRegistry`]), registered with an [`Orm`], and resolved into a
//! [`Schema`] holding one precomputed accessor table per model.

mod accessor;
mod build;
mod descriptor;
mod document;
mod model;
mod orm;
mod registry;

pub use accessor::{Accessor, ManyToManyPath, ReverseRelation};
pub use build::{ModelSchema, Schema};
pub use descriptor::{
    Attribute, DefaultFn, Descriptor, FieldMap, ForeignKey, ManyToMany, OneToOne, ThroughFields,
};
pub use document::{FieldDocument, ModelDocument, SchemaDocument};
pub use model::ModelDef;
pub use orm::Orm;
pub use registry::DescriptorRegistry;
