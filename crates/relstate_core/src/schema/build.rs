//! Schema construction.
//!
//! Building a schema resolves every model's fields, checks that relations
//! point at registered models, resolves many-to-many join models and their
//! columns, and installs forward and reverse accessors into per-model
//! accessor tables. Nothing is mutated after the build.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::reducer::ReducerFn;
use crate::schema::accessor::{Accessor, ManyToManyPath, ReverseRelation};
use crate::schema::descriptor::{Attribute, Descriptor, FieldMap, ForeignKey, ManyToMany};
use crate::schema::model::ModelDef;
use crate::schema::registry::DescriptorRegistry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Resolved description of one model.
pub struct ModelSchema {
    /// Model name.
    pub name: String,
    /// Id attribute of the model's table.
    pub id_attribute: String,
    /// Field descriptors, including the id attribute.
    pub fields: FieldMap,
    /// Field name to accessor, forward and reverse.
    pub accessors: BTreeMap<String, Accessor>,
    /// Relations pointing at this model.
    pub reverse: Vec<ReverseRelation>,
    /// Whether this is a synthesized join model.
    pub synthesized: bool,
    pub(crate) reducer: Option<ReducerFn>,
}

impl ModelSchema {
    /// Returns the accessor for `field`.
    pub fn accessor(&self, field: &str) -> CoreResult<&Accessor> {
        self.accessors
            .get(field)
            .ok_or_else(|| CoreError::field_not_found(&self.name, field, "no such field"))
    }

    /// Attributes declaring a default value.
    pub fn defaulted_attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> + '_ {
        self.fields.iter().filter_map(|(name, d)| match d {
            Descriptor::Attribute(attr) => Some((name.as_str(), attr)),
            _ => None,
        })
    }

    /// Fields holding one-to-one references.
    pub fn one_to_one_fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().filter_map(|(name, d)| match d {
            Descriptor::OneToOne(_) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("id_attribute", &self.id_attribute)
            .field("accessors", &self.accessors)
            .field("reverse", &self.reverse)
            .field("synthesized", &self.synthesized)
            .finish_non_exhaustive()
    }
}

/// The resolved schema of every registered model.
#[derive(Debug)]
pub struct Schema {
    models: BTreeMap<String, Arc<ModelSchema>>,
    order: Vec<String>,
}

impl Schema {
    /// Returns the schema of `name`.
    pub fn model(&self, name: &str) -> CoreResult<&Arc<ModelSchema>> {
        self.models
            .get(name)
            .ok_or_else(|| CoreError::model_not_found(name))
    }

    /// Models in registration order, synthesized join models last.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelSchema>> + '_ {
        self.order.iter().filter_map(|name| self.models.get(name))
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the schema has no models.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Builds a schema from model declarations.
    ///
    /// Registry entries for a model take precedence over its declared fields.
    ///
    /// # Errors
    ///
    /// Returns a `Schema` error if a model has no fields from either source,
    /// a relation targets an unregistered model, two relations install the
    /// same accessor name, or a join model's columns cannot be resolved.
    pub fn build(defs: &[ModelDef], registry: &DescriptorRegistry, config: &Config) -> CoreResult<Self> {
        let mut models: BTreeMap<String, ModelSchema> = BTreeMap::new();
        let mut order = Vec::with_capacity(defs.len());

        for def in defs {
            let mut fields = resolve_fields(def, registry)?;
            let id_attribute = def
                .table_id_attribute()
                .unwrap_or(&config.id_attribute)
                .to_string();
            fields
                .entry(id_attribute.clone())
                .or_insert_with(|| Descriptor::Attribute(Attribute::new()));

            let accessors = fields
                .iter()
                .filter_map(|(name, d)| {
                    let accessor = match d {
                        Descriptor::Attribute(_) => Accessor::Attribute,
                        Descriptor::ForeignKey(fk) => Accessor::ForeignKey { to: fk.to.clone() },
                        Descriptor::OneToOne(o) => Accessor::OneToOne { to: o.to.clone() },
                        // Installed once the join model is resolved.
                        Descriptor::ManyToMany(_) => return None,
                    };
                    Some((name.clone(), accessor))
                })
                .collect();

            order.push(def.name().to_string());
            models.insert(
                def.name().to_string(),
                ModelSchema {
                    name: def.name().to_string(),
                    id_attribute,
                    fields,
                    accessors,
                    reverse: Vec::new(),
                    synthesized: def.is_synthesized(),
                    reducer: def.reducer_hook().cloned(),
                },
            );
        }

        let relations: Vec<(String, String, Descriptor)> = order
            .iter()
            .filter_map(|name| models.get(name))
            .flat_map(|m| {
                m.fields
                    .iter()
                    .filter(|(_, d)| d.target().is_some())
                    .map(|(field, d)| (m.name.clone(), field.clone(), d.clone()))
            })
            .collect();

        for (owner, field, descriptor) in relations {
            if let Some(target) = descriptor.target() {
                if !models.contains_key(target) {
                    return Err(CoreError::schema(format!(
                        "{owner}.{field} references unregistered model {target}"
                    )));
                }
            }
            install_relation(&mut models, &owner, &field, &descriptor)?;
        }

        let synthesized = models.values().filter(|m| m.synthesized).count();
        debug!(models = models.len(), synthesized, "built schema");

        Ok(Self {
            models: models
                .into_iter()
                .map(|(name, m)| (name, Arc::new(m)))
                .collect(),
            order,
        })
    }
}

/// Fields for `def`: registry entries first, then declared fields.
pub(crate) fn resolve_fields(def: &ModelDef, registry: &DescriptorRegistry) -> CoreResult<FieldMap> {
    registry
        .entries(def.name())
        .or(def.fields())
        .cloned()
        .ok_or_else(|| CoreError::schema(format!("model {} declares no fields", def.name())))
}

/// Name of the join model synthesized for `owner.field`.
pub(crate) fn implicit_through_name(owner: &str, field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => format!("{owner}{}{}", first.to_uppercase(), chars.as_str()),
        None => owner.to_string(),
    }
}

/// Join model synthesized for a many-to-many relation without a custom one.
pub(crate) fn implicit_through(owner: &str, field: &str, m2m: &ManyToMany, id_attribute: &str) -> ModelDef {
    let (from, to) = implicit_columns(owner, &m2m.to);
    ModelDef::new(implicit_through_name(owner, field))
        .field(id_attribute, Attribute::new())
        .field(from, ForeignKey::new(owner).internal())
        .field(to, ForeignKey::new(&m2m.to).internal())
        .synthesized()
}

fn implicit_columns(owner: &str, target: &str) -> (String, String) {
    (format!("from{owner}"), format!("to{target}"))
}

fn install(
    models: &mut BTreeMap<String, ModelSchema>,
    model: &str,
    name: &str,
    accessor: Accessor,
) -> CoreResult<()> {
    let schema = models
        .get_mut(model)
        .ok_or_else(|| CoreError::model_not_found(model))?;
    if schema.accessors.contains_key(name) {
        return Err(CoreError::schema(format!(
            "accessor {model}.{name} is already defined; set a distinct related name"
        )));
    }
    schema.accessors.insert(name.to_string(), accessor);
    Ok(())
}

fn push_reverse(models: &mut BTreeMap<String, ModelSchema>, model: &str, relation: ReverseRelation) {
    if let Some(schema) = models.get_mut(model) {
        schema.reverse.push(relation);
    }
}

fn install_relation(
    models: &mut BTreeMap<String, ModelSchema>,
    owner: &str,
    field: &str,
    descriptor: &Descriptor,
) -> CoreResult<()> {
    match descriptor {
        Descriptor::Attribute(_) => Ok(()),
        Descriptor::ForeignKey(fk) if fk.internal => Ok(()),
        Descriptor::ForeignKey(fk) => {
            let name = fk
                .related_name
                .clone()
                .unwrap_or_else(|| format!("{}Set", owner.to_lowercase()));
            install(
                models,
                &fk.to,
                &name,
                Accessor::ReverseForeignKey {
                    from: owner.to_string(),
                    field: field.to_string(),
                },
            )?;
            push_reverse(
                models,
                &fk.to,
                ReverseRelation::ForeignKey {
                    from: owner.to_string(),
                    field: field.to_string(),
                    cascade: fk.cascade,
                },
            );
            Ok(())
        }
        Descriptor::OneToOne(o2o) => {
            let name = o2o
                .related_name
                .clone()
                .unwrap_or_else(|| owner.to_lowercase());
            install(
                models,
                &o2o.to,
                &name,
                Accessor::ReverseOneToOne {
                    from: owner.to_string(),
                    field: field.to_string(),
                },
            )?;
            push_reverse(
                models,
                &o2o.to,
                ReverseRelation::OneToOne {
                    from: owner.to_string(),
                    field: field.to_string(),
                    cascade: o2o.cascade,
                },
            );
            Ok(())
        }
        Descriptor::ManyToMany(m2m) => {
            let path = resolve_many_to_many(models, owner, field, m2m)?;
            let backward = path.reversed();
            let reverse_name = m2m
                .related_name
                .clone()
                .unwrap_or_else(|| format!("{}Set", owner.to_lowercase()));

            install(models, owner, field, Accessor::ManyToMany(path.clone()))?;
            install(models, &m2m.to, &reverse_name, Accessor::ManyToMany(backward.clone()))?;
            push_reverse(models, owner, ReverseRelation::ManyToMany(path));
            push_reverse(models, &m2m.to, ReverseRelation::ManyToMany(backward));
            Ok(())
        }
    }
}

fn resolve_many_to_many(
    models: &BTreeMap<String, ModelSchema>,
    owner: &str,
    field: &str,
    m2m: &ManyToMany,
) -> CoreResult<ManyToManyPath> {
    let (through, from_column, to_column) = match (&m2m.through, &m2m.through_fields) {
        (None, _) => {
            let (from, to) = implicit_columns(owner, &m2m.to);
            (implicit_through_name(owner, field), from, to)
        }
        (Some(through), Some(columns)) => {
            let join = join_model(models, owner, field, through)?;
            for column in [&columns.from, &columns.to] {
                if !join.fields.contains_key(column) {
                    return Err(CoreError::schema(format!(
                        "join model {through} has no column {column} for {owner}.{field}"
                    )));
                }
            }
            if columns.from == columns.to {
                return Err(CoreError::schema(format!(
                    "join model {through} uses {} for both sides of {owner}.{field}",
                    columns.from
                )));
            }
            (through.clone(), columns.from.clone(), columns.to.clone())
        }
        (Some(through), None) => {
            if owner == m2m.to {
                return Err(CoreError::schema(format!(
                    "self-referencing {owner}.{field} through {through} must name its through fields"
                )));
            }
            let join = join_model(models, owner, field, through)?;
            let from = single_fk_to(join, owner, field)?;
            let to = single_fk_to(join, &m2m.to, field)?;
            (through.clone(), from, to)
        }
    };

    if !models.contains_key(&through) {
        return Err(CoreError::schema(format!(
            "join model {through} for {owner}.{field} is not registered"
        )));
    }

    Ok(ManyToManyPath {
        owner: owner.to_string(),
        field: field.to_string(),
        target: m2m.to.clone(),
        through,
        from_column,
        to_column,
        forward: true,
        cascade: m2m.cascade,
    })
}

fn join_model<'a>(
    models: &'a BTreeMap<String, ModelSchema>,
    owner: &str,
    field: &str,
    through: &str,
) -> CoreResult<&'a ModelSchema> {
    models.get(through).ok_or_else(|| {
        CoreError::schema(format!(
            "join model {through} for {owner}.{field} is not registered"
        ))
    })
}

fn single_fk_to(join: &ModelSchema, target: &str, field: &str) -> CoreResult<String> {
    let mut columns = join.fields.iter().filter_map(|(name, d)| match d {
        Descriptor::ForeignKey(fk) if fk.to == target => Some(name.clone()),
        _ => None,
    });
    match (columns.next(), columns.next()) {
        (Some(column), None) => Ok(column),
        (None, _) => Err(CoreError::schema(format!(
            "join model {} has no foreign key to {target} for {field}",
            join.name
        ))),
        (Some(_), Some(_)) => Err(CoreError::schema(format!(
            "join model {} has several foreign keys to {target} for {field}; name the through fields",
            join.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::OneToOne;

    fn build(defs: Vec<ModelDef>) -> CoreResult<Schema> {
        let mut all = defs.clone();
        for def in &defs {
            for (field, d) in def.fields().into_iter().flatten() {
                if let Descriptor::ManyToMany(m2m) = d {
                    if m2m.through.is_none() {
                        all.push(implicit_through(def.name(), field, m2m, "id"));
                    }
                }
            }
        }
        Schema::build(&all, &DescriptorRegistry::default(), &Config::default())
    }

    fn library() -> Vec<ModelDef> {
        vec![
            ModelDef::new("Author").attribute("name"),
            ModelDef::new("Genre").attribute("name"),
            ModelDef::new("Book")
                .attribute("title")
                .foreign_key("author", "Author")
                .many_to_many("genres", "Genre"),
        ]
    }

    #[test]
    fn installs_forward_and_reverse_accessors() {
        let schema = build(library()).unwrap();
        let author = schema.model("Author").unwrap();
        assert_eq!(
            author.accessor("bookSet").unwrap(),
            &Accessor::ReverseForeignKey {
                from: "Book".into(),
                field: "author".into()
            }
        );

        let genre = schema.model("Genre").unwrap();
        let Accessor::ManyToMany(path) = genre.accessor("bookSet").unwrap() else {
            panic!("expected many-to-many accessor");
        };
        assert!(!path.forward);
        assert_eq!(path.through, "BookGenres");
        assert_eq!(path.this_column(), "toGenre");
    }

    #[test]
    fn join_model_has_no_reverse_accessors() {
        let schema = build(library()).unwrap();
        let book = schema.model("Book").unwrap();
        assert!(book.accessors.keys().all(|k| !k.contains("bookgenres")));
        assert!(schema.model("BookGenres").unwrap().synthesized);
    }

    #[test]
    fn unregistered_target_is_a_schema_error() {
        let err = build(vec![ModelDef::new("Book").foreign_key("author", "Author")]).unwrap_err();
        assert!(matches!(err, CoreError::Schema { .. }));
    }

    #[test]
    fn model_without_fields_is_a_schema_error() {
        assert!(matches!(
            build(vec![ModelDef::new("Empty")]),
            Err(CoreError::Schema { .. })
        ));
    }

    #[test]
    fn reverse_name_collision_is_a_schema_error() {
        let err = build(vec![
            ModelDef::new("Author").attribute("name"),
            ModelDef::new("Book")
                .foreign_key("author", "Author")
                .foreign_key("editor", "Author"),
        ])
        .unwrap_err();
        assert!(matches!(err, CoreError::Schema { .. }));
    }

    #[test]
    fn one_to_one_reverse_is_singular() {
        let schema = build(vec![
            ModelDef::new("Book").attribute("title"),
            ModelDef::new("Cover").field("book", OneToOne::new("Book")),
        ])
        .unwrap();
        assert!(matches!(
            schema.model("Book").unwrap().accessor("cover").unwrap(),
            Accessor::ReverseOneToOne { .. }
        ));
    }

    #[test]
    fn self_referencing_custom_join_needs_through_fields() {
        let err = build(vec![
            ModelDef::new("Person").field("friends", ManyToMany::new("Person").through("Friendship")),
            ModelDef::new("Friendship")
                .field("a", ForeignKey::new("Person").related_name("a_set"))
                .field("b", ForeignKey::new("Person").related_name("b_set")),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("through fields"));

        build(vec![
            ModelDef::new("Person").field(
                "friends",
                ManyToMany::new("Person")
                    .through("Friendship")
                    .through_fields("a", "b")
                    .related_name("friendOf"),
            ),
            ModelDef::new("Friendship")
                .field("a", ForeignKey::new("Person").related_name("a_set"))
                .field("b", ForeignKey::new("Person").related_name("b_set")),
        ])
        .unwrap();
    }

    #[test]
    fn custom_join_columns_are_inferred() {
        let schema = build(vec![
            ModelDef::new("User").attribute("name"),
            ModelDef::new("Team").field("members", ManyToMany::new("User").through("Membership")),
            ModelDef::new("Membership")
                .foreign_key("team", "Team")
                .foreign_key("user", "User")
                .attribute("role"),
        ])
        .unwrap();
        let Accessor::ManyToMany(path) = schema.model("Team").unwrap().accessor("members").unwrap() else {
            panic!("expected many-to-many accessor");
        };
        assert_eq!(path.from_column, "team");
        assert_eq!(path.to_column, "user");
    }

    #[test]
    fn implicit_names() {
        assert_eq!(implicit_through_name("Book", "genres"), "BookGenres");
        let def = implicit_through("Person", "friends", &ManyToMany::new("Person"), "id");
        let columns: Vec<_> = def.fields().unwrap().keys().cloned().collect();
        assert_eq!(columns, vec!["fromPerson", "id", "toPerson"]);
    }
}
