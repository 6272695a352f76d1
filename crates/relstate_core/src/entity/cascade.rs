//! Cascade delete.
//!
//! Deleting a row touches every relation pointing at it. The plan is built
//! with a worklist before anything is written: each dequeued row is marked
//! visited for its model, its reverse relations are read, and related rows
//! are either enqueued for deletion (cascade, join rows) or recorded for
//! nulling. Cycles end at the visited check. The plan is then applied as a
//! single batch.

use crate::entity::Id;
use crate::error::CoreResult;
use crate::schema::ReverseRelation;
use crate::store::{QuerySpec, UpdateSpec};
use crate::table::{Clause, Predicate, Row};
use crate::transaction::Session;
use relstate_codec::{Record, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::debug;

/// Rows removed and references nulled by a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Model name to number of deleted rows.
    pub deleted: BTreeMap<String, usize>,
    /// Number of rows whose reference was set to null.
    pub nulled: usize,
}

impl DeleteOutcome {
    /// Rows deleted from `model`.
    pub fn deleted_in(&self, model: &str) -> usize {
        self.deleted.get(model).copied().unwrap_or(0)
    }

    /// Rows deleted across all models.
    pub fn total(&self) -> usize {
        self.deleted.values().sum()
    }
}

/// Everything one delete will write.
#[derive(Debug, Default)]
pub(crate) struct DeletePlan {
    deletes: BTreeMap<String, Vec<Id>>,
    nulls: BTreeMap<(String, String), Vec<Id>>,
}

impl DeletePlan {
    /// Collects the rows to delete and the references to null when the
    /// `roots` of `model` are deleted.
    pub(crate) fn collect(session: &Session, model: &str, roots: Vec<Id>) -> CoreResult<Self> {
        let schema = session.schema().clone();
        let mut visited: BTreeMap<String, HashSet<Id>> = BTreeMap::new();
        let mut queue: VecDeque<(String, Id)> = roots
            .into_iter()
            .map(|id| (model.to_string(), id))
            .collect();
        let mut plan = DeletePlan::default();

        while let Some((model, id)) = queue.pop_front() {
            if !visited.entry(model.clone()).or_default().insert(id.clone()) {
                continue;
            }
            let model_schema = schema.model(&model)?;

            for relation in &model_schema.reverse {
                match relation {
                    ReverseRelation::ForeignKey { from, field, cascade }
                    | ReverseRelation::OneToOne { from, field, cascade } => {
                        let id_attribute = &schema.model(from)?.id_attribute;
                        for row in pointing_at(session, from, field, &id)? {
                            let related = row_id(&row, id_attribute);
                            if *cascade {
                                queue.push_back((from.clone(), related));
                            } else {
                                plan.nulls
                                    .entry((from.clone(), field.clone()))
                                    .or_default()
                                    .push(related);
                            }
                        }
                    }
                    ReverseRelation::ManyToMany(path) => {
                        let id_attribute = &schema.model(&path.through)?.id_attribute;
                        for row in pointing_at(session, &path.through, path.this_column(), &id)? {
                            queue.push_back((path.through.clone(), row_id(&row, id_attribute)));
                            // Cascade runs from the target side only.
                            if path.cascade && !path.forward {
                                if let Some(other) = row.get(path.other_column()).filter(|v| !v.is_null()) {
                                    queue.push_back((path.other_model().to_string(), Id::from_value(other)));
                                }
                            }
                        }
                    }
                }
            }
            plan.deletes.entry(model).or_default().push(id);
        }

        for ((model, _), ids) in plan.nulls.iter_mut() {
            let deleted = visited.get(model);
            let mut seen = HashSet::new();
            ids.retain(|id| deleted.map_or(true, |d| !d.contains(id)) && seen.insert(id.clone()));
        }
        plan.nulls.retain(|_, ids| !ids.is_empty());

        debug!(
            root = model,
            models = plan.deletes.len(),
            rows = plan.deletes.values().map(Vec::len).sum::<usize>(),
            nulled = plan.nulls.values().map(Vec::len).sum::<usize>(),
            "planned cascade delete"
        );
        Ok(plan)
    }

    /// The updates that carry out the plan: nulls first, then deletes.
    pub(crate) fn into_specs(self) -> Vec<UpdateSpec> {
        let nulls = self.nulls.into_iter().map(|((model, field), ids)| UpdateSpec::Update {
            query: QuerySpec::new(model).clause(Clause::Filter(Predicate::Ids(ids))),
            patch: Record::from([(field, Value::Null)]),
        });
        let deletes = self.deletes.into_iter().map(|(model, ids)| UpdateSpec::Delete {
            query: QuerySpec::new(model).clause(Clause::Filter(Predicate::Ids(ids))),
        });
        nulls.chain(deletes).collect()
    }

    /// Applies the plan in one batch.
    pub(crate) fn execute(self, session: &Session) -> CoreResult<DeleteOutcome> {
        let mut outcome = DeleteOutcome::default();
        let specs = self.into_specs();
        let kinds: Vec<(bool, String)> = specs
            .iter()
            .map(|s| (matches!(s, UpdateSpec::Delete { .. }), s.table().to_string()))
            .collect();

        for ((is_delete, model), payload) in kinds.into_iter().zip(session.apply_updates(specs)?) {
            if is_delete {
                *outcome.deleted.entry(model).or_default() += payload.row_count();
            } else {
                outcome.nulled += payload.row_count();
            }
        }
        Ok(outcome)
    }
}

fn pointing_at(session: &Session, model: &str, field: &str, id: &Id) -> CoreResult<Vec<Row>> {
    session.query(&QuerySpec::new(model).clause(Clause::Filter(Predicate::Equals(Record::from([(
        field.to_string(),
        id.to_value(),
    )])))))
}

fn row_id(row: &Row, id_attribute: &str) -> Id {
    Id::from_value(row.get(id_attribute).unwrap_or(&Value::Null))
}

#[cfg(test)]
mod tests {
    use crate::props;
    use crate::schema::{ForeignKey, ManyToMany, ModelDef, OneToOne, Orm};
    use relstate_codec::Value;

    fn orm() -> Orm {
        let mut orm = Orm::new();
        orm.register([
            ModelDef::new("Person").attribute("name"),
            ModelDef::new("Passport")
                .attribute("number")
                .field("holder", OneToOne::new("Person").related_name("passport").on_delete_cascade()),
            ModelDef::new("Profile")
                .attribute("bio")
                .field("owner", OneToOne::new("Person").related_name("profile")),
            ModelDef::new("Tag").attribute("label"),
            ModelDef::new("Post")
                .attribute("title")
                .field("tags", ManyToMany::new("Tag").related_name("posts").on_delete_cascade()),
        ])
        .unwrap();
        orm
    }

    #[test]
    fn one_to_one_cascade_deletes_the_owner() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let person = session.model("Person").unwrap().create(props! { "id" => "p1" }).unwrap();
        session.model("Passport").unwrap().create(props! { "id" => "x", "holder" => "p1" }).unwrap();

        let outcome = person.delete().unwrap();
        assert_eq!(outcome.deleted_in("Person"), 1);
        assert_eq!(outcome.deleted_in("Passport"), 1);
        assert_eq!(outcome.nulled, 0);
        assert_eq!(session.model("Passport").unwrap().count().unwrap(), 0);
    }

    #[test]
    fn one_to_one_without_cascade_is_nulled() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let person = session.model("Person").unwrap().create(props! { "id" => "p1" }).unwrap();
        let profiles = session.model("Profile").unwrap();
        profiles.create(props! { "id" => "pr", "owner" => "p1", "bio" => "hi" }).unwrap();

        let outcome = person.delete().unwrap();
        assert_eq!(outcome.total(), 1);
        assert_eq!(outcome.nulled, 1);

        let profile = profiles.with_id("pr").unwrap().unwrap();
        assert_eq!(profile.attr("owner"), Some(&Value::Null));
        assert_eq!(profile.attr("bio"), Some(&Value::from("hi")));
    }

    #[test]
    fn many_to_many_cascade_runs_from_the_target() {
        let orm = orm();
        let session = orm.session(None).unwrap();
        let tags = session.model("Tag").unwrap();
        let posts = session.model("Post").unwrap();
        for id in ["t1", "t2"] {
            tags.create(props! { "id" => id }).unwrap();
        }
        posts.create(props! { "id" => "a", "tags" => vec!["t1", "t2"] }).unwrap();
        posts.create(props! { "id" => "b", "tags" => vec!["t2"] }).unwrap();

        let outcome = tags.with_id("t1").unwrap().unwrap().delete().unwrap();
        assert_eq!(outcome.deleted_in("Tag"), 1);
        assert_eq!(outcome.deleted_in("Post"), 1);
        // Both of post a's join rows go, including the one to t2.
        assert_eq!(outcome.deleted_in("PostTags"), 2);
        assert!(!posts.id_exists("a").unwrap());
        assert!(tags.id_exists("t2").unwrap());

        // Deleting the owner leaves its targets alone.
        let outcome = posts.with_id("b").unwrap().unwrap().delete().unwrap();
        assert_eq!(outcome.deleted_in("Tag"), 0);
        assert_eq!(outcome.deleted_in("PostTags"), 1);
        assert_eq!(tags.count().unwrap(), 1);
    }

    #[test]
    fn cascade_cycles_terminate() {
        let mut orm = Orm::new();
        orm.register([
            ModelDef::new("Left").field("right", ForeignKey::new("Right").on_delete_cascade()),
            ModelDef::new("Right").field("left", ForeignKey::new("Left").on_delete_cascade()),
        ])
        .unwrap();
        let session = orm.session(None).unwrap();
        let left = session.model("Left").unwrap();
        let right = session.model("Right").unwrap();
        left.create(props! { "id" => "l1", "right" => "r1" }).unwrap();
        left.create(props! { "id" => "l2", "right" => "r1" }).unwrap();
        right.create(props! { "id" => "r1", "left" => "l1" }).unwrap();

        let outcome = left.with_id("l1").unwrap().unwrap().delete().unwrap();
        assert_eq!(outcome.deleted_in("Left"), 2);
        assert_eq!(outcome.deleted_in("Right"), 1);
        assert_eq!(outcome.nulled, 0);
        assert_eq!(left.count().unwrap() + right.count().unwrap(), 0);
    }
}
