//! Replay harnesses.
//!
//! Each harness applies generated operations through the public entity API
//! while tracking what the store should contain, then checks the store
//! against that model.

use crate::generators::{EdgeOp, RowOp};
use relstate_core::{props, CoreError, CoreResult, Id, ModelDef, Orm, QuerySet, Session};
use std::collections::{BTreeSet, HashSet};

/// Registrar for a single `Item { value }` model.
pub fn items_orm() -> Orm {
    let mut orm = Orm::new();
    orm.register([ModelDef::new("Item").attribute("value")])
        .expect("item model registers");
    orm
}

/// Applies [`RowOp`]s to one table and tracks the expected id order.
pub struct RowHarness {
    session: Session,
    model: String,
    expected: Vec<Id>,
    creates: usize,
    deletes: usize,
    rejected: usize,
}

impl RowHarness {
    /// Opens a session on `orm` and targets `model`.
    pub fn new(orm: &Orm, model: &str) -> Self {
        Self {
            session: orm.session(None).expect("Failed to open session"),
            model: model.to_string(),
            expected: Vec::new(),
            creates: 0,
            deletes: 0,
            rejected: 0,
        }
    }

    /// The session operations run in.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Applies one operation.
    pub fn apply(&mut self, op: &RowOp) {
        let handle = self.session.model(&self.model).expect("Failed to get model");
        match op {
            RowOp::Create { id } => {
                let duplicate = id
                    .as_deref()
                    .is_some_and(|id| self.expected.contains(&Id::new(id)));
                let props = match id {
                    Some(id) => props! { "id" => id.as_str(), "value" => 0 },
                    None => props! { "value" => 0 },
                };
                match handle.create(props) {
                    Ok(instance) => {
                        assert!(!duplicate, "duplicate id {id:?} was accepted");
                        self.expected.push(instance.id().clone());
                        self.creates += 1;
                    }
                    Err(CoreError::DuplicateId { .. }) if duplicate => self.rejected += 1,
                    Err(e) => panic!("create failed: {e}"),
                }
            }
            RowOp::Update { index, value } => {
                let Some(id) = self.pick(*index) else { return };
                let mut instance = handle
                    .with_id(id)
                    .expect("Failed to look up row")
                    .expect("tracked row is live");
                instance
                    .update(props! { "value" => *value })
                    .expect("Failed to update row");
            }
            RowOp::Delete { index } => {
                let Some(id) = self.pick(*index) else { return };
                let instance = handle
                    .with_id(id.clone())
                    .expect("Failed to look up row")
                    .expect("tracked row is live");
                instance.delete().expect("Failed to delete row");
                self.expected.retain(|tracked| *tracked != id);
                self.deletes += 1;
            }
        }
    }

    fn pick(&self, index: usize) -> Option<Id> {
        if self.expected.is_empty() {
            None
        } else {
            Some(self.expected[index % self.expected.len()].clone())
        }
    }

    /// Checks the table against the tracked ids.
    pub fn verify(&self) {
        let handle = self.session.model(&self.model).expect("Failed to get model");
        let ids: Vec<Id> = handle
            .all()
            .to_entities()
            .expect("Failed to read rows")
            .iter()
            .map(|instance| instance.id().clone())
            .collect();

        assert_eq!(ids, self.expected, "rows out of creation order");
        let unique: HashSet<&Id> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate ids in table");
        assert_eq!(ids.len(), self.creates - self.deletes);
    }

    /// Successful creates.
    pub fn creates(&self) -> usize {
        self.creates
    }

    /// Successful deletes.
    pub fn deletes(&self) -> usize {
        self.deletes
    }

    /// Creates rejected as duplicates.
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

/// Applies [`EdgeOp`]s to the teams fixture and tracks linked pairs.
pub struct EdgeHarness {
    session: Session,
    teams: usize,
    users: usize,
    links: BTreeSet<(usize, usize)>,
}

impl EdgeHarness {
    /// Opens a session on a teams registrar and creates `teams` teams
    /// (`t0`, `t1`, ...) and `users` users (`u0`, `u1`, ...).
    pub fn new(orm: &Orm, teams: usize, users: usize) -> Self {
        let session = orm.session(None).expect("Failed to open session");
        {
            let team_model = session.model("Team").expect("Failed to get Team");
            for i in 0..teams {
                team_model
                    .create(props! { "id" => team_id(i) })
                    .expect("Failed to create team");
            }
            let user_model = session.model("User").expect("Failed to get User");
            for i in 0..users {
                user_model
                    .create(props! { "id" => user_id(i) })
                    .expect("Failed to create user");
            }
        }
        Self {
            session,
            teams,
            users,
            links: BTreeSet::new(),
        }
    }

    /// The session operations run in.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Applies one operation.
    pub fn apply(&mut self, op: EdgeOp) {
        let strict = self.session.config().strict_edges;
        match op {
            EdgeOp::Add { team, user } => {
                let linked = self.links.contains(&(team, user));
                let result = self.team_users(team).add([user_id(user)]);
                expect_edge_result(result, linked && strict);
                self.links.insert((team, user));
            }
            EdgeOp::Remove { team, user } => {
                let linked = self.links.contains(&(team, user));
                let result = self.team_users(team).remove([user_id(user)]);
                expect_edge_result(result, !linked && strict);
                self.links.remove(&(team, user));
            }
            EdgeOp::ClearUser { user } => {
                let session = &self.session;
                let instance = session
                    .model("User")
                    .expect("Failed to get User")
                    .with_id(user_id(user))
                    .expect("Failed to look up user")
                    .expect("user exists");
                instance
                    .related_set("teams")
                    .expect("Failed to get teams")
                    .clear()
                    .expect("Failed to clear teams");
                self.links.retain(|(_, u)| *u != user);
            }
        }
    }

    fn team_users(&self, team: usize) -> QuerySet<'_> {
        self.session
            .model("Team")
            .expect("Failed to get Team")
            .with_id(team_id(team))
            .expect("Failed to look up team")
            .expect("team exists")
            .related_set("users")
            .expect("Failed to get users")
    }

    /// Checks both accessors and the join table against the tracked pairs.
    pub fn verify(&self) {
        for team in 0..self.teams {
            let expected: BTreeSet<String> = self
                .links
                .iter()
                .filter(|(t, _)| *t == team)
                .map(|(_, u)| user_id(*u))
                .collect();
            assert_eq!(linked(&self.team_users(team)), expected, "team {team} users");
        }

        let users = self.session.model("User").expect("Failed to get User");
        for user in 0..self.users {
            let expected: BTreeSet<String> = self
                .links
                .iter()
                .filter(|(_, u)| *u == user)
                .map(|(t, _)| team_id(*t))
                .collect();
            let teams = users
                .with_id(user_id(user))
                .expect("Failed to look up user")
                .expect("user exists")
                .related_set("teams")
                .expect("Failed to get teams");
            assert_eq!(linked(&teams), expected, "user {user} teams");
        }

        let join_rows = self
            .session
            .model("TeamUsers")
            .expect("Failed to get join model")
            .count()
            .expect("Failed to count join rows");
        assert_eq!(join_rows, self.links.len(), "join rows");
    }

    /// Currently linked pairs as `(team, user)` indices.
    pub fn links(&self) -> &BTreeSet<(usize, usize)> {
        &self.links
    }
}

fn expect_edge_result(result: CoreResult<()>, should_fail: bool) {
    match result {
        Ok(()) => assert!(!should_fail, "redundant edge edit was accepted"),
        Err(CoreError::RelationValue { .. }) if should_fail => {}
        Err(e) => panic!("edge edit failed: {e}"),
    }
}

fn linked(set: &QuerySet<'_>) -> BTreeSet<String> {
    set.to_entities()
        .expect("Failed to read related rows")
        .iter()
        .map(|instance| instance.id().as_str().to_string())
        .collect()
}

/// Id of the `i`th fixture team.
pub fn team_id(i: usize) -> String {
    format!("t{i}")
}

/// Id of the `i`th fixture user.
pub fn user_id(i: usize) -> String {
    format!("u{i}")
}
