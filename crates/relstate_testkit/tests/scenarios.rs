//! End-to-end scenarios over the fixture schemas.

use relstate_core::{props, Config, CoreError, FieldValue, Id, ModelDef, Orm, Snapshot};
use relstate_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn book_author_and_genres() {
    let mut orm = Orm::new();
    orm.register([
        ModelDef::new("Author").attribute("name"),
        ModelDef::new("Genre").attribute("name"),
        ModelDef::new("Book")
            .attribute("title")
            .foreign_key("author", "Author")
            .many_to_many("genres", "Genre"),
    ])
    .unwrap();
    let session = orm.session(None).unwrap();

    session.model("Author").unwrap().create(props! { "id" => "1" }).unwrap();
    session
        .model("Book")
        .unwrap()
        .create(props! { "id" => "10", "author" => "1", "genres" => vec!["g1", "g2"] })
        .unwrap();

    let book = session.model("Book").unwrap().with_id("10").unwrap().unwrap();
    let author = book.related("author").unwrap().unwrap();
    assert_eq!(author.id(), "1");
    assert_eq!(author.related_set("bookSet").unwrap().count().unwrap(), 1);
    assert_eq!(session.model("BookGenres").unwrap().count().unwrap(), 2);
    assert!(book.row().get("genres").is_none());
}

#[test]
fn team_user_edges_are_visible_from_both_sides() {
    let orm = teams_orm();
    let session = orm.session(None).unwrap();
    let team = session.model("Team").unwrap().create(props! { "id" => "t0" }).unwrap();
    let user = session.model("User").unwrap().create(props! { "id" => "u0" }).unwrap();

    team.related_set("users").unwrap().add([&user]).unwrap();

    let rows = user.related_set("teams").unwrap().to_rows().unwrap();
    let team = session.model("Team").unwrap().with_id("t0").unwrap().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(Arc::ptr_eq(&rows[0], team.row()));
    assert_eq!(session.model("TeamUsers").unwrap().count().unwrap(), 1);
}

#[test]
fn cascade_and_null_on_delete() {
    let orm = library_orm();
    let session = orm.session(None).unwrap();
    seed_library(&session);

    let outcome = session
        .model("Publisher")
        .unwrap()
        .with_id("p1")
        .unwrap()
        .unwrap()
        .delete()
        .unwrap();
    assert_eq!(outcome.deleted_in("Publisher"), 1);
    assert_eq!(outcome.deleted_in("Book"), 2);
    // b1 had two genres, b3 one.
    assert_eq!(outcome.deleted_in("BookGenres"), 3);

    let books = session.model("Book").unwrap();
    assert!(!books.id_exists("b1").unwrap());
    assert!(!books.id_exists("b3").unwrap());
    assert_eq!(books.count().unwrap(), 2);

    let outcome = session
        .model("Author")
        .unwrap()
        .with_id("a2")
        .unwrap()
        .unwrap()
        .delete()
        .unwrap();
    assert_eq!(outcome.deleted_in("Book"), 0);
    assert_eq!(outcome.nulled, 1);

    let b4 = books.with_id("b4").unwrap().unwrap();
    assert!(b4.attr("author").unwrap().is_null());
    assert!(b4.related("author").unwrap().is_none());
}

#[test]
fn deleting_a_genre_keeps_books() {
    let orm = library_orm();
    let session = orm.session(None).unwrap();
    seed_library(&session);

    session.model("Genre").unwrap().filter(props! { "id" => "g2" }).delete().unwrap();

    let books = session.model("Book").unwrap();
    assert_eq!(books.count().unwrap(), 4);
    let b1 = books.with_id("b1").unwrap().unwrap();
    let ids: Vec<Id> = b1
        .related_set("genres")
        .unwrap()
        .to_entities()
        .unwrap()
        .iter()
        .map(|g| g.id().clone())
        .collect();
    assert_eq!(ids, vec![Id::new("g1")]);
}

#[test]
fn id_filter_runs_before_predicate() {
    let orm = library_orm();
    let session = orm.session(None).unwrap();
    seed_library(&session);

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let before = session.stats().snapshot();

    let matched = session
        .model("Book")
        .unwrap()
        .filter_by(move |row| {
            seen.fetch_add(1, Ordering::Relaxed);
            row.get("year").and_then(|v| v.as_integer()).is_some_and(|y| y < 1970)
        })
        .filter(props! { "id" => "b3" })
        .to_entities()
        .unwrap();

    let delta = session.stats().snapshot().since(&before);
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id(), "b3");
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(delta.full_scans, 0);
    assert_eq!(delta.id_lookups, 1);
}

#[test]
fn all_keeps_creation_order_across_updates() {
    let orm = library_orm();
    let session = orm.session(None).unwrap();
    seed_library(&session);

    let books = session.model("Book").unwrap();
    let mut b1 = books.with_id("b1").unwrap().unwrap();
    b1.update(props! { "title" => "Dune" }).unwrap();

    let ids: Vec<String> = books
        .all()
        .to_entities()
        .unwrap()
        .iter()
        .map(|b| b.id().to_string())
        .collect();
    assert_eq!(ids, ["b1", "b2", "b3", "b4"]);
}

#[test]
fn no_op_update_keeps_table_identity() {
    let orm = library_orm();
    let session = orm.session(None).unwrap();
    seed_library(&session);

    let before = session.snapshot();
    let mut book = session.model("Book").unwrap().with_id("b2").unwrap().unwrap();
    let changed = book
        .update(props! { "title" => "Book b2", "year" => 1969, "genres" => vec!["g2"] })
        .unwrap();

    assert!(!changed);
    assert!(session.snapshot().table_ptr_eq(&before, "Book"));
    assert!(session.snapshot().table_ptr_eq(&before, "BookGenres"));
}

#[test]
fn one_to_one_claims_can_be_enforced() {
    let orm = library_orm_with(Config::default().enforce_one_to_one(true));
    let session = orm.session(None).unwrap();
    session.model("Cover").unwrap().create(props! { "id" => "c1" }).unwrap();
    let books = session.model("Book").unwrap();
    books.create(props! { "id" => "x", "cover" => "c1" }).unwrap();

    let err = books.create(props! { "id" => "y", "cover" => "c1" }).unwrap_err();
    assert!(matches!(err, CoreError::RelationValue { .. }));

    let cover = session.model("Cover").unwrap().with_id("c1").unwrap().unwrap();
    match cover.field("book").unwrap() {
        FieldValue::Entity(Some(book)) => assert_eq!(book.id(), "x"),
        other => panic!("expected the owning book, got {other:?}"),
    }
}

#[test]
fn self_referencing_friends() {
    let orm = people_orm();
    let session = orm.session(None).unwrap();
    let people = session.model("Person").unwrap();
    for id in ["ann", "bob", "cat"] {
        people.create(props! { "id" => id }).unwrap();
    }
    let ann = people.with_id("ann").unwrap().unwrap();
    ann.related_set("friends").unwrap().add(["bob", "cat"]).unwrap();

    let bob = people.with_id("bob").unwrap().unwrap();
    assert_eq!(bob.related_set("friends").unwrap().count().unwrap(), 0);
    let followers = bob.related_set("friendOf").unwrap().to_entities().unwrap();
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0].id(), "ann");

    ann.delete().unwrap();
    assert_eq!(session.model("PersonFriends").unwrap().count().unwrap(), 0);
    assert_eq!(people.count().unwrap(), 2);
}

#[test]
fn custom_through_model_carries_attributes() {
    let orm = friendship_orm();
    let session = orm.session(None).unwrap();
    let people = session.model("Person").unwrap();
    let ann = people.create(props! { "id" => "ann" }).unwrap();
    people.create(props! { "id" => "bob" }).unwrap();

    ann.related_set("friends").unwrap().add(["bob"]).unwrap();

    let friendship = session.model("Friendship").unwrap().all().first().unwrap().unwrap();
    assert_eq!(friendship.attr("from").unwrap().as_text(), Some("ann"));
    assert_eq!(friendship.attr("to").unwrap().as_text(), Some("bob"));
    assert_eq!(friendship.attr("since").unwrap().as_integer(), Some(2000));

    assert_eq!(ann.related_set("outgoing").unwrap().count().unwrap(), 1);
    let bob = people.with_id("bob").unwrap().unwrap();
    assert_eq!(bob.related_set("friendOf").unwrap().first().unwrap().unwrap().id(), "ann");
}

#[test]
fn sessions_do_not_share_writes() {
    let orm = library_orm();
    let base = {
        let session = orm.session(None).unwrap();
        seed_library(&session);
        session.snapshot()
    };

    let a = orm.session(Some(base.clone())).unwrap();
    let b = orm.session(Some(base.clone())).unwrap();
    a.model("Book").unwrap().delete_all().unwrap();

    assert_eq!(a.model("Book").unwrap().count().unwrap(), 0);
    assert_eq!(b.model("Book").unwrap().count().unwrap(), 4);
    assert_eq!(base.table("Book").unwrap().len(), 4);
}

#[test]
fn snapshot_json_round_trip() {
    let orm = library_orm();
    let session = orm.session(None).unwrap();
    seed_library(&session);
    let state = session.snapshot();

    let json = state.to_json().unwrap();
    let book = &json["Book"];
    assert_eq!(book["items"][0], "b1");
    assert_eq!(book["itemsById"]["b2"]["year"], 1969);
    assert!(book["meta"].is_object());

    let restored = Snapshot::from_json(json).unwrap();
    let resumed = orm.session(Some(restored)).unwrap();
    let b2 = resumed.model("Book").unwrap().with_id("b2").unwrap().unwrap();
    assert_eq!(b2.related("author").unwrap().unwrap().id(), "a1");
    assert_eq!(b2.related_set("genres").unwrap().count().unwrap(), 1);
}

#[test]
fn invalid_snapshot_is_rejected() {
    let json = serde_json::json!({
        "Book": { "items": ["b1", "b2"], "itemsById": { "b1": { "id": "b1" } }, "meta": {} }
    });
    let err = Snapshot::from_json(json).unwrap_err();
    assert!(matches!(err, CoreError::InvalidSnapshot { .. }));
}
