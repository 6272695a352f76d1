//! Fixture schemas and seed data.
//!
//! Three small schemas cover every relation kind:
//!
//! - library: `Author`, `Publisher`, `Genre`, `Cover`, `Book`
//! - teams: `Team`, `User` linked many-to-many
//! - people: `Person` linked to itself, implicitly or through `Friendship`

use relstate_core::{
    props, Attribute, Config, ForeignKey, ManyToMany, ModelDef, Orm, Session,
};

/// Library models.
///
/// `Book.author` is a plain foreign key (deleting an author nulls it),
/// `Book.publisher` cascades, `Book.cover` is one-to-one and `Book.genres`
/// is many-to-many through the synthesized `BookGenres`.
pub fn library_models() -> Vec<ModelDef> {
    vec![
        ModelDef::new("Author").attribute("name"),
        ModelDef::new("Publisher").attribute("name"),
        ModelDef::new("Genre").attribute("name"),
        ModelDef::new("Cover").attribute("color"),
        ModelDef::new("Book")
            .attribute("title")
            .field("year", Attribute::default_value(0))
            .foreign_key("author", "Author")
            .field("publisher", ForeignKey::new("Publisher").on_delete_cascade())
            .one_to_one("cover", "Cover")
            .many_to_many("genres", "Genre"),
    ]
}

/// Registrar for the library models.
pub fn library_orm() -> Orm {
    library_orm_with(Config::default())
}

/// Registrar for the library models with a custom configuration.
pub fn library_orm_with(config: Config) -> Orm {
    let mut orm = Orm::with_config(config);
    orm.register(library_models())
        .expect("library models register");
    orm
}

/// Registrar for `Team.users` ↔ `User.teams`.
pub fn teams_orm() -> Orm {
    teams_orm_with(Config::default())
}

/// Registrar for the team models with a custom configuration.
pub fn teams_orm_with(config: Config) -> Orm {
    let mut orm = Orm::with_config(config);
    orm.register([
        ModelDef::new("Team")
            .attribute("name")
            .field("users", ManyToMany::new("User").related_name("teams")),
        ModelDef::new("User").attribute("name"),
    ])
    .expect("team models register");
    orm
}

/// Registrar for `Person.friends`, a self-referencing many-to-many with a
/// synthesized join model.
pub fn people_orm() -> Orm {
    let mut orm = Orm::new();
    orm.register([ModelDef::new("Person")
        .attribute("name")
        .field("friends", ManyToMany::new("Person").related_name("friendOf"))])
        .expect("people models register");
    orm
}

/// Registrar for `Person.friends` through a custom `Friendship` model that
/// carries a `since` attribute.
pub fn friendship_orm() -> Orm {
    let mut orm = Orm::new();
    orm.register([
        ModelDef::new("Person").attribute("name").field(
            "friends",
            ManyToMany::new("Person")
                .related_name("friendOf")
                .through("Friendship")
                .through_fields("from", "to"),
        ),
        ModelDef::new("Friendship")
            .field("from", ForeignKey::new("Person").related_name("outgoing"))
            .field("to", ForeignKey::new("Person").related_name("incoming"))
            .field("since", Attribute::default_value(2000)),
    ])
    .expect("friendship models register");
    orm
}

/// Ids of the rows created by [`seed_library`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySeed {
    /// Author ids.
    pub authors: Vec<String>,
    /// Publisher ids.
    pub publishers: Vec<String>,
    /// Genre ids.
    pub genres: Vec<String>,
    /// Book ids.
    pub books: Vec<String>,
}

/// Creates two authors, two publishers, three genres and four books.
///
/// | Book | Author | Publisher | Genres   |
/// |------|--------|-----------|----------|
/// | b1   | a1     | p1        | g1, g2   |
/// | b2   | a1     | p2        | g2       |
/// | b3   | a2     | p1        | g3       |
/// | b4   | a2     | p2        |          |
pub fn seed_library(session: &Session) -> LibrarySeed {
    let model = |name: &str| session.model(name).expect("library model");

    let authors = model("Author");
    for (id, name) in [("a1", "Herbert"), ("a2", "Le Guin")] {
        authors.create(props! { "id" => id, "name" => name }).expect("author");
    }
    let publishers = model("Publisher");
    for (id, name) in [("p1", "Chilton"), ("p2", "Ace")] {
        publishers.create(props! { "id" => id, "name" => name }).expect("publisher");
    }
    let genres = model("Genre");
    for (id, name) in [("g1", "sf"), ("g2", "classic"), ("g3", "fantasy")] {
        genres.create(props! { "id" => id, "name" => name }).expect("genre");
    }

    let books = model("Book");
    let rows: [(&str, &str, &str, Vec<&str>, i64); 4] = [
        ("b1", "a1", "p1", vec!["g1", "g2"], 1965),
        ("b2", "a1", "p2", vec!["g2"], 1969),
        ("b3", "a2", "p1", vec!["g3"], 1968),
        ("b4", "a2", "p2", vec![], 1974),
    ];
    for (id, author, publisher, genre_ids, year) in rows {
        books
            .create(props! {
                "id" => id,
                "title" => format!("Book {id}"),
                "year" => year,
                "author" => author,
                "publisher" => publisher,
                "genres" => genre_ids,
            })
            .expect("book");
    }

    LibrarySeed {
        authors: vec!["a1".into(), "a2".into()],
        publishers: vec!["p1".into(), "p2".into()],
        genres: vec!["g1".into(), "g2".into(), "g3".into()],
        books: vec!["b1".into(), "b2".into(), "b3".into(), "b4".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_schemas_build() {
        for orm in [library_orm(), teams_orm(), people_orm(), friendship_orm()] {
            assert!(orm.build_schema().is_ok());
        }
    }

    #[test]
    fn library_synthesizes_book_genres() {
        let schema = library_orm().build_schema().unwrap();
        assert!(schema.model("BookGenres").unwrap().synthesized);
    }

    #[test]
    fn seed_creates_rows() {
        let orm = library_orm();
        let session = orm.session(None).unwrap();
        let seed = seed_library(&session);
        let state = session.snapshot();
        assert_eq!(state.table("Book").unwrap().len(), seed.books.len());
        assert_eq!(state.table("BookGenres").unwrap().len(), 4);
    }
}
