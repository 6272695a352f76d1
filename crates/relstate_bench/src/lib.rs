//! Benchmark utilities.

use rand::Rng;
use relstate_core::{props, Orm, Session, Snapshot};

/// Random attribute values for `count` rows.
pub fn random_values(count: usize) -> Vec<i64> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen_range(0..1_000_000)).collect()
}

/// A snapshot holding `count` rows of `Item { value }`.
pub fn seeded_items(orm: &Orm, count: usize) -> Snapshot {
    let session = orm.bulk_session(None).unwrap();
    let items = session.model("Item").unwrap();
    for value in random_values(count) {
        items.create(props! { "value" => value }).unwrap();
    }
    session.snapshot()
}

/// Creates `publishers` publishers with `books_each` books apiece in the
/// library schema. Publisher ids are `p0`, `p1`, ...
pub fn seed_publishers(session: &Session, publishers: usize, books_each: usize) {
    let publisher_model = session.model("Publisher").unwrap();
    let book_model = session.model("Book").unwrap();
    for p in 0..publishers {
        let publisher = publisher_model.create(props! { "id" => format!("p{p}") }).unwrap();
        for _ in 0..books_each {
            book_model.create(props! { "publisher" => &publisher }).unwrap();
        }
    }
}
