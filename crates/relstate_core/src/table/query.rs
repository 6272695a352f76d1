//! Query clauses and the clause planner.
//!
//! A query is an ordered list of clauses. Before evaluation the clauses are
//! stable-sorted by rank so that an id-pinned filter runs first and turns
//! the query into a direct lookup instead of a scan:
//!
//! | Rank | Clause                                              |
//! |------|-----------------------------------------------------|
//! | 1    | equality filter on the id attribute, id-set filter   |
//! | 2    | any other filter or exclude                          |
//! | 3    | order-by                                             |

use crate::entity::Id;
use crate::stats::StoreStats;
use crate::table::Row;
use relstate_codec::{Record, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Caller-supplied row predicate.
pub type RowPredicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Caller-supplied sort key.
pub type KeyFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// A row predicate.
#[derive(Clone)]
pub enum Predicate {
    /// Every listed attribute equals the given value. A missing attribute
    /// reads as null.
    Equals(Record),
    /// The row id is one of the listed ids. Matching rows come back in list order.
    Ids(Vec<Id>),
    /// Arbitrary predicate.
    Fn(RowPredicate),
}

impl Predicate {
    /// Builds a predicate from a closure.
    pub fn func(f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        Predicate::Fn(Arc::new(f))
    }

    /// Tests a row. `id_attribute` is needed to compare ids canonically.
    pub fn matches(&self, row: &Record, id_attribute: &str) -> bool {
        match self {
            Predicate::Equals(fields) => fields.iter().all(|(key, expected)| {
                let actual = row.get(key).unwrap_or(&Value::Null);
                if key == id_attribute {
                    Id::from_value(actual) == Id::from_value(expected)
                } else {
                    actual == expected
                }
            }),
            Predicate::Ids(ids) => {
                let id = Id::from_value(row.get(id_attribute).unwrap_or(&Value::Null));
                ids.contains(&id)
            }
            Predicate::Fn(f) => f(row),
        }
    }

    /// Ids this predicate pins the query to, if it is id-resolvable.
    pub fn pinned_ids(&self, id_attribute: &str) -> Option<Vec<Id>> {
        match self {
            Predicate::Equals(fields) => fields.get(id_attribute).map(|v| vec![Id::from_value(v)]),
            Predicate::Ids(ids) => Some(ids.clone()),
            Predicate::Fn(_) => None,
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals(fields) => f.debug_tuple("Equals").field(fields).finish(),
            Predicate::Ids(ids) => f.debug_tuple("Ids").field(ids).finish(),
            Predicate::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

impl From<Record> for Predicate {
    fn from(fields: Record) -> Self {
        Predicate::Equals(fields)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// What to sort by.
#[derive(Clone)]
pub enum SortKey {
    /// An attribute value.
    Field(String),
    /// A computed value.
    Fn(KeyFn),
}

impl SortKey {
    fn extract(&self, row: &Record) -> Value {
        match self {
            SortKey::Field(name) => row.get(name).cloned().unwrap_or_default(),
            SortKey::Fn(f) => f(row),
        }
    }
}

impl fmt::Debug for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Field(name) => f.debug_tuple("Field").field(name).finish(),
            SortKey::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

/// One sort key with its direction.
#[derive(Debug, Clone)]
pub struct SortSpec {
    /// Key.
    pub key: SortKey,
    /// Direction.
    pub direction: Direction,
}

impl SortSpec {
    /// Sorts by an attribute, ascending.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            key: SortKey::Field(field.into()),
            direction: Direction::Asc,
        }
    }

    /// Sorts by an attribute, descending.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            key: SortKey::Field(field.into()),
            direction: Direction::Desc,
        }
    }

    /// Sorts by a computed key.
    pub fn by(f: impl Fn(&Record) -> Value + Send + Sync + 'static, direction: Direction) -> Self {
        Self {
            key: SortKey::Fn(Arc::new(f)),
            direction,
        }
    }
}

impl From<&str> for SortSpec {
    fn from(field: &str) -> Self {
        SortSpec::asc(field)
    }
}

impl From<(&str, Direction)> for SortSpec {
    fn from((field, direction): (&str, Direction)) -> Self {
        Self {
            key: SortKey::Field(field.to_string()),
            direction,
        }
    }
}

/// A query clause.
#[derive(Debug, Clone)]
pub enum Clause {
    /// Keep rows matching the predicate.
    Filter(Predicate),
    /// Drop rows matching the predicate.
    Exclude(Predicate),
    /// Stable multi-key sort.
    OrderBy(Vec<SortSpec>),
}

impl Clause {
    /// Planner rank of this clause.
    pub fn rank(&self, id_attribute: &str) -> u8 {
        match self {
            Clause::Filter(Predicate::Equals(fields)) if fields.contains_key(id_attribute) => 1,
            Clause::Filter(Predicate::Ids(_)) => 1,
            Clause::Filter(_) | Clause::Exclude(_) => 2,
            Clause::OrderBy(_) => 3,
        }
    }

    /// Ids this clause pins the query to, if it is a rank-1 filter.
    pub fn pinned_ids(&self, id_attribute: &str) -> Option<Vec<Id>> {
        match self {
            Clause::Filter(predicate) => predicate.pinned_ids(id_attribute),
            _ => None,
        }
    }
}

/// Evaluates clauses against a table's rows.
///
/// `rows` is the table in insertion order, `lookup` resolves a single id.
pub(crate) fn evaluate<'a, I, L>(
    rows: I,
    lookup: L,
    clauses: &[Clause],
    id_attribute: &str,
    stats: &StoreStats,
) -> Vec<Row>
where
    I: Iterator<Item = &'a Row>,
    L: Fn(&Id) -> Option<&'a Row>,
{
    let mut ordered: Vec<&Clause> = clauses.iter().collect();
    ordered.sort_by_key(|clause| clause.rank(id_attribute));
    trace!(
        ranks = ?ordered.iter().map(|c| c.rank(id_attribute)).collect::<Vec<_>>(),
        "planned query"
    );

    let pinned = ordered.first().and_then(|c| c.pinned_ids(id_attribute));
    stats.record_query(pinned.is_some());

    let mut result: Vec<Row> = match pinned {
        Some(ids) => {
            let mut seen = HashSet::with_capacity(ids.len());
            ids.iter()
                .filter(|id| seen.insert(*id))
                .filter_map(|id| lookup(id).cloned())
                .collect()
        }
        None => rows.cloned().collect(),
    };

    // The pinned clause is applied again so extra keys in its payload still filter.
    for clause in ordered {
        match clause {
            Clause::Filter(p) => result.retain(|row| p.matches(row, id_attribute)),
            Clause::Exclude(p) => result.retain(|row| !p.matches(row, id_attribute)),
            Clause::OrderBy(specs) => sort_rows(&mut result, specs),
        }
    }
    result
}

fn sort_rows(rows: &mut [Row], specs: &[SortSpec]) {
    if specs.is_empty() {
        return;
    }
    let mut keyed: Vec<(Vec<Value>, Row)> = rows
        .iter()
        .map(|row| (specs.iter().map(|s| s.key.extract(row)).collect(), row.clone()))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, specs));
    for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
        *slot = row;
    }
}

fn compare_keys(a: &[Value], b: &[Value], specs: &[SortSpec]) -> Ordering {
    for ((x, y), spec) in a.iter().zip(b).zip(specs) {
        let ord = match spec.direction {
            Direction::Asc => x.cmp_total(y),
            Direction::Desc => y.cmp_total(x),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use relstate_codec::record;
    use std::collections::HashMap;

    fn table() -> (Vec<Row>, HashMap<Id, Row>) {
        let rows: Vec<Row> = vec![
            Arc::new(record! { "id" => "0", "name" => "b", "age" => 30 }),
            Arc::new(record! { "id" => "1", "name" => "a", "age" => 30 }),
            Arc::new(record! { "id" => "2", "name" => "c", "age" => 20 }),
        ];
        let by_id = rows
            .iter()
            .map(|r| (Id::from_value(&r["id"]), r.clone()))
            .collect();
        (rows, by_id)
    }

    fn run(clauses: &[Clause], stats: &StoreStats) -> Vec<String> {
        let (rows, by_id) = table();
        evaluate(rows.iter(), |id| by_id.get(id), clauses, "id", stats)
            .iter()
            .map(|r| r["id"].to_string())
            .collect()
    }

    #[test]
    fn no_clauses_returns_table_order() {
        let stats = StoreStats::new();
        assert_eq!(run(&[], &stats), vec!["0", "1", "2"]);
        assert_eq!(stats.full_scans(), 1);
    }

    #[test]
    fn id_filter_is_hoisted_to_a_lookup() {
        let stats = StoreStats::new();
        let clauses = [
            Clause::Filter(Predicate::func(|r| r.get("age") == Some(&Value::Integer(20)))),
            Clause::Filter(Predicate::Equals(record! { "id" => 2 })),
        ];
        assert_eq!(run(&clauses, &stats), vec!["2"]);
        assert_eq!(stats.id_lookups(), 1);
        assert_eq!(stats.full_scans(), 0);
    }

    #[test]
    fn extra_keys_in_id_filter_still_apply() {
        let stats = StoreStats::new();
        let clauses = [Clause::Filter(Predicate::Equals(
            record! { "id" => "2", "name" => "zzz" },
        ))];
        assert!(run(&clauses, &stats).is_empty());
    }

    #[test]
    fn id_set_keeps_list_order_and_skips_missing() {
        let stats = StoreStats::new();
        let clauses = [Clause::Filter(Predicate::Ids(vec![
            Id::new("2"),
            Id::new("9"),
            Id::new("0"),
        ]))];
        assert_eq!(run(&clauses, &stats), vec!["2", "0"]);
    }

    #[test]
    fn exclude_and_multi_key_sort() {
        let stats = StoreStats::new();
        let clauses = [
            Clause::OrderBy(vec![SortSpec::desc("age"), SortSpec::asc("name")]),
            Clause::Exclude(Predicate::Equals(record! { "name" => "c" })),
        ];
        assert_eq!(run(&clauses, &stats), vec!["1", "0"]);
    }

    #[test]
    fn sort_is_stable() {
        let stats = StoreStats::new();
        let clauses = [Clause::OrderBy(vec![SortSpec::asc("age")])];
        assert_eq!(run(&clauses, &stats), vec!["2", "0", "1"]);
    }

    #[test]
    fn missing_attribute_reads_as_null() {
        let row = record! { "id" => "1" };
        assert!(Predicate::Equals(record! { "author" => () }).matches(&row, "id"));
    }

    #[test]
    fn ranks() {
        assert_eq!(Clause::Filter(Predicate::Equals(record! { "id" => 1 })).rank("id"), 1);
        assert_eq!(Clause::Filter(Predicate::Equals(record! { "x" => 1 })).rank("id"), 2);
        assert_eq!(Clause::Exclude(Predicate::Equals(record! { "id" => 1 })).rank("id"), 2);
        assert_eq!(Clause::OrderBy(vec![]).rank("id"), 3);
    }
}
