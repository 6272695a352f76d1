//! Memoized selectors.
//!
//! A selector derives a value from a snapshot. [`MemoizedSelector`] keeps
//! the last result together with what the body read, and runs the body
//! again only when the arguments change or something it read changed.

use crate::error::CoreResult;
use crate::schema::Orm;
use crate::table::Snapshot;
use crate::transaction::{AccessLog, Session};
use std::fmt;
use tracing::trace;

/// Selector body.
pub type SelectorFn<A, R> = Box<dyn Fn(&Session, &A) -> CoreResult<R> + Send + Sync>;

struct Memo<A, R> {
    args: A,
    result: R,
    snapshot: Snapshot,
    accessed: AccessLog,
}

/// Caches a derived value across snapshots.
///
/// The cached result is reused while the arguments are equal and, for
/// every model the previous run read:
///
/// - if it scanned the whole table, the table is pointer-identical;
/// - otherwise every row it looked up by id is pointer-identical (or still absent).
///
/// Access tracking must be enabled in the registrar's config; without it
/// the body runs on every call.
///
/// # Example
///
/// ```rust,ignore
/// let mut books_by = MemoizedSelector::new(|session, author: &String| {
///     session.model("Book")?.filter(props! { "author" => author.as_str() }).count()
/// });
///
/// let n = books_by.select(&orm, &state, "1".to_string())?;
/// ```
pub struct MemoizedSelector<A, R> {
    body: SelectorFn<A, R>,
    memo: Option<Memo<A, R>>,
    invocations: u64,
}

impl<A, R> MemoizedSelector<A, R>
where
    A: Clone + PartialEq,
    R: Clone,
{
    /// Wraps a selector body.
    pub fn new(body: impl Fn(&Session, &A) -> CoreResult<R> + Send + Sync + 'static) -> Self {
        Self {
            body: Box::new(body),
            memo: None,
            invocations: 0,
        }
    }

    /// Number of times the body has run.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Returns the derived value for `snapshot` and `args`.
    pub fn select(&mut self, orm: &Orm, snapshot: &Snapshot, args: A) -> CoreResult<R> {
        if let Some(memo) = &self.memo {
            if orm.config().track_access && memo.args == args && !is_stale(memo, snapshot) {
                trace!("selector cache hit");
                return Ok(memo.result.clone());
            }
        }

        let session = orm.session(Some(snapshot.clone()))?;
        let result = (self.body)(&session, &args)?;
        self.invocations += 1;
        self.memo = Some(Memo {
            args,
            result: result.clone(),
            snapshot: snapshot.clone(),
            accessed: session.accessed(),
        });
        Ok(result)
    }

    /// Drops the cached result.
    pub fn reset(&mut self) {
        self.memo = None;
    }
}

fn is_stale<A, R>(memo: &Memo<A, R>, snapshot: &Snapshot) -> bool {
    if memo.snapshot.ptr_eq(snapshot) {
        return false;
    }
    memo.accessed.iter().any(|(model, record)| {
        if memo.snapshot.table_ptr_eq(snapshot, model) {
            return false;
        }
        if record.full_table_scanned {
            return true;
        }
        match (memo.snapshot.table(model), snapshot.table(model)) {
            (Some(before), Some(after)) => record.ids.iter().any(|id| !before.row_ptr_eq(after, id)),
            _ => true,
        }
    })
}

impl<A: fmt::Debug, R> fmt::Debug for MemoizedSelector<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizedSelector")
            .field("args", &self.memo.as_ref().map(|m| &m.args))
            .field("invocations", &self.invocations)
            .finish_non_exhaustive()
    }
}
