//! Property-based test generators using proptest.
//!
//! Operations refer to existing rows by index rather than by id, so every
//! generated sequence is meaningful whatever rows earlier steps left behind.

use proptest::prelude::*;

/// One write against a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOp {
    /// Create a row, with an explicit id or a sequenced one.
    Create {
        /// Supplied id.
        id: Option<String>,
    },
    /// Update the row at `index` (modulo the live row count).
    Update {
        /// Row selector.
        index: usize,
        /// New value for the `value` attribute.
        value: i64,
    },
    /// Delete the row at `index` (modulo the live row count).
    Delete {
        /// Row selector.
        index: usize,
    },
}

/// One edge edit between a team and a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOp {
    /// Link team and user through the forward accessor.
    Add {
        /// Team index.
        team: usize,
        /// User index.
        user: usize,
    },
    /// Unlink team and user through the forward accessor.
    Remove {
        /// Team index.
        team: usize,
        /// User index.
        user: usize,
    },
    /// Unlink the user from every team through the backward accessor.
    ClearUser {
        /// User index.
        user: usize,
    },
}

/// Strategy for supplied ids: small numbers, numeric strings and words.
pub fn supplied_id_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..50).prop_map(|n| n.to_string()),
        prop::string::string_regex("[a-z]{1,6}").expect("Invalid regex"),
    ]
}

/// Strategy for single-table writes.
pub fn row_op_strategy() -> impl Strategy<Value = RowOp> {
    prop_oneof![
        3 => Just(RowOp::Create { id: None }),
        2 => supplied_id_strategy().prop_map(|id| RowOp::Create { id: Some(id) }),
        2 => (any::<usize>(), -1000i64..1000).prop_map(|(index, value)| RowOp::Update { index, value }),
        2 => any::<usize>().prop_map(|index| RowOp::Delete { index }),
    ]
}

/// Strategy for a sequence of single-table writes.
pub fn row_ops_strategy(min_ops: usize, max_ops: usize) -> impl Strategy<Value = Vec<RowOp>> {
    prop::collection::vec(row_op_strategy(), min_ops..max_ops)
}

/// Strategy for edge edits among `teams` teams and `users` users.
pub fn edge_op_strategy(teams: usize, users: usize) -> impl Strategy<Value = EdgeOp> {
    prop_oneof![
        4 => (0..teams, 0..users).prop_map(|(team, user)| EdgeOp::Add { team, user }),
        3 => (0..teams, 0..users).prop_map(|(team, user)| EdgeOp::Remove { team, user }),
        1 => (0..users).prop_map(|user| EdgeOp::ClearUser { user }),
    ]
}

/// Strategy for a sequence of edge edits.
pub fn edge_ops_strategy(
    teams: usize,
    users: usize,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<EdgeOp>> {
    prop::collection::vec(edge_op_strategy(teams, users), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
