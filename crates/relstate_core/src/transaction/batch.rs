//! Write batches.

use crate::table::{Snapshot, TableState};
use std::collections::BTreeSet;

/// How a batch treats the snapshot it starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationMode {
    /// The batch writes to a copy; the session's snapshot is swapped only
    /// when every update in the batch succeeded.
    #[default]
    CopyOnWrite,
    /// The batch takes the session's snapshot and writes into structure it
    /// holds uniquely. Writes already applied stay applied if a later update
    /// in the batch fails. Structure shared with snapshots held elsewhere is
    /// still copied before it is written.
    InPlace,
}

/// One write scope.
///
/// Within a batch, structure is copied at most once: the first write to a
/// table copies what it shares with the starting snapshot, and later writes
/// to the same table reuse that copy.
#[derive(Debug)]
pub struct Batch {
    snapshot: Snapshot,
    mode: MutationMode,
    touched: BTreeSet<String>,
}

impl Batch {
    /// Starts a batch from `snapshot`.
    pub fn new(snapshot: Snapshot, mode: MutationMode) -> Self {
        Self {
            snapshot,
            mode,
            touched: BTreeSet::new(),
        }
    }

    /// Mutation mode.
    pub fn mode(&self) -> MutationMode {
        self.mode
    }

    /// The batch's current view of the database.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Models written so far.
    pub fn touched(&self) -> &BTreeSet<String> {
        &self.touched
    }

    /// Mutable access to a table, copying shared structure on first write.
    pub(crate) fn table_mut(&mut self, model: &str) -> &mut TableState {
        if !self.touched.contains(model) {
            self.touched.insert(model.to_string());
        }
        self.snapshot.table_mut(model)
    }

    /// Ends the batch, yielding the resulting snapshot.
    pub fn finish(self) -> Snapshot {
        self.snapshot
    }
}
