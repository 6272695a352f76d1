//! Sessions.

use crate::config::Config;
use crate::entity::{Id, ModelHandle};
use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use crate::stats::StoreStats;
use crate::store::{QuerySpec, Store, UpdatePayload, UpdateSpec, UpdateStatus};
use crate::table::{Row, Snapshot};
use crate::transaction::{Batch, MutationMode};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Which parts of one table a session has read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRecord {
    /// Ids read through id-pinned queries.
    pub ids: BTreeSet<Id>,
    /// Whether some query read the table without an id pin.
    pub full_table_scanned: bool,
}

/// Per-model access records.
pub type AccessLog = BTreeMap<String, AccessRecord>;

#[derive(Debug)]
struct SessionState {
    snapshot: Snapshot,
    accessed: AccessLog,
    written: BTreeSet<String>,
}

/// A working view over one database state.
///
/// A session is created from a snapshot, reads and writes through
/// [`ModelHandle`]s, and exposes the resulting snapshot through
/// [`Session::snapshot`]. Every write replaces the session's snapshot with
/// a new one; snapshots handed out earlier never change.
///
/// Model handles and instances borrow the session, so they cannot outlive
/// it or be used with another session.
///
/// # Example
///
/// ```rust,ignore
/// let session = orm.session(None)?;
/// let author = session.model("Author")?.create(props! { "name" => "Herbert" })?;
/// session.model("Book")?.create(props! { "title" => "Dune", "author" => &author })?;
///
/// let next_state = session.snapshot();
/// ```
pub struct Session {
    store: Arc<Store>,
    mode: MutationMode,
    state: RwLock<SessionState>,
}

impl Session {
    pub(crate) fn new(store: Arc<Store>, snapshot: Snapshot, mode: MutationMode) -> Self {
        let snapshot = store.normalize(snapshot);
        debug!(?mode, "opened session");
        Self {
            store,
            mode,
            state: RwLock::new(SessionState {
                snapshot,
                accessed: AccessLog::new(),
                written: BTreeSet::new(),
            }),
        }
    }

    /// The current database state.
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().snapshot.clone()
    }

    /// How this session's writes treat structure.
    pub fn mode(&self) -> MutationMode {
        self.mode
    }

    /// The schema.
    pub fn schema(&self) -> &Arc<Schema> {
        self.store.schema()
    }

    /// The store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Configuration.
    pub fn config(&self) -> &Config {
        self.store.config()
    }

    /// Store statistics.
    pub fn stats(&self) -> &StoreStats {
        self.store.stats()
    }

    /// Returns the handle for `name`.
    ///
    /// # Errors
    ///
    /// Returns `ModelNotFound` if the model is not in the schema.
    pub fn model(&self, name: &str) -> CoreResult<ModelHandle<'_>> {
        let schema = self.schema().model(name)?;
        Ok(ModelHandle::new(self, schema.clone()))
    }

    /// Handles for every model in the schema.
    pub fn models(&self) -> impl Iterator<Item = ModelHandle<'_>> + '_ {
        self.schema()
            .models()
            .map(move |schema| ModelHandle::new(self, schema.clone()))
    }

    /// Evaluates a query against the current state, recording what it read.
    pub fn query(&self, spec: &QuerySpec) -> CoreResult<Vec<Row>> {
        let snapshot = self.snapshot();
        let rows = self.store.query(spec, &snapshot)?;
        if self.config().track_access {
            self.record_access(spec);
        }
        Ok(rows)
    }

    fn record_access(&self, spec: &QuerySpec) {
        let id_attribute = self.store.table(&spec.table).map(|t| t.id_attribute().to_string());
        let Ok(id_attribute) = id_attribute else {
            return;
        };
        let pinned: Vec<Id> = spec
            .clauses
            .iter()
            .filter_map(|clause| clause.pinned_ids(&id_attribute))
            .flatten()
            .collect();

        let mut state = self.state.write();
        let record = state.accessed.entry(spec.table.clone()).or_default();
        if pinned.is_empty() {
            record.full_table_scanned = true;
        } else {
            record.ids.extend(pinned);
        }
    }

    /// Applies one update.
    ///
    /// # Errors
    ///
    /// Returns `UpdateFailed` if the store rejects the update, or any error
    /// the store raises while applying it. In [`MutationMode::CopyOnWrite`]
    /// the session state is then unchanged. In [`MutationMode::InPlace`]
    /// whatever the update wrote before failing is kept, as for
    /// [`Session::apply_updates`].
    pub fn apply_update(&self, spec: UpdateSpec) -> CoreResult<UpdatePayload> {
        let mut payloads = self.apply_updates(vec![spec])?;
        payloads
            .pop()
            .ok_or_else(|| CoreError::invalid_operation("update produced no payload"))
    }

    /// Applies several updates as one batch.
    ///
    /// Later updates see the effects of earlier ones. In
    /// [`MutationMode::CopyOnWrite`] the session state changes only if every
    /// update succeeds. In [`MutationMode::InPlace`] updates applied before a
    /// failure are kept.
    pub fn apply_updates(&self, specs: Vec<UpdateSpec>) -> CoreResult<Vec<UpdatePayload>> {
        if specs.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = match self.mode {
            MutationMode::CopyOnWrite => Batch::new(self.snapshot(), self.mode),
            MutationMode::InPlace => {
                let taken = std::mem::take(&mut self.state.write().snapshot);
                Batch::new(taken, self.mode)
            }
        };

        let mut payloads = Vec::with_capacity(specs.len());
        let mut failure = None;
        for spec in &specs {
            match self.store.update(spec, &mut batch) {
                Ok(result) if result.status == UpdateStatus::Success => payloads.push(result.payload),
                Ok(result) => {
                    failure = Some(CoreError::UpdateFailed {
                        status: result.status.to_string(),
                        payload: result.payload.to_string(),
                    });
                    break;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let commit = failure.is_none() || self.mode == MutationMode::InPlace;
        if commit {
            let touched = batch.touched().clone();
            let mut state = self.state.write();
            state.snapshot = batch.finish();
            state.written.extend(touched);
            drop(state);
            self.store.stats().record_batch();
        }
        debug!(updates = specs.len(), committed = commit, "applied batch");

        match failure {
            Some(e) => Err(e),
            None => Ok(payloads),
        }
    }

    /// What this session has read so far.
    pub fn accessed(&self) -> AccessLog {
        self.state.read().accessed.clone()
    }

    /// Models this session has written.
    pub fn written(&self) -> BTreeSet<String> {
        self.state.read().written.clone()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
