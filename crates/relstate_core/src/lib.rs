//! # relstate Core
//!
//! Schema-driven, normalized, immutable relational state.
//!
//! This crate provides:
//! - Schema declaration with attributes, foreign keys, one-to-one and
//!   many-to-many relations, resolved into per-model accessor tables
//! - Table state with insertion-ordered ids and an id index, shared
//!   structurally between snapshots
//! - A query planner that turns id-pinned filters into direct lookups
//! - Sessions that write through copy-on-write batches
//! - Lazy query sets, entity handles and instances
//! - Many-to-many edge synchronization and cascade delete
//! - A reducer adapter and memoized selectors for host applications
//!
//! ## Usage
//!
//! ```
//! use relstate_core::{props, ModelDef, Orm};
//!
//! let mut orm = Orm::new();
//! orm.register([
//!     ModelDef::new("Author").attribute("name"),
//!     ModelDef::new("Book")
//!         .attribute("title")
//!         .foreign_key("author", "Author"),
//! ])
//! .unwrap();
//!
//! let session = orm.session(None).unwrap();
//! let author = session.model("Author").unwrap().create(props! { "name" => "Herbert" }).unwrap();
//! session.model("Book").unwrap().create(props! { "title" => "Dune", "author" => &author }).unwrap();
//!
//! assert_eq!(author.related_set("bookSet").unwrap().count().unwrap(), 1);
//! let state = session.snapshot();
//! assert_eq!(state.table("Book").unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod stats;

pub mod entity;
pub mod query;
pub mod reducer;
pub mod schema;
pub mod script;
pub mod selector;
pub mod store;
pub mod table;
pub mod transaction;

pub use config::Config;
pub use entity::{
    diff, DeleteOutcome, EdgeDiff, EntityRef, FieldValue, Id, Instance, ModelHandle, PropValue,
    Props, RelatedValue,
};
pub use error::{CoreError, CoreResult};
pub use query::QuerySet;
pub use reducer::{reduce, Action, ReducerFn};
pub use schema::{
    Accessor, Attribute, Descriptor, DescriptorRegistry, FieldDocument, ForeignKey, ManyToMany,
    ManyToManyPath, ModelDef, ModelDocument, ModelSchema, OneToOne, Orm, ReverseRelation, Schema,
    SchemaDocument, ThroughFields,
};
pub use script::{apply_step, parse_script, replay, ScriptStep, StepOutcome};
pub use selector::{MemoizedSelector, SelectorFn};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{QuerySpec, Store, UpdateAction, UpdatePayload, UpdateResult, UpdateSpec, UpdateStatus};
pub use table::{
    id_sequencer, Clause, Direction, Predicate, Row, Snapshot, SortKey, SortSpec, Table,
    TableMeta, TableState,
};
pub use transaction::{AccessLog, AccessRecord, Batch, MutationMode, Session};

pub use relstate_codec::{record, Record, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
