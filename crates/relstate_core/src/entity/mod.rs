//! Entity layer: model handles, instances and relation bookkeeping.
//!
//! Everything here goes through a [`Session`](crate::Session). Incoming
//! relation values are normalized to ids before they reach the store.
//! Deletes walk reverse relations before anything is removed.

pub(crate) mod cascade;
mod handle;
mod id;
mod instance;
pub(crate) mod many;
mod props;

pub use cascade::DeleteOutcome;
pub use handle::ModelHandle;
pub use id::Id;
pub use instance::{FieldValue, Instance};
pub use many::{diff, EdgeDiff};
pub use props::{EntityRef, PropValue, Props, RelatedValue};
