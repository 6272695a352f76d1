//! Sessions and write batches.
//!
//! A [`Session`] owns the current snapshot. Each write runs in a [`Batch`]
//! that starts from that snapshot and hands back the next one.

mod batch;
mod session;

pub use batch::{Batch, MutationMode};
pub use session::{AccessLog, AccessRecord, Session};
