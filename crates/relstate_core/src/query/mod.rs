//! Lazy query sets over session-bound models.

mod queryset;

pub use queryset::QuerySet;
