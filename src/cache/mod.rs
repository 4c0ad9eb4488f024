//! Client-side query cache module.
//!
//! This module provides the `QueryCache` holding the paginated list entry
//! and the per-todo snapshot entries, plus the `TodoPages` value type and
//! its optimistic projections.
//!
//! Entries are considered stale after an explicit invalidation or five
//! minutes after fetch, and are refreshed pull-based by the client's read
//! path rather than by timers.

pub mod manager;
pub mod pages;

pub use manager::{CachedData, QueryCache, QueryStatus};
pub use pages::TodoPages;
