//! Mock todo backend module.
//!
//! This module provides the `TodoStore`, an in-memory stand-in for a
//! remote todo service. Every operation is async, runs behind simulated
//! network latency, and can be made to fail: deterministically through
//! `fail_next`, or probabilistically through a configured failure rate.
//!
//! The store is the single authoritative copy of the data; the client's
//! cache only ever holds clones of it.

pub mod error;
pub mod memory;

pub use error::StoreError;
pub use memory::{StoreOp, TodoStore};
