//! todocache - optimistic-update caching client for a mock todo backend.
//!
//! The crate demonstrates the optimistic-mutation caching pattern: a
//! query cache holding a paginated list entry and per-item entries, and a
//! client that applies each mutation's expected effect to the cache
//! before the backend confirms it. On failure the touched entries are
//! rolled back to a pre-mutation snapshot; in every case they are marked
//! stale afterwards so the next read reconciles the cache with the
//! backend's authoritative state.
//!
//! - [`store`]: the in-memory mock backend with simulated latency and
//!   fault injection
//! - [`cache`]: the query cache, stale tracking, and read generations
//! - [`client`]: the presentation-facing client and mutation coordinator
//! - [`models`]: shared data types
//! - [`config`]: demo configuration

pub mod cache;
pub mod client;
pub mod config;
pub mod models;
pub mod store;

pub use client::{is_temp_id, ClientEvent, MutationOp, TodoClient, ValidationError};
pub use models::{NewTodo, Todo, TodoPage};
pub use store::{StoreError, StoreOp, TodoStore};
