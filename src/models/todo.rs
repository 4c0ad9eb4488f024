//! Domain models for todo items and paginated reads.
//!
//! These are the shapes exchanged between the store, the cache, and the
//! client; the cache always holds independent clones, never references
//! into the store.

use serde::{Deserialize, Serialize};

/// A single todo item.
///
/// Identity is the `id`, assigned by the store at creation and immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

/// Payload for creating a todo. The store assigns the id and starts the
/// item as not completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTodo {
    pub title: String,
}

/// One page of a paginated list read.
///
/// `next_page` is the zero-based index of the following page, absent on
/// the last page. `total_count` is the store's total at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPage {
    pub todos: Vec<Todo>,
    pub total_count: usize,
    pub next_page: Option<u64>,
}
