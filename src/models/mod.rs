//! Data models for todo items.
//!
//! This module contains the data structures shared by the mock store,
//! the query cache, and the client:
//!
//! - `Todo`: a single todo item
//! - `NewTodo`: create request payload
//! - `TodoPage`: one page of a paginated list read

pub mod todo;

pub use todo::{NewTodo, Todo, TodoPage};
