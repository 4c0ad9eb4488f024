//! In-memory todo backend simulating a remote API.
//!
//! Holds the authoritative ordered collection of todos behind an async
//! interface with artificial latency, so the client's optimistic caching
//! behaves the same way it would against a real network service.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{NewTodo, Todo, TodoPage};

use super::StoreError;

// ============================================================================
// Constants
// ============================================================================

/// Simulated latency for read operations (list, get).
const READ_LATENCY_MS: u64 = 300;

/// Simulated latency for write operations (create, update, delete, toggle).
const WRITE_LATENCY_MS: u64 = 500;

/// The backend operations, used to target fault injection and to name
/// the failing call in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Get,
    Create,
    Update,
    Delete,
    Toggle,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::List => "list",
            StoreOp::Get => "get",
            StoreOp::Create => "create",
            StoreOp::Update => "update",
            StoreOp::Delete => "delete",
            StoreOp::Toggle => "toggle",
        };
        write!(f, "{}", name)
    }
}

/// In-memory mock backend.
///
/// Ordering is insertion order with creates prepended, so the newest todo
/// is always first. Ids are assigned from a monotonic counter and rendered
/// as decimal strings.
pub struct TodoStore {
    todos: Mutex<Vec<Todo>>,
    next_id: AtomicU64,
    /// Per-operation counters of pending injected failures.
    faults: Mutex<HashMap<StoreOp, u32>>,
    read_latency: Duration,
    write_latency: Duration,
    fail_rate: f64,
}

impl TodoStore {
    /// Create an empty store with default latencies and no random failures.
    pub fn new() -> Self {
        Self::with_todos(Vec::new())
    }

    /// Create a store seeded with the given todos.
    ///
    /// The id counter resumes after the highest numeric seed id, so
    /// store-assigned ids never collide with seeded ones.
    pub fn with_todos(todos: Vec<Todo>) -> Self {
        let next_id = todos
            .iter()
            .filter_map(|t| t.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;

        Self {
            todos: Mutex::new(todos),
            next_id: AtomicU64::new(next_id),
            faults: Mutex::new(HashMap::new()),
            read_latency: Duration::from_millis(READ_LATENCY_MS),
            write_latency: Duration::from_millis(WRITE_LATENCY_MS),
            fail_rate: 0.0,
        }
    }

    /// Override the simulated latencies.
    pub fn with_latency(mut self, read: Duration, write: Duration) -> Self {
        self.read_latency = read;
        self.write_latency = write;
        self
    }

    /// Make every operation fail with a transient error at the given
    /// probability. Clamped to [0, 1].
    pub fn with_fail_rate(mut self, rate: f64) -> Self {
        self.fail_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Make the next call of `op` fail with a transient error.
    pub async fn fail_next(&self, op: StoreOp) {
        self.fail_next_n(op, 1).await;
    }

    /// Make the next `count` calls of `op` fail with transient errors.
    pub async fn fail_next_n(&self, op: StoreOp, count: u32) {
        let mut faults = self.faults.lock().await;
        *faults.entry(op).or_insert(0) += count;
    }

    /// Current store contents, for assertions and diagnostics.
    pub async fn snapshot(&self) -> Vec<Todo> {
        self.todos.lock().await.clone()
    }

    async fn check_faults(&self, op: StoreOp) -> Result<(), StoreError> {
        {
            let mut faults = self.faults.lock().await;
            if let Some(count) = faults.get_mut(&op) {
                if *count > 0 {
                    *count -= 1;
                    debug!(%op, "injected transient failure");
                    return Err(StoreError::Transient(format!(
                        "injected failure during {}",
                        op
                    )));
                }
            }
        }

        if self.fail_rate > 0.0 && rand::thread_rng().gen_bool(self.fail_rate) {
            debug!(%op, "random transient failure");
            return Err(StoreError::Transient(format!(
                "simulated network failure during {}",
                op
            )));
        }

        Ok(())
    }

    /// Read one page of todos. Never reports NotFound; a page index past
    /// the end yields an empty page.
    pub async fn list_todos(&self, page: u64, page_size: usize) -> Result<TodoPage, StoreError> {
        tokio::time::sleep(self.read_latency).await;
        self.check_faults(StoreOp::List).await?;

        let todos = self.todos.lock().await;
        let start = (page as usize).saturating_mul(page_size);
        let end = start + page_size;
        let items: Vec<Todo> = todos.iter().skip(start).take(page_size).cloned().collect();
        let next_page = if todos.len() > end { Some(page + 1) } else { None };

        debug!(page, returned = items.len(), total = todos.len(), "listed todos");
        Ok(TodoPage {
            todos: items,
            total_count: todos.len(),
            next_page,
        })
    }

    /// Fetch a single todo by id.
    pub async fn get_todo(&self, id: &str) -> Result<Todo, StoreError> {
        tokio::time::sleep(self.read_latency).await;
        self.check_faults(StoreOp::Get).await?;

        let todos = self.todos.lock().await;
        todos
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    /// Create a todo. Assigns the id, starts it not completed, and
    /// prepends it so the newest todo lists first.
    pub async fn create_todo(&self, new: NewTodo) -> Result<Todo, StoreError> {
        tokio::time::sleep(self.write_latency).await;
        self.check_faults(StoreOp::Create).await?;

        let todo = Todo {
            id: self.next_id.fetch_add(1, Ordering::Relaxed).to_string(),
            title: new.title,
            completed: false,
        };

        let mut todos = self.todos.lock().await;
        todos.insert(0, todo.clone());
        debug!(id = %todo.id, "created todo");
        Ok(todo)
    }

    /// Replace a todo wholesale, matched by id.
    pub async fn update_todo(&self, updated: Todo) -> Result<Todo, StoreError> {
        tokio::time::sleep(self.write_latency).await;
        self.check_faults(StoreOp::Update).await?;

        let mut todos = self.todos.lock().await;
        match todos.iter_mut().find(|t| t.id == updated.id) {
            Some(existing) => {
                *existing = updated.clone();
                debug!(id = %updated.id, "updated todo");
                Ok(updated)
            }
            None => Err(StoreError::NotFound { id: updated.id }),
        }
    }

    /// Delete a todo by id, returning the deleted id.
    pub async fn delete_todo(&self, id: &str) -> Result<String, StoreError> {
        tokio::time::sleep(self.write_latency).await;
        self.check_faults(StoreOp::Delete).await?;

        let mut todos = self.todos.lock().await;
        match todos.iter().position(|t| t.id == id) {
            Some(index) => {
                todos.remove(index);
                debug!(id, "deleted todo");
                Ok(id.to_string())
            }
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    /// Flip a todo's completion flag.
    pub async fn toggle_todo(&self, id: &str) -> Result<Todo, StoreError> {
        tokio::time::sleep(self.read_latency).await;
        self.check_faults(StoreOp::Toggle).await?;

        let mut todos = self.todos.lock().await;
        match todos.iter_mut().find(|t| t.id == id) {
            Some(todo) => {
                todo.completed = !todo.completed;
                debug!(id, completed = todo.completed, "toggled todo");
                Ok(todo.clone())
            }
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }
}

impl Default for TodoStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
