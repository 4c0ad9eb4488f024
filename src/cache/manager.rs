//! Query cache for the todo client.
//!
//! Two kinds of entries live here: one paginated list entry and one
//! snapshot entry per todo id. Each entry tracks freshness (fetch time
//! plus an explicit stale flag) and a read generation used to discard
//! background refreshes that a mutation superseded.
//!
//! The cache itself never fetches anything. Reads are pure, refreshes are
//! pull-based: the client checks `*_needs_refresh` on its read path and
//! runs the fetch, and the generation bookkeeping here decides whether a
//! result that comes back is still welcome.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::Todo;

use super::pages::TodoPages;

/// Cache entries count as stale five minutes after they were fetched,
/// even without an explicit invalidation.
const ENTRY_FRESH_SECS: i64 = 300;

/// A cached value with its fetch timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    /// A value inheriting an existing timestamp, used when seeding one
    /// entry from another.
    pub fn with_timestamp(data: T, cached_at: DateTime<Utc>) -> Self {
        Self { data, cached_at }
    }

    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.cached_at).num_seconds()
    }

    pub fn age_display(&self) -> String {
        let seconds = self.age_seconds();
        if seconds < 60 {
            // Covers clock skew too.
            "just now".to_string()
        } else if seconds < 3600 {
            format!("{}m ago", seconds / 60)
        } else {
            format!("{}h ago", seconds / 3600)
        }
    }

    pub fn is_expired(&self) -> bool {
        self.age_seconds() > ENTRY_FRESH_SECS
    }
}

/// Fetch state of one cache entry, polled by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStatus {
    pub fetching: bool,
    pub error: Option<String>,
}

/// One cache entry plus its bookkeeping.
#[derive(Debug)]
struct Slot<T> {
    entry: Option<CachedData<T>>,
    stale: bool,
    fetching: bool,
    generation: u64,
    error: Option<String>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            entry: None,
            stale: false,
            fetching: false,
            generation: 0,
            error: None,
        }
    }
}

impl<T: Clone> Slot<T> {
    fn read(&self) -> Option<&CachedData<T>> {
        self.entry.as_ref()
    }

    /// Replace the entry wholesale with a freshly-stamped value.
    fn write(&mut self, data: T) {
        self.entry = Some(CachedData::new(data));
        self.stale = false;
        self.error = None;
    }

    fn snapshot(&self) -> Option<CachedData<T>> {
        self.entry.clone()
    }

    /// Put a snapshot back verbatim, absence included.
    fn restore(&mut self, snapshot: Option<CachedData<T>>) {
        self.entry = snapshot;
    }

    /// Mark the entry stale so the next read refreshes it. A missing
    /// entry needs no flag; clearing the error lets a previously failed
    /// read be retried.
    fn invalidate(&mut self) {
        self.error = None;
        if self.entry.is_some() {
            self.stale = true;
        }
    }

    /// Supersede any in-flight read so its result is discarded on
    /// arrival. Runs synchronously, before the caller snapshots or
    /// writes.
    fn cancel_pending_reads(&mut self) {
        self.generation += 1;
        self.fetching = false;
    }

    fn begin_fetch(&mut self) -> u64 {
        self.fetching = true;
        self.generation
    }

    /// Accept a fetch result if no cancellation happened since the fetch
    /// began.
    fn complete_fetch(&mut self, generation: u64, data: T) -> bool {
        if generation != self.generation {
            return false;
        }
        self.fetching = false;
        self.write(data);
        true
    }

    fn fail_fetch(&mut self, generation: u64, error: String) -> bool {
        if generation != self.generation {
            return false;
        }
        self.fetching = false;
        self.error = Some(error);
        true
    }

    /// Whether the read path should start a background fetch. A slot
    /// holding a fetch error waits for an explicit invalidation before
    /// refetching, so a dead backend is not hammered on every read.
    fn needs_refresh(&self) -> bool {
        if self.fetching || self.error.is_some() {
            return false;
        }
        match &self.entry {
            None => true,
            Some(cached) => self.stale || cached.is_expired(),
        }
    }

    fn status(&self) -> QueryStatus {
        QueryStatus {
            fetching: self.fetching,
            error: self.error.clone(),
        }
    }
}

/// The client's query cache: one list entry, one entry per todo id.
///
/// Only the client writes here; the presentation layer sees values
/// through the client's read accessors.
#[derive(Debug, Default)]
pub struct QueryCache {
    list: Slot<TodoPages>,
    todos: HashMap<String, Slot<Todo>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== List entry =====

    pub fn list(&self) -> Option<&CachedData<TodoPages>> {
        self.list.read()
    }

    pub fn write_list(&mut self, pages: TodoPages) {
        self.list.write(pages);
    }

    pub fn snapshot_list(&self) -> Option<CachedData<TodoPages>> {
        self.list.snapshot()
    }

    pub fn restore_list(&mut self, snapshot: Option<CachedData<TodoPages>>) {
        self.list.restore(snapshot);
    }

    pub fn invalidate_list(&mut self) {
        self.list.invalidate();
    }

    pub fn cancel_list_reads(&mut self) {
        self.list.cancel_pending_reads();
    }

    pub fn list_needs_refresh(&self) -> bool {
        self.list.needs_refresh()
    }

    pub fn list_fetching(&self) -> bool {
        self.list.fetching
    }

    pub fn begin_list_fetch(&mut self) -> u64 {
        self.list.begin_fetch()
    }

    pub fn complete_list_fetch(&mut self, generation: u64, pages: TodoPages) -> bool {
        self.list.complete_fetch(generation, pages)
    }

    pub fn fail_list_fetch(&mut self, generation: u64, error: String) -> bool {
        self.list.fail_fetch(generation, error)
    }

    /// Append a continuation page fetched for the current generation.
    pub fn append_list_page(&mut self, generation: u64, page: crate::models::TodoPage) -> bool {
        if generation != self.list.generation {
            return false;
        }
        self.list.fetching = false;
        let mut pages = self
            .list
            .read()
            .map(|c| c.data.clone())
            .unwrap_or_default();
        pages.pages.push(page);
        self.list.write(pages);
        true
    }

    pub fn list_status(&self) -> QueryStatus {
        self.list.status()
    }

    // ===== Per-todo entries =====

    pub fn todo(&self, id: &str) -> Option<&CachedData<Todo>> {
        self.todos.get(id).and_then(|slot| slot.read())
    }

    pub fn write_todo(&mut self, id: &str, todo: Todo) {
        self.todos.entry(id.to_string()).or_default().write(todo);
    }

    /// Seed a todo entry from another cache entry (typically the list),
    /// keeping that entry's timestamp. Does nothing if the slot already
    /// holds a value.
    pub fn seed_todo(&mut self, id: &str, todo: Todo, cached_at: DateTime<Utc>) {
        let slot = self.todos.entry(id.to_string()).or_default();
        if slot.entry.is_none() {
            slot.entry = Some(CachedData::with_timestamp(todo, cached_at));
        }
    }

    pub fn snapshot_todo(&self, id: &str) -> Option<CachedData<Todo>> {
        self.todos.get(id).and_then(|slot| slot.snapshot())
    }

    pub fn restore_todo(&mut self, id: &str, snapshot: Option<CachedData<Todo>>) {
        self.todos
            .entry(id.to_string())
            .or_default()
            .restore(snapshot);
    }

    /// Drop a todo's cached value (the optimistic projection of delete).
    /// The slot itself stays, keeping its generation.
    pub fn remove_todo(&mut self, id: &str) {
        if let Some(slot) = self.todos.get_mut(id) {
            slot.entry = None;
        }
    }

    pub fn invalidate_todo(&mut self, id: &str) {
        if let Some(slot) = self.todos.get_mut(id) {
            slot.invalidate();
        }
    }

    pub fn cancel_todo_reads(&mut self, id: &str) {
        if let Some(slot) = self.todos.get_mut(id) {
            slot.cancel_pending_reads();
        }
    }

    pub fn todo_needs_refresh(&self, id: &str) -> bool {
        self.todos
            .get(id)
            .map(|slot| slot.needs_refresh())
            .unwrap_or(true)
    }

    pub fn begin_todo_fetch(&mut self, id: &str) -> u64 {
        self.todos.entry(id.to_string()).or_default().begin_fetch()
    }

    pub fn complete_todo_fetch(&mut self, id: &str, generation: u64, todo: Todo) -> bool {
        self.todos
            .entry(id.to_string())
            .or_default()
            .complete_fetch(generation, todo)
    }

    pub fn fail_todo_fetch(&mut self, id: &str, generation: u64, error: String) -> bool {
        self.todos
            .entry(id.to_string())
            .or_default()
            .fail_fetch(generation, error)
    }

    pub fn todo_status(&self, id: &str) -> QueryStatus {
        self.todos
            .get(id)
            .map(|slot| slot.status())
            .unwrap_or_default()
    }

    /// Any background read in flight, for either kind of entry.
    pub fn any_fetching(&self) -> bool {
        self.list.fetching || self.todos.values().any(|slot| slot.fetching)
    }
}

// ============================================================================
// Tests
// ============================================================================
