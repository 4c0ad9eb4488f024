//! The todo client: cache reads, optimistic mutations, reconciliation.
//!
//! `TodoClient` owns the query cache and coordinates every mutation
//! end-to-end. A submission applies the mutation's expected effect to the
//! cache immediately, dispatches the store call on a background task, and
//! settles when the result comes back over the channel: rollback to the
//! pre-mutation snapshot on failure, transient-state cleanup on success,
//! and an unconditional invalidation either way so the next read
//! reconciles the cache with the store.
//!
//! All client methods are called from one cooperative context; background
//! tasks only touch the store and the channel sender, never the cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::{CachedData, QueryCache, QueryStatus, TodoPages};
use crate::models::{NewTodo, Todo};
use crate::store::{StoreError, TodoStore};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background task result channel.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Default page size for list reads.
const DEFAULT_PAGE_SIZE: usize = 10;

/// Reserved prefix for locally synthesized placeholder ids. The store
/// only assigns decimal ids, so the two namespaces cannot collide.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Whether an id is a local placeholder from an unsettled create.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

// ============================================================================
// Public types
// ============================================================================

/// The four mutation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOp {
    Create,
    Update,
    Delete,
    Toggle,
}

impl MutationOp {
    /// User-facing notification text for a failed mutation. Deliberately
    /// names only the operation; the error details go to the log.
    pub fn failure_message(&self) -> &'static str {
        match self {
            MutationOp::Create => "Failed to create todo",
            MutationOp::Update => "Failed to update todo",
            MutationOp::Delete => "Failed to delete todo",
            MutationOp::Toggle => "Failed to update todo status",
        }
    }
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationOp::Create => "create",
            MutationOp::Update => "update",
            MutationOp::Delete => "delete",
            MutationOp::Toggle => "toggle",
        };
        write!(f, "{}", name)
    }
}

/// Rejected before any cache step runs; never enters the mutation state
/// machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("todo title cannot be empty")]
    EmptyTitle,
}

/// Handle identifying one in-flight mutation.
pub type MutationId = u64;

/// What the presentation layer learns from processed background results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    MutationSucceeded(MutationOp),
    MutationFailed(MutationOp),
    ListRefreshed,
    ListRefreshFailed,
    PageLoaded,
    TodoRefreshed(String),
    TodoRefreshFailed(String),
}

// ============================================================================
// Internal types
// ============================================================================

/// What a successful store call produced.
#[derive(Debug)]
enum Settlement {
    Created(Todo),
    Updated(Todo),
    Deleted(String),
    Toggled(Todo),
}

/// Results sent from background tasks back to the client.
///
/// Read results carry the cache generation captured when the fetch began,
/// so results superseded by a mutation's cancellation are discarded.
#[derive(Debug)]
enum TaskResult {
    /// A mutation's store call finished, successfully or not.
    Settled {
        mutation_id: MutationId,
        outcome: Result<Settlement, StoreError>,
    },
    /// A full list refresh finished.
    ListFetched {
        generation: u64,
        result: Result<TodoPages, StoreError>,
    },
    /// A continuation page fetch finished.
    PageFetched {
        generation: u64,
        result: Result<crate::models::TodoPage, StoreError>,
    },
    /// A single-todo fetch finished.
    TodoFetched {
        id: String,
        generation: u64,
        result: Result<Todo, StoreError>,
    },
}

/// Snapshot of the cache entries a mutation touched, taken before its
/// optimistic write and owned by that mutation alone. `None` inside a
/// snapshot records that the entry was absent.
#[derive(Debug)]
struct MutationContext {
    op: MutationOp,
    /// Item id for mutations targeting a single todo.
    target: Option<String>,
    prev_list: Option<CachedData<TodoPages>>,
    /// `Some` when the mutation touched the item entry too.
    prev_todo: Option<Option<CachedData<Todo>>>,
}

/// In-flight mutation counts per operation.
#[derive(Debug, Default)]
struct PendingCounts {
    create: usize,
    update: usize,
    delete: usize,
    toggle: usize,
}

impl PendingCounts {
    fn get(&self, op: MutationOp) -> usize {
        match op {
            MutationOp::Create => self.create,
            MutationOp::Update => self.update,
            MutationOp::Delete => self.delete,
            MutationOp::Toggle => self.toggle,
        }
    }

    fn slot(&mut self, op: MutationOp) -> &mut usize {
        match op {
            MutationOp::Create => &mut self.create,
            MutationOp::Update => &mut self.update,
            MutationOp::Delete => &mut self.delete,
            MutationOp::Toggle => &mut self.toggle,
        }
    }

    fn inc(&mut self, op: MutationOp) {
        *self.slot(op) += 1;
    }

    fn dec(&mut self, op: MutationOp) {
        let slot = self.slot(op);
        *slot = slot.saturating_sub(1);
    }

    fn total(&self) -> usize {
        self.create + self.update + self.delete + self.toggle
    }
}

// ============================================================================
// Client
// ============================================================================

/// Presentation-facing client over the query cache and the mock backend.
pub struct TodoClient {
    store: Arc<TodoStore>,
    cache: QueryCache,
    result_tx: mpsc::Sender<TaskResult>,
    result_rx: mpsc::Receiver<TaskResult>,
    page_size: usize,
    /// Sequence for placeholder ids synthesized by optimistic creates.
    temp_seq: u64,
    next_mutation_id: MutationId,
    contexts: HashMap<MutationId, MutationContext>,
    pending: PendingCounts,
    /// Title being typed into the add form; cleared when a create settles
    /// successfully.
    draft_title: String,
    /// Id shown in the detail view; closed when its update settles
    /// successfully.
    detail_view: Option<String>,
}

impl TodoClient {
    pub fn new(store: Arc<TodoStore>) -> Self {
        Self::with_page_size(store, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(store: Arc<TodoStore>, page_size: usize) -> Self {
        let (result_tx, result_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        Self {
            store,
            cache: QueryCache::new(),
            result_tx,
            result_rx,
            page_size,
            temp_seq: 0,
            next_mutation_id: 1,
            contexts: HashMap::new(),
            pending: PendingCounts::default(),
            draft_title: String::new(),
            detail_view: None,
        }
    }

    // ===== Reads =====

    /// Cached list entry, refreshing it in the background when absent or
    /// stale.
    pub fn list(&mut self) -> Option<&CachedData<TodoPages>> {
        self.refresh_list_if_stale();
        self.cache.list()
    }

    /// Pure list lookup with no refresh side effect.
    pub fn cached_list(&self) -> Option<&CachedData<TodoPages>> {
        self.cache.list()
    }

    /// Flattened todos across all loaded pages.
    pub fn todos(&mut self) -> Vec<Todo> {
        self.list()
            .map(|cached| cached.data.flatten().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total count reported by the backend, 0 before the first load.
    pub fn total_count(&mut self) -> usize {
        self.list().map(|cached| cached.data.total_count()).unwrap_or(0)
    }

    /// Cached todo entry, seeded from the list entry when possible and
    /// refreshed in the background when absent or stale.
    pub fn todo(&mut self, id: &str) -> Option<&CachedData<Todo>> {
        if self.cache.todo(id).is_none() {
            let seeded = self
                .cache
                .list()
                .and_then(|cached| {
                    cached
                        .data
                        .find(id)
                        .map(|todo| (todo.clone(), cached.cached_at))
                });
            if let Some((todo, cached_at)) = seeded {
                debug!(id, "seeding todo entry from list cache");
                self.cache.seed_todo(id, todo, cached_at);
            }
        }
        self.refresh_todo_if_stale(id);
        self.cache.todo(id)
    }

    /// Pure todo lookup with no refresh side effect.
    pub fn cached_todo(&self, id: &str) -> Option<&CachedData<Todo>> {
        self.cache.todo(id)
    }

    /// Warm a todo entry up without reading it.
    pub fn prefetch_todo(&mut self, id: &str) {
        self.todo(id);
    }

    /// Fetch the next unloaded page, if the last loaded page says there
    /// is one and no list read is already in flight.
    pub fn fetch_next_page(&mut self) {
        let next = match self.cache.list() {
            Some(cached) => cached.data.next_page(),
            None => return,
        };
        let Some(next) = next else { return };
        if self.cache.list_fetching() {
            return;
        }

        let generation = self.cache.begin_list_fetch();
        let store = Arc::clone(&self.store);
        let tx = self.result_tx.clone();
        let page_size = self.page_size;

        debug!(page = next, "fetching next page");
        tokio::spawn(async move {
            let result = list_page_with_retry(&store, next, page_size).await;
            let _ = tx.send(TaskResult::PageFetched { generation, result }).await;
        });
    }

    /// Force a list refresh regardless of freshness (pull-to-refresh).
    pub fn refetch_list(&mut self) {
        self.cache.invalidate_list();
        self.refresh_list_if_stale();
    }

    fn refresh_list_if_stale(&mut self) {
        if !self.cache.list_needs_refresh() {
            return;
        }

        // Refetch every page currently loaded, front to back; first load
        // fetches page 0 only.
        let loaded_pages = self
            .cache
            .list()
            .map(|cached| cached.data.pages.len())
            .unwrap_or(0)
            .max(1);
        let generation = self.cache.begin_list_fetch();
        let store = Arc::clone(&self.store);
        let tx = self.result_tx.clone();
        let page_size = self.page_size;

        debug!(loaded_pages, "refreshing list");
        tokio::spawn(async move {
            let result = fetch_list_pages(&store, loaded_pages, page_size).await;
            let _ = tx.send(TaskResult::ListFetched { generation, result }).await;
        });
    }

    fn refresh_todo_if_stale(&mut self, id: &str) {
        if !self.cache.todo_needs_refresh(id) {
            return;
        }

        let generation = self.cache.begin_todo_fetch(id);
        let store = Arc::clone(&self.store);
        let tx = self.result_tx.clone();
        let id = id.to_string();

        debug!(id = %id, "refreshing todo");
        tokio::spawn(async move {
            let result = get_todo_with_retry(&store, &id).await;
            let _ = tx
                .send(TaskResult::TodoFetched { id, generation, result })
                .await;
        });
    }

    // ===== Mutations =====

    /// Create a todo. The list shows a placeholder row immediately; the
    /// placeholder id is replaced by the store-assigned one when the
    /// reconciling refetch lands.
    pub fn submit_create(&mut self, title: &str) -> Result<MutationId, ValidationError> {
        let title = validate_title(title)?;

        self.cache.cancel_list_reads();
        let prev_list = self.cache.snapshot_list();

        self.temp_seq += 1;
        let placeholder = Todo {
            id: format!("{}{}", TEMP_ID_PREFIX, self.temp_seq),
            title: title.clone(),
            completed: false,
        };
        let projected = self
            .cache
            .list()
            .map(|cached| cached.data.prepended(placeholder));
        if let Some(projected) = projected {
            self.cache.write_list(projected);
        }

        let mutation_id = self.begin_mutation(MutationOp::Create, None, prev_list, None);
        let store = Arc::clone(&self.store);
        let tx = self.result_tx.clone();
        let request = NewTodo { title };

        tokio::spawn(async move {
            let outcome = store.create_todo(request).await.map(Settlement::Created);
            let _ = tx.send(TaskResult::Settled { mutation_id, outcome }).await;
        });
        Ok(mutation_id)
    }

    /// Replace a todo wholesale, patching it into the list and the item
    /// entry optimistically.
    pub fn submit_update(&mut self, todo: Todo) -> Result<MutationId, ValidationError> {
        let title = validate_title(&todo.title)?;
        let todo = Todo { title, ..todo };

        self.cache.cancel_list_reads();
        self.cache.cancel_todo_reads(&todo.id);
        let prev_list = self.cache.snapshot_list();
        let prev_todo = self.cache.snapshot_todo(&todo.id);

        let projected = self
            .cache
            .list()
            .map(|cached| cached.data.patched(&todo));
        if let Some(projected) = projected {
            self.cache.write_list(projected);
        }
        self.cache.write_todo(&todo.id, todo.clone());

        let mutation_id = self.begin_mutation(
            MutationOp::Update,
            Some(todo.id.clone()),
            prev_list,
            Some(prev_todo),
        );
        let store = Arc::clone(&self.store);
        let tx = self.result_tx.clone();

        tokio::spawn(async move {
            let outcome = store.update_todo(todo).await.map(Settlement::Updated);
            let _ = tx.send(TaskResult::Settled { mutation_id, outcome }).await;
        });
        Ok(mutation_id)
    }

    /// Delete a todo, removing it from the list and the item entry
    /// optimistically.
    pub fn submit_delete(&mut self, id: &str) -> MutationId {
        self.cache.cancel_list_reads();
        self.cache.cancel_todo_reads(id);
        let prev_list = self.cache.snapshot_list();
        let prev_todo = self.cache.snapshot_todo(id);

        let projected = self.cache.list().map(|cached| cached.data.without(id));
        if let Some(projected) = projected {
            self.cache.write_list(projected);
        }
        self.cache.remove_todo(id);

        let mutation_id = self.begin_mutation(
            MutationOp::Delete,
            Some(id.to_string()),
            prev_list,
            Some(prev_todo),
        );
        let store = Arc::clone(&self.store);
        let tx = self.result_tx.clone();
        let id = id.to_string();

        tokio::spawn(async move {
            let outcome = store.delete_todo(&id).await.map(Settlement::Deleted);
            let _ = tx.send(TaskResult::Settled { mutation_id, outcome }).await;
        });
        mutation_id
    }

    /// Flip a todo's completion flag, optimistically in the list and in
    /// the item entry when one is cached.
    pub fn submit_toggle(&mut self, id: &str) -> MutationId {
        self.cache.cancel_list_reads();
        self.cache.cancel_todo_reads(id);
        let prev_list = self.cache.snapshot_list();
        let prev_todo = self.cache.snapshot_todo(id);

        let projected = self.cache.list().map(|cached| cached.data.toggled(id));
        if let Some(projected) = projected {
            self.cache.write_list(projected);
        }
        if let Some(mut todo) = self.cache.todo(id).map(|cached| cached.data.clone()) {
            todo.completed = !todo.completed;
            self.cache.write_todo(id, todo);
        }

        let mutation_id = self.begin_mutation(
            MutationOp::Toggle,
            Some(id.to_string()),
            prev_list,
            Some(prev_todo),
        );
        let store = Arc::clone(&self.store);
        let tx = self.result_tx.clone();
        let id = id.to_string();

        tokio::spawn(async move {
            let outcome = store.toggle_todo(&id).await.map(Settlement::Toggled);
            let _ = tx.send(TaskResult::Settled { mutation_id, outcome }).await;
        });
        mutation_id
    }

    fn begin_mutation(
        &mut self,
        op: MutationOp,
        target: Option<String>,
        prev_list: Option<CachedData<TodoPages>>,
        prev_todo: Option<Option<CachedData<Todo>>>,
    ) -> MutationId {
        let mutation_id = self.next_mutation_id;
        self.next_mutation_id += 1;
        self.contexts.insert(
            mutation_id,
            MutationContext {
                op,
                target,
                prev_list,
                prev_todo,
            },
        );
        self.pending.inc(op);
        debug!(mutation_id, %op, "mutation dispatched");
        mutation_id
    }

    // ===== Background result pump =====

    /// Drain and process all completed background results without
    /// blocking.
    pub fn poll(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            if let Some(event) = self.process_result(result) {
                events.push(event);
            }
        }
        events
    }

    /// Process background results until no mutation or read is in
    /// flight, returning the events produced along the way.
    pub async fn settle(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while self.has_pending_work() {
            let Some(result) = self.result_rx.recv().await else {
                break;
            };
            if let Some(event) = self.process_result(result) {
                events.push(event);
            }
        }
        events
    }

    fn process_result(&mut self, result: TaskResult) -> Option<ClientEvent> {
        match result {
            TaskResult::Settled { mutation_id, outcome } => self.settle_mutation(mutation_id, outcome),
            TaskResult::ListFetched { generation, result } => match result {
                Ok(pages) => {
                    if self.cache.complete_list_fetch(generation, pages) {
                        debug!("list refreshed");
                        Some(ClientEvent::ListRefreshed)
                    } else {
                        debug!("discarding superseded list refresh");
                        None
                    }
                }
                Err(e) => {
                    if self.cache.fail_list_fetch(generation, e.to_string()) {
                        warn!(error = %e, "list refresh failed");
                        Some(ClientEvent::ListRefreshFailed)
                    } else {
                        None
                    }
                }
            },
            TaskResult::PageFetched { generation, result } => match result {
                Ok(page) => {
                    if self.cache.append_list_page(generation, page) {
                        debug!("page appended");
                        Some(ClientEvent::PageLoaded)
                    } else {
                        debug!("discarding superseded page fetch");
                        None
                    }
                }
                Err(e) => {
                    if self.cache.fail_list_fetch(generation, e.to_string()) {
                        warn!(error = %e, "page fetch failed");
                        Some(ClientEvent::ListRefreshFailed)
                    } else {
                        None
                    }
                }
            },
            TaskResult::TodoFetched { id, generation, result } => match result {
                Ok(todo) => {
                    if self.cache.complete_todo_fetch(&id, generation, todo) {
                        Some(ClientEvent::TodoRefreshed(id))
                    } else {
                        debug!(id = %id, "discarding superseded todo refresh");
                        None
                    }
                }
                Err(e) => {
                    if self.cache.fail_todo_fetch(&id, generation, e.to_string()) {
                        warn!(id = %id, error = %e, "todo refresh failed");
                        Some(ClientEvent::TodoRefreshFailed(id))
                    } else {
                        None
                    }
                }
            },
        }
    }

    fn settle_mutation(
        &mut self,
        mutation_id: MutationId,
        outcome: Result<Settlement, StoreError>,
    ) -> Option<ClientEvent> {
        let Some(context) = self.contexts.remove(&mutation_id) else {
            warn!(mutation_id, "settlement for unknown mutation");
            return None;
        };
        self.pending.dec(context.op);

        let event = match outcome {
            Ok(settlement) => {
                match &settlement {
                    Settlement::Created(todo) => debug!(id = %todo.id, "todo created"),
                    Settlement::Updated(todo) => debug!(id = %todo.id, "todo updated"),
                    Settlement::Deleted(id) => debug!(id = %id, "todo deleted"),
                    Settlement::Toggled(todo) => {
                        debug!(id = %todo.id, completed = todo.completed, "todo toggled")
                    }
                }
                match context.op {
                    MutationOp::Create => self.draft_title.clear(),
                    MutationOp::Update => {
                        if self.detail_view == context.target {
                            self.detail_view = None;
                        }
                    }
                    _ => {}
                }
                ClientEvent::MutationSucceeded(context.op)
            }
            Err(e) => {
                warn!(op = %context.op, error = %e, "mutation failed, rolling back");
                self.cache.restore_list(context.prev_list);
                if let (Some(id), Some(prev)) = (&context.target, context.prev_todo) {
                    self.cache.restore_todo(id, prev);
                }
                ClientEvent::MutationFailed(context.op)
            }
        };

        // Always reconcile with the store afterwards, success or failure.
        // The optimistic projection only has to hold until this refresh.
        self.cache.invalidate_list();
        if let Some(id) = &context.target {
            self.cache.invalidate_todo(id);
        }

        Some(event)
    }

    // ===== Status =====

    pub fn list_status(&self) -> QueryStatus {
        self.cache.list_status()
    }

    pub fn todo_status(&self, id: &str) -> QueryStatus {
        self.cache.todo_status(id)
    }

    pub fn mutation_pending(&self, op: MutationOp) -> bool {
        self.pending.get(op) > 0
    }

    pub fn any_mutation_pending(&self) -> bool {
        self.pending.total() > 0
    }

    /// Any mutation or background read still in flight.
    pub fn has_pending_work(&self) -> bool {
        self.pending.total() > 0 || self.cache.any_fetching()
    }

    // ===== Transient presentation state =====

    pub fn set_draft_title(&mut self, title: &str) {
        self.draft_title = title.to_string();
    }

    pub fn draft_title(&self) -> &str {
        &self.draft_title
    }

    pub fn open_detail(&mut self, id: &str) {
        self.detail_view = Some(id.to_string());
    }

    pub fn close_detail(&mut self) {
        self.detail_view = None;
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail_view.as_deref()
    }
}

// ============================================================================
// Fetch helpers
// ============================================================================

fn validate_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(title.to_string())
}

/// Refetch up to `max_pages` pages front to back, following the cursor so
/// a shrunken store ends the walk early.
async fn fetch_list_pages(
    store: &TodoStore,
    max_pages: usize,
    page_size: usize,
) -> Result<TodoPages, StoreError> {
    let mut pages = Vec::new();
    let mut next = Some(0);
    while let Some(page) = next {
        let fetched = list_page_with_retry(store, page, page_size).await?;
        next = if pages.len() + 1 < max_pages {
            fetched.next_page
        } else {
            None
        };
        pages.push(fetched);
    }
    Ok(TodoPages::new(pages))
}

/// Reads retry once on a transient failure; mutations never retry.
async fn list_page_with_retry(
    store: &TodoStore,
    page: u64,
    page_size: usize,
) -> Result<crate::models::TodoPage, StoreError> {
    match store.list_todos(page, page_size).await {
        Err(e) if e.is_transient() => {
            debug!(page, error = %e, "retrying list read");
            store.list_todos(page, page_size).await
        }
        other => other,
    }
}

async fn get_todo_with_retry(store: &TodoStore, id: &str) -> Result<Todo, StoreError> {
    match store.get_todo(id).await {
        Err(e) if e.is_transient() => {
            debug!(id, error = %e, "retrying todo read");
            store.get_todo(id).await
        }
        other => other,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreOp;

    fn seed(count: usize) -> Vec<Todo> {
        (1..=count)
            .map(|i| Todo {
                id: i.to_string(),
                title: format!("Task {}", i),
                completed: false,
            })
            .collect()
    }

    /// A client with the seeded list already loaded and settled.
    async fn seeded_client(count: usize) -> (Arc<TodoStore>, TodoClient) {
        let store = Arc::new(TodoStore::with_todos(seed(count)));
        let mut client = TodoClient::new(Arc::clone(&store));
        client.list();
        client.settle().await;
        assert!(client.cached_list().is_some());
        (store, client)
    }

    /// Drive the reconciling refresh after settlement to completion.
    async fn refresh_and_settle(client: &mut TodoClient) {
        client.list();
        client.settle().await;
    }

    fn flattened(client: &TodoClient) -> Vec<Todo> {
        client
            .cached_list()
            .map(|cached| cached.data.flatten().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_fetches_first_page() {
        let store = Arc::new(TodoStore::with_todos(seed(3)));
        let mut client = TodoClient::new(Arc::clone(&store));

        assert!(client.list().is_none());
        assert!(client.list_status().fetching);

        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::ListRefreshed));
        assert_eq!(client.total_count(), 3);
        assert_eq!(flattened(&client).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_create_is_visible_immediately() {
        let (_store, mut client) = seeded_client(3).await;

        client.submit_create("Buy milk").unwrap();

        let cached = client.cached_list().unwrap();
        let flat = cached.data.flatten();
        assert_eq!(flat[0].title, "Buy milk");
        assert!(!flat[0].completed);
        assert!(is_temp_id(&flat[0].id));
        assert_eq!(cached.data.total_count(), 4);

        client.settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_reconciles_placeholder_with_real_id() {
        let (store, mut client) = seeded_client(3).await;

        client.submit_create("Buy milk").unwrap();
        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::MutationSucceeded(MutationOp::Create)));

        refresh_and_settle(&mut client).await;

        let flat = flattened(&client);
        assert_eq!(flat[0].title, "Buy milk");
        assert!(!is_temp_id(&flat[0].id));
        assert_eq!(flat, store.snapshot().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_success_clears_draft_title() {
        let (_store, mut client) = seeded_client(1).await;

        client.set_draft_title("Buy milk");
        client.submit_create("Buy milk").unwrap();
        assert_eq!(client.draft_title(), "Buy milk");

        client.settle().await;
        assert_eq!(client.draft_title(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_rolls_back_and_keeps_draft() {
        let (store, mut client) = seeded_client(2).await;
        let before = client.cached_list().unwrap().clone();

        store.fail_next(StoreOp::Create).await;
        client.set_draft_title("Buy milk");
        client.submit_create("Buy milk").unwrap();
        assert_eq!(client.cached_list().unwrap().data.len(), 3);

        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::MutationFailed(MutationOp::Create)));
        assert_eq!(client.cached_list(), Some(&before));
        assert_eq!(client.draft_title(), "Buy milk");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failure_restores_list_exactly() {
        let (store, mut client) = seeded_client(3).await;
        let before = client.cached_list().unwrap().clone();

        store.fail_next(StoreOp::Delete).await;
        client.submit_delete("2");
        assert!(!client.cached_list().unwrap().data.contains("2"));

        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::MutationFailed(MutationOp::Delete)));

        // Same items, same order, same timestamp: the snapshot comes back
        // verbatim.
        assert_eq!(client.cached_list(), Some(&before));
        assert_eq!(store.snapshot().await, seed(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_twice_returns_to_original() {
        let (store, mut client) = seeded_client(3).await;
        let original = client.cached_list().unwrap().data.find("1").unwrap().completed;

        client.submit_toggle("1");
        client.settle().await;
        refresh_and_settle(&mut client).await;
        assert_eq!(
            client.cached_list().unwrap().data.find("1").unwrap().completed,
            !original
        );

        client.submit_toggle("1");
        client.settle().await;
        refresh_and_settle(&mut client).await;
        assert_eq!(
            client.cached_list().unwrap().data.find("1").unwrap().completed,
            original
        );
        assert_eq!(store.snapshot().await, seed(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventual_consistency_after_mixed_mutations() {
        let (store, mut client) = seeded_client(5).await;

        client.submit_create("New task").unwrap();
        client.submit_toggle("2");
        client.submit_delete("3");
        client
            .submit_update(Todo {
                id: "1".to_string(),
                title: "Renamed".to_string(),
                completed: true,
            })
            .unwrap();

        client.settle().await;
        refresh_and_settle(&mut client).await;

        assert_eq!(flattened(&client), store.snapshot().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventual_consistency_with_a_failure_in_the_mix() {
        let (store, mut client) = seeded_client(4).await;

        store.fail_next(StoreOp::Delete).await;
        client.submit_toggle("1");
        client.submit_delete("2");
        client.submit_create("Survivor").unwrap();

        client.settle().await;
        refresh_and_settle(&mut client).await;

        assert_eq!(flattened(&client), store.snapshot().await);
        // The failed delete left its target in place.
        assert!(client.cached_list().unwrap().data.contains("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_round_trip() {
        let store = Arc::new(TodoStore::with_todos(seed(15)));
        let mut client = TodoClient::new(Arc::clone(&store));

        client.list();
        client.settle().await;
        {
            let pages = &client.cached_list().unwrap().data;
            assert_eq!(pages.len(), 10);
            assert_eq!(pages.next_page(), Some(1));
        }

        client.fetch_next_page();
        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::PageLoaded));

        let pages = &client.cached_list().unwrap().data;
        assert_eq!(pages.pages.len(), 2);
        assert_eq!(pages.pages[1].todos.len(), 5);
        assert_eq!(pages.next_page(), None);

        let mut ids: Vec<String> = pages.flatten().iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids.len(), 15);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_refetches_all_loaded_pages() {
        let (store, mut client) = seeded_client(15).await;
        client.fetch_next_page();
        client.settle().await;
        assert_eq!(flattened(&client).len(), 15);

        client.submit_delete("7");
        client.settle().await;
        refresh_and_settle(&mut client).await;

        assert_eq!(flattened(&client), store.snapshot().await);
        assert_eq!(flattened(&client).len(), 14);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_title_is_rejected_before_dispatch() {
        let (_store, mut client) = seeded_client(2).await;
        let before = client.cached_list().unwrap().clone();

        assert_eq!(
            client.submit_create("   "),
            Err(ValidationError::EmptyTitle)
        );
        let ghost = Todo {
            id: "1".to_string(),
            title: "".to_string(),
            completed: false,
        };
        assert_eq!(client.submit_update(ghost), Err(ValidationError::EmptyTitle));

        assert!(!client.has_pending_work());
        assert_eq!(client.cached_list(), Some(&before));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutating_an_absent_id_never_inserts() {
        let (_store, mut client) = seeded_client(2).await;
        let before = client.cached_list().unwrap().data.clone();

        client.submit_toggle("99");
        assert_eq!(client.cached_list().unwrap().data, before);

        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::MutationFailed(MutationOp::Toggle)));
        assert_eq!(client.cached_list().unwrap().data, before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_refresh_is_discarded() {
        let (_store, mut client) = seeded_client(3).await;

        // A refresh is in flight with pre-toggle data when the mutation
        // cancels it; its late result must not clobber the optimistic
        // write.
        client.refetch_list();
        assert!(client.list_status().fetching);

        client.submit_toggle("1");
        assert!(client.cached_list().unwrap().data.find("1").unwrap().completed);

        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::MutationSucceeded(MutationOp::Toggle)));
        assert!(!events.contains(&ClientEvent::ListRefreshed));
        assert!(client.cached_list().unwrap().data.find("1").unwrap().completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_todo_entry_seeds_from_list_cache() {
        let (_store, mut client) = seeded_client(3).await;

        let cached = client.todo("2").unwrap();
        assert_eq!(cached.data.id, "2");
        // Seeded fresh from the list, so no fetch was scheduled.
        assert!(!client.todo_status("2").fetching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_todo_entry_fetches_when_not_in_list() {
        let store = Arc::new(TodoStore::with_todos(seed(3)));
        let mut client = TodoClient::new(Arc::clone(&store));

        assert!(client.todo("2").is_none());
        assert!(client.todo_status("2").fetching);

        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::TodoRefreshed("2".to_string())));
        assert_eq!(client.cached_todo("2").unwrap().data.id, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_patches_both_entries_and_closes_detail() {
        let (store, mut client) = seeded_client(3).await;
        client.open_detail("1");

        let mut todo = client.todo("1").unwrap().data.clone();
        todo.title = "Renamed".to_string();
        client.submit_update(todo).unwrap();

        assert_eq!(
            client.cached_list().unwrap().data.find("1").unwrap().title,
            "Renamed"
        );
        assert_eq!(client.cached_todo("1").unwrap().data.title, "Renamed");
        assert_eq!(client.detail(), Some("1"));

        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::MutationSucceeded(MutationOp::Update)));
        assert_eq!(client.detail(), None);
        assert_eq!(store.snapshot().await[0].title, "Renamed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_failure_restores_both_entries() {
        let (store, mut client) = seeded_client(3).await;
        client.prefetch_todo("1");
        client.settle().await;

        let list_before = client.cached_list().unwrap().clone();
        let todo_before = client.cached_todo("1").unwrap().clone();
        client.open_detail("1");

        store.fail_next(StoreOp::Update).await;
        let mut todo = todo_before.data.clone();
        todo.title = "Renamed".to_string();
        client.submit_update(todo).unwrap();

        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::MutationFailed(MutationOp::Update)));
        assert_eq!(client.cached_list(), Some(&list_before));
        assert_eq!(client.cached_todo("1"), Some(&todo_before));
        // The detail view stays open so the edit can be retried.
        assert_eq!(client.detail(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_drops_item_entry_and_rollback_restores_it() {
        let (store, mut client) = seeded_client(3).await;
        client.prefetch_todo("2");
        client.settle().await;
        let todo_before = client.cached_todo("2").unwrap().clone();

        store.fail_next(StoreOp::Delete).await;
        client.submit_delete("2");
        assert!(client.cached_todo("2").is_none());

        client.settle().await;
        assert_eq!(client.cached_todo("2"), Some(&todo_before));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_pending_flags() {
        let (_store, mut client) = seeded_client(2).await;

        client.submit_toggle("1");
        assert!(client.mutation_pending(MutationOp::Toggle));
        assert!(!client.mutation_pending(MutationOp::Delete));
        assert!(client.any_mutation_pending());

        client.settle().await;
        assert!(!client.any_mutation_pending());
        assert!(!client.has_pending_work());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_failure_retries_once() {
        let store = Arc::new(TodoStore::with_todos(seed(3)));
        store.fail_next(StoreOp::List).await;
        let mut client = TodoClient::new(Arc::clone(&store));

        client.list();
        let events = client.settle().await;
        // The single injected failure is absorbed by the retry.
        assert!(events.contains(&ClientEvent::ListRefreshed));
        assert_eq!(flattened(&client).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_read_failure_surfaces_error() {
        let store = Arc::new(TodoStore::with_todos(seed(3)));
        store.fail_next_n(StoreOp::List, 2).await;
        let mut client = TodoClient::new(Arc::clone(&store));

        client.list();
        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::ListRefreshFailed));
        assert!(client.list_status().error.is_some());

        // A forced refetch clears the error and tries again.
        client.refetch_list();
        let events = client.settle().await;
        assert!(events.contains(&ClientEvent::ListRefreshed));
        assert_eq!(flattened(&client).len(), 3);
    }
}
