//! The paginated list cache entry and its optimistic projections.
//!
//! `TodoPages` is the value cached under the list key: the ordered pages
//! returned by successive paginated reads. The projection methods build
//! the whole new value a mutation expects to observe; the cache then
//! replaces the entry wholesale. Projections targeting an id that is not
//! present leave the pages unchanged; they never insert.

use crate::models::{Todo, TodoPage};

/// Ordered pages of todos, flattened by consumers for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoPages {
    pub pages: Vec<TodoPage>,
}

impl TodoPages {
    pub fn new(pages: Vec<TodoPage>) -> Self {
        Self { pages }
    }

    /// All todos across pages, in display order.
    pub fn flatten(&self) -> Vec<&Todo> {
        self.pages.iter().flat_map(|p| p.todos.iter()).collect()
    }

    /// Total count as reported by the first page, the page consumers
    /// read it from.
    pub fn total_count(&self) -> usize {
        self.pages.first().map(|p| p.total_count).unwrap_or(0)
    }

    /// Cursor for the next unloaded page, if any.
    pub fn next_page(&self) -> Option<u64> {
        self.pages.last().and_then(|p| p.next_page)
    }

    pub fn find(&self, id: &str) -> Option<&Todo> {
        self.pages
            .iter()
            .flat_map(|p| p.todos.iter())
            .find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.todos.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Todos with `completed` set.
    pub fn completed(&self) -> Vec<&Todo> {
        self.flatten().into_iter().filter(|t| t.completed).collect()
    }

    /// Todos with `completed` unset.
    pub fn incomplete(&self) -> Vec<&Todo> {
        self.flatten().into_iter().filter(|t| !t.completed).collect()
    }

    /// Projection for create: the todo prepended to the first page, with
    /// that page's total bumped. No pages loaded means nothing to prepend
    /// into, so the value is returned unchanged.
    pub fn prepended(&self, todo: Todo) -> TodoPages {
        let mut pages = self.pages.clone();
        if let Some(first) = pages.first_mut() {
            first.todos.insert(0, todo);
            first.total_count += 1;
        }
        TodoPages { pages }
    }

    /// Projection for update: the matching todo replaced in every page.
    pub fn patched(&self, updated: &Todo) -> TodoPages {
        let pages = self
            .pages
            .iter()
            .map(|page| TodoPage {
                todos: page
                    .todos
                    .iter()
                    .map(|t| {
                        if t.id == updated.id {
                            updated.clone()
                        } else {
                            t.clone()
                        }
                    })
                    .collect(),
                ..page.clone()
            })
            .collect();
        TodoPages { pages }
    }

    /// Projection for toggle: the matching todo's completion flag flipped.
    pub fn toggled(&self, id: &str) -> TodoPages {
        let pages = self
            .pages
            .iter()
            .map(|page| TodoPage {
                todos: page
                    .todos
                    .iter()
                    .map(|t| {
                        if t.id == id {
                            Todo {
                                completed: !t.completed,
                                ..t.clone()
                            }
                        } else {
                            t.clone()
                        }
                    })
                    .collect(),
                ..page.clone()
            })
            .collect();
        TodoPages { pages }
    }

    /// Projection for delete: the matching todo filtered out of every
    /// page. Totals are left for the reconciling refetch to correct.
    pub fn without(&self, id: &str) -> TodoPages {
        let pages = self
            .pages
            .iter()
            .map(|page| TodoPage {
                todos: page.todos.iter().filter(|t| t.id != id).cloned().collect(),
                ..page.clone()
            })
            .collect();
        TodoPages { pages }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn todo(id: &str, title: &str, completed: bool) -> Todo {
        Todo {
            id: id.to_string(),
            title: title.to_string(),
            completed,
        }
    }

    fn two_pages() -> TodoPages {
        TodoPages::new(vec![
            TodoPage {
                todos: vec![todo("1", "one", false), todo("2", "two", true)],
                total_count: 3,
                next_page: Some(1),
            },
            TodoPage {
                todos: vec![todo("3", "three", false)],
                total_count: 3,
                next_page: None,
            },
        ])
    }

    #[test]
    fn test_flatten_preserves_order_without_duplicates() {
        let pages = two_pages();
        let ids: Vec<&str> = pages.flatten().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages.total_count(), 3);
        assert_eq!(pages.next_page(), None);
    }

    #[test]
    fn test_prepended_adds_to_first_page_and_bumps_total() {
        let pages = two_pages().prepended(todo("temp-1", "new", false));
        assert_eq!(pages.pages[0].todos[0].id, "temp-1");
        assert_eq!(pages.pages[0].total_count, 4);
        // The second page is untouched.
        assert_eq!(pages.pages[1].total_count, 3);
        assert_eq!(pages.len(), 4);
    }

    #[test]
    fn test_prepended_with_no_pages_is_unchanged() {
        let empty = TodoPages::default();
        let projected = empty.prepended(todo("temp-1", "new", false));
        assert_eq!(projected, empty);
    }

    #[test]
    fn test_patched_replaces_matching_todo_only() {
        let updated = todo("3", "renamed", true);
        let pages = two_pages().patched(&updated);
        assert_eq!(pages.find("3"), Some(&updated));
        assert_eq!(pages.find("1").map(|t| t.title.as_str()), Some("one"));
    }

    #[test]
    fn test_patched_missing_id_is_noop() {
        let before = two_pages();
        let projected = before.patched(&todo("99", "ghost", false));
        assert_eq!(projected, before);
    }

    #[test]
    fn test_toggled_flips_only_the_target() {
        let pages = two_pages().toggled("2");
        assert!(!pages.find("2").unwrap().completed);
        assert!(!pages.find("1").unwrap().completed);
    }

    #[test]
    fn test_toggled_missing_id_is_noop() {
        let before = two_pages();
        assert_eq!(before.toggled("99"), before);
    }

    #[test]
    fn test_without_removes_only_the_target() {
        let pages = two_pages().without("2");
        assert!(!pages.contains("2"));
        assert_eq!(pages.len(), 2);
        // Removing an absent id changes nothing.
        assert_eq!(pages.without("99"), pages);
    }

    #[test]
    fn test_completion_filters() {
        let pages = two_pages();
        assert_eq!(pages.completed().len(), 1);
        assert_eq!(pages.incomplete().len(), 2);
    }
}
