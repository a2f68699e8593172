//! The tab registry: single source of truth for tab documents, their order and the
//! active pointer.

use std::collections::VecDeque;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::types::{NewTab, Tab};

/// Default number of closed tabs kept for [`TabRegistry::reopen`].
pub const DEFAULT_UNDO_CAPACITY: usize = 10;

/// Generate a tab ID: 16 lowercase hex characters from 8 random bytes.
pub fn generate_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Stored tabs in insertion order. Stored copies always carry `active == false`.
    tabs: IndexMap<String, Tab>,
    active: Option<String>,
    /// Closed tabs, most recent at the back.
    closed: VecDeque<Tab>,
}

impl RegistryState {
    /// Detached copy of a stored tab with the active flag resolved.
    fn snapshot(&self, tab: &Tab) -> Tab {
        let mut copy = tab.clone();
        copy.active = self.active.as_deref() == Some(tab.id.as_str());
        copy
    }

    fn snapshot_by_id(&self, id: &str) -> Option<Tab> {
        self.tabs.get(id).map(|tab| self.snapshot(tab))
    }

    fn unused_id(&self) -> String {
        loop {
            let id = generate_id();
            if !self.tabs.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Thread-safe registry of tabs.
///
/// Reads (`get`, `list`) share a read lock; every mutation takes the write lock for the
/// duration of a map update only. Nothing inside the lock is ever handed out: all results
/// are value copies.
#[derive(Debug)]
pub struct TabRegistry {
    state: RwLock<RegistryState>,
    undo_capacity: usize,
}

impl Default for TabRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::with_undo_capacity(DEFAULT_UNDO_CAPACITY)
    }

    pub fn with_undo_capacity(undo_capacity: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            undo_capacity,
        }
    }

    /// Create a tab, or update it in place when the ID already exists.
    ///
    /// Returns the resulting tab and `true` when it was newly created. On update the ID
    /// and creation time are kept, the source path is only replaced by a non-empty value,
    /// and the stale flag is left alone. A tab created into an empty registry becomes
    /// active.
    pub fn create(&self, new: NewTab) -> (Tab, bool) {
        let now = Utc::now();
        let mut state = self.state.write();

        let id = match new.id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => state.unused_id(),
        };
        let source_path = new.source_path.filter(|p| !p.as_os_str().is_empty());
        let is_active = state.active.as_deref() == Some(id.as_str());

        if let Some(existing) = state.tabs.get_mut(&id) {
            existing.title = new.title;
            existing.kind = new.kind;
            existing.content = new.content;
            existing.language = new.language;
            existing.diff = new.diff;
            if source_path.is_some() {
                existing.source_path = source_path;
            }
            existing.updated_at = now;

            let mut tab = existing.clone();
            tab.active = is_active;
            return (tab, false);
        }

        let tab = Tab {
            id: id.clone(),
            title: new.title,
            kind: new.kind,
            content: new.content,
            language: new.language,
            diff: new.diff,
            source_path,
            active: false,
            stale: false,
            created_at: now,
            updated_at: now,
        };

        if state.tabs.is_empty() {
            state.active = Some(id.clone());
        }
        let snapshot = state.snapshot(&tab);
        state.tabs.insert(id, tab);

        (snapshot, true)
    }

    pub fn get(&self, id: &str) -> Option<Tab> {
        self.state.read().snapshot_by_id(id)
    }

    /// All tabs in insertion order.
    pub fn list(&self) -> Vec<Tab> {
        let state = self.state.read();
        state.tabs.values().map(|tab| state.snapshot(tab)).collect()
    }

    /// Remove a tab, keeping a copy for [`reopen`](Self::reopen).
    ///
    /// When the removed tab was active, the first remaining tab becomes active.
    pub fn delete(&self, id: &str) -> bool {
        let mut state = self.state.write();

        let Some(removed) = state.tabs.shift_remove(id) else {
            return false;
        };

        if self.undo_capacity > 0 {
            state.closed.push_back(removed);
            while state.closed.len() > self.undo_capacity {
                state.closed.pop_front();
            }
        }

        if state.active.as_deref() == Some(id) {
            state.active = state.tabs.keys().next().cloned();
        }

        true
    }

    pub fn set_active(&self, id: &str) -> bool {
        let mut state = self.state.write();
        if !state.tabs.contains_key(id) {
            return false;
        }
        state.active = Some(id.to_string());
        true
    }

    pub fn active_id(&self) -> Option<String> {
        self.state.read().active.clone()
    }

    /// Remove every tab. The closed-tab history survives.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.tabs.clear();
        state.active = None;
    }

    /// Restore the most recently closed tab at the end of the order and activate it.
    ///
    /// A new ID is generated if a live tab has taken the old one in the meantime.
    pub fn reopen(&self) -> Option<Tab> {
        let mut state = self.state.write();

        let mut tab = state.closed.pop_back()?;
        if state.tabs.contains_key(&tab.id) {
            tab.id = state.unused_id();
        }
        tab.updated_at = Utc::now();

        state.active = Some(tab.id.clone());
        let snapshot = state.snapshot(&tab);
        state.tabs.insert(tab.id.clone(), tab);

        Some(snapshot)
    }

    /// Replace a tab's content after its backing file changed. Clears the stale flag.
    pub fn update_content(&self, id: &str, content: impl Into<String>) -> Option<Tab> {
        self.mutate(id, |tab| {
            tab.content = content.into();
            tab.stale = false;
        })
    }

    /// Flag a tab whose backing file disappeared.
    pub fn mark_stale(&self, id: &str) -> Option<Tab> {
        self.mutate(id, |tab| tab.stale = true)
    }

    pub fn clear_stale(&self, id: &str) -> Option<Tab> {
        self.mutate(id, |tab| tab.stale = false)
    }

    pub fn len(&self) -> usize {
        self.state.read().tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().tabs.is_empty()
    }

    /// Number of tabs available to [`reopen`](Self::reopen).
    pub fn closed_count(&self) -> usize {
        self.state.read().closed.len()
    }

    fn mutate(&self, id: &str, apply: impl FnOnce(&mut Tab)) -> Option<Tab> {
        let mut state = self.state.write();
        let is_active = state.active.as_deref() == Some(id);
        let tab = state.tabs.get_mut(id)?;
        apply(tab);
        tab.updated_at = Utc::now();

        let mut snapshot = tab.clone();
        snapshot.active = is_active;
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabs::{DiffMeta, TabKind};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn markdown(title: &str, content: &str) -> NewTab {
        NewTab::new(title, TabKind::Markdown, content)
    }

    fn ids(registry: &TabRegistry) -> Vec<String> {
        registry.list().into_iter().map(|t| t.id).collect()
    }

    fn active_ids(registry: &TabRegistry) -> Vec<String> {
        registry
            .list()
            .into_iter()
            .filter(|t| t.active)
            .map(|t| t.id)
            .collect()
    }

    #[test]
    fn test_generate_id_format() {
        let id = generate_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn test_create_generates_id_and_activates_first_tab() {
        let registry = TabRegistry::new();
        let (tab, created) = registry.create(markdown("A", "# Hi"));

        assert!(created);
        assert_eq!(tab.id.len(), 16);
        assert!(tab.active);
        assert_eq!(tab.created_at, tab.updated_at);
        assert_eq!(registry.active_id(), Some(tab.id.clone()));

        let (second, _) = registry.create(markdown("B", "body"));
        assert!(!second.active);
        assert_eq!(registry.active_id(), Some(tab.id));
    }

    #[test]
    fn test_empty_id_is_treated_as_absent() {
        let registry = TabRegistry::new();
        let (tab, created) = registry.create(markdown("A", "a").with_id(""));
        assert!(created);
        assert!(!tab.id.is_empty());
    }

    #[test]
    fn test_create_with_existing_id_updates_in_place() {
        let registry = TabRegistry::new();
        let (first, created) = registry.create(
            NewTab::new("v1", TabKind::Code, "fn a() {}")
                .with_id("fixed")
                .with_language("rust")
                .with_source_path("/tmp/a.rs"),
        );
        assert!(created);

        let (second, created) = registry.create(
            NewTab::new("v2", TabKind::Diff, "--- a\n+++ b")
                .with_id("fixed")
                .with_diff(DiffMeta {
                    left_label: "old".to_string(),
                    right_label: "new".to_string(),
                    language: String::new(),
                }),
        );

        assert!(!created);
        assert_eq!(registry.len(), 1);
        assert_eq!(second.id, "fixed");
        assert_eq!(second.title, "v2");
        assert_eq!(second.kind, TabKind::Diff);
        assert_eq!(second.language, None);
        assert_eq!(second.diff.as_ref().unwrap().left_label, "old");
        // Source path survives an update that omits it
        assert_eq!(second.source_path, Some(PathBuf::from("/tmp/a.rs")));
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);

        let (third, _) = registry.create(
            markdown("v3", "x")
                .with_id("fixed")
                .with_source_path("/tmp/b.md"),
        );
        assert_eq!(third.source_path, Some(PathBuf::from("/tmp/b.md")));
    }

    #[test]
    fn test_update_does_not_touch_stale_flag() {
        let registry = TabRegistry::new();
        registry.create(markdown("A", "a").with_id("t"));
        registry.mark_stale("t");

        let (tab, _) = registry.create(markdown("A", "b").with_id("t"));
        assert!(tab.stale);
    }

    #[test]
    fn test_reads_are_detached_copies() {
        let registry = TabRegistry::new();
        registry.create(markdown("A", "original").with_id("a"));

        let mut copy = registry.get("a").unwrap();
        copy.content.push_str(" mutated");
        copy.active = false;

        let fresh = registry.get("a").unwrap();
        assert_eq!(fresh.content, "original");
        assert!(fresh.active);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_list_preserves_insertion_order_across_deletes() {
        let registry = TabRegistry::new();
        let mut expected = Vec::new();
        for i in 0..8 {
            let id = format!("t{i}");
            registry.create(markdown(&id, "x").with_id(id.clone()));
            expected.push(id);
        }

        for victim in ["t3", "t0", "t7"] {
            assert!(registry.delete(victim));
            expected.retain(|id| id != victim);
        }
        assert!(!registry.delete("t3"));

        // Re-creating an existing ID must not move it
        registry.create(markdown("again", "y").with_id("t5"));

        assert_eq!(ids(&registry), expected);
        assert_eq!(registry.len(), 8 - 3);
    }

    #[test]
    fn test_delete_active_promotes_first_remaining() {
        let registry = TabRegistry::new();
        for id in ["a", "b", "c"] {
            registry.create(markdown(id, id).with_id(id));
        }
        assert!(registry.set_active("b"));

        assert!(registry.delete("b"));
        assert_eq!(active_ids(&registry), vec!["a".to_string()]);

        assert!(registry.delete("c"));
        assert_eq!(active_ids(&registry), vec!["a".to_string()]);

        assert!(registry.delete("a"));
        assert!(active_ids(&registry).is_empty());
        assert_eq!(registry.active_id(), None);
    }

    #[test]
    fn test_set_active_missing_is_noop() {
        let registry = TabRegistry::new();
        registry.create(markdown("a", "a").with_id("a"));
        assert!(!registry.set_active("nope"));
        assert_eq!(registry.active_id().as_deref(), Some("a"));
    }

    #[test]
    fn test_reopen_is_lifo_and_bounded() {
        let registry = TabRegistry::new();
        for i in 0..12 {
            let id = format!("t{i}");
            registry.create(markdown(&id, &format!("content {i}")).with_id(id));
        }
        for i in 0..12 {
            assert!(registry.delete(&format!("t{i}")));
        }
        assert_eq!(registry.closed_count(), DEFAULT_UNDO_CAPACITY);

        for i in (2..12).rev() {
            let tab = registry.reopen().expect("closed tab available");
            assert_eq!(tab.id, format!("t{i}"));
            assert_eq!(tab.content, format!("content {i}"));
            assert!(tab.active);
        }
        assert!(registry.reopen().is_none());
    }

    #[test]
    fn test_reopen_regenerates_colliding_id() {
        let registry = TabRegistry::new();
        registry.create(markdown("old", "old body").with_id("dup"));
        registry.delete("dup");
        registry.create(markdown("new", "new body").with_id("dup"));

        let reopened = registry.reopen().unwrap();
        assert_ne!(reopened.id, "dup");
        assert_eq!(reopened.content, "old body");
        assert!(reopened.active);
        assert_eq!(ids(&registry), vec!["dup".to_string(), reopened.id.clone()]);
        assert_eq!(registry.get("dup").unwrap().content, "new body");
    }

    #[test]
    fn test_clear_keeps_undo_history() {
        let registry = TabRegistry::new();
        registry.create(markdown("a", "a").with_id("a"));
        registry.create(markdown("b", "b").with_id("b"));
        registry.delete("a");

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.active_id(), None);
        assert_eq!(registry.closed_count(), 1);

        // First tab after a clear becomes active again
        let (tab, _) = registry.create(markdown("c", "c"));
        assert!(tab.active);

        let reopened = registry.reopen().unwrap();
        assert_eq!(reopened.id, "a");
        assert_eq!(registry.active_id().as_deref(), Some("a"));
    }

    #[test]
    fn test_zero_undo_capacity_keeps_nothing() {
        let registry = TabRegistry::with_undo_capacity(0);
        registry.create(markdown("a", "a").with_id("a"));
        registry.delete("a");
        assert_eq!(registry.closed_count(), 0);
        assert!(registry.reopen().is_none());
    }

    #[test]
    fn test_content_and_stale_updates() {
        let registry = TabRegistry::new();
        let (tab, _) = registry.create(markdown("live", "old").with_id("live"));

        let stale = registry.mark_stale("live").unwrap();
        assert!(stale.stale);
        assert!(stale.updated_at >= tab.updated_at);

        let updated = registry.update_content("live", "fresh").unwrap();
        assert_eq!(updated.content, "fresh");
        assert!(!updated.stale);

        registry.mark_stale("live");
        assert!(!registry.clear_stale("live").unwrap().stale);

        assert!(registry.update_content("missing", "x").is_none());
        assert!(registry.mark_stale("missing").is_none());
        assert!(registry.clear_stale("missing").is_none());
    }

    #[test]
    fn test_scenario_create_delete_reopen() {
        let registry = TabRegistry::new();

        let (a, created) = registry.create(markdown("A", "# Hi"));
        assert!(created);
        assert!(a.active);

        registry.create(markdown("B", "b").with_id("fixed"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.active_id(), Some(a.id.clone()));

        assert!(registry.delete(&a.id));
        assert_eq!(ids(&registry), vec!["fixed".to_string()]);
        assert_eq!(registry.active_id().as_deref(), Some("fixed"));

        let reopened = registry.reopen().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(reopened.id, a.id);
        assert_eq!(reopened.content, "# Hi");
        assert_eq!(registry.active_id(), Some(a.id));
    }

    #[test]
    fn test_concurrent_creates_and_reads() {
        let registry = Arc::new(TabRegistry::new());
        let mut handles = Vec::new();

        for worker in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    registry.create(markdown("t", "x").with_id(format!("w{worker}-{i}")));
                    let listed = registry.list();
                    assert!(listed.iter().filter(|t| t.active).count() <= 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 8 * 50);
        assert_eq!(active_ids(&registry).len(), 1);
    }
}
