//! The current catalog and what the user picked from it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::catalog::{MediaId, MediaItem};

// ─── SelectionSet ─────────────────────────────────────────────────────────────

/// IDs marked for batch download.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: HashSet<MediaId>,
}

impl SelectionSet {
    /// Flip one ID; returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: MediaId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn contains(&self, id: MediaId) -> bool { self.ids.contains(&id) }
    pub fn len(&self)      -> usize { self.ids.len() }
    pub fn is_empty(&self) -> bool  { self.ids.is_empty() }
    pub fn clear(&mut self)         { self.ids.clear() }
}

// ─── MediaLibrary ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct LibraryState {
    catalog:   Vec<MediaItem>,
    selection: SelectionSet,
}

/// Catalog plus selection, shared between the UI layer, the auth controller
/// and the download orchestrator. Cheap to clone.
#[derive(Clone, Default)]
pub struct MediaLibrary {
    inner: Arc<Mutex<LibraryState>>,
}

impl MediaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LibraryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a freshly fetched catalog. The old selection referred to the
    /// previous catalog and is dropped.
    pub fn replace_catalog(&self, items: Vec<MediaItem>) {
        let mut state = self.lock();
        state.catalog = items;
        state.selection.clear();
    }

    pub fn catalog(&self) -> Vec<MediaItem> {
        self.lock().catalog.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().catalog.is_empty()
    }

    pub fn item(&self, id: MediaId) -> Option<MediaItem> {
        self.lock().catalog.iter().find(|i| i.id == id).cloned()
    }

    /// Flip the selection of one catalog item. IDs not in the catalog are
    /// ignored and reported as unselected.
    pub fn toggle(&self, id: MediaId) -> bool {
        let mut state = self.lock();
        if !state.catalog.iter().any(|i| i.id == id) {
            return false;
        }
        state.selection.toggle(id)
    }

    /// Select every item, or deselect everything when all are already selected.
    pub fn select_all(&self) {
        let mut state = self.lock();
        let all_selected = !state.catalog.is_empty()
            && state.catalog.iter().all(|i| state.selection.contains(i.id));
        if all_selected {
            state.selection.clear();
        } else {
            let ids: Vec<_> = state.catalog.iter().map(|i| i.id).collect();
            state.selection.ids.extend(ids);
        }
    }

    pub fn is_selected(&self, id: MediaId) -> bool {
        self.lock().selection.contains(id)
    }

    pub fn selection(&self) -> SelectionSet {
        self.lock().selection.clone()
    }

    pub fn selection_len(&self) -> usize {
        self.lock().selection.len()
    }

    pub fn clear_selection(&self) {
        self.lock().selection.clear();
    }

    /// Selected IDs in catalog order.
    pub fn selected_ids(&self) -> Vec<MediaId> {
        self.selected_items().into_iter().map(|i| i.id).collect()
    }

    /// Selected items in catalog order.
    pub fn selected_items(&self) -> Vec<MediaItem> {
        let state = self.lock();
        state
            .catalog
            .iter()
            .filter(|i| state.selection.contains(i.id))
            .cloned()
            .collect()
    }

    /// Forget catalog and selection (on disconnect).
    pub fn clear(&self) {
        let mut state = self.lock();
        state.catalog.clear();
        state.selection.clear();
    }
}

impl std::fmt::Debug for MediaLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MediaLibrary")
            .field("items", &state.catalog.len())
            .field("selected", &state.selection.len())
            .finish()
    }
}
