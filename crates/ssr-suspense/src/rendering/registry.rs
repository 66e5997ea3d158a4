use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Boundaries an async render is waiting on, and the fragments of the ones
/// that finished. One registry per render call.
pub struct FragmentRegistry {
    pending: Mutex<FxHashSet<String>>,
    cache: Mutex<FxHashMap<String, String>>,
}

impl Default for FragmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentRegistry {
    pub fn new() -> Self {
        Self { pending: Mutex::new(FxHashSet::default()), cache: Mutex::new(FxHashMap::default()) }
    }

    pub fn register(&self, boundary_id: &str) {
        let is_new = self.pending.lock().insert(boundary_id.to_string());
        if is_new {
            debug!(boundary = boundary_id, "Boundary pending");
        }
    }

    /// Caches the fragment of a pending boundary. Completions for ids that are
    /// not pending are ignored.
    pub fn complete(&self, boundary_id: &str, html: String) -> bool {
        if !self.pending.lock().remove(boundary_id) {
            debug!(boundary = boundary_id, "Ignoring completion for boundary that is not pending");
            return false;
        }

        self.cache.lock().insert(boundary_id.to_string(), html);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn fragment(&self, boundary_id: &str) -> Option<String> {
        self.cache.lock().get(boundary_id).cloned()
    }

    pub fn fragments(&self) -> FxHashMap<String, String> {
        self.cache.lock().clone()
    }
}
