//! Shared view of a stack instance
//!
//! Plugin nodes receive a [`StackHandle`] through `set_stack_instance`. It
//! exposes the per-operation replica exclusion set and a small key/value
//! board nodes can use to pass hints to each other.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct HandleState {
    excluded: Mutex<BTreeSet<i64>>,
    values: Mutex<BTreeMap<String, Value>>,
}

/// Cheap to clone; all clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct StackHandle {
    state: Arc<HandleState>,
}

impl StackHandle {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Exclusions
    // =========================================================================

    pub fn exclude(&self, replica_id: i64) -> bool {
        self.state.excluded.lock().insert(replica_id)
    }

    pub fn is_excluded(&self, replica_id: i64) -> bool {
        self.state.excluded.lock().contains(&replica_id)
    }

    /// Snapshot of the excluded replica ids
    pub fn excluded(&self) -> BTreeSet<i64> {
        self.state.excluded.lock().clone()
    }

    pub fn has_exclusions(&self) -> bool {
        !self.state.excluded.lock().is_empty()
    }

    pub fn clear_exclusions(&self) {
        self.state.excluded.lock().clear();
    }

    // =========================================================================
    // Values
    // =========================================================================

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.values.lock().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.values.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.values.lock().contains_key(key)
    }

    pub fn erase(&self, key: &str) -> Option<Value> {
        self.state.values.lock().remove(key)
    }
}
