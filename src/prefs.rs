//! Key-value preference source.
//!
//! The application owns persistence; the library only reads and writes
//! strings through [`PrefStore`]. Keys are namespaced per camera:
//! `camera.<name>.<field>`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub trait PrefStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);

    fn get_i32(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn set_i32(&self, key: &str, value: i32) {
        self.set(key, &value.to_string());
    }
}

/// Key for a per-camera preference.
pub fn camera_key(camera: &str, field: &str) -> String {
    format!("camera.{}.{}", camera, field)
}

/// In-memory store, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryPrefStore {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryPrefStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl PrefStore for MemoryPrefStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_is_shared_between_clones() {
        let store = MemoryPrefStore::new();
        let other = store.clone();
        store.set_i32(&camera_key("stage", "zoom"), 1200);
        assert_eq!(other.get_i32("camera.stage.zoom"), Some(1200));
        other.set("camera.stage.zoom", "not a number");
        assert_eq!(store.get_i32("camera.stage.zoom"), None);
        store.remove("camera.stage.zoom");
        assert!(other.is_empty());
    }
}
