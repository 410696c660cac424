//! In-process key-value storage backing the local locker
//!
//! Storage gives no atomicity between calls. The owning `LocalLocker`
//! wraps it in a mutex and runs its whole read-check-write sequence there.

use std::collections::HashMap;

use serde_json::Value;

/// Key-value mapping used by `LocalLocker`
pub trait Storage: Send {
    /// Value stored under `key`, or `None` when the key does not exist
    fn get(&self, key: &str) -> Option<&Value>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&mut self, key: &str, value: Value);

    /// Remove `key`; missing keys are ignored
    fn delete(&mut self, key: &str);
}

/// HashMap-backed storage
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    map: HashMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: HashMap<String, Value>) -> Self {
        Self { map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Keep only the entries for which `f` returns true
    pub fn retain(&mut self, mut f: impl FnMut(&str, &Value) -> bool) {
        self.map.retain(|key, value| f(key, value));
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.map.insert(key.to_string(), value);
    }

    fn delete(&mut self, key: &str) {
        self.map.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn storage_with(entries: &[(&str, &str)]) -> MemoryStorage {
        MemoryStorage::from_map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect(),
        )
    }

    #[test]
    fn test_get() {
        let empty = storage_with(&[]);
        assert_eq!(empty.get("k1"), None);

        let filled = storage_with(&[("k1", "v1"), ("k2", "v2"), ("k3", "v3")]);
        assert_eq!(filled.get("k1"), Some(&json!("v1")));
        assert_eq!(filled.len(), 3);
    }

    #[test]
    fn test_set() {
        let mut storage = storage_with(&[]);
        storage.set("k1", json!("v1"));
        assert_eq!(storage.get("k1"), Some(&json!("v1")));

        // Overwrite existing value
        let mut storage = storage_with(&[("k1", "v1")]);
        storage.set("k1", json!("v2"));
        assert_eq!(storage.get("k1"), Some(&json!("v2")));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_delete() {
        let mut storage = storage_with(&[]);
        storage.delete("k1");
        assert!(storage.is_empty());

        let mut storage = storage_with(&[("k1", "v1")]);
        storage.delete("k1");
        assert_eq!(storage.get("k1"), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_retain() {
        let mut storage = storage_with(&[("k1", "v1"), ("k2", "v2"), ("k3", "v1")]);
        storage.retain(|_, value| value != &json!("v1"));
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get("k2"), Some(&json!("v2")));
    }
}
