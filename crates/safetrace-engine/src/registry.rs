//! # Keyed Registry
//!
//! An in-memory map from code to record where every record sits behind its
//! own `parking_lot::Mutex`. The map lock is held only to find or insert an
//! entry; mutations then serialize on the entry lock, so work on one code
//! never blocks work on another.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Code-keyed records with per-entry locking.
#[derive(Debug)]
pub struct Registry<K, V> {
    entries: RwLock<BTreeMap<K, Arc<Mutex<V>>>>,
}

impl<K: Ord + Clone, V: Clone> Registry<K, V> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert a new record. Returns the record back if the key is taken.
    pub fn insert(&self, key: K, value: V) -> Result<(), V> {
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(value);
        }
        entries.insert(key, Arc::new(Mutex::new(value)));
        Ok(())
    }

    /// The lock guarding `key`'s record.
    pub fn entry(&self, key: &K) -> Option<Arc<Mutex<V>>> {
        self.entries.read().get(key).cloned()
    }

    /// A copy of `key`'s record.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entry(key).map(|e| e.lock().clone())
    }

    /// Run `f` on `key`'s record under its entry lock.
    pub fn with<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let entry = self.entry(key)?;
        let mut guard = entry.lock();
        Some(f(&mut guard))
    }

    /// Copies of all records in key order.
    pub fn values(&self) -> Vec<V> {
        let entries: Vec<Arc<Mutex<V>>> = self.entries.read().values().cloned().collect();
        entries.iter().map(|e| e.lock().clone()).collect()
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Ord + Clone, V: Clone> Default for Registry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn insert_rejects_duplicates() {
        let reg: Registry<String, u32> = Registry::new();
        assert!(reg.insert("a".into(), 1).is_ok());
        assert_eq!(reg.insert("a".into(), 2), Err(2));
        assert_eq!(reg.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn with_mutates_in_place() {
        let reg: Registry<String, Vec<u32>> = Registry::new();
        reg.insert("k".into(), vec![]).unwrap();
        let len = reg.with(&"k".to_string(), |v| {
            v.push(7);
            v.len()
        });
        assert_eq!(len, Some(1));
        assert!(reg.with(&"missing".to_string(), |v| v.len()).is_none());
    }

    #[test]
    fn concurrent_updates_on_one_entry_serialize() {
        let reg: Arc<Registry<u8, u64>> = Arc::new(Registry::new());
        reg.insert(1, 0).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        reg.with(&1, |v| *v += 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.get(&1), Some(8000));
    }
}
