//! In-memory key-value persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{PersistencePort, StoreError, StoreResult};

/// Shared in-memory blobs. Clones see the same entries, so a test can keep a
/// handle after giving one to a store.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value.
    pub fn insert(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .lock()
            .map_err(|e| StoreError::Persistence(format!("Lock poisoned: {}", e)))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Read a raw value.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    /// Make subsequent writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl PersistencePort for MemoryBlobStore {
    fn load_blob(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Persistence(format!("Lock poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn save_blob(&mut self, key: &str, value: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence("storage quota exceeded".into()));
        }
        self.insert(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let store = MemoryBlobStore::new();
        let mut writer = store.clone();
        writer.save_blob("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_fail_writes() {
        let mut store = MemoryBlobStore::new();
        store.set_fail_writes(true);
        assert!(store.save_blob("k", "v").is_err());
        assert_eq!(store.load_blob("k").unwrap(), None);
    }
}
