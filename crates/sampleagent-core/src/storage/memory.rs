use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{KvStore, StorageError};

/// Default quota, matching what browsers typically grant an origin.
pub const DEFAULT_CAPACITY_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, String>,
    read_only: HashSet<String>,
}

impl Inner {
    fn used_bytes(&self) -> usize {
        self.values.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// In-memory store with a byte quota over keys plus values.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY_BYTES)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.lock().map(|inner| inner.used_bytes()).unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .map(|inner| inner.values.contains_key(key))
            .unwrap_or(false)
    }

    /// Make every later write to `key` fail, as a full or locked store would.
    pub fn deny_writes(&self, key: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.read_only.insert(key.to_string());
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if inner.read_only.contains(key) {
            return Err(StorageError::Unavailable(format!("{} is not writable", key)));
        }

        let existing = inner.values.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
        let needed = key.len() + value.len();
        let available = self.capacity.saturating_sub(inner.used_bytes() - existing);
        if needed > available {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                needed,
                capacity: available,
            });
        }

        inner.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.values.remove(key);
        Ok(())
    }
}
