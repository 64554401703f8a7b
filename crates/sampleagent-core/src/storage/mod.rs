//! Durable key-value storage.
//!
//! The field console persists each slice of its state as a JSON string under
//! a fixed key. `KvStore` is the boundary; three implementations exist:
//!
//! - `MemoryStore`: in-process map with a byte quota, like browser storage
//! - `FileStore`: one `<key>.json` file per key under a directory
//! - `EncryptedStore`: seals values of any other store with ChaCha20-Poly1305

pub mod encrypted;
pub mod error;
pub mod file;
pub mod memory;

use std::sync::Arc;

pub use encrypted::EncryptedStore;
pub use error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;

/// String-keyed durable store with synchronous access.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

