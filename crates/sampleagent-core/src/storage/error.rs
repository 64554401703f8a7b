use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage quota exceeded writing {key}: {needed} bytes needed, {capacity} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        capacity: usize,
    },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode stored value: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Failed to seal or open stored value: {0}")]
    Crypto(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
