use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("client storage i/o failed: {message}")]
    Io { message: String },
    #[error("client storage is corrupt: {message}")]
    Corrupt { message: String },
}

impl StorageError {
    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }

    pub fn corrupt(err: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            message: err.to_string(),
        }
    }
}

/// Per-browser string key/value store the attempt limiters persist into.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}
