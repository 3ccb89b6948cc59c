//! Client storage backends for the attempt limiters.
//!
//! A browser is identified by its session cookie. `File` keeps one JSON
//! object per browser under a directory so lockouts survive restarts;
//! `Memory` lives as long as the process.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::application::gate::{ClientStorage, StorageError};

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Memory,
    File { directory: PathBuf },
}

impl StorageBackend {
    pub fn open(&self, browser_id: Uuid) -> Arc<dyn ClientStorage> {
        match self {
            StorageBackend::Memory => Arc::new(MemoryClientStorage::default()),
            StorageBackend::File { directory } => Arc::new(FileClientStorage::new(
                directory.join(format!("{}.json", browser_id.simple())),
            )),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryClientStorage {
    items: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl ClientStorage for MemoryClientStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.lock().await.remove(key);
        Ok(())
    }
}

/// One JSON object per browser. Every write rewrites the file.
#[derive(Debug)]
pub struct FileClientStorage {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileClientStorage {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    async fn read(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(StorageError::corrupt),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(StorageError::io(err)),
        }
    }

    async fn write(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StorageError::io)?;
        }
        let bytes = serde_json::to_vec(items).map_err(StorageError::corrupt)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(StorageError::io)
    }
}

#[async_trait]
impl ClientStorage for FileClientStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.guard.lock().await;
        Ok(self.read().await?.remove(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().await;
        let mut items = self.read().await?;
        items.insert(key.to_string(), value.to_string());
        self.write(&items).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().await;
        let mut items = self.read().await?;
        if items.remove(key).is_some() {
            self.write(&items).await?;
        }
        Ok(())
    }
}
