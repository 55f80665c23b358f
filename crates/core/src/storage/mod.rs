/*!
Secure key/value storage

- `SecureStorage`      : async get/set/delete seam, one implementation per platform
- `MemoryStore`        : process-local map (ephemeral sessions, tests)
- `EncryptedFileStore` : persistent native backend, every value sealed at rest
- `SessionStore`       : the six wallet session artifacts on top of any backend

The browser backend (`localStorage`) lives in the web crate and plugs in through
the same trait.
*/

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::config::StorageConfig;

pub mod file;
pub mod sealed;
pub mod session;

pub use file::EncryptedFileStore;
pub use session::{ArtifactKey, PersistedSession, SessionStore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage io: {0}")]
    Io(String),

    #[error("stored value failed integrity check: {0}")]
    Integrity(String),

    #[error("storage encoding: {0}")]
    Encoding(String),

    #[error("invalid device key: {0}")]
    InvalidKey(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Encoding(e.to_string())
    }
}

#[async_trait(?Send)]
pub trait SecureStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RefCell<FxHashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[async_trait(?Send)]
impl SecureStorage for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Pick the native backend: sealed file storage when a path and device key are
/// configured, otherwise a process-local map.
pub fn open_secure_storage(cfg: &StorageConfig) -> Result<Rc<dyn SecureStorage>, StorageError> {
    match (&cfg.path, &cfg.device_key_hex) {
        (Some(path), Some(key_hex)) => {
            let store = EncryptedFileStore::open(path, key_hex)?;
            info!("[storage] using encrypted file store at {}", path.display());
            Ok(Rc::new(store))
        }
        (Some(path), None) => {
            warn!(
                "[storage] no device key configured, ignoring {} and keeping secrets in memory",
                path.display()
            );
            Ok(Rc::new(MemoryStore::new()))
        }
        _ => {
            info!("[storage] using in-memory store");
            Ok(Rc::new(MemoryStore::new()))
        }
    }
}
