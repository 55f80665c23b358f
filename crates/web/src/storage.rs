use async_trait::async_trait;
use soltix_wallet_core::storage::{SecureStorage, StorageError};
use tracing::warn;
use wasm_bindgen::JsValue;

/// `window.localStorage` backend. Without one (private mode, workers) every
/// read is empty and every write is dropped.
pub struct BrowserStorage {
    inner: Option<web_sys::Storage>,
}

impl BrowserStorage {
    pub fn new() -> Self {
        let inner = web_sys::window().and_then(|w| w.local_storage().ok().flatten());
        if inner.is_none() {
            warn!("[storage] localStorage unavailable, session will not persist");
        }
        Self { inner }
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for BrowserStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn io_error(op: &str, key: &str, err: JsValue) -> StorageError {
    StorageError::Io(format!("localStorage {op} {key}: {err:?}"))
}

#[async_trait(?Send)]
impl SecureStorage for BrowserStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match &self.inner {
            Some(storage) => storage.get_item(key).map_err(|e| io_error("get", key, e)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        match &self.inner {
            Some(storage) => storage
                .set_item(key, value)
                .map_err(|e| io_error("set", key, e)),
            None => Ok(()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match &self.inner {
            Some(storage) => storage
                .remove_item(key)
                .map_err(|e| io_error("delete", key, e)),
            None => Ok(()),
        }
    }
}
