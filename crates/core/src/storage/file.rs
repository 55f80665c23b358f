use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::sealed::{self, SealingKey};
use super::{SecureStorage, StorageError};

const FILE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// Persistent native backend. Values are sealed individually and the whole
/// map is rewritten through a temp file on every change.
pub struct EncryptedFileStore {
    path: PathBuf,
    key: SealingKey,
    // sealed values, loaded lazily from disk
    entries: RefCell<Option<BTreeMap<String, String>>>,
}

impl EncryptedFileStore {
    pub fn open(path: impl AsRef<Path>, device_key_hex: &str) -> Result<Self, StorageError> {
        Ok(Self::with_key(path, SealingKey::from_hex(device_key_hex)?))
    }

    pub fn with_key(path: impl AsRef<Path>, key: SealingKey) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            key,
            entries: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let file: StoreFile = serde_json::from_str(&raw)?;
        if file.version != FILE_VERSION {
            return Err(StorageError::Encoding(format!(
                "unsupported store version {}",
                file.version
            )));
        }
        debug!(
            "[storage] loaded {} entries from {}",
            file.entries.len(),
            self.path.display()
        );
        Ok(file.entries)
    }

    fn ensure_loaded(&self) -> Result<(), StorageError> {
        if self.entries.borrow().is_some() {
            return Ok(());
        }
        let entries = self.read_file()?;
        *self.entries.borrow_mut() = Some(entries);
        Ok(())
    }

    fn write_file(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = StoreFile {
            version: FILE_VERSION,
            entries: entries.clone(),
        };
        let body = serde_json::to_vec_pretty(&file)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn mutate<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        self.ensure_loaded()?;
        let mut next = self.entries.borrow().clone().unwrap_or_default();
        if !f(&mut next) {
            return Ok(());
        }
        self.write_file(&next)?;
        *self.entries.borrow_mut() = Some(next);
        Ok(())
    }
}

#[async_trait(?Send)]
impl SecureStorage for EncryptedFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.ensure_loaded()?;
        let sealed_value = self
            .entries
            .borrow()
            .as_ref()
            .and_then(|m| m.get(key).cloned());
        let Some(sealed_value) = sealed_value else {
            return Ok(None);
        };
        let plaintext = sealed::open(&self.key, key, &sealed_value).map_err(|e| {
            warn!("[storage] {} failed to open: {}", key, e);
            e
        })?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|e| StorageError::Encoding(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let sealed_value = sealed::seal(&self.key, key, value.as_bytes())?;
        self.mutate(|entries| {
            entries.insert(key.to_string(), sealed_value);
            true
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.mutate(|entries| entries.remove(key).is_some())
    }
}
