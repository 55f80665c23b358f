use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use tracing::{debug, info, warn};

use super::{SecureStorage, StorageError};
use crate::codec::{decode_base58_array, encode_base58};
use crate::keys::{EphemeralKeyPair, KEY_SIZE};

/// The logical keys a wallet session persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
    WalletAddress,
    WalletSession,
    WalletEncryptionKey,
    DappPublicKey,
    DappSecretKey,
    LastTxSignature,
}

impl ArtifactKey {
    pub const ALL: [ArtifactKey; 6] = [
        ArtifactKey::WalletAddress,
        ArtifactKey::WalletSession,
        ArtifactKey::WalletEncryptionKey,
        ArtifactKey::DappPublicKey,
        ArtifactKey::DappSecretKey,
        ArtifactKey::LastTxSignature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WalletAddress => "soltix_wallet_address",
            Self::WalletSession => "soltix_wallet_session",
            Self::WalletEncryptionKey => "soltix_phantom_encryption_public_key",
            Self::DappPublicKey => "soltix_dapp_public_key",
            Self::DappSecretKey => "soltix_dapp_secret_key",
            Self::LastTxSignature => "soltix_last_tx_signature",
        }
    }
}

/// Session material reconstructed from storage.
#[derive(Debug, Default)]
pub struct PersistedSession {
    pub keypair: Option<EphemeralKeyPair>,
    /// Session token and wallet encryption key, always together.
    pub wallet: Option<(String, [u8; KEY_SIZE])>,
}

#[derive(Debug, thiserror::Error)]
enum ArtifactError {
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Corrupt(String),
}

enum LoadState {
    NotStarted,
    // settles when the first caller has its result in hand
    InProgress(Shared<oneshot::Receiver<()>>),
    Done,
}

/// Typed access to the six session artifacts over any backend.
pub struct SessionStore {
    backend: Rc<dyn SecureStorage>,
    load: RefCell<LoadState>,
}

impl SessionStore {
    pub fn new(backend: Rc<dyn SecureStorage>) -> Self {
        Self {
            backend,
            load: RefCell::new(LoadState::NotStarted),
        }
    }

    pub fn backend(&self) -> Rc<dyn SecureStorage> {
        self.backend.clone()
    }

    pub async fn get(&self, key: ArtifactKey) -> Result<Option<String>, StorageError> {
        self.backend.get(key.as_str()).await
    }

    pub async fn set(&self, key: ArtifactKey, value: &str) -> Result<(), StorageError> {
        self.backend.set(key.as_str(), value).await
    }

    pub async fn delete(&self, key: ArtifactKey) -> Result<(), StorageError> {
        self.backend.delete(key.as_str()).await
    }

    pub async fn persist_keypair(&self, keypair: &EphemeralKeyPair) -> Result<(), StorageError> {
        self.set(ArtifactKey::DappPublicKey, &keypair.public_key_base58())
            .await?;
        self.set(ArtifactKey::DappSecretKey, &keypair.secret_key_base58())
            .await
    }

    /// Write token and wallet key as a unit; a half-written pair is rolled back.
    pub async fn persist_wallet_session(
        &self,
        session_token: &str,
        wallet_key: &[u8; KEY_SIZE],
    ) -> Result<(), StorageError> {
        self.set(ArtifactKey::WalletSession, session_token).await?;
        if let Err(e) = self
            .set(ArtifactKey::WalletEncryptionKey, &encode_base58(wallet_key))
            .await
        {
            if let Err(rollback) = self.delete(ArtifactKey::WalletSession).await {
                warn!("[storage] failed to roll back session token: {}", rollback);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Delete all six keys. Every key is attempted; the first failure is returned.
    pub async fn clear_session_artifacts(&self) -> Result<(), StorageError> {
        let mut first_err = None;
        for key in ArtifactKey::ALL {
            if let Err(e) = self.delete(key).await {
                warn!("[storage] failed to delete {}: {}", key.as_str(), e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                debug!("[storage] session artifacts cleared");
                Ok(())
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.load.borrow(), LoadState::Done)
    }

    /// Read the persisted key pair and wallet session, once per process.
    ///
    /// Only the first caller gets `Some`. Callers arriving while that read is
    /// still in flight wait for it to finish before getting `None`. Corrupt or
    /// incoherent artifacts are wiped and reported as an empty session.
    pub async fn load_artifacts(&self) -> Option<PersistedSession> {
        loop {
            let pending = match &*self.load.borrow() {
                LoadState::Done => return None,
                LoadState::InProgress(pending) => pending.clone(),
                LoadState::NotStarted => break,
            };
            if pending.clone().await.is_ok() {
                return None;
            }
            // the loading caller was dropped mid-read; let the next one retry
            let mut load = self.load.borrow_mut();
            if matches!(&*load, LoadState::InProgress(current) if current.ptr_eq(&pending)) {
                *load = LoadState::NotStarted;
            }
        }

        let (done, waiters) = oneshot::channel();
        *self.load.borrow_mut() = LoadState::InProgress(waiters.shared());

        let session = match self.read_artifacts().await {
            Ok(session) => {
                info!(
                    "[storage] restored artifacts (keypair: {}, wallet session: {})",
                    session.keypair.is_some(),
                    session.wallet.is_some()
                );
                session
            }
            Err(e) => {
                warn!("[storage] discarding stored session: {}", e);
                if let Err(e) = self.clear_session_artifacts().await {
                    warn!("[storage] failed to clear corrupt artifacts: {}", e);
                }
                PersistedSession::default()
            }
        };

        *self.load.borrow_mut() = LoadState::Done;
        let _ = done.send(());
        Some(session)
    }

    async fn read_artifacts(&self) -> Result<PersistedSession, ArtifactError> {
        let dapp_public = self.get(ArtifactKey::DappPublicKey).await?;
        let dapp_secret = self.get(ArtifactKey::DappSecretKey).await?;
        let token = self.get(ArtifactKey::WalletSession).await?;
        let wallet_key = self.get(ArtifactKey::WalletEncryptionKey).await?;

        let keypair = match (dapp_public, dapp_secret) {
            (Some(public), Some(secret)) => Some(
                EphemeralKeyPair::from_base58_parts(&public, &secret)
                    .map_err(|e| ArtifactError::Corrupt(format!("dapp key pair: {e}")))?,
            ),
            (None, None) => None,
            _ => {
                return Err(ArtifactError::Corrupt(
                    "dapp key pair is missing one half".to_string(),
                ))
            }
        };

        let wallet = match (token, wallet_key) {
            (Some(token), Some(key)) if !token.is_empty() => {
                let key: [u8; KEY_SIZE] = decode_base58_array(&key)
                    .map_err(|e| ArtifactError::Corrupt(format!("wallet encryption key: {e}")))?;
                Some((token, key))
            }
            (None, None) => None,
            _ => {
                return Err(ArtifactError::Corrupt(
                    "session token and wallet key are not stored together".to_string(),
                ))
            }
        };

        if wallet.is_some() && keypair.is_none() {
            return Err(ArtifactError::Corrupt(
                "wallet session without a dapp key pair".to_string(),
            ));
        }

        Ok(PersistedSession { keypair, wallet })
    }

    pub async fn wallet_address(&self) -> Result<Option<String>, StorageError> {
        self.get(ArtifactKey::WalletAddress).await
    }

    pub async fn save_wallet_address(&self, address: &str) -> Result<(), StorageError> {
        self.set(ArtifactKey::WalletAddress, address).await
    }

    pub async fn last_signature(&self) -> Result<Option<String>, StorageError> {
        self.get(ArtifactKey::LastTxSignature).await
    }

    pub async fn save_last_signature(&self, signature: &str) -> Result<(), StorageError> {
        self.set(ArtifactKey::LastTxSignature, signature).await
    }
}
