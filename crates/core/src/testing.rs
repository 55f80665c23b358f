// Test doubles shared by the unit and scenario tests.

use std::cell::{Cell, RefCell};

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::codec::{decode_base58, decode_base58_array, encode_base58, Address};
use crate::keys::EphemeralKeyPair;
use crate::ledger::{BlockhashContext, LedgerRpc, RpcError};
use crate::storage::{MemoryStore, SecureStorage, StorageError};
use crate::transport::{ExtensionProvider, LinkOpener, ProviderError, ProviderFlags};

pub const BLOCKHASH_BYTES: [u8; 32] = [42u8; 32];

pub fn address(byte: u8) -> String {
    encode_base58(&[byte; 32])
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

// Mock ledger with call counters and failure switches
#[derive(Default)]
pub struct MockLedger {
    pub balance: Cell<f64>,
    pub calls: Cell<usize>,
    pub submitted: RefCell<Vec<Vec<u8>>>,
    pub confirmed: RefCell<Vec<String>>,
    pub should_fail_balance: Cell<bool>,
    pub should_fail_submit: Cell<bool>,
    pub should_fail_confirm: Cell<bool>,
    /// Suspend once inside `get_balance` so other futures can interleave.
    pub stall_balance: Cell<bool>,
}

impl MockLedger {
    pub fn new(balance: f64) -> Self {
        let ledger = Self::default();
        ledger.balance.set(balance);
        ledger
    }

    fn tick(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

#[async_trait(?Send)]
impl LedgerRpc for MockLedger {
    async fn get_balance(&self, _address: &Address) -> Result<f64, RpcError> {
        self.tick();
        if self.stall_balance.get() {
            tokio::task::yield_now().await;
        }
        if self.should_fail_balance.get() {
            return Err(RpcError::Transport("Mock failure".to_string()));
        }
        Ok(self.balance.get())
    }

    async fn latest_blockhash(&self) -> Result<BlockhashContext, RpcError> {
        self.tick();
        Ok(BlockhashContext {
            blockhash: encode_base58(&BLOCKHASH_BYTES),
            last_valid_block_height: 1_000,
        })
    }

    async fn submit_raw_transaction(&self, transaction: &[u8]) -> Result<String, RpcError> {
        self.tick();
        if self.should_fail_submit.get() {
            return Err(RpcError::Remote {
                code: -32002,
                message: "Transaction simulation failed".to_string(),
            });
        }
        self.submitted.borrow_mut().push(transaction.to_vec());
        Ok(format!("sig-{}", self.submitted.borrow().len()))
    }

    async fn confirm_transaction(
        &self,
        signature: &str,
        _context: &BlockhashContext,
    ) -> Result<(), RpcError> {
        self.tick();
        if self.should_fail_confirm.get() {
            return Err(RpcError::Expired(signature.to_string()));
        }
        self.confirmed.borrow_mut().push(signature.to_string());
        Ok(())
    }
}

// Mock storage implementation for testing
#[derive(Default)]
pub struct MockStorage {
    inner: MemoryStore,
    should_fail: Cell<bool>,
    /// Suspend once inside every `get`, like a backend doing real I/O.
    pub stall_reads: Cell<bool>,
}

impl MockStorage {
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.set(fail);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.should_fail.get() {
            return Err(StorageError::Io("Mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl SecureStorage for MockStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.stall_reads.get() {
            tokio::task::yield_now().await;
        }
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.delete(key).await
    }
}

#[derive(Default)]
pub struct RecordingOpener {
    opened: RefCell<Vec<String>>,
    fail: bool,
}

impl RecordingOpener {
    pub fn failing() -> Self {
        Self {
            opened: RefCell::new(Vec::new()),
            fail: true,
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.borrow().clone()
    }

    /// Yield until at least `count` links were opened, then return the latest.
    pub async fn wait_for(&self, count: usize) -> String {
        loop {
            if let Some(url) = self.opened.borrow().get(count - 1) {
                return url.clone();
            }
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait(?Send)]
impl LinkOpener for RecordingOpener {
    async fn open(&self, url: &str) -> Result<(), String> {
        self.opened.borrow_mut().push(url.to_string());
        if self.fail {
            return Err("no activity found to handle intent".to_string());
        }
        Ok(())
    }
}

pub struct MockProvider {
    flags: ProviderFlags,
    address: Address,
    pub connect_error: RefCell<Option<ProviderError>>,
    pub should_fail_disconnect: Cell<bool>,
    pub disconnects: Cell<usize>,
    pub signed: RefCell<Vec<Vec<u8>>>,
}

impl MockProvider {
    fn with_flags(flags: ProviderFlags, byte: u8) -> Self {
        Self {
            flags,
            address: Address::new([byte; 32]),
            connect_error: RefCell::new(None),
            should_fail_disconnect: Cell::new(false),
            disconnects: Cell::new(0),
            signed: RefCell::new(Vec::new()),
        }
    }

    pub fn phantom() -> Self {
        Self::with_flags(
            ProviderFlags {
                is_phantom: true,
                is_solflare: false,
            },
            11,
        )
    }

    pub fn solflare() -> Self {
        Self::with_flags(
            ProviderFlags {
                is_phantom: false,
                is_solflare: true,
            },
            12,
        )
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait(?Send)]
impl ExtensionProvider for MockProvider {
    fn flags(&self) -> ProviderFlags {
        self.flags
    }

    async fn connect(&self) -> Result<Address, ProviderError> {
        match self.connect_error.borrow().clone() {
            Some(err) => Err(err),
            None => Ok(self.address),
        }
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.disconnects.set(self.disconnects.get() + 1);
        if self.should_fail_disconnect.get() {
            return Err(ProviderError::new(None, "Mock failure"));
        }
        Ok(())
    }

    async fn sign_and_send_transaction(&self, transaction: &[u8]) -> Result<String, ProviderError> {
        self.signed.borrow_mut().push(transaction.to_vec());
        Ok("ext-sig".to_string())
    }
}

/// The wallet app on the other end of the deep links.
pub struct WalletPeer {
    pub keys: EphemeralKeyPair,
}

impl WalletPeer {
    pub fn new() -> Self {
        Self {
            keys: EphemeralKeyPair::generate().unwrap(),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.keys.public_key_bytes()
    }

    /// Redirect URL carrying `payload` boxed for the dapp key `dapp_public`.
    pub fn encrypted_callback(&self, dapp_public: &str, payload: &Value) -> String {
        let dapp: [u8; 32] = decode_base58_array(dapp_public).unwrap();
        let (nonce, data) = self
            .keys
            .channel_with(&dapp)
            .seal(payload.to_string().as_bytes())
            .unwrap();
        format!(
            "soltix://wallet-callback?phantom_encryption_public_key={}&nonce={}&data={}",
            self.keys.public_key_base58(),
            encode_base58(&nonce),
            encode_base58(&data)
        )
    }

    /// Decrypt the payload of a signTransaction link.
    pub fn open_sign_request(&self, url: &str) -> Value {
        let dapp: [u8; 32] =
            decode_base58_array(&query_param(url, "dapp_encryption_public_key").unwrap()).unwrap();
        let nonce = decode_base58(&query_param(url, "nonce").unwrap()).unwrap();
        let payload = decode_base58(&query_param(url, "payload").unwrap()).unwrap();
        let plaintext = self.keys.channel_with(&dapp).open(&nonce, &payload).unwrap();
        serde_json::from_slice(&plaintext).unwrap()
    }
}
