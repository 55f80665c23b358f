//! Wallet session manager.
//!
//! `WalletService` owns the negotiated key pair and wallet session, the
//! pending-request slots and the transport strategy. Session negotiation
//! lives in `session`, payment submission in `payment`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::codec::Address;
use crate::config::WalletConfig;
use crate::correlator::PendingRequests;
use crate::error::WalletError;
use crate::keys::{EphemeralKeyPair, KEY_SIZE};
use crate::ledger::{BlockhashContext, LedgerRpc};
use crate::storage::{SecureStorage, SessionStore};
use crate::transport::{DeepLinker, InjectedProviders, LinkOpener, Transport};
use crate::wallets::WalletKind;

mod payment;
mod session;

#[cfg(test)]
mod tests;

/// Established session with a deep-link wallet.
#[derive(Clone, PartialEq, Eq)]
pub struct WalletSession {
    pub session_token: String,
    pub wallet_public_key: [u8; KEY_SIZE],
    /// The wallet kind is not persisted. A session restored from storage is
    /// attributed to `WalletConfig::default_wallet`, so a session made with
    /// another wallet signs through the default wallet's links after a restart.
    pub wallet: WalletKind,
}

impl fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSession")
            .field("session_token", &"<sensitive>")
            .field("wallet_public_key", &hex::encode(self.wallet_public_key))
            .field("wallet", &self.wallet)
            .finish()
    }
}

#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingConnect {
        keypair: EphemeralKeyPair,
        wallet: WalletKind,
    },
    Established {
        keypair: EphemeralKeyPair,
        session: WalletSession,
    },
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingConnect { .. } => "awaiting-connect",
            SessionState::Established { .. } => "established",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedWallet {
    pub public_key: Address,
    /// SOL
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub signature: String,
    pub success: bool,
}

/// What a handled callback turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Connected(ConnectedWallet),
    PaymentSettled { signature: String },
    NoAction,
}

pub struct WalletService {
    config: WalletConfig,
    storage: SessionStore,
    ledger: Rc<dyn LedgerRpc>,
    transport: Transport,
    linker: DeepLinker,
    requests: PendingRequests,
    state: RefCell<SessionState>,
    // blockhash window of the deep-link payment awaiting its callback
    in_flight: RefCell<Option<BlockhashContext>>,
}

impl WalletService {
    pub fn new(
        config: WalletConfig,
        storage: Rc<dyn SecureStorage>,
        ledger: Rc<dyn LedgerRpc>,
        providers: InjectedProviders,
        opener: Rc<dyn LinkOpener>,
    ) -> Self {
        let requests = PendingRequests::new(config.connect_timeout(), config.payment_timeout());
        let transport = Transport::resolve(config.platform, providers);
        let linker = DeepLinker::new(config.platform, opener);
        Self {
            config,
            storage: SessionStore::new(storage),
            ledger,
            transport,
            linker,
            requests,
            state: RefCell::new(SessionState::Idle),
            in_flight: RefCell::new(None),
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn requests(&self) -> &PendingRequests {
        &self.requests
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn storage(&self) -> &SessionStore {
        &self.storage
    }

    pub fn state_label(&self) -> &'static str {
        self.state.borrow().label()
    }

    pub fn is_established(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Established { .. })
    }

    pub async fn balance_of(&self, address: &Address) -> Result<f64, WalletError> {
        Ok(self.ledger.get_balance(address).await?)
    }

    fn current_session(&self) -> Option<(EphemeralKeyPair, WalletSession)> {
        match &*self.state.borrow() {
            SessionState::Established { keypair, session } => {
                Some((keypair.clone(), session.clone()))
            }
            _ => None,
        }
    }

    /// Pull persisted key material into memory the first time it is needed.
    /// State already built in memory wins over storage.
    async fn ensure_loaded(&self) {
        let Some(persisted) = self.storage.load_artifacts().await else {
            return;
        };
        let mut state = self.state.borrow_mut();
        if !matches!(*state, SessionState::Idle) {
            return;
        }
        let wallet = self.config.default_wallet;
        *state = match (persisted.keypair, persisted.wallet) {
            (Some(keypair), Some((session_token, wallet_public_key))) => {
                SessionState::Established {
                    keypair,
                    session: WalletSession {
                        session_token,
                        wallet_public_key,
                        wallet,
                    },
                }
            }
            (Some(keypair), None) => SessionState::AwaitingConnect { keypair, wallet },
            _ => SessionState::Idle,
        };
        debug!("[session] restored state: {}", state.label());
    }

    /// Drop all session material and fail every pending request with `err`.
    async fn fail_closed(&self, err: WalletError) -> WalletError {
        warn!("[session] failing closed: {}", err);
        *self.state.borrow_mut() = SessionState::Idle;
        self.in_flight.borrow_mut().take();
        self.requests.reject_all(err.clone());
        if let Err(e) = self.storage.clear_session_artifacts().await {
            warn!("[session] failed to clear session artifacts: {}", e);
        }
        err
    }
}
