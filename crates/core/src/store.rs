//! UI-facing connection snapshot.
//!
//! `WalletStore` wraps a `WalletService` and keeps the small piece of state a
//! screen renders: whether a wallet is connected, its address and balance,
//! and the last error. Operations never return errors; they land in the
//! snapshot instead.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::codec::Address;
use crate::error::WalletResult;
use crate::service::{CallbackOutcome, ConnectedWallet, WalletService};
use crate::wallets::WalletKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    pub connected: bool,
    pub public_key: Option<String>,
    pub balance: f64,
    pub connecting: bool,
    pub error: Option<String>,
    pub wallet: Option<WalletKind>,
    /// Bumped on every disconnect; in-flight restores compare against it.
    pub session_version: u64,
}

pub struct WalletStore {
    service: Rc<WalletService>,
    snapshot: RefCell<WalletSnapshot>,
}

impl WalletStore {
    pub fn new(service: Rc<WalletService>) -> Self {
        Self {
            service,
            snapshot: RefCell::new(WalletSnapshot::default()),
        }
    }

    pub fn service(&self) -> &Rc<WalletService> {
        &self.service
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        self.snapshot.borrow().clone()
    }

    fn update(&self, f: impl FnOnce(&mut WalletSnapshot)) {
        f(&mut self.snapshot.borrow_mut());
    }

    fn mark_connected(&self, connected: &ConnectedWallet) {
        self.update(|s| {
            s.connected = true;
            s.public_key = Some(connected.public_key.to_base58());
            s.balance = connected.balance;
            s.connecting = false;
        });
    }

    fn fail_connect(&self, message: String) {
        warn!("[store] connect failed: {}", message);
        self.update(|s| {
            s.connecting = false;
            s.wallet = None;
            s.error = Some(message);
        });
    }

    /// Connect by provider name. Encrypted deep-link wallets stay
    /// `connecting` until their callback is applied.
    pub async fn connect(&self, provider: &str) {
        self.update(|s| {
            s.connecting = true;
            s.error = None;
        });
        let kind: WalletKind = match provider.parse() {
            Ok(kind) => kind,
            Err(e) => return self.fail_connect(e.to_string()),
        };
        self.update(|s| s.wallet = Some(kind));

        match self.service.initiate_connect(kind).await {
            Ok(Some(connected)) => self.mark_connected(&connected),
            Ok(None) => {
                if !kind.provider().encrypted {
                    // plain redirects report back only through a bare public key
                    self.update(|s| s.connecting = false);
                }
            }
            Err(e) => self.fail_connect(e.to_string()),
        }
    }

    pub fn apply_callback(&self, outcome: &CallbackOutcome) {
        match outcome {
            CallbackOutcome::Connected(connected) => self.mark_connected(connected),
            CallbackOutcome::PaymentSettled { signature } => {
                debug!("[store] payment settled: {}", signature);
            }
            CallbackOutcome::NoAction => {}
        }
    }

    /// Route a wallet redirect through the service and fold the result in.
    pub async fn handle_callback(&self, url: &str) -> WalletResult<CallbackOutcome> {
        let result = self.service.handle_callback(url).await;
        match &result {
            Ok(outcome) => self.apply_callback(outcome),
            Err(e) => {
                if self.snapshot.borrow().connecting {
                    self.fail_connect(e.to_string());
                } else {
                    self.update(|s| s.error = Some(e.to_string()));
                }
            }
        }
        result
    }

    /// Watch-only connection to a manually entered address.
    pub async fn connect_with_address(&self, address: &str) {
        self.update(|s| {
            s.connecting = true;
            s.error = None;
        });

        let result: WalletResult<ConnectedWallet> = async {
            let parsed = self.service.save_wallet_address(address).await?;
            let balance = self.service.balance_of(&parsed).await?;
            Ok(ConnectedWallet {
                public_key: parsed,
                balance,
            })
        }
        .await;

        match result {
            Ok(connected) => self.mark_connected(&connected),
            Err(e) => self.update(|s| {
                s.connecting = false;
                s.error = Some(e.to_string());
            }),
        }
    }

    /// Clear the snapshot first, then tear the service down.
    pub async fn disconnect(&self) {
        self.update(|s| {
            let session_version = s.session_version + 1;
            *s = WalletSnapshot {
                session_version,
                ..WalletSnapshot::default()
            };
        });
        self.service.disconnect().await;
        info!("[store] disconnected");
    }

    pub async fn refresh_balance(&self) {
        let Some(public_key) = self.snapshot.borrow().public_key.clone() else {
            return;
        };
        let address = match Address::parse(&public_key) {
            Ok(address) => address,
            Err(e) => {
                error!("[store] snapshot holds an invalid address: {}", e);
                return;
            }
        };
        match self.service.balance_of(&address).await {
            Ok(balance) => self.set_balance(balance),
            Err(e) => error!("[store] failed to refresh balance: {}", e),
        }
    }

    pub fn set_balance(&self, balance: f64) {
        self.update(|s| s.balance = balance);
    }

    /// Restore the remembered wallet unless a disconnect happened meanwhile.
    pub async fn restore_session(&self) {
        let version_at_start = self.snapshot.borrow().session_version;
        let restored = self.service.restore_session().await;
        if self.snapshot.borrow().session_version != version_at_start {
            debug!("[store] session changed during restore, discarding result");
            return;
        }
        match restored {
            Ok(Some(connected)) => self.mark_connected(&connected),
            Ok(None) => {}
            Err(e) => error!("[store] failed to restore wallet session: {}", e),
        }
    }

    pub fn clear_error(&self) {
        self.update(|s| s.error = None);
    }
}
