use tracing::{debug, error, info, warn};

use super::{CallbackOutcome, ConnectedWallet, SessionState, WalletService, WalletSession};
use crate::callback::{CallbackEnvelope, WalletReply};
use crate::codec::{decode_base58, decode_base58_array, Address};
use crate::error::{WalletError, WalletResult};
use crate::keys::{EphemeralKeyPair, KEY_SIZE};
use crate::storage::ArtifactKey;
use crate::transport::{InjectedProviders, Transport};
use crate::wallets::{ConnectRequest, WalletKind};

impl WalletService {
    /// Start a connection. Extension wallets answer immediately; deep-link
    /// wallets answer later through `handle_callback`, so this returns `None`.
    pub async fn initiate_connect(&self, wallet: WalletKind) -> WalletResult<Option<ConnectedWallet>> {
        let provider = wallet.provider();
        info!("[session] connecting {}", provider.name);

        if let Transport::Extension(providers) = &self.transport {
            if provider.extension {
                return self.connect_extension(wallet, providers).await.map(Some);
            }
        }

        self.ensure_loaded().await;
        let cluster = self.config.cluster.as_str();
        let redirect = self.config.callback_url();

        if provider.encrypted {
            let keypair = self.obtain_keypair(wallet).await?;
            let dapp_key = keypair.public_key_base58();
            let links = provider.connect_links(&ConnectRequest {
                app_url: &self.config.app_url,
                redirect_link: &redirect,
                cluster,
                dapp_encryption_public_key: Some(&dapp_key),
            })?;
            self.linker
                .open_external_wallet(&links.scheme_url, &links.universal_url, provider.name)
                .await?;
        } else {
            let links = provider.connect_links(&ConnectRequest {
                app_url: &self.config.app_url,
                redirect_link: &redirect,
                cluster,
                dapp_encryption_public_key: None,
            })?;
            self.linker
                .open_external_wallet(&links.scheme_url, &links.universal_url, provider.name)
                .await?;
        }
        Ok(None)
    }

    /// Register the connect waiter, open the wallet, then wait for the answer.
    pub async fn connect_and_wait(&self, wallet: WalletKind) -> WalletResult<ConnectedWallet> {
        let pending = self.requests.connect.register();
        match self.initiate_connect(wallet).await {
            Ok(Some(connected)) => {
                self.requests.connect.resolve(connected);
            }
            Ok(None) => {}
            Err(e) => {
                self.requests.connect.reject(e.clone());
                return Err(e);
            }
        }
        pending.wait().await
    }

    async fn connect_extension(
        &self,
        wallet: WalletKind,
        providers: &InjectedProviders,
    ) -> WalletResult<ConnectedWallet> {
        let name = wallet.name();
        let Some(extension) = providers.find(wallet) else {
            self.linker.open_download_page(wallet).await;
            return Err(WalletError::TransportUnavailable(format!(
                "{name} extension not installed. Please install it and refresh the page."
            )));
        };

        let address = extension.connect().await.map_err(|e| {
            warn!("[session] {} extension connect failed: {}", name, e);
            e.into_wallet_error(
                "Connection rejected by user",
                &format!("Failed to connect to {name} extension"),
            )
        })?;
        let balance = self.ledger.get_balance(&address).await?;
        self.storage.save_wallet_address(&address.to_base58()).await?;
        info!("[session] {} extension connected: {}", name, address);
        Ok(ConnectedWallet {
            public_key: address,
            balance,
        })
    }

    /// Reuse the live or persisted key pair for the same wallet. Switching
    /// wallets, or having none, generates and persists a fresh pair.
    async fn obtain_keypair(&self, wallet: WalletKind) -> WalletResult<EphemeralKeyPair> {
        let (existing, had_session) = match &*self.state.borrow() {
            SessionState::Idle => (None, false),
            SessionState::AwaitingConnect {
                keypair,
                wallet: pending,
            } => (Some((keypair.clone(), *pending)), false),
            SessionState::Established { keypair, session } => {
                (Some((keypair.clone(), session.wallet)), true)
            }
        };

        if had_session || existing.as_ref().is_some_and(|(_, held)| *held != wallet) {
            // a new connect replaces the old session; drop its token and key together
            for key in [ArtifactKey::WalletSession, ArtifactKey::WalletEncryptionKey] {
                if let Err(e) = self.storage.delete(key).await {
                    warn!("[session] failed to drop previous session: {}", e);
                }
            }
        }

        let keypair = match existing {
            Some((keypair, held)) if held == wallet => keypair,
            _ => {
                let keypair = EphemeralKeyPair::generate()?;
                self.storage.persist_keypair(&keypair).await?;
                debug!(
                    "[session] generated key pair {} for {}",
                    keypair.public_key_base58(),
                    wallet
                );
                keypair
            }
        };

        *self.state.borrow_mut() = SessionState::AwaitingConnect {
            keypair: keypair.clone(),
            wallet,
        };
        Ok(keypair)
    }

    /// Dispatch a wallet redirect back into the app.
    pub async fn handle_callback(&self, url: &str) -> WalletResult<CallbackOutcome> {
        self.ensure_loaded().await;

        let envelope = match CallbackEnvelope::parse(url) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("[session] {}", e);
                self.requests.reject_all(e.clone());
                return Err(e);
            }
        };

        match envelope {
            CallbackEnvelope::WalletError { code, message } => {
                let err = WalletError::WalletRejected { code, message };
                warn!("[session] wallet returned an error: {}", err);
                self.requests.reject_all(err.clone());
                Err(err)
            }
            CallbackEnvelope::Encrypted {
                wallet_public_key,
                nonce,
                data,
            } => {
                let pinned = match &*self.state.borrow() {
                    SessionState::Idle => None,
                    SessionState::AwaitingConnect { keypair, .. } => Some((keypair.clone(), None)),
                    SessionState::Established { keypair, session } => {
                        Some((keypair.clone(), Some(session.wallet_public_key)))
                    }
                };
                let Some((keypair, session_key)) = pinned else {
                    warn!("[session] encrypted callback without a key pair, ignoring");
                    return Ok(CallbackOutcome::NoAction);
                };
                let opened = open_reply(&keypair, session_key, &wallet_public_key, &nonce, &data)
                    .and_then(|(reply, wallet_key)| {
                        // before a session exists only the connect reply may introduce a wallet key
                        if session_key.is_none() && !matches!(reply, WalletReply::Connect { .. }) {
                            return Err("reply before the session was established".to_string());
                        }
                        Ok((reply, wallet_key))
                    });
                let (reply, wallet_key) = match opened {
                    Ok(opened) => opened,
                    Err(reason) => {
                        return Err(self.fail_closed(WalletError::DecryptFailure(reason)).await)
                    }
                };
                self.dispatch_reply(keypair, wallet_key, reply).await
            }
            CallbackEnvelope::Plain { public_key } => {
                let connected = self.finish_connect(&public_key).await?;
                self.requests.connect.resolve(connected.clone());
                Ok(CallbackOutcome::Connected(connected))
            }
            CallbackEnvelope::Empty => {
                debug!("[session] callback carried nothing actionable");
                Ok(CallbackOutcome::NoAction)
            }
        }
    }

    async fn dispatch_reply(
        &self,
        keypair: EphemeralKeyPair,
        wallet_key: [u8; KEY_SIZE],
        reply: WalletReply,
    ) -> WalletResult<CallbackOutcome> {
        match reply {
            WalletReply::SignedTransaction(transaction) => {
                let signature = self.complete_signed_transaction(&transaction).await?;
                Ok(CallbackOutcome::PaymentSettled { signature })
            }
            WalletReply::Signature(signature) => {
                self.complete_reported_signature(&signature).await;
                Ok(CallbackOutcome::PaymentSettled { signature })
            }
            WalletReply::Connect {
                public_key,
                session,
            } => {
                if Address::parse(&public_key).is_err() {
                    return Err(self
                        .fail_closed(invalid_public_key(&public_key))
                        .await);
                }
                if let Some(token) = session.filter(|t| !t.is_empty()) {
                    self.establish(keypair, wallet_key, token).await?;
                }
                let connected = self.finish_connect(&public_key).await?;
                self.requests.connect.resolve(connected.clone());
                Ok(CallbackOutcome::Connected(connected))
            }
            WalletReply::Unrecognized => {
                warn!("[session] decrypted payload has no known fields");
                Ok(CallbackOutcome::NoAction)
            }
        }
    }

    /// Persist token and wallet key together, then move to `Established`.
    async fn establish(
        &self,
        keypair: EphemeralKeyPair,
        wallet_key: [u8; KEY_SIZE],
        token: String,
    ) -> WalletResult<()> {
        if let Err(e) = self.storage.persist_wallet_session(&token, &wallet_key).await {
            let err = WalletError::from(e);
            self.requests.connect.reject(err.clone());
            return Err(err);
        }
        let wallet = match &*self.state.borrow() {
            SessionState::AwaitingConnect { wallet, .. } => *wallet,
            SessionState::Established { session, .. } => session.wallet,
            SessionState::Idle => self.config.default_wallet,
        };
        *self.state.borrow_mut() = SessionState::Established {
            keypair,
            session: WalletSession {
                session_token: token,
                wallet_public_key: wallet_key,
                wallet,
            },
        };
        info!("[session] session established with {}", wallet);
        Ok(())
    }

    /// Validate the address, fetch its balance and remember it. Failures
    /// reject the pending connect.
    async fn finish_connect(&self, public_key: &str) -> WalletResult<ConnectedWallet> {
        let result: WalletResult<ConnectedWallet> = async {
            let address = Address::parse(public_key).map_err(|_| invalid_public_key(public_key))?;
            let balance = self.ledger.get_balance(&address).await?;
            self.storage.save_wallet_address(&address.to_base58()).await?;
            Ok(ConnectedWallet {
                public_key: address,
                balance,
            })
        }
        .await;

        match &result {
            Ok(connected) => info!("[session] connected {}", connected.public_key),
            Err(e) => {
                warn!("[session] connect completion failed: {}", e);
                self.requests.connect.reject(e.clone());
            }
        }
        result
    }

    /// Report the remembered wallet, if any.
    pub async fn restore_session(&self) -> WalletResult<Option<ConnectedWallet>> {
        self.ensure_loaded().await;
        let Some(saved) = self.storage.wallet_address().await? else {
            return Ok(None);
        };
        let address = match Address::parse(&saved) {
            Ok(address) => address,
            Err(e) => {
                warn!("[session] stored address is invalid ({}), forgetting it", e);
                if let Err(e) = self.storage.delete(ArtifactKey::WalletAddress).await {
                    warn!("[session] failed to delete stored address: {}", e);
                }
                return Ok(None);
            }
        };
        let balance = self.ledger.get_balance(&address).await?;
        Ok(Some(ConnectedWallet {
            public_key: address,
            balance,
        }))
    }

    /// Tear everything down. Never fails; teardown errors are logged.
    pub async fn disconnect(&self) {
        self.requests.reject_all(WalletError::Disconnected);
        *self.state.borrow_mut() = SessionState::Idle;
        self.in_flight.borrow_mut().take();

        if let Transport::Extension(providers) = &self.transport {
            for provider in providers.iter() {
                if let Err(e) = provider.disconnect().await {
                    debug!("[session] provider disconnect failed: {}", e);
                }
            }
        }

        if let Err(e) = self.storage.clear_session_artifacts().await {
            error!("[session] failed to clear session artifacts: {}", e);
        }
        info!("[session] disconnected");
    }

    /// Remember a manually entered address in canonical form.
    pub async fn save_wallet_address(&self, address: &str) -> WalletResult<Address> {
        if address.trim().is_empty() {
            return Err(WalletError::validation(
                "Invalid wallet address: address cannot be empty",
            ));
        }
        let parsed = Address::parse(address).map_err(|_| invalid_public_key(address))?;
        self.storage.save_wallet_address(&parsed.to_base58()).await?;
        Ok(parsed)
    }

    /// Balance of the remembered address.
    pub async fn refresh_balance(&self) -> WalletResult<Option<f64>> {
        let Some(saved) = self.storage.wallet_address().await? else {
            return Ok(None);
        };
        let address = Address::parse(&saved).map_err(|_| invalid_public_key(&saved))?;
        Ok(Some(self.ledger.get_balance(&address).await?))
    }
}

fn invalid_public_key(value: &str) -> WalletError {
    WalletError::Validation(format!("Invalid Solana public key: {value}"))
}

/// Decode and decrypt an encrypted envelope. Any failure is a reason string.
/// Decrypt a wallet reply. With an established session the box must come from
/// the stored wallet key; the key in the URL is only trusted during connect.
fn open_reply(
    keypair: &EphemeralKeyPair,
    session_key: Option<[u8; KEY_SIZE]>,
    wallet_public_key: &str,
    nonce: &str,
    data: &str,
) -> Result<(WalletReply, [u8; KEY_SIZE]), String> {
    let url_key: [u8; KEY_SIZE] =
        decode_base58_array(wallet_public_key).map_err(|e| format!("wallet key: {e}"))?;
    let wallet_key = match session_key {
        Some(stored) if stored != url_key => {
            return Err("callback wallet key does not match the session".to_string())
        }
        Some(stored) => stored,
        None => url_key,
    };
    let nonce = decode_base58(nonce).map_err(|e| format!("nonce: {e}"))?;
    let data = decode_base58(data).map_err(|e| format!("data: {e}"))?;
    let plaintext = keypair
        .channel_with(&wallet_key)
        .open(&nonce, &data)
        .map_err(|e| e.to_string())?;
    let reply = WalletReply::parse(&plaintext)?;
    Ok((reply, wallet_key))
}
