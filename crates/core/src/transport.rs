//! How requests reach the wallet: an injected browser extension or an OS
//! deep link. The strategy is chosen once from the platform at startup.

use std::rc::Rc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::codec::Address;
use crate::error::{WalletError, WalletResult};
use crate::wallets::WalletKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    #[default]
    Native,
}

/// Error raised by an injected provider. Code 4001 is a user rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub const USER_REJECTED: i64 = 4001;

    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == Some(Self::USER_REJECTED)
    }

    /// Map to the caller-facing error; `rejected` is the text for a 4001.
    pub fn into_wallet_error(self, rejected: &str, context: &str) -> WalletError {
        match self.code {
            Some(Self::USER_REJECTED) => WalletError::WalletRejected {
                code: Self::USER_REJECTED.to_string(),
                message: Some(rejected.to_string()),
            },
            Some(code) => WalletError::WalletRejected {
                code: code.to_string(),
                message: Some(self.message),
            },
            None => WalletError::TransportUnavailable(format!("{context}: {}", self.message)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderFlags {
    pub is_phantom: bool,
    pub is_solflare: bool,
}

/// A wallet provider injected into the page by a browser extension.
#[async_trait(?Send)]
pub trait ExtensionProvider {
    fn flags(&self) -> ProviderFlags;
    async fn connect(&self) -> Result<Address, ProviderError>;
    async fn disconnect(&self) -> Result<(), ProviderError>;
    /// Sign and broadcast, returning the transaction signature.
    async fn sign_and_send_transaction(&self, transaction: &[u8]) -> Result<String, ProviderError>;
}

#[derive(Clone, Default)]
pub struct InjectedProviders {
    providers: Vec<Rc<dyn ExtensionProvider>>,
}

impl InjectedProviders {
    pub fn new(providers: Vec<Rc<dyn ExtensionProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn ExtensionProvider>> {
        self.providers.iter()
    }

    pub fn find(&self, kind: WalletKind) -> Option<Rc<dyn ExtensionProvider>> {
        self.providers
            .iter()
            .find(|p| {
                let flags = p.flags();
                match kind {
                    WalletKind::Phantom => flags.is_phantom,
                    WalletKind::Solflare => flags.is_solflare,
                    WalletKind::Backpack | WalletKind::Glow => false,
                }
            })
            .cloned()
    }

    /// Provider used for payments: Phantom first, then Solflare.
    pub fn first_signer(&self) -> Option<Rc<dyn ExtensionProvider>> {
        self.find(WalletKind::Phantom)
            .or_else(|| self.find(WalletKind::Solflare))
    }
}

pub enum Transport {
    Extension(InjectedProviders),
    DeepLink,
}

impl Transport {
    pub fn resolve(platform: Platform, providers: InjectedProviders) -> Self {
        match platform {
            Platform::Web => {
                info!(
                    "[wallet] extension transport ({} providers)",
                    providers.iter().count()
                );
                Transport::Extension(providers)
            }
            Platform::Native => {
                info!("[wallet] deep-link transport");
                Transport::DeepLink
            }
        }
    }

    pub fn is_extension(&self) -> bool {
        matches!(self, Transport::Extension(_))
    }
}

/// Hands a URL to the OS or the browser.
#[async_trait(?Send)]
pub trait LinkOpener {
    async fn open(&self, url: &str) -> Result<(), String>;
}

pub struct DeepLinker {
    platform: Platform,
    opener: Rc<dyn LinkOpener>,
}

impl DeepLinker {
    pub fn new(platform: Platform, opener: Rc<dyn LinkOpener>) -> Self {
        Self { platform, opener }
    }

    /// Web opens the universal link; native opens the wallet's own scheme and
    /// fails if the app cannot take it.
    pub async fn open_external_wallet(
        &self,
        scheme_url: &str,
        universal_url: &str,
        wallet_name: &str,
    ) -> WalletResult<()> {
        match self.platform {
            Platform::Web => {
                debug!("[wallet] opening {} universal link", wallet_name);
                self.opener.open(universal_url).await.map_err(|e| {
                    WalletError::TransportUnavailable(format!("failed to open {wallet_name}: {e}"))
                })
            }
            Platform::Native => {
                debug!("[wallet] opening {} app link", wallet_name);
                self.opener.open(scheme_url).await.map_err(|e| {
                    warn!("[wallet] {} link failed: {}", wallet_name, e);
                    WalletError::TransportUnavailable(format!(
                        "{wallet_name} app is not installed or cannot be opened on this device."
                    ))
                })
            }
        }
    }

    /// Best effort, used when an extension is missing.
    pub async fn open_download_page(&self, kind: WalletKind) {
        if let Some(url) = kind.provider().download_url {
            if let Err(e) = self.opener.open(url).await {
                warn!("[wallet] failed to open {} download page: {}", kind, e);
            }
        }
    }
}
