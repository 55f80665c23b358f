use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::correlator::{CONNECT_TIMEOUT, PAYMENT_TIMEOUT};
use crate::error::{WalletError, WalletResult};
use crate::transport::Platform;
use crate::wallets::WalletKind;

const DEFAULT_APP_URL: &str = "https://soltix.app";
const DEFAULT_APP_SCHEME: &str = "soltix";
const DEFAULT_CONFIRM_POLL_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Cluster {
    #[default]
    #[serde(rename = "devnet")]
    Devnet,
    #[serde(rename = "testnet")]
    Testnet,
    #[serde(rename = "mainnet-beta", alias = "mainnet")]
    MainnetBeta,
}

impl Cluster {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
            Self::MainnetBeta => "mainnet-beta",
        }
    }

    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Testnet => "https://api.testnet.solana.com",
            Self::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }
}

impl FromStr for Cluster {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            "mainnet" | "mainnet-beta" => Ok(Self::MainnetBeta),
            other => Err(WalletError::Config(format!("unknown cluster: {other}"))),
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// 32-byte device key, hex encoded.
    #[serde(default, rename = "deviceKey")]
    pub device_key_hex: Option<String>,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("path", &self.path)
            .field(
                "device_key_hex",
                &self.device_key_hex.as_ref().map(|_| "<sensitive>"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConfig {
    #[serde(default)]
    pub cluster: Cluster,

    #[serde(default)]
    pub rpc_url: Option<String>,

    #[serde(default = "default_app_url")]
    pub app_url: String,

    #[serde(default = "default_app_scheme")]
    pub app_scheme: String,

    #[serde(default)]
    pub platform: Platform,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_payment_timeout_secs")]
    pub payment_timeout_secs: u64,

    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,

    /// Wallet used when a payment needs a fresh deep-link session.
    #[serde(default)]
    pub default_wallet: WalletKind,

    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_app_url() -> String {
    DEFAULT_APP_URL.to_string()
}

fn default_app_scheme() -> String {
    DEFAULT_APP_SCHEME.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    CONNECT_TIMEOUT.as_secs()
}

fn default_payment_timeout_secs() -> u64 {
    PAYMENT_TIMEOUT.as_secs()
}

fn default_confirm_poll_ms() -> u64 {
    DEFAULT_CONFIRM_POLL_MS
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            cluster: Cluster::default(),
            rpc_url: None,
            app_url: default_app_url(),
            app_scheme: default_app_scheme(),
            platform: Platform::default(),
            connect_timeout_secs: default_connect_timeout_secs(),
            payment_timeout_secs: default_payment_timeout_secs(),
            confirm_poll_ms: default_confirm_poll_ms(),
            default_wallet: WalletKind::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl WalletConfig {
    pub fn from_json(raw: &str) -> WalletResult<Self> {
        let cfg: Self =
            serde_json::from_str(raw).map_err(|e| WalletError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - SOLTIX_NETWORK (devnet | testnet | mainnet-beta)
    /// - SOLTIX_APP_URL
    /// - SOLTIX_APP_SCHEME
    /// - SOLTIX_RPC_URL
    /// - SOLTIX_STORAGE_PATH
    /// - SOLTIX_STORAGE_KEY (hex device key)
    pub fn from_env() -> WalletResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> WalletResult<Self> {
        let mut cfg = Self::default();
        if let Some(network) = get("SOLTIX_NETWORK") {
            cfg.cluster = network.parse()?;
        }
        if let Some(app_url) = get("SOLTIX_APP_URL") {
            cfg.app_url = app_url.trim().to_string();
        }
        if let Some(scheme) = get("SOLTIX_APP_SCHEME") {
            cfg.app_scheme = scheme.trim().to_string();
        }
        cfg.rpc_url = get("SOLTIX_RPC_URL").filter(|s| !s.trim().is_empty());
        cfg.storage.path = get("SOLTIX_STORAGE_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        cfg.storage.device_key_hex = get("SOLTIX_STORAGE_KEY").filter(|s| !s.trim().is_empty());

        cfg.validate()?;
        debug!("[config] loaded from environment: {:?}", cfg);
        Ok(cfg)
    }

    pub fn validate(&self) -> WalletResult<()> {
        let app_url = url::Url::parse(&self.app_url)
            .map_err(|e| WalletError::Config(format!("app_url: {e}")))?;
        if !matches!(app_url.scheme(), "https" | "http") {
            return Err(WalletError::Config(format!(
                "app_url must be http(s): {}",
                self.app_url
            )));
        }
        let scheme_ok = self
            .app_scheme
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic())
            .unwrap_or(false)
            && self
                .app_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(WalletError::Config(format!(
                "invalid app scheme: {:?}",
                self.app_scheme
            )));
        }
        if self.connect_timeout_secs == 0 || self.payment_timeout_secs == 0 {
            return Err(WalletError::Config("timeouts must be non-zero".to_string()));
        }
        if !self.default_wallet.provider().encrypted {
            return Err(WalletError::Config(format!(
                "default wallet {} cannot sign through deep links",
                self.default_wallet
            )));
        }
        Ok(())
    }

    pub fn rpc_endpoint(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.cluster.default_rpc_url())
    }

    /// Redirect target wallets return to, e.g. `soltix://wallet-callback`.
    pub fn callback_url(&self) -> String {
        format!("{}://wallet-callback", self.app_scheme)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_secs)
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_ms)
    }
}
