use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    #[default]
    Phantom,
    Solflare,
    Backpack,
    Glow,
}

/// Static description of a supported wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletProvider {
    pub kind: WalletKind,
    pub name: &'static str,
    pub icon: &'static str,
    pub scheme: &'static str,
    /// `https://` origin of the wallet's universal links.
    pub universal_base: &'static str,
    pub popular: bool,
    /// Speaks the encrypted connect/sign protocol.
    pub encrypted: bool,
    /// Ships a browser extension that injects a provider.
    pub extension: bool,
    pub download_url: Option<&'static str>,
}

pub static WALLET_PROVIDERS: [WalletProvider; 4] = [
    WalletProvider {
        kind: WalletKind::Phantom,
        name: "Phantom",
        icon: "👻",
        scheme: "phantom",
        universal_base: "https://phantom.app",
        popular: true,
        encrypted: true,
        extension: true,
        download_url: Some("https://phantom.app/download"),
    },
    WalletProvider {
        kind: WalletKind::Solflare,
        name: "Solflare",
        icon: "🔥",
        scheme: "solflare",
        universal_base: "https://solflare.com",
        popular: true,
        encrypted: true,
        extension: true,
        download_url: Some("https://solflare.com/download"),
    },
    WalletProvider {
        kind: WalletKind::Backpack,
        name: "Backpack",
        icon: "🎒",
        scheme: "backpack",
        universal_base: "https://backpack.app",
        popular: false,
        encrypted: false,
        extension: false,
        download_url: None,
    },
    WalletProvider {
        kind: WalletKind::Glow,
        name: "Glow",
        icon: "✨",
        scheme: "glow",
        universal_base: "https://glow.app",
        popular: false,
        encrypted: false,
        extension: false,
        download_url: None,
    },
];

impl WalletKind {
    pub const ALL: [WalletKind; 4] = [
        WalletKind::Phantom,
        WalletKind::Solflare,
        WalletKind::Backpack,
        WalletKind::Glow,
    ];

    pub fn provider(&self) -> &'static WalletProvider {
        match self {
            Self::Phantom => &WALLET_PROVIDERS[0],
            Self::Solflare => &WALLET_PROVIDERS[1],
            Self::Backpack => &WALLET_PROVIDERS[2],
            Self::Glow => &WALLET_PROVIDERS[3],
        }
    }

    pub fn name(&self) -> &'static str {
        self.provider().name
    }
}

impl FromStr for WalletKind {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        WalletKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| WalletError::Validation(format!("Unsupported wallet provider: {wanted}")))
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A deep link in both forms: the app scheme and the https universal link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLinkPair {
    pub scheme_url: String,
    pub universal_url: String,
}

#[derive(Debug, Clone)]
pub struct ConnectRequest<'a> {
    pub app_url: &'a str,
    pub redirect_link: &'a str,
    pub cluster: &'a str,
    /// Required for encrypted wallets, ignored by plain redirect wallets.
    pub dapp_encryption_public_key: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct SignRequest<'a> {
    pub dapp_encryption_public_key: &'a str,
    pub nonce: &'a str,
    pub redirect_link: &'a str,
    pub payload: &'a str,
}

fn encode_query(params: &[(&str, &str)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in params {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

impl WalletProvider {
    pub fn connect_links(&self, req: &ConnectRequest<'_>) -> Result<DeepLinkPair, WalletError> {
        let query = if self.encrypted {
            let dapp_key = req.dapp_encryption_public_key.ok_or_else(|| {
                WalletError::validation(format!("{} requires an encryption key", self.name))
            })?;
            encode_query(&[
                ("app_url", req.app_url),
                ("dapp_encryption_public_key", dapp_key),
                ("redirect_link", req.redirect_link),
                ("cluster", req.cluster),
            ])
        } else {
            encode_query(&[
                ("redirect_link", req.redirect_link),
                ("cluster", req.cluster),
                ("app_url", req.app_url),
            ])
        };

        Ok(match self.kind {
            // Glow has no universal connect route; its site is the fallback.
            WalletKind::Glow => DeepLinkPair {
                scheme_url: format!("{}://connect?{}", self.scheme, query),
                universal_url: self.universal_base.to_string(),
            },
            _ => DeepLinkPair {
                scheme_url: format!("{}://ul/v1/connect?{}", self.scheme, query),
                universal_url: format!("{}/ul/v1/connect?{}", self.universal_base, query),
            },
        })
    }

    pub fn sign_transaction_links(&self, req: &SignRequest<'_>) -> Result<DeepLinkPair, WalletError> {
        if !self.encrypted {
            return Err(WalletError::TransportUnavailable(format!(
                "{} cannot sign transactions through deep links",
                self.name
            )));
        }
        let query = encode_query(&[
            ("dapp_encryption_public_key", req.dapp_encryption_public_key),
            ("nonce", req.nonce),
            ("redirect_link", req.redirect_link),
            ("payload", req.payload),
        ]);
        Ok(DeepLinkPair {
            scheme_url: format!("{}://ul/v1/signTransaction?{}", self.scheme, query),
            universal_url: format!("{}/ul/v1/signTransaction?{}", self.universal_base, query),
        })
    }
}
