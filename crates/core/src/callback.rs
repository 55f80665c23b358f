use serde_json::Value;
use url::Url;

use crate::error::WalletError;

/// What a wallet put in the query of its redirect back to the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEnvelope {
    WalletError {
        code: String,
        message: Option<String>,
    },
    Encrypted {
        wallet_public_key: String,
        nonce: String,
        data: String,
    },
    Plain {
        public_key: String,
    },
    Empty,
}

impl CallbackEnvelope {
    pub fn parse(raw: &str) -> Result<Self, WalletError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| WalletError::InvalidCallback(format!("{e}: {raw}")))?;
        Ok(Self::from_url(&url))
    }

    pub fn from_url(url: &Url) -> Self {
        let mut error_code = None;
        let mut error_message = None;
        let mut wallet_key = None;
        let mut nonce = None;
        let mut data = None;
        let mut public_key = None;

        for (k, v) in url.query_pairs() {
            if v.is_empty() {
                continue;
            }
            let slot = match k.as_ref() {
                "errorCode" => &mut error_code,
                "errorMessage" => &mut error_message,
                "phantom_encryption_public_key" => &mut wallet_key,
                "nonce" => &mut nonce,
                "data" => &mut data,
                "public_key" => &mut public_key,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(v.into_owned());
            }
        }

        if let Some(code) = error_code {
            return CallbackEnvelope::WalletError {
                code,
                message: error_message,
            };
        }
        if let (Some(wallet_public_key), Some(nonce), Some(data)) = (wallet_key, nonce, data) {
            return CallbackEnvelope::Encrypted {
                wallet_public_key,
                nonce,
                data,
            };
        }
        match public_key {
            Some(public_key) => CallbackEnvelope::Plain { public_key },
            None => CallbackEnvelope::Empty,
        }
    }
}

/// Decrypted payload, classified by field presence in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletReply {
    SignedTransaction(String),
    Signature(String),
    Connect {
        public_key: String,
        session: Option<String>,
    },
    Unrecognized,
}

impl WalletReply {
    /// Parse decrypted bytes. Non-UTF-8 or non-JSON input is an error.
    pub fn parse(plaintext: &[u8]) -> Result<Self, String> {
        let text = std::str::from_utf8(plaintext).map_err(|e| format!("payload is not utf-8: {e}"))?;
        let value: Value =
            serde_json::from_str(text).map_err(|e| format!("payload is not json: {e}"))?;
        Ok(Self::from_json(&value))
    }

    pub fn from_json(value: &Value) -> Self {
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);

        if let Some(tx) = field("transaction") {
            return WalletReply::SignedTransaction(tx);
        }
        if let Some(signature) = field("signature") {
            return WalletReply::Signature(signature);
        }
        match field("public_key") {
            Some(public_key) if !public_key.is_empty() => WalletReply::Connect {
                public_key,
                session: field("session"),
            },
            _ => WalletReply::Unrecognized,
        }
    }
}
