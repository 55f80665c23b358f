use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Promise, Uint8Array};
use soltix_wallet_core::codec::Address;
use soltix_wallet_core::transport::{
    ExtensionProvider, InjectedProviders, ProviderError, ProviderFlags,
};
use soltix_wallet_core::wallets::WalletKind;
use tracing::{debug, info};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::utils::{js_bool, js_get};

#[wasm_bindgen]
extern "C" {
    /// Implemented by the app's JS entry point. It forwards `op` to the
    /// injected provider for `wallet` (`window.phantom.solana`,
    /// `window.solflare`) and turns transaction bytes into the provider's
    /// transaction object.
    #[wasm_bindgen(js_name = callWalletExtension)]
    fn call_wallet_extension(wallet: &str, op: &str, payload: JsValue) -> Promise;
}

/// A wallet extension injected into the page.
pub struct InjectedWallet {
    kind: WalletKind,
    flags: ProviderFlags,
}

impl InjectedWallet {
    fn new(kind: WalletKind) -> Self {
        let flags = ProviderFlags {
            is_phantom: kind == WalletKind::Phantom,
            is_solflare: kind == WalletKind::Solflare,
        };
        Self { kind, flags }
    }

    async fn call(&self, op: &str, payload: JsValue) -> Result<JsValue, ProviderError> {
        let wallet = self.kind.to_string().to_ascii_lowercase();
        JsFuture::from(call_wallet_extension(&wallet, op, payload))
            .await
            .map_err(provider_error)
    }
}

#[async_trait(?Send)]
impl ExtensionProvider for InjectedWallet {
    fn flags(&self) -> ProviderFlags {
        self.flags
    }

    async fn connect(&self) -> Result<Address, ProviderError> {
        let value = self.call("connect", JsValue::NULL).await?;
        let public_key = value
            .as_string()
            .ok_or_else(|| ProviderError::new(None, "connect returned non-string public key"))?;
        Address::parse(&public_key).map_err(|e| ProviderError::new(None, e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.call("disconnect", JsValue::NULL).await.map(|_| ())
    }

    async fn sign_and_send_transaction(&self, transaction: &[u8]) -> Result<String, ProviderError> {
        let payload = Uint8Array::from(transaction);
        let value = self.call("signAndSendTransaction", payload.into()).await?;
        value
            .as_string()
            .ok_or_else(|| ProviderError::new(None, "signAndSendTransaction returned no signature"))
    }
}

/// Look on `window` for Phantom and Solflare.
pub fn detect_injected() -> InjectedProviders {
    let Some(window) = web_sys::window() else {
        return InjectedProviders::default();
    };
    let window: JsValue = window.into();

    let phantom = js_get(&window, "phantom")
        .and_then(|p| js_get(&p, "solana"))
        .filter(|p| js_bool(p, "isPhantom"))
        .or_else(|| js_get(&window, "solana").filter(|p| js_bool(p, "isPhantom")));
    let solflare = js_get(&window, "solflare").filter(|p| js_bool(p, "isSolflare"));

    let mut found: Vec<Rc<dyn ExtensionProvider>> = Vec::new();
    if phantom.is_some() {
        found.push(Rc::new(InjectedWallet::new(WalletKind::Phantom)));
    }
    if solflare.is_some() {
        found.push(Rc::new(InjectedWallet::new(WalletKind::Solflare)));
    }
    info!("[wallet] {} injected provider(s) found", found.len());
    InjectedProviders::new(found)
}

/// Providers reject with `{ code, message }`; anything else is a transport failure.
pub(crate) fn provider_error(value: JsValue) -> ProviderError {
    let code = js_get(&value, "code")
        .and_then(|c| c.as_f64())
        .map(|c| c as i64);
    let message = js_get(&value, "message")
        .and_then(|m| m.as_string())
        .or_else(|| value.as_string())
        .unwrap_or_else(|| format!("{value:?}"));
    debug!("[wallet] provider rejected: code={:?} {}", code, message);
    ProviderError::new(code, message)
}
