/*!
Browser bindings for the Soltix wallet core.

`WalletBridge` is what the page talks to. It wires the core service to
`localStorage`, the injected wallet extensions and `fetch`, and hands
snapshots back as plain JS objects.
*/

use std::rc::Rc;

use serde::Serialize;
use soltix_wallet_core::ledger::JsonRpcClient;
use soltix_wallet_core::{Platform, WalletConfig, WalletService, WalletStore};
use tracing::{info, warn};
use wasm_bindgen::prelude::*;

mod fetch;
mod opener;
mod provider;
mod storage;
pub mod telemetry;
mod utils;

pub use fetch::FetchTransport;
pub use opener::WindowOpener;
pub use provider::{detect_injected, InjectedWallet};
pub use storage::BrowserStorage;

use utils::js_err;

#[derive(Serialize)]
struct Receipt {
    signature: String,
    success: bool,
}

#[wasm_bindgen]
pub struct WalletBridge {
    store: WalletStore,
}

#[wasm_bindgen]
impl WalletBridge {
    /// new(config?) where config is a `WalletConfig`-shaped object.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WalletBridge, JsValue> {
        telemetry::init_with_component(tracing::Level::INFO, "wallet");

        let mut config: WalletConfig = if config.is_undefined() || config.is_null() {
            WalletConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(|e| js_err(&e.to_string()))?
        };
        if config.platform != Platform::Web {
            warn!("[bridge] forcing web platform in the browser");
            config.platform = Platform::Web;
        }
        config.validate().map_err(|e| js_err(&e.to_string()))?;

        let storage = Rc::new(BrowserStorage::new());
        let ledger = Rc::new(JsonRpcClient::new(
            config.rpc_endpoint(),
            FetchTransport,
            config.confirm_poll_interval(),
        ));
        info!(
            "[bridge] cluster={} rpc={}",
            config.cluster,
            config.rpc_endpoint()
        );

        let service = WalletService::new(
            config,
            storage,
            ledger,
            detect_injected(),
            Rc::new(WindowOpener),
        );
        Ok(WalletBridge {
            store: WalletStore::new(Rc::new(service)),
        })
    }

    /// Current `{connected, publicKey, balance, connecting, error, wallet, sessionVersion}`.
    #[wasm_bindgen]
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.store.snapshot()).map_err(|e| js_err(&e.to_string()))
    }

    #[wasm_bindgen]
    pub async fn connect(&self, provider: String) -> Result<JsValue, JsValue> {
        self.store.connect(&provider).await;
        self.snapshot()
    }

    #[wasm_bindgen(js_name = "connectWithAddress")]
    pub async fn connect_with_address(&self, address: String) -> Result<JsValue, JsValue> {
        self.store.connect_with_address(&address).await;
        self.snapshot()
    }

    #[wasm_bindgen]
    pub async fn disconnect(&self) -> Result<JsValue, JsValue> {
        self.store.disconnect().await;
        self.snapshot()
    }

    #[wasm_bindgen(js_name = "refreshBalance")]
    pub async fn refresh_balance(&self) -> Result<JsValue, JsValue> {
        self.store.refresh_balance().await;
        self.snapshot()
    }

    #[wasm_bindgen(js_name = "restoreSession")]
    pub async fn restore_session(&self) -> Result<JsValue, JsValue> {
        self.store.restore_session().await;
        self.snapshot()
    }

    #[wasm_bindgen(js_name = "clearError")]
    pub fn clear_error(&self) {
        self.store.clear_error();
    }

    /// Feed a wallet redirect URL (usually `location.href`) back in.
    #[wasm_bindgen(js_name = "handleCallback")]
    pub async fn handle_callback(&self, url: String) -> Result<JsValue, JsValue> {
        self.store
            .handle_callback(&url)
            .await
            .map_err(|e| js_err(&e.to_string()))?;
        self.snapshot()
    }

    /// Resolves with `{signature, success}` once the transfer is confirmed.
    #[wasm_bindgen(js_name = "sendPayment")]
    pub async fn send_payment(
        &self,
        from: String,
        to: String,
        amount_sol: f64,
    ) -> Result<JsValue, JsValue> {
        let receipt = self
            .store
            .service()
            .send_payment(&from, &to, amount_sol)
            .await
            .map_err(|e| js_err(&e.to_string()))?;
        serde_wasm_bindgen::to_value(&Receipt {
            signature: receipt.signature,
            success: receipt.success,
        })
        .map_err(|e| js_err(&e.to_string()))
    }
}
