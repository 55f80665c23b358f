use async_trait::async_trait;
use gloo_net::http::Request;
use soltix_wallet_core::ledger::{RpcError, RpcTransport};
use tracing::debug;

/// JSON-RPC over the browser `fetch` API.
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchTransport;

#[async_trait(?Send)]
impl RpcTransport for FetchTransport {
    async fn post(&self, url: &str, body: &str) -> Result<String, RpcError> {
        let response = Request::post(url)
            .header("Content-Type", "application/json")
            .body(body)
            .map_err(|e| RpcError::Transport(e.to_string()))?
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !response.ok() {
            return Err(RpcError::Transport(format!(
                "HTTP {} {}",
                response.status(),
                response.status_text()
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        debug!("[rpc] {} bytes from {}", text.len(), url);
        Ok(text)
    }
}
