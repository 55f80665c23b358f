use std::cell::Cell;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{lamports_to_sol, BlockhashContext, LedgerRpc, RpcError};
use crate::codec::Address;
use crate::timer;

/// Raw HTTP seam: POST a JSON body, return the response body.
#[async_trait(?Send)]
pub trait RpcTransport {
    async fn post(&self, url: &str, body: &str) -> Result<String, RpcError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<String>,
}

/// Solana JSON-RPC 2.0 client.
pub struct JsonRpcClient<T: RpcTransport> {
    endpoint: String,
    transport: T,
    poll_interval: Duration,
    next_id: Cell<u64>,
}

impl<T: RpcTransport> JsonRpcClient<T> {
    pub fn new(endpoint: impl Into<String>, transport: T, poll_interval: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            poll_interval,
            next_id: Cell::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, RpcError> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let body = self
            .transport
            .post(&self.endpoint, &request.to_string())
            .await?;

        let response: RpcResponse = serde_json::from_str(&body)?;
        if let Some(err) = response.error {
            debug!("[rpc] {} failed: {} {}", method, err.code, err.message);
            return Err(RpcError::Remote {
                code: err.code,
                message: err.message,
            });
        }
        let result = response
            .result
            .ok_or_else(|| RpcError::Decode(format!("{method}: missing result")))?;
        Ok(serde_json::from_value(result)?)
    }

    async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>, RpcError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }

    async fn block_height(&self) -> Result<u64, RpcError> {
        self.call("getBlockHeight", json!([{ "commitment": "confirmed" }]))
            .await
    }
}

#[async_trait(?Send)]
impl<T: RpcTransport> LedgerRpc for JsonRpcClient<T> {
    async fn get_balance(&self, address: &Address) -> Result<f64, RpcError> {
        let balance: WithContext<u64> = self
            .call(
                "getBalance",
                json!([address.to_base58(), { "commitment": "confirmed" }]),
            )
            .await?;
        Ok(lamports_to_sol(balance.value))
    }

    async fn latest_blockhash(&self) -> Result<BlockhashContext, RpcError> {
        let latest: WithContext<LatestBlockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": "confirmed" }]))
            .await?;
        Ok(BlockhashContext {
            blockhash: latest.value.blockhash,
            last_valid_block_height: latest.value.last_valid_block_height,
        })
    }

    async fn submit_raw_transaction(&self, transaction: &[u8]) -> Result<String, RpcError> {
        let signature: String = self
            .call(
                "sendTransaction",
                json!([
                    BASE64.encode(transaction),
                    { "encoding": "base64", "preflightCommitment": "confirmed" }
                ]),
            )
            .await?;
        debug!("[rpc] submitted transaction {}", signature);
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        signature: &str,
        context: &BlockhashContext,
    ) -> Result<(), RpcError> {
        loop {
            if let Some(status) = self.signature_status(signature).await? {
                if let Some(err) = status.err {
                    warn!("[rpc] transaction {} failed on chain: {}", signature, err);
                    return Err(RpcError::Failed {
                        signature: signature.to_string(),
                        reason: err.to_string(),
                    });
                }
                if matches!(
                    status.confirmation_status.as_deref(),
                    Some("confirmed") | Some("finalized")
                ) {
                    debug!("[rpc] transaction {} confirmed", signature);
                    return Ok(());
                }
            }

            let height = self.block_height().await?;
            if height > context.last_valid_block_height {
                warn!(
                    "[rpc] blockhash expired at height {} (valid until {})",
                    height, context.last_valid_block_height
                );
                return Err(RpcError::Expired(signature.to_string()));
            }

            timer::sleep(self.poll_interval).await;
        }
    }
}
