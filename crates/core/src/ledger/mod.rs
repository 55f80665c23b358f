//! Chain-facing collaborators: balance lookups, blockhash windows, raw
//! transaction submission and confirmation.

use async_trait::async_trait;

use crate::codec::Address;

pub mod json_rpc;
pub mod transfer;

pub use json_rpc::{JsonRpcClient, RpcTransport};
pub use transfer::{build_transfer, BuiltTransfer, TransferIntent, UnsignedTransfer};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("rpc error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("rpc transport: {0}")]
    Transport(String),

    #[error("rpc response decode: {0}")]
    Decode(String),

    #[error("transaction {0} expired before confirmation")]
    Expired(String),

    #[error("transaction {signature} failed: {reason}")]
    Failed { signature: String, reason: String },
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Decode(e.to_string())
    }
}

/// Recent blockhash plus the last block height at which it is still valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockhashContext {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

#[async_trait(?Send)]
pub trait LedgerRpc {
    /// Balance in SOL.
    async fn get_balance(&self, address: &Address) -> Result<f64, RpcError>;

    async fn latest_blockhash(&self) -> Result<BlockhashContext, RpcError>;

    /// Submit a fully signed transaction, returning its signature.
    async fn submit_raw_transaction(&self, transaction: &[u8]) -> Result<String, RpcError>;

    /// Resolve once the signature is confirmed within the blockhash window.
    async fn confirm_transaction(
        &self,
        signature: &str,
        context: &BlockhashContext,
    ) -> Result<(), RpcError>;
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
