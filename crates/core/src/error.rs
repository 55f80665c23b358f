use crate::codec::CodecError;
use crate::correlator::RequestKind;
use crate::keys::KeyError;
use crate::ledger::RpcError;
use crate::storage::StorageError;

/// Errors surfaced to callers of the wallet service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WalletError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    TransportUnavailable(String),

    #[error("wallet callback decryption failed: {0}")]
    DecryptFailure(String),

    #[error("Wallet error: {code}{}", .message.as_ref().map(|m| format!(" - {m}")).unwrap_or_default())]
    WalletRejected {
        code: String,
        message: Option<String>,
    },

    #[error("{} timed out. Please try again.", .0.label())]
    Timeout(RequestKind),

    #[error("{} superseded by a new request", .0.label())]
    Superseded(RequestKind),

    #[error("{} abandoned before it settled", .0.label())]
    Cancelled(RequestKind),

    #[error("failed to submit signed transaction: {0}")]
    SubmissionFailed(String),

    #[error("Wallet session expired. Please reconnect and try again.")]
    SessionExpired,

    #[error("Wallet disconnected")]
    Disconnected,

    #[error("invalid wallet callback: {0}")]
    InvalidCallback(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("rpc: {0}")]
    Rpc(#[from] RpcError),

    #[error("encoding: {0}")]
    Codec(#[from] CodecError),

    #[error("key material: {0}")]
    Key(#[from] KeyError),
}

impl WalletError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// User-initiated cancellation on the wallet side.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::WalletRejected { code, .. } if code == "4001")
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;
