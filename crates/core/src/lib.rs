#![allow(clippy::needless_return)]

/*!
Soltix wallet core

Everything needed to talk to an external, non-custodial Solana wallet:
- `codec` / `keys` / `entropy` : base58, on-chain addresses, X25519 session keys, NaCl box
- `storage`                    : secure key/value backends and the session artifact store
- `transport` / `wallets`      : extension vs deep-link strategy and the wallet catalog
- `correlator`                 : single-slot pending request registry (connect, payment)
- `callback`                   : deep-link callback envelope and decrypted reply parsing
- `ledger`                     : RPC collaborator, JSON-RPC client, transfer builder
- `service`                    : session negotiation and payment submission state machine
- `store`                      : UI-facing connection snapshot

The crate is single-threaded by construction (`Rc`, `RefCell`) and never spawns
tasks; callers drive the futures from their own event loop.
*/

pub mod callback;
pub mod codec;
pub mod config;
pub mod correlator;
pub mod entropy;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod service;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod wallets;

mod timer;

#[cfg(test)]
mod testing;

pub use callback::{CallbackEnvelope, WalletReply};
pub use codec::{Address, CodecError};
pub use config::{Cluster, WalletConfig};
pub use correlator::{PendingRequest, PendingRequests, PendingSlot, RequestKind};
pub use error::{WalletError, WalletResult};
pub use keys::{EphemeralKeyPair, SharedChannel};
pub use ledger::{BlockhashContext, LedgerRpc, TransferIntent};
pub use service::{
    CallbackOutcome, ConnectedWallet, PaymentReceipt, SessionState, WalletService, WalletSession,
};
pub use storage::{SecureStorage, SessionStore, StorageError};
pub use store::{WalletSnapshot, WalletStore};
pub use transport::{DeepLinker, ExtensionProvider, LinkOpener, Platform, Transport};
pub use wallets::{WalletKind, WalletProvider};
