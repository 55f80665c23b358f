use tracing::debug;

use super::{BlockhashContext, LedgerRpc, RpcError, LAMPORTS_PER_SOL};
use crate::codec::{decode_base58_array, Address, ADDRESS_LEN};
use crate::error::{WalletError, WalletResult};

const SYSTEM_PROGRAM: [u8; ADDRESS_LEN] = [0u8; ADDRESS_LEN];
const SYSTEM_TRANSFER: u32 = 2;
const SIGNATURE_LEN: usize = 64;

/// A validated SOL transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub from: Address,
    pub to: Address,
    pub lamports: u64,
}

impl TransferIntent {
    /// Validate user input. Nothing touches the network before this succeeds.
    pub fn new(from: &str, to: &str, amount_sol: f64) -> WalletResult<Self> {
        if from.trim().is_empty() {
            return Err(WalletError::validation("Invalid sender wallet address"));
        }
        if to.trim().is_empty() {
            return Err(WalletError::validation("Invalid recipient wallet address"));
        }
        if !amount_sol.is_finite() || amount_sol <= 0.0 {
            return Err(WalletError::validation(
                "Invalid payment amount: must be a positive number",
            ));
        }

        let from_addr = Address::parse(from)
            .map_err(|_| WalletError::Validation(format!("Invalid sender address: \"{from}\"")))?;
        let to_addr = Address::parse(to)
            .map_err(|_| WalletError::Validation(format!("Invalid recipient address: \"{to}\"")))?;
        if from_addr == to_addr {
            return Err(WalletError::validation(
                "Sender and recipient wallets cannot be the same.",
            ));
        }

        let lamports = (amount_sol * LAMPORTS_PER_SOL as f64).round();
        if lamports < 1.0 {
            return Err(WalletError::validation(
                "Invalid payment amount: must be at least one lamport",
            ));
        }
        if lamports >= u64::MAX as f64 {
            return Err(WalletError::validation("Invalid payment amount: too large"));
        }

        Ok(Self {
            from: from_addr,
            to: to_addr,
            lamports: lamports as u64,
        })
    }
}

/// Legacy-format transfer message with an empty fee-payer signature slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransfer {
    bytes: Vec<u8>,
}

impl UnsignedTransfer {
    pub fn compose(intent: &TransferIntent, blockhash: &[u8; 32]) -> Self {
        let mut bytes = Vec::with_capacity(1 + SIGNATURE_LEN + 3 + 1 + 3 * ADDRESS_LEN + 32 + 20);

        // signatures
        push_compact_u16(&mut bytes, 1);
        bytes.extend_from_slice(&[0u8; SIGNATURE_LEN]);

        // header: required signers, readonly signed, readonly unsigned
        bytes.extend_from_slice(&[1, 0, 1]);

        push_compact_u16(&mut bytes, 3);
        bytes.extend_from_slice(intent.from.as_bytes());
        bytes.extend_from_slice(intent.to.as_bytes());
        bytes.extend_from_slice(&SYSTEM_PROGRAM);

        bytes.extend_from_slice(blockhash);

        push_compact_u16(&mut bytes, 1);
        bytes.push(2);
        push_compact_u16(&mut bytes, 2);
        bytes.extend_from_slice(&[0, 1]);
        let mut data = Vec::with_capacity(12);
        data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
        data.extend_from_slice(&intent.lamports.to_le_bytes());
        push_compact_u16(&mut bytes, data.len() as u16);
        bytes.extend_from_slice(&data);

        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

fn push_compact_u16(out: &mut Vec<u8>, mut value: u16) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

#[derive(Debug, Clone)]
pub struct BuiltTransfer {
    pub transaction: UnsignedTransfer,
    pub context: BlockhashContext,
}

pub async fn build_transfer(
    ledger: &dyn LedgerRpc,
    intent: &TransferIntent,
) -> WalletResult<BuiltTransfer> {
    let context = ledger.latest_blockhash().await?;
    let blockhash: [u8; 32] = decode_base58_array(&context.blockhash)
        .map_err(|e| RpcError::Decode(format!("blockhash: {e}")))?;
    debug!(
        "[payment] built transfer of {} lamports, valid until block {}",
        intent.lamports, context.last_valid_block_height
    );
    Ok(BuiltTransfer {
        transaction: UnsignedTransfer::compose(intent, &blockhash),
        context,
    })
}
