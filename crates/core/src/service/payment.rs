use serde_json::json;
use tracing::{error, info, warn};

use super::{PaymentReceipt, WalletService};
use crate::codec::{decode_base58, encode_base58};
use crate::error::{WalletError, WalletResult};
use crate::ledger::{build_transfer, BlockhashContext, TransferIntent};
use crate::storage::ArtifactKey;
use crate::transport::{InjectedProviders, Transport};
use crate::wallets::SignRequest;

impl WalletService {
    /// Pay `amount_sol` from `from` to `to`. Resolves only once the transfer
    /// is confirmed on chain.
    pub async fn send_payment(
        &self,
        from: &str,
        to: &str,
        amount_sol: f64,
    ) -> WalletResult<PaymentReceipt> {
        let intent = TransferIntent::new(from, to, amount_sol)?;
        info!(
            "[payment] {} lamports {} -> {}",
            intent.lamports, intent.from, intent.to
        );
        self.ensure_loaded().await;

        match &self.transport {
            Transport::Extension(providers) => self.pay_with_extension(providers, &intent).await,
            Transport::DeepLink => self.pay_with_deep_link(&intent).await,
        }
    }

    async fn pay_with_extension(
        &self,
        providers: &InjectedProviders,
        intent: &TransferIntent,
    ) -> WalletResult<PaymentReceipt> {
        let Some(signer) = providers.first_signer() else {
            return Err(WalletError::TransportUnavailable(
                "No wallet extension found. Please install Phantom or Solflare.".to_string(),
            ));
        };

        let built = build_transfer(self.ledger.as_ref(), intent).await?;
        let signature = signer
            .sign_and_send_transaction(built.transaction.as_bytes())
            .await
            .map_err(|e| {
                e.into_wallet_error("Transaction rejected by user", "Failed to send transaction")
            })?;

        self.ledger
            .confirm_transaction(&signature, &built.context)
            .await
            .map_err(|e| {
                error!("[payment] {} did not confirm: {}", signature, e);
                WalletError::SubmissionFailed(e.to_string())
            })?;

        self.record_last_signature(&signature).await;
        info!("[payment] confirmed {}", signature);
        Ok(PaymentReceipt {
            signature,
            success: true,
        })
    }

    async fn pay_with_deep_link(&self, intent: &TransferIntent) -> WalletResult<PaymentReceipt> {
        let (keypair, session) = match self.current_session() {
            Some(established) => established,
            None => {
                let wallet = self.config.default_wallet;
                info!("[payment] no wallet session, connecting {} first", wallet);
                if let Err(e) = self.connect_and_wait(wallet).await {
                    warn!("[payment] connect before payment failed: {}", e);
                    return Err(WalletError::SessionExpired);
                }
                self.current_session().ok_or(WalletError::SessionExpired)?
            }
        };

        let provider = session.wallet.provider();
        let built = build_transfer(self.ledger.as_ref(), intent).await?;

        let payload = json!({
            "transaction": encode_base58(built.transaction.as_bytes()),
            "session": session.session_token,
        })
        .to_string();
        let (nonce, sealed) = keypair
            .channel_with(&session.wallet_public_key)
            .seal(payload.as_bytes())?;

        let dapp_key = keypair.public_key_base58();
        let nonce = encode_base58(&nonce);
        let sealed = encode_base58(&sealed);
        let redirect = self.config.callback_url();
        let links = provider.sign_transaction_links(&SignRequest {
            dapp_encryption_public_key: &dapp_key,
            nonce: &nonce,
            redirect_link: &redirect,
            payload: &sealed,
        })?;

        let pending = self.requests.payment.register();
        if let Err(e) = self.storage.delete(ArtifactKey::LastTxSignature).await {
            warn!("[payment] failed to clear last signature: {}", e);
        }
        *self.in_flight.borrow_mut() = Some(built.context.clone());

        if let Err(e) = self
            .linker
            .open_external_wallet(&links.scheme_url, &links.universal_url, provider.name)
            .await
        {
            self.requests.payment.reject(e.clone());
            self.clear_in_flight(&built.context);
            return Err(e);
        }

        let result = pending.wait().await;
        if let Err(e) = &result {
            warn!("[payment] deep-link payment did not settle: {}", e);
            self.clear_in_flight(&built.context);
        }
        result
    }

    /// Submit and confirm a transaction the wallet signed and handed back.
    pub(super) async fn complete_signed_transaction(&self, transaction: &str) -> WalletResult<String> {
        let result: WalletResult<String> = async {
            let bytes = decode_base58(transaction).map_err(|e| {
                WalletError::SubmissionFailed(format!("signed transaction is not base58: {e}"))
            })?;
            let signature = self
                .ledger
                .submit_raw_transaction(&bytes)
                .await
                .map_err(|e| WalletError::SubmissionFailed(e.to_string()))?;

            let remembered = self.in_flight.borrow().clone();
            let context = match remembered {
                Some(context) => context,
                None => self
                    .ledger
                    .latest_blockhash()
                    .await
                    .map_err(|e| WalletError::SubmissionFailed(e.to_string()))?,
            };
            self.ledger
                .confirm_transaction(&signature, &context)
                .await
                .map_err(|e| WalletError::SubmissionFailed(e.to_string()))?;
            Ok(signature)
        }
        .await;

        self.in_flight.borrow_mut().take();
        match result {
            Ok(signature) => {
                self.record_last_signature(&signature).await;
                info!("[payment] confirmed {}", signature);
                self.requests.payment.resolve(PaymentReceipt {
                    signature: signature.clone(),
                    success: true,
                });
                Ok(signature)
            }
            Err(e) => {
                error!("[payment] failed to submit signed transaction: {}", e);
                self.requests.payment.reject(e.clone());
                Err(e)
            }
        }
    }

    /// The wallet already broadcast the transaction and reports its signature.
    pub(super) async fn complete_reported_signature(&self, signature: &str) {
        self.in_flight.borrow_mut().take();
        self.record_last_signature(signature).await;
        self.requests.payment.resolve(PaymentReceipt {
            signature: signature.to_string(),
            success: true,
        });
    }

    // The transfer is on chain by now; a storage failure must not turn it into an error.
    async fn record_last_signature(&self, signature: &str) {
        if let Err(e) = self.storage.save_last_signature(signature).await {
            warn!("[payment] failed to record last signature {}: {}", signature, e);
        }
    }

    fn clear_in_flight(&self, context: &BlockhashContext) {
        let mut in_flight = self.in_flight.borrow_mut();
        if in_flight.as_ref() == Some(context) {
            *in_flight = None;
        }
    }
}
