use std::rc::Rc;

use futures::join;
use serde_json::json;

use super::*;
use crate::codec::{decode_base58, encode_base58};
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::keys::EphemeralKeyPair;
use crate::storage::ArtifactKey;
use crate::testing::{
    address, query_param, MockLedger, MockProvider, MockStorage, RecordingOpener, WalletPeer,
    BLOCKHASH_BYTES,
};
use crate::transport::{ExtensionProvider, InjectedProviders, Platform, ProviderError};
use crate::wallets::WalletKind;

struct Harness {
    service: WalletService,
    storage: Rc<MockStorage>,
    ledger: Rc<MockLedger>,
    opener: Rc<RecordingOpener>,
    wallet: WalletPeer,
}

impl Harness {
    fn build(
        platform: Platform,
        providers: Vec<Rc<dyn ExtensionProvider>>,
        opener: RecordingOpener,
    ) -> Self {
        let config = WalletConfig {
            platform,
            ..WalletConfig::default()
        };
        Self::with_config(config, providers, opener)
    }

    fn with_config(
        config: WalletConfig,
        providers: Vec<Rc<dyn ExtensionProvider>>,
        opener: RecordingOpener,
    ) -> Self {
        let storage = Rc::new(MockStorage::default());
        let ledger = Rc::new(MockLedger::new(2.5));
        let opener = Rc::new(opener);
        let service = WalletService::new(
            config,
            storage.clone(),
            ledger.clone(),
            InjectedProviders::new(providers),
            opener.clone(),
        );
        Self {
            service,
            storage,
            ledger,
            opener,
            wallet: WalletPeer::new(),
        }
    }

    fn native() -> Self {
        Self::build(Platform::Native, Vec::new(), RecordingOpener::default())
    }

    fn web(providers: Vec<Rc<dyn ExtensionProvider>>) -> Self {
        Self::build(Platform::Web, providers, RecordingOpener::default())
    }

    /// Persist a key pair and wallet session as a previous run would have.
    async fn seed_session(&self, token: &str) -> EphemeralKeyPair {
        let dapp = EphemeralKeyPair::generate().unwrap();
        let store = self.service.storage();
        store.persist_keypair(&dapp).await.unwrap();
        store
            .persist_wallet_session(token, &self.wallet.public_key())
            .await
            .unwrap();
        dapp
    }

    async fn artifact(&self, key: ArtifactKey) -> Option<String> {
        self.service.storage().get(key).await.unwrap()
    }
}

#[tokio::test]
async fn test_deep_link_connect_round_trip() {
    let h = Harness::native();
    let user = address(7);

    let (connected, outcome) = join!(h.service.connect_and_wait(WalletKind::Phantom), async {
        let link = h.opener.wait_for(1).await;
        assert!(link.starts_with("phantom://ul/v1/connect?app_url=https%3A%2F%2Fsoltix.app"));
        assert_eq!(query_param(&link, "cluster").as_deref(), Some("devnet"));
        assert_eq!(
            query_param(&link, "redirect_link").as_deref(),
            Some("soltix://wallet-callback")
        );
        let dapp_key = query_param(&link, "dapp_encryption_public_key").unwrap();
        let callback = h.wallet.encrypted_callback(
            &dapp_key,
            &json!({ "public_key": user.clone(), "session": "session-1" }),
        );
        h.service.handle_callback(&callback).await
    });

    let connected = connected.unwrap();
    assert_eq!(connected.public_key.to_base58(), user);
    assert_eq!(connected.balance, 2.5);
    assert_eq!(outcome.unwrap(), CallbackOutcome::Connected(connected));
    assert!(h.service.is_established());

    assert_eq!(
        h.artifact(ArtifactKey::WalletSession).await.as_deref(),
        Some("session-1")
    );
    assert_eq!(
        h.artifact(ArtifactKey::WalletEncryptionKey).await,
        Some(encode_base58(&h.wallet.public_key()))
    );
    assert_eq!(h.artifact(ArtifactKey::WalletAddress).await, Some(user));
    assert!(!h.service.requests().connect.is_pending());
}

#[tokio::test]
async fn test_self_transfer_rejected_without_rpc() {
    let h = Harness::native();
    let a = address(1);

    let err = h.service.send_payment(&a, &a, 1.0).await.unwrap_err();
    assert_eq!(
        err,
        WalletError::validation("Sender and recipient wallets cannot be the same.")
    );
    for amount in [0.0, -3.0, f64::NAN] {
        assert!(matches!(
            h.service.send_payment(&a, &address(2), amount).await,
            Err(WalletError::Validation(_))
        ));
    }

    assert_eq!(h.ledger.calls.get(), 0);
    assert!(h.opener.opened().is_empty());
    assert!(!h.service.requests().payment.is_pending());
}

#[tokio::test]
async fn test_signed_transaction_submission_failure() {
    let h = Harness::native();
    h.seed_session("session-1").await;
    h.service
        .storage()
        .save_last_signature("previous-sig")
        .await
        .unwrap();
    h.ledger.should_fail_submit.set(true);
    let (from, to) = (address(1), address(2));

    let (paid, outcome) = join!(
        h.service.send_payment(&from, &to, 0.25),
        async {
            let link = h.opener.wait_for(1).await;
            assert!(link.starts_with("phantom://ul/v1/signTransaction?"));
            let request = h.wallet.open_sign_request(&link);
            assert_eq!(request["session"], "session-1");
            let dapp_key = query_param(&link, "dapp_encryption_public_key").unwrap();
            let callback = h.wallet.encrypted_callback(
                &dapp_key,
                &json!({ "transaction": request["transaction"].clone() }),
            );
            h.service.handle_callback(&callback).await
        }
    );

    assert!(matches!(paid, Err(WalletError::SubmissionFailed(_))));
    assert!(matches!(outcome, Err(WalletError::SubmissionFailed(_))));
    assert_eq!(h.artifact(ArtifactKey::LastTxSignature).await, None);
    assert!(h.ledger.confirmed.borrow().is_empty());
    assert!(!h.service.requests().payment.is_pending());
}

#[tokio::test]
async fn test_deep_link_payment_settles_after_confirmation() {
    let h = Harness::native();
    h.seed_session("session-1").await;
    let (from, to) = (address(1), address(2));

    let (paid, outcome) = join!(
        h.service.send_payment(&from, &to, 0.25),
        async {
            let link = h.opener.wait_for(1).await;
            let request = h.wallet.open_sign_request(&link);
            let unsigned = decode_base58(request["transaction"].as_str().unwrap()).unwrap();
            // blockhash sits after the signature slot, header and three keys
            assert_eq!(&unsigned[165..197], &BLOCKHASH_BYTES);

            let dapp_key = query_param(&link, "dapp_encryption_public_key").unwrap();
            let callback = h.wallet.encrypted_callback(
                &dapp_key,
                &json!({ "transaction": encode_base58(&unsigned) }),
            );
            h.service.handle_callback(&callback).await
        }
    );

    let receipt = paid.unwrap();
    assert_eq!(
        receipt,
        PaymentReceipt {
            signature: "sig-1".to_string(),
            success: true
        }
    );
    assert_eq!(
        outcome.unwrap(),
        CallbackOutcome::PaymentSettled {
            signature: "sig-1".to_string()
        }
    );
    assert_eq!(*h.ledger.confirmed.borrow(), vec!["sig-1".to_string()]);
    assert_eq!(
        h.artifact(ArtifactKey::LastTxSignature).await.as_deref(),
        Some("sig-1")
    );
}

#[tokio::test]
async fn test_payment_without_session_connects_first() {
    let h = Harness::native();
    let (user, to) = (address(1), address(2));

    let (paid, _) = join!(h.service.send_payment(&user, &to, 1.0), async {
        let connect_link = h.opener.wait_for(1).await;
        assert!(connect_link.contains("/ul/v1/connect?"));
        let dapp_key = query_param(&connect_link, "dapp_encryption_public_key").unwrap();
        let callback = h.wallet.encrypted_callback(
            &dapp_key,
            &json!({ "public_key": user.clone(), "session": "fresh" }),
        );
        h.service.handle_callback(&callback).await.unwrap();

        let sign_link = h.opener.wait_for(2).await;
        assert_eq!(h.wallet.open_sign_request(&sign_link)["session"], "fresh");
        let callback = h
            .wallet
            .encrypted_callback(&dapp_key, &json!({ "signature": "wallet-sig" }));
        h.service.handle_callback(&callback).await.unwrap();
    });

    assert_eq!(paid.unwrap().signature, "wallet-sig");
    assert!(h.ledger.submitted.borrow().is_empty());
    assert_eq!(
        h.artifact(ArtifactKey::LastTxSignature).await.as_deref(),
        Some("wallet-sig")
    );
}

#[tokio::test]
async fn test_tampered_ciphertext_fails_closed() {
    let h = Harness::native();

    let (connected, outcome) = join!(h.service.connect_and_wait(WalletKind::Phantom), async {
        let link = h.opener.wait_for(1).await;
        let dapp_key = query_param(&link, "dapp_encryption_public_key").unwrap();
        let callback = h.wallet.encrypted_callback(
            &dapp_key,
            &json!({ "public_key": address(7), "session": "s" }),
        );
        let data = query_param(&callback, "data").unwrap();
        let mut bytes = decode_base58(&data).unwrap();
        bytes[0] ^= 0x01;
        let tampered = callback.replace(&data, &encode_base58(&bytes));
        h.service.handle_callback(&tampered).await
    });

    assert!(matches!(connected, Err(WalletError::DecryptFailure(_))));
    assert!(matches!(outcome, Err(WalletError::DecryptFailure(_))));
    assert_eq!(h.service.state_label(), "idle");
    for key in ArtifactKey::ALL {
        assert_eq!(h.artifact(key).await, None, "{} survived", key.as_str());
    }
}

#[tokio::test]
async fn test_reply_from_foreign_wallet_fails_closed() {
    let h = Harness::native();
    h.seed_session("session-1").await;
    let intruder = WalletPeer::new();
    let (from, to) = (address(1), address(2));

    let (paid, outcome) = join!(h.service.send_payment(&from, &to, 0.25), async {
        let link = h.opener.wait_for(1).await;
        let dapp_key = query_param(&link, "dapp_encryption_public_key").unwrap();
        let forged = intruder.encrypted_callback(&dapp_key, &json!({ "signature": "forged" }));
        h.service.handle_callback(&forged).await
    });

    assert!(matches!(paid, Err(WalletError::DecryptFailure(_))));
    assert!(matches!(outcome, Err(WalletError::DecryptFailure(_))));
    assert!(!h.service.is_established());
    assert_eq!(h.artifact(ArtifactKey::LastTxSignature).await, None);
    assert!(h.ledger.submitted.borrow().is_empty());
}

#[tokio::test]
async fn test_signature_before_connect_fails_closed() {
    let h = Harness::native();

    let (connected, outcome) = join!(h.service.connect_and_wait(WalletKind::Phantom), async {
        let link = h.opener.wait_for(1).await;
        let dapp_key = query_param(&link, "dapp_encryption_public_key").unwrap();
        let callback = h
            .wallet
            .encrypted_callback(&dapp_key, &json!({ "signature": "early" }));
        h.service.handle_callback(&callback).await
    });

    assert!(matches!(connected, Err(WalletError::DecryptFailure(_))));
    assert!(matches!(outcome, Err(WalletError::DecryptFailure(_))));
    assert_eq!(h.service.state_label(), "idle");
    assert_eq!(h.artifact(ArtifactKey::LastTxSignature).await, None);
}

#[tokio::test]
async fn test_switching_wallet_regenerates_key_pair() {
    let h = Harness::native();
    let user = address(7);

    let (connected, _) = join!(h.service.connect_and_wait(WalletKind::Phantom), async {
        let link = h.opener.wait_for(1).await;
        let dapp_key = query_param(&link, "dapp_encryption_public_key").unwrap();
        let callback = h.wallet.encrypted_callback(
            &dapp_key,
            &json!({ "public_key": user.clone(), "session": "session-1" }),
        );
        h.service.handle_callback(&callback).await
    });
    connected.unwrap();
    let phantom_key = query_param(&h.opener.opened()[0], "dapp_encryption_public_key");

    // reconnecting the same wallet keeps the pair but drops the old session
    h.service.initiate_connect(WalletKind::Phantom).await.unwrap();
    let again = query_param(&h.opener.opened()[1], "dapp_encryption_public_key");
    assert_eq!(again, phantom_key);
    assert_eq!(h.artifact(ArtifactKey::WalletSession).await, None);
    assert_eq!(h.artifact(ArtifactKey::WalletEncryptionKey).await, None);

    h.service.initiate_connect(WalletKind::Solflare).await.unwrap();
    let link = h.opener.opened()[2].clone();
    assert!(link.starts_with("solflare://ul/v1/connect?"));
    let solflare_key = query_param(&link, "dapp_encryption_public_key");
    assert!(solflare_key.is_some());
    assert_ne!(solflare_key, phantom_key);
    assert_eq!(h.artifact(ArtifactKey::DappPublicKey).await, solflare_key);
}

#[tokio::test]
async fn test_callback_during_restore_waits_for_load() {
    let h = Harness::native();
    let dapp = h.seed_session("session-1").await;
    let payment = h.service.requests().payment.register();
    h.storage.stall_reads.set(true);

    let callback = h.wallet.encrypted_callback(
        &dapp.public_key_base58(),
        &json!({ "signature": "wallet-sig" }),
    );
    let (restored, outcome) = join!(
        h.service.restore_session(),
        h.service.handle_callback(&callback)
    );

    assert_eq!(restored.unwrap(), None);
    assert_eq!(
        outcome.unwrap(),
        CallbackOutcome::PaymentSettled {
            signature: "wallet-sig".to_string()
        }
    );
    assert_eq!(payment.wait().await.unwrap().signature, "wallet-sig");
    assert!(h.service.is_established());
}

#[tokio::test]
async fn test_restored_session_signs_with_default_wallet() {
    let config = WalletConfig {
        platform: Platform::Native,
        default_wallet: WalletKind::Solflare,
        ..WalletConfig::default()
    };
    let h = Harness::with_config(config, Vec::new(), RecordingOpener::default());
    h.seed_session("session-1").await;
    let (from, to) = (address(1), address(2));

    let (paid, _) = join!(h.service.send_payment(&from, &to, 0.1), async {
        let link = h.opener.wait_for(1).await;
        assert!(link.starts_with("solflare://ul/v1/signTransaction?"));
        assert_eq!(h.wallet.open_sign_request(&link)["session"], "session-1");
        let dapp_key = query_param(&link, "dapp_encryption_public_key").unwrap();
        let callback = h
            .wallet
            .encrypted_callback(&dapp_key, &json!({ "signature": "wallet-sig" }));
        h.service.handle_callback(&callback).await.unwrap();
    });

    assert_eq!(paid.unwrap().signature, "wallet-sig");
}

#[tokio::test]
async fn test_invalid_connect_key_fails_closed() {
    let h = Harness::native();

    let (connected, _) = join!(h.service.connect_and_wait(WalletKind::Solflare), async {
        let link = h.opener.wait_for(1).await;
        assert!(link.starts_with("solflare://ul/v1/connect?"));
        let dapp_key = query_param(&link, "dapp_encryption_public_key").unwrap();
        let callback = h.wallet.encrypted_callback(
            &dapp_key,
            &json!({ "public_key": "not-a-key", "session": "s" }),
        );
        h.service.handle_callback(&callback).await
    });

    assert_eq!(
        connected,
        Err(WalletError::Validation(
            "Invalid Solana public key: not-a-key".to_string()
        ))
    );
    assert!(!h.service.is_established());
    assert_eq!(h.artifact(ArtifactKey::DappSecretKey).await, None);
}

#[tokio::test]
async fn test_disconnect_rejects_everything_pending() {
    let h = Harness::native();
    h.service.save_wallet_address(&address(3)).await.unwrap();
    assert!(h.service.restore_session().await.unwrap().is_some());

    let connect = h.service.requests().connect.register();
    let payment = h.service.requests().payment.register();
    h.service.disconnect().await;

    assert_eq!(connect.wait().await, Err(WalletError::Disconnected));
    assert_eq!(payment.wait().await, Err(WalletError::Disconnected));
    assert_eq!(h.service.restore_session().await.unwrap(), None);
    assert_eq!(h.storage.len(), 0);
}

#[tokio::test]
async fn test_disconnect_survives_teardown_failures() {
    let phantom = Rc::new(MockProvider::phantom());
    phantom.should_fail_disconnect.set(true);
    let solflare = Rc::new(MockProvider::solflare());
    let h = Harness::web(vec![phantom.clone(), solflare.clone()]);

    let payment = h.service.requests().payment.register();
    h.storage.set_should_fail(true);
    h.service.disconnect().await;

    assert_eq!(payment.wait().await, Err(WalletError::Disconnected));
    assert_eq!(phantom.disconnects.get(), 1);
    assert_eq!(solflare.disconnects.get(), 1);
}

#[tokio::test]
async fn test_wallet_error_callback_rejects_both_kinds() {
    let h = Harness::native();
    let connect = h.service.requests().connect.register();
    let payment = h.service.requests().payment.register();

    let err = h
        .service
        .handle_callback("soltix://wallet-callback?errorCode=4001&errorMessage=User%20rejected")
        .await
        .unwrap_err();
    let expected = WalletError::WalletRejected {
        code: "4001".to_string(),
        message: Some("User rejected".to_string()),
    };
    assert_eq!(err, expected);
    assert_eq!(connect.wait().await, Err(expected.clone()));
    assert_eq!(payment.wait().await, Err(expected));
}

#[tokio::test]
async fn test_plain_redirect_connect() {
    let h = Harness::native();
    let user = address(9);

    let (connected, outcome) = join!(h.service.connect_and_wait(WalletKind::Backpack), async {
        let link = h.opener.wait_for(1).await;
        assert!(link.starts_with("backpack://ul/v1/connect?redirect_link="));
        h.service
            .handle_callback(&format!("soltix://wallet-callback?public_key={user}"))
            .await
    });

    assert_eq!(connected.unwrap().public_key.to_base58(), user);
    assert!(matches!(outcome, Ok(CallbackOutcome::Connected(_))));
    assert!(!h.service.is_established());
}

#[tokio::test]
async fn test_native_open_failure_surfaces() {
    let h = Harness::build(Platform::Native, Vec::new(), RecordingOpener::failing());

    let err = h
        .service
        .connect_and_wait(WalletKind::Phantom)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        WalletError::TransportUnavailable(
            "Phantom app is not installed or cannot be opened on this device.".to_string()
        )
    );
    assert!(!h.service.requests().connect.is_pending());
    assert_eq!(h.opener.opened().len(), 1);
}

#[tokio::test]
async fn test_callback_without_actionable_fields() {
    let h = Harness::native();
    assert_eq!(
        h.service
            .handle_callback("soltix://wallet-callback")
            .await
            .unwrap(),
        CallbackOutcome::NoAction
    );
    assert!(matches!(
        h.service.handle_callback("::not a url::").await,
        Err(WalletError::InvalidCallback(_))
    ));
}

#[tokio::test]
async fn test_extension_connect() {
    let phantom = Rc::new(MockProvider::phantom());
    let h = Harness::web(vec![phantom.clone()]);

    let connected = h
        .service
        .initiate_connect(WalletKind::Phantom)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(connected.public_key, phantom.address());
    assert_eq!(
        h.artifact(ArtifactKey::WalletAddress).await,
        Some(phantom.address().to_base58())
    );

    *phantom.connect_error.borrow_mut() =
        Some(ProviderError::new(Some(4001), "User rejected the request."));
    let err = h
        .service
        .connect_and_wait(WalletKind::Phantom)
        .await
        .unwrap_err();
    assert!(err.is_user_rejection());
}

#[tokio::test]
async fn test_missing_extension_opens_download_page() {
    let h = Harness::web(vec![Rc::new(MockProvider::phantom())]);

    let err = h
        .service
        .initiate_connect(WalletKind::Solflare)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::TransportUnavailable(_)));
    assert_eq!(
        h.opener.opened(),
        vec!["https://solflare.com/download".to_string()]
    );
}

#[tokio::test]
async fn test_extension_payment() {
    let solflare = Rc::new(MockProvider::solflare());
    let h = Harness::web(vec![solflare.clone()]);

    let receipt = h
        .service
        .send_payment(&address(1), &address(2), 0.1)
        .await
        .unwrap();
    assert_eq!(receipt.signature, "ext-sig");
    assert_eq!(solflare.signed.borrow().len(), 1);
    assert_eq!(
        h.artifact(ArtifactKey::LastTxSignature).await.as_deref(),
        Some("ext-sig")
    );

    h.ledger.should_fail_confirm.set(true);
    h.service
        .storage()
        .delete(ArtifactKey::LastTxSignature)
        .await
        .unwrap();
    assert!(matches!(
        h.service.send_payment(&address(1), &address(2), 0.1).await,
        Err(WalletError::SubmissionFailed(_))
    ));
    assert_eq!(h.artifact(ArtifactKey::LastTxSignature).await, None);

    let bare = Harness::web(Vec::new());
    assert!(matches!(
        bare.service.send_payment(&address(1), &address(2), 0.1).await,
        Err(WalletError::TransportUnavailable(_))
    ));
}

#[tokio::test]
async fn test_payment_succeeds_when_signature_bookkeeping_fails() {
    let h = Harness::native();
    h.seed_session("session-1").await;
    // load artifacts before storage starts failing
    assert_eq!(h.service.restore_session().await.unwrap(), None);
    assert!(h.service.is_established());
    h.storage.set_should_fail(true);

    let (from, to) = (address(1), address(2));
    let (paid, _) = join!(
        h.service.send_payment(&from, &to, 0.5),
        async {
            let link = h.opener.wait_for(1).await;
            let request = h.wallet.open_sign_request(&link);
            let dapp_key = query_param(&link, "dapp_encryption_public_key").unwrap();
            let callback = h.wallet.encrypted_callback(
                &dapp_key,
                &json!({ "transaction": request["transaction"].clone() }),
            );
            h.service.handle_callback(&callback).await
        }
    );

    assert_eq!(paid.unwrap().signature, "sig-1");
}
