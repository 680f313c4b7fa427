//! Payment Use Case - Micropayment Intents and Receipts
//!
//! A payer creates a time-limited intent naming the payee. Either party
//! then submits the hash of the transaction that paid it. The hash is
//! checked through the `PaymentVerifier` port, against the intent amount
//! and the payer's bound wallet addresses, before the store transaction
//! that confirms the intent and credits the payee.
//!
//! Confirmation is idempotent: replaying the same hash against a
//! confirmed intent returns it unchanged and credits nothing.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::error::{TradingError, TradingResult};
use crate::domain::market::TransactionKind;
use crate::domain::payment::{PaymentIntent, PaymentStatus, is_valid_tx_hash};
use crate::ports::identity::IdentityStore;
use crate::ports::payments::{PaymentVerifier, ReceiptCheck, ReceiptStatus};
use crate::store::Store;

use super::ledger::{LedgerEntry, credit_in};

/// Result of submitting a receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptOutcome {
  pub intent: PaymentIntent,
  /// False when the receipt was a replay of an earlier confirmation.
  pub credited: bool,
}

/// Creates and settles payment intents.
pub struct PaymentService {
  store: Arc<Store>,
  verifier: Arc<dyn PaymentVerifier>,
  identity: Arc<dyn IdentityStore>,
  ttl: Duration,
  max_amount: Decimal,
}

/// What a confirmed intent means for a new receipt.
fn replay_of(intent: &PaymentIntent, tx_hash: &str) -> TradingResult<Option<ReceiptOutcome>> {
  if intent.status != PaymentStatus::Confirmed {
    return Ok(None);
  }
  if intent.tx_hash.as_deref() == Some(tx_hash) {
    return Ok(Some(ReceiptOutcome {
      intent: intent.clone(),
      credited: false,
    }));
  }
  Err(TradingError::PaymentFailed(format!(
    "intent {} is already confirmed by another transaction",
    intent.id
  )))
}

impl PaymentService {
  /// Create a service whose intents expire after `ttl_secs`.
  pub fn new(
    store: Arc<Store>,
    verifier: Arc<dyn PaymentVerifier>,
    identity: Arc<dyn IdentityStore>,
    ttl_secs: i64,
    max_amount: Decimal,
  ) -> Self {
    Self {
      store,
      verifier,
      identity,
      ttl: Duration::seconds(ttl_secs),
      max_amount,
    }
  }

  /// Create a pending intent from `from_user` to `to_user`.
  #[instrument(skip(self, metadata))]
  pub async fn create_request(
    &self,
    from_user: &str,
    to_user: &str,
    amount: Decimal,
    service: &str,
    metadata: serde_json::Value,
  ) -> TradingResult<PaymentIntent> {
    if amount <= Decimal::ZERO || amount > self.max_amount {
      return Err(TradingError::InvalidInput(format!(
        "amount must be in (0, {}], got {amount}",
        self.max_amount
      )));
    }
    if from_user == to_user {
      return Err(TradingError::InvalidInput("cannot request a payment from yourself".into()));
    }
    if service.trim().is_empty() {
      return Err(TradingError::InvalidInput("service must not be empty".into()));
    }

    let intent = PaymentIntent::new(from_user, to_user, amount, service.trim(), metadata, self.ttl, Utc::now());
    let stored = intent.clone();
    let payee = to_user.to_string();
    self
      .store
      .transaction(move |tx| {
        if tx.wallet(&payee).is_none() {
          return Err(TradingError::WalletNotFound(payee.clone()));
        }
        tx.put_payment(stored);
        Ok(())
      })
      .await?;

    info!(intent_id = %intent.id, from_user, to_user, amount = %amount, "Payment intent created");
    Ok(intent)
  }

  /// Verify `tx_hash` against an intent and credit the payee once.
  #[instrument(skip(self))]
  pub async fn submit_receipt(
    &self,
    user_id: &str,
    intent_id: &str,
    tx_hash: &str,
  ) -> TradingResult<ReceiptOutcome> {
    if !is_valid_tx_hash(tx_hash) {
      return Err(TradingError::InvalidInput(format!(
        "malformed transaction hash: {tx_hash}"
      )));
    }
    let tx_hash = tx_hash.to_ascii_lowercase();
    let now = Utc::now();

    let (intent, bound_elsewhere) = self
      .store
      .read(|t| {
        let intent = t.payments.get(intent_id).cloned();
        let bound = t
          .payments
          .values()
          .any(|p| p.id != intent_id && p.tx_hash.as_deref() == Some(tx_hash.as_str()));
        (intent, bound)
      })
      .await;
    let intent = intent.ok_or_else(|| TradingError::PaymentNotFound(intent_id.to_string()))?;

    if !intent.involves(user_id) {
      return Err(TradingError::Forbidden(format!(
        "caller is not a party to intent {intent_id}"
      )));
    }
    if let Some(replay) = replay_of(&intent, &tx_hash)? {
      info!(intent_id, "Receipt replayed; intent already confirmed");
      return Ok(replay);
    }
    if intent.is_expired(now) {
      self.mark_expired(intent_id).await?;
      return Err(TradingError::PaymentFailed(format!("intent {intent_id} has expired")));
    }
    if bound_elsewhere {
      return Err(TradingError::PaymentFailed(
        "transaction hash is already bound to another intent".into(),
      ));
    }

    let payer_addresses = match self.identity.addresses_of(&intent.from_user).await {
      Ok(addresses) => addresses,
      Err(e) => {
        warn!(intent_id, error = %e, "Payer address lookup failed");
        return Err(TradingError::PaymentFailed("payer wallet could not be resolved".into()));
      }
    };
    let check = ReceiptCheck {
      intent_id: intent.id.clone(),
      tx_hash: tx_hash.clone(),
      amount: intent.amount,
      payer_addresses,
    };
    match self.verifier.verify(&check).await {
      Ok(ReceiptStatus::Verified) => {}
      Ok(ReceiptStatus::Rejected(reason)) => {
        warn!(intent_id, tx_hash = %tx_hash, reason = %reason, "Receipt rejected");
        return Err(TradingError::PaymentFailed(reason));
      }
      Err(e) => {
        warn!(intent_id, error = %e, "Receipt verification failed");
        return Err(TradingError::PaymentFailed("transaction could not be verified".into()));
      }
    }

    let id = intent_id.to_string();
    let outcome = self
      .store
      .transaction(move |tx| {
        let now = Utc::now();
        let mut intent = tx
          .payment(&id)
          .ok_or_else(|| TradingError::PaymentNotFound(id.clone()))?;
        if let Some(replay) = replay_of(&intent, &tx_hash)? {
          return Ok(replay);
        }
        if intent.is_expired(now) {
          return Err(TradingError::PaymentFailed(format!("intent {id} has expired")));
        }
        if tx.payment_by_hash(&tx_hash).is_some_and(|p| p.id != id) {
          return Err(TradingError::PaymentFailed(
            "transaction hash is already bound to another intent".into(),
          ));
        }
        intent.confirm(&tx_hash, now)?;
        credit_in(
          tx,
          &intent.to_user,
          intent.amount,
          LedgerEntry::new(
            TransactionKind::PaymentReceived,
            format!("Payment for {}", intent.service),
          )
          .reference(&intent.id),
          now,
        )?;
        tx.put_payment(intent.clone());
        Ok(ReceiptOutcome {
          intent,
          credited: true,
        })
      })
      .await?;

    if outcome.credited {
      info!(intent_id, to_user = %outcome.intent.to_user, amount = %outcome.intent.amount, "Payment confirmed");
    }
    Ok(outcome)
  }

  /// Look up an intent visible to `user_id`.
  pub async fn get(&self, user_id: &str, intent_id: &str) -> TradingResult<PaymentIntent> {
    let intent = self
      .store
      .read(|t| t.payments.get(intent_id).cloned())
      .await
      .ok_or_else(|| TradingError::PaymentNotFound(intent_id.to_string()))?;
    if !intent.involves(user_id) {
      return Err(TradingError::Forbidden(format!(
        "caller is not a party to intent {intent_id}"
      )));
    }
    Ok(intent)
  }

  async fn mark_expired(&self, intent_id: &str) -> TradingResult<()> {
    let id = intent_id.to_string();
    self
      .store
      .transaction(move |tx| {
        if let Some(mut intent) = tx.payment(&id) {
          if intent.status == PaymentStatus::Pending {
            intent.status = PaymentStatus::Expired;
            tx.put_payment(intent);
          }
        }
        Ok(())
      })
      .await
  }

  /// Mark every pending intent past its expiry as expired.
  pub async fn expire_stale(&self) -> TradingResult<usize> {
    let expired = self
      .store
      .transaction(|tx| {
        let now = Utc::now();
        let stale: Vec<PaymentIntent> = tx
          .payments_where(|p| p.status == PaymentStatus::Pending && now >= p.expires_at);
        let count = stale.len();
        for mut intent in stale {
          intent.status = PaymentStatus::Expired;
          tx.put_payment(intent);
        }
        Ok(count)
      })
      .await?;
    if expired > 0 {
      info!(expired, "Expired stale payment intents");
    }
    Ok(expired)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::identity::MemoryIdentityStore;
  use crate::config::{AgentConfig, AuthConfig};
  use crate::usecases::ledger::LedgerService;
  use async_trait::async_trait;
  use rust_decimal_macros::dec;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct CountingVerifier {
    calls: AtomicUsize,
    accept: bool,
  }

  #[async_trait]
  impl PaymentVerifier for CountingVerifier {
    async fn verify(&self, _check: &ReceiptCheck) -> anyhow::Result<ReceiptStatus> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.accept {
        Ok(ReceiptStatus::Verified)
      } else {
        Ok(ReceiptStatus::Rejected("reverted".into()))
      }
    }
  }

  fn hash(c: char) -> String {
    format!("0x{}", c.to_string().repeat(64))
  }

  /// Accepts a transfer of `paid` sent from `sender`, as a chain would report it.
  struct TransferVerifier {
    paid: Decimal,
    sender: String,
  }

  #[async_trait]
  impl PaymentVerifier for TransferVerifier {
    async fn verify(&self, check: &ReceiptCheck) -> anyhow::Result<ReceiptStatus> {
      if !check.payer_addresses.contains(&self.sender) {
        return Ok(ReceiptStatus::Rejected("transaction was not sent by the payer".into()));
      }
      if self.paid < check.amount {
        return Ok(ReceiptStatus::Rejected("transaction value is below the intent".into()));
      }
      Ok(ReceiptStatus::Verified)
    }
  }

  const ALICE_WALLET: &str = "0x00000000000000000000000000000000000000a1";

  fn identity() -> Arc<MemoryIdentityStore> {
    let mut config = AuthConfig::default();
    config.agents = vec![AgentConfig {
      agent_id: "1:1".into(),
      user_id: "alice".into(),
      address: Some(ALICE_WALLET.into()),
    }];
    Arc::new(MemoryIdentityStore::from_config(&config))
  }

  async fn setup_with(
    verifier: Arc<dyn PaymentVerifier>,
    ttl_secs: i64,
  ) -> (PaymentService, LedgerService) {
    let store = Arc::new(Store::new());
    let payments = PaymentService::new(Arc::clone(&store), verifier, identity(), ttl_secs, dec!(100));
    let ledger = LedgerService::new(store, dec!(10), 0);
    ledger.ensure_wallet("alice").await.unwrap();
    ledger.ensure_wallet("bob").await.unwrap();
    (payments, ledger)
  }

  async fn setup(accept: bool, ttl_secs: i64) -> (PaymentService, LedgerService, Arc<CountingVerifier>) {
    let verifier = Arc::new(CountingVerifier {
      calls: AtomicUsize::new(0),
      accept,
    });
    let (payments, ledger) = setup_with(verifier.clone(), ttl_secs).await;
    (payments, ledger, verifier)
  }

  #[tokio::test]
  async fn test_receipt_credits_once() {
    let (payments, ledger, verifier) = setup(true, 900).await;
    let intent = payments
      .create_request("alice", "bob", dec!(2.5), "analysis", serde_json::json!({"k": 1}))
      .await
      .unwrap();

    let first = payments.submit_receipt("alice", &intent.id, &hash('a')).await.unwrap();
    assert!(first.credited);
    assert_eq!(first.intent.status, PaymentStatus::Confirmed);
    assert_eq!(ledger.wallet("bob").await.unwrap().virtual_balance, dec!(12.5));

    let replay = payments.submit_receipt("bob", &intent.id, &hash('a')).await.unwrap();
    assert!(!replay.credited);
    assert_eq!(ledger.wallet("bob").await.unwrap().virtual_balance, dec!(12.5));
    assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);

    let err = payments.submit_receipt("bob", &intent.id, &hash('b')).await.unwrap_err();
    assert!(matches!(err, TradingError::PaymentFailed(_)));
  }

  #[tokio::test]
  async fn test_expired_intent_is_rejected() {
    let (payments, _ledger, verifier) = setup(true, 0).await;
    let intent = payments
      .create_request("alice", "bob", dec!(1), "svc", serde_json::Value::Null)
      .await
      .unwrap();
    let err = payments.submit_receipt("alice", &intent.id, &hash('c')).await.unwrap_err();
    assert!(matches!(err, TradingError::PaymentFailed(_)));
    assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    assert_eq!(payments.get("alice", &intent.id).await.unwrap().status, PaymentStatus::Expired);
  }

  #[tokio::test]
  async fn test_rejected_verification_changes_nothing() {
    let (payments, ledger, _verifier) = setup(false, 900).await;
    let intent = payments
      .create_request("alice", "bob", dec!(1), "svc", serde_json::Value::Null)
      .await
      .unwrap();
    assert!(payments.submit_receipt("alice", &intent.id, &hash('d')).await.is_err());
    assert_eq!(payments.get("bob", &intent.id).await.unwrap().status, PaymentStatus::Pending);
    assert_eq!(ledger.wallet("bob").await.unwrap().virtual_balance, dec!(10));
  }

  #[tokio::test]
  async fn test_hash_cannot_pay_two_intents() {
    let (payments, _ledger, _verifier) = setup(true, 900).await;
    let a = payments
      .create_request("alice", "bob", dec!(1), "svc", serde_json::Value::Null)
      .await
      .unwrap();
    let b = payments
      .create_request("alice", "bob", dec!(1), "svc", serde_json::Value::Null)
      .await
      .unwrap();
    payments.submit_receipt("alice", &a.id, &hash('e')).await.unwrap();
    let err = payments.submit_receipt("alice", &b.id, &hash('e')).await.unwrap_err();
    assert!(matches!(err, TradingError::PaymentFailed(_)));
  }

  #[tokio::test]
  async fn test_validation() {
    let (payments, _ledger, _verifier) = setup(true, 900).await;
    assert!(payments
      .create_request("alice", "alice", dec!(1), "svc", serde_json::Value::Null)
      .await
      .is_err());
    assert!(payments
      .create_request("alice", "carol", dec!(1), "svc", serde_json::Value::Null)
      .await
      .is_err());
    let intent = payments
      .create_request("alice", "bob", dec!(1), "svc", serde_json::Value::Null)
      .await
      .unwrap();
    assert!(matches!(
      payments.submit_receipt("alice", &intent.id, "0x12").await,
      Err(TradingError::InvalidInput(_))
    ));
    assert!(matches!(
      payments.submit_receipt("carol", &intent.id, &hash('f')).await,
      Err(TradingError::Forbidden(_))
    ));
  }

  #[tokio::test]
  async fn test_expire_stale() {
    let (payments, _ledger, _verifier) = setup(true, 0).await;
    payments
      .create_request("alice", "bob", dec!(1), "svc", serde_json::Value::Null)
      .await
      .unwrap();
    assert_eq!(payments.expire_stale().await.unwrap(), 1);
    assert_eq!(payments.expire_stale().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_underpaid_transfer_credits_nothing() {
    let verifier = Arc::new(TransferVerifier {
      paid: dec!(1),
      sender: ALICE_WALLET.into(),
    });
    let (payments, ledger) = setup_with(verifier, 900).await;
    let intent = payments
      .create_request("alice", "bob", dec!(50), "svc", serde_json::Value::Null)
      .await
      .unwrap();
    let err = payments.submit_receipt("bob", &intent.id, &hash('a')).await.unwrap_err();
    assert!(matches!(err, TradingError::PaymentFailed(reason) if reason.contains("below")));
    assert_eq!(ledger.wallet("bob").await.unwrap().virtual_balance, dec!(10));
    assert_eq!(payments.get("bob", &intent.id).await.unwrap().status, PaymentStatus::Pending);
  }

  #[tokio::test]
  async fn test_transfer_from_another_wallet_credits_nothing() {
    let verifier = Arc::new(TransferVerifier {
      paid: dec!(50),
      sender: "0x00000000000000000000000000000000000000b0".into(),
    });
    let (payments, ledger) = setup_with(verifier, 900).await;
    let intent = payments
      .create_request("alice", "bob", dec!(50), "svc", serde_json::Value::Null)
      .await
      .unwrap();
    assert!(payments.submit_receipt("bob", &intent.id, &hash('b')).await.is_err());
    assert_eq!(ledger.wallet("bob").await.unwrap().virtual_balance, dec!(10));
  }

  #[tokio::test]
  async fn test_full_transfer_from_payer_wallet_credits() {
    let verifier = Arc::new(TransferVerifier {
      paid: dec!(50),
      sender: ALICE_WALLET.into(),
    });
    let (payments, ledger) = setup_with(verifier, 900).await;
    let intent = payments
      .create_request("alice", "bob", dec!(50), "svc", serde_json::Value::Null)
      .await
      .unwrap();
    assert!(payments.submit_receipt("bob", &intent.id, &hash('c')).await.unwrap().credited);
    assert_eq!(ledger.wallet("bob").await.unwrap().virtual_balance, dec!(60));
  }
}
