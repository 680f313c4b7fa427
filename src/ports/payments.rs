//! Payment Verifier Port - Receipt Lookup
//!
//! Confirms that a transaction hash submitted as a micropayment receipt
//! refers to a successful transfer of at least the intent's amount, sent
//! by the payer. Verification runs before the store transaction that
//! confirms the intent.

use async_trait::async_trait;
use rust_decimal::Decimal;

/// What the verifier was asked to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptCheck {
  /// Intent being paid.
  pub intent_id: String,
  /// Transaction hash (`0x` + 64 hex).
  pub tx_hash: String,
  /// Amount requested by the intent.
  pub amount: Decimal,
  /// Wallet addresses bound to the payer (lowercase hex). The transaction
  /// must be sent from one of them.
  pub payer_addresses: Vec<String>,
}

/// Outcome of a receipt lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
  /// Transaction found and successful.
  Verified,
  /// Transaction missing, reverted, underpaid, or between the wrong parties.
  Rejected(String),
}

/// Transaction lookup for payment receipts.
#[async_trait]
pub trait PaymentVerifier: Send + Sync + 'static {
  /// Look up the transaction behind a receipt.
  async fn verify(&self, check: &ReceiptCheck) -> anyhow::Result<ReceiptStatus>;
}
