//! Micropayment intents.
//!
//! An intent is a time-limited request from one user to another. It is
//! confirmed exactly once, by binding a transaction hash that the payment
//! verifier accepted.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::{TradingError, TradingResult};
use super::market::{UserId, new_id};

/// Lifecycle of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Expired,
}

/// A payment request awaiting an on-chain receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    pub from_user: UserId,
    pub to_user: UserId,
    pub amount: Decimal,
    pub service: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub tx_hash: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl PaymentIntent {
    /// Creates a pending intent that expires `ttl` after `now`.
    pub fn new(
        from_user: &str,
        to_user: &str,
        amount: Decimal,
        service: impl Into<String>,
        metadata: serde_json::Value,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            from_user: from_user.to_string(),
            to_user: to_user.to_string(),
            amount,
            service: service.into(),
            metadata,
            status: PaymentStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
            tx_hash: None,
            confirmed_at: None,
        }
    }

    /// Whether `user` is the payer or the payee.
    pub fn involves(&self, user: &str) -> bool {
        self.from_user == user || self.to_user == user
    }

    /// Pending and past its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Expired
            || (self.status == PaymentStatus::Pending && now >= self.expires_at)
    }

    /// Binds `tx_hash` and marks the intent confirmed.
    pub fn confirm(&mut self, tx_hash: &str, now: DateTime<Utc>) -> TradingResult<()> {
        if self.status != PaymentStatus::Pending {
            return Err(TradingError::PaymentFailed(format!(
                "intent {} is not pending",
                self.id
            )));
        }
        self.status = PaymentStatus::Confirmed;
        self.tx_hash = Some(tx_hash.to_ascii_lowercase());
        self.confirmed_at = Some(now);
        Ok(())
    }
}

/// Accepts `0x` followed by 64 hex digits.
pub fn is_valid_tx_hash(hash: &str) -> bool {
    hash.len() == 66
        && hash.starts_with("0x")
        && hash[2..].chars().all(|c| c.is_ascii_hexdigit())
}
