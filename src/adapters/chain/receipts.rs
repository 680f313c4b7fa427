//! Receipt Verifier - Transaction Lookup over Ethereum JSON-RPC
//!
//! Looks up a submitted transaction hash with `eth_getTransactionReceipt`
//! and `eth_getTransactionByHash`. A receipt is accepted when:
//! - the transaction is mined with status `0x1`
//! - it was sent from an address bound to the payer
//! - its value covers the intent amount in base units
//! - it went to the configured receiver address, if one is set

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::config::ChainConfig;
use crate::ports::payments::{PaymentVerifier, ReceiptCheck, ReceiptStatus};

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// The receipt fields the verifier reads.
#[derive(Debug, Deserialize)]
struct ReceiptFields {
    status: Option<String>,
}

/// The transaction fields the verifier reads.
#[derive(Debug, Deserialize)]
struct TransactionFields {
    from: Option<String>,
    to: Option<String>,
    value: Option<String>,
}

/// Verifies receipts against a chain RPC endpoint.
pub struct RpcPaymentVerifier {
    client: Client,
    rpc_url: String,
    receiver: Option<Address>,
    /// Base units per credit.
    unit: Decimal,
}

impl RpcPaymentVerifier {
    /// Build a verifier from chain configuration.
    ///
    /// Returns `Ok(None)` when no RPC URL is configured.
    pub fn from_config(config: &ChainConfig) -> Result<Option<Self>> {
        let Some(rpc_url) = config.rpc_url.clone() else {
            return Ok(None);
        };
        let receiver = config
            .receiver_address
            .as_deref()
            .map(Address::from_str)
            .transpose()
            .context("Invalid chain.receiver_address")?;
        let unit = Decimal::TEN
            .checked_powu(u64::from(config.value_decimals))
            .context("chain.value_decimals is too large")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build RPC HTTP client")?;

        info!(
            rpc_url = %rpc_url,
            enforce_receiver = receiver.is_some(),
            value_decimals = config.value_decimals,
            "Receipt verifier configured"
        );
        Ok(Some(Self {
            client,
            rpc_url,
            receiver,
            unit,
        }))
    }

    /// Intent amount in base units, rounded up.
    fn required_value(&self, amount: Decimal) -> Option<U256> {
        amount
            .checked_mul(self.unit)?
            .ceil()
            .to_u128()
            .map(U256::from)
    }

    fn judge(
        &self,
        check: &ReceiptCheck,
        receipt: Option<ReceiptFields>,
        transaction: Option<TransactionFields>,
    ) -> ReceiptStatus {
        let Some(receipt) = receipt else {
            return ReceiptStatus::Rejected("transaction not found".into());
        };
        if receipt.status.as_deref() != Some("0x1") {
            return ReceiptStatus::Rejected("transaction failed".into());
        }
        let Some(transaction) = transaction else {
            return ReceiptStatus::Rejected("transaction not found".into());
        };

        if let Some(expected) = self.receiver {
            let to = transaction.to.as_deref().and_then(|t| Address::from_str(t).ok());
            if to != Some(expected) {
                return ReceiptStatus::Rejected("transaction sent to a different address".into());
            }
        }

        if check.payer_addresses.is_empty() {
            return ReceiptStatus::Rejected("payer has no bound wallet address".into());
        }
        let from = transaction.from.as_deref().and_then(|f| Address::from_str(f).ok());
        let sent_by_payer = from.is_some_and(|from| {
            check
                .payer_addresses
                .iter()
                .any(|a| Address::from_str(a).is_ok_and(|a| a == from))
        });
        if !sent_by_payer {
            return ReceiptStatus::Rejected("transaction was not sent by the payer".into());
        }

        let Some(required) = self.required_value(check.amount) else {
            return ReceiptStatus::Rejected("amount cannot be expressed in base units".into());
        };
        let value = transaction
            .value
            .as_deref()
            .and_then(|v| U256::from_str_radix(v.trim_start_matches("0x"), 16).ok());
        match value {
            Some(value) if value >= required => ReceiptStatus::Verified,
            Some(value) => ReceiptStatus::Rejected(format!(
                "transaction value {value} is below the required {required}"
            )),
            None => ReceiptStatus::Rejected("transaction value is missing".into()),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, tx_hash: &str) -> Result<Option<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [tx_hash],
        });

        let response: RpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?
            .error_for_status()
            .with_context(|| format!("{method} returned an HTTP error"))?
            .json()
            .await
            .with_context(|| format!("Invalid {method} response"))?;

        if let Some(err) = response.error {
            anyhow::bail!("RPC error {}: {}", err.code, err.message);
        }
        Ok(response.result)
    }
}

#[async_trait]
impl PaymentVerifier for RpcPaymentVerifier {
    #[instrument(skip(self, check), fields(intent_id = %check.intent_id, tx_hash = %check.tx_hash))]
    async fn verify(&self, check: &ReceiptCheck) -> Result<ReceiptStatus> {
        let receipt: Option<ReceiptFields> = self.call("eth_getTransactionReceipt", &check.tx_hash).await?;
        let transaction: Option<TransactionFields> = if receipt.is_some() {
            self.call("eth_getTransactionByHash", &check.tx_hash).await?
        } else {
            None
        };

        let status = self.judge(check, receipt, transaction);
        debug!(?status, "Receipt checked");
        Ok(status)
    }
}

/// Verifier used when no chain RPC is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineVerifier;

#[async_trait]
impl PaymentVerifier for OfflineVerifier {
    async fn verify(&self, _check: &ReceiptCheck) -> Result<ReceiptStatus> {
        Ok(ReceiptStatus::Rejected(
            "on-chain verification is not configured".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const RECEIVER: &str = "0x00000000000000000000000000000000000000aa";
    const PAYER: &str = "0x00000000000000000000000000000000000000cc";
    const STRANGER: &str = "0x00000000000000000000000000000000000000dd";

    fn verifier(receiver: Option<&str>) -> RpcPaymentVerifier {
        RpcPaymentVerifier::from_config(&ChainConfig {
            rpc_url: Some("http://127.0.0.1:8545".into()),
            receiver_address: receiver.map(String::from),
            timeout_seconds: 1,
            value_decimals: 18,
        })
        .unwrap()
        .unwrap()
    }

    fn check(amount: Decimal) -> ReceiptCheck {
        ReceiptCheck {
            intent_id: "i".into(),
            tx_hash: format!("0x{}", "a".repeat(64)),
            amount,
            payer_addresses: vec![PAYER.into()],
        }
    }

    fn receipt(status: &str) -> Option<ReceiptFields> {
        Some(ReceiptFields {
            status: Some(status.into()),
        })
    }

    fn transaction(from: &str, to: &str, value: &str) -> Option<TransactionFields> {
        Some(TransactionFields {
            from: Some(from.into()),
            to: Some(to.into()),
            value: Some(value.into()),
        })
    }

    // 2.5 credits at 18 decimals = 2.5e18 = 0x22b1c8c1227a0000
    const TWO_AND_A_HALF: &str = "0x22b1c8c1227a0000";

    #[test]
    fn test_missing_rpc_url_yields_none() {
        assert!(RpcPaymentVerifier::from_config(&ChainConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_payment_from_payer_with_full_value_verified() {
        let v = verifier(None);
        assert_eq!(
            v.judge(&check(dec!(2.5)), receipt("0x1"), transaction(PAYER, RECEIVER, TWO_AND_A_HALF)),
            ReceiptStatus::Verified
        );
    }

    #[test]
    fn test_reverted_or_missing_receipt_rejected() {
        let v = verifier(None);
        let c = check(dec!(1));
        assert!(matches!(
            v.judge(&c, receipt("0x0"), transaction(PAYER, RECEIVER, "0xde0b6b3a7640000")),
            ReceiptStatus::Rejected(_)
        ));
        assert!(matches!(v.judge(&c, None, None), ReceiptStatus::Rejected(_)));
        assert!(matches!(v.judge(&c, receipt("0x1"), None), ReceiptStatus::Rejected(_)));
    }

    #[test]
    fn test_value_below_intent_amount_rejected() {
        let v = verifier(None);
        let status = v.judge(&check(dec!(10000)), receipt("0x1"), transaction(PAYER, RECEIVER, "0x0"));
        assert!(matches!(status, ReceiptStatus::Rejected(reason) if reason.contains("below the required")));

        // One base unit short of 2.5 credits.
        let status = v.judge(
            &check(dec!(2.5)),
            receipt("0x1"),
            transaction(PAYER, RECEIVER, "0x22b1c8c12279ffff"),
        );
        assert!(matches!(status, ReceiptStatus::Rejected(_)));
    }

    #[test]
    fn test_sender_other_than_payer_rejected() {
        let v = verifier(None);
        let status = v.judge(
            &check(dec!(2.5)),
            receipt("0x1"),
            transaction(STRANGER, RECEIVER, TWO_AND_A_HALF),
        );
        assert!(matches!(status, ReceiptStatus::Rejected(reason) if reason.contains("not sent by the payer")));
    }

    #[test]
    fn test_payer_without_bound_address_rejected() {
        let v = verifier(None);
        let mut c = check(dec!(2.5));
        c.payer_addresses.clear();
        assert!(matches!(
            v.judge(&c, receipt("0x1"), transaction(PAYER, RECEIVER, TWO_AND_A_HALF)),
            ReceiptStatus::Rejected(_)
        ));
    }

    #[test]
    fn test_receiver_is_enforced_case_insensitively() {
        let v = verifier(Some(RECEIVER));
        let c = check(dec!(2.5));
        assert_eq!(
            v.judge(
                &c,
                receipt("0x1"),
                transaction(PAYER, &RECEIVER.to_uppercase().replace("0X", "0x"), TWO_AND_A_HALF)
            ),
            ReceiptStatus::Verified
        );
        assert!(matches!(
            v.judge(&c, receipt("0x1"), transaction(PAYER, STRANGER, TWO_AND_A_HALF)),
            ReceiptStatus::Rejected(_)
        ));
    }

    #[test]
    fn test_required_value_rounds_up() {
        let v = verifier(None);
        assert_eq!(v.required_value(dec!(1)), Some(U256::from(10u128.pow(18))));
        let mut config = ChainConfig {
            rpc_url: Some("http://127.0.0.1:8545".into()),
            ..ChainConfig::default()
        };
        config.value_decimals = 0;
        let whole = RpcPaymentVerifier::from_config(&config).unwrap().unwrap();
        assert_eq!(whole.required_value(dec!(2.01)), Some(U256::from(3u8)));
    }

    #[tokio::test]
    async fn test_offline_verifier_rejects() {
        assert!(matches!(
            OfflineVerifier.verify(&check(Decimal::ONE)).await.unwrap(),
            ReceiptStatus::Rejected(_)
        ));
    }
}
