//! Agent-to-agent micropayments: intents and on-chain receipts.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::{Field, method, non_empty};
use crate::domain::error::TradingError;
use crate::domain::payment::PaymentIntent;
use crate::protocol::auth::Principal;
use crate::protocol::context::AppContext;
use crate::protocol::error::RpcFailure;
use crate::protocol::router::{MethodGroup, MethodRegistry, Params};
use crate::usecases::payments::ReceiptOutcome;

pub(super) fn register(registry: &mut MethodRegistry) {
    use Field::*;
    use MethodGroup::Payments;
    registry.register(
        method(
            "a2a.paymentRequest",
            Payments,
            "Request a payment from the caller to another agent",
            &[
                Required("to", "string"),
                Required("amount", "number"),
                Required("service", "string"),
                Optional("metadata", "object"),
                Optional("from", "string"),
            ],
        ),
        payment_request,
    );
    registry.register(
        method(
            "a2a.paymentReceipt",
            Payments,
            "Settle an intent with an on-chain transaction hash",
            &[Required("requestId", "string"), Required("txHash", "string")],
        ),
        payment_receipt,
    );
    registry.register(
        method(
            "a2a.getPayment",
            Payments,
            "Get a payment intent you are party to",
            &[Required("requestId", "string")],
        ),
        get_payment,
    );
}

#[derive(Debug, Deserialize)]
struct PaymentRequestParams {
    #[serde(alias = "toUserId")]
    to: String,
    amount: Decimal,
    service: String,
    #[serde(default)]
    metadata: Value,
    from: Option<String>,
}

impl Params for PaymentRequestParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("to", &self.to)?;
        non_empty("service", &self.service)?;
        if self.amount <= Decimal::ZERO {
            return Err(format!("amount must be positive, got {}", self.amount));
        }
        if !(self.metadata.is_null() || self.metadata.is_object()) {
            return Err("metadata must be an object".into());
        }
        Ok(())
    }
}

async fn payment_request(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: PaymentRequestParams,
) -> Result<PaymentIntent, RpcFailure> {
    // Agents only ever request payments from themselves.
    if let Some(from) = &params.from {
        if *from != principal.user_id {
            return Err(TradingError::Forbidden(format!(
                "cannot create a payment request on behalf of {from}"
            ))
            .into());
        }
    }
    Ok(ctx
        .payments
        .create_request(&principal.user_id, &params.to, params.amount, &params.service, params.metadata)
        .await?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptParams {
    #[serde(alias = "intentId")]
    request_id: String,
    tx_hash: String,
}

impl Params for ReceiptParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("requestId", &self.request_id)?;
        non_empty("txHash", &self.tx_hash)
    }
}

async fn payment_receipt(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: ReceiptParams,
) -> Result<ReceiptOutcome, RpcFailure> {
    let outcome = ctx
        .payments
        .submit_receipt(&principal.user_id, &params.request_id, &params.tx_hash)
        .await?;
    if outcome.credited {
        ctx.record_trade("payment", outcome.intent.amount);
    }
    Ok(outcome)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentIdParams {
    #[serde(alias = "intentId")]
    request_id: String,
}

impl Params for PaymentIdParams {
    fn validate(&self) -> Result<(), String> {
        non_empty("requestId", &self.request_id)
    }
}

async fn get_payment(
    ctx: Arc<AppContext>,
    principal: Principal,
    params: PaymentIdParams,
) -> Result<PaymentIntent, RpcFailure> {
    Ok(ctx.payments.get(&principal.user_id, &params.request_id).await?)
}
