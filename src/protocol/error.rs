//! RPC Failures - Mapping Domain Errors to Protocol Codes
//!
//! Handlers return `RpcFailure`; the router turns it into an `RpcError`.
//! Internal failures are logged with request context and reported as a
//! generic "Internal error".

use serde_json::json;
use thiserror::Error;

use super::auth::AuthError;
use super::jsonrpc::{RpcError, codes};
use crate::domain::error::TradingError;

#[derive(Error, Debug)]
pub enum RpcFailure {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Trading(#[from] TradingError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RpcFailure {
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidParams(detail.into())
    }

    /// Whether the detail must stay out of the response.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Internal(_) | Self::Trading(TradingError::Internal(_)) | Self::Auth(AuthError::Backend(_))
        )
    }

    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::InvalidParams(detail) => RpcError::new(codes::INVALID_PARAMS, format!("Invalid params: {detail}"))
                .with_data(json!({ "violation": detail })),
            Self::MethodNotFound(method) => RpcError::method_not_found(method),
            Self::AgentNotFound(agent) => RpcError::new(codes::AGENT_NOT_FOUND, format!("Agent not found: {agent}")),
            Self::RateLimited => RpcError::new(codes::RATE_LIMITED, "Rate limit exceeded"),
            Self::Auth(AuthError::AgentNotFound(agent)) => {
                RpcError::new(codes::AGENT_NOT_FOUND, format!("Agent not found: {agent}"))
            }
            Self::Auth(AuthError::Backend(_)) => RpcError::internal(),
            Self::Auth(err) => RpcError::new(codes::NOT_AUTHENTICATED, format!("Not authenticated: {err}")),
            Self::Trading(err) => trading_error(err),
            Self::Internal(_) => RpcError::internal(),
        }
    }
}

fn trading_error(err: &TradingError) -> RpcError {
    let message = err.to_string();
    match err {
        TradingError::InvalidInput(detail) => RpcError::new(codes::INVALID_PARAMS, format!("Invalid params: {detail}"))
            .with_data(json!({ "violation": detail })),
        TradingError::MarketNotFound(_) => RpcError::new(codes::MARKET_NOT_FOUND, message),
        TradingError::Forbidden(_) => RpcError::new(codes::FORBIDDEN, message),
        TradingError::InsufficientFunds { needed, available } => RpcError::new(codes::INSUFFICIENT_FUNDS, message)
            .with_data(json!({ "needed": needed, "available": available })),
        TradingError::PaymentNotFound(_)
        | TradingError::PositionNotFound(_)
        | TradingError::WalletNotFound(_)
        | TradingError::NotFound(_) => RpcError::new(codes::NOT_FOUND, message),
        TradingError::PaymentFailed(_) => RpcError::new(codes::PAYMENT_FAILED, message),
        TradingError::MarketResolved(_)
        | TradingError::MarketExpired(_)
        | TradingError::PositionClosed(_)
        | TradingError::InsufficientShares { .. }
        | TradingError::InsufficientPoints { .. }
        | TradingError::InsufficientLiquidity(_)
        | TradingError::UnknownTicker(_)
        | TradingError::PriceUnavailable(_) => RpcError::new(codes::TRADE_REJECTED, message),
        TradingError::Internal(_) => RpcError::internal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_domain_errors_map_to_specific_codes() {
        let cases = [
            (TradingError::MarketNotFound("m".into()), codes::MARKET_NOT_FOUND),
            (TradingError::Forbidden("x".into()), codes::FORBIDDEN),
            (
                TradingError::InsufficientFunds {
                    needed: dec!(80),
                    available: dec!(70),
                },
                codes::INSUFFICIENT_FUNDS,
            ),
            (TradingError::PaymentFailed("x".into()), codes::PAYMENT_FAILED),
            (TradingError::PositionNotFound("p".into()), codes::NOT_FOUND),
            (TradingError::MarketResolved("m".into()), codes::TRADE_REJECTED),
            (TradingError::InvalidInput("bad".into()), codes::INVALID_PARAMS),
        ];
        for (err, code) in cases {
            assert_eq!(RpcFailure::from(err).to_rpc_error().code, code);
        }
    }

    #[test]
    fn test_internal_errors_are_redacted() {
        let failure = RpcFailure::from(anyhow::anyhow!("disk on fire at /var/lib/secret"));
        assert!(failure.is_internal());
        let err = failure.to_rpc_error();
        assert_eq!(err.code, codes::INTERNAL_ERROR);
        assert_eq!(err.message, "Internal error");
        assert!(err.data.is_none());

        let err = RpcFailure::from(TradingError::Internal("invariant".into())).to_rpc_error();
        assert_eq!(err.message, "Internal error");
    }

    #[test]
    fn test_auth_errors() {
        assert_eq!(
            RpcFailure::from(AuthError::ExpiredToken).to_rpc_error().code,
            codes::NOT_AUTHENTICATED
        );
        assert_eq!(
            RpcFailure::from(AuthError::AgentNotFound("a".into())).to_rpc_error().code,
            codes::AGENT_NOT_FOUND
        );
    }
}
