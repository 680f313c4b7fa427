//! Trading domain errors.
//!
//! Every business-rule violation raised inside a store transaction is a
//! `TradingError`. Raising one aborts the transaction, so no partial state
//! is ever committed. The protocol layer maps each variant to an RPC code.

use rust_decimal::Decimal;
use thiserror::Error;

use super::amm::AmmError;

/// Business-rule violations for trading, ledger and payment operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("market not found: {0}")]
    MarketNotFound(String),

    #[error("market {0} is resolved")]
    MarketResolved(String),

    #[error("market {0} has passed its end time")]
    MarketExpired(String),

    #[error("position not found: {0}")]
    PositionNotFound(String),

    #[error("position {0} is already closed")]
    PositionClosed(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("wallet not found for user {0}")]
    WalletNotFound(String),

    #[error("insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: Decimal, held: Decimal },

    #[error("insufficient points: requested {requested}, held {held}")]
    InsufficientPoints { requested: i64, held: i64 },

    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("payment intent not found: {0}")]
    PaymentNotFound(String),

    #[error("payment failed: {0}")]
    PaymentFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AmmError> for TradingError {
    fn from(err: AmmError) -> Self {
        match err {
            AmmError::NonPositiveAmount(_) | AmmError::NegativeReserve { .. } => {
                Self::InvalidInput(err.to_string())
            }
            AmmError::EmptyPool | AmmError::Arithmetic(_) => {
                Self::InsufficientLiquidity(err.to_string())
            }
        }
    }
}

/// Shorthand result type for domain and use-case operations.
pub type TradingResult<T> = Result<T, TradingError>;
