//! Domain layer - Core business logic and models.
//!
//! Pure pricing, position and ledger types for the exchange. Nothing in
//! here performs I/O; the store and use cases build on these types.

pub mod amm;
pub mod error;
pub mod fees;
pub mod market;
pub mod payment;
pub mod perp;

// Re-export core types for convenience
pub use amm::{AmmError, AmmPricer, BuyQuote, SellQuote};
pub use error::{TradingError, TradingResult};
pub use fees::FeeSchedule;
pub use market::{
    BalanceTransaction, Market, MarketId, Outcome, Position, PositionId, TransactionKind, UserId,
    Wallet,
};
pub use payment::{PaymentIntent, PaymentStatus};
pub use perp::{PerpPosition, PerpSide};
