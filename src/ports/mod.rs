//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the use cases and protocol layer
//! require from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `PriceFeed`: Reference prices for perp tickers
//! - `IdentityStore`: Session tokens and agent-to-user resolution
//! - `PaymentVerifier`: Transaction lookup for micropayment receipts
//! - `Repository`: State snapshot and ledger journal persistence

pub mod identity;
pub mod payments;
pub mod price_feed;
pub mod repository;
