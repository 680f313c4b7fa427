//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with the store and port interfaces to
//! implement the exchange's workflows. Each use case is a
//! self-contained service shared by the protocol handlers.
//!
//! Use cases:
//! - `LedgerService`: Atomic balance mutation and audit trail
//! - `PredictionService`: AMM buy/sell, market creation and resolution
//! - `PerpetualService`: Leveraged positions against reference prices
//! - `PaymentService`: Micropayment intents and receipts
//! - `SocialService`: Profiles, posts, messaging and moderation

pub mod cache;
pub mod ledger;
pub mod payments;
pub mod perpetuals;
pub mod prediction;
pub mod social;
