//! Core prediction-market and wallet domain types.
//!
//! Defines markets, positions, wallets and ledger rows. These are the
//! entities persisted by the transactional store; all quantities are
//! `Decimal` so outputs of the AMM feed balance changes without drift.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{TradingError, TradingResult};

// ────────────────────────────────────────────
// Identifier aliases
// ────────────────────────────────────────────

/// Platform user identifier.
pub type UserId = String;

/// Prediction market identifier.
pub type MarketId = String;

/// Position identifier (prediction or perpetual).
pub type PositionId = String;

/// Remaining share counts below this are treated as dust and the position is removed.
pub const DUST_SHARES: Decimal = dec!(0.01);

/// Generates a fresh identifier for any stored entity.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ────────────────────────────────────────────
// Outcome
// ────────────────────────────────────────────

/// One side of a binary prediction market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "YES", alias = "yes", alias = "Yes")]
    Yes,
    #[serde(rename = "NO", alias = "no", alias = "No")]
    No,
}

impl Outcome {
    /// Parses "YES"/"NO" case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            _ => None,
        }
    }

    /// The other side of the market.
    pub fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

// ────────────────────────────────────────────
// Market
// ────────────────────────────────────────────

/// A binary prediction market backed by two outcome reserve pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub id: MarketId,
    pub question: String,
    /// YES reserve pool.
    pub yes_shares: Decimal,
    /// NO reserve pool.
    pub no_shares: Decimal,
    /// Cumulative net value that has entered the pool.
    pub liquidity: Decimal,
    pub resolved: bool,
    /// Winning outcome once resolved.
    pub resolution: Option<Outcome>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Market {
    /// Creates an open market seeded with the given reserves.
    pub fn new(
        question: impl Into<String>,
        end_time: DateTime<Utc>,
        yes_shares: Decimal,
        no_shares: Decimal,
    ) -> Self {
        Self {
            id: new_id(),
            question: question.into(),
            yes_shares,
            no_shares,
            liquidity: yes_shares + no_shares,
            resolved: false,
            resolution: None,
            end_time,
            created_at: Utc::now(),
        }
    }

    /// Reserve backing the given outcome.
    pub fn reserve(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Yes => self.yes_shares,
            Outcome::No => self.no_shares,
        }
    }

    /// Current YES price (0.5 when both reserves are empty).
    pub fn yes_price(&self) -> Decimal {
        super::amm::outcome_price(self.yes_shares, self.no_shares, Outcome::Yes)
    }

    /// Current NO price (0.5 when both reserves are empty).
    pub fn no_price(&self) -> Decimal {
        super::amm::outcome_price(self.yes_shares, self.no_shares, Outcome::No)
    }

    /// Current price of the given outcome.
    pub fn price(&self, outcome: Outcome) -> Decimal {
        super::amm::outcome_price(self.yes_shares, self.no_shares, outcome)
    }

    /// Whether the market has passed its end time at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    /// Rejects trading on resolved or expired markets.
    pub fn ensure_open(&self, now: DateTime<Utc>) -> TradingResult<()> {
        if self.resolved {
            return Err(TradingError::MarketResolved(self.id.clone()));
        }
        if self.is_expired(now) {
            return Err(TradingError::MarketExpired(self.id.clone()));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────
// Position
// ────────────────────────────────────────────

/// A user's holding of one side of one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    pub user_id: UserId,
    pub market_id: MarketId,
    pub side: Outcome,
    pub shares: Decimal,
    /// Share-weighted average fill price in [0, 1].
    pub avg_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Opens a position from a first fill.
    pub fn open(
        user_id: &str,
        market_id: &str,
        side: Outcome,
        shares: Decimal,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            market_id: market_id.to_string(),
            side,
            shares,
            avg_price: price,
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a fill, updating the share-weighted average price.
    ///
    /// avg = (old_avg * old_shares + fill_price * fill_shares) / (old_shares + fill_shares)
    pub fn add_fill(&mut self, shares: Decimal, price: Decimal, now: DateTime<Utc>) {
        let total = self.shares + shares;
        if total > Decimal::ZERO {
            self.avg_price = (self.avg_price * self.shares + price * shares) / total;
        }
        self.shares = total;
        self.updated_at = now;
    }

    /// Removes shares; returns true when the remainder is dust.
    pub fn reduce(&mut self, shares: Decimal, now: DateTime<Utc>) -> bool {
        self.shares -= shares;
        self.updated_at = now;
        self.shares < DUST_SHARES
    }

    /// Cost basis of `shares` at the average price.
    pub fn cost_basis(&self, shares: Decimal) -> Decimal {
        self.avg_price * shares
    }
}

// ────────────────────────────────────────────
// Wallet and ledger
// ────────────────────────────────────────────

/// Per-user balance state. Mutated only through ledger operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: UserId,
    pub virtual_balance: Decimal,
    pub total_deposited: Decimal,
    pub total_withdrawn: Decimal,
    pub lifetime_pnl: Decimal,
    pub reputation_points: i64,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// An empty wallet; funding happens through a ledger credit.
    pub fn empty(user_id: &str, reputation_points: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            virtual_balance: Decimal::ZERO,
            total_deposited: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            lifetime_pnl: Decimal::ZERO,
            reputation_points,
            created_at: now,
        }
    }
}

/// Reason attached to a balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    PredBuy,
    PredSell,
    ResolutionPayout,
    PerpOpen,
    PerpClose,
    PaymentReceived,
    Adjustment,
}

impl TransactionKind {
    /// Whether this kind counts toward deposit/withdrawal totals.
    pub fn is_transfer(self) -> bool {
        matches!(self, Self::Deposit | Self::Withdrawal)
    }

    /// Rows written by a buy, sell, open or close.
    pub fn is_trade(self) -> bool {
        matches!(self, Self::PredBuy | Self::PredSell | Self::PerpOpen | Self::PerpClose)
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::PredBuy => "pred_buy",
            Self::PredSell => "pred_sell",
            Self::ResolutionPayout => "resolution_payout",
            Self::PerpOpen => "perp_open",
            Self::PerpClose => "perp_close",
            Self::PaymentReceived => "payment_received",
            Self::Adjustment => "adjustment",
        };
        f.write_str(s)
    }
}

/// Append-only audit record of one balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTransaction {
    pub id: String,
    pub user_id: UserId,
    /// Signed delta: positive for credits, negative for debits.
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
    pub reference_id: Option<String>,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_outcome_parse_is_case_insensitive() {
        assert_eq!(Outcome::parse("yes"), Some(Outcome::Yes));
        assert_eq!(Outcome::parse(" No "), Some(Outcome::No));
        assert_eq!(Outcome::parse("maybe"), None);
    }

    #[test]
    fn test_outcome_serde_aliases() {
        let o: Outcome = serde_json::from_str("\"yes\"").unwrap();
        assert_eq!(o, Outcome::Yes);
        assert_eq!(serde_json::to_string(&Outcome::No).unwrap(), "\"NO\"");
    }

    #[test]
    fn test_market_default_prices_when_empty() {
        let market = Market::new("Q?", Utc::now() + Duration::days(1), Decimal::ZERO, Decimal::ZERO);
        assert_eq!(market.yes_price(), dec!(0.5));
        assert_eq!(market.no_price(), dec!(0.5));
    }

    #[test]
    fn test_market_price_is_reserve_share() {
        let market = Market::new("Q?", Utc::now() + Duration::days(1), dec!(75), dec!(25));
        assert_eq!(market.yes_price(), dec!(0.75));
        assert_eq!(market.no_price(), dec!(0.25));
    }

    #[test]
    fn test_ensure_open_rejects_expired_and_resolved() {
        let now = Utc::now();
        let mut market = Market::new("Q?", now - Duration::seconds(1), dec!(10), dec!(10));
        assert!(matches!(market.ensure_open(now), Err(TradingError::MarketExpired(_))));

        market.end_time = now + Duration::days(1);
        market.resolved = true;
        assert!(matches!(market.ensure_open(now), Err(TradingError::MarketResolved(_))));
    }

    #[test]
    fn test_position_weighted_average() {
        let now = Utc::now();
        let mut pos = Position::open("u1", "m1", Outcome::Yes, dec!(10), dec!(0.4), now);
        pos.add_fill(dec!(30), dec!(0.6), now);
        // (0.4*10 + 0.6*30) / 40 = 22 / 40 = 0.55
        assert_eq!(pos.shares, dec!(40));
        assert_eq!(pos.avg_price, dec!(0.55));
    }

    #[test]
    fn test_position_reduce_flags_dust() {
        let now = Utc::now();
        let mut pos = Position::open("u1", "m1", Outcome::No, dec!(5), dec!(0.5), now);
        assert!(!pos.reduce(dec!(4), now));
        assert!(pos.reduce(dec!(0.995), now));
    }
}
