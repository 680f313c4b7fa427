//! Perpetual position model - Leverage, Liquidation and PnL
//!
//! A perp position locks `size` of margin at an entry price with a
//! leverage multiplier. The liquidation price is where the leveraged
//! loss consumes `maintenance_margin_ratio` of the margin:
//!
//! - long:  `entry * (1 - mmr / leverage)`
//! - short: `entry * (1 + mmr / leverage)`
//!
//! Realized PnL is `(current - entry) / entry * size * leverage * sign`,
//! floored at `-size` so a position can never lose more than its margin.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::error::{TradingError, TradingResult};
use super::fees::MONEY_DP;
use super::market::{PositionId, UserId, new_id};

/// Default maintenance margin ratio.
pub const DEFAULT_MAINTENANCE_MARGIN_RATIO: Decimal = dec!(0.9);

/// Direction of a perp position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerpSide {
    Long,
    Short,
}

impl PerpSide {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Parses "long"/"short" case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "long" => Some(Self::Long),
            "short" => Some(Self::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for PerpSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Liquidation price for a position opened at `entry`.
pub fn liquidation_price(
    side: PerpSide,
    entry: Decimal,
    leverage: u32,
    maintenance_margin_ratio: Decimal,
) -> Decimal {
    let lev = Decimal::from(leverage.max(1));
    let offset = maintenance_margin_ratio / lev;
    let factor = match side {
        PerpSide::Long => Decimal::ONE - offset,
        PerpSide::Short => Decimal::ONE + offset,
    };
    (entry * factor).round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointNearestEven)
}

/// Leveraged PnL of `size` margin moved from `entry` to `current`.
pub fn leveraged_pnl(
    side: PerpSide,
    entry: Decimal,
    current: Decimal,
    size: Decimal,
    leverage: u32,
) -> Decimal {
    if entry <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let raw = (current - entry) / entry * size * Decimal::from(leverage) * side.sign();
    raw.max(-size)
        .round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToZero)
}

/// A leveraged position on a perp ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerpPosition {
    pub id: PositionId,
    pub user_id: UserId,
    pub ticker: String,
    pub side: PerpSide,
    pub entry_price: Decimal,
    /// Margin locked at open.
    pub size: Decimal,
    pub leverage: u32,
    /// Last marked price.
    pub current_price: Decimal,
    #[serde(rename = "unrealizedPnL")]
    pub unrealized_pnl: Decimal,
    pub liquidation_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    #[serde(rename = "realizedPnL")]
    pub realized_pnl: Option<Decimal>,
}

impl PerpPosition {
    /// Opens a position at `entry`.
    pub fn open(
        user_id: &str,
        ticker: &str,
        side: PerpSide,
        entry: Decimal,
        size: Decimal,
        leverage: u32,
        maintenance_margin_ratio: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            ticker: ticker.to_string(),
            side,
            entry_price: entry,
            size,
            leverage,
            current_price: entry,
            unrealized_pnl: Decimal::ZERO,
            liquidation_price: liquidation_price(side, entry, leverage, maintenance_margin_ratio),
            opened_at: now,
            closed_at: None,
            exit_price: None,
            realized_pnl: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// PnL if the position were closed at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        leveraged_pnl(self.side, self.entry_price, price, self.size, self.leverage)
    }

    /// Whether `price` has crossed the liquidation threshold.
    pub fn is_breaching(&self, price: Decimal) -> bool {
        match self.side {
            PerpSide::Long => price <= self.liquidation_price,
            PerpSide::Short => price >= self.liquidation_price,
        }
    }

    /// Updates the current price and unrealized PnL.
    pub fn mark(&mut self, price: Decimal) {
        self.current_price = price;
        self.unrealized_pnl = self.pnl_at(price);
    }

    /// Closes the position at `price`, returning the realized PnL.
    pub fn close(&mut self, price: Decimal, now: DateTime<Utc>) -> TradingResult<Decimal> {
        if !self.is_open() {
            return Err(TradingError::PositionClosed(self.id.clone()));
        }
        let pnl = self.pnl_at(price);
        self.mark(price);
        self.unrealized_pnl = Decimal::ZERO;
        self.closed_at = Some(now);
        self.exit_price = Some(price);
        self.realized_pnl = Some(pnl);
        Ok(pnl)
    }

    /// Margin returned on close: `size + pnl`, never negative.
    pub fn settlement_amount(&self, pnl: Decimal) -> Decimal {
        (self.size + pnl).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_10x() -> PerpPosition {
        PerpPosition::open(
            "u1",
            "BTC",
            PerpSide::Long,
            dec!(50),
            dec!(100),
            10,
            DEFAULT_MAINTENANCE_MARGIN_RATIO,
            Utc::now(),
        )
    }

    #[test]
    fn test_long_liquidation_below_entry() {
        let pos = long_10x();
        assert_eq!(pos.liquidation_price, dec!(45.5));
        assert!(pos.liquidation_price < pos.entry_price);
    }

    #[test]
    fn test_short_liquidation_above_entry() {
        let liq = liquidation_price(PerpSide::Short, dec!(50), 10, dec!(0.9));
        assert_eq!(liq, dec!(54.5));
    }

    #[test]
    fn test_breach_when_price_falls_to_45() {
        let pos = long_10x();
        assert!(!pos.is_breaching(dec!(48)));
        assert!(pos.is_breaching(dec!(45)));
    }

    #[test]
    fn test_pnl_is_leveraged_and_floored() {
        let pos = long_10x();
        // +2% * 10x on 100 margin
        assert_eq!(pos.pnl_at(dec!(51)), dec!(20));
        // -20% * 10x would be -200, floored at -size
        assert_eq!(pos.pnl_at(dec!(40)), dec!(-100));
    }

    #[test]
    fn test_short_profits_when_price_falls() {
        let pnl = leveraged_pnl(PerpSide::Short, dec!(100), dec!(90), dec!(10), 2);
        assert_eq!(pnl, dec!(2));
    }

    #[test]
    fn test_close_twice_fails() {
        let mut pos = long_10x();
        let pnl = pos.close(dec!(55), Utc::now()).unwrap();
        assert_eq!(pnl, dec!(100));
        assert_eq!(pos.settlement_amount(pnl), dec!(200));
        assert!(matches!(
            pos.close(dec!(55), Utc::now()),
            Err(TradingError::PositionClosed(_))
        ));
    }

    #[test]
    fn test_side_parse() {
        assert_eq!(PerpSide::parse("LONG"), Some(PerpSide::Long));
        assert_eq!(PerpSide::parse("sell"), None);
    }
}
