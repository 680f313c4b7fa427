//! Automated market maker for binary prediction markets.
//!
//! Pool-based pricing with two outcome reserves. The price of an outcome
//! is its reserve divided by the sum of both reserves, defaulting to
//! 0.5/0.5 when both are empty.
//!
//! Pricing curve: a constant-product pool. Buying side S with a net
//! amount `n` grows S's reserve by `n` and shrinks the opposite reserve
//! so that `yes * no` is preserved; the buyer receives
//! `opposite + n - new_opposite` shares. Selling `s` shares inverts the
//! trade by solving
//!
//! ```text
//! g² - g(own + other + s) + s·own = 0
//! ```
//!
//! for the gross proceeds `g` (smaller root). A buy followed by selling
//! the exact shares back restores the reserves and returns exactly the
//! net amount, so any positive fee makes the round trip lose value.
//!
//! Every function here is pure `Decimal` arithmetic.

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;

use super::fees::{FeeSchedule, MONEY_DP};
use super::market::Outcome;

/// Pricing failures. All are input or pool-state problems.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmmError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("reserves must be non-negative (yes={yes}, no={no})")]
    NegativeReserve { yes: Decimal, no: Decimal },

    #[error("pool has no reserve to pay out")]
    EmptyPool,

    #[error("arithmetic failure: {0}")]
    Arithmetic(&'static str),
}

/// Result of pricing a buy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyQuote {
    pub shares_bought: Decimal,
    /// Net amount divided by shares bought.
    pub avg_price: Decimal,
    pub new_yes_reserve: Decimal,
    pub new_no_reserve: Decimal,
    /// Amount that entered the pool after the fee.
    pub net_amount: Decimal,
    pub fee: Decimal,
    /// Price of the bought side before and after the trade.
    pub price_before: Decimal,
    pub price_after: Decimal,
}

/// Result of pricing a sell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellQuote {
    /// Gross proceeds paid out of the pool.
    pub total_cost: Decimal,
    pub net_proceeds: Decimal,
    pub fee: Decimal,
    pub avg_price: Decimal,
    pub new_yes_reserve: Decimal,
    pub new_no_reserve: Decimal,
    pub price_before: Decimal,
    pub price_after: Decimal,
}

/// Price of `outcome` for the given reserves.
pub fn outcome_price(yes: Decimal, no: Decimal, outcome: Outcome) -> Decimal {
    let total = yes + no;
    if total <= Decimal::ZERO {
        return dec!(0.5);
    }
    let own = match outcome {
        Outcome::Yes => yes,
        Outcome::No => no,
    };
    own / total
}

/// (yes_price, no_price) for the given reserves. Always sums to 1.
pub fn prices(yes: Decimal, no: Decimal) -> (Decimal, Decimal) {
    let yes_price = outcome_price(yes, no, Outcome::Yes);
    (yes_price, Decimal::ONE - yes_price)
}

/// Rounds toward zero at money precision (pays out less).
fn floor_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToZero)
}

/// Rounds away from zero at money precision (keeps more in the pool).
fn ceil_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::AwayFromZero)
}

/// Splits reserves into (own, other) relative to `side`.
fn orient(yes: Decimal, no: Decimal, side: Outcome) -> (Decimal, Decimal) {
    match side {
        Outcome::Yes => (yes, no),
        Outcome::No => (no, yes),
    }
}

/// Maps (own, other) back to (yes, no).
fn unorient(own: Decimal, other: Decimal, side: Outcome) -> (Decimal, Decimal) {
    match side {
        Outcome::Yes => (own, other),
        Outcome::No => (other, own),
    }
}

/// Constant-product AMM with a flat fee.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmmPricer {
    fees: FeeSchedule,
}

impl AmmPricer {
    /// Creates a pricer charging the given fee schedule.
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    /// Returns the fee schedule.
    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    fn check_reserves(yes: Decimal, no: Decimal) -> Result<(), AmmError> {
        if yes < Decimal::ZERO || no < Decimal::ZERO {
            return Err(AmmError::NegativeReserve { yes, no });
        }
        Ok(())
    }

    /// Prices buying `side` with `amount` (fee inclusive).
    pub fn calculate_buy_with_fees(
        &self,
        yes_reserve: Decimal,
        no_reserve: Decimal,
        side: Outcome,
        amount: Decimal,
    ) -> Result<BuyQuote, AmmError> {
        if amount <= Decimal::ZERO {
            return Err(AmmError::NonPositiveAmount(amount));
        }
        Self::check_reserves(yes_reserve, no_reserve)?;

        let (net_amount, fee) = self.fees.split(amount);
        if net_amount <= Decimal::ZERO {
            return Err(AmmError::NonPositiveAmount(net_amount));
        }

        let price_before = outcome_price(yes_reserve, no_reserve, side);
        let (own, other) = orient(yes_reserve, no_reserve, side);

        let (shares_bought, new_own, new_other) = if own.is_zero() && other.is_zero() {
            // Bootstrap: fill at 0.5 and seed both pools with the net amount.
            let shares = floor_money(net_amount / price_before);
            (shares, net_amount, net_amount)
        } else {
            let new_own = own + net_amount;
            let k = own
                .checked_mul(other)
                .ok_or(AmmError::Arithmetic("reserve product overflow"))?;
            let new_other = ceil_money(
                k.checked_div(new_own)
                    .ok_or(AmmError::Arithmetic("division by zero reserve"))?,
            );
            let shares = floor_money(other + net_amount - new_other);
            (shares, new_own, new_other)
        };

        if shares_bought <= Decimal::ZERO {
            return Err(AmmError::EmptyPool);
        }

        let (new_yes_reserve, new_no_reserve) = unorient(new_own, new_other, side);
        let avg_price = net_amount / shares_bought;

        Ok(BuyQuote {
            shares_bought,
            avg_price,
            new_yes_reserve,
            new_no_reserve,
            net_amount,
            fee,
            price_before,
            price_after: outcome_price(new_yes_reserve, new_no_reserve, side),
        })
    }

    /// Prices selling `shares_to_sell` of `side` back to the pool.
    ///
    /// Does not check the seller's holdings; the trading service does.
    pub fn calculate_sell_with_fees(
        &self,
        yes_reserve: Decimal,
        no_reserve: Decimal,
        side: Outcome,
        shares_to_sell: Decimal,
    ) -> Result<SellQuote, AmmError> {
        if shares_to_sell <= Decimal::ZERO {
            return Err(AmmError::NonPositiveAmount(shares_to_sell));
        }
        Self::check_reserves(yes_reserve, no_reserve)?;

        let (own, other) = orient(yes_reserve, no_reserve, side);
        if own.is_zero() {
            return Err(AmmError::EmptyPool);
        }

        let s = shares_to_sell;
        let b = own + other + s;
        let discriminant = b * b - dec!(4) * s * own;
        if discriminant < Decimal::ZERO {
            return Err(AmmError::Arithmetic("negative discriminant"));
        }
        let root = discriminant
            .sqrt()
            .ok_or(AmmError::Arithmetic("square root failed"))?;

        // Smaller root; clamp into [0, own] against sqrt rounding.
        let gross = floor_money((b - root) / dec!(2)).clamp(Decimal::ZERO, own);
        if gross <= Decimal::ZERO {
            return Err(AmmError::EmptyPool);
        }

        let new_own = own - gross;
        let new_other = other + s - gross;
        let (new_yes_reserve, new_no_reserve) = unorient(new_own, new_other, side);
        let (net_proceeds, fee) = self.fees.split(gross);

        Ok(SellQuote {
            total_cost: gross,
            net_proceeds,
            fee,
            avg_price: gross / s,
            new_yes_reserve,
            new_no_reserve,
            price_before: outcome_price(yes_reserve, no_reserve, side),
            price_after: outcome_price(new_yes_reserve, new_no_reserve, side),
        })
    }
}

/// Converts a decimal price to f64 for metrics and logs only.
pub fn to_f64_lossy(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricer() -> AmmPricer {
        AmmPricer::new(FeeSchedule::standard())
    }

    #[test]
    fn test_prices_default_to_half() {
        assert_eq!(prices(Decimal::ZERO, Decimal::ZERO), (dec!(0.5), dec!(0.5)));
    }

    #[test]
    fn test_buy_yes_moves_price_up() {
        let quote = pricer()
            .calculate_buy_with_fees(dec!(100), dec!(100), Outcome::Yes, dec!(50))
            .unwrap();
        assert_eq!(quote.fee, dec!(0.5));
        assert_eq!(quote.net_amount, dec!(49.5));
        assert_eq!(quote.new_yes_reserve, dec!(149.5));
        assert!(quote.price_after > dec!(0.5), "YES price should rise, got {}", quote.price_after);
        assert!(quote.avg_price > quote.price_before);
        assert!(quote.avg_price < quote.price_after);
    }

    #[test]
    fn test_buy_no_mirrors_buy_yes() {
        let yes = pricer()
            .calculate_buy_with_fees(dec!(80), dec!(120), Outcome::Yes, dec!(10))
            .unwrap();
        let no = pricer()
            .calculate_buy_with_fees(dec!(120), dec!(80), Outcome::No, dec!(10))
            .unwrap();
        assert_eq!(yes.shares_bought, no.shares_bought);
        assert_eq!(yes.new_yes_reserve, no.new_no_reserve);
        assert_eq!(yes.new_no_reserve, no.new_yes_reserve);
    }

    #[test]
    fn test_round_trip_loses_fees() {
        let p = pricer();
        let buy = p
            .calculate_buy_with_fees(dec!(100), dec!(100), Outcome::Yes, dec!(50))
            .unwrap();
        let sell = p
            .calculate_sell_with_fees(
                buy.new_yes_reserve,
                buy.new_no_reserve,
                Outcome::Yes,
                buy.shares_bought,
            )
            .unwrap();
        assert!(sell.total_cost <= dec!(49.5));
        assert!(sell.net_proceeds < dec!(49.5), "got {}", sell.net_proceeds);
        assert!(sell.new_yes_reserve >= Decimal::ZERO);
        assert!(sell.new_no_reserve >= Decimal::ZERO);
    }

    #[test]
    fn test_bootstrap_fills_at_half() {
        let quote = AmmPricer::new(FeeSchedule::zero())
            .calculate_buy_with_fees(Decimal::ZERO, Decimal::ZERO, Outcome::No, dec!(10))
            .unwrap();
        assert_eq!(quote.shares_bought, dec!(20));
        assert_eq!(quote.avg_price, dec!(0.5));
        assert_eq!(quote.new_yes_reserve, dec!(10));
        assert_eq!(quote.new_no_reserve, dec!(10));
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let err = pricer()
            .calculate_buy_with_fees(dec!(10), dec!(10), Outcome::Yes, Decimal::ZERO)
            .unwrap_err();
        assert!(matches!(err, AmmError::NonPositiveAmount(_)));
    }

    #[test]
    fn test_rejects_negative_reserve() {
        let err = pricer()
            .calculate_sell_with_fees(dec!(-1), dec!(10), Outcome::Yes, dec!(1))
            .unwrap_err();
        assert!(matches!(err, AmmError::NegativeReserve { .. }));
    }

    #[test]
    fn test_sell_into_empty_side_fails() {
        let err = pricer()
            .calculate_sell_with_fees(Decimal::ZERO, dec!(10), Outcome::Yes, dec!(1))
            .unwrap_err();
        assert_eq!(err, AmmError::EmptyPool);
    }

    #[test]
    fn test_sell_never_drains_below_zero() {
        let quote = pricer()
            .calculate_sell_with_fees(dec!(5), dec!(500), Outcome::Yes, dec!(10_000))
            .unwrap();
        assert!(quote.new_yes_reserve >= Decimal::ZERO);
        assert!(quote.total_cost <= dec!(5));
    }
}
