//! Trading fee schedule.
//!
//! A flat fee fraction is taken from every AMM trade: on buys it is
//! deducted from the input amount before the remainder enters the pool,
//! on sells it is deducted from the gross proceeds.
//!
//! Fees are rounded up to 8 decimal places so rounding always favours
//! the pool and a buy/sell round trip can never gain value.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Decimal places used for every monetary amount.
pub const MONEY_DP: u32 = 8;

/// Fee schedule applied to prediction-market trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    /// Fee fraction in [0, 1) (0.01 = 1%).
    rate: Decimal,
}

impl FeeSchedule {
    /// Creates a schedule with the given fee fraction.
    ///
    /// Out-of-range rates are clamped into [0, 0.5]; config validation
    /// rejects them before they get here.
    pub fn new(rate: Decimal) -> Self {
        Self {
            rate: rate.clamp(Decimal::ZERO, dec!(0.5)),
        }
    }

    /// The default 1% trading fee.
    pub fn standard() -> Self {
        Self::new(dec!(0.01))
    }

    /// A fee-free schedule, used by tests and market seeding.
    pub fn zero() -> Self {
        Self::new(Decimal::ZERO)
    }

    /// Returns the fee fraction.
    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Fee charged on `amount`, rounded up to 8 dp.
    pub fn fee_on(&self, amount: Decimal) -> Decimal {
        if amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (amount * self.rate).round_dp_with_strategy(MONEY_DP, RoundingStrategy::AwayFromZero)
    }

    /// Splits `amount` into `(net, fee)` with `net + fee == amount`.
    pub fn split(&self, amount: Decimal) -> (Decimal, Decimal) {
        let fee = self.fee_on(amount).min(amount.max(Decimal::ZERO));
        (amount - fee, fee)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_fee_on_fifty() {
        let fees = FeeSchedule::standard();
        assert_eq!(fees.fee_on(dec!(50)), dec!(0.5));
        assert_eq!(fees.split(dec!(50)), (dec!(49.5), dec!(0.5)));
    }

    #[test]
    fn test_fee_rounds_up() {
        let fees = FeeSchedule::new(dec!(0.01));
        // 0.000000015 rounds away from zero to 0.00000002
        assert_eq!(fees.fee_on(dec!(0.0000015)), dec!(0.00000002));
    }

    #[test]
    fn test_zero_schedule() {
        let fees = FeeSchedule::zero();
        assert_eq!(fees.split(dec!(10)), (dec!(10), Decimal::ZERO));
    }

    #[test]
    fn test_rate_is_clamped() {
        assert_eq!(FeeSchedule::new(dec!(-0.2)).rate(), Decimal::ZERO);
        assert_eq!(FeeSchedule::new(dec!(0.9)).rate(), dec!(0.5));
    }

    #[test]
    fn test_non_positive_amount_has_no_fee() {
        let fees = FeeSchedule::standard();
        assert_eq!(fees.fee_on(Decimal::ZERO), Decimal::ZERO);
        assert_eq!(fees.fee_on(dec!(-5)), Decimal::ZERO);
    }
}
