//! Money arithmetic on top of rust_decimal.
//!
//! Prices travel through the API as f64 USD amounts. All arithmetic converts to
//! `Decimal` first and only rounds once, at the boundary back to f64, so markup
//! application cannot accumulate float error.

use rust_decimal::prelude::*;

use crate::error::AppError;

/// All charge amounts round to cents.
const DECIMAL_PLACES: u32 = 2;

/// Upper bound accepted from any checkout payload, in USD.
const MAX_AMOUNT: f64 = 100_000.0;

/// Convert an f64 into Decimal for arithmetic.
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_else(|| {
        tracing::error!("Invalid f64 value for Decimal conversion: {}", value);
        Decimal::ZERO
    })
}

/// Convert a Decimal back to f64, rounded to cents, half away from zero.
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        // SAFETY: any Decimal rounded to 2 places is representable as f64
        .expect("rounded Decimal always converts to f64")
}

/// Round an amount to cents.
pub fn round_money(value: f64) -> f64 {
    to_f64(to_decimal(value))
}

/// Charge total for a base amount with a fractional markup rate applied,
/// e.g. `compute_markup_amount(10.0, 0.02)` is `10.20`.
pub fn compute_markup_amount(base: f64, rate: f64) -> f64 {
    to_f64(to_decimal(base) * (Decimal::ONE + to_decimal(rate)))
}

/// Validate a client-supplied amount: finite, positive, below the sanity cap.
pub fn require_positive_amount(value: f64, field: &str) -> Result<(), AppError> {
    if !value.is_finite() {
        return Err(AppError::validation(format!(
            "{field} must be a finite number"
        )));
    }
    if value <= 0.0 {
        return Err(AppError::validation(format!(
            "{field} must be greater than zero"
        )));
    }
    if value > MAX_AMOUNT {
        return Err(AppError::validation(format!(
            "{field} exceeds the maximum supported amount"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_on_round_amount() {
        assert_eq!(compute_markup_amount(10.0, 0.02), 10.20);
        assert_eq!(compute_markup_amount(50.0, 0.01), 50.50);
    }

    #[test]
    fn markup_rounds_half_away_from_zero() {
        // 5.555 * 1.01 = 5.61055 -> 5.61
        assert_eq!(compute_markup_amount(5.555, 0.01), 5.61);
        // 1.25 * 1.02 = 1.275 -> 1.28, not 1.27
        assert_eq!(compute_markup_amount(1.25, 0.02), 1.28);
    }

    #[test]
    fn markup_of_zero_rate_is_identity_after_rounding() {
        assert_eq!(compute_markup_amount(12.34, 0.0), 12.34);
    }

    #[test]
    fn round_money_is_idempotent() {
        let once = round_money(9.999);
        assert_eq!(once, 10.0);
        assert_eq!(round_money(once), once);
    }

    #[test]
    fn rejects_non_positive_and_non_finite() {
        assert!(require_positive_amount(0.0, "amount").is_err());
        assert!(require_positive_amount(-4.0, "amount").is_err());
        assert!(require_positive_amount(f64::NAN, "amount").is_err());
        assert!(require_positive_amount(f64::INFINITY, "amount").is_err());
        assert!(require_positive_amount(200_000.0, "amount").is_err());
        assert!(require_positive_amount(25.0, "amount").is_ok());
    }
}
