//! Exact decimal arithmetic for amounts, ratios and prices.
//!
//! Every piece of money math in the crate goes through these helpers. They
//! wrap [`rust_decimal::Decimal`] so that overflow and division by a
//! non-positive divisor surface as [`LendingError::ArithmeticError`] instead of
//! panicking or producing a silent sentinel.

use crate::error::{LendingError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Number of decimal places the ledger's `Decimal` type carries
pub const PROTOCOL_DECIMALS: u32 = 18;

/// Smallest representable step at protocol precision
pub fn rounding_unit() -> Decimal {
    Decimal::new(1, PROTOCOL_DECIMALS)
}

/// Checked addition
pub fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| LendingError::ArithmeticError(format!("overflow adding {} + {}", a, b)))
}

/// Checked subtraction
pub fn sub(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_sub(b).ok_or_else(|| {
        LendingError::ArithmeticError(format!("overflow subtracting {} - {}", a, b))
    })
}

/// Checked multiplication
pub fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b).ok_or_else(|| {
        LendingError::ArithmeticError(format!("overflow multiplying {} * {}", a, b))
    })
}

/// Checked division. The divisor must be strictly positive.
pub fn div(a: Decimal, b: Decimal) -> Result<Decimal> {
    if b <= Decimal::ZERO {
        return Err(LendingError::ArithmeticError(format!(
            "division of {} by non-positive divisor {}",
            a, b
        )));
    }
    a.checked_div(b)
        .ok_or_else(|| LendingError::ArithmeticError(format!("overflow dividing {} / {}", a, b)))
}

/// Sum an iterator of decimals with overflow checking
pub fn sum<I>(values: I) -> Result<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().try_fold(Decimal::ZERO, add)
}

/// Round half-up (midpoint away from zero) to protocol precision
pub fn round_to_protocol(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PROTOCOL_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

/// Round toward negative infinity to protocol precision
pub fn floor_to_protocol(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PROTOCOL_DECIMALS, RoundingStrategy::ToNegativeInfinity)
}

/// Whether the ledger's `Decimal` can carry the value without losing digits
pub fn fits_protocol(value: Decimal) -> bool {
    value.normalize().scale() <= PROTOCOL_DECIMALS
}

/// Parse a decimal string taken from a wire payload
pub fn parse(value: &str) -> Result<Decimal> {
    let trimmed = value.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|e| LendingError::InvalidResponse(format!("invalid decimal '{}': {}", value, e)))
}

/// Render a decimal the way the manifest grammar expects it (no trailing zeros)
pub fn to_manifest_string(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Lossy conversion for display purposes only
pub fn to_display(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}
