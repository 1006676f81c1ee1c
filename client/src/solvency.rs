//! Health factor computation and action gating.
//!
//! The health factor is the ratio of total collateral value to total debt
//! value. With no debt it is unbounded. Borrow and withdraw are rejected when
//! the projected factor falls below the configured minimum; supply and repay
//! can only raise it and are never blocked.

use crate::decimal;
use crate::error::{LendingError, Result};
use crate::manifest::ActionKind;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Collateral-to-debt ratio
///
/// Variant order matters: the derived ordering puts every finite value below
/// [`HealthFactor::Unbounded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HealthFactor {
    /// `supply / borrow` truncated to protocol precision
    Finite(Decimal),
    /// No outstanding debt
    Unbounded,
}

impl HealthFactor {
    /// Compute from total supply and borrow values
    pub fn compute(supply_value: Decimal, borrow_value: Decimal) -> Result<Self> {
        if borrow_value <= Decimal::ZERO {
            return Ok(HealthFactor::Unbounded);
        }
        let ratio = decimal::div(supply_value, borrow_value)?;
        // Truncated so a ratio just under the minimum never rounds up onto it
        Ok(HealthFactor::Finite(decimal::floor_to_protocol(ratio)))
    }

    /// Finite value, `None` when unbounded
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            HealthFactor::Finite(value) => Some(*value),
            HealthFactor::Unbounded => None,
        }
    }

    /// Whether no debt is outstanding
    pub fn is_unbounded(&self) -> bool {
        matches!(self, HealthFactor::Unbounded)
    }
}

impl fmt::Display for HealthFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthFactor::Unbounded => write!(f, "∞"),
            HealthFactor::Finite(value) => {
                let mut shown =
                    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
                shown.rescale(2);
                write!(f, "{}", shown)
            }
        }
    }
}

/// Signed change in quote value an action would apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingDelta {
    /// Change in total supply value
    Supply(Decimal),
    /// Change in total borrow value
    Borrow(Decimal),
}

/// Current and projected health of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthProjection {
    /// Health factor before the action
    pub current: HealthFactor,
    /// Health factor after the action
    pub projected: HealthFactor,
    /// Total supply value after the action
    pub supply_value_after: Decimal,
    /// Total borrow value after the action
    pub borrow_value_after: Decimal,
}

/// Computes and enforces the minimum health factor
#[derive(Debug, Clone, Copy)]
pub struct SolvencyCalculator {
    minimum_health_factor: Decimal,
}

impl SolvencyCalculator {
    /// Create a calculator with the given minimum
    pub fn new(minimum_health_factor: Decimal) -> Self {
        Self {
            minimum_health_factor,
        }
    }

    /// Configured minimum
    pub fn minimum_health_factor(&self) -> Decimal {
        self.minimum_health_factor
    }

    /// Health factor of the given totals
    pub fn current(&self, supply_value: Decimal, borrow_value: Decimal) -> Result<HealthFactor> {
        HealthFactor::compute(supply_value, borrow_value)
    }

    /// Health before and after applying a pending delta
    pub fn project(
        &self,
        supply_value: Decimal,
        borrow_value: Decimal,
        delta: Option<PendingDelta>,
    ) -> Result<HealthProjection> {
        let current = HealthFactor::compute(supply_value, borrow_value)?;

        let (supply_after, borrow_after) = match delta {
            None => (supply_value, borrow_value),
            Some(PendingDelta::Supply(change)) => {
                (decimal::add(supply_value, change)?, borrow_value)
            }
            Some(PendingDelta::Borrow(change)) => {
                (supply_value, decimal::add(borrow_value, change)?)
            }
        };
        // Rounding in value conversion can push a full withdraw or repay just below zero
        let supply_after = supply_after.max(Decimal::ZERO);
        let borrow_after = borrow_after.max(Decimal::ZERO);

        let projected = HealthFactor::compute(supply_after, borrow_after)?;
        debug!("Health factor {} -> {}", current, projected);

        Ok(HealthProjection {
            current,
            projected,
            supply_value_after: supply_after,
            borrow_value_after: borrow_after,
        })
    }

    /// Reject gated actions whose projected health is below the minimum
    pub fn validate(&self, kind: ActionKind, projection: &HealthProjection) -> Result<()> {
        if !kind.is_health_gated() {
            return Ok(());
        }
        match projection.projected {
            HealthFactor::Finite(projected) if projected < self.minimum_health_factor => {
                warn!(
                    "Rejecting {}: health factor {} below minimum {}",
                    kind, projection.projected, self.minimum_health_factor
                );
                Err(LendingError::HealthFactorViolation {
                    projected,
                    minimum: self.minimum_health_factor,
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn calculator() -> SolvencyCalculator {
        SolvencyCalculator::new(dec!(1.5))
    }

    #[test]
    fn test_no_debt_is_unbounded() {
        let hf = HealthFactor::compute(dec!(1000), Decimal::ZERO).unwrap();
        assert_eq!(hf, HealthFactor::Unbounded);
        assert_eq!(hf.to_string(), "∞");
        assert!(HealthFactor::compute(Decimal::ZERO, dec!(-1))
            .unwrap()
            .is_unbounded());
    }

    #[test]
    fn test_finite_health_factor() {
        let hf = HealthFactor::compute(dec!(1000), dec!(500)).unwrap();
        assert_eq!(hf, HealthFactor::Finite(dec!(2)));
        assert_eq!(hf.to_string(), "2.00");
        assert_eq!(
            HealthFactor::compute(dec!(1), dec!(3)).unwrap().to_string(),
            "0.33"
        );
    }

    #[test]
    fn test_unbounded_orders_above_finite() {
        assert!(HealthFactor::Unbounded > HealthFactor::Finite(Decimal::MAX));
        assert!(HealthFactor::Finite(dec!(1.2)) < HealthFactor::Finite(dec!(1.5)));
    }

    #[test]
    fn test_borrow_below_minimum_is_rejected() {
        let calc = calculator();
        let projection = calc
            .project(dec!(1000), dec!(500), Some(PendingDelta::Borrow(dec!(300))))
            .unwrap();

        assert_eq!(projection.current, HealthFactor::Finite(dec!(2)));
        assert_eq!(projection.projected, HealthFactor::Finite(dec!(1.25)));
        assert_matches!(
            calc.validate(ActionKind::Borrow, &projection),
            Err(LendingError::HealthFactorViolation { projected, minimum })
                if projected == dec!(1.25) && minimum == dec!(1.5)
        );
    }

    #[test]
    fn test_ratio_just_below_minimum_is_not_rounded_up() {
        let calc = calculator();
        let projection = calc
            .project(dec!(2.99999999999999999992), dec!(1), Some(PendingDelta::Borrow(dec!(1))))
            .unwrap();

        assert_eq!(
            projection.projected,
            HealthFactor::Finite(dec!(1.499999999999999999))
        );
        assert_matches!(
            calc.validate(ActionKind::Borrow, &projection),
            Err(LendingError::HealthFactorViolation { .. })
        );
    }

    #[test]
    fn test_withdraw_is_gated() {
        let calc = calculator();
        let projection = calc
            .project(dec!(1000), dec!(500), Some(PendingDelta::Supply(dec!(-400))))
            .unwrap();
        assert_eq!(projection.projected, HealthFactor::Finite(dec!(1.2)));
        assert!(calc.validate(ActionKind::Withdraw, &projection).is_err());
    }

    #[test]
    fn test_first_borrow_from_unbounded() {
        let calc = calculator();
        let projection = calc
            .project(dec!(1000), Decimal::ZERO, Some(PendingDelta::Borrow(dec!(500))))
            .unwrap();
        assert!(projection.current.is_unbounded());
        assert_eq!(projection.projected, HealthFactor::Finite(dec!(2)));
        assert!(calc.validate(ActionKind::Borrow, &projection).is_ok());
    }

    #[test]
    fn test_supply_and_repay_are_never_blocked() {
        let calc = calculator();
        // Already under water; adding collateral or repaying still goes through
        let supply = calc
            .project(dec!(100), dec!(100), Some(PendingDelta::Supply(dec!(10))))
            .unwrap();
        assert!(calc.validate(ActionKind::Supply, &supply).is_ok());

        let repay = calc
            .project(dec!(100), dec!(100), Some(PendingDelta::Borrow(dec!(-10))))
            .unwrap();
        assert!(calc.validate(ActionKind::Repay, &repay).is_ok());
    }

    #[test_case(dec!(1000), dec!(500), PendingDelta::Supply(dec!(1)) ; "small supply")]
    #[test_case(dec!(1000), dec!(500), PendingDelta::Supply(dec!(250000)) ; "large supply")]
    #[test_case(dec!(1000), dec!(500), PendingDelta::Borrow(dec!(-100)) ; "partial repay")]
    #[test_case(dec!(1000), dec!(500), PendingDelta::Borrow(dec!(-500)) ; "full repay")]
    #[test_case(dec!(10), dec!(900), PendingDelta::Borrow(dec!(-0.000000000000000001)) ; "dust repay")]
    fn test_supply_and_repay_are_monotone(supply: Decimal, borrow: Decimal, delta: PendingDelta) {
        let projection = calculator().project(supply, borrow, Some(delta)).unwrap();
        assert!(projection.projected >= projection.current);
    }

    #[test]
    fn test_repay_overshoot_clamps_to_zero_debt() {
        let projection = calculator()
            .project(dec!(1000), dec!(500), Some(PendingDelta::Borrow(dec!(-500.0000001))))
            .unwrap();
        assert_eq!(projection.borrow_value_after, Decimal::ZERO);
        assert!(projection.projected.is_unbounded());
    }
}
