//! Value objects: equality by value, not identity.
//!
//! Stock quantities, money amounts and percentages are decimals with domain
//! constraints attached. Constructing one validates it, so a ledger row holding a
//! [`Quantity`] can never hold a negative balance.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// create a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Non-negative stock quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(format!(
                "quantity must not be negative (got {value})"
            )));
        }
        Ok(Self(value.normalize()))
    }

    /// A quantity that must be strictly positive (requests, debits, credits).
    pub fn positive(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "quantity must be greater than zero (got {value})"
            )));
        }
        Ok(Self(value.normalize()))
    }

    pub fn from_units(units: u32) -> Self {
        Self(Decimal::from(units))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `None` when the result would be negative.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        let result = self.0.checked_sub(other.0)?;
        if result < Decimal::ZERO {
            None
        } else {
            Some(Quantity(result.normalize()))
        }
    }

    pub fn checked_add(self, other: Quantity) -> DomainResult<Quantity> {
        self.0
            .checked_add(other.0)
            .map(|v| Quantity(v.normalize()))
            .ok_or_else(|| DomainError::invariant("quantity overflow"))
    }
}

impl ValueObject for Quantity {}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Non-negative monetary amount, kept at two decimal places (half-up).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "amount must not be negative (got {value})"
            )));
        }
        Ok(Self(round_half_up(value)))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("amount overflow"))
    }

    /// Subtraction floored at zero.
    pub fn saturating_sub(self, other: Money) -> Money {
        if other.0 >= self.0 {
            Money::ZERO
        } else {
            Money(self.0 - other.0)
        }
    }

    pub fn checked_mul_quantity(self, quantity: Decimal) -> DomainResult<Money> {
        let product = self
            .0
            .checked_mul(quantity)
            .ok_or_else(|| DomainError::invariant("amount overflow"))?;
        Money::new(product)
    }

    /// `self × pct / 100`, rounded half-up to cents.
    pub fn percent(self, pct: Percentage) -> Money {
        Money(round_half_up(self.0 * pct.value() / Decimal::ONE_HUNDRED))
    }
}

impl ValueObject for Money {}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Percentage in `0..=100`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "percentage must be between 0 and 100 (got {value})"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl ValueObject for Percentage {}

impl TryFrom<Decimal> for Percentage {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Percentage::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(value: Percentage) -> Self {
        value.0
    }
}

fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantity_rejects_negative_values() {
        assert!(Quantity::new(dec!(-0.5)).is_err());
        assert!(Quantity::new(dec!(0)).is_ok());
        assert!(Quantity::positive(dec!(0)).is_err());
    }

    #[test]
    fn quantity_checked_sub_refuses_to_go_negative() {
        let ten = Quantity::new(dec!(10)).unwrap();
        let eleven = Quantity::new(dec!(11)).unwrap();
        assert_eq!(ten.checked_sub(eleven), None);
        assert_eq!(ten.checked_sub(ten), Some(Quantity::ZERO));
    }

    #[test]
    fn money_rounds_half_up_to_cents() {
        assert_eq!(Money::new(dec!(10.005)).unwrap().value(), dec!(10.01));
        assert_eq!(Money::new(dec!(10.004)).unwrap().value(), dec!(10.00));
    }

    #[test]
    fn percent_of_money() {
        let amount = Money::new(dec!(1000)).unwrap();
        let pct = Percentage::new(dec!(18)).unwrap();
        assert_eq!(amount.percent(pct).value(), dec!(180));
    }

    #[test]
    fn percentage_bounds() {
        assert!(Percentage::new(dec!(100.01)).is_err());
        assert!(Percentage::new(dec!(-1)).is_err());
        assert!(Percentage::new(dec!(100)).is_ok());
    }

    #[test]
    fn quantity_deserialization_validates() {
        let ok: Quantity = serde_json::from_str("\"2.5\"").unwrap();
        assert_eq!(ok.value(), dec!(2.5));
        assert!(serde_json::from_str::<Quantity>("\"-1\"").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn sub_then_add_restores_quantity(a in 0u32..100_000, b in 0u32..100_000) {
            let qa = Quantity::from_units(a);
            let qb = Quantity::from_units(b);
            match qa.checked_sub(qb) {
                Some(rest) => prop_assert_eq!(rest.checked_add(qb).unwrap(), qa),
                None => prop_assert!(b > a),
            }
        }
    }
}
