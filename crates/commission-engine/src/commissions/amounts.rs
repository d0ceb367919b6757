use rust_decimal::{Decimal, RoundingStrategy};

use super::error::CommissionError;

pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Allowed drift per role when comparing percentage sums.
pub const PERCENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

/// One cent per role when comparing amount sums.
pub const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const AMOUNT_SCALE: u32 = 2;
pub const PERCENT_SCALE: u32 = 6;

pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_percent(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PERCENT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `percent` of `base`, unrounded. Fails with `Validation` when the product overflows.
pub fn percent_of(percent: Decimal, base: Decimal) -> Result<Decimal, CommissionError> {
    base.checked_mul(percent)
        .and_then(|product| product.checked_div(HUNDRED))
        .ok_or_else(|| out_of_range(format!("{percent}% of {base}")))
}

/// `numerator / denominator`, rejecting overflow and a zero denominator.
pub fn checked_ratio(
    numerator: Decimal,
    denominator: Decimal,
) -> Result<Decimal, CommissionError> {
    numerator
        .checked_div(denominator)
        .ok_or_else(|| out_of_range(format!("{numerator} / {denominator}")))
}

pub fn checked_sum(
    values: impl IntoIterator<Item = Decimal>,
) -> Result<Decimal, CommissionError> {
    values.into_iter().try_fold(Decimal::ZERO, |total, value| {
        total
            .checked_add(value)
            .ok_or_else(|| out_of_range(format!("{total} + {value}")))
    })
}

fn out_of_range(operation: String) -> CommissionError {
    CommissionError::validation(format!("amount out of range: {operation}"))
}

pub fn within(actual: Decimal, expected: Decimal, tolerance: Decimal) -> bool {
    (actual - expected).abs() <= tolerance
}

pub fn is_valid_percent(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_cents_away_from_zero() {
        assert_eq!(round_amount(dec!(10.005)), dec!(10.01));
        assert_eq!(round_amount(dec!(-10.005)), dec!(-10.01));
        assert_eq!(round_amount(dec!(10.004)), dec!(10.00));
    }

    #[test]
    fn overflowing_arithmetic_is_a_validation_error() {
        assert_eq!(percent_of(dec!(3), dec!(90000)).expect("fits"), dec!(2700));
        assert!(matches!(
            percent_of(dec!(3), Decimal::MAX),
            Err(CommissionError::Validation(_))
        ));
        assert!(matches!(
            checked_ratio(Decimal::MAX, dec!(0.5)),
            Err(CommissionError::Validation(_))
        ));
        assert!(checked_ratio(dec!(1), Decimal::ZERO).is_err());
        assert!(checked_sum([Decimal::MAX, Decimal::ONE]).is_err());
        assert_eq!(checked_sum([dec!(1.5), dec!(2)]).expect("fits"), dec!(3.5));
    }

    #[test]
    fn tolerance_constants_have_expected_scale() {
        assert_eq!(PERCENT_TOLERANCE, dec!(0.0001));
        assert_eq!(AMOUNT_TOLERANCE, dec!(0.01));
    }
}
