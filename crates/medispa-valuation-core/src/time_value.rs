use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::MedispaValuationError;
use crate::types::{Money, Rate};
use crate::MedispaValuationResult;

fn check_rate(rate: Rate) -> MedispaValuationResult<()> {
    if rate <= dec!(-1) {
        return Err(MedispaValuationError::InvalidRate(format!(
            "Discount rate must be greater than -100%, got {rate}"
        )));
    }
    Ok(())
}

/// Present value of a single cash flow received `period` periods from now.
pub fn present_value(cash_flow: Money, rate: Rate, period: u32) -> MedispaValuationResult<Money> {
    check_rate(rate)?;

    let discount = (Decimal::ONE + rate).powd(Decimal::from(period));
    if discount.is_zero() {
        return Err(MedispaValuationError::DivisionByZero {
            context: format!("discount factor at period {period}"),
        });
    }
    Ok(cash_flow / discount)
}

/// Present value of an ordered series of cash flows.
///
/// Periods are 1-based: the first element discounts by one full period.
pub fn present_value_series(cash_flows: &[Money], rate: Rate) -> MedispaValuationResult<Money> {
    check_rate(rate)?;

    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;
    let mut result = Decimal::ZERO;

    for (idx, cf) in cash_flows.iter().enumerate() {
        discount *= one_plus_r;
        if discount.is_zero() {
            return Err(MedispaValuationError::DivisionByZero {
                context: format!("discount factor at period {}", idx + 1),
            });
        }
        result += cf / discount;
    }

    Ok(result)
}

/// Present value of a level annuity paying `payment` at the end of each
/// of `periods` periods.
pub fn pv_annuity(rate: Rate, periods: u32, payment: Money) -> MedispaValuationResult<Money> {
    check_rate(rate)?;

    if rate.is_zero() {
        return Ok(payment * Decimal::from(periods));
    }

    let factor = (Decimal::ONE + rate).powd(Decimal::from(periods));
    if factor.is_zero() {
        return Err(MedispaValuationError::DivisionByZero {
            context: "annuity discount factor".into(),
        });
    }

    let annuity_factor = (Decimal::ONE - Decimal::ONE / factor) / rate;
    Ok(payment * annuity_factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_present_value_one_period() {
        let result = present_value(dec!(100), dec!(0.10), 1).unwrap();
        // 100 / 1.10 = 90.909090...
        assert!((result - dec!(90.90909090909090909090909090)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_present_value_zero_periods() {
        let result = present_value(dec!(250), dec!(0.12), 0).unwrap();
        assert_eq!(result, dec!(250));
    }

    #[test]
    fn test_present_value_series_one_based() {
        // First flow must discount by one full period
        let result = present_value_series(&[dec!(110)], dec!(0.10)).unwrap();
        assert!((result - dec!(100)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_present_value_series_multi_year() {
        let flows = vec![dec!(300), dec!(400), dec!(500)];
        let result = present_value_series(&flows, dec!(0.10)).unwrap();
        // 300/1.1 + 400/1.21 + 500/1.331 ≈ 978.96
        assert!((result - dec!(978.96)).abs() < dec!(0.01));
    }

    #[test]
    fn test_present_value_series_zero_rate() {
        let flows = vec![dec!(50), dec!(50), dec!(50)];
        let result = present_value_series(&flows, dec!(0.0)).unwrap();
        assert_eq!(result, dec!(150));
    }

    #[test]
    fn test_rate_floor_rejected() {
        assert!(present_value(dec!(100), dec!(-1), 1).is_err());
        assert!(present_value_series(&[dec!(100)], dec!(-1.5)).is_err());
    }

    #[test]
    fn test_negative_rate_above_floor_accepted() {
        let result = present_value(dec!(100), dec!(-0.05), 1).unwrap();
        assert!(result > dec!(100));
    }

    #[test]
    fn test_pv_annuity() {
        let result = pv_annuity(dec!(0.08), 10, dec!(100)).unwrap();
        // 100 * (1 - 1/1.08^10) / 0.08 ≈ 671
        assert!((result - dec!(671)).abs() < dec!(2));
    }

    #[test]
    fn test_pv_annuity_zero_rate() {
        let result = pv_annuity(dec!(0), 5, dec!(100)).unwrap();
        assert_eq!(result, dec!(500));
    }
}
