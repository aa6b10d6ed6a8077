use rust_decimal::Decimal;

use crate::error::MedispaValuationError;
use crate::types::{Money, Multiple, Rate};
use crate::MedispaValuationResult;

/// Continuing value via the Gordon growth model.
///
/// TV = FCF_n * (1 + g) / (r - g). The spread r - g must be positive;
/// a non-positive spread fails rather than producing an infinite or
/// negative perpetuity.
pub fn gordon_growth_terminal(
    final_year_fcf: Money,
    discount_rate: Rate,
    terminal_growth: Rate,
) -> MedispaValuationResult<Money> {
    let spread = discount_rate - terminal_growth;
    if spread <= Decimal::ZERO {
        return Err(MedispaValuationError::InvalidTerminalAssumption(format!(
            "Discount rate ({discount_rate}) must exceed terminal growth rate ({terminal_growth})"
        )));
    }
    Ok(final_year_fcf * (Decimal::ONE + terminal_growth) / spread)
}

/// Continuing value via an exit EV/EBITDA multiple.
pub fn exit_multiple_terminal(
    final_year_ebitda: Money,
    exit_multiple: Multiple,
) -> MedispaValuationResult<Money> {
    if exit_multiple <= Decimal::ZERO {
        return Err(MedispaValuationError::InvalidTerminalAssumption(
            "Exit multiple must be positive".into(),
        ));
    }
    Ok(final_year_ebitda * exit_multiple)
}
